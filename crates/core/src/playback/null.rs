use crate::playback::{AudioOutput, PlaybackError, PlayingAudio};
use crate::tts::SpeechAudio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Headless output: accepts audio, plays nothing, counts starts and stops.
#[derive(Clone, Debug, Default)]
pub struct NullAudioOutput {
    started: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
}

impl NullAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::Relaxed)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::Relaxed)
    }
}

impl AudioOutput for NullAudioOutput {
    fn start(&self, audio: Arc<SpeechAudio>) -> Result<PlayingAudio, PlaybackError> {
        self.started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            samples = audio.samples.len(),
            sample_rate_hz = audio.sample_rate_hz,
            "null output accepted audio"
        );
        let stopped = Arc::clone(&self.stopped);
        Ok(PlayingAudio::new(move || {
            stopped.fetch_add(1, Ordering::Relaxed);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_runs_once_even_when_dropped_afterwards() {
        let out = NullAudioOutput::new();
        let mut playing = out
            .start(Arc::new(SpeechAudio::new(1000, vec![0.0; 10])))
            .expect("start");
        playing.stop();
        playing.stop();
        drop(playing);
        assert_eq!(out.started(), 1);
        assert_eq!(out.stopped(), 1);
    }

    #[test]
    fn drop_stops_audio() {
        let out = NullAudioOutput::new();
        drop(out.start(Arc::new(SpeechAudio::default())).expect("start"));
        assert_eq!(out.stopped(), 1);
    }
}
