//! Script in, performance out: synthesize (one request at a time), build the
//! timeline, hand both to the playback driver.

use crate::config::AppConfig;
use crate::face::FaceState;
use crate::idle::IdleCommand;
use crate::playback::{PlaybackDriver, PlaybackError, PlaybackHandle};
use crate::timeline::{build_timeline, TimelineOptions};
use crate::tts::{synthesize_script, SpeechSynthesizer, SynthesisSettings, TtsError};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

const LOG_TARGET: &str = "pipeline";

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Tts(#[from] TtsError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PerformRequest {
    pub script: String,
    pub options: TimelineOptions,
    pub settings: SynthesisSettings,
}

impl PerformRequest {
    pub fn from_config(script: impl Into<String>, config: &AppConfig) -> Self {
        Self {
            script: script.into(),
            options: config.animation.timeline_options(),
            settings: config.synthesis,
        }
    }
}

pub struct Performer {
    driver: PlaybackDriver,
    synth: Option<Arc<dyn SpeechSynthesizer>>,
    in_flight: Mutex<()>,
}

impl Performer {
    /// Without a synthesizer, performances run on heuristic timing alone.
    pub fn new(driver: PlaybackDriver, synth: Option<Arc<dyn SpeechSynthesizer>>) -> Self {
        Self {
            driver,
            synth,
            in_flight: Mutex::new(()),
        }
    }

    pub fn driver(&self) -> &PlaybackDriver {
        &self.driver
    }

    /// Synthesizes then starts a session, replacing any live one. A failed
    /// synthesis leaves the current session untouched.
    pub async fn perform(&self, request: &PerformRequest) -> Result<PlaybackHandle, PipelineError> {
        let audio = match &self.synth {
            Some(synth) => {
                let _turn = self.in_flight.lock().await;
                let audio = synthesize_script(synth.as_ref(), &request.script, request.settings)
                    .await
                    .map_err(|e| {
                        tracing::warn!(target: LOG_TARGET, error = %e, "synthesis failed");
                        e
                    })?;
                tracing::debug!(
                    target: LOG_TARGET,
                    audio_ms = audio.duration_ms(),
                    sample_rate_hz = audio.sample_rate_hz,
                    "script synthesized"
                );
                Some(audio)
            }
            None => None,
        };

        let frames = build_timeline(&request.script, request.options);
        Ok(self.driver.play(frames, audio)?)
    }

    pub fn stop(&self) -> bool {
        self.driver.stop()
    }
}

/// Forwards the face's speaking flag to the idle machine.
pub fn spawn_idle_bridge(
    mut face: watch::Receiver<FaceState>,
    idle: mpsc::Sender<IdleCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut animating = face.borrow_and_update().animating;
        if idle.send(IdleCommand::SetAnimating(animating)).await.is_err() {
            return;
        }
        while face.changed().await.is_ok() {
            let now = face.borrow_and_update().animating;
            if now != animating {
                animating = now;
                if idle.send(IdleCommand::SetAnimating(now)).await.is_err() {
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{NullAudioOutput, PlaybackOutcome};
    use crate::tts::{SpeechAudio, SynthesisRequest, ToneSynthesizer};
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn request(script: &str) -> PerformRequest {
        PerformRequest::from_config(script, &AppConfig::default())
    }

    fn performer(synth: Option<Arc<dyn SpeechSynthesizer>>) -> Performer {
        Performer::new(PlaybackDriver::new(Arc::new(NullAudioOutput::new())), synth)
    }

    /// Slow synthesizer that fails on "fail" and tracks overlap.
    #[derive(Default)]
    struct Slow {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl SpeechSynthesizer for Slow {
        fn synthesize(
            &self,
            request: SynthesisRequest,
        ) -> BoxFuture<'_, Result<SpeechAudio, TtsError>> {
            async move {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                if request.text.contains("fail") {
                    return Err(TtsError::synthesis("rejected"));
                }
                Ok(SpeechAudio::new(1000, vec![0.0; 500]))
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn heuristic_timing_without_a_voice() {
        let p = performer(None);
        let handle = p.perform(&request("Hi there")).await.expect("perform");
        assert_eq!(handle.reconciliation().scale, 1.0);
        assert!(handle.audio_stream().is_none());
        assert_eq!(handle.wait().await, PlaybackOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn voice_audio_drives_the_scale() {
        let p = performer(Some(Arc::new(ToneSynthesizer::new(1000, 100.0))));
        let handle = p
            .perform(&request("Hello <pause:200> world"))
            .await
            .expect("perform");
        let r = handle.reconciliation();
        assert_eq!(r.pause_ms, 200.0);
        let audio_ms = r.audio_ms.expect("audio");
        assert!((r.speech_ms * r.scale + r.pause_ms - audio_ms).abs() < 1e-6);
        assert_eq!(handle.wait().await, PlaybackOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_synthesis_keeps_the_live_session() {
        let p = performer(Some(Arc::new(Slow::default())));
        let running = p.perform(&request("first")).await.expect("first");
        assert!(p.driver().is_playing());

        let err = p.perform(&request("please fail")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Tts(TtsError::Synthesis { .. })));
        assert!(p.driver().is_playing());
        assert_eq!(running.wait().await, PlaybackOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn synthesis_is_one_at_a_time() {
        let slow = Arc::new(Slow::default());
        let p = performer(Some(slow.clone()));
        let (req_one, req_two) = (request("one"), request("two"));
        let (a, b) = tokio::join!(p.perform(&req_one), p.perform(&req_two));
        let (a, b) = (a.expect("a"), b.expect("b"));
        assert_eq!(slow.max_in_flight.load(Ordering::SeqCst), 1);

        let outcomes = [a.wait().await, b.wait().await];
        assert!(outcomes.contains(&PlaybackOutcome::Cancelled));
        assert!(outcomes.contains(&PlaybackOutcome::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_bridge_forwards_speaking_changes() {
        let (face_tx, face_rx) = watch::channel(FaceState::default());
        let (idle_tx, mut idle_rx) = mpsc::channel(8);
        let bridge = spawn_idle_bridge(face_rx, idle_tx);

        assert_eq!(idle_rx.recv().await, Some(IdleCommand::SetAnimating(false)));
        face_tx.send_modify(|s| s.animating = true);
        assert_eq!(idle_rx.recv().await, Some(IdleCommand::SetAnimating(true)));
        face_tx.send_modify(|s| s.squash = 1.2);
        face_tx.send_modify(|s| s.animating = false);
        assert_eq!(idle_rx.recv().await, Some(IdleCommand::SetAnimating(false)));

        drop(face_tx);
        bridge.await.expect("bridge ends with the face channel");
    }
}
