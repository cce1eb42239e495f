//! Fits heuristic frame timing to real audio: pauses keep their authored
//! length, speech frames share whatever audio time is left.

use crate::timeline::{pause_total_ms, speech_total_ms, AnimationFrame};
use crate::tts::SpeechAudio;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Reconciliation {
    /// `S`
    pub speech_ms: f64,
    /// `P`
    pub pause_ms: f64,
    /// `D`, when audio was supplied.
    pub audio_ms: Option<f64>,
    /// `k`
    pub scale: f64,
}

pub fn reconcile(frames: &[AnimationFrame], audio_ms: Option<f64>) -> Reconciliation {
    let pause_ms = pause_total_ms(frames);
    let speech_ms = speech_total_ms(frames);
    let scale = match audio_ms {
        Some(d) if d - pause_ms > 0.0 && speech_ms > 0.0 => (d - pause_ms) / speech_ms,
        _ => 1.0,
    };
    Reconciliation {
        speech_ms,
        pause_ms,
        audio_ms,
        scale,
    }
}

/// How long `frame` is held under scale factor `scale`.
pub fn scheduled_ms(frame: &AnimationFrame, scale: f64) -> f64 {
    if frame.is_pause() {
        frame.duration_ms()
    } else {
        frame.duration_ms() * scale
    }
}

/// One play invocation: frames, optional audio, the derived scale and a
/// cursor.
#[derive(Clone, Debug)]
pub struct PlaybackSession {
    frames: Vec<AnimationFrame>,
    audio: Option<Arc<SpeechAudio>>,
    reconciliation: Reconciliation,
    cursor: usize,
}

impl PlaybackSession {
    pub fn new(frames: Vec<AnimationFrame>, audio: Option<Arc<SpeechAudio>>) -> Self {
        let audio_ms = audio.as_deref().map(SpeechAudio::duration_ms);
        let reconciliation = reconcile(&frames, audio_ms);
        Self {
            frames,
            audio,
            reconciliation,
            cursor: 0,
        }
    }

    pub fn reconciliation(&self) -> Reconciliation {
        self.reconciliation
    }

    pub fn scale(&self) -> f64 {
        self.reconciliation.scale
    }

    pub fn audio(&self) -> Option<&Arc<SpeechAudio>> {
        self.audio.as_ref()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn scheduled_durations_ms(&self) -> Vec<f64> {
        self.frames
            .iter()
            .map(|f| scheduled_ms(f, self.scale()))
            .collect()
    }

    /// Next frame with how long to hold it.
    pub fn advance(&mut self) -> Option<(&AnimationFrame, Duration)> {
        let frame = self.frames.get(self.cursor)?;
        self.cursor += 1;
        let ms = scheduled_ms(frame, self.reconciliation.scale).max(0.0);
        Some((frame, Duration::from_nanos((ms * 1e6).round() as u64)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::Viseme;

    fn speech(ms: f64) -> AnimationFrame {
        AnimationFrame::Speech {
            viseme: Viseme::Open,
            duration_ms: ms,
            squash: 1.0,
            brow_jump: 0.0,
            intensity: 1.0,
        }
    }

    fn pause(ms: f64) -> AnimationFrame {
        AnimationFrame::Pause { duration_ms: ms }
    }

    fn switch(ms: f64) -> AnimationFrame {
        AnimationFrame::ExpressionSwitch {
            expression: "joy".to_owned(),
            duration_ms: ms,
            squash: 1.0,
            brow_jump: 0.0,
        }
    }

    #[test]
    fn speech_stretches_to_fill_audio_and_pauses_stay_literal() {
        let frames = vec![speech(300.0), pause(200.0), speech(500.0), switch(200.0)];
        let r = reconcile(&frames, Some(1800.0));
        assert_eq!(r.speech_ms, 1000.0);
        assert_eq!(r.pause_ms, 200.0);
        assert!((r.scale - 1.6).abs() < 1e-12);

        let audio = Arc::new(SpeechAudio::new(1000, vec![0.0; 1800]));
        let session = PlaybackSession::new(frames, Some(audio));
        let scheduled = session.scheduled_durations_ms();
        let expected = [480.0, 200.0, 800.0, 320.0];
        for (got, want) in scheduled.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
        assert!((scheduled.iter().sum::<f64>() - 1800.0).abs() < 1e-9);
    }

    #[test]
    fn no_audio_means_unit_scale() {
        assert_eq!(reconcile(&[speech(100.0)], None).scale, 1.0);
    }

    #[test]
    fn degenerate_durations_fall_back_to_unit_scale() {
        // audio no longer than the pauses
        assert_eq!(reconcile(&[speech(100.0), pause(500.0)], Some(400.0)).scale, 1.0);
        // nothing to stretch
        assert_eq!(reconcile(&[pause(500.0)], Some(900.0)).scale, 1.0);
        assert_eq!(reconcile(&[], Some(900.0)).scale, 1.0);
    }

    #[test]
    fn compresses_when_audio_is_short() {
        let r = reconcile(&[speech(1000.0), pause(100.0)], Some(600.0));
        assert!((r.scale - 0.5).abs() < 1e-12);
    }

    #[test]
    fn advance_walks_every_frame_once() {
        let mut session = PlaybackSession::new(vec![speech(100.0), pause(50.0)], None);
        let (f, d) = session.advance().expect("first");
        assert!(!f.is_pause());
        assert_eq!(d, Duration::from_millis(100));
        let (f, d) = session.advance().expect("second");
        assert!(f.is_pause());
        assert_eq!(d, Duration::from_millis(50));
        assert!(session.advance().is_none());
        assert_eq!(session.cursor(), 2);
    }
}
