//! Speech synthesis contract plus the adapters and segmented synthesis built
//! on it.

mod basic;
mod piper;
mod segmented;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use basic::ToneSynthesizer;
pub use piper::{PhonemeIdMap, PiperSynthesizer, VoiceModelConfig};
pub use segmented::{synthesize_script, synthesize_text};

pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 22050;
pub const DEFAULT_NOISE_SCALE: f64 = 0.667;
pub const DEFAULT_NOISE_W_SCALE: f64 = 0.8;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthesisSettings {
    /// Phoneme duration multiplier; `1 / speed`.
    pub length_scale: f64,
    pub noise_scale: f64,
    pub noise_w_scale: f64,
    pub speaker_id: u32,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            length_scale: 1.0,
            noise_scale: DEFAULT_NOISE_SCALE,
            noise_w_scale: DEFAULT_NOISE_W_SCALE,
            speaker_id: 0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub settings: SynthesisSettings,
}

/// Mono PCM in `[-1, 1]`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SpeechAudio {
    pub sample_rate_hz: u32,
    pub samples: Vec<f32>,
}

impl SpeechAudio {
    pub fn new(sample_rate_hz: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate_hz,
            samples,
        }
    }

    pub fn silence(duration_ms: f64, sample_rate_hz: u32) -> Self {
        Self::new(sample_rate_hz, vec![0.0; silence_len(duration_ms, sample_rate_hz)])
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.samples.len() as f64 * 1000.0 / f64::from(self.sample_rate_hz)
    }
}

/// Sample count for a pause, truncated.
pub fn silence_len(duration_ms: f64, sample_rate_hz: u32) -> usize {
    (duration_ms.max(0.0) / 1000.0 * f64::from(sample_rate_hz)).floor() as usize
}

#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("synthesis failed: {message}")]
    Synthesis { message: String },
    #[error("synthesizer not ready")]
    NotReady,
    #[error("synthesizer io: {0}")]
    Io(#[from] std::io::Error),
}

impl TtsError {
    pub fn synthesis(message: impl Into<String>) -> Self {
        TtsError::Synthesis {
            message: message.into(),
        }
    }
}

pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, request: SynthesisRequest)
        -> BoxFuture<'_, Result<SpeechAudio, TtsError>>;

    /// Output rate, when known before synthesizing anything.
    fn sample_rate_hz(&self) -> Option<u32> {
        None
    }
}

impl<T: SpeechSynthesizer + ?Sized> SpeechSynthesizer for Arc<T> {
    fn synthesize(
        &self,
        request: SynthesisRequest,
    ) -> BoxFuture<'_, Result<SpeechAudio, TtsError>> {
        (**self).synthesize(request)
    }

    fn sample_rate_hz(&self) -> Option<u32> {
        (**self).sample_rate_hz()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_length_truncates() {
        assert_eq!(silence_len(300.0, 22050), 6615);
        assert_eq!(silence_len(1.0, 22050), 22);
        assert_eq!(silence_len(-5.0, 22050), 0);
        assert_eq!(SpeechAudio::silence(500.0, 16000).samples.len(), 8000);
    }

    #[test]
    fn duration_of_audio() {
        let audio = SpeechAudio::new(1000, vec![0.0; 1800]);
        assert_eq!(audio.duration_ms(), 1800.0);
        assert_eq!(SpeechAudio::new(0, vec![0.0; 10]).duration_ms(), 0.0);
    }
}
