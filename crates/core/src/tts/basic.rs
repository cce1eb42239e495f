use crate::tts::{SpeechAudio, SpeechSynthesizer, SynthesisRequest, TtsError};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::f32::consts::PI;

const TONE_MS_PER_CHAR: f64 = 60.0;
const MIN_TONE_MS: f64 = 200.0;
const SYLLABLE_HZ: f32 = 4.0;
const AMPLITUDE: f32 = 0.4;

/// Offline stand-in voice: a syllable-modulated tone whose length follows
/// the text and `length_scale`.
#[derive(Clone, Debug)]
pub struct ToneSynthesizer {
    sample_rate_hz: u32,
    frequency_hz: f32,
}

impl ToneSynthesizer {
    pub fn new(sample_rate_hz: u32, frequency_hz: f32) -> Self {
        Self {
            sample_rate_hz,
            frequency_hz,
        }
    }

    fn render(&self, request: &SynthesisRequest) -> SpeechAudio {
        let chars = request.text.chars().filter(|c| !c.is_whitespace()).count();
        let duration_ms =
            (chars as f64 * TONE_MS_PER_CHAR * request.settings.length_scale).max(MIN_TONE_MS);
        let len = crate::tts::silence_len(duration_ms, self.sample_rate_hz);
        let rate = self.sample_rate_hz as f32;

        let samples = (0..len)
            .map(|i| {
                let t = i as f32 / rate;
                let envelope = (PI * SYLLABLE_HZ * t).sin().abs();
                AMPLITUDE * envelope * (2.0 * PI * self.frequency_hz * t).sin()
            })
            .collect();
        SpeechAudio::new(self.sample_rate_hz, samples)
    }
}

impl Default for ToneSynthesizer {
    fn default() -> Self {
        Self::new(crate::tts::DEFAULT_SAMPLE_RATE_HZ, 220.0)
    }
}

impl SpeechSynthesizer for ToneSynthesizer {
    fn synthesize(
        &self,
        request: SynthesisRequest,
    ) -> BoxFuture<'_, Result<SpeechAudio, TtsError>> {
        async move {
            if request.text.trim().is_empty() {
                return Err(TtsError::synthesis("nothing to say"));
            }
            Ok(self.render(&request))
        }
        .boxed()
    }

    fn sample_rate_hz(&self) -> Option<u32> {
        Some(self.sample_rate_hz)
    }
}
