use crate::script::{build_segments, strip_tags, Segment};
use crate::tts::{
    silence_len, SpeechAudio, SpeechSynthesizer, SynthesisRequest, SynthesisSettings, TtsError,
    DEFAULT_SAMPLE_RATE_HZ,
};

const LOG_TARGET: &str = "tts::segmented";

/// Synthesizes a tagged script one segment at a time and concatenates the
/// result. Pauses become silence at the output rate, so the audio carries
/// exactly the pause time the timeline authors.
///
/// The output rate is the synthesizer's advertised rate, else the rate of
/// its first chunk. Pauses that come before that chunk are held back until
/// the rate is known, and chunks at any other rate are resampled to it.
pub async fn synthesize_script<S>(
    synth: &S,
    script: &str,
    base: SynthesisSettings,
) -> Result<SpeechAudio, TtsError>
where
    S: SpeechSynthesizer + ?Sized,
{
    let mut sample_rate_hz = synth.sample_rate_hz();
    let mut held_pauses: Vec<f64> = Vec::new();
    let mut samples = Vec::new();

    for segment in build_segments(script) {
        match segment {
            Segment::Text { text, speed } => {
                let request = SynthesisRequest {
                    text,
                    settings: SynthesisSettings {
                        length_scale: base.length_scale / speed,
                        ..base
                    },
                };
                let chunk = synth.synthesize(request).await?;
                let rate = *sample_rate_hz.get_or_insert(chunk.sample_rate_hz);
                for ms in held_pauses.drain(..) {
                    push_silence(&mut samples, ms, rate);
                }
                if chunk.sample_rate_hz == rate {
                    samples.extend(chunk.samples);
                } else {
                    tracing::warn!(
                        target: LOG_TARGET,
                        from = chunk.sample_rate_hz,
                        to = rate,
                        "resampling segment to the script's output rate"
                    );
                    samples.extend(resample_linear(&chunk.samples, chunk.sample_rate_hz, rate));
                }
            }
            Segment::Pause { duration_ms } => match sample_rate_hz {
                Some(rate) => push_silence(&mut samples, duration_ms, rate),
                None => held_pauses.push(duration_ms),
            },
            Segment::Emotion { .. } => {}
        }
    }

    let rate = sample_rate_hz.unwrap_or(DEFAULT_SAMPLE_RATE_HZ);
    for ms in held_pauses {
        push_silence(&mut samples, ms, rate);
    }
    Ok(SpeechAudio::new(rate, samples))
}

fn push_silence(samples: &mut Vec<f32>, duration_ms: f64, sample_rate_hz: u32) {
    let len = silence_len(duration_ms, sample_rate_hz);
    samples.resize(samples.len() + len, 0.0);
}

/// Linear-interpolation resample that keeps the clip's duration.
fn resample_linear(samples: &[f32], from_hz: u32, to_hz: u32) -> Vec<f32> {
    if from_hz == 0 || samples.is_empty() {
        return Vec::new();
    }
    let ratio = f64::from(from_hz) / f64::from(to_hz);
    let out_len = (samples.len() as f64 / ratio).round() as usize;
    let last = samples.len() - 1;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64).clamp(0.0, 1.0) as f32;
            samples[idx] + (samples[next] - samples[idx]) * frac
        })
        .collect()
}

/// Synthesizes a script's spoken text in one request, ignoring its tags.
pub async fn synthesize_text<S>(
    synth: &S,
    script: &str,
    settings: SynthesisSettings,
) -> Result<SpeechAudio, TtsError>
where
    S: SpeechSynthesizer + ?Sized,
{
    synth
        .synthesize(SynthesisRequest {
            text: strip_tags(script),
            settings,
        })
        .await
}
