use crate::tts::{
    SpeechAudio, SpeechSynthesizer, SynthesisRequest, SynthesisSettings, TtsError,
    DEFAULT_NOISE_SCALE, DEFAULT_NOISE_W_SCALE, DEFAULT_SAMPLE_RATE_HZ,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const LOG_TARGET: &str = "tts::piper";
const WAV_HEADER_BYTES: usize = 44;

/// Phoneme symbol to model ids. Voice configs store either one id or a list
/// per symbol; both load as a list.
pub type PhonemeIdMap = BTreeMap<String, Vec<i64>>;

#[derive(Deserialize)]
#[serde(untagged)]
enum PhonemeIds {
    One(i64),
    Many(Vec<i64>),
}

impl From<PhonemeIds> for Vec<i64> {
    fn from(ids: PhonemeIds) -> Self {
        match ids {
            PhonemeIds::One(id) => vec![id],
            PhonemeIds::Many(ids) => ids,
        }
    }
}

fn normalize_id_map<'de, D>(de: D) -> Result<PhonemeIdMap, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, PhonemeIds>::deserialize(de)?;
    Ok(raw.into_iter().map(|(k, v)| (k, v.into())).collect())
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
struct AudioSection {
    sample_rate: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
struct InferenceSection {
    noise_scale: Option<f64>,
    length_scale: Option<f64>,
    noise_w: Option<f64>,
}

/// The `<model>.json` file that ships next to a Piper voice.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct VoiceModelConfig {
    #[serde(default)]
    audio: AudioSection,
    #[serde(default)]
    inference: InferenceSection,
    #[serde(default)]
    pub num_speakers: u32,
    #[serde(default, deserialize_with = "normalize_id_map")]
    pub phoneme_id_map: PhonemeIdMap,
}

impl VoiceModelConfig {
    pub fn from_json(json: &str) -> Result<Self, TtsError> {
        serde_json::from_str(json)
            .map_err(|e| TtsError::synthesis(format!("invalid voice config: {e}")))
    }

    /// Reads `<model path>.json`.
    pub async fn load(model_path: &Path) -> Result<Self, TtsError> {
        let mut path = model_path.as_os_str().to_owned();
        path.push(".json");
        let json = tokio::fs::read_to_string(PathBuf::from(path)).await?;
        Self::from_json(&json)
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.audio.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE_HZ)
    }

    /// The voice's `inference` section, falling back to the stock Piper
    /// values for anything it leaves out.
    pub fn default_settings(&self) -> SynthesisSettings {
        let inference = &self.inference;
        SynthesisSettings {
            length_scale: inference.length_scale.unwrap_or(1.0),
            noise_scale: inference.noise_scale.unwrap_or(DEFAULT_NOISE_SCALE),
            noise_w_scale: inference.noise_w.unwrap_or(DEFAULT_NOISE_W_SCALE),
            speaker_id: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PiperSynthesizer {
    piper_binary: PathBuf,
    model_path: PathBuf,
    voice: VoiceModelConfig,
}

impl PiperSynthesizer {
    #[must_use]
    pub fn new(piper_binary: PathBuf, model_path: PathBuf, voice: VoiceModelConfig) -> Self {
        Self {
            piper_binary,
            model_path,
            voice,
        }
    }

    /// Loads the voice config beside the model. A missing config falls back
    /// to defaults.
    pub async fn load(piper_binary: PathBuf, model_path: PathBuf) -> Result<Self, TtsError> {
        let voice = match VoiceModelConfig::load(&model_path).await {
            Ok(voice) => voice,
            Err(TtsError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    target: LOG_TARGET,
                    model = %model_path.display(),
                    "voice config not found, assuming {DEFAULT_SAMPLE_RATE_HZ} Hz"
                );
                VoiceModelConfig::default()
            }
            Err(e) => return Err(e),
        };
        tracing::info!(
            target: LOG_TARGET,
            sample_rate_hz = voice.sample_rate_hz(),
            speakers = voice.num_speakers,
            phonemes = voice.phoneme_id_map.len(),
            "piper voice loaded"
        );
        Ok(Self::new(piper_binary, model_path, voice))
    }

    pub fn voice(&self) -> &VoiceModelConfig {
        &self.voice
    }

    fn command(&self, request: &SynthesisRequest) -> Command {
        let s = &request.settings;
        let mut cmd = Command::new(&self.piper_binary);
        cmd.arg("--model")
            .arg(&self.model_path)
            .arg("--output_raw")
            .arg("--length_scale")
            .arg(s.length_scale.to_string())
            .arg("--noise_scale")
            .arg(s.noise_scale.to_string())
            .arg("--noise_w")
            .arg(s.noise_w_scale.to_string());
        if self.voice.num_speakers > 1 {
            cmd.arg("--speaker").arg(s.speaker_id.to_string());
        }
        cmd.stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        cmd
    }
}

/// Raw i16 LE PCM (optionally WAV-wrapped) to `[-1, 1]` floats.
fn decode_pcm(raw: &[u8]) -> Vec<f32> {
    let pcm = if raw.len() > WAV_HEADER_BYTES && &raw[..4] == b"RIFF" {
        &raw[WAV_HEADER_BYTES..]
    } else {
        raw
    };
    pcm.chunks_exact(2)
        .map(|c| f32::from(i16::from_le_bytes([c[0], c[1]])) / 32768.0)
        .collect()
}

impl SpeechSynthesizer for PiperSynthesizer {
    fn synthesize(
        &self,
        request: SynthesisRequest,
    ) -> BoxFuture<'_, Result<SpeechAudio, TtsError>> {
        async move {
            let mut child = self.command(&request).spawn().map_err(|e| {
                let path = self.piper_binary.display();
                TtsError::synthesis(format!("failed to spawn piper at {path}: {e}"))
            })?;

            {
                let stdin = child
                    .stdin
                    .as_mut()
                    .ok_or_else(|| TtsError::synthesis("failed to open piper stdin"))?;
                stdin.write_all(request.text.as_bytes()).await?;
            }
            child.stdin.take();

            let output = child.wait_with_output().await?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let status = output.status;
                return Err(TtsError::synthesis(format!(
                    "piper exited with {status}: {stderr}"
                )));
            }

            let samples = decode_pcm(&output.stdout);
            if samples.is_empty() {
                return Err(TtsError::synthesis("piper produced no audio"));
            }
            tracing::debug!(
                target: LOG_TARGET,
                samples = samples.len(),
                chars = request.text.len(),
                "piper segment synthesized"
            );
            Ok(SpeechAudio::new(self.voice.sample_rate_hz(), samples))
        }
        .boxed()
    }

    fn sample_rate_hz(&self) -> Option<u32> {
        Some(self.voice.sample_rate_hz())
    }
}
