use crate::emotion::ShapeSource;
use crate::face::{DEFAULT_EYE_SIZE, DEFAULT_EYE_SPACING};
use crate::timeline::TimelineOptions;
use crate::tts::SynthesisSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_EXPRESSIVENESS: f64 = 0.5;
pub const DEFAULT_ANIMATION_SPEED: f64 = 1.0;
pub const DEFAULT_TEETH_GAP: f64 = 0.5;
pub const DEFAULT_PIPER_BINARY: &str = "piper";
pub const ENV_PIPER_BINARY: &str = "PROTOFACE_PIPER_BINARY";
pub const ENV_VOICE_MODEL: &str = "PROTOFACE_VOICE_MODEL";

/// 0 is restrained, 1 is cartoonish.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "f64", into = "f64")]
pub struct Expressiveness(f64);

impl Expressiveness {
    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::ExpressivenessOutOfRange(value));
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> f64 {
        self.0
    }
}

impl Default for Expressiveness {
    fn default() -> Self {
        Self(DEFAULT_EXPRESSIVENESS)
    }
}

impl TryFrom<f64> for Expressiveness {
    type Error = ConfigError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Expressiveness> for f64 {
    fn from(v: Expressiveness) -> Self {
        v.0
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "f64", into = "f64")]
pub struct AnimationSpeed(f64);

impl AnimationSpeed {
    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if !(value.is_finite() && value > 0.0) {
            return Err(ConfigError::NonPositiveSpeed(value));
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> f64 {
        self.0
    }
}

impl Default for AnimationSpeed {
    fn default() -> Self {
        Self(DEFAULT_ANIMATION_SPEED)
    }
}

impl TryFrom<f64> for AnimationSpeed {
    type Error = ConfigError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AnimationSpeed> for f64 {
    fn from(v: AnimationSpeed) -> Self {
        v.0
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnimationConfig {
    pub speed: AnimationSpeed,
    pub expressiveness: Expressiveness,
}

impl AnimationConfig {
    pub fn timeline_options(&self) -> TimelineOptions {
        TimelineOptions {
            speed: self.speed.get(),
            expressiveness: self.expressiveness.get(),
        }
    }
}

/// Whole-face placement in view-box units; `squash` from the timeline is
/// applied on top of `scale` vertically.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FaceTransform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub rotate_deg: f64,
}

impl Default for FaceTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            rotate_deg: 0.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FaceConfig {
    pub teeth_gap: f64,
    pub eye_spacing: f64,
    pub eye_size: f64,
    /// Horizontal mouth scale on top of the fixed mouth scale.
    pub mouth_width: f64,
    pub transform: FaceTransform,
    pub shape: ShapeSource,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            teeth_gap: DEFAULT_TEETH_GAP,
            eye_spacing: DEFAULT_EYE_SPACING,
            eye_size: DEFAULT_EYE_SIZE,
            mouth_width: 1.0,
            transform: FaceTransform::default(),
            shape: ShapeSource::default(),
        }
    }
}

impl FaceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dims = [
            ("eye_size", self.eye_size),
            ("eye_spacing", self.eye_spacing),
            ("mouth_width", self.mouth_width),
            ("transform.scale", self.transform.scale),
        ];
        for (field, value) in dims {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositiveDimension { field, value });
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoiceConfig {
    pub piper_binary: PathBuf,
    pub model_path: PathBuf,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub face: FaceConfig,
    pub animation: AnimationConfig,
    pub synthesis: SynthesisSettings,
    /// `None` animates from the heuristic timeline alone.
    pub voice: Option<VoiceConfig>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("expressiveness must be within 0..=1, got {0}")]
    ExpressivenessOutOfRange(f64),
    #[error("animation speed must be > 0, got {0}")]
    NonPositiveSpeed(f64),
    #[error("{field} must be > 0, got {value}")]
    NonPositiveDimension { field: &'static str, value: f64 },
    #[error("invalid config: {0}")]
    Parse(String),
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn resolve_optional_string(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Option<String> {
    match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key),
    }
}

/// A voice is configured only when a model path is known from the CLI or
/// the environment.
pub fn resolve_voice(
    cli_binary: Option<String>,
    cli_model: Option<String>,
    env: &impl Env,
) -> Option<VoiceConfig> {
    let model = resolve_optional_string(cli_model, ENV_VOICE_MODEL, env)?;
    let binary =
        resolve_string_with_default(cli_binary, ENV_PIPER_BINARY, env, DEFAULT_PIPER_BINARY);
    Some(VoiceConfig {
        piper_binary: PathBuf::from(binary),
        model_path: PathBuf::from(model),
    })
}
