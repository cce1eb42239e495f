//! Timeline playback against optional audio: reconciliation, the session
//! driver, live volume and audio output.

mod audio;
mod driver;
mod null;
mod reconcile;
mod volume;

use crate::tts::SpeechAudio;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use audio::RodioOutput;
pub use driver::{PlaybackDriver, PlaybackHandle};
pub use null::NullAudioOutput;
pub use reconcile::{reconcile, scheduled_ms, PlaybackSession, Reconciliation};
pub use volume::{LiveVolume, VolumeAnalyser, FFT_SIZE, VOLUME_SAMPLE_INTERVAL};

#[cfg(feature = "playback-device-enum")]
pub use audio::enumerate_output_device_names;

#[derive(thiserror::Error, Debug)]
pub enum PlaybackError {
    #[error("audio output unavailable: {details}")]
    AudioOutputUnavailable { details: String },
}

/// How a session ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackOutcome {
    Completed,
    Cancelled,
}

/// Audio currently sounding. Stopping is idempotent and also happens on drop.
pub struct PlayingAudio {
    stop: Option<Box<dyn FnOnce() + Send>>,
}

impl PlayingAudio {
    pub fn new(stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            stop: Some(Box::new(stop)),
        }
    }

    pub fn silent() -> Self {
        Self { stop: None }
    }

    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

impl Drop for PlayingAudio {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PlayingAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayingAudio")
            .field("active", &self.stop.is_some())
            .finish()
    }
}

pub trait AudioOutput: Send + Sync {
    fn start(&self, audio: Arc<SpeechAudio>) -> Result<PlayingAudio, PlaybackError>;
}

/// The audio a live session is sounding and when it started, for recorders
/// that mux it with captured frames.
#[derive(Clone, Debug)]
pub struct AudioStreamHandle {
    pub audio: Arc<SpeechAudio>,
    pub started_at: tokio::time::Instant,
}
