//! Recording contract: frames go in while a session plays, one blob comes out
//! on stop.

use crate::face::{FaceRenderer, FaceState};
use crate::idle::GazeState;
use crate::playback::{AudioStreamHandle, LiveVolume, PlaybackHandle, PlaybackOutcome};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

pub const RECORDING_FPS: u32 = 30;

pub trait CaptureSink: Send {
    fn start(&mut self, audio: Option<AudioStreamHandle>);
    fn push_frame(&mut self, svg: String);
    /// The finished recording, or `None` if nothing was started.
    fn stop(&mut self) -> Option<Vec<u8>>;
}

#[derive(Serialize)]
struct AudioTrack {
    sample_rate_hz: u32,
    samples: usize,
    duration_ms: f64,
}

#[derive(Serialize)]
struct Recording<'a> {
    fps: u32,
    audio: Option<AudioTrack>,
    frames: &'a [String],
}

/// Keeps SVG frames in memory at a fixed frame rate and serializes them to
/// JSON on stop.
#[derive(Debug, Default)]
pub struct MemoryCapture {
    recording: bool,
    audio: Option<AudioStreamHandle>,
    frames: Vec<String>,
}

impl MemoryCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl CaptureSink for MemoryCapture {
    fn start(&mut self, audio: Option<AudioStreamHandle>) {
        self.recording = true;
        self.audio = audio;
        self.frames.clear();
    }

    fn push_frame(&mut self, svg: String) {
        if self.recording {
            self.frames.push(svg);
        }
    }

    fn stop(&mut self) -> Option<Vec<u8>> {
        if !std::mem::take(&mut self.recording) {
            return None;
        }
        let frames = std::mem::take(&mut self.frames);
        let audio = self.audio.take().map(|h| AudioTrack {
            sample_rate_hz: h.audio.sample_rate_hz,
            samples: h.audio.samples.len(),
            duration_ms: h.audio.duration_ms(),
        });
        let blob = serde_json::to_vec(&Recording {
            fps: RECORDING_FPS,
            audio,
            frames: &frames,
        });
        match blob {
            Ok(blob) => Some(blob),
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize recording");
                None
            }
        }
    }
}

/// What a recorder samples every capture tick.
pub struct FaceFeed {
    pub renderer: FaceRenderer,
    pub face: watch::Receiver<FaceState>,
    pub gaze: watch::Receiver<GazeState>,
    pub volume: LiveVolume,
}

impl FaceFeed {
    pub fn render(&self) -> String {
        let face = self.face.borrow().clone();
        let gaze = *self.gaze.borrow();
        self.renderer.render_svg(&face, self.volume.get(), gaze)
    }
}

/// Captures rendered frames at [`RECORDING_FPS`] until the session ends.
pub async fn record_session<C: CaptureSink + ?Sized>(
    handle: PlaybackHandle,
    feed: &FaceFeed,
    capture: &mut C,
) -> (PlaybackOutcome, Option<Vec<u8>>) {
    capture.start(handle.audio_stream().cloned());
    let mut ticker = tokio::time::interval(Duration::from_secs(1) / RECORDING_FPS);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let done = handle.wait();
    tokio::pin!(done);
    let outcome = loop {
        tokio::select! {
            outcome = &mut done => break outcome,
            _ = ticker.tick() => capture.push_frame(feed.render()),
        }
    };
    // settled pose
    capture.push_frame(feed.render());
    (outcome, capture.stop())
}
