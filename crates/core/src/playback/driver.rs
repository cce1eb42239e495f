use crate::face::FaceState;
use crate::playback::reconcile::{PlaybackSession, Reconciliation};
use crate::playback::volume::{LiveVolume, VolumeAnalyser, VOLUME_SAMPLE_INTERVAL};
use crate::playback::{
    AudioOutput, AudioStreamHandle, PlaybackError, PlaybackOutcome, PlayingAudio,
};
use crate::timeline::AnimationFrame;
use crate::tts::SpeechAudio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const LOG_TARGET: &str = "playback::driver";

struct ActiveSession {
    id: u64,
    cancelled: Arc<AtomicBool>,
    frame_task: JoinHandle<()>,
    volume_task: Option<JoinHandle<()>>,
    audio: Option<PlayingAudio>,
    done: oneshot::Sender<PlaybackOutcome>,
}

struct DriverInner {
    output: Arc<dyn AudioOutput>,
    face: watch::Sender<FaceState>,
    volume: LiveVolume,
    active: Mutex<Option<ActiveSession>>,
    next_id: AtomicU64,
}

impl DriverInner {
    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        match self.active.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!(target: LOG_TARGET, "session lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn teardown(&self, mut session: ActiveSession, outcome: PlaybackOutcome) {
        session.cancelled.store(true, Ordering::Release);
        session.frame_task.abort();
        if let Some(task) = session.volume_task.take() {
            task.abort();
        }
        if let Some(mut audio) = session.audio.take() {
            audio.stop();
        }
        self.volume.set(0.0);
        self.face.send_modify(FaceState::settle);
        let _ = session.done.send(outcome);
        tracing::info!(target: LOG_TARGET, session = session.id, ?outcome, "session ended");
    }

    /// Natural end of session `id`; a no-op if it was already replaced or
    /// stopped.
    fn finish(&self, id: u64) {
        let session = {
            let mut active = self.lock_active();
            match active.as_ref() {
                Some(s) if s.id == id => active.take(),
                _ => None,
            }
        };
        if let Some(session) = session {
            self.teardown(session, PlaybackOutcome::Completed);
        }
    }
}

/// Plays one animation session at a time, publishing the face state each
/// frame and the live volume while audio sounds.
#[derive(Clone)]
pub struct PlaybackDriver {
    inner: Arc<DriverInner>,
}

impl PlaybackDriver {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        let (face, _) = watch::channel(FaceState::default());
        Self {
            inner: Arc::new(DriverInner {
                output,
                face,
                volume: LiveVolume::default(),
                active: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FaceState> {
        self.inner.face.subscribe()
    }

    pub fn face(&self) -> FaceState {
        self.inner.face.borrow().clone()
    }

    pub fn volume(&self) -> LiveVolume {
        self.inner.volume.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock_active().is_some()
    }

    /// Switches the resting expression outside of any script.
    pub fn set_expression(&self, name: &str) {
        self.inner
            .face
            .send_modify(|s| s.expression = name.to_owned());
    }

    /// Starts a session, cancelling any live one first. With audio the frame
    /// timing is reconciled to its length and the audio starts immediately.
    /// Must be called within a tokio runtime.
    pub fn play(
        &self,
        frames: Vec<AnimationFrame>,
        audio: Option<SpeechAudio>,
    ) -> Result<PlaybackHandle, PlaybackError> {
        let inner = &self.inner;
        let mut active = inner.lock_active();
        if let Some(prev) = active.take() {
            inner.teardown(prev, PlaybackOutcome::Cancelled);
        }

        let audio = audio.map(Arc::new);
        let session = PlaybackSession::new(frames, audio.clone());
        let reconciliation = session.reconciliation();
        let playing = audio
            .as_ref()
            .map(|a| inner.output.start(Arc::clone(a)))
            .transpose()?;

        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        let started_at = Instant::now();
        let cancelled = Arc::new(AtomicBool::new(false));
        let (done, outcome) = oneshot::channel();

        tracing::info!(
            target: LOG_TARGET,
            session = id,
            frames = session.len(),
            scale = reconciliation.scale,
            audio_ms = ?reconciliation.audio_ms,
            "session started"
        );
        inner.face.send_modify(|s| s.animating = true);

        let frame_task = tokio::spawn(run_frames(
            Arc::clone(inner),
            id,
            session,
            started_at,
            Arc::clone(&cancelled),
        ));
        let volume_task = audio.as_ref().map(|a| {
            tokio::spawn(track_volume(
                Arc::clone(a),
                started_at,
                inner.volume.clone(),
                Arc::clone(&cancelled),
            ))
        });

        *active = Some(ActiveSession {
            id,
            cancelled,
            frame_task,
            volume_task,
            audio: playing,
            done,
        });

        Ok(PlaybackHandle {
            id,
            outcome,
            reconciliation,
            audio_stream: audio.map(|audio| AudioStreamHandle { audio, started_at }),
        })
    }

    /// Cancels the live session. Returns whether there was one.
    pub fn stop(&self) -> bool {
        let session = self.inner.lock_active().take();
        match session {
            Some(session) => {
                self.inner.teardown(session, PlaybackOutcome::Cancelled);
                true
            }
            None => false,
        }
    }
}

/// Publishes `frame` unless the session was cancelled. The check runs under
/// the watch lock so a teardown's `settle` is never overwritten.
fn enter_if_live(
    face: &watch::Sender<FaceState>,
    cancelled: &AtomicBool,
    frame: &AnimationFrame,
) -> bool {
    face.send_if_modified(|s| {
        if cancelled.load(Ordering::Acquire) {
            return false;
        }
        s.enter(frame);
        true
    })
}

/// Each frame ends on a deadline measured from `started_at`, so timer
/// lateness does not accumulate against the audio.
async fn run_frames(
    inner: Arc<DriverInner>,
    id: u64,
    mut session: PlaybackSession,
    started_at: Instant,
    cancelled: Arc<AtomicBool>,
) {
    let mut deadline = started_at;
    while let Some((frame, hold)) = session.advance() {
        tracing::debug!(
            target: LOG_TARGET,
            session = id,
            viseme = frame.viseme().as_str(),
            pause = frame.is_pause(),
            hold_ms = hold.as_secs_f64() * 1000.0,
            "frame"
        );
        if !enter_if_live(&inner.face, &cancelled, frame) {
            return;
        }
        deadline += hold;
        tokio::time::sleep_until(deadline).await;
    }
    if !cancelled.load(Ordering::Acquire) {
        inner.finish(id);
    }
}

async fn track_volume(
    audio: Arc<SpeechAudio>,
    started_at: Instant,
    volume: LiveVolume,
    cancelled: Arc<AtomicBool>,
) {
    let mut analyser = VolumeAnalyser::new();
    let mut ticker = tokio::time::interval(VOLUME_SAMPLE_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let rate = f64::from(audio.sample_rate_hz);

    loop {
        ticker.tick().await;
        if cancelled.load(Ordering::Acquire) {
            return;
        }
        let position = (started_at.elapsed().as_secs_f64() * rate) as usize;
        if position >= audio.samples.len() {
            break;
        }
        volume.set(analyser.volume(&audio.samples, position));
    }
    volume.set(0.0);
}

/// Caller's side of a session.
#[derive(Debug)]
pub struct PlaybackHandle {
    id: u64,
    outcome: oneshot::Receiver<PlaybackOutcome>,
    reconciliation: Reconciliation,
    audio_stream: Option<AudioStreamHandle>,
}

impl PlaybackHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn reconciliation(&self) -> Reconciliation {
        self.reconciliation
    }

    /// Present when the session is sounding audio.
    pub fn audio_stream(&self) -> Option<&AudioStreamHandle> {
        self.audio_stream.as_ref()
    }

    /// Resolves once, when the session completes or is cancelled.
    pub async fn wait(self) -> PlaybackOutcome {
        self.outcome.await.unwrap_or(PlaybackOutcome::Cancelled)
    }
}
