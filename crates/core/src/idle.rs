//! Autonomous blinking and gaze saccades.
//!
//! [`IdleBehavior`] is a pure state machine stepped with an explicit clock
//! (time since some fixed origin); [`spawn_idle_loop`] drives it on tokio.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub const BLINK_PULSE: Duration = Duration::from_millis(150);
pub const BLINK_INTERVAL_MS: Range<u64> = 3000..5000;
pub const SACCADE_INTERVAL_MS: Range<u64> = 2000..5000;
const SACCADE_REACH_X: f64 = 1.0;
const SACCADE_REACH_Y: f64 = 0.5;

/// Look direction, roughly `[-1, 1]` on each axis.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Gaze {
    pub x: f64,
    pub y: f64,
}

impl Gaze {
    pub const CENTER: Gaze = Gaze { x: 0.0, y: 0.0 };
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GazeState {
    pub look: Gaze,
    pub blinking: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IdleEvent {
    BlinkStarted,
    BlinkEnded,
    Looked(Gaze),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IdleCommand {
    SetAnimating(bool),
    SetTarget(Option<Gaze>),
}

pub struct IdleBehavior<R> {
    rng: R,
    state: GazeState,
    animating: bool,
    target: Option<Gaze>,
    next_blink: Option<Duration>,
    blink_ends: Option<Duration>,
    next_saccade: Option<Duration>,
}

impl<R: Rng> IdleBehavior<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            state: GazeState::default(),
            animating: false,
            target: None,
            next_blink: None,
            blink_ends: None,
            next_saccade: None,
        }
    }

    pub fn state(&self) -> GazeState {
        self.state
    }

    pub fn is_animating(&self) -> bool {
        self.animating
    }

    fn roll(&mut self, window: Range<u64>) -> Duration {
        Duration::from_millis(self.rng.random_range(window))
    }

    pub fn set_animating(&mut self, animating: bool, now: Duration) {
        if animating == self.animating {
            return;
        }
        self.animating = animating;

        if animating {
            self.next_blink = Some(now + self.roll(BLINK_INTERVAL_MS));
            if self.target.is_none() {
                self.next_saccade = Some(now + self.roll(SACCADE_INTERVAL_MS));
            }
        } else {
            self.next_blink = None;
            self.blink_ends = None;
            self.next_saccade = None;
            self.state.blinking = false;
            self.state.look = self.target.unwrap_or(Gaze::CENTER);
        }
    }

    /// An explicit target pins the look and suspends saccades; blinking
    /// carries on. Clearing it recentres the eyes.
    pub fn set_target(&mut self, target: Option<Gaze>, now: Duration) {
        self.target = target;
        match target {
            Some(t) => {
                self.state.look = t;
                self.next_saccade = None;
            }
            None => {
                self.state.look = Gaze::CENTER;
                self.next_saccade = if self.animating {
                    Some(now + self.roll(SACCADE_INTERVAL_MS))
                } else {
                    None
                };
            }
        }
    }

    /// Fires every timer due at `now`.
    pub fn tick(&mut self, now: Duration) -> Vec<IdleEvent> {
        let mut events = Vec::new();

        if self.blink_ends.is_some_and(|t| t <= now) {
            self.blink_ends = None;
            self.state.blinking = false;
            events.push(IdleEvent::BlinkEnded);
        }

        if self.next_blink.is_some_and(|t| t <= now) {
            self.state.blinking = true;
            self.blink_ends = Some(now + BLINK_PULSE);
            self.next_blink = Some(now + self.roll(BLINK_INTERVAL_MS));
            events.push(IdleEvent::BlinkStarted);
        }

        if self.next_saccade.is_some_and(|t| t <= now) {
            let look = Gaze {
                x: (self.rng.random::<f64>() - 0.5) * SACCADE_REACH_X,
                y: (self.rng.random::<f64>() - 0.5) * SACCADE_REACH_Y,
            };
            self.state.look = look;
            self.next_saccade = Some(now + self.roll(SACCADE_INTERVAL_MS));
            events.push(IdleEvent::Looked(look));
        }

        events
    }

    /// Earliest pending timer, if any.
    pub fn next_deadline(&self) -> Option<Duration> {
        [self.blink_ends, self.next_blink, self.next_saccade]
            .into_iter()
            .flatten()
            .min()
    }
}

/// Runs `behavior` until the command channel closes, publishing every state
/// change on `state_tx`.
pub fn spawn_idle_loop<R>(
    mut behavior: IdleBehavior<R>,
    mut commands: mpsc::Receiver<IdleCommand>,
    state_tx: watch::Sender<GazeState>,
) -> JoinHandle<()>
where
    R: Rng + Send + 'static,
{
    tokio::spawn(async move {
        let origin = tokio::time::Instant::now();
        loop {
            let deadline = behavior.next_deadline();
            let sleep = async {
                match deadline {
                    Some(d) => tokio::time::sleep_until(origin + d).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                cmd = commands.recv() => {
                    let now = origin.elapsed();
                    match cmd {
                        Some(IdleCommand::SetAnimating(on)) => behavior.set_animating(on, now),
                        Some(IdleCommand::SetTarget(t)) => behavior.set_target(t, now),
                        None => break,
                    }
                }
                _ = sleep => {
                    let events = behavior.tick(origin.elapsed());
                    if !events.is_empty() {
                        tracing::trace!(?events, "idle behaviour fired");
                    }
                }
            }

            state_tx.send_replace(behavior.state());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn idle() -> IdleBehavior<StdRng> {
        IdleBehavior::new(StdRng::seed_from_u64(7))
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn nothing_happens_while_not_animating() {
        let mut b = idle();
        assert_eq!(b.next_deadline(), None);
        assert!(b.tick(ms(60_000)).is_empty());
        assert_eq!(b.state(), GazeState::default());
    }

    #[test]
    fn blink_is_a_short_pulse_within_the_window() {
        let mut b = idle();
        b.set_animating(true, ms(0));

        assert!(b.tick(ms(2_999)).iter().all(|e| *e != IdleEvent::BlinkStarted));

        let mut t = 3_000;
        while !b.tick(ms(t)).contains(&IdleEvent::BlinkStarted) {
            t += 1;
            assert!(t <= 5_000, "blink never fired");
        }
        assert!(b.state().blinking);
        b.tick(ms(t + 149));
        assert!(b.state().blinking);
        assert!(b.tick(ms(t + 150)).contains(&IdleEvent::BlinkEnded));
        assert!(!b.state().blinking);
    }

    #[test]
    fn saccades_stay_in_range() {
        let mut b = idle();
        b.set_animating(true, ms(0));
        let mut looks = 0;
        for t in (0..60_000).step_by(10) {
            for e in b.tick(ms(t)) {
                if let IdleEvent::Looked(g) = e {
                    assert!((-0.5..0.5).contains(&g.x));
                    assert!((-0.25..0.25).contains(&g.y));
                    looks += 1;
                }
            }
        }
        // one saccade every 2–5 s
        assert!((11..=30).contains(&looks), "{looks}");
    }

    #[test]
    fn target_pins_look_but_keeps_blinking() {
        let mut b = idle();
        b.set_animating(true, ms(0));
        let target = Gaze { x: 0.9, y: -0.4 };
        b.set_target(Some(target), ms(0));

        let mut blinks = 0;
        for t in (0..20_000).step_by(10) {
            for e in b.tick(ms(t)) {
                assert!(!matches!(e, IdleEvent::Looked(_)));
                if e == IdleEvent::BlinkStarted {
                    blinks += 1;
                }
            }
            assert_eq!(b.state().look, target);
        }
        assert!(blinks >= 3);
    }

    #[test]
    fn clearing_target_recentres() {
        let mut b = idle();
        b.set_animating(true, ms(0));
        b.set_target(Some(Gaze { x: 1.0, y: 1.0 }), ms(0));
        b.set_target(None, ms(100));
        assert_eq!(b.state().look, Gaze::CENTER);
        assert!(b.next_deadline().is_some());
    }

    #[test]
    fn stopping_halts_timers_and_recentres() {
        let mut b = idle();
        b.set_animating(true, ms(0));
        for t in (0..10_000).step_by(10) {
            b.tick(ms(t));
        }
        b.set_animating(false, ms(10_000));
        assert_eq!(b.next_deadline(), None);
        assert_eq!(b.state(), GazeState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_loop_publishes_blinks() {
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let (state_tx, mut state_rx) = watch::channel(GazeState::default());
        let handle = spawn_idle_loop(idle(), cmd_rx, state_tx);

        cmd_tx.send(IdleCommand::SetAnimating(true)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        let mut saw_blink = false;
        for _ in 0..2_000 {
            if state_rx.borrow_and_update().blinking {
                saw_blink = true;
                break;
            }
            tokio::time::sleep(ms(5)).await;
        }
        assert!(saw_blink);

        drop(cmd_tx);
        handle.await.unwrap();
    }
}
