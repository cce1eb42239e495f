//! Heuristic viseme timeline: script + speed + expressiveness → frames.

mod visemes;

use crate::script::{lex, Directive, Token, MAX_SPEED, MIN_SPEED};
use serde::{Deserialize, Serialize};

pub use visemes::Viseme;

pub const BASE_PHONEME_MS: f64 = 140.0;
pub const EXPRESSIVENESS_DURATION_MODIFIER: f64 = 40.0;
pub const SPACE_MULTIPLIER: f64 = 1.5;
pub const PUNCTUATION_DURATION_MULTIPLIER: f64 = 0.5;
pub const PUNCTUATION_SQUASH_MULTIPLIER: f64 = 0.2;
pub const PUNCTUATION_BROW_JUMP: f64 = 0.4;
pub const ANTICIPATION_DURATION_RATIO: f64 = 0.3;
pub const ANTICIPATION_THRESHOLD: f64 = 0.6;
pub const OVERSHOOT_THRESHOLD: f64 = 0.8;
pub const EMOTION_ANTICIPATION_THRESHOLD: f64 = 0.1;
pub const EMPHASIS_INTENSITY: f64 = 1.3;
pub const EXPRESSION_SWITCH_MS: f64 = 10.0;

/// One scheduling unit of the visual timeline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnimationFrame {
    Speech {
        viseme: Viseme,
        duration_ms: f64,
        squash: f64,
        brow_jump: f64,
        intensity: f64,
    },
    /// Authored silence; never rescaled during reconciliation.
    Pause { duration_ms: f64 },
    /// Closed mouth that switches the active expression preset.
    ExpressionSwitch {
        expression: String,
        duration_ms: f64,
        squash: f64,
        brow_jump: f64,
    },
}

impl AnimationFrame {
    fn closed(duration_ms: f64, squash: f64) -> Self {
        AnimationFrame::Speech {
            viseme: Viseme::Closed,
            duration_ms,
            squash,
            brow_jump: 0.0,
            intensity: 1.0,
        }
    }

    pub fn duration_ms(&self) -> f64 {
        match self {
            AnimationFrame::Speech { duration_ms, .. }
            | AnimationFrame::Pause { duration_ms }
            | AnimationFrame::ExpressionSwitch { duration_ms, .. } => *duration_ms,
        }
    }

    pub fn is_pause(&self) -> bool {
        matches!(self, AnimationFrame::Pause { .. })
    }

    pub fn viseme(&self) -> Viseme {
        match self {
            AnimationFrame::Speech { viseme, .. } => *viseme,
            AnimationFrame::Pause { .. } | AnimationFrame::ExpressionSwitch { .. } => {
                Viseme::Closed
            }
        }
    }

    pub fn squash(&self) -> f64 {
        match self {
            AnimationFrame::Speech { squash, .. }
            | AnimationFrame::ExpressionSwitch { squash, .. } => *squash,
            AnimationFrame::Pause { .. } => 1.0,
        }
    }

    pub fn brow_jump(&self) -> f64 {
        match self {
            AnimationFrame::Speech { brow_jump, .. }
            | AnimationFrame::ExpressionSwitch { brow_jump, .. } => *brow_jump,
            AnimationFrame::Pause { .. } => 0.0,
        }
    }

    /// Emphasis multiplier on the mouth opening; 1 outside speech.
    pub fn intensity(&self) -> f64 {
        match self {
            AnimationFrame::Speech { intensity, .. } => *intensity,
            AnimationFrame::Pause { .. } | AnimationFrame::ExpressionSwitch { .. } => 1.0,
        }
    }

    pub fn expression(&self) -> Option<&str> {
        match self {
            AnimationFrame::ExpressionSwitch { expression, .. } => Some(expression),
            _ => None,
        }
    }
}

/// Knobs for [`build_timeline`]. `speed` is clamped to the same range as
/// `<speed:x>` tags and `expressiveness` to `[0, 1]`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TimelineOptions {
    pub speed: f64,
    pub expressiveness: f64,
}

impl Default for TimelineOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            expressiveness: 0.5,
        }
    }
}

struct TimelineBuilder {
    frames: Vec<AnimationFrame>,
    base_ms: f64,
    expressiveness: f64,
    speed_modifier: f64,
    emphasis: bool,
}

impl TimelineBuilder {
    fn new(opts: TimelineOptions) -> Self {
        let speed = opts.speed.clamp(MIN_SPEED, MAX_SPEED);
        let expressiveness = opts.expressiveness.clamp(0.0, 1.0);
        Self {
            frames: Vec::new(),
            base_ms: (BASE_PHONEME_MS - expressiveness * EXPRESSIVENESS_DURATION_MODIFIER) / speed,
            expressiveness,
            speed_modifier: 1.0,
            emphasis: false,
        }
    }

    fn emotion(&mut self, name: &str) {
        let e = self.expressiveness;
        if e > EMOTION_ANTICIPATION_THRESHOLD {
            self.frames.push(AnimationFrame::ExpressionSwitch {
                expression: name.to_owned(),
                duration_ms: 40.0 * e,
                squash: 1.0 - 0.15 * e,
                brow_jump: -0.1 * e,
            });
        }
        self.frames.push(AnimationFrame::ExpressionSwitch {
            expression: name.to_owned(),
            duration_ms: EXPRESSION_SWITCH_MS,
            squash: 1.0,
            brow_jump: 0.0,
        });
    }

    fn text(&mut self, text: &str) {
        let chars: Vec<char> = text.to_lowercase().chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c == ' ' {
                let duration = self.base_ms * SPACE_MULTIPLIER / self.speed_modifier;
                self.frames.push(AnimationFrame::closed(duration, 1.0));
                i += 1;
                continue;
            }

            let (viseme, size) = visemes::phoneme_at(&chars, i);
            if let Some(viseme) = viseme {
                let punctuated = matches!(chars.get(i + size), Some('!' | '.' | '?'));
                self.phoneme(c, viseme, punctuated);
            }
            i += size;
        }
    }

    fn phoneme(&mut self, first: char, viseme: Viseme, punctuated: bool) {
        let e = self.expressiveness;
        let mut duration = self.base_ms / self.speed_modifier;

        // Punctuation and emphasis modifiers are mutually exclusive;
        // punctuation takes precedence.
        let (squash, brow_jump) = if punctuated {
            duration *= 1.0 + PUNCTUATION_DURATION_MULTIPLIER * e;
            (
                1.0 + PUNCTUATION_SQUASH_MULTIPLIER * e,
                PUNCTUATION_BROW_JUMP * e,
            )
        } else if self.emphasis {
            (1.0 + 0.15 * e, 0.2 * e)
        } else {
            (1.0 + 0.05 * e, 0.0)
        };
        let intensity = if self.emphasis { EMPHASIS_INTENSITY } else { 1.0 };

        if e > ANTICIPATION_THRESHOLD && matches!(first, 'a' | 'o' | 'u') {
            self.frames.push(AnimationFrame::closed(
                self.base_ms * ANTICIPATION_DURATION_RATIO,
                1.0 - 0.1 * e,
            ));
        }

        self.frames.push(AnimationFrame::Speech {
            viseme,
            duration_ms: duration,
            squash,
            brow_jump,
            intensity,
        });

        if e > OVERSHOOT_THRESHOLD && punctuated {
            self.frames
                .push(AnimationFrame::closed(self.base_ms * 0.5, 0.95));
        }
    }

    fn finish(mut self) -> Vec<AnimationFrame> {
        self.frames
            .push(AnimationFrame::closed(self.base_ms * 2.0, 1.0));
        self.frames
    }
}

/// Builds the visual timeline for a script. The result always ends with a
/// closed-mouth settle frame.
pub fn build_timeline(script: &str, opts: TimelineOptions) -> Vec<AnimationFrame> {
    let mut b = TimelineBuilder::new(opts);

    for token in lex(script) {
        match token {
            Token::Text(text) => b.text(text),
            Token::Tag(tag) => match tag.directive() {
                Directive::Pause { ms } => b.frames.push(AnimationFrame::Pause { duration_ms: ms }),
                Directive::Speed { multiplier } => b.speed_modifier = multiplier,
                Directive::EmphasisStart => b.emphasis = true,
                Directive::EmphasisEnd => b.emphasis = false,
                Directive::Emotion { name } => b.emotion(name),
                Directive::Ignored => {}
            },
        }
    }

    let frames = b.finish();
    tracing::debug!(
        frames = frames.len(),
        speed = opts.speed,
        expressiveness = opts.expressiveness,
        "timeline built"
    );
    frames
}

/// Sum of authored pause durations.
pub fn pause_total_ms(frames: &[AnimationFrame]) -> f64 {
    frames
        .iter()
        .filter(|f| f.is_pause())
        .map(AnimationFrame::duration_ms)
        .sum()
}

/// Sum of every non-pause duration, i.e. the rescalable part.
pub fn speech_total_ms(frames: &[AnimationFrame]) -> f64 {
    frames
        .iter()
        .filter(|f| !f.is_pause())
        .map(AnimationFrame::duration_ms)
        .sum()
}
