use crate::script::lexer::{lex, Directive, Token};
use serde::{Deserialize, Serialize};

/// Rough spoken length of one character at speed 1.0.
pub const DEFAULT_MS_PER_CHAR: f64 = 60.0;

/// One unit handed to the speech synthesizer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    Text { text: String, speed: f64 },
    Pause { duration_ms: f64 },
    /// Visual-only; keeps the position of an expression change relative to
    /// the speech around it.
    Emotion { name: String },
}

struct SegmentBuilder {
    segments: Vec<Segment>,
    pending: String,
    speed: f64,
}

impl SegmentBuilder {
    fn flush(&mut self) {
        let text = std::mem::take(&mut self.pending);
        if !text.trim().is_empty() {
            self.segments.push(Segment::Text {
                text,
                speed: self.speed,
            });
        }
    }
}

/// Groups a script into synthesizer segments. Text between tags accumulates
/// until a pause, speed or emotion tag (or the end of the script) flushes it;
/// emphasis tags are transparent.
pub fn build_segments(script: &str) -> Vec<Segment> {
    let mut b = SegmentBuilder {
        segments: Vec::new(),
        pending: String::new(),
        speed: 1.0,
    };

    for token in lex(script) {
        let tag = match token {
            Token::Text(text) => {
                b.pending.push_str(text);
                continue;
            }
            Token::Tag(tag) => tag,
        };

        match tag.directive() {
            Directive::Pause { ms } => {
                b.flush();
                b.segments.push(Segment::Pause { duration_ms: ms });
            }
            Directive::Speed { multiplier } => {
                b.flush();
                b.speed = multiplier;
            }
            Directive::Emotion { name } => {
                b.flush();
                b.segments.push(Segment::Emotion {
                    name: name.to_owned(),
                });
            }
            Directive::EmphasisStart | Directive::EmphasisEnd | Directive::Ignored => {}
        }
    }

    b.flush();
    tracing::debug!(segments = b.segments.len(), "script segmented");
    b.segments
}

/// Expected spoken length of a segment list: characters at `ms_per_char`
/// scaled by each segment's speed, plus literal pauses.
pub fn estimate_duration_ms(segments: &[Segment], ms_per_char: f64) -> f64 {
    segments
        .iter()
        .map(|seg| match seg {
            Segment::Text { text, speed } => text.chars().count() as f64 * ms_per_char / speed,
            Segment::Pause { duration_ms } => *duration_ms,
            Segment::Emotion { .. } => 0.0,
        })
        .sum()
}
