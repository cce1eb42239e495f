//! Script mini-language: `<emotion>`, `<pause:MS>`, `<speed:X>` and
//! `<emphasis>…</emphasis>` interleaved with spoken text.
//!
//! Both downstream consumers (the viseme timeline and the synthesis segment
//! list) read the script through [`lex`] and [`Tag::directive`], so they can
//! never disagree about what a tag means.

mod lexer;
mod segments;

pub use lexer::{lex, strip_tags, Directive, Tag, Token, MAX_SPEED, MIN_SPEED};
pub use segments::{build_segments, estimate_duration_ms, Segment, DEFAULT_MS_PER_CHAR};
