use serde::{Deserialize, Serialize};

/// Visual mouth-shape class standing in for a phoneme.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Viseme {
    #[default]
    Closed,
    Open,
    Wide,
    Narrow,
    Smile,
}

impl Viseme {
    pub fn as_str(self) -> &'static str {
        match self {
            Viseme::Closed => "closed",
            Viseme::Open => "open",
            Viseme::Wide => "wide",
            Viseme::Narrow => "narrow",
            Viseme::Smile => "smile",
        }
    }

    /// Base mouth opening this shape adds while speaking. Every shape but
    /// `Closed` also opens by the configured teeth gap.
    pub fn speech_opening(self, teeth_gap: f64) -> f64 {
        match self {
            Viseme::Closed => 0.0,
            Viseme::Open => 2.0 + teeth_gap,
            Viseme::Wide => 1.2 + teeth_gap,
            Viseme::Narrow => 2.5 + teeth_gap,
            Viseme::Smile => 0.4 + teeth_gap,
        }
    }
}

fn digraph(first: char, second: char) -> Option<Viseme> {
    match (first, second) {
        ('s', 'h') | ('c', 'h') | ('a', 'i') | ('e', 'e') => Some(Viseme::Wide),
        ('t', 'h') | ('a', 'u') | ('o', 'o') => Some(Viseme::Narrow),
        _ => None,
    }
}

fn letter(c: char) -> Option<Viseme> {
    let viseme = match c {
        'b' | 'm' | 'p' => Viseme::Closed,
        'e' | 'i' | 'j' | 'l' => Viseme::Wide,
        'o' | 'u' | 'f' | 'v' | 'r' => Viseme::Narrow,
        's' | 'z' => Viseme::Smile,
        'a'..='z' => Viseme::Open,
        _ => return None,
    };
    Some(viseme)
}

/// Greedy two-character lookahead at `index`. Returns the viseme (if the
/// character is a letter) and how many characters were consumed.
pub(crate) fn phoneme_at(chars: &[char], index: usize) -> (Option<Viseme>, usize) {
    let c = chars[index];
    if let Some(&next) = chars.get(index + 1) {
        if let Some(v) = digraph(c, next) {
            return (Some(v), 2);
        }
    }
    (letter(c), 1)
}
