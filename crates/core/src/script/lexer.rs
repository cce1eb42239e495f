use regex::Regex;
use std::sync::LazyLock;

pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 5.0;

const EMPHASIS: &str = "emphasis";

static TAG_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag boundary regex is valid"));

// `\d+(\.\d*)?|\.\d+` rejects things like `1.2.3` or `.` so they fall through
// to the simple-tag branch instead of being half-parsed.
static PARAM_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w+):(\d+(?:\.\d*)?|\.\d+)$").expect("param tag regex is valid")
});

#[derive(Clone, Debug, PartialEq)]
pub enum Token<'a> {
    /// Literal text with its original casing.
    Text(&'a str),
    Tag(Tag),
}

/// A parsed `<...>` tag. Names are lower-cased and trimmed.
#[derive(Clone, Debug, PartialEq)]
pub enum Tag {
    Param { name: String, value: f64 },
    BlockOpen { name: String },
    BlockClose { name: String },
    Simple { name: String },
}

/// What a tag asks the builders to do.
#[derive(Clone, Debug, PartialEq)]
pub enum Directive<'t> {
    Pause { ms: f64 },
    /// Already clamped to `[MIN_SPEED, MAX_SPEED]`.
    Speed { multiplier: f64 },
    EmphasisStart,
    EmphasisEnd,
    Emotion { name: &'t str },
    /// Parameterised tag with an unknown name.
    Ignored,
}

impl Tag {
    fn parse(raw: &str) -> Self {
        let content = raw.trim().to_lowercase();

        if let Some(caps) = PARAM_TAG.captures(&content) {
            if let Ok(value) = caps[2].parse::<f64>() {
                return Tag::Param {
                    name: caps[1].to_owned(),
                    value,
                };
            }
        }

        if content == EMPHASIS {
            Tag::BlockOpen { name: content }
        } else if content.strip_prefix('/') == Some(EMPHASIS) {
            Tag::BlockClose {
                name: EMPHASIS.to_owned(),
            }
        } else {
            Tag::Simple { name: content }
        }
    }

    pub fn directive(&self) -> Directive<'_> {
        match self {
            Tag::Param { name, value } => match name.as_str() {
                "pause" => Directive::Pause { ms: *value },
                "speed" => Directive::Speed {
                    multiplier: value.clamp(MIN_SPEED, MAX_SPEED),
                },
                _ => Directive::Ignored,
            },
            Tag::BlockOpen { .. } => Directive::EmphasisStart,
            Tag::BlockClose { .. } => Directive::EmphasisEnd,
            Tag::Simple { name } => Directive::Emotion { name },
        }
    }
}

/// Splits a script into literal runs and tags, preserving order. Empty runs
/// between adjacent tags are dropped.
pub fn lex(script: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut cursor = 0;

    for m in TAG_BOUNDARY.find_iter(script) {
        if m.start() > cursor {
            tokens.push(Token::Text(&script[cursor..m.start()]));
        }
        let inner = &script[m.start() + 1..m.end() - 1];
        tokens.push(Token::Tag(Tag::parse(inner)));
        cursor = m.end();
    }

    if cursor < script.len() {
        tokens.push(Token::Text(&script[cursor..]));
    }

    tokens
}

/// The spoken text of a script with every tag removed.
pub fn strip_tags(script: &str) -> String {
    TAG_BOUNDARY.replace_all(script, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(name: &str) -> Token<'static> {
        Token::Tag(Tag::Simple {
            name: name.to_owned(),
        })
    }

    #[test]
    fn lex_alternates_text_and_tags() {
        let tokens = lex("Hi <JOY> there <pause:300> bye");
        assert_eq!(
            tokens,
            vec![
                Token::Text("Hi "),
                simple("joy"),
                Token::Text(" there "),
                Token::Tag(Tag::Param {
                    name: "pause".to_owned(),
                    value: 300.0
                }),
                Token::Text(" bye"),
            ]
        );
    }

    #[test]
    fn literal_text_keeps_its_casing() {
        assert_eq!(lex("Hello World"), vec![Token::Text("Hello World")]);
    }

    #[test]
    fn adjacent_tags_produce_no_empty_text() {
        let tokens = lex("<joy><pause:10>");
        assert_eq!(tokens.len(), 2);
        assert!(tokens.iter().all(|t| matches!(t, Token::Tag(_))));
    }

    #[test]
    fn tag_names_are_trimmed_and_lowercased() {
        assert_eq!(lex("< Speed:1.5 >")[0], Token::Tag(Tag::Param {
            name: "speed".to_owned(),
            value: 1.5
        }));
    }

    #[test]
    fn emphasis_is_a_block() {
        let tokens = lex("<emphasis>big</Emphasis>");
        assert_eq!(
            tokens,
            vec![
                Token::Tag(Tag::BlockOpen {
                    name: "emphasis".to_owned()
                }),
                Token::Text("big"),
                Token::Tag(Tag::BlockClose {
                    name: "emphasis".to_owned()
                }),
            ]
        );
    }

    #[test]
    fn malformed_number_falls_back_to_simple_tag() {
        assert_eq!(lex("<pause:1.2.3>")[0], simple("pause:1.2.3"));
        assert_eq!(lex("<pause:abc>")[0], simple("pause:abc"));
        assert_eq!(lex("<pause:.>")[0], simple("pause:."));
    }

    #[test]
    fn empty_angle_brackets_stay_literal() {
        assert_eq!(lex("a <> b"), vec![Token::Text("a <> b")]);
    }

    #[test]
    fn speed_directive_is_clamped() {
        let fast = Tag::parse("speed:9");
        assert_eq!(fast.directive(), Directive::Speed { multiplier: 5.0 });
        let slow = Tag::parse("speed:0.01");
        assert_eq!(slow.directive(), Directive::Speed { multiplier: 0.1 });
    }

    #[test]
    fn unknown_param_is_ignored() {
        assert_eq!(Tag::parse("volume:3").directive(), Directive::Ignored);
    }

    #[test]
    fn strip_tags_keeps_only_text() {
        assert_eq!(strip_tags("Hi <joy>there<pause:5>!"), "Hi there!");
    }
}
