mod presets;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub use presets::Emotion;

/// The nine scalars the face is solved from.
///
/// `m, p, q, r, s` are conventionally in `[0, 1]` (presets push `m` past 1),
/// the rest in `[-1, 1]`. Nothing is clamped.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ShapeParameters {
    /// `m`
    pub mouth_open: f64,
    /// `p`
    pub upper_lip: f64,
    /// `q`
    pub lower_lip: f64,
    /// `r`
    pub roundedness: f64,
    /// `s`
    pub smile: f64,
    pub skew: f64,
    pub rotate: f64,
    pub brow_lift: f64,
    pub brow_angle: f64,
}

impl ShapeParameters {
    pub const fn from_array(v: [f64; 9]) -> Self {
        Self {
            mouth_open: v[0],
            upper_lip: v[1],
            lower_lip: v[2],
            roundedness: v[3],
            smile: v[4],
            skew: v[5],
            rotate: v[6],
            brow_lift: v[7],
            brow_angle: v[8],
        }
    }

    pub fn to_array(&self) -> [f64; 9] {
        [
            self.mouth_open,
            self.upper_lip,
            self.lower_lip,
            self.roundedness,
            self.smile,
            self.skew,
            self.rotate,
            self.brow_lift,
            self.brow_angle,
        ]
    }

    /// Preset for an expression name; unknown names get the neutral face.
    pub fn for_expression(name: &str) -> Self {
        Emotion::from_name(name)
            .unwrap_or(Emotion::Neutral)
            .params()
    }
}

impl From<[f64; 9]> for ShapeParameters {
    fn from(v: [f64; 9]) -> Self {
        Self::from_array(v)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeParseError {
    #[error("expected 9 comma-separated values, got {0}")]
    WrongCount(usize),
    #[error("invalid number: {0}")]
    InvalidNumber(String),
}

/// Parses `m,p,q,r,s,skew,rotate,browLift,browAngle`.
impl FromStr for ShapeParameters {
    type Err = ShapeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|v| {
                let v = v.trim();
                v.parse::<f64>()
                    .map_err(|_| ShapeParseError::InvalidNumber(v.to_owned()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let arr: [f64; 9] = values
            .as_slice()
            .try_into()
            .map_err(|_| ShapeParseError::WrongCount(values.len()))?;
        Ok(Self::from_array(arr))
    }
}

/// Where the face's shape comes from: a named preset, or manual mode where
/// the caller's parameters win over any expression.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ShapeSource {
    #[default]
    Preset,
    Manual { params: ShapeParameters },
}

impl ShapeSource {
    pub fn resolve(&self, expression: &str) -> ShapeParameters {
        match self {
            ShapeSource::Preset => ShapeParameters::for_expression(expression),
            ShapeSource::Manual { params } => *params,
        }
    }
}
