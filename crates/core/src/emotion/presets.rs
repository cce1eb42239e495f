use crate::emotion::ShapeParameters;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    #[default]
    Neutral,
    Joy,
    Glee,
    Surprised,
    Shock,
    Worried,
    Sad,
    Angry,
    Fear,
}

impl Emotion {
    pub const ALL: [Emotion; 9] = [
        Emotion::Neutral,
        Emotion::Joy,
        Emotion::Glee,
        Emotion::Surprised,
        Emotion::Shock,
        Emotion::Worried,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Fear,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|e| e.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Joy => "joy",
            Emotion::Glee => "glee",
            Emotion::Surprised => "surprised",
            Emotion::Shock => "shock",
            Emotion::Worried => "worried",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Fear => "fear",
        }
    }

    pub fn params(self) -> ShapeParameters {
        let v = match self {
            // slight smile
            Emotion::Neutral => [0.5, 0.0, 0.0, 0.5, 0.8, 0.0, 0.0, 0.0, 0.0],
            Emotion::Joy => [2.8, 0.1, 0.3, 0.9, 1.0, 0.0, 0.0, 0.3, 0.3],
            Emotion::Glee => [0.0, 0.5, 0.9, 0.7, 1.0, 0.0, 0.0, 0.4, -0.4],
            // tall oval
            Emotion::Surprised => [3.0, 0.0, 0.0, 1.0, 0.5, 0.0, 0.0, 0.8, 0.8],
            Emotion::Shock => [3.0, 0.0, 0.0, 0.9, 0.3, 0.0, 0.0, 0.9, 0.9],
            Emotion::Worried => [1.0, 1.0, 0.75, 0.7, 0.1, 0.0, 0.0, 0.0, 0.3],
            Emotion::Sad => [2.0, -0.2, -0.8, 0.6, 0.0, 0.0, 0.0, 0.4, 0.5],
            // squared-off, gritted
            Emotion::Angry => [0.8, 0.3, 0.5, 0.9, 0.1, 0.0, 0.0, -0.6, -1.0],
            Emotion::Fear => [2.5, 0.2, 0.2, 0.7, 0.1, 0.0, 0.0, 0.5, 0.5],
        };
        ShapeParameters::from_array(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_round_trips_by_name() {
        for e in Emotion::ALL {
            assert_eq!(Emotion::from_name(e.name()), Some(e));
        }
    }

    #[test]
    fn sad_mouth_opens_downward() {
        let sad = Emotion::Sad.params();
        assert!(sad.lower_lip < 0.0);
        assert_eq!(sad.smile, 0.0);
    }
}
