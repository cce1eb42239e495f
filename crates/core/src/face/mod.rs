//! Face geometry and rendering: mouth outline, teeth overlay, brows and eyes
//! for one frame of face state.

mod brows;
mod geometry;
mod render;
mod transform;

pub use brows::{
    place_brows, BrowPlacement, Brows, BROW_JUMP_INTENSITY, DEFAULT_EYE_SIZE, DEFAULT_EYE_SPACING,
    FACE_CENTER_X,
};
pub use geometry::{
    intersection, mouth_path, MouthAnchors, MouthOutline, MouthPath, MouthShape, Point,
    MAX_SPEAKING_OPEN, VOLUME_OPEN_GAIN,
};
pub use render::{EyePlacement, FaceGeometry, FaceRenderer, EYE_CENTER_Y, VIEW_BOX};
pub use transform::{Affine, MouthTransform, Rect, TeethLayout, MOUTH_ANCHOR, MOUTH_SCALE};

use crate::timeline::{AnimationFrame, Viseme};
use serde::{Deserialize, Serialize};

pub const NEUTRAL_EXPRESSION: &str = "neutral";

/// What the playback driver publishes for every frame it enters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FaceState {
    pub viseme: Viseme,
    pub expression: String,
    pub squash: f64,
    pub brow_jump: f64,
    /// Scales the speaking mouth opening; raised inside emphasis.
    pub intensity: f64,
    pub animating: bool,
}

impl Default for FaceState {
    fn default() -> Self {
        Self {
            viseme: Viseme::Closed,
            expression: NEUTRAL_EXPRESSION.to_owned(),
            squash: 1.0,
            brow_jump: 0.0,
            intensity: 1.0,
            animating: false,
        }
    }
}

impl FaceState {
    /// Applies a frame's visible effect; pauses close the mouth.
    pub fn enter(&mut self, frame: &AnimationFrame) {
        self.viseme = frame.viseme();
        self.squash = frame.squash();
        self.brow_jump = frame.brow_jump();
        self.intensity = frame.intensity();
        if let Some(expression) = frame.expression() {
            self.expression = expression.to_owned();
        }
    }

    /// Closed, still face that keeps its expression.
    pub fn settle(&mut self) {
        self.viseme = Viseme::Closed;
        self.squash = 1.0;
        self.brow_jump = 0.0;
        self.intensity = 1.0;
        self.animating = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entering_frames_tracks_expression_and_pose() {
        let mut state = FaceState::default();
        state.enter(&AnimationFrame::ExpressionSwitch {
            expression: "joy".to_owned(),
            duration_ms: 10.0,
            squash: 1.0,
            brow_jump: 0.3,
        });
        assert_eq!(state.expression, "joy");
        assert_eq!(state.brow_jump, 0.3);

        state.enter(&AnimationFrame::Speech {
            viseme: Viseme::Wide,
            duration_ms: 100.0,
            squash: 1.2,
            brow_jump: 0.0,
            intensity: 1.3,
        });
        assert_eq!(state.viseme, Viseme::Wide);
        assert_eq!(state.intensity, 1.3);
        assert_eq!(state.squash, 1.2);
        assert_eq!(state.expression, "joy");

        state.enter(&AnimationFrame::Pause { duration_ms: 300.0 });
        assert_eq!(state.viseme, Viseme::Closed);
        assert_eq!(state.squash, 1.0);
        assert_eq!(state.intensity, 1.0);
    }

    #[test]
    fn settle_keeps_expression() {
        let mut state = FaceState {
            viseme: Viseme::Open,
            expression: "angry".to_owned(),
            squash: 1.3,
            brow_jump: 0.4,
            intensity: 1.3,
            animating: true,
        };
        state.settle();
        assert_eq!(
            state,
            FaceState {
                expression: "angry".to_owned(),
                ..FaceState::default()
            }
        );
    }
}
