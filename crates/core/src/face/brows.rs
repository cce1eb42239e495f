use crate::face::geometry::Point;
use serde::{Deserialize, Serialize};

pub const DEFAULT_EYE_SIZE: f64 = 22.0;
pub const DEFAULT_EYE_SPACING: f64 = 44.0;
pub const BROW_JUMP_INTENSITY: f64 = 20.0;
/// Brow row for the default eye size.
pub const BROW_BASE_ROW: f64 = 25.0;
pub const BROW_LIFT_PX: f64 = 15.0;
pub const BROW_MAX_TILT_DEG: f64 = 30.0;
pub const FACE_CENTER_X: f64 = 50.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct BrowPlacement {
    /// Pivot of the brow.
    pub center: Point,
    pub rotation_deg: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Brows {
    pub left: BrowPlacement,
    pub right: BrowPlacement,
}

/// Places both brows. `brow_jump` is the transient value of the current
/// animation frame, the other two come from the shape parameters.
pub fn place_brows(
    brow_lift: f64,
    brow_angle: f64,
    brow_jump: f64,
    eye_spacing: f64,
    eye_size: f64,
) -> Brows {
    let row = BROW_BASE_ROW - (eye_size - DEFAULT_EYE_SIZE);
    let y = row - BROW_LIFT_PX * brow_lift - brow_jump * BROW_JUMP_INTENSITY;
    let tilt = brow_angle * BROW_MAX_TILT_DEG;

    Brows {
        left: BrowPlacement {
            center: Point::new(FACE_CENTER_X - eye_spacing / 2.0, y),
            rotation_deg: -tilt,
        },
        right: BrowPlacement {
            center: Point::new(FACE_CENTER_X + eye_spacing / 2.0, y),
            rotation_deg: tilt,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_brows_sit_on_the_base_row() {
        let b = place_brows(0.0, 0.0, 0.0, DEFAULT_EYE_SPACING, DEFAULT_EYE_SIZE);
        assert_eq!(b.left.center, Point::new(28.0, 25.0));
        assert_eq!(b.right.center, Point::new(72.0, 25.0));
        assert_eq!(b.left.rotation_deg, 0.0);
    }

    #[test]
    fn lift_and_jump_move_brows_up() {
        let b = place_brows(1.0, 0.0, 0.5, DEFAULT_EYE_SPACING, DEFAULT_EYE_SIZE);
        assert_eq!(b.left.center.y, 25.0 - 15.0 - 10.0);
        assert_eq!(b.left.center.y, b.right.center.y);
    }

    #[test]
    fn bigger_eyes_push_brows_up() {
        let b = place_brows(0.0, 0.0, 0.0, DEFAULT_EYE_SPACING, 30.0);
        assert_eq!(b.left.center.y, 17.0);
    }

    #[test]
    fn angle_tilts_symmetrically() {
        let b = place_brows(0.0, -1.0, 0.0, 60.0, DEFAULT_EYE_SIZE);
        assert_eq!(b.left.rotation_deg, 30.0);
        assert_eq!(b.right.rotation_deg, -30.0);
        assert_eq!(b.right.center.x - FACE_CENTER_X, FACE_CENTER_X - b.left.center.x);
    }
}
