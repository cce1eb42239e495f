//! The one canonical mouth transform (shear → rotate → scale → translate),
//! available both per point and as an SVG transform list for overlays.

use crate::face::geometry::Point;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixels per normalized mouth unit, vertically.
pub const MOUTH_SCALE: f64 = 15.0;
/// Screen anchor of the mouth's normalized origin.
pub const MOUTH_ANCHOR: Point = Point::new(50.0, 135.0);
/// Radians per unit of the `rotate` shape parameter.
pub const ROTATE_RADIANS_PER_UNIT: f64 = 0.5;

pub const TOOTH_WIDTH: f64 = 0.6;
pub const TOOTH_LENGTH: f64 = 4.0 / MOUTH_SCALE;
pub const TOOTH_RECT_HEIGHT: f64 = 50.0 / MOUTH_SCALE;
pub const TEETH_PER_HALF_ROW: usize = 6;

/// 2D affine matrix in SVG layout: `x' = a·x + c·y + e`, `y' = b·x + d·y + f`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translate(tx: f64, ty: f64) -> Self {
        Affine {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Affine {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    pub fn rotate(radians: f64) -> Self {
        let (sin, cos) = radians.sin_cos();
        Affine {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            ..Self::IDENTITY
        }
    }

    /// `x += y·k`
    pub fn shear_x(k: f64) -> Self {
        Affine {
            c: k,
            ..Self::IDENTITY
        }
    }

    /// `self ∘ rhs`: applies `rhs` first.
    pub fn then_after(self, rhs: Affine) -> Affine {
        Affine {
            a: self.a * rhs.a + self.c * rhs.b,
            b: self.b * rhs.a + self.d * rhs.b,
            c: self.a * rhs.c + self.c * rhs.d,
            d: self.b * rhs.c + self.d * rhs.d,
            e: self.a * rhs.e + self.c * rhs.f + self.e,
            f: self.b * rhs.e + self.d * rhs.f + self.f,
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            self.a * p.x + self.c * p.y + self.e,
            self.b * p.x + self.d * p.y + self.f,
        )
    }
}

/// Shear by `skew`, rotate by `rotate · 0.5` rad, scale by
/// `(MOUTH_SCALE · width, MOUTH_SCALE)`, translate to [`MOUTH_ANCHOR`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct MouthTransform {
    pub skew: f64,
    pub rotate: f64,
    pub x_scale: f64,
    pub y_scale: f64,
    pub anchor: Point,
}

impl MouthTransform {
    pub fn new(skew: f64, rotate: f64, mouth_width: f64) -> Self {
        Self {
            skew,
            rotate,
            x_scale: MOUTH_SCALE * mouth_width,
            y_scale: MOUTH_SCALE,
            anchor: MOUTH_ANCHOR,
        }
    }

    pub fn theta(&self) -> f64 {
        self.rotate * ROTATE_RADIANS_PER_UNIT
    }

    pub fn apply(&self, p: Point) -> Point {
        let x = p.x + p.y * self.skew;
        let y = p.y;
        let (sin, cos) = self.theta().sin_cos();
        let rx = x * cos - y * sin;
        let ry = x * sin + y * cos;
        Point::new(
            self.anchor.x + rx * self.x_scale,
            self.anchor.y + ry * self.y_scale,
        )
    }

    /// The same mapping as a single matrix, composed right to left.
    pub fn to_affine(&self) -> Affine {
        Affine::translate(self.anchor.x, self.anchor.y)
            .then_after(Affine::scale(self.x_scale, self.y_scale))
            .then_after(Affine::rotate(self.theta()))
            .then_after(Affine::shear_x(self.skew))
    }

    /// `transform` attribute for an overlay drawn in normalized mouth space.
    pub fn svg_transform_list(&self) -> String {
        format!(
            "translate({} {}) scale({} {}) rotate({}) matrix(1 0 {} 1 0 0)",
            self.anchor.x,
            self.anchor.y,
            self.x_scale,
            self.y_scale,
            self.theta().to_degrees(),
            self.skew
        )
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"x="{:.4}" y="{:.4}" width="{:.4}" height="{:.4}""#,
            self.x, self.y, self.width, self.height
        )
    }
}

/// Two rows of teeth in normalized mouth space, biting just inside the lip
/// anchors.
#[derive(Clone, Debug, PartialEq)]
pub struct TeethLayout {
    pub upper_bite_y: f64,
    pub lower_bite_y: f64,
    pub upper: Vec<Rect>,
    pub lower: Vec<Rect>,
    /// Dark backdrop behind the teeth.
    pub cavity: Rect,
}

impl TeethLayout {
    pub fn new(upper_lip_y: f64, lower_lip_y: f64) -> Self {
        let upper_bite_y = upper_lip_y + TOOTH_LENGTH;
        let lower_bite_y = lower_lip_y - TOOTH_LENGTH;
        let row = |y: f64| -> Vec<Rect> {
            (0..TEETH_PER_HALF_ROW * 2)
                .map(|i| Rect {
                    x: (i as f64 - TEETH_PER_HALF_ROW as f64) * TOOTH_WIDTH,
                    y,
                    width: TOOTH_WIDTH,
                    height: TOOTH_RECT_HEIGHT,
                })
                .collect()
        };
        Self {
            upper_bite_y,
            lower_bite_y,
            upper: row(upper_bite_y - TOOTH_RECT_HEIGHT),
            lower: row(lower_bite_y),
            cavity: Rect {
                x: -10.0,
                y: -10.0,
                width: 20.0,
                height: 20.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::geometry::{mouth_path, MouthAnchors, MouthShape};

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn affine_matches_per_point_mapping() {
        let samples = [
            Point::new(0.0, 0.0),
            Point::new(2.0, 1.3),
            Point::new(-2.0, 0.4),
            Point::new(0.7, -3.0),
        ];
        for skew in [-1.0, -0.3, 0.0, 0.8] {
            for rotate in [-1.0, 0.0, 0.45, 1.0] {
                for width in [0.5, 1.0, 1.7] {
                    let t = MouthTransform::new(skew, rotate, width);
                    let m = t.to_affine();
                    for p in samples {
                        assert!(close(t.apply(p), m.apply(p)), "{skew} {rotate} {width} {p:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn transform_list_lists_steps_outermost_first() {
        let t = MouthTransform::new(0.25, 0.0, 2.0);
        assert_eq!(
            t.svg_transform_list(),
            "translate(50 135) scale(30 15) rotate(0) matrix(1 0 0.25 1 0 0)"
        );
    }

    #[test]
    fn composition_order_matters() {
        let t = MouthTransform::new(0.5, 0.6, 1.0);
        let wrong = Affine::shear_x(t.skew)
            .then_after(Affine::rotate(t.theta()))
            .then_after(Affine::scale(t.x_scale, t.y_scale))
            .then_after(Affine::translate(t.anchor.x, t.anchor.y));
        let p = Point::new(1.0, 1.0);
        assert!(!close(wrong.apply(p), t.apply(p)));
    }

    #[test]
    fn bite_lines_sit_on_the_lip_line() {
        let shape = MouthShape {
            open: 2.0,
            upper_lip: 0.1,
            lower_lip: 0.3,
            roundedness: 0.9,
            smile: 1.0,
        };
        let t = MouthTransform::new(0.0, 0.0, 1.0);
        let anchors = MouthAnchors::solve(&shape);
        let teeth = TeethLayout::new(anchors.upper_lip.y, anchors.lower_lip.y);
        let path = mouth_path(&shape, &t);
        let overlay = t.to_affine();

        // path order: right corner, upper lip, left corner, lower lip
        let upper_lip = path.segments[0].1;
        let lower_lip = path.segments[2].1;
        let tolerance = TOOTH_LENGTH * MOUTH_SCALE + 1e-9;

        let upper_bite = overlay.apply(Point::new(0.0, teeth.upper_bite_y));
        let lower_bite = overlay.apply(Point::new(0.0, teeth.lower_bite_y));
        assert!((upper_bite.y - upper_lip.y).abs() <= tolerance);
        assert!((lower_bite.y - lower_lip.y).abs() <= tolerance);
        assert!((upper_bite.x - upper_lip.x).abs() < 1e-9);
    }

    #[test]
    fn teeth_rows_are_centred() {
        let teeth = TeethLayout::new(1.0, 3.0);
        assert_eq!(teeth.upper.len(), 12);
        assert_eq!(teeth.lower.len(), 12);
        let left = teeth.upper[0].x;
        let right = teeth.upper[11].x + TOOTH_WIDTH;
        assert!((left + right).abs() < 1e-9);
        assert!((teeth.upper[0].y + TOOTH_RECT_HEIGHT - teeth.upper_bite_y).abs() < 1e-12);
        assert_eq!(teeth.lower[0].y, teeth.lower_bite_y);
    }
}
