//! Closed-form mouth outline: four anchors, tangent-ray intersections as
//! quadratic control points, one canonical transform to screen space.

use crate::face::transform::MouthTransform;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Below this cross product two tangent rays count as parallel.
const PARALLEL_EPSILON: f64 = 1e-4;

/// Openness ceiling while speaking.
pub const MAX_SPEAKING_OPEN: f64 = 3.5;
/// Live volume gain added to the viseme opening.
pub const VOLUME_OPEN_GAIN: f64 = 1.5;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn midpoint(self, other: Point) -> Point {
        Point::new(0.5 * (self.x + other.x), 0.5 * (self.y + other.y))
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

const HORIZONTAL: Point = Point::new(1.0, 0.0);

/// Intersection of the ray `p + s·u` with the line through `q` along `v`.
/// Near-parallel rays fall back to the midpoint of `p` and `q`.
pub fn intersection(p: Point, u: Point, q: Point, v: Point) -> Point {
    let v_cross_u = v.x * u.y - v.y * u.x;
    if v_cross_u.abs() <= PARALLEL_EPSILON {
        return p.midpoint(q);
    }
    let w = Point::new(p.x - q.x, p.y - q.y);
    let v_cross_w = v.x * w.y - v.y * w.x;
    let s = -v_cross_w / v_cross_u;
    Point::new(p.x + u.x * s, p.y + u.y * s)
}

/// Mouth-shaping subset of the shape parameters; `open` is the effective
/// openness for this frame, not necessarily the preset's.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MouthShape {
    pub open: f64,
    pub upper_lip: f64,
    pub lower_lip: f64,
    pub roundedness: f64,
    pub smile: f64,
}

/// The four anchors in normalized mouth space (y grows downward), in path
/// order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MouthAnchors {
    pub right_corner: Point,
    pub upper_lip: Point,
    pub left_corner: Point,
    pub lower_lip: Point,
}

impl MouthAnchors {
    pub fn solve(shape: &MouthShape) -> Self {
        let corner_y = (2.0 + shape.open) * (1.0 - shape.smile);
        Self {
            right_corner: Point::new(2.0, corner_y),
            upper_lip: Point::new(0.0, 1.0 - shape.upper_lip),
            left_corner: Point::new(-2.0, corner_y),
            lower_lip: Point::new(0.0, 1.0 + shape.open + shape.lower_lip),
        }
    }

    fn as_array(&self) -> [Point; 4] {
        [
            self.right_corner,
            self.upper_lip,
            self.left_corner,
            self.lower_lip,
        ]
    }
}

/// Tangent from `from` toward `to` with its horizontal reach shortened by
/// `(1 - r) / 2`.
fn corner_tangent(from: Point, to: Point, roundedness: f64) -> Point {
    Point::new(
        0.5 * (1.0 - roundedness) * (to.x - from.x),
        to.y - from.y,
    )
}

/// Normalized outline: anchors plus the control point of each quadratic
/// segment `anchors[i] → anchors[(i + 1) % 4]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MouthOutline {
    pub anchors: MouthAnchors,
    pub controls: [Point; 4],
}

impl MouthOutline {
    pub fn solve(shape: &MouthShape) -> Self {
        let anchors = MouthAnchors::solve(shape);
        let a = anchors.right_corner;
        let c = anchors.upper_lip;
        let e = anchors.left_corner;
        let g = anchors.lower_lip;
        let r = shape.roundedness;

        // (outgoing, incoming) per anchor; lip centres stay horizontal.
        let tangents = [
            (corner_tangent(a, c, r), corner_tangent(g, a, r)),
            (HORIZONTAL, HORIZONTAL),
            (corner_tangent(e, g, r), corner_tangent(c, e, r)),
            (HORIZONTAL, HORIZONTAL),
        ];

        let points = anchors.as_array();
        let controls = std::array::from_fn(|i| {
            let next = (i + 1) % 4;
            intersection(points[i], tangents[i].0, points[next], tangents[next].1)
        });

        Self { anchors, controls }
    }
}

/// Screen-space mouth path: a move to the first anchor then four quadratic
/// segments `(control, end)`.
#[derive(Clone, Debug, PartialEq)]
pub struct MouthPath {
    pub start: Point,
    pub segments: [(Point, Point); 4],
}

impl MouthPath {
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        std::iter::once(self.start).chain(self.segments.iter().flat_map(|(c, p)| [*c, *p]))
    }

    /// SVG path data (`M … Q … Z`).
    pub fn to_svg_d(&self) -> String {
        let mut d = format!("M {:.3} {:.3}", self.start.x, self.start.y);
        for (ctrl, end) in &self.segments {
            let _ = write!(
                d,
                " Q {:.3} {:.3} {:.3} {:.3}",
                ctrl.x, ctrl.y, end.x, end.y
            );
        }
        d.push_str(" Z");
        d
    }
}

/// Solves the outline and maps every coordinate through `transform`.
pub fn mouth_path(shape: &MouthShape, transform: &MouthTransform) -> MouthPath {
    let outline = MouthOutline::solve(shape);
    let points = outline.anchors.as_array();
    MouthPath {
        start: transform.apply(points[0]),
        segments: std::array::from_fn(|i| {
            (
                transform.apply(outline.controls[i]),
                transform.apply(points[(i + 1) % 4]),
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::Emotion;

    fn shape(open: f64, p: f64, q: f64, r: f64, s: f64) -> MouthShape {
        MouthShape {
            open,
            upper_lip: p,
            lower_lip: q,
            roundedness: r,
            smile: s,
        }
    }

    #[test]
    fn intersection_of_crossing_rays() {
        let x = intersection(
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 0.0),
            Point::new(-1.0, 1.0),
        );
        assert!((x.x - 1.0).abs() < 1e-12);
        assert!((x.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn parallel_rays_fall_back_to_midpoint() {
        let x = intersection(
            Point::new(0.0, 0.0),
            HORIZONTAL,
            Point::new(4.0, 2.0),
            HORIZONTAL,
        );
        assert_eq!(x, Point::new(2.0, 1.0));

        let zero = Point::new(0.0, 0.0);
        let x = intersection(Point::new(0.0, 0.0), zero, Point::new(2.0, 2.0), zero);
        assert_eq!(x, Point::new(1.0, 1.0));
    }

    #[test]
    fn anchors_follow_parameters() {
        let a = MouthAnchors::solve(&shape(1.0, 0.2, 0.3, 0.5, 0.5));
        assert_eq!(a.right_corner, Point::new(2.0, 1.5));
        assert_eq!(a.left_corner, Point::new(-2.0, 1.5));
        assert_eq!(a.upper_lip, Point::new(0.0, 0.8));
        assert_eq!(a.lower_lip, Point::new(0.0, 2.3));
    }

    #[test]
    fn outline_is_mirror_symmetric() {
        let outline = MouthOutline::solve(&shape(2.0, 0.1, 0.3, 0.6, 0.7));
        let [c0, c1, c2, c3] = outline.controls;
        assert!((c0.x + c1.x).abs() < 1e-9 && (c0.y - c1.y).abs() < 1e-9);
        assert!((c2.x + c3.x).abs() < 1e-9 && (c2.y - c3.y).abs() < 1e-9);
    }

    #[test]
    fn full_roundedness_stays_finite() {
        for s in [0.0, 0.5, 1.0] {
            for m in [0.0, 1.0, 3.5] {
                let outline = MouthOutline::solve(&shape(m, 0.0, 0.0, 1.0, s));
                assert!(outline.controls.iter().all(|p| p.is_finite()));
            }
        }
    }

    #[test]
    fn documented_ranges_produce_finite_paths() {
        let unit = [0.0, 0.25, 0.5, 0.75, 1.0];
        let signed = [-1.0, 0.0, 1.0];
        for m in unit {
            for p in unit {
                for q in unit {
                    for r in unit {
                        for s in unit {
                            for skew in signed {
                                for rot in signed {
                                    let t = MouthTransform::new(skew, rot, 1.0);
                                    let path = mouth_path(&shape(m, p, q, r, s), &t);
                                    assert!(path.points().all(Point::is_finite));
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn presets_produce_closed_svg_paths() {
        let t = MouthTransform::new(0.0, 0.0, 1.0);
        for e in Emotion::ALL {
            let p = e.params();
            let d = mouth_path(
                &shape(p.mouth_open, p.upper_lip, p.lower_lip, p.roundedness, p.smile),
                &t,
            )
            .to_svg_d();
            assert!(d.starts_with("M "));
            assert_eq!(d.matches(" Q ").count(), 4);
            assert!(d.ends_with('Z'));
        }
    }
}
