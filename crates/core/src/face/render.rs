use crate::config::{FaceConfig, FaceTransform};
use crate::emotion::ShapeParameters;
use crate::face::brows::{place_brows, Brows, FACE_CENTER_X};
use crate::face::geometry::{
    mouth_path, MouthAnchors, MouthPath, MouthShape, Point, MAX_SPEAKING_OPEN, VOLUME_OPEN_GAIN,
};
use crate::face::transform::{MouthTransform, TeethLayout, MOUTH_SCALE};
use crate::face::FaceState;
use crate::idle::GazeState;
use std::fmt::Write;

pub const VIEW_BOX: (f64, f64) = (100.0, 200.0);
pub const EYE_CENTER_Y: f64 = 85.0;
const BLINK_EYE_HEIGHT: f64 = 0.5;
const PUPIL_REACH_X: f64 = 0.55;
const PUPIL_REACH_Y: f64 = 0.45;
const PUPIL_RADIUS: f64 = 0.4;
const BROW_WIDTH: f64 = 40.0;
const BROW_HEIGHT: f64 = 8.0;
const MOUTH_STROKE: f64 = 4.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EyePlacement {
    pub center: Point,
    pub radius_x: f64,
    pub radius_y: f64,
    /// Hidden while blinking.
    pub pupil: Option<(Point, f64)>,
}

/// Everything needed to draw one frame, in view-box coordinates except the
/// teeth, which live in normalized mouth space under `mouth_transform`.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceGeometry {
    pub params: ShapeParameters,
    pub mouth_open: f64,
    pub mouth: MouthPath,
    pub mouth_transform: MouthTransform,
    pub teeth: TeethLayout,
    pub brows: Brows,
    pub eyes: [EyePlacement; 2],
    pub face_transform: FaceTransform,
    pub squash: f64,
}

impl FaceGeometry {
    /// `transform` attribute for the whole face, pivoting on the view-box
    /// centre. `squash` stretches the vertical scale.
    pub fn face_transform_list(&self) -> String {
        let t = &self.face_transform;
        let (cx, cy) = (VIEW_BOX.0 / 2.0, VIEW_BOX.1 / 2.0);
        format!(
            "translate({} {}) rotate({}) scale({} {}) translate({} {})",
            cx + t.x,
            cy + t.y,
            t.rotate_deg,
            t.scale,
            t.scale * self.squash,
            -cx,
            -cy
        )
    }

    pub fn to_svg(&self) -> String {
        let mut svg = String::new();
        let d = self.mouth.to_svg_d();
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="200" viewBox="0 0 {} {}">"#,
            VIEW_BOX.0, VIEW_BOX.1
        );
        let _ = write!(
            svg,
            r#"<defs><clipPath id="mouthClip"><path d="{d}"/></clipPath></defs>"#
        );
        let _ = write!(svg, r#"<g transform="{}">"#, self.face_transform_list());

        for eye in &self.eyes {
            let _ = write!(
                svg,
                r#"<ellipse cx="{:.3}" cy="{:.3}" rx="{:.3}" ry="{:.3}" fill="white" stroke="black" stroke-width="2"/>"#,
                eye.center.x, eye.center.y, eye.radius_x, eye.radius_y
            );
        }
        for (pupil, r) in self.eyes.iter().filter_map(|e| e.pupil) {
            let _ = write!(
                svg,
                r#"<circle cx="{:.3}" cy="{:.3}" r="{:.3}" fill="black"/>"#,
                pupil.x, pupil.y, r
            );
        }

        let _ = write!(
            svg,
            r##"<g clip-path="url(#mouthClip)"><g transform="{}"><rect {} fill="#111"/>"##,
            self.mouth_transform.svg_transform_list(),
            self.teeth.cavity
        );
        let tooth_stroke = 0.5 / MOUTH_SCALE;
        for tooth in self.teeth.upper.iter().chain(&self.teeth.lower) {
            let _ = write!(
                svg,
                r##"<rect {tooth} fill="#fff" stroke="#ccc" stroke-width="{tooth_stroke:.4}"/>"##
            );
        }
        let _ = write!(
            svg,
            r#"</g></g><path d="{d}" fill="transparent" stroke="black" stroke-width="{MOUTH_STROKE}" stroke-linejoin="round" stroke-linecap="round"/>"#
        );

        for brow in [self.brows.left, self.brows.right] {
            let _ = write!(
                svg,
                r#"<rect x="{:.3}" y="{:.3}" width="{BROW_WIDTH}" height="{BROW_HEIGHT}" rx="4" fill="black" transform="rotate({:.3} {:.3} {:.3})"/>"#,
                brow.center.x - BROW_WIDTH / 2.0,
                brow.center.y - BROW_HEIGHT / 2.0,
                brow.rotation_deg,
                brow.center.x,
                brow.center.y
            );
        }

        svg.push_str("</g></svg>");
        svg
    }
}

/// Turns face state into drawable geometry under a fixed [`FaceConfig`].
#[derive(Clone, Debug, Default)]
pub struct FaceRenderer {
    config: FaceConfig,
}

impl FaceRenderer {
    pub fn new(config: FaceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FaceConfig {
        &self.config
    }

    /// Openness used for this frame: speaking replaces the preset with the
    /// viseme opening plus live volume.
    pub fn mouth_open(&self, state: &FaceState, params: &ShapeParameters, volume: f64) -> f64 {
        if state.animating {
            let opening = state.viseme.speech_opening(self.config.teeth_gap) * state.intensity;
            (opening + volume * VOLUME_OPEN_GAIN).min(MAX_SPEAKING_OPEN)
        } else {
            params.mouth_open
        }
    }

    pub fn geometry(&self, state: &FaceState, volume: f64, gaze: GazeState) -> FaceGeometry {
        let cfg = &self.config;
        let params = cfg.shape.resolve(&state.expression);
        let mouth_open = self.mouth_open(state, &params, volume);
        let shape = MouthShape {
            open: mouth_open,
            upper_lip: params.upper_lip,
            lower_lip: params.lower_lip,
            roundedness: params.roundedness,
            smile: params.smile,
        };
        let mouth_transform = MouthTransform::new(params.skew, params.rotate, cfg.mouth_width);
        let anchors = MouthAnchors::solve(&shape);

        FaceGeometry {
            params,
            mouth_open,
            mouth: mouth_path(&shape, &mouth_transform),
            mouth_transform,
            teeth: TeethLayout::new(anchors.upper_lip.y, anchors.lower_lip.y),
            brows: place_brows(
                params.brow_lift,
                params.brow_angle,
                state.brow_jump,
                cfg.eye_spacing,
                cfg.eye_size,
            ),
            eyes: [-1.0, 1.0].map(|side| self.eye(side, gaze)),
            face_transform: cfg.transform,
            squash: state.squash,
        }
    }

    pub fn render_svg(&self, state: &FaceState, volume: f64, gaze: GazeState) -> String {
        self.geometry(state, volume, gaze).to_svg()
    }

    fn eye(&self, side: f64, gaze: GazeState) -> EyePlacement {
        let size = self.config.eye_size;
        let center = Point::new(
            FACE_CENTER_X + side * self.config.eye_spacing / 2.0,
            EYE_CENTER_Y,
        );
        let pupil = (!gaze.blinking).then(|| {
            (
                Point::new(
                    center.x + gaze.look.x * size * PUPIL_REACH_X,
                    center.y + gaze.look.y * size * PUPIL_REACH_Y,
                ),
                size * PUPIL_RADIUS,
            )
        });
        EyePlacement {
            center,
            radius_x: size,
            radius_y: if gaze.blinking { BLINK_EYE_HEIGHT } else { size },
            pupil,
        }
    }
}
