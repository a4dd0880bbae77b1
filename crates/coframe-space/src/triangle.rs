//! Calibration-triangle layout and corner classification.
//!
//! The master client pins three cloud anchors to physical space, arranged as
//! a right triangle around its calibration pose:
//!
//! ```text
//!     y_end
//!       │
//!       │ y_leg (0.3 m)
//!       │
//!     origin ───────── x_end
//!            x_leg (0.4 m)
//! ```
//!
//! A secondary client locates the same three anchors but receives them in
//! arbitrary order, expressed in its own world coordinates.  Because the legs
//! have different lengths the corners can be told apart from pairwise
//! distances alone: the longest side is the hypotenuse, the corner not on it
//! is the origin, and each hypotenuse endpoint is matched to the leg whose
//! advertised length it best fits.
//!
//! # Example
//!
//! ```rust
//! use coframe_space::math::Vec3;
//! use coframe_space::triangle::{LabeledTriangle, TriangleLayout};
//!
//! let layout = TriangleLayout::default();
//! // Located anchors, in whatever order the watcher delivered them.
//! let points = [
//!     Vec3::new(2.0, 0.3, 1.0),
//!     Vec3::new(2.4, 0.0, 1.0),
//!     Vec3::new(2.0, 0.0, 1.0),
//! ];
//! let triangle = LabeledTriangle::classify(points, &layout).unwrap();
//! assert!((triangle.origin.x - 2.0).abs() < 1e-6);
//! assert!((triangle.x_end.x - 2.4).abs() < 1e-6);
//! ```

use tracing::debug;

use crate::SpaceError;
use crate::math::{EPSILON, Pose, Vec3};

/// Default x-leg length in metres.
pub const DEFAULT_X_LEG: f32 = 0.4;
/// Default y-leg length in metres.
pub const DEFAULT_Y_LEG: f32 = 0.3;
/// Default per-side noise allowance, relative to the side length.
pub const DEFAULT_TOLERANCE: f32 = 0.1;

// ────────────────────────────────────────────────────────────────────────────
// TriangleLayout
// ────────────────────────────────────────────────────────────────────────────

/// Dimensions of the calibration triangle, agreed between master and
/// secondaries via the anchor advertisement.
///
/// The legs must differ: classification relies on telling the x-leg end from
/// the y-leg end by length.  The constructor enforces this, so a layout in
/// hand is always classifiable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleLayout {
    x_leg: f32,
    y_leg: f32,
    tolerance: f32,
}

impl Default for TriangleLayout {
    fn default() -> Self {
        Self {
            x_leg: DEFAULT_X_LEG,
            y_leg: DEFAULT_Y_LEG,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl TriangleLayout {
    /// Create a layout with the given leg lengths (metres) and the default
    /// noise tolerance.
    pub fn new(x_leg: f32, y_leg: f32) -> Result<Self, SpaceError> {
        if !(x_leg > EPSILON) || !(y_leg > EPSILON) {
            return Err(SpaceError::InvalidLayout(format!(
                "leg lengths must be positive, got {x_leg} / {y_leg}"
            )));
        }
        if (x_leg - y_leg).abs() < EPSILON {
            return Err(SpaceError::InvalidLayout(format!(
                "legs must differ so the corners can be told apart, got {x_leg} / {y_leg}"
            )));
        }
        Ok(Self {
            x_leg,
            y_leg,
            tolerance: DEFAULT_TOLERANCE,
        })
    }

    /// Replace the relative per-side noise allowance (clamped to ≥ 0).
    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance.max(0.0);
        self
    }

    pub fn x_leg(&self) -> f32 {
        self.x_leg
    }

    pub fn y_leg(&self) -> f32 {
        self.y_leg
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Length of the hypotenuse implied by the legs.
    pub fn hypotenuse(&self) -> f32 {
        (self.x_leg * self.x_leg + self.y_leg * self.y_leg).sqrt()
    }

    /// Corner offsets from the calibration pose, in its local frame:
    /// origin, x-leg end, y-leg end.
    pub fn corner_offsets(&self) -> [Vec3; 3] {
        [
            Vec3::zero(),
            Vec3::new(self.x_leg, 0.0, 0.0),
            Vec3::new(0.0, self.y_leg, 0.0),
        ]
    }

    /// The world-frame poses at which the master pins the three anchors,
    /// given its calibration pose.  Each anchor inherits the calibration
    /// rotation.
    pub fn corner_poses(&self, calibration: &Pose) -> [Pose; 3] {
        self.corner_offsets().map(|offset| {
            Pose::new(
                calibration.position.add(calibration.rotation.rotate(offset)),
                calibration.rotation,
            )
        })
    }

    fn check_side(&self, side: &'static str, measured: f32, expected: f32) -> Result<(), SpaceError> {
        if (measured - expected).abs() > self.tolerance * expected {
            return Err(SpaceError::LayoutMismatch {
                side,
                measured,
                expected,
            });
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LabeledTriangle
// ────────────────────────────────────────────────────────────────────────────

/// The three anchor positions with their triangle roles identified, in one
/// client's world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledTriangle {
    pub origin: Vec3,
    pub x_end: Vec3,
    pub y_end: Vec3,
}

impl LabeledTriangle {
    /// Identify the corners of a located anchor triple by pairwise distances
    /// and validate the measured sides against the advertised layout.
    ///
    /// The result does not depend on the order of `points`.
    pub fn classify(points: [Vec3; 3], layout: &TriangleLayout) -> Result<Self, SpaceError> {
        // Each entry: the two endpoints of a side and the excluded corner.
        const SIDES: [(usize, usize, usize); 3] = [(0, 1, 2), (0, 2, 1), (1, 2, 0)];

        let mut hypotenuse = SIDES[0];
        let mut longest = 0.0f32;
        for &(a, b, rest) in &SIDES {
            let d = points[a].distance(points[b]);
            if d < EPSILON {
                return Err(SpaceError::DegenerateTriangle(
                    "two anchor positions coincide".to_string(),
                ));
            }
            if d > longest {
                longest = d;
                hypotenuse = (a, b, rest);
            }
        }

        let (end_a, end_b) = (points[hypotenuse.0], points[hypotenuse.1]);
        let origin = points[hypotenuse.2];

        // Distinct points can still lie on one line; a flat triple spans no
        // plane and can never seat a basis.
        let span = end_b.sub(end_a).cross(origin.sub(end_a));
        if span.length() < EPSILON {
            return Err(SpaceError::DegenerateTriangle(
                "anchor positions are collinear".to_string(),
            ));
        }

        let (da, db) = (origin.distance(end_a), origin.distance(end_b));

        // Match each hypotenuse endpoint to the leg its length best fits.
        let direct = (da - layout.x_leg).abs() + (db - layout.y_leg).abs();
        let swapped = (db - layout.x_leg).abs() + (da - layout.y_leg).abs();
        let (x_end, y_end, measured_x, measured_y) = if direct <= swapped {
            (end_a, end_b, da, db)
        } else {
            (end_b, end_a, db, da)
        };

        layout.check_side("x leg", measured_x, layout.x_leg)?;
        layout.check_side("y leg", measured_y, layout.y_leg)?;
        layout.check_side("hypotenuse", longest, layout.hypotenuse())?;

        debug!(
            x_leg = measured_x,
            y_leg = measured_y,
            hypotenuse = longest,
            "classified calibration triangle"
        );
        Ok(Self {
            origin,
            x_end,
            y_end,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
