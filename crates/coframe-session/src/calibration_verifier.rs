//! [`CalibrationVerifier`] – geometric acceptance gate for a candidate frame.
//!
//! Locating noise, a half-located anchor set, or a stale advertisement can
//! hand a client three poses that classify into a triangle *without*
//! describing the layout the master actually pinned.  Before a
//! [`SharedBasis`] is adopted as the room frame, pass the candidate through
//! [`CalibrationVerifier::verify`].  Every registered [`Rule`] is evaluated
//! in order; the first violation returns a [`ShareError::Geometry`] and the
//! frame must **not** be adopted.
//!
//! Three built-in rules are provided:
//! - [`SideLengthRule`] – measured triangle sides must match the advertised
//!   layout within its tolerance.
//! - [`OrthonormalityRule`] – the derived axes must be unit length and
//!   mutually perpendicular.
//! - [`HandednessRule`] – the derived axes must form a right-handed frame.

use coframe_space::{LabeledTriangle, SharedBasis, TriangleLayout};
use coframe_types::ShareError;
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// Candidate
// ────────────────────────────────────────────────────────────────────────────

/// A frame candidate awaiting acceptance.
///
/// Triangle sessions carry the classified triangle alongside the basis it
/// produced; the single-anchor fallback has no triangle, and rules that need
/// one pass it through unchecked.
#[derive(Clone, Copy)]
pub struct CalibrationCandidate<'a> {
    /// Classified calibration triangle, absent for single-anchor sessions.
    pub triangle: Option<&'a LabeledTriangle>,
    /// Basis derived from the triangle (or from the lone anchor pose).
    pub basis: &'a SharedBasis,
}

impl<'a> CalibrationCandidate<'a> {
    /// Candidate built from a classified triangle and its derived basis.
    pub fn new(triangle: &'a LabeledTriangle, basis: &'a SharedBasis) -> Self {
        Self {
            triangle: Some(triangle),
            basis,
        }
    }

    /// Candidate for the single-anchor fallback, where no triangle exists.
    pub fn single_anchor(basis: &'a SharedBasis) -> Self {
        Self {
            triangle: None,
            basis,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A single geometric invariant that a frame candidate must satisfy.
///
/// Implement this trait to create custom acceptance rules and add them to a
/// [`CalibrationVerifier`] via [`CalibrationVerifier::add_rule`].
pub trait Rule: Send + Sync {
    /// Human-readable name used in rejection messages.
    fn name(&self) -> &str;

    /// Return `Ok(())` when the candidate satisfies the invariant, or
    /// [`ShareError::Geometry`] when it is violated.
    fn check(&self, candidate: &CalibrationCandidate<'_>) -> Result<(), ShareError>;
}

// ────────────────────────────────────────────────────────────────────────────
// CalibrationVerifier
// ────────────────────────────────────────────────────────────────────────────

/// Rule engine that validates a frame candidate against all registered
/// [`Rule`]s before the basis is locked in.
///
/// # Example
///
/// ```
/// use coframe_session::{CalibrationCandidate, CalibrationVerifier};
/// use coframe_space::{LabeledTriangle, SharedBasis, TriangleLayout};
///
/// let layout = TriangleLayout::default();
/// let triangle = LabeledTriangle::classify(layout.corner_offsets(), &layout).unwrap();
/// let basis = SharedBasis::from_triangle(&triangle).unwrap();
///
/// let verifier = CalibrationVerifier::with_standard_rules(layout);
/// assert!(verifier.verify(&CalibrationCandidate::new(&triangle, &basis)).is_ok());
/// ```
#[derive(Default)]
pub struct CalibrationVerifier {
    rules: Vec<Box<dyn Rule>>,
}

impl CalibrationVerifier {
    /// Create an empty verifier with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifier loaded with the three standard rules for `layout`.
    pub fn with_standard_rules(layout: TriangleLayout) -> Self {
        let mut verifier = Self::new();
        verifier.add_rule(Box::new(SideLengthRule { layout }));
        verifier.add_rule(Box::new(OrthonormalityRule::default()));
        verifier.add_rule(Box::new(HandednessRule));
        verifier
    }

    /// Register a new [`Rule`].  Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    /// Validate `candidate` against every registered rule.
    ///
    /// Returns the first [`ShareError::Geometry`] encountered, or `Ok(())`
    /// when all rules pass.
    pub fn verify(&self, candidate: &CalibrationCandidate<'_>) -> Result<(), ShareError> {
        for rule in &self.rules {
            rule.check(candidate)?;
        }
        debug!(rules = self.rules.len(), "frame candidate accepted");
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// Rejects candidates whose measured triangle sides deviate from the
/// advertised [`TriangleLayout`] beyond its tolerance.
///
/// Single-anchor candidates have no sides to measure and pass unchecked.
pub struct SideLengthRule {
    /// The layout the master advertised for this room.
    pub layout: TriangleLayout,
}

impl Rule for SideLengthRule {
    fn name(&self) -> &str {
        "side_length"
    }

    fn check(&self, candidate: &CalibrationCandidate<'_>) -> Result<(), ShareError> {
        let Some(triangle) = candidate.triangle else {
            return Ok(());
        };
        let sides = [
            (
                "x-leg",
                triangle.origin.distance(triangle.x_end),
                self.layout.x_leg(),
            ),
            (
                "y-leg",
                triangle.origin.distance(triangle.y_end),
                self.layout.y_leg(),
            ),
            (
                "hypotenuse",
                triangle.x_end.distance(triangle.y_end),
                self.layout.hypotenuse(),
            ),
        ];
        for (side, measured, expected) in sides {
            if (measured - expected).abs() > self.layout.tolerance() * expected {
                return Err(ShareError::Geometry(format!(
                    "{}: {side} measured {measured:.3} m, advertised {expected:.3} m",
                    self.name()
                )));
            }
        }
        Ok(())
    }
}

/// Rejects candidates whose derived axes are not unit length or not mutually
/// perpendicular within `tolerance`.
pub struct OrthonormalityRule {
    /// Maximum allowed deviation from unit length and from a zero dot product.
    pub tolerance: f32,
}

impl Default for OrthonormalityRule {
    fn default() -> Self {
        Self { tolerance: 1e-4 }
    }
}

impl Rule for OrthonormalityRule {
    fn name(&self) -> &str {
        "orthonormality"
    }

    fn check(&self, candidate: &CalibrationCandidate<'_>) -> Result<(), ShareError> {
        let axes = candidate.basis.axes;
        for (label, axis) in [("x", axes[0]), ("y", axes[1]), ("z", axes[2])] {
            if (axis.length() - 1.0).abs() > self.tolerance {
                return Err(ShareError::Geometry(format!(
                    "{}: axis {label} has length {:.6}",
                    self.name(),
                    axis.length()
                )));
            }
        }
        let pairs = [
            ("x/y", axes[0].dot(axes[1])),
            ("y/z", axes[1].dot(axes[2])),
            ("z/x", axes[2].dot(axes[0])),
        ];
        for (label, dot) in pairs {
            if dot.abs() > self.tolerance {
                return Err(ShareError::Geometry(format!(
                    "{}: axes {label} not perpendicular, dot {dot:.6}",
                    self.name()
                )));
            }
        }
        Ok(())
    }
}

/// Rejects candidates whose axes form a left-handed frame.
///
/// A mirrored frame round-trips positions but flips every rotation, so it
/// must never survive verification.
pub struct HandednessRule;

impl Rule for HandednessRule {
    fn name(&self) -> &str {
        "handedness"
    }

    fn check(&self, candidate: &CalibrationCandidate<'_>) -> Result<(), ShareError> {
        let axes = candidate.basis.axes;
        let triple = axes[0].cross(axes[1]).dot(axes[2]);
        if triple <= 0.0 {
            return Err(ShareError::Geometry(format!(
                "{}: scalar triple product {triple:.3}, axes are left-handed",
                self.name()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coframe_space::{Quat, Vec3};

    // ------------------------------------------------------------------ helpers

    fn clean_parts() -> (TriangleLayout, LabeledTriangle, SharedBasis) {
        let layout = TriangleLayout::default();
        let triangle =
            LabeledTriangle::classify(layout.corner_offsets(), &layout).expect("clean corners");
        let basis = SharedBasis::from_triangle(&triangle).expect("clean basis");
        (layout, triangle, basis)
    }

    fn identity_basis_with_axes(axes: [Vec3; 3]) -> SharedBasis {
        SharedBasis {
            origin: Vec3::zero(),
            axes,
            rotation: Quat::identity(),
        }
    }

    // ------------------------------------------------------------------ standard set

    #[test]
    fn clean_candidate_passes_standard_rules() {
        let (layout, triangle, basis) = clean_parts();
        let verifier = CalibrationVerifier::with_standard_rules(layout);
        assert!(verifier
            .verify(&CalibrationCandidate::new(&triangle, &basis))
            .is_ok());
    }

    #[test]
    fn empty_verifier_always_passes() {
        let (_, triangle, basis) = clean_parts();
        let verifier = CalibrationVerifier::new();
        assert!(verifier
            .verify(&CalibrationCandidate::new(&triangle, &basis))
            .is_ok());
    }

    // ------------------------------------------------------------------ SideLengthRule

    #[test]
    fn side_length_rule_rejects_scaled_triangle() {
        let (layout, _, basis) = clean_parts();
        // A triangle 25% larger than advertised: correct proportions,
        // wrong room.
        let scaled = LabeledTriangle {
            origin: Vec3::zero(),
            x_end: Vec3::new(0.5, 0.0, 0.0),
            y_end: Vec3::new(0.0, 0.375, 0.0),
        };
        let rule = SideLengthRule { layout };
        let result = rule.check(&CalibrationCandidate::new(&scaled, &basis));
        assert!(matches!(result, Err(ShareError::Geometry(_))));
    }

    #[test]
    fn side_length_rule_names_the_bad_side() {
        let (layout, _, basis) = clean_parts();
        // Only the y-leg is off.
        let skewed = LabeledTriangle {
            origin: Vec3::zero(),
            x_end: Vec3::new(0.4, 0.0, 0.0),
            y_end: Vec3::new(0.0, 0.45, 0.0),
        };
        let rule = SideLengthRule { layout };
        let err = rule
            .check(&CalibrationCandidate::new(&skewed, &basis))
            .unwrap_err();
        assert!(err.to_string().contains("y-leg"));
    }

    #[test]
    fn side_length_rule_skips_single_anchor_candidates() {
        let (layout, _, basis) = clean_parts();
        let rule = SideLengthRule { layout };
        // No triangle to measure.
        assert!(rule
            .check(&CalibrationCandidate::single_anchor(&basis))
            .is_ok());
    }

    // ------------------------------------------------------------------ OrthonormalityRule

    #[test]
    fn orthonormality_rule_accepts_derived_basis() {
        let (_, _, basis) = clean_parts();
        let rule = OrthonormalityRule::default();
        assert!(rule
            .check(&CalibrationCandidate::single_anchor(&basis))
            .is_ok());
    }

    #[test]
    fn orthonormality_rule_rejects_stretched_axis() {
        let basis = identity_basis_with_axes([
            Vec3::new(1.1, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ]);
        let rule = OrthonormalityRule::default();
        let result = rule.check(&CalibrationCandidate::single_anchor(&basis));
        assert!(matches!(result, Err(ShareError::Geometry(_))));
    }

    #[test]
    fn orthonormality_rule_rejects_skewed_axes() {
        // Unit axes, but x and y lean into each other.
        let lean = Vec3::new(1.0, 0.1, 0.0)
            .normalized()
            .expect("non-zero axis");
        let basis = identity_basis_with_axes([
            Vec3::new(1.0, 0.0, 0.0),
            lean,
            Vec3::new(0.0, 0.0, 1.0),
        ]);
        let rule = OrthonormalityRule::default();
        let result = rule.check(&CalibrationCandidate::single_anchor(&basis));
        assert!(matches!(result, Err(ShareError::Geometry(_))));
    }

    // ------------------------------------------------------------------ HandednessRule

    #[test]
    fn handedness_rule_rejects_mirrored_frame() {
        let basis = identity_basis_with_axes([
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, -1.0),
        ]);
        let result = HandednessRule.check(&CalibrationCandidate::single_anchor(&basis));
        assert!(matches!(result, Err(ShareError::Geometry(_))));
    }

    #[test]
    fn handedness_rule_accepts_derived_basis() {
        let (_, _, basis) = clean_parts();
        assert!(HandednessRule
            .check(&CalibrationCandidate::single_anchor(&basis))
            .is_ok());
    }

    // ------------------------------------------------------------------ Multiple rules

    #[test]
    fn first_failing_rule_short_circuits() {
        let (layout, _, _) = clean_parts();
        // Both the sides and the axes are wrong; the side rule fires first.
        let scaled = LabeledTriangle {
            origin: Vec3::zero(),
            x_end: Vec3::new(0.8, 0.0, 0.0),
            y_end: Vec3::new(0.0, 0.6, 0.0),
        };
        let crooked = identity_basis_with_axes([
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ]);
        let verifier = CalibrationVerifier::with_standard_rules(layout);
        let err = verifier
            .verify(&CalibrationCandidate::new(&scaled, &crooked))
            .unwrap_err();
        assert!(err.to_string().contains("side_length"));
    }
}
