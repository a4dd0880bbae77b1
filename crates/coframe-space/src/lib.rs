//! `coframe-space` – geometry core of the shared-frame protocol.
//!
//! Turns located anchor positions into the mathematical structure two
//! clients need to agree about physical space while knowing nothing about
//! each other's world coordinates.
//!
//! # Modules
//!
//! - [`math`] – [`Vec3`][math::Vec3], [`Quat`][math::Quat],
//!   [`Pose`][math::Pose]: the `f32` primitives every other crate builds on.
//! - [`triangle`] – [`TriangleLayout`][triangle::TriangleLayout] and
//!   [`LabeledTriangle`][triangle::LabeledTriangle]: the calibration
//!   triangle's dimensions and the distance-based corner classification.
//! - [`basis`] – [`SharedBasis`][basis::SharedBasis] /
//!   [`SharedPose`][basis::SharedPose]: shared-frame derivation and the
//!   anchor-relative wire encoding of replicated poses.

use thiserror::Error;

pub mod basis;
pub mod math;
pub mod triangle;

pub use basis::{SharedBasis, SharedPose};
pub use math::{Pose, Quat, Vec3};
pub use triangle::{LabeledTriangle, TriangleLayout};

/// Geometry failures: bad layouts, unclassifiable anchor triples, degenerate
/// bases.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    #[error("invalid triangle layout: {0}")]
    InvalidLayout(String),

    #[error("degenerate triangle: {0}")]
    DegenerateTriangle(String),

    #[error("triangle side {side} measured {measured:.3} m, expected {expected:.3} m")]
    LayoutMismatch {
        side: &'static str,
        measured: f32,
        expected: f32,
    },

    #[error("degenerate basis: {0}")]
    DegenerateBasis(String),
}
