//! `coframe-session` – Protocol safety
//!
//! The guard rails of the sharing protocol.  Nothing here moves a pose; this
//! crate decides what is *allowed* to happen and notices when nothing does.
//!
//! # Modules
//!
//! - [`role_gate`] – [`RoleGate`][role_gate::RoleGate]:
//!   maps each [`ProtocolOp`][coframe_types::ProtocolOp] to the single
//!   [`ClientRole`][coframe_types::ClientRole] allowed to perform it, so a
//!   secondary can never calibrate and a master never locates.
//! - [`calibration_verifier`] – [`CalibrationVerifier`][calibration_verifier::CalibrationVerifier]:
//!   a rule engine that validates a candidate frame (classified triangle plus
//!   derived [`SharedBasis`][coframe_space::SharedBasis]) against geometric
//!   invariants before it is adopted as the room frame.
//! - [`watchdog`] – [`Watchdog`][watchdog::Watchdog]:
//!   tracks heartbeats from the locating and streaming stages and reports the
//!   ones that have gone quiet so a supervisor can raise session alerts.

pub mod calibration_verifier;
pub mod role_gate;
pub mod watchdog;

pub use calibration_verifier::{
    CalibrationCandidate, CalibrationVerifier, HandednessRule, OrthonormalityRule, Rule,
    SideLengthRule,
};
pub use role_gate::RoleGate;
pub use watchdog::{Liveness, StalledComponent, Watchdog};
