//! `coframe-anchors` – the cloud-anchor service seam.
//!
//! Protocol code never talks to an anchor SDK directly; it talks to the
//! [`AnchorSession`][session::AnchorSession] trait.  Drivers can be swapped
//! without touching calibration or replication logic.
//!
//! # Modules
//!
//! - [`session`] – the [`AnchorSession`][session::AnchorSession] trait plus
//!   [`CaptureReadiness`][session::CaptureReadiness],
//!   [`LocatedAnchor`][session::LocatedAnchor], and the async
//!   [`AnchorWatcher`][session::AnchorWatcher] handle.
//! - [`sim`] – [`SimAnchorCloud`][sim::SimAnchorCloud]: an in-process
//!   backend with per-client hidden world frames, locating jitter, latency,
//!   and a capture-readiness ramp, so the full protocol runs headless.

pub mod session;
pub mod sim;

pub use session::{AnchorSession, AnchorWatcher, CaptureReadiness, LocatedAnchor};
pub use sim::{SimAnchorCloud, SimAnchorSession, WorldLink};
