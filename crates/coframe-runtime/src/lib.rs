//! `coframe-runtime` – The co-location client
//!
//! The orchestration layer that turns the lower crates into a working
//! sharing client: one [`ShareClient`][client::ShareClient] per device,
//! driven by non-blocking ticks.
//!
//! # Modules
//!
//! - [`client`] – [`ShareClient`][client::ShareClient]:
//!   the protocol orchestrator that wires together the room transport, the
//!   anchor session, the [`CalibrationVerifier`][coframe_session::CalibrationVerifier],
//!   the [`Watchdog`][coframe_session::Watchdog], the
//!   [`AnchorLedger`][coframe_store::AnchorLedger], and the rate-limited
//!   state stream.  Masters calibrate and advertise; secondaries locate and
//!   verify; both replicate object poses as shared-frame scalars from
//!   `FrameReady` on.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export
//!   to Jaeger, Grafana Tempo, or any OTLP-compatible collector.
//!
//! # Role gating
//!
//! Every privileged operation a [`ShareClient`][client::ShareClient] performs
//! passes through the [`RoleGate`][coframe_session::RoleGate] first, so a
//! secondary can never calibrate, advertise, spawn, or reset no matter what
//! its caller asks for.

pub mod client;
pub mod telemetry;

pub use client::{ClientConfig, ShareClient, SharePhase, SharedObject};
pub use telemetry::{init_tracing, TracerProviderGuard};
