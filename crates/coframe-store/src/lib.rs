//! `coframe-store` – Durable state
//!
//! What little of a sharing session survives a restart, kept in a local
//! SQLite substrate.
//!
//! # Modules
//!
//! - [`ledger`] – [`AnchorLedger`][ledger::AnchorLedger]: persists the ids,
//!   room, sequence and advertised layout of every anchor this client has
//!   pinned, so a restarted master can find (and eventually purge) its own
//!   anchors instead of abandoning them in the cloud.

pub mod ledger;

pub use ledger::{AnchorLedger, AnchorRecord, LedgerError};
