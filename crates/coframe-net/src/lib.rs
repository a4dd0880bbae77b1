//! `coframe-net` – replication plumbing.
//!
//! The protocol's traffic runs over two seams: an internal typed event bus
//! for observability, and the room transport that carries
//! [`SyncMessage`][coframe_types::SyncMessage]s between clients.  The real
//! replication framework stays behind the [`RoomTransport`][room::RoomTransport]
//! trait; [`LoopbackRoom`][room::LoopbackRoom] stands in for it in tests and
//! the demo shell.
//!
//! # Modules
//!
//! - [`bus`] – [`EventBus`][bus::EventBus]: topic-laned broadcast bus
//!   (state stream, RPC, anchor events, session alerts).
//! - [`room`] – [`RoomTransport`][room::RoomTransport] trait, scoped
//!   delivery, join-order master assignment and migration,
//!   [`LoopbackRoom`][room::LoopbackRoom].
//! - [`stream`] – [`StateStreamPublisher`][stream::StateStreamPublisher]:
//!   last-value coalescing with a bounded send rate.
//! - [`ownership`] – [`OwnershipRegistry`][ownership::OwnershipRegistry]:
//!   object → owner map with takeover semantics.

pub mod bus;
pub mod ownership;
pub mod room;
pub mod stream;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use ownership::OwnershipRegistry;
pub use room::{LoopbackClient, LoopbackRoom, RoomTransport, Scope, TransportEvent};
pub use stream::{DEFAULT_STREAM_HZ, StateStreamPublisher};
