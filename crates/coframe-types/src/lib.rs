//! `coframe-types` – shared vocabulary of the co-location protocol.
//!
//! Identifiers, roles, the replicated message set, bus events, and the
//! workspace-wide error type.  Everything here is serde-serializable: these
//! are the types that cross the room transport and the internal event bus.

use std::fmt;

use chrono::{DateTime, Utc};
use coframe_space::{SharedPose, SpaceError, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Server-assigned identifier of a cloud anchor.  Clients never invent
/// these; they come back from the anchor service on creation and are the
/// only thing the protocol shares about an anchor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnchorId(pub String);

impl AnchorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnchorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identity of a shared object, stable across all clients in the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub Uuid);

impl ObjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one client in the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role the replication framework assigns on join: the first client in the
/// room is the master, everyone after is secondary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientRole {
    Master,
    Secondary,
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientRole::Master => f.write_str("master"),
            ClientRole::Secondary => f.write_str("secondary"),
        }
    }
}

/// Outcome the anchor service reports for one watched anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocateStatus {
    /// Fresh position fix in the watching client's world frame.
    Located,
    /// The service gave up on this identifier.
    NotLocated,
    /// The anchor was already being tracked by this session.
    AlreadyTracked,
}

/// Protocol operations subject to role gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolOp {
    /// Pin the calibration anchors (master only).
    Calibrate,
    /// Broadcast created anchor ids to the room (master only).
    AdvertiseAnchors,
    /// Watch for advertised anchors (secondary only).
    LocateAnchors,
    /// Introduce a new shared object (master only).
    SpawnObject,
    /// Snap every shared object back to the frame origin (master only).
    ResetObjects,
}

impl fmt::Display for ProtocolOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolOp::Calibrate => "calibrate",
            ProtocolOp::AdvertiseAnchors => "advertise-anchors",
            ProtocolOp::LocateAnchors => "locate-anchors",
            ProtocolOp::SpawnObject => "spawn-object",
            ProtocolOp::ResetObjects => "reset-objects",
        };
        f.write_str(name)
    }
}

/// The replicated message vocabulary.  Everything a client sends to its
/// peers is one of these; note that poses travel only as [`SharedPose`],
/// never as world-frame vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum SyncMessage {
    /// Master → others, once per created calibration anchor.  Carries the
    /// triangle dimensions so every secondary validates against the same
    /// layout it was built with.
    AnchorAdvertise {
        anchor_id: AnchorId,
        /// Position of this anchor in the creation order (0-based).
        seq: u8,
        /// How many anchors the full calibration set contains.
        expected: u8,
        x_leg: f32,
        y_leg: f32,
    },
    /// Owner → others: one shared object's pose in anchor-relative form.
    StateUpdate {
        object_id: ObjectId,
        pose: SharedPose,
    },
    /// Master → others: a new shared object exists.
    SpawnObject { object_id: ObjectId },
    /// Master → others: snap every shared object to the frame origin.
    ResetObjects,
    /// Announcement that `owner` now drives `object_id`.
    OwnershipTaken {
        object_id: ObjectId,
        owner: ClientId,
    },
}

/// Unified wrapper for everything routed over the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. "coframe-runtime::share_client"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A protocol message, mirrored onto the bus as it is sent or received.
    Sync(SyncMessage),
    /// The watcher resolved (or gave up on) one watched anchor.
    AnchorLocated {
        anchor_id: AnchorId,
        status: LocateStatus,
    },
    /// The local client derived and verified its shared basis.
    FrameReady { origin: Vec3 },
    /// A peer joined the room.
    PeerJoined { client: ClientId, role: ClientRole },
    /// A peer left the room; `promoted` names the new master if the
    /// departure triggered migration.
    PeerLeft {
        client: ClientId,
        promoted: Option<ClientId>,
    },
    /// Protocol safety warning: stalled watcher, rejected calibration,
    /// denied operation.
    SessionAlert { component: String, details: String },
}

/// Global error type spanning the anchor seam, the transport, geometry, and
/// persistence.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShareError {
    #[error("anchor service failure during {stage}: {details}")]
    Anchor { stage: String, details: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("bus channel failure: {0}")]
    Channel(String),

    #[error("geometry failure: {0}")]
    Geometry(String),

    #[error("operation {op} is not permitted for the {role} role")]
    RoleDenied { role: ClientRole, op: ProtocolOp },

    #[error("shared frame not established yet")]
    NotCalibrated,

    #[error("unknown shared object {0}")]
    UnknownObject(ObjectId),

    #[error("object {0} is owned by another client")]
    NotOwner(ObjectId),

    #[error("anchor ledger failure: {0}")]
    Ledger(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<SpaceError> for ShareError {
    fn from(err: SpaceError) -> Self {
        ShareError::Geometry(err.to_string())
    }
}
