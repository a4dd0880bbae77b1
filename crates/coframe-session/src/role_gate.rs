//! [`RoleGate`] – protocol role enforcement.
//!
//! The replication framework assigns exactly one master per room, and the
//! sharing protocol reserves every state-mutating operation for it; anchor
//! locating is the one job that belongs to the secondaries still searching
//! for the frame.  Call [`RoleGate::authorize`] before executing any
//! [`ProtocolOp`]; a mismatch returns [`ShareError::RoleDenied`] and the
//! operation must **not** run.

use coframe_types::{ClientRole, ProtocolOp, ShareError};
use tracing::warn;

/// Maps each [`ProtocolOp`] to the single [`ClientRole`] allowed to perform
/// it and rejects everything else.
///
/// # Example
///
/// ```
/// use coframe_session::RoleGate;
/// use coframe_types::{ClientRole, ProtocolOp};
///
/// let gate = RoleGate::new();
/// assert!(gate.authorize(ClientRole::Master, ProtocolOp::Calibrate).is_ok());
/// assert!(gate.authorize(ClientRole::Secondary, ProtocolOp::Calibrate).is_err());
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct RoleGate;

impl RoleGate {
    /// Create the gate.  The policy is fixed by the protocol.
    pub fn new() -> Self {
        Self
    }

    /// The role an operation is reserved for.
    ///
    /// | Operation | Allowed role |
    /// |-----------|--------------|
    /// | `Calibrate` | master |
    /// | `AdvertiseAnchors` | master |
    /// | `SpawnObject` | master |
    /// | `ResetObjects` | master |
    /// | `LocateAnchors` | secondary |
    pub fn required_role(op: ProtocolOp) -> ClientRole {
        match op {
            ProtocolOp::Calibrate
            | ProtocolOp::AdvertiseAnchors
            | ProtocolOp::SpawnObject
            | ProtocolOp::ResetObjects => ClientRole::Master,
            ProtocolOp::LocateAnchors => ClientRole::Secondary,
        }
    }

    /// Return `Ok(())` when `role` may perform `op`, or
    /// [`ShareError::RoleDenied`] otherwise.
    pub fn authorize(&self, role: ClientRole, op: ProtocolOp) -> Result<(), ShareError> {
        if role == Self::required_role(op) {
            Ok(())
        } else {
            warn!(%role, %op, "role gate denied operation");
            Err(ShareError::RoleDenied { role, op })
        }
    }
}
