//! Generic `AnchorSession` trait for cloud-anchor services.
//!
//! The protocol needs exactly four things from an anchor service: a session
//! lifecycle, an environment-capture readiness signal, anchor creation with
//! an expiration, and an asynchronous watch that resolves advertised
//! identifiers into poses.  Everything above this crate only ever talks to
//! the trait, so the real SDK can be swapped for the in-process
//! [`sim`][crate::sim] without touching protocol logic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coframe_space::Pose;
use coframe_types::{AnchorId, LocateStatus, ShareError};
use tokio::sync::mpsc;

/// How much of the surrounding environment the device has captured.
///
/// Anchor services refuse to pin an anchor until the device has scanned
/// enough of its surroundings; callers poll this and keep scanning until
/// [`ready`][Self::ready] reports `true`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureReadiness {
    /// Scanned fraction of what the service requires; creation is allowed
    /// from 1.0 upward.
    pub progress: f32,
}

impl CaptureReadiness {
    pub fn ready(&self) -> bool {
        self.progress >= 1.0
    }
}

/// One watched anchor resolved (or given up on) by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedAnchor {
    pub id: AnchorId,
    /// Pose in the watching client's world frame.  Meaningful only when
    /// `status` is [`LocateStatus::Located`].
    pub pose: Pose,
    pub status: LocateStatus,
}

/// Handle to a running locate operation.
///
/// Events arrive asynchronously, one per watched identifier.  Dropping the
/// watcher stops the watch.
pub struct AnchorWatcher {
    events: mpsc::Receiver<LocatedAnchor>,
}

impl AnchorWatcher {
    pub fn new(events: mpsc::Receiver<LocatedAnchor>) -> Self {
        Self { events }
    }

    /// Wait for the next located-anchor event.  `None` means the watch has
    /// delivered everything it ever will.
    pub async fn next(&mut self) -> Option<LocatedAnchor> {
        self.events.recv().await
    }

    /// Non-blocking variant for tick-driven callers.
    pub fn try_next(&mut self) -> Option<LocatedAnchor> {
        self.events.try_recv().ok()
    }
}

/// A cloud-anchor service session.
///
/// # Contract
///
/// * Creation requires a started session *and* full capture readiness;
///   violating either fails with [`ShareError::Anchor`] (`stage: "create"`).
/// * [`watch`][Self::watch] yields one [`LocatedAnchor`] per requested
///   identifier: `Located` with a world-frame pose on success, `NotLocated`
///   for unknown or expired anchors, `AlreadyTracked` when the session has
///   already resolved that identifier.
#[async_trait]
pub trait AnchorSession: Send + Sync {
    /// Start the service session.  Idempotent.
    async fn start_session(&mut self) -> Result<(), ShareError>;

    /// Stop the session and discard its tracking state, including capture
    /// readiness.
    async fn stop_session(&mut self) -> Result<(), ShareError>;

    /// Poll environment-capture readiness.  Polling doubles as scanning:
    /// each call models the device taking in more of its surroundings.
    async fn capture_readiness(&mut self) -> Result<CaptureReadiness, ShareError>;

    /// Pin a cloud anchor at `pose` (in this client's world frame) and
    /// return its server-assigned identifier.  The anchor stops being
    /// locatable after `expires_at`.
    async fn create_anchor(
        &mut self,
        pose: Pose,
        expires_at: DateTime<Utc>,
    ) -> Result<AnchorId, ShareError>;

    /// Delete a previously created anchor from the service.
    async fn delete_anchor(&mut self, id: &AnchorId) -> Result<(), ShareError>;

    /// Start locating the given identifiers.  Requires a started session.
    async fn watch(&mut self, ids: Vec<AnchorId>) -> Result<AnchorWatcher, ShareError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use coframe_space::{Quat, Vec3};

    #[test]
    fn readiness_threshold() {
        assert!(!CaptureReadiness { progress: 0.0 }.ready());
        assert!(!CaptureReadiness { progress: 0.99 }.ready());
        assert!(CaptureReadiness { progress: 1.0 }.ready());
        assert!(CaptureReadiness { progress: 1.3 }.ready());
    }

    #[tokio::test]
    async fn watcher_yields_events_then_ends() {
        let (tx, rx) = mpsc::channel(4);
        let mut watcher = AnchorWatcher::new(rx);

        tx.send(LocatedAnchor {
            id: AnchorId::from("anchor-0"),
            pose: Pose::new(Vec3::new(1.0, 0.0, 0.0), Quat::identity()),
            status: LocateStatus::Located,
        })
        .await
        .unwrap();
        drop(tx);

        let first = watcher.next().await.unwrap();
        assert_eq!(first.id, AnchorId::from("anchor-0"));
        assert!(watcher.next().await.is_none());
    }

    #[tokio::test]
    async fn try_next_does_not_block() {
        let (tx, rx) = mpsc::channel::<LocatedAnchor>(1);
        let mut watcher = AnchorWatcher::new(rx);
        assert!(watcher.try_next().is_none());
        drop(tx);
    }
}
