//! In-process simulated anchor cloud for headless testing.
//!
//! [`SimAnchorCloud`] plays the role of the anchor service's backend: a
//! store of anchors pinned to a hidden *physical* frame.  Each client gets
//! its own [`SimAnchorSession`], configured with a [`WorldLink`]: the
//! ground-truth rigid mapping between the physical frame and that client's
//! world frame.  Real devices get the equivalent from their tracking system;
//! the protocol never sees it, and tests use it to check that two clients
//! agree about physical space.
//!
//! Creation maps the client-local pose into the physical frame for storage;
//! watching maps stored anchors back into the watching client's frame, plus
//! optional locating jitter and latency.  Expired anchors are reported as
//! [`LocateStatus::NotLocated`], like the real service.
//!
//! # Example
//!
//! ```rust
//! use coframe_anchors::session::AnchorSession;
//! use coframe_anchors::sim::{SimAnchorCloud, WorldLink};
//! use coframe_space::{Pose, Quat, Vec3};
//!
//! tokio::runtime::Runtime::new().unwrap().block_on(async {
//!     let cloud = SimAnchorCloud::new();
//!     let mut session = cloud.session(WorldLink::identity()).with_seed(7);
//!     session.start_session().await.unwrap();
//!     while !session.capture_readiness().await.unwrap().ready() {}
//!
//!     let expires = chrono::Utc::now() + chrono::Duration::days(3);
//!     session
//!         .create_anchor(Pose::new(Vec3::new(1.0, 0.0, 0.0), Quat::identity()), expires)
//!         .await
//!         .unwrap();
//!     assert_eq!(cloud.anchor_count().await, 1);
//! });
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coframe_space::{Pose, Quat, Vec3};
use coframe_types::{AnchorId, LocateStatus, ShareError};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;
use uuid::Uuid;

use crate::session::{AnchorSession, AnchorWatcher, CaptureReadiness, LocatedAnchor};

/// Readiness gained per [`capture_readiness`][AnchorSession::capture_readiness]
/// poll; the default makes a session ready on its third poll.
pub const DEFAULT_READINESS_STEP: f32 = 0.34;

// ────────────────────────────────────────────────────────────────────────────
// WorldLink
// ────────────────────────────────────────────────────────────────────────────

/// Ground-truth rigid mapping from the hidden physical frame into one
/// client's world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldLink {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl WorldLink {
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The client whose world frame coincides with the physical frame.
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quat::identity())
    }

    /// Map a physical-frame pose into this client's world frame.
    pub fn to_world(&self, physical: &Pose) -> Pose {
        Pose::new(
            self.translation.add(self.rotation.rotate(physical.position)),
            self.rotation.mul(physical.rotation).normalized(),
        )
    }

    /// Map a world-frame pose of this client back into the physical frame.
    pub fn to_physical(&self, world: &Pose) -> Pose {
        let inverse = self.rotation.conjugate();
        Pose::new(
            inverse.rotate(world.position.sub(self.translation)),
            inverse.mul(world.rotation).normalized(),
        )
    }

    /// Map a physical-frame point into this client's world frame.
    pub fn to_world_point(&self, physical: Vec3) -> Vec3 {
        self.translation.add(self.rotation.rotate(physical))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimAnchorCloud
// ────────────────────────────────────────────────────────────────────────────

struct StoredAnchor {
    /// Pose in the hidden physical frame.
    pose: Pose,
    expires_at: DateTime<Utc>,
}

/// The simulated service backend, shared by every session in a test or demo.
/// Clone it cheaply; all clones share the same anchor store.
#[derive(Clone)]
pub struct SimAnchorCloud {
    anchors: Arc<Mutex<HashMap<AnchorId, StoredAnchor>>>,
}

impl SimAnchorCloud {
    pub fn new() -> Self {
        Self {
            anchors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Open a session for one client, identified by its hidden world link.
    /// Configure it further with the `with_*` builder methods.
    pub fn session(&self, link: WorldLink) -> SimAnchorSession {
        SimAnchorSession {
            cloud: self.clone(),
            link,
            noise_metres: 0.0,
            locate_latency: Duration::ZERO,
            readiness_step: DEFAULT_READINESS_STEP,
            progress: 0.0,
            started: false,
            tracked: Arc::new(Mutex::new(HashSet::new())),
            rng: SmallRng::from_os_rng(),
        }
    }

    /// Number of anchors currently stored (expired ones included).
    pub async fn anchor_count(&self) -> usize {
        self.anchors.lock().await.len()
    }

    async fn insert(&self, id: AnchorId, pose: Pose, expires_at: DateTime<Utc>) {
        self.anchors
            .lock()
            .await
            .insert(id, StoredAnchor { pose, expires_at });
    }

    async fn remove(&self, id: &AnchorId) -> bool {
        self.anchors.lock().await.remove(id).is_some()
    }

    /// Physical-frame pose of an anchor, if it exists and has not expired.
    async fn locate(&self, id: &AnchorId, now: DateTime<Utc>) -> Option<Pose> {
        let anchors = self.anchors.lock().await;
        anchors
            .get(id)
            .filter(|stored| stored.expires_at > now)
            .map(|stored| stored.pose)
    }
}

impl Default for SimAnchorCloud {
    fn default() -> Self {
        Self::new()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimAnchorSession
// ────────────────────────────────────────────────────────────────────────────

/// One client's session against the [`SimAnchorCloud`].
pub struct SimAnchorSession {
    cloud: SimAnchorCloud,
    link: WorldLink,
    noise_metres: f32,
    locate_latency: Duration,
    readiness_step: f32,
    progress: f32,
    started: bool,
    tracked: Arc<Mutex<HashSet<AnchorId>>>,
    rng: SmallRng,
}

impl SimAnchorSession {
    /// Per-axis locating jitter amplitude in metres (uniform in ±metres).
    pub fn with_noise(mut self, metres: f32) -> Self {
        self.noise_metres = metres.max(0.0);
        self
    }

    /// Delay before located-anchor events start arriving.
    pub fn with_locate_latency(mut self, latency: Duration) -> Self {
        self.locate_latency = latency;
        self
    }

    /// Readiness gained per capture poll.
    pub fn with_readiness_step(mut self, step: f32) -> Self {
        self.readiness_step = step.max(0.0);
        self
    }

    /// Seed the jitter source for deterministic tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// The hidden world link this session was configured with.  Tests use it
    /// as ground truth; protocol code must never touch it.
    pub fn world_link(&self) -> WorldLink {
        self.link
    }

    fn ensure_started(&self, stage: &str) -> Result<(), ShareError> {
        if self.started {
            Ok(())
        } else {
            Err(ShareError::Anchor {
                stage: stage.to_string(),
                details: "session not started".to_string(),
            })
        }
    }
}

fn jitter(rng: &mut SmallRng, amplitude: f32) -> Vec3 {
    if amplitude <= 0.0 {
        return Vec3::zero();
    }
    Vec3::new(
        rng.random_range(-amplitude..=amplitude),
        rng.random_range(-amplitude..=amplitude),
        rng.random_range(-amplitude..=amplitude),
    )
}

#[async_trait]
impl AnchorSession for SimAnchorSession {
    async fn start_session(&mut self) -> Result<(), ShareError> {
        self.started = true;
        Ok(())
    }

    async fn stop_session(&mut self) -> Result<(), ShareError> {
        self.started = false;
        self.progress = 0.0;
        self.tracked.lock().await.clear();
        Ok(())
    }

    async fn capture_readiness(&mut self) -> Result<CaptureReadiness, ShareError> {
        self.ensure_started("readiness")?;
        self.progress += self.readiness_step;
        Ok(CaptureReadiness {
            progress: self.progress,
        })
    }

    async fn create_anchor(
        &mut self,
        pose: Pose,
        expires_at: DateTime<Utc>,
    ) -> Result<AnchorId, ShareError> {
        self.ensure_started("create")?;
        if self.progress < 1.0 {
            return Err(ShareError::Anchor {
                stage: "create".to_string(),
                details: format!(
                    "capture readiness {:.2} below 1.0; keep scanning",
                    self.progress
                ),
            });
        }

        let id = AnchorId(Uuid::new_v4().to_string());
        let physical = self.link.to_physical(&pose);
        self.cloud.insert(id.clone(), physical, expires_at).await;
        debug!(anchor_id = %id, %expires_at, "pinned sim anchor");
        Ok(id)
    }

    async fn delete_anchor(&mut self, id: &AnchorId) -> Result<(), ShareError> {
        self.ensure_started("delete")?;
        if self.cloud.remove(id).await {
            debug!(anchor_id = %id, "deleted sim anchor");
            Ok(())
        } else {
            Err(ShareError::Anchor {
                stage: "delete".to_string(),
                details: format!("unknown anchor {id}"),
            })
        }
    }

    async fn watch(&mut self, ids: Vec<AnchorId>) -> Result<AnchorWatcher, ShareError> {
        self.ensure_started("watch")?;

        let (tx, rx) = mpsc::channel(ids.len().max(1));
        let cloud = self.cloud.clone();
        let link = self.link;
        let noise = self.noise_metres;
        let latency = self.locate_latency;
        let tracked = Arc::clone(&self.tracked);
        let mut task_rng = SmallRng::seed_from_u64(self.rng.random());

        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            for id in ids {
                let already = !tracked.lock().await.insert(id.clone());
                let event = if already {
                    LocatedAnchor {
                        id,
                        pose: Pose::identity(),
                        status: LocateStatus::AlreadyTracked,
                    }
                } else {
                    match cloud.locate(&id, Utc::now()).await {
                        Some(physical) => {
                            let mut pose = link.to_world(&physical);
                            pose.position = pose.position.add(jitter(&mut task_rng, noise));
                            LocatedAnchor {
                                id,
                                pose,
                                status: LocateStatus::Located,
                            }
                        }
                        None => LocatedAnchor {
                            id,
                            pose: Pose::identity(),
                            status: LocateStatus::NotLocated,
                        },
                    }
                };
                debug!(anchor_id = %event.id, status = ?event.status, "sim locate event");
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(AnchorWatcher::new(rx))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use coframe_space::{LabeledTriangle, SharedBasis, TriangleLayout};

    fn expires_soonish() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::days(3)
    }

    async fn ready_session(cloud: &SimAnchorCloud, link: WorldLink) -> SimAnchorSession {
        let mut session = cloud.session(link).with_seed(42);
        session.start_session().await.unwrap();
        while !session.capture_readiness().await.unwrap().ready() {}
        session
    }

    #[tokio::test]
    async fn create_requires_started_session() {
        let cloud = SimAnchorCloud::new();
        let mut session = cloud.session(WorldLink::identity());
        let err = session
            .create_anchor(Pose::identity(), expires_soonish())
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::Anchor { ref stage, .. } if stage == "create"));
    }

    #[tokio::test]
    async fn create_requires_capture_readiness() {
        let cloud = SimAnchorCloud::new();
        let mut session = cloud.session(WorldLink::identity());
        session.start_session().await.unwrap();
        // One poll is not enough at the default ramp.
        session.capture_readiness().await.unwrap();
        let err = session
            .create_anchor(Pose::identity(), expires_soonish())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("readiness"));
    }

    #[tokio::test]
    async fn readiness_ramps_up_with_polling() {
        let cloud = SimAnchorCloud::new();
        let mut session = cloud.session(WorldLink::identity());
        session.start_session().await.unwrap();

        let mut polls = 0;
        let mut last = 0.0;
        loop {
            let readiness = session.capture_readiness().await.unwrap();
            assert!(readiness.progress > last);
            last = readiness.progress;
            polls += 1;
            if readiness.ready() {
                break;
            }
            assert!(polls < 20, "ramp never reached readiness");
        }
        assert_eq!(polls, 3);
    }

    #[tokio::test]
    async fn watcher_delivers_anchors_in_the_watchers_frame() {
        let cloud = SimAnchorCloud::new();
        let layout = TriangleLayout::default();

        // Master pins the triangle in its own world frame.
        let master_link = WorldLink::identity();
        let mut master = ready_session(&cloud, master_link).await;
        let calibration = Pose::new(
            Vec3::new(1.0, 0.5, -0.2),
            Quat::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), 0.8),
        );
        let mut ids = Vec::new();
        let mut created = Vec::new();
        for pose in layout.corner_poses(&calibration) {
            ids.push(master.create_anchor(pose, expires_soonish()).await.unwrap());
            created.push(pose);
        }

        // Secondary lives in an unrelated world frame.
        let secondary_link = WorldLink::new(
            Vec3::new(5.0, 0.0, -2.0),
            Quat::from_axis_angle(Vec3::new(0.1, 1.0, 0.0), 1.7),
        );
        let mut secondary = ready_session(&cloud, secondary_link).await;
        let mut watcher = secondary.watch(ids.clone()).await.unwrap();

        let mut located = Vec::new();
        while let Some(event) = watcher.next().await {
            assert_eq!(event.status, LocateStatus::Located);
            located.push(event);
        }
        assert_eq!(located.len(), 3);

        // Ground truth: each located pose is the created pose carried from
        // the master's frame through the physical frame into the secondary's.
        for (event, created_pose) in located.iter().zip(&created) {
            let physical = master_link.to_physical(created_pose);
            let expected = secondary_link.to_world(&physical);
            assert!(event.pose.position.distance(expected.position) < 1e-4);
        }

        // And the located triple classifies into a valid shared basis.
        let points = [
            located[0].pose.position,
            located[1].pose.position,
            located[2].pose.position,
        ];
        let triangle = LabeledTriangle::classify(points, &layout).unwrap();
        SharedBasis::from_triangle(&triangle).unwrap();
    }

    #[tokio::test]
    async fn unknown_anchor_reports_not_located() {
        let cloud = SimAnchorCloud::new();
        let mut session = ready_session(&cloud, WorldLink::identity()).await;
        let mut watcher = session
            .watch(vec![AnchorId::from("never-created")])
            .await
            .unwrap();
        let event = watcher.next().await.unwrap();
        assert_eq!(event.status, LocateStatus::NotLocated);
    }

    #[tokio::test]
    async fn expired_anchor_is_not_located() {
        let cloud = SimAnchorCloud::new();
        let mut master = ready_session(&cloud, WorldLink::identity()).await;
        let expired = Utc::now() - chrono::Duration::hours(1);
        let id = master
            .create_anchor(Pose::new(Vec3::new(1.0, 0.0, 0.0), Quat::identity()), expired)
            .await
            .unwrap();

        let mut watcher = master.watch(vec![id]).await.unwrap();
        let event = watcher.next().await.unwrap();
        assert_eq!(event.status, LocateStatus::NotLocated);
    }

    #[tokio::test]
    async fn rewatching_a_tracked_anchor_reports_already_tracked() {
        let cloud = SimAnchorCloud::new();
        let mut session = ready_session(&cloud, WorldLink::identity()).await;
        let id = session
            .create_anchor(Pose::identity(), expires_soonish())
            .await
            .unwrap();

        let mut first = session.watch(vec![id.clone()]).await.unwrap();
        assert_eq!(first.next().await.unwrap().status, LocateStatus::Located);

        let mut second = session.watch(vec![id]).await.unwrap();
        assert_eq!(
            second.next().await.unwrap().status,
            LocateStatus::AlreadyTracked
        );
    }

    #[tokio::test]
    async fn deleted_anchor_is_gone_from_the_cloud() {
        let cloud = SimAnchorCloud::new();
        let mut session = ready_session(&cloud, WorldLink::identity()).await;
        let id = session
            .create_anchor(Pose::identity(), expires_soonish())
            .await
            .unwrap();
        assert_eq!(cloud.anchor_count().await, 1);

        session.delete_anchor(&id).await.unwrap();
        assert_eq!(cloud.anchor_count().await, 0);

        let err = session.delete_anchor(&id).await.unwrap_err();
        assert!(matches!(err, ShareError::Anchor { ref stage, .. } if stage == "delete"));
    }

    #[tokio::test]
    async fn locating_jitter_is_bounded() {
        let cloud = SimAnchorCloud::new();
        let mut master = ready_session(&cloud, WorldLink::identity()).await;
        let truth = Pose::new(Vec3::new(0.5, 1.0, 2.0), Quat::identity());
        let id = master.create_anchor(truth, expires_soonish()).await.unwrap();

        let mut observer = cloud
            .session(WorldLink::identity())
            .with_noise(0.005)
            .with_seed(9);
        observer.start_session().await.unwrap();
        let mut watcher = observer.watch(vec![id]).await.unwrap();
        let event = watcher.next().await.unwrap();
        assert_eq!(event.status, LocateStatus::Located);
        // Per-axis jitter of ±5 mm keeps the fix within ~9 mm of the truth.
        assert!(event.pose.position.distance(truth.position) < 0.009);
    }

    #[test]
    fn world_link_roundtrips() {
        let link = WorldLink::new(
            Vec3::new(-2.0, 1.0, 4.0),
            Quat::from_axis_angle(Vec3::new(0.3, 1.0, -0.1), 1.2),
        );
        let pose = Pose::new(
            Vec3::new(0.7, -0.4, 2.2),
            Quat::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), 0.5),
        );
        let back = link.to_physical(&link.to_world(&pose));
        assert!(back.position.distance(pose.position) < 1e-4);
        assert!(back.rotation.same_rotation(pose.rotation, 1e-4));
    }
}
