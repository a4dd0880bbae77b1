//! [`ShareClient`] – the co-location orchestrator.
//!
//! Wires every seam of the sharing protocol into one tick-driven client.
//! The master path:
//!
//! 1. **Calibrate** – start the anchor session, scan until capture readiness,
//!    pin one anchor per triangle corner with an expiration, record each in
//!    the [`AnchorLedger`], and advertise the ids to the room.
//! 2. **Derive** – classify the *created* corner poses into a
//!    [`LabeledTriangle`], derive the [`SharedBasis`], and run the
//!    [`CalibrationVerifier`] – the same math path a secondary runs on
//!    located poses, minus the locating noise.
//!
//! The secondary path:
//!
//! 3. **Collect** – accumulate `AnchorAdvertise` messages until the full set
//!    announced by the master is in.
//! 4. **Locate** – watch the advertised ids; each located-anchor event
//!    heartbeats the [`Watchdog`], so a silent locate raises a session alert
//!    instead of hanging forever.
//! 5. **Verify** – classify, derive, and verify the located triple; on
//!    success the client is `FrameReady` and replication is live.
//!
//! From `FrameReady` on, both roles speak the same language: object poses
//! travel only as [`SharedPose`] scalars relative to the shared frame, so a
//! pose published by one client lands at the same *physical* spot in every
//! other client's unrelated world coordinates.
//!
//! # Example
//!
//! ```rust,no_run
//! use coframe_anchors::{SimAnchorCloud, WorldLink};
//! use coframe_net::LoopbackRoom;
//! use coframe_runtime::client::{ClientConfig, ShareClient};
//! use coframe_space::Pose;
//!
//! tokio::runtime::Runtime::new().unwrap().block_on(async {
//!     let room = LoopbackRoom::new();
//!     let cloud = SimAnchorCloud::new();
//!
//!     let transport = Box::new(room.join().await);
//!     let session = Box::new(cloud.session(WorldLink::identity()));
//!     let mut master = ShareClient::new(ClientConfig::default(), transport, session).unwrap();
//!
//!     master.calibrate(Pose::identity()).await.unwrap();
//!     master.tick().await.unwrap();
//! });
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use coframe_anchors::{AnchorSession, AnchorWatcher, LocatedAnchor};
use coframe_net::{
    DEFAULT_STREAM_HZ, EventBus, OwnershipRegistry, RoomTransport, Scope, StateStreamPublisher,
    Topic, TransportEvent,
};
use coframe_session::{CalibrationCandidate, CalibrationVerifier, RoleGate, Watchdog};
use coframe_space::{LabeledTriangle, Pose, SharedBasis, SharedPose, TriangleLayout, Vec3};
use coframe_store::{AnchorLedger, AnchorRecord};
use coframe_types::{
    AnchorId, ClientId, ClientRole, Event, EventPayload, LocateStatus, ObjectId, ProtocolOp,
    ShareError, SyncMessage,
};
use tracing::{debug, info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Delay between capture-readiness polls while the device scans.
const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Give up on environment capture after this many readiness polls.
const MAX_READINESS_POLLS: u32 = 200;

/// Anchors a triangle calibration creates.
const TRIANGLE_ANCHOR_COUNT: u8 = 3;

/// Default anchor lifetime on the cloud service.
const DEFAULT_ANCHOR_TTL_DAYS: i64 = 3;

/// Default deadline for a secondary to locate the advertised anchors.
const DEFAULT_LOCATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default silence deadline for an incoming state stream that has already
/// delivered at least one frame.
const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Watchdog stage fed by located-anchor events.
const STAGE_ANCHOR_LOCATE: &str = "anchor-locate";

/// Watchdog stage fed by incoming state-stream frames.
const STAGE_STATE_STREAM: &str = "state-stream";

/// Source tag stamped on every event this module puts on the bus.
const EVENT_SOURCE: &str = "coframe-runtime::share_client";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`ShareClient`].
pub struct ClientConfig {
    /// Human-readable name shown in logs and the demo shell.
    pub display_name: String,
    /// Room this client shares with its peers.
    pub room: String,
    /// Calibration triangle dimensions and noise tolerance.
    pub layout: TriangleLayout,
    /// Outgoing state-stream cadence in updates per second.
    pub stream_hz: u32,
    /// How long created anchors stay locatable on the cloud service.
    pub anchor_ttl: chrono::Duration,
    /// How long a secondary waits for located-anchor events before alerting.
    pub locate_timeout: Duration,
    /// How long an armed incoming state stream may fall silent before a
    /// session alert is raised.
    pub stream_timeout: Duration,
    /// Optional path to the persistent anchor ledger database.
    /// If `None`, created anchors are not recorded (nothing to purge later).
    pub ledger_path: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            display_name: "client".to_string(),
            room: "shared-room".to_string(),
            layout: TriangleLayout::default(),
            stream_hz: DEFAULT_STREAM_HZ,
            anchor_ttl: chrono::Duration::days(DEFAULT_ANCHOR_TTL_DAYS),
            locate_timeout: DEFAULT_LOCATE_TIMEOUT,
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
            ledger_path: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Protocol state
// ─────────────────────────────────────────────────────────────────────────────

/// Where a client stands in the sharing protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharePhase {
    /// In the room, no calibration activity yet.
    Joined,
    /// Master: scanning the environment and pinning anchors.
    Calibrating,
    /// Secondary: collecting anchor advertisements.
    AwaitingAnchors,
    /// Secondary: watching for the advertised anchors.
    Locating,
    /// Shared basis derived and verified; replication is live.
    FrameReady,
}

impl fmt::Display for SharePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SharePhase::Joined => "joined",
            SharePhase::Calibrating => "calibrating",
            SharePhase::AwaitingAnchors => "awaiting-anchors",
            SharePhase::Locating => "locating",
            SharePhase::FrameReady => "frame-ready",
        };
        f.write_str(name)
    }
}

/// Snapshot of one shared object as this client sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SharedObject {
    pub id: ObjectId,
    /// Pose in this client's world frame.
    pub pose: Pose,
    pub owner: Option<ClientId>,
}

/// Anchor advertisements collected so far, keyed by creation order.
struct AdvertisedSet {
    expected: u8,
    x_leg: f32,
    y_leg: f32,
    ids: BTreeMap<u8, AnchorId>,
}

impl AdvertisedSet {
    fn complete(&self) -> bool {
        self.ids.len() == self.expected as usize
    }

    fn seq_of(&self, id: &AnchorId) -> Option<u8> {
        self.ids
            .iter()
            .find(|(_, known)| *known == id)
            .map(|(seq, _)| *seq)
    }

    fn watch_list(&self) -> Vec<AnchorId> {
        self.ids.values().cloned().collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ShareClient
// ─────────────────────────────────────────────────────────────────────────────

/// The co-location orchestrator.
///
/// Owns the room transport, the anchor session, and every protocol safety
/// component, and advances the sharing state machine one
/// [`tick`][Self::tick] at a time.  Ticks never block: they drain whatever
/// room traffic and located-anchor events are already waiting, flush the
/// outgoing state stream, and sweep the watchdog.
pub struct ShareClient {
    config: ClientConfig,
    transport: Box<dyn RoomTransport>,
    anchors: Box<dyn AnchorSession>,
    bus: EventBus,
    gate: RoleGate,
    watchdog: Watchdog,
    ledger: Option<AnchorLedger>,
    publisher: StateStreamPublisher,
    ownership: OwnershipRegistry,
    // ── Frame state ──────────────────────────────────────────────────────────
    phase: SharePhase,
    basis: Option<SharedBasis>,
    /// Shared objects in this client's world frame.
    objects: HashMap<ObjectId, Pose>,
    /// Objects announced before this client had a frame: the latest wire
    /// pose seen, or `None` for a bare spawn.  Placed when the basis lands.
    parked: HashMap<ObjectId, Option<SharedPose>>,
    // ── Master calibration record ────────────────────────────────────────────
    /// Advertisements this client sent, replayed to late joiners.
    advert_log: Vec<SyncMessage>,
    // ── Secondary locate state ───────────────────────────────────────────────
    adverts: Option<AdvertisedSet>,
    watcher: Option<AnchorWatcher>,
    /// Located world-frame poses by advertisement sequence number.
    located: BTreeMap<u8, Pose>,
    // ── Room bookkeeping ─────────────────────────────────────────────────────
    /// Current master, learned from the roster and promotion events.  Heir
    /// for objects whose owner leaves the room.
    master: Option<ClientId>,
    /// `true` once the first incoming state frame has armed the stream
    /// watchdog stage.
    stream_armed: bool,
    last_error: Option<ShareError>,
}

impl ShareClient {
    /// Construct a client around an already-joined room transport and an
    /// anchor session.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::Ledger`] if the configured ledger database
    /// cannot be opened.
    pub fn new(
        config: ClientConfig,
        transport: Box<dyn RoomTransport>,
        anchors: Box<dyn AnchorSession>,
    ) -> Result<Self, ShareError> {
        let ledger = match &config.ledger_path {
            Some(path) => {
                info!(path, "opening persistent anchor ledger");
                Some(AnchorLedger::open(path)?)
            }
            None => {
                debug!("no ledger path configured; created anchors will not be recorded");
                None
            }
        };

        let publisher = StateStreamPublisher::new(config.stream_hz);
        let master = (transport.role() == ClientRole::Master).then(|| transport.client_id());
        info!(
            client = %transport.client_id(),
            role = %transport.role(),
            room = %config.room,
            name = %config.display_name,
            "share client ready"
        );

        Ok(Self {
            config,
            transport,
            anchors,
            bus: EventBus::default(),
            gate: RoleGate::new(),
            watchdog: Watchdog::new(),
            ledger,
            publisher,
            ownership: OwnershipRegistry::new(),
            phase: SharePhase::Joined,
            basis: None,
            objects: HashMap::new(),
            parked: HashMap::new(),
            advert_log: Vec::new(),
            adverts: None,
            watcher: None,
            located: BTreeMap::new(),
            master,
            stream_armed: false,
            last_error: None,
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn client_id(&self) -> ClientId {
        self.transport.client_id()
    }

    /// Current role; flips to master if this client is promoted.
    pub fn role(&self) -> ClientRole {
        self.transport.role()
    }

    pub fn phase(&self) -> SharePhase {
        self.phase
    }

    /// The derived shared basis, once `FrameReady`.
    pub fn basis(&self) -> Option<SharedBasis> {
        self.basis
    }

    pub fn display_name(&self) -> &str {
        &self.config.display_name
    }

    pub fn room(&self) -> &str {
        &self.config.room
    }

    /// Current master of the room, as far as this client knows.
    pub fn master(&self) -> Option<ClientId> {
        self.master
    }

    /// The most recent soft failure: a rejected calibration or a locate that
    /// timed out.  Cleared when a frame is established.
    pub fn last_error(&self) -> Option<&ShareError> {
        self.last_error.as_ref()
    }

    /// Return a clone of the internal [`EventBus`] so callers can subscribe
    /// to protocol traffic, anchor progress, and session alerts.
    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// Snapshot of every shared object, sorted by id for stable display.
    pub fn objects(&self) -> Vec<SharedObject> {
        let mut list: Vec<SharedObject> = self
            .objects
            .iter()
            .map(|(id, pose)| SharedObject {
                id: *id,
                pose: *pose,
                owner: self.ownership.owner_of(id),
            })
            .collect();
        list.sort_by_key(|object| object.id.0);
        list
    }

    /// Anchor records in this client's ledger that are still live at `now`.
    pub fn active_anchors(&self, now: DateTime<Utc>) -> Result<Vec<AnchorRecord>, ShareError> {
        let ledger = self.require_ledger()?;
        Ok(ledger.active_for_room(&self.config.room, now)?)
    }

    /// Delete expired anchor records from the ledger; returns how many went.
    pub fn purge_expired_anchors(&self, now: DateTime<Utc>) -> Result<usize, ShareError> {
        let ledger = self.require_ledger()?;
        Ok(ledger.purge_expired(now)?)
    }

    fn require_ledger(&self) -> Result<&AnchorLedger, ShareError> {
        self.ledger
            .as_ref()
            .ok_or_else(|| ShareError::Ledger("no ledger path configured".to_string()))
    }

    // -------------------------------------------------------------------------
    // Master calibration
    // -------------------------------------------------------------------------

    /// Pin the calibration triangle at `device_pose` and advertise it.
    ///
    /// Master only.  The three anchors are created at the layout corners
    /// around the device pose, recorded in the ledger, and advertised to the
    /// room one by one.  The master's own basis is then derived from the
    /// *created* corner poses through the same classification path a
    /// secondary runs on located poses.
    pub async fn calibrate(&mut self, device_pose: Pose) -> Result<(), ShareError> {
        self.gate.authorize(self.transport.role(), ProtocolOp::Calibrate)?;
        self.phase = SharePhase::Calibrating;
        info!(position = ?device_pose.position, "starting triangle calibration");

        match self.run_triangle_calibration(device_pose).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.phase = SharePhase::Joined;
                self.last_error = Some(err.clone());
                self.raise_alert("calibration", err.to_string());
                Err(err)
            }
        }
    }

    /// Single-anchor calibration: pin one anchor whose own pose *is* the
    /// shared frame.
    ///
    /// Master only.  Cheaper than the triangle but fixes rotation only as
    /// well as the anchor's orientation does; the triangle is the default.
    pub async fn calibrate_single(&mut self, anchor_pose: Pose) -> Result<(), ShareError> {
        self.gate.authorize(self.transport.role(), ProtocolOp::Calibrate)?;
        self.phase = SharePhase::Calibrating;
        info!(position = ?anchor_pose.position, "starting single-anchor calibration");

        match self.run_single_calibration(anchor_pose).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.phase = SharePhase::Joined;
                self.last_error = Some(err.clone());
                self.raise_alert("calibration", err.to_string());
                Err(err)
            }
        }
    }

    async fn run_triangle_calibration(&mut self, device_pose: Pose) -> Result<(), ShareError> {
        self.anchors.start_session().await?;
        self.await_capture_readiness().await?;

        let expires_at = Utc::now() + self.config.anchor_ttl;
        let corners = self.config.layout.corner_poses(&device_pose);
        self.advert_log.clear();

        for (seq, corner) in corners.iter().enumerate() {
            let id = self.anchors.create_anchor(*corner, expires_at).await?;
            if let Some(ledger) = &self.ledger {
                ledger.record(&AnchorRecord::new(
                    id.clone(),
                    self.config.room.as_str(),
                    seq as u8,
                    self.config.layout.x_leg(),
                    self.config.layout.y_leg(),
                    expires_at,
                ))?;
            }
            self.advertise(
                id,
                seq as u8,
                TRIANGLE_ANCHOR_COUNT,
                self.config.layout.x_leg(),
                self.config.layout.y_leg(),
            )
            .await?;
        }

        let points = [
            corners[0].position,
            corners[1].position,
            corners[2].position,
        ];
        let triangle = LabeledTriangle::classify(points, &self.config.layout)?;
        let basis = SharedBasis::from_triangle(&triangle)?;
        CalibrationVerifier::with_standard_rules(self.config.layout)
            .verify(&CalibrationCandidate::new(&triangle, &basis))?;

        self.install_basis(basis);
        Ok(())
    }

    async fn run_single_calibration(&mut self, anchor_pose: Pose) -> Result<(), ShareError> {
        self.anchors.start_session().await?;
        self.await_capture_readiness().await?;

        let expires_at = Utc::now() + self.config.anchor_ttl;
        let id = self.anchors.create_anchor(anchor_pose, expires_at).await?;
        if let Some(ledger) = &self.ledger {
            ledger.record(&AnchorRecord::new(
                id.clone(),
                self.config.room.as_str(),
                0,
                0.0,
                0.0,
                expires_at,
            ))?;
        }
        self.advert_log.clear();
        self.advertise(id, 0, 1, 0.0, 0.0).await?;

        let basis = SharedBasis::from_anchor_pose(&anchor_pose);
        CalibrationVerifier::with_standard_rules(self.config.layout)
            .verify(&CalibrationCandidate::single_anchor(&basis))?;

        self.install_basis(basis);
        Ok(())
    }

    /// Poll capture readiness until the service allows anchor creation.
    /// Polling doubles as scanning on real devices.
    async fn await_capture_readiness(&mut self) -> Result<(), ShareError> {
        for _ in 0..MAX_READINESS_POLLS {
            let readiness = self.anchors.capture_readiness().await?;
            if readiness.ready() {
                debug!(progress = readiness.progress, "environment capture complete");
                return Ok(());
            }
            tokio::time::sleep(READINESS_POLL_INTERVAL).await;
        }
        Err(ShareError::Anchor {
            stage: "capture".to_string(),
            details: format!(
                "environment capture incomplete after {MAX_READINESS_POLLS} polls; keep scanning"
            ),
        })
    }

    async fn advertise(
        &mut self,
        anchor_id: AnchorId,
        seq: u8,
        expected: u8,
        x_leg: f32,
        y_leg: f32,
    ) -> Result<(), ShareError> {
        self.gate
            .authorize(self.transport.role(), ProtocolOp::AdvertiseAnchors)?;
        let message = SyncMessage::AnchorAdvertise {
            anchor_id,
            seq,
            expected,
            x_leg,
            y_leg,
        };
        self.transport.send(Scope::Others, message.clone()).await?;
        self.bus.publish(
            Topic::Rpc,
            Event::new(EVENT_SOURCE, EventPayload::Sync(message.clone())),
        );
        self.advert_log.push(message);
        Ok(())
    }

    fn install_basis(&mut self, basis: SharedBasis) {
        info!(origin = ?basis.origin, "shared frame established");
        self.basis = Some(basis);
        self.phase = SharePhase::FrameReady;
        self.last_error = None;
        self.place_parked_objects(&basis);
        self.bus.publish(
            Topic::AnchorEvents,
            Event::new(
                EVENT_SOURCE,
                EventPayload::FrameReady {
                    origin: basis.origin,
                },
            ),
        );
    }

    /// Objects that arrived before the frame finally land: a buffered wire
    /// pose decodes through the new basis, a bare spawn sits at the origin.
    fn place_parked_objects(&mut self, basis: &SharedBasis) {
        if self.parked.is_empty() {
            return;
        }
        let origin = basis.decode(&SharedPose::at_origin());
        let parked = std::mem::take(&mut self.parked);
        info!(count = parked.len(), "placing objects that waited for the frame");
        for (object_id, wire) in parked {
            let pose = match wire {
                Some(wire) => basis.decode(&wire),
                None => origin,
            };
            self.objects.insert(object_id, pose);
        }
    }

    // -------------------------------------------------------------------------
    // Shared objects
    // -------------------------------------------------------------------------

    /// Introduce a new shared object at the frame origin.  Master only.
    pub async fn spawn_object(&mut self) -> Result<ObjectId, ShareError> {
        self.gate
            .authorize(self.transport.role(), ProtocolOp::SpawnObject)?;
        let object_id = ObjectId::new();
        self.admit_object(object_id);
        self.ownership.register(object_id, self.transport.client_id());

        let message = SyncMessage::SpawnObject { object_id };
        self.transport.send(Scope::Others, message.clone()).await?;
        self.bus
            .publish(Topic::Rpc, Event::new(EVENT_SOURCE, EventPayload::Sync(message)));
        info!(object = %object_id, "spawned shared object");
        Ok(object_id)
    }

    /// Move an owned object to `pose` (this client's world frame) and queue
    /// the update for the rate-limited state stream.
    ///
    /// # Errors
    ///
    /// [`ShareError::UnknownObject`] for an object this client has never
    /// seen, [`ShareError::NotOwner`] when another client drives it, and
    /// [`ShareError::NotCalibrated`] before the shared frame exists.
    pub async fn publish_pose(&mut self, object: ObjectId, pose: Pose) -> Result<(), ShareError> {
        if !self.objects.contains_key(&object) {
            // A parked object is known but has no placement to move yet.
            if self.parked.contains_key(&object) {
                return Err(ShareError::NotCalibrated);
            }
            return Err(ShareError::UnknownObject(object));
        }
        if !self.ownership.is_owner(&object, self.transport.client_id()) {
            return Err(ShareError::NotOwner(object));
        }
        let basis = self.basis.as_ref().ok_or(ShareError::NotCalibrated)?;

        let wire = basis.encode(&pose);
        self.objects.insert(object, pose);
        self.publisher.offer(object, wire);
        self.publisher.flush(self.transport.as_ref()).await?;
        Ok(())
    }

    /// Take over driving `object`.  Any client may do this; the change is
    /// announced to the room.
    pub async fn take_ownership(&mut self, object: ObjectId) -> Result<(), ShareError> {
        // Ownership is independent of placement, so a parked object counts.
        if !self.objects.contains_key(&object) && !self.parked.contains_key(&object) {
            return Err(ShareError::UnknownObject(object));
        }
        let me = self.transport.client_id();
        let previous = self.ownership.take(object, me)?;
        if previous != me {
            info!(object = %object, from = %previous, "took ownership");
        }

        let message = SyncMessage::OwnershipTaken {
            object_id: object,
            owner: me,
        };
        self.transport.send(Scope::Others, message.clone()).await?;
        self.bus
            .publish(Topic::Rpc, Event::new(EVENT_SOURCE, EventPayload::Sync(message)));
        Ok(())
    }

    /// Snap every shared object back to the frame origin, everywhere.
    /// Master only.
    pub async fn reset_objects(&mut self) -> Result<(), ShareError> {
        self.gate
            .authorize(self.transport.role(), ProtocolOp::ResetObjects)?;
        self.snap_objects_to_origin();
        self.transport
            .send(Scope::Others, SyncMessage::ResetObjects)
            .await?;
        self.bus.publish(
            Topic::Rpc,
            Event::new(EVENT_SOURCE, EventPayload::Sync(SyncMessage::ResetObjects)),
        );
        info!(count = self.objects.len(), "reset shared objects to the frame origin");
        Ok(())
    }

    /// Where the shared-frame origin sits in this client's world, or the
    /// world origin before calibration.
    fn local_origin_pose(&self) -> Pose {
        match &self.basis {
            Some(basis) => basis.decode(&SharedPose::at_origin()),
            None => Pose::identity(),
        }
    }

    /// File a newly announced object: at the frame origin when the frame
    /// exists, parked until it does otherwise.
    fn admit_object(&mut self, object_id: ObjectId) {
        if self.basis.is_some() {
            let pose = self.local_origin_pose();
            self.objects.entry(object_id).or_insert(pose);
        } else {
            self.parked.entry(object_id).or_insert(None);
        }
    }

    fn snap_objects_to_origin(&mut self) {
        let pose = self.local_origin_pose();
        for stored in self.objects.values_mut() {
            *stored = pose;
        }
        // A parked object resets by forgetting its buffered wire pose.
        for slot in self.parked.values_mut() {
            *slot = None;
        }
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    /// Advance the protocol by one non-blocking step.
    ///
    /// Drains room traffic and located-anchor events that are already
    /// waiting, starts the locate once a full advertisement set is in,
    /// flushes the outgoing state stream, and sweeps the watchdog.  Soft
    /// failures (rejected calibrations, locate timeouts) become session
    /// alerts and [`last_error`][Self::last_error]; only transport and
    /// anchor-service failures are returned.
    pub async fn tick(&mut self) -> Result<(), ShareError> {
        // ── 1. Drain room traffic ─────────────────────────────────────────────
        let mut room_events = Vec::new();
        while let Some(event) = self.transport.try_recv() {
            room_events.push(event);
        }
        for event in room_events {
            self.handle_transport_event(event).await?;
        }

        // ── 2. Start locating once the advertisement set is complete ─────────
        self.begin_locate().await?;

        // ── 3. Drain located-anchor events ────────────────────────────────────
        let mut located_events = Vec::new();
        if let Some(watcher) = self.watcher.as_mut() {
            while let Some(event) = watcher.try_next() {
                located_events.push(event);
            }
        }
        for event in located_events {
            self.handle_located(event).await?;
        }

        // ── 4. Flush the outgoing state stream ────────────────────────────────
        if self.publisher.pending() > 0 {
            self.publisher.flush(self.transport.as_ref()).await?;
        }

        // ── 5. Watchdog sweep ─────────────────────────────────────────────────
        self.sweep_watchdog().await?;

        Ok(())
    }

    /// Stop the anchor session and leave the room.  Returns the promoted
    /// client if this departure triggered master migration.
    pub async fn leave(mut self) -> Result<Option<ClientId>, ShareError> {
        if let Err(err) = self.anchors.stop_session().await {
            warn!(error = %err, "anchor session did not stop cleanly on leave");
        }
        info!(client = %self.transport.client_id(), "leaving room");
        self.transport.leave().await
    }

    // -------------------------------------------------------------------------
    // Room traffic
    // -------------------------------------------------------------------------

    async fn handle_transport_event(&mut self, event: TransportEvent) -> Result<(), ShareError> {
        match event {
            TransportEvent::PeerJoined { client, role } => {
                if role == ClientRole::Master {
                    self.master = Some(client);
                }
                debug!(%client, %role, "peer joined");
                self.bus.publish(
                    Topic::Rpc,
                    Event::new(EVENT_SOURCE, EventPayload::PeerJoined { client, role }),
                );
                self.replay_to_late_joiner(client).await?;
            }
            TransportEvent::PeerLeft { client, promoted } => {
                if let Some(new_master) = promoted {
                    self.master = Some(new_master);
                    if new_master == self.transport.client_id() {
                        info!("promoted to master after the previous master left");
                    }
                }
                // Objects never go driverless: the departed client's objects
                // fall to the master.
                let heir = self.master.unwrap_or_else(|| self.transport.client_id());
                let inherited = self.ownership.reassign_from(client, heir);
                if !inherited.is_empty() {
                    info!(count = inherited.len(), %heir, "reassigned objects from departed peer");
                }
                self.bus.publish(
                    Topic::Rpc,
                    Event::new(EVENT_SOURCE, EventPayload::PeerLeft { client, promoted }),
                );
            }
            TransportEvent::Message { from, message } => {
                self.handle_sync(from, message).await?;
            }
        }
        Ok(())
    }

    /// A joiner that arrived after calibration never saw the advertisements,
    /// spawns, takeovers, or pose traffic.  The master re-sends its advert
    /// log and then, per object: the spawn, the owner where ownership has
    /// moved away from the master, and the current pose in wire form.  All of
    /// it is scoped to exactly that client.
    async fn replay_to_late_joiner(&mut self, client: ClientId) -> Result<(), ShareError> {
        if self.transport.role() != ClientRole::Master {
            return Ok(());
        }
        if !self.advert_log.is_empty() {
            debug!(%client, adverts = self.advert_log.len(), "replaying calibration to late joiner");
            for message in self.advert_log.clone() {
                self.transport.send(Scope::One(client), message).await?;
            }
        }
        let me = self.transport.client_id();
        let mut object_ids: Vec<ObjectId> = self.objects.keys().copied().collect();
        object_ids.extend(self.parked.keys().copied());
        object_ids.sort_by_key(|id| id.0);
        for object_id in object_ids {
            self.transport
                .send(Scope::One(client), SyncMessage::SpawnObject { object_id })
                .await?;
            // The replayed spawn arrives from this client, so the joiner
            // registers the master as owner; announce the real one.
            if let Some(owner) = self.ownership.owner_of(&object_id) {
                if owner != me {
                    self.transport
                        .send(Scope::One(client), SyncMessage::OwnershipTaken { object_id, owner })
                        .await?;
                }
            }
            if let (Some(basis), Some(pose)) = (&self.basis, self.objects.get(&object_id)) {
                let message = SyncMessage::StateUpdate {
                    object_id,
                    pose: basis.encode(pose),
                };
                self.transport.send(Scope::One(client), message).await?;
            }
        }
        Ok(())
    }

    async fn handle_sync(&mut self, from: ClientId, message: SyncMessage) -> Result<(), ShareError> {
        // Mirror incoming traffic onto the bus: the state stream gets its own
        // high-frequency lane.
        let lane = match &message {
            SyncMessage::StateUpdate { .. } => Topic::StateStream,
            _ => Topic::Rpc,
        };
        self.bus.publish(
            lane,
            Event::new(EVENT_SOURCE, EventPayload::Sync(message.clone())),
        );

        match message {
            SyncMessage::AnchorAdvertise {
                anchor_id,
                seq,
                expected,
                x_leg,
                y_leg,
            } => {
                if self.transport.role() == ClientRole::Master {
                    warn!(%anchor_id, "ignoring anchor advertisement while holding the master role");
                    return Ok(());
                }
                self.accept_advert(anchor_id, seq, expected, x_leg, y_leg);
            }
            SyncMessage::StateUpdate { object_id, pose } => {
                self.feed_stream_watchdog();
                match &self.basis {
                    Some(basis) => {
                        let world = basis.decode(&pose);
                        self.objects.insert(object_id, world);
                    }
                    None => {
                        // No frame to decode against yet.  The wire pose is
                        // basis-independent, so it keeps until one lands.
                        self.parked.insert(object_id, Some(pose));
                        debug!(object = %object_id, "parked state update until the frame lands");
                    }
                }
                // A stream for an object we never saw spawn doubles as
                // catch-up: whoever streams it owns it.
                if self.ownership.owner_of(&object_id).is_none() {
                    self.ownership.register(object_id, from);
                }
            }
            SyncMessage::SpawnObject { object_id } => {
                self.admit_object(object_id);
                if self.ownership.owner_of(&object_id).is_none() {
                    self.ownership.register(object_id, from);
                }
                debug!(object = %object_id, owner = %from, "peer spawned shared object");
            }
            SyncMessage::ResetObjects => {
                self.snap_objects_to_origin();
                info!("peer reset shared objects to the frame origin");
            }
            SyncMessage::OwnershipTaken { object_id, owner } => {
                match self.ownership.take(object_id, owner) {
                    Ok(previous) => {
                        debug!(object = %object_id, from = %previous, to = %owner, "applied ownership change");
                    }
                    Err(_) => {
                        warn!(object = %object_id, "ownership change for an unknown object");
                    }
                }
            }
        }
        Ok(())
    }

    fn accept_advert(&mut self, anchor_id: AnchorId, seq: u8, expected: u8, x_leg: f32, y_leg: f32) {
        // A fresh calibration supersedes whatever was collected so far, and
        // any locate still watching the stale ids.  Anchor ids are never
        // reused, so a different id at a collected slot means a new set.
        let conflict = match &self.adverts {
            Some(set) => {
                set.expected != expected
                    || set.ids.get(&seq).is_some_and(|known| *known != anchor_id)
            }
            None => false,
        };
        if conflict {
            warn!(seq, expected, "conflicting advertisement; restarting collection");
            self.adverts = None;
            if self.watcher.is_some() {
                self.watchdog.disarm(STAGE_ANCHOR_LOCATE);
                self.watcher = None;
                self.located.clear();
                self.phase = SharePhase::AwaitingAnchors;
            }
        }

        let set = self.adverts.get_or_insert_with(|| AdvertisedSet {
            expected,
            x_leg,
            y_leg,
            ids: BTreeMap::new(),
        });
        set.ids.insert(seq, anchor_id.clone());
        debug!(
            %anchor_id,
            seq,
            expected,
            collected = set.ids.len(),
            "collected anchor advertisement"
        );
        if self.phase == SharePhase::Joined {
            self.phase = SharePhase::AwaitingAnchors;
        }
    }

    /// Arm the stream watchdog on the first incoming frame, heartbeat on
    /// every one after.
    fn feed_stream_watchdog(&mut self) {
        if self.stream_armed {
            self.watchdog.heartbeat(STAGE_STATE_STREAM);
        } else {
            self.watchdog
                .register(STAGE_STATE_STREAM, self.config.stream_timeout);
            self.stream_armed = true;
        }
    }

    // -------------------------------------------------------------------------
    // Secondary locate pipeline
    // -------------------------------------------------------------------------

    async fn begin_locate(&mut self) -> Result<(), ShareError> {
        // Locating is a secondary job.  A client promoted to master while
        // still collecting adverts parks them and waits for its own
        // recalibration.
        if self.transport.role() != ClientRole::Secondary {
            return Ok(());
        }
        // A complete set while `FrameReady` is a recalibration: the client
        // re-locates and the old basis stays live until the new one lands.
        let ready = match &self.adverts {
            Some(set) => set.complete(),
            None => false,
        };
        if !ready || self.watcher.is_some() {
            return Ok(());
        }
        self.gate
            .authorize(self.transport.role(), ProtocolOp::LocateAnchors)?;

        let ids = self
            .adverts
            .as_ref()
            .map(AdvertisedSet::watch_list)
            .unwrap_or_default();
        info!(count = ids.len(), "watching for advertised anchors");
        self.anchors.start_session().await?;
        let watcher = self.anchors.watch(ids).await?;
        self.watcher = Some(watcher);
        self.located.clear();
        self.phase = SharePhase::Locating;
        self.watchdog
            .register(STAGE_ANCHOR_LOCATE, self.config.locate_timeout);
        Ok(())
    }

    async fn handle_located(&mut self, event: LocatedAnchor) -> Result<(), ShareError> {
        self.watchdog.heartbeat(STAGE_ANCHOR_LOCATE);
        self.bus.publish(
            Topic::AnchorEvents,
            Event::new(
                EVENT_SOURCE,
                EventPayload::AnchorLocated {
                    anchor_id: event.id.clone(),
                    status: event.status,
                },
            ),
        );

        match event.status {
            LocateStatus::Located => {
                let Some(seq) = self.adverts.as_ref().and_then(|set| set.seq_of(&event.id)) else {
                    warn!(anchor_id = %event.id, "located an anchor nobody advertised");
                    return Ok(());
                };
                self.located.insert(seq, event.pose);
                debug!(anchor_id = %event.id, seq, located = self.located.len(), "anchor located");
                self.try_derive_frame().await?;
            }
            LocateStatus::NotLocated => {
                let details = format!("anchor {} could not be located", event.id);
                self.raise_alert(STAGE_ANCHOR_LOCATE, details.clone());
                self.abort_locate(ShareError::Anchor {
                    stage: "locate".to_string(),
                    details,
                })
                .await?;
            }
            LocateStatus::AlreadyTracked => {
                debug!(anchor_id = %event.id, "anchor already tracked by this session");
            }
        }
        Ok(())
    }

    async fn try_derive_frame(&mut self) -> Result<(), ShareError> {
        let expected = match &self.adverts {
            Some(set) => set.expected as usize,
            None => return Ok(()),
        };
        if self.located.len() < expected {
            return Ok(());
        }

        match self.derive_frame_from_located() {
            Ok(basis) => {
                self.watchdog.disarm(STAGE_ANCHOR_LOCATE);
                self.watcher = None;
                self.anchors.stop_session().await?;
                // Consume the advert set; the next complete set a
                // recalibrating master advertises starts a fresh locate.
                self.adverts = None;
                self.located.clear();
                self.install_basis(basis);
            }
            Err(err) => {
                warn!(error = %err, "rejecting located calibration");
                self.raise_alert("calibration-verifier", err.to_string());
                self.abort_locate(err).await?;
            }
        }
        Ok(())
    }

    fn derive_frame_from_located(&self) -> Result<SharedBasis, ShareError> {
        let set = self.adverts.as_ref().ok_or(ShareError::NotCalibrated)?;

        if set.expected == 1 {
            let pose = self.located.get(&0).ok_or_else(|| ShareError::Anchor {
                stage: "locate".to_string(),
                details: "anchor 0 missing from located set".to_string(),
            })?;
            let basis = SharedBasis::from_anchor_pose(pose);
            CalibrationVerifier::with_standard_rules(self.config.layout)
                .verify(&CalibrationCandidate::single_anchor(&basis))?;
            return Ok(basis);
        }

        // Validate against the dimensions the master advertised, with this
        // client's noise tolerance.
        let layout = TriangleLayout::new(set.x_leg, set.y_leg)?
            .with_tolerance(self.config.layout.tolerance());
        let mut points = [Vec3::zero(); 3];
        for (i, slot) in points.iter_mut().enumerate() {
            let pose = self.located.get(&(i as u8)).ok_or_else(|| ShareError::Anchor {
                stage: "locate".to_string(),
                details: format!("anchor {i} missing from located set"),
            })?;
            *slot = pose.position;
        }
        let triangle = LabeledTriangle::classify(points, &layout)?;
        let basis = SharedBasis::from_triangle(&triangle)?;
        CalibrationVerifier::with_standard_rules(layout)
            .verify(&CalibrationCandidate::new(&triangle, &basis))?;
        Ok(basis)
    }

    /// Tear down a failed locate attempt.  The advert set is cleared, so a
    /// retry needs a fresh advertisement from the master.
    async fn abort_locate(&mut self, err: ShareError) -> Result<(), ShareError> {
        self.watchdog.disarm(STAGE_ANCHOR_LOCATE);
        self.watcher = None;
        self.located.clear();
        self.adverts = None;
        if let Err(stop_err) = self.anchors.stop_session().await {
            warn!(error = %stop_err, "anchor session did not stop cleanly");
        }
        self.phase = SharePhase::AwaitingAnchors;
        self.last_error = Some(err);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Watchdog
    // -------------------------------------------------------------------------

    async fn sweep_watchdog(&mut self) -> Result<(), ShareError> {
        for stalled in self.watchdog.check_all() {
            // Disarm first so each stall alerts exactly once.
            self.watchdog.disarm(&stalled.component);
            let details = format!(
                "no signal for {:.1} s",
                stalled.silent_for.as_secs_f32()
            );
            self.raise_alert(&stalled.component, details);

            match stalled.component.as_str() {
                STAGE_ANCHOR_LOCATE => {
                    let err = ShareError::Anchor {
                        stage: "locate".to_string(),
                        details: format!(
                            "no anchor located within {:?}; ask the master to recalibrate",
                            self.config.locate_timeout
                        ),
                    };
                    self.abort_locate(err).await?;
                }
                STAGE_STATE_STREAM => {
                    // Re-armed by the next incoming frame.
                    self.stream_armed = false;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn raise_alert(&self, component: &str, details: String) {
        warn!(component, %details, "session alert");
        self.bus.publish(
            Topic::SessionAlerts,
            Event::new(
                EVENT_SOURCE,
                EventPayload::SessionAlert {
                    component: component.to_string(),
                    details,
                },
            ),
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
