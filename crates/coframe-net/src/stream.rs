//! Owner-side pose publisher with last-value coalescing and a bounded send
//! rate.
//!
//! Object poses change every frame, but the replication framework serializes
//! state at a fixed cadence (~10 Hz).  [`StateStreamPublisher`] reproduces
//! that contract: [`offer`][StateStreamPublisher::offer] never blocks and
//! only the newest pose per object is kept;
//! [`flush`][StateStreamPublisher::flush] sends whatever the rate limiter
//! admits.  A stale intermediate pose is worthless; observers only ever
//! want the latest.

use std::collections::HashMap;
use std::num::NonZeroU32;

use coframe_space::SharedPose;
use coframe_types::{ObjectId, ShareError, SyncMessage};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::trace;

use crate::room::{RoomTransport, Scope};

/// The replication framework's default serialization cadence.
pub const DEFAULT_STREAM_HZ: u32 = 10;

/// Rate-limited, coalescing publisher for one client's owned objects.
pub struct StateStreamPublisher {
    limiter: DefaultDirectRateLimiter,
    pending: HashMap<ObjectId, SharedPose>,
}

impl StateStreamPublisher {
    /// Create a publisher sending at most `rate_hz` updates per second
    /// (clamped to at least 1).
    pub fn new(rate_hz: u32) -> Self {
        let cells = NonZeroU32::new(rate_hz.max(1)).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_second(cells)),
            pending: HashMap::new(),
        }
    }

    /// Record the newest pose for an object.  Never blocks; an unsent older
    /// pose for the same object is simply replaced.
    pub fn offer(&mut self, object: ObjectId, pose: SharedPose) {
        self.pending.insert(object, pose);
    }

    /// Send pending updates to the other clients, as many as the limiter
    /// admits right now.  Returns how many went out; the rest stay pending
    /// for the next flush.
    pub async fn flush(&mut self, transport: &dyn RoomTransport) -> Result<usize, ShareError> {
        let ids: Vec<ObjectId> = self.pending.keys().copied().collect();
        let mut sent = 0;
        for object_id in ids {
            if self.limiter.check().is_err() {
                break;
            }
            if let Some(pose) = self.pending.remove(&object_id) {
                transport
                    .send(Scope::Others, SyncMessage::StateUpdate { object_id, pose })
                    .await?;
                sent += 1;
            }
        }
        if sent > 0 {
            trace!(sent, still_pending = self.pending.len(), "state stream flush");
        }
        Ok(sent)
    }

    /// Number of objects with an update waiting to go out.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
