//! Replication-room seam: scoped delivery and role assignment.
//!
//! The protocol never speaks to a replication framework directly.  It talks
//! to [`RoomTransport`]: join a room, learn your role, send
//! [`SyncMessage`]s to a scope of peers, receive room events.  The first
//! client into a room is the **master**; when the master leaves, the
//! longest-joined remaining client is promoted.
//!
//! [`LoopbackRoom`] is the in-process double used by tests and the demo
//! shell.  It is not a network transport: delivery is a per-client mailbox,
//! but every message still round-trips through its JSON wire form so a
//! loopback run exercises exactly the serialization a real transport would.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use coframe_types::{ClientId, ClientRole, ShareError, SyncMessage};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// Events a room buffers for a slow client before dropping its traffic.
const MAILBOX_CAPACITY: usize = 256;

/// Which peers a message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every client in the room, the sender included.
    All,
    /// Every client except the sender.
    Others,
    /// Exactly one client.
    One(ClientId),
}

/// What a client can receive from its room.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    PeerJoined {
        client: ClientId,
        role: ClientRole,
    },
    /// A peer left; `promoted` names the new master when the departure
    /// triggered migration.
    PeerLeft {
        client: ClientId,
        promoted: Option<ClientId>,
    },
    Message {
        from: ClientId,
        message: SyncMessage,
    },
}

/// A client's connection to a replication room.
#[async_trait]
pub trait RoomTransport: Send + Sync {
    fn client_id(&self) -> ClientId;

    /// Current role.  Flips to [`ClientRole::Master`] if this client is
    /// promoted after the master leaves.
    fn role(&self) -> ClientRole;

    /// Send a message to the given scope.  Delivery to a scope that matches
    /// nobody is not an error.
    async fn send(&self, scope: Scope, message: SyncMessage) -> Result<(), ShareError>;

    /// Wait for the next room event.  Fails with [`ShareError::Transport`]
    /// once the room connection is gone.
    async fn recv(&mut self) -> Result<TransportEvent, ShareError>;

    /// Non-blocking variant for tick-driven callers.
    fn try_recv(&mut self) -> Option<TransportEvent>;

    /// Leave the room.  If this client held the master role, the transport
    /// promotes a replacement and returns it.
    async fn leave(self: Box<Self>) -> Result<Option<ClientId>, ShareError>;
}

// ────────────────────────────────────────────────────────────────────────────
// LoopbackRoom
// ────────────────────────────────────────────────────────────────────────────

struct MemberSlot {
    client: ClientId,
    mailbox: mpsc::Sender<TransportEvent>,
    is_master: Arc<AtomicBool>,
}

/// An in-process room.  Clone it cheaply; all clones share the same member
/// table.
#[derive(Clone)]
pub struct LoopbackRoom {
    members: Arc<Mutex<Vec<MemberSlot>>>,
}

impl LoopbackRoom {
    pub fn new() -> Self {
        Self {
            members: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Join the room.  The first client in becomes the master.
    pub async fn join(&self) -> LoopbackClient {
        let client = ClientId::new();
        let (mailbox, inbox) = mpsc::channel(MAILBOX_CAPACITY);

        let mut members = self.members.lock().await;
        let role = if members.is_empty() {
            ClientRole::Master
        } else {
            ClientRole::Secondary
        };
        let is_master = Arc::new(AtomicBool::new(role == ClientRole::Master));

        // Replay the existing roster into the newcomer's mailbox, oldest
        // first, so a late joiner learns who is already here and which of
        // them is the master.
        for member in members.iter() {
            let member_role = if member.is_master.load(Ordering::SeqCst) {
                ClientRole::Master
            } else {
                ClientRole::Secondary
            };
            let _ = mailbox.try_send(TransportEvent::PeerJoined {
                client: member.client,
                role: member_role,
            });
        }

        for member in members.iter() {
            deliver(member, TransportEvent::PeerJoined { client, role });
        }
        members.push(MemberSlot {
            client,
            mailbox,
            is_master: Arc::clone(&is_master),
        });
        info!(%client, %role, members = members.len(), "client joined loopback room");

        LoopbackClient {
            client,
            is_master,
            inbox,
            members: Arc::clone(&self.members),
        }
    }

    /// Number of clients currently in the room.
    pub async fn member_count(&self) -> usize {
        self.members.lock().await.len()
    }
}

impl Default for LoopbackRoom {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort mailbox delivery: a client that stops draining its mailbox
/// loses traffic rather than wedging the whole room.
fn deliver(member: &MemberSlot, event: TransportEvent) {
    match member.mailbox.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(client = %member.client, "mailbox full; dropping room event");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LoopbackClient
// ────────────────────────────────────────────────────────────────────────────

/// One client's connection to a [`LoopbackRoom`].
pub struct LoopbackClient {
    client: ClientId,
    is_master: Arc<AtomicBool>,
    inbox: mpsc::Receiver<TransportEvent>,
    members: Arc<Mutex<Vec<MemberSlot>>>,
}

impl LoopbackClient {
    /// Leave the room.  If this client was the master, the longest-joined
    /// remaining client is promoted; returns the promoted client, if any.
    pub async fn leave(self) -> Option<ClientId> {
        let mut members = self.members.lock().await;
        let index = members.iter().position(|m| m.client == self.client)?;
        let was_master = members[index].is_master.load(Ordering::SeqCst);
        members.remove(index);

        let mut promoted = None;
        if was_master {
            if let Some(next) = members.first() {
                next.is_master.store(true, Ordering::SeqCst);
                promoted = Some(next.client);
                info!(new_master = %next.client, "master left; promoted longest-joined client");
            }
        }
        for member in members.iter() {
            deliver(
                member,
                TransportEvent::PeerLeft {
                    client: self.client,
                    promoted,
                },
            );
        }
        promoted
    }
}

#[async_trait]
impl RoomTransport for LoopbackClient {
    fn client_id(&self) -> ClientId {
        self.client
    }

    fn role(&self) -> ClientRole {
        if self.is_master.load(Ordering::SeqCst) {
            ClientRole::Master
        } else {
            ClientRole::Secondary
        }
    }

    async fn send(&self, scope: Scope, message: SyncMessage) -> Result<(), ShareError> {
        // Round-trip through the JSON wire form so loopback runs exercise
        // the same serialization a real transport would.
        let wire = serde_json::to_string(&message)
            .map_err(|e| ShareError::Transport(format!("serialize: {e}")))?;
        let message: SyncMessage = serde_json::from_str(&wire)
            .map_err(|e| ShareError::Transport(format!("deserialize: {e}")))?;

        let mut members = self.members.lock().await;
        members.retain(|m| !m.mailbox.is_closed());

        let mut delivered = 0;
        for member in members.iter() {
            let in_scope = match scope {
                Scope::All => true,
                Scope::Others => member.client != self.client,
                Scope::One(target) => member.client == target,
            };
            if !in_scope {
                continue;
            }
            deliver(
                member,
                TransportEvent::Message {
                    from: self.client,
                    message: message.clone(),
                },
            );
            delivered += 1;
        }
        debug!(from = %self.client, ?scope, delivered, "room send");
        Ok(())
    }

    async fn recv(&mut self) -> Result<TransportEvent, ShareError> {
        self.inbox
            .recv()
            .await
            .ok_or_else(|| ShareError::Transport("room connection closed".to_string()))
    }

    fn try_recv(&mut self) -> Option<TransportEvent> {
        self.inbox.try_recv().ok()
    }

    async fn leave(self: Box<Self>) -> Result<Option<ClientId>, ShareError> {
        Ok(LoopbackClient::leave(*self).await)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use coframe_types::ObjectId;

    /// Discard pending join/roster notifications.
    fn drain(client: &mut LoopbackClient) {
        while client.try_recv().is_some() {}
    }

    #[tokio::test]
    async fn first_client_is_master_rest_are_secondary() {
        let room = LoopbackRoom::new();
        let a = room.join().await;
        let b = room.join().await;
        let c = room.join().await;

        assert_eq!(a.role(), ClientRole::Master);
        assert_eq!(b.role(), ClientRole::Secondary);
        assert_eq!(c.role(), ClientRole::Secondary);
        assert_eq!(room.member_count().await, 3);
    }

    #[tokio::test]
    async fn existing_members_see_joins() {
        let room = LoopbackRoom::new();
        let mut a = room.join().await;
        let b = room.join().await;

        match a.recv().await.unwrap() {
            TransportEvent::PeerJoined { client, role } => {
                assert_eq!(client, b.client_id());
                assert_eq!(role, ClientRole::Secondary);
            }
            other => panic!("expected PeerJoined, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn joiner_sees_existing_roster() {
        let room = LoopbackRoom::new();
        let a = room.join().await;
        let b = room.join().await;
        let mut c = room.join().await;

        // The late joiner learns the full roster, oldest first.
        match c.recv().await.unwrap() {
            TransportEvent::PeerJoined { client, role } => {
                assert_eq!(client, a.client_id());
                assert_eq!(role, ClientRole::Master);
            }
            other => panic!("expected PeerJoined, got {other:?}"),
        }
        match c.recv().await.unwrap() {
            TransportEvent::PeerJoined { client, role } => {
                assert_eq!(client, b.client_id());
                assert_eq!(role, ClientRole::Secondary);
            }
            other => panic!("expected PeerJoined, got {other:?}"),
        }
        assert!(c.try_recv().is_none());
    }

    #[tokio::test]
    async fn others_scope_excludes_the_sender() {
        let room = LoopbackRoom::new();
        let mut a = room.join().await;
        let mut b = room.join().await;
        drain(&mut a);
        drain(&mut b);

        a.send(Scope::Others, SyncMessage::ResetObjects).await.unwrap();

        assert!(matches!(
            b.recv().await.unwrap(),
            TransportEvent::Message { .. }
        ));
        assert!(a.try_recv().is_none(), "sender must not receive its own Others send");
    }

    #[tokio::test]
    async fn all_scope_includes_the_sender() {
        let room = LoopbackRoom::new();
        let mut a = room.join().await;

        a.send(Scope::All, SyncMessage::ResetObjects).await.unwrap();
        assert!(matches!(
            a.recv().await.unwrap(),
            TransportEvent::Message { from, .. } if from == a.client_id()
        ));
    }

    #[tokio::test]
    async fn one_scope_reaches_exactly_the_target() {
        let room = LoopbackRoom::new();
        let a = room.join().await;
        let mut b = room.join().await;
        let mut c = room.join().await;
        drain(&mut b);
        drain(&mut c);

        a.send(
            Scope::One(b.client_id()),
            SyncMessage::SpawnObject {
                object_id: ObjectId::new(),
            },
        )
        .await
        .unwrap();

        assert!(matches!(
            b.recv().await.unwrap(),
            TransportEvent::Message { .. }
        ));
        assert!(c.try_recv().is_none());
    }

    #[tokio::test]
    async fn master_departure_promotes_longest_joined() {
        let room = LoopbackRoom::new();
        let a = room.join().await;
        let mut b = room.join().await;
        let mut c = room.join().await;
        drain(&mut b);
        drain(&mut c);

        let a_id = a.client_id();
        let promoted = a.leave().await;
        assert_eq!(promoted, Some(b.client_id()));
        assert_eq!(b.role(), ClientRole::Master);
        assert_eq!(c.role(), ClientRole::Secondary);

        match b.recv().await.unwrap() {
            TransportEvent::PeerLeft { client, promoted } => {
                assert_eq!(client, a_id);
                assert_eq!(promoted, Some(b.client_id()));
            }
            other => panic!("expected PeerLeft, got {other:?}"),
        }
        assert!(matches!(
            c.recv().await.unwrap(),
            TransportEvent::PeerLeft { .. }
        ));
    }

    #[tokio::test]
    async fn secondary_departure_promotes_nobody() {
        let room = LoopbackRoom::new();
        let mut a = room.join().await;
        let b = room.join().await;
        let _ = a.try_recv(); // b's join

        assert_eq!(b.leave().await, None);
        assert_eq!(a.role(), ClientRole::Master);
        match a.recv().await.unwrap() {
            TransportEvent::PeerLeft { promoted, .. } => assert_eq!(promoted, None),
            other => panic!("expected PeerLeft, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn leave_works_through_a_boxed_transport() {
        let room = LoopbackRoom::new();
        let a: Box<dyn RoomTransport> = Box::new(room.join().await);
        let b = room.join().await;

        let promoted = a.leave().await.unwrap();
        assert_eq!(promoted, Some(b.client_id()));
        assert_eq!(b.role(), ClientRole::Master);
        assert_eq!(room.member_count().await, 1);
    }

    #[tokio::test]
    async fn messages_survive_the_wire_form() {
        let room = LoopbackRoom::new();
        let a = room.join().await;
        let mut b = room.join().await;
        drain(&mut b);

        let message = SyncMessage::AnchorAdvertise {
            anchor_id: "wire-check".into(),
            seq: 2,
            expected: 3,
            x_leg: 0.4,
            y_leg: 0.3,
        };
        a.send(Scope::Others, message.clone()).await.unwrap();

        match b.recv().await.unwrap() {
            TransportEvent::Message { from, message: got } => {
                assert_eq!(from, a.client_id());
                assert_eq!(got, message);
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }
}
