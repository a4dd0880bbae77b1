//! Object-ownership tracking with takeover semantics.
//!
//! Exactly one client drives a shared object at a time: the **owner**
//! publishes its state stream, everyone else observes.  Any client may take
//! ownership (the takeover model, no permission round-trip), and when a
//! client leaves the room its objects fall to the master so they never go
//! driverless.

use std::collections::HashMap;

use coframe_types::{ClientId, ObjectId, ShareError};
use tracing::debug;

/// Object → owner map, one per client, kept consistent by everyone applying
/// the same `OwnershipTaken` announcements in order.
#[derive(Debug, Default)]
pub struct OwnershipRegistry {
    owners: HashMap<ObjectId, ClientId>,
}

impl OwnershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly spawned object with its initial owner.
    pub fn register(&mut self, object: ObjectId, owner: ClientId) {
        self.owners.insert(object, owner);
    }

    pub fn owner_of(&self, object: &ObjectId) -> Option<ClientId> {
        self.owners.get(object).copied()
    }

    /// Whether `client` currently drives `object`.  Gates state publishing.
    pub fn is_owner(&self, object: &ObjectId, client: ClientId) -> bool {
        self.owner_of(object) == Some(client)
    }

    /// Transfer ownership to `client`.  Always succeeds for a known object
    /// and returns the previous owner.
    pub fn take(&mut self, object: ObjectId, client: ClientId) -> Result<ClientId, ShareError> {
        match self.owners.insert(object, client) {
            Some(previous) => {
                debug!(%object, from = %previous, to = %client, "ownership taken");
                Ok(previous)
            }
            None => {
                // Undo the insert: unknown objects cannot be taken.
                self.owners.remove(&object);
                Err(ShareError::UnknownObject(object))
            }
        }
    }

    /// Hand every object owned by a departed client to `heir`.  Returns the
    /// reassigned objects (order unspecified).
    pub fn reassign_from(&mut self, departed: ClientId, heir: ClientId) -> Vec<ObjectId> {
        let mut reassigned = Vec::new();
        for (object, owner) in self.owners.iter_mut() {
            if *owner == departed {
                *owner = heir;
                reassigned.push(*object);
            }
        }
        if !reassigned.is_empty() {
            debug!(
                count = reassigned.len(),
                from = %departed,
                to = %heir,
                "reassigned objects from departed client"
            );
        }
        reassigned
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// All registered objects with their owners.
    pub fn entries(&self) -> impl Iterator<Item = (&ObjectId, &ClientId)> {
        self.owners.iter()
    }
}
