use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use justsave_types::events::GatewayEvent;
use justsave_types::models::room_id_is_valid;

pub type ConnectionId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("room id must not be empty")]
    EmptyRoomId,

    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    #[error("connection {connection} is not a member of room {room_id}")]
    NotMember {
        connection: ConnectionId,
        room_id: String,
    },
}

/// Tracks which connection sits in which room and relays content between
/// members of the same room.
#[derive(Clone, Default)]
pub struct Hub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    /// room_id -> members. The map lock is only held to find, insert or
    /// prune a slot; relays hold just the slot's own lock.
    rooms: RwLock<HashMap<String, Arc<Mutex<RoomMembers>>>>,

    /// connection_id -> outbound channel and current room
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
}

#[derive(Default)]
struct RoomMembers {
    members: HashMap<ConnectionId, mpsc::UnboundedSender<GatewayEvent>>,

    /// Set once the slot has been pruned from the map. A join that raced
    /// with the prune must fetch a fresh slot.
    closed: bool,
}

struct ConnectionEntry {
    tx: mpsc::UnboundedSender<GatewayEvent>,
    room_id: Option<String>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound channel. Returns (conn_id, receiver).
    pub async fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .connections
            .write()
            .await
            .insert(conn_id, ConnectionEntry { tx, room_id: None });
        (conn_id, rx)
    }

    /// Connection loss: leave the current room and forget the connection.
    pub async fn unregister(&self, conn_id: ConnectionId) {
        self.leave(conn_id).await;
        self.inner.connections.write().await.remove(&conn_id);
    }

    /// Send a targeted event to a single connection.
    pub async fn send_to(&self, conn_id: ConnectionId, event: GatewayEvent) {
        let connections = self.inner.connections.read().await;
        if let Some(entry) = connections.get(&conn_id) {
            let _ = entry.tx.send(event);
        }
    }

    /// Put the connection in `room_id`, leaving whatever room it was in.
    pub async fn join(&self, conn_id: ConnectionId, room_id: &str) -> Result<(), HubError> {
        if !room_id_is_valid(room_id) {
            return Err(HubError::EmptyRoomId);
        }

        let tx = {
            let connections = self.inner.connections.read().await;
            let entry = connections
                .get(&conn_id)
                .ok_or(HubError::UnknownConnection(conn_id))?;
            if entry.room_id.as_deref() == Some(room_id) {
                return Ok(());
            }
            entry.tx.clone()
        };

        self.leave(conn_id).await;

        // Record the room before the membership so an aborted join never
        // leaves a member the registry does not know about.
        match self.inner.connections.write().await.get_mut(&conn_id) {
            Some(entry) => entry.room_id = Some(room_id.to_string()),
            None => return Err(HubError::UnknownConnection(conn_id)),
        }

        loop {
            let slot = self.room_slot(room_id).await;
            let mut room = slot.lock().await;
            if room.closed {
                continue;
            }
            room.members.insert(conn_id, tx);
            info!("{} joined room {} ({} members)", conn_id, room_id, room.members.len());
            break;
        }

        Ok(())
    }

    /// Remove the connection from its room. Returns false if it was not in one.
    ///
    /// The registry keeps pointing at the room until the membership is gone,
    /// so a leave cancelled halfway is finished by the next leave or
    /// `unregister`.
    pub async fn leave(&self, conn_id: ConnectionId) -> bool {
        let room_id = self
            .inner
            .connections
            .read()
            .await
            .get(&conn_id)
            .and_then(|entry| entry.room_id.clone());

        let Some(room_id) = room_id else {
            return false;
        };

        self.remove_members(&room_id, &[conn_id]).await;

        let mut connections = self.inner.connections.write().await;
        if let Some(entry) = connections.get_mut(&conn_id) {
            if entry.room_id.as_deref() == Some(room_id.as_str()) {
                entry.room_id = None;
            }
        }
        drop(connections);

        info!("{} left room {}", conn_id, room_id);
        true
    }

    /// Relay `content` to every other member of `room_id`. The publisher
    /// must itself be a member. Returns the number of connections reached.
    pub async fn publish(
        &self,
        conn_id: ConnectionId,
        room_id: &str,
        content: String,
    ) -> Result<usize, HubError> {
        if !room_id_is_valid(room_id) {
            return Err(HubError::EmptyRoomId);
        }

        let not_member = || HubError::NotMember {
            connection: conn_id,
            room_id: room_id.to_string(),
        };

        let slot = self.inner.rooms.read().await.get(room_id).cloned();
        let slot = slot.ok_or_else(not_member)?;

        let mut room = slot.lock().await;
        if !room.members.contains_key(&conn_id) {
            return Err(not_member());
        }

        let event = GatewayEvent::ReceiveUpdate {
            room_id: room_id.to_string(),
            content,
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (&member_id, tx) in room.members.iter() {
            if member_id == conn_id {
                continue;
            }
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(member_id);
            }
        }

        for member_id in &dead {
            room.members.remove(member_id);
        }
        drop(room);

        if !dead.is_empty() {
            warn!("Dropped {} closed connections from room {}", dead.len(), room_id);
        }
        trace!("{} relayed update in {} to {} members", conn_id, room_id, delivered);

        Ok(delivered)
    }

    /// Number of connections currently in `room_id`.
    pub async fn member_count(&self, room_id: &str) -> usize {
        let slot = self.inner.rooms.read().await.get(room_id).cloned();
        match slot {
            Some(slot) => slot.lock().await.members.len(),
            None => 0,
        }
    }

    /// Number of rooms with at least one member.
    pub async fn room_count(&self) -> usize {
        self.inner.rooms.read().await.len()
    }

    /// The room a connection is in, if any.
    pub async fn room_of(&self, conn_id: ConnectionId) -> Option<String> {
        self.inner
            .connections
            .read()
            .await
            .get(&conn_id)
            .and_then(|entry| entry.room_id.clone())
    }

    async fn room_slot(&self, room_id: &str) -> Arc<Mutex<RoomMembers>> {
        if let Some(slot) = self.inner.rooms.read().await.get(room_id) {
            return slot.clone();
        }

        self.inner
            .rooms
            .write()
            .await
            .entry(room_id.to_string())
            .or_default()
            .clone()
    }

    async fn remove_members(&self, room_id: &str, conn_ids: &[ConnectionId]) {
        let slot = self.inner.rooms.read().await.get(room_id).cloned();
        let Some(slot) = slot else {
            return;
        };

        let now_empty = {
            let mut room = slot.lock().await;
            for conn_id in conn_ids {
                room.members.remove(conn_id);
            }
            room.members.is_empty()
        };

        if now_empty {
            self.prune(room_id).await;
        }
    }

    async fn prune(&self, room_id: &str) {
        let mut rooms = self.inner.rooms.write().await;
        let Some(slot) = rooms.get(room_id).cloned() else {
            return;
        };

        let mut room = slot.lock().await;
        if room.members.is_empty() {
            room.closed = true;
            rooms.remove(room_id);
            debug!("Pruned empty room {}", room_id);
        }
    }
}
