//! Room-scoped event delivery to connected clients

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::protocol::ServerMsg;

/// Opaque handle for one WebSocket connection
pub type ConnectionId = Uuid;

/// Identifier of one pairing
pub type RoomId = Uuid;

/// Per-connection outbound queue.
/// Bounded so a stalled client can't grow memory without limit.
pub type OutboundSender = mpsc::Sender<ServerMsg>;
pub type OutboundReceiver = mpsc::Receiver<ServerMsg>;

pub const OUTBOUND_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    #[error("outbound queue for {0} is full")]
    QueueFull(ConnectionId),

    #[error("connection {0} has closed")]
    Disconnected(ConnectionId),
}

/// Delivers server events to single connections or to every member of a room.
///
/// Sends never wait: a full or closed queue drops the event.
pub struct Dispatcher {
    connections: DashMap<ConnectionId, OutboundSender>,
    rooms: DashMap<RoomId, Vec<ConnectionId>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    /// Register a connection and hand back the receiving end of its queue
    pub fn register(&self, conn_id: ConnectionId) -> OutboundReceiver {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        self.connections.insert(conn_id, tx);
        rx
    }

    pub fn unregister(&self, conn_id: &ConnectionId) {
        self.connections.remove(conn_id);
    }

    /// Whether events sent to this connection can still be delivered
    pub fn is_connected(&self, conn_id: &ConnectionId) -> bool {
        self.connections
            .get(conn_id)
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn join_room(&self, room_id: RoomId, conn_id: ConnectionId) {
        let mut members = self.rooms.entry(room_id).or_default();
        if !members.contains(&conn_id) {
            members.push(conn_id);
        }
    }

    /// Forget a room's membership list
    pub fn drop_room(&self, room_id: &RoomId) {
        self.rooms.remove(room_id);
    }

    pub fn room_members(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    /// Send one event to one connection
    pub fn send_to(&self, conn_id: &ConnectionId, msg: ServerMsg) -> Result<(), DispatchError> {
        let tx = self
            .connections
            .get(conn_id)
            .ok_or(DispatchError::UnknownConnection(*conn_id))?;

        tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull(*conn_id),
            mpsc::error::TrySendError::Closed(_) => DispatchError::Disconnected(*conn_id),
        })
    }

    /// Best-effort send, logging instead of failing
    pub fn notify(&self, conn_id: &ConnectionId, msg: ServerMsg) {
        let event = msg.event_name();
        match self.send_to(conn_id, msg) {
            Ok(()) => {}
            Err(e @ DispatchError::QueueFull(_)) => {
                warn!(conn_id = %conn_id, event, error = %e, "Dropped event");
            }
            Err(e) => {
                debug!(conn_id = %conn_id, event, error = %e, "Event not delivered");
            }
        }
    }

    /// Send one event to every member of a room; returns how many accepted it
    pub fn broadcast(&self, room_id: &RoomId, msg: &ServerMsg) -> usize {
        let members = self.room_members(room_id);
        let mut delivered = 0;

        for conn_id in &members {
            let event = msg.event_name();
            match self.send_to(conn_id, msg.clone()) {
                Ok(()) => delivered += 1,
                Err(e @ DispatchError::QueueFull(_)) => {
                    warn!(room_id = %room_id, conn_id = %conn_id, event, error = %e, "Dropped room event");
                }
                Err(_) => {}
            }
        }

        delivered
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
