//! Single-occupant waiting slot

use std::time::{Duration, Instant};

use crate::ws::dispatcher::ConnectionId;

/// Client waiting for an opponent
#[derive(Debug, Clone)]
pub struct WaitingPlayer {
    pub conn_id: ConnectionId,
    pub display_name: String,
    pub queued_at: Instant,
}

impl WaitingPlayer {
    pub fn new(conn_id: ConnectionId, display_name: String) -> Self {
        Self {
            conn_id,
            display_name,
            queued_at: Instant::now(),
        }
    }

    /// How long this player has been waiting
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }
}

/// Holds at most one waiting client
#[derive(Debug, Default)]
pub struct WaitingSlot {
    occupant: Option<WaitingPlayer>,
}

impl WaitingSlot {
    pub fn holds(&self, conn_id: &ConnectionId) -> bool {
        self.occupant
            .as_ref()
            .map(|p| &p.conn_id == conn_id)
            .unwrap_or(false)
    }

    /// Seat a player, returning whoever was displaced
    pub fn put(&mut self, player: WaitingPlayer) -> Option<WaitingPlayer> {
        self.occupant.replace(player)
    }

    pub fn take(&mut self) -> Option<WaitingPlayer> {
        self.occupant.take()
    }

    /// Empty the slot if `conn_id` holds it
    pub fn clear_if(&mut self, conn_id: &ConnectionId) -> bool {
        if self.holds(conn_id) {
            self.occupant = None;
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        usize::from(self.occupant.is_some())
    }
}
