//! Matchmaking service - pairs waiting clients and tears rooms down

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::game::physics::Side;
use crate::game::snapshot::SnapshotBuilder;
use crate::game::{GameRoom, Player, RoomHandle, RoomPhase, RoomRegistry};
use crate::ws::dispatcher::{ConnectionId, Dispatcher, RoomId};
use crate::ws::protocol::ServerMsg;

use super::queue::{WaitingPlayer, WaitingSlot};

/// Result of a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Took the empty waiting slot
    Waiting,
    /// Already the waiting occupant
    AlreadyWaiting,
    /// The waiting occupant was gone; the caller waits in its place
    Requeued,
    /// Paired with the waiting occupant
    Paired(RoomId),
    /// Caller is still playing in another room
    Ignored,
}

/// State shared by every connection, guarded as one unit
#[derive(Default)]
struct Lobby {
    waiting: WaitingSlot,
    /// Map of connection -> current room
    memberships: HashMap<ConnectionId, RoomId>,
}

/// Matchmaking service
pub struct MatchmakingService {
    lobby: Mutex<Lobby>,
    registry: Arc<RoomRegistry>,
    dispatcher: Arc<Dispatcher>,
}

impl MatchmakingService {
    pub fn new(registry: Arc<RoomRegistry>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            lobby: Mutex::new(Lobby::default()),
            registry,
            dispatcher,
        }
    }

    /// Enter matchmaking. Emits either `waitingForPlayer` to the caller or
    /// `gameStart` to both members of a new room.
    pub fn join(&self, conn_id: ConnectionId, display_name: String) -> JoinOutcome {
        let mut lobby = self.lobby.lock();

        if let Some(room_id) = lobby.memberships.get(&conn_id).copied() {
            match self.registry.get(&room_id) {
                Some(handle) if handle.phase() == RoomPhase::GameOver => {
                    self.close_room(&mut lobby, handle, &conn_id);
                }
                Some(_) => {
                    warn!(conn_id = %conn_id, room_id = %room_id, "Join while in an active room, ignoring");
                    return JoinOutcome::Ignored;
                }
                None => {
                    lobby.memberships.remove(&conn_id);
                }
            }
        }

        match lobby.waiting.take() {
            None => {
                lobby.waiting.put(WaitingPlayer::new(conn_id, display_name));
                info!(conn_id = %conn_id, "Player waiting for opponent");
                self.dispatcher.notify(&conn_id, ServerMsg::WaitingForPlayer);
                JoinOutcome::Waiting
            }
            Some(waiting) if waiting.conn_id == conn_id => {
                lobby.waiting.put(waiting);
                self.dispatcher.notify(&conn_id, ServerMsg::WaitingForPlayer);
                JoinOutcome::AlreadyWaiting
            }
            Some(waiting) if !self.dispatcher.is_connected(&waiting.conn_id) => {
                warn!(
                    stale_conn_id = %waiting.conn_id,
                    conn_id = %conn_id,
                    "Waiting player unreachable, requeueing joiner"
                );
                lobby.waiting.put(WaitingPlayer::new(conn_id, display_name));
                self.dispatcher.notify(&conn_id, ServerMsg::WaitingForPlayer);
                JoinOutcome::Requeued
            }
            Some(waiting) => {
                let room_id = self.create_room(&mut lobby, waiting, conn_id, display_name);
                JoinOutcome::Paired(room_id)
            }
        }
    }

    fn create_room(
        &self,
        lobby: &mut Lobby,
        waiting: WaitingPlayer,
        conn_id: ConnectionId,
        display_name: String,
    ) -> RoomId {
        let room_id = Uuid::new_v4();
        let waited_ms = waiting.wait_time().as_millis() as u64;
        let player1 = Player::new(waiting.conn_id, waiting.display_name);
        let player2 = Player::new(conn_id, display_name);

        self.dispatcher.notify(
            &player1.conn_id,
            SnapshotBuilder::game_start(room_id, &player1, &player2, Side::Player1),
        );
        self.dispatcher.notify(
            &player2.conn_id,
            SnapshotBuilder::game_start(room_id, &player1, &player2, Side::Player2),
        );

        for member in [player1.conn_id, player2.conn_id] {
            self.dispatcher.join_room(room_id, member);
            lobby.memberships.insert(member, room_id);
        }

        info!(
            room_id = %room_id,
            player1 = %player1.display_name,
            player2 = %player2.display_name,
            waited_ms,
            "Created new room"
        );

        GameRoom::spawn(
            room_id,
            player1,
            player2,
            rand::random::<u64>(),
            self.dispatcher.clone(),
            self.registry.clone(),
        );

        room_id
    }

    /// Route a paddle offset to its room; unknown rooms are ignored
    pub fn paddle_move(&self, conn_id: ConnectionId, room_id: RoomId, y: f32) {
        if let Some(handle) = self.registry.get(&room_id) {
            if handle.is_member(&conn_id) {
                handle.paddle_move(conn_id, y);
            }
        }
    }

    /// Handle a dropped connection: free the waiting slot or close its room
    pub fn disconnect(&self, conn_id: ConnectionId) {
        let mut lobby = self.lobby.lock();

        if lobby.waiting.clear_if(&conn_id) {
            info!(conn_id = %conn_id, "Waiting player disconnected");
            return;
        }

        if let Some(room_id) = lobby.memberships.get(&conn_id).copied() {
            match self.registry.get(&room_id) {
                Some(handle) => self.close_room(&mut lobby, handle, &conn_id),
                None => {
                    lobby.memberships.remove(&conn_id);
                }
            }
        }
    }

    /// Closed transition: unregister, stop the task, tell the other member.
    /// `opponentLeft` is the last event either member sees from the room.
    fn close_room(&self, lobby: &mut Lobby, handle: RoomHandle, leaver: &ConnectionId) {
        self.registry.remove(&handle.id);
        self.dispatcher.drop_room(&handle.id);
        handle.close();

        for member in &handle.members {
            lobby.memberships.remove(member);
        }

        if let Some(opponent) = handle.opponent_of(leaver) {
            if self.dispatcher.is_connected(&opponent) {
                self.dispatcher.notify(&opponent, ServerMsg::OpponentLeft);
            }
        }

        info!(room_id = %handle.id, conn_id = %leaver, "Room closed");
    }

    /// Number of clients currently waiting (0 or 1)
    pub fn waiting_count(&self) -> usize {
        self.lobby.lock().waiting.len()
    }

}

#[cfg(test)]
impl MatchmakingService {
    fn is_waiting(&self, conn_id: &ConnectionId) -> bool {
        self.lobby.lock().waiting.holds(conn_id)
    }

    fn room_of(&self, conn_id: &ConnectionId) -> Option<RoomId> {
        self.lobby.lock().memberships.get(conn_id).copied()
    }
}
