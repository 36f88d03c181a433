//! WebSocket protocol message definitions
//! These are the wire types for client-server communication.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`;
//! events without a payload carry no `data` field.

use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Request to enter matchmaking under the given display name
    JoinGame(String),

    /// Requested paddle offset for the sender's side
    PaddleMove(PaddleMove),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaddleMove {
    pub room_id: Uuid,
    pub y: f32,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Queued, no opponent yet
    WaitingForPlayer,

    /// Match formed
    GameStart(GameStart),

    /// Pre-countdown signal; clients reset paddles and ball
    GetReady,

    /// Countdown step
    Countdown(CountdownStep),

    /// Per-tick authoritative snapshot
    GameStateUpdate(StateSnapshot),

    /// Score pair after each point
    ScoreUpdate(ScoreUpdate),

    /// Collision cue
    PlaySound(Sound),

    /// Match concluded
    GameOver(GameOver),

    /// Peer disconnected mid-match
    OpponentLeft,
}

impl ServerMsg {
    /// Wire name of the event, for logging
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::WaitingForPlayer => "waitingForPlayer",
            Self::GameStart(_) => "gameStart",
            Self::GetReady => "getReady",
            Self::Countdown(_) => "countdown",
            Self::GameStateUpdate(_) => "gameStateUpdate",
            Self::ScoreUpdate(_) => "scoreUpdate",
            Self::PlaySound(_) => "playSound",
            Self::GameOver(_) => "gameOver",
            Self::OpponentLeft => "opponentLeft",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStart {
    pub room_id: Uuid,
    pub opponent_name: String,
    pub is_player1: bool,
    pub player1_name: String,
    pub player2_name: String,
}

/// A countdown value: `3`, `2`, `1` on the wire, then `"GO!"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    Remaining(u8),
    Go,
}

impl Serialize for CountdownStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Remaining(n) => serializer.serialize_u8(*n),
            Self::Go => serializer.serialize_str("GO!"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub ball_x: f32,
    pub ball_y: f32,
    pub player1_y: f32,
    pub player2_y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdate {
    pub player1_score: u32,
    pub player2_score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Sound {
    WallHit,
    PaddleHit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOver {
    pub winner_name: String,
}
