//! Shaping room state into broadcast payloads

use uuid::Uuid;

use crate::ws::protocol::{GameStart, ScoreUpdate, ServerMsg, Sound, StateSnapshot};

use super::physics::{Ball, Side, TickEvents};
use super::room::Player;

/// Builds room events for network transmission
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Per-tick authoritative positions
    pub fn state(ball: &Ball, player1: &Player, player2: &Player) -> ServerMsg {
        ServerMsg::GameStateUpdate(StateSnapshot {
            ball_x: ball.x,
            ball_y: ball.y,
            player1_y: player1.paddle_y,
            player2_y: player2.paddle_y,
        })
    }

    pub fn score(player1: &Player, player2: &Player) -> ServerMsg {
        ServerMsg::ScoreUpdate(ScoreUpdate {
            player1_score: player1.score,
            player2_score: player2.score,
        })
    }

    /// Sound cues in wall-then-paddle order
    pub fn sound_cues(events: &TickEvents) -> Vec<ServerMsg> {
        let mut cues = Vec::with_capacity(2);
        if events.wall_hit {
            cues.push(ServerMsg::PlaySound(Sound::WallHit));
        }
        if events.paddle_hit.is_some() {
            cues.push(ServerMsg::PlaySound(Sound::PaddleHit));
        }
        cues
    }

    /// The `gameStart` message as seen from `side`
    pub fn game_start(room_id: Uuid, player1: &Player, player2: &Player, side: Side) -> ServerMsg {
        let opponent = match side {
            Side::Player1 => player2,
            Side::Player2 => player1,
        };

        ServerMsg::GameStart(GameStart {
            room_id,
            opponent_name: opponent.display_name.clone(),
            is_player1: side == Side::Player1,
            player1_name: player1.display_name.clone(),
            player2_name: player2.display_name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_start_is_shaped_per_side() {
        let room_id = Uuid::new_v4();
        let a = Player::new(Uuid::new_v4(), "A".into());
        let b = Player::new(Uuid::new_v4(), "B".into());

        match SnapshotBuilder::game_start(room_id, &a, &b, Side::Player2) {
            ServerMsg::GameStart(start) => {
                assert_eq!(start.room_id, room_id);
                assert_eq!(start.opponent_name, "A");
                assert!(!start.is_player1);
                assert_eq!((start.player1_name.as_str(), start.player2_name.as_str()), ("A", "B"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn sound_cues_follow_events() {
        let quiet = TickEvents::default();
        assert!(SnapshotBuilder::sound_cues(&quiet).is_empty());

        let busy = TickEvents {
            wall_hit: true,
            paddle_hit: Some(Side::Player1),
            goal: None,
        };
        assert_eq!(
            SnapshotBuilder::sound_cues(&busy),
            vec![
                ServerMsg::PlaySound(Sound::WallHit),
                ServerMsg::PlaySound(Sound::PaddleHit)
            ]
        );
    }
}
