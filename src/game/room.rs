//! Room state and authoritative tick loop

use parking_lot::RwLock;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::util::time::{countdown_step, tick_duration, COUNTDOWN_STEPS};
use crate::ws::dispatcher::{ConnectionId, Dispatcher, RoomId};
use crate::ws::protocol::{CountdownStep, GameOver, ServerMsg};

use super::physics::{Ball, PhysicsSystem, Side, PADDLE_CENTER_Y};
use super::registry::RoomRegistry;
use super::snapshot::SnapshotBuilder;

/// Points needed to win a match
pub const WINNING_SCORE: u32 = 5;

/// Queued paddle moves per room before new ones are dropped
pub const ROOM_COMMAND_CAPACITY: usize = 64;

/// Room lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Created, countdown not yet started
    ReadyPending,
    /// Counting down to the first serve
    Countdown,
    /// Ball in play
    Live,
    /// A player reached the winning score; room is inert
    GameOver,
    /// A player disconnected; terminal
    Closed,
}

/// Player state in a room (authoritative)
#[derive(Debug, Clone)]
pub struct Player {
    pub conn_id: ConnectionId,
    pub display_name: String,
    /// Top edge of the paddle
    pub paddle_y: f32,
    pub score: u32,
}

impl Player {
    pub fn new(conn_id: ConnectionId, display_name: String) -> Self {
        Self {
            conn_id,
            display_name,
            paddle_y: PADDLE_CENTER_Y,
            score: 0,
        }
    }
}

/// Input routed to a running room
#[derive(Debug, Clone)]
pub enum RoomCommand {
    PaddleMove { conn_id: ConnectionId, y: f32 },
}

/// Room state (owned by the room task)
pub struct RoomState {
    pub id: RoomId,
    pub phase: RoomPhase,
    pub tick: u64,
    pub player1: Player,
    pub player2: Player,
    pub ball: Ball,
    pub last_hit: Option<Side>,
    rng: ChaCha8Rng,
}

impl RoomState {
    pub fn new(id: RoomId, player1: Player, player2: Player, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let ball = Ball::serve(&mut rng);

        Self {
            id,
            phase: RoomPhase::ReadyPending,
            tick: 0,
            player1,
            player2,
            ball,
            last_hit: None,
            rng,
        }
    }

    pub fn player(&self, side: Side) -> &Player {
        match side {
            Side::Player1 => &self.player1,
            Side::Player2 => &self.player2,
        }
    }

    fn player_mut(&mut self, side: Side) -> &mut Player {
        match side {
            Side::Player1 => &mut self.player1,
            Side::Player2 => &mut self.player2,
        }
    }

    pub fn side_of(&self, conn_id: &ConnectionId) -> Option<Side> {
        if &self.player1.conn_id == conn_id {
            Some(Side::Player1)
        } else if &self.player2.conn_id == conn_id {
            Some(Side::Player2)
        } else {
            None
        }
    }

    /// Paddles back to the vertical center, ready for the countdown
    pub fn begin_countdown(&mut self) {
        self.phase = RoomPhase::Countdown;
        self.player1.paddle_y = PADDLE_CENTER_Y;
        self.player2.paddle_y = PADDLE_CENTER_Y;
    }

    /// Countdown finished: serve and start playing
    pub fn go_live(&mut self) {
        self.phase = RoomPhase::Live;
        self.reset_round();
    }

    fn reset_round(&mut self) {
        self.ball = Ball::serve(&mut self.rng);
        self.last_hit = None;
    }

    pub fn apply(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::PaddleMove { conn_id, y } => self.handle_paddle_move(&conn_id, y),
        }
    }

    fn handle_paddle_move(&mut self, conn_id: &ConnectionId, y: f32) {
        if self.phase == RoomPhase::Closed || !y.is_finite() {
            return;
        }
        if let Some(side) = self.side_of(conn_id) {
            self.player_mut(side).paddle_y = PhysicsSystem::clamp_paddle(y);
        }
    }

    /// Run a single simulation tick, returning the room events it produced
    pub fn run_tick(&mut self) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        if self.phase != RoomPhase::Live {
            return out;
        }
        self.tick += 1;

        let events = PhysicsSystem::step(
            &mut self.ball,
            self.player1.paddle_y,
            self.player2.paddle_y,
            &mut self.last_hit,
        );
        out.extend(SnapshotBuilder::sound_cues(&events));

        if let Some(scorer) = events.goal {
            self.player_mut(scorer).score += 1;
            out.push(SnapshotBuilder::score(&self.player1, &self.player2));

            if self.player(scorer).score >= WINNING_SCORE {
                self.phase = RoomPhase::GameOver;
                out.push(ServerMsg::GameOver(GameOver {
                    winner_name: self.player(scorer).display_name.clone(),
                }));
                return out;
            }

            self.reset_round();
        }

        out.push(SnapshotBuilder::state(&self.ball, &self.player1, &self.player2));
        out
    }
}

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub id: RoomId,
    pub members: [ConnectionId; 2],
    cmd_tx: mpsc::Sender<RoomCommand>,
    phase: Arc<RwLock<RoomPhase>>,
    task: Arc<AbortHandle>,
}

impl RoomHandle {
    pub fn phase(&self) -> RoomPhase {
        *self.phase.read()
    }

    pub fn is_member(&self, conn_id: &ConnectionId) -> bool {
        self.members.contains(conn_id)
    }

    pub fn opponent_of(&self, conn_id: &ConnectionId) -> Option<ConnectionId> {
        match self.members {
            [a, b] if &a == conn_id => Some(b),
            [a, b] if &b == conn_id => Some(a),
            _ => None,
        }
    }

    /// Forward a paddle move; dropped if the room is inert or backed up
    pub fn paddle_move(&self, conn_id: ConnectionId, y: f32) {
        let _ = self.cmd_tx.try_send(RoomCommand::PaddleMove { conn_id, y });
    }

    /// Stop the room task. Takes effect immediately and is safe to repeat.
    pub fn close(&self) {
        *self.phase.write() = RoomPhase::Closed;
        self.task.abort();
    }
}

/// The authoritative game room
pub struct GameRoom {
    state: RoomState,
    cmd_rx: mpsc::Receiver<RoomCommand>,
    phase: Arc<RwLock<RoomPhase>>,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<RoomRegistry>,
}

impl GameRoom {
    /// Spawn the room task and register it. Both players must already be
    /// joined to the room on the dispatcher.
    pub fn spawn(
        id: RoomId,
        player1: Player,
        player2: Player,
        seed: u64,
        dispatcher: Arc<Dispatcher>,
        registry: Arc<RoomRegistry>,
    ) -> RoomHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(ROOM_COMMAND_CAPACITY);
        let phase = Arc::new(RwLock::new(RoomPhase::ReadyPending));
        let members = [player1.conn_id, player2.conn_id];

        let room = Self {
            state: RoomState::new(id, player1, player2, seed),
            cmd_rx,
            phase: phase.clone(),
            dispatcher,
            registry: registry.clone(),
        };

        let task = tokio::spawn(room.run());

        let handle = RoomHandle {
            id,
            members,
            cmd_tx,
            phase,
            task: Arc::new(task.abort_handle()),
        };
        registry.insert(handle.clone());
        handle
    }

    async fn run(mut self) {
        info!(
            room_id = %self.state.id,
            player1 = %self.state.player1.display_name,
            player2 = %self.state.player2.display_name,
            "Room countdown starting"
        );

        self.state.begin_countdown();
        self.publish_phase();
        self.broadcast(&ServerMsg::GetReady);

        if !self.run_countdown().await {
            return;
        }

        self.state.go_live();
        self.publish_phase();
        self.run_live().await;
    }

    /// Emit 3, 2, 1, GO one step apart. Returns false if the room went away.
    async fn run_countdown(&mut self) -> bool {
        let step = countdown_step();
        let mut timer = interval_at(Instant::now() + step, step);
        let mut remaining = COUNTDOWN_STEPS;

        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.state.apply(cmd),
                    None => return false,
                },
                _ = timer.tick() => {
                    if !self.registry.contains(&self.state.id) {
                        return false;
                    }

                    if remaining > 0 {
                        self.broadcast(&ServerMsg::Countdown(CountdownStep::Remaining(remaining)));
                        remaining -= 1;
                    } else {
                        self.broadcast(&ServerMsg::Countdown(CountdownStep::Go));
                        return true;
                    }
                }
            }
        }
    }

    async fn run_live(&mut self) {
        let tick = tick_duration();
        let mut ticker = interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.state.apply(cmd),
                    None => return,
                },
                _ = ticker.tick() => {
                    if !self.registry.contains(&self.state.id) {
                        debug!(room_id = %self.state.id, "Room no longer registered, stopping tick loop");
                        return;
                    }

                    let events = self.state.run_tick();
                    self.broadcast_all(&events);

                    if self.state.phase == RoomPhase::GameOver {
                        self.publish_phase();
                        info!(
                            room_id = %self.state.id,
                            player1_score = self.state.player1.score,
                            player2_score = self.state.player2.score,
                            ticks = self.state.tick,
                            "Game over"
                        );
                        return;
                    }
                }
            }
        }
    }

    fn broadcast(&self, msg: &ServerMsg) {
        self.broadcast_all(std::slice::from_ref(msg));
    }

    /// Deliver a batch of room events unless the room has been closed. The
    /// shared phase stays read-locked for the whole batch, so `close` lands
    /// between batches and nothing is delivered after it.
    fn broadcast_all(&self, msgs: &[ServerMsg]) {
        let phase = self.phase.read();
        if *phase == RoomPhase::Closed {
            return;
        }
        for msg in msgs {
            self.dispatcher.broadcast(&self.state.id, msg);
        }
    }

    /// Mirror the lifecycle phase onto the shared handle. A closed room stays closed.
    fn publish_phase(&self) {
        let mut shared = self.phase.write();
        if *shared != RoomPhase::Closed {
            *shared = self.state.phase;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::{AREA_HEIGHT, PADDLE_MAX_Y};
    use crate::ws::dispatcher::OutboundReceiver;
    use crate::ws::protocol::{ScoreUpdate, StateSnapshot};
    use std::time::Duration;
    use uuid::Uuid;

    fn players() -> (Player, Player) {
        (
            Player::new(Uuid::new_v4(), "A".to_string()),
            Player::new(Uuid::new_v4(), "B".to_string()),
        )
    }

    struct Table {
        dispatcher: Arc<Dispatcher>,
        registry: Arc<RoomRegistry>,
        handle: RoomHandle,
        rx_a: OutboundReceiver,
        rx_b: OutboundReceiver,
        a: ConnectionId,
        b: ConnectionId,
    }

    fn open_table(seed: u64) -> Table {
        let dispatcher = Arc::new(Dispatcher::new());
        let registry = Arc::new(RoomRegistry::new());
        let (p1, p2) = players();
        let (a, b) = (p1.conn_id, p2.conn_id);
        let rx_a = dispatcher.register(a);
        let rx_b = dispatcher.register(b);

        let room_id = Uuid::new_v4();
        dispatcher.join_room(room_id, a);
        dispatcher.join_room(room_id, b);
        let handle = GameRoom::spawn(room_id, p1, p2, seed, dispatcher.clone(), registry.clone());

        Table {
            dispatcher,
            registry,
            handle,
            rx_a,
            rx_b,
            a,
            b,
        }
    }

    async fn next_state(rx: &mut OutboundReceiver) -> StateSnapshot {
        loop {
            match rx.recv().await {
                Some(ServerMsg::GameStateUpdate(state)) => return state,
                Some(_) => continue,
                None => panic!("outbound queue closed"),
            }
        }
    }

    fn live_state() -> RoomState {
        let (p1, p2) = players();
        let mut state = RoomState::new(Uuid::new_v4(), p1, p2, 9);
        state.begin_countdown();
        state.go_live();
        state
    }

    /// Put the ball one tick away from Player 2's goal, clear of the paddle
    fn about_to_score_for_player1(state: &mut RoomState) {
        state.player2.paddle_y = 0.0;
        state.ball = Ball {
            x: 590.0,
            y: 350.0,
            vel_x: 4.0,
            vel_y: 0.0,
            radius: state.ball.radius,
        };
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_runs_before_any_tick() {
        let mut table = open_table(1);
        let start = Instant::now();

        assert_eq!(table.rx_a.recv().await, Some(ServerMsg::GetReady));

        let steps = [
            CountdownStep::Remaining(3),
            CountdownStep::Remaining(2),
            CountdownStep::Remaining(1),
            CountdownStep::Go,
        ];
        for (i, step) in steps.into_iter().enumerate() {
            assert_eq!(table.rx_a.recv().await, Some(ServerMsg::Countdown(step)));
            let elapsed = start.elapsed();
            let expected = Duration::from_secs(i as u64 + 1);
            assert!(
                elapsed >= expected && elapsed < expected + Duration::from_millis(5),
                "step {i} at {elapsed:?}"
            );
        }
        assert_eq!(table.handle.phase(), RoomPhase::Live);

        // First tick moves the fresh serve one step diagonally
        match table.rx_a.recv().await {
            Some(ServerMsg::GameStateUpdate(state)) => {
                assert_eq!((state.ball_x - 300.0).abs(), 4.0);
                assert_eq!((state.ball_y - 200.0).abs(), 4.0);
                assert_eq!(state.player1_y, PADDLE_CENTER_Y);
                assert_eq!(state.player2_y, PADDLE_CENTER_Y);
            }
            other => panic!("expected a state update, got {other:?}"),
        }

        // Player 2 saw the same opening sequence
        assert_eq!(table.rx_b.recv().await, Some(ServerMsg::GetReady));
    }

    #[tokio::test(start_paused = true)]
    async fn paddle_moves_land_on_the_next_tick() {
        let mut table = open_table(2);
        next_state(&mut table.rx_a).await;

        table.handle.paddle_move(table.a, 80.0);
        let state = next_state(&mut table.rx_a).await;
        assert_eq!(state.player1_y, 80.0);
        assert_eq!(state.player2_y, PADDLE_CENTER_Y);

        // Last write before the tick wins; out-of-range offsets are clamped
        table.handle.paddle_move(table.b, 10.0);
        table.handle.paddle_move(table.b, AREA_HEIGHT * 2.0);
        table.handle.paddle_move(Uuid::new_v4(), 0.0);
        table.handle.paddle_move(table.a, f32::NAN);
        let state = next_state(&mut table.rx_a).await;
        assert_eq!(state.player1_y, 80.0);
        assert_eq!(state.player2_y, PADDLE_MAX_Y);
    }

    #[tokio::test(start_paused = true)]
    async fn paddle_moves_during_countdown_are_kept() {
        let mut table = open_table(3);
        assert_eq!(table.rx_a.recv().await, Some(ServerMsg::GetReady));

        table.handle.paddle_move(table.a, 150.0);
        table.handle.paddle_move(table.b, 40.0);
        let state = next_state(&mut table.rx_b).await;
        assert_eq!(state.player1_y, 150.0);
        assert_eq!(state.player2_y, 40.0);
    }

    #[tokio::test(start_paused = true)]
    async fn removed_room_stops_ticking() {
        let mut table = open_table(4);
        next_state(&mut table.rx_a).await;

        let handle = table.registry.remove(&table.handle.id).expect("room registered");
        handle.close();
        handle.close();
        assert_eq!(handle.phase(), RoomPhase::Closed);

        // Anything already queued drains, then nothing more arrives
        tokio::time::sleep(Duration::from_secs(1)).await;
        while table.rx_a.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(table.rx_a.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn match_plays_out_to_game_over() {
        let mut table = open_table(5);
        let mut final_score = None;
        let winner;

        loop {
            while table.rx_b.try_recv().is_ok() {}
            match table.rx_a.recv().await.expect("outbound queue open") {
                ServerMsg::GameStateUpdate(state) => {
                    // Both players dodge the ball so every serve becomes a point
                    let dodge = if state.ball_y > AREA_HEIGHT / 2.0 { 0.0 } else { PADDLE_MAX_Y };
                    table.handle.paddle_move(table.a, dodge);
                    table.handle.paddle_move(table.b, dodge);
                }
                ServerMsg::ScoreUpdate(score) => final_score = Some(score),
                ServerMsg::GameOver(over) => {
                    winner = over.winner_name;
                    break;
                }
                _ => {}
            }
        }

        let ScoreUpdate {
            player1_score,
            player2_score,
        } = final_score.expect("at least one point");
        assert_eq!(player1_score.max(player2_score), WINNING_SCORE);
        assert!(player1_score.min(player2_score) < WINNING_SCORE);
        let expected = if player1_score == WINNING_SCORE { "A" } else { "B" };
        assert_eq!(winner, expected);

        // Inert but still retrievable
        tokio::time::sleep(Duration::from_secs(2)).await;
        while let Ok(msg) = table.rx_a.try_recv() {
            assert!(!matches!(msg, ServerMsg::GameStateUpdate(_)), "tick after game over");
        }
        let handle = table.registry.get(&table.handle.id).expect("room still registered");
        assert_eq!(handle.phase(), RoomPhase::GameOver);
        assert!(table.dispatcher.is_connected(&table.b));
    }

    #[test]
    fn ticks_only_while_live() {
        let (p1, p2) = players();
        let mut state = RoomState::new(Uuid::new_v4(), p1, p2, 1);
        assert!(state.run_tick().is_empty());

        state.begin_countdown();
        assert!(state.run_tick().is_empty());

        state.go_live();
        let out = state.run_tick();
        assert!(matches!(out.last(), Some(ServerMsg::GameStateUpdate(_))));
        assert_eq!(state.tick, 1);
    }

    #[test]
    fn goal_scores_once_and_resets_round() {
        let mut state = live_state();
        about_to_score_for_player1(&mut state);
        state.last_hit = Some(Side::Player1);

        let out = state.run_tick();
        assert_eq!(
            out,
            vec![
                ServerMsg::ScoreUpdate(ScoreUpdate {
                    player1_score: 1,
                    player2_score: 0
                }),
                SnapshotBuilder::state(&state.ball, &state.player1, &state.player2),
            ]
        );
        assert_eq!((state.ball.x, state.ball.y), (300.0, 200.0));
        assert_eq!(state.last_hit, None);
        assert_eq!(state.phase, RoomPhase::Live);
    }

    #[test]
    fn fifth_point_ends_the_match() {
        let mut state = live_state();

        for point in 1..=WINNING_SCORE {
            assert_eq!(state.phase, RoomPhase::Live);
            about_to_score_for_player1(&mut state);
            let out = state.run_tick();
            assert_eq!(state.player1.score, point);

            let has_snapshot = out
                .iter()
                .any(|m| matches!(m, ServerMsg::GameStateUpdate(_)));
            assert_eq!(has_snapshot, point < WINNING_SCORE);
        }

        assert_eq!(state.phase, RoomPhase::GameOver);
        assert_eq!(state.player2.score, 0);
        assert!(state.run_tick().is_empty());

        // The finished state itself still takes paddle input
        let conn_id = state.player1.conn_id;
        state.apply(RoomCommand::PaddleMove { conn_id, y: 20.0 });
        assert_eq!(state.player1.paddle_y, 20.0);
    }

    #[test]
    fn winner_event_names_the_scorer() {
        let mut state = live_state();
        state.player1.score = WINNING_SCORE - 1;
        about_to_score_for_player1(&mut state);

        let out = state.run_tick();
        assert_eq!(
            out.last(),
            Some(&ServerMsg::GameOver(GameOver {
                winner_name: "A".to_string()
            }))
        );
    }

    #[test]
    fn closed_room_delivers_nothing() {
        let dispatcher = Arc::new(Dispatcher::new());
        let (p1, p2) = players();
        let (a, b) = (p1.conn_id, p2.conn_id);
        let mut rx_a = dispatcher.register(a);
        let room_id = Uuid::new_v4();
        dispatcher.join_room(room_id, a);
        dispatcher.join_room(room_id, b);

        let (_cmd_tx, cmd_rx) = mpsc::channel(1);
        let mut room = GameRoom {
            state: RoomState::new(room_id, p1, p2, 6),
            cmd_rx,
            phase: Arc::new(RwLock::new(RoomPhase::Live)),
            dispatcher,
            registry: Arc::new(RoomRegistry::new()),
        };
        room.state.begin_countdown();
        room.state.go_live();

        let events = room.state.run_tick();
        room.broadcast_all(&events);
        assert!(matches!(rx_a.try_recv(), Ok(ServerMsg::GameStateUpdate(_))));

        *room.phase.write() = RoomPhase::Closed;
        let events = room.state.run_tick();
        room.broadcast_all(&events);
        room.publish_phase();
        assert!(rx_a.try_recv().is_err());
        assert_eq!(*room.phase.read(), RoomPhase::Closed);
    }

    #[test]
    fn handle_resolves_opponents() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let task = rt.spawn(async {});
        let (cmd_tx, _cmd_rx) = mpsc::channel(1);
        let handle = RoomHandle {
            id: Uuid::new_v4(),
            members: [a, b],
            cmd_tx,
            phase: Arc::new(RwLock::new(RoomPhase::Live)),
            task: Arc::new(task.abort_handle()),
        };

        assert_eq!(handle.opponent_of(&a), Some(b));
        assert_eq!(handle.opponent_of(&b), Some(a));
        assert_eq!(handle.opponent_of(&c), None);
        assert!(handle.is_member(&a) && !handle.is_member(&c));
    }
}
