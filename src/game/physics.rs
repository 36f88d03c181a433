//! Ball physics and paddle/wall collision

use rand::Rng;

/// Playfield dimensions
pub const AREA_WIDTH: f32 = 600.0;
pub const AREA_HEIGHT: f32 = 400.0;

/// Paddle geometry; paddles sit `PADDLE_MARGIN` in from their wall
pub const PADDLE_WIDTH: f32 = 10.0;
pub const PADDLE_HEIGHT: f32 = 100.0;
pub const PADDLE_MARGIN: f32 = 20.0;
pub const PADDLE_MAX_Y: f32 = AREA_HEIGHT - PADDLE_HEIGHT;
pub const PADDLE_CENTER_Y: f32 = (AREA_HEIGHT - PADDLE_HEIGHT) / 2.0;

/// Ball tuning
pub const BALL_RADIUS: f32 = 8.0;
pub const INITIAL_BALL_SPEED_X: f32 = 4.0;
pub const INITIAL_BALL_SPEED_Y: f32 = 4.0;
pub const MAX_BALL_SPEED_X: f32 = 10.0;
pub const MAX_BALL_SPEED_Y: f32 = 8.0;
pub const BALL_SPEED_INCREMENT: f32 = 0.2;
/// Vertical speed per unit of distance between ball and paddle center
pub const DEFLECTION_FACTOR: f32 = 0.35;

/// Which side of the table a player defends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Left paddle
    Player1,
    /// Right paddle
    Player2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub radius: f32,
}

impl Ball {
    /// A fresh ball at the center, each axis mirrored with probability 0.5
    pub fn serve<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let vel_x = if rng.gen_bool(0.5) {
            INITIAL_BALL_SPEED_X
        } else {
            -INITIAL_BALL_SPEED_X
        };
        let vel_y = if rng.gen_bool(0.5) {
            INITIAL_BALL_SPEED_Y
        } else {
            -INITIAL_BALL_SPEED_Y
        };

        Self {
            x: AREA_WIDTH / 2.0,
            y: AREA_HEIGHT / 2.0,
            vel_x,
            vel_y,
            radius: BALL_RADIUS,
        }
    }
}

/// What happened during one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickEvents {
    pub wall_hit: bool,
    pub paddle_hit: Option<Side>,
    /// Side that scored, if the ball crossed a goal line
    pub goal: Option<Side>,
}

/// Physics system for advancing the ball
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Advance the ball by one tick against the given paddle offsets.
    ///
    /// `last_hit` credits the paddle that last returned the ball; a paddle is
    /// never credited twice in a row, so a ball lingering inside a paddle
    /// bounces exactly once.
    pub fn step(
        ball: &mut Ball,
        player1_y: f32,
        player2_y: f32,
        last_hit: &mut Option<Side>,
    ) -> TickEvents {
        let mut events = TickEvents::default();

        ball.x += ball.vel_x;
        ball.y += ball.vel_y;

        // Top/bottom walls
        if ball.y - ball.radius < 0.0 || ball.y + ball.radius > AREA_HEIGHT {
            ball.vel_y = -ball.vel_y;
            ball.y = ball.y.clamp(ball.radius, AREA_HEIGHT - ball.radius);
            events.wall_hit = true;
        }

        for side in [Side::Player1, Side::Player2] {
            let paddle_y = match side {
                Side::Player1 => player1_y,
                Side::Player2 => player2_y,
            };

            if *last_hit != Some(side) && Self::touches_paddle(ball, side, paddle_y) {
                Self::bounce_off_paddle(ball, side, paddle_y);
                *last_hit = Some(side);
                events.paddle_hit = Some(side);
            }
        }

        if ball.x - ball.radius < 0.0 {
            events.goal = Some(Side::Player2);
        } else if ball.x + ball.radius > AREA_WIDTH {
            events.goal = Some(Side::Player1);
        }

        events
    }

    /// Clamp a requested paddle offset into the playfield
    pub fn clamp_paddle(y: f32) -> f32 {
        y.clamp(0.0, PADDLE_MAX_Y)
    }

    /// Ball is heading toward `side`, inside its horizontal band and
    /// overlapping the paddle span
    fn touches_paddle(ball: &Ball, side: Side, paddle_y: f32) -> bool {
        let (left, right, approaching) = match side {
            Side::Player1 => (PADDLE_MARGIN, PADDLE_MARGIN + PADDLE_WIDTH, ball.vel_x < 0.0),
            Side::Player2 => (
                AREA_WIDTH - PADDLE_MARGIN - PADDLE_WIDTH,
                AREA_WIDTH - PADDLE_MARGIN,
                ball.vel_x > 0.0,
            ),
        };

        let in_band = ball.x - ball.radius < right && ball.x + ball.radius > left;

        let overlaps = ball.y + ball.radius > paddle_y
            && ball.y - ball.radius < paddle_y + PADDLE_HEIGHT;

        approaching && in_band && overlaps
    }

    fn bounce_off_paddle(ball: &mut Ball, side: Side, paddle_y: f32) {
        ball.vel_x = -ball.vel_x;
        let speed_x = ball.vel_x.abs();
        if speed_x < MAX_BALL_SPEED_X {
            let boosted = (speed_x + BALL_SPEED_INCREMENT).min(MAX_BALL_SPEED_X);
            ball.vel_x = boosted.copysign(ball.vel_x);
        }

        let offset = ball.y - (paddle_y + PADDLE_HEIGHT / 2.0);
        ball.vel_y = (offset * DEFLECTION_FACTOR).clamp(-MAX_BALL_SPEED_Y, MAX_BALL_SPEED_Y);

        // Snap outside the paddle face so the ball can't tunnel through
        ball.x = match side {
            Side::Player1 => PADDLE_MARGIN + PADDLE_WIDTH + ball.radius,
            Side::Player2 => AREA_WIDTH - PADDLE_MARGIN - PADDLE_WIDTH - ball.radius,
        };
    }
}
