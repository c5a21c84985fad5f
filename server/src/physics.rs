use shared::{Ball, GeometryProfile, Player, Side, BALL_SPEED};

/// Advances the ball by one tick and resolves collisions against the
/// viewport walls and the paddle rectangles. Returns the side that scored,
/// if the ball left the viewport horizontally.
pub fn step<'a, I>(players: I, ball: &mut Ball, geometry: &GeometryProfile) -> Option<Side>
where
    I: IntoIterator<Item = &'a Player>,
{
    ball.x += ball.dx;
    ball.y += ball.dy;

    // Boundary bounce (top and bottom)
    if ball.y <= 0.0 || ball.y >= geometry.height {
        ball.dy = -ball.dy;
    }

    // Paddle rectangle tests are independent; simultaneous hits each
    // negate the horizontal velocity.
    for player in players {
        if player.contains(ball.x, ball.y) {
            ball.dx = -ball.dx;
        }
    }

    if ball.x <= 0.0 {
        return Some(Side::Right);
    }
    if ball.x >= geometry.width {
        return Some(Side::Left);
    }

    None
}

/// Re-centers the ball and serves it in a fresh direction, each axis
/// flipped by an independent coin toss.
pub fn serve(ball: &mut Ball, geometry: &GeometryProfile) {
    let (x, y) = geometry.center();
    ball.x = x;
    ball.y = y;
    ball.dx = if rand::random() { BALL_SPEED } else { -BALL_SPEED };
    ball.dy = if rand::random() { BALL_SPEED } else { -BALL_SPEED };
}
