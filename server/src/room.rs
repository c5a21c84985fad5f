use log::debug;
use shared::{Ball, ConnectionId, GeometryProfile, Player, RoomId, Scores, Side};
use std::collections::HashMap;
use tokio::task::JoinHandle;

use crate::error::RoomError;
use crate::physics;

/// Full state of one match: players, ball, scores, geometry, and the
/// handle of the loop ticking it. Owned exclusively by the room store and
/// only ever mutated from the engine's event loop.
#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    pub geometry: GeometryProfile,
    pub players: HashMap<ConnectionId, Player>,
    pub ball: Ball,
    pub scores: Scores,
    win_score: u32,
    ticker: Option<JoinHandle<()>>,
    epoch: u64,
}

/// What a tick changed, for the protocol handler to broadcast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub scored: Option<Side>,
    pub game_over: Option<GameOver>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameOver {
    pub winner: Side,
    /// Scores as they stood when the winning point landed, captured before
    /// the counters are zeroed.
    pub final_scores: Scores,
}

impl Room {
    pub fn new(id: RoomId, geometry: GeometryProfile, win_score: u32) -> Self {
        Self {
            id,
            geometry,
            players: HashMap::new(),
            ball: Ball::centered(&geometry),
            scores: Scores::default(),
            win_score,
            ticker: None,
            epoch: 0,
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= 2
    }

    pub fn side_of(&self, conn: ConnectionId) -> Option<Side> {
        self.players.get(&conn).map(|p| p.side)
    }

    /// Players sorted left-to-right for stable broadcasts.
    pub fn player_list(&self) -> Vec<Player> {
        let mut list: Vec<Player> = self.players.values().cloned().collect();
        list.sort_by_key(|p| p.side);
        list
    }

    /// Admits a connection, assigning the free side: the first joiner takes
    /// left, the second right. A third join is rejected without mutation,
    /// and a repeated join from a member keeps their current side.
    pub fn join(&mut self, conn: ConnectionId) -> Result<Side, RoomError> {
        if let Some(existing) = self.players.get(&conn) {
            return Ok(existing.side);
        }
        if self.is_full() {
            return Err(RoomError::RoomFull(self.id.clone()));
        }

        let side = if self.players.values().any(|p| p.side == Side::Left) {
            Side::Right
        } else {
            Side::Left
        };

        self.players
            .insert(conn, Player::new(conn, side, &self.geometry));
        Ok(side)
    }

    pub fn remove(&mut self, conn: ConnectionId) -> Option<Player> {
        self.players.remove(&conn)
    }

    /// After a departure the sole remaining player becomes the room owner:
    /// re-assigned to left with a freshly placed paddle. With at most two
    /// players this can never produce a duplicated side.
    pub fn reassign_survivor(&mut self) {
        if self.players.len() != 1 {
            return;
        }
        for player in self.players.values_mut() {
            if player.side != Side::Left {
                *player = Player::new(player.id, Side::Left, &self.geometry);
            }
        }
    }

    /// Pointer-absolute paddle movement: the paddle is centered on the
    /// pointer and clamped into the viewport.
    pub fn move_paddle(&mut self, conn: ConnectionId, pointer_y: f32) -> Result<(), RoomError> {
        let player = self
            .players
            .get_mut(&conn)
            .ok_or_else(|| RoomError::UnauthorizedMutation(self.id.clone()))?;

        player.y = (pointer_y - player.height / 2.0).clamp(0.0, self.geometry.height - player.height);
        Ok(())
    }

    /// Swaps in a new viewport profile, re-deriving paddle placement and
    /// re-centering the ball so nothing sits outside the new bounds.
    pub fn set_geometry(&mut self, geometry: GeometryProfile) {
        self.geometry = geometry;
        for player in self.players.values_mut() {
            *player = Player::new(player.id, player.side, &geometry);
        }
        let (x, y) = geometry.center();
        self.ball.x = x;
        self.ball.y = y;
    }

    pub fn serve(&mut self) {
        physics::serve(&mut self.ball, &self.geometry);
    }

    /// One simulation step. Scores are settled here: a rally point re-serves
    /// the ball, the winning point zeroes both counters and reports the
    /// winner with the pre-reset scores.
    pub fn tick(&mut self) -> TickReport {
        let scored = physics::step(self.players.values(), &mut self.ball, &self.geometry);

        let mut game_over = None;
        if let Some(side) = scored {
            self.scores.add_point(side);

            if self.scores.get(side) >= self.win_score {
                game_over = Some(GameOver {
                    winner: self.scores.leader(),
                    final_scores: self.scores,
                });
                self.scores = Scores::default();
            } else {
                self.serve();
            }
        }

        TickReport { scored, game_over }
    }

    pub fn loop_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Generation counter for tick commands. Bumped on every stop so a tick
    /// queued by a cancelled ticker can be recognized and discarded.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn attach_ticker(&mut self, handle: JoinHandle<()>) {
        debug_assert!(self.ticker.is_none());
        self.ticker = Some(handle);
    }

    /// Cancels the match loop. Must run before any further mutation of the
    /// room so no tick observes state it did not produce.
    pub fn stop_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
            self.epoch += 1;
            debug!("Stopped match loop for room {}", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{BALL_SPEED, WIN_SCORE};

    fn room() -> Room {
        Room::new("r1".to_string(), GeometryProfile::default(), WIN_SCORE)
    }

    #[test]
    fn test_join_assigns_sides_in_order() {
        let mut room = room();

        assert_eq!(room.join(1).unwrap(), Side::Left);
        assert_eq!(room.join(2).unwrap(), Side::Right);
        assert_eq!(room.side_of(1), Some(Side::Left));
        assert_eq!(room.side_of(2), Some(Side::Right));
    }

    #[test]
    fn test_third_join_rejected_without_mutation() {
        let mut room = room();
        room.join(1).unwrap();
        room.join(2).unwrap();

        let result = room.join(3);

        assert_eq!(result, Err(RoomError::RoomFull("r1".to_string())));
        assert_eq!(room.player_count(), 2);
        assert_eq!(room.side_of(3), None);
    }

    #[test]
    fn test_rejoin_keeps_current_side() {
        let mut room = room();
        room.join(1).unwrap();
        room.join(2).unwrap();

        assert_eq!(room.join(1).unwrap(), Side::Left);
        assert_eq!(room.join(2).unwrap(), Side::Right);
        assert_eq!(room.player_count(), 2);
    }

    #[test]
    fn test_join_after_departure_fills_free_side() {
        let mut room = room();
        room.join(1).unwrap();
        room.join(2).unwrap();

        room.remove(2);
        assert_eq!(room.join(3).unwrap(), Side::Right);
    }

    #[test]
    fn test_survivor_reassigned_to_left() {
        let mut room = room();
        room.join(1).unwrap();
        room.join(2).unwrap();

        room.remove(1);
        room.reassign_survivor();

        let survivor = room.players.get(&2).unwrap();
        assert_eq!(survivor.side, Side::Left);
        assert_eq!(survivor.x, shared::PADDLE_MARGIN);
    }

    #[test]
    fn test_move_paddle_clamps_to_viewport() {
        let mut room = room();
        room.join(1).unwrap();

        room.move_paddle(1, -500.0).unwrap();
        assert_eq!(room.players.get(&1).unwrap().y, 0.0);

        room.move_paddle(1, 5000.0).unwrap();
        let player = room.players.get(&1).unwrap();
        assert_eq!(player.y, room.geometry.height - player.height);

        room.move_paddle(1, 300.0).unwrap();
        let player = room.players.get(&1).unwrap();
        assert_eq!(player.y, 300.0 - player.height / 2.0);
    }

    #[test]
    fn test_move_paddle_requires_membership() {
        let mut room = room();
        room.join(1).unwrap();

        let result = room.move_paddle(99, 300.0);

        assert_eq!(
            result,
            Err(RoomError::UnauthorizedMutation("r1".to_string()))
        );
    }

    #[test]
    fn test_set_geometry_rederives_paddles_and_ball() {
        let mut room = room();
        room.join(1).unwrap();
        room.join(2).unwrap();

        let mobile = GeometryProfile::for_device(shared::DeviceClass::Mobile);
        room.set_geometry(mobile);

        assert_eq!(room.geometry, mobile);
        assert_eq!(room.ball.x, mobile.width / 2.0);
        assert_eq!(room.ball.y, mobile.height / 2.0);

        let right = room.players.get(&2).unwrap();
        assert_eq!(right.x, mobile.width - shared::PADDLE_MARGIN);
        assert_eq!(right.height, mobile.paddle_length);
    }

    #[test]
    fn test_tick_scores_single_point_and_reserves() {
        let mut room = room();
        room.ball = Ball {
            x: 3.0,
            y: 300.0,
            dx: -BALL_SPEED,
            dy: 0.0,
        };

        let report = room.tick();

        assert_eq!(report.scored, Some(Side::Right));
        assert!(report.game_over.is_none());
        assert_eq!(room.scores.right, 1);
        assert_eq!(room.scores.left, 0);
        // Ball re-served from center
        assert_eq!(room.ball.x, room.geometry.width / 2.0);
        assert_eq!(room.ball.y, room.geometry.height / 2.0);
    }

    #[test]
    fn test_tick_game_over_at_win_score() {
        let mut room = room();
        room.scores = Scores {
            left: WIN_SCORE - 1,
            right: 3,
        };
        room.ball = Ball {
            x: room.geometry.width - 3.0,
            y: 300.0,
            dx: BALL_SPEED,
            dy: 0.0,
        };

        let report = room.tick();

        let game_over = report.game_over.expect("winning point ends the game");
        assert_eq!(game_over.winner, Side::Left);
        assert_eq!(game_over.final_scores.left, WIN_SCORE);
        assert_eq!(game_over.final_scores.right, 3);
        // Counters reset immediately
        assert_eq!(room.scores, Scores::default());
    }

    #[test]
    fn test_tick_without_players_keeps_running() {
        let mut room = room();
        let before = room.ball;

        let report = room.tick();

        assert!(report.scored.is_none());
        assert_eq!(room.ball.x, before.x + before.dx);
    }

    #[test]
    fn test_epoch_bumps_on_stop_only_when_running() {
        let mut room = room();
        assert_eq!(room.epoch(), 0);

        // No ticker attached: nothing to cancel, epoch untouched
        room.stop_ticker();
        assert_eq!(room.epoch(), 0);
        assert!(!room.loop_running());
    }
}
