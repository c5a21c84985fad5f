//! Protocol handler and match loop scheduling for the engine
//!
//! Every room is mutated by exactly one logical thread of control: all
//! inbound traffic — transport lifecycle, client events, and the tick
//! commands emitted by per-room interval tasks — is funneled through a
//! single mpsc command stream and processed sequentially by the engine
//! task. Broadcasting happens after mutation completes, through the
//! unbounded sender each connection registers at connect time.

use log::{debug, info, warn};
use shared::{
    ClientEvent, ConnectionId, GeometryProfile, MatchResult, RoomId, ServerEvent, Side, UserId,
};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::error::RoomError;
use crate::room::GameOver;
use crate::room_manager::RoomManager;

/// Commands serialized through the engine's event loop.
#[derive(Debug)]
pub enum Command {
    /// Transport-level registration of an identified connection.
    Connect {
        conn: ConnectionId,
        user_id: UserId,
        sender: mpsc::UnboundedSender<ServerEvent>,
    },
    /// Transport-level teardown; also removes the player from its room.
    Disconnect { conn: ConnectionId },
    /// A client-originated event, scoped to a room id in its payload.
    Client { conn: ConnectionId, event: ClientEvent },
    /// One loop step for a room, stamped with the ticker generation that
    /// produced it so cancelled tickers cannot mutate anything.
    Tick { room_id: RoomId, epoch: u64 },
    Shutdown,
}

/// Cheaply cloneable entry point for transports feeding the engine.
#[derive(Clone)]
pub struct MatchServerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl MatchServerHandle {
    pub fn connect(
        &self,
        conn: ConnectionId,
        user_id: UserId,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) {
        self.send(Command::Connect {
            conn,
            user_id,
            sender,
        });
    }

    pub fn disconnect(&self, conn: ConnectionId) {
        self.send(Command::Disconnect { conn });
    }

    pub fn submit(&self, conn: ConnectionId, event: ClientEvent) {
        self.send(Command::Client { conn, event });
    }

    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    fn send(&self, cmd: Command) {
        if self.cmd_tx.send(cmd).is_err() {
            debug!("Engine loop is gone; dropping command");
        }
    }
}

struct Connection {
    user_id: UserId,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

/// The match engine: room store, session index, connection registry, and
/// the per-room tickers driving the simulation.
pub struct MatchServer {
    rooms: RoomManager,
    connections: HashMap<ConnectionId, Connection>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    results_tx: mpsc::UnboundedSender<MatchResult>,
    tick_rate: u32,
}

impl MatchServer {
    /// Builds the engine along with the transport handle and the receiving
    /// end of the fire-and-forget match result channel consumed by the
    /// persistence collaborator.
    pub fn new(
        tick_rate: u32,
        win_score: u32,
    ) -> (
        Self,
        MatchServerHandle,
        mpsc::UnboundedReceiver<MatchResult>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        let handle = MatchServerHandle {
            cmd_tx: cmd_tx.clone(),
        };

        let server = Self {
            rooms: RoomManager::new(win_score),
            connections: HashMap::new(),
            cmd_tx,
            cmd_rx,
            results_tx,
            tick_rate,
        };

        (server, handle, results_rx)
    }

    /// Runs the event loop until shutdown. Consumes the engine: all state
    /// lives and dies with this task.
    pub async fn run(mut self) {
        info!("Match engine running at {} Hz", self.tick_rate);

        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Command::Shutdown => break,
                cmd => self.handle_command(cmd),
            }
        }

        info!("Match engine stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect {
                conn,
                user_id,
                sender,
            } => {
                info!("Connection {} registered for user {}", conn, user_id);
                self.connections.insert(conn, Connection { user_id, sender });
            }
            Command::Disconnect { conn } => self.handle_disconnect(conn),
            Command::Client { conn, event } => self.handle_client_event(conn, event),
            Command::Tick { room_id, epoch } => self.handle_tick(&room_id, epoch),
            Command::Shutdown => {}
        }
    }

    /// Validates one client event against current room/session state and
    /// applies it. Rejections are protocol outcomes, not failures: they are
    /// logged and answered where the protocol defines an answer.
    fn handle_client_event(&mut self, conn: ConnectionId, event: ClientEvent) {
        let result = match event {
            ClientEvent::CheckRoomFull { room_id } => {
                self.handle_check_room_full(conn, &room_id);
                Ok(())
            }
            ClientEvent::NegotiateViewport { room_id, device } => {
                self.handle_negotiate_viewport(&room_id, device)
            }
            ClientEvent::Join { room_id } => self.handle_join(conn, &room_id),
            ClientEvent::Move { room_id, pointer_y } => {
                self.handle_move(conn, &room_id, pointer_y)
            }
            ClientEvent::Ready { room_id, side } => self.handle_ready(conn, &room_id, side),
            ClientEvent::Start { room_id } => self.handle_start(&room_id),
            ClientEvent::Reset { room_id } => self.handle_reset(&room_id),
        };

        if let Err(err) = result {
            debug!("Rejected event from connection {}: {}", conn, err);
        }
    }

    fn handle_check_room_full(&self, conn: ConnectionId, room_id: &str) {
        let is_full = self.rooms.is_full(room_id);
        self.send_to(
            conn,
            ServerEvent::RoomFullStatus {
                room_id: room_id.to_string(),
                is_full,
            },
        );
    }

    fn handle_join(&mut self, conn: ConnectionId, room_id: &str) -> Result<(), RoomError> {
        match self.rooms.join(room_id, conn) {
            Ok(_side) => {
                self.broadcast_room_state(room_id);
                Ok(())
            }
            Err(err @ RoomError::RoomFull(_)) => {
                // Explicit rejection so the client can navigate away
                self.send_to(
                    conn,
                    ServerEvent::RoomFullStatus {
                        room_id: room_id.to_string(),
                        is_full: true,
                    },
                );
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    fn handle_negotiate_viewport(
        &mut self,
        room_id: &str,
        device: shared::DeviceClass,
    ) -> Result<(), RoomError> {
        let profile = GeometryProfile::for_device(device);

        let room = self
            .rooms
            .room_mut(room_id)
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))?;
        room.set_geometry(profile);

        self.broadcast(room_id, ServerEvent::ViewportProfile { profile });
        self.broadcast_room_state(room_id);
        Ok(())
    }

    fn handle_move(
        &mut self,
        conn: ConnectionId,
        room_id: &str,
        pointer_y: f32,
    ) -> Result<(), RoomError> {
        let room = self
            .rooms
            .room_mut(room_id)
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))?;
        // Moves surface to clients on the next tick broadcast
        room.move_paddle(conn, pointer_y)
    }

    fn handle_ready(
        &mut self,
        conn: ConnectionId,
        room_id: &str,
        side: Side,
    ) -> Result<(), RoomError> {
        let room = self
            .rooms
            .room(room_id)
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))?;
        if room.side_of(conn).is_none() {
            return Err(RoomError::UnauthorizedMutation(room_id.to_string()));
        }

        self.rooms.mark_ready(room_id, side)?;
        self.broadcast(room_id, ServerEvent::SideReady { side });
        Ok(())
    }

    /// Begins the match loop for a room. Idempotent: a second start while
    /// the loop runs is rejected as `AlreadyRunning` and broadcasts nothing.
    fn handle_start(&mut self, room_id: &str) -> Result<(), RoomError> {
        if self.cmd_tx.is_closed() {
            return Err(RoomError::SchedulerUnavailable);
        }

        let cmd_tx = self.cmd_tx.clone();
        let period = Duration::from_secs_f64(1.0 / self.tick_rate as f64);

        let room = self
            .rooms
            .room_mut(room_id)
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))?;

        if room.loop_running() {
            return Err(RoomError::AlreadyRunning(room_id.to_string()));
        }
        if room.player_count() != 2 {
            debug!(
                "Ignoring start for room {}: {} player(s) present",
                room_id,
                room.player_count()
            );
            return Ok(());
        }

        let id = room.id.clone();
        let epoch = room.epoch();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; swallow it so the
            // cadence starts one full period after the match begins.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let tick = Command::Tick {
                    room_id: id.clone(),
                    epoch,
                };
                if cmd_tx.send(tick).is_err() {
                    break;
                }
            }
        });
        room.attach_ticker(handle);

        // Readiness flags are consumed by the start
        self.rooms.clear_ready(room_id);

        self.broadcast(room_id, ServerEvent::MatchStarted);
        info!("Match started in room {}", room_id);
        Ok(())
    }

    /// Stops the loop if running, then re-serves the ball from center with
    /// a fresh random direction. Used for rally resets and for clearing the
    /// table after a game over.
    fn handle_reset(&mut self, room_id: &str) -> Result<(), RoomError> {
        let room = self
            .rooms
            .room_mut(room_id)
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))?;

        room.stop_ticker();
        room.serve();

        self.broadcast_room_state(room_id);
        Ok(())
    }

    /// One simulation step for a room. Ticks carrying a stale epoch were
    /// queued by a ticker that has since been cancelled; they are discarded
    /// without touching the room.
    fn handle_tick(&mut self, room_id: &str, epoch: u64) {
        let Some(room) = self.rooms.room_mut(room_id) else {
            debug!("Dropping tick for vanished room {}", room_id);
            return;
        };
        if !room.loop_running() || room.epoch() != epoch {
            debug!("Dropping stale tick for room {}", room_id);
            return;
        }

        let report = room.tick();
        let players = room.player_list();
        let ball = room.ball;
        let scores = room.scores;

        let finished = report.game_over.map(|game_over| {
            room.stop_ticker();
            let conn_of = |side: Side| {
                room.players
                    .values()
                    .find(|p| p.side == side)
                    .map(|p| p.id)
            };
            (game_over, conn_of(Side::Left), conn_of(Side::Right))
        });

        self.broadcast(room_id, ServerEvent::RoomState { players, ball });
        if report.scored.is_some() {
            self.broadcast(room_id, ServerEvent::ScoreUpdate { scores });
        }

        if let Some((game_over, left, right)) = finished {
            info!(
                "Game over in room {}: {:?} wins {}-{}",
                room_id,
                game_over.winner,
                game_over.final_scores.left,
                game_over.final_scores.right
            );
            self.broadcast(
                room_id,
                ServerEvent::MatchOver {
                    winner: game_over.winner,
                },
            );
            self.push_result(game_over, left, right);
        }
    }

    fn handle_disconnect(&mut self, conn: ConnectionId) {
        if let Some(departure) = self.rooms.remove_connection(conn) {
            if !departure.room_deleted {
                if departure.was_owner {
                    self.broadcast(&departure.room_id, ServerEvent::OpponentLeft);
                }
                self.broadcast_room_state(&departure.room_id);
                self.broadcast(&departure.room_id, ServerEvent::PlayerRemoved { id: conn });
            }
        }

        self.connections.remove(&conn);
        info!("Connection {} closed", conn);
    }

    /// Hands the final result to the persistence collaborator. Never
    /// awaited and never retried; a missing consumer only logs.
    fn push_result(
        &self,
        game_over: GameOver,
        left: Option<ConnectionId>,
        right: Option<ConnectionId>,
    ) {
        let user_of = |conn: Option<ConnectionId>| {
            conn.and_then(|c| self.connections.get(&c))
                .map(|c| c.user_id.clone())
                .unwrap_or_default()
        };

        let result = MatchResult {
            user_left: user_of(left),
            user_right: user_of(right),
            score_left: game_over.final_scores.left,
            score_right: game_over.final_scores.right,
            winner: game_over.winner,
        };

        if self.results_tx.send(result).is_err() {
            warn!("No consumer for match results; dropping");
        }
    }

    fn broadcast_room_state(&self, room_id: &str) {
        let Some(room) = self.rooms.room(room_id) else {
            return;
        };
        let event = ServerEvent::RoomState {
            players: room.player_list(),
            ball: room.ball,
        };
        self.broadcast(room_id, event);
    }

    fn broadcast(&self, room_id: &str, event: ServerEvent) {
        let Some(room) = self.rooms.room(room_id) else {
            return;
        };
        for conn in room.players.keys() {
            self.send_to(*conn, event.clone());
        }
    }

    fn send_to(&self, conn: ConnectionId, event: ServerEvent) {
        if let Some(connection) = self.connections.get(&conn) {
            if connection.sender.send(event).is_err() {
                debug!("Dropping event for closed connection {}", conn);
            }
        }
    }
}
