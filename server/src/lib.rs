//! # Pong Match Engine Library
//!
//! This library provides the authoritative match engine for the two-player
//! Pong service. It owns every live room, runs a fixed-rate simulation per
//! room, and broadcasts authoritative state to the connections in each room.
//!
//! ## Core Responsibilities
//!
//! ### Room & Session Lifecycle
//! Rooms are created lazily on the first join for an unseen room id, hold at
//! most two players (one per side, first joiner left), and are destroyed the
//! moment their player count reaches zero. A session index maps each
//! connection to the room it occupies so disconnects resolve in O(1).
//!
//! ### Authoritative Simulation
//! Each room runs its own 60 Hz match loop advancing the ball, bouncing it
//! off the viewport walls and paddle rectangles, and settling out-of-bounds
//! points. The first side to reach the winning score ends the match; final
//! scores are handed to the persistence collaborator and the counters reset.
//!
//! ### Event Protocol
//! Inbound events (join, move, ready, start, reset, viewport negotiation,
//! room-full checks, disconnects) are typed variants dispatched through
//! exhaustive matching. Rejections — unknown room, full room, mutations from
//! connections without a player — are protocol outcomes handled locally,
//! never failures that terminate the engine.
//!
//! ## Architecture Design
//!
//! ### Single-Writer Event Loop
//! All mutation flows through one mpsc command stream processed sequentially
//! by the engine task: transport lifecycle, client events, and the tick
//! commands emitted by the per-room interval tasks. A room is therefore
//! never touched by two logical threads of control at once, while distinct
//! rooms stay fully independent (each carries its own geometry profile).
//!
//! ### Cancellation-Safe Tickers
//! Every room's ticker stamps its commands with a generation counter.
//! Stopping the loop aborts the task and bumps the generation before any
//! further mutation, so a tick that was already queued can be recognized as
//! stale and discarded instead of observing a reset or deleted room.
//!
//! ## Module Organization
//!
//! - [`room_manager`]: room store, session index, and transient readiness
//! - [`room`]: the per-match aggregate and its tick orchestration
//! - [`physics`]: pure ball movement, collision, and scoring rules
//! - [`server`]: protocol handler, event loop, and loop scheduling
//! - [`error`]: the recoverable protocol error taxonomy

pub mod error;
pub mod physics;
pub mod room;
pub mod room_manager;
pub mod server;
