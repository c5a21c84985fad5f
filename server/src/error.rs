use shared::RoomId;
use thiserror::Error;

/// Protocol-level failures. Every variant is recovered at the handler
/// boundary; only `SchedulerUnavailable` is surfaced to the caller that
/// tried to start a match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("room {0} does not exist")]
    RoomNotFound(RoomId),

    #[error("room {0} already has two players")]
    RoomFull(RoomId),

    #[error("connection owns no player in room {0}")]
    UnauthorizedMutation(RoomId),

    #[error("match loop already running in room {0}")]
    AlreadyRunning(RoomId),

    #[error("match loop scheduler is unavailable")]
    SchedulerUnavailable,
}
