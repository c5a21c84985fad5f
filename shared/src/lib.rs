use serde::{Deserialize, Serialize};

pub const TICK_RATE: u32 = 60;
pub const WIN_SCORE: u32 = 7;
pub const BALL_SPEED: f32 = 5.0;
pub const PADDLE_WIDTH: f32 = 10.0;
pub const PADDLE_SPEED: f32 = 10.0;
pub const PADDLE_MARGIN: f32 = 50.0;

pub type ConnectionId = u32;
pub type RoomId = String;
pub type UserId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    Desktop,
    Tablet,
    Mobile,
}

/// Viewport dimensions for one device class. Immutable once looked up;
/// every room carries its own copy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryProfile {
    pub width: f32,
    pub height: f32,
    pub paddle_length: f32,
}

impl GeometryProfile {
    pub fn for_device(device: DeviceClass) -> GeometryProfile {
        match device {
            DeviceClass::Desktop => GeometryProfile {
                width: 800.0,
                height: 600.0,
                paddle_length: 100.0,
            },
            DeviceClass::Tablet => GeometryProfile {
                width: 640.0,
                height: 480.0,
                paddle_length: 100.0,
            },
            DeviceClass::Mobile => GeometryProfile {
                width: 480.0,
                height: 240.0,
                paddle_length: 50.0,
            },
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.width / 2.0, self.height / 2.0)
    }
}

impl Default for GeometryProfile {
    fn default() -> Self {
        GeometryProfile::for_device(DeviceClass::Desktop)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: ConnectionId,
    pub side: Side,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub speed: f32,
}

impl Player {
    /// Places a fresh paddle for `side` against the given viewport.
    pub fn new(id: ConnectionId, side: Side, geometry: &GeometryProfile) -> Self {
        let x = match side {
            Side::Left => PADDLE_MARGIN,
            Side::Right => geometry.width - PADDLE_MARGIN,
        };

        Self {
            id,
            side,
            x,
            y: (geometry.height - geometry.paddle_length) / 2.0,
            width: PADDLE_WIDTH,
            height: geometry.paddle_length,
            speed: PADDLE_SPEED,
        }
    }

    /// True if the point lies within the paddle rectangle (edges inclusive).
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
}

impl Ball {
    /// A ball at the viewport center with the default serve velocity.
    pub fn centered(geometry: &GeometryProfile) -> Self {
        let (x, y) = geometry.center();
        Self {
            x,
            y,
            dx: BALL_SPEED,
            dy: BALL_SPEED,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub left: u32,
    pub right: u32,
}

impl Scores {
    pub fn get(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    pub fn add_point(&mut self, side: Side) {
        match side {
            Side::Left => self.left += 1,
            Side::Right => self.right += 1,
        }
    }

    /// The side with the strictly higher score.
    pub fn leader(&self) -> Side {
        if self.left > self.right {
            Side::Left
        } else {
            Side::Right
        }
    }
}

/// Events a connection sends to the server, each scoped to a room id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientEvent {
    CheckRoomFull { room_id: RoomId },
    NegotiateViewport { room_id: RoomId, device: DeviceClass },
    Join { room_id: RoomId },
    Move { room_id: RoomId, pointer_y: f32 },
    Ready { room_id: RoomId, side: Side },
    Start { room_id: RoomId },
    Reset { room_id: RoomId },
}

/// Events the server pushes to room members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
    RoomFullStatus { room_id: RoomId, is_full: bool },
    ViewportProfile { profile: GeometryProfile },
    RoomState { players: Vec<Player>, ball: Ball },
    ScoreUpdate { scores: Scores },
    MatchStarted,
    MatchOver { winner: Side },
    SideReady { side: Side },
    OpponentLeft,
    PlayerRemoved { id: ConnectionId },
}

/// Final result handed to the persistence collaborator on game over.
/// Scores are captured before the counters are zeroed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub user_left: UserId,
    pub user_right: UserId,
    pub score_left: u32,
    pub score_right: u32,
    pub winner: Side,
}
