//! Room store and session index for the match engine
//!
//! This module owns every live room aggregate and the bookkeeping around it:
//! - Lazy room creation on the first join for an unseen room id
//! - Side assignment and capacity enforcement (two players, one per side)
//! - The connection-to-room session index for O(1) disconnect handling
//! - Transient per-side readiness flags, kept outside the room aggregate
//!   so they never survive a departure or reconnect
//!
//! All mutation flows through the engine's single event loop; the manager
//! itself is plain owned state with no interior locking.

use log::info;
use shared::{ConnectionId, GeometryProfile, Player, RoomId, Side};
use std::collections::{HashMap, HashSet};

use crate::error::RoomError;
use crate::room::Room;

/// Outcome of removing a connection from its room, for the protocol
/// handler to translate into notifications.
#[derive(Debug)]
pub struct Departure {
    pub room_id: RoomId,
    /// The player entry that was removed.
    pub player: Player,
    /// True if the departing player held the left side (the room owner).
    pub was_owner: bool,
    /// True if the room's player count reached zero and the room was
    /// deleted from the store.
    pub room_deleted: bool,
}

/// Owns all live rooms, keyed by room id, plus the session index mapping
/// each connection to the room it currently occupies.
///
/// The session index is derived data: it is rebuilt entry-by-entry from
/// join/leave traffic and is only ever read for lookup, never traversed
/// for mutation.
pub struct RoomManager {
    rooms: HashMap<RoomId, Room>,
    sessions: HashMap<ConnectionId, RoomId>,
    ready: HashMap<RoomId, HashSet<Side>>,
    win_score: u32,
}

impl RoomManager {
    pub fn new(win_score: u32) -> Self {
        Self {
            rooms: HashMap::new(),
            sessions: HashMap::new(),
            ready: HashMap::new(),
            win_score,
        }
    }

    /// Admits a connection into a room, creating the room with the default
    /// geometry if this is the first join for the id.
    ///
    /// Returns the assigned side, or `RoomFull` with no state change when
    /// two players are already present. On success the session index gains
    /// the connection's back-reference.
    pub fn join(&mut self, room_id: &str, conn: ConnectionId) -> Result<Side, RoomError> {
        let win_score = self.win_score;
        let room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(room_id.to_string(), GeometryProfile::default(), win_score));

        let side = room.join(conn)?;
        self.sessions.insert(conn, room_id.to_string());

        info!("Connection {} joined room {} as {:?}", conn, room_id, side);
        Ok(side)
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    pub fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Full-room check for join gating and status replies. An absent room
    /// counts as not full.
    pub fn is_full(&self, room_id: &str) -> bool {
        self.rooms.get(room_id).map(Room::is_full).unwrap_or(false)
    }

    /// Session lookup: the room this connection currently occupies.
    pub fn room_id_of(&self, conn: ConnectionId) -> Option<&RoomId> {
        self.sessions.get(&conn)
    }

    /// Records a side's readiness flag. The flag lives beside the room, not
    /// on it, and is consumed by a successful start or any departure.
    pub fn mark_ready(&mut self, room_id: &str, side: Side) -> Result<(), RoomError> {
        if !self.rooms.contains_key(room_id) {
            return Err(RoomError::RoomNotFound(room_id.to_string()));
        }
        self.ready.entry(room_id.to_string()).or_default().insert(side);
        Ok(())
    }

    pub fn is_ready(&self, room_id: &str, side: Side) -> bool {
        self.ready
            .get(room_id)
            .map(|sides| sides.contains(&side))
            .unwrap_or(false)
    }

    pub fn clear_ready(&mut self, room_id: &str) {
        self.ready.remove(room_id);
    }

    /// Removes a connection from the room its session entry points at.
    ///
    /// The room's ticker is cancelled before anything else mutates, the
    /// player entry is dropped, readiness flags are discarded, and either
    /// the survivor is re-assigned to left or the now-empty room is deleted.
    /// The session entry is always removed. Returns `None` for connections
    /// that occupy no room.
    pub fn remove_connection(&mut self, conn: ConnectionId) -> Option<Departure> {
        let room_id = self.sessions.remove(&conn)?;

        let (player, room_deleted) = {
            let room = self.rooms.get_mut(&room_id)?;
            room.stop_ticker();

            let player = room.remove(conn)?;
            room.reassign_survivor();
            (player, room.player_count() == 0)
        };

        self.ready.remove(&room_id);

        if room_deleted {
            self.rooms.remove(&room_id);
            info!("Room {} deleted (last player left)", room_id);
        }

        let was_owner = player.side == Side::Left;
        info!("Connection {} left room {}", conn, room_id);

        Some(Departure {
            room_id,
            player,
            was_owner,
            room_deleted,
        })
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::WIN_SCORE;

    fn manager() -> RoomManager {
        RoomManager::new(WIN_SCORE)
    }

    #[test]
    fn test_join_creates_room_lazily() {
        let mut manager = manager();
        assert!(!manager.room_exists("r1"));

        let side = manager.join("r1", 1).unwrap();

        assert_eq!(side, Side::Left);
        assert!(manager.room_exists("r1"));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.room_id_of(1), Some(&"r1".to_string()));
    }

    #[test]
    fn test_join_full_room_rejected_without_session_entry() {
        let mut manager = manager();
        manager.join("r1", 1).unwrap();
        manager.join("r1", 2).unwrap();

        let result = manager.join("r1", 3);

        assert_eq!(result, Err(RoomError::RoomFull("r1".to_string())));
        assert_eq!(manager.room("r1").unwrap().player_count(), 2);
        assert_eq!(manager.room_id_of(3), None);
    }

    #[test]
    fn test_rooms_are_independent() {
        let mut manager = manager();
        manager.join("r1", 1).unwrap();
        manager.join("r2", 2).unwrap();

        let mobile = GeometryProfile::for_device(shared::DeviceClass::Mobile);
        manager.room_mut("r1").unwrap().set_geometry(mobile);

        assert_eq!(manager.room("r1").unwrap().geometry, mobile);
        assert_eq!(
            manager.room("r2").unwrap().geometry,
            GeometryProfile::default()
        );
    }

    #[test]
    fn test_is_full_for_absent_room() {
        let manager = manager();
        assert!(!manager.is_full("nowhere"));
    }

    #[test]
    fn test_ready_flags_require_room() {
        let mut manager = manager();

        let result = manager.mark_ready("r1", Side::Left);
        assert_eq!(result, Err(RoomError::RoomNotFound("r1".to_string())));

        manager.join("r1", 1).unwrap();
        manager.mark_ready("r1", Side::Left).unwrap();
        assert!(manager.is_ready("r1", Side::Left));
        assert!(!manager.is_ready("r1", Side::Right));
    }

    #[test]
    fn test_departure_clears_ready_flags() {
        let mut manager = manager();
        manager.join("r1", 1).unwrap();
        manager.join("r1", 2).unwrap();
        manager.mark_ready("r1", Side::Left).unwrap();
        manager.mark_ready("r1", Side::Right).unwrap();

        manager.remove_connection(2);

        assert!(!manager.is_ready("r1", Side::Left));
        assert!(!manager.is_ready("r1", Side::Right));
    }

    #[test]
    fn test_remove_connection_reassigns_survivor() {
        let mut manager = manager();
        manager.join("r1", 1).unwrap();
        manager.join("r1", 2).unwrap();

        let departure = manager.remove_connection(1).unwrap();

        assert!(departure.was_owner);
        assert!(!departure.room_deleted);
        assert_eq!(departure.player.id, 1);
        assert_eq!(
            manager.room("r1").unwrap().side_of(2),
            Some(Side::Left)
        );
        assert_eq!(manager.room_id_of(1), None);
    }

    #[test]
    fn test_remove_last_connection_deletes_room() {
        let mut manager = manager();
        manager.join("r1", 1).unwrap();

        let departure = manager.remove_connection(1).unwrap();

        assert!(departure.room_deleted);
        assert!(!manager.room_exists("r1"));
        assert!(manager.is_empty());
        assert_eq!(manager.room_id_of(1), None);
    }

    #[test]
    fn test_remove_unknown_connection_is_noop() {
        let mut manager = manager();
        manager.join("r1", 1).unwrap();

        assert!(manager.remove_connection(99).is_none());
        assert_eq!(manager.room("r1").unwrap().player_count(), 1);
    }

    #[test]
    fn test_player_cap_holds_across_churn() {
        let mut manager = manager();

        for round in 0u32..5 {
            let a = round * 10 + 1;
            let b = round * 10 + 2;
            let c = round * 10 + 3;

            manager.join("r1", a).unwrap();
            manager.join("r1", b).unwrap();
            assert!(manager.join("r1", c).is_err());
            assert!(manager.room("r1").unwrap().player_count() <= 2);

            manager.remove_connection(a);
            manager.remove_connection(b);
        }

        assert!(!manager.room_exists("r1"));
    }
}
