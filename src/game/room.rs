//! Race rooms and the room lifecycle state machine

use std::collections::HashMap;

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::debug;

use uuid::Uuid;

/// Characters used for room ids (uppercase base36, like the web client
/// displays them)
const ROOM_ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ROOM_ID_LEN: usize = 6;

/// Room lifecycle. Transitions only ever move forward:
/// Waiting -> Racing -> Finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    /// Accepting joins; the host may start
    Waiting,
    /// Text distributed, progress accepted, no joins
    Racing,
    /// Every member reported 100%; terminal
    Finished,
}

/// Errors surfaced to the requesting connection as `room_error`
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room not found")]
    NotFound,

    #[error("Race already in progress")]
    NotJoinable,
}

/// A single race instance
#[derive(Debug)]
pub struct Room {
    pub id: String,
    /// The member authorized to start the race. Never migrated: if the
    /// host leaves a waiting room, the id goes stale and the room can no
    /// longer be started. Known limitation, kept to match the original
    /// client's expectations.
    pub host_id: Uuid,
    /// Member ids in join order
    pub members: Vec<Uuid>,
    /// The passage to be typed
    pub text: String,
    pub status: RoomStatus,
    /// Simulator task for a bot-populated room; aborted when the room is
    /// destroyed
    pub bot_task: Option<JoinHandle<()>>,
}

impl Room {
    pub fn is_host(&self, requester: &Uuid) -> bool {
        self.host_id == *requester
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.members.contains(id)
    }

    /// Forward-only start transition; returns false if the room had
    /// already left `Waiting`.
    pub fn start(&mut self) -> bool {
        if self.status != RoomStatus::Waiting {
            return false;
        }
        self.status = RoomStatus::Racing;
        true
    }

    pub fn finish(&mut self) {
        if self.status == RoomStatus::Racing {
            self.status = RoomStatus::Finished;
        }
    }

    pub fn abort_bot_task(&mut self) {
        if let Some(task) = self.bot_task.take() {
            task.abort();
        }
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        self.abort_bot_task();
    }
}

/// Owner of all active rooms, keyed by room id
#[derive(Debug, Default)]
pub struct RoomStore {
    rooms: HashMap<String, Room>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh id, retrying on the (unlikely but nonzero)
    /// collision with an active room.
    fn generate_id(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let id: String = (0..ROOM_ID_LEN)
                .map(|_| ROOM_ID_CHARSET[rng.gen_range(0..ROOM_ID_CHARSET.len())] as char)
                .collect();
            if !self.rooms.contains_key(&id) {
                return id;
            }
            debug!(room_id = %id, "room id collision, regenerating");
        }
    }

    /// Create a room with a single member (the host).
    pub fn create(&mut self, host_id: Uuid, text: String, status: RoomStatus) -> &mut Room {
        let id = self.generate_id();
        let room = Room {
            id: id.clone(),
            host_id,
            members: vec![host_id],
            text,
            status,
            bot_task: None,
        };
        self.rooms.insert(id.clone(), room);
        self.rooms.get_mut(&id).expect("room inserted above")
    }

    /// Validate and perform a join. Only `Waiting` rooms accept members.
    pub fn join(&mut self, room_id: &str, player_id: Uuid) -> Result<&mut Room, RoomError> {
        let room = self.rooms.get_mut(room_id).ok_or(RoomError::NotFound)?;
        if room.status != RoomStatus::Waiting {
            return Err(RoomError::NotJoinable);
        }
        if !room.contains(&player_id) {
            room.members.push(player_id);
        }
        Ok(room)
    }

    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn get_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    /// Destroy a room, aborting its bot task if one is running.
    pub fn remove(&mut self, room_id: &str) -> Option<Room> {
        let mut room = self.rooms.remove(room_id)?;
        room.abort_bot_task();
        Some(room)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn racing_count(&self) -> usize {
        self.rooms
            .values()
            .filter(|r| r.status == RoomStatus::Racing)
            .count()
    }
}
