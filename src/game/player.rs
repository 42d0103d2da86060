//! Live player records, one per connected participant (plus bots)

use std::collections::HashMap;

use uuid::Uuid;

use crate::ws::protocol::PlayerInfo;

/// A participant in the session layer, keyed by connection id.
///
/// Bots get a synthetic id that never corresponds to a connection; they
/// exist only while their room does.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: Uuid,
    pub username: String,
    /// Room the player currently belongs to, if any
    pub room_id: Option<String>,
    pub wpm: f32,
    /// Canonical progress scale is [0, 1]; values are clamped on write
    pub progress: f32,
    pub is_finished: bool,
    pub is_bot: bool,
}

impl Player {
    pub fn new(id: Uuid, username: String) -> Self {
        Self {
            id,
            username,
            room_id: None,
            wpm: 0.0,
            progress: 0.0,
            is_finished: false,
            is_bot: false,
        }
    }

    pub fn new_bot(id: Uuid, username: String, room_id: String) -> Self {
        Self {
            id,
            username,
            room_id: Some(room_id),
            wpm: 0.0,
            progress: 0.0,
            is_finished: false,
            is_bot: true,
        }
    }

    /// Reset race-scoped fields when entering a new room.
    pub fn reset_for_race(&mut self, room_id: String) {
        self.room_id = Some(room_id);
        self.wpm = 0.0;
        self.progress = 0.0;
        self.is_finished = false;
    }

    /// Apply a progress report. Returns true exactly once, on the report
    /// that first crosses the finish line.
    pub fn apply_progress(&mut self, wpm: f32, progress: f32) -> bool {
        self.wpm = wpm.max(0.0);
        self.progress = progress.clamp(0.0, 1.0);

        if self.progress >= 1.0 && !self.is_finished {
            self.is_finished = true;
            return true;
        }
        false
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id,
            username: self.username.clone(),
            wpm: self.wpm,
            progress: self.progress,
            is_finished: self.is_finished,
        }
    }
}

/// Lookup table for all live player records.
///
/// Mutated only from the game event loop, so it needs no locking. On
/// disconnect the registry entry is removed last, after the room and
/// queue are cleaned up, so in-flight timer commands never observe a
/// half-dismantled player.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: HashMap<Uuid, Player>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, player: Player) {
        self.players.insert(player.id, player);
    }

    pub fn get(&self, id: &Uuid) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<Player> {
        self.players.remove(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.players.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_progress_clamps_and_reports_finish_once() {
        let mut player = Player::new(Uuid::new_v4(), "alice".to_string());

        assert!(!player.apply_progress(50.0, 0.5));
        assert_eq!(player.progress, 0.5);

        // First crossing reports the finish.
        assert!(player.apply_progress(55.0, 1.3));
        assert_eq!(player.progress, 1.0);
        assert!(player.is_finished);

        // Repeated reports at or above the threshold do not re-fire.
        assert!(!player.apply_progress(55.0, 1.0));
        assert!(!player.apply_progress(60.0, 2.0));
    }

    #[test]
    fn negative_wpm_is_floored() {
        let mut player = Player::new(Uuid::new_v4(), "alice".to_string());
        player.apply_progress(-10.0, 0.2);
        assert_eq!(player.wpm, 0.0);
    }

    #[test]
    fn reset_for_race_clears_race_state() {
        let mut player = Player::new(Uuid::new_v4(), "alice".to_string());
        player.apply_progress(80.0, 1.0);

        player.reset_for_race("ROOM01".to_string());

        assert_eq!(player.room_id.as_deref(), Some("ROOM01"));
        assert_eq!(player.progress, 0.0);
        assert!(!player.is_finished);
    }
}
