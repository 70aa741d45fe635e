//! The authoritative map of connected-player state.
//!
//! All mutation funnels through the tick processor; the directory itself is
//! a plain map behind one lock and never reaches out to other components.

use log::info;
use rand::Rng;
use shared::{
    PlayerColor, RosterEntry, DEFAULT_USERNAME, MAX_SPAWN_ATTEMPTS, MIN_SPAWN_DISTANCE,
    SPAWN_MARGIN, WORLD_HEIGHT, WORLD_WIDTH,
};
use std::collections::HashMap;

/// Server-side state for one connected player.
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    pub rot: f32,
    pub username: String,
    pub color: PlayerColor,
}

impl PlayerState {
    fn new(id: u32, x: i32, y: i32) -> Self {
        Self {
            id,
            x,
            y,
            rot: 0.0,
            username: DEFAULT_USERNAME.to_string(),
            color: PlayerColor::default(),
        }
    }

    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            id: self.id,
            x: self.x,
            y: self.y,
            username: self.username.clone(),
            color: self.color,
        }
    }
}

fn distance(ax: i32, ay: i32, bx: i32, by: i32) -> f32 {
    let dx = (ax - bx) as f32;
    let dy = (ay - by) as f32;
    (dx * dx + dy * dy).sqrt()
}

/// Authoritative player map. Exactly one entry per live session id.
#[derive(Default)]
pub struct PlayerDirectory {
    players: HashMap<u32, PlayerState>,
}

impl PlayerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the player for a freshly accepted session at a computed spawn
    /// position and returns its roster entry.
    pub fn spawn_player(&mut self, id: u32) -> RosterEntry {
        let (x, y) = self.spawn_position();
        let player = PlayerState::new(id, x, y);
        info!("spawning player {} at ({}, {})", id, x, y);
        let entry = player.roster_entry();
        self.players.insert(id, player);
        entry
    }

    /// Picks a spawn position at least [`MIN_SPAWN_DISTANCE`] away from every
    /// existing player, sampling up to [`MAX_SPAWN_ATTEMPTS`] candidates and
    /// degrading to the fixed map center when none qualifies.
    fn spawn_position(&self) -> (i32, i32) {
        let mut rng = rand::thread_rng();
        let sample = |rng: &mut rand::rngs::ThreadRng| {
            (
                rng.gen_range(SPAWN_MARGIN..=WORLD_WIDTH - SPAWN_MARGIN),
                rng.gen_range(SPAWN_MARGIN..=WORLD_HEIGHT - SPAWN_MARGIN),
            )
        };

        if self.players.is_empty() {
            return sample(&mut rng);
        }

        for _ in 0..MAX_SPAWN_ATTEMPTS {
            let (x, y) = sample(&mut rng);
            let too_close = self
                .players
                .values()
                .any(|p| distance(x, y, p.x, p.y) < MIN_SPAWN_DISTANCE);
            if !too_close {
                return (x, y);
            }
        }

        (WORLD_WIDTH / 2, WORLD_HEIGHT / 2)
    }

    /// Removes a player at teardown. Returns false when already gone.
    pub fn remove_player(&mut self, id: u32) -> bool {
        let removed = self.players.remove(&id).is_some();
        if removed {
            info!("removed player {}", id);
        }
        removed
    }

    /// Overwrites position and rotation. Returns false for an unknown id so
    /// the caller can drop the late update silently.
    pub fn apply_position(&mut self, id: u32, x: i32, y: i32, rot: f32) -> bool {
        match self.players.get_mut(&id) {
            Some(player) => {
                player.x = x;
                player.y = y;
                player.rot = rot;
                true
            }
            None => false,
        }
    }

    /// Overwrites the username; the caller passes already-sanitized text.
    pub fn apply_username(&mut self, id: u32, username: &str) -> bool {
        match self.players.get_mut(&id) {
            Some(player) => {
                player.username = username.to_string();
                true
            }
            None => false,
        }
    }

    pub fn apply_color(&mut self, id: u32, color: PlayerColor) -> bool {
        match self.players.get_mut(&id) {
            Some(player) => {
                player.color = color;
                true
            }
            None => false,
        }
    }

    /// Records the last-fire rotation. Firing mutates nothing else.
    pub fn apply_fire(&mut self, id: u32, rot: f32) -> bool {
        match self.players.get_mut(&id) {
            Some(player) => {
                player.rot = rot;
                true
            }
            None => false,
        }
    }

    /// Roster entries for every player except `exclude`, for the type-0
    /// snapshot sent to a new connection.
    pub fn roster_excluding(&self, exclude: u32) -> Vec<RosterEntry> {
        let mut entries: Vec<RosterEntry> = self
            .players
            .values()
            .filter(|p| p.id != exclude)
            .map(PlayerState::roster_entry)
            .collect();
        entries.sort_by_key(|e| e.id);
        entries
    }

    pub fn get(&self, id: u32) -> Option<&PlayerState> {
        self.players.get(&id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_spawn_creates_default_player() {
        let mut directory = PlayerDirectory::new();
        let entry = directory.spawn_player(0);

        assert_eq!(entry.id, 0);
        assert_eq!(entry.username, DEFAULT_USERNAME);
        assert_eq!(entry.color, PlayerColor::Red);
        assert_eq!(directory.len(), 1);

        let player = directory.get(0).unwrap();
        assert!(player.x >= SPAWN_MARGIN && player.x <= WORLD_WIDTH - SPAWN_MARGIN);
        assert!(player.y >= SPAWN_MARGIN && player.y <= WORLD_HEIGHT - SPAWN_MARGIN);
        assert_approx_eq!(player.rot, 0.0);
    }

    #[test]
    fn test_spawn_respects_min_distance_or_falls_back() {
        let mut directory = PlayerDirectory::new();
        directory.players.insert(0, PlayerState::new(0, 200, 200));
        directory.players.insert(1, PlayerState::new(1, 1800, 1800));

        for _ in 0..50 {
            let (x, y) = directory.spawn_position();
            let fallback = (x, y) == (WORLD_WIDTH / 2, WORLD_HEIGHT / 2);
            let far_enough = directory
                .players
                .values()
                .all(|p| distance(x, y, p.x, p.y) >= MIN_SPAWN_DISTANCE);
            assert!(far_enough || fallback, "spawn at ({}, {}) too close", x, y);
        }
    }

    #[test]
    fn test_spawn_falls_back_to_center_when_world_is_saturated() {
        let mut directory = PlayerDirectory::new();
        // Cover the whole spawn region with a grid tighter than the minimum
        // distance so no candidate can qualify.
        let mut id = 0;
        let mut x = SPAWN_MARGIN;
        while x <= WORLD_WIDTH - SPAWN_MARGIN {
            let mut y = SPAWN_MARGIN;
            while y <= WORLD_HEIGHT - SPAWN_MARGIN {
                directory.players.insert(id, PlayerState::new(id, x, y));
                id += 1;
                y += 100;
            }
            x += 100;
        }

        let (x, y) = directory.spawn_position();
        assert_eq!((x, y), (WORLD_WIDTH / 2, WORLD_HEIGHT / 2));
    }

    #[test]
    fn test_apply_position_unknown_id_is_dropped() {
        let mut directory = PlayerDirectory::new();
        assert!(!directory.apply_position(9, 1, 2, 3.0));

        directory.spawn_player(0);
        assert!(directory.apply_position(0, 150, 250, 90.0));
        let player = directory.get(0).unwrap();
        assert_eq!((player.x, player.y), (150, 250));
        assert_approx_eq!(player.rot, 90.0);
    }

    #[test]
    fn test_apply_username_and_color() {
        let mut directory = PlayerDirectory::new();
        directory.spawn_player(0);

        assert!(directory.apply_username(0, "alice"));
        assert!(directory.apply_color(0, PlayerColor::Purple));
        assert!(!directory.apply_username(1, "ghost"));
        assert!(!directory.apply_color(1, PlayerColor::Blue));

        let player = directory.get(0).unwrap();
        assert_eq!(player.username, "alice");
        assert_eq!(player.color, PlayerColor::Purple);
    }

    #[test]
    fn test_apply_fire_records_rotation_only() {
        let mut directory = PlayerDirectory::new();
        directory.spawn_player(0);
        let (x, y) = {
            let p = directory.get(0).unwrap();
            (p.x, p.y)
        };

        assert!(directory.apply_fire(0, 123.0));
        let player = directory.get(0).unwrap();
        assert_approx_eq!(player.rot, 123.0);
        assert_eq!((player.x, player.y), (x, y));
    }

    #[test]
    fn test_roster_excluding_omits_self_and_sorts() {
        let mut directory = PlayerDirectory::new();
        directory.players.insert(2, PlayerState::new(2, 30, 30));
        directory.players.insert(0, PlayerState::new(0, 10, 10));
        directory.players.insert(1, PlayerState::new(1, 20, 20));

        let entries = directory.roster_excluding(1);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, 0);
        assert_eq!(entries[1].id, 2);
    }

    #[test]
    fn test_remove_player_is_idempotent() {
        let mut directory = PlayerDirectory::new();
        directory.spawn_player(0);

        assert!(directory.remove_player(0));
        assert!(!directory.remove_player(0));
        assert!(directory.is_empty());
    }
}
