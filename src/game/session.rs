//! Per-connection session state and the registry that owns it

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::spawn::SpawnAllocator;

/// Health a player spawns with
pub const MAX_HEALTH: u8 = 10;

/// Authoritative per-player state.
///
/// This struct is also the wire representation: joins, moves and respawns
/// broadcast it directly, so clients always see the server's view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    pub player_id: Uuid,
    /// Last client-reported position
    pub x: f32,
    pub y: f32,
    /// Sprite facing (true = left)
    pub flip_x: bool,
    /// 0..=MAX_HEALTH; only the server lowers or resets it
    pub health: u8,
    pub alive: bool,
    /// Most recent attacker, for kill attribution. Never reset, not even
    /// on respawn; only an accepted hit overwrites it.
    pub last_hit_by: Option<Uuid>,
    /// Set between death and respawn completion
    pub respawning: bool,
    pub spawn_point_index: usize,
    pub kills: u32,
}

impl PlayerState {
    pub fn new(player_id: Uuid, spawn_point_index: usize) -> Self {
        let point = SpawnAllocator::point(spawn_point_index);
        Self {
            player_id,
            x: point.x,
            y: point.y,
            flip_x: false,
            health: MAX_HEALTH,
            alive: true,
            last_hit_by: None,
            respawning: false,
            spawn_point_index,
            kills: 0,
        }
    }

    /// Whether authoritative damage may be applied right now
    pub fn can_take_damage(&self) -> bool {
        self.health > 0 && !self.respawning
    }
}

/// Table of live sessions, owned by the relay task.
///
/// All access is single-threaded through the relay's event loop; the map
/// itself needs no locking.
#[derive(Default)]
pub struct SessionRegistry {
    players: HashMap<Uuid, PlayerState>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
        }
    }

    /// Create a session for a new connection, allocating its spawn point
    /// from the count of sessions already present.
    pub fn register(&mut self, player_id: Uuid) -> &PlayerState {
        let index = SpawnAllocator::initial_index(self.players.len());
        self.players
            .entry(player_id)
            .or_insert_with(|| PlayerState::new(player_id, index))
    }

    pub fn get(&self, player_id: &Uuid) -> Option<&PlayerState> {
        self.players.get(player_id)
    }

    pub fn get_mut(&mut self, player_id: &Uuid) -> Option<&mut PlayerState> {
        self.players.get_mut(player_id)
    }

    /// Remove a session. Returns the removed state, None if the id was
    /// already gone (disconnect is idempotent).
    pub fn remove(&mut self, player_id: &Uuid) -> Option<PlayerState> {
        self.players.remove(player_id)
    }

    pub fn contains(&self, player_id: &Uuid) -> bool {
        self.players.contains_key(player_id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Clone of the full roster, keyed by player id
    pub fn snapshot(&self) -> HashMap<Uuid, PlayerState> {
        self.players.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_player_starts_at_full_health() {
        let player = PlayerState::new(Uuid::new_v4(), 0);
        assert_eq!(player.health, MAX_HEALTH);
        assert!(player.alive);
        assert!(!player.respawning);
        assert_eq!(player.kills, 0);
        assert_eq!(player.last_hit_by, None);
    }

    #[test]
    fn register_alternates_spawn_points() {
        let mut registry = SessionRegistry::new();
        let first = registry.register(Uuid::new_v4()).spawn_point_index;
        let second = registry.register(Uuid::new_v4()).spawn_point_index;
        let third = registry.register(Uuid::new_v4()).spawn_point_index;
        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert_eq!(third, 0);
    }

    #[test]
    fn spawn_index_uses_count_before_insert() {
        let mut registry = SessionRegistry::new();
        let first = Uuid::new_v4();
        registry.register(first);
        registry.register(Uuid::new_v4());
        registry.remove(&first);
        // One player left, so the next join lands on index 1
        let joined = registry.register(Uuid::new_v4()).spawn_point_index;
        assert_eq!(joined, 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        registry.register(id);
        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn register_twice_keeps_existing_state() {
        let mut registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        registry.register(id);
        registry.get_mut(&id).unwrap().kills = 3;
        let state = registry.register(id);
        assert_eq!(state.kills, 3);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn player_state_wire_shape() {
        let id = Uuid::new_v4();
        let player = PlayerState::new(id, 1);
        let json = serde_json::to_value(&player).unwrap();
        assert_eq!(json["player_id"], serde_json::json!(id.to_string()));
        assert_eq!(json["x"], serde_json::json!(3000.0));
        assert_eq!(json["y"], serde_json::json!(686.0));
        assert_eq!(json["health"], serde_json::json!(10));
        assert_eq!(json["alive"], serde_json::json!(true));
    }
}
