//! Combat arbitration - authoritative damage, death and respawn transitions

use uuid::Uuid;

use super::session::{PlayerState, SessionRegistry, MAX_HEALTH};
use super::spawn::SpawnAllocator;

/// Result of an accepted authoritative mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    /// Target survived; carries the new health value
    Damaged { health: u8 },
    /// Target died; `killer` is the credited attacker, if any
    Killed { killer: Option<Uuid> },
}

/// State-machine transitions for player health.
///
/// Every entry point checks the same acceptance gate: a player takes
/// damage only while `health > 0 && !respawning`. Reports that fail the
/// gate return `None` and leave the registry untouched.
pub struct CombatArbiter;

impl CombatArbiter {
    /// Apply one point of damage to `target`, attributed to `shooter`.
    ///
    /// A hit from the target itself is rejected. An absent shooter is
    /// unattributed damage: it still lands, overwrites `last_hit_by`,
    /// and credits no kill if it proves fatal.
    pub fn apply_hit(
        registry: &mut SessionRegistry,
        target: Uuid,
        shooter: Option<Uuid>,
    ) -> Option<HitOutcome> {
        if shooter == Some(target) {
            return None;
        }

        let player = registry.get_mut(&target)?;
        if !player.can_take_damage() {
            return None;
        }

        player.last_hit_by = shooter;
        player.health = player.health.saturating_sub(1);

        if player.health == 0 {
            let killer = Self::kill(registry, target);
            Some(HitOutcome::Killed { killer })
        } else {
            let health = player.health;
            Some(HitOutcome::Damaged { health })
        }
    }

    /// Self-reported death: the client's local simulation reached zero.
    /// Forces the death transition if the target is still damageable.
    pub fn confirm_death(registry: &mut SessionRegistry, target: Uuid) -> Option<HitOutcome> {
        let player = registry.get_mut(&target)?;
        if !player.can_take_damage() {
            return None;
        }

        player.health = 0;
        let killer = Self::kill(registry, target);
        Some(HitOutcome::Killed { killer })
    }

    /// One-way health ratchet for client-echoed values carried on moves.
    ///
    /// Values at or above the server's are ignored. A value of zero folds
    /// into the full death transition so `alive` never disagrees with
    /// `health` after the mutation.
    pub fn ratchet_health(
        registry: &mut SessionRegistry,
        target: Uuid,
        reported: u8,
    ) -> Option<HitOutcome> {
        let player = registry.get_mut(&target)?;
        if !player.can_take_damage() || reported >= player.health {
            return None;
        }

        player.health = reported;

        if player.health == 0 {
            let killer = Self::kill(registry, target);
            Some(HitOutcome::Killed { killer })
        } else {
            let health = player.health;
            Some(HitOutcome::Damaged { health })
        }
    }

    /// Bring a dead player back into play.
    ///
    /// Only honored from the dead-pending-respawn state; a live player or
    /// an already-completed respawn returns `None`, which is how a timer
    /// firing after a client-driven respawn becomes a no-op. A full
    /// position override skips the spawn rotation; otherwise the player
    /// comes back at the other spawn point. Attribution is not reset:
    /// `last_hit_by` changes only when a new hit lands.
    pub fn respawn(
        registry: &mut SessionRegistry,
        target: Uuid,
        position: Option<(f32, f32)>,
    ) -> Option<PlayerState> {
        let player = registry.get_mut(&target)?;
        if !player.respawning {
            return None;
        }

        match position {
            Some((x, y)) => {
                player.x = x;
                player.y = y;
            }
            None => {
                let index = SpawnAllocator::next_index(player.spawn_point_index);
                let point = SpawnAllocator::point(index);
                player.spawn_point_index = index;
                player.x = point.x;
                player.y = point.y;
            }
        }

        player.health = MAX_HEALTH;
        player.alive = true;
        player.respawning = false;

        Some(player.clone())
    }

    /// The death transition proper. Health is already zero when called;
    /// flips the state flags and credits the kill to the last attacker.
    fn kill(registry: &mut SessionRegistry, target: Uuid) -> Option<Uuid> {
        let player = registry
            .get_mut(&target)
            .filter(|p| p.health == 0)?;
        player.alive = false;
        player.respawning = true;
        let killer = player.last_hit_by;

        if let Some(killer_id) = killer {
            if killer_id != target {
                if let Some(k) = registry.get_mut(&killer_id) {
                    k.kills += 1;
                }
            }
        }

        killer
    }
}
