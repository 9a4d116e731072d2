//! Spawn point allocation

/// A fixed spawn location on the map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPoint {
    pub x: f32,
    pub y: f32,
}

/// The two ends of the playable area, at ground level
pub const SPAWN_POINTS: [SpawnPoint; 2] = [
    SpawnPoint { x: 200.0, y: 686.0 },
    SpawnPoint { x: 3000.0, y: 686.0 },
];

/// Deterministic spawn point assignment.
///
/// Joins alternate by player count so two players start at opposite ends;
/// respawns rotate away from the point the player died holding.
pub struct SpawnAllocator;

impl SpawnAllocator {
    /// Index for a newly connected player, given the session count before
    /// the new session is inserted
    pub fn initial_index(existing_sessions: usize) -> usize {
        existing_sessions % SPAWN_POINTS.len()
    }

    /// Index for a respawn, rotated off the previous assignment
    pub fn next_index(previous: usize) -> usize {
        (previous + 1) % SPAWN_POINTS.len()
    }

    /// Resolve an index to coordinates
    pub fn point(index: usize) -> SpawnPoint {
        SPAWN_POINTS[index % SPAWN_POINTS.len()]
    }
}
