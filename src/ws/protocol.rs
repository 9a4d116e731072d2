//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::game::session::PlayerState;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Position/facing update, sent every frame the player moves
    Move {
        x: f32,
        y: f32,
        /// Sprite facing (true = left)
        flip_x: bool,
        /// Client-side health echo; only accepted if lower than the
        /// server's value
        health: Option<u8>,
    },

    /// Player fired a projectile
    Shoot {
        /// Muzzle position
        x: f32,
        y: f32,
        /// Horizontal velocity (sign carries direction)
        velocity_x: f32,
    },

    /// Shooter-side hit report: my bullet struck `target_id`
    HitPlayer {
        target_id: Uuid,
    },

    /// Victim-side hit report: a bullet from `shooter_id` struck me.
    /// Absent shooter means unattributed damage (no kill credit).
    BulletHitMe {
        shooter_id: Option<Uuid>,
    },

    /// Client believes it died (its local health hit zero)
    Died,

    /// Client finished its respawn animation; optional position override
    Respawned {
        x: Option<f32>,
        y: Option<f32>,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Join (or rejoin) a pre-match lobby
    JoinLobby {
        /// Free-form player identifier shown to other lobby members
        address: Option<String>,
    },

    /// Toggle ready state in the current lobby
    SetReady {
        ready: bool,
    },

    /// Explicit request to start the match (all members must be ready)
    StartGame,

    /// Leave the current lobby
    LeaveLobby,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// First message after connection; tells the client its own id
    Welcome {
        session_id: Uuid,
        server_time: u64,
    },

    /// Full roster of currently connected players, sent once on join
    Snapshot {
        players: HashMap<Uuid, PlayerState>,
    },

    /// A new player connected
    PlayerJoined {
        player: PlayerState,
    },

    /// A player moved (relayed state, not an echo)
    PlayerMoved {
        player: PlayerState,
    },

    /// A projectile entered the world
    BulletSpawned {
        shooter_id: Uuid,
        x: f32,
        y: f32,
        velocity_x: f32,
    },

    /// Authoritative health change after an accepted hit
    PlayerDamaged {
        player_id: Uuid,
        health: u8,
        shooter_id: Option<Uuid>,
    },

    /// A player's health reached zero
    PlayerDied {
        player_id: Uuid,
        killed_by: Option<Uuid>,
    },

    /// A dead player re-entered play
    PlayerRespawned {
        player_id: Uuid,
        x: f32,
        y: f32,
    },

    /// A player disconnected
    PlayerLeft {
        player_id: Uuid,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },

    /// Confirmation of lobby join
    LobbyJoined {
        lobby_id: Uuid,
        players: Vec<LobbyPlayerInfo>,
        phase: LobbyPhase,
    },

    /// Lobby roster or ready-state change
    LobbyUpdate {
        lobby_id: Uuid,
        players: Vec<LobbyPlayerInfo>,
        phase: LobbyPhase,
    },

    /// Match start countdown tick
    Countdown {
        seconds: u32,
    },

    /// Countdown aborted (a member went un-ready or left)
    CountdownCancelled,

    /// Lobby handoff into the match proper
    GameStart {
        players: Vec<StartingPlayer>,
    },
}

/// Lobby member as shown to other members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyPlayerInfo {
    pub player_id: Uuid,
    pub address: Option<String>,
    pub ready: bool,
}

/// Lobby lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LobbyPhase {
    /// Accepting members, waiting for everyone to ready up
    Waiting,
    /// All ready, countdown running
    Starting,
    /// Match underway, lobby closed to new members
    Active,
}

/// Per-player spawn assignment in the `GameStart` handoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartingPlayer {
    pub player_id: Uuid,
    pub address: Option<String>,
    pub spawn_point_index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_msg_tags_are_snake_case() {
        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"move","x":120.5,"y":686.0,"flip_x":true,"health":7}"#,
        )
        .unwrap();
        match msg {
            ClientMsg::Move { x, flip_x, health, .. } => {
                assert_eq!(x, 120.5);
                assert!(flip_x);
                assert_eq!(health, Some(7));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn move_without_health_field_parses() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"move","x":0.0,"y":0.0,"flip_x":false}"#).unwrap();
        match msg {
            ClientMsg::Move { health, .. } => assert_eq!(health, None),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn bullet_hit_me_accepts_null_shooter() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"bullet_hit_me","shooter_id":null}"#).unwrap();
        match msg {
            ClientMsg::BulletHitMe { shooter_id } => assert!(shooter_id.is_none()),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn unknown_type_tag_is_rejected() {
        let result = serde_json::from_str::<ClientMsg>(r#"{"type":"teleport","x":1.0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn player_died_serializes_null_killer() {
        let msg = ServerMsg::PlayerDied {
            player_id: Uuid::nil(),
            killed_by: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"player_died""#));
        assert!(json.contains(r#""killed_by":null"#));
    }

    #[test]
    fn lobby_phase_uses_snake_case() {
        let json = serde_json::to_string(&LobbyPhase::Starting).unwrap();
        assert_eq!(json, r#""starting""#);
    }
}
