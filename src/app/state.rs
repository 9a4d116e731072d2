//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{GameRelay, RelayHandle};
use crate::lobby::LobbyService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub relay: RelayHandle,
    pub lobby: Arc<LobbyService>,
}

impl AppState {
    /// Build the state and the relay actor; the caller spawns the actor
    pub fn new(config: Config) -> (Self, GameRelay) {
        let config = Arc::new(config);

        let (relay, handle) = GameRelay::new(config.respawn_delay);
        let lobby = Arc::new(LobbyService::new());

        let state = Self {
            config,
            relay: handle,
            lobby,
        };

        (state, relay)
    }
}
