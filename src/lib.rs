//! Authoritative state relay for a multiplayer 2D arena shooter

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod lobby;
pub mod util;
pub mod ws;
