//! Pre-match lobby and ready-up flow

pub mod service;

pub use service::LobbyService;
