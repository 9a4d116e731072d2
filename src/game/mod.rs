//! Authoritative game state and the relay that guards it

pub mod broadcast;
pub mod combat;
pub mod relay;
pub mod session;
pub mod spawn;

pub use relay::{GameRelay, RelayHandle, SessionEvent};
pub use session::{PlayerState, MAX_HEALTH};
