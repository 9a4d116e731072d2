//! The relay actor: owns all session state and serializes every mutation

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::broadcast::BroadcastRouter;
use super::combat::{CombatArbiter, HitOutcome};
use super::session::SessionRegistry;

/// Relay event queue capacity
const EVENT_QUEUE: usize = 256;

/// Everything that can mutate session state, funneled into one queue.
///
/// Connection tasks and respawn timers only ever post events; the relay
/// task is the sole reader and the sole owner of the registry, so events
/// apply in arrival order with nothing in between.
#[derive(Debug)]
pub enum SessionEvent {
    /// A WebSocket finished its upgrade; `sender` is the session's
    /// outbound channel
    Connect {
        session_id: Uuid,
        sender: mpsc::Sender<ServerMsg>,
    },
    /// A parsed game message from a connected client
    Inbound {
        session_id: Uuid,
        msg: ClientMsg,
        received_at: u64,
    },
    /// The connection closed, cleanly or not
    Disconnect { session_id: Uuid },
    /// A respawn timer elapsed; state is revalidated on receipt
    RespawnDue { session_id: Uuid },
}

/// Cloneable handle for posting events into the relay
#[derive(Clone)]
pub struct RelayHandle {
    pub event_tx: mpsc::Sender<SessionEvent>,
    player_count: Arc<std::sync::atomic::AtomicUsize>,
}

impl RelayHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// The authoritative relay task
pub struct GameRelay {
    registry: SessionRegistry,
    router: BroadcastRouter,
    event_rx: mpsc::Receiver<SessionEvent>,
    event_tx: mpsc::Sender<SessionEvent>,
    respawn_delay: Duration,
    player_count: Arc<std::sync::atomic::AtomicUsize>,
}

impl GameRelay {
    pub fn new(respawn_delay: Duration) -> (Self, RelayHandle) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let player_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let handle = RelayHandle {
            event_tx: event_tx.clone(),
            player_count: player_count.clone(),
        };

        let relay = Self {
            registry: SessionRegistry::new(),
            router: BroadcastRouter::new(),
            event_rx,
            event_tx,
            respawn_delay,
            player_count,
        };

        (relay, handle)
    }

    /// Drain the event queue until every handle is dropped
    pub async fn run(mut self) {
        info!("Game relay running");

        while let Some(event) = self.event_rx.recv().await {
            self.handle_event(event);
        }

        info!("Game relay stopped");
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connect { session_id, sender } => {
                self.handle_connect(session_id, sender);
            }
            SessionEvent::Inbound { session_id, msg, .. } => {
                self.handle_message(session_id, msg);
            }
            SessionEvent::Disconnect { session_id } => {
                self.handle_disconnect(session_id);
            }
            SessionEvent::RespawnDue { session_id } => {
                self.complete_respawn(session_id, None);
            }
        }
    }

    fn handle_message(&mut self, session_id: Uuid, msg: ClientMsg) {
        match msg {
            ClientMsg::Move {
                x,
                y,
                flip_x,
                health,
            } => self.handle_move(session_id, x, y, flip_x, health),
            ClientMsg::Shoot { x, y, velocity_x } => {
                self.handle_shoot(session_id, x, y, velocity_x);
            }
            ClientMsg::HitPlayer { target_id } => {
                self.handle_hit(target_id, Some(session_id));
            }
            ClientMsg::BulletHitMe { shooter_id } => {
                self.handle_hit(session_id, shooter_id);
            }
            ClientMsg::Died => self.handle_died(session_id),
            ClientMsg::Respawned { x, y } => {
                let position = match (x, y) {
                    (Some(x), Some(y)) => Some((x, y)),
                    _ => None,
                };
                self.complete_respawn(session_id, position);
            }
            // Ping and lobby traffic are answered in the connection task
            _ => {}
        }
    }

    /// New session: register, greet with the roster, announce to the rest
    fn handle_connect(&mut self, session_id: Uuid, sender: mpsc::Sender<ServerMsg>) {
        self.router.attach(session_id, sender);
        let player = self.registry.register(session_id).clone();
        self.player_count
            .store(self.registry.len(), std::sync::atomic::Ordering::Relaxed);

        self.router.send_to(
            &session_id,
            ServerMsg::Welcome {
                session_id,
                server_time: unix_millis(),
            },
        );
        self.router.send_to(
            &session_id,
            ServerMsg::Snapshot {
                players: self.registry.snapshot(),
            },
        );
        self.router
            .to_others(&session_id, ServerMsg::PlayerJoined { player });

        info!(
            session_id = %session_id,
            player_count = self.registry.len(),
            "Player connected"
        );
    }

    /// Remove the session and tell everyone once. A repeat disconnect
    /// finds nothing to remove and stays silent.
    fn handle_disconnect(&mut self, session_id: Uuid) {
        self.router.detach(&session_id);

        if self.registry.remove(&session_id).is_none() {
            debug!(session_id = %session_id, "Disconnect for unknown session");
            return;
        }

        self.player_count
            .store(self.registry.len(), std::sync::atomic::Ordering::Relaxed);
        self.router
            .to_all(ServerMsg::PlayerLeft {
                player_id: session_id,
            });

        info!(
            session_id = %session_id,
            player_count = self.registry.len(),
            "Player disconnected"
        );
    }

    /// Accept a position update and relay it. Dead players do not move.
    fn handle_move(&mut self, session_id: Uuid, x: f32, y: f32, flip_x: bool, health: Option<u8>) {
        let Some(player) = self.registry.get_mut(&session_id) else {
            debug!(session_id = %session_id, "Move from unknown session");
            return;
        };
        if !player.alive {
            return;
        }

        player.x = x;
        player.y = y;
        player.flip_x = flip_x;

        let death = match health {
            Some(reported) => CombatArbiter::ratchet_health(&mut self.registry, session_id, reported),
            None => None,
        };

        if let Some(player) = self.registry.get(&session_id) {
            self.router.to_others(
                &session_id,
                ServerMsg::PlayerMoved {
                    player: player.clone(),
                },
            );
        }

        if let Some(HitOutcome::Killed { killer }) = death {
            self.announce_death(session_id, killer);
        }
    }

    /// Relay a shot to everyone else. The shooter simulates its own
    /// projectile locally.
    fn handle_shoot(&mut self, session_id: Uuid, x: f32, y: f32, velocity_x: f32) {
        match self.registry.get(&session_id) {
            Some(player) if player.alive => {}
            _ => {
                debug!(session_id = %session_id, "Shot dropped");
                return;
            }
        }

        self.router.to_others(
            &session_id,
            ServerMsg::BulletSpawned {
                shooter_id: session_id,
                x,
                y,
                velocity_x,
            },
        );
    }

    /// Arbitrate a hit report from either side of the bullet
    fn handle_hit(&mut self, target: Uuid, shooter: Option<Uuid>) {
        match CombatArbiter::apply_hit(&mut self.registry, target, shooter) {
            Some(HitOutcome::Damaged { health }) => {
                self.router.to_all(ServerMsg::PlayerDamaged {
                    player_id: target,
                    health,
                    shooter_id: shooter,
                });
            }
            Some(HitOutcome::Killed { killer }) => {
                self.router.to_all(ServerMsg::PlayerDamaged {
                    player_id: target,
                    health: 0,
                    shooter_id: shooter,
                });
                self.announce_death(target, killer);
            }
            None => {
                debug!(
                    target = %target,
                    shooter = ?shooter,
                    "Hit report dropped"
                );
            }
        }
    }

    /// Client-confirmed death, credited to whoever hit them last
    fn handle_died(&mut self, session_id: Uuid) {
        match CombatArbiter::confirm_death(&mut self.registry, session_id) {
            Some(HitOutcome::Killed { killer }) => self.announce_death(session_id, killer),
            _ => debug!(session_id = %session_id, "Death report dropped"),
        }
    }

    /// Shared tail of every death path: one broadcast, one timer
    fn announce_death(&mut self, victim: Uuid, killer: Option<Uuid>) {
        self.router.to_all(ServerMsg::PlayerDied {
            player_id: victim,
            killed_by: killer,
        });

        info!(session_id = %victim, killed_by = ?killer, "Player died");

        self.schedule_respawn(victim);
    }

    /// Finish a respawn, server-driven (`position == None`, rotated spawn
    /// point) or client-driven (explicit coordinates). Settled sessions
    /// drop out in the arbiter's state check.
    fn complete_respawn(&mut self, session_id: Uuid, position: Option<(f32, f32)>) {
        match CombatArbiter::respawn(&mut self.registry, session_id, position) {
            Some(player) => {
                self.router.to_all(ServerMsg::PlayerRespawned {
                    player_id: session_id,
                    x: player.x,
                    y: player.y,
                });
                info!(session_id = %session_id, x = player.x, y = player.y, "Player respawned");
            }
            None => {
                debug!(session_id = %session_id, "Respawn dropped for settled session");
            }
        }
    }

    /// One-shot timer that re-enters the event queue. It carries only the
    /// session id; whatever happened in the meantime wins.
    fn schedule_respawn(&self, session_id: Uuid) {
        let tx = self.event_tx.clone();
        let delay = self.respawn_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionEvent::RespawnDue { session_id }).await;
        });
    }
}
