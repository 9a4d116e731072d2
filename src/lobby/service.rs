//! Lobby service - groups players and counts them into a match

use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::game::spawn::SPAWN_POINTS;
use crate::ws::protocol::{LobbyPhase, LobbyPlayerInfo, ServerMsg, StartingPlayer};

/// Most members a lobby accepts
pub const MAX_LOBBY_SIZE: usize = 4;
/// Fewest ready members needed to start a countdown
pub const MIN_PLAYERS_TO_START: usize = 2;
/// Countdown length in seconds
pub const COUNTDOWN_SECS: u32 = 5;

struct Member {
    player_id: Uuid,
    address: Option<String>,
    ready: bool,
}

struct Lobby {
    id: Uuid,
    /// Join order; spawn assignment at start alternates over this
    members: Vec<Member>,
    phase: LobbyPhase,
    /// Seconds left while `Starting`
    countdown: Option<u32>,
}

impl Lobby {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            members: Vec::new(),
            phase: LobbyPhase::Waiting,
            countdown: None,
        }
    }

    fn member_mut(&mut self, player_id: &Uuid) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.player_id == *player_id)
    }

    fn roster(&self) -> Vec<LobbyPlayerInfo> {
        self.members
            .iter()
            .map(|m| LobbyPlayerInfo {
                player_id: m.player_id,
                address: m.address.clone(),
                ready: m.ready,
            })
            .collect()
    }

    fn all_ready(&self) -> bool {
        self.members.iter().all(|m| m.ready)
    }
}

/// Groups connected players into lobbies of up to four and runs the
/// ready-up countdown. Lobby state is separate from game state; the
/// handoff is the `GameStart` broadcast.
pub struct LobbyService {
    lobbies: DashMap<Uuid, Lobby>,
    /// player -> lobby
    member_index: DashMap<Uuid, Uuid>,
    /// player -> outbound channel
    senders: DashMap<Uuid, mpsc::Sender<ServerMsg>>,
}

impl LobbyService {
    pub fn new() -> Self {
        Self {
            lobbies: DashMap::new(),
            member_index: DashMap::new(),
            senders: DashMap::new(),
        }
    }

    /// Register a connection's outbound channel (called on socket accept)
    pub fn register(&self, player_id: Uuid, sender: mpsc::Sender<ServerMsg>) {
        self.senders.insert(player_id, sender);
    }

    /// Remove a disconnected player from the service entirely
    pub fn unregister(&self, player_id: Uuid) {
        self.leave(player_id);
        self.senders.remove(&player_id);
    }

    /// Put a player into the first open lobby, or a fresh one. Joining
    /// again just repeats the confirmation for the current lobby.
    pub fn join(&self, player_id: Uuid, address: Option<String>) {
        if let Some(lobby_id) = self.member_index.get(&player_id).map(|r| *r) {
            if let Some(lobby) = self.lobbies.get(&lobby_id) {
                self.send(
                    &player_id,
                    ServerMsg::LobbyJoined {
                        lobby_id,
                        players: lobby.roster(),
                        phase: lobby.phase,
                    },
                );
            }
            return;
        }

        let member = Member {
            player_id,
            address,
            ready: false,
        };
        let lobby_id = self.place(member);
        self.member_index.insert(player_id, lobby_id);

        if let Some(lobby) = self.lobbies.get(&lobby_id) {
            self.broadcast_update(&lobby);
            self.send(
                &player_id,
                ServerMsg::LobbyJoined {
                    lobby_id,
                    players: lobby.roster(),
                    phase: lobby.phase,
                },
            );
        }

        info!(player_id = %player_id, lobby_id = %lobby_id, "Player joined lobby");
    }

    /// Update a member's ready flag.
    ///
    /// Readying up may start the countdown; backing out during the
    /// countdown cancels it. Active lobbies ignore the toggle.
    pub fn set_ready(&self, player_id: Uuid, ready: bool) {
        let Some(lobby_id) = self.member_index.get(&player_id).map(|r| *r) else {
            return;
        };
        let Some(mut entry) = self.lobbies.get_mut(&lobby_id) else {
            return;
        };
        let lobby = entry.value_mut();

        match lobby.phase {
            LobbyPhase::Active => {}
            LobbyPhase::Starting => {
                if ready {
                    return;
                }
                let Some(member) = lobby.member_mut(&player_id) else {
                    return;
                };
                member.ready = false;
                lobby.phase = LobbyPhase::Waiting;
                lobby.countdown = None;

                self.broadcast_update(lobby);
                self.broadcast(lobby, ServerMsg::CountdownCancelled);
                info!(player_id = %player_id, lobby_id = %lobby_id, "Countdown cancelled");
            }
            LobbyPhase::Waiting => {
                let Some(member) = lobby.member_mut(&player_id) else {
                    return;
                };
                member.ready = ready;
                self.broadcast_update(lobby);

                if ready {
                    self.maybe_begin_countdown(lobby);
                }
            }
        }
    }

    /// Explicit start request; same all-ready rule as readying up
    pub fn request_start(&self, player_id: Uuid) {
        let Some(lobby_id) = self.member_index.get(&player_id).map(|r| *r) else {
            return;
        };
        let Some(mut entry) = self.lobbies.get_mut(&lobby_id) else {
            return;
        };
        let lobby = entry.value_mut();
        if lobby.phase != LobbyPhase::Waiting {
            return;
        }
        self.maybe_begin_countdown(lobby);
    }

    /// Take a player out of their lobby, deleting the lobby if it empties
    pub fn leave(&self, player_id: Uuid) {
        let Some((_, lobby_id)) = self.member_index.remove(&player_id) else {
            return;
        };

        let emptied = {
            let Some(mut entry) = self.lobbies.get_mut(&lobby_id) else {
                return;
            };
            let lobby = entry.value_mut();
            lobby.members.retain(|m| m.player_id != player_id);

            if lobby.members.is_empty() {
                true
            } else {
                self.broadcast_update(lobby);
                false
            }
        };

        if emptied {
            self.lobbies.remove_if(&lobby_id, |_, l| l.members.is_empty());
            info!(lobby_id = %lobby_id, "Deleted empty lobby");
        }

        info!(player_id = %player_id, lobby_id = %lobby_id, "Player left lobby");
    }

    /// Lobbies currently tracked, any phase
    pub fn open_lobbies(&self) -> usize {
        self.lobbies.len()
    }

    /// Advance countdowns once per second
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));

        loop {
            interval.tick().await;
            self.tick();
        }
    }

    /// One countdown step across all starting lobbies
    fn tick(&self) {
        for mut entry in self.lobbies.iter_mut() {
            let lobby = entry.value_mut();
            if lobby.phase != LobbyPhase::Starting {
                continue;
            }
            let Some(remaining) = lobby.countdown.as_mut() else {
                continue;
            };

            *remaining = remaining.saturating_sub(1);
            let seconds = *remaining;
            self.broadcast(lobby, ServerMsg::Countdown { seconds });

            if seconds == 0 {
                self.begin_match(lobby);
            }
        }
    }

    /// Check-and-insert under the lobby entry so the size cap holds
    fn place(&self, member: Member) -> Uuid {
        for mut entry in self.lobbies.iter_mut() {
            let lobby = entry.value_mut();
            if lobby.phase == LobbyPhase::Waiting && lobby.members.len() < MAX_LOBBY_SIZE {
                lobby.members.push(member);
                return lobby.id;
            }
        }

        let id = Uuid::new_v4();
        let mut lobby = Lobby::new(id);
        lobby.members.push(member);
        self.lobbies.insert(id, lobby);
        info!(lobby_id = %id, "Created new lobby");
        id
    }

    fn maybe_begin_countdown(&self, lobby: &mut Lobby) {
        if lobby.phase != LobbyPhase::Waiting {
            return;
        }
        if lobby.members.len() < MIN_PLAYERS_TO_START || !lobby.all_ready() {
            return;
        }

        lobby.phase = LobbyPhase::Starting;
        lobby.countdown = Some(COUNTDOWN_SECS);
        self.broadcast(
            lobby,
            ServerMsg::Countdown {
                seconds: COUNTDOWN_SECS,
            },
        );
        info!(lobby_id = %lobby.id, "Lobby countdown started");
    }

    /// Hand the lobby off to the game: alternate spawn assignments over
    /// join order and close the lobby to new members
    fn begin_match(&self, lobby: &mut Lobby) {
        lobby.phase = LobbyPhase::Active;
        lobby.countdown = None;

        let players: Vec<StartingPlayer> = lobby
            .members
            .iter()
            .enumerate()
            .map(|(index, m)| StartingPlayer {
                player_id: m.player_id,
                address: m.address.clone(),
                spawn_point_index: index % SPAWN_POINTS.len(),
            })
            .collect();

        self.broadcast(lobby, ServerMsg::GameStart { players });
        info!(
            lobby_id = %lobby.id,
            player_count = lobby.members.len(),
            "Lobby match starting"
        );
    }

    fn broadcast_update(&self, lobby: &Lobby) {
        self.broadcast(
            lobby,
            ServerMsg::LobbyUpdate {
                lobby_id: lobby.id,
                players: lobby.roster(),
                phase: lobby.phase,
            },
        );
    }

    fn broadcast(&self, lobby: &Lobby, msg: ServerMsg) {
        for member in &lobby.members {
            self.send(&member.player_id, msg.clone());
        }
    }

    fn send(&self, player_id: &Uuid, msg: ServerMsg) {
        if let Some(tx) = self.senders.get(player_id) {
            if let Err(err) = tx.try_send(msg) {
                debug!(player_id = %player_id, error = %err, "Dropped lobby message");
            }
        }
    }
}

impl Default for LobbyService {
    fn default() -> Self {
        Self::new()
    }
}
