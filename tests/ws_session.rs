//! End-to-end WebSocket flows against a real bound server

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use arena_relay_server::app::AppState;
use arena_relay_server::config::Config;
use arena_relay_server::game::{PlayerState, MAX_HEALTH};
use arena_relay_server::http::build_router;
use arena_relay_server::ws::protocol::{ClientMsg, LobbyPhase, ServerMsg};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Boot a full server on an ephemeral port and return its address
async fn start_server(respawn_delay: Duration) -> SocketAddr {
    let config = Config {
        respawn_delay,
        ..Config::default()
    };

    let (state, relay) = AppState::new(config);
    tokio::spawn(relay.run());
    let lobby = state.lobby.clone();
    tokio::spawn(async move { lobby.run().await });

    let router = build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    addr
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    ws
}

async fn send(ws: &mut WsClient, msg: &ClientMsg) {
    let json = serde_json::to_string(msg).unwrap();
    ws.send(Message::Text(json)).await.unwrap();
}

async fn recv(ws: &mut WsClient) -> ServerMsg {
    loop {
        let frame = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a server message")
            .expect("connection closed")
            .expect("websocket transport error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Skip traffic until `pred` matches, within a bounded number of messages
async fn recv_until<F>(ws: &mut WsClient, mut pred: F) -> ServerMsg
where
    F: FnMut(&ServerMsg) -> bool,
{
    for _ in 0..64 {
        let msg = recv(ws).await;
        if pred(&msg) {
            return msg;
        }
    }
    panic!("expected message never arrived");
}

/// Connect and consume the welcome/snapshot greeting
async fn join(addr: SocketAddr) -> (WsClient, Uuid, HashMap<Uuid, PlayerState>) {
    let mut ws = connect(addr).await;

    let session_id = match recv(&mut ws).await {
        ServerMsg::Welcome { session_id, .. } => session_id,
        other => panic!("expected welcome, got {:?}", other),
    };
    let players = match recv(&mut ws).await {
        ServerMsg::Snapshot { players } => players,
        other => panic!("expected snapshot, got {:?}", other),
    };

    (ws, session_id, players)
}

fn hit(target_id: Uuid) -> ClientMsg {
    ClientMsg::HitPlayer { target_id }
}

fn move_msg(x: f32, y: f32, health: Option<u8>) -> ClientMsg {
    ClientMsg::Move {
        x,
        y,
        flip_x: false,
        health,
    }
}

#[tokio::test]
async fn connect_receives_welcome_and_roster() {
    let addr = start_server(Duration::from_secs(3)).await;

    let (mut ws_a, a, roster_a) = join(addr).await;
    assert_eq!(roster_a.len(), 1);
    assert_eq!(roster_a[&a].health, MAX_HEALTH);
    assert!(roster_a[&a].alive);

    let (_ws_b, b, roster_b) = join(addr).await;
    assert_ne!(a, b);
    assert_eq!(roster_b.len(), 2);
    // Spawn points alternate across the map ends
    assert_eq!(roster_b[&a].x, 200.0);
    assert_eq!(roster_b[&b].x, 3000.0);
    assert_eq!(roster_b[&b].y, 686.0);

    let joined = recv_until(&mut ws_a, |m| matches!(m, ServerMsg::PlayerJoined { .. })).await;
    match joined {
        ServerMsg::PlayerJoined { player } => assert_eq!(player.player_id, b),
        other => panic!("expected join notice, got {:?}", other),
    }
}

#[tokio::test]
async fn damage_chain_reaches_both_clients() {
    let addr = start_server(Duration::from_secs(3)).await;
    let (mut ws_a, a, _) = join(addr).await;
    let (mut ws_b, b, _) = join(addr).await;

    for _ in 0..3 {
        send(&mut ws_b, &hit(a)).await;
    }

    for ws in [&mut ws_a, &mut ws_b] {
        for expected in [9u8, 8, 7] {
            let msg = recv_until(ws, |m| matches!(m, ServerMsg::PlayerDamaged { .. })).await;
            match msg {
                ServerMsg::PlayerDamaged {
                    player_id,
                    health,
                    shooter_id,
                } => {
                    assert_eq!(player_id, a);
                    assert_eq!(health, expected);
                    assert_eq!(shooter_id, Some(b));
                }
                other => panic!("expected damage, got {:?}", other),
            }
        }
    }
}

#[tokio::test]
async fn kill_then_timed_respawn() {
    let addr = start_server(Duration::from_millis(100)).await;
    let (_ws_a, a, _) = join(addr).await;
    let (mut ws_b, b, _) = join(addr).await;

    for _ in 0..MAX_HEALTH {
        send(&mut ws_b, &hit(a)).await;
    }

    for expected in (0..MAX_HEALTH).rev() {
        let msg = recv_until(&mut ws_b, |m| matches!(m, ServerMsg::PlayerDamaged { .. })).await;
        match msg {
            ServerMsg::PlayerDamaged { health, .. } => assert_eq!(health, expected),
            other => panic!("expected damage, got {:?}", other),
        }
    }

    let died = recv(&mut ws_b).await;
    match died {
        ServerMsg::PlayerDied {
            player_id,
            killed_by,
        } => {
            assert_eq!(player_id, a);
            assert_eq!(killed_by, Some(b));
        }
        other => panic!("expected death, got {:?}", other),
    }

    // First player spawned at index 0, so the respawn rotates to index 1
    let respawned =
        recv_until(&mut ws_b, |m| matches!(m, ServerMsg::PlayerRespawned { .. })).await;
    match respawned {
        ServerMsg::PlayerRespawned { player_id, x, y } => {
            assert_eq!(player_id, a);
            assert_eq!(x, 3000.0);
            assert_eq!(y, 686.0);
        }
        other => panic!("expected respawn, got {:?}", other),
    }
}

#[tokio::test]
async fn kill_is_credited_on_the_shooters_state() {
    let addr = start_server(Duration::from_millis(100)).await;
    let (mut ws_a, a, _) = join(addr).await;
    let (mut ws_b, b, _) = join(addr).await;

    for _ in 0..MAX_HEALTH {
        send(&mut ws_b, &hit(a)).await;
    }
    recv_until(&mut ws_a, |m| matches!(m, ServerMsg::PlayerDied { .. })).await;

    // The kill counter travels with the shooter's next relayed state
    send(&mut ws_b, &move_msg(500.0, 686.0, None)).await;
    let moved = recv_until(&mut ws_a, |m| matches!(m, ServerMsg::PlayerMoved { .. })).await;
    match moved {
        ServerMsg::PlayerMoved { player } => {
            assert_eq!(player.player_id, b);
            assert_eq!(player.kills, 1);
        }
        other => panic!("expected move, got {:?}", other),
    }
}

#[tokio::test]
async fn hits_after_death_are_ignored() {
    let addr = start_server(Duration::from_millis(200)).await;
    let (_ws_a, a, _) = join(addr).await;
    let (mut ws_b, _b, _) = join(addr).await;

    for _ in 0..MAX_HEALTH {
        send(&mut ws_b, &hit(a)).await;
    }
    recv_until(&mut ws_b, |m| matches!(m, ServerMsg::PlayerDied { .. })).await;

    // Stray reports for the same bullet land while the victim is down
    for _ in 0..3 {
        send(&mut ws_b, &hit(a)).await;
    }

    // The queue is ordered, so those reports resolve before the respawn
    // timer fires; nothing may arrive in between
    let next = recv(&mut ws_b).await;
    assert!(
        matches!(next, ServerMsg::PlayerRespawned { .. }),
        "expected a quiet gap then the respawn, got {:?}",
        next
    );
}

#[tokio::test]
async fn client_health_report_only_ratchets_down() {
    let addr = start_server(Duration::from_secs(3)).await;
    let (mut ws_a, a, _) = join(addr).await;
    let (mut ws_b, _b, _) = join(addr).await;

    for _ in 0..3 {
        send(&mut ws_b, &hit(a)).await;
    }
    for _ in 0..3 {
        recv_until(&mut ws_a, |m| matches!(m, ServerMsg::PlayerDamaged { .. })).await;
    }

    // A higher client value is ignored
    send(&mut ws_a, &move_msg(100.0, 686.0, Some(9))).await;
    let moved = recv_until(&mut ws_b, |m| matches!(m, ServerMsg::PlayerMoved { .. })).await;
    match moved {
        ServerMsg::PlayerMoved { player } => assert_eq!(player.health, 7),
        other => panic!("expected move, got {:?}", other),
    }

    // A lower one is accepted
    send(&mut ws_a, &move_msg(110.0, 686.0, Some(5))).await;
    let moved = recv_until(&mut ws_b, |m| matches!(m, ServerMsg::PlayerMoved { .. })).await;
    match moved {
        ServerMsg::PlayerMoved { player } => assert_eq!(player.health, 5),
        other => panic!("expected move, got {:?}", other),
    }
}

#[tokio::test]
async fn self_hit_is_rejected() {
    let addr = start_server(Duration::from_secs(3)).await;
    let (mut ws_a, a, _) = join(addr).await;
    let (mut ws_b, _b, _) = join(addr).await;

    send(
        &mut ws_a,
        &ClientMsg::BulletHitMe {
            shooter_id: Some(a),
        },
    )
    .await;
    send(&mut ws_a, &move_msg(250.0, 686.0, None)).await;

    // The move probe arrives after the rejected hit; no damage may
    // precede it
    loop {
        match recv(&mut ws_b).await {
            ServerMsg::PlayerDamaged { .. } => panic!("self-hit was applied"),
            ServerMsg::PlayerMoved { player } => {
                assert_eq!(player.health, MAX_HEALTH);
                break;
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn unattributed_hit_damages_without_credit() {
    let addr = start_server(Duration::from_secs(3)).await;
    let (mut ws_a, a, _) = join(addr).await;
    let (_ws_b, _b, _) = join(addr).await;

    send(&mut ws_a, &ClientMsg::BulletHitMe { shooter_id: None }).await;

    let msg = recv_until(&mut ws_a, |m| matches!(m, ServerMsg::PlayerDamaged { .. })).await;
    match msg {
        ServerMsg::PlayerDamaged {
            player_id,
            health,
            shooter_id,
        } => {
            assert_eq!(player_id, a);
            assert_eq!(health, 9);
            assert_eq!(shooter_id, None);
        }
        other => panic!("expected damage, got {:?}", other),
    }
}

#[tokio::test]
async fn disconnect_announces_player_left() {
    let addr = start_server(Duration::from_secs(3)).await;
    let (mut ws_a, a, _) = join(addr).await;
    let (mut ws_b, b, _) = join(addr).await;

    ws_b.close(None).await.unwrap();

    let left = recv_until(&mut ws_a, |m| matches!(m, ServerMsg::PlayerLeft { .. })).await;
    match left {
        ServerMsg::PlayerLeft { player_id } => assert_eq!(player_id, b),
        other => panic!("expected leave notice, got {:?}", other),
    }

    // A fresh join sees a roster without the departed player
    let (_ws_c, c, roster) = join(addr).await;
    assert_eq!(roster.len(), 2);
    assert!(roster.contains_key(&a));
    assert!(roster.contains_key(&c));
    assert!(!roster.contains_key(&b));
}

#[tokio::test]
async fn ping_answers_pong() {
    let addr = start_server(Duration::from_secs(3)).await;
    let (mut ws_a, _a, _) = join(addr).await;

    send(&mut ws_a, &ClientMsg::Ping { t: 42 }).await;

    let pong = recv_until(&mut ws_a, |m| matches!(m, ServerMsg::Pong { .. })).await;
    match pong {
        ServerMsg::Pong { t } => assert_eq!(t, 42),
        other => panic!("expected pong, got {:?}", other),
    }
}

#[tokio::test]
async fn lobby_ready_flow_starts_and_cancels_countdown() {
    let addr = start_server(Duration::from_secs(3)).await;
    let (mut ws_a, a, _) = join(addr).await;
    let (mut ws_b, b, _) = join(addr).await;

    send(
        &mut ws_a,
        &ClientMsg::JoinLobby {
            address: Some("alice".to_string()),
        },
    )
    .await;
    let joined = recv_until(&mut ws_a, |m| matches!(m, ServerMsg::LobbyJoined { .. })).await;
    let lobby_id = match joined {
        ServerMsg::LobbyJoined {
            lobby_id,
            players,
            phase,
        } => {
            assert_eq!(players.len(), 1);
            assert_eq!(players[0].player_id, a);
            assert_eq!(players[0].address.as_deref(), Some("alice"));
            assert!(!players[0].ready);
            assert_eq!(phase, LobbyPhase::Waiting);
            lobby_id
        }
        other => panic!("expected lobby join, got {:?}", other),
    };

    send(&mut ws_b, &ClientMsg::JoinLobby { address: None }).await;
    match recv_until(&mut ws_b, |m| matches!(m, ServerMsg::LobbyJoined { .. })).await {
        ServerMsg::LobbyJoined {
            lobby_id: joined_id,
            players,
            ..
        } => {
            assert_eq!(joined_id, lobby_id);
            assert_eq!(players.len(), 2);
        }
        other => panic!("expected lobby join, got {:?}", other),
    }

    // Second member readying up completes the quorum and starts the count
    send(&mut ws_a, &ClientMsg::SetReady { ready: true }).await;
    send(&mut ws_b, &ClientMsg::SetReady { ready: true }).await;

    let countdown = recv_until(&mut ws_a, |m| matches!(m, ServerMsg::Countdown { .. })).await;
    match countdown {
        ServerMsg::Countdown { seconds } => assert_eq!(seconds, 5),
        other => panic!("expected countdown, got {:?}", other),
    }

    // Going un-ready mid-count aborts it for everyone
    send(&mut ws_a, &ClientMsg::SetReady { ready: false }).await;
    recv_until(&mut ws_b, |m| matches!(m, ServerMsg::CountdownCancelled)).await;

    // The roster update preceding the abort shows the member un-ready
    let mut last_update = None;
    loop {
        match recv(&mut ws_a).await {
            ServerMsg::LobbyUpdate { players, phase, .. } => {
                last_update = Some((players, phase));
            }
            ServerMsg::CountdownCancelled => break,
            _ => {}
        }
    }
    let (players, phase) = last_update.expect("no roster update before the abort");
    assert_eq!(phase, LobbyPhase::Waiting);
    let toggled = players.iter().find(|p| p.player_id == a).unwrap();
    assert!(!toggled.ready);
    assert!(players.iter().any(|p| p.player_id == b));
}
