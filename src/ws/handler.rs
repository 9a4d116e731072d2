//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::broadcast::SESSION_BUFFER;
use crate::game::SessionEvent;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler. Connections are anonymous; the session id
/// minted here is the player's identity for its whole lifetime.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4();
    info!(session_id = %session_id, "New WebSocket connection");

    // One outbound channel per session, shared by the relay and the lobby
    let (out_tx, out_rx) = mpsc::channel::<ServerMsg>(SESSION_BUFFER);

    state.lobby.register(session_id, out_tx.clone());

    let connect = SessionEvent::Connect {
        session_id,
        sender: out_tx.clone(),
    };
    if state.relay.event_tx.send(connect).await.is_err() {
        error!(session_id = %session_id, "Relay unavailable, dropping connection");
        state.lobby.unregister(session_id);
        return;
    }

    run_session(session_id, socket, &state, out_tx, out_rx).await;

    // Cleanup on disconnect; both paths (close frame and transport error)
    // funnel through here exactly once
    state.lobby.unregister(session_id);
    let _ = state
        .relay
        .event_tx
        .send(SessionEvent::Disconnect { session_id })
        .await;

    info!(session_id = %session_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    session_id: Uuid,
    socket: WebSocket,
    state: &AppState,
    out_tx: mpsc::Sender<ServerMsg>,
    mut out_rx: mpsc::Receiver<ServerMsg>,
) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let rate_limiter = PlayerRateLimiter::new();

    // Writer task: session channel -> WebSocket
    let writer_session = session_id;
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(session_id = %writer_session, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> relay / lobby
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(session_id = %session_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        if !route_message(session_id, msg, state, &out_tx).await {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(session_id = %session_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(session_id = %session_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(session_id = %session_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Dispatch one parsed message. Lobby traffic and pings are handled on
/// the connection task; everything else is queued for the relay.
/// Returns false when the relay is gone and the session should end.
async fn route_message(
    session_id: Uuid,
    msg: ClientMsg,
    state: &AppState,
    out_tx: &mpsc::Sender<ServerMsg>,
) -> bool {
    match msg {
        ClientMsg::Ping { t } => {
            let _ = out_tx.try_send(ServerMsg::Pong { t });
        }
        ClientMsg::JoinLobby { address } => state.lobby.join(session_id, address),
        ClientMsg::SetReady { ready } => state.lobby.set_ready(session_id, ready),
        ClientMsg::StartGame => state.lobby.request_start(session_id),
        ClientMsg::LeaveLobby => state.lobby.leave(session_id),
        msg => {
            let event = SessionEvent::Inbound {
                session_id,
                msg,
                received_at: unix_millis(),
            };
            if state.relay.event_tx.send(event).await.is_err() {
                debug!(session_id = %session_id, "Relay channel closed");
                return false;
            }
        }
    }
    true
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
