//! WebSocket upgrade handler

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::http::routes::AppError;
use crate::sync::session::ClientId;
use crate::sync::transport::next_queued;
use crate::sync::{SessionHandle, SessionId};
use crate::util::rate_limit::PeerRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler for one session
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<SessionId>,
    State(state): State<AppState>,
) -> Response {
    let Some(handle) = state.sessions.get(&session_id) else {
        warn!(session_id = %session_id, "WebSocket upgrade for unknown session");
        return AppError::NotFound(format!("session {session_id}")).into_response();
    };

    let rate_limit = state.config.input_rate_limit;
    let join_timeout = state.config.game.join_timeout();
    ws.on_upgrade(move |socket| handle_socket(socket, handle, rate_limit, join_timeout))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    handle: SessionHandle,
    rate_limit: u32,
    join_timeout: Duration,
) {
    let client_id = Uuid::new_v4();
    info!(session_id = %handle.id, client_id = %client_id, "New WebSocket connection");

    let (direct_rx, state_rx) = match handle.connect(client_id).await {
        Ok(channels) => channels,
        Err(e) => {
            error!(session_id = %handle.id, client_id = %client_id, error = %e, "Session gone before connect");
            return;
        }
    };

    run_session(
        client_id,
        &handle,
        socket,
        direct_rx,
        state_rx,
        rate_limit,
        join_timeout,
    )
    .await;

    // Cleanup on disconnect
    handle.disconnect(client_id);
    info!(session_id = %handle.id, client_id = %client_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    client_id: ClientId,
    handle: &SessionHandle,
    socket: WebSocket,
    mut direct_rx: mpsc::Receiver<ServerMsg>,
    mut state_rx: broadcast::Receiver<ServerMsg>,
    rate_limit: u32,
    join_timeout: Duration,
) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let rate_limiter = PeerRateLimiter::new(rate_limit);

    // Spawn writer task: direct replies and broadcast state -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                biased;

                msg = direct_rx.recv() => match msg {
                    Some(msg) => msg,
                    None => {
                        // host is done; flush the final state and round end
                        while let Some(msg) = next_queued(&mut state_rx) {
                            if send_msg(&mut ws_sink, &msg).await.is_err() {
                                break;
                            }
                        }
                        debug!(client_id = %client_id, "Session closed, writer done");
                        break;
                    }
                },

                msg = state_rx.recv() => match msg {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(client_id = %client_id, lagged_count = n, "Client lagged, skipping {} messages", n);
                        // Continue - don't disconnect for lag
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(client_id = %client_id, "State channel closed");
                        break;
                    }
                },
            };

            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(client_id = %client_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> session task. A peer gets `join_timeout`
    // to ask for a slot before it is dropped.
    let join_deadline = tokio::time::Instant::now() + join_timeout;
    let mut assign_requested = false;
    loop {
        let next = if assign_requested {
            ws_stream.next().await
        } else {
            match tokio::time::timeout_at(join_deadline, ws_stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(
                        client_id = %client_id,
                        timeout_secs = join_timeout.as_secs(),
                        "No assign request in time, closing"
                    );
                    break;
                }
            }
        };
        let Some(result) = next else {
            break;
        };

        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check() {
                    warn!(client_id = %client_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(ClientMsg::Leave) => {
                        info!(client_id = %client_id, "Client left");
                        break;
                    }
                    Ok(client_msg) => {
                        if client_msg == ClientMsg::RequestAssign {
                            assign_requested = true;
                        }
                        if handle.send(client_id, client_msg).await.is_err() {
                            debug!(client_id = %client_id, "Session closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(client_id = %client_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(client_id = %client_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(client_id = %client_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(client_id = %client_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
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
