//! The terminal WebSocket endpoint: authentication, frame dispatch, and
//! session lifecycle for one connection.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use bytes::Bytes;
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::auth;
use super::AppState;
use crate::launch::{self, LaunchedProcess};
use crate::protocol::{ClientFrame, ServerFrame};
use crate::pump;
use crate::session::{ConnectionId, Session};

/// Outbound frame buffer per connection. Pumps block here when the socket
/// writer falls behind; the channel closing tells them the peer is gone.
const OUTBOUND_BUFFER: usize = 256;

/// Stdin buffer per session.
const STDIN_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
pub(super) struct WsQuery {
    token: Option<String>,
}

pub(super) async fn ws_terminal(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let authorized = match state.token.as_deref() {
        None => true,
        Some(expected) => auth::header_token(&headers)
            .or(query.token)
            .map(|presented| auth::token_matches(&presented, expected))
            .unwrap_or(false),
    };

    ws.on_upgrade(move |socket| async move {
        if authorized {
            handle_terminal(socket, state).await;
        } else {
            refuse(socket).await;
        }
    })
}

/// Refuse an unauthenticated upgrade with a policy-violation close before
/// any frame is dispatched. No session can ever be started on this socket.
async fn refuse(mut socket: WebSocket) {
    tracing::info!("rejected unauthenticated terminal connection");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: "Unauthorized".into(),
        })))
        .await;
}

async fn handle_terminal(socket: WebSocket, state: AppState) {
    let conn = ConnectionId::next();
    let mut shutdown_rx = state.shutdown.subscribe();
    let (mut ws_tx, mut ws_rx) = socket.split();
    // All outbound frames funnel through one channel into the single socket
    // writer, preserving per-session started -> output* -> exit ordering.
    let (out_tx, mut out_rx) = mpsc::channel::<ServerFrame>(OUTBOUND_BUFFER);

    tracing::info!(%conn, "terminal connected");

    loop {
        tokio::select! {
            frame = out_rx.recv() => {
                // The handler keeps a sender alive, so this is always Some.
                let Some(frame) = frame else { break };
                if send_frame(&mut ws_tx, &frame).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if dispatch(&text, conn, &state, &mut ws_tx, &out_tx).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong handled by axum
                    Some(Err(e)) => {
                        tracing::debug!(%conn, error = %e, "terminal socket error");
                        break;
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    let close = CloseFrame {
                        code: close_code::AWAY,
                        reason: "server shutting down".into(),
                    };
                    let _ = ws_tx.send(Message::Close(Some(close))).await;
                    break;
                }
            }
        }
    }

    // Close sweep: no process launched by this connection outlives it.
    let orphans = state.sessions.drain_connection(conn);
    if !orphans.is_empty() {
        tracing::info!(%conn, count = orphans.len(), "destroying sessions of closed connection");
        for session in orphans {
            session.destroy();
        }
    }
    tracing::info!(%conn, "terminal disconnected");
}

type WsSink = SplitSink<WebSocket, Message>;

async fn send_frame(ws_tx: &mut WsSink, frame: &ServerFrame) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(json) => ws_tx.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode frame");
            Ok(())
        }
    }
}

/// Handle one inbound text frame. `Err` means the socket writer failed and
/// the connection loop should end; protocol errors are answered with an
/// `error` frame and keep the connection open.
async fn dispatch(
    text: &str,
    conn: ConnectionId,
    state: &AppState,
    ws_tx: &mut WsSink,
    out_tx: &mpsc::Sender<ServerFrame>,
) -> Result<(), axum::Error> {
    let frame = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            return send_frame(ws_tx, &ServerFrame::error(e.to_string())).await;
        }
    };

    match frame {
        ClientFrame::Run { cmd, cwd } => run(cmd, cwd, conn, state, ws_tx, out_tx).await,
        ClientFrame::Stdin { session_id, data } => {
            // An absent session is not an error: the client's send races
            // the exit frame, harmlessly.
            if let Some(session) = state.sessions.get(&session_id) {
                let _ = session.input_tx.send(Bytes::from(data)).await;
            }
            Ok(())
        }
        ClientFrame::Cancel { session_id } => {
            // Idempotent: cancelling an already-gone session is a no-op.
            // The pump still emits the terminal exit once the OS reports
            // the kill.
            tracing::debug!(session = %session_id, "cancel requested");
            state.sessions.remove_and_destroy(&session_id);
            Ok(())
        }
    }
}

async fn run(
    cmd: String,
    cwd: Option<String>,
    conn: ConnectionId,
    state: &AppState,
    ws_tx: &mut WsSink,
    out_tx: &mpsc::Sender<ServerFrame>,
) -> Result<(), axum::Error> {
    if cmd.trim().is_empty() {
        return send_frame(ws_tx, &ServerFrame::error("cmd is required")).await;
    }

    let session_id = Uuid::new_v4().to_string();
    let root = state.project_root.project_root();
    let proc = match launch::launch(&cmd, cwd.as_deref(), root.as_deref()) {
        Ok(proc) => proc,
        Err(e) => {
            // Launch failures surface as an immediate exit so every started
            // ack is paired with exactly one terminal frame.
            tracing::warn!(cmd = %cmd, error = %e, "launch failed");
            send_frame(ws_tx, &ServerFrame::started(&session_id)).await?;
            return send_frame(ws_tx, &ServerFrame::exit(&session_id, -1)).await;
        }
    };

    let LaunchedProcess {
        child,
        stdin,
        stdout,
        stderr,
    } = proc;
    tracing::info!(session = %session_id, %conn, cmd = %cmd, pid = child.id(), "session started");

    let (input_tx, input_rx) = mpsc::channel::<Bytes>(STDIN_BUFFER);
    let cancelled = CancellationToken::new();

    // Register before acking so a cancel racing the ack finds the entry.
    state.sessions.insert(Session {
        id: session_id.clone(),
        command: cmd,
        pid: child.id(),
        owner: conn,
        input_tx,
        cancelled: cancelled.clone(),
    });

    tokio::spawn(pump::pump_stdin(input_rx, stdin));
    tokio::spawn(pump::pump_session(
        session_id.clone(),
        child,
        stdout,
        stderr,
        cancelled,
        out_tx.clone(),
        state.sessions.clone(),
    ));

    // Written directly, before the select loop next drains the outbound
    // channel, so the ack always precedes the session's first output frame.
    send_frame(ws_tx, &ServerFrame::started(&session_id)).await
}
