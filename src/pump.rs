//! Per-session output pumping.
//!
//! Every session runs one pump task that reads the child's stdout and
//! stderr pipes as chunks arrive (not line-buffered, so prompts without a
//! trailing newline are forwarded promptly), merges them into one combined
//! frame stream, then reaps the process, emits the terminal `exit` frame,
//! and deregisters the session. Sessions stream independently; a slow
//! process never delays frames for another session.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::ServerFrame;
use crate::session::SessionRegistry;

const READ_BUF_SIZE: usize = 4096;

/// Drive one session's output until the process exits, then deregister it.
///
/// This is the only path, besides an explicit destroy, that retires a
/// session: it always reaps the child and always removes the registry
/// entry, even when the peer is gone. The cancellation token force-kills
/// the child; the pump then observes EOF naturally, so the `exit` frame is
/// still emitted exactly once per session no matter how it ended.
pub async fn pump_session(
    session_id: String,
    mut child: Child,
    mut stdout: ChildStdout,
    mut stderr: ChildStderr,
    cancelled: CancellationToken,
    frames: mpsc::Sender<ServerFrame>,
    sessions: SessionRegistry,
) {
    let mut stdout_buf = [0u8; READ_BUF_SIZE];
    let mut stderr_buf = [0u8; READ_BUF_SIZE];
    let mut stdout_open = true;
    let mut stderr_open = true;
    // Once the outbound channel is gone the peer is presumed dead: output
    // is discarded from then on but the process is still drained and reaped.
    let mut peer_gone = false;
    let mut killed = false;

    while stdout_open || stderr_open {
        tokio::select! {
            read = stdout.read(&mut stdout_buf), if stdout_open => {
                match read {
                    Ok(0) | Err(_) => stdout_open = false,
                    Ok(n) => {
                        forward(&frames, &session_id, &stdout_buf[..n], &mut peer_gone).await;
                        if peer_gone && !killed {
                            kill(&session_id, &mut child, &mut killed);
                        }
                    }
                }
            }
            read = stderr.read(&mut stderr_buf), if stderr_open => {
                match read {
                    Ok(0) | Err(_) => stderr_open = false,
                    Ok(n) => {
                        forward(&frames, &session_id, &stderr_buf[..n], &mut peer_gone).await;
                        if peer_gone && !killed {
                            kill(&session_id, &mut child, &mut killed);
                        }
                    }
                }
            }
            _ = cancelled.cancelled(), if !killed => {
                kill(&session_id, &mut child, &mut killed);
            }
        }
    }

    let code = match child.wait().await {
        Ok(status) => status.code().unwrap_or(-1),
        Err(e) => {
            tracing::warn!(session = %session_id, error = %e, "failed to reap child");
            -1
        }
    };

    if !peer_gone {
        let _ = frames.send(ServerFrame::exit(&session_id, code)).await;
    }
    sessions.remove(&session_id);
    tracing::debug!(session = %session_id, code, "session ended");
}

/// Forward typed stdin to the child. Data is written verbatim and flushed
/// after every chunk; the server never injects line terminators. Ends when
/// the session is dropped from the registry (channel closed) or the pipe
/// breaks.
pub async fn pump_stdin(mut input: mpsc::Receiver<bytes::Bytes>, mut stdin: ChildStdin) {
    while let Some(data) = input.recv().await {
        if stdin.write_all(&data).await.is_err() {
            break;
        }
        if stdin.flush().await.is_err() {
            break;
        }
    }
}

async fn forward(
    frames: &mpsc::Sender<ServerFrame>,
    session_id: &str,
    chunk: &[u8],
    peer_gone: &mut bool,
) {
    if *peer_gone {
        return;
    }
    let frame = ServerFrame::output(session_id, String::from_utf8_lossy(chunk).into_owned());
    if frames.send(frame).await.is_err() {
        tracing::debug!(session = %session_id, "peer gone, discarding further output");
        *peer_gone = true;
    }
}

fn kill(session_id: &str, child: &mut Child, killed: &mut bool) {
    *killed = true;
    if let Err(e) = child.start_kill() {
        tracing::debug!(session = %session_id, error = %e, "kill failed, process already gone");
    }
}
