//! JSON wire protocol for the terminal WebSocket.
//!
//! Frames are JSON text messages tagged by a `type` field. Clients send
//! `run`/`stdin`/`cancel`; the server answers with `started`, a stream of
//! `output` frames, exactly one terminal `exit` per session, and `error`
//! for frames it cannot understand.

use serde::{Deserialize, Serialize};

/// Client -> server frames on `/ws/terminal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Start a new session running `cmd`, optionally in `cwd`.
    Run {
        cmd: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
    },
    /// Forward bytes to a session's stdin, verbatim (no newline injection).
    Stdin {
        #[serde(rename = "sessionId")]
        session_id: String,
        data: String,
    },
    /// Force-terminate a session.
    Cancel {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

impl ClientFrame {
    /// Parse an inbound text frame. Malformed JSON and unknown `type`
    /// values both surface here; callers answer with an `error` frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Server -> client frames.
///
/// `output` and `exit` always carry `sessionId` so a client can multiplex
/// any number of concurrent sessions over one socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Acknowledges a `run`; every later frame for the session carries this id.
    Started {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// One chunk of the session's combined stdout/stderr stream.
    Output {
        #[serde(rename = "sessionId")]
        session_id: String,
        data: String,
    },
    /// Terminal event, exactly once per session. `code` is the
    /// string-encoded exit code, `"-1"` when the OS reports none.
    Exit {
        #[serde(rename = "sessionId")]
        session_id: String,
        code: String,
    },
    /// Answer to a malformed or unknown frame. Does not close the socket.
    Error { message: String },
}

impl ServerFrame {
    pub fn started(session_id: &str) -> Self {
        Self::Started {
            session_id: session_id.to_string(),
        }
    }

    pub fn output(session_id: &str, data: impl Into<String>) -> Self {
        Self::Output {
            session_id: session_id.to_string(),
            data: data.into(),
        }
    }

    pub fn exit(session_id: &str, code: i32) -> Self {
        Self::Exit {
            session_id: session_id.to_string(),
            code: code.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
