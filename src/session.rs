//! Live session bookkeeping.
//!
//! The [`SessionRegistry`] is the single shared mutable structure in the
//! broker: the connection task inserts on `run` and looks up on
//! `stdin`/`cancel`, each session's output pump removes its own entry after
//! the process exits, and close sweeps drain whole connections. The lock is
//! never held across an await point.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Identifies the WebSocket connection that created a session. Used only
/// for close sweeps; the registry remains the source of truth for session
/// existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One running remote command.
///
/// The process itself is owned by the session's output pump; the registry
/// entry holds what other tasks need: the stdin channel and the
/// cancellation token that force-kills the child.
#[derive(Clone)]
pub struct Session {
    /// Opaque server-generated id, never reused.
    pub id: String,
    /// Display form of the command, for logs.
    pub command: String,
    /// PID of the spawned child, when the OS reported one.
    pub pid: Option<u32>,
    /// Connection that created this session.
    pub owner: ConnectionId,
    /// Sender half of the stdin channel; a writer task owns the pipe and
    /// flushes after every chunk.
    pub input_tx: mpsc::Sender<Bytes>,
    /// Cancelled to force-kill the child. The output pump observes this,
    /// kills the process, and still emits the terminal exit frame.
    pub cancelled: CancellationToken,
}

impl Session {
    /// Force-terminate this session's process. Idempotent; the pump reaps
    /// the child and emits the exit frame exactly once regardless.
    pub fn destroy(&self) {
        self.cancelled.cancel();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("pid", &self.pid)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// Concurrent map of live sessions keyed by session id.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its id.
    ///
    /// Callers insert before sending the `started` ack, so a `cancel`
    /// racing with startup always finds a live entry once `run` has been
    /// acknowledged.
    pub fn insert(&self, session: Session) {
        self.inner.write().insert(session.id.clone(), session);
    }

    /// Look up a session by id, returning a clone if present.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.inner.read().get(id).cloned()
    }

    /// Remove a session without destroying it. The output pump calls this
    /// after the process has exited and been reaped.
    pub fn remove(&self, id: &str) -> Option<Session> {
        self.inner.write().remove(id)
    }

    /// Remove a session and force-kill its process. A no-op when the
    /// session is already gone.
    pub fn remove_and_destroy(&self, id: &str) {
        if let Some(session) = self.remove(id) {
            session.destroy();
        }
    }

    /// Atomically remove every session owned by `owner`, returning them.
    /// Used by the connection-close sweep.
    pub fn drain_connection(&self, owner: ConnectionId) -> Vec<Session> {
        let mut inner = self.inner.write();
        let mut removed = Vec::new();
        inner.retain(|_, session| {
            if session.owner == owner {
                removed.push(session.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Atomically empty the registry, returning everything that was
    /// present. Used by the administrative stop path.
    pub fn drain(&self) -> Vec<Session> {
        let mut inner = self.inner.write();
        inner.drain().map(|(_, session)| session).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session(id: &str, owner: ConnectionId) -> Session {
        let (input_tx, _input_rx) = mpsc::channel(1);
        Session {
            id: id.to_string(),
            command: "test".to_string(),
            pid: None,
            owner,
            input_tx,
            cancelled: CancellationToken::new(),
        }
    }

    #[test]
    fn insert_and_get() {
        let registry = SessionRegistry::new();
        let owner = ConnectionId::next();
        registry.insert(test_session("a", owner));

        let found = registry.get("a").unwrap();
        assert_eq!(found.id, "a");
        assert_eq!(found.owner, owner);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn remove_returns_session_once() {
        let registry = SessionRegistry::new();
        registry.insert(test_session("a", ConnectionId::next()));

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_and_destroy_cancels_token() {
        let registry = SessionRegistry::new();
        let session = test_session("a", ConnectionId::next());
        let token = session.cancelled.clone();
        registry.insert(session);

        registry.remove_and_destroy("a");
        assert!(token.is_cancelled());

        // Already gone: must not panic or error.
        registry.remove_and_destroy("a");
    }

    #[test]
    fn destroy_is_idempotent() {
        let session = test_session("a", ConnectionId::next());
        session.destroy();
        session.destroy();
        assert!(session.cancelled.is_cancelled());
    }

    #[test]
    fn drain_connection_removes_only_owned() {
        let registry = SessionRegistry::new();
        let mine = ConnectionId::next();
        let theirs = ConnectionId::next();
        registry.insert(test_session("a", mine));
        registry.insert(test_session("b", theirs));
        registry.insert(test_session("c", mine));

        let drained = registry.drain_connection(mine);
        assert_eq!(drained.len(), 2);
        assert!(registry.get("a").is_none());
        assert!(registry.get("c").is_none());
        assert!(registry.get("b").is_some());
    }

    #[test]
    fn drain_empties_everything() {
        let registry = SessionRegistry::new();
        registry.insert(test_session("a", ConnectionId::next()));
        registry.insert(test_session("b", ConnectionId::next()));

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
    }
}
