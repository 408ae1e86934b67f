//! Coordinated shutdown signaling.

use tokio::sync::watch;

/// Broadcasts the administrative stop signal to every connection handler.
///
/// Handlers add a subscribed receiver to their select loops; when
/// `shutdown()` fires they flush a close frame and sweep their sessions
/// before the listener is released.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();
        assert!(!coordinator.is_shutdown());

        coordinator.shutdown();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(coordinator.is_shutdown());
    }

    #[tokio::test]
    async fn late_subscribers_see_current_state() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.shutdown();

        let rx = coordinator.subscribe();
        assert!(*rx.borrow());
    }
}
