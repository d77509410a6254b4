//! Cooperative cancellation handle shared by the tasks of a run.

use std::sync::Arc;

use tokio::sync::watch::{Sender, channel};

/// A clonable cancellation flag.
///
/// Tasks receive a clone and may poll [`CancelHandle::is_cancelled`] or await
/// [`CancelHandle::cancelled`]. The runner never fires it on its own.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<Sender<bool>>,
    cancellable: bool,
}

impl CancelHandle {
    /// Create a handle that can be cancelled.
    pub fn new() -> Self {
        let (sender, _receiver) = channel(false);
        Self {
            sender: Arc::new(sender),
            cancellable: true,
        }
    }

    /// Create a handle that is never cancelled.
    pub fn background() -> Self {
        Self {
            cancellable: false,
            ..Self::new()
        }
    }

    /// Whether this handle can ever fire.
    pub fn is_cancellable(&self) -> bool {
        self.cancellable
    }

    /// Signal cancellation to every clone. No-op on a background handle.
    pub fn cancel(&self) {
        if self.cancellable {
            self.sender.send_replace(true);
        }
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once the handle is cancelled. Never resolves for a background handle.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so `wait_for` cannot observe a closed channel.
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            tracing::warn!("cancellation channel closed unexpectedly");
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_cancel_reaches_clones() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());

        let waiter = tokio::spawn(async move { clone.cancelled().await });
        handle.cancel();

        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish after cancel")
            .expect("waiter task should not panic");
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_already_cancelled() {
        let handle = CancelHandle::new();
        handle.cancel();
        timeout(Duration::from_millis(100), handle.cancelled())
            .await
            .expect("already-cancelled handle should resolve");
    }

    #[tokio::test]
    async fn test_background_handle_never_fires() {
        let handle = CancelHandle::background();
        handle.cancel();
        assert!(!handle.is_cancelled());
        assert!(!handle.is_cancellable());
        assert!(
            timeout(Duration::from_millis(50), handle.cancelled())
                .await
                .is_err()
        );
    }
}
