//! One-shot latch built on a `watch` channel.

use tokio::sync::watch;

/// Signal that starts unset and can be set exactly once.
///
/// Waiters that arrive after the latch fired return immediately.
#[derive(Debug)]
pub(crate) struct Latch {
    tx: watch::Sender<bool>,
}

impl Latch {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Set the latch. Returns `true` only for the call that set it.
    pub(crate) fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    pub(crate) fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the latch is set.
    pub(crate) async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so `wait_for` cannot fail here.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_fire_only_once() {
        let latch = Latch::new();
        assert!(!latch.is_fired());
        assert!(latch.fire());
        assert!(!latch.fire());
        assert!(latch.is_fired());
    }

    #[tokio::test]
    async fn test_wait_after_fire_returns_immediately() {
        let latch = Latch::new();
        latch.fire();
        let waited = tokio::time::timeout(Duration::from_secs(1), latch.wait()).await;
        assert!(waited.is_ok());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_fire() {
        let latch = Arc::new(Latch::new());
        let waiter = {
            let latch = Arc::clone(&latch);
            tokio::spawn(async move { latch.wait().await })
        };
        tokio::task::yield_now().await;
        latch.fire();

        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }
}
