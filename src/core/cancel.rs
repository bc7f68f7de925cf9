//! Cooperative cancellation for in-flight dispatches

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared cancellation flag
///
/// Clones observe the same flag. `cancelled()` resolves once `cancel()` has
/// been called on any clone, including calls made before it was awaited.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Wait until cancellation is requested
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent cancel() is not missed
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_before_wait_resolves() {
        let flag = CancelFlag::new();
        flag.cancel();
        tokio::time::timeout(Duration::from_millis(100), flag.cancelled())
            .await
            .expect("already cancelled flag should resolve");
    }

    #[tokio::test]
    async fn test_cancel_from_clone_wakes_waiter() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        let waiter = tokio::spawn(async move { flag.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        other.cancel();
        tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(other.is_cancelled());
    }
}
