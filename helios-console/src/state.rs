//! Shared state primitives
//!
//! - `Shared<T>`: the lock-protected state every component hands around
//! - `CancelSource` / `CancelToken`: lifetime of deferred continuations.
//!   A continuation holding a token stops as soon as its owner cancels
//!   or is dropped.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Owner side of a cancellation scope. Dropping it cancels every token.
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken { rx: self.tx.subscribe() }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CancelSource {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Continuation side of a cancellation scope
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        // A closed channel means the owner is gone
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the owner cancels or goes away
    pub async fn cancelled(&mut self) {
        // wait_for errors only when the sender is dropped, which also counts
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Sleeps for `duration` unless cancelled first. Returns `false` when cancelled.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancelled() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_when_not_cancelled() {
        let source = CancelSource::new();
        let mut token = source.token();
        assert!(token.sleep(Duration::from_secs(3)).await);
        assert!(!token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let source = CancelSource::new();
        let mut token = source.token();

        let sleeper = tokio::spawn(async move { token.sleep(Duration::from_secs(60)).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        source.cancel();

        assert!(!sleeper.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_source_cancels_tokens() {
        let source = CancelSource::new();
        let mut token = source.token();
        drop(source);

        assert!(token.is_cancelled());
        assert!(!token.sleep(Duration::from_secs(1)).await);
    }
}
