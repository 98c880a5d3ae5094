use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SPIN_DELAY: Duration = Duration::from_micros(10);

/// A cheap, shareable boolean the listener flips on entering its poll loop
/// and clears on leaving it. Single-writer (the listener), multi-reader
/// (every caller wanting to know whether anyone is listening) — no lock is
/// needed for a word-sized flag.
#[derive(Clone, Default)]
pub struct ListeningFlag(Arc<AtomicBool>);

impl ListeningFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_listening(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, listening: bool) {
        self.0.store(listening, Ordering::Release);
    }

    /// Spin until the flag is set, or `still_alive` reports the worker has
    /// exited without ever having listened. `still_alive` is polled between
    /// spins; pass `|| true` when there is no worker handle to check.
    pub async fn wait_until_listening(&self, mut still_alive: impl FnMut() -> bool) -> Result<(), WorkerExitedBeforeListen> {
        loop {
            if self.is_listening() {
                return Ok(());
            }
            if !still_alive() {
                return Err(WorkerExitedBeforeListen);
            }
            tokio::time::sleep(SPIN_DELAY).await;
        }
    }
}

/// `wait_until_listening` observed the worker exit without ever marking
/// itself as listening.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("worker exited before it ever started listening")]
pub struct WorkerExitedBeforeListen;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_once_set() {
        let flag = ListeningFlag::new();
        let waiter = flag.clone();
        let handle = tokio::spawn(async move { waiter.wait_until_listening(|| true).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        flag.set(true);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn wait_fails_if_worker_already_gone() {
        let flag = ListeningFlag::new();
        let err = flag.wait_until_listening(|| false).await.unwrap_err();
        assert_eq!(err, WorkerExitedBeforeListen);
    }
}
