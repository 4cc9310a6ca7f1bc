//! One-shot close barrier shared by the two relay directions.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Guarantees a teardown runs once no matter how many paths trigger it.
///
/// The first [`fire`](CloseBarrier::fire) wins and wakes every task parked
/// in [`closed`](CloseBarrier::closed); later calls are no-ops.
#[derive(Debug)]
pub struct CloseBarrier {
    fired: AtomicBool,
    tx: watch::Sender<bool>,
}

impl CloseBarrier {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            fired: AtomicBool::new(false),
            tx,
        }
    }

    /// Trigger the barrier. Returns `true` only for the call that fired it.
    pub fn fire(&self) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.tx.send_replace(true);
            true
        } else {
            false
        }
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Resolve once the barrier has fired (immediately if it already has).
    pub async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so `wait_for` cannot observe a closed channel.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for CloseBarrier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_fires_once() {
        let barrier = CloseBarrier::new();
        assert!(!barrier.is_fired());
        assert!(barrier.fire());
        assert!(!barrier.fire());
        assert!(barrier.is_fired());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_triggers_run_one_close() {
        let barrier = Arc::new(CloseBarrier::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let barrier = barrier.clone();
            let winners = winners.clone();
            handles.push(tokio::spawn(async move {
                if barrier.fire() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_wakes_waiters() {
        let barrier = Arc::new(CloseBarrier::new());
        let waiter = {
            let barrier = barrier.clone();
            tokio::spawn(async move { barrier.closed().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        barrier.fire();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        // Late subscribers see the fired state immediately.
        tokio::time::timeout(Duration::from_millis(100), barrier.closed())
            .await
            .unwrap();
    }
}
