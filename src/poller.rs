//! Periodic server polling.
//!
//! [`Poller`] is the client's only source of server-driven progress: there is
//! no push channel, so lobby listings and the in-game event feed are both
//! refreshed by a recurring fetch. The schedule is self-correcting — the next
//! fetch is armed `interval` after the previous one *completes*, so a slow
//! server never causes two overlapping in-flight requests.
//!
//! A poller that hits a transport error disables itself permanently and
//! reports the error once; the owner decides whether to start a new one.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::TupeloError;

/// One message from a running [`Poller`] to its owner.
#[derive(Debug)]
pub enum PollResult<T> {
    /// A fetch completed; carries its payload.
    Fetched(T),
    /// The poller hit a transport error and has disabled itself.
    /// This is the last message the poller sends.
    Stopped(TupeloError),
}

/// A restartable, cancelable periodic fetch task.
#[derive(Debug)]
pub struct Poller {
    task: Option<JoinHandle<()>>,
}

impl Poller {
    /// Start polling: fetch immediately, then again `interval` after each
    /// completion. Results are delivered through `tx`.
    ///
    /// The task also exits quietly if the receiving side of `tx` goes away.
    pub fn start<F, Fut, T>(
        interval: Duration,
        fetch: F,
        tx: mpsc::UnboundedSender<PollResult<T>>,
    ) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TupeloError>> + Send,
        T: Send + 'static,
    {
        let task = tokio::spawn(async move {
            loop {
                match fetch().await {
                    Ok(payload) => {
                        if tx.send(PollResult::Fetched(payload)).is_err() {
                            debug!("poll receiver dropped, stopping poller");
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("poll fetch failed, disabling poller: {e}");
                        let _ = tx.send(PollResult::Stopped(e));
                        break;
                    }
                }
                tokio::time::sleep(interval).await;
            }
        });
        Self { task: Some(task) }
    }

    /// Cancel the poller, including any in-flight fetch.
    ///
    /// Safe to call redundantly; disabling an already-disabled poller is a
    /// no-op. A fetch cancelled mid-flight never delivers a result and never
    /// arms another cycle.
    pub fn disable(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether the polling task is still running.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.disable();
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn first_fetch_is_immediate() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut poller = Poller::start(Duration::from_secs(5), || async { Ok(7u32) }, tx);

        match rx.recv().await.unwrap() {
            PollResult::Fetched(v) => assert_eq!(v, 7),
            other => panic!("expected Fetched, got {other:?}"),
        }
        poller.disable();
    }

    #[tokio::test(start_paused = true)]
    async fn interval_is_measured_from_completion() {
        let starts: Arc<StdMutex<Vec<Instant>>> = Arc::new(StdMutex::new(Vec::new()));
        let recorded = Arc::clone(&starts);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut poller = Poller::start(
            Duration::from_secs(5),
            move || {
                let recorded = Arc::clone(&recorded);
                async move {
                    recorded.lock().unwrap().push(Instant::now());
                    // A slow response: 3s of server time per fetch.
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    Ok(())
                }
            },
            tx,
        );

        for _ in 0..3 {
            let _ = rx.recv().await.unwrap();
        }
        poller.disable();

        let starts = starts.lock().unwrap();
        // Each cycle takes fetch (3s) + interval (5s): starts at 0, 8, 16.
        assert!(starts.len() >= 3);
        let gap1 = starts[1] - starts[0];
        let gap2 = starts[2] - starts[1];
        assert_eq!(gap1, Duration::from_secs(8));
        assert_eq!(gap2, Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_disables_permanently() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let (tx, mut rx) = mpsc::unbounded_channel::<PollResult<u32>>();
        let poller = Poller::start(
            Duration::from_secs(1),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Ok(1)
                    } else {
                        Err(TupeloError::Transport("boom".into()))
                    }
                }
            },
            tx,
        );

        assert!(matches!(rx.recv().await.unwrap(), PollResult::Fetched(1)));
        match rx.recv().await.unwrap() {
            PollResult::Stopped(TupeloError::Transport(msg)) => assert_eq!(msg, "boom"),
            other => panic!("expected Stopped, got {other:?}"),
        }

        // No auto-retry: the task is done and nothing further arrives.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert!(!poller.is_active());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disable_mid_flight_cancels_reschedule() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let (tx, mut rx) = mpsc::unbounded_channel::<PollResult<()>>();
        let mut poller = Poller::start(
            Duration::from_millis(100),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    // Hang "in flight" until aborted.
                    std::future::pending::<()>().await;
                    Ok(())
                }
            },
            tx,
        );

        // Let the first fetch get in flight, then disable.
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        poller.disable();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no fetch after disable");
        assert!(rx.try_recv().is_err(), "cancelled fetch delivers nothing");
        assert!(!poller.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn disable_is_idempotent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut poller = Poller::start(Duration::from_secs(1), || async { Ok(()) }, tx);
        let _ = rx.recv().await;

        poller.disable();
        poller.disable(); // no-op
        assert!(!poller.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_receiver_stops_the_task() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let (tx, rx) = mpsc::unbounded_channel();
        let poller = Poller::start(
            Duration::from_millis(10),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(()) }
            },
            tx,
        );
        drop(rx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!poller.is_active());
        assert!(calls.load(Ordering::SeqCst) <= 2);
    }
}
