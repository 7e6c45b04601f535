//! Fixed-period retry driver for reconciliation attempts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::time::MissedTickBehavior;

use super::{AttemptOutcome, Connection, Reconciler};

/// Reconciler shared between the scheduler and config reloads.
pub type SharedReconciler = Arc<Mutex<Reconciler>>;

/// Runs one attempt per tick until the first success.
///
/// A tick that finds the previous attempt still running is skipped, so at
/// most one attempt is ever in flight. There is no retry limit.
pub struct RetryScheduler {
    reconciler: SharedReconciler,
    period: Duration,
}

impl RetryScheduler {
    pub fn new(reconciler: Reconciler, period: Duration) -> Self {
        Self {
            reconciler: Arc::new(Mutex::new(reconciler)),
            period,
        }
    }

    /// Handle for applying config changes between attempts.
    pub fn handle(&self) -> SharedReconciler {
        Arc::clone(&self.reconciler)
    }

    /// Tick until an attempt connects, then run `on_connected` once and stop.
    pub async fn run<F>(self, on_connected: F) -> Connection
    where
        F: FnOnce(&Connection),
    {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let (tx, mut rx) = mpsc::channel::<AttemptOutcome>(1);
        let mut attempts: u64 = 0;

        let connection = loop {
            tokio::select! {
                biased;

                Some(outcome) = rx.recv() => match outcome {
                    Ok(connection) => break connection,
                    Err(failure) => {
                        tracing::warn!(
                            "Reconcile attempt {} failed [{}]: {}",
                            attempts,
                            failure.kind,
                            failure.diagnostic
                        );
                    }
                },

                _ = ticker.tick() => {
                    let Ok(mut guard) = Arc::clone(&self.reconciler).try_lock_owned() else {
                        tracing::debug!("Reconcile attempt {} still in flight; skipping tick", attempts);
                        continue;
                    };
                    attempts += 1;
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let outcome = guard.reconcile().await;
                        // Report before releasing the lock.
                        let _ = tx.send(outcome).await;
                        drop(guard);
                    });
                }
            }
        };

        tracing::debug!("Reconciled after {} attempt(s)", attempts);
        on_connected(&connection);
        connection
    }
}
