//! # Fan-out
//!
//! Scatter/gather over collaborator calls with a per-task timeout and a
//! caller cancellation signal.
//!
//! ```text
//! tasks ─► JoinSet (each wrapped in timeout) ─► join barrier ─► outcomes in input order
//!                         ▲
//!              cancel ────┘ (aborts everything, no partial results)
//! ```

use crate::error::{ContractError, ContractResult};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

// ============================================================================
// Cancellation
// ============================================================================

/// Caller side of a cancellation signal
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Worker side of a cancellation signal
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

/// Create a linked handle/signal pair
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, Cancellation { rx })
}

impl Cancellation {
    /// A signal that never fires
    pub fn never() -> Self {
        cancellation().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; pends forever if the handle is dropped first
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

// ============================================================================
// Gather
// ============================================================================

/// What became of one scattered task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    Completed(T),
    Failed(String),
    TimedOut,
    Panicked(String),
}

/// Aborts the inner task when the wrapper task is dropped or aborted
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run `tasks` concurrently and wait for all of them (join barrier).
///
/// Each task gets `timeout`; a slow task becomes `TimedOut` without
/// holding up the rest past its deadline. Outcomes are returned in input
/// order. If `cancel` fires before the barrier, every task is aborted and
/// the call fails with `Cancelled`.
pub async fn gather<K, T, F>(
    tasks: Vec<(K, F)>,
    timeout: Duration,
    cancel: &Cancellation,
) -> ContractResult<Vec<(K, TaskOutcome<T>)>>
where
    T: Send + 'static,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(ContractError::Cancelled);
    }

    let total = tasks.len();
    let mut keys = Vec::with_capacity(total);
    let mut slots: Vec<Option<TaskOutcome<T>>> = (0..total).map(|_| None).collect();
    let mut join_set = JoinSet::new();

    // SCATTER
    for (index, (key, task)) in tasks.into_iter().enumerate() {
        keys.push(key);
        join_set.spawn(async move {
            let mut inner = AbortOnDrop(tokio::spawn(task));
            let outcome = match tokio::time::timeout(timeout, &mut inner.0).await {
                Ok(Ok(Ok(value))) => TaskOutcome::Completed(value),
                Ok(Ok(Err(e))) => TaskOutcome::Failed(format!("{:#}", e)),
                Ok(Err(e)) => TaskOutcome::Panicked(e.to_string()),
                Err(_) => TaskOutcome::TimedOut,
            };
            (index, outcome)
        });
    }

    // GATHER
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                join_set.abort_all();
                tracing::info!(total, "Fan-out cancelled before join barrier");
                return Err(ContractError::Cancelled);
            }
            next = join_set.join_next() => match next {
                Some(Ok((index, outcome))) => slots[index] = Some(outcome),
                Some(Err(e)) => tracing::warn!(error = %e, "Fan-out task aborted"),
                None => break,
            },
        }
    }

    Ok(keys
        .into_iter()
        .zip(slots)
        .map(|(key, slot)| {
            let outcome = slot.unwrap_or_else(|| TaskOutcome::Panicked("task did not report".into()));
            (key, outcome)
        })
        .collect())
}
