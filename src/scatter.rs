//! Concurrent scatter-gather over remote targets.
//!
//! [`scatter_gather`] asks every target the same question on its own task and
//! collects exactly one tagged answer per target. A target that errors, times
//! out or panics yields a failed [`Gathered`] entry; it never stops the others
//! from being collected. Deciding whether a failure matters is left to the
//! caller, see [`first_error`] for the common "any failure fails the whole
//! aggregation" policy.

use crate::error::{CairnError, Result};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One target's answer, tagged with the target it came from.
#[derive(Debug)]
pub struct Gathered<K, T> {
    pub target: K,
    pub result: Result<T>,
}

impl<K, T> Gathered<K, T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Query every target concurrently and wait for all of them.
///
/// Results come back in arrival order, not submission order; callers must key
/// them by [`Gathered::target`]. Each query is bounded by `timeout`, and a
/// timed-out query is reported as [`CairnError::Timeout`].
pub async fn scatter_gather<K, T, F, Fut>(
    targets: Vec<K>,
    timeout: Duration,
    query: F,
) -> Vec<Gathered<K, T>>
where
    K: Clone + Send + 'static,
    T: Send + 'static,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let expected = targets.len();
    if expected == 0 {
        return Vec::new();
    }

    let (tx, mut rx) = mpsc::channel(expected);

    for target in targets {
        let tx = tx.clone();
        let call = query(target.clone());
        tokio::spawn(async move {
            let result = match AssertUnwindSafe(tokio::time::timeout(timeout, call))
                .catch_unwind()
                .await
            {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(CairnError::Timeout(timeout.as_millis() as u64)),
                Err(_) => Err(CairnError::Internal("query task panicked".to_string())),
            };
            // The receiver only goes away when the gathering future is dropped.
            let _ = tx.send(Gathered { target, result }).await;
        });
    }
    drop(tx);

    let mut gathered = Vec::with_capacity(expected);
    while gathered.len() < expected {
        match rx.recv().await {
            Some(answer) => gathered.push(answer),
            None => {
                warn!(
                    expected,
                    received = gathered.len(),
                    "Scatter-gather workers exited without answering"
                );
                break;
            }
        }
    }

    debug!(
        targets = expected,
        failed = gathered.iter().filter(|g| !g.is_ok()).count(),
        "Scatter-gather complete"
    );
    gathered
}

/// Collapse gathered results, failing with the first error encountered.
pub fn first_error<K, T>(gathered: Vec<Gathered<K, T>>) -> Result<Vec<(K, T)>> {
    gathered
        .into_iter()
        .map(|g| g.result.map(|value| (g.target, value)))
        .collect()
}
