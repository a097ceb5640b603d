use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub(crate) fn semaphore(width: usize) -> Arc<Semaphore> {
    Arc::new(Semaphore::new(width.clamp(1, Semaphore::MAX_PERMITS)))
}

/// Wait for a free slot. `None` once the token is cancelled.
pub(crate) async fn acquire(
    sem: &Arc<Semaphore>,
    cancel: &CancellationToken,
) -> Option<OwnedSemaphorePermit> {
    if cancel.is_cancelled() {
        return None;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = sem.clone().acquire_owned() => permit.ok(),
    }
}

/// Wait for every task in `set`.
///
/// On cancellation the remaining tasks are detached: they run to completion or
/// timeout on their own while the caller returns with what has been recorded so far.
/// A panicking task is logged and does not affect its siblings.
pub(crate) async fn drain(set: &mut JoinSet<()>, cancel: &CancellationToken, stage: &str) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if !set.is_empty() {
                    warn!(stage, in_flight = set.len(), "interrupted, returning partial results");
                }
                set.detach_all();
                return;
            }
            res = set.join_next() => match res {
                None => return,
                Some(Err(e)) => warn!(stage, error = %e, "worker task failed"),
                Some(Ok(())) => {}
            },
        }
    }
}
