//! Single-flight token refresh.
//!
//! When many requests fail with 401 at once, only the first starts a refresh
//! episode; the rest await the same outcome. The episode runs on its own task,
//! so a caller timing out or being dropped never cancels it, and the slot is
//! emptied as soon as it settles so a later 401 starts a fresh episode.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};

/// How a refresh episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Fresh tokens are stored, either by this episode or by one that finished
    /// after the failing request was sent.
    Refreshed,
    /// No refresh token was stored.
    NoRefreshToken,
    /// The refresh endpoint answered with this non-2xx status.
    Rejected(u16),
    /// Transport failure, malformed response, or storage failure.
    Failed,
    /// The tokens the request was sent with are already gone: the session was
    /// ended elsewhere (logout or an earlier failed refresh).
    SessionCleared,
}

impl RefreshOutcome {
    pub fn is_refreshed(self) -> bool {
        self == RefreshOutcome::Refreshed
    }

    /// Whether this episode has to end the session. A session that is already
    /// cleared has been dealt with.
    pub fn ends_session(self) -> bool {
        matches!(
            self,
            RefreshOutcome::NoRefreshToken | RefreshOutcome::Rejected(_) | RefreshOutcome::Failed
        )
    }
}

type SharedOutcome = Shared<BoxFuture<'static, RefreshOutcome>>;

struct Episode {
    id: u64,
    outcome: SharedOutcome,
}

/// Holds at most one in-flight refresh per client.
#[derive(Clone, Default)]
pub struct RefreshCoordinator {
    in_flight: Arc<Mutex<Option<Episode>>>,
    next_id: Arc<AtomicU64>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_refreshing(&self) -> bool {
        lock(&self.in_flight).is_some()
    }

    /// Awaits the in-flight episode, or starts one with `start` if there is
    /// none. `start` is only called when a new episode begins.
    pub async fn join_or_start<F, Fut>(&self, start: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome> + Send + 'static,
    {
        let outcome = {
            let mut slot = lock(&self.in_flight);
            match slot.as_ref() {
                Some(episode) => {
                    debug!(episode = episode.id, "Joining in-flight token refresh");
                    episode.outcome.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    debug!(episode = id, "Starting token refresh");

                    let in_flight = Arc::clone(&self.in_flight);
                    let refresh = start();
                    // The slot lock is still held here, so the task cannot
                    // clear it before the episode is published below.
                    let task = tokio::spawn(async move {
                        let outcome = refresh.await;
                        let mut slot = lock(&in_flight);
                        if slot.as_ref().is_some_and(|episode| episode.id == id) {
                            *slot = None;
                        }
                        outcome
                    });

                    let outcome = async move {
                        task.await.unwrap_or_else(|e| {
                            error!(episode = id, error = %e, "Token refresh task failed");
                            RefreshOutcome::Failed
                        })
                    }
                    .boxed()
                    .shared();

                    *slot = Some(Episode {
                        id,
                        outcome: outcome.clone(),
                    });
                    outcome
                }
            }
        };

        outcome.await
    }
}

fn lock(slot: &Mutex<Option<Episode>>) -> MutexGuard<'_, Option<Episode>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
