/// Shared token refresh coordination
///
/// At most one refresh call is in flight at any time. Requests that hit a
/// 401 while it runs are parked as `PendingRetry` records, in arrival order,
/// and are settled by whoever owns the `RefreshGuard`.

use std::sync::{Mutex, MutexGuard};

use reqwest::Response;
use tokio::sync::oneshot;

use crate::client::request::ApiRequest;
use crate::error::ApiError;
use crate::session::{CredentialStore, Credentials};

pub(crate) type Outcome = Result<Response, ApiError>;

/// A request parked behind the in-flight refresh
pub(crate) struct PendingRetry {
    pub request: ApiRequest,
    completion: oneshot::Sender<Outcome>,
}

impl PendingRetry {
    /// The waiting caller gave up (timed out or was dropped)
    pub fn is_abandoned(&self) -> bool {
        self.completion.is_closed()
    }

    pub fn complete(self, outcome: Outcome) {
        if self.completion.send(outcome).is_err() {
            tracing::debug!(
                request_id = %self.request.request_id,
                "Queued request was abandoned before completion"
            );
        }
    }
}

/// What a request that hit a 401 should do next
pub(crate) enum Ticket<'a> {
    /// This request performs the refresh
    Refresh {
        guard: RefreshGuard<'a>,
        request: ApiRequest,
        credentials: Credentials,
        refresh_token: String,
    },
    /// Another request is refreshing; wait for its outcome
    Queued(oneshot::Receiver<Outcome>),
    /// The token changed after this request was sent; replay right away
    Replay(ApiRequest),
    /// Nothing to refresh with
    NoRefreshToken(ApiRequest),
}

#[derive(Default)]
struct RefreshState {
    in_progress: bool,
    pending: Vec<PendingRetry>,
}

#[derive(Default)]
pub(crate) struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn in_progress(&self) -> bool {
        self.lock().in_progress
    }

    /// Decide the fate of a request that was answered with 401.
    ///
    /// The flag check, the stale-token check, the refresh token read and
    /// setting the flag all happen under one lock.
    pub fn join(&self, request: ApiRequest, store: &dyn CredentialStore) -> Result<Ticket<'_>, ApiError> {
        let mut state = self.lock();

        if state.in_progress {
            let (completion, waiter) = oneshot::channel();
            tracing::debug!(
                request_id = %request.request_id,
                position = state.pending.len(),
                "Request queued behind token refresh"
            );
            state.pending.push(PendingRetry { request, completion });
            return Ok(Ticket::Queued(waiter));
        }

        match store.load()? {
            Some(current) if request.sent_token.as_deref() != Some(current.access_token.as_str()) => {
                Ok(Ticket::Replay(request))
            }
            Some(current) => match current.refresh_token.clone() {
                Some(refresh_token) => {
                    state.in_progress = true;
                    Ok(Ticket::Refresh {
                        guard: RefreshGuard {
                            coordinator: self,
                            settled: false,
                        },
                        request,
                        credentials: current,
                        refresh_token,
                    })
                }
                None => Ok(Ticket::NoRefreshToken(request)),
            },
            None => Ok(Ticket::NoRefreshToken(request)),
        }
    }

    fn finish(&self) -> Vec<PendingRetry> {
        let mut state = self.lock();
        state.in_progress = false;
        std::mem::take(&mut state.pending)
    }
}

/// Ownership of the in-flight refresh
///
/// Dropping it without `settle` (the refreshing caller was cancelled) still
/// clears the flag and fails every queued request with `ApiError::Cancelled`.
pub(crate) struct RefreshGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl RefreshGuard<'_> {
    /// Clear the in-progress flag and take the queue, in arrival order
    pub fn settle(mut self) -> Vec<PendingRetry> {
        self.settled = true;
        self.coordinator.finish()
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let pending = self.coordinator.finish();
        tracing::warn!(queued = pending.len(), "Token refresh abandoned");
        for retry in pending {
            retry.complete(Err(ApiError::Cancelled));
        }
    }
}
