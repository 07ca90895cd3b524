//! Single-flight token refresh
//!
//! The coordinator sits between callers and [`SessionClient`]. When a request
//! comes back 401 the first caller to notice starts the one and only refresh
//! call; every other caller that hits a 401 meanwhile parks on a oneshot in
//! the pending queue. When the refresh settles the whole queue is resolved or
//! rejected at once and each caller replays its request exactly once.
//!
//! ```text
//!   IDLE --first 401--> REFRESHING --settled--> IDLE
//! ```

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::oneshot;

use crate::config::REFRESH_PATH;
use crate::error::SessionError;
use crate::fetch::{ApiRequest, Interception, SessionClient};

type Outcome = Result<(), Arc<SessionError>>;

/// Callbacks into the owner of the session, run by the caller leading a
/// refresh.
#[async_trait]
pub trait RefreshHooks: Send + Sync {
    /// Marker for the owner's session, taken before the refresh call and
    /// handed back to [`refreshed`](Self::refreshed).
    fn generation(&self) -> u64 {
        0
    }

    /// The backend accepted the refresh credential. `generation` is the
    /// value [`generation`](Self::generation) returned when the refresh
    /// started. An error here fails the refresh as a whole.
    async fn refreshed(&self, generation: u64) -> Result<(), SessionError>;

    /// The refresh failed; the session cannot be recovered.
    async fn unauthorized(&self, error: &SessionError);
}

#[derive(Debug, Default)]
struct RefreshState {
    in_flight: bool,
    pending: Vec<oneshot::Sender<Outcome>>,
}

/// Guarantees at most one refresh call at a time and replays the requests
/// that waited for it.
pub struct RefreshCoordinator {
    client: Arc<SessionClient>,
    hooks: Weak<dyn RefreshHooks>,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(client: Arc<SessionClient>, hooks: Weak<dyn RefreshHooks>) -> Self {
        Self {
            client,
            hooks,
            state: Mutex::new(RefreshState::default()),
        }
    }

    pub fn client(&self) -> &Arc<SessionClient> {
        &self.client
    }

    /// Whether a refresh call is currently in flight
    pub fn is_refreshing(&self) -> bool {
        self.lock_state().in_flight
    }

    /// Number of requests waiting for the in-flight refresh
    pub fn pending(&self) -> usize {
        self.lock_state().pending.len()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Send `request`, refreshing the session and replaying once if it comes
    /// back 401.
    pub async fn request<T: DeserializeOwned>(&self, mut request: ApiRequest) -> Result<T, SessionError> {
        let value = match self.client.send(&request).await {
            Ok(value) => value,
            Err(error) => match self.client.intercept(&request, &error) {
                Interception::PassThrough => return Err(error),
                Interception::Refresh => {
                    debug!("{} {} unauthorized, refreshing", request.method(), request.path());
                    self.refresh().await?;
                    request.mark_replayed();
                    self.client.send(&request).await?
                }
            },
        };
        Ok(serde_json::from_value(value)?)
    }

    /// Refresh the session, or wait for the refresh already in flight.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        let waiter = {
            let mut state = self.lock_state();
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.pending.push(tx);
                Some(rx)
            } else {
                state.in_flight = true;
                None
            }
        };

        match waiter {
            Some(rx) => {
                debug!("Refresh already in flight, queued");
                match rx.await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(error)) => Err(SessionError::RefreshFailed(error)),
                    Err(_) => Err(SessionError::RefreshAbandoned),
                }
            }
            None => self.lead_refresh().await,
        }
    }

    async fn lead_refresh(&self) -> Result<(), SessionError> {
        let mut guard = InFlight {
            state: &self.state,
            outcome: None,
        };

        info!("Refreshing session");
        let outcome = self.call_refresh().await.map_err(Arc::new);
        guard.settle(outcome.clone());

        match outcome {
            Ok(()) => {
                info!("Session refreshed");
                Ok(())
            }
            Err(error) => {
                warn!("Session refresh failed: {}", error);
                if let Some(hooks) = self.hooks.upgrade() {
                    hooks.unauthorized(&error).await;
                }
                Err(SessionError::RefreshFailed(error))
            }
        }
    }

    async fn call_refresh(&self) -> Result<(), SessionError> {
        let generation = self.hooks.upgrade().map(|hooks| hooks.generation());
        self.client.send(&ApiRequest::post(REFRESH_PATH)).await?;
        match (self.hooks.upgrade(), generation) {
            (Some(hooks), Some(generation)) => hooks.refreshed(generation).await,
            _ => Ok(()),
        }
    }
}

/// Marks the span of a refresh. Dropping it clears the in-flight flag and
/// releases anything still queued, with the settled outcome if there is one
/// and as abandoned otherwise.
struct InFlight<'a> {
    state: &'a Mutex<RefreshState>,
    outcome: Option<Outcome>,
}

impl InFlight<'_> {
    /// Record the outcome and release the queue; the flag stays set until
    /// the guard is dropped.
    fn settle(&mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
        let pending = std::mem::take(&mut self.lock().pending);
        self.release(pending);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self, pending: Vec<oneshot::Sender<Outcome>>) {
        if pending.is_empty() {
            return;
        }
        debug!("Releasing {} queued requests", pending.len());
        for tx in pending {
            match &self.outcome {
                // a closed receiver means its caller went away
                Some(outcome) => {
                    let _ = tx.send(outcome.clone());
                }
                None => drop(tx),
            }
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let pending = {
            let mut state = self.lock();
            state.in_flight = false;
            std::mem::take(&mut state.pending)
        };
        self.release(pending);
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("RefreshCoordinator")
            .field("base_url", &self.client.base_url())
            .field("in_flight", &state.in_flight)
            .field("pending", &state.pending.len())
            .finish()
    }
}
