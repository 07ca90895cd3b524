//! Session state: login, logout, startup check and proactive refresh

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, trace, warn};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::channel::{AuthChannel, AuthEvent, ChannelMessage};
use crate::config::{AuthOptions, LOGIN_PATH, LOGOUT_PATH, ME_PATH, VERIFY_PATH};
use crate::error::SessionError;
use crate::fetch::{ApiRequest, Envelope, SessionClient};
use crate::navigation::{Navigator, Route};
use crate::refresh::{RefreshCoordinator, RefreshHooks};
use crate::scheduler::RefreshTimer;
use crate::session::Session;

const CHANGE_PASSWORD_PATH: &str = "/user/change-password";

#[derive(Debug, Serialize)]
struct LoginCredentials<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordChange<'a> {
    old_password: &'a str,
    password: &'a str,
    confirm_password: &'a str,
}

/// Owner of the in-memory session.
///
/// Cloning is cheap and every clone is the same tab: they share the session,
/// the refresh timer and the coordinator.
#[derive(Clone)]
pub struct Auth {
    inner: Arc<AuthInner>,
}

struct AuthInner {
    tab_id: Uuid,
    options: AuthOptions,
    client: Arc<SessionClient>,
    coordinator: Arc<RefreshCoordinator>,
    session: watch::Sender<Option<Session>>,
    /// Bumped on every login, logout and startup check; a refresh only
    /// installs its result if the count is unchanged since it started.
    generation: Mutex<u64>,
    timer: RefreshTimer,
    navigator: Arc<dyn Navigator>,
    channel: Option<Arc<dyn AuthChannel>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    me: Weak<AuthInner>,
}

impl Auth {
    /// Create a standalone tab without cross-tab notifications
    pub fn new(client: SessionClient, navigator: Arc<dyn Navigator>) -> Self {
        Self::with_channel(client, navigator, None)
    }

    /// Create a tab that shares logouts over `channel`.
    ///
    /// The channel is subscribed immediately; if that fails the tab runs
    /// standalone.
    pub fn with_channel(
        client: SessionClient,
        navigator: Arc<dyn Navigator>,
        channel: Option<Arc<dyn AuthChannel>>,
    ) -> Self {
        let client = Arc::new(client);
        let options = client.options().clone();

        let inner = Arc::new_cyclic(|me: &Weak<AuthInner>| {
            let hooks: Weak<dyn RefreshHooks> = me.clone();
            AuthInner {
                tab_id: Uuid::new_v4(),
                options,
                coordinator: Arc::new(RefreshCoordinator::new(client.clone(), hooks)),
                client,
                session: watch::channel(None).0,
                generation: Mutex::new(0),
                timer: RefreshTimer::new(),
                navigator,
                channel,
                listener: Mutex::new(None),
                me: me.clone(),
            }
        });
        inner.listen();

        Self { inner }
    }

    /// Identifier of this tab on the broadcast channel
    pub fn tab_id(&self) -> Uuid {
        self.inner.tab_id
    }

    /// The coordinator every authorized request goes through
    pub fn coordinator(&self) -> Arc<RefreshCoordinator> {
        self.inner.coordinator.clone()
    }

    pub fn client(&self) -> Arc<SessionClient> {
        self.inner.client.clone()
    }

    /// The current session, if any
    pub fn session(&self) -> Option<Session> {
        self.inner.current()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.session.borrow().is_some()
    }

    /// Receiver notified on every session change
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.inner.session.subscribe()
    }

    /// Whether a proactive refresh is armed and has not fired yet
    pub fn is_refresh_scheduled(&self) -> bool {
        self.inner.timer.is_armed()
    }

    /// When the proactive refresh is due, if one is armed
    pub fn refresh_scheduled_at(&self) -> Option<Instant> {
        self.inner.timer.deadline()
    }

    /// Verify the cookie session at startup.
    ///
    /// This is the only way a session comes into existence without a login;
    /// any failure leaves the tab unauthenticated.
    pub async fn check_session_on_startup(&self) -> Option<Session> {
        self.inner.check_session().await
    }

    /// Sign in with a username or email and a password
    pub async fn login(&self, identifier: &str, password: &str) -> Result<Session, SessionError> {
        self.inner.login(identifier, password).await
    }

    /// Sign out. Never fails: the logout call is best-effort and local state
    /// is always cleared.
    pub async fn logout(&self) {
        self.inner.logout().await
    }

    /// Refresh the session now, sharing any refresh already in flight
    pub async fn refresh(&self) -> Result<Session, SessionError> {
        self.inner.coordinator.refresh().await?;
        self.session().ok_or(SessionError::MissingSession)
    }

    /// Change the signed-in user's password
    pub async fn change_password(
        &self,
        old_password: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<Value, SessionError> {
        let request = ApiRequest::patch(CHANGE_PASSWORD_PATH).json(&PasswordChange {
            old_password,
            password,
            confirm_password,
        })?;
        self.inner.coordinator.request(request).await
    }

    /// Apply a message received on the broadcast channel, returning whether
    /// it changed anything
    pub fn handle_channel_message(&self, message: &ChannelMessage) -> bool {
        self.inner.on_channel_message(message)
    }
}

impl AuthInner {
    fn current(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    fn navigate(&self, route: Route) {
        let path = match route {
            Route::SignIn => &self.options.sign_in_route,
            Route::Dashboard => &self.options.dashboard_route,
        };
        self.navigator.navigate(route, path);
    }

    fn lock_generation(&self) -> std::sync::MutexGuard<'_, u64> {
        self.generation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install or clear the session, starting a new generation. Installing
    /// re-arms the refresh timer for the new expiry; clearing cancels it.
    fn replace_session(&self, session: Option<Session>) {
        let mut generation = self.lock_generation();
        *generation += 1;
        self.apply_session(session);
    }

    /// Install a refreshed session unless a login, logout or startup check
    /// happened since `seen` was taken
    fn install_refreshed(&self, seen: u64, session: Session) -> bool {
        let generation = self.lock_generation();
        if *generation != seen {
            return false;
        }
        self.apply_session(Some(session));
        true
    }

    fn apply_session(&self, session: Option<Session>) {
        match &session {
            Some(session) if self.options.auto_refresh_token => self.schedule_refresh(session),
            Some(_) => {}
            None => {
                self.timer.cancel();
            }
        }
        self.session.send_replace(session);
    }

    fn schedule_refresh(&self, session: &Session) {
        let delay = session.refresh_delay(
            Utc::now(),
            self.options.refresh_margin,
            self.options.refresh_floor,
        );
        info!("Setting token refresh in {} seconds", delay.as_secs());

        let me = self.me.clone();
        self.timer.arm(delay, async move {
            let Some(inner) = me.upgrade() else {
                return;
            };
            // failure has already logged the tab out through the hooks
            if let Err(error) = inner.coordinator.refresh().await {
                warn!("Proactive refresh failed: {}", error);
            }
        });
    }

    async fn fetch_identity(&self) -> Result<Option<Session>, SessionError> {
        let response: Envelope<Option<Session>> =
            self.coordinator.request(ApiRequest::get(ME_PATH)).await?;
        Ok(response.data)
    }

    async fn check_session(&self) -> Option<Session> {
        let verified = match self.coordinator.request::<Value>(ApiRequest::get(VERIFY_PATH)).await {
            Ok(body) => is_verified(&body),
            Err(error) => {
                warn!("Auth check failed: {}", error);
                false
            }
        };

        let session = if verified {
            match self.fetch_identity().await {
                Ok(session) => session,
                Err(error) => {
                    warn!("Auth check failed: {}", error);
                    None
                }
            }
        } else {
            None
        };

        debug!("Startup session check: authenticated = {}", session.is_some());
        self.replace_session(session.clone());
        session
    }

    async fn login(&self, identifier: &str, password: &str) -> Result<Session, SessionError> {
        let request = ApiRequest::post(LOGIN_PATH).json(&LoginCredentials {
            identifier,
            password,
        })?;

        let response: Envelope<Option<Value>> = match self.coordinator.request(request).await {
            Ok(response) => response,
            Err(error) => {
                warn!("Login failed: {}", error);
                return Err(error);
            }
        };

        // token fields in the body are not part of Session and are dropped here
        let session = match response.data.and_then(|data| serde_json::from_value::<Session>(data).ok()) {
            Some(session) => session,
            None => self
                .fetch_identity()
                .await?
                .ok_or(SessionError::MissingSession)?,
        };

        info!("Logged in as {}", session.username);
        self.replace_session(Some(session.clone()));
        self.navigate(Route::Dashboard);
        Ok(session)
    }

    async fn logout(&self) {
        self.timer.cancel();

        if let Err(error) = self.coordinator.request::<Value>(ApiRequest::post(LOGOUT_PATH)).await {
            warn!("Logout error: {}", error);
        }

        self.replace_session(None);
        self.broadcast(AuthEvent::Logout);
        self.navigate(Route::SignIn);
    }

    fn broadcast(&self, event: AuthEvent) {
        let Some(channel) = &self.channel else {
            trace!("No broadcast channel, {} stays local", event);
            return;
        };
        let message = ChannelMessage {
            origin: self.tab_id,
            event,
        };
        if let Err(error) = channel.post(message) {
            warn!("BroadcastChannel error: {}", error);
        }
    }

    fn listen(&self) {
        let Some(channel) = &self.channel else {
            return;
        };
        let mut receiver = match channel.subscribe() {
            Ok(receiver) => receiver,
            Err(error) => {
                warn!("BroadcastChannel not supported: {}", error);
                return;
            }
        };
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime, cross-tab logout disabled");
            return;
        };

        let me = self.me.clone();
        let listener = runtime.spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => match me.upgrade() {
                        Some(inner) => {
                            inner.on_channel_message(&message);
                        }
                        None => break,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Auth channel lagged, {} messages skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        *self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(listener);
    }

    fn on_channel_message(&self, message: &ChannelMessage) -> bool {
        if message.origin == self.tab_id {
            trace!("Ignoring own {} message", message.event);
            return false;
        }
        match message.event {
            AuthEvent::Logout => {
                info!("Logout received from another tab");
                self.replace_session(None);
                self.navigate(Route::SignIn);
                true
            }
        }
    }
}

#[async_trait]
impl RefreshHooks for AuthInner {
    fn generation(&self) -> u64 {
        *self.lock_generation()
    }

    async fn refreshed(&self, generation: u64) -> Result<(), SessionError> {
        // sent directly: a 401 here must not queue behind the refresh in flight
        let response: Envelope<Option<Session>> =
            self.client.send_json(&ApiRequest::get(ME_PATH)).await?;
        let session = response.data.ok_or(SessionError::MissingSession)?;
        if !self.install_refreshed(generation, session) {
            debug!("Session ended while refreshing, discarding refreshed identity");
        }
        Ok(())
    }

    async fn unauthorized(&self, error: &SessionError) {
        if self.current().is_some() {
            warn!("Session could not be refreshed ({}), logging out", error);
            self.logout().await;
        } else {
            debug!("Refresh failed without a session: {}", error);
        }
    }
}

impl Drop for AuthInner {
    fn drop(&mut self) {
        if let Some(listener) = self
            .listener
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            listener.abort();
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("tab_id", &self.inner.tab_id)
            .field("session", &*self.inner.session.borrow())
            .field("coordinator", &self.inner.coordinator)
            .finish()
    }
}

/// Whether the verify endpoint vouched for the session
fn is_verified(body: &Value) -> bool {
    match body {
        Value::Null | Value::Bool(false) => false,
        Value::Object(map) => !matches!(map.get("valid"), Some(Value::Bool(false))),
        _ => true,
    }
}
