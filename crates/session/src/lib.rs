//! Session lifecycle for the ISP admin portal
//!
//! This crate keeps an admin dashboard signed in against its REST backend:
//! credentials travel as cookies, an expiring access credential is refreshed
//! ahead of time, concurrent requests that hit a 401 share a single refresh
//! call, and a logout in one tab signs out every other tab on the same
//! broadcast hub.
//!
//! ```no_run
//! use std::sync::Arc;
//! use portal_session::{Auth, AuthChannel, AuthOptions, BroadcastHub, LogNavigator, SessionClient};
//!
//! # async fn run() -> Result<(), portal_session::SessionError> {
//! let hub = BroadcastHub::new();
//! let options = AuthOptions::default();
//! let client = SessionClient::new("http://localhost:4000/api", options.clone())?;
//! let channel: Arc<dyn AuthChannel> = Arc::new(hub.channel(&options.channel_name));
//! let auth = Auth::with_channel(client, Arc::new(LogNavigator), Some(channel));
//!
//! if auth.check_session_on_startup().await.is_none() {
//!     auth.login("admin", "secret").await?;
//! }
//! # Ok(())
//! # }
//! ```

mod auth;
mod channel;
mod config;
mod error;
mod fetch;
mod navigation;
mod refresh;
mod scheduler;
mod session;

pub use auth::Auth;
pub use channel::{AuthChannel, AuthEvent, BroadcastHub, ChannelMessage, LocalChannel, NoChannel};
pub use config::{AuthOptions, LOGIN_PATH, LOGOUT_PATH, ME_PATH, REFRESH_PATH, VERIFY_PATH};
pub use error::{ApiError, FieldError, SessionError};
pub use fetch::{ApiRequest, Envelope, Interception, SessionClient};
pub use navigation::{LogNavigator, Navigator, Route, RouteHistory};
pub use refresh::{RefreshCoordinator, RefreshHooks};
pub use session::{Profile, Role, Session};
