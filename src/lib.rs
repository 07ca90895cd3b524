//! ISP Admin Portal Rust Client Library
//!
//! A Rust client for the ISP admin portal backend: cookie-based sign-in with
//! automatic token refresh, cross-tab logout, and typed access to packages,
//! customers, users and WhatsApp notifications.

pub mod api;
pub mod config;
pub mod error;

use std::sync::Arc;

use portal_session::{
    ApiRequest, Auth, AuthChannel, BroadcastHub, LogNavigator, Navigator, RefreshCoordinator,
    SessionClient,
};
use serde::de::DeserializeOwned;

use crate::api::{CustomersClient, PackagesClient, UsersClient, WhatsappClient};
use crate::config::ClientOptions;
use crate::error::Error;

pub use portal_session as session;

/// The main entry point for the portal client
pub struct Portal {
    /// The backend base URL, e.g. `http://localhost:4000/api`
    pub url: String,
    /// Session state and authentication operations
    pub auth: Auth,
    /// Client options
    pub options: ClientOptions,
}

impl Portal {
    /// Create a new portal client for a single, standalone tab
    ///
    /// # Example
    ///
    /// ```
    /// use portal_client::Portal;
    ///
    /// let portal = Portal::new("http://localhost:4000/api").unwrap();
    /// assert!(!portal.auth().is_authenticated());
    /// ```
    pub fn new(url: &str) -> Result<Self, Error> {
        Self::new_with_options(url, ClientOptions::default())
    }

    /// Create a new portal client with custom options
    ///
    /// # Example
    ///
    /// ```
    /// use portal_client::{Portal, config::ClientOptions};
    ///
    /// let options = ClientOptions::default().with_auto_refresh_token(false);
    /// let portal = Portal::new_with_options("http://localhost:4000/api", options).unwrap();
    /// ```
    pub fn new_with_options(url: &str, options: ClientOptions) -> Result<Self, Error> {
        Self::with_parts(url, options, Arc::new(LogNavigator), None)
    }

    /// Create a portal client for one tab that shares logouts through `hub`
    ///
    /// Every client created on the same hub with the same channel name is
    /// signed out when any of them logs out.
    pub fn with_hub(
        url: &str,
        options: ClientOptions,
        navigator: Arc<dyn Navigator>,
        hub: &BroadcastHub,
    ) -> Result<Self, Error> {
        let channel: Arc<dyn AuthChannel> = Arc::new(hub.channel(&options.channel_name));
        Self::with_parts(url, options, navigator, Some(channel))
    }

    /// Create a portal client from its parts. Without a channel the client
    /// runs standalone and logouts stay local.
    pub fn with_parts(
        url: &str,
        options: ClientOptions,
        navigator: Arc<dyn Navigator>,
        channel: Option<Arc<dyn AuthChannel>>,
    ) -> Result<Self, Error> {
        let client = SessionClient::new(url, options.auth_options())?;
        let auth = Auth::with_channel(client, navigator, channel);

        Ok(Self {
            url: url.to_string(),
            auth,
            options,
        })
    }

    /// Get a reference to the auth client
    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    fn coordinator(&self) -> Arc<RefreshCoordinator> {
        self.auth.coordinator()
    }

    /// Client for the package catalogue
    pub fn packages(&self) -> PackagesClient {
        PackagesClient::new(self.coordinator(), self.options.page_size)
    }

    /// Client for customer records
    pub fn customers(&self) -> CustomersClient {
        CustomersClient::new(self.coordinator(), self.options.page_size)
    }

    /// Client for dashboard users
    pub fn users(&self) -> UsersClient {
        UsersClient::new(self.coordinator(), self.options.page_size)
    }

    /// Client for WhatsApp logs and messages
    pub fn whatsapp(&self) -> WhatsappClient {
        WhatsappClient::new(self.coordinator(), self.options.page_size)
    }

    /// Send an arbitrary request through the refresh-aware pipeline
    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, Error> {
        let response = self.coordinator().request(request).await?;
        Ok(response)
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::api::ListParams;
    pub use crate::config::ClientOptions;
    pub use crate::error::Error;
    pub use crate::Portal;
    pub use portal_session::{Auth, Route, Session};
}
