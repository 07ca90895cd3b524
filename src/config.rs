//! Configuration options for the portal client

use portal_session::AuthOptions;
use std::time::Duration;

/// Configuration options for the portal client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Whether to automatically refresh the token ahead of expiry
    pub auto_refresh_token: bool,

    /// The request timeout
    pub request_timeout: Duration,

    /// How long before expiry the token is refreshed
    pub refresh_margin: Duration,

    /// Minimum delay before a scheduled refresh
    pub refresh_floor: Duration,

    /// The cross-tab broadcast channel name
    pub channel_name: String,

    /// The sign-in route
    pub sign_in_route: String,

    /// The dashboard route
    pub dashboard_route: String,

    /// Default page size for list endpoints
    pub page_size: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        let auth = AuthOptions::default();
        Self {
            auto_refresh_token: auth.auto_refresh_token,
            request_timeout: auth.request_timeout,
            refresh_margin: auth.refresh_margin,
            refresh_floor: auth.refresh_floor,
            channel_name: auth.channel_name,
            sign_in_route: auth.sign_in_route,
            dashboard_route: auth.dashboard_route,
            page_size: 10,
        }
    }
}

impl ClientOptions {
    /// Set whether to automatically refresh the token
    pub fn with_auto_refresh_token(mut self, value: bool) -> Self {
        self.auto_refresh_token = value;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Duration) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set how long before expiry the token is refreshed
    pub fn with_refresh_margin(mut self, value: Duration) -> Self {
        self.refresh_margin = value;
        self
    }

    /// Set the minimum delay before a scheduled refresh
    pub fn with_refresh_floor(mut self, value: Duration) -> Self {
        self.refresh_floor = value;
        self
    }

    /// Set the broadcast channel name
    pub fn with_channel_name(mut self, value: &str) -> Self {
        self.channel_name = value.to_string();
        self
    }

    /// Set the sign-in route
    pub fn with_sign_in_route(mut self, value: &str) -> Self {
        self.sign_in_route = value.to_string();
        self
    }

    /// Set the dashboard route
    pub fn with_dashboard_route(mut self, value: &str) -> Self {
        self.dashboard_route = value.to_string();
        self
    }

    /// Set the default page size
    pub fn with_page_size(mut self, value: u32) -> Self {
        self.page_size = value;
        self
    }

    /// Options for the session layer
    pub fn auth_options(&self) -> AuthOptions {
        AuthOptions::default()
            .with_auto_refresh_token(self.auto_refresh_token)
            .with_request_timeout(self.request_timeout)
            .with_refresh_margin(self.refresh_margin)
            .with_refresh_floor(self.refresh_floor)
            .with_channel_name(&self.channel_name)
            .with_sign_in_route(&self.sign_in_route)
            .with_dashboard_route(&self.dashboard_route)
    }
}
