//! Configuration options for the session layer

use std::time::Duration;

/// Backend path of the login endpoint
pub const LOGIN_PATH: &str = "/auth/login";
/// Backend path of the logout endpoint
pub const LOGOUT_PATH: &str = "/auth/logout";
/// Backend path of the token refresh endpoint
pub const REFRESH_PATH: &str = "/auth/refresh";
/// Backend path returning the current identity
pub const ME_PATH: &str = "/auth/me";
/// Backend path verifying the cookie session
pub const VERIFY_PATH: &str = "/auth/verify";

/// Session layer options
#[derive(Debug, Clone)]
pub struct AuthOptions {
    /// Whether to arm the proactive refresh timer
    pub auto_refresh_token: bool,

    /// Timeout applied to every request
    pub request_timeout: Duration,

    /// How long before expiry the proactive refresh fires
    pub refresh_margin: Duration,

    /// Minimum delay before the proactive refresh fires
    pub refresh_floor: Duration,

    /// Paths whose 401 responses never trigger a refresh
    pub exempt_paths: Vec<String>,

    /// Name of the cross-tab broadcast channel
    pub channel_name: String,

    /// Route of the sign-in page
    pub sign_in_route: String,

    /// Route of the dashboard
    pub dashboard_route: String,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            auto_refresh_token: true,
            request_timeout: Duration::from_secs(50),
            refresh_margin: Duration::from_secs(120),
            refresh_floor: Duration::from_secs(30),
            exempt_paths: vec![
                LOGIN_PATH.to_string(),
                REFRESH_PATH.to_string(),
                LOGOUT_PATH.to_string(),
            ],
            channel_name: "auth_channel".to_string(),
            sign_in_route: "/admin/sign-in".to_string(),
            dashboard_route: "/admin/dashboard".to_string(),
        }
    }
}

impl AuthOptions {
    pub fn with_auto_refresh_token(mut self, value: bool) -> Self {
        self.auto_refresh_token = value;
        self
    }

    pub fn with_request_timeout(mut self, value: Duration) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set how long before expiry the session is refreshed
    pub fn with_refresh_margin(mut self, value: Duration) -> Self {
        self.refresh_margin = value;
        self
    }

    /// Set the minimum delay of the proactive refresh
    pub fn with_refresh_floor(mut self, value: Duration) -> Self {
        self.refresh_floor = value;
        self
    }

    /// Add a path whose 401 responses are passed through untouched
    pub fn with_exempt_path(mut self, value: &str) -> Self {
        self.exempt_paths.push(value.to_string());
        self
    }

    pub fn with_channel_name(mut self, value: &str) -> Self {
        self.channel_name = value.to_string();
        self
    }

    pub fn with_sign_in_route(mut self, value: &str) -> Self {
        self.sign_in_route = value.to_string();
        self
    }

    pub fn with_dashboard_route(mut self, value: &str) -> Self {
        self.dashboard_route = value.to_string();
        self
    }

    /// Whether a request to `path` is an authentication endpoint
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|exempt| path.starts_with(exempt.as_str()))
    }
}
