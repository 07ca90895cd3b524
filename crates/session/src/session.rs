//! Session data

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Role of a dashboard user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Teknisi,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Teknisi => "TEKNISI",
            Self::Admin => "ADMIN",
            Self::SuperAdmin => "SUPER_ADMIN",
        }
    }
}

/// Display profile attached to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub full_name: String,
}

/// The authenticated identity known to the client.
///
/// Only the decoded identity is kept; the access and refresh credentials stay
/// in the cookie store, and any token fields in a response body are dropped
/// on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The user ID
    pub id: String,

    pub email: String,

    pub username: String,

    pub role: Role,

    #[serde(default)]
    pub profile: Option<Profile>,

    /// Expiry of the access credential, seconds since the epoch
    pub exp: i64,
}

impl Session {
    /// The expiry as a timestamp, `None` if `exp` is out of range
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }

    /// Name to show for the user: the profile's full name, else the username
    pub fn display_name(&self) -> &str {
        self.profile
            .as_ref()
            .map(|p| p.full_name.as_str())
            .unwrap_or(&self.username)
    }

    /// Delay until the proactive refresh should fire, measured from `now`:
    /// `margin` before expiry, but never sooner than `floor`.
    pub fn refresh_delay(&self, now: DateTime<Utc>, margin: Duration, floor: Duration) -> Duration {
        let until_expiry = self
            .expires_at()
            .and_then(|expiry| (expiry - now).to_std().ok())
            .unwrap_or(Duration::ZERO);

        until_expiry.saturating_sub(margin).max(floor)
    }
}
