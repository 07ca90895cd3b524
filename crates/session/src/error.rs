//! Error types for the session layer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A single field-level validation error reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    #[serde(default)]
    pub field: Option<String>,
    pub message: String,
}

/// A non-2xx response from the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code
    pub status: u16,
    /// Backend error code, if any
    pub code: Option<String>,
    /// Backend message, if any
    pub message: Option<String>,
    /// Field-level validation errors
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    errors: Option<Vec<FieldError>>,
}

impl ApiError {
    /// Builds an error from a status code and the raw response body.
    ///
    /// Bodies that are not the backend's `{message, code, errors}` shape are
    /// kept as the message when they are non-empty text.
    pub fn from_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => Self {
                status,
                code: parsed.code.map(|code| match code {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                }),
                message: parsed.message,
                errors: parsed.errors.unwrap_or_default(),
            },
            Err(_) => Self {
                status,
                code: None,
                message: (!body.trim().is_empty()).then(|| body.trim().to_string()),
                errors: Vec::new(),
            },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Short human title for the failure, by status class
    pub fn title(&self) -> &'static str {
        if !self.errors.is_empty() {
            return "Validation failed";
        }
        match self.status {
            400 => "Invalid data",
            401 => "Not authorized",
            403 => "Access denied",
            404 => "Not found",
            409 => "Duplicate data",
            422 => "Validation failed",
            429 => "Rate limited",
            s if s >= 500 => "Server error",
            _ => "Error",
        }
    }

    /// The most specific message available: the first field error, then the
    /// backend message.
    pub fn detail(&self) -> Option<String> {
        if let Some(first) = self.errors.first() {
            return Some(match &first.field {
                Some(field) => format!("{}: {}", field, first.message),
                None => first.message.clone(),
            });
        }
        self.message.clone()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{} ({}): {}", self.title(), self.status, detail),
            None => write!(f, "{} ({})", self.title(), self.status),
        }
    }
}

/// Session layer error
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("API error: {0}")]
    Api(ApiError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(Arc<SessionError>),

    #[error("Token refresh was abandoned before it settled")]
    RefreshAbandoned,

    #[error("Missing session")]
    MissingSession,

    #[error("Broadcast channel unavailable: {0}")]
    ChannelUnavailable(String),
}

impl SessionError {
    /// HTTP status of the underlying backend response, if there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api(err) => Some(err.status),
            Self::Network(err) => err.status().map(|s| s.as_u16()),
            Self::RefreshFailed(inner) => inner.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}
