//! Error handling for the portal client

use portal_session::{ApiError, SessionError};
use std::fmt;
use thiserror::Error;

/// Unified error type for the portal client
#[derive(Error, Debug)]
pub enum Error {
    /// Session, transport and backend errors
    #[error(transparent)]
    Session(#[from] SessionError),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Create a new general error
    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }

    /// The backend's error response, if this error carries one
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Error::Session(SessionError::Api(err)) => Some(err),
            _ => None,
        }
    }

    /// HTTP status of the failed response, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Session(err) => err.status(),
            _ => None,
        }
    }

    /// Whether the caller is no longer authenticated. Terminal: the session
    /// layer has already tried a refresh.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}
