//! WhatsApp notification log and outgoing messages

use chrono::{DateTime, Utc};
use portal_session::{ApiRequest, Envelope, RefreshCoordinator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::{ListParams, PaginationMeta};
use crate::error::Error;

/// A message the backend attempted to deliver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatsappLog {
    pub id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub phone_number: String,
    #[serde(default)]
    pub message_type: Option<String>,
    pub status: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl WhatsappLog {
    pub fn is_failed(&self) -> bool {
        self.status.eq_ignore_ascii_case("failed")
    }
}

/// A manual message to a phone number
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub phone_number: String,
    pub message: String,
}

/// One page of log entries
#[derive(Debug, Clone, Deserialize)]
pub struct LogPage {
    #[serde(default)]
    pub logs: Vec<WhatsappLog>,
    pub pagination: Option<PaginationMeta>,
}

/// Client for `/whatsapp`
pub struct WhatsappClient {
    coordinator: Arc<RefreshCoordinator>,
    page_size: u32,
}

impl WhatsappClient {
    pub(crate) fn new(coordinator: Arc<RefreshCoordinator>, page_size: u32) -> Self {
        Self {
            coordinator,
            page_size,
        }
    }

    /// List delivery logs
    pub async fn logs(&self, params: &ListParams) -> Result<LogPage, Error> {
        let request = params.apply(ApiRequest::get("/whatsapp/logs"), self.page_size);
        let page: Envelope<LogPage> = self.coordinator.request(request).await?;
        Ok(page.data)
    }

    /// Send a message. Returns the backend's response body as-is; rejected
    /// input comes back as an API error carrying the field errors.
    pub async fn send(&self, message: &OutgoingMessage) -> Result<Value, Error> {
        let request = ApiRequest::post("/whatsapp/message").json(message)?;
        let response: Value = self.coordinator.request(request).await?;
        Ok(response)
    }
}
