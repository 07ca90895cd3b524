//! Typed wrappers over the dashboard's CRUD endpoints
//!
//! Every call goes through the session's [`RefreshCoordinator`], so an
//! expired access credential is refreshed transparently. A 401 that still
//! comes back is final; these clients never retry on their own.
//!
//! [`RefreshCoordinator`]: portal_session::RefreshCoordinator

mod customers;
mod packages;
mod users;
mod whatsapp;

pub use customers::{Customer, CustomerPage, CustomersClient};
pub use packages::{NewPackage, Package, PackagePage, PackagesClient};
pub use users::{NewUser, User, UserPage, UsersClient};
pub use whatsapp::{LogPage, OutgoingMessage, WhatsappClient, WhatsappLog};

use portal_session::ApiRequest;
use serde::{Deserialize, Deserializer, Serialize};

/// Pagination block returned by list endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub current_page: u32,
    pub total_pages: u32,
    pub limit: u32,
    pub total_items: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Paging and search parameters for list endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
}

impl ListParams {
    pub fn page(page: u32) -> Self {
        Self {
            page: Some(page),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_search(mut self, search: &str) -> Self {
        self.search = Some(search.to_string());
        self
    }

    /// Add the parameters to `request`, using `default_limit` when no limit
    /// was set. Blank searches are left out.
    pub(crate) fn apply(&self, request: ApiRequest, default_limit: u32) -> ApiRequest {
        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|search| !search.is_empty());
        request
            .query_opt("page", self.page)
            .query("limit", self.limit.unwrap_or(default_limit))
            .query_opt("search", search)
    }
}

/// Accepts an amount as a JSON number or a numeric string
pub(crate) fn amount<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Integer(i64),
        Float(f64),
        Text(String),
    }

    match Amount::deserialize(deserializer)? {
        Amount::Integer(value) => Ok(value),
        Amount::Float(value) => Ok(value.round() as i64),
        Amount::Text(text) => text
            .trim()
            .parse::<f64>()
            .map(|value| value.round() as i64)
            .map_err(serde::de::Error::custom),
    }
}
