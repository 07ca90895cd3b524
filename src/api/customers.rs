//! Customer records

use chrono::{DateTime, Utc};
use portal_session::{ApiRequest, Envelope, RefreshCoordinator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::{ListParams, PaginationMeta};
use crate::error::Error;

/// A subscriber of the ISP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// National identity number
    #[serde(default)]
    pub nik: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub birth_place: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Uploaded documents, as returned by the backend
    #[serde(default)]
    pub documents: Vec<Value>,
    /// Active service connections, as returned by the backend
    #[serde(default)]
    pub services: Vec<Value>,
}

/// One page of customers
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerPage {
    #[serde(default)]
    pub customers: Vec<Customer>,
    pub pagination: Option<PaginationMeta>,
}

/// Client for `/customer`
pub struct CustomersClient {
    coordinator: Arc<RefreshCoordinator>,
    page_size: u32,
}

impl CustomersClient {
    pub(crate) fn new(coordinator: Arc<RefreshCoordinator>, page_size: u32) -> Self {
        Self {
            coordinator,
            page_size,
        }
    }

    /// List customers
    pub async fn list(&self, params: &ListParams) -> Result<CustomerPage, Error> {
        let request = params.apply(ApiRequest::get("/customer"), self.page_size);
        let page: Envelope<CustomerPage> = self.coordinator.request(request).await?;
        Ok(page.data)
    }

    /// Get a customer by ID
    pub async fn get(&self, id: &str) -> Result<Customer, Error> {
        let request = ApiRequest::get(&format!("/customer/{}", id));
        let customer: Envelope<Customer> = self.coordinator.request(request).await?;
        Ok(customer.data)
    }

    /// Delete a customer
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        let request = ApiRequest::delete(&format!("/customer/{}", id));
        self.coordinator.request::<Value>(request).await?;
        log::debug!("deleted customer {}", id);
        Ok(())
    }
}
