//! Internet package catalogue

use chrono::{DateTime, Utc};
use portal_session::{ApiRequest, Envelope, RefreshCoordinator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::{amount, ListParams, PaginationMeta};
use crate::error::Error;

/// An internet package offered to customers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub name: String,
    /// Advertised bandwidth, e.g. "20 Mbps"
    pub speed: String,
    /// Monthly price in rupiah
    #[serde(deserialize_with = "amount")]
    pub price: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body for creating or updating a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPackage {
    pub name: String,
    pub speed: String,
    pub price: i64,
}

impl NewPackage {
    pub fn new(name: &str, speed: &str, price: i64) -> Self {
        Self {
            name: name.to_string(),
            speed: speed.to_string(),
            price,
        }
    }
}

/// One page of packages
#[derive(Debug, Clone, Deserialize)]
pub struct PackagePage {
    #[serde(default)]
    pub packages: Vec<Package>,
    pub pagination: Option<PaginationMeta>,
}

/// Client for `/package`
pub struct PackagesClient {
    coordinator: Arc<RefreshCoordinator>,
    page_size: u32,
}

impl PackagesClient {
    pub(crate) fn new(coordinator: Arc<RefreshCoordinator>, page_size: u32) -> Self {
        Self {
            coordinator,
            page_size,
        }
    }

    /// List packages
    pub async fn list(&self, params: &ListParams) -> Result<PackagePage, Error> {
        let request = params.apply(ApiRequest::get("/package"), self.page_size);
        let page: Envelope<PackagePage> = self.coordinator.request(request).await?;
        Ok(page.data)
    }

    /// Get a package by ID
    pub async fn get(&self, id: &str) -> Result<Package, Error> {
        let request = ApiRequest::get(&format!("/package/{}", id));
        let package: Envelope<Package> = self.coordinator.request(request).await?;
        Ok(package.data)
    }

    /// Create a package
    pub async fn create(&self, package: &NewPackage) -> Result<Package, Error> {
        let request = ApiRequest::post("/package").json(package)?;
        let created: Envelope<Package> = self.coordinator.request(request).await?;
        log::debug!("created package {}", created.data.id);
        Ok(created.data)
    }

    /// Update a package
    pub async fn update(&self, id: &str, package: &NewPackage) -> Result<Package, Error> {
        let request = ApiRequest::put(&format!("/package/{}", id)).json(package)?;
        let updated: Envelope<Package> = self.coordinator.request(request).await?;
        Ok(updated.data)
    }

    /// Delete a package
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        let request = ApiRequest::delete(&format!("/package/{}", id));
        self.coordinator.request::<Value>(request).await?;
        log::debug!("deleted package {}", id);
        Ok(())
    }
}
