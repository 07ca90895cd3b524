//! Dashboard user accounts

use chrono::{DateTime, Utc};
use portal_session::{ApiRequest, Envelope, Profile, RefreshCoordinator, Role};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ListParams, PaginationMeta};
use crate::error::Error;

/// A dashboard user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body for registering a user
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// One page of users
#[derive(Debug, Clone, Deserialize)]
pub struct UserPage {
    #[serde(default)]
    pub users: Vec<User>,
    pub pagination: Option<PaginationMeta>,
}

/// Client for `/user`
pub struct UsersClient {
    coordinator: Arc<RefreshCoordinator>,
    page_size: u32,
}

impl UsersClient {
    pub(crate) fn new(coordinator: Arc<RefreshCoordinator>, page_size: u32) -> Self {
        Self {
            coordinator,
            page_size,
        }
    }

    /// List users, optionally restricted to one role
    pub async fn list(&self, params: &ListParams, role: Option<Role>) -> Result<UserPage, Error> {
        let request = params
            .apply(ApiRequest::get("/user"), self.page_size)
            .query_opt("role", role.map(|role| role.as_str()));
        let page: Envelope<UserPage> = self.coordinator.request(request).await?;
        Ok(page.data)
    }

    /// Get a user by ID
    pub async fn get(&self, id: &str) -> Result<User, Error> {
        let request = ApiRequest::get(&format!("/user/{}", id));
        let user: Envelope<User> = self.coordinator.request(request).await?;
        Ok(user.data)
    }

    /// Register a new user
    pub async fn create(&self, user: &NewUser) -> Result<User, Error> {
        let request = ApiRequest::post("/auth/register").json(user)?;
        let created: Envelope<User> = self.coordinator.request(request).await?;
        log::info!("registered user {} as {}", created.data.username, user.role.as_str());
        Ok(created.data)
    }
}
