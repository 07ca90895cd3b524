//! HTTP transport for backend requests
//!
//! [`SessionClient`] is the leaf of the session layer: it sends requests with
//! the cookie jar attached, turns non-2xx responses into [`ApiError`]s and
//! decides which failures are handed to the refresh coordinator. It never
//! retries anything itself.

use log::{debug, trace};
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::AuthOptions;
use crate::error::{ApiError, SessionError};

/// The backend's `{ "data": ... }` response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// A request against the backend, relative to the base URL
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    replayed: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: Vec::new(),
            body: None,
            replayed: false,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: &str) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Add a query parameter
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Add a query parameter when the value is present
    pub fn query_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    /// Attach a JSON body
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, SessionError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this request is already the automatic replay after a refresh
    pub fn is_replayed(&self) -> bool {
        self.replayed
    }

    pub(crate) fn mark_replayed(&mut self) {
        self.replayed = true;
    }
}

/// What the response interceptor decided for a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interception {
    /// Surface the error to the caller as is
    PassThrough,
    /// Hand the request to the refresh coordinator
    Refresh,
}

/// Cookie-carrying HTTP client for the backend
#[derive(Debug, Clone)]
pub struct SessionClient {
    http_client: Client,
    base_url: String,
    options: AuthOptions,
}

impl SessionClient {
    /// Create a client with its own cookie store
    pub fn new(base_url: &str, options: AuthOptions) -> Result<Self, SessionError> {
        let http_client = Client::builder()
            .cookie_store(true)
            .timeout(options.request_timeout)
            .build()?;
        Self::with_client(base_url, http_client, options)
    }

    /// Create a client on top of an existing `reqwest` client.
    ///
    /// The caller is responsible for the client carrying a cookie store.
    pub fn with_client(
        base_url: &str,
        http_client: Client,
        options: AuthOptions,
    ) -> Result<Self, SessionError> {
        Url::parse(base_url)?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            options,
        })
    }

    pub fn options(&self) -> &AuthOptions {
        &self.options
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, request: &ApiRequest) -> Result<Url, SessionError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, request.path))?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Send a request once and return the parsed JSON body.
    ///
    /// An empty success body parses as `null`.
    pub async fn send(&self, request: &ApiRequest) -> Result<Value, SessionError> {
        let url = self.url(request)?;
        trace!("{} {}", request.method, url);

        let mut builder = self.http_client.request(request.method.clone(), url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let error = ApiError::from_body(status.as_u16(), &text);
            debug!("{} {} failed: {}", request.method, request.path, error);
            return Err(SessionError::Api(error));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Send a request once and decode the body into `T`
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, SessionError> {
        let value = self.send(request).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// The response interceptor: only a 401 on a request that is neither an
    /// authentication endpoint nor an earlier replay goes to the coordinator.
    pub fn intercept(&self, request: &ApiRequest, error: &SessionError) -> Interception {
        let unauthorized = matches!(error, SessionError::Api(api) if api.is_unauthorized());
        if !unauthorized {
            return Interception::PassThrough;
        }
        if self.options.is_exempt(&request.path) {
            debug!("401 from authentication endpoint {}, not refreshing", request.path);
            return Interception::PassThrough;
        }
        if request.replayed {
            debug!("401 from replayed request {}, giving up", request.path);
            return Interception::PassThrough;
        }
        Interception::Refresh
    }
}
