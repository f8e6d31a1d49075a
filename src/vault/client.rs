//! Client implementation for Vault API interactions.
//!
//! This module provides a client for making HTTP requests to the Vault API
//! with appropriate authentication and error handling. Logical paths
//! (`consul/roles/web`) are resolved against the `/v1/` prefix, one URL path
//! segment per `/`-separated component, so characters such as `#` or `?` in a
//! role name stay part of the path.

use crate::interface::Logical;
use crate::vault::common::{check_response, extract_data};
use crate::vault::{VaultConfig, VaultError};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, Method, Response, StatusCode, Url,
};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Client for interacting with the Vault HTTP API.
pub struct VaultClient {
    /// Base URL of the Vault server
    pub addr: String,
    /// Auth token for Vault API requests
    pub token: String,
    /// Parsed form of `addr` that request URLs are built from
    base: Url,
    /// HTTP client for making requests
    client: Client,
    /// Custom headers to add to requests
    custom_headers: HeaderMap,
}

impl VaultClient {
    /// Creates a new VaultClient with the specified address and token.
    pub fn new(addr: &str, token: &str) -> Result<Self, VaultError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VaultError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let addr = addr.trim_end_matches('/').to_string();
        let base = Url::parse(&addr)
            .map_err(|e| VaultError::Connection(format!("Invalid Vault address {}: {}", addr, e)))?;
        if base.cannot_be_a_base() {
            return Err(VaultError::Connection(format!(
                "Invalid Vault address {}: not an HTTP base URL",
                addr
            )));
        }

        Ok(Self {
            addr,
            token: token.to_string(),
            base,
            client,
            custom_headers: HeaderMap::new(),
        })
    }

    /// Creates a client from a [`VaultConfig`], applying the namespace header
    /// when one is configured.
    pub fn from_config(config: &VaultConfig) -> Result<Self, VaultError> {
        let token = config.token.as_deref().unwrap_or_default();
        let mut client = Self::new(&config.url, token)?;
        if let Some(namespace) = config.namespace.as_deref() {
            client.add_header("X-Vault-Namespace", namespace);
        }
        Ok(client)
    }

    /// Adds a custom header to the client.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the header
    /// * `value` - The value of the header
    pub fn add_header(&mut self, name: &str, value: &str) -> &mut Self {
        if let (Ok(header_name), Ok(header_value)) =
            (HeaderName::from_str(name), HeaderValue::from_str(value))
        {
            self.custom_headers.insert(header_name, header_value);
        }
        self
    }

    /// Makes a POST request to the Vault API with a JSON body.
    pub async fn post_with_body(&self, path: &str, body: Value) -> Result<Value, VaultError> {
        let response = self.request(Method::POST, path, Some(body)).await?;
        check_response(response).await
    }

    /// Resolves a logical path (`consul/roles/web`, `sys/mounts/consul`) to
    /// its `/v1/` URL, percent-encoding each component.
    fn logical_url(&self, path: &str) -> Result<Url, VaultError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                VaultError::Connection(format!("Invalid Vault address {}", self.addr))
            })?
            .pop_if_empty()
            .push("v1")
            .extend(path.trim_start_matches('/').split('/'));
        Ok(url)
    }

    /// Sends a request to the Vault API with the specified method and optional body.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Response, VaultError> {
        let url = self.logical_url(path)?;
        debug!("{} {}", method, url);
        let mut request = self.client.request(method, url);

        // Add token header for authentication
        request = request.header("X-Vault-Token", &self.token);

        for (name, value) in self.custom_headers.iter() {
            request = request.header(name, value);
        }

        if let Some(json_body) = body {
            request = request.json(&json_body);
        }

        request.send().await.map_err(|e| {
            if e.is_connect() {
                VaultError::Connection(format!("Failed to connect to {}: {}", self.addr, e))
            } else {
                VaultError::Network(format!("Request failed: {}", e))
            }
        })
    }
}

#[async_trait]
impl Logical for VaultClient {
    async fn read(&self, path: &str) -> Result<Option<Value>, VaultError> {
        let response = self.request(Method::GET, path, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = check_response(response).await?;
        Ok(extract_data(body))
    }

    async fn write(&self, path: &str, data: Value) -> Result<Option<Value>, VaultError> {
        let response = self.request(Method::PUT, path, Some(data)).await?;
        let body = check_response(response).await?;
        Ok(extract_data(body))
    }

    async fn delete(&self, path: &str) -> Result<(), VaultError> {
        let response = self.request(Method::DELETE, path, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_response(response).await.map(|_| ())
    }
}
