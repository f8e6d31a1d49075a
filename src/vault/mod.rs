//! Vault module for the vault-consul-role library
//!
//! This module implements everything that talks to, or describes data held
//! in, HashiCorp Vault.
//!
//! ## Architectural role:
//! - `client` and `common` wrap the HTTP API and its error responses
//! - `role_id` encodes and decodes the role paths used as identifiers
//! - `consul_role` maps a role configuration onto logical reads and writes
//!
//! ## Testing strategy:
//! - Each module contains its own unit tests within a `#[cfg(test)] mod tests` block
//! - HTTP behaviour is tested against `wiremock` servers
//! - Integration tests in the `tests/` directory run against a Vault dev container

pub mod client;
pub mod common;
pub mod consul_role;
pub mod error;
pub mod role_id;

// Re-export key types and traits for convenience
pub use client::VaultClient;
pub use consul_role::{ConsulRoleConfig, ConsulRoleResource, RoleError, RoleState, TokenType};
pub use error::VaultError;
pub use role_id::{RoleId, RoleIdError};

/// Vault configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultConfig {
    /// Vault API URL, e.g., "http://127.0.0.1:8200".
    pub url: String,
    /// API token sent as `X-Vault-Token`.
    pub token: Option<String>,
    /// Optional namespace for supporting namespaced Vault instances (enterprise)
    pub namespace: Option<String>,
}

impl VaultConfig {
    /// Create a new Vault config
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            token: None,
            namespace: None,
        }
    }

    /// Set token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Set namespace
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }
}

// Default configuration
impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8200".to_string(),
            token: None,
            namespace: None,
        }
    }
}
