//! vault-consul-role - Consul secrets engine role management for Vault
//!
//! This crate manages roles of Vault's Consul secrets engine declaratively:
//! a role configuration is written to `<backend>/roles/<name>`, read back, and
//! tracked in a local SQLite state file keyed by that path.
//!
//! ## Architecture
//!
//! The crate follows a layered architecture with the following dependencies:
//!
//! - `cli` module - Command-line interface (uses the manager module)
//! - `manager` module - Coordinates role operations with persisted state
//! - `vault` module - Vault HTTP client, role IDs and the role resource
//! - `database` module - Persistence layer (accessed through the manager module)
//! - `interface` module - The logical read/write/delete seam over Vault

pub mod cli;
pub mod database;
pub mod interface;
pub mod manager;
pub mod vault;

// Re-export public types for convenience
pub use database::{StateError, StateStore};
pub use interface::Logical;
pub use manager::RoleManager;
pub use vault::{
    ConsulRoleConfig, ConsulRoleResource, RoleError, RoleId, RoleIdError, RoleState, TokenType,
    VaultClient, VaultConfig, VaultError,
};

/// Initialize logging for the application.
///
/// The filter defaults to `info` and can be overridden with `RUST_LOG`.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
