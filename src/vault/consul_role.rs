//! Consul secrets engine roles.
//!
//! [`ConsulRoleResource`] maps a [`ConsulRoleConfig`] onto writes, reads and
//! deletes of `<backend>/roles/<name>` and reconciles what Vault returns into a
//! [`RoleState`]. The role path doubles as the record's ID; see
//! [`crate::vault::role_id`].

use crate::database::StateError;
use crate::interface::Logical;
use crate::vault::role_id::{
    backend_from_path, name_from_path, upgrade_legacy_id, RoleId, RoleIdError,
};
use crate::vault::VaultError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Kind of Consul token minted for a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    #[default]
    Client,
    Management,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Client => f.write_str("client"),
            TokenType::Management => f.write_str("management"),
        }
    }
}

impl FromStr for TokenType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(TokenType::Client),
            "management" => Ok(TokenType::Management),
            other => Err(format!(
                "invalid token type {:?}, expected \"client\" or \"management\"",
                other
            )),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RoleError {
    #[error("No backend specified for Consul secret backend role {0}")]
    NoBackend(String),

    #[error("policies or consul_roles must be set")]
    NoPoliciesOrRoles,

    #[error("invalid role ID: {0}")]
    InvalidId(#[from] RoleIdError),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("role {0:?} is not tracked in local state")]
    NotTracked(String),

    #[error("error writing role configuration for {id:?}: {source}")]
    Write { id: String, source: VaultError },

    #[error("error reading role configuration for {id:?}: {source}")]
    Read { id: String, source: VaultError },

    #[error("error deleting Consul backend role at {id:?}: {source}")]
    Delete { id: String, source: VaultError },

    #[error("unexpected {field} {value} in role {id:?}")]
    UnexpectedValue {
        id: String,
        field: &'static str,
        value: String,
    },

    #[error("State error: {0}")]
    State(#[from] StateError),
}

/// Desired configuration of a Consul role.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConsulRoleConfig {
    /// Name of the role. Changing it replaces the role.
    pub name: String,
    /// Path of the Consul secrets engine mount. Changing it replaces the role.
    pub backend: Option<String>,
    /// Deprecated alias for `backend`, consulted only when `backend` is unset.
    pub path: Option<String>,
    /// Consul policies attached to issued tokens.
    pub policies: Vec<String>,
    /// Consul roles attached to issued tokens (Vault 1.10+, Consul 1.5+).
    pub consul_roles: BTreeSet<String>,
    /// Consul namespace tokens are created in (Vault 1.10+, Consul 1.7+).
    pub consul_namespace: Option<String>,
    /// Consul admin partition tokens are created in (Vault 1.10+, Consul 1.11+).
    pub partition: Option<String>,
    /// Maximum lease TTL in seconds.
    pub max_ttl: u64,
    /// Lease TTL in seconds.
    pub ttl: u64,
    pub token_type: TokenType,
    /// Keep tokens local to the current datacenter instead of replicating them.
    pub local: bool,
}

impl ConsulRoleConfig {
    pub fn new(backend: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            backend: Some(backend.to_string()),
            ..Default::default()
        }
    }

    /// The configured mount, preferring `backend` over the deprecated `path`.
    pub fn mount(&self) -> Option<&str> {
        self.backend
            .as_deref()
            .filter(|b| !b.is_empty())
            .or_else(|| self.path.as_deref().filter(|p| !p.is_empty()))
    }

    /// Checks the configuration and returns the role's identity.
    pub fn role_id(&self) -> Result<RoleId, RoleError> {
        let backend = self
            .mount()
            .ok_or_else(|| RoleError::NoBackend(self.name.clone()))?;
        if self.policies.is_empty() && self.consul_roles.is_empty() {
            return Err(RoleError::NoPoliciesOrRoles);
        }
        Ok(RoleId::new(backend, &self.name))
    }

    /// Request body for a role write.
    pub fn payload(&self) -> Value {
        let mut data = Map::new();
        data.insert("policies".to_string(), json!(self.policies));
        data.insert("consul_roles".to_string(), json!(self.consul_roles));
        data.insert("max_ttl".to_string(), json!(self.max_ttl));
        data.insert("ttl".to_string(), json!(self.ttl));
        data.insert("token_type".to_string(), json!(self.token_type));
        data.insert("local".to_string(), json!(self.local));
        if let Some(namespace) = &self.consul_namespace {
            data.insert("consul_namespace".to_string(), json!(namespace));
        }
        if let Some(partition) = &self.partition {
            data.insert("partition".to_string(), json!(partition));
        }
        Value::Object(data)
    }
}

/// Local record of a role as last seen in Vault.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleState {
    /// Role path; empty once the record has been dropped.
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub consul_roles: BTreeSet<String>,
    #[serde(default)]
    pub consul_namespace: Option<String>,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub max_ttl: u64,
    #[serde(default)]
    pub ttl: u64,
    #[serde(default)]
    pub token_type: TokenType,
    #[serde(default)]
    pub local: bool,
}

impl RoleState {
    /// A record holding nothing but an ID, as produced by an import.
    pub fn with_id(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    fn from_config(config: &ConsulRoleConfig, id: String) -> Self {
        let (backend, path) = match &config.backend {
            Some(b) if !b.is_empty() => (Some(b.clone()), None),
            _ => (None, config.path.clone()),
        };
        Self {
            id,
            name: config.name.clone(),
            backend,
            path,
            policies: config.policies.clone(),
            consul_roles: config.consul_roles.clone(),
            consul_namespace: config.consul_namespace.clone(),
            partition: config.partition.clone(),
            max_ttl: config.max_ttl,
            ttl: config.ttl,
            token_type: config.token_type,
            local: config.local,
        }
    }

    /// The mount this record reports, under whichever key it was configured.
    pub fn mount(&self) -> Option<&str> {
        self.path.as_deref().or(self.backend.as_deref())
    }

    /// Rewrites a legacy `<backend>,<name>` ID in place. Returns the old ID
    /// when a rewrite happened.
    pub fn upgrade_id(&mut self) -> Option<String> {
        let upgraded = upgrade_legacy_id(&self.id)?;
        debug!("Upgrading old ID {} to {}", self.id, upgraded);
        Some(std::mem::replace(&mut self.id, upgraded))
    }

    fn set_mount(&mut self, backend: String) {
        if self.path.is_some() {
            self.path = Some(backend);
        } else {
            self.backend = Some(backend);
        }
    }

    /// Copies the fields of a role read from Vault into this record.
    ///
    /// `consul_roles`, `consul_namespace` and `partition` are only returned by
    /// Vault 1.10+; when absent the recorded values are kept.
    fn apply_remote(&mut self, data: &Value) -> Result<(), RoleError> {
        let policies = data.get("policies").or_else(|| data.get("consul_policies"));
        self.policies = string_list(policies);

        self.max_ttl = self.seconds(data, "max_ttl")?;
        self.ttl = self.seconds(data, "ttl")?;

        self.token_type = match data.get("token_type").and_then(Value::as_str) {
            None | Some("") => TokenType::default(),
            Some(raw) => raw.parse::<TokenType>().map_err(|_| RoleError::UnexpectedValue {
                id: self.id.clone(),
                field: "token_type",
                value: raw.to_string(),
            })?,
        };
        self.local = data.get("local").and_then(Value::as_bool).unwrap_or(false);

        if let Some(roles) = data.get("consul_roles") {
            self.consul_roles = string_list(Some(roles)).into_iter().collect();
        }
        if let Some(namespace) = data.get("consul_namespace") {
            self.consul_namespace = non_empty_string(namespace);
        }
        if let Some(partition) = data.get("partition") {
            self.partition = non_empty_string(partition);
        }
        Ok(())
    }

    fn seconds(&self, data: &Value, field: &'static str) -> Result<u64, RoleError> {
        match data.get(field) {
            None | Some(Value::Null) => Ok(0),
            Some(v) => v
                .as_u64()
                .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .ok_or_else(|| RoleError::UnexpectedValue {
                    id: self.id.clone(),
                    field,
                    value: v.to_string(),
                }),
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn non_empty_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Create, read, update and delete operations for Consul roles.
pub struct ConsulRoleResource<L> {
    logical: L,
}

impl<L: Logical> ConsulRoleResource<L> {
    pub fn new(logical: L) -> Self {
        Self { logical }
    }

    pub fn logical(&self) -> &L {
        &self.logical
    }

    /// Writes the role described by `config` and returns its state as read
    /// back from Vault. Used for both create and in-place update.
    pub async fn write(&self, config: &ConsulRoleConfig) -> Result<RoleState, RoleError> {
        let id = config.role_id()?.path();

        debug!("Configuring Consul secrets backend role at {:?}", id);
        self.logical
            .write(&id, config.payload())
            .await
            .map_err(|source| RoleError::Write {
                id: id.clone(),
                source,
            })?;

        let mut state = RoleState::from_config(config, id);
        self.read(&mut state).await?;
        Ok(state)
    }

    /// Deletes the role behind `state` when it no longer lives at `new_id`,
    /// i.e. its name or backend changed. The record's ID is cleared after a
    /// delete. Returns whether a delete happened.
    pub async fn retire(&self, state: &mut RoleState, new_id: &str) -> Result<bool, RoleError> {
        state.upgrade_id();
        if state.id.is_empty() || state.id == new_id {
            return Ok(false);
        }
        debug!(
            "Consul role moved from {:?} to {:?}, replacing it",
            state.id, new_id
        );
        self.delete(&state.id).await?;
        state.id.clear();
        Ok(true)
    }

    /// Refreshes `state` from Vault.
    ///
    /// A legacy ID is upgraded first. If the ID cannot be decoded the record
    /// is dropped (its ID cleared) and [`RoleError::InvalidId`] is returned.
    pub async fn read(&self, state: &mut RoleState) -> Result<(), RoleError> {
        state.upgrade_id();

        let path = state.id.clone();
        let decoded =
            name_from_path(&path).and_then(|name| backend_from_path(&path).map(|b| (name, b)));
        let (name, backend) = match decoded {
            Ok(parts) => parts,
            Err(e) => {
                warn!("Removing consul role {:?} because its ID is invalid", path);
                state.id.clear();
                return Err(RoleError::InvalidId(e));
            }
        };

        debug!("Reading Consul secrets backend role at {:?}", path);
        let data = self
            .logical
            .read(&path)
            .await
            .map_err(|source| RoleError::Read {
                id: path.clone(),
                source,
            })?
            .ok_or_else(|| RoleError::NotFound(path.clone()))?;

        state.name = name;
        state.set_mount(backend);
        state.apply_remote(&data)
    }

    /// Deletes the role stored at `id`.
    pub async fn delete(&self, id: &str) -> Result<(), RoleError> {
        debug!("Deleting Consul backend role at {:?}", id);
        self.logical
            .delete(id)
            .await
            .map_err(|source| RoleError::Delete {
                id: id.to_string(),
                source,
            })?;
        debug!("Deleted Consul backend role at {:?}", id);
        Ok(())
    }

    /// Reports whether Vault still holds the role for `state`, upgrading a
    /// legacy ID first.
    pub async fn exists(&self, state: &mut RoleState) -> Result<bool, RoleError> {
        state.upgrade_id();
        debug!("Checking Consul secrets backend role at {:?}", state.id);
        let secret = self
            .logical
            .read(&state.id)
            .await
            .map_err(|source| RoleError::Read {
                id: state.id.clone(),
                source,
            })?;
        Ok(secret.is_some())
    }

    /// Builds a record for an existing role from its ID alone.
    pub async fn import(&self, id: &str) -> Result<RoleState, RoleError> {
        let mut state = RoleState::with_id(id);
        self.read(&mut state).await?;
        Ok(state)
    }
}
