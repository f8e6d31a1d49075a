//! Coordinates role operations in Vault with the local state store.
//!
//! Every operation that can rewrite or invalidate a role's ID persists the
//! outcome before returning: upgraded legacy IDs are stored under the new
//! path, and records whose ID no longer decodes or whose role is gone from
//! Vault are dropped.

use tracing::{info, warn};

use crate::database::StateStore;
use crate::interface::Logical;
use crate::vault::role_id::migrate_legacy_id;
use crate::vault::{ConsulRoleConfig, ConsulRoleResource, RoleError, RoleState};

pub struct RoleManager<L> {
    resource: ConsulRoleResource<L>,
    store: StateStore,
}

impl<L: Logical> RoleManager<L> {
    pub fn new(logical: L, store: StateStore) -> Self {
        Self {
            resource: ConsulRoleResource::new(logical),
            store,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Creates or updates the role described by `config`.
    ///
    /// `replaces` names the record this configuration previously produced.
    /// Without it, a record under the role's path or under a legacy
    /// `<backend>,<name>` ID for the same role is used. When the tracked ID
    /// differs from the new one the old role is deleted and its record dropped
    /// before the new role is written.
    pub async fn apply(
        &self,
        config: &ConsulRoleConfig,
        replaces: Option<&str>,
    ) -> Result<RoleState, RoleError> {
        let id = config.role_id()?.path();
        let previous_id = match replaces {
            Some(replaces) => Some(replaces.to_string()),
            None => self.tracked_id(&id)?,
        };

        if let Some(previous_id) = &previous_id {
            if let Some(mut previous) = self.store.load(previous_id)? {
                if self.resource.retire(&mut previous, &id).await? {
                    self.store.remove(previous_id)?;
                }
            }
        }

        let state = self.resource.write(config).await?;
        match previous_id {
            Some(previous_id) if previous_id != state.id => {
                self.store.replace_id(&previous_id, &state)?
            }
            _ => self.store.save(&state)?,
        }
        info!("Applied Consul role {}", state.id);
        Ok(state)
    }

    /// ID of the record tracking the role at `id`, which may be a legacy ID
    /// that has not been upgraded yet.
    fn tracked_id(&self, id: &str) -> Result<Option<String>, RoleError> {
        if self.store.load(id)?.is_some() {
            return Ok(Some(id.to_string()));
        }
        Ok(self
            .store
            .list()?
            .into_iter()
            .map(|state| state.id)
            .find(|tracked| tracked != id && migrate_legacy_id(tracked) == id))
    }

    /// Re-reads a tracked role from Vault. Returns `None` when the role no
    /// longer exists, in which case its record has been dropped.
    pub async fn refresh(&self, id: &str) -> Result<Option<RoleState>, RoleError> {
        let mut state = self
            .store
            .load(id)?
            .ok_or_else(|| RoleError::NotTracked(id.to_string()))?;

        if !self.resource.exists(&mut state).await? {
            warn!("Consul role {} no longer exists, removing it from state", state.id);
            self.store.remove(id)?;
            return Ok(None);
        }

        match self.resource.read(&mut state).await {
            Ok(()) => {
                if state.id != id {
                    self.store.replace_id(id, &state)?;
                } else {
                    self.store.save(&state)?;
                }
                Ok(Some(state))
            }
            Err(e @ RoleError::InvalidId(_)) => {
                self.store.remove(id)?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Reports whether the role still exists, persisting an upgraded ID.
    pub async fn exists(&self, id: &str) -> Result<bool, RoleError> {
        let tracked = self.store.load(id)?;
        let mut state = tracked.clone().unwrap_or_else(|| RoleState::with_id(id));
        let exists = self.resource.exists(&mut state).await?;
        if tracked.is_some() && state.id != id {
            self.store.replace_id(id, &state)?;
        }
        Ok(exists)
    }

    /// Deletes the role from Vault and drops its record.
    pub async fn delete(&self, id: &str) -> Result<(), RoleError> {
        let mut state = self
            .store
            .load(id)?
            .unwrap_or_else(|| RoleState::with_id(id));
        state.upgrade_id();

        self.resource.delete(&state.id).await?;
        self.store.remove(id)?;
        if state.id != id {
            self.store.remove(&state.id)?;
        }
        info!("Deleted Consul role {}", state.id);
        Ok(())
    }

    /// Starts tracking an existing role identified by `id`.
    pub async fn import(&self, id: &str) -> Result<RoleState, RoleError> {
        let state = self.resource.import(id).await?;
        self.store.save(&state)?;
        info!("Imported Consul role {}", state.id);
        Ok(state)
    }

    pub fn list(&self) -> Result<Vec<RoleState>, RoleError> {
        Ok(self.store.list()?)
    }
}
