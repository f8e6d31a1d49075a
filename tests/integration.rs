//! Integration tests for vault-consul-role using Testcontainers.
//!
//! These tests use the Vault fixture defined in `tests/common.rs` and exercise
//! the role lifecycle against a real Consul secrets engine mount. They run
//! only if `VAULT_CONSUL_ROLE_RUN_INTEGRATION_TESTS` is set; otherwise they
//! return early.

mod common;

use vault_consul_role::vault::common::mount_consul_engine;
use vault_consul_role::{
    ConsulRoleConfig, RoleError, RoleManager, RoleState, StateStore, TokenType, VaultClient,
};

async fn manager(addr: &str) -> RoleManager<VaultClient> {
    let client = VaultClient::new(addr, common::ROOT_TOKEN).unwrap();
    mount_consul_engine(&client, "consul").await.unwrap();
    RoleManager::new(client, StateStore::in_memory().unwrap())
}

fn config(name: &str) -> ConsulRoleConfig {
    ConsulRoleConfig {
        policies: vec!["readonly".to_string()],
        ttl: 120,
        max_ttl: 240,
        ..ConsulRoleConfig::new("consul", name)
    }
}

#[tokio::test]
async fn test_role_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
    if !common::integration_enabled() {
        return Ok(());
    }
    let vault = common::VaultFixture::new().await;
    let manager = manager(&vault.vault_addr()).await;

    let state = manager.apply(&config("web"), None).await?;
    assert_eq!(state.id, "consul/roles/web");
    assert_eq!(state.policies, vec!["readonly"]);
    assert_eq!(state.ttl, 120);
    assert_eq!(state.max_ttl, 240);
    assert_eq!(state.token_type, TokenType::Client);

    let mut updated = config("web");
    updated.ttl = 60;
    let state = manager.apply(&updated, None).await?;
    assert_eq!(state.ttl, 60);

    assert!(manager.exists("consul/roles/web").await?);
    manager.delete("consul/roles/web").await?;
    assert!(!manager.exists("consul/roles/web").await?);
    assert!(manager.list()?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_legacy_id_is_upgraded_on_refresh() -> Result<(), Box<dyn std::error::Error>> {
    if !common::integration_enabled() {
        return Ok(());
    }
    let vault = common::VaultFixture::new().await;
    let manager = manager(&vault.vault_addr()).await;

    manager.apply(&config("api"), None).await?;
    manager.store().remove("consul/roles/api")?;
    manager.store().save(&RoleState::with_id("consul,api"))?;

    let state = manager.refresh("consul,api").await?.expect("role exists");
    assert_eq!(state.id, "consul/roles/api");
    assert_eq!(state.name, "api");
    assert!(manager.store().load("consul,api")?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_validation_happens_before_any_request() -> Result<(), Box<dyn std::error::Error>> {
    if !common::integration_enabled() {
        return Ok(());
    }
    let vault = common::VaultFixture::new().await;
    let manager = manager(&vault.vault_addr()).await;

    let err = manager
        .apply(&ConsulRoleConfig::new("consul", "empty"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RoleError::NoPoliciesOrRoles));
    assert!(!manager.exists("consul/roles/empty").await?);

    Ok(())
}
