//! Common test fixtures for Vault integration tests.
//!
//! Starts a HashiCorp Vault container in dev mode with a fixed root token
//! (`"root"`). To run these tests, set the environment variable
//! `VAULT_CONSUL_ROLE_RUN_INTEGRATION_TESTS=true`.

use std::time::Duration;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tokio::time::sleep;

pub const ROOT_TOKEN: &str = "root";

pub fn integration_enabled() -> bool {
    std::env::var("VAULT_CONSUL_ROLE_RUN_INTEGRATION_TESTS")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

pub struct VaultFixture {
    _container: ContainerAsync<GenericImage>,
    port: u16,
}

impl VaultFixture {
    pub async fn new() -> Self {
        let container = GenericImage::new("hashicorp/vault", "1.18.4")
            .with_exposed_port(8200.tcp())
            .with_wait_for(WaitFor::message_on_stdout("Vault server started!"))
            .with_env_var("VAULT_DEV_ROOT_TOKEN_ID", ROOT_TOKEN)
            .with_env_var("VAULT_DEV_LISTEN_ADDRESS", "0.0.0.0:8200")
            .with_cmd(vec!["server", "-dev", "-dev-root-token-id=root"])
            .start()
            .await
            .expect("Failed to start Vault container");

        let port = container
            .get_host_port_ipv4(8200)
            .await
            .expect("Vault port is not mapped");

        // Give Vault a moment after the startup banner.
        sleep(Duration::from_secs(1)).await;

        VaultFixture {
            _container: container,
            port,
        }
    }

    pub fn vault_addr(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}
