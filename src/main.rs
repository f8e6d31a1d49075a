// src/main.rs
use tracing::error;

#[tokio::main]
async fn main() {
    vault_consul_role::init_logging();

    if let Err(err) = vault_consul_role::cli::run_cli().await {
        error!("{:#}", err);
        std::process::exit(1);
    }
}
