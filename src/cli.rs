use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::database::StateStore;
use crate::manager::RoleManager;
use crate::vault::common::mount_consul_engine;
use crate::vault::role_id::{backend_from_path, migrate_legacy_id, name_from_path, role_path};
use crate::vault::{ConsulRoleConfig, RoleState, TokenType, VaultClient, VaultConfig};

#[derive(Parser, Debug)]
#[command(
    name = "vault-consul-role",
    about = "Manage Consul secrets engine roles in Vault",
    version
)]
pub struct Cli {
    /// Vault server address.
    #[arg(
        long,
        default_value = "http://127.0.0.1:8200",
        global = true,
        env = "VAULT_ADDR"
    )]
    pub vault_addr: String,

    /// Vault token used for all requests.
    #[arg(long, global = true, env = "VAULT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Vault Enterprise namespace.
    #[arg(long, global = true, env = "VAULT_NAMESPACE")]
    pub namespace: Option<String>,

    /// SQLite file holding the managed role records.
    #[arg(
        long,
        default_value = "consul-roles.db",
        global = true,
        env = "CONSUL_ROLE_STATE_DB"
    )]
    pub state_db: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or update a role.
    Apply(RoleArgs),
    /// Re-read a managed role from Vault.
    Refresh { id: String },
    /// Delete a role from Vault and stop tracking it.
    Delete { id: String },
    /// Check whether a role exists in Vault.
    Exists { id: String },
    /// Start tracking a role that already exists in Vault.
    Import { id: String },
    /// List managed roles.
    List,
    /// Enable the Consul secrets engine.
    Mount {
        #[arg(long, default_value = "consul")]
        path: String,
    },
    /// Work with role IDs without contacting Vault.
    Id {
        #[command(subcommand)]
        command: IdCommand,
    },
}

#[derive(Args, Debug)]
pub struct RoleArgs {
    /// Role name.
    #[arg(long)]
    pub name: String,
    /// Path of the Consul secrets engine.
    #[arg(long)]
    pub backend: Option<String>,
    /// Deprecated alias for --backend.
    #[arg(long, hide = true)]
    pub path: Option<String>,
    /// Consul policies to attach.
    #[arg(long, value_delimiter = ',')]
    pub policies: Vec<String>,
    /// Consul roles to attach (Vault 1.10+).
    #[arg(long, value_delimiter = ',')]
    pub consul_roles: Vec<String>,
    #[arg(long)]
    pub consul_namespace: Option<String>,
    #[arg(long)]
    pub partition: Option<String>,
    /// Maximum lease TTL in seconds.
    #[arg(long, default_value_t = 0)]
    pub max_ttl: u64,
    /// Lease TTL in seconds.
    #[arg(long, default_value_t = 0)]
    pub ttl: u64,
    /// "client" or "management".
    #[arg(long, default_value = "client")]
    pub token_type: TokenType,
    /// Keep tokens local to the datacenter.
    #[arg(long)]
    pub local: bool,
    /// ID of the role this one replaces, when the name or backend changed.
    #[arg(long)]
    pub replaces: Option<String>,
}

impl From<RoleArgs> for ConsulRoleConfig {
    fn from(args: RoleArgs) -> Self {
        ConsulRoleConfig {
            name: args.name,
            backend: args.backend,
            path: args.path,
            policies: args.policies,
            consul_roles: args.consul_roles.into_iter().collect::<BTreeSet<_>>(),
            consul_namespace: args.consul_namespace,
            partition: args.partition,
            max_ttl: args.max_ttl,
            ttl: args.ttl,
            token_type: args.token_type,
            local: args.local,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum IdCommand {
    /// Build a role ID from a backend and a name.
    Encode { backend: String, name: String },
    /// Split a role ID into backend and name.
    Decode { id: String },
    /// Rewrite a legacy "<backend>,<name>" ID.
    Migrate { id: String },
}

impl Cli {
    pub fn vault_config(&self) -> VaultConfig {
        VaultConfig {
            url: self.vault_addr.clone(),
            token: self.token.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

fn print_state(state: &RoleState) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(state)?);
    Ok(())
}

fn run_id_command(command: IdCommand) -> Result<()> {
    match command {
        IdCommand::Encode { backend, name } => println!("{}", role_path(&backend, &name)),
        IdCommand::Decode { id } => {
            let backend = backend_from_path(&id)?;
            let name = name_from_path(&id)?;
            println!("backend: {}", backend);
            println!("name: {}", name);
        }
        IdCommand::Migrate { id } => println!("{}", migrate_legacy_id(&id)),
    }
    Ok(())
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run(cli).await
}

fn open_manager(config: &VaultConfig, state_db: &str) -> Result<RoleManager<VaultClient>> {
    let client = VaultClient::from_config(config).context("Failed to create Vault client")?;
    let store = StateStore::new(state_db)
        .with_context(|| format!("Failed to open state database {}", state_db))?;
    Ok(RoleManager::new(client, store))
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.vault_config();
    let state_db = cli.state_db;

    match cli.command {
        Commands::Id { command } => run_id_command(command)?,
        Commands::Mount { path } => {
            let client =
                VaultClient::from_config(&config).context("Failed to create Vault client")?;
            info!("Mounting Consul secrets engine at {} on {}", path, config.url);
            mount_consul_engine(&client, &path).await?;
        }
        Commands::Apply(args) => {
            let manager = open_manager(&config, &state_db)?;
            let replaces = args.replaces.clone();
            let role = ConsulRoleConfig::from(args);
            let state = manager.apply(&role, replaces.as_deref()).await?;
            print_state(&state)?;
        }
        Commands::Refresh { id } => {
            let manager = open_manager(&config, &state_db)?;
            match manager.refresh(&id).await? {
                Some(state) => print_state(&state)?,
                None => warn!("Role {} no longer exists in Vault", id),
            }
        }
        Commands::Delete { id } => open_manager(&config, &state_db)?.delete(&id).await?,
        Commands::Exists { id } => {
            let exists = open_manager(&config, &state_db)?.exists(&id).await?;
            println!("{}", exists);
        }
        Commands::Import { id } => {
            let state = open_manager(&config, &state_db)?.import(&id).await?;
            print_state(&state)?;
        }
        Commands::List => {
            for state in open_manager(&config, &state_db)?.list()? {
                println!("{}", state.id);
            }
        }
    }
    Ok(())
}
