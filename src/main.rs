use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use orrery::crypto::Argon2Crypto;
use orrery::hooks::RefContext;
use orrery::settings::Settings;
use orrery::storage::SqlStorage;
use orrery::{seed, Manager};

#[derive(Parser, Debug)]
#[command(
    name = "orrery",
    version,
    about = "Identity and authorization backend administration"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the initial entity holding GLOBAL_ROOT
    Bootstrap {
        id: String,
        /// Secret for the bootstrap entity
        #[arg(env = "ORRERY_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Show an entity with its effective groups and capabilities
    EntityInfo { id: String },
    /// Show a group with its resolved members
    GroupInfo { name: String },
    /// List the resolved members of a group
    Members { name: String },
    /// Apply a JSON seed file (defaults to `seed.file` from the configuration)
    Seed { file: Option<PathBuf> },
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage (database)
    let storage = SqlStorage::connect(&settings.database).await?;
    Migrator::up(storage.connection(), None).await.into_diagnostic()?;

    let refs = RefContext::new(Arc::new(storage), Arc::new(Argon2Crypto::new()));
    let manager = Manager::from_settings(&settings, refs)?;

    match cli.command {
        Command::Bootstrap { id, secret } => {
            manager.bootstrap(&id, &secret).await?;
            print_json(&manager.entity_info(&id).await?)?;
        }
        Command::EntityInfo { id } => print_json(&manager.entity_info(&id).await?)?,
        Command::GroupInfo { name } => print_json(&manager.group_info(&name).await?)?,
        Command::Members { name } => print_json(&manager.list_members(&name).await?)?,
        Command::Seed { file } => {
            let path = file
                .or_else(|| settings.seed.file.clone())
                .ok_or_else(|| miette::miette!("No seed file given and `seed.file` is not configured"))?;
            let summary = seed::sync_from_file(&manager, &path).await?;
            print_json(&summary)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}
