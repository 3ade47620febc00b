use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wayfinder::{create_standard_client_factory, ClientConfig, ClientFactory, HttpTransportFactory, LocalRegistry};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "wayfinder")]
#[command(about = "Wayfinder CLI - discovery client tools")]
#[command(version)]
struct Cli {
    /// Client configuration file (TOML); defaults apply when it does not exist
    #[arg(short, long, env = "WAYFINDER_CONFIG", default_value = "wayfinder.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve and print the candidate discovery servers
    Resolve,

    /// Fetch the registry and print applications and instances
    Fetch {
        /// Only print this application
        #[arg(short, long)]
        app: Option<String>,
    },

    /// Register the configured instance
    Register,

    /// Renew the lease of the configured instance
    Heartbeat {
        /// Number of heartbeats to send
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,

        /// Seconds between heartbeats
        #[arg(long, default_value = "30")]
        interval_secs: u64,
    },

    /// Cancel the lease of the configured instance
    Cancel,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,wayfinder=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = ClientConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    tracing::info!(
        config = %cli.config.display(),
        region = %config.region,
        zone = %config.my_zone(),
        "Loaded client configuration"
    );

    let registry = Arc::new(LocalRegistry::new(config.registry_staleness()));
    let transport = Arc::new(HttpTransportFactory::new(&config)?);
    let factory = create_standard_client_factory(&config, registry.clone(), transport)?;

    let result = match cli.command {
        Commands::Resolve => commands::run_resolve(&factory).await,
        Commands::Fetch { app } => commands::run_fetch(&factory, &registry, app.as_deref()).await,
        Commands::Register => commands::run_register(&factory, &config).await,
        Commands::Heartbeat { count, interval_secs } => {
            commands::run_heartbeat(&factory, &config, count, interval_secs).await
        }
        Commands::Cancel => commands::run_cancel(&factory, &config).await,
    };

    factory.shutdown();
    result
}
