use anyhow::Result;
use clap::{Parser, Subcommand};
use refcollector::access::ScopeKey;
use refcollector::config::Config;
use refcollector::storage;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "refcollector-admin")]
#[command(about = "Click collector maintenance CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop unscoped legacy rows and backfill missing locations from earlier clicks
    Repair,
    /// Print the pin_hash value that tags clicks with a PIN's scope
    Scope {
        /// PIN to derive the scope for
        pin: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Repair => {
            let store = storage::connect(&config.database).await?;
            let report = store.repair().await?;
            println!("✓ Repair finished");
            println!("{:<12} {}", "Deleted", report.deleted);
            println!("{:<12} {}", "Backfilled", report.backfilled);
            println!("{:<12} {}", "Unresolved", report.unresolved);
        }
        Commands::Scope { pin } => {
            let scope = ScopeKey::new(&config.access.salt).derive(&pin)?;
            println!("{}", scope);
        }
    }

    Ok(())
}
