use std::path::PathBuf;

use clap::{Parser, Subcommand};

use courier_relay::{RelayConfig, RelayServer};

#[derive(Parser, Debug)]
#[command(name = "courier-relay")]
#[command(version, about = "Courier relay server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the relay
    Start {
        /// Config file path (falls back to COURIER_* environment variables)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Start { config } => {
            let config = match config {
                Some(path) => RelayConfig::from_toml(path)?,
                None => RelayConfig::from_env()?,
            };
            RelayServer::new(config)?.start().await
        }
    }
}
