use clap::Parser;

use courier_client::{Cli, ClientConfig};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env();
    cli.execute(config).await.to_exit_code()
}
