//! Gateway binary

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use switchyard::{Config, Gateway};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gateway", about = "Multi-tenant API gateway", version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "SWITCHYARD_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Log filter, e.g. `info` or `switchyard=debug`
    #[arg(long, env = "SWITCHYARD_LOG", default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log))
        .with_target(true)
        .init();

    let config = match load_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = Gateway::new(config).run().await {
        error!("Gateway exited with error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn load_config(cli: &Cli) -> switchyard::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path).await?,
        None => Config::from_env()?,
    };
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}
