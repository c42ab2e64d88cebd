//! HTTP Mock API - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use http_mock_api::output::LogSubscriber;
use http_mock_api::{MockApi, MockServerConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "http-mock-api",
    about = "Embeddable HTTP mock API - serve canned responses for expected requests",
    version
)]
struct Args {
    /// Path to configuration file (YAML, or JSON with a .json extension)
    #[arg(short, long, default_value = "mock-api.yaml")]
    config: PathBuf,

    /// Port to listen on, overriding the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind, overriding the configuration
    #[arg(long)]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let default_config = include_str!("../demos/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockServerConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no requests)");
        MockServerConfig::default()
    };

    if args.validate {
        config.validate()?;
        println!(
            "Configuration is valid ({} requests defined)",
            config.requests.len()
        );
        return Ok(());
    }

    if let Some(port) = args.port {
        config.port = Some(port);
    }
    if let Some(host) = args.host {
        config.host = host;
    }

    let api = MockApi::from_config(&config)?;

    info!("Starting mock API...");
    api.start().await?;
    info!(url = %api.url(), "Listening");

    let subscriber = LogSubscriber::start(
        api.output(),
        Duration::from_millis(config.settings.drain_interval_ms.max(1)),
    );

    tokio::signal::ctrl_c().await?;

    info!("Stopping...");
    api.stop().await;
    subscriber.stop().await;
    info!("Stopped");

    Ok(())
}
