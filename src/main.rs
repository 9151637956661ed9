use anyhow::Result;
use clap::{Parser, Subcommand};
use fxmux::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve,
    /// Create default configuration
    Setup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(Commands::Serve) | None => fxmux::run(cli.config_path.as_deref()).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> Result<()> {
    use anyhow::Context;

    let path = fxmux::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
server:
  listen: "127.0.0.1:8080"

providers:
  frankfurter:
    latest_url: "https://api.frankfurter.dev/v1/latest"
    historical_url: "https://api.frankfurter.dev/v1/"
  fixer:
    latest_url: "https://data.fixer.io/api/latest"
    timeseries_url: "https://data.fixer.io/api/timeseries"
    access_key: ""

rate_limits:
  inbound:
    permit_limit: 100
    window_secs: 60
    queue_limit: 20
  outbound:
    token_limit: 10
    tokens_per_period: 10
    period_secs: 1
    queue_limit: 16

# cache:
#   ttl_secs: 300
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
