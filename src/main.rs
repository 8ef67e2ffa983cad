//! Mesh gateway binary

use clap::{Parser, Subcommand};
use mesh_gateway::config::GatewayConfig;
use mesh_gateway::{Gateway, Result};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mesh-gateway",
    version,
    about = "Service-mesh API gateway — port-registry routing with JWT auth and RBAC"
)]
struct Cli {
    /// Path to the HCL configuration file
    #[arg(short, long, default_value = "gateway.hcl")]
    config: String,

    /// Override the listen address (e.g. "0.0.0.0:8080")
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the configuration file and exit
    Validate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "Gateway failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = GatewayConfig::from_file(&cli.config).await?;
    config.apply_env_overrides();
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }

    if matches!(cli.command, Some(Command::Validate)) {
        config.validate()?;
        println!(
            "Configuration OK: {} service(s), listening on {}",
            config.services.len(),
            config.listen
        );
        return Ok(());
    }

    let gateway = Gateway::new(config)?;
    gateway.start().await?;

    tokio::signal::ctrl_c().await?;
    gateway.shutdown().await;
    Ok(())
}
