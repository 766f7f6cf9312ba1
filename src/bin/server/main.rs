// src/bin/server/main.rs - alertgate server binary

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use alertgate::{build_info, ApplicationStartup, Config};

#[derive(Parser, Debug)]
#[command(name = "alertgate-server")]
#[command(about = "Alarm event gateway server")]
#[command(version)]
struct Args {
    /// Configuration file; environment variables are used when omitted
    #[arg(short, long, env = "ALERTGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Only load and validate the configuration, then exit
    #[arg(long)]
    check: bool,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // Load before logging is up so the configured level can seed the filter
    let loaded = load_config(&args);
    let default_level = loaded
        .as_ref()
        .map(|c| c.log.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    info!("🚀 Starting {}", build_info());

    let config = match loaded {
        Ok(config) => {
            info!("✅ Configuration loaded successfully");

            if let Err(e) = config.validate() {
                error!("❌ Configuration validation failed: {}", e);
                std::process::exit(1);
            }

            info!("✅ Configuration validated successfully");
            config
        }
        Err(e) => {
            error!("❌ Failed to load configuration: {}", e);
            error!("💡 Pass --config <file> or set ALERTGATE_* environment variables:");
            error!("   - ALERTGATE_STORE_BACKEND (memory or etcd)");
            error!("   - ALERTGATE_STORE_ENDPOINTS (if using etcd)");
            error!("   - ALERTGATE_REGISTRY_BACKEND (http or fixture)");
            error!("   - ALERTGATE_SERVER_PORT (default: 8000)");
            std::process::exit(1);
        }
    };

    let summary = config.summary();
    info!("📋 Configuration Summary:");
    info!("  Server: {}", summary.server_endpoint);
    info!("  Store: {} (root {})", summary.store_backend, summary.store_root);
    info!("  Registry: {}", summary.registry_backend);
    info!("  Notify channels: {:?}", summary.notify_channels);
    info!("  Status rebuild interval: {}s", summary.status_rebuild_interval);
    info!("  Reconcile interval: {}s", summary.reconcile_interval);
    info!("  Metrics enabled: {}", summary.metrics_enabled);

    if args.check {
        info!("✅ Configuration check passed");
        return Ok(());
    }

    let startup = ApplicationStartup::new(config)?;

    match startup.start().await {
        Ok(_) => {
            info!("✅ alertgate server shut down gracefully");
            Ok(())
        }
        Err(e) => {
            error!("❌ alertgate server failed: {}", e);
            Err(e.into())
        }
    }
}
