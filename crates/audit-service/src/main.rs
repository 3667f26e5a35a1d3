//! Main entry point for the order audit service.
//!
//! This binary loads the configuration, builds the audit engine on the
//! configured storage backend and serves the HTTP API until interrupted.
//! Queued audit entries are written before the process exits.

use audit_config::Config;
use audit_core::AuditEngineBuilder;
use clap::Parser;
use std::path::PathBuf;

mod apis;
mod server;

/// Command-line arguments for the order audit service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the order audit service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the audit engine
/// 5. Serves the API until Ctrl+C, then drains the audit queues
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started order audit service");

	let config_path = args.config.to_str().ok_or_else(|| {
		format!(
			"Configuration path is not valid UTF-8: {}",
			args.config.display()
		)
	})?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = AuditEngineBuilder::new(config.clone()).build().await?;

	match config.api.clone() {
		Some(api_config) if config.api_enabled() => {
			server::start_server(api_config, engine.clone(), shutdown_signal()).await?;
			tracing::info!("API server finished");
		}
		_ => {
			tracing::info!("API disabled, waiting for shutdown signal");
			shutdown_signal().await;
		}
	}

	engine.shutdown().await;
	tracing::info!("Stopped order audit service");
	Ok(())
}

/// Completes on Ctrl+C.
async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!("Failed to listen for shutdown signal: {}", e);
	}
	tracing::info!("Shutdown signal received");
}
