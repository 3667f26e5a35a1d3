//! Configuration for the order audit service.
//!
//! Configuration is read from TOML. `${VAR}` and `${VAR:-default}` references
//! are resolved from the environment before parsing, and the result is
//! validated before it is handed to the rest of the system.
//!
//! A file may pull in others with `include = ["storage.toml", ...]`. Every
//! top-level section must come from exactly one file.

/// Builders for test and development configurations.
#[cfg(any(test, feature = "testing"))]
pub mod builders {
	pub mod config;
}
mod loader;

use audit_types::OrderStatus;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use thiserror::Error;

#[cfg(any(test, feature = "testing"))]
pub use builders::config::ConfigBuilder;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the order audit service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	pub service: ServiceConfig,
	/// Storage backend selection.
	pub storage: StorageConfig,
	/// Background audit recording.
	#[serde(default)]
	pub audit: AuditConfig,
	/// HTTP API server.
	pub api: Option<ApiConfig>,
	/// Allowed status transitions, keyed by source status.
	///
	/// When absent any status may change to any other status.
	pub transitions: Option<BTreeMap<String, Vec<String>>>,
	/// Orders inserted at startup when missing.
	#[serde(default)]
	pub seed: SeedConfig,
}

/// Configuration specific to the service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Identifier used in logs.
	pub id: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Connection string selecting the backend, e.g. `memory://` or
	/// `file://./data`.
	pub dsn: String,
}

/// Configuration for background audit recording.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
	/// Number of worker tasks writing audit records.
	#[serde(default = "default_audit_workers")]
	pub workers: usize,
	/// Pending records on one worker at which a backlog warning is logged.
	/// Records are never dropped.
	#[serde(default = "default_queue_warn_depth")]
	pub queue_warn_depth: usize,
	/// Total time in milliseconds spent retrying a failed audit write.
	/// Zero disables retries.
	#[serde(default)]
	pub retry_max_elapsed_ms: u64,
}

impl Default for AuditConfig {
	fn default() -> Self {
		Self {
			workers: default_audit_workers(),
			queue_warn_depth: default_queue_warn_depth(),
			retry_max_elapsed_ms: 0,
		}
	}
}

/// Returns the default number of audit workers.
fn default_audit_workers() -> usize {
	4
}

/// Returns the default per-worker backlog warning threshold.
fn default_queue_warn_depth() -> usize {
	1024
}

/// Upper bound for `audit.workers`.
const MAX_AUDIT_WORKERS: usize = 64;

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	/// CORS configuration. Permissive when absent.
	pub cors: Option<CorsConfig>,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// Allowed origins for CORS.
	pub allowed_origins: Vec<String>,
}

/// Returns the default API host.
fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

/// Returns the default API port.
fn default_api_port() -> u16 {
	3000
}

/// Returns the default API timeout in seconds.
fn default_api_timeout() -> u64 {
	30
}

/// Returns the default maximum request size in bytes.
fn default_max_request_size() -> usize {
	64 * 1024
}

/// Orders created at startup.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SeedConfig {
	#[serde(default)]
	pub orders: Vec<SeedOrder>,
}

/// One order to create at startup if it does not exist yet.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedOrder {
	pub id: u64,
	pub customer_id: u64,
	#[serde(default = "default_seed_status")]
	pub status: String,
}

fn default_seed_status() -> String {
	audit_types::DEFAULT_STATUS.to_string()
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}. Lines whose
/// first non-blank character is `#` are TOML comments and left untouched.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut missing = None;
	let mut resolved = String::with_capacity(input.len());
	for line in input.split_inclusive('\n') {
		// Comment lines are copied as written.
		if line.trim_start().starts_with('#') {
			resolved.push_str(line);
			continue;
		}
		let replaced = re.replace_all(line, |caps: &regex::Captures<'_>| {
			let var_name = &caps[1];
			match (std::env::var(var_name), caps.get(2)) {
				(Ok(value), _) => value,
				(Err(_), Some(default)) => default.as_str().to_string(),
				(Err(_), None) => {
					missing.get_or_insert_with(|| var_name.to_string());
					String::new()
				}
			}
		});
		resolved.push_str(&replaced);
	}

	match missing {
		Some(var_name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			var_name
		))),
		None => Ok(resolved),
	}
}

impl Config {
	/// Loads configuration from a file, following include directives.
	///
	/// Relative paths resolve against the working directory.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		loader::ConfigLoader::new(".").load_config(path).await
	}

	/// Returns true when the HTTP API should be started.
	pub fn api_enabled(&self) -> bool {
		self.api.as_ref().is_some_and(|api| api.enabled)
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// - Service id is not empty
	/// - The storage DSN names a scheme
	/// - Audit worker and queue sizes are within bounds
	/// - Every status named in `transitions` and `seed` is a valid token
	/// - Seed order ids are unique
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		let dsn = self.storage.dsn.trim();
		if dsn.is_empty() {
			return Err(ConfigError::Validation("Storage DSN cannot be empty".into()));
		}
		if !dsn.contains("://") {
			return Err(ConfigError::Validation(format!(
				"Storage DSN '{}' must have the form scheme://...",
				dsn
			)));
		}

		if self.audit.workers == 0 || self.audit.workers > MAX_AUDIT_WORKERS {
			return Err(ConfigError::Validation(format!(
				"audit.workers must be between 1 and {}",
				MAX_AUDIT_WORKERS
			)));
		}
		if self.audit.queue_warn_depth == 0 {
			return Err(ConfigError::Validation(
				"audit.queue_warn_depth must be at least 1".into(),
			));
		}

		if let Some(ref api) = self.api {
			if api.enabled && api.port == 0 {
				return Err(ConfigError::Validation("api.port cannot be 0".into()));
			}
		}

		if let Some(ref transitions) = self.transitions {
			for (from, targets) in transitions {
				validate_status("transitions", from)?;
				for to in targets {
					validate_status("transitions", to)?;
					if to == from {
						return Err(ConfigError::Validation(format!(
							"Transition '{}' -> '{}' does not change the status",
							from, to
						)));
					}
				}
			}
		}

		let mut seen = HashSet::new();
		for order in &self.seed.orders {
			validate_status("seed.orders", &order.status)?;
			if !seen.insert(order.id) {
				return Err(ConfigError::Validation(format!(
					"Duplicate seed order id {}",
					order.id
				)));
			}
		}

		Ok(())
	}
}

fn validate_status(section: &str, token: &str) -> Result<(), ConfigError> {
	OrderStatus::new(token)
		.map(|_| ())
		.map_err(|e| ConfigError::Validation(format!("Invalid status in {}: {}", section, e)))
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
