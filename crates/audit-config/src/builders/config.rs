//! Configuration builder for creating test and development configurations.
//!
//! This module provides utilities for constructing Config instances with
//! sensible defaults, particularly useful for testing scenarios.

use crate::{ApiConfig, AuditConfig, Config, SeedConfig, SeedOrder, ServiceConfig, StorageConfig};
use std::collections::BTreeMap;

/// Builder for creating `Config` instances with a fluent API.
///
/// Defaults to an in-memory store, permissive transitions and no API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	dsn: String,
	audit: AuditConfig,
	api: Option<ApiConfig>,
	transitions: Option<BTreeMap<String, Vec<String>>>,
	seed_orders: Vec<SeedOrder>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` with default values suitable for testing.
	pub fn new() -> Self {
		Self {
			service_id: "test-audit".to_string(),
			dsn: "memory://".to_string(),
			audit: AuditConfig::default(),
			api: None,
			transitions: None,
			seed_orders: Vec::new(),
		}
	}

	/// Sets the service ID.
	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	/// Sets the storage DSN.
	pub fn dsn(mut self, dsn: impl Into<String>) -> Self {
		self.dsn = dsn.into();
		self
	}

	/// Sets the number of audit workers.
	pub fn audit_workers(mut self, workers: usize) -> Self {
		self.audit.workers = workers;
		self
	}

	/// Sets the per-worker backlog at which a warning is logged.
	pub fn audit_queue_warn_depth(mut self, depth: usize) -> Self {
		self.audit.queue_warn_depth = depth;
		self
	}

	/// Sets the audit retry budget in milliseconds.
	pub fn audit_retry_max_elapsed_ms(mut self, millis: u64) -> Self {
		self.audit.retry_max_elapsed_ms = millis;
		self
	}

	/// Sets the API configuration.
	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	/// Allows `from` to change into each of `to`.
	pub fn transition(mut self, from: &str, to: &[&str]) -> Self {
		self.transitions
			.get_or_insert_with(BTreeMap::new)
			.entry(from.to_string())
			.or_default()
			.extend(to.iter().map(|s| s.to_string()));
		self
	}

	/// Adds an order created at startup.
	pub fn seed_order(mut self, id: u64, customer_id: u64, status: &str) -> Self {
		self.seed_orders.push(SeedOrder {
			id,
			customer_id,
			status: status.to_string(),
		});
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			storage: StorageConfig { dsn: self.dsn },
			audit: self.audit,
			api: self.api,
			transitions: self.transitions,
			seed: SeedConfig {
				orders: self.seed_orders,
			},
		}
	}
}
