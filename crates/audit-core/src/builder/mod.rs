//! Builder for constructing audit engines.
//!
//! Resolves the storage backend from the configured DSN, wires the stores,
//! the audit pipeline and the transition service around one shared
//! [`StorageService`], and inserts the configured seed orders.

use crate::audit::{AuditDispatcher, AuditRecorder};
use crate::engine::AuditEngine;
use crate::state::{TransitionPolicy, TransitionService};
use crate::store::{AuditLogStore, OrderStore};
use audit_config::Config;
use audit_storage::{create_backend, Dsn, StorageError, StorageInterface, StorageService};
use audit_types::{Order, OrderStatus};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Builds an [`AuditEngine`] from configuration.
pub struct AuditEngineBuilder {
	config: Config,
	backend: Option<Box<dyn StorageInterface>>,
}

impl AuditEngineBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			backend: None,
		}
	}

	/// Uses `backend` instead of the one named by the configured DSN.
	pub fn with_backend(mut self, backend: Box<dyn StorageInterface>) -> Self {
		self.backend = Some(backend);
		self
	}

	/// Builds the engine and starts its audit workers.
	///
	/// Must be called inside a tokio runtime.
	pub async fn build(self) -> Result<AuditEngine, BuilderError> {
		let config = self.config;

		let backend = match self.backend {
			Some(backend) => backend,
			None => {
				let dsn = Dsn::parse(&config.storage.dsn)
					.map_err(|e| BuilderError::Config(e.to_string()))?;
				create_backend(&dsn).map_err(|e| BuilderError::Config(e.to_string()))?
			}
		};
		let storage = Arc::new(StorageService::new(backend));

		let policy = TransitionPolicy::from_config(config.transitions.as_ref())
			.map_err(|e| BuilderError::Config(format!("Invalid transitions: {}", e)))?;
		if let TransitionPolicy::Graph(graph) = &policy {
			tracing::info!(component = "transitions", statuses = graph.len(), "Loaded transition graph");
		}

		let orders = Arc::new(OrderStore::new(storage.clone()));
		let audit_log = Arc::new(AuditLogStore::new(storage.clone()));
		let recorder = Arc::new(
			AuditRecorder::new(audit_log.clone())
				.with_retry_budget(Duration::from_millis(config.audit.retry_max_elapsed_ms)),
		);
		let dispatcher = Arc::new(AuditDispatcher::start(
			recorder,
			config.audit.workers,
			config.audit.queue_warn_depth,
		));
		let transitions = Arc::new(TransitionService::new(
			orders.clone(),
			audit_log.clone(),
			dispatcher.clone(),
			policy,
		));

		seed_orders(&config, &orders).await?;

		Ok(AuditEngine {
			config,
			storage,
			orders,
			audit_log,
			dispatcher,
			transitions,
		})
	}
}

/// Inserts configured orders that are not stored yet. Existing orders are left as they are.
async fn seed_orders(config: &Config, orders: &OrderStore) -> Result<(), BuilderError> {
	for seed in &config.seed.orders {
		let status = OrderStatus::new(seed.status.as_str())
			.map_err(|e| BuilderError::Config(format!("Seed order {}: {}", seed.id, e)))?;

		match orders.insert(Order::new(seed.id, seed.customer_id, status)).await {
			Ok(order) => {
				tracing::info!(order_id = order.id, status = %order.status, "Seeded order");
			}
			Err(StorageError::Conflict(_)) => {
				tracing::debug!(order_id = seed.id, "Seed order already present");
			}
			Err(e) => return Err(BuilderError::Storage(e.to_string())),
		}
	}
	Ok(())
}
