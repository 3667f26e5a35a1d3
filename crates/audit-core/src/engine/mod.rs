//! Assembled audit engine.
//!
//! The [`AuditEngine`] holds every shared component of a running service and
//! is cheap to clone. Surfaces such as the HTTP API only talk to it.

use crate::audit::AuditDispatcher;
use crate::state::TransitionService;
use crate::store::{AuditLogStore, OrderStore};
use audit_config::Config;
use audit_storage::StorageService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuditEngine {
	pub(crate) config: Config,
	pub(crate) storage: Arc<StorageService>,
	pub(crate) orders: Arc<OrderStore>,
	pub(crate) audit_log: Arc<AuditLogStore>,
	pub(crate) dispatcher: Arc<AuditDispatcher>,
	pub(crate) transitions: Arc<TransitionService>,
}

impl AuditEngine {
	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn orders(&self) -> &Arc<OrderStore> {
		&self.orders
	}

	pub fn audit_log(&self) -> &Arc<AuditLogStore> {
		&self.audit_log
	}

	pub fn transitions(&self) -> &Arc<TransitionService> {
		&self.transitions
	}

	/// Stops accepting audit jobs and waits for queued ones to be written.
	pub async fn shutdown(&self) {
		tracing::info!("Shutting down audit engine");
		self.dispatcher.shutdown().await;
	}
}
