//! Status change entry point.

use super::TransitionPolicy;
use crate::audit::{AuditDispatcher, AuditJob};
use crate::store::{AuditLogStore, OrderStore};
use audit_storage::StorageError;
use audit_types::{AuditLogEntry, Order, OrderStatus};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors returned to callers of [`TransitionService`].
///
/// Audit failures never show up here.
#[derive(Debug, Error)]
pub enum TransitionError {
	#[error("Order {0} not found")]
	NotFound(u64),
	#[error("Order is already in status '{status}'")]
	NoOpTransition { status: OrderStatus },
	#[error("Invalid status: {0}")]
	InvalidStatus(String),
	#[error("Transition from '{from}' to '{to}' is not allowed")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Applies status changes and queues their audit entries.
pub struct TransitionService {
	orders: Arc<OrderStore>,
	audit_log: Arc<AuditLogStore>,
	dispatcher: Arc<AuditDispatcher>,
	policy: TransitionPolicy,
}

impl TransitionService {
	pub fn new(
		orders: Arc<OrderStore>,
		audit_log: Arc<AuditLogStore>,
		dispatcher: Arc<AuditDispatcher>,
		policy: TransitionPolicy,
	) -> Self {
		Self {
			orders,
			audit_log,
			dispatcher,
			policy,
		}
	}

	/// Changes the status of an order and returns the updated record.
	///
	/// The order stays locked from the read until its audit job is queued,
	/// so audit entries of one order are recorded in transition order. The
	/// audit entry itself is written in the background; its outcome does not
	/// affect the result.
	#[instrument(skip(self, reason))]
	pub async fn change_status(
		&self,
		order_id: u64,
		new_status: &str,
		reason: Option<String>,
	) -> Result<Order, TransitionError> {
		let new_status = OrderStatus::new(new_status)
			.map_err(|e| TransitionError::InvalidStatus(e.to_string()))?;

		let guard = self.orders.lock(order_id).await;
		let current = self.orders.get(order_id).await.map_err(|e| match e {
			StorageError::NotFound => TransitionError::NotFound(order_id),
			other => TransitionError::Storage(other.to_string()),
		})?;

		if current.status == new_status {
			tracing::debug!(status = %new_status, "Rejected no-op transition");
			return Err(TransitionError::NoOpTransition { status: new_status });
		}

		if !self.policy.allows(&current.status, &new_status) {
			tracing::warn!(
				from = %current.status,
				to = %new_status,
				"Rejected transition"
			);
			return Err(TransitionError::InvalidTransition {
				from: current.status,
				to: new_status,
			});
		}

		let updated = self
			.orders
			.update_status_locked(&guard, new_status)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => TransitionError::NotFound(order_id),
				other => TransitionError::Storage(other.to_string()),
			})?;

		let job = AuditJob {
			order_id,
			old_status: current.status,
			new_status: updated.status.clone(),
			reason,
		};
		if let Err(e) = self.dispatcher.dispatch(job) {
			tracing::error!(error = %e, "Audit entry not queued");
		}
		drop(guard);

		tracing::info!(status = %updated.status, "Order status changed");
		Ok(updated)
	}

	/// Loads an order.
	pub async fn order(&self, order_id: u64) -> Result<Order, TransitionError> {
		self.orders.get(order_id).await.map_err(|e| match e {
			StorageError::NotFound => TransitionError::NotFound(order_id),
			other => TransitionError::Storage(other.to_string()),
		})
	}

	/// Lists the recorded transitions of an order, oldest first.
	///
	/// Entries are written in the background, so a transition that just
	/// returned may not be listed yet.
	pub async fn audit_log(&self, order_id: u64) -> Result<Vec<AuditLogEntry>, TransitionError> {
		self.audit_log
			.list_by_order(order_id)
			.await
			.map_err(|e| TransitionError::Storage(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::audit::AuditRecorder;
	use async_trait::async_trait;
	use audit_storage::implementations::memory::MemoryStorage;
	use audit_storage::{StorageInterface, StorageService};
	use audit_types::ConfigSchema;
	use mockall::mock;
	use std::collections::BTreeMap;
	use std::time::Duration;

	mock! {
		pub Backend {}

		#[async_trait]
		impl StorageInterface for Backend {
			async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;
			async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;
			async fn delete(&self, key: &str) -> Result<(), StorageError>;
			async fn exists(&self, key: &str) -> Result<bool, StorageError>;
			async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
			fn config_schema(&self) -> Box<dyn ConfigSchema>;
		}
	}

	struct Harness {
		service: TransitionService,
		orders: Arc<OrderStore>,
		audit_log: Arc<AuditLogStore>,
		dispatcher: Arc<AuditDispatcher>,
	}

	fn harness_with(
		policy: TransitionPolicy,
		audit_storage: Arc<StorageService>,
		workers: usize,
		warn_depth: usize,
	) -> Harness {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let orders = Arc::new(OrderStore::new(storage));
		let audit_log = Arc::new(AuditLogStore::new(audit_storage));
		let recorder = Arc::new(AuditRecorder::new(audit_log.clone()));
		let dispatcher = Arc::new(AuditDispatcher::start(recorder, workers, warn_depth));
		Harness {
			service: TransitionService::new(
				orders.clone(),
				audit_log.clone(),
				dispatcher.clone(),
				policy,
			),
			orders,
			audit_log,
			dispatcher,
		}
	}

	fn harness(policy: TransitionPolicy) -> Harness {
		let audit_storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		harness_with(policy, audit_storage, 2, 16)
	}

	async fn seed(harness: &Harness, id: u64, status: &str) {
		harness
			.orders
			.insert(Order::new(id, 42, OrderStatus::new(status).unwrap()))
			.await
			.unwrap();
	}

	async fn wait_for_entries(harness: &Harness, order_id: u64, count: usize) -> Vec<AuditLogEntry> {
		for _ in 0..100 {
			let entries = harness.service.audit_log(order_id).await.unwrap();
			if entries.len() >= count {
				return entries;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		harness.service.audit_log(order_id).await.unwrap()
	}

	#[tokio::test]
	async fn test_placed_to_shipped_then_repeat() {
		let harness = harness(TransitionPolicy::Permissive);
		seed(&harness, 1, "placed").await;

		let order = harness.service.change_status(1, "shipped", None).await.unwrap();
		assert_eq!(order.id, 1);
		assert_eq!(order.status.as_str(), "shipped");

		let entries = wait_for_entries(&harness, 1, 1).await;
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].old_status.as_str(), "placed");
		assert_eq!(entries[0].new_status.as_str(), "shipped");

		let repeat = harness.service.change_status(1, "shipped", None).await;
		assert!(matches!(repeat, Err(TransitionError::NoOpTransition { .. })));

		harness.dispatcher.shutdown().await;
		assert_eq!(harness.audit_log.list_by_order(1).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_change_persists_new_status() {
		let harness = harness(TransitionPolicy::Permissive);
		seed(&harness, 3, "placed").await;

		harness
			.service
			.change_status(3, "cancelled", Some("customer request".into()))
			.await
			.unwrap();

		assert_eq!(harness.orders.get(3).await.unwrap().status.as_str(), "cancelled");
		harness.dispatcher.shutdown().await;
		let entries = harness.audit_log.list_by_order(3).await.unwrap();
		assert_eq!(entries[0].reason.as_deref(), Some("customer request"));
	}

	#[tokio::test]
	async fn test_unknown_order() {
		let harness = harness(TransitionPolicy::Permissive);
		let result = harness.service.change_status(404, "shipped", None).await;
		assert!(matches!(result, Err(TransitionError::NotFound(404))));
	}

	#[tokio::test]
	async fn test_noop_does_not_mutate() {
		let harness = harness(TransitionPolicy::Permissive);
		seed(&harness, 1, "placed").await;
		let before = harness.orders.get(1).await.unwrap();

		let result = harness.service.change_status(1, "placed", None).await;
		assert!(matches!(result, Err(TransitionError::NoOpTransition { .. })));

		harness.dispatcher.shutdown().await;
		assert_eq!(harness.orders.get(1).await.unwrap(), before);
		assert!(harness.audit_log.list_by_order(1).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_invalid_status_token() {
		let harness = harness(TransitionPolicy::Permissive);
		seed(&harness, 1, "placed").await;

		let empty = harness.service.change_status(1, "", None).await;
		assert!(matches!(empty, Err(TransitionError::InvalidStatus(_))));

		let long = "x".repeat(33);
		let too_long = harness.service.change_status(1, &long, None).await;
		assert!(matches!(too_long, Err(TransitionError::InvalidStatus(_))));
	}

	#[tokio::test]
	async fn test_policy_rejects_transition() {
		let mut table = BTreeMap::new();
		table.insert("placed".to_string(), vec!["shipped".to_string()]);
		let policy = TransitionPolicy::from_config(Some(&table)).unwrap();
		let harness = harness(policy);
		seed(&harness, 1, "placed").await;

		let rejected = harness.service.change_status(1, "delivered", None).await;
		assert!(matches!(
			rejected,
			Err(TransitionError::InvalidTransition { ref from, ref to })
				if from.as_str() == "placed" && to.as_str() == "delivered"
		));
		assert_eq!(harness.orders.get(1).await.unwrap().status.as_str(), "placed");

		harness.service.change_status(1, "shipped", None).await.unwrap();
	}

	#[tokio::test]
	async fn test_audit_failure_does_not_affect_transition() {
		let mut backend = MockBackend::new();
		backend
			.expect_get_bytes()
			.returning(|_| Err(StorageError::Backend("audit store down".into())));
		backend
			.expect_set_bytes()
			.returning(|_, _| Err(StorageError::Backend("audit store down".into())));
		backend.expect_exists().returning(|_| Ok(false));
		let harness = harness_with(
			TransitionPolicy::Permissive,
			Arc::new(StorageService::new(Box::new(backend))),
			2,
			16,
		);
		seed(&harness, 1, "placed").await;

		let order = harness.service.change_status(1, "shipped", None).await.unwrap();
		assert_eq!(order.status.as_str(), "shipped");
		harness.dispatcher.shutdown().await;
		assert_eq!(harness.orders.get(1).await.unwrap().status.as_str(), "shipped");
	}

	#[tokio::test]
	async fn test_concurrent_transitions_are_all_audited_in_order() {
		let harness = Arc::new(harness(TransitionPolicy::Permissive));
		seed(&harness, 1, "s0").await;

		let mut handles = Vec::new();
		for i in 1..=20 {
			let harness = harness.clone();
			handles.push(tokio::spawn(async move {
				harness.service.change_status(1, &format!("s{}", i), None).await
			}));
		}
		for handle in handles {
			let order = handle.await.unwrap().unwrap();
			assert_eq!(order.id, 1);
		}
		harness.dispatcher.shutdown().await;

		let entries = harness.audit_log.list_by_order(1).await.unwrap();
		assert_eq!(entries.len(), 20);
		assert!(entries.iter().all(|e| e.old_status != e.new_status));
		for pair in entries.windows(2) {
			assert_eq!(pair[0].new_status, pair[1].old_status);
		}
		let last = entries.last().unwrap();
		assert_eq!(harness.orders.get(1).await.unwrap().status, last.new_status);
	}

	#[tokio::test]
	async fn test_burst_beyond_warn_depth_is_fully_audited() {
		let audit_storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let harness = harness_with(TransitionPolicy::Permissive, audit_storage, 1, 4);
		seed(&harness, 1, "s0").await;

		for i in 1..=10 {
			let order = harness
				.service
				.change_status(1, &format!("s{}", i), None)
				.await
				.unwrap();
			assert_eq!(order.status.as_str(), format!("s{}", i));
		}
		harness.dispatcher.shutdown().await;

		let entries = harness.audit_log.list_by_order(1).await.unwrap();
		assert_eq!(entries.len(), 10);
		for (i, entry) in entries.iter().enumerate() {
			assert_eq!(entry.old_status.as_str(), format!("s{}", i));
			assert_eq!(entry.new_status.as_str(), format!("s{}", i + 1));
		}
	}
}
