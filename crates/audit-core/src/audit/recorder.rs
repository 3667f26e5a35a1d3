//! Best-effort audit recording.

use crate::store::AuditLogStore;
use audit_storage::StorageError;
use audit_types::{AuditLogEntry, NewAuditLogEntry, OrderStatus};
use backoff::ExponentialBackoffBuilder;
use std::sync::Arc;
use std::time::Duration;

/// First delay between two append attempts when retrying.
const RETRY_INITIAL_INTERVAL: Duration = Duration::from_millis(50);

/// Writes audit entries and contains every failure.
///
/// A failed append is logged with the order id and dropped. When a retry
/// budget is set, backend failures are retried with exponential backoff
/// until the budget is spent.
pub struct AuditRecorder {
	store: Arc<AuditLogStore>,
	retry_budget: Option<Duration>,
}

impl AuditRecorder {
	/// Creates a recorder that makes a single attempt per entry.
	pub fn new(store: Arc<AuditLogStore>) -> Self {
		Self {
			store,
			retry_budget: None,
		}
	}

	/// Retries backend failures for up to `budget`. A zero budget disables retries.
	pub fn with_retry_budget(mut self, budget: Duration) -> Self {
		self.retry_budget = (!budget.is_zero()).then_some(budget);
		self
	}

	/// Records one transition. Never fails.
	pub async fn record(
		&self,
		order_id: u64,
		old_status: OrderStatus,
		new_status: OrderStatus,
		reason: Option<String>,
	) {
		let entry = NewAuditLogEntry::new(order_id, old_status, new_status, reason);
		if let Err(e) = self.append(entry).await {
			tracing::error!(order_id, error = %e, "Failed to record audit entry");
		}
	}

	async fn append(&self, entry: NewAuditLogEntry) -> Result<AuditLogEntry, StorageError> {
		let Some(budget) = self.retry_budget else {
			return self.store.append(entry).await;
		};

		let policy = ExponentialBackoffBuilder::new()
			.with_initial_interval(RETRY_INITIAL_INTERVAL)
			.with_max_elapsed_time(Some(budget))
			.build();
		let store = &self.store;
		let order_id = entry.order_id;

		backoff::future::retry_notify(
			policy,
			|| {
				let entry = entry.clone();
				async move {
					store.append(entry).await.map_err(|e| match e {
						StorageError::Backend(_) => backoff::Error::transient(e),
						other => backoff::Error::permanent(other),
					})
				}
			},
			|e: StorageError, wait: Duration| {
				tracing::warn!(
					order_id,
					error = %e,
					retry_in_ms = wait.as_millis() as u64,
					"Audit append failed, retrying"
				);
			},
		)
		.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use audit_storage::implementations::memory::MemoryStorage;
	use audit_storage::{StorageInterface, StorageService};
	use audit_types::ConfigSchema;
	use mockall::mock;
	use std::sync::atomic::{AtomicUsize, Ordering};

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

	fn status(token: &str) -> OrderStatus {
		OrderStatus::new(token).unwrap()
	}

	fn recorder_over(backend: MockBackend) -> AuditRecorder {
		let storage = Arc::new(StorageService::new(Box::new(backend)));
		AuditRecorder::new(Arc::new(AuditLogStore::new(storage)))
	}

	#[tokio::test]
	async fn test_record_persists_entry() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let store = Arc::new(AuditLogStore::new(storage));
		let recorder = AuditRecorder::new(store.clone());

		recorder
			.record(1, status("placed"), status("shipped"), Some("picked up".into()))
			.await;

		let entries = store.list_by_order(1).await.unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].reason.as_deref(), Some("picked up"));
	}

	#[tokio::test]
	async fn test_record_swallows_backend_failure() {
		let mut backend = MockBackend::new();
		backend
			.expect_get_bytes()
			.returning(|_| Err(StorageError::Backend("disk unavailable".into())));
		backend.expect_set_bytes().never();

		recorder_over(backend)
			.record(1, status("placed"), status("shipped"), None)
			.await;
	}

	#[tokio::test]
	async fn test_record_swallows_constraint_violation() {
		let mut backend = MockBackend::new();
		backend.expect_get_bytes().never();
		backend.expect_set_bytes().never();

		recorder_over(backend)
			.record(1, status("placed"), status("placed"), None)
			.await;
	}

	#[tokio::test]
	async fn test_retry_recovers_from_transient_failure() {
		let attempts = Arc::new(AtomicUsize::new(0));
		let mut backend = MockBackend::new();
		{
			let attempts = attempts.clone();
			backend.expect_get_bytes().returning(move |_| {
				if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
					Err(StorageError::Backend("connection reset".into()))
				} else {
					Err(StorageError::NotFound)
				}
			});
		}
		backend.expect_exists().returning(|_| Ok(false));
		backend.expect_set_bytes().times(2).returning(|_, _| Ok(()));

		recorder_over(backend)
			.with_retry_budget(Duration::from_secs(2))
			.record(1, status("placed"), status("shipped"), None)
			.await;

		assert_eq!(attempts.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn test_permanent_failure_is_not_retried() {
		let mut backend = MockBackend::new();
		backend
			.expect_get_bytes()
			.times(1)
			.returning(|_| Err(StorageError::Serialization("corrupt counter".into())));

		recorder_over(backend)
			.with_retry_budget(Duration::from_secs(2))
			.record(1, status("placed"), status("shipped"), None)
			.await;
	}
}
