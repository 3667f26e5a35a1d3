//! Order store.
//!
//! Reads and writes [`Order`] records under `orders:{id}` and hands out
//! per-order locks. Writers of the same order are serialized through those
//! locks so a status change and its `updated_at` refresh always land in one
//! record write.

use audit_storage::{StorageError, StorageService};
use audit_types::{Order, OrderStatus, StorageKey};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<u64, Arc<Mutex<()>>>;

/// Exclusive access to one order, released on drop.
pub struct OrderGuard {
	order_id: u64,
	guard: Option<OwnedMutexGuard<()>>,
	locks: Arc<LockMap>,
}

impl OrderGuard {
	pub fn order_id(&self) -> u64 {
		self.order_id
	}
}

impl Drop for OrderGuard {
	fn drop(&mut self) {
		self.guard.take();
		// Only the map holds the mutex once nobody else waits on it.
		self.locks
			.remove_if(&self.order_id, |_, lock| Arc::strong_count(lock) == 1);
	}
}

/// Typed access to persisted orders.
pub struct OrderStore {
	storage: Arc<StorageService>,
	locks: Arc<LockMap>,
}

impl OrderStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			locks: Arc::new(DashMap::new()),
		}
	}

	fn key(order_id: u64) -> String {
		StorageKey::Orders.key(&[&order_id.to_string()])
	}

	/// Waits for exclusive access to `order_id`.
	///
	/// The order does not need to exist; callers check that after locking.
	pub async fn lock(&self, order_id: u64) -> OrderGuard {
		let lock = self.locks.entry(order_id).or_default().clone();
		let guard = lock.lock_owned().await;
		OrderGuard {
			order_id,
			guard: Some(guard),
			locks: self.locks.clone(),
		}
	}

	/// Loads an order, failing with [`StorageError::NotFound`] if it is absent.
	pub async fn get(&self, order_id: u64) -> Result<Order, StorageError> {
		self.storage.retrieve(&Self::key(order_id)).await
	}

	/// Stores a new order. Fails with [`StorageError::Conflict`] if the id is taken.
	pub async fn insert(&self, order: Order) -> Result<Order, StorageError> {
		let _guard = self.lock(order.id).await;
		self.storage.insert(&Self::key(order.id), &order).await?;
		tracing::debug!(order_id = order.id, status = %order.status, "Order stored");
		Ok(order)
	}

	/// Sets the status of an order and returns the updated record.
	pub async fn update_status(
		&self,
		order_id: u64,
		new_status: OrderStatus,
	) -> Result<Order, StorageError> {
		let guard = self.lock(order_id).await;
		self.update_status_locked(&guard, new_status).await
	}

	/// Same as [`update_status`](Self::update_status) for a caller that already
	/// holds the order's lock.
	pub async fn update_status_locked(
		&self,
		guard: &OrderGuard,
		new_status: OrderStatus,
	) -> Result<Order, StorageError> {
		let key = Self::key(guard.order_id);
		let mut order: Order = self.storage.retrieve(&key).await?;
		order.status = new_status;
		order.updated_at = Utc::now();
		self.storage.update(&key, &order).await?;
		Ok(order)
	}
}
