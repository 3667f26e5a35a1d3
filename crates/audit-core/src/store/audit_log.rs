//! Append-only audit log store.
//!
//! Entries live under `audit_logs:{order_id}:{id}` with the id zero-padded so
//! keys sort in append order. The last id and timestamp handed out are
//! persisted together under `sequences:audit_logs`, so ids keep increasing
//! and timestamps never go backwards across restarts, even when the clock
//! does. Allocation happens under a store-local mutex.

use audit_storage::{StorageError, StorageService};
use audit_types::{AuditLogEntry, NewAuditLogEntry, StorageKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Last id and timestamp handed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
struct Sequence {
	last_id: u64,
	last_timestamp: Option<DateTime<Utc>>,
}

/// Persists and lists audit log entries. Entries are never modified.
pub struct AuditLogStore {
	storage: Arc<StorageService>,
	/// `None` until the persisted sequence has been read.
	sequence: Mutex<Option<Sequence>>,
}

impl AuditLogStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			sequence: Mutex::new(None),
		}
	}

	fn sequence_key() -> String {
		StorageKey::Sequences.key(&[StorageKey::AuditLogs.as_str()])
	}

	fn entry_key(order_id: u64, id: u64) -> String {
		StorageKey::AuditLogs.key(&[&order_id.to_string(), &format!("{:020}", id)])
	}

	/// Allocates the next id and timestamp, persisting them before use.
	async fn next_id(&self) -> Result<(u64, DateTime<Utc>), StorageError> {
		let mut cached = self.sequence.lock().await;
		let last = match *cached {
			Some(sequence) => sequence,
			None => match self.storage.retrieve::<Sequence>(&Self::sequence_key()).await {
				Ok(sequence) => sequence,
				Err(StorageError::NotFound) => Sequence::default(),
				Err(e) => return Err(e),
			},
		};

		let now = Utc::now();
		let timestamp = match last.last_timestamp {
			Some(previous) if previous > now => previous,
			_ => now,
		};
		let next = Sequence {
			last_id: last.last_id + 1,
			last_timestamp: Some(timestamp),
		};
		self.storage.store(&Self::sequence_key(), &next).await?;
		*cached = Some(next);

		Ok((next.last_id, timestamp))
	}

	/// Assigns an id and timestamp to `entry` and persists it.
	///
	/// Records whose old and new status are equal are rejected with
	/// [`StorageError::Constraint`].
	pub async fn append(&self, entry: NewAuditLogEntry) -> Result<AuditLogEntry, StorageError> {
		if !entry.is_transition() {
			return Err(StorageError::Constraint(format!(
				"audit entry for order {} does not change status '{}'",
				entry.order_id, entry.old_status
			)));
		}

		let (id, timestamp) = self.next_id().await?;
		let stored = entry.into_entry(id, timestamp);
		self.storage
			.insert(&Self::entry_key(stored.order_id, id), &stored)
			.await?;

		tracing::debug!(
			order_id = stored.order_id,
			audit_id = id,
			old_status = %stored.old_status,
			new_status = %stored.new_status,
			"Audit entry appended"
		);
		Ok(stored)
	}

	/// Lists the entries of an order, oldest first. Ties on timestamp are
	/// broken by id.
	pub async fn list_by_order(&self, order_id: u64) -> Result<Vec<AuditLogEntry>, StorageError> {
		let prefix = StorageKey::AuditLogs.prefix(&[&order_id.to_string()]);
		let mut entries: Vec<AuditLogEntry> = self
			.storage
			.retrieve_all(&prefix)
			.await?
			.into_iter()
			.map(|(_, entry)| entry)
			.collect();
		entries.sort_by_key(|entry: &AuditLogEntry| (entry.timestamp, entry.id));
		Ok(entries)
	}

	/// Deletes every entry of an order and returns how many were removed.
	///
	/// Used when the order itself is removed.
	pub async fn purge_order(&self, order_id: u64) -> Result<usize, StorageError> {
		let prefix = StorageKey::AuditLogs.prefix(&[&order_id.to_string()]);
		let removed = self.storage.remove_all(&prefix).await?;
		tracing::info!(order_id, removed, "Purged audit entries");
		Ok(removed)
	}
}
