//! Audit trail types.
//!
//! Every accepted status transition produces exactly one [`AuditLogEntry`].
//! Entries reference their order by id only and are never modified after
//! they are written.

use crate::OrderStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An audit record that has not been persisted yet.
///
/// The identifier and timestamp are assigned by the audit log store at
/// write time and are therefore absent here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuditLogEntry {
	/// Order the transition belongs to.
	pub order_id: u64,
	/// Status before the transition.
	pub old_status: OrderStatus,
	/// Status after the transition.
	pub new_status: OrderStatus,
	/// Optional human-readable reason supplied with the change.
	pub reason: Option<String>,
}

impl NewAuditLogEntry {
	pub fn new(
		order_id: u64,
		old_status: OrderStatus,
		new_status: OrderStatus,
		reason: Option<String>,
	) -> Self {
		Self {
			order_id,
			old_status,
			new_status,
			reason,
		}
	}

	/// Returns true when the record describes an actual change of status.
	pub fn is_transition(&self) -> bool {
		self.old_status != self.new_status
	}

	/// Completes the record with its store-assigned identifier and timestamp.
	pub fn into_entry(self, id: u64, timestamp: DateTime<Utc>) -> AuditLogEntry {
		AuditLogEntry {
			id,
			order_id: self.order_id,
			old_status: self.old_status,
			new_status: self.new_status,
			timestamp,
			reason: self.reason,
		}
	}
}

/// Immutable record of one order status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
	/// Store-assigned identifier, increasing in append order.
	pub id: u64,
	/// Order the transition belongs to.
	pub order_id: u64,
	pub old_status: OrderStatus,
	pub new_status: OrderStatus,
	/// Time the record was written.
	pub timestamp: DateTime<Utc>,
	pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn status(s: &str) -> OrderStatus {
		OrderStatus::new(s).unwrap()
	}

	#[test]
	fn test_is_transition() {
		let entry = NewAuditLogEntry::new(1, status("placed"), status("shipped"), None);
		assert!(entry.is_transition());

		let noop = NewAuditLogEntry::new(1, status("placed"), status("placed"), None);
		assert!(!noop.is_transition());
	}

	#[test]
	fn test_into_entry_keeps_fields() {
		let now = Utc::now();
		let entry = NewAuditLogEntry::new(
			3,
			status("placed"),
			status("cancelled"),
			Some("customer request".to_string()),
		)
		.into_entry(11, now);

		assert_eq!(entry.id, 11);
		assert_eq!(entry.order_id, 3);
		assert_eq!(entry.timestamp, now);
		assert_eq!(entry.reason.as_deref(), Some("customer request"));
	}
}
