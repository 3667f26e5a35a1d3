//! Storage-related types for the audit system.

use std::str::FromStr;

/// Separator between the segments of a storage key.
pub const KEY_SEPARATOR: char = ':';

/// Storage namespaces for the persisted collections.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order records, keyed by order id.
	Orders,
	/// Audit log entries, keyed by order id and entry id.
	AuditLogs,
	/// Identifier sequences, keyed by the collection they number.
	Sequences,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::AuditLogs => "audit_logs",
			StorageKey::Sequences => "sequences",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Orders, Self::AuditLogs, Self::Sequences].into_iter()
	}

	/// Builds a full key from this namespace and the given id segments.
	///
	/// `StorageKey::AuditLogs.key(&["1", "7"])` yields `audit_logs:1:7`.
	pub fn key(&self, segments: &[&str]) -> String {
		let mut key = self.as_str().to_string();
		for segment in segments {
			key.push(KEY_SEPARATOR);
			key.push_str(segment);
		}
		key
	}

	/// Builds a prefix matching every key below the given id segments.
	///
	/// `StorageKey::AuditLogs.prefix(&["1"])` yields `audit_logs:1:`.
	pub fn prefix(&self, segments: &[&str]) -> String {
		let mut prefix = self.key(segments);
		prefix.push(KEY_SEPARATOR);
		prefix
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"orders" => Ok(Self::Orders),
			"audit_logs" => Ok(Self::AuditLogs),
			"sequences" => Ok(Self::Sequences),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
