//! Order types for the audit system.
//!
//! An order is created outside this system; only its status is mutated here.
//! Status values are free-form tokens validated for shape, not membership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum length of a status token in characters.
pub const MAX_STATUS_LEN: usize = 32;

/// Status given to orders that do not specify one.
pub const DEFAULT_STATUS: &str = "placed";

/// Errors raised when a status token has an invalid shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StatusError {
	#[error("Status must not be empty")]
	Empty,
	#[error("Status '{0}' exceeds {max} characters", max = MAX_STATUS_LEN)]
	TooLong(String),
}

/// Short status token carried by an order, e.g. `placed` or `shipped`.
///
/// Two statuses are equal only if their tokens are byte-for-byte equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderStatus(String);

impl OrderStatus {
	/// Validates and wraps a status token.
	pub fn new(token: impl Into<String>) -> Result<Self, StatusError> {
		let token = token.into();
		if token.trim().is_empty() {
			return Err(StatusError::Empty);
		}
		if token.chars().count() > MAX_STATUS_LEN {
			return Err(StatusError::TooLong(token));
		}
		Ok(Self(token))
	}

	/// Returns the raw token.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Default for OrderStatus {
	fn default() -> Self {
		Self(DEFAULT_STATUS.to_string())
	}
}

impl TryFrom<String> for OrderStatus {
	type Error = StatusError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}

impl TryFrom<&str> for OrderStatus {
	type Error = StatusError;

	fn try_from(value: &str) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}

impl From<OrderStatus> for String {
	fn from(status: OrderStatus) -> Self {
		status.0
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// An order record as held by the order store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	/// Unique, immutable identifier.
	pub id: u64,
	/// Customer that owns the order.
	pub customer_id: u64,
	/// Current status token.
	pub status: OrderStatus,
	/// When the order was created. Never changes.
	pub created_at: DateTime<Utc>,
	/// When the order was last modified. Refreshed on every status change.
	pub updated_at: DateTime<Utc>,
}

impl Order {
	/// Creates an order stamped with the current time.
	pub fn new(id: u64, customer_id: u64, status: OrderStatus) -> Self {
		let now = Utc::now();
		Self {
			id,
			customer_id,
			status,
			created_at: now,
			updated_at: now,
		}
	}
}
