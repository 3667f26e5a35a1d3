//! API types for the order audit HTTP API.
//!
//! This module defines the request and response bodies of the status
//! transition and audit log endpoints, along with the structured error type
//! the handlers return.

use crate::{AuditLogEntry, Order};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Body of `PATCH /orders/{order_id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeStatusRequest {
	/// Requested status token.
	pub new_status: String,
	/// Optional free-text reason recorded in the audit trail.
	#[serde(default)]
	pub reason: Option<String>,
}

/// Response of a successful status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResponse {
	pub id: u64,
	pub status: String,
}

impl From<&Order> for OrderResponse {
	fn from(order: &Order) -> Self {
		Self {
			id: order.id,
			status: order.status.to_string(),
		}
	}
}

/// One element of `GET /orders/{order_id}/audit_logs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogResponse {
	pub timestamp: DateTime<Utc>,
	pub old_status: String,
	pub new_status: String,
	pub reason: Option<String>,
}

impl From<&AuditLogEntry> for AuditLogResponse {
	fn from(entry: &AuditLogEntry) -> Self {
		Self {
			timestamp: entry.timestamp,
			old_status: entry.old_status.to_string(),
			new_status: entry.new_status.to_string(),
			reason: entry.reason.clone(),
		}
	}
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
}

/// Structured API error type with appropriate HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Bad request with validation errors (400)
	BadRequest { error_type: String, message: String },
	/// Requested resource does not exist (404)
	NotFound { error_type: String, message: String },
	/// Unprocessable entity for business rule violations (422)
	UnprocessableEntity { error_type: String, message: String },
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::NotFound { .. } => 404,
			APIError::UnprocessableEntity { .. } => 422,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error_type, message) = match self {
			APIError::BadRequest {
				error_type,
				message,
			}
			| APIError::NotFound {
				error_type,
				message,
			}
			| APIError::UnprocessableEntity {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => (error_type, message),
		};
		ErrorResponse {
			error: error_type.clone(),
			message: message.clone(),
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::UnprocessableEntity { message, .. } => {
				write!(f, "Unprocessable Entity: {}", message)
			}
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			}
		}
	}
}

impl std::error::Error for APIError {}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}
