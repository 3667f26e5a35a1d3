//! Order status and audit log endpoints.
//!
//! Handlers parse and validate the request, call the transition service and
//! translate its errors into [`APIError`] values with stable error codes.

use audit_core::{AuditEngine, TransitionError};
use audit_types::{APIError, AuditLogResponse, ChangeStatusRequest, OrderResponse};

/// Maps a transition failure to the response sent to the client.
///
/// Storage failures get a generic message; their cause is only logged.
pub fn to_api_error(e: TransitionError) -> APIError {
	let message = e.to_string();
	match e {
		TransitionError::NotFound(_) => APIError::NotFound {
			error_type: "ORDER_NOT_FOUND".to_string(),
			message,
		},
		TransitionError::NoOpTransition { .. } => APIError::BadRequest {
			error_type: "NO_OP_TRANSITION".to_string(),
			message,
		},
		TransitionError::InvalidStatus(_) => APIError::BadRequest {
			error_type: "INVALID_STATUS".to_string(),
			message,
		},
		TransitionError::InvalidTransition { .. } => APIError::UnprocessableEntity {
			error_type: "INVALID_TRANSITION".to_string(),
			message,
		},
		TransitionError::Storage(_) => APIError::InternalServerError {
			error_type: "INTERNAL_ERROR".to_string(),
			message: "Failed to update order".to_string(),
		},
	}
}

/// Parses the `{order_id}` path segment.
pub fn parse_order_id(raw: &str) -> Result<u64, APIError> {
	raw.parse().map_err(|_| APIError::BadRequest {
		error_type: "INVALID_ORDER_ID".to_string(),
		message: format!("Order ID must be a non-negative integer: {}", raw),
	})
}

/// Handles a status change request.
pub async fn change_status(
	order_id: u64,
	request: ChangeStatusRequest,
	engine: &AuditEngine,
) -> Result<OrderResponse, APIError> {
	let order = engine
		.transitions()
		.change_status(order_id, &request.new_status, request.reason)
		.await
		.map_err(|e| {
			match &e {
				TransitionError::Storage(cause) => {
					tracing::error!(order_id, error = %cause, "Status update failed");
				}
				other => tracing::warn!(order_id, error = %other, "Status change rejected"),
			}
			to_api_error(e)
		})?;

	Ok(OrderResponse::from(&order))
}

/// Lists the audit trail of an order, oldest first.
///
/// Unknown orders and orders without transitions both yield an empty list.
pub async fn list_audit_logs(
	order_id: u64,
	engine: &AuditEngine,
) -> Result<Vec<AuditLogResponse>, APIError> {
	let entries = engine.transitions().audit_log(order_id).await.map_err(|e| {
		tracing::error!(order_id, error = %e, "Audit log lookup failed");
		APIError::InternalServerError {
			error_type: "INTERNAL_ERROR".to_string(),
			message: "Failed to load audit log".to_string(),
		}
	})?;

	Ok(entries.iter().map(AuditLogResponse::from).collect())
}

#[cfg(test)]
mod tests {
	use super::*;
	use audit_types::OrderStatus;

	fn code(e: TransitionError) -> (u16, String) {
		let api = to_api_error(e);
		(api.status_code(), api.to_error_response().error)
	}

	#[test]
	fn test_error_mapping() {
		let placed = OrderStatus::new("placed").unwrap();
		let shipped = OrderStatus::new("shipped").unwrap();

		assert_eq!(code(TransitionError::NotFound(1)), (404, "ORDER_NOT_FOUND".into()));
		assert_eq!(
			code(TransitionError::NoOpTransition {
				status: placed.clone()
			}),
			(400, "NO_OP_TRANSITION".into())
		);
		assert_eq!(
			code(TransitionError::InvalidStatus("empty".into())),
			(400, "INVALID_STATUS".into())
		);
		assert_eq!(
			code(TransitionError::InvalidTransition {
				from: shipped,
				to: placed
			}),
			(422, "INVALID_TRANSITION".into())
		);
		assert_eq!(
			code(TransitionError::Storage("disk full".into())),
			(500, "INTERNAL_ERROR".into())
		);
	}

	#[test]
	fn test_storage_details_are_not_leaked() {
		let api = to_api_error(TransitionError::Storage(
			"/var/lib/orders: permission denied".into(),
		));
		assert!(!api.to_error_response().message.contains("/var/lib"));
	}

	#[test]
	fn test_parse_order_id() {
		assert_eq!(parse_order_id("42").unwrap(), 42);
		assert_eq!(parse_order_id("abc").unwrap_err().status_code(), 400);
		assert_eq!(parse_order_id("-1").unwrap_err().status_code(), 400);
	}
}
