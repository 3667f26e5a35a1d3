//! HTTP server for the order audit API.
//!
//! Exposes status changes and audit trails of orders over JSON, with request
//! tracing, a request timeout, a body size limit and CORS.

use crate::apis::order::{change_status, list_audit_logs, parse_order_id};
use audit_config::ApiConfig;
use audit_core::AuditEngine;
use audit_types::{APIError, AuditLogResponse, ChangeStatusRequest, OrderResponse};
use axum::{
	extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
	http::{header, HeaderValue, Method},
	response::Json,
	routing::{get, patch},
	Router,
};
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
	cors::{AllowOrigin, CorsLayer},
	timeout::TimeoutLayer,
	trace::TraceLayer,
};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: AuditEngine,
}

/// Builds the API router with its middleware stack.
pub fn build_router(engine: AuditEngine, api_config: &ApiConfig) -> Router {
	Router::new()
		.route("/orders/{order_id}/status", patch(handle_change_status))
		.route("/orders/{order_id}/audit_logs", get(handle_audit_logs))
		.route("/health", get(handle_health))
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(TimeoutLayer::new(Duration::from_secs(
					api_config.timeout_seconds,
				)))
				.layer(cors_layer(api_config)),
		)
		.layer(DefaultBodyLimit::max(api_config.max_request_size))
		.with_state(AppState { engine })
}

/// Permissive CORS unless origins are configured.
fn cors_layer(api_config: &ApiConfig) -> CorsLayer {
	let Some(cors) = &api_config.cors else {
		return CorsLayer::permissive();
	};

	let origins: Vec<HeaderValue> = cors
		.allowed_origins
		.iter()
		.filter_map(|origin| match HeaderValue::from_str(origin) {
			Ok(value) => Some(value),
			Err(_) => {
				tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
				None
			}
		})
		.collect();

	CorsLayer::new()
		.allow_origin(AllowOrigin::list(origins))
		.allow_methods([Method::GET, Method::PATCH])
		.allow_headers([header::CONTENT_TYPE])
}

/// Starts the HTTP server and serves until `shutdown` completes.
pub async fn start_server<F>(
	api_config: ApiConfig,
	engine: AuditEngine,
	shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
	F: Future<Output = ()> + Send + 'static,
{
	let app = build_router(engine, &api_config);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Order audit API server starting on {}", bind_address);

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown)
		.await?;

	Ok(())
}

/// Handles PATCH /orders/{order_id}/status requests.
async fn handle_change_status(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	payload: Result<Json<ChangeStatusRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, APIError> {
	let order_id = parse_order_id(&order_id)?;
	let Json(request) = payload.map_err(|rejection| APIError::BadRequest {
		error_type: "INVALID_REQUEST".to_string(),
		message: rejection.body_text(),
	})?;

	change_status(order_id, request, &state.engine)
		.await
		.map(Json)
}

/// Handles GET /orders/{order_id}/audit_logs requests.
async fn handle_audit_logs(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
) -> Result<Json<Vec<AuditLogResponse>>, APIError> {
	let order_id = parse_order_id(&order_id)?;
	list_audit_logs(order_id, &state.engine).await.map(Json)
}

/// Handles GET /health requests.
async fn handle_health() -> Json<Value> {
	Json(json!({ "status": "ok" }))
}
