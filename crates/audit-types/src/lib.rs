//! Common types module for the order audit system.
//!
//! This module defines the core data types shared by every crate in the
//! workspace: orders and their status tokens, audit log entries, storage
//! namespaces, configuration validation and the HTTP API surface.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Audit trail types recording order status transitions.
pub mod audit;
/// Order types including the status token.
pub mod order;
/// Registry trait for self-registering storage implementations.
pub mod registry;
/// Storage namespaces for persisted collections.
pub mod storage;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use api::*;
pub use audit::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use storage::*;
pub use validation::*;
