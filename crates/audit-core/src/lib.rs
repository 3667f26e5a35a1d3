//! Core of the order audit service.
//!
//! This crate owns the order and audit log stores, the background audit
//! pipeline and the transition service that ties them together. An
//! [`AuditEngine`] is assembled from configuration by [`AuditEngineBuilder`]
//! and shared by whatever surface exposes it.

pub mod audit;
pub mod builder;
pub mod engine;
pub mod state;
pub mod store;

pub use audit::{AuditDispatcher, AuditJob, AuditRecorder, DispatchError};
pub use builder::{AuditEngineBuilder, BuilderError};
pub use engine::AuditEngine;
pub use state::{TransitionError, TransitionPolicy, TransitionService};
pub use store::{AuditLogStore, OrderGuard, OrderStore};
