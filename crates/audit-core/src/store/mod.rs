//! Persistent stores for orders and their audit trail.
//!
//! Both stores sit on top of one shared [`audit_storage::StorageService`]
//! and only ever touch their own key namespace.

pub mod audit_log;
pub mod order;

pub use audit_log::AuditLogStore;
pub use order::{OrderGuard, OrderStore};
