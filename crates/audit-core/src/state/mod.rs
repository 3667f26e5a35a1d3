//! Order status transitions.
//!
//! The [`TransitionService`] is the only writer of order status. It validates
//! a requested change against the current record and the configured
//! [`TransitionPolicy`], persists it and queues the audit entry.

pub mod policy;
pub mod transition;

pub use policy::TransitionPolicy;
pub use transition::{TransitionError, TransitionService};
