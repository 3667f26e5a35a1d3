//! Background audit pipeline.
//!
//! Transitions hand an [`AuditJob`] to the [`AuditDispatcher`], whose workers
//! pass it to the [`AuditRecorder`]. Nothing in this pipeline reports a
//! failure back to the code that triggered the transition.

pub mod dispatcher;
pub mod recorder;

pub use dispatcher::{AuditDispatcher, AuditJob, DispatchError};
pub use recorder::AuditRecorder;
