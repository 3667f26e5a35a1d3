//! Registry trait for self-registering implementations.
//!
//! Storage backends register themselves under the DSN scheme that selects
//! them, together with the factory that builds them.

/// Base trait for implementation registries.
///
/// Each backend module provides a `Registry` struct implementing this trait,
/// declaring its scheme name and factory function.
pub trait ImplementationRegistry {
	/// The DSN scheme that selects this implementation, e.g. `memory` for
	/// `memory://` or `file` for `file://./data`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
