//! Endpoint implementations of the HTTP API.

pub mod order;
