//! Connection string parsing.
//!
//! A DSN has the shape `scheme://path?key=value&key=value`. The scheme picks
//! the storage implementation; the path and query parameters become the TOML
//! table handed to that implementation's factory:
//!
//! - `memory://` → scheme `memory`, empty table
//! - `file://./data?fsync=true` → scheme `file`, `{ path = "./data", fsync = true }`
//!
//! Query values that parse as booleans or integers are typed accordingly so
//! backend schemas can validate them. Percent-encoding is not supported.

use crate::StorageError;
use std::fmt;

const SCHEME_SEPARATOR: &str = "://";

/// A parsed storage connection string.
#[derive(Debug, Clone, PartialEq)]
pub struct Dsn {
	raw: String,
	scheme: String,
	config: toml::Value,
}

impl Dsn {
	/// Parses a DSN.
	pub fn parse(raw: &str) -> Result<Self, StorageError> {
		let raw = raw.trim();
		let (scheme, rest) = raw.split_once(SCHEME_SEPARATOR).ok_or_else(|| {
			StorageError::Configuration(format!("DSN '{}' is missing a scheme", raw))
		})?;

		let scheme = scheme.to_ascii_lowercase();
		let scheme_valid = scheme
			.chars()
			.next()
			.is_some_and(|c| c.is_ascii_alphabetic())
			&& scheme
				.chars()
				.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
		if !scheme_valid {
			return Err(StorageError::Configuration(format!(
				"DSN '{}' has an invalid scheme",
				raw
			)));
		}

		let (path, query) = match rest.split_once('?') {
			Some((path, query)) => (path, Some(query)),
			None => (rest, None),
		};

		let mut table = toml::map::Map::new();
		if !path.is_empty() {
			table.insert("path".to_string(), toml::Value::String(path.to_string()));
		}
		for pair in query.into_iter().flat_map(|q| q.split('&')) {
			if pair.is_empty() {
				continue;
			}
			let (key, value) = pair.split_once('=').ok_or_else(|| {
				StorageError::Configuration(format!(
					"DSN parameter '{}' must have the form key=value",
					pair
				))
			})?;
			if key.is_empty() || key == "path" {
				return Err(StorageError::Configuration(format!(
					"DSN parameter '{}' has an invalid key",
					pair
				)));
			}
			table.insert(key.to_string(), typed_value(value));
		}

		Ok(Self {
			raw: raw.to_string(),
			scheme,
			config: toml::Value::Table(table),
		})
	}

	/// The lower-cased scheme, e.g. `file`.
	pub fn scheme(&self) -> &str {
		&self.scheme
	}

	/// Backend configuration built from the path and query parameters.
	pub fn config(&self) -> &toml::Value {
		&self.config
	}
}

impl fmt::Display for Dsn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.raw)
	}
}

impl std::str::FromStr for Dsn {
	type Err = StorageError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

fn typed_value(value: &str) -> toml::Value {
	if let Ok(flag) = value.parse::<bool>() {
		toml::Value::Boolean(flag)
	} else if let Ok(number) = value.parse::<i64>() {
		toml::Value::Integer(number)
	} else {
		toml::Value::String(value.to_string())
	}
}
