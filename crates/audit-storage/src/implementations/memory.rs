//! In-memory storage backend implementation.
//!
//! This module provides a memory-based implementation of the StorageInterface
//! trait, useful for testing and development where persistence across
//! restarts is not required. Selected by the `memory://` DSN.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use audit_types::{ConfigSchema, ImplementationRegistry, Schema, KEY_SEPARATOR};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory storage implementation.
///
/// Data lives in a HashMap behind a read-write lock; every write replaces a
/// value under the write lock, so it is atomic with respect to readers.
pub struct MemoryStorage {
	store: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
	/// Creates a new, empty MemoryStorage instance.
	pub fn new() -> Self {
		Self {
			store: Arc::new(RwLock::new(HashMap::new())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		store.get(key).cloned().ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.insert(key.to_string(), value);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store.contains_key(key))
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.keys()
			.filter(|key| {
				key.strip_prefix(prefix)
					.is_some_and(|rest| !rest.contains(KEY_SEPARATOR))
			})
			.cloned()
			.collect())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(memory_schema())
	}
}

/// Memory storage accepts no parameters.
fn memory_schema() -> Schema {
	Schema::new(vec![], vec![])
}

/// Factory function to create a memory storage backend from configuration.
///
/// Configuration parameters: none.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	memory_schema()
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		let key = "orders:1";
		let value = b"test_value".to_vec();
		storage.set_bytes(key, value.clone()).await.unwrap();

		let retrieved = storage.get_bytes(key).await.unwrap();
		assert_eq!(retrieved, value);
		assert!(storage.exists(key).await.unwrap());

		storage.delete(key).await.unwrap();
		assert!(!storage.exists(key).await.unwrap());

		let result = storage.get_bytes(key).await;
		assert!(matches!(result, Err(StorageError::NotFound)));
	}

	#[tokio::test]
	async fn test_overwrite() {
		let storage = MemoryStorage::new();

		storage.set_bytes("orders:1", b"value1".to_vec()).await.unwrap();
		storage.set_bytes("orders:1", b"value2".to_vec()).await.unwrap();
		assert_eq!(storage.get_bytes("orders:1").await.unwrap(), b"value2".to_vec());
	}

	#[tokio::test]
	async fn test_list_keys_stays_at_prefix_depth() {
		let storage = MemoryStorage::new();
		for key in ["audit_logs:1:1", "audit_logs:1:2", "audit_logs:12:3", "orders:1"] {
			storage.set_bytes(key, Vec::new()).await.unwrap();
		}

		let mut keys = storage.list_keys("audit_logs:1:").await.unwrap();
		keys.sort();
		assert_eq!(keys, vec!["audit_logs:1:1", "audit_logs:1:2"]);

		let nested = storage.list_keys("audit_logs:").await.unwrap();
		assert!(nested.is_empty());
	}

	#[test]
	fn test_factory_rejects_parameters() {
		let mut table = toml::map::Map::new();
		table.insert("path".into(), toml::Value::String("./data".into()));
		let result = create_storage(&toml::Value::Table(table));
		assert!(matches!(result, Err(StorageError::Configuration(_))));
	}
}
