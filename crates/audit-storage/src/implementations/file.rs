//! File-based storage backend.
//!
//! Each key is stored in its own file. The `:`-separated key segments become
//! directories, so `audit_logs:1:00000000000000000007` lives at
//! `<path>/audit_logs/1/00000000000000000007.bin`. Values are written to a
//! temporary file and renamed into place, so a reader never sees a partially
//! written record. Selected by a `file://<path>` DSN.
//!
//! The backend takes an exclusive lock on `<path>/.lock` for its lifetime so
//! two processes cannot write the same store concurrently.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use audit_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, KEY_SEPARATOR,
};
use fs2::FileExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const FILE_EXTENSION: &str = "bin";
const LOCK_FILE: &str = ".lock";
const DEFAULT_PATH: &str = "./data/storage";

/// Fixed-size header written in front of every value.
///
/// Binary layout (8 bytes total):
/// - [0-3]: Magic bytes "OAUD"
/// - [4-5]: Version (u16, little-endian)
/// - [6-7]: Reserved
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileHeader {
	version: u16,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"OAUD";
	const VERSION: u16 = 1;
	const SIZE: usize = 8;

	fn current() -> Self {
		Self {
			version: Self::VERSION,
		}
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE || &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Unrecognized file format".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		Ok(Self { version })
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
	/// Whether to fsync each value before it is renamed into place.
	fsync: bool,
	/// Held for the lifetime of the backend; dropping it releases the lock.
	_lock: std::fs::File,
}

impl FileStorage {
	/// Opens (creating if needed) a store rooted at `base_path`.
	///
	/// Fails if another FileStorage already holds the directory lock.
	pub fn open(base_path: impl Into<PathBuf>, fsync: bool) -> Result<Self, StorageError> {
		let base_path = base_path.into();
		std::fs::create_dir_all(&base_path).map_err(|e| {
			StorageError::Backend(format!("Cannot create {}: {}", base_path.display(), e))
		})?;

		let lock_path = base_path.join(LOCK_FILE);
		let lock = std::fs::OpenOptions::new()
			.create(true)
			.truncate(false)
			.write(true)
			.open(&lock_path)
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		lock.try_lock_exclusive().map_err(|_| {
			StorageError::Backend(format!(
				"Storage directory {} is locked by another process",
				base_path.display()
			))
		})?;

		Ok(Self {
			base_path,
			fsync,
			_lock: lock,
		})
	}

	/// Converts a storage key to its file path.
	fn file_path(&self, key: &str) -> Result<PathBuf, StorageError> {
		let mut path = self.base_path.clone();
		let mut segments = key.split(KEY_SEPARATOR).peekable();
		while let Some(segment) = segments.next() {
			let segment = sanitize_segment(key, segment)?;
			if segments.peek().is_some() {
				path.push(segment);
			} else {
				path.push(format!("{}.{}", segment, FILE_EXTENSION));
			}
		}
		Ok(path)
	}

	async fn write_file(&self, path: &Path, data: Vec<u8>) -> Result<(), StorageError> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let temp_path = path.with_extension("tmp");
		let mut file = fs::File::create(&temp_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		file.write_all(&data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		if self.fsync {
			file.sync_all()
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		} else {
			file.flush()
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}
		drop(file);

		fs::rename(&temp_path, path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}
}

/// Rejects key segments that would escape their directory or collide with
/// internal files.
fn sanitize_segment<'a>(key: &str, segment: &'a str) -> Result<&'a str, StorageError> {
	let valid = !segment.is_empty()
		&& !segment.starts_with('.')
		&& segment
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
	if valid {
		Ok(segment)
	} else {
		Err(StorageError::Backend(format!(
			"Key '{}' contains an unsupported segment '{}'",
			key, segment
		)))
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.file_path(key)?;

		let data = match fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StorageError::NotFound)
			}
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		FileHeader::deserialize(&data)?;
		Ok(data[FileHeader::SIZE..].to_vec())
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.file_path(key)?;

		let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
		file_data.extend_from_slice(&FileHeader::current().serialize());
		file_data.extend_from_slice(&value);

		self.write_file(&path, file_data).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.file_path(key)?;

		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let path = self.file_path(key)?;
		fs::try_exists(&path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		// Everything up to the last separator names a directory, the rest
		// is a file name prefix.
		let (dir_key, name_prefix) = match prefix.rfind(KEY_SEPARATOR) {
			Some(idx) => (&prefix[..idx], &prefix[idx + 1..]),
			None => ("", prefix),
		};

		let mut dir = self.base_path.clone();
		for segment in dir_key.split(KEY_SEPARATOR).filter(|s| !s.is_empty()) {
			dir.push(sanitize_segment(prefix, segment)?);
		}

		let mut entries = match fs::read_dir(&dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut keys = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new(FILE_EXTENSION)) {
				continue;
			}
			let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
				tracing::debug!("Skipping file {:?}: name is not valid UTF-8", path);
				continue;
			};
			if stem.starts_with(name_prefix) {
				keys.push(if dir_key.is_empty() {
					stem.to_string()
				} else {
					format!("{}{}{}", dir_key, KEY_SEPARATOR, stem)
				});
			}
		}
		Ok(keys)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(file_schema())
	}
}

fn file_schema() -> Schema {
	Schema::new(
		vec![],
		vec![
			Field::new("path", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(path) if !path.trim().is_empty() => Ok(()),
					_ => Err("Storage path cannot be empty".to_string()),
				}
			}),
			Field::new("fsync", FieldType::Boolean),
		],
	)
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `path`: Base directory for file storage (default: "./data/storage")
/// - `fsync`: Sync every write to disk before renaming it into place (default: false)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	file_schema()
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let path = config
		.get("path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_PATH);
	let fsync = config
		.get("fsync")
		.and_then(|v| v.as_bool())
		.unwrap_or(false);

	Ok(Box::new(FileStorage::open(path, fsync)?))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[tokio::test]
	async fn test_basic_operations() {
		let dir = tempdir().unwrap();
		let storage = FileStorage::open(dir.path(), false).unwrap();

		storage
			.set_bytes("orders:1", b"order".to_vec())
			.await
			.unwrap();
		assert!(dir.path().join("orders").join("1.bin").exists());
		assert_eq!(storage.get_bytes("orders:1").await.unwrap(), b"order".to_vec());
		assert!(storage.exists("orders:1").await.unwrap());

		storage.delete("orders:1").await.unwrap();
		assert!(!storage.exists("orders:1").await.unwrap());
		assert!(matches!(
			storage.get_bytes("orders:1").await,
			Err(StorageError::NotFound)
		));
		// Deleting a missing key is not an error
		storage.delete("orders:1").await.unwrap();
	}

	#[tokio::test]
	async fn test_list_keys() {
		let dir = tempdir().unwrap();
		let storage = FileStorage::open(dir.path(), true).unwrap();

		for key in ["audit_logs:1:01", "audit_logs:1:02", "audit_logs:2:03"] {
			storage.set_bytes(key, Vec::new()).await.unwrap();
		}

		let mut keys = storage.list_keys("audit_logs:1:").await.unwrap();
		keys.sort();
		assert_eq!(keys, vec!["audit_logs:1:01", "audit_logs:1:02"]);

		let missing = storage.list_keys("audit_logs:9:").await.unwrap();
		assert!(missing.is_empty());
	}

	#[tokio::test]
	async fn test_rejects_unsafe_keys() {
		let dir = tempdir().unwrap();
		let storage = FileStorage::open(dir.path(), false).unwrap();

		for key in ["orders:..", "orders:a/b", "orders:", ".lock"] {
			let result = storage.set_bytes(key, Vec::new()).await;
			assert!(
				matches!(result, Err(StorageError::Backend(_))),
				"key {key} should be rejected"
			);
		}
	}

	#[tokio::test]
	async fn test_rejects_foreign_files() {
		let dir = tempdir().unwrap();
		let storage = FileStorage::open(dir.path(), false).unwrap();

		std::fs::create_dir_all(dir.path().join("orders")).unwrap();
		std::fs::write(dir.path().join("orders").join("5.bin"), b"{}").unwrap();
		assert!(matches!(
			storage.get_bytes("orders:5").await,
			Err(StorageError::Backend(_))
		));
	}

	#[test]
	fn test_directory_lock_is_exclusive() {
		let dir = tempdir().unwrap();
		let first = FileStorage::open(dir.path(), false).unwrap();
		assert!(FileStorage::open(dir.path(), false).is_err());

		drop(first);
		assert!(FileStorage::open(dir.path(), false).is_ok());
	}

	#[test]
	fn test_factory_config() {
		let dir = tempdir().unwrap();
		let mut table = toml::map::Map::new();
		table.insert(
			"path".into(),
			toml::Value::String(dir.path().to_string_lossy().into_owned()),
		);
		table.insert("fsync".into(), toml::Value::Boolean(true));
		assert!(create_storage(&toml::Value::Table(table.clone())).is_ok());

		table.insert("ttl".into(), toml::Value::Integer(5));
		let result = create_storage(&toml::Value::Table(table));
		assert!(matches!(result, Err(StorageError::Configuration(_))));
	}

	#[test]
	fn test_header_round_trip() {
		let bytes = FileHeader::current().serialize();
		assert_eq!(FileHeader::deserialize(&bytes).unwrap(), FileHeader::current());
		assert!(FileHeader::deserialize(b"OAUD").is_err());
	}
}
