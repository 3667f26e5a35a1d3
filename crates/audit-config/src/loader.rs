//! Multi-file configuration assembly.
//!
//! A configuration file may name other files in a top-level `include` key
//! (a string or an array of strings). Included files may include further
//! files; relative paths resolve against the directory of the file that
//! names them. The merged document must define every top-level section in
//! exactly one file.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const INCLUDE_KEY: &str = "include";

/// Maximum include nesting below the root file.
const MAX_INCLUDE_DEPTH: usize = 8;

/// Merges a root configuration file with everything it includes.
pub(crate) struct ConfigLoader {
	root_dir: PathBuf,
	/// Canonical paths of the files on the current include chain.
	chain: Vec<PathBuf>,
	/// Section name -> file that defined it.
	origins: HashMap<String, PathBuf>,
	merged: toml::Table,
}

impl ConfigLoader {
	/// Creates a loader resolving the root path against `root_dir`.
	pub(crate) fn new(root_dir: impl AsRef<Path>) -> Self {
		Self {
			root_dir: root_dir.as_ref().to_path_buf(),
			chain: Vec::new(),
			origins: HashMap::new(),
			merged: toml::Table::new(),
		}
	}

	/// Reads `path` and its includes and validates the merged result.
	pub(crate) async fn load_config(
		mut self,
		path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let root = join_relative(&self.root_dir, path.as_ref());
		self.merge_file(root).await?;

		// Environment references were already resolved per file.
		let config: Config = toml::Value::Table(self.merged).try_into()?;
		config.validate()?;
		Ok(config)
	}

	/// Merges one file, then recurses into the files it includes.
	///
	/// Boxed because async recursion needs an indirection.
	fn merge_file(
		&mut self,
		path: PathBuf,
	) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), ConfigError>> + Send + '_>>
	{
		Box::pin(async move {
			let canonical = tokio::fs::canonicalize(&path).await.map_err(|e| {
				ConfigError::Io(std::io::Error::new(
					e.kind(),
					format!("Configuration file {}: {}", path.display(), e),
				))
			})?;
			if self.chain.contains(&canonical) {
				return Err(ConfigError::Validation(format!(
					"Include cycle: {} is already being loaded",
					canonical.display()
				)));
			}
			if self.chain.len() > MAX_INCLUDE_DEPTH {
				return Err(ConfigError::Validation(format!(
					"Includes nested deeper than {} levels at {}",
					MAX_INCLUDE_DEPTH,
					canonical.display()
				)));
			}

			let raw = tokio::fs::read_to_string(&canonical).await?;
			let mut table: toml::Table = toml::from_str(&resolve_env_vars(&raw)?)?;
			let includes = take_includes(&mut table)?;

			for (section, value) in table {
				if let Some(first) = self.origins.get(&section) {
					return Err(ConfigError::Validation(format!(
						"Section '{}' is defined in both {} and {}",
						section,
						first.display(),
						canonical.display()
					)));
				}
				self.origins.insert(section.clone(), canonical.clone());
				self.merged.insert(section, value);
			}

			let dir = canonical
				.parent()
				.map(Path::to_path_buf)
				.unwrap_or_default();
			self.chain.push(canonical);
			for include in includes {
				self.merge_file(join_relative(&dir, &include)).await?;
			}
			self.chain.pop();
			Ok(())
		})
	}
}

fn join_relative(dir: &Path, path: &Path) -> PathBuf {
	if path.is_absolute() {
		path.to_path_buf()
	} else {
		dir.join(path)
	}
}

/// Removes the `include` key from `table` and returns the paths it named.
fn take_includes(table: &mut toml::Table) -> Result<Vec<PathBuf>, ConfigError> {
	let invalid = || ConfigError::Validation("`include` takes a path or a list of paths".into());
	match table.remove(INCLUDE_KEY) {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(paths)) => paths
			.iter()
			.map(|p| p.as_str().map(PathBuf::from).ok_or_else(invalid))
			.collect(),
		Some(_) => Err(invalid()),
	}
}
