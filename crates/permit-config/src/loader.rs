//! Multi-file configuration loading.
//!
//! A file may list other files under `include` (a string or an array of
//! strings). Included files may include further files. Every top-level
//! section must be defined by exactly one file in the tree, and a file may
//! appear only once.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use toml::{Table, Value};

const INCLUDE_KEY: &str = "include";

/// Loads a configuration tree rooted at one file.
pub struct ConfigLoader {
	/// Directory relative includes are resolved against.
	base_dir: PathBuf,
	/// Canonical paths already read.
	visited: HashSet<PathBuf>,
	/// File that defined each top-level section.
	section_owner: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_dir: impl AsRef<Path>) -> Self {
		Self {
			base_dir: base_dir.as_ref().to_path_buf(),
			visited: HashSet::new(),
			section_owner: HashMap::new(),
		}
	}

	/// Reads `path` and everything it includes into one validated [`Config`].
	pub async fn load_config(&mut self, path: impl AsRef<Path>) -> Result<Config, ConfigError> {
		let mut merged = Table::new();
		let mut pending = vec![self.locate(path.as_ref())?];

		while let Some(file) = pending.pop() {
			let mut table = self.read_table(&file).await?;
			if let Some(include) = table.remove(INCLUDE_KEY) {
				// Reversed so the first listed include is merged first.
				for child in parse_includes(&include)?.into_iter().rev() {
					pending.push(self.locate(&child)?);
				}
			}
			for (section, value) in table {
				self.claim(&section, &file)?;
				merged.insert(section, value);
			}
		}

		let rendered = toml::to_string(&merged)
			.map_err(|e| ConfigError::Parse(format!("Failed to render merged config: {}", e)))?;
		rendered.parse()
	}

	/// Reads one file, expanding environment variables before parsing.
	async fn read_table(&mut self, file: &Path) -> Result<Table, ConfigError> {
		let canonical = tokio::fs::canonicalize(file).await?;
		if !self.visited.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let raw = tokio::fs::read_to_string(&canonical).await?;
		Ok(toml::from_str(&resolve_env_vars(&raw)?)?)
	}

	fn claim(&mut self, section: &str, file: &Path) -> Result<(), ConfigError> {
		if let Some(owner) = self.section_owner.get(section) {
			return Err(ConfigError::Validation(format!(
				"Duplicate section '{}' found in {} and {}",
				section,
				owner.display(),
				file.display()
			)));
		}
		self.section_owner
			.insert(section.to_string(), file.to_path_buf());
		Ok(())
	}

	fn locate(&self, path: &Path) -> Result<PathBuf, ConfigError> {
		let candidate = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_dir.join(path)
		};
		if candidate.is_file() {
			Ok(candidate)
		} else {
			Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", candidate.display()),
			)))
		}
	}
}

fn parse_includes(value: &Value) -> Result<Vec<PathBuf>, ConfigError> {
	match value {
		Value::String(path) => Ok(vec![PathBuf::from(path)]),
		Value::Array(items) => items
			.iter()
			.map(|item| {
				item.as_str().map(PathBuf::from).ok_or_else(|| {
					ConfigError::Validation("include entries must be strings".into())
				})
			})
			.collect(),
		_ => Err(ConfigError::Validation(
			"include must be a string or an array of strings".into(),
		)),
	}
}
