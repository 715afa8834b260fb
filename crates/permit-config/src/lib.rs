//! Configuration module for the permit system.
//!
//! This module provides structures and utilities for managing the permit
//! engine's configuration: the typed-data domain it signs under, nonce
//! invalidation bounds, and where its state snapshots are kept.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

use permit_types::{utils::NAME_PERMIT2, NativeAddress};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Largest ordered-nonce jump a single invalidation may make.
pub const MAX_INVALIDATION_JUMP_CEILING: u64 = u16::MAX as u64;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the permit engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Typed-data domain every signature is bound to.
	pub domain: DomainConfig,
	/// Nonce handling limits.
	#[serde(default)]
	pub nonces: NonceConfig,
	/// Where engine state is snapshotted.
	#[serde(default)]
	pub storage: StorageConfig,
}

/// Domain configuration for typed-data signatures.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DomainConfig {
	/// Protocol name hashed into the domain.
	/// Defaults to "Permit2" if not specified.
	#[serde(default = "default_domain_name")]
	pub name: String,
	/// Chain identifier the engine starts on; only its low 32 bits are signed.
	pub chain_id: u64,
	/// Address of the verifying contract.
	pub verifying_contract: NativeAddress,
}

/// Returns the default domain name.
fn default_domain_name() -> String {
	NAME_PERMIT2.to_string()
}

/// Limits applied to nonce operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NonceConfig {
	/// Maximum `new - current` accepted by an ordered-nonce invalidation.
	/// Defaults to 65535 if not specified.
	#[serde(default = "default_max_invalidation_jump")]
	pub max_invalidation_jump: u64,
}

impl Default for NonceConfig {
	fn default() -> Self {
		Self {
			max_invalidation_jump: default_max_invalidation_jump(),
		}
	}
}

/// Returns the default maximum invalidation jump.
fn default_max_invalidation_jump() -> u64 {
	MAX_INVALIDATION_JUMP_CEILING
}

/// Snapshot backend kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
	/// Snapshots live only as long as the process.
	#[default]
	Memory,
	/// Snapshots are written to `path`.
	File,
}

/// Configuration for state snapshots.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which backend to use.
	#[serde(default)]
	pub backend: StorageBackend,
	/// Snapshot file location, required for the file backend.
	pub path: Option<String>,
}

/// Expands `${VAR}` and `${VAR:-default}` references in `input`.
///
/// A referenced variable that is unset and has no default is an error.
/// Inputs over 1 MiB are rejected before matching.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let pattern = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut output = String::with_capacity(input.len());
	let mut copied_to = 0;
	for captures in pattern.captures_iter(input) {
		let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
			continue;
		};
		let value = match (std::env::var(name.as_str()), captures.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					name.as_str()
				)))
			},
		};
		output.push_str(&input[copied_to..whole.start()]);
		output.push_str(&value);
		copied_to = whole.end();
	}
	output.push_str(&input[copied_to..]);

	Ok(output)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates the configuration to ensure all required fields are properly set.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.domain.name.is_empty() {
			return Err(ConfigError::Validation("Domain name cannot be empty".into()));
		}
		if self.domain.verifying_contract.is_zero() {
			return Err(ConfigError::Validation(
				"Domain verifying_contract cannot be the zero address".into(),
			));
		}

		if self.nonces.max_invalidation_jump == 0 {
			return Err(ConfigError::Validation(
				"max_invalidation_jump must be at least 1".into(),
			));
		}
		if self.nonces.max_invalidation_jump > MAX_INVALIDATION_JUMP_CEILING {
			return Err(ConfigError::Validation(format!(
				"max_invalidation_jump cannot exceed {}",
				MAX_INVALIDATION_JUMP_CEILING
			)));
		}

		if self.storage.backend == StorageBackend::File
			&& self.storage.path.as_deref().is_none_or(str::is_empty)
		{
			return Err(ConfigError::Validation(
				"File storage backend requires a path".into(),
			));
		}

		Ok(())
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
