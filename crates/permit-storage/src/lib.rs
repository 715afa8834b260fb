//! State storage for the permit system.
//!
//! Live state (nonce bitmaps and allowance records) is held in a
//! [`PermitStore`]. Its contents can be exported as a [`StateSnapshot`] and
//! written to a snapshot backend, either in memory or to a file.

use async_trait::async_trait;
use permit_config::{StorageBackend, StorageConfig};
use permit_types::PermitError;
use std::path::PathBuf;
use thiserror::Error;

pub mod snapshot;
pub mod store;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

pub use snapshot::{AllowanceEntry, NonceWordEntry, StateSnapshot};
pub use store::{AllowanceRecord, OwnerState, PermitStore};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// No snapshot has been saved yet.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl From<StorageError> for PermitError {
	fn from(err: StorageError) -> Self {
		PermitError::Storage(err.to_string())
	}
}

/// Trait defining the low-level interface for snapshot backends.
///
/// A backend holds a single opaque snapshot blob.
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
	/// Returns the stored blob, or `NotFound` if none was saved.
	async fn load_bytes(&self) -> Result<Vec<u8>, StorageError>;

	/// Replaces the stored blob.
	async fn save_bytes(&self, bytes: Vec<u8>) -> Result<(), StorageError>;

	/// Removes the stored blob; succeeds if there was none.
	async fn clear(&self) -> Result<(), StorageError>;
}

/// Creates the backend selected by configuration.
pub fn create_backend(config: &StorageConfig) -> Result<Box<dyn SnapshotBackend>, StorageError> {
	match config.backend {
		StorageBackend::Memory => Ok(Box::new(implementations::memory::MemorySnapshots::new())),
		StorageBackend::File => {
			let path = config
				.path
				.as_deref()
				.filter(|p| !p.is_empty())
				.ok_or_else(|| {
					StorageError::Configuration("file backend requires a path".into())
				})?;
			Ok(Box::new(implementations::file::FileSnapshots::new(
				PathBuf::from(path),
			)))
		},
	}
}

/// Typed snapshot persistence over a backend.
pub struct SnapshotService {
	backend: Box<dyn SnapshotBackend>,
}

impl SnapshotService {
	pub fn new(backend: Box<dyn SnapshotBackend>) -> Self {
		Self { backend }
	}

	/// Exports `store` and writes it to the backend.
	pub async fn save(&self, store: &PermitStore) -> Result<StateSnapshot, StorageError> {
		let snapshot = store.snapshot().await;
		let bytes =
			serde_json::to_vec(&snapshot).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.save_bytes(bytes).await?;
		tracing::debug!(
			nonce_words = snapshot.nonce_words.len(),
			allowances = snapshot.allowances.len(),
			"saved state snapshot"
		);
		Ok(snapshot)
	}

	/// Reads the last saved snapshot, if any.
	pub async fn load(&self) -> Result<Option<StateSnapshot>, StorageError> {
		let bytes = match self.backend.load_bytes().await {
			Ok(bytes) => bytes,
			Err(StorageError::NotFound) => return Ok(None),
			Err(e) => return Err(e),
		};
		let snapshot =
			serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
		Ok(Some(snapshot))
	}

	/// Loads the last snapshot into `store`. Returns false if there was none.
	pub async fn restore_into(&self, store: &PermitStore) -> Result<bool, StorageError> {
		match self.load().await? {
			Some(snapshot) => {
				store.restore(&snapshot);
				tracing::debug!(owners = store.owner_count(), "restored state snapshot");
				Ok(true)
			},
			None => Ok(false),
		}
	}

	pub async fn clear(&self) -> Result<(), StorageError> {
		self.backend.clear().await
	}
}
