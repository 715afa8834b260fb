//! In-memory snapshot backend.
//!
//! Useful for tests and for deployments that only need snapshots within one
//! process lifetime.

use crate::{SnapshotBackend, StorageError};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Holds the last saved snapshot blob in memory.
#[derive(Debug, Default)]
pub struct MemorySnapshots {
	slot: RwLock<Option<Vec<u8>>>,
}

impl MemorySnapshots {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl SnapshotBackend for MemorySnapshots {
	async fn load_bytes(&self) -> Result<Vec<u8>, StorageError> {
		self.slot.read().await.clone().ok_or(StorageError::NotFound)
	}

	async fn save_bytes(&self, bytes: Vec<u8>) -> Result<(), StorageError> {
		*self.slot.write().await = Some(bytes);
		Ok(())
	}

	async fn clear(&self) -> Result<(), StorageError> {
		self.slot.write().await.take();
		Ok(())
	}
}
