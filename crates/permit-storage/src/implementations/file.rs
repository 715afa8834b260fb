//! File snapshot backend.
//!
//! The snapshot is written to a single file behind a fixed-size header and
//! replaced atomically by writing a temporary file and renaming it.

use crate::{SnapshotBackend, StorageError};
use async_trait::async_trait;
use permit_types::utils::current_timestamp;
use std::path::PathBuf;
use tokio::fs;

#[allow(clippy::doc_nested_refdefs)]
/// Fixed-size snapshot file header.
///
/// Binary layout (64 bytes total):
/// - [0-3]: Magic bytes "PMT2"
/// - [4-5]: Version (u16, little-endian)
/// - [6-13]: Write timestamp (u64, little-endian, Unix seconds)
/// - [14-21]: Payload length (u64, little-endian)
/// - [22-63]: Reserved
#[derive(Debug, Clone, PartialEq, Eq)]
struct SnapshotHeader {
	version: u16,
	written_at: u64,
	payload_len: u64,
}

impl SnapshotHeader {
	const MAGIC: &'static [u8; 4] = b"PMT2";
	const VERSION: u16 = 1;
	const SIZE: usize = 64;

	fn new(payload_len: usize) -> Self {
		Self {
			version: Self::VERSION,
			written_at: current_timestamp(),
			payload_len: payload_len as u64,
		}
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.written_at.to_le_bytes());
		bytes[14..22].copy_from_slice(&self.payload_len.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Not a permit snapshot file".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported snapshot version: {}",
				version
			)));
		}

		let mut written_at = [0u8; 8];
		written_at.copy_from_slice(&bytes[6..14]);
		let mut payload_len = [0u8; 8];
		payload_len.copy_from_slice(&bytes[14..22]);

		Ok(Self {
			version,
			written_at: u64::from_le_bytes(written_at),
			payload_len: u64::from_le_bytes(payload_len),
		})
	}
}

/// Snapshot stored in one file on disk.
#[derive(Debug, Clone)]
pub struct FileSnapshots {
	path: PathBuf,
}

impl FileSnapshots {
	pub fn new(path: PathBuf) -> Self {
		Self { path }
	}

	pub fn path(&self) -> &PathBuf {
		&self.path
	}
}

#[async_trait]
impl SnapshotBackend for FileSnapshots {
	async fn load_bytes(&self) -> Result<Vec<u8>, StorageError> {
		let data = match fs::read(&self.path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StorageError::NotFound)
			},
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let header = SnapshotHeader::deserialize(&data)?;
		let payload = &data[SnapshotHeader::SIZE..];
		if payload.len() as u64 != header.payload_len {
			return Err(StorageError::Backend(format!(
				"Truncated snapshot: expected {} bytes, found {}",
				header.payload_len,
				payload.len()
			)));
		}
		tracing::debug!(
			path = %self.path.display(),
			written_at = header.written_at,
			"read snapshot file"
		);
		Ok(payload.to_vec())
	}

	async fn save_bytes(&self, bytes: Vec<u8>) -> Result<(), StorageError> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let header = SnapshotHeader::new(bytes.len());
		let mut file_data = Vec::with_capacity(SnapshotHeader::SIZE + bytes.len());
		file_data.extend_from_slice(&header.serialize());
		file_data.extend_from_slice(&bytes);

		let temp_path = self.path.with_extension("tmp");
		fs::write(&temp_path, file_data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &self.path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	async fn clear(&self) -> Result<(), StorageError> {
		match fs::remove_file(&self.path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}
}
