//! Local key signing of permits, for owners and tests.

use crate::domain::TypedDataDomain;
use crate::hasher;
use alloy_primitives::B256;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use permit_types::{
	NativeAddress, PermitBatch, PermitBatchTransferFrom, PermitSingle, PermitTransferFrom, Witness,
};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while signing.
#[derive(Debug, Error)]
pub enum SignerError {
	/// Error that occurs when signing operations fail.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Error that occurs when a private key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
}

/// Signs permit hashes with a local private key.
///
/// Signatures are 65 bytes `r||s||v` with `v` in {27, 28}.
#[derive(Debug, Clone)]
pub struct PermitSigner {
	signer: PrivateKeySigner,
}

impl PermitSigner {
	/// Parses a hex private key, with or without `0x`.
	pub fn from_private_key(key: &str) -> Result<Self, SignerError> {
		let signer =
			PrivateKeySigner::from_str(key).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
		Ok(Self { signer })
	}

	pub fn random() -> Self {
		Self {
			signer: PrivateKeySigner::random(),
		}
	}

	pub fn address(&self) -> NativeAddress {
		NativeAddress::from_canonical(self.signer.address())
	}

	/// Signs an already-final typed-data hash.
	pub fn sign_hash(&self, hash: B256) -> Result<[u8; 65], SignerError> {
		let signature = self
			.signer
			.sign_hash_sync(&hash)
			.map_err(|e| SignerError::SigningFailed(e.to_string()))?;
		Ok(signature.as_bytes())
	}

	pub fn sign_permit_transfer_from(
		&self,
		domain: &TypedDataDomain,
		permit: &PermitTransferFrom,
		spender: &NativeAddress,
	) -> Result<[u8; 65], SignerError> {
		self.sign_hash(domain.hash_typed_data(hasher::hash_permit_transfer_from(permit, spender)))
	}

	pub fn sign_permit_batch_transfer_from(
		&self,
		domain: &TypedDataDomain,
		permit: &PermitBatchTransferFrom,
		spender: &NativeAddress,
	) -> Result<[u8; 65], SignerError> {
		self.sign_hash(
			domain.hash_typed_data(hasher::hash_permit_batch_transfer_from(permit, spender)),
		)
	}

	pub fn sign_permit_witness_transfer_from(
		&self,
		domain: &TypedDataDomain,
		permit: &PermitTransferFrom,
		witness: &Witness,
		spender: &NativeAddress,
	) -> Result<[u8; 65], SignerError> {
		let struct_hash = hasher::hash_permit_witness_transfer_from(
			permit,
			witness.witness,
			&witness.witness_type_string,
			spender,
		);
		self.sign_hash(domain.hash_typed_data(struct_hash))
	}

	pub fn sign_permit_batch_witness_transfer_from(
		&self,
		domain: &TypedDataDomain,
		permit: &PermitBatchTransferFrom,
		witness: &Witness,
		spender: &NativeAddress,
	) -> Result<[u8; 65], SignerError> {
		let struct_hash = hasher::hash_permit_batch_witness_transfer_from(
			permit,
			witness.witness,
			&witness.witness_type_string,
			spender,
		);
		self.sign_hash(domain.hash_typed_data(struct_hash))
	}

	pub fn sign_permit_single(
		&self,
		domain: &TypedDataDomain,
		permit: &PermitSingle,
	) -> Result<[u8; 65], SignerError> {
		self.sign_hash(domain.hash_typed_data(hasher::hash_permit_single(permit)))
	}

	pub fn sign_permit_batch(
		&self,
		domain: &TypedDataDomain,
		permit: &PermitBatch,
	) -> Result<[u8; 65], SignerError> {
		self.sign_hash(domain.hash_typed_data(hasher::hash_permit_batch(permit)))
	}
}

/// Packs a 65-byte signature into the 64-byte `r||vs` form.
pub fn to_compact(signature: &[u8; 65]) -> [u8; 64] {
	let mut out = [0u8; 64];
	out.copy_from_slice(&signature[..64]);
	if signature[64] == 28 {
		out[32] |= 0x80;
	}
	out
}
