//! Typed-data hashing and signature verification for permits.
//!
//! This crate turns permit messages into the final hash an owner signs and
//! checks signatures over those hashes. It provides:
//! - [`TypedDataDomain`], the chain-bound domain with its cached separator
//! - struct hashing of every permit variant in [`hasher`]
//! - [`SignatureVerifier`], for raw keys and contract wallets
//! - [`PermitSigner`], a local key signer producing accepted signatures

pub mod domain;
pub mod hasher;
pub mod signer;
pub mod verifier;
pub mod wallet;

pub use domain::TypedDataDomain;
pub use signer::{to_compact, PermitSigner, SignerError};
pub use verifier::{recover_signer, SignatureVerifier, SignerKind};
pub use wallet::{
	ContractWallet, MemoryWalletRegistry, NoContractWallets, WalletError, WalletRegistry,
	EIP1271_MAGIC_VALUE,
};

use permit_types::PermitError;
use thiserror::Error;

/// Errors that can occur while checking a signature.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
	/// The signature is neither 64 nor 65 bytes long.
	#[error("Invalid signature length: {0}")]
	InvalidSignatureLength(usize),
	/// The signature is malformed or recovers to the zero address.
	#[error("Invalid signature")]
	InvalidSignature,
	/// The signature is well formed but not the owner's.
	#[error("Invalid signer")]
	InvalidSigner,
}

impl From<SignatureError> for PermitError {
	fn from(err: SignatureError) -> Self {
		match err {
			SignatureError::InvalidSignatureLength(len) => PermitError::InvalidSignatureLength(len),
			SignatureError::InvalidSignature => PermitError::InvalidSignature,
			SignatureError::InvalidSigner => PermitError::InvalidSigner,
		}
	}
}
