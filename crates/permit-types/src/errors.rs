//! Error kinds returned by permit operations.
//!
//! Callers get a specific kind for every rejection so they can tell a bad
//! signature apart from a late one or a replay.

use alloy_primitives::{
	aliases::{U160, U48},
	U256,
};
use thiserror::Error;

/// Errors that can occur while authorizing or executing a token movement.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PermitError {
	/// The current time is past the signed deadline.
	#[error("Signature expired at {0}")]
	SignatureExpired(U256),
	/// The recovered or validated signer is not the claimed owner.
	#[error("Invalid signer")]
	InvalidSigner,
	/// The signature could not be recovered to a non-zero address.
	#[error("Invalid signature")]
	InvalidSignature,
	/// The signature is neither 64 nor 65 bytes long.
	#[error("Invalid signature length: {0}")]
	InvalidSignatureLength(usize),
	/// The nonce was already used, is not the expected next value, or the
	/// requested invalidation is out of bounds.
	#[error("Invalid nonce")]
	InvalidNonce,
	/// The requested amount exceeds the signed ceiling.
	#[error("Invalid amount, max {0}")]
	InvalidAmount(U256),
	/// The allowance does not cover the requested amount.
	#[error("Insufficient allowance: {0}")]
	InsufficientAllowance(U160),
	/// The allowance expired at the given timestamp.
	#[error("Allowance expired at {0}")]
	AllowanceExpired(U48),
	/// Batch arrays do not line up.
	#[error("Length mismatch")]
	LengthMismatch,
	/// The external token-transfer primitive failed.
	#[error("Transfer failed: {0}")]
	TransferFailed(String),
	/// The state store failed.
	#[error("Storage error: {0}")]
	Storage(String),
}
