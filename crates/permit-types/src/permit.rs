//! Permit message types for signature transfers and allowances.
//!
//! Two families live here. Signature-transfer permits (`PermitTransferFrom`,
//! `PermitBatchTransferFrom`) authorize a single, one-shot movement of tokens
//! guarded by an unordered nonce. Allowance permits (`PermitSingle`,
//! `PermitBatch`) set a standing allowance guarded by an ordered nonce.

use crate::NativeAddress;
use alloy_primitives::{
	aliases::{U160, U48},
	B256, U256,
};
use serde::{Deserialize, Serialize};

/// A token and the maximum amount of it the signer lets move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPermissions {
	pub token: NativeAddress,
	pub amount: U256,
}

/// Signed one-shot transfer of a single token.
///
/// The spender is not a field: it is bound at hashing time to whoever invokes
/// the transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitTransferFrom {
	pub permitted: TokenPermissions,
	/// Unordered nonce; any unused value works.
	pub nonce: U256,
	/// Last second (inclusive) at which the signature is accepted.
	pub deadline: U256,
}

/// Signed one-shot transfer of several tokens under one nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitBatchTransferFrom {
	pub permitted: Vec<TokenPermissions>,
	pub nonce: U256,
	pub deadline: U256,
}

/// Caller-supplied destination and amount for a signature transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureTransferDetails {
	pub to: NativeAddress,
	/// Must not exceed the permitted amount; zero skips the transfer in batches.
	pub requested_amount: U256,
}

/// Witness data bound into a signature-transfer permit.
///
/// `witness_type_string` is appended to the permit's type stub, so it must
/// finish the outer type (e.g. `"MyWitness witness)MyWitness(uint256 value)TokenPermissions(address token,uint256 amount)"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Witness {
	pub witness: B256,
	pub witness_type_string: String,
}

/// One standing-allowance grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitDetails {
	pub token: NativeAddress,
	pub amount: U160,
	/// Zero stores the current timestamp.
	pub expiration: U48,
	/// Must equal the ledger's current nonce for (owner, token, spender).
	pub nonce: U48,
}

/// Signed allowance for one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitSingle {
	pub details: PermitDetails,
	pub spender: NativeAddress,
	pub sig_deadline: U256,
}

/// Signed allowances for several tokens, all for the same spender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitBatch {
	pub details: Vec<PermitDetails>,
	pub spender: NativeAddress,
	pub sig_deadline: U256,
}

/// One entry of an allowance-based batch transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceTransferDetails {
	pub from: NativeAddress,
	pub to: NativeAddress,
	pub amount: U160,
	pub token: NativeAddress,
}

/// A (token, spender) pair to revoke in a lockdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSpenderPair {
	pub token: NativeAddress,
	pub spender: NativeAddress,
}

/// A single movement handed to the token-transfer primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferInstruction {
	pub from: NativeAddress,
	pub to: NativeAddress,
	pub amount: U256,
	pub token: NativeAddress,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_permit_json_uses_camel_case() {
		let permit = PermitSingle {
			details: PermitDetails {
				token: NativeAddress::from_account_bytes([1; 20]),
				amount: U160::from(500u64),
				expiration: U48::from(1_700_000_000u64),
				nonce: U48::ZERO,
			},
			spender: NativeAddress::from_account_bytes([2; 20]),
			sig_deadline: U256::from(1_700_000_100u64),
		};

		let value = serde_json::to_value(&permit).unwrap();
		assert!(value.get("sigDeadline").is_some());
		assert!(value["details"].get("expiration").is_some());

		let back: PermitSingle = serde_json::from_value(value).unwrap();
		assert_eq!(back, permit);
	}
}
