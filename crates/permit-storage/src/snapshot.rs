//! Serializable copy of the whole permit state.

use alloy_primitives::U256;
use permit_types::{Allowance, NativeAddress};
use serde::{Deserialize, Serialize};

/// Every non-empty nonce word and allowance record, sorted by owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
	pub nonce_words: Vec<NonceWordEntry>,
	pub allowances: Vec<AllowanceEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceWordEntry {
	pub owner: NativeAddress,
	pub word: U256,
	pub bits: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceEntry {
	pub owner: NativeAddress,
	pub token: NativeAddress,
	pub spender: NativeAddress,
	pub allowance: Allowance,
}

impl StateSnapshot {
	pub fn is_empty(&self) -> bool {
		self.nonce_words.is_empty() && self.allowances.is_empty()
	}
}
