//! Allowance record kept per (owner, token, spender).

use alloy_primitives::aliases::{U160, U48};
use serde::{Deserialize, Serialize};

/// Amount, expiration and ordered nonce of a standing allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Allowance {
	pub amount: U160,
	pub expiration: U48,
	pub nonce: U48,
}

impl Allowance {
	/// An amount of `U160::MAX` is never decremented.
	pub const UNLIMITED: U160 = U160::MAX;

	pub fn is_unlimited(&self) -> bool {
		self.amount == Self::UNLIMITED
	}

	/// Whether spending is no longer allowed at `now` (seconds).
	pub fn is_expired(&self, now: u64) -> bool {
		now > self.expiration.to::<u64>()
	}
}
