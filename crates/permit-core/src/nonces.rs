//! Unordered nonces.
//!
//! A nonce `n` lives in bitmap word `n >> 8` at bit `n & 0xff`. Any unused
//! nonce may be consumed in any order; a consumed bit is never cleared except
//! to undo a consumption whose transfer failed, and not even then once the
//! owner has invalidated bits of that word in the meantime.

use alloy_primitives::U256;
use permit_storage::{OwnerState, PermitStore};
use permit_types::{NativeAddress, PermitError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Word position and single-bit mask of `nonce`.
pub fn bitmap_position(nonce: U256) -> (U256, U256) {
	let word_pos = nonce >> 8;
	let bit = nonce.as_limbs()[0] & 0xff;
	(word_pos, U256::from(1u8) << (bit as usize))
}

/// Fails with `InvalidNonce` if `nonce` is already consumed in `state`.
pub fn ensure_unused(state: &OwnerState, nonce: U256) -> Result<(), PermitError> {
	let (word_pos, mask) = bitmap_position(nonce);
	if state.nonce_word(word_pos) & mask != U256::ZERO {
		return Err(PermitError::InvalidNonce);
	}
	Ok(())
}

/// Marks `nonce` consumed in `state`.
///
/// Returns the word's invalidation epoch, which [`UnorderedNonceTracker::release`]
/// needs to undo the consumption.
pub fn consume_in(state: &mut OwnerState, nonce: U256) -> Result<u64, PermitError> {
	ensure_unused(state, nonce)?;
	let (word_pos, mask) = bitmap_position(nonce);
	state.set_nonce_bits(word_pos, mask);
	Ok(state.nonce_epoch(word_pos))
}

/// Per-owner nonce bitmaps.
#[derive(Debug, Clone)]
pub struct UnorderedNonceTracker {
	store: Arc<PermitStore>,
}

impl UnorderedNonceTracker {
	pub fn new(store: Arc<PermitStore>) -> Self {
		Self { store }
	}

	pub async fn is_used(&self, owner: NativeAddress, nonce: U256) -> bool {
		let state = self.store.lock(owner).await;
		ensure_unused(&state, nonce).is_err()
	}

	pub async fn bitmap(&self, owner: NativeAddress, word_pos: U256) -> U256 {
		self.store.lock(owner).await.nonce_word(word_pos)
	}

	/// Consumes `nonce`, failing with `InvalidNonce` if it was already used.
	pub async fn consume(&self, owner: NativeAddress, nonce: U256) -> Result<(), PermitError> {
		let mut state = self.store.lock(owner).await;
		consume_in(&mut state, nonce).map(|_| ())
	}

	/// ORs `mask` into word `word_pos` and returns the resulting word.
	pub async fn invalidate_range(&self, owner: NativeAddress, word_pos: U256, mask: U256) -> U256 {
		let word = self
			.store
			.lock(owner)
			.await
			.invalidate_nonce_bits(word_pos, mask);
		debug!(owner = %owner, word_pos = %word_pos, "unordered nonces invalidated");
		word
	}

	/// Clears a nonce consumed at `epoch`. Only for undoing a failed transfer.
	///
	/// Returns false and leaves the bit set when the owner invalidated bits of
	/// the word after the consumption.
	pub(crate) async fn release(&self, owner: NativeAddress, nonce: U256, epoch: u64) -> bool {
		let (word_pos, mask) = bitmap_position(nonce);
		let mut state = self.store.lock(owner).await;
		if state.nonce_epoch(word_pos) != epoch {
			warn!(owner = %owner, nonce = %nonce, "nonce word invalidated during transfer, not released");
			return false;
		}
		state.clear_nonce_bits(word_pos, mask);
		true
	}
}
