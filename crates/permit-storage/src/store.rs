//! Per-owner permit state.
//!
//! Each owner's nonce bitmap and allowance records live behind a single
//! async mutex. The owner index is a concurrent map, so operations on
//! different owners never contend.

use crate::snapshot::{AllowanceEntry, NonceWordEntry, StateSnapshot};
use alloy_primitives::U256;
use dashmap::DashMap;
use permit_types::{Allowance, NativeAddress, U160};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// An allowance with the write generation it was last overwritten at.
///
/// Spending changes the amount but keeps the generation; every overwrite
/// (approve, permit, lockdown, nonce invalidation) bumps it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllowanceRecord {
	pub allowance: Allowance,
	pub generation: u64,
}

/// Mutable state of one owner.
#[derive(Debug, Default)]
pub struct OwnerState {
	nonce_words: HashMap<U256, U256>,
	/// Owner invalidations per nonce word.
	nonce_epochs: HashMap<U256, u64>,
	allowances: HashMap<(NativeAddress, NativeAddress), AllowanceRecord>,
}

impl OwnerState {
	/// Bits of the unordered nonce word at `word_pos`.
	pub fn nonce_word(&self, word_pos: U256) -> U256 {
		self.nonce_words.get(&word_pos).copied().unwrap_or_default()
	}

	/// ORs `mask` into a word and returns the new value.
	pub fn set_nonce_bits(&mut self, word_pos: U256, mask: U256) -> U256 {
		let word = self.nonce_words.entry(word_pos).or_default();
		*word |= mask;
		*word
	}

	/// Number of owner invalidations applied to the word at `word_pos`.
	pub fn nonce_epoch(&self, word_pos: U256) -> u64 {
		self.nonce_epochs.get(&word_pos).copied().unwrap_or_default()
	}

	/// ORs an owner's revocation `mask` into a word, bumps the word's epoch
	/// and returns the new value.
	pub fn invalidate_nonce_bits(&mut self, word_pos: U256, mask: U256) -> U256 {
		let epoch = self.nonce_epochs.entry(word_pos).or_default();
		*epoch = epoch.wrapping_add(1);
		self.set_nonce_bits(word_pos, mask)
	}

	/// Clears `mask` from a word. Only used to undo a consumption whose
	/// transfer failed.
	pub fn clear_nonce_bits(&mut self, word_pos: U256, mask: U256) {
		if let Some(word) = self.nonce_words.get_mut(&word_pos) {
			*word &= !mask;
			if word.is_zero() {
				self.nonce_words.remove(&word_pos);
			}
		}
	}

	pub fn allowance(&self, token: &NativeAddress, spender: &NativeAddress) -> Allowance {
		self.record(token, spender).allowance
	}

	pub fn record(&self, token: &NativeAddress, spender: &NativeAddress) -> AllowanceRecord {
		self.allowances
			.get(&(*token, *spender))
			.copied()
			.unwrap_or_default()
	}

	/// Replaces an allowance and bumps its generation.
	pub fn overwrite_allowance(
		&mut self,
		token: NativeAddress,
		spender: NativeAddress,
		allowance: Allowance,
	) -> AllowanceRecord {
		let record = self.allowances.entry((token, spender)).or_default();
		record.allowance = allowance;
		record.generation = record.generation.wrapping_add(1);
		*record
	}

	/// Sets the amount without touching the generation.
	pub fn set_amount(&mut self, token: NativeAddress, spender: NativeAddress, amount: U160) {
		self.allowances
			.entry((token, spender))
			.or_default()
			.allowance
			.amount = amount;
	}

	fn is_empty(&self) -> bool {
		self.nonce_words.is_empty() && self.allowances.is_empty()
	}
}

/// Index of all owners' state.
#[derive(Debug, Default)]
pub struct PermitStore {
	owners: DashMap<NativeAddress, Arc<Mutex<OwnerState>>>,
}

impl PermitStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn slot(&self, owner: NativeAddress) -> Arc<Mutex<OwnerState>> {
		Arc::clone(self.owners.entry(owner).or_default().value())
	}

	/// Locks one owner's state, creating it empty if absent.
	pub async fn lock(&self, owner: NativeAddress) -> OwnedMutexGuard<OwnerState> {
		self.slot(owner).lock_owned().await
	}

	/// Locks several owners in address order.
	///
	/// Duplicates are locked once. Every multi-owner caller goes through
	/// here so lock order is global.
	pub async fn lock_many(
		&self,
		owners: impl IntoIterator<Item = NativeAddress>,
	) -> HashMap<NativeAddress, OwnedMutexGuard<OwnerState>> {
		let mut sorted: Vec<NativeAddress> = owners.into_iter().collect();
		sorted.sort();
		sorted.dedup();

		let mut guards = HashMap::with_capacity(sorted.len());
		for owner in sorted {
			let guard = self.lock(owner).await;
			guards.insert(owner, guard);
		}
		guards
	}

	/// Copies every owner's state.
	///
	/// Each owner is read under its own lock; owners are not frozen together.
	pub async fn snapshot(&self) -> StateSnapshot {
		let mut slots: Vec<(NativeAddress, Arc<Mutex<OwnerState>>)> = self
			.owners
			.iter()
			.map(|entry| (*entry.key(), Arc::clone(entry.value())))
			.collect();
		slots.sort_by_key(|(owner, _)| *owner);

		let mut snapshot = StateSnapshot::default();
		for (owner, slot) in slots {
			let state = slot.lock().await;

			let mut words: Vec<_> = state.nonce_words.iter().collect();
			words.sort_by_key(|(word, _)| **word);
			snapshot
				.nonce_words
				.extend(words.into_iter().map(|(word, bits)| NonceWordEntry {
					owner,
					word: *word,
					bits: *bits,
				}));

			let mut allowances: Vec<_> = state.allowances.iter().collect();
			allowances.sort_by_key(|((token, spender), _)| (*token, *spender));
			snapshot.allowances.extend(allowances.into_iter().map(
				|((token, spender), record)| AllowanceEntry {
					owner,
					token: *token,
					spender: *spender,
					allowance: record.allowance,
				},
			));
		}
		snapshot
	}

	/// Replaces all state with `snapshot`.
	///
	/// Must not race with live operations.
	pub fn restore(&self, snapshot: &StateSnapshot) {
		let mut states: HashMap<NativeAddress, OwnerState> = HashMap::new();
		for entry in &snapshot.nonce_words {
			states
				.entry(entry.owner)
				.or_default()
				.nonce_words
				.insert(entry.word, entry.bits);
		}
		for entry in &snapshot.allowances {
			states.entry(entry.owner).or_default().allowances.insert(
				(entry.token, entry.spender),
				AllowanceRecord {
					allowance: entry.allowance,
					generation: 0,
				},
			);
		}

		self.owners.clear();
		for (owner, state) in states {
			if !state.is_empty() {
				self.owners.insert(owner, Arc::new(Mutex::new(state)));
			}
		}
	}

	pub fn owner_count(&self) -> usize {
		self.owners.len()
	}
}
