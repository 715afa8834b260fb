//! Standing allowances keyed by (owner, token, spender).
//!
//! Allowances are set by a signed permit carrying the record's current
//! ordered nonce, or directly by the owner through `approve`. A spender then
//! draws on them with `transfer_from` until they run out or expire.

use crate::engine::context::PermitContext;
use crate::transfer::TransferError;
use alloy_primitives::U256;
use permit_signature::hasher::{hash_permit_batch, hash_permit_single};
use permit_storage::OwnerState;
use permit_types::{
	Allowance, AllowanceTransferDetails, NativeAddress, PermitBatch, PermitDetails, PermitError,
	PermitEvent, PermitSingle, TokenSpenderPair, TransferInstruction, U160, U48,
};
use std::collections::{hash_map::Entry, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Amount taken from one allowance record by a spend.
#[derive(Debug, Clone, Copy)]
struct Debit {
	owner: NativeAddress,
	token: NativeAddress,
	amount: U160,
	generation: u64,
}

/// Ledger of standing allowances.
#[derive(Debug, Clone)]
pub struct AllowanceLedger {
	context: Arc<PermitContext>,
	max_invalidation_jump: u64,
}

impl AllowanceLedger {
	pub fn new(context: Arc<PermitContext>, max_invalidation_jump: u64) -> Self {
		Self {
			context,
			max_invalidation_jump,
		}
	}

	pub async fn get(
		&self,
		owner: NativeAddress,
		token: NativeAddress,
		spender: NativeAddress,
	) -> Allowance {
		self.context.store.lock(owner).await.allowance(&token, &spender)
	}

	/// Applies a signed single-token allowance.
	#[instrument(skip_all, fields(owner = %owner, token = %permit.details.token, spender = %permit.spender))]
	pub async fn permit(
		&self,
		owner: NativeAddress,
		permit: &PermitSingle,
		signature: &[u8],
	) -> Result<(), PermitError> {
		self.context.check_deadline(permit.sig_deadline)?;

		let digest = self.context.domain.hash_typed_data(hash_permit_single(permit));
		self.context.verifier.verify(signature, digest, &owner).await?;

		let event = {
			let mut state = self.context.store.lock(owner).await;
			self.apply_details(&mut state, owner, &permit.details, permit.spender)?
		};
		self.context.event_bus.publish(event).ok();

		debug!("allowance permit applied");
		Ok(())
	}

	/// Applies a signed multi-token allowance. Either every entry is applied or
	/// none is.
	#[instrument(skip_all, fields(owner = %owner, spender = %permit.spender, entries = permit.details.len()))]
	pub async fn permit_batch(
		&self,
		owner: NativeAddress,
		permit: &PermitBatch,
		signature: &[u8],
	) -> Result<(), PermitError> {
		self.context.check_deadline(permit.sig_deadline)?;

		let digest = self.context.domain.hash_typed_data(hash_permit_batch(permit));
		self.context.verifier.verify(signature, digest, &owner).await?;

		let events = {
			let mut state = self.context.store.lock(owner).await;

			// Entries for the same token chain their nonces.
			let mut expected: HashMap<NativeAddress, U48> = HashMap::new();
			for details in &permit.details {
				let current = expected
					.get(&details.token)
					.copied()
					.unwrap_or_else(|| state.allowance(&details.token, &permit.spender).nonce);
				if details.nonce != current {
					return Err(PermitError::InvalidNonce);
				}
				expected.insert(details.token, current.wrapping_add(U48::from(1u8)));
			}

			let mut events = Vec::with_capacity(permit.details.len());
			for details in &permit.details {
				events.push(self.apply_details(&mut state, owner, details, permit.spender)?);
			}
			events
		};
		for event in events {
			self.context.event_bus.publish(event).ok();
		}

		debug!("allowance batch permit applied");
		Ok(())
	}

	/// Checks the ordered nonce and overwrites the record.
	fn apply_details(
		&self,
		state: &mut OwnerState,
		owner: NativeAddress,
		details: &PermitDetails,
		spender: NativeAddress,
	) -> Result<PermitEvent, PermitError> {
		let current = state.allowance(&details.token, &spender);
		if details.nonce != current.nonce {
			return Err(PermitError::InvalidNonce);
		}

		let expiration = self.context.resolve_expiration(details.expiration);
		state.overwrite_allowance(
			details.token,
			spender,
			Allowance {
				amount: details.amount,
				expiration,
				nonce: current.nonce.wrapping_add(U48::from(1u8)),
			},
		);

		Ok(PermitEvent::Permit {
			owner,
			token: details.token,
			spender,
			amount: details.amount,
			expiration,
			nonce: details.nonce,
		})
	}

	/// Sets an allowance directly. The caller is the owner; no signature and
	/// no nonce are involved.
	#[instrument(skip_all, fields(owner = %owner, token = %token, spender = %spender))]
	pub async fn approve(
		&self,
		owner: NativeAddress,
		token: NativeAddress,
		spender: NativeAddress,
		amount: U160,
		expiration: U48,
	) -> Result<(), PermitError> {
		let expiration = self.context.resolve_expiration(expiration);
		{
			let mut state = self.context.store.lock(owner).await;
			let nonce = state.allowance(&token, &spender).nonce;
			state.overwrite_allowance(
				token,
				spender,
				Allowance {
					amount,
					expiration,
					nonce,
				},
			);
		}

		self.context
			.event_bus
			.publish(PermitEvent::Approval {
				owner,
				token,
				spender,
				amount,
				expiration,
			})
			.ok();
		debug!("allowance approved");
		Ok(())
	}

	/// Spends `amount` of `spender`'s allowance from `from` and moves the tokens
	/// to `to`.
	#[instrument(skip_all, fields(spender = %spender, from = %from, token = %token))]
	pub async fn transfer_from(
		&self,
		spender: NativeAddress,
		from: NativeAddress,
		to: NativeAddress,
		amount: U160,
		token: NativeAddress,
	) -> Result<(), PermitError> {
		let now = self.context.now();
		let debit = {
			let mut state = self.context.store.lock(from).await;
			let record = state.record(&token, &spender);
			let remaining = spend(&record.allowance, amount, now)?;
			if let Some(remaining) = remaining {
				state.set_amount(token, spender, remaining);
			}
			remaining.map(|_| Debit {
				owner: from,
				token,
				amount,
				generation: record.generation,
			})
		};

		let instruction = TransferInstruction {
			from,
			to,
			amount: U256::from(amount),
			token,
		};
		if let Err(e) = self.context.transfer.transfer(&instruction).await {
			self.undo_debits(spender, debit.into_iter().collect(), &e).await;
			return Err(e.into());
		}

		debug!(amount = %amount, "allowance spent");
		Ok(())
	}

	/// Spends several allowances of `spender` as one operation.
	///
	/// All entries are checked and debited before a single batch transfer is
	/// issued. Owners are locked in address order.
	#[instrument(skip_all, fields(spender = %spender, entries = transfers.len()))]
	pub async fn transfer_from_batch(
		&self,
		spender: NativeAddress,
		transfers: &[AllowanceTransferDetails],
	) -> Result<(), PermitError> {
		let now = self.context.now();
		let debits = {
			let mut guards = self
				.context
				.store
				.lock_many(transfers.iter().map(|t| t.from))
				.await;

			// Running amount per (owner, token) so repeated pairs draw on the
			// same record.
			let mut staged: HashMap<(NativeAddress, NativeAddress), (Allowance, u64, U160)> =
				HashMap::new();
			for transfer in transfers {
				let key = (transfer.from, transfer.token);
				let entry = match staged.entry(key) {
					Entry::Occupied(entry) => entry.into_mut(),
					Entry::Vacant(slot) => {
						let state = guards
							.get(&transfer.from)
							.ok_or_else(|| PermitError::Storage("owner not locked".into()))?;
						let record = state.record(&transfer.token, &spender);
						slot.insert((record.allowance, record.generation, U160::ZERO))
					},
				};
				if let Some(remaining) = spend(&entry.0, transfer.amount, now)? {
					entry.0.amount = remaining;
					entry.2 += transfer.amount;
				}
			}

			let mut debits = Vec::new();
			for ((owner, token), (allowance, generation, spent)) in staged {
				if spent.is_zero() {
					continue;
				}
				let state = guards
					.get_mut(&owner)
					.ok_or_else(|| PermitError::Storage("owner not locked".into()))?;
				state.set_amount(token, spender, allowance.amount);
				debits.push(Debit {
					owner,
					token,
					amount: spent,
					generation,
				});
			}
			debits
		};

		let instructions: Vec<TransferInstruction> = transfers
			.iter()
			.map(|t| TransferInstruction {
				from: t.from,
				to: t.to,
				amount: U256::from(t.amount),
				token: t.token,
			})
			.collect();
		if let Err(e) = self.context.transfer.transfer_batch(&instructions).await {
			self.undo_debits(spender, debits, &e).await;
			return Err(e.into());
		}

		debug!("allowance batch spent");
		Ok(())
	}

	/// Restores debits after a failed transfer, unless tokens already moved.
	async fn undo_debits(&self, spender: NativeAddress, debits: Vec<Debit>, error: &TransferError) {
		if error.moved_tokens() {
			warn!(error = %error, "transfer partially applied, allowances stay debited");
			return;
		}
		warn!(error = %error, "token transfer failed, restoring allowances");
		self.restore(spender, debits).await;
	}

	/// Credits debits back to records that were not overwritten since.
	async fn restore(&self, spender: NativeAddress, mut debits: Vec<Debit>) {
		debits.sort_by_key(|d| (d.owner, d.token));
		let mut guards = self
			.context
			.store
			.lock_many(debits.iter().map(|d| d.owner))
			.await;

		for debit in debits {
			let Some(state) = guards.get_mut(&debit.owner) else {
				continue;
			};
			let record = state.record(&debit.token, &spender);
			if record.generation != debit.generation || record.allowance.is_unlimited() {
				warn!(
					owner = %debit.owner,
					token = %debit.token,
					"allowance overwritten during transfer, not restored"
				);
				continue;
			}
			let credited = record.allowance.amount.saturating_add(debit.amount);
			state.set_amount(debit.token, spender, credited);
		}
	}

	/// Advances the ordered nonce past permits that were signed but not used.
	#[instrument(skip_all, fields(owner = %owner, token = %token, spender = %spender))]
	pub async fn invalidate_nonces(
		&self,
		owner: NativeAddress,
		token: NativeAddress,
		spender: NativeAddress,
		new_nonce: U48,
	) -> Result<(), PermitError> {
		let old_nonce = {
			let mut state = self.context.store.lock(owner).await;
			let current = state.allowance(&token, &spender);
			if new_nonce <= current.nonce {
				return Err(PermitError::InvalidNonce);
			}
			let jump: u64 = (new_nonce - current.nonce).to();
			if jump > self.max_invalidation_jump {
				return Err(PermitError::InvalidNonce);
			}

			state.overwrite_allowance(
				token,
				spender,
				Allowance {
					nonce: new_nonce,
					..current
				},
			);
			current.nonce
		};

		self.context
			.event_bus
			.publish(PermitEvent::NonceInvalidation {
				owner,
				token,
				spender,
				new_nonce,
				old_nonce,
			})
			.ok();
		debug!(old = %old_nonce, new = %new_nonce, "ordered nonces invalidated");
		Ok(())
	}

	/// Zeroes the listed allowances. Expiration and nonce are kept.
	#[instrument(skip_all, fields(owner = %owner, pairs = approvals.len()))]
	pub async fn lockdown(
		&self,
		owner: NativeAddress,
		approvals: &[TokenSpenderPair],
	) -> Result<(), PermitError> {
		{
			let mut state = self.context.store.lock(owner).await;
			for pair in approvals {
				let current = state.allowance(&pair.token, &pair.spender);
				state.overwrite_allowance(
					pair.token,
					pair.spender,
					Allowance {
						amount: U160::ZERO,
						..current
					},
				);
			}
		}

		for pair in approvals {
			self.context
				.event_bus
				.publish(PermitEvent::Lockdown {
					owner,
					token: pair.token,
					spender: pair.spender,
				})
				.ok();
		}
		debug!("allowances locked down");
		Ok(())
	}
}

/// Checks a spend against an allowance.
///
/// Expiration is checked before amount. Returns the remaining amount to
/// store, or `None` for an unlimited allowance, which is never decremented.
fn spend(allowance: &Allowance, amount: U160, now: u64) -> Result<Option<U160>, PermitError> {
	if allowance.is_expired(now) {
		return Err(PermitError::AllowanceExpired(allowance.expiration));
	}
	if allowance.is_unlimited() {
		return Ok(None);
	}
	allowance
		.amount
		.checked_sub(amount)
		.map(Some)
		.ok_or(PermitError::InsufficientAllowance(allowance.amount))
}
