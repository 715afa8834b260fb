//! Transfer authorization engine.
//!
//! Entry point for every permit operation. Signature transfers are checked
//! in this order: deadline, array lengths, signature, nonce, amounts. The
//! nonce is consumed under the owner's lock together with the amount checks,
//! and the token transfer runs after the lock is released. A transfer that
//! fails without moving anything releases the nonce again, unless the owner
//! invalidated bits of its word meanwhile.
//!
//! Allowance operations are delegated to the [`AllowanceLedger`].

pub mod context;
pub mod event_bus;

use crate::allowance::AllowanceLedger;
use crate::nonces::{consume_in, UnorderedNonceTracker};
use crate::transfer::TransferError;
use alloy_primitives::{B256, U256};
use context::PermitContext;
use event_bus::EventBus;
use permit_signature::hasher::{
	hash_permit_batch_transfer_from, hash_permit_batch_witness_transfer_from,
	hash_permit_transfer_from, hash_permit_witness_transfer_from,
};
use permit_storage::{SnapshotService, StateSnapshot};
use permit_types::{
	utils::truncate_id, Allowance, AllowanceTransferDetails, NativeAddress, PermitBatch,
	PermitBatchTransferFrom, PermitError, PermitEvent, PermitSingle, PermitTransferFrom,
	SignatureTransferDetails, TokenPermissions, TokenSpenderPair, TransferInstruction, Witness,
	U160, U48,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

/// Main permit engine.
#[derive(Clone)]
pub struct TransferAuthorizationEngine {
	context: Arc<PermitContext>,
	nonces: UnorderedNonceTracker,
	allowances: AllowanceLedger,
	snapshots: Option<Arc<SnapshotService>>,
}

impl TransferAuthorizationEngine {
	/// Creates an engine over `context`.
	///
	/// `max_invalidation_jump` bounds how far one ordered-nonce invalidation
	/// may advance a record.
	pub fn new(
		context: PermitContext,
		max_invalidation_jump: u64,
		snapshots: Option<Arc<SnapshotService>>,
	) -> Self {
		let context = Arc::new(context);
		Self {
			nonces: UnorderedNonceTracker::new(context.store.clone()),
			allowances: AllowanceLedger::new(context.clone(), max_invalidation_jump),
			context,
			snapshots,
		}
	}

	pub fn domain_separator(&self) -> B256 {
		self.context.domain.domain_separator()
	}

	pub fn subscribe(&self) -> broadcast::Receiver<PermitEvent> {
		self.context.event_bus.subscribe()
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.context.event_bus
	}

	pub fn nonces(&self) -> &UnorderedNonceTracker {
		&self.nonces
	}

	pub fn allowances(&self) -> &AllowanceLedger {
		&self.allowances
	}

	/// Transfers tokens under a signed single-token permit.
	///
	/// `caller` is the address invoking the transfer; the signature must have
	/// been made for it.
	#[instrument(skip_all, fields(owner = %owner, nonce = %permit.nonce))]
	pub async fn permit_transfer_from(
		&self,
		caller: NativeAddress,
		permit: &PermitTransferFrom,
		transfer_details: &SignatureTransferDetails,
		owner: NativeAddress,
		signature: &[u8],
	) -> Result<(), PermitError> {
		self.context.check_deadline(permit.deadline)?;
		let struct_hash = hash_permit_transfer_from(permit, &caller);
		self.settle_single(permit, transfer_details, owner, struct_hash, signature)
			.await
			.inspect_err(|e| warn!(error = %e, "signature transfer rejected"))
	}

	/// Like [`permit_transfer_from`](Self::permit_transfer_from) with witness
	/// data folded into the signed hash.
	#[instrument(skip_all, fields(owner = %owner, nonce = %permit.nonce, witness = %truncate_id(&witness.witness.to_string())))]
	pub async fn permit_witness_transfer_from(
		&self,
		caller: NativeAddress,
		permit: &PermitTransferFrom,
		transfer_details: &SignatureTransferDetails,
		owner: NativeAddress,
		witness: &Witness,
		signature: &[u8],
	) -> Result<(), PermitError> {
		self.context.check_deadline(permit.deadline)?;
		let struct_hash = hash_permit_witness_transfer_from(
			permit,
			witness.witness,
			&witness.witness_type_string,
			&caller,
		);
		self.settle_single(permit, transfer_details, owner, struct_hash, signature)
			.await
			.inspect_err(|e| warn!(error = %e, "witness transfer rejected"))
	}

	/// Transfers several tokens under one signed permit and one nonce.
	///
	/// `transfer_details[i]` draws on `permit.permitted[i]`; a requested
	/// amount of zero skips that entry.
	#[instrument(skip_all, fields(owner = %owner, nonce = %permit.nonce, entries = permit.permitted.len()))]
	pub async fn permit_transfer_from_batch(
		&self,
		caller: NativeAddress,
		permit: &PermitBatchTransferFrom,
		transfer_details: &[SignatureTransferDetails],
		owner: NativeAddress,
		signature: &[u8],
	) -> Result<(), PermitError> {
		self.context.check_deadline(permit.deadline)?;
		check_lengths(permit, transfer_details)?;
		let struct_hash = hash_permit_batch_transfer_from(permit, &caller);
		self.settle_batch(permit, transfer_details, owner, struct_hash, signature)
			.await
			.inspect_err(|e| warn!(error = %e, "batch signature transfer rejected"))
	}

	#[instrument(skip_all, fields(owner = %owner, nonce = %permit.nonce, entries = permit.permitted.len()))]
	pub async fn permit_witness_transfer_from_batch(
		&self,
		caller: NativeAddress,
		permit: &PermitBatchTransferFrom,
		transfer_details: &[SignatureTransferDetails],
		owner: NativeAddress,
		witness: &Witness,
		signature: &[u8],
	) -> Result<(), PermitError> {
		self.context.check_deadline(permit.deadline)?;
		check_lengths(permit, transfer_details)?;
		let struct_hash = hash_permit_batch_witness_transfer_from(
			permit,
			witness.witness,
			&witness.witness_type_string,
			&caller,
		);
		self.settle_batch(permit, transfer_details, owner, struct_hash, signature)
			.await
			.inspect_err(|e| warn!(error = %e, "batch witness transfer rejected"))
	}

	async fn settle_single(
		&self,
		permit: &PermitTransferFrom,
		transfer_details: &SignatureTransferDetails,
		owner: NativeAddress,
		struct_hash: B256,
		signature: &[u8],
	) -> Result<(), PermitError> {
		let digest = self.context.domain.hash_typed_data(struct_hash);
		self.context.verifier.verify(signature, digest, &owner).await?;

		let epoch = {
			let mut state = self.context.store.lock(owner).await;
			crate::nonces::ensure_unused(&state, permit.nonce)?;
			check_amount(&permit.permitted, transfer_details)?;
			consume_in(&mut state, permit.nonce)?
		};

		let instruction = TransferInstruction {
			from: owner,
			to: transfer_details.to,
			amount: transfer_details.requested_amount,
			token: permit.permitted.token,
		};
		if let Err(e) = self.context.transfer.transfer(&instruction).await {
			self.undo_consumption(owner, permit.nonce, epoch, &e).await;
			return Err(e.into());
		}

		debug!(amount = %transfer_details.requested_amount, "signature transfer settled");
		Ok(())
	}

	async fn settle_batch(
		&self,
		permit: &PermitBatchTransferFrom,
		transfer_details: &[SignatureTransferDetails],
		owner: NativeAddress,
		struct_hash: B256,
		signature: &[u8],
	) -> Result<(), PermitError> {
		let digest = self.context.domain.hash_typed_data(struct_hash);
		self.context.verifier.verify(signature, digest, &owner).await?;

		let epoch = {
			let mut state = self.context.store.lock(owner).await;
			crate::nonces::ensure_unused(&state, permit.nonce)?;
			for (permitted, details) in permit.permitted.iter().zip(transfer_details) {
				check_amount(permitted, details)?;
			}
			consume_in(&mut state, permit.nonce)?
		};

		let instructions: Vec<TransferInstruction> = permit
			.permitted
			.iter()
			.zip(transfer_details)
			.filter(|(_, details)| !details.requested_amount.is_zero())
			.map(|(permitted, details)| TransferInstruction {
				from: owner,
				to: details.to,
				amount: details.requested_amount,
				token: permitted.token,
			})
			.collect();

		if !instructions.is_empty() {
			if let Err(e) = self.context.transfer.transfer_batch(&instructions).await {
				self.undo_consumption(owner, permit.nonce, epoch, &e).await;
				return Err(e.into());
			}
		}

		debug!(transfers = instructions.len(), "batch signature transfer settled");
		Ok(())
	}

	/// Releases a nonce whose transfer failed, unless tokens already moved.
	async fn undo_consumption(&self, owner: NativeAddress, nonce: U256, epoch: u64, error: &TransferError) {
		if error.moved_tokens() {
			warn!(error = %error, "transfer partially applied, nonce stays consumed");
			return;
		}
		warn!(error = %error, "token transfer failed, releasing nonce");
		self.nonces.release(owner, nonce, epoch).await;
	}

	/// Sets bits of the owner's nonce word `word_pos`, revoking every
	/// unused permit signed with those nonces.
	#[instrument(skip_all, fields(owner = %owner, word_pos = %word_pos))]
	pub async fn invalidate_unordered_nonces(
		&self,
		owner: NativeAddress,
		word_pos: U256,
		mask: U256,
	) -> Result<(), PermitError> {
		self.nonces.invalidate_range(owner, word_pos, mask).await;
		self.context
			.event_bus
			.publish(PermitEvent::UnorderedNonceInvalidation {
				owner,
				word: word_pos,
				mask,
			})
			.ok();
		Ok(())
	}

	pub async fn nonce_bitmap(&self, owner: NativeAddress, word_pos: U256) -> U256 {
		self.nonces.bitmap(owner, word_pos).await
	}

	pub async fn is_nonce_used(&self, owner: NativeAddress, nonce: U256) -> bool {
		self.nonces.is_used(owner, nonce).await
	}

	pub async fn allowance(
		&self,
		owner: NativeAddress,
		token: NativeAddress,
		spender: NativeAddress,
	) -> Allowance {
		self.allowances.get(owner, token, spender).await
	}

	pub async fn permit(
		&self,
		owner: NativeAddress,
		permit: &PermitSingle,
		signature: &[u8],
	) -> Result<(), PermitError> {
		self.allowances
			.permit(owner, permit, signature)
			.await
			.inspect_err(|e| warn!(error = %e, "allowance permit rejected"))
	}

	pub async fn permit_batch(
		&self,
		owner: NativeAddress,
		permit: &PermitBatch,
		signature: &[u8],
	) -> Result<(), PermitError> {
		self.allowances
			.permit_batch(owner, permit, signature)
			.await
			.inspect_err(|e| warn!(error = %e, "allowance batch permit rejected"))
	}

	/// Owner-initiated allowance; `owner` is the authenticated caller.
	pub async fn approve(
		&self,
		owner: NativeAddress,
		token: NativeAddress,
		spender: NativeAddress,
		amount: U160,
		expiration: U48,
	) -> Result<(), PermitError> {
		self.allowances
			.approve(owner, token, spender, amount, expiration)
			.await
			.inspect_err(|e| warn!(error = %e, "approval rejected"))
	}

	/// Spends `caller`'s allowance from `from`.
	pub async fn transfer_from(
		&self,
		caller: NativeAddress,
		from: NativeAddress,
		to: NativeAddress,
		amount: U160,
		token: NativeAddress,
	) -> Result<(), PermitError> {
		self.allowances
			.transfer_from(caller, from, to, amount, token)
			.await
			.inspect_err(|e| warn!(error = %e, "allowance transfer rejected"))
	}

	pub async fn transfer_from_batch(
		&self,
		caller: NativeAddress,
		transfers: &[AllowanceTransferDetails],
	) -> Result<(), PermitError> {
		self.allowances
			.transfer_from_batch(caller, transfers)
			.await
			.inspect_err(|e| warn!(error = %e, "allowance batch transfer rejected"))
	}

	pub async fn invalidate_nonces(
		&self,
		owner: NativeAddress,
		token: NativeAddress,
		spender: NativeAddress,
		new_nonce: U48,
	) -> Result<(), PermitError> {
		self.allowances
			.invalidate_nonces(owner, token, spender, new_nonce)
			.await
			.inspect_err(|e| warn!(error = %e, "nonce invalidation rejected"))
	}

	pub async fn lockdown(
		&self,
		owner: NativeAddress,
		approvals: &[TokenSpenderPair],
	) -> Result<(), PermitError> {
		self.allowances
			.lockdown(owner, approvals)
			.await
			.inspect_err(|e| warn!(error = %e, "lockdown rejected"))
	}

	/// Copies the current state without persisting it.
	pub async fn snapshot(&self) -> StateSnapshot {
		self.context.store.snapshot().await
	}

	/// Writes the current state to the configured snapshot backend.
	pub async fn persist(&self) -> Result<StateSnapshot, PermitError> {
		let snapshots = self
			.snapshots
			.as_ref()
			.ok_or_else(|| PermitError::Storage("no snapshot backend configured".into()))?;
		Ok(snapshots.save(&self.context.store).await?)
	}
}

fn check_lengths(
	permit: &PermitBatchTransferFrom,
	transfer_details: &[SignatureTransferDetails],
) -> Result<(), PermitError> {
	if permit.permitted.len() != transfer_details.len() {
		return Err(PermitError::LengthMismatch);
	}
	Ok(())
}

fn check_amount(
	permitted: &TokenPermissions,
	details: &SignatureTransferDetails,
) -> Result<(), PermitError> {
	if details.requested_amount > permitted.amount {
		return Err(PermitError::InvalidAmount(permitted.amount));
	}
	Ok(())
}

impl std::fmt::Debug for TransferAuthorizationEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TransferAuthorizationEngine")
			.field("context", &self.context)
			.finish_non_exhaustive()
	}
}
