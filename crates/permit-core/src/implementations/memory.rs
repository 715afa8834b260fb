//! In-memory token balances implementing the transfer primitive.
//!
//! Useful for testing and for embedding the engine where balances are
//! tracked by the host process. Batches are applied all-or-nothing.

use crate::transfer::{TokenTransfer, TransferError};
use alloy_primitives::U256;
use async_trait::async_trait;
use permit_types::{NativeAddress, TransferInstruction};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Balances keyed by (token, holder).
#[derive(Debug, Default)]
pub struct MemoryTokenLedger {
	balances: Mutex<HashMap<(NativeAddress, NativeAddress), U256>>,
}

impl MemoryTokenLedger {
	pub fn new() -> Self {
		Self::default()
	}

	/// Credits `amount` of `token` to `holder` out of thin air.
	pub async fn mint(&self, token: NativeAddress, holder: NativeAddress, amount: U256) {
		let mut balances = self.balances.lock().await;
		let balance = balances.entry((token, holder)).or_default();
		*balance = balance.saturating_add(amount);
	}

	pub async fn balance_of(&self, token: &NativeAddress, holder: &NativeAddress) -> U256 {
		self.balances
			.lock()
			.await
			.get(&(*token, *holder))
			.copied()
			.unwrap_or_default()
	}
}

fn apply(
	balances: &mut HashMap<(NativeAddress, NativeAddress), U256>,
	instruction: &TransferInstruction,
) -> Result<(), TransferError> {
	let TransferInstruction {
		from,
		to,
		amount,
		token,
	} = *instruction;

	let available = balances.get(&(token, from)).copied().unwrap_or_default();
	let remaining = available
		.checked_sub(amount)
		.ok_or(TransferError::InsufficientBalance {
			token,
			holder: from,
			available,
			needed: amount,
		})?;
	balances.insert((token, from), remaining);

	let credited = balances.get(&(token, to)).copied().unwrap_or_default();
	let credited = credited
		.checked_add(amount)
		.ok_or(TransferError::Overflow { token, holder: to })?;
	balances.insert((token, to), credited);
	Ok(())
}

#[async_trait]
impl TokenTransfer for MemoryTokenLedger {
	async fn transfer(&self, instruction: &TransferInstruction) -> Result<(), TransferError> {
		self.transfer_batch(std::slice::from_ref(instruction)).await
	}

	async fn transfer_batch(&self, instructions: &[TransferInstruction]) -> Result<(), TransferError> {
		let mut balances = self.balances.lock().await;
		let mut staged = balances.clone();
		for instruction in instructions {
			apply(&mut staged, instruction)?;
		}
		*balances = staged;
		Ok(())
	}
}
