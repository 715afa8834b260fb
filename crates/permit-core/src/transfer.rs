//! The external token-transfer primitive.
//!
//! The engine never moves balances itself. Once an authorization passes it
//! hands the movements to a [`TokenTransfer`] and treats any error as a
//! failure of the whole operation.

use alloy_primitives::U256;
use async_trait::async_trait;
use permit_types::{NativeAddress, PermitError, TransferInstruction};
use thiserror::Error;

/// Errors a token-transfer primitive may report.
#[derive(Debug, Error)]
pub enum TransferError {
	/// The holder does not have enough of the token.
	#[error("Insufficient balance of {token} for {holder}: have {available}, need {needed}")]
	InsufficientBalance {
		token: NativeAddress,
		holder: NativeAddress,
		available: U256,
		needed: U256,
	},
	/// The recipient balance would overflow.
	#[error("Balance overflow of {token} for {holder}")]
	Overflow {
		token: NativeAddress,
		holder: NativeAddress,
	},
	/// Any other refusal by the token.
	#[error("Transfer rejected: {0}")]
	Rejected(String),
	/// A batch failed after some of its movements were applied.
	#[error("Batch stopped after {completed} of {total} transfers: {source}")]
	Partial {
		completed: usize,
		total: usize,
		source: Box<TransferError>,
	},
}

impl TransferError {
	/// Whether tokens moved before the failure.
	///
	/// The engine keeps consumed nonces and debited allowances in that case.
	pub fn moved_tokens(&self) -> bool {
		matches!(self, TransferError::Partial { .. })
	}
}

impl From<TransferError> for PermitError {
	fn from(err: TransferError) -> Self {
		PermitError::TransferFailed(err.to_string())
	}
}

/// Moves tokens on behalf of the engine.
///
/// Implementations may take unbounded time and may call back into the engine.
#[async_trait]
pub trait TokenTransfer: Send + Sync {
	/// Moves `instruction.amount` of `instruction.token` from `from` to `to`.
	async fn transfer(&self, instruction: &TransferInstruction) -> Result<(), TransferError>;

	/// Moves several amounts as one operation.
	///
	/// Must either apply every movement or report which failure left
	/// earlier ones in place. The default applies them one after another and
	/// returns [`TransferError::Partial`] when a failure follows a movement.
	/// Implementations that can apply a batch all-or-nothing should override
	/// it.
	async fn transfer_batch(&self, instructions: &[TransferInstruction]) -> Result<(), TransferError> {
		for (completed, instruction) in instructions.iter().enumerate() {
			if let Err(e) = self.transfer(instruction).await {
				if completed == 0 {
					return Err(e);
				}
				return Err(TransferError::Partial {
					completed,
					total: instructions.len(),
					source: Box::new(e),
				});
			}
		}
		Ok(())
	}
}
