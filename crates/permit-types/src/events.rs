//! Events published after permit state changes.
//!
//! Every variant is emitted only once the state mutation it describes has
//! been committed, so integrators can mirror the ledger from the event stream.

use crate::NativeAddress;
use alloy_primitives::{
	aliases::{U160, U48},
	U256,
};
use serde::{Deserialize, Serialize};

/// Main event type for permit state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermitEvent {
	/// The owner set an allowance directly.
	Approval {
		owner: NativeAddress,
		token: NativeAddress,
		spender: NativeAddress,
		amount: U160,
		expiration: U48,
	},
	/// A signed allowance permit was applied.
	Permit {
		owner: NativeAddress,
		token: NativeAddress,
		spender: NativeAddress,
		amount: U160,
		expiration: U48,
		/// The nonce the permit was signed with.
		nonce: U48,
	},
	/// An allowance was zeroed by its owner.
	Lockdown {
		owner: NativeAddress,
		token: NativeAddress,
		spender: NativeAddress,
	},
	/// The ordered nonce of an allowance was advanced past unused permits.
	NonceInvalidation {
		owner: NativeAddress,
		token: NativeAddress,
		spender: NativeAddress,
		new_nonce: U48,
		old_nonce: U48,
	},
	/// Bits of an unordered nonce word were set by the owner.
	UnorderedNonceInvalidation {
		owner: NativeAddress,
		word: U256,
		mask: U256,
	},
}

impl PermitEvent {
	/// Owner whose state changed.
	pub fn owner(&self) -> NativeAddress {
		match self {
			PermitEvent::Approval { owner, .. }
			| PermitEvent::Permit { owner, .. }
			| PermitEvent::Lockdown { owner, .. }
			| PermitEvent::NonceInvalidation { owner, .. }
			| PermitEvent::UnorderedNonceInvalidation { owner, .. } => *owner,
		}
	}
}
