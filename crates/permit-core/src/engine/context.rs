//! Collaborators shared by the nonce tracker, the allowance ledger and the
//! engine.

use super::event_bus::EventBus;
use crate::transfer::TokenTransfer;
use alloy_primitives::U256;
use permit_signature::{SignatureVerifier, TypedDataDomain};
use permit_storage::PermitStore;
use permit_types::{Clock, PermitError, U48};
use std::sync::Arc;

/// Everything an authorization needs besides its own arguments.
#[derive(Clone)]
pub struct PermitContext {
	pub store: Arc<PermitStore>,
	pub clock: Arc<dyn Clock>,
	pub domain: Arc<TypedDataDomain>,
	pub verifier: SignatureVerifier,
	pub transfer: Arc<dyn TokenTransfer>,
	pub event_bus: EventBus,
}

impl PermitContext {
	pub fn now(&self) -> u64 {
		self.clock.now()
	}

	/// Fails with `SignatureExpired` once `now` is past `deadline`.
	pub fn check_deadline(&self, deadline: U256) -> Result<(), PermitError> {
		if U256::from(self.now()) > deadline {
			return Err(PermitError::SignatureExpired(deadline));
		}
		Ok(())
	}

	/// An expiration of zero stands for the current second.
	pub fn resolve_expiration(&self, expiration: U48) -> U48 {
		if expiration.is_zero() {
			U48::try_from(self.now()).unwrap_or(U48::MAX)
		} else {
			expiration
		}
	}
}

impl std::fmt::Debug for PermitContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PermitContext")
			.field("domain", &self.domain)
			.finish_non_exhaustive()
	}
}
