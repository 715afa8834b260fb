//! Core permit engine.
//!
//! Orchestrates off-chain token authorization: signature transfers guarded
//! by unordered nonces, and standing allowances guarded by ordered nonces.
//! Hashing and signature checks come from `permit-signature`, state from
//! `permit-storage`; token movements are delegated to a [`TokenTransfer`]
//! supplied by the host.

pub mod allowance;
pub mod builder;
pub mod engine;
pub mod nonces;
pub mod transfer;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

pub use allowance::AllowanceLedger;
pub use builder::{BuilderError, EngineBuilder};
pub use engine::{context::PermitContext, event_bus::EventBus, TransferAuthorizationEngine};
pub use nonces::UnorderedNonceTracker;
pub use transfer::{TokenTransfer, TransferError};
