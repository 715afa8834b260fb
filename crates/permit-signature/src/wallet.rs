//! Contract wallets and the registry that tells them apart from raw keys.
//!
//! An owner address with code behind it cannot sign; instead its contract is
//! asked whether a (hash, signature) pair is valid for it. The registry plays
//! the role of the code-size lookup.

use alloy_primitives::B256;
use async_trait::async_trait;
use dashmap::DashMap;
use permit_types::NativeAddress;
use std::sync::Arc;
use thiserror::Error;

/// Value a contract wallet returns to accept a signature.
pub const EIP1271_MAGIC_VALUE: [u8; 4] = [0x16, 0x26, 0xba, 0x7e];

/// Errors a contract wallet may raise while validating.
#[derive(Debug, Error)]
pub enum WalletError {
	/// The wallet call reverted or could not be made.
	#[error("Wallet call failed: {0}")]
	CallFailed(String),
}

/// A smart-contract owner that validates signatures itself.
#[async_trait]
pub trait ContractWallet: Send + Sync {
	/// Returns [`EIP1271_MAGIC_VALUE`] if `signature` is valid for `hash`.
	///
	/// Any other value, and any error, is treated as a rejection.
	async fn is_valid_signature(&self, hash: B256, signature: &[u8]) -> Result<[u8; 4], WalletError>;
}

/// Lookup from owner address to contract wallet.
pub trait WalletRegistry: Send + Sync {
	/// The wallet deployed at `owner`, or `None` if `owner` is a raw key.
	fn wallet(&self, owner: &NativeAddress) -> Option<Arc<dyn ContractWallet>>;
}

/// Registry with no contract wallets; every owner is a raw key.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContractWallets;

impl WalletRegistry for NoContractWallets {
	fn wallet(&self, _owner: &NativeAddress) -> Option<Arc<dyn ContractWallet>> {
		None
	}
}

/// Registry backed by a concurrent map, populated at runtime.
#[derive(Default)]
pub struct MemoryWalletRegistry {
	wallets: DashMap<NativeAddress, Arc<dyn ContractWallet>>,
}

impl MemoryWalletRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Deploys `wallet` at `owner`, replacing any previous one.
	pub fn register(&self, owner: NativeAddress, wallet: Arc<dyn ContractWallet>) {
		self.wallets.insert(owner, wallet);
	}

	pub fn remove(&self, owner: &NativeAddress) -> bool {
		self.wallets.remove(owner).is_some()
	}
}

impl WalletRegistry for MemoryWalletRegistry {
	fn wallet(&self, owner: &NativeAddress) -> Option<Arc<dyn ContractWallet>> {
		self.wallets.get(owner).map(|entry| Arc::clone(entry.value()))
	}
}
