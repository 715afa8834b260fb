//! Builder for constructing permit engines.
//!
//! Wires a [`TransferAuthorizationEngine`] from configuration plus the
//! collaborators the host supplies: the token-transfer primitive, and
//! optionally a clock, a chain identifier source and a contract-wallet
//! registry. When a snapshot backend holds saved state it is restored before
//! the engine is returned.

use crate::engine::{context::PermitContext, event_bus::EventBus, TransferAuthorizationEngine};
use crate::transfer::TokenTransfer;
use permit_config::Config;
use permit_signature::{NoContractWallets, SignatureVerifier, TypedDataDomain, WalletRegistry};
use permit_storage::{create_backend, PermitStore, SnapshotService};
use permit_types::{ChainIdSource, Clock, SwitchableChainId, SystemClock};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Builder for a [`TransferAuthorizationEngine`].
pub struct EngineBuilder {
	config: Config,
	transfer: Option<Arc<dyn TokenTransfer>>,
	clock: Option<Arc<dyn Clock>>,
	chain_id: Option<Arc<dyn ChainIdSource>>,
	wallets: Option<Arc<dyn WalletRegistry>>,
	event_capacity: usize,
}

impl EngineBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			transfer: None,
			clock: None,
			chain_id: None,
			wallets: None,
			event_capacity: 1024,
		}
	}

	/// Sets the token-transfer primitive. Required.
	pub fn with_token_transfer(mut self, transfer: Arc<dyn TokenTransfer>) -> Self {
		self.transfer = Some(transfer);
		self
	}

	/// Overrides the system clock.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);
		self
	}

	/// Overrides the fixed chain identifier taken from configuration.
	pub fn with_chain_id_source(mut self, chain_id: Arc<dyn ChainIdSource>) -> Self {
		self.chain_id = Some(chain_id);
		self
	}

	pub fn with_wallet_registry(mut self, wallets: Arc<dyn WalletRegistry>) -> Self {
		self.wallets = Some(wallets);
		self
	}

	pub fn with_event_capacity(mut self, capacity: usize) -> Self {
		self.event_capacity = capacity;
		self
	}

	pub async fn build(self) -> Result<TransferAuthorizationEngine, BuilderError> {
		let transfer = self
			.transfer
			.ok_or_else(|| BuilderError::MissingComponent("token transfer".into()))?;
		if self.event_capacity == 0 {
			return Err(BuilderError::Config(
				"event capacity must be at least 1".into(),
			));
		}

		let chain_id = self
			.chain_id
			.unwrap_or_else(|| Arc::new(SwitchableChainId::new(self.config.domain.chain_id)));
		let domain = TypedDataDomain::new(
			self.config.domain.name.clone(),
			self.config.domain.verifying_contract,
			chain_id,
		);
		tracing::info!(
			component = "domain",
			name = %domain.name(),
			chain_id = domain.cached_chain_id(),
			verifying_contract = %domain.verifying_contract(),
			separator = %domain.domain_separator(),
			"Loaded"
		);

		let backend = create_backend(&self.config.storage).map_err(|e| {
			tracing::error!(component = "storage", error = %e, "Failed to create snapshot backend");
			BuilderError::Config(format!("Failed to create snapshot backend: {}", e))
		})?;
		let snapshots = Arc::new(SnapshotService::new(backend));
		let store = Arc::new(PermitStore::new());
		let restored = snapshots
			.restore_into(&store)
			.await
			.map_err(|e| BuilderError::Storage(e.to_string()))?;
		tracing::info!(
			component = "storage",
			backend = ?self.config.storage.backend,
			restored,
			"Loaded"
		);

		let context = PermitContext {
			store,
			clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
			domain: Arc::new(domain),
			verifier: SignatureVerifier::new(
				self.wallets.unwrap_or_else(|| Arc::new(NoContractWallets)),
			),
			transfer,
			event_bus: EventBus::new(self.event_capacity),
		};

		Ok(TransferAuthorizationEngine::new(
			context,
			self.config.nonces.max_invalidation_jump,
			Some(snapshots),
		))
	}
}
