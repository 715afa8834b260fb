#![allow(dead_code)]

use alloy_primitives::U256;
use async_trait::async_trait;
use permit_config::Config;
use permit_core::{
	implementations::memory::MemoryTokenLedger, EngineBuilder, TokenTransfer, TransferAuthorizationEngine,
	TransferError,
};
use permit_signature::{PermitSigner, TypedDataDomain, WalletRegistry};
use permit_types::{ManualClock, NativeAddress, SwitchableChainId, TransferInstruction};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const CHAIN_ID: u64 = 728126428;
pub const CONTRACT: &str = "41000000000022d473030f116ddee9f6b43ac78ba3";
pub const START: u64 = 1_700_000_000;

pub fn addr(byte: u8) -> NativeAddress {
	NativeAddress::from_account_bytes([byte; 20])
}

pub fn token() -> NativeAddress {
	addr(0x11)
}

pub fn config() -> Config {
	format!(
		r#"
[domain]
chain_id = {CHAIN_ID}
verifying_contract = "{CONTRACT}"
"#
	)
	.parse()
	.expect("test config parses")
}

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

/// Engine over an in-memory token ledger with a manual clock.
pub struct Harness {
	pub engine: TransferAuthorizationEngine,
	pub ledger: Arc<MemoryTokenLedger>,
	pub clock: ManualClock,
	pub chain: SwitchableChainId,
	/// Domain the test signers sign under; shares the engine's chain id.
	pub domain: TypedDataDomain,
	pub owner: PermitSigner,
}

impl Harness {
	pub async fn new() -> Self {
		Self::build(config(), None, None).await
	}

	pub async fn with_wallets(wallets: Arc<dyn WalletRegistry>) -> Self {
		Self::build(config(), Some(wallets), None).await
	}

	pub async fn with_transfer(transfer: Arc<dyn TokenTransfer>) -> Self {
		Self::build(config(), None, Some(transfer)).await
	}

	pub async fn build(
		config: Config,
		wallets: Option<Arc<dyn WalletRegistry>>,
		transfer: Option<Arc<dyn TokenTransfer>>,
	) -> Self {
		init_tracing();
		let ledger = Arc::new(MemoryTokenLedger::new());
		let clock = ManualClock::new(START);
		let chain = SwitchableChainId::new(CHAIN_ID);

		let mut builder = EngineBuilder::new(config)
			.with_token_transfer(transfer.unwrap_or_else(|| ledger.clone() as Arc<dyn TokenTransfer>))
			.with_clock(Arc::new(clock.clone()))
			.with_chain_id_source(Arc::new(chain.clone()));
		if let Some(wallets) = wallets {
			builder = builder.with_wallet_registry(wallets);
		}
		let engine = builder.build().await.expect("engine builds");

		let domain = TypedDataDomain::new(
			"Permit2",
			CONTRACT.parse().expect("contract parses"),
			Arc::new(chain.clone()),
		);
		let owner = PermitSigner::from_private_key(ANVIL_KEY).expect("key parses");

		Self {
			engine,
			ledger,
			clock,
			chain,
			domain,
			owner,
		}
	}

	pub fn owner_address(&self) -> NativeAddress {
		self.owner.address()
	}

	pub async fn fund_owner(&self, token: NativeAddress, amount: u64) {
		self.ledger
			.mint(token, self.owner_address(), U256::from(amount))
			.await;
	}

	pub async fn balance(&self, token: NativeAddress, holder: NativeAddress) -> U256 {
		self.ledger.balance_of(&token, &holder).await
	}
}

/// Moves tokens one at a time through its own ledger and fails call `fail_at`.
pub struct FlakyTransfer {
	pub ledger: MemoryTokenLedger,
	fail_at: usize,
	calls: AtomicUsize,
}

impl FlakyTransfer {
	pub fn failing_at(fail_at: usize) -> Self {
		Self {
			ledger: MemoryTokenLedger::new(),
			fail_at,
			calls: AtomicUsize::new(0),
		}
	}
}

#[async_trait]
impl TokenTransfer for FlakyTransfer {
	async fn transfer(&self, instruction: &TransferInstruction) -> Result<(), TransferError> {
		if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_at {
			return Err(TransferError::Rejected("token paused".into()));
		}
		self.ledger.transfer(instruction).await
	}
}
