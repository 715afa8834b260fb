//! Clock and chain identifier sources.
//!
//! Both are read on every operation that depends on them; implementations
//! must be cheap and must not block.

use crate::utils::current_timestamp;
use alloy_primitives::U256;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of the current time in seconds since the epoch.
pub trait Clock: Send + Sync {
	fn now(&self) -> u64;
}

/// Source of the current network identifier.
pub trait ChainIdSource: Send + Sync {
	fn chain_id(&self) -> U256;
}

/// Wall-clock time from the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> u64 {
		current_timestamp()
	}
}

/// A clock that only moves when told to.
///
/// Clones share the same time.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
	now: Arc<AtomicU64>,
}

impl ManualClock {
	pub fn new(now: u64) -> Self {
		Self {
			now: Arc::new(AtomicU64::new(now)),
		}
	}

	pub fn set(&self, now: u64) {
		self.now.store(now, Ordering::SeqCst);
	}

	pub fn advance(&self, seconds: u64) {
		self.now.fetch_add(seconds, Ordering::SeqCst);
	}
}

impl Clock for ManualClock {
	fn now(&self) -> u64 {
		self.now.load(Ordering::SeqCst)
	}
}

/// A chain identifier that can be switched at runtime, e.g. to simulate a fork.
///
/// Clones share the same identifier.
#[derive(Debug, Clone)]
pub struct SwitchableChainId {
	chain_id: Arc<AtomicU64>,
}

impl SwitchableChainId {
	pub fn new(chain_id: u64) -> Self {
		Self {
			chain_id: Arc::new(AtomicU64::new(chain_id)),
		}
	}

	pub fn set(&self, chain_id: u64) {
		self.chain_id.store(chain_id, Ordering::SeqCst);
	}
}

impl ChainIdSource for SwitchableChainId {
	fn chain_id(&self) -> U256 {
		U256::from(self.chain_id.load(Ordering::SeqCst))
	}
}
