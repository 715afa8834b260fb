//! Chain-bound typed-data domain.
//!
//! The separator is computed once at construction together with the masked
//! chain identifier it was computed for. While the live chain identifier
//! masks to the same value the cached separator is returned; otherwise it is
//! recomputed on every access and the cache is left untouched.

use alloy_primitives::B256;
use permit_types::{
	utils::{compute_domain_hash, compute_final_digest, mask_chain_id},
	ChainIdSource, NativeAddress,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Typed-data domain of one verifying contract.
pub struct TypedDataDomain {
	name: String,
	verifying_contract: NativeAddress,
	chain: Arc<dyn ChainIdSource>,
	cached_chain_id: u32,
	cached_separator: B256,
	/// Number of separators computed after construction.
	recomputations: AtomicU64,
}

impl TypedDataDomain {
	pub fn new(
		name: impl Into<String>,
		verifying_contract: NativeAddress,
		chain: Arc<dyn ChainIdSource>,
	) -> Self {
		let name = name.into();
		let cached_chain_id = mask_chain_id(chain.chain_id());
		let cached_separator = compute_domain_hash(&name, cached_chain_id, &verifying_contract);
		Self {
			name,
			verifying_contract,
			chain,
			cached_chain_id,
			cached_separator,
			recomputations: AtomicU64::new(0),
		}
	}

	/// Separator for the current chain.
	pub fn domain_separator(&self) -> B256 {
		let masked = mask_chain_id(self.chain.chain_id());
		if masked == self.cached_chain_id {
			return self.cached_separator;
		}

		self.recomputations.fetch_add(1, Ordering::Relaxed);
		compute_domain_hash(&self.name, masked, &self.verifying_contract)
	}

	/// Final signing hash of a struct hash under this domain.
	pub fn hash_typed_data(&self, struct_hash: B256) -> B256 {
		compute_final_digest(&self.domain_separator(), &struct_hash)
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn verifying_contract(&self) -> NativeAddress {
		self.verifying_contract
	}

	/// Masked chain identifier the cached separator belongs to.
	pub fn cached_chain_id(&self) -> u32 {
		self.cached_chain_id
	}

	pub fn recomputations(&self) -> u64 {
		self.recomputations.load(Ordering::Relaxed)
	}
}

impl std::fmt::Debug for TypedDataDomain {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TypedDataDomain")
			.field("name", &self.name)
			.field("verifying_contract", &self.verifying_contract)
			.field("cached_chain_id", &self.cached_chain_id)
			.field("cached_separator", &self.cached_separator)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::b256;
	use permit_types::SwitchableChainId;

	fn contract() -> NativeAddress {
		"41000000000022d473030f116ddee9f6b43ac78ba3".parse().unwrap()
	}

	#[test]
	fn test_known_separators() {
		let chain = SwitchableChainId::new(1);
		let domain = TypedDataDomain::new("Permit2", contract(), Arc::new(chain.clone()));
		assert_eq!(
			domain.domain_separator(),
			b256!("866a5aba21966af95d6c7ab78eb2b2fc913915c28be3b9aa07cc04ff903e3f28")
		);

		let chain = SwitchableChainId::new(728126428);
		let domain = TypedDataDomain::new("Permit2", contract(), Arc::new(chain));
		assert_eq!(
			domain.domain_separator(),
			b256!("1e8167f47c848c207953a803aa84d1f94d985057b74bd05eb849d42457a0525d")
		);
	}

	#[test]
	fn test_cache_hit_does_not_recompute() {
		let chain = SwitchableChainId::new(728126428);
		let domain = TypedDataDomain::new("Permit2", contract(), Arc::new(chain));

		let first = domain.domain_separator();
		let second = domain.domain_separator();
		assert_eq!(first, second);
		assert_eq!(domain.recomputations(), 0);
	}

	#[test]
	fn test_chain_switch_recomputes_on_every_access() {
		let chain = SwitchableChainId::new(728126428);
		let domain = TypedDataDomain::new("Permit2", contract(), Arc::new(chain.clone()));
		let original = domain.domain_separator();

		chain.set(1);
		let forked = domain.domain_separator();
		assert_ne!(forked, original);
		assert_eq!(domain.recomputations(), 1);
		domain.domain_separator();
		assert_eq!(domain.recomputations(), 2);
		assert_eq!(domain.cached_chain_id(), 728126428);

		chain.set(728126428);
		assert_eq!(domain.domain_separator(), original);
		assert_eq!(domain.recomputations(), 2);
	}

	#[test]
	fn test_identical_low_bits_share_the_cache() {
		let chain = SwitchableChainId::new(5);
		let domain = TypedDataDomain::new("Permit2", contract(), Arc::new(chain.clone()));
		let original = domain.domain_separator();

		chain.set((1u64 << 32) | 5);
		assert_eq!(domain.domain_separator(), original);
		assert_eq!(domain.recomputations(), 0);
	}

	#[test]
	fn test_typed_data_hash_prefix() {
		let chain = SwitchableChainId::new(728126428);
		let domain = TypedDataDomain::new("Permit2", contract(), Arc::new(chain));
		let struct_hash =
			b256!("240dd3bc0d026ef2f0c824ac093d87a758e7f0924a9c1826cf94ac1b51fd4473");
		assert_eq!(
			domain.hash_typed_data(struct_hash),
			b256!("ae5283e541d1b52720e830fcc32b412765e5cb9f5ae159b7c1ab11e085ccc061")
		);
	}
}
