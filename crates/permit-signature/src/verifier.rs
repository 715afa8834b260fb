//! Signature checking against a claimed owner.

use crate::wallet::{ContractWallet, NoContractWallets, WalletRegistry, EIP1271_MAGIC_VALUE};
use crate::SignatureError;
use alloy_primitives::{Address, Signature as EcdsaSignature, B256, U256};
use permit_types::NativeAddress;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// How an owner proves authorization.
#[derive(Clone)]
pub enum SignerKind {
	/// A key pair; the signature must recover to the owner.
	RawKey,
	/// A contract that validates the signature itself.
	ContractWallet(Arc<dyn ContractWallet>),
}

impl std::fmt::Debug for SignerKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SignerKind::RawKey => f.write_str("RawKey"),
			SignerKind::ContractWallet(_) => f.write_str("ContractWallet"),
		}
	}
}

/// Recovers the signer of `hash` from a 65-byte `r||s||v` or 64-byte
/// compact `r||vs` signature.
pub fn recover_signer(signature: &[u8], hash: B256) -> Result<Address, SignatureError> {
	let (r, s, odd_y) = split_signature(signature)?;
	let recovered = EcdsaSignature::new(r, s, odd_y)
		.recover_address_from_prehash(&hash)
		.map_err(|e| {
			debug!(error = %e, "ecdsa recovery failed");
			SignatureError::InvalidSignature
		})?;

	if recovered == Address::ZERO {
		return Err(SignatureError::InvalidSignature);
	}
	Ok(recovered)
}

fn split_signature(signature: &[u8]) -> Result<(U256, U256, bool), SignatureError> {
	match signature.len() {
		65 => {
			let r = U256::from_be_slice(&signature[..32]);
			let s = U256::from_be_slice(&signature[32..64]);
			let odd_y = match signature[64] {
				27 => false,
				28 => true,
				_ => return Err(SignatureError::InvalidSignature),
			};
			Ok((r, s, odd_y))
		},
		64 => {
			let r = U256::from_be_slice(&signature[..32]);
			let vs = U256::from_be_slice(&signature[32..]);
			let s = vs & !(U256::from(1u8) << 255usize);
			let odd_y = vs.bit(255);
			Ok((r, s, odd_y))
		},
		len => Err(SignatureError::InvalidSignatureLength(len)),
	}
}

/// Verifies that an owner authorized a typed-data hash.
#[derive(Clone)]
pub struct SignatureVerifier {
	wallets: Arc<dyn WalletRegistry>,
}

impl SignatureVerifier {
	pub fn new(wallets: Arc<dyn WalletRegistry>) -> Self {
		Self { wallets }
	}

	/// A verifier that treats every owner as a raw key.
	pub fn raw_keys_only() -> Self {
		Self::new(Arc::new(NoContractWallets))
	}

	pub fn signer_kind(&self, owner: &NativeAddress) -> SignerKind {
		match self.wallets.wallet(owner) {
			Some(wallet) => SignerKind::ContractWallet(wallet),
			None => SignerKind::RawKey,
		}
	}

	/// Checks `signature` over `hash` for `owner`.
	///
	/// Raw-key owners must be the recovered address. Contract-wallet owners
	/// must answer with the magic value; a failed call counts as a rejection.
	#[instrument(skip_all, fields(owner = %owner))]
	pub async fn verify(
		&self,
		signature: &[u8],
		hash: B256,
		owner: &NativeAddress,
	) -> Result<(), SignatureError> {
		match self.signer_kind(owner) {
			SignerKind::RawKey => {
				let recovered = recover_signer(signature, hash)?;
				if recovered != owner.canonical() {
					debug!(recovered = %NativeAddress::from(recovered), "signer mismatch");
					return Err(SignatureError::InvalidSigner);
				}
				Ok(())
			},
			SignerKind::ContractWallet(wallet) => {
				match wallet.is_valid_signature(hash, signature).await {
					Ok(value) if value == EIP1271_MAGIC_VALUE => Ok(()),
					Ok(value) => {
						debug!(returned = ?value, "contract wallet rejected signature");
						Err(SignatureError::InvalidSigner)
					},
					Err(e) => {
						warn!(error = %e, "contract wallet validation failed");
						Err(SignatureError::InvalidSigner)
					},
				}
			},
		}
	}
}

impl std::fmt::Debug for SignatureVerifier {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SignatureVerifier").finish_non_exhaustive()
	}
}
