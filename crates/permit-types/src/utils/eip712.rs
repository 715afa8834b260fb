//! Typed-data encoding shared by every permit hash.
//!
//! These helpers provide:
//! - The type strings of every permit struct
//! - Domain hash computation over a masked chain identifier
//! - Final digest computation (0x1901 || domainHash || structHash)
//! - A minimal ABI encoder for the static field types permits use
//!
//! Addresses are always written as their canonical 160-bit value, never as
//! the native 21-byte form.

use crate::NativeAddress;
use alloy_primitives::{
	aliases::{U160, U48},
	keccak256, B256, U256,
};

pub const DOMAIN_TYPE: &str = "EIP712Domain(string name,uint256 chainId,address verifyingContract)";
pub const NAME_PERMIT2: &str = "Permit2";

pub const TOKEN_PERMISSIONS_TYPE: &str = "TokenPermissions(address token,uint256 amount)";
pub const PERMIT_TRANSFER_FROM_TYPE: &str =
	"PermitTransferFrom(TokenPermissions permitted,address spender,uint256 nonce,uint256 deadline)";
pub const PERMIT_BATCH_TRANSFER_FROM_TYPE: &str =
	"PermitBatchTransferFrom(TokenPermissions[] permitted,address spender,uint256 nonce,uint256 deadline)";
pub const PERMIT_WITNESS_TRANSFER_FROM_TYPE_STUB: &str =
	"PermitWitnessTransferFrom(TokenPermissions permitted,address spender,uint256 nonce,uint256 deadline,";
pub const PERMIT_BATCH_WITNESS_TRANSFER_FROM_TYPE_STUB: &str =
	"PermitBatchWitnessTransferFrom(TokenPermissions[] permitted,address spender,uint256 nonce,uint256 deadline,";

pub const PERMIT_DETAILS_TYPE: &str =
	"PermitDetails(address token,uint160 amount,uint48 expiration,uint48 nonce)";
pub const PERMIT_SINGLE_TYPE: &str =
	"PermitSingle(PermitDetails details,address spender,uint256 sigDeadline)";
pub const PERMIT_BATCH_TYPE: &str =
	"PermitBatch(PermitDetails[] details,address spender,uint256 sigDeadline)";

/// Mask applied to the chain identifier before it enters the domain.
pub const CHAIN_ID_MASK: u64 = 0xFFFF_FFFF;

/// Low 32 bits of a chain identifier.
pub fn mask_chain_id(chain_id: U256) -> u32 {
	(chain_id.as_limbs()[0] & CHAIN_ID_MASK) as u32
}

/// Compute the domain hash
/// (keccak256(abi.encode(typeHash, nameHash, maskedChainId, uint160(verifyingContract)))).
pub fn compute_domain_hash(
	name: &str,
	masked_chain_id: u32,
	verifying_contract: &NativeAddress,
) -> B256 {
	let domain_type_hash = keccak256(DOMAIN_TYPE.as_bytes());
	let name_hash = keccak256(name.as_bytes());
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&domain_type_hash);
	enc.push_b256(&name_hash);
	enc.push_u256(U256::from(masked_chain_id));
	enc.push_address(verifying_contract);
	keccak256(enc.finish())
}

/// Compute the final digest: keccak256(0x1901 || domainHash || structHash).
pub fn compute_final_digest(domain_hash: &B256, struct_hash: &B256) -> B256 {
	let mut out = Vec::with_capacity(2 + 32 + 32);
	out.push(0x19);
	out.push(0x01);
	out.extend_from_slice(domain_hash.as_slice());
	out.extend_from_slice(struct_hash.as_slice());
	keccak256(out)
}

/// Hash of an array of struct hashes (keccak256 of their concatenation).
pub fn hash_array(hashes: &[B256]) -> B256 {
	let mut packed = Vec::with_capacity(hashes.len() * 32);
	for hash in hashes {
		packed.extend_from_slice(hash.as_slice());
	}
	keccak256(packed)
}

/// Minimal ABI encoder for static types used in typed-data struct hashing.
pub struct Eip712AbiEncoder {
	buf: Vec<u8>,
}

impl Default for Eip712AbiEncoder {
	fn default() -> Self {
		Self::new()
	}
}

impl Eip712AbiEncoder {
	pub fn new() -> Self {
		Self { buf: Vec::new() }
	}

	pub fn push_b256(&mut self, v: &B256) {
		self.buf.extend_from_slice(v.as_slice());
	}

	/// Writes the address as a left-padded 160-bit integer.
	pub fn push_address(&mut self, addr: &NativeAddress) {
		let mut word = [0u8; 32];
		word[12..].copy_from_slice(addr.canonical().as_slice());
		self.buf.extend_from_slice(&word);
	}

	pub fn push_u256(&mut self, v: U256) {
		let word: [u8; 32] = v.to_be_bytes::<32>();
		self.buf.extend_from_slice(&word);
	}

	pub fn push_u160(&mut self, v: U160) {
		self.push_u256(U256::from(v));
	}

	pub fn push_u48(&mut self, v: U48) {
		self.push_u256(U256::from(v));
	}

	pub fn finish(self) -> Vec<u8> {
		self.buf
	}
}
