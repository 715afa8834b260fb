//! Struct hashes of every permit variant.
//!
//! Nested structs are hashed first and their hashes embedded in the outer
//! struct; arrays contribute the hash of their concatenated element hashes.
//!
//! Signature-transfer permits carry no spender field of their own. The
//! address that invokes the transfer is written where the spender would sit,
//! so a signature only verifies for the caller the owner had in mind.
//! Allowance permits sign their spender explicitly.

use alloy_primitives::{keccak256, B256};
use once_cell::sync::Lazy;
use permit_types::{
	utils::{
		hash_array, Eip712AbiEncoder, PERMIT_BATCH_TRANSFER_FROM_TYPE, PERMIT_BATCH_TYPE,
		PERMIT_BATCH_WITNESS_TRANSFER_FROM_TYPE_STUB, PERMIT_DETAILS_TYPE, PERMIT_SINGLE_TYPE,
		PERMIT_TRANSFER_FROM_TYPE, PERMIT_WITNESS_TRANSFER_FROM_TYPE_STUB, TOKEN_PERMISSIONS_TYPE,
	},
	NativeAddress, PermitBatch, PermitBatchTransferFrom, PermitDetails, PermitSingle,
	PermitTransferFrom, TokenPermissions,
};

pub static TOKEN_PERMISSIONS_TYPEHASH: Lazy<B256> =
	Lazy::new(|| keccak256(TOKEN_PERMISSIONS_TYPE.as_bytes()));

pub static PERMIT_TRANSFER_FROM_TYPEHASH: Lazy<B256> = Lazy::new(|| {
	keccak256(format!("{}{}", PERMIT_TRANSFER_FROM_TYPE, TOKEN_PERMISSIONS_TYPE).as_bytes())
});

pub static PERMIT_BATCH_TRANSFER_FROM_TYPEHASH: Lazy<B256> = Lazy::new(|| {
	keccak256(format!("{}{}", PERMIT_BATCH_TRANSFER_FROM_TYPE, TOKEN_PERMISSIONS_TYPE).as_bytes())
});

pub static PERMIT_DETAILS_TYPEHASH: Lazy<B256> =
	Lazy::new(|| keccak256(PERMIT_DETAILS_TYPE.as_bytes()));

pub static PERMIT_SINGLE_TYPEHASH: Lazy<B256> = Lazy::new(|| {
	keccak256(format!("{}{}", PERMIT_SINGLE_TYPE, PERMIT_DETAILS_TYPE).as_bytes())
});

pub static PERMIT_BATCH_TYPEHASH: Lazy<B256> = Lazy::new(|| {
	keccak256(format!("{}{}", PERMIT_BATCH_TYPE, PERMIT_DETAILS_TYPE).as_bytes())
});

pub fn hash_token_permissions(permitted: &TokenPermissions) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&TOKEN_PERMISSIONS_TYPEHASH);
	enc.push_address(&permitted.token);
	enc.push_u256(permitted.amount);
	keccak256(enc.finish())
}

pub fn hash_permit_details(details: &PermitDetails) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&PERMIT_DETAILS_TYPEHASH);
	enc.push_address(&details.token);
	enc.push_u160(details.amount);
	enc.push_u48(details.expiration);
	enc.push_u48(details.nonce);
	keccak256(enc.finish())
}

/// Hash of a single-token transfer permit as invoked by `spender`.
pub fn hash_permit_transfer_from(permit: &PermitTransferFrom, spender: &NativeAddress) -> B256 {
	transfer_struct_hash(
		&PERMIT_TRANSFER_FROM_TYPEHASH,
		hash_token_permissions(&permit.permitted),
		spender,
		permit,
		None,
	)
}

/// Hash of a batch transfer permit as invoked by `spender`.
pub fn hash_permit_batch_transfer_from(
	permit: &PermitBatchTransferFrom,
	spender: &NativeAddress,
) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&PERMIT_BATCH_TRANSFER_FROM_TYPEHASH);
	enc.push_b256(&hash_permitted_list(&permit.permitted));
	enc.push_address(spender);
	enc.push_u256(permit.nonce);
	enc.push_u256(permit.deadline);
	keccak256(enc.finish())
}

/// Type hash of a witness transfer; the caller's type string completes the stub.
pub fn witness_typehash(witness_type_string: &str) -> B256 {
	keccak256(format!("{}{}", PERMIT_WITNESS_TRANSFER_FROM_TYPE_STUB, witness_type_string).as_bytes())
}

pub fn batch_witness_typehash(witness_type_string: &str) -> B256 {
	keccak256(
		format!(
			"{}{}",
			PERMIT_BATCH_WITNESS_TRANSFER_FROM_TYPE_STUB, witness_type_string
		)
		.as_bytes(),
	)
}

/// Hash of a single-token transfer permit carrying witness data.
///
/// Any change to `witness` or `witness_type_string` yields a different hash,
/// so a mismatched witness simply fails signature verification.
pub fn hash_permit_witness_transfer_from(
	permit: &PermitTransferFrom,
	witness: B256,
	witness_type_string: &str,
	spender: &NativeAddress,
) -> B256 {
	transfer_struct_hash(
		&witness_typehash(witness_type_string),
		hash_token_permissions(&permit.permitted),
		spender,
		permit,
		Some(witness),
	)
}

pub fn hash_permit_batch_witness_transfer_from(
	permit: &PermitBatchTransferFrom,
	witness: B256,
	witness_type_string: &str,
	spender: &NativeAddress,
) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&batch_witness_typehash(witness_type_string));
	enc.push_b256(&hash_permitted_list(&permit.permitted));
	enc.push_address(spender);
	enc.push_u256(permit.nonce);
	enc.push_u256(permit.deadline);
	enc.push_b256(&witness);
	keccak256(enc.finish())
}

pub fn hash_permit_single(permit: &PermitSingle) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&PERMIT_SINGLE_TYPEHASH);
	enc.push_b256(&hash_permit_details(&permit.details));
	enc.push_address(&permit.spender);
	enc.push_u256(permit.sig_deadline);
	keccak256(enc.finish())
}

pub fn hash_permit_batch(permit: &PermitBatch) -> B256 {
	let detail_hashes: Vec<B256> = permit.details.iter().map(hash_permit_details).collect();

	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&PERMIT_BATCH_TYPEHASH);
	enc.push_b256(&hash_array(&detail_hashes));
	enc.push_address(&permit.spender);
	enc.push_u256(permit.sig_deadline);
	keccak256(enc.finish())
}

fn hash_permitted_list(permitted: &[TokenPermissions]) -> B256 {
	let hashes: Vec<B256> = permitted.iter().map(hash_token_permissions).collect();
	hash_array(&hashes)
}

fn transfer_struct_hash(
	typehash: &B256,
	permitted_hash: B256,
	spender: &NativeAddress,
	permit: &PermitTransferFrom,
	witness: Option<B256>,
) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(typehash);
	enc.push_b256(&permitted_hash);
	enc.push_address(spender);
	enc.push_u256(permit.nonce);
	enc.push_u256(permit.deadline);
	if let Some(witness) = witness {
		enc.push_b256(&witness);
	}
	keccak256(enc.finish())
}
