//! Utility functions for typed-data encoding and formatting.

pub mod eip712;
pub mod formatting;
pub mod helpers;

pub use eip712::{
	compute_domain_hash, compute_final_digest, hash_array, mask_chain_id, Eip712AbiEncoder,
	CHAIN_ID_MASK, DOMAIN_TYPE, NAME_PERMIT2, PERMIT_BATCH_TRANSFER_FROM_TYPE, PERMIT_BATCH_TYPE,
	PERMIT_BATCH_WITNESS_TRANSFER_FROM_TYPE_STUB, PERMIT_DETAILS_TYPE, PERMIT_SINGLE_TYPE,
	PERMIT_TRANSFER_FROM_TYPE, PERMIT_WITNESS_TRANSFER_FROM_TYPE_STUB, TOKEN_PERMISSIONS_TYPE,
};
pub use formatting::{truncate_id, without_0x_prefix};
pub use helpers::current_timestamp;
