mod common;

use alloy_primitives::{B256, U256};
use async_trait::async_trait;
use common::{addr, token, FlakyTransfer, Harness, START};
use permit_core::{TokenTransfer, TransferError};
use permit_signature::{
	to_compact, ContractWallet, MemoryWalletRegistry, PermitSigner, WalletError,
	EIP1271_MAGIC_VALUE,
};
use permit_types::{
	PermitBatchTransferFrom, PermitError, PermitEvent, PermitTransferFrom,
	SignatureTransferDetails, TokenPermissions, TransferInstruction, Witness,
};
use std::sync::Arc;
use tokio::sync::Notify;

const WITNESS_TYPE: &str =
	"MockWitness witness)MockWitness(uint256 value)TokenPermissions(address token,uint256 amount)";

fn permit(amount: u64, nonce: u64, deadline: u64) -> PermitTransferFrom {
	PermitTransferFrom {
		permitted: TokenPermissions {
			token: token(),
			amount: U256::from(amount),
		},
		nonce: U256::from(nonce),
		deadline: U256::from(deadline),
	}
}

fn to(byte: u8, amount: u64) -> SignatureTransferDetails {
	SignatureTransferDetails {
		to: addr(byte),
		requested_amount: U256::from(amount),
	}
}

#[tokio::test]
async fn test_end_to_end_transfer() {
	let h = Harness::new().await;
	h.fund_owner(token(), 1_000).await;
	let caller = addr(0xcc);
	let permit = permit(100, 7, START + 3600);
	let signature = h
		.owner
		.sign_permit_transfer_from(&h.domain, &permit, &caller)
		.unwrap();

	h.engine
		.permit_transfer_from(caller, &permit, &to(0xdd, 40), h.owner_address(), &signature)
		.await
		.unwrap();

	assert_eq!(h.balance(token(), h.owner_address()).await, U256::from(960u64));
	assert_eq!(h.balance(token(), addr(0xdd)).await, U256::from(40u64));
	assert!(h.engine.is_nonce_used(h.owner_address(), U256::from(7u64)).await);

	let replay = h
		.engine
		.permit_transfer_from(caller, &permit, &to(0xdd, 40), h.owner_address(), &signature)
		.await;
	assert_eq!(replay, Err(PermitError::InvalidNonce));
	assert_eq!(h.balance(token(), addr(0xdd)).await, U256::from(40u64));
}

#[tokio::test]
async fn test_unordered_nonces_in_any_order() {
	let h = Harness::new().await;
	h.fund_owner(token(), 100).await;
	let caller = addr(0xcc);

	for nonce in [5u64, 3] {
		let permit = permit(10, nonce, START + 60);
		let signature = h
			.owner
			.sign_permit_transfer_from(&h.domain, &permit, &caller)
			.unwrap();
		h.engine
			.permit_transfer_from(caller, &permit, &to(0xdd, 10), h.owner_address(), &signature)
			.await
			.unwrap();
	}

	let again = permit(10, 5, START + 60);
	let signature = h
		.owner
		.sign_permit_transfer_from(&h.domain, &again, &caller)
		.unwrap();
	assert_eq!(
		h.engine
			.permit_transfer_from(caller, &again, &to(0xdd, 10), h.owner_address(), &signature)
			.await,
		Err(PermitError::InvalidNonce)
	);
}

#[tokio::test]
async fn test_signature_bound_to_caller() {
	let h = Harness::new().await;
	h.fund_owner(token(), 100).await;
	let permit = permit(100, 1, START + 60);
	let signature = h
		.owner
		.sign_permit_transfer_from(&h.domain, &permit, &addr(0xaa))
		.unwrap();

	let result = h
		.engine
		.permit_transfer_from(addr(0xbb), &permit, &to(0xdd, 1), h.owner_address(), &signature)
		.await;
	assert_eq!(result, Err(PermitError::InvalidSigner));
	assert!(!h.engine.is_nonce_used(h.owner_address(), U256::from(1u64)).await);

	h.engine
		.permit_transfer_from(addr(0xaa), &permit, &to(0xdd, 1), h.owner_address(), &signature)
		.await
		.unwrap();
}

#[tokio::test]
async fn test_witness_tampering_fails_as_invalid_signer() {
	let h = Harness::new().await;
	h.fund_owner(token(), 100).await;
	let caller = addr(0xcc);
	let permit = permit(100, 2, START + 60);
	let witness = Witness {
		witness: B256::repeat_byte(0x42),
		witness_type_string: WITNESS_TYPE.to_string(),
	};
	let signature = h
		.owner
		.sign_permit_witness_transfer_from(&h.domain, &permit, &witness, &caller)
		.unwrap();

	let mut bad_value = witness.clone();
	bad_value.witness.0[31] ^= 1;
	let mut bad_type = witness.clone();
	bad_type.witness_type_string = WITNESS_TYPE.replacen("value", "valuf", 1);

	for tampered in [&bad_value, &bad_type] {
		let result = h
			.engine
			.permit_witness_transfer_from(
				caller,
				&permit,
				&to(0xdd, 1),
				h.owner_address(),
				tampered,
				&signature,
			)
			.await;
		assert_eq!(result, Err(PermitError::InvalidSigner));
	}

	// Dropping the witness entirely is no better.
	assert_eq!(
		h.engine
			.permit_transfer_from(caller, &permit, &to(0xdd, 1), h.owner_address(), &signature)
			.await,
		Err(PermitError::InvalidSigner)
	);

	h.engine
		.permit_witness_transfer_from(
			caller,
			&permit,
			&to(0xdd, 1),
			h.owner_address(),
			&witness,
			&signature,
		)
		.await
		.unwrap();
}

#[tokio::test]
async fn test_requested_amount_bound() {
	let h = Harness::new().await;
	h.fund_owner(token(), 1_000).await;
	let caller = addr(0xcc);

	let over = permit(100, 10, START + 60);
	let signature = h
		.owner
		.sign_permit_transfer_from(&h.domain, &over, &caller)
		.unwrap();
	assert_eq!(
		h.engine
			.permit_transfer_from(caller, &over, &to(0xdd, 101), h.owner_address(), &signature)
			.await,
		Err(PermitError::InvalidAmount(U256::from(100u64)))
	);
	assert!(!h.engine.is_nonce_used(h.owner_address(), U256::from(10u64)).await);

	h.engine
		.permit_transfer_from(caller, &over, &to(0xdd, 100), h.owner_address(), &signature)
		.await
		.unwrap();
	assert_eq!(h.balance(token(), addr(0xdd)).await, U256::from(100u64));
}

#[tokio::test]
async fn test_deadline_is_inclusive() {
	let h = Harness::new().await;
	h.fund_owner(token(), 100).await;
	let caller = addr(0xcc);
	let deadline = START + 100;

	let on_time = permit(10, 1, deadline);
	let late = permit(10, 2, deadline);
	let on_time_sig = h
		.owner
		.sign_permit_transfer_from(&h.domain, &on_time, &caller)
		.unwrap();
	let late_sig = h
		.owner
		.sign_permit_transfer_from(&h.domain, &late, &caller)
		.unwrap();

	h.clock.set(deadline);
	h.engine
		.permit_transfer_from(caller, &on_time, &to(0xdd, 10), h.owner_address(), &on_time_sig)
		.await
		.unwrap();

	h.clock.set(deadline + 1);
	assert_eq!(
		h.engine
			.permit_transfer_from(caller, &late, &to(0xdd, 10), h.owner_address(), &late_sig)
			.await,
		Err(PermitError::SignatureExpired(U256::from(deadline)))
	);
}

#[tokio::test]
async fn test_expired_wins_over_bad_signature() {
	let h = Harness::new().await;
	let permit = permit(10, 1, START - 1);
	let result = h
		.engine
		.permit_transfer_from(addr(0xcc), &permit, &to(0xdd, 1), h.owner_address(), &[0u8; 3])
		.await;
	assert_eq!(result, Err(PermitError::SignatureExpired(U256::from(START - 1))));
}

#[tokio::test]
async fn test_compact_signature_accepted() {
	let h = Harness::new().await;
	h.fund_owner(token(), 100).await;
	let caller = addr(0xcc);
	let permit = permit(10, 1, START + 60);
	let signature = h
		.owner
		.sign_permit_transfer_from(&h.domain, &permit, &caller)
		.unwrap();

	h.engine
		.permit_transfer_from(
			caller,
			&permit,
			&to(0xdd, 10),
			h.owner_address(),
			&to_compact(&signature),
		)
		.await
		.unwrap();
}

#[tokio::test]
async fn test_signature_length_checked() {
	let h = Harness::new().await;
	let permit = permit(10, 1, START + 60);
	let result = h
		.engine
		.permit_transfer_from(addr(0xcc), &permit, &to(0xdd, 1), h.owner_address(), &[1u8; 66])
		.await;
	assert_eq!(result, Err(PermitError::InvalidSignatureLength(66)));
}

#[tokio::test]
async fn test_chain_switch_invalidates_signatures() {
	let h = Harness::new().await;
	h.fund_owner(token(), 100).await;
	let caller = addr(0xcc);
	let permit = permit(10, 1, START + 60);
	let signature = h
		.owner
		.sign_permit_transfer_from(&h.domain, &permit, &caller)
		.unwrap();
	let original = h.engine.domain_separator();

	h.chain.set(1);
	assert_ne!(h.engine.domain_separator(), original);

	let result = h
		.engine
		.permit_transfer_from(caller, &permit, &to(0xdd, 10), h.owner_address(), &signature)
		.await;
	assert_eq!(result, Err(PermitError::InvalidSigner));

	// The test domain reads the same chain source, so this signs for chain 1.
	let resigned = h
		.owner
		.sign_permit_transfer_from(&h.domain, &permit, &caller)
		.unwrap();
	h.engine
		.permit_transfer_from(caller, &permit, &to(0xdd, 10), h.owner_address(), &resigned)
		.await
		.unwrap();
}

fn batch(amounts: &[u64], nonce: u64) -> PermitBatchTransferFrom {
	PermitBatchTransferFrom {
		permitted: amounts
			.iter()
			.enumerate()
			.map(|(i, amount)| TokenPermissions {
				token: addr(0x20 + i as u8),
				amount: U256::from(*amount),
			})
			.collect(),
		nonce: U256::from(nonce),
		deadline: U256::from(START + 60),
	}
}

#[tokio::test]
async fn test_batch_transfer_skips_zero_amounts() {
	let h = Harness::new().await;
	for i in 0..3u8 {
		h.fund_owner(addr(0x20 + i), 100).await;
	}
	let caller = addr(0xcc);
	let permit = batch(&[10, 20, 30], 9);
	let signature = h
		.owner
		.sign_permit_batch_transfer_from(&h.domain, &permit, &caller)
		.unwrap();

	h.engine
		.permit_transfer_from_batch(
			caller,
			&permit,
			&[to(0xd0, 10), to(0xd1, 0), to(0xd2, 5)],
			h.owner_address(),
			&signature,
		)
		.await
		.unwrap();

	assert_eq!(h.balance(addr(0x20), addr(0xd0)).await, U256::from(10u64));
	assert_eq!(h.balance(addr(0x21), h.owner_address()).await, U256::from(100u64));
	assert_eq!(h.balance(addr(0x22), addr(0xd2)).await, U256::from(5u64));
	assert!(h.engine.is_nonce_used(h.owner_address(), U256::from(9u64)).await);
}

#[tokio::test]
async fn test_batch_length_mismatch_before_signature() {
	let h = Harness::new().await;
	let permit = batch(&[10, 20], 1);
	let result = h
		.engine
		.permit_transfer_from_batch(addr(0xcc), &permit, &[to(0xd0, 1)], h.owner_address(), &[])
		.await;
	assert_eq!(result, Err(PermitError::LengthMismatch));
}

#[tokio::test]
async fn test_batch_amounts_all_or_nothing() {
	let h = Harness::new().await;
	for i in 0..2u8 {
		h.fund_owner(addr(0x20 + i), 100).await;
	}
	let caller = addr(0xcc);
	let permit = batch(&[10, 20], 4);
	let signature = h
		.owner
		.sign_permit_batch_transfer_from(&h.domain, &permit, &caller)
		.unwrap();

	let result = h
		.engine
		.permit_transfer_from_batch(
			caller,
			&permit,
			&[to(0xd0, 10), to(0xd1, 21)],
			h.owner_address(),
			&signature,
		)
		.await;
	assert_eq!(result, Err(PermitError::InvalidAmount(U256::from(20u64))));
	assert_eq!(h.balance(addr(0x20), addr(0xd0)).await, U256::ZERO);
	assert!(!h.engine.is_nonce_used(h.owner_address(), U256::from(4u64)).await);
}

#[tokio::test]
async fn test_failed_transfer_releases_nonce() {
	let h = Harness::new().await;
	h.fund_owner(addr(0x20), 100).await;
	let caller = addr(0xcc);
	let permit = batch(&[10, 20], 6);
	let signature = h
		.owner
		.sign_permit_batch_transfer_from(&h.domain, &permit, &caller)
		.unwrap();
	let details = [to(0xd0, 10), to(0xd1, 20)];

	// Second token is unfunded.
	let result = h
		.engine
		.permit_transfer_from_batch(caller, &permit, &details, h.owner_address(), &signature)
		.await;
	assert!(matches!(result, Err(PermitError::TransferFailed(_))));
	assert!(!h.engine.is_nonce_used(h.owner_address(), U256::from(6u64)).await);
	assert_eq!(h.balance(addr(0x20), h.owner_address()).await, U256::from(100u64));

	h.fund_owner(addr(0x21), 100).await;
	h.engine
		.permit_transfer_from_batch(caller, &permit, &details, h.owner_address(), &signature)
		.await
		.unwrap();
}

#[tokio::test]
async fn test_batch_witness_transfer() {
	let h = Harness::new().await;
	h.fund_owner(addr(0x20), 100).await;
	let caller = addr(0xcc);
	let permit = batch(&[50], 11);
	let witness = Witness {
		witness: B256::repeat_byte(7),
		witness_type_string: WITNESS_TYPE.to_string(),
	};
	let signature = h
		.owner
		.sign_permit_batch_witness_transfer_from(&h.domain, &permit, &witness, &caller)
		.unwrap();

	let mut tampered = witness.clone();
	tampered.witness = B256::repeat_byte(8);
	assert_eq!(
		h.engine
			.permit_witness_transfer_from_batch(
				caller,
				&permit,
				&[to(0xd0, 50)],
				h.owner_address(),
				&tampered,
				&signature,
			)
			.await,
		Err(PermitError::InvalidSigner)
	);

	h.engine
		.permit_witness_transfer_from_batch(
			caller,
			&permit,
			&[to(0xd0, 50)],
			h.owner_address(),
			&witness,
			&signature,
		)
		.await
		.unwrap();
	assert_eq!(h.balance(addr(0x20), addr(0xd0)).await, U256::from(50u64));
}

#[tokio::test]
async fn test_invalidate_unordered_nonces() {
	let h = Harness::new().await;
	h.fund_owner(token(), 100).await;
	let mut events = h.engine.subscribe();
	let caller = addr(0xcc);

	// Nonce 258 is bit 2 of word 1.
	h.engine
		.invalidate_unordered_nonces(h.owner_address(), U256::from(1u8), U256::from(0b100u8))
		.await
		.unwrap();
	assert_eq!(
		events.recv().await.unwrap(),
		PermitEvent::UnorderedNonceInvalidation {
			owner: h.owner_address(),
			word: U256::from(1u8),
			mask: U256::from(0b100u8),
		}
	);

	let permit = permit(10, 258, START + 60);
	let signature = h
		.owner
		.sign_permit_transfer_from(&h.domain, &permit, &caller)
		.unwrap();
	assert_eq!(
		h.engine
			.permit_transfer_from(caller, &permit, &to(0xdd, 1), h.owner_address(), &signature)
			.await,
		Err(PermitError::InvalidNonce)
	);
	assert_eq!(
		h.engine.nonce_bitmap(h.owner_address(), U256::from(1u8)).await,
		U256::from(0b100u8)
	);
}

#[tokio::test]
async fn test_concurrent_consumption_has_one_winner() {
	let h = Harness::new().await;
	h.fund_owner(token(), 1_000).await;
	let caller = addr(0xcc);
	let permit = permit(10, 42, START + 60);
	let signature = h
		.owner
		.sign_permit_transfer_from(&h.domain, &permit, &caller)
		.unwrap();
	let owner = h.owner_address();

	let attempts = (0..16).map(|_| {
		let engine = h.engine.clone();
		let permit = permit.clone();
		tokio::spawn(async move {
			engine
				.permit_transfer_from(caller, &permit, &to(0xdd, 10), owner, &signature)
				.await
		})
	});
	let results = futures::future::join_all(attempts).await;

	let mut wins = 0;
	for result in results {
		match result.unwrap() {
			Ok(()) => wins += 1,
			Err(e) => assert_eq!(e, PermitError::InvalidNonce),
		}
	}
	assert_eq!(wins, 1);
	assert_eq!(h.balance(token(), addr(0xdd)).await, U256::from(10u64));
}

struct SingleKeyWallet {
	signer: PermitSigner,
}

#[async_trait]
impl ContractWallet for SingleKeyWallet {
	async fn is_valid_signature(&self, hash: B256, signature: &[u8]) -> Result<[u8; 4], WalletError> {
		match permit_signature::recover_signer(signature, hash) {
			Ok(recovered) if recovered == self.signer.address().canonical() => {
				Ok(EIP1271_MAGIC_VALUE)
			},
			_ => Ok([0u8; 4]),
		}
	}
}

#[tokio::test]
async fn test_contract_wallet_owner() {
	let wallets = Arc::new(MemoryWalletRegistry::new());
	let h = Harness::with_wallets(wallets.clone()).await;
	let wallet_address = addr(0x77);
	let key = PermitSigner::random();
	wallets.register(
		wallet_address,
		Arc::new(SingleKeyWallet {
			signer: key.clone(),
		}),
	);
	h.ledger
		.mint(token(), wallet_address, U256::from(100u64))
		.await;
	let caller = addr(0xcc);
	let permit = permit(100, 1, START + 60);

	let foreign = h
		.owner
		.sign_permit_transfer_from(&h.domain, &permit, &caller)
		.unwrap();
	assert_eq!(
		h.engine
			.permit_transfer_from(caller, &permit, &to(0xdd, 100), wallet_address, &foreign)
			.await,
		Err(PermitError::InvalidSigner)
	);

	let signature = key
		.sign_permit_transfer_from(&h.domain, &permit, &caller)
		.unwrap();
	h.engine
		.permit_transfer_from(caller, &permit, &to(0xdd, 100), wallet_address, &signature)
		.await
		.unwrap();
	assert_eq!(h.balance(token(), addr(0xdd)).await, U256::from(100u64));
}

#[tokio::test]
async fn test_partial_batch_keeps_nonce_consumed() {
	let transfer = Arc::new(FlakyTransfer::failing_at(1));
	let h = Harness::with_transfer(transfer.clone()).await;
	let owner = h.owner_address();
	for i in 0..2u8 {
		transfer.ledger.mint(addr(0x20 + i), owner, U256::from(1_000u64)).await;
	}
	let caller = addr(0xcc);
	let permit = batch(&[100, 100], 9);
	let signature = h
		.owner
		.sign_permit_batch_transfer_from(&h.domain, &permit, &caller)
		.unwrap();
	let details = [to(0xd0, 100), to(0xd0, 100)];

	let result = h
		.engine
		.permit_transfer_from_batch(caller, &permit, &details, owner, &signature)
		.await;
	assert!(matches!(result, Err(PermitError::TransferFailed(_))));
	assert_eq!(
		transfer.ledger.balance_of(&addr(0x20), &addr(0xd0)).await,
		U256::from(100u64)
	);
	assert!(h.engine.is_nonce_used(owner, U256::from(9u64)).await);

	let replay = h
		.engine
		.permit_transfer_from_batch(caller, &permit, &details, owner, &signature)
		.await;
	assert_eq!(replay, Err(PermitError::InvalidNonce));
	assert_eq!(
		transfer.ledger.balance_of(&addr(0x20), &addr(0xd0)).await,
		U256::from(100u64)
	);
}

#[tokio::test]
async fn test_batch_failing_before_any_movement_releases_nonce() {
	let transfer = Arc::new(FlakyTransfer::failing_at(0));
	let h = Harness::with_transfer(transfer.clone()).await;
	let owner = h.owner_address();
	let caller = addr(0xcc);
	let permit = batch(&[10, 10], 3);
	let signature = h
		.owner
		.sign_permit_batch_transfer_from(&h.domain, &permit, &caller)
		.unwrap();

	let result = h
		.engine
		.permit_transfer_from_batch(caller, &permit, &[to(0xd0, 10), to(0xd0, 10)], owner, &signature)
		.await;
	assert!(matches!(result, Err(PermitError::TransferFailed(_))));
	assert!(!h.engine.is_nonce_used(owner, U256::from(3u64)).await);
}

/// Signals entry, waits to be let go, then fails.
struct BlockingFail {
	entered: Notify,
	proceed: Notify,
}

#[async_trait]
impl TokenTransfer for BlockingFail {
	async fn transfer(&self, _: &TransferInstruction) -> Result<(), TransferError> {
		self.entered.notify_one();
		self.proceed.notified().await;
		Err(TransferError::Rejected("token paused".into()))
	}
}

#[tokio::test]
async fn test_failed_transfer_keeps_owner_invalidation() {
	let transfer = Arc::new(BlockingFail {
		entered: Notify::new(),
		proceed: Notify::new(),
	});
	let h = Harness::with_transfer(transfer.clone()).await;
	let owner = h.owner_address();
	let caller = addr(0xcc);
	let permit = permit(10, 7, START + 60);
	let signature = h
		.owner
		.sign_permit_transfer_from(&h.domain, &permit, &caller)
		.unwrap();

	let pending = {
		let engine = h.engine.clone();
		let permit = permit.clone();
		tokio::spawn(async move {
			engine
				.permit_transfer_from(caller, &permit, &to(0xdd, 10), owner, &signature)
				.await
		})
	};

	transfer.entered.notified().await;
	h.engine
		.invalidate_unordered_nonces(owner, U256::ZERO, U256::from(1u8) << 7)
		.await
		.unwrap();
	transfer.proceed.notify_one();

	let result = pending.await.unwrap();
	assert!(matches!(result, Err(PermitError::TransferFailed(_))));
	assert!(h.engine.is_nonce_used(owner, U256::from(7u64)).await);
	assert_eq!(
		h.engine
			.permit_transfer_from(caller, &permit, &to(0xdd, 10), owner, &signature)
			.await,
		Err(PermitError::InvalidNonce)
	);
}
