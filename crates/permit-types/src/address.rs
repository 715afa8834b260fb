//! Native account addresses and their canonical 160-bit form.
//!
//! Accounts on the target platform are 21 bytes wide: a fixed prefix byte
//! followed by the 20-byte account value.
//!
//! ```text
//! 41 000000000022d473030f116ddee9f6b43ac78ba3
//! ^^------------------------------------------ Prefix: always 0x41
//!   ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^ Account value: 160 bits
//! ```
//!
//! Typed-data signers only ever see the 160-bit value, so anything that is
//! hashed must go through [`NativeAddress::canonical`] first.

use crate::utils::without_0x_prefix;
use alloy_primitives::{hex, Address};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Prefix byte carried by every native address.
pub const NATIVE_ADDRESS_PREFIX: u8 = 0x41;

/// Errors that can occur when parsing native addresses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
	#[error("Invalid hex format: {0}")]
	InvalidHex(String),
	#[error("Invalid address length: expected 20 or 21 bytes, got {0}")]
	InvalidLength(usize),
	#[error("Invalid address prefix: expected 0x41, got {0:#04x}")]
	InvalidPrefix(u8),
}

/// A platform-native address: prefix byte plus 160-bit account value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NativeAddress(Address);

impl NativeAddress {
	/// Width of the native encoding in bytes.
	pub const LENGTH: usize = 21;

	/// The all-zero account.
	pub const ZERO: Self = Self(Address::ZERO);

	/// Wraps a canonical 160-bit address.
	pub const fn from_canonical(address: Address) -> Self {
		Self(address)
	}

	/// Builds an address from its 20-byte account value.
	pub fn from_account_bytes(bytes: [u8; 20]) -> Self {
		Self(Address::from(bytes))
	}

	/// Returns the 160-bit value used whenever the address is hashed.
	pub const fn canonical(&self) -> Address {
		self.0
	}

	/// Returns the full 21-byte native encoding.
	pub fn to_bytes(&self) -> [u8; Self::LENGTH] {
		let mut bytes = [0u8; Self::LENGTH];
		bytes[0] = NATIVE_ADDRESS_PREFIX;
		bytes[1..].copy_from_slice(self.0.as_slice());
		bytes
	}

	/// Decodes either the 21-byte native form or a bare 20-byte account value.
	pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
		match bytes.len() {
			20 => Ok(Self(Address::from_slice(bytes))),
			21 => {
				if bytes[0] != NATIVE_ADDRESS_PREFIX {
					return Err(AddressError::InvalidPrefix(bytes[0]));
				}
				Ok(Self(Address::from_slice(&bytes[1..])))
			},
			len => Err(AddressError::InvalidLength(len)),
		}
	}

	pub fn is_zero(&self) -> bool {
		self.0 == Address::ZERO
	}

	/// Hex form of the native encoding, without `0x`.
	pub fn to_hex(&self) -> String {
		hex::encode(self.to_bytes())
	}
}

impl From<Address> for NativeAddress {
	fn from(address: Address) -> Self {
		Self::from_canonical(address)
	}
}

impl From<NativeAddress> for Address {
	fn from(address: NativeAddress) -> Self {
		address.canonical()
	}
}

impl FromStr for NativeAddress {
	type Err = AddressError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let bytes = hex::decode(without_0x_prefix(s.trim()))
			.map_err(|e| AddressError::InvalidHex(e.to_string()))?;
		Self::from_slice(&bytes)
	}
}

impl fmt::Display for NativeAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl Serialize for NativeAddress {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for NativeAddress {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		NativeAddress::from_str(&s).map_err(serde::de::Error::custom)
	}
}
