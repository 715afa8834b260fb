//! Common types for the permit system.
//!
//! This crate defines the data model shared by every permit component:
//! native addresses, permit messages, allowance records, events, the error
//! taxonomy, and the clock/chain-identifier sources the core reads from.

/// Native addresses and their canonical 160-bit form.
pub mod address;
/// Allowance records.
pub mod allowance;
/// Clock and chain identifier sources.
pub mod environment;
/// Error kinds returned by permit operations.
pub mod errors;
/// Events published after state changes.
pub mod events;
/// Permit message types.
pub mod permit;
/// Typed-data encoding and formatting helpers.
pub mod utils;

pub use address::{AddressError, NativeAddress, NATIVE_ADDRESS_PREFIX};
pub use allowance::Allowance;
pub use environment::{ChainIdSource, Clock, ManualClock, SwitchableChainId, SystemClock};
pub use errors::PermitError;
pub use events::PermitEvent;
pub use permit::*;

/// Re-exported so downstream crates name the same integer widths.
pub use alloy_primitives::aliases::{U160, U48};
