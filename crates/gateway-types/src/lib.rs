//! # Gateway Core Types
//!
//! Domain entities shared by every gateway subsystem:
//!
//! - **Chain**: [`Hash256`], [`Address`], [`EthTransaction`]
//! - **Relay messages**: [`Tx`], [`Block`], [`Broadcast`]
//! - **Accounts**: [`AccountId`], [`Account`], [`AccountTier`]
//! - **Networking**: [`NodeEndpoint`], [`NetworkNum`]

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod account;
pub mod block;
pub mod broadcast;
pub mod endpoint;
pub mod eth;
pub mod hash;
pub mod tx;

pub use account::{Account, AccountId, AccountTier, FeedEntitlement};
pub use block::{Block, BlockTransaction, BlockType};
pub use broadcast::Broadcast;
pub use endpoint::NodeEndpoint;
pub use eth::{Address, EthTransaction, EthTxError};
pub use hash::{keccak256, Hash256};
pub use tx::{Tx, TxFlags};

// Re-export U256 so dependents share a single arithmetic type.
pub use primitive_types::U256;

/// Identifier of a blockchain network inside the relay network.
pub type NetworkNum = u32;

/// Compact transaction identifier assigned by the transaction store.
pub type ShortId = u32;

/// Ethereum chain identifier.
pub type NetworkId = u64;
