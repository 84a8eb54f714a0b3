//! Relay-network transaction message and its routing flags.

use crate::account::AccountId;
use crate::hash::Hash256;
use crate::NetworkNum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bitmask of transaction routing/propagation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxFlags(pub u16);

impl TxFlags {
    pub const PAID_TX: TxFlags = TxFlags(1 << 0);
    pub const LOCAL_REGION: TxFlags = TxFlags(1 << 1);
    pub const DELIVER_TO_NODE: TxFlags = TxFlags(1 << 2);
    pub const VALIDATORS_ONLY: TxFlags = TxFlags(1 << 3);
    pub const NEXT_VALIDATOR: TxFlags = TxFlags(1 << 4);
    pub const FRONT_RUNNING_PROTECTION: TxFlags = TxFlags(1 << 5);

    #[must_use]
    pub fn contains(&self, other: TxFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: TxFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: TxFlags) {
        self.0 &= !other.0;
    }

    #[must_use]
    pub fn is_next_validator(&self) -> bool {
        self.contains(Self::NEXT_VALIDATOR)
    }

    #[must_use]
    pub fn is_validators_only(&self) -> bool {
        self.contains(Self::VALIDATORS_ONLY)
    }
}

impl std::ops::BitOr for TxFlags {
    type Output = TxFlags;

    fn bitor(self, rhs: TxFlags) -> TxFlags {
        TxFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for TxFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// A transaction as it travels through the gateway and the relay network.
///
/// `hash` is always the Keccak-256 of the canonical binary encoding; the
/// gateway re-encodes inbound transactions so this holds regardless of the
/// dialect the submitter used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tx {
    pub hash: Hash256,
    /// Wire (RLP) encoding of the transaction.
    pub content: Vec<u8>,
    pub network_num: NetworkNum,
    pub flags: TxFlags,
    pub account_id: AccountId,
    /// Primary / secondary validator wallet targets.
    pub wallets: [Option<String>; 2],
    /// Next-validator fallback interval in milliseconds. Zero means none.
    pub fallback_ms: u16,
}

impl Tx {
    pub fn new(
        hash: Hash256,
        content: Vec<u8>,
        network_num: NetworkNum,
        flags: TxFlags,
        account_id: AccountId,
    ) -> Self {
        Self {
            hash,
            content,
            network_num,
            flags,
            account_id,
            wallets: [None, None],
            fallback_ms: 0,
        }
    }

    #[must_use]
    pub fn hash(&self) -> Hash256 {
        self.hash
    }

    pub fn set_wallet(&mut self, slot: usize, wallet: impl Into<String>) {
        if slot < self.wallets.len() {
            self.wallets[slot] = Some(wallet.into());
        }
    }

    pub fn set_fallback(&mut self, fallback_ms: u16) {
        self.fallback_ms = fallback_ms;
    }

    pub fn remove_flags(&mut self, flags: TxFlags) {
        self.flags.remove(flags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::keccak256;

    #[test]
    fn test_flag_set_operations() {
        let mut flags = TxFlags::PAID_TX | TxFlags::LOCAL_REGION;
        assert!(flags.contains(TxFlags::PAID_TX));
        assert!(!flags.contains(TxFlags::NEXT_VALIDATOR));

        flags.insert(TxFlags::NEXT_VALIDATOR);
        assert!(flags.is_next_validator());

        flags.remove(TxFlags::NEXT_VALIDATOR);
        assert!(!flags.is_next_validator());
        assert!(flags.contains(TxFlags::PAID_TX | TxFlags::LOCAL_REGION));
    }

    #[test]
    fn test_wallet_slots() {
        let mut tx = Tx::new(
            keccak256(b"tx"),
            vec![1, 2, 3],
            5,
            TxFlags::PAID_TX,
            AccountId::from("acct"),
        );
        tx.set_wallet(0, "0xwallet-a");
        tx.set_wallet(1, "0xwallet-b");
        tx.set_wallet(2, "ignored");
        assert_eq!(tx.wallets[0].as_deref(), Some("0xwallet-a"));
        assert_eq!(tx.wallets[1].as_deref(), Some("0xwallet-b"));
    }
}
