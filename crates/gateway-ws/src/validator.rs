//! Validator-targeted transaction routing with fallback.

use dashmap::DashMap;
use gateway_types::{Hash256, NetworkNum, Tx, TxFlags};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

/// Network number of BSC mainnet.
pub const BSC_MAINNET_NUM: NetworkNum = 10;
/// Network number of Polygon mainnet.
pub const POLYGON_MAINNET_NUM: NetworkNum = 36;
/// BSC block interval; fallbacks below it send immediately.
pub const BSC_BLOCK_INTERVAL: Duration = Duration::from_millis(3000);

/// Errors from next-validator routing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidatorError {
    #[error("currently next_validator is only supported on BSC and Polygon networks")]
    UnsupportedNetwork,

    #[error("can't send tx with next_validator because the gateway encountered an issue fetching the epoch block, please try again later")]
    NoValidatorInfo,
}

/// A transaction parked until its nearest validator becomes reachable or
/// its fallback timer fires.
#[derive(Debug, Clone)]
pub struct PendingNextValidatorTx {
    pub tx: Tx,
    pub fallback_ms: u16,
    pub requested_at: Instant,
}

/// Shared next-validator state: the height-ordered wallet schedule, wallet
/// accessibility, and the pending-transaction table for BSC.
#[derive(Default)]
pub struct ValidatorRouting {
    /// Block height → validator wallet. Highest entry is the newest.
    next_validators: RwLock<BTreeMap<u64, String>>,
    /// Wallet → currently accessible.
    validator_status: DashMap<String, bool>,
    /// Pending BSC transactions keyed by hash. The mutex is held across
    /// every read-and-remove so a timer fire and a status update cannot
    /// both submit the same transaction.
    pending: Mutex<HashMap<Hash256, PendingNextValidatorTx>>,
}

impl ValidatorRouting {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the validator wallet for a block height.
    pub fn update_validator(&self, block_height: u64, wallet: impl Into<String>) {
        self.next_validators.write().insert(block_height, wallet.into());
    }

    /// Record whether a wallet is currently reachable.
    pub fn set_validator_status(&self, wallet: impl Into<String>, accessible: bool) {
        self.validator_status.insert(wallet.into(), accessible);
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Route a next-validator transaction. Returns `true` when the
    /// transaction was parked pending reevaluation (BSC with an
    /// inaccessible nearest validator and a fallback of at least one block
    /// interval); the caller arms the fallback timer.
    pub fn process_next_validator_tx(
        &self,
        tx: &mut Tx,
        fallback_ms: u16,
        network_num: NetworkNum,
    ) -> Result<bool, ValidatorError> {
        if network_num != BSC_MAINNET_NUM && network_num != POLYGON_MAINNET_NUM {
            return Err(ValidatorError::UnsupportedNetwork);
        }

        tx.set_fallback(fallback_ms);

        let validators = self.next_validators.read();
        let mut newest_first = validators.iter().rev();
        let Some((_, n2_wallet)) = newest_first.next() else {
            return Err(ValidatorError::NoValidatorInfo);
        };
        let n1_wallet = newest_first.next().map(|(_, wallet)| wallet.clone());
        let n2_wallet = n2_wallet.clone();
        drop(validators);

        if network_num == BSC_MAINNET_NUM {
            let n1_accessible = n1_wallet
                .as_ref()
                .and_then(|wallet| self.validator_status.get(wallet).map(|s| *s))
                .unwrap_or(false);

            if n1_accessible {
                tx.set_wallet(0, n1_wallet.clone().unwrap_or_default());
            } else {
                if fallback_ms != 0
                    && u128::from(fallback_ms) < BSC_BLOCK_INTERVAL.as_millis()
                {
                    // Short fallback: send as a normal tx right away.
                    return Ok(false);
                }
                self.pending.lock().insert(
                    tx.hash,
                    PendingNextValidatorTx {
                        tx: tx.clone(),
                        fallback_ms,
                        requested_at: Instant::now(),
                    },
                );
                return Ok(true);
            }
        }

        if network_num == POLYGON_MAINNET_NUM {
            match n1_wallet {
                Some(n1) => {
                    tx.set_wallet(0, n1);
                    tx.set_wallet(1, n2_wallet);
                }
                None => tx.set_wallet(0, n2_wallet),
            }
        }

        Ok(false)
    }

    /// Fallback timer body: atomically remove the pending entry and submit
    /// it as a normal transaction. Returns whether the entry still existed.
    pub fn fire_fallback<F>(&self, hash: &Hash256, submit: F) -> bool
    where
        F: FnOnce(Tx) -> Result<(), String>,
    {
        let mut pending = self.pending.lock();
        let Some(entry) = pending.remove(hash) else {
            return false;
        };
        info!(hash = %hash, "Sending next validator tx because fallback time was reached");

        let mut tx = entry.tx;
        tx.remove_flags(TxFlags::NEXT_VALIDATOR);
        tx.set_fallback(0);
        if let Err(e) = submit(tx) {
            tracing::error!(hash = %hash, error = %e, "Failed to send pending next validator tx at fallback time");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_types::{keccak256, AccountId};

    fn next_validator_tx(tag: &[u8]) -> Tx {
        Tx::new(
            keccak256(tag),
            tag.to_vec(),
            BSC_MAINNET_NUM,
            TxFlags::PAID_TX | TxFlags::NEXT_VALIDATOR,
            AccountId::from("acct"),
        )
    }

    #[test]
    fn test_unsupported_network() {
        let routing = ValidatorRouting::new();
        let mut tx = next_validator_tx(b"t");
        let err = routing
            .process_next_validator_tx(&mut tx, 0, 5)
            .unwrap_err();
        assert_eq!(err, ValidatorError::UnsupportedNetwork);
    }

    #[test]
    fn test_empty_schedule() {
        let routing = ValidatorRouting::new();
        let mut tx = next_validator_tx(b"t");
        let err = routing
            .process_next_validator_tx(&mut tx, 0, BSC_MAINNET_NUM)
            .unwrap_err();
        assert_eq!(err, ValidatorError::NoValidatorInfo);
    }

    #[test]
    fn test_bsc_accessible_first_validator() {
        let routing = ValidatorRouting::new();
        routing.update_validator(100, "0xwallet-n1");
        routing.update_validator(101, "0xwallet-n2");
        routing.set_validator_status("0xwallet-n1", true);

        let mut tx = next_validator_tx(b"t");
        let pending = routing
            .process_next_validator_tx(&mut tx, 500, BSC_MAINNET_NUM)
            .unwrap();
        assert!(!pending);
        assert_eq!(tx.wallets[0].as_deref(), Some("0xwallet-n1"));
        assert_eq!(tx.fallback_ms, 500);
    }

    #[test]
    fn test_bsc_short_fallback_sends_immediately() {
        let routing = ValidatorRouting::new();
        routing.update_validator(100, "0xwallet-n1");
        routing.update_validator(101, "0xwallet-n2");
        routing.set_validator_status("0xwallet-n1", false);

        let mut tx = next_validator_tx(b"t");
        let pending = routing
            .process_next_validator_tx(&mut tx, 1000, BSC_MAINNET_NUM)
            .unwrap();
        assert!(!pending);
        assert_eq!(routing.pending_count(), 0);
    }

    #[test]
    fn test_bsc_long_fallback_parks_tx() {
        let routing = ValidatorRouting::new();
        routing.update_validator(100, "0xwallet-n1");
        routing.update_validator(101, "0xwallet-n2");

        let mut tx = next_validator_tx(b"parked");
        let pending = routing
            .process_next_validator_tx(&mut tx, 5000, BSC_MAINNET_NUM)
            .unwrap();
        assert!(pending);
        assert_eq!(routing.pending_count(), 1);

        // Timer fire clears the flag and submits exactly once.
        let fired = routing.fire_fallback(&tx.hash, |sent| {
            assert!(!sent.flags.is_next_validator());
            assert_eq!(sent.fallback_ms, 0);
            Ok(())
        });
        assert!(fired);
        assert!(!routing.fire_fallback(&tx.hash, |_| Ok(())));
    }

    #[test]
    fn test_polygon_sets_both_wallets() {
        let routing = ValidatorRouting::new();
        routing.update_validator(200, "0xpolygon-n1");
        routing.update_validator(201, "0xpolygon-n2");

        let mut tx = next_validator_tx(b"p");
        let pending = routing
            .process_next_validator_tx(&mut tx, 0, POLYGON_MAINNET_NUM)
            .unwrap();
        assert!(!pending);
        assert_eq!(tx.wallets[0].as_deref(), Some("0xpolygon-n1"));
        assert_eq!(tx.wallets[1].as_deref(), Some("0xpolygon-n2"));
    }

    #[test]
    fn test_polygon_single_entry_uses_newest() {
        let routing = ValidatorRouting::new();
        routing.update_validator(300, "0xonly");

        let mut tx = next_validator_tx(b"p");
        routing
            .process_next_validator_tx(&mut tx, 0, POLYGON_MAINNET_NUM)
            .unwrap();
        assert_eq!(tx.wallets[0].as_deref(), Some("0xonly"));
        assert!(tx.wallets[1].is_none());
    }

    #[test]
    fn test_bsc_zero_fallback_parks() {
        let routing = ValidatorRouting::new();
        routing.update_validator(100, "0xn1");
        routing.update_validator(101, "0xn2");

        let mut tx = next_validator_tx(b"z");
        let pending = routing
            .process_next_validator_tx(&mut tx, 0, BSC_MAINNET_NUM)
            .unwrap();
        assert!(pending);
    }
}
