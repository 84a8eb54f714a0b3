//! Feed kinds and their include-field catalogs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The streams a client may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedType {
    #[serde(rename = "newTxs")]
    NewTxs,
    #[serde(rename = "pendingTxs")]
    PendingTxs,
    #[serde(rename = "bdnBlocks")]
    BdnBlocks,
    #[serde(rename = "newBlocks")]
    NewBlocks,
    #[serde(rename = "onBlock")]
    OnBlock,
    #[serde(rename = "txReceipts")]
    TxReceipts,
    #[serde(rename = "newBeaconBlocks")]
    NewBeaconBlocks,
    #[serde(rename = "bdnBeaconBlocks")]
    BdnBeaconBlocks,
}

impl FeedType {
    pub const ALL: [FeedType; 8] = [
        FeedType::NewTxs,
        FeedType::PendingTxs,
        FeedType::BdnBlocks,
        FeedType::NewBlocks,
        FeedType::OnBlock,
        FeedType::TxReceipts,
        FeedType::NewBeaconBlocks,
        FeedType::BdnBeaconBlocks,
    ];

    #[must_use]
    pub fn is_tx_feed(&self) -> bool {
        matches!(self, FeedType::NewTxs | FeedType::PendingTxs)
    }

    #[must_use]
    pub fn is_block_feed(&self) -> bool {
        matches!(
            self,
            FeedType::BdnBlocks
                | FeedType::NewBlocks
                | FeedType::NewBeaconBlocks
                | FeedType::BdnBeaconBlocks
        )
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeedType::NewTxs => "newTxs",
            FeedType::PendingTxs => "pendingTxs",
            FeedType::BdnBlocks => "bdnBlocks",
            FeedType::NewBlocks => "newBlocks",
            FeedType::OnBlock => "onBlock",
            FeedType::TxReceipts => "txReceipts",
            FeedType::NewBeaconBlocks => "newBeaconBlocks",
            FeedType::BdnBeaconBlocks => "bdnBeaconBlocks",
        };
        f.write_str(name)
    }
}

/// The `tx_contents.*` fields shared by the transaction and block catalogs.
pub const TX_CONTENT_FIELDS: [&str; 16] = [
    "tx_contents.nonce",
    "tx_contents.tx_hash",
    "tx_contents.gas_price",
    "tx_contents.gas",
    "tx_contents.to",
    "tx_contents.value",
    "tx_contents.input",
    "tx_contents.v",
    "tx_contents.r",
    "tx_contents.s",
    "tx_contents.from",
    "tx_contents.type",
    "tx_contents.access_list",
    "tx_contents.chain_id",
    "tx_contents.max_priority_fee_per_gas",
    "tx_contents.max_fee_per_gas",
];

const TX_PARAMS: [&str; 21] = [
    "tx_contents.nonce",
    "tx_contents.tx_hash",
    "tx_contents.gas_price",
    "tx_contents.gas",
    "tx_contents.to",
    "tx_contents.value",
    "tx_contents.input",
    "tx_contents.v",
    "tx_contents.r",
    "tx_contents.s",
    "tx_contents.from",
    "tx_contents.type",
    "tx_contents.access_list",
    "tx_contents.chain_id",
    "tx_contents.max_priority_fee_per_gas",
    "tx_contents.max_fee_per_gas",
    "tx_contents",
    "tx_hash",
    "local_region",
    "time",
    "raw_tx",
];

const BLOCK_PARAMS: [&str; 21] = [
    "tx_contents.nonce",
    "tx_contents.tx_hash",
    "tx_contents.gas_price",
    "tx_contents.gas",
    "tx_contents.to",
    "tx_contents.value",
    "tx_contents.input",
    "tx_contents.v",
    "tx_contents.r",
    "tx_contents.s",
    "tx_contents.from",
    "tx_contents.type",
    "tx_contents.access_list",
    "tx_contents.chain_id",
    "tx_contents.max_priority_fee_per_gas",
    "tx_contents.max_fee_per_gas",
    "hash",
    "header",
    "transactions",
    "uncles",
    "future_validator_info",
];

const BEACON_BLOCK_PARAMS: [&str; 4] = ["hash", "header", "slot", "body"];

const ON_BLOCK_PARAMS: [&str; 4] = ["name", "response", "block_height", "tag"];

const TX_RECEIPT_PARAMS: [&str; 14] = [
    "block_hash",
    "block_number",
    "contract_address",
    "cumulative_gas_used",
    "effective_gas_price",
    "from",
    "gas_used",
    "logs",
    "logs_bloom",
    "status",
    "to",
    "transaction_hash",
    "transaction_index",
    "type",
];

const DEFAULT_TX_PARAMS: [&str; 19] = [
    "tx_contents.nonce",
    "tx_contents.tx_hash",
    "tx_contents.gas_price",
    "tx_contents.gas",
    "tx_contents.to",
    "tx_contents.value",
    "tx_contents.input",
    "tx_contents.v",
    "tx_contents.r",
    "tx_contents.s",
    "tx_contents.from",
    "tx_contents.type",
    "tx_contents.access_list",
    "tx_contents.chain_id",
    "tx_contents.max_priority_fee_per_gas",
    "tx_contents.max_fee_per_gas",
    "tx_hash",
    "local_region",
    "time",
];

/// All include fields a feed accepts.
#[must_use]
pub fn valid_params(feed: FeedType) -> &'static [&'static str] {
    match feed {
        FeedType::NewTxs | FeedType::PendingTxs => &TX_PARAMS,
        FeedType::BdnBlocks | FeedType::NewBlocks => &BLOCK_PARAMS,
        FeedType::NewBeaconBlocks | FeedType::BdnBeaconBlocks => &BEACON_BLOCK_PARAMS,
        FeedType::OnBlock => &ON_BLOCK_PARAMS,
        FeedType::TxReceipts => &TX_RECEIPT_PARAMS,
    }
}

/// The include set used when the client asked for none.
#[must_use]
pub fn default_params(feed: FeedType) -> &'static [&'static str] {
    match feed {
        FeedType::NewTxs | FeedType::PendingTxs => &DEFAULT_TX_PARAMS,
        FeedType::BdnBlocks | FeedType::NewBlocks => &BLOCK_PARAMS,
        FeedType::NewBeaconBlocks | FeedType::BdnBeaconBlocks => &BEACON_BLOCK_PARAMS,
        FeedType::OnBlock => &ON_BLOCK_PARAMS,
        FeedType::TxReceipts => &TX_RECEIPT_PARAMS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&FeedType::NewTxs).unwrap();
        assert_eq!(json, "\"newTxs\"");
        let feed: FeedType = serde_json::from_str("\"bdnBeaconBlocks\"").unwrap();
        assert_eq!(feed, FeedType::BdnBeaconBlocks);
        assert!(serde_json::from_str::<FeedType>("\"noSuchFeed\"").is_err());
    }

    #[test]
    fn test_catalogs() {
        assert!(valid_params(FeedType::NewTxs).contains(&"raw_tx"));
        assert!(!default_params(FeedType::NewTxs).contains(&"raw_tx"));
        assert!(valid_params(FeedType::NewBlocks).contains(&"future_validator_info"));
        assert_eq!(valid_params(FeedType::NewBeaconBlocks).len(), 4);
        assert_eq!(valid_params(FeedType::TxReceipts).len(), 14);
    }

    #[test]
    fn test_feed_classification() {
        assert!(FeedType::NewTxs.is_tx_feed());
        assert!(FeedType::BdnBeaconBlocks.is_block_feed());
        assert!(!FeedType::OnBlock.is_tx_feed());
        assert!(!FeedType::OnBlock.is_block_feed());
    }
}
