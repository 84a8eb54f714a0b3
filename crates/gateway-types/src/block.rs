//! Gateway-internal block representation.

use crate::hash::Hash256;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Variant tag of a gateway block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    Eth,
    BeaconPhase0,
    BeaconAltair,
    BeaconBellatrix,
    BeaconCapella,
    Unknown,
}

impl BlockType {
    /// True for any consensus-layer variant.
    #[must_use]
    pub fn is_beacon(&self) -> bool {
        matches!(
            self,
            BlockType::BeaconPhase0
                | BlockType::BeaconAltair
                | BlockType::BeaconBellatrix
                | BlockType::BeaconCapella
        )
    }
}

/// A transaction inside a gateway block: content plus the hash when the
/// producer knew it. Re-inflated transactions from a compressed broadcast
/// carry content only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTransaction {
    hash: Option<Hash256>,
    content: Vec<u8>,
}

impl BlockTransaction {
    pub fn new(hash: Hash256, content: Vec<u8>) -> Self {
        Self {
            hash: Some(hash),
            content,
        }
    }

    /// A transaction whose hash is unknown (raw bytes from the wire).
    pub fn raw(content: Vec<u8>) -> Self {
        Self {
            hash: None,
            content,
        }
    }

    #[must_use]
    pub fn hash(&self) -> Option<Hash256> {
        self.hash
    }

    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

/// A block as passed between the blockchain side and the relay side.
///
/// `header` and `trailer` are opaque blobs owned by the originating codec:
/// for execution-layer blocks `header` is the RLP header item and `trailer`
/// the uncles item; for beacon blocks `header` is empty and `trailer` holds
/// the SSZ block blob.
#[derive(Debug, Clone)]
pub struct Block {
    pub hash: Hash256,
    /// Zero for execution-layer blocks.
    pub beacon_hash: Hash256,
    pub block_type: BlockType,
    pub header: Vec<u8>,
    pub txs: Vec<BlockTransaction>,
    pub trailer: Vec<u8>,
    /// Present for execution-layer blocks only.
    pub total_difficulty: Option<U256>,
    pub number: u64,
    /// Inflated size in bytes.
    pub size: usize,
}

impl Block {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hash: Hash256,
        beacon_hash: Hash256,
        block_type: BlockType,
        header: Vec<u8>,
        txs: Vec<BlockTransaction>,
        trailer: Vec<u8>,
        total_difficulty: Option<U256>,
        number: u64,
        size: usize,
    ) -> Self {
        Self {
            hash,
            beacon_hash,
            block_type,
            header,
            txs,
            trailer,
            total_difficulty,
            number,
            size,
        }
    }

    /// The hash used for deduplication: beacon blocks dedup on the beacon
    /// hash, execution blocks on the primary hash.
    #[must_use]
    pub fn dedup_hash(&self) -> Hash256 {
        if self.block_type.is_beacon() {
            self.beacon_hash
        } else {
            self.hash
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::keccak256;

    #[test]
    fn test_beacon_type_classification() {
        assert!(BlockType::BeaconCapella.is_beacon());
        assert!(BlockType::BeaconPhase0.is_beacon());
        assert!(!BlockType::Eth.is_beacon());
        assert!(!BlockType::Unknown.is_beacon());
    }

    #[test]
    fn test_dedup_hash_selection() {
        let hash = keccak256(b"exec");
        let beacon = keccak256(b"beacon");
        let eth = Block::new(
            hash,
            Hash256::ZERO,
            BlockType::Eth,
            vec![],
            vec![],
            vec![],
            Some(U256::from(1)),
            1,
            0,
        );
        assert_eq!(eth.dedup_hash(), hash);

        let bellatrix = Block::new(
            hash,
            beacon,
            BlockType::BeaconBellatrix,
            vec![],
            vec![],
            vec![],
            None,
            1,
            0,
        );
        assert_eq!(bellatrix.dedup_hash(), beacon);
    }

    #[test]
    fn test_raw_transaction_has_no_hash() {
        let tx = BlockTransaction::raw(vec![0xAA; 4]);
        assert!(tx.hash().is_none());
        assert_eq!(tx.content(), &[0xAA; 4]);
    }
}
