//! Compressed-block wire message.

use crate::block::BlockType;
use crate::hash::Hash256;
use crate::{NetworkNum, ShortId};

/// The wire form of a compressed block: the encoded envelope plus the short
/// IDs substituted into it, in payload order.
///
/// Invariant: the number of placeholder entries inside the decoded envelope
/// equals `short_ids.len()`.
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub hash: Hash256,
    /// Zero for execution-layer broadcasts.
    pub beacon_hash: Hash256,
    pub block_type: BlockType,
    /// RLP (execution) or SSZ (beacon) envelope bytes.
    pub block: Vec<u8>,
    pub short_ids: Vec<ShortId>,
    pub network_num: NetworkNum,
}

impl Broadcast {
    pub fn new(
        hash: Hash256,
        beacon_hash: Hash256,
        block_type: BlockType,
        block: Vec<u8>,
        short_ids: Vec<ShortId>,
        network_num: NetworkNum,
    ) -> Self {
        Self {
            hash,
            beacon_hash,
            block_type,
            block,
            short_ids,
            network_num,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::keccak256;

    #[test]
    fn test_construction() {
        let broadcast = Broadcast::new(
            keccak256(b"block"),
            Hash256::ZERO,
            BlockType::Eth,
            vec![0xC0],
            vec![7, 8],
            5,
        );
        assert_eq!(broadcast.short_ids, vec![7, 8]);
        assert!(broadcast.beacon_hash.is_zero());
    }
}
