//! Compress and expand blocks against the transaction store.

use crate::hash_history::{HashHistory, DEFAULT_CLEANUP_INTERVAL};
use crate::tx_store::TxStore;
use gateway_codec::{
    beacon_transaction_length, rlp_list_size, CodecError, CompressedTx, RlpBlockEnvelope,
    SszBlockEnvelope,
};
use gateway_types::{
    Block, BlockTransaction, BlockType, Broadcast, Hash256, NetworkNum, ShortId, U256,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// How long a processed block hash stays in the dedup set. Bounds the
/// replay window for redundant broadcasts.
const PROCESSED_TTL: Duration = Duration::from_secs(10 * 60);

/// Errors from block compression and expansion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockProcessingError {
    /// The block (or broadcast) was already handled inside the dedup window.
    #[error("already processed")]
    AlreadyProcessed,

    /// Short IDs that could not be resolved. Recoverable: the caller uses
    /// the list to initiate short-ID recovery.
    #[error("missing short IDs: {0:?}")]
    MissingShortIds(Vec<ShortId>),

    #[error("unknown block type")]
    UnknownBlockType,

    /// A beacon broadcast without a beacon hash cannot be expanded.
    #[error("not compatible beacon block")]
    NotCompatibleBeaconBlock,

    /// The envelope holds more placeholders than the broadcast has short IDs.
    #[error("bad compressed block: {placeholders} placeholder transactions but only {resolved} short IDs provided")]
    BadCompression { placeholders: usize, resolved: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Turns blocks into broadcast messages and back, substituting known
/// transactions with short IDs and deduplicating both directions through a
/// shared processed-blocks set.
pub struct BlockProcessor {
    tx_store: Arc<dyn TxStore>,
    processed_blocks: Arc<HashHistory>,
}

impl BlockProcessor {
    pub fn new(tx_store: Arc<dyn TxStore>) -> Self {
        Self {
            tx_store,
            processed_blocks: Arc::new(HashHistory::new(
                "processed-blocks",
                DEFAULT_CLEANUP_INTERVAL,
            )),
        }
    }

    /// The shared dedup set, exposed so the runtime can start its sweeper.
    pub fn processed_blocks(&self) -> &Arc<HashHistory> {
        &self.processed_blocks
    }

    /// True when the hash has not been compressed or expanded recently.
    #[must_use]
    pub fn should_process(&self, hash: &Hash256) -> bool {
        !self.processed_blocks.exists(&hash.to_string())
    }

    fn mark_processed(&self, hash: &Hash256) {
        self.processed_blocks.add(hash.to_string(), PROCESSED_TTL);
    }

    /// Compress a block into a broadcast message. Transactions older than
    /// `min_tx_age` in the store with at least one short ID become
    /// placeholders; the threshold avoids racing transactions whose ID has
    /// not yet propagated to peers.
    pub fn block_to_broadcast(
        &self,
        block: &Block,
        network_num: NetworkNum,
        min_tx_age: Duration,
    ) -> Result<(Broadcast, Vec<ShortId>), BlockProcessingError> {
        let dedup_key = match block.block_type {
            BlockType::Eth => block.hash,
            ty if ty.is_beacon() => block.beacon_hash,
            _ => return Err(BlockProcessingError::UnknownBlockType),
        };
        if !self.should_process(&dedup_key) {
            return Err(BlockProcessingError::AlreadyProcessed);
        }

        let (slots, used_short_ids) = self.compress_transactions(block, min_tx_age);

        let encoded = match block.block_type {
            BlockType::Eth => RlpBlockEnvelope {
                header: block.header.clone(),
                txs: slots,
                trailer: block.trailer.clone(),
                total_difficulty: block.total_difficulty.unwrap_or_default(),
                number: U256::from(block.number),
            }
            .encode(),
            _ => SszBlockEnvelope {
                block: block.trailer.clone(),
                txs: slots,
                number: block.number,
            }
            .encode()?,
        };

        let beacon_hash = if block.block_type.is_beacon() {
            block.beacon_hash
        } else {
            Hash256::ZERO
        };
        let broadcast = Broadcast::new(
            block.hash,
            beacon_hash,
            block.block_type,
            encoded,
            used_short_ids.clone(),
            network_num,
        );

        self.mark_processed(&dedup_key);
        debug!(
            hash = %block.hash,
            compressed = used_short_ids.len(),
            total = block.txs.len(),
            "Compressed block into broadcast"
        );
        Ok((broadcast, used_short_ids))
    }

    fn compress_transactions(
        &self,
        block: &Block,
        min_tx_age: Duration,
    ) -> (Vec<CompressedTx>, Vec<ShortId>) {
        let mut used_short_ids = Vec::new();
        let mut slots = Vec::with_capacity(block.txs.len());
        for tx in &block.txs {
            if let Some(hash) = tx.hash() {
                if let Some(entry) = self.tx_store.get(&hash) {
                    // Strictly older than the floor; an entry exactly at the
                    // threshold stays inlined.
                    if entry.add_time.elapsed() > min_tx_age {
                        if let Some(short_id) = entry.short_ids.first() {
                            used_short_ids.push(*short_id);
                            slots.push(CompressedTx::placeholder());
                            continue;
                        }
                    }
                }
            }
            slots.push(CompressedTx::full(tx.content().to_vec()));
        }
        (slots, used_short_ids)
    }

    /// Expand a broadcast back into a block, resolving every short ID
    /// through the store. Unresolvable IDs abort the expansion and are
    /// reported, in input order, for recovery.
    pub fn block_from_broadcast(
        &self,
        broadcast: &Broadcast,
    ) -> Result<Block, BlockProcessingError> {
        match broadcast.block_type {
            BlockType::Eth => {
                if !self.should_process(&broadcast.hash) {
                    return Err(BlockProcessingError::AlreadyProcessed);
                }
            }
            ty if ty.is_beacon() => {
                if broadcast.beacon_hash.is_zero() {
                    return Err(BlockProcessingError::NotCompatibleBeaconBlock);
                }
                if !self.should_process(&broadcast.beacon_hash) {
                    return Err(BlockProcessingError::AlreadyProcessed);
                }
            }
            _ => return Err(BlockProcessingError::UnknownBlockType),
        }

        let mut resolved = Vec::with_capacity(broadcast.short_ids.len());
        let mut missing = Vec::new();
        for short_id in &broadcast.short_ids {
            match self.tx_store.get_tx_by_short_id(*short_id) {
                Some(entry) => resolved.push(entry),
                None => missing.push(*short_id),
            }
        }
        if !missing.is_empty() {
            return Err(BlockProcessingError::MissingShortIds(missing));
        }

        let block = match broadcast.block_type {
            BlockType::Eth => {
                let block = self.expand_rlp(broadcast, &resolved)?;
                self.mark_processed(&broadcast.hash);
                block
            }
            _ => {
                let block = self.expand_ssz(broadcast, &resolved)?;
                self.mark_processed(&broadcast.hash);
                self.mark_processed(&broadcast.beacon_hash);
                block
            }
        };

        debug!(
            hash = %broadcast.hash,
            short_ids = broadcast.short_ids.len(),
            "Expanded broadcast into block"
        );
        Ok(block)
    }

    fn expand_rlp(
        &self,
        broadcast: &Broadcast,
        resolved: &[crate::tx_store::StoredTx],
    ) -> Result<Block, BlockProcessingError> {
        let envelope = RlpBlockEnvelope::decode(&broadcast.block)?;

        let mut placeholders = 0usize;
        let mut txs = Vec::with_capacity(envelope.txs.len());
        let mut txs_bytes = 0u64;
        for slot in &envelope.txs {
            if slot.is_full {
                txs_bytes += slot.tx.len() as u64;
                txs.push(BlockTransaction::raw(slot.tx.clone()));
            } else {
                let entry = resolved.get(placeholders).ok_or(
                    BlockProcessingError::BadCompression {
                        placeholders: placeholders + 1,
                        resolved: resolved.len(),
                    },
                )?;
                txs_bytes += entry.content.len() as u64;
                txs.push(BlockTransaction::new(entry.hash, entry.content.clone()));
                placeholders += 1;
            }
        }

        let size = rlp_list_size(
            envelope.header.len() as u64 + rlp_list_size(txs_bytes) + envelope.trailer.len() as u64,
        ) as usize;

        Ok(Block::new(
            broadcast.hash,
            Hash256::ZERO,
            broadcast.block_type,
            envelope.header,
            txs,
            envelope.trailer,
            Some(envelope.total_difficulty),
            envelope.number.low_u64(),
            size,
        ))
    }

    fn expand_ssz(
        &self,
        broadcast: &Broadcast,
        resolved: &[crate::tx_store::StoredTx],
    ) -> Result<Block, BlockProcessingError> {
        let envelope = SszBlockEnvelope::decode(&broadcast.block)?;

        let mut placeholders = 0usize;
        let mut txs = Vec::with_capacity(envelope.txs.len());
        let mut txs_bytes = 0usize;
        for slot in &envelope.txs {
            if slot.is_full {
                txs_bytes += beacon_transaction_length(&slot.tx);
                txs.push(BlockTransaction::raw(slot.tx.clone()));
            } else {
                let entry = resolved.get(placeholders).ok_or(
                    BlockProcessingError::BadCompression {
                        placeholders: placeholders + 1,
                        resolved: resolved.len(),
                    },
                )?;
                txs_bytes += beacon_transaction_length(&entry.content);
                txs.push(BlockTransaction::raw(entry.content.clone()));
                placeholders += 1;
            }
        }

        let size = envelope.block.len() + txs_bytes;

        Ok(Block::new(
            broadcast.hash,
            broadcast.beacon_hash,
            broadcast.block_type,
            Vec::new(),
            txs,
            envelope.block,
            None,
            envelope.number,
            size,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx_store::MemoryTxStore;
    use gateway_types::keccak256;

    /// Wrap opaque bytes into one valid RLP item for the envelope blobs.
    fn blob(data: &[u8]) -> Vec<u8> {
        rlp::encode(&data.to_vec()).to_vec()
    }

    fn stored_tx(store: &MemoryTxStore, tag: &[u8], short_id: ShortId) -> BlockTransaction {
        let content = tag.repeat(20);
        let hash = keccak256(&content);
        store.add(hash, content.clone(), vec![short_id]);
        BlockTransaction::new(hash, content)
    }

    fn unknown_tx(tag: &[u8]) -> BlockTransaction {
        let content = tag.repeat(30);
        BlockTransaction::new(keccak256(&content), content)
    }

    fn eth_block(txs: Vec<BlockTransaction>, tag: &[u8]) -> Block {
        Block::new(
            keccak256(tag),
            Hash256::ZERO,
            BlockType::Eth,
            blob(b"header-bytes"),
            txs,
            blob(b"uncles"),
            Some(U256::from(1_000_000u64)),
            14_000_000,
            0,
        )
    }

    fn beacon_block(txs: Vec<BlockTransaction>, tag: &[u8]) -> Block {
        Block::new(
            keccak256(tag),
            keccak256(&[tag, b"-beacon"].concat()),
            BlockType::BeaconCapella,
            Vec::new(),
            txs,
            vec![0x5A; 120],
            None,
            6_100_000,
            0,
        )
    }

    #[test]
    fn test_eth_round_trip() {
        let store = Arc::new(MemoryTxStore::new());
        let known_a = stored_tx(&store, b"a", 10);
        let known_b = stored_tx(&store, b"b", 11);
        let fresh = unknown_tx(b"c");
        let block = eth_block(vec![known_a.clone(), fresh.clone(), known_b.clone()], b"blk");

        let compressor = BlockProcessor::new(store.clone());
        let (broadcast, used) = compressor
            .block_to_broadcast(&block, 5, Duration::ZERO)
            .unwrap();
        assert_eq!(used, vec![10, 11]);
        assert_eq!(broadcast.short_ids, vec![10, 11]);
        assert!(broadcast.beacon_hash.is_zero());

        // Expansion runs on a fresh processor sharing the store: the dedup
        // set is per-gateway, and the compressing side already holds the key.
        let expander = BlockProcessor::new(store);
        let expanded = expander.block_from_broadcast(&broadcast).unwrap();

        let contents: Vec<&[u8]> = expanded.txs.iter().map(|t| t.content()).collect();
        assert_eq!(
            contents,
            vec![known_a.content(), fresh.content(), known_b.content()]
        );
        assert_eq!(expanded.header, block.header);
        assert_eq!(expanded.trailer, block.trailer);
        assert_eq!(expanded.number, block.number);
        assert_eq!(expanded.total_difficulty, block.total_difficulty);
        assert!(expanded.size > 0);
    }

    #[test]
    fn test_second_compression_already_processed() {
        let store = Arc::new(MemoryTxStore::new());
        let block = eth_block(vec![unknown_tx(b"x")], b"blk");
        let processor = BlockProcessor::new(store);

        processor
            .block_to_broadcast(&block, 5, Duration::ZERO)
            .unwrap();
        let err = processor
            .block_to_broadcast(&block, 5, Duration::ZERO)
            .unwrap_err();
        assert_eq!(err, BlockProcessingError::AlreadyProcessed);
    }

    #[test]
    fn test_missing_short_ids_reported_in_order() {
        let store = Arc::new(MemoryTxStore::new());
        store.add(keccak256(b"known"), b"known".to_vec(), vec![2]);
        let processor = BlockProcessor::new(store);

        let broadcast = Broadcast::new(
            keccak256(b"blk"),
            Hash256::ZERO,
            BlockType::Eth,
            vec![],
            vec![9, 2, 7],
            5,
        );
        let err = processor.block_from_broadcast(&broadcast).unwrap_err();
        assert_eq!(err, BlockProcessingError::MissingShortIds(vec![9, 7]));
        // A failed expansion must not poison the dedup set.
        assert!(processor.should_process(&broadcast.hash));
    }

    #[test]
    fn test_min_tx_age_defers_compression() {
        let store = Arc::new(MemoryTxStore::new());
        let tx = stored_tx(&store, b"young", 33);
        let block = eth_block(vec![tx], b"blk");
        let processor = BlockProcessor::new(store);

        // The store entry was added just now, so a one-hour floor keeps it inline.
        let (broadcast, used) = processor
            .block_to_broadcast(&block, 5, Duration::from_secs(3600))
            .unwrap();
        assert!(used.is_empty());
        assert!(broadcast.short_ids.is_empty());
    }

    #[test]
    fn test_beacon_round_trip() {
        let store = Arc::new(MemoryTxStore::new());
        let known = stored_tx(&store, b"k", 77);
        let inline = unknown_tx(b"i");
        let block = beacon_block(vec![inline.clone(), known.clone()], b"slotted");

        let compressor = BlockProcessor::new(store.clone());
        let (broadcast, used) = compressor
            .block_to_broadcast(&block, 5, Duration::ZERO)
            .unwrap();
        assert_eq!(used, vec![77]);
        assert_eq!(broadcast.beacon_hash, block.beacon_hash);

        let expander = BlockProcessor::new(store);
        let expanded = expander.block_from_broadcast(&broadcast).unwrap();
        assert_eq!(expanded.trailer, block.trailer);
        assert_eq!(expanded.number, block.number);
        let contents: Vec<&[u8]> = expanded.txs.iter().map(|t| t.content()).collect();
        assert_eq!(contents, vec![inline.content(), known.content()]);

        // Both hashes enter the dedup set on the expanding side.
        assert!(!expander.should_process(&broadcast.hash));
        assert!(!expander.should_process(&broadcast.beacon_hash));
    }

    #[test]
    fn test_beacon_broadcast_without_beacon_hash_rejected() {
        let store = Arc::new(MemoryTxStore::new());
        let processor = BlockProcessor::new(store);
        let broadcast = Broadcast::new(
            keccak256(b"blk"),
            Hash256::ZERO,
            BlockType::BeaconBellatrix,
            vec![],
            vec![],
            5,
        );
        let err = processor.block_from_broadcast(&broadcast).unwrap_err();
        assert_eq!(err, BlockProcessingError::NotCompatibleBeaconBlock);
        assert!(processor.should_process(&broadcast.hash));
    }

    #[test]
    fn test_unknown_block_type_rejected_both_ways() {
        let store = Arc::new(MemoryTxStore::new());
        let processor = BlockProcessor::new(store);
        let mut block = eth_block(vec![], b"blk");
        block.block_type = BlockType::Unknown;
        assert_eq!(
            processor
                .block_to_broadcast(&block, 5, Duration::ZERO)
                .unwrap_err(),
            BlockProcessingError::UnknownBlockType
        );

        let broadcast = Broadcast::new(
            keccak256(b"b"),
            Hash256::ZERO,
            BlockType::Unknown,
            vec![],
            vec![],
            5,
        );
        assert_eq!(
            processor.block_from_broadcast(&broadcast).unwrap_err(),
            BlockProcessingError::UnknownBlockType
        );
    }

    #[test]
    fn test_more_placeholders_than_short_ids_fails() {
        let store = Arc::new(MemoryTxStore::new());
        let processor = BlockProcessor::new(store);

        // Envelope with two placeholders but a broadcast carrying none.
        let envelope = RlpBlockEnvelope {
            header: blob(b"h"),
            txs: vec![
                gateway_codec::CompressedTx::placeholder(),
                gateway_codec::CompressedTx::placeholder(),
            ],
            trailer: blob(b"t"),
            total_difficulty: U256::one(),
            number: U256::from(3u64),
        };
        let broadcast = Broadcast::new(
            keccak256(b"bad"),
            Hash256::ZERO,
            BlockType::Eth,
            envelope.encode(),
            vec![],
            5,
        );
        let err = processor.block_from_broadcast(&broadcast).unwrap_err();
        assert!(matches!(
            err,
            BlockProcessingError::BadCompression { resolved: 0, .. }
        ));
    }
}
