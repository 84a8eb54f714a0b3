//! Worker loops between the bridge and the rest of the gateway.

use crate::adapters::EthConverter;
use gateway_bridge::Bridge;
use gateway_feeds::notification::{Notification, TxNotification};
use gateway_feeds::{FeedManager, FeedType};
use gateway_processor::{BlockProcessingError, BlockProcessor};
use gateway_types::{EthTransaction, NetworkNum, TxFlags};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Consume transactions arriving from the node side and surface them on
/// the `newTxs` feed.
pub async fn run_tx_relay(bridge: Arc<Bridge<EthConverter>>, feed_manager: Arc<FeedManager>) {
    while let Some(batch) = bridge.receive_node_transactions().await {
        for tx in batch.txs {
            match EthTransaction::decode_wire(&tx.content) {
                Ok(eth_tx) => {
                    let local_region = tx.flags.contains(TxFlags::LOCAL_REGION);
                    let notification =
                        Notification::NewTx(TxNotification::new(eth_tx, local_region));
                    feed_manager.notify(FeedType::NewTxs, &notification);
                }
                Err(e) => {
                    debug!(hash = %tx.hash, error = %e, "Skipping undecodable transaction");
                }
            }
        }
    }
}

/// Consume blocks handed over by the node workers and compress them for
/// broadcast. The handoff to the BDN connection happens outside this
/// process boundary.
pub async fn run_block_relay(
    bridge: Arc<Bridge<EthConverter>>,
    processor: Arc<BlockProcessor>,
    network_num: NetworkNum,
    min_tx_age: Duration,
) {
    while let Some(from_node) = bridge.receive_block_from_node().await {
        let block = from_node.block;
        match processor.block_to_broadcast(&block, network_num, min_tx_age) {
            Ok((broadcast, used_short_ids)) => {
                info!(
                    hash = %broadcast.hash,
                    number = block.number,
                    compressed = used_short_ids.len(),
                    txs = block.txs.len(),
                    encoded_bytes = broadcast.block.len(),
                    peer = %from_node.peer_endpoint,
                    "Block compressed for broadcast"
                );
            }
            Err(BlockProcessingError::AlreadyProcessed) => {
                debug!(hash = %block.hash, "Skipping duplicate block from node");
            }
            Err(e) => {
                error!(hash = %block.hash, error = %e, "Failed to compress block");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_processor::MemoryTxStore;
    use gateway_types::eth::LegacyTx;
    use gateway_types::{
        keccak256, AccountId, Block, BlockTransaction, BlockType, Hash256, NodeEndpoint, Tx, U256,
    };

    fn bridge() -> Arc<Bridge<EthConverter>> {
        Arc::new(Bridge::new(EthConverter { network_num: 5 }, false))
    }

    #[tokio::test]
    async fn test_tx_relay_feeds_subscribers() {
        let bridge = bridge();
        let feed_manager = Arc::new(FeedManager::new());
        let mut sub = feed_manager.subscribe(
            FeedType::NewTxs,
            AccountId::from("acct"),
            gateway_types::AccountTier::Enterprise,
            "local".to_string(),
            vec![],
            String::new(),
        );

        tokio::spawn(run_tx_relay(bridge.clone(), feed_manager.clone()));

        let eth_tx = EthTransaction::Legacy(LegacyTx {
            nonce: 5,
            gas_price: U256::from(7u64),
            gas: 21_000,
            to: None,
            value: U256::zero(),
            input: vec![],
            v: U256::from(27u64),
            r: U256::one(),
            s: U256::one(),
        });
        let tx = Tx::new(
            eth_tx.hash(),
            eth_tx.encode_wire(),
            5,
            TxFlags::PAID_TX | TxFlags::LOCAL_REGION,
            AccountId::from("acct"),
        );
        bridge
            .send_transactions_to_bdn(vec![tx], NodeEndpoint::default())
            .unwrap();

        let notification = sub.notifications.recv().await.unwrap();
        let Notification::NewTx(tx_notification) = notification else {
            panic!("expected a new tx notification");
        };
        assert_eq!(tx_notification.hash, eth_tx.hash());
        assert!(tx_notification.local_region);
    }

    #[tokio::test]
    async fn test_block_relay_deduplicates() {
        let bridge = bridge();
        let store = Arc::new(MemoryTxStore::new());
        let processor = Arc::new(BlockProcessor::new(store));
        tokio::spawn(run_block_relay(
            bridge.clone(),
            processor.clone(),
            5,
            Duration::ZERO,
        ));

        let block = Block::new(
            keccak256(b"relayed"),
            Hash256::ZERO,
            BlockType::Eth,
            vec![0x80],
            vec![BlockTransaction::new(keccak256(b"t"), vec![0x01])],
            vec![0x80],
            Some(U256::one()),
            9,
            0,
        );
        bridge
            .send_block_to_bdn(block.clone(), NodeEndpoint::default())
            .unwrap();

        // Wait for the relay to process it, then the hash is marked.
        for _ in 0..50 {
            if !processor.should_process(&block.hash) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!processor.should_process(&block.hash));
    }
}
