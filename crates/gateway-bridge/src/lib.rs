//! # Gateway Bridge
//!
//! The typed, bounded, multi-queue bus decoupling the blockchain-facing
//! workers from the BDN-facing workers. Every logical edge is its own
//! bounded queue; producers never block — a saturated queue surfaces
//! [`BridgeError::ChannelFull`] and the producer decides whether to retry,
//! evict, or report. Receivers suspend until a message arrives.
//!
//! The bridge is the only shared-state object between the two subsystems;
//! it also embeds the [`Converter`] seam for translating between node-side
//! and gateway-side transaction/block representations.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod converter;

pub use converter::{ConvertError, Converter};

use gateway_types::{Block, BlockType, Hash256, NetworkId, NetworkNum, NodeEndpoint, Tx};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Mutex;

/// Queue capacity for transaction batches.
const TRANSACTION_BACKLOG: usize = 2000;
/// Queue capacity for transaction hash announcements.
const TRANSACTION_HASHES_BACKLOG: usize = 1000;
/// Queue capacity for blocks.
const BLOCK_BACKLOG: usize = 100;
/// Queue capacity for status request/response edges.
const STATUS_BACKLOG: usize = 10;

/// Errors surfaced by bridge sends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The destination queue is saturated. Recoverable: the producer
    /// chooses to retry or drop.
    #[error("channel full")]
    ChannelFull,

    /// The consuming side has shut down.
    #[error("channel closed")]
    Closed,

    /// A block was routed that no queue accepts.
    #[error("could not route block {hash} with type {block_type:?}")]
    UnsupportedBlockType {
        hash: Hash256,
        block_type: BlockType,
    },
}

/// An alert raised on the initial liveliness check when no blockchain peer
/// is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoActivePeersAlert;

/// Transaction hashes a peer has announced and can be asked for.
#[derive(Debug, Clone)]
pub struct TxAnnouncement {
    pub peer_id: String,
    pub hashes: Vec<Hash256>,
    pub peer_endpoint: NodeEndpoint,
}

/// A batch of transactions moving between a node and the BDN.
#[derive(Debug, Clone)]
pub struct Transactions {
    pub txs: Vec<Tx>,
    pub peer_endpoint: NodeEndpoint,
}

/// A block handed over from a node.
#[derive(Debug, Clone)]
pub struct BlockFromNode {
    pub block: Block,
    pub peer_endpoint: NodeEndpoint,
}

/// Blockchain connection status of one peer.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    pub peer_endpoint: NodeEndpoint,
    pub is_connected: bool,
    pub is_dynamic: bool,
}

/// Validator list published by the node for a given height.
#[derive(Debug, Clone)]
pub struct ValidatorListInfo {
    pub validator_list: Vec<String>,
    pub block_height: u64,
}

/// Network parameters pushed to the blockchain workers.
#[derive(Debug, Clone)]
pub struct NetworkConfigUpdate {
    pub network_num: NetworkNum,
    pub chain_id: NetworkId,
}

/// One bounded edge: non-blocking producer side, suspending consumer side.
/// The receiver half lives behind an async mutex so the bridge stays a
/// single shared object; each queue still has exactly one logical reader.
struct Channel<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
}

impl<T> Channel<T> {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    fn send(&self, value: T) -> Result<(), BridgeError> {
        self.tx.try_send(value).map_err(|e| match e {
            TrySendError::Full(_) => BridgeError::ChannelFull,
            TrySendError::Closed(_) => BridgeError::Closed,
        })
    }

    async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }
}

/// Channel-based bridge between the blockchain node workers and the BDN
/// workers.
pub struct Bridge<C: Converter> {
    converter: C,
    /// Whether the gateway started with a beacon source; gates routing of
    /// beacon blocks toward the node.
    beacon_block: bool,

    config: Channel<NetworkConfigUpdate>,
    transactions_from_node: Channel<Transactions>,
    transactions_from_bdn: Channel<Transactions>,
    transaction_hashes_from_node: Channel<TxAnnouncement>,
    transaction_hashes_requests: Channel<TxAnnouncement>,

    blocks_from_node: Channel<BlockFromNode>,
    eth_blocks_from_bdn: Channel<Block>,
    beacon_blocks_from_bdn: Channel<Block>,
    confirmed_blocks_from_node: Channel<BlockFromNode>,

    no_active_peers: Channel<NoActivePeersAlert>,

    status_request: Channel<()>,
    status_response: Channel<Vec<NodeEndpoint>>,
    node_connection_check_request: Channel<()>,
    node_connection_check_response: Channel<NodeEndpoint>,
    connection_status: Channel<ConnectionStatus>,
    disconnect_event: Channel<NodeEndpoint>,
    validator_info: Channel<ValidatorListInfo>,
}

impl<C: Converter> Bridge<C> {
    /// Build a bridge around a converter. `beacon_block` reflects whether a
    /// beacon source was configured at startup.
    pub fn new(converter: C, beacon_block: bool) -> Self {
        Self {
            converter,
            beacon_block,
            config: Channel::new(1),
            transactions_from_node: Channel::new(TRANSACTION_BACKLOG),
            transactions_from_bdn: Channel::new(TRANSACTION_BACKLOG),
            transaction_hashes_from_node: Channel::new(TRANSACTION_HASHES_BACKLOG),
            transaction_hashes_requests: Channel::new(TRANSACTION_HASHES_BACKLOG),
            blocks_from_node: Channel::new(BLOCK_BACKLOG),
            eth_blocks_from_bdn: Channel::new(BLOCK_BACKLOG),
            beacon_blocks_from_bdn: Channel::new(BLOCK_BACKLOG),
            confirmed_blocks_from_node: Channel::new(BLOCK_BACKLOG),
            // tokio has no rendezvous channel; capacity 1 is the closest
            // bound for the alert edge.
            no_active_peers: Channel::new(1),
            status_request: Channel::new(STATUS_BACKLOG),
            status_response: Channel::new(STATUS_BACKLOG),
            node_connection_check_request: Channel::new(STATUS_BACKLOG),
            node_connection_check_response: Channel::new(STATUS_BACKLOG),
            connection_status: Channel::new(TRANSACTION_BACKLOG),
            disconnect_event: Channel::new(STATUS_BACKLOG),
            validator_info: Channel::new(1),
        }
    }

    /// The embedded representation converter.
    pub fn converter(&self) -> &C {
        &self.converter
    }

    pub fn update_network_config(&self, update: NetworkConfigUpdate) -> Result<(), BridgeError> {
        self.config.send(update)
    }

    pub async fn receive_network_config_update(&self) -> Option<NetworkConfigUpdate> {
        self.config.recv().await
    }

    /// Announce transaction hashes a peer node has available.
    pub fn announce_transaction_hashes(
        &self,
        peer_id: String,
        hashes: Vec<Hash256>,
        peer_endpoint: NodeEndpoint,
    ) -> Result<(), BridgeError> {
        self.transaction_hashes_from_node.send(TxAnnouncement {
            peer_id,
            hashes,
            peer_endpoint,
        })
    }

    /// Request announced transactions back from a peer node.
    pub fn request_transactions_from_node(
        &self,
        peer_id: String,
        hashes: Vec<Hash256>,
    ) -> Result<(), BridgeError> {
        self.transaction_hashes_requests.send(TxAnnouncement {
            peer_id,
            hashes,
            peer_endpoint: NodeEndpoint::default(),
        })
    }

    /// Push BDN transactions toward the node workers.
    pub fn send_transactions_from_bdn(&self, transactions: Transactions) -> Result<(), BridgeError> {
        self.transactions_from_bdn.send(transactions)
    }

    /// Push node transactions toward the BDN workers.
    pub fn send_transactions_to_bdn(
        &self,
        txs: Vec<Tx>,
        peer_endpoint: NodeEndpoint,
    ) -> Result<(), BridgeError> {
        self.transactions_from_node.send(Transactions {
            txs,
            peer_endpoint,
        })
    }

    pub async fn receive_node_transactions(&self) -> Option<Transactions> {
        self.transactions_from_node.recv().await
    }

    pub async fn receive_bdn_transactions(&self) -> Option<Transactions> {
        self.transactions_from_bdn.recv().await
    }

    pub async fn receive_transaction_hashes_announcement(&self) -> Option<TxAnnouncement> {
        self.transaction_hashes_from_node.recv().await
    }

    pub async fn receive_transaction_hashes_request(&self) -> Option<TxAnnouncement> {
        self.transaction_hashes_requests.recv().await
    }

    /// Send a node block toward the BDN workers.
    pub fn send_block_to_bdn(
        &self,
        block: Block,
        peer_endpoint: NodeEndpoint,
    ) -> Result<(), BridgeError> {
        self.blocks_from_node.send(BlockFromNode {
            block,
            peer_endpoint,
        })
    }

    /// Route a BDN block toward the node workers. Eth blocks go to the eth
    /// queue; beacon blocks go to the beacon queue only when a beacon source
    /// is configured, otherwise they are dropped without error.
    pub fn send_block_to_node(&self, block: Block) -> Result<(), BridgeError> {
        match block.block_type {
            BlockType::Eth => self.eth_blocks_from_bdn.send(block),
            ty if ty.is_beacon() => {
                if !self.beacon_block {
                    return Ok(());
                }
                self.beacon_blocks_from_bdn.send(block)
            }
            block_type => Err(BridgeError::UnsupportedBlockType {
                hash: block.hash,
                block_type,
            }),
        }
    }

    /// Hand a confirmed block hash over for the block-confirmation message.
    pub fn send_confirmed_block_to_gateway(
        &self,
        block: Block,
        peer_endpoint: NodeEndpoint,
    ) -> Result<(), BridgeError> {
        self.confirmed_blocks_from_node.send(BlockFromNode {
            block,
            peer_endpoint,
        })
    }

    pub async fn receive_block_from_node(&self) -> Option<BlockFromNode> {
        self.blocks_from_node.recv().await
    }

    pub async fn receive_eth_block_from_bdn(&self) -> Option<Block> {
        self.eth_blocks_from_bdn.recv().await
    }

    pub async fn receive_beacon_block_from_bdn(&self) -> Option<Block> {
        self.beacon_blocks_from_bdn.recv().await
    }

    pub async fn receive_confirmed_block_from_node(&self) -> Option<BlockFromNode> {
        self.confirmed_blocks_from_node.recv().await
    }

    pub fn send_no_active_peers_alert(&self) -> Result<(), BridgeError> {
        self.no_active_peers.send(NoActivePeersAlert)
    }

    pub async fn receive_no_active_peers_alert(&self) -> Option<NoActivePeersAlert> {
        self.no_active_peers.recv().await
    }

    pub fn send_blockchain_status_request(&self) -> Result<(), BridgeError> {
        self.status_request.send(())
    }

    pub async fn receive_blockchain_status_request(&self) -> Option<()> {
        self.status_request.recv().await
    }

    pub fn send_blockchain_status_response(
        &self,
        endpoints: Vec<NodeEndpoint>,
    ) -> Result<(), BridgeError> {
        self.status_response.send(endpoints)
    }

    pub async fn receive_blockchain_status_response(&self) -> Option<Vec<NodeEndpoint>> {
        self.status_response.recv().await
    }

    pub fn send_node_connection_check_request(&self) -> Result<(), BridgeError> {
        self.node_connection_check_request.send(())
    }

    pub async fn receive_node_connection_check_request(&self) -> Option<()> {
        self.node_connection_check_request.recv().await
    }

    pub fn send_node_connection_check_response(
        &self,
        endpoint: NodeEndpoint,
    ) -> Result<(), BridgeError> {
        self.node_connection_check_response.send(endpoint)
    }

    pub async fn receive_node_connection_check_response(&self) -> Option<NodeEndpoint> {
        self.node_connection_check_response.recv().await
    }

    pub fn send_blockchain_connection_status(
        &self,
        status: ConnectionStatus,
    ) -> Result<(), BridgeError> {
        self.connection_status.send(status)
    }

    pub async fn receive_blockchain_connection_status(&self) -> Option<ConnectionStatus> {
        self.connection_status.recv().await
    }

    pub fn send_disconnect_event(&self, endpoint: NodeEndpoint) -> Result<(), BridgeError> {
        self.disconnect_event.send(endpoint)
    }

    pub async fn receive_disconnect_event(&self) -> Option<NodeEndpoint> {
        self.disconnect_event.recv().await
    }

    pub fn send_validator_list_info(&self, info: ValidatorListInfo) -> Result<(), BridgeError> {
        self.validator_info.send(info)
    }

    pub async fn receive_validator_list_info(&self) -> Option<ValidatorListInfo> {
        self.validator_info.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_types::{keccak256, AccountId, TxFlags, U256};

    /// Identity converter for bridge tests.
    struct NoopConverter;

    impl Converter for NoopConverter {
        type NodeTx = Tx;
        type NodeBlock = Block;

        fn transaction_to_gateway(&self, tx: Tx) -> Result<Tx, ConvertError> {
            Ok(tx)
        }

        fn transaction_from_gateway(&self, tx: &Tx) -> Result<Tx, ConvertError> {
            Ok(tx.clone())
        }

        fn block_to_gateway(&self, block: Block) -> Result<Block, ConvertError> {
            Ok(block)
        }

        fn block_from_gateway(&self, block: &Block) -> Result<Block, ConvertError> {
            Ok(block.clone())
        }
    }

    fn test_block(ty: BlockType, tag: &[u8]) -> Block {
        Block::new(
            keccak256(tag),
            keccak256(b"beacon"),
            ty,
            vec![],
            vec![],
            vec![],
            Some(U256::one()),
            1,
            0,
        )
    }

    fn test_tx(tag: &[u8]) -> Tx {
        Tx::new(
            keccak256(tag),
            tag.to_vec(),
            5,
            TxFlags::PAID_TX,
            AccountId::from("acct"),
        )
    }

    #[tokio::test]
    async fn test_transactions_round_trip_fifo() {
        let bridge = Bridge::new(NoopConverter, true);
        for i in 0..3u8 {
            bridge
                .send_transactions_to_bdn(vec![test_tx(&[i])], NodeEndpoint::default())
                .unwrap();
        }
        for i in 0..3u8 {
            let batch = bridge.receive_node_transactions().await.unwrap();
            assert_eq!(batch.txs[0].hash, keccak256(&[i]));
        }
    }

    #[tokio::test]
    async fn test_channel_full_then_drains() {
        let bridge = Bridge::new(NoopConverter, true);
        // The validator-info queue has capacity 1.
        bridge
            .send_validator_list_info(ValidatorListInfo {
                validator_list: vec!["a".into()],
                block_height: 1,
            })
            .unwrap();
        let err = bridge
            .send_validator_list_info(ValidatorListInfo {
                validator_list: vec!["b".into()],
                block_height: 2,
            })
            .unwrap_err();
        assert_eq!(err, BridgeError::ChannelFull);

        // One receive frees one slot.
        bridge.receive_validator_list_info().await.unwrap();
        bridge
            .send_validator_list_info(ValidatorListInfo {
                validator_list: vec!["b".into()],
                block_height: 2,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_block_backlog_overflow() {
        let bridge = Bridge::new(NoopConverter, true);
        for i in 0..100u8 {
            bridge.send_block_to_node(test_block(BlockType::Eth, &[i])).unwrap();
        }
        let err = bridge
            .send_block_to_node(test_block(BlockType::Eth, b"overflow"))
            .unwrap_err();
        assert_eq!(err, BridgeError::ChannelFull);
    }

    #[tokio::test]
    async fn test_block_routing_by_type() {
        let bridge = Bridge::new(NoopConverter, true);
        bridge
            .send_block_to_node(test_block(BlockType::Eth, b"eth"))
            .unwrap();
        bridge
            .send_block_to_node(test_block(BlockType::BeaconCapella, b"capella"))
            .unwrap();

        let eth = bridge.receive_eth_block_from_bdn().await.unwrap();
        assert_eq!(eth.block_type, BlockType::Eth);
        let beacon = bridge.receive_beacon_block_from_bdn().await.unwrap();
        assert_eq!(beacon.block_type, BlockType::BeaconCapella);
    }

    #[tokio::test]
    async fn test_beacon_block_dropped_without_beacon_source() {
        let bridge = Bridge::new(NoopConverter, false);
        // Success with nothing delivered.
        for i in 0..200u8 {
            bridge
                .send_block_to_node(test_block(BlockType::BeaconBellatrix, &[i]))
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_unknown_block_type_rejected() {
        let bridge = Bridge::new(NoopConverter, true);
        let err = bridge
            .send_block_to_node(test_block(BlockType::Unknown, b"x"))
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnsupportedBlockType { .. }));
    }

    #[tokio::test]
    async fn test_status_round_trip() {
        let bridge = Bridge::new(NoopConverter, true);
        bridge.send_blockchain_status_request().unwrap();
        bridge.receive_blockchain_status_request().await.unwrap();
        bridge
            .send_blockchain_status_response(vec![NodeEndpoint::new("1.2.3.4", 30303)])
            .unwrap();
        let endpoints = bridge.receive_blockchain_status_response().await.unwrap();
        assert_eq!(endpoints[0].port, 30303);
    }
}
