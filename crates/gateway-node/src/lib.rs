//! # Gateway Runtime
//!
//! Wires the bridge, block processor, feed manager, and websocket server
//! into one process.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod config;
pub mod relay;

pub use config::GatewayConfig;

use crate::adapters::{BridgeMsgHandler, DisabledNodeWsManager, EthConverter, LocalAccountService};
use gateway_bridge::Bridge;
use gateway_feeds::FeedManager;
use gateway_processor::{BlockProcessor, MemoryTxStore};
use gateway_ws::{manage_ws_server, AppState, ValidatorRouting};
use std::sync::Arc;
use tracing::info;

/// The assembled gateway.
pub struct GatewayRuntime {
    config: GatewayConfig,
    bridge: Arc<Bridge<EthConverter>>,
    tx_store: Arc<MemoryTxStore>,
    processor: Arc<BlockProcessor>,
    feed_manager: Arc<FeedManager>,
    state: Arc<AppState>,
}

impl GatewayRuntime {
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        let bridge = Arc::new(Bridge::new(
            EthConverter {
                network_num: config.network_num,
            },
            config.beacon_block,
        ));
        let tx_store = Arc::new(MemoryTxStore::new());
        let processor = Arc::new(BlockProcessor::new(tx_store.clone()));
        let feed_manager = Arc::new(FeedManager::new());
        let gateway_account = config.gateway_account();

        let state = Arc::new(AppState {
            config: config.ws_server_config(),
            gateway_account: gateway_account.clone(),
            feed_manager: feed_manager.clone(),
            node_ws: Arc::new(DisabledNodeWsManager::new()),
            accounts: Arc::new(LocalAccountService::new(gateway_account)),
            msg_handler: Arc::new(BridgeMsgHandler::new(bridge.clone())),
            validator_routing: Arc::new(ValidatorRouting::new()),
            cert_extractor: None,
        });

        Self {
            config,
            bridge,
            tx_store,
            processor,
            feed_manager,
            state,
        }
    }

    pub fn bridge(&self) -> &Arc<Bridge<EthConverter>> {
        &self.bridge
    }

    pub fn tx_store(&self) -> &Arc<MemoryTxStore> {
        &self.tx_store
    }

    pub fn feed_manager(&self) -> &Arc<FeedManager> {
        &self.feed_manager
    }

    /// Spawn every worker: the processed-set sweeper, the bridge relays,
    /// and the websocket server under sync management.
    pub fn start(&self) {
        self.processor.processed_blocks().spawn_sweeper();

        tokio::spawn(relay::run_tx_relay(
            self.bridge.clone(),
            self.feed_manager.clone(),
        ));
        tokio::spawn(relay::run_block_relay(
            self.bridge.clone(),
            self.processor.clone(),
            self.config.network_num,
            self.config.min_tx_age,
        ));
        tokio::spawn(manage_ws_server(self.state.clone(), false));

        info!(
            port = self.config.websocket_port,
            network_num = self.config.network_num,
            chain_id = self.config.chain_id,
            "Gateway runtime started"
        );
    }

    /// Close all client subscriptions.
    pub fn shutdown(&self) {
        info!("Shutting down gateway runtime");
        self.feed_manager.close_all();
    }
}
