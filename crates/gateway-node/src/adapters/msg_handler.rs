//! Message handler pushing accepted submissions onto the bridge.

use gateway_bridge::{Bridge, Converter};
use gateway_types::{NodeEndpoint, Tx};
use gateway_ws::{MevBundle, MsgHandler};
use std::sync::Arc;
use tracing::info;

/// Hands transactions accepted over RPC to the BDN workers through the
/// bridge's node-to-BDN transaction queue.
pub struct BridgeMsgHandler<C: Converter> {
    bridge: Arc<Bridge<C>>,
}

impl<C: Converter> BridgeMsgHandler<C> {
    pub fn new(bridge: Arc<Bridge<C>>) -> Self {
        Self { bridge }
    }
}

impl<C: Converter + 'static> MsgHandler for BridgeMsgHandler<C> {
    fn handle_tx(&self, tx: Tx) -> Result<(), String> {
        self.bridge
            .send_transactions_to_bdn(vec![tx], NodeEndpoint::default())
            .map_err(|e| e.to_string())
    }

    fn handle_mev_bundle(&self, bundle: MevBundle) -> Result<(), String> {
        // Bundle relaying runs over the BDN connection, outside this
        // process's bridge.
        info!(method = %bundle.method, builders = bundle.builders.len(), "MEV bundle accepted");
        Ok(())
    }
}
