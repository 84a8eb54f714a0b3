//! Node websocket manager used when no `--eth-ws-uri` endpoint was
//! configured: the method catalog is still served so subscribe requests
//! validate consistently, but no provider exists and the feed set is
//! restricted accordingly.

use gateway_types::NodeEndpoint;
use gateway_ws::{NodeRpcError, NodeWsManager, NodeWsProvider, SyncStatus};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

const RPC_CALL_METHODS: [&str; 6] = [
    "eth_call",
    "eth_getBalance",
    "eth_getTransactionCount",
    "eth_getCode",
    "eth_getStorageAt",
    "eth_blockNumber",
];

const RPC_PAYLOAD_FIELDS: [&str; 8] = [
    "data", "from", "to", "gas", "gasPrice", "value", "address", "pos",
];

/// A manager with zero providers.
pub struct DisabledNodeWsManager {
    sync_tx: watch::Sender<SyncStatus>,
}

impl DisabledNodeWsManager {
    #[must_use]
    pub fn new() -> Self {
        let (sync_tx, _) = watch::channel(SyncStatus::Unsynced);
        Self { sync_tx }
    }
}

impl Default for DisabledNodeWsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeWsManager for DisabledNodeWsManager {
    fn provider_count(&self) -> usize {
        0
    }

    fn synced(&self) -> bool {
        false
    }

    fn provider(&self, _endpoint: &NodeEndpoint) -> Option<Arc<dyn NodeWsProvider>> {
        None
    }

    fn synced_provider(&self) -> Option<Arc<dyn NodeWsProvider>> {
        None
    }

    fn valid_rpc_call_methods(&self) -> Vec<String> {
        RPC_CALL_METHODS.iter().map(|s| s.to_string()).collect()
    }

    fn valid_rpc_call_payload_fields(&self) -> Vec<String> {
        RPC_PAYLOAD_FIELDS.iter().map(|s| s.to_string()).collect()
    }

    fn required_payload_fields(&self, method: &str) -> Option<Vec<String>> {
        let fields: &[&str] = match method {
            "eth_call" => &["data"],
            "eth_getBalance" | "eth_getTransactionCount" | "eth_getCode" => &["address"],
            "eth_getStorageAt" => &["address", "pos"],
            "eth_blockNumber" => &[],
            _ => return None,
        };
        Some(fields.iter().map(|s| s.to_string()).collect())
    }

    fn construct_rpc_call_payload(
        &self,
        method: &str,
        payload: &HashMap<String, String>,
        tag: &str,
    ) -> Result<Value, NodeRpcError> {
        let params = match method {
            "eth_call" => json!([payload, tag]),
            "eth_getBalance" | "eth_getTransactionCount" | "eth_getCode" => {
                json!([payload.get("address"), tag])
            }
            "eth_getStorageAt" => json!([payload.get("address"), payload.get("pos"), tag]),
            "eth_blockNumber" => json!([]),
            other => {
                return Err(NodeRpcError::Payload(format!(
                    "unsupported rpc method {other}"
                )))
            }
        };
        Ok(params)
    }

    fn sync_status_updates(&self) -> watch::Receiver<SyncStatus> {
        self.sync_tx.subscribe()
    }
}
