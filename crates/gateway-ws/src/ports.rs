//! Outbound ports of the client handler: the blockchain node's websocket
//! RPC surface, the SDN account service, and the gateway message handler.

use async_trait::async_trait;
use axum::http::HeaderMap;
use gateway_types::{Account, AccountId, NodeEndpoint, Tx};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Sync state of a blockchain node connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Synced,
    Unsynced,
}

/// Retry policy for one node RPC call.
#[derive(Debug, Clone, Copy)]
pub struct RpcCallOptions {
    pub retry_attempts: u32,
    pub retry_interval: Duration,
}

/// Errors from node RPC calls.
#[derive(Debug, Clone, Error)]
pub enum NodeRpcError {
    #[error("rpc call failed: {0}")]
    Call(String),

    #[error("no synced websocket provider available")]
    NoSyncedProvider,

    #[error("invalid rpc payload: {0}")]
    Payload(String),
}

/// One websocket connection to a blockchain node.
#[async_trait]
pub trait NodeWsProvider: Send + Sync {
    async fn fetch_transaction_receipt(
        &self,
        tx_hash: &str,
        options: RpcCallOptions,
    ) -> Result<Value, NodeRpcError>;

    async fn call_rpc(
        &self,
        method: &str,
        payload: Value,
        options: RpcCallOptions,
    ) -> Result<Value, NodeRpcError>;

    async fn send_transaction(
        &self,
        raw_tx: String,
        options: RpcCallOptions,
    ) -> Result<Value, NodeRpcError>;

    fn sync_status(&self) -> SyncStatus;
}

/// The set of node websocket connections the gateway manages.
pub trait NodeWsManager: Send + Sync {
    /// Number of configured providers; zero restricts the feed set.
    fn provider_count(&self) -> usize;

    /// Whether any provider is synced.
    fn synced(&self) -> bool;

    fn provider(&self, endpoint: &NodeEndpoint) -> Option<Arc<dyn NodeWsProvider>>;

    fn synced_provider(&self) -> Option<Arc<dyn NodeWsProvider>>;

    fn valid_rpc_call_methods(&self) -> Vec<String>;

    fn valid_rpc_call_payload_fields(&self) -> Vec<String>;

    /// Payload fields a given RPC method requires, `None` for unknown methods.
    fn required_payload_fields(&self, method: &str) -> Option<Vec<String>>;

    fn construct_rpc_call_payload(
        &self,
        method: &str,
        payload: &HashMap<String, String>,
        tag: &str,
    ) -> Result<Value, NodeRpcError>;

    /// Stream of aggregate sync-status transitions, used by active server
    /// management.
    fn sync_status_updates(&self) -> watch::Receiver<SyncStatus>;
}

/// Errors from the SDN account service.
#[derive(Debug, Clone, Error)]
pub enum AccountServiceError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("account service error: {0}")]
    Other(String),
}

/// The SDN account/authorization service.
#[async_trait]
pub trait AccountService: Send + Sync {
    async fn customer_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Account, AccountServiceError>;

    async fn quota_usage(&self, account_id: &AccountId) -> Result<Value, AccountServiceError>;
}

/// An MEV bundle submission.
#[derive(Debug, Clone)]
pub struct MevBundle {
    pub method: String,
    pub builders: HashMap<String, String>,
    pub uuid: String,
    pub frontrunning: bool,
    pub effective_gas_price: Option<serde_json::Number>,
    pub coinbase_profit: Option<serde_json::Number>,
    pub payload: Value,
}

/// Foreground handoff into the gateway's message pipeline. Implementations
/// enqueue internally; calls must not block on network progress.
pub trait MsgHandler: Send + Sync {
    fn handle_tx(&self, tx: Tx) -> Result<(), String>;
    fn handle_mev_bundle(&self, bundle: MevBundle) -> Result<(), String>;
}

/// Extraction of an account ID from connection-level TLS material. The TLS
/// terminator runs outside the gateway core and surfaces the client
/// certificate's account extension through request headers.
pub trait CertAccountExtractor: Send + Sync {
    fn account_from_headers(&self, headers: &HeaderMap) -> Option<AccountId>;
}
