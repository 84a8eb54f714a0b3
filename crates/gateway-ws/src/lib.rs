//! # Gateway Websocket RPC
//!
//! The JSON-RPC-over-websocket surface of the gateway: one asynchronous
//! session per connection, authorized at upgrade time, serving
//! `subscribe`/`unsubscribe`, transaction and bundle submission, `ping`,
//! and `quota_usage`.
//!
//! External collaborators — the blockchain node's websocket RPC, the SDN
//! account service, the gateway's message pipeline, and TLS certificate
//! material — are reached through the ports in [`ports`].

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod auth;
pub mod handler;
pub mod jsonrpc;
pub mod ports;
pub mod server;
pub mod submit;
pub mod subscribe;
pub mod validator;

pub use handler::Session;
pub use jsonrpc::{RpcErrorCode, RpcRequest};
pub use ports::{
    AccountService, AccountServiceError, CertAccountExtractor, MevBundle, MsgHandler,
    NodeRpcError, NodeWsManager, NodeWsProvider, RpcCallOptions, SyncStatus,
};
pub use server::{manage_ws_server, run_ws_server, AppState, ServerError, WsServerConfig};
pub use submit::TxSubmission;
pub use validator::{
    ValidatorError, ValidatorRouting, BSC_BLOCK_INTERVAL, BSC_MAINNET_NUM, POLYGON_MAINNET_NUM,
};
