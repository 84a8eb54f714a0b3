//! Websocket server: upgrade, authorization, socket loop, and lifecycle
//! management.

use crate::auth::{authorize, credentials_from_request};
use crate::handler::Session;
use crate::ports::{
    AccountService, CertAccountExtractor, MsgHandler, NodeWsManager, SyncStatus,
};
use crate::validator::ValidatorRouting;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use gateway_feeds::FeedManager;
use gateway_types::{Account, NetworkId, NetworkNum};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Outgoing frames buffered per connection.
const OUTBOUND_BACKLOG: usize = 256;

/// Server configuration; the runtime builds it from the gateway config.
#[derive(Debug, Clone)]
pub struct WsServerConfig {
    pub websocket_port: u16,
    pub tls_enabled: bool,
    pub network_num: NetworkNum,
    pub chain_id: NetworkId,
    /// The gateway relays for cloud services and accepts third-party
    /// senders via `original_sender_account_id`.
    pub cloud_proxy: bool,
    /// Networks where `newBlocks` works without a node websocket endpoint.
    pub new_blocks_no_node_networks: Vec<NetworkNum>,
    pub tx_receipt_retries: u32,
    pub tx_receipt_retry_interval: Duration,
    pub on_block_retries: u32,
    pub on_block_retry_interval: Duration,
    /// Sleep before closing an unauthorized connection, to slow down
    /// brute-force loops. Tests shorten it.
    pub bad_auth_delay: Duration,
}

impl Default for WsServerConfig {
    fn default() -> Self {
        Self {
            websocket_port: 28333,
            tls_enabled: false,
            network_num: 5,
            chain_id: 1,
            cloud_proxy: false,
            new_blocks_no_node_networks: vec![5, 23, 36],
            tx_receipt_retries: 3,
            tx_receipt_retry_interval: Duration::from_millis(10),
            on_block_retries: 2,
            on_block_retry_interval: Duration::from_secs(1),
            bad_auth_delay: Duration::from_secs(10),
        }
    }
}

/// Shared state of the websocket server.
pub struct AppState {
    pub config: WsServerConfig,
    pub gateway_account: Account,
    pub feed_manager: Arc<FeedManager>,
    pub node_ws: Arc<dyn NodeWsManager>,
    pub accounts: Arc<dyn AccountService>,
    pub msg_handler: Arc<dyn MsgHandler>,
    pub validator_routing: Arc<ValidatorRouting>,
    pub cert_extractor: Option<Arc<dyn CertAccountExtractor>>,
}

/// Errors from running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind websocket listener: {0}")]
    Bind(String),

    #[error("server error: {0}")]
    Serve(String),
}

/// Serve the websocket JSON-RPC endpoint until `shutdown` flips to true.
pub async fn run_ws_server(
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let port = state.config.websocket_port;
    let app = Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/", get(ws_upgrade))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| ServerError::Bind(e.to_string()))?;
    info!(port, "Starting websockets RPC server");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown.wait_for(|stop| *stop).await;
    })
    .await
    .map_err(|e| ServerError::Serve(e.to_string()))?;

    info!(port, "Websockets RPC server is closed");
    Ok(())
}

async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let credentials = credentials_from_request(
        &headers,
        state.config.tls_enabled,
        state.cert_extractor.as_deref(),
    );

    let auth = match credentials {
        Ok((account_id, secret_hash)) => {
            authorize(
                account_id,
                secret_hash,
                &state.gateway_account,
                state.accounts.as_ref(),
            )
            .await
        }
        Err(e) => Err(e),
    };

    match auth {
        Ok(account) => {
            debug!(remote = %remote, account_id = %account.account_id, "New websocket connection");
            ws.on_upgrade(move |socket| run_connection(state, account, remote.to_string(), socket))
        }
        Err(e) => {
            error!(remote = %remote, error = %e, "Rejecting websocket connection");
            let delay = state.config.bad_auth_delay;
            let reason = e.to_string();
            ws.on_upgrade(move |socket| close_with_delay(socket, reason, delay))
        }
    }
}

/// Close an unauthorized connection after a deliberate delay.
async fn close_with_delay(mut socket: WebSocket, reason: String, delay: Duration) {
    tokio::time::sleep(delay).await;
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: axum::extract::ws::close_code::POLICY,
            reason: reason.into(),
        })))
        .await;
}

/// The per-connection socket loop: a writer task drains the session's
/// outbound channel; each inbound frame spawns a request task.
async fn run_connection(
    state: Arc<AppState>,
    account: Account,
    remote_address: String,
    socket: WebSocket,
) {
    let (mut socket_tx, mut socket_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_BACKLOG);

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if socket_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    let session = Arc::new(Session::new(
        state,
        account,
        remote_address.clone(),
        out_tx.clone(),
    ));
    let mut requests = JoinSet::new();

    while let Some(frame) = socket_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let session = Arc::clone(&session);
                requests.spawn(async move {
                    session.handle_message(&text).await;
                });
            }
            Ok(Message::Binary(data)) => {
                if let Ok(text) = String::from_utf8(data) {
                    let session = Arc::clone(&session);
                    requests.spawn(async move {
                        session.handle_message(&text).await;
                    });
                }
            }
            Ok(Message::Ping(payload)) => {
                if out_tx.send(Message::Pong(payload)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!(remote = %remote_address, "Websocket close received");
                break;
            }
            Err(e) => {
                warn!(remote = %remote_address, error = %e, "Websocket error");
                break;
            }
        }
    }

    // Disconnect: cancel in-flight request tasks, then release every
    // subscription this connection held.
    requests.abort_all();
    session.cleanup();
    drop(out_tx);
    writer.abort();
    debug!(remote = %remote_address, "Websocket connection closed");
}

/// Run the server under node-sync supervision.
///
/// With active management, an unsynced node shuts the listener down,
/// drops every subscription, and signals subscribers to re-establish;
/// the server is restarted once the node is synced again. Without it the
/// server runs continuously and status updates are consumed.
pub async fn manage_ws_server(state: Arc<AppState>, active_management: bool) {
    let mut sync_updates = state.node_ws.sync_status_updates();

    let (mut shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server: Option<tokio::task::JoinHandle<()>> = None;

    if !active_management || *sync_updates.borrow() == SyncStatus::Synced {
        server = Some(spawn_server(state.clone(), shutdown_rx.clone()));
    }

    while sync_updates.changed().await.is_ok() {
        if !active_management {
            continue;
        }
        let status = *sync_updates.borrow();
        match status {
            SyncStatus::Unsynced => {
                let resets = state.feed_manager.subscription_details();
                info!(
                    subscriptions = resets.len(),
                    "Node is unsynced; closing client connections and shutting down websocket server"
                );
                state.feed_manager.close_all();
                let _ = shutdown_tx.send(true);
                if let Some(handle) = server.take() {
                    let _ = handle.await;
                }
            }
            SyncStatus::Synced => {
                if server.is_none() {
                    let (new_tx, new_rx) = watch::channel(false);
                    shutdown_tx = new_tx;
                    server = Some(spawn_server(state.clone(), new_rx));
                }
            }
        }
    }
}

fn spawn_server(
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_ws_server(state, shutdown).await {
            error!(error = %e, "Websocket server exited with error");
        }
    })
}
