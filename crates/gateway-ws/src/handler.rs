//! Per-connection JSON-RPC session.
//!
//! One [`Session`] serves one websocket connection. The socket loop feeds
//! frames into [`Session::handle_message`]; each request runs as its own
//! task so long-lived `subscribe` handlers never block the next request.

use crate::jsonrpc::{error_response, result_response, RpcErrorCode, RpcRequest};
use crate::server::AppState;
use axum::extract::ws::Message;
use dashmap::DashMap;
use gateway_feeds::notification::microsecond_timestamp;
use gateway_types::Account;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

/// The outbound side of the connection went away.
#[derive(Debug, Clone, Copy)]
pub struct SessionClosed;

/// One authenticated JSON-RPC session over a websocket connection.
pub struct Session {
    pub(crate) state: Arc<AppState>,
    pub(crate) account: Account,
    pub(crate) remote_address: String,
    out: mpsc::Sender<Message>,
    /// Subscriptions opened on this connection, for disconnect cleanup.
    subs: Arc<DashMap<Uuid, ()>>,
}

impl Session {
    pub fn new(
        state: Arc<AppState>,
        account: Account,
        remote_address: String,
        out: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            state,
            account,
            remote_address,
            out,
            subs: Arc::new(DashMap::new()),
        }
    }

    /// Handle one request frame. Runs to completion; `subscribe` requests
    /// stay inside until the subscription ends.
    pub async fn handle_message(&self, text: &str) {
        let start = Instant::now();
        let request = match RpcRequest::parse(text) {
            Ok(request) => request,
            Err(e) => {
                let _ = self
                    .send_text(error_response(None, RpcErrorCode::InvalidRequest, &e))
                    .await;
                return;
            }
        };

        let method = request.method.clone();
        match method.as_str() {
            "subscribe" => self.handle_subscribe(&request).await,
            "unsubscribe" => self.handle_unsubscribe(&request).await,
            "blxr_tx" => self.handle_tx(&request).await,
            "blxr_batch_tx" => self.handle_batch_tx(&request).await,
            "blxr_mev_searcher" => self.handle_mev_searcher(&request).await,
            "ping" => self.handle_ping(&request).await,
            "quota_usage" => self.handle_quota_usage(&request).await,
            other => {
                self.send_error(
                    request.id.as_ref(),
                    RpcErrorCode::MethodNotFound,
                    &format!("got unsupported method name: {other}"),
                )
                .await;
            }
        }
        debug!(
            method = %method,
            duration = ?start.elapsed(),
            remote = %self.remote_address,
            "Websocket request handled"
        );
    }

    /// Remove every subscription this connection opened. Called by the
    /// socket loop on disconnect.
    pub fn cleanup(&self) {
        for entry in self.subs.iter() {
            self.state.feed_manager.unsubscribe(entry.key());
        }
        self.subs.clear();
    }

    pub(crate) fn track_subscription(&self, id: Uuid) {
        self.subs.insert(id, ());
    }

    pub(crate) fn untrack_subscription(&self, id: &Uuid) {
        self.subs.remove(id);
    }

    pub(crate) async fn send_text(&self, text: String) -> Result<(), SessionClosed> {
        self.out
            .send(Message::Text(text))
            .await
            .map_err(|_| SessionClosed)
    }

    pub(crate) async fn reply(
        &self,
        id: Option<&Value>,
        result: Value,
    ) -> Result<(), SessionClosed> {
        self.send_text(result_response(id, result)).await
    }

    pub(crate) async fn send_error(&self, id: Option<&Value>, code: RpcErrorCode, detail: &str) {
        if self
            .send_text(error_response(id, code, detail))
            .await
            .is_err()
        {
            error!(remote = %self.remote_address, "Could not respond to client with error message");
        }
    }

    async fn handle_ping(&self, request: &RpcRequest) {
        let _ = self
            .reply(request.id.as_ref(), json!({"pong": microsecond_timestamp()}))
            .await;
    }

    async fn handle_unsubscribe(&self, request: &RpcRequest) {
        let Some(params) = request.params.as_ref() else {
            self.send_error(
                request.id.as_ref(),
                RpcErrorCode::InvalidParams,
                "params is missing in the request",
            )
            .await;
            return;
        };
        let ids: Vec<String> = serde_json::from_value(params.clone()).unwrap_or_default();
        if ids.len() != 1 {
            self.send_error(
                request.id.as_ref(),
                RpcErrorCode::InvalidParams,
                &format!("params {ids:?} with incorrect length"),
            )
            .await;
            return;
        }

        let id = Uuid::parse_str(&ids[0]).unwrap_or_default();
        if !self.state.feed_manager.unsubscribe(&id) {
            debug!(subscription_id = %id, "Subscription id was not found");
            if self.reply(request.id.as_ref(), json!("false")).await.is_err() {
                return;
            }
        } else {
            self.untrack_subscription(&id);
        }
        let _ = self.reply(request.id.as_ref(), json!("true")).await;
    }

    async fn handle_quota_usage(&self, request: &RpcRequest) {
        match self
            .state
            .accounts
            .quota_usage(&self.account.account_id)
            .await
        {
            Ok(quota) => {
                let _ = self.reply(request.id.as_ref(), quota).await;
            }
            Err(e) => {
                self.send_error(
                    request.id.as_ref(),
                    RpcErrorCode::MethodNotFound,
                    &format!("failed to fetch quota usage: {e}"),
                )
                .await;
            }
        }
    }
}
