//! Subscription request construction and per-feed delivery loops.

use crate::handler::Session;
use crate::jsonrpc::{subscribe_notification, RpcErrorCode, RpcRequest};
use crate::ports::{NodeWsProvider, RpcCallOptions};
use gateway_feeds::feed::{default_params, valid_params, TX_CONTENT_FIELDS};
use gateway_feeds::filter::{self, FilterExpr};
use gateway_feeds::manager::Subscription;
use gateway_feeds::notification::{
    EthBlockNotification, Notification, OnBlockNotification, TxNotification,
    TxReceiptNotification, TASK_COMPLETED_EVENT, TASK_DISABLED_EVENT,
};
use gateway_feeds::FeedType;
use gateway_types::FeedEntitlement;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Transactions coalesced into one notify under `MultiTxs`.
const MULTI_TXS_BATCH_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
struct SubscriptionOptions {
    #[serde(rename = "Include")]
    include: Option<Vec<String>>,
    #[serde(rename = "Filters", default)]
    filters: String,
    #[serde(rename = "Call-Params", default)]
    call_params: Vec<HashMap<String, String>>,
    #[serde(rename = "MultiTxs", default)]
    multi_txs: bool,
}

/// A customer call executed against the node for every `onBlock` round.
#[derive(Debug, Clone)]
pub(crate) struct RpcCall {
    pub name: String,
    pub method: String,
    /// Offset relative to the notifying block; zero means "latest".
    pub block_offset: i64,
    pub payload: HashMap<String, String>,
    pub active: bool,
}

impl RpcCall {
    fn describe(&self) -> String {
        format!(
            "{{callName: {}, commandMethod: {}, blockOffset: {}, callPayload: {}}}",
            self.name,
            self.method,
            self.block_offset,
            serde_json::to_string(&self.payload).unwrap_or_else(|_| self.name.clone()),
        )
    }
}

/// A validated subscribe request.
pub(crate) struct ClientReq {
    pub feed: FeedType,
    pub includes: Vec<String>,
    pub expr: Option<FilterExpr>,
    pub calls: Arc<Mutex<HashMap<String, RpcCall>>>,
    pub multi_txs: bool,
}

impl Session {
    pub(crate) async fn handle_subscribe(&self, request: &RpcRequest) {
        let req = match self.build_client_request(request.params.as_ref()) {
            Ok(req) => req,
            Err(detail) => {
                self.send_error(request.id.as_ref(), RpcErrorCode::InvalidParams, &detail)
                    .await;
                return;
            }
        };

        if self.state.node_ws.provider_count() == 0 && !self.feed_allowed_without_node(req.feed) {
            self.send_error(
                request.id.as_ref(),
                RpcErrorCode::InvalidParams,
                &format!(
                    "{} feed requires a websockets endpoint to be specified via either --eth-ws-uri or --multi-node startup parameter",
                    req.feed
                ),
            )
            .await;
            return;
        }

        let filters = req
            .expr
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_default();
        let sub = self.state.feed_manager.subscribe(
            req.feed,
            self.account.account_id.clone(),
            self.account.tier,
            self.remote_address.clone(),
            req.includes.clone(),
            filters.clone(),
        );
        let subscription_id = sub.details.id;
        self.track_subscription(subscription_id);

        if self
            .reply(request.id.as_ref(), json!(subscription_id.to_string()))
            .await
            .is_err()
        {
            self.state.feed_manager.unsubscribe(&subscription_id);
            self.untrack_subscription(&subscription_id);
            return;
        }
        info!(
            subscription_id = %subscription_id,
            account_id = %self.account.account_id,
            feed = %req.feed,
            remote = %self.remote_address,
            filters = %filters,
            "Subscription opened"
        );

        if req.multi_txs {
            if !req.feed.is_tx_feed() {
                self.send_error(
                    request.id.as_ref(),
                    RpcErrorCode::InvalidParams,
                    "multi tx support only in new txs or pending txs",
                )
                .await;
            } else {
                self.run_multi_tx_loop(sub, &req, request).await;
            }
        } else {
            match req.feed {
                FeedType::NewTxs | FeedType::PendingTxs => {
                    self.run_tx_loop(sub, &req, request).await;
                }
                FeedType::TxReceipts => self.run_receipts_loop(sub, &req, request).await,
                FeedType::OnBlock => self.run_on_block_loop(sub, &req, request).await,
                _ => self.run_block_loop(sub, &req, request).await,
            }
        }

        self.state.feed_manager.unsubscribe(&subscription_id);
        self.untrack_subscription(&subscription_id);
    }

    fn feed_allowed_without_node(&self, feed: FeedType) -> bool {
        match feed {
            FeedType::NewTxs
            | FeedType::BdnBlocks
            | FeedType::NewBeaconBlocks
            | FeedType::BdnBeaconBlocks => true,
            // Blocks in consensus do not come from the node websocket on
            // these networks.
            FeedType::NewBlocks => self
                .state
                .config
                .new_blocks_no_node_networks
                .contains(&self.state.config.network_num),
            _ => false,
        }
    }

    pub(crate) fn build_client_request(
        &self,
        params: Option<&Value>,
    ) -> Result<ClientReq, String> {
        let params = params.ok_or("invalid json request: params is a required field")?;
        let arr = params
            .as_array()
            .ok_or_else(|| format!("expected param array, got: {params}"))?;
        if arr.len() < 2 {
            return Err(format!(
                "number of params must be at least length 2. requested params: {params}"
            ));
        }

        let feed: FeedType = serde_json::from_value(arr[0].clone()).map_err(|_| {
            format!(
                "got unsupported feed name {}. possible feeds are {:?}",
                arr[0],
                FeedType::ALL.map(|f| f.to_string()),
            )
        })?;

        if self.account.account_id != self.state.gateway_account.account_id
            && matches!(feed, FeedType::OnBlock | FeedType::TxReceipts)
        {
            let detail = format!(
                "{feed} feed is not available via cloud services. {feed} feed is only supported on gateways"
            );
            error!(
                account_id = %self.account.account_id,
                gateway_account = %self.state.gateway_account.account_id,
                "{detail}"
            );
            return Err(detail);
        }

        let options: SubscriptionOptions =
            serde_json::from_value(arr[1].clone()).map_err(|e| e.to_string())?;
        let include = options
            .include
            .ok_or_else(|| format!("got unsupported params {}", arr[1]))?;

        let mut includes: Vec<String> = if include.is_empty() {
            default_params(feed).iter().map(|s| s.to_string()).collect()
        } else {
            Vec::new()
        };
        for param in &include {
            if !valid_params(feed).contains(&param.as_str()) {
                return Err(format!("got unsupported param {param}"));
            }
            if param == "tx_contents" {
                includes.extend(TX_CONTENT_FIELDS.iter().map(|s| s.to_string()));
            }
            includes.push(param.clone());
        }

        let expr = if options.filters.is_empty() {
            None
        } else {
            let expr = filter::parse(&options.filters)
                .map_err(|e| format!("error parsing Filters: {e}"))?;
            filter::validate(&expr).map_err(|e| format!("error evaluating Filters: {e}"))?;
            Some(expr)
        };

        let entitlement = self.feed_entitlement(feed);
        let filter_fields = expr.as_ref().map(FilterExpr::fields).unwrap_or_default();
        validate_feed(feed, entitlement, &includes, &filter_fields)?;

        let mut calls = HashMap::new();
        if feed == FeedType::OnBlock {
            for (idx, call_params) in options.call_params.iter().enumerate() {
                let call = self.build_rpc_call(idx, call_params, &calls)?;
                calls.insert(call.name.clone(), call);
            }
        }

        Ok(ClientReq {
            feed,
            includes,
            expr,
            calls: Arc::new(Mutex::new(calls)),
            multi_txs: options.multi_txs,
        })
    }

    fn feed_entitlement(&self, feed: FeedType) -> &FeedEntitlement {
        match feed {
            FeedType::NewTxs => &self.account.new_transaction_streaming,
            FeedType::PendingTxs => &self.account.pending_transaction_streaming,
            FeedType::OnBlock => &self.account.on_block_feed,
            FeedType::TxReceipts => &self.account.transaction_receipt_feed,
            _ => &self.account.new_block_streaming,
        }
    }

    fn build_rpc_call(
        &self,
        idx: usize,
        call_params: &HashMap<String, String>,
        existing: &HashMap<String, RpcCall>,
    ) -> Result<RpcCall, String> {
        let node_ws = &self.state.node_ws;
        let mut call = RpcCall {
            name: idx.to_string(),
            method: String::new(),
            block_offset: 0,
            payload: HashMap::new(),
            active: true,
        };

        for (param, value) in call_params {
            match param.as_str() {
                "method" => {
                    let methods = node_ws.valid_rpc_call_methods();
                    if !methods.iter().any(|m| m == value) {
                        return Err(format!(
                            "invalid method {value} provided. Supported methods: {methods:?}"
                        ));
                    }
                    call.method = value.clone();
                }
                "tag" => {
                    if value == "latest" {
                        call.block_offset = 0;
                        continue;
                    }
                    let offset: i64 = value.parse().map_err(|_| {
                        format!(
                            "invalid value {value} provided for tag. Supported values: latest, 0 or a negative number"
                        )
                    })?;
                    if offset > 0 {
                        return Err(format!(
                            "invalid value {value} provided for tag. Supported values: latest, 0 or a negative number"
                        ));
                    }
                    call.block_offset = offset;
                }
                "name" => {
                    if existing.contains_key(value) {
                        return Err(format!(
                            "unique name must be provided for each call: call {value} already exists"
                        ));
                    }
                    call.name = value.clone();
                }
                _ => {
                    let fields = node_ws.valid_rpc_call_payload_fields();
                    if !fields.iter().any(|f| f == param) {
                        return Err(format!(
                            "invalid payload field {param} provided. Supported fields: {fields:?}"
                        ));
                    }
                    call.payload.insert(param.clone(), value.clone());
                }
            }
        }

        let required = node_ws.required_payload_fields(&call.method).ok_or_else(|| {
            format!(
                "unexpectedly, unable to find required fields for method {}",
                call.method
            )
        })?;
        for field in required {
            if !call.payload.contains_key(&field) {
                return Err(format!(
                    "expected {field} element in request payload for {}",
                    call.method
                ));
            }
        }
        Ok(call)
    }

    /// Apply the subscription's filter and include list to one transaction.
    fn filter_and_include(&self, req: &ClientReq, tx: &TxNotification) -> Option<Value> {
        if let Some(expr) = &req.expr {
            let fields = tx.filter_map();
            match filter::eval(expr, &fields) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    error!(
                        feed = %req.feed,
                        remote = %self.remote_address,
                        account_id = %self.account.account_id,
                        error = %e,
                        "Error evaluating filters; notification dropped"
                    );
                    return None;
                }
            }
        }
        Some(tx.tx_result(&req.includes))
    }

    async fn notify_subscriber(
        &self,
        subscription_id: &uuid::Uuid,
        result: Value,
    ) -> Result<(), crate::handler::SessionClosed> {
        self.send_text(subscribe_notification(json!({
            "subscription": subscription_id.to_string(),
            "result": result,
        })))
        .await
    }

    async fn run_tx_loop(&self, mut sub: Subscription, req: &ClientReq, request: &RpcRequest) {
        let subscription_id = sub.details.id;
        loop {
            tokio::select! {
                error_msg = sub.errors.recv() => {
                    let Some(detail) = error_msg else { return };
                    self.send_error(request.id.as_ref(), RpcErrorCode::InvalidParams, &detail).await;
                    return;
                }
                notification = sub.notifications.recv() => {
                    let Some(notification) = notification else {
                        self.notify_feed_closed(&subscription_id, request).await;
                        return;
                    };
                    let (Notification::NewTx(tx) | Notification::PendingTx(tx)) = &notification
                    else {
                        continue;
                    };
                    if let Some(result) = self.filter_and_include(req, tx) {
                        if self.notify_subscriber(&subscription_id, result).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn run_multi_tx_loop(
        &self,
        mut sub: Subscription,
        req: &ClientReq,
        request: &RpcRequest,
    ) {
        let subscription_id = sub.details.id;
        loop {
            tokio::select! {
                error_msg = sub.errors.recv() => {
                    let Some(detail) = error_msg else { return };
                    self.send_error(request.id.as_ref(), RpcErrorCode::InvalidParams, &detail).await;
                    return;
                }
                notification = sub.notifications.recv() => {
                    let Some(notification) = notification else {
                        self.notify_feed_closed(&subscription_id, request).await;
                        return;
                    };
                    let mut results = Vec::new();
                    if let (Notification::NewTx(tx) | Notification::PendingTx(tx)) = &notification {
                        if let Some(result) = self.filter_and_include(req, tx) {
                            results.push(result);
                        }
                    }
                    // Drain whatever is immediately available, flush at the
                    // batch limit.
                    let mut closed = false;
                    while results.len() < MULTI_TXS_BATCH_LIMIT {
                        match sub.notifications.try_recv() {
                            Ok(Notification::NewTx(tx) | Notification::PendingTx(tx)) => {
                                if let Some(result) = self.filter_and_include(req, &tx) {
                                    results.push(result);
                                }
                            }
                            Ok(_) => {}
                            Err(tokio::sync::mpsc::error::TryRecvError::Empty) => break,
                            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => {
                                closed = true;
                                break;
                            }
                        }
                    }
                    if !results.is_empty() {
                        let notify = subscribe_notification(json!({
                            "subscription": subscription_id.to_string(),
                            "result": results,
                        }));
                        if self.send_text(notify).await.is_err() {
                            return;
                        }
                    }
                    if closed {
                        self.notify_feed_closed(&subscription_id, request).await;
                        return;
                    }
                }
            }
        }
    }

    async fn run_block_loop(&self, mut sub: Subscription, req: &ClientReq, request: &RpcRequest) {
        let subscription_id = sub.details.id;
        loop {
            tokio::select! {
                error_msg = sub.errors.recv() => {
                    let Some(detail) = error_msg else { return };
                    self.send_error(request.id.as_ref(), RpcErrorCode::InvalidParams, &detail).await;
                    return;
                }
                notification = sub.notifications.recv() => {
                    let Some(notification) = notification else {
                        self.notify_feed_closed(&subscription_id, request).await;
                        return;
                    };
                    let result = notification.with_fields(&req.includes);
                    if self.notify_subscriber(&subscription_id, result).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    async fn run_receipts_loop(
        &self,
        mut sub: Subscription,
        req: &ClientReq,
        request: &RpcRequest,
    ) {
        let subscription_id = sub.details.id;
        let options = RpcCallOptions {
            retry_attempts: self.state.config.tx_receipt_retries,
            retry_interval: self.state.config.tx_receipt_retry_interval,
        };
        loop {
            tokio::select! {
                error_msg = sub.errors.recv() => {
                    let Some(detail) = error_msg else { return };
                    self.send_error(request.id.as_ref(), RpcErrorCode::InvalidParams, &detail).await;
                    return;
                }
                notification = sub.notifications.recv() => {
                    let Some(notification) = notification else {
                        self.notify_feed_closed(&subscription_id, request).await;
                        return;
                    };
                    let Notification::EthBlock(block) = &notification else { continue };
                    let Some(provider) = self.synced_provider_for(block) else { return };

                    // One concurrent fetch per transaction; the whole fan-out
                    // completes before the next block is accepted.
                    let fetches = block.transactions.iter().map(|tx| {
                        let provider = Arc::clone(&provider);
                        let hash = tx
                            .get("hash")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        async move {
                            let receipt = provider
                                .fetch_transaction_receipt(&hash, options)
                                .await
                                .map_err(|e| (hash.clone(), e.to_string()))?;
                            Ok::<_, (String, String)>(receipt)
                        }
                    });
                    let results = futures::future::join_all(fetches).await;

                    let mut failed = false;
                    for result in results {
                        match result {
                            Ok(receipt) => {
                                let projected =
                                    TxReceiptNotification(receipt).with_fields(&req.includes);
                                if self
                                    .notify_subscriber(&subscription_id, projected)
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                            Err((hash, e)) => {
                                debug!(
                                    tx_hash = %hash,
                                    block_hash = %block.block_hash,
                                    error = %e,
                                    "Failed to fetch transaction receipt"
                                );
                                failed = true;
                            }
                        }
                    }
                    if failed {
                        return;
                    }
                    debug!(block_hash = %block.block_hash, "Finished fetching transaction receipts");
                }
            }
        }
    }

    async fn run_on_block_loop(
        &self,
        mut sub: Subscription,
        req: &ClientReq,
        request: &RpcRequest,
    ) {
        let subscription_id = sub.details.id;
        let options = RpcCallOptions {
            retry_attempts: self.state.config.on_block_retries,
            retry_interval: self.state.config.on_block_retry_interval,
        };
        loop {
            tokio::select! {
                error_msg = sub.errors.recv() => {
                    let Some(detail) = error_msg else { return };
                    self.send_error(request.id.as_ref(), RpcErrorCode::InvalidParams, &detail).await;
                    return;
                }
                notification = sub.notifications.recv() => {
                    let Some(notification) = notification else {
                        self.notify_feed_closed(&subscription_id, request).await;
                        return;
                    };
                    let Notification::EthBlock(block) = &notification else { continue };
                    let Some(provider) = self.synced_provider_for(block) else { return };

                    let block_height = format!("{:#x}", block.number);
                    let block_hash = block.block_hash.to_string();
                    let names: Vec<String> = req.calls.lock().keys().cloned().collect();

                    let rounds = names.iter().map(|name| {
                        self.execute_on_block_call(
                            name.clone(),
                            req,
                            block,
                            Arc::clone(&provider),
                            options,
                            &subscription_id,
                            &block_height,
                            &block_hash,
                        )
                    });
                    let results = futures::future::join_all(rounds).await;
                    if results.iter().any(|r| r.is_err()) {
                        return;
                    }

                    let completed = OnBlockNotification {
                        name: TASK_COMPLETED_EVENT.to_string(),
                        response: String::new(),
                        block_height: block_height.clone(),
                        tag: block_height.clone(),
                        hash: block_hash,
                    };
                    if self
                        .notify_subscriber(&subscription_id, completed.with_fields(&req.includes))
                        .await
                        .is_err()
                    {
                        error!(block_height = %block_height, "Failed to send task completed event");
                        return;
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_on_block_call(
        &self,
        name: String,
        req: &ClientReq,
        block: &EthBlockNotification,
        provider: Arc<dyn NodeWsProvider>,
        options: RpcCallOptions,
        subscription_id: &uuid::Uuid,
        block_height: &str,
        block_hash: &str,
    ) -> Result<(), crate::handler::SessionClosed> {
        let Some(call) = req.calls.lock().get(&name).cloned() else {
            return Ok(());
        };
        if !call.active {
            return Ok(());
        }

        let target = (block.number as i64 + call.block_offset).max(0) as u64;
        let tag = format!("{target:#x}");
        let Ok(payload) =
            self.state
                .node_ws
                .construct_rpc_call_payload(&call.method, &call.payload, &tag)
        else {
            return Ok(());
        };

        match provider.call_rpc(&call.method, payload, options).await {
            Ok(response) => {
                let response = response
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| response.to_string());
                let result = OnBlockNotification {
                    name: call.name.clone(),
                    response,
                    block_height: block_height.to_string(),
                    tag,
                    hash: block_hash.to_string(),
                };
                self.notify_subscriber(subscription_id, result.with_fields(&req.includes))
                    .await
            }
            Err(e) => {
                debug!(call = %call.name, error = %e, "Disabling failed onBlock call");
                if let Some(entry) = req.calls.lock().get_mut(&name) {
                    entry.active = false;
                }
                let disabled = OnBlockNotification {
                    name: TASK_DISABLED_EVENT.to_string(),
                    response: call.describe(),
                    block_height: block_height.to_string(),
                    tag,
                    hash: block_hash.to_string(),
                };
                if self
                    .notify_subscriber(subscription_id, disabled.with_fields(&req.includes))
                    .await
                    .is_err()
                {
                    error!(call = %call.name, "Failed to send task disabled notification");
                }
                Ok(())
            }
        }
    }

    fn synced_provider_for(
        &self,
        block: &EthBlockNotification,
    ) -> Option<Arc<dyn NodeWsProvider>> {
        if !self.state.node_ws.synced() {
            return None;
        }
        if let Some(source) = &block.source {
            if let Some(provider) = self.state.node_ws.provider(source) {
                if provider.sync_status() == crate::ports::SyncStatus::Synced {
                    return Some(provider);
                }
            }
        }
        self.state.node_ws.synced_provider()
    }

    async fn notify_feed_closed(&self, subscription_id: &uuid::Uuid, request: &RpcRequest) {
        if self.state.feed_manager.subscription_exists(subscription_id) {
            self.send_error(
                request.id.as_ref(),
                RpcErrorCode::InternalError,
                "error when reading new notification",
            )
            .await;
        }
    }
}

/// Check the account's entitlement for a feed against the requested
/// includes and filters.
fn validate_feed(
    feed: FeedType,
    entitlement: &FeedEntitlement,
    includes: &[String],
    filter_fields: &[String],
) -> Result<(), String> {
    if entitlement.expired() {
        return Err(format!("{feed} is not allowed or date has been expired"));
    }
    if entitlement.allow_filtering
        && entitlement.available_fields.iter().any(|f| f == "all")
    {
        return Ok(());
    }
    for include in includes {
        if !entitlement.available_fields.iter().any(|f| f == include) {
            return Err(format!("including {feed}: {include} is not allowed"));
        }
    }
    if !entitlement.allow_filtering && !filter_fields.is_empty() {
        return Err(format!("filtering in {feed} is not allowed"));
    }
    Ok(())
}
