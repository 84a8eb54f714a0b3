//! Transaction and bundle submission over the RPC session.

use crate::handler::Session;
use crate::jsonrpc::{RpcErrorCode, RpcRequest};
use crate::ports::{MevBundle, RpcCallOptions};
use gateway_types::{AccountId, EthTransaction, Tx, TxFlags};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Builder name that requires an elite account.
const PREMIUM_BUILDER: &str = "bloxroute";

/// Parameters of `blxr_tx` and each entry of `blxr_batch_tx`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TxSubmission {
    #[serde(default)]
    pub transaction: String,
    #[serde(default)]
    pub validators_only: bool,
    #[serde(default)]
    pub next_validator: bool,
    #[serde(default)]
    pub fallback: u16,
    #[serde(default)]
    pub node_validation: bool,
    #[serde(default)]
    pub frontrunning_protection: bool,
    #[serde(default)]
    pub original_sender_account_id: String,
}

#[derive(Debug, Deserialize)]
struct BatchTxSubmission {
    transactions: Vec<String>,
    #[serde(default)]
    validators_only: bool,
    #[serde(default)]
    original_sender_account_id: String,
}

#[derive(Debug, Deserialize)]
struct MevSearcherParams {
    #[serde(default)]
    mev_method: String,
    payload: Value,
    #[serde(default)]
    mev_builders: HashMap<String, String>,
    #[serde(default)]
    frontrunning: bool,
    #[serde(default)]
    effective_gas_price: Option<serde_json::Number>,
    #[serde(default)]
    coinbase_profit: Option<serde_json::Number>,
}

#[derive(Debug, Deserialize)]
struct SendBundleArgs {
    #[serde(default)]
    txs: Vec<String>,
    #[serde(default)]
    uuid: String,
    #[serde(rename = "blockNumber", default)]
    block_number: String,
}

impl SendBundleArgs {
    fn validate(&self) -> Result<(), String> {
        if self.txs.is_empty() && self.uuid.is_empty() {
            return Err("bundle missing txs".to_string());
        }
        if self.block_number.is_empty() {
            return Err("bundle missing blockNumber".to_string());
        }
        for encoded in &self.txs {
            let bytes = decode_hex(encoded)?;
            EthTransaction::decode_binary(&bytes).map_err(|e| e.to_string())?;
        }
        if !self.uuid.is_empty() {
            Uuid::parse_str(&self.uuid).map_err(|e| format!("invalid UUID, {e}"))?;
        }
        let stripped = self
            .block_number
            .strip_prefix("0x")
            .ok_or("blockNumber must be hex")?;
        u64::from_str_radix(stripped, 16).map_err(|e| format!("blockNumber must be hex, {e}"))?;
        Ok(())
    }
}

fn decode_hex(input: &str) -> Result<Vec<u8>, String> {
    hex::decode(input.strip_prefix("0x").unwrap_or(input)).map_err(|e| e.to_string())
}

impl Session {
    /// The account submissions are attributed to. When the gateway runs as
    /// the cloud-services proxy, the original sender rides in the params.
    fn submission_account(&self, original_sender: &str) -> AccountId {
        if self.state.config.cloud_proxy && !original_sender.is_empty() {
            AccountId::from(original_sender)
        } else {
            self.account.account_id.clone()
        }
    }

    pub(crate) async fn handle_tx(&self, request: &RpcRequest) {
        if self.account.account_id != self.state.gateway_account.account_id {
            let detail =
                "blxr_tx is not allowed when account authentication is different from the node account";
            error!(
                account_id = %self.account.account_id,
                gateway_account = %self.state.gateway_account.account_id,
                "{detail}"
            );
            self.send_error(request.id.as_ref(), RpcErrorCode::InvalidRequest, detail)
                .await;
            return;
        }

        let params: TxSubmission = match request
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
        {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                self.send_error(request.id.as_ref(), RpcErrorCode::InvalidParams, &e.to_string())
                    .await;
                return;
            }
            None => {
                self.send_error(
                    request.id.as_ref(),
                    RpcErrorCode::InvalidParams,
                    "params is missing in the request",
                )
                .await;
                return;
            }
        };

        if self.state.config.cloud_proxy && params.original_sender_account_id.is_empty() {
            error!("Cannot send transaction to internal gateway directly");
            self.send_error(
                request.id.as_ref(),
                RpcErrorCode::InvalidRequest,
                "failed to send transaction",
            )
            .await;
            return;
        }

        let account_id = self.submission_account(&params.original_sender_account_id);
        match self.handle_single_transaction(&params, account_id).await {
            Ok(Some(tx_hash)) => {
                info!(tx_hash = %tx_hash, "blxr_tx accepted");
                let _ = self
                    .reply(request.id.as_ref(), json!({"txHash": tx_hash}))
                    .await;
            }
            Ok(None) => {}
            Err(detail) => {
                self.send_error(request.id.as_ref(), RpcErrorCode::InvalidParams, &detail)
                    .await;
            }
        }
    }

    pub(crate) async fn handle_batch_tx(&self, request: &RpcRequest) {
        if self.account.account_id != self.state.gateway_account.account_id {
            error!(
                account_id = %self.account.account_id,
                "blxr_batch_tx is not allowed when account authentication is different from the node account"
            );
            return;
        }

        let params: BatchTxSubmission = match request
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
        {
            Some(Ok(params)) => params,
            _ => {
                self.send_error(
                    request.id.as_ref(),
                    RpcErrorCode::InvalidParams,
                    "invalid batch params",
                )
                .await;
                return;
            }
        };

        let account_id = self.submission_account(&params.original_sender_account_id);
        let mut tx_hashes = Vec::new();
        for transaction in &params.transactions {
            let submission = TxSubmission {
                transaction: transaction.clone(),
                validators_only: params.validators_only,
                ..TxSubmission::default()
            };
            // Individual failures are skipped; the batch succeeds when any
            // transaction is accepted.
            if let Ok(Some(tx_hash)) = self
                .handle_single_transaction(&submission, account_id.clone())
                .await
            {
                tx_hashes.push(tx_hash);
            }
        }

        if tx_hashes.is_empty() {
            self.send_error(
                request.id.as_ref(),
                RpcErrorCode::InvalidParams,
                "all transactions are invalid",
            )
            .await;
            return;
        }
        info!(count = tx_hashes.len(), "blxr_batch_tx accepted");
        let _ = self
            .reply(request.id.as_ref(), json!({"txHashes": tx_hashes}))
            .await;
    }

    /// The shared `blxr_tx` pipeline. Returns the canonical hash, `None`
    /// when the transaction failed after the error was already handled.
    async fn handle_single_transaction(
        &self,
        params: &TxSubmission,
        account_id: AccountId,
    ) -> Result<Option<String>, String> {
        let tx_bytes = decode_hex(&params.transaction)?;
        let (tx, pending_reevaluation) = self
            .validate_tx_from_external_source(params, &tx_bytes, account_id)
            .await?;

        if !pending_reevaluation {
            if let Err(e) = self.state.msg_handler.handle_tx(tx.clone()) {
                error!(error = %e, "Failed to handle single transaction");
                return Ok(None);
            }
        } else if params.fallback != 0 {
            // The nearest BSC validator was unreachable and the fallback is
            // at least one block interval: arm the timer that downgrades
            // the transaction to a normal send.
            let routing = self.state.validator_routing.clone();
            let msg_handler = self.state.msg_handler.clone();
            let hash = tx.hash;
            let fallback = Duration::from_millis(u64::from(params.fallback));
            tokio::spawn(async move {
                tokio::time::sleep(fallback).await;
                routing.fire_fallback(&hash, |tx| msg_handler.handle_tx(tx));
            });
        }

        Ok(Some(tx.hash.to_string()))
    }

    /// Decode, normalize, flag, and route a transaction submitted over RPC.
    async fn validate_tx_from_external_source(
        &self,
        params: &TxSubmission,
        tx_bytes: &[u8],
        account_id: AccountId,
    ) -> Result<(Tx, bool), String> {
        // RPC interfaces use the typed-envelope binary encoding; fall back
        // to wire RLP for callers that confused the two.
        let eth_tx = match EthTransaction::decode_binary(tx_bytes) {
            Ok(tx) => tx,
            Err(binary_err) => match EthTransaction::decode_wire(tx_bytes) {
                Ok(tx) => {
                    warn!(
                        "Transaction was in RLP format instead of binary; it has been processed anyway, but the binary standard encoding is preferred"
                    );
                    tx
                }
                Err(_) => return Err(binary_err.to_string()),
            },
        };

        let gateway_chain_id = self.state.config.chain_id;
        if let Some(tx_chain_id) = eth_tx.chain_id() {
            if tx_chain_id != 0 && gateway_chain_id != 0 && tx_chain_id != gateway_chain_id {
                return Err(format!(
                    "chainID mismatch for hash {}, expect {} got {}, make sure the tx is sent with the right blockchain network",
                    eth_tx.hash(),
                    gateway_chain_id,
                    tx_chain_id,
                ));
            }
        }

        let content = eth_tx.encode_wire();
        let hash = eth_tx.hash();

        let mut flags = TxFlags::PAID_TX | TxFlags::LOCAL_REGION;
        if params.validators_only {
            flags.insert(TxFlags::VALIDATORS_ONLY);
        } else if params.next_validator {
            flags.insert(TxFlags::NEXT_VALIDATOR);
        } else {
            flags.insert(TxFlags::DELIVER_TO_NODE);
        }
        if params.frontrunning_protection {
            flags.insert(TxFlags::FRONT_RUNNING_PROTECTION);
        }

        let mut tx = Tx::new(
            hash,
            content,
            self.state.config.network_num,
            flags,
            account_id,
        );

        if params.next_validator {
            let pending = self
                .state
                .validator_routing
                .process_next_validator_tx(
                    &mut tx,
                    params.fallback,
                    self.state.config.network_num,
                )
                .map_err(|e| e.to_string())?;
            if pending {
                return Ok((tx, true));
            }
        }

        if params.node_validation
            && !tx.flags.is_next_validator()
            && !tx.flags.is_validators_only()
        {
            let Some(provider) = self.state.node_ws.synced_provider() else {
                return Err(format!(
                    "failed to validate tx ({hash}) via node: no synced WS provider available"
                ));
            };
            let result = provider
                .send_transaction(
                    format!("0x{}", params.transaction.trim_start_matches("0x")),
                    RpcCallOptions {
                        retry_attempts: 1,
                        retry_interval: Duration::from_millis(10),
                    },
                )
                .await;
            if let Err(e) = result {
                // The gateway may already have propagated the tx to the node.
                if !e.to_string().contains("already known") {
                    return Err(format!("tx ({hash}) failed node validation with error: {e}"));
                }
            }
        }

        Ok((tx, false))
    }

    pub(crate) async fn handle_mev_searcher(&self, request: &RpcRequest) {
        if self.account.account_id != self.state.gateway_account.account_id {
            let detail =
                "blxr_mev_searcher is not allowed when account authentication is different from the node account";
            error!(account_id = %self.account.account_id, "{detail}");
            self.send_error(request.id.as_ref(), RpcErrorCode::AccountIdError, detail)
                .await;
            return;
        }

        let Some(params_value) = request.params.as_ref() else {
            self.send_error(
                request.id.as_ref(),
                RpcErrorCode::InvalidParams,
                "failed to unmarshal params for mevSearcher, params not found",
            )
            .await;
            return;
        };
        let params: MevSearcherParams = match serde_json::from_value(params_value.clone()) {
            Ok(params) => params,
            Err(e) => {
                self.send_error(request.id.as_ref(), RpcErrorCode::InvalidParams, &e.to_string())
                    .await;
                return;
            }
        };

        let bundles: Vec<SendBundleArgs> = match serde_json::from_value(params.payload.clone()) {
            Ok(bundles) => bundles,
            Err(e) => {
                self.send_error(request.id.as_ref(), RpcErrorCode::InvalidParams, &e.to_string())
                    .await;
                return;
            }
        };
        if bundles.len() != 1 {
            self.send_error(
                request.id.as_ref(),
                RpcErrorCode::InvalidParams,
                "received invalid number of mevSearcher payload, must be 1 element",
            )
            .await;
            return;
        }
        if let Err(e) = bundles[0].validate() {
            self.send_error(request.id.as_ref(), RpcErrorCode::InvalidParams, &e).await;
            return;
        }

        for builder in params.mev_builders.keys() {
            if builder.to_lowercase() == PREMIUM_BUILDER && !self.account.tier.is_elite() {
                warn!(
                    builder = %builder,
                    tier = %self.account.tier,
                    "An elite account is required to target the premium builder"
                );
            }
        }

        let bundle = MevBundle {
            method: params.mev_method,
            builders: params.mev_builders,
            uuid: bundles[0].uuid.clone(),
            frontrunning: params.frontrunning,
            effective_gas_price: params.effective_gas_price,
            coinbase_profit: params.coinbase_profit,
            payload: params.payload,
        };

        if let Err(e) = self.state.msg_handler.handle_mev_bundle(bundle) {
            error!(error = %e, "Failed to process mevSearcher message");
            self.send_error(request.id.as_ref(), RpcErrorCode::InvalidParams, &e).await;
            return;
        }

        let _ = self
            .reply(request.id.as_ref(), json!({"status": "ok"}))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hex_with_and_without_prefix() {
        assert_eq!(decode_hex("0x0102").unwrap(), vec![1, 2]);
        assert_eq!(decode_hex("0102").unwrap(), vec![1, 2]);
        assert!(decode_hex("0xzz").is_err());
    }

    #[test]
    fn test_bundle_validation() {
        let empty = SendBundleArgs {
            txs: vec![],
            uuid: String::new(),
            block_number: "0x1".to_string(),
        };
        assert!(empty.validate().unwrap_err().contains("missing txs"));

        let no_block = SendBundleArgs {
            txs: vec![],
            uuid: Uuid::new_v4().to_string(),
            block_number: String::new(),
        };
        assert!(no_block
            .validate()
            .unwrap_err()
            .contains("missing blockNumber"));

        let bad_number = SendBundleArgs {
            txs: vec![],
            uuid: Uuid::new_v4().to_string(),
            block_number: "123".to_string(),
        };
        assert!(bad_number.validate().unwrap_err().contains("must be hex"));

        let uuid_only = SendBundleArgs {
            txs: vec![],
            uuid: Uuid::new_v4().to_string(),
            block_number: "0xdeadbf".to_string(),
        };
        uuid_only.validate().unwrap();

        let garbage_tx = SendBundleArgs {
            txs: vec!["0x00ff".to_string()],
            uuid: String::new(),
            block_number: "0x1".to_string(),
        };
        assert!(garbage_tx.validate().is_err());
    }
}
