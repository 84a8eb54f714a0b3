//! Notification variants delivered to subscribers.
//!
//! Delivery dispatches on the variant tag; each variant knows how to
//! project itself onto a client's include list.

use crate::filter::FieldValue;
use chrono::Utc;
use gateway_types::{Address, EthTransaction, Hash256, NodeEndpoint, U256};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Event name emitted when every call of an `onBlock` round finished.
pub const TASK_COMPLETED_EVENT: &str = "TaskCompletedEvent";
/// Event name emitted when an `onBlock` call failed and was disabled.
pub const TASK_DISABLED_EVENT: &str = "TaskDisabledEvent";

/// Timestamp format used in notification `time` fields and `ping` replies.
pub const MICROSECOND_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Current UTC time at microsecond precision.
#[must_use]
pub fn microsecond_timestamp() -> String {
    Utc::now().format(MICROSECOND_TIME_FORMAT).to_string()
}

/// A notification flowing from the feed manager to subscribers.
#[derive(Debug, Clone)]
pub enum Notification {
    NewTx(TxNotification),
    PendingTx(TxNotification),
    EthBlock(EthBlockNotification),
    BeaconBlock(BeaconBlockNotification),
    TxReceipt(TxReceiptNotification),
    OnBlock(OnBlockNotification),
}

impl Notification {
    /// Project onto the requested include fields. Transaction feeds go
    /// through [`TxNotification::tx_result`] instead, which also applies
    /// the filter.
    #[must_use]
    pub fn with_fields(&self, includes: &[String]) -> Value {
        match self {
            Notification::NewTx(tx) | Notification::PendingTx(tx) => tx.tx_result(includes),
            Notification::EthBlock(block) => block.with_fields(includes),
            Notification::BeaconBlock(block) => block.with_fields(includes),
            Notification::TxReceipt(receipt) => receipt.with_fields(includes),
            Notification::OnBlock(event) => event.with_fields(includes),
        }
    }
}

/// A new or pending transaction.
#[derive(Debug, Clone)]
pub struct TxNotification {
    pub hash: Hash256,
    /// Wire encoding, served for the `raw_tx` include.
    pub raw: Vec<u8>,
    pub tx: EthTransaction,
    pub local_region: bool,
    /// Recovered once at construction; `None` when recovery fails.
    pub sender: Option<Address>,
}

impl TxNotification {
    #[must_use]
    pub fn new(tx: EthTransaction, local_region: bool) -> Self {
        Self {
            hash: tx.hash(),
            raw: tx.encode_wire(),
            sender: tx.sender().ok(),
            tx,
            local_region,
        }
    }

    /// The field map filter expressions evaluate against.
    #[must_use]
    pub fn filter_map(&self) -> HashMap<String, FieldValue> {
        let mut map = HashMap::new();
        map.insert("gas".to_string(), FieldValue::Num(U256::from(self.tx.gas())));
        map.insert("gas_price".to_string(), FieldValue::Num(self.tx.gas_price()));
        map.insert("value".to_string(), FieldValue::Num(self.tx.value()));
        map.insert(
            "type".to_string(),
            FieldValue::Num(U256::from(self.tx.tx_type())),
        );
        map.insert(
            "chain_id".to_string(),
            FieldValue::Num(U256::from(self.tx.chain_id().unwrap_or(0))),
        );
        map.insert(
            "max_fee_per_gas".to_string(),
            FieldValue::Num(self.tx.max_fee_per_gas().unwrap_or_default()),
        );
        map.insert(
            "max_priority_fee_per_gas".to_string(),
            FieldValue::Num(self.tx.max_priority_fee_per_gas().unwrap_or_default()),
        );
        map.insert(
            "to".to_string(),
            FieldValue::Str(
                self.tx
                    .to()
                    .map_or_else(|| "0x0".to_string(), |a| a.to_string()),
            ),
        );
        map.insert(
            "from".to_string(),
            FieldValue::Str(
                self.sender
                    .map_or_else(|| "0x0".to_string(), |a| a.to_string()),
            ),
        );
        map.insert(
            "method_id".to_string(),
            FieldValue::Str(self.tx.method_id()),
        );
        map
    }

    /// Build the per-subscription result object with only the requested
    /// fields present.
    #[must_use]
    pub fn tx_result(&self, includes: &[String]) -> Value {
        let mut result = Map::new();
        let mut content_fields: Vec<&str> = Vec::new();
        for include in includes {
            match include.as_str() {
                "tx_hash" => {
                    result.insert("txHash".to_string(), json!(self.hash.to_string()));
                }
                "time" => {
                    result.insert("time".to_string(), json!(microsecond_timestamp()));
                }
                "local_region" => {
                    result.insert("localRegion".to_string(), json!(self.local_region));
                }
                "raw_tx" => {
                    result.insert(
                        "rawTx".to_string(),
                        json!(format!("0x{}", hex::encode(&self.raw))),
                    );
                }
                "tx_contents" => content_fields.push("tx_contents"),
                field if field.starts_with("tx_contents.") => {
                    content_fields.push(&field["tx_contents.".len()..]);
                }
                _ => {}
            }
        }
        if !content_fields.is_empty() {
            result.insert(
                "txContents".to_string(),
                self.tx_contents(&content_fields),
            );
        }
        Value::Object(result)
    }

    fn tx_contents(&self, fields: &[&str]) -> Value {
        let full = self.tx.to_json(self.sender.as_ref());
        if fields.contains(&"tx_contents") {
            return full;
        }
        let mut out = Map::new();
        for field in fields {
            let key = if *field == "tx_hash" {
                "hash".to_string()
            } else {
                camel_case(field)
            };
            if let Some(value) = full.get(&key) {
                out.insert(key, value.clone());
            }
        }
        Value::Object(out)
    }
}

/// An execution-layer block, already projected to JSON by the producer.
#[derive(Debug, Clone)]
pub struct EthBlockNotification {
    pub block_hash: Hash256,
    pub header: Value,
    pub transactions: Vec<Value>,
    pub uncles: Value,
    pub future_validator_info: Option<Value>,
    pub number: u64,
    /// Node that delivered the block; receipt fetches prefer it.
    pub source: Option<NodeEndpoint>,
}

impl EthBlockNotification {
    #[must_use]
    pub fn with_fields(&self, includes: &[String]) -> Value {
        let mut out = Map::new();
        for include in includes {
            match include.as_str() {
                "hash" => {
                    out.insert("hash".to_string(), json!(self.block_hash.to_string()));
                }
                "header" => {
                    out.insert("header".to_string(), self.header.clone());
                }
                "transactions" => {
                    out.insert(
                        "transactions".to_string(),
                        Value::Array(self.transactions.clone()),
                    );
                }
                "uncles" => {
                    out.insert("uncles".to_string(), self.uncles.clone());
                }
                "future_validator_info" => {
                    if let Some(info) = &self.future_validator_info {
                        out.insert("futureValidatorInfo".to_string(), info.clone());
                    }
                }
                _ => {}
            }
        }
        Value::Object(out)
    }
}

/// A consensus-layer block.
#[derive(Debug, Clone)]
pub struct BeaconBlockNotification {
    pub hash: Hash256,
    pub header: Value,
    pub slot: u64,
    pub body: Value,
}

impl BeaconBlockNotification {
    #[must_use]
    pub fn with_fields(&self, includes: &[String]) -> Value {
        let mut out = Map::new();
        for include in includes {
            match include.as_str() {
                "hash" => {
                    out.insert("hash".to_string(), json!(self.hash.to_string()));
                }
                "header" => {
                    out.insert("header".to_string(), self.header.clone());
                }
                "slot" => {
                    out.insert("slot".to_string(), json!(self.slot));
                }
                "body" => {
                    out.insert("body".to_string(), self.body.clone());
                }
                _ => {}
            }
        }
        Value::Object(out)
    }
}

/// A transaction receipt fetched from a node.
#[derive(Debug, Clone)]
pub struct TxReceiptNotification(pub Value);

impl TxReceiptNotification {
    /// Include names are snake_case; receipt keys use the node's camelCase.
    #[must_use]
    pub fn with_fields(&self, includes: &[String]) -> Value {
        let mut out = Map::new();
        for include in includes {
            let key = camel_case(include);
            if let Some(value) = self.0.get(&key) {
                out.insert(key, value.clone());
            }
        }
        Value::Object(out)
    }
}

/// A result (or lifecycle event) of an `onBlock` call round.
#[derive(Debug, Clone)]
pub struct OnBlockNotification {
    pub name: String,
    pub response: String,
    pub block_height: String,
    pub tag: String,
    pub hash: String,
}

impl OnBlockNotification {
    #[must_use]
    pub fn with_fields(&self, includes: &[String]) -> Value {
        let mut out = Map::new();
        for include in includes {
            match include.as_str() {
                "name" => {
                    out.insert("name".to_string(), json!(self.name));
                }
                "response" => {
                    out.insert("response".to_string(), json!(self.response));
                }
                "block_height" => {
                    out.insert("blockHeight".to_string(), json!(self.block_height));
                }
                "tag" => {
                    out.insert("tag".to_string(), json!(self.tag));
                }
                _ => {}
            }
        }
        Value::Object(out)
    }
}

/// `block_hash` → `blockHash`.
fn camel_case(snake: &str) -> String {
    let mut parts = snake.split('_');
    let mut out = String::new();
    if let Some(first) = parts.next() {
        out.push_str(first);
    }
    for part in parts {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}
