//! Ethereum transaction model.
//!
//! The gateway accepts transactions in two dialects: the typed-envelope
//! binary encoding used by RPC interfaces, and the wire RLP encoding used by
//! the devp2p protocol (where a typed transaction is wrapped in an RLP byte
//! string). Both decode into [`EthTransaction`]; re-encoding through
//! [`EthTransaction::encode_binary`] yields the canonical form whose
//! Keccak-256 digest is the transaction hash.

use crate::hash::{keccak256, Hash256};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use primitive_types::U256;
use rlp::{Rlp, RlpStream};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Errors from decoding or recovering a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EthTxError {
    #[error("empty transaction payload")]
    Empty,

    #[error("rlp decoding failed: {0}")]
    Decode(String),

    #[error("unsupported transaction type {0:#04x}")]
    UnsupportedType(u8),

    #[error("invalid {0} field")]
    InvalidField(&'static str),

    #[error("invalid signature values")]
    InvalidSignature,

    #[error("sender recovery failed: {0}")]
    SenderRecovery(String),
}

impl From<rlp::DecoderError> for EthTxError {
    fn from(e: rlp::DecoderError) -> Self {
        EthTxError::Decode(e.to_string())
    }
}

/// A 20-byte account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EthTxError> {
        if bytes.len() != 20 {
            return Err(EthTxError::InvalidField("address"));
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// One entry of an EIP-2930 access list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessListItem {
    pub address: Address,
    pub storage_keys: Vec<Hash256>,
}

/// Pre-EIP-2718 transaction. The chain ID, when present, is folded into `v`
/// per EIP-155.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTx {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Vec<u8>,
    pub v: U256,
    pub r: U256,
    pub s: U256,
}

/// EIP-2930 (type 1) transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessListTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Vec<u8>,
    pub access_list: Vec<AccessListItem>,
    /// Signature Y parity (0 or 1).
    pub v: u8,
    pub r: U256,
    pub s: U256,
}

/// EIP-1559 (type 2) transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicFeeTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: U256,
    pub max_fee_per_gas: U256,
    pub gas: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Vec<u8>,
    pub access_list: Vec<AccessListItem>,
    /// Signature Y parity (0 or 1).
    pub v: u8,
    pub r: U256,
    pub s: U256,
}

/// A decoded Ethereum transaction of any supported type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EthTransaction {
    Legacy(LegacyTx),
    AccessList(AccessListTx),
    DynamicFee(DynamicFeeTx),
}

impl EthTransaction {
    /// Decode the typed-envelope binary dialect: a legacy RLP list, or a
    /// type byte followed by the typed payload.
    pub fn decode_binary(bytes: &[u8]) -> Result<Self, EthTxError> {
        let first = *bytes.first().ok_or(EthTxError::Empty)?;
        if first >= 0xC0 {
            return Ok(EthTransaction::Legacy(decode_legacy(&Rlp::new(bytes))?));
        }
        Self::decode_typed(first, &bytes[1..])
    }

    /// Decode the wire RLP dialect: a legacy RLP list, or an RLP byte
    /// string wrapping the typed envelope.
    pub fn decode_wire(bytes: &[u8]) -> Result<Self, EthTxError> {
        if bytes.is_empty() {
            return Err(EthTxError::Empty);
        }
        let rlp = Rlp::new(bytes);
        if rlp.is_list() {
            return Ok(EthTransaction::Legacy(decode_legacy(&rlp)?));
        }
        let inner = rlp.data()?;
        let first = *inner.first().ok_or(EthTxError::Empty)?;
        Self::decode_typed(first, &inner[1..])
    }

    fn decode_typed(tx_type: u8, payload: &[u8]) -> Result<Self, EthTxError> {
        match tx_type {
            0x01 => Ok(EthTransaction::AccessList(decode_access_list_tx(
                &Rlp::new(payload),
            )?)),
            0x02 => Ok(EthTransaction::DynamicFee(decode_dynamic_fee_tx(
                &Rlp::new(payload),
            )?)),
            other => Err(EthTxError::UnsupportedType(other)),
        }
    }

    /// Canonical binary encoding: the form whose Keccak-256 is the hash.
    #[must_use]
    pub fn encode_binary(&self) -> Vec<u8> {
        match self {
            EthTransaction::Legacy(tx) => encode_legacy(tx),
            EthTransaction::AccessList(tx) => {
                let mut out = vec![0x01];
                out.extend_from_slice(&encode_access_list_tx(tx));
                out
            }
            EthTransaction::DynamicFee(tx) => {
                let mut out = vec![0x02];
                out.extend_from_slice(&encode_dynamic_fee_tx(tx));
                out
            }
        }
    }

    /// Wire RLP encoding: typed envelopes are wrapped in an RLP byte string.
    #[must_use]
    pub fn encode_wire(&self) -> Vec<u8> {
        match self {
            EthTransaction::Legacy(tx) => encode_legacy(tx),
            _ => rlp::encode(&self.encode_binary()).to_vec(),
        }
    }

    /// Keccak-256 of the canonical binary encoding.
    #[must_use]
    pub fn hash(&self) -> Hash256 {
        keccak256(&self.encode_binary())
    }

    /// EIP-2718 type tag.
    #[must_use]
    pub fn tx_type(&self) -> u8 {
        match self {
            EthTransaction::Legacy(_) => 0,
            EthTransaction::AccessList(_) => 1,
            EthTransaction::DynamicFee(_) => 2,
        }
    }

    /// The chain ID the transaction is bound to, when one is present.
    /// Legacy transactions derive it from `v` per EIP-155.
    #[must_use]
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            EthTransaction::Legacy(tx) => {
                let v = tx.v.low_u64();
                if tx.v > U256::from(u64::MAX) || v < 35 {
                    None
                } else {
                    Some((v - 35) / 2)
                }
            }
            EthTransaction::AccessList(tx) => Some(tx.chain_id),
            EthTransaction::DynamicFee(tx) => Some(tx.chain_id),
        }
    }

    #[must_use]
    pub fn nonce(&self) -> u64 {
        match self {
            EthTransaction::Legacy(tx) => tx.nonce,
            EthTransaction::AccessList(tx) => tx.nonce,
            EthTransaction::DynamicFee(tx) => tx.nonce,
        }
    }

    #[must_use]
    pub fn gas(&self) -> u64 {
        match self {
            EthTransaction::Legacy(tx) => tx.gas,
            EthTransaction::AccessList(tx) => tx.gas,
            EthTransaction::DynamicFee(tx) => tx.gas,
        }
    }

    /// Effective gas price for filtering: dynamic-fee transactions report
    /// their fee cap.
    #[must_use]
    pub fn gas_price(&self) -> U256 {
        match self {
            EthTransaction::Legacy(tx) => tx.gas_price,
            EthTransaction::AccessList(tx) => tx.gas_price,
            EthTransaction::DynamicFee(tx) => tx.max_fee_per_gas,
        }
    }

    #[must_use]
    pub fn max_fee_per_gas(&self) -> Option<U256> {
        match self {
            EthTransaction::DynamicFee(tx) => Some(tx.max_fee_per_gas),
            _ => None,
        }
    }

    #[must_use]
    pub fn max_priority_fee_per_gas(&self) -> Option<U256> {
        match self {
            EthTransaction::DynamicFee(tx) => Some(tx.max_priority_fee_per_gas),
            _ => None,
        }
    }

    #[must_use]
    pub fn value(&self) -> U256 {
        match self {
            EthTransaction::Legacy(tx) => tx.value,
            EthTransaction::AccessList(tx) => tx.value,
            EthTransaction::DynamicFee(tx) => tx.value,
        }
    }

    #[must_use]
    pub fn to(&self) -> Option<Address> {
        match self {
            EthTransaction::Legacy(tx) => tx.to,
            EthTransaction::AccessList(tx) => tx.to,
            EthTransaction::DynamicFee(tx) => tx.to,
        }
    }

    #[must_use]
    pub fn input(&self) -> &[u8] {
        match self {
            EthTransaction::Legacy(tx) => &tx.input,
            EthTransaction::AccessList(tx) => &tx.input,
            EthTransaction::DynamicFee(tx) => &tx.input,
        }
    }

    #[must_use]
    pub fn access_list(&self) -> &[AccessListItem] {
        match self {
            EthTransaction::Legacy(_) => &[],
            EthTransaction::AccessList(tx) => &tx.access_list,
            EthTransaction::DynamicFee(tx) => &tx.access_list,
        }
    }

    /// First four bytes of the call data, hex encoded. `"0x"` when the call
    /// data is shorter.
    #[must_use]
    pub fn method_id(&self) -> String {
        let input = self.input();
        if input.len() >= 4 {
            format!("0x{}", hex::encode(&input[..4]))
        } else {
            "0x".to_string()
        }
    }

    /// The digest the signature commits to.
    pub fn sighash(&self) -> Result<Hash256, EthTxError> {
        match self {
            EthTransaction::Legacy(tx) => {
                let mut s = RlpStream::new();
                match self.chain_id() {
                    Some(chain_id) => {
                        s.begin_list(9);
                        append_legacy_body(&mut s, tx);
                        s.append(&chain_id);
                        s.append(&0u8);
                        s.append(&0u8);
                    }
                    None => {
                        s.begin_list(6);
                        append_legacy_body(&mut s, tx);
                    }
                }
                Ok(keccak256(&s.out()))
            }
            EthTransaction::AccessList(tx) => {
                let mut s = RlpStream::new();
                s.begin_list(8);
                s.append(&tx.chain_id);
                s.append(&tx.nonce);
                s.append(&tx.gas_price);
                s.append(&tx.gas);
                append_to(&mut s, &tx.to);
                s.append(&tx.value);
                s.append(&tx.input);
                append_access_list(&mut s, &tx.access_list);
                let mut payload = vec![0x01];
                payload.extend_from_slice(&s.out());
                Ok(keccak256(&payload))
            }
            EthTransaction::DynamicFee(tx) => {
                let mut s = RlpStream::new();
                s.begin_list(9);
                s.append(&tx.chain_id);
                s.append(&tx.nonce);
                s.append(&tx.max_priority_fee_per_gas);
                s.append(&tx.max_fee_per_gas);
                s.append(&tx.gas);
                append_to(&mut s, &tx.to);
                s.append(&tx.value);
                s.append(&tx.input);
                append_access_list(&mut s, &tx.access_list);
                let mut payload = vec![0x02];
                payload.extend_from_slice(&s.out());
                Ok(keccak256(&payload))
            }
        }
    }

    /// Recover the signing address.
    pub fn sender(&self) -> Result<Address, EthTxError> {
        let (r, s, parity) = match self {
            EthTransaction::Legacy(tx) => {
                if tx.v > U256::from(u64::MAX) {
                    return Err(EthTxError::InvalidSignature);
                }
                let v = tx.v.low_u64();
                let parity = if v == 27 || v == 28 {
                    (v - 27) as u8
                } else if v >= 35 {
                    ((v - 35) % 2) as u8
                } else {
                    return Err(EthTxError::InvalidSignature);
                };
                (tx.r, tx.s, parity)
            }
            EthTransaction::AccessList(tx) => (tx.r, tx.s, tx.v),
            EthTransaction::DynamicFee(tx) => (tx.r, tx.s, tx.v),
        };

        let sighash = self.sighash()?;
        let mut sig_bytes = [0u8; 64];
        r.to_big_endian(&mut sig_bytes[..32]);
        s.to_big_endian(&mut sig_bytes[32..]);

        let signature = EcdsaSignature::from_slice(&sig_bytes)
            .map_err(|e| EthTxError::SenderRecovery(e.to_string()))?;
        let recovery_id = RecoveryId::from_byte(parity).ok_or(EthTxError::InvalidSignature)?;
        let key = VerifyingKey::recover_from_prehash(sighash.as_bytes(), &signature, recovery_id)
            .map_err(|e| EthTxError::SenderRecovery(e.to_string()))?;

        Ok(address_of_key(&key))
    }

    /// JSON representation with the canonical Ethereum field names.
    /// `sender` is passed in so callers can recover it once and reuse it.
    #[must_use]
    pub fn to_json(&self, sender: Option<&Address>) -> Value {
        let mut obj = json!({
            "hash": self.hash().to_string(),
            "nonce": hex_u64(self.nonce()),
            "gas": hex_u64(self.gas()),
            "gasPrice": hex_u256(self.gas_price()),
            "to": self.to().map(|a| a.to_string()),
            "value": hex_u256(self.value()),
            "input": format!("0x{}", hex::encode(self.input())),
            "type": hex_u64(u64::from(self.tx_type())),
            "v": self.v_json(),
            "r": hex_u256(self.r_value()),
            "s": hex_u256(self.s_value()),
        });
        let map = obj.as_object_mut().unwrap_or_else(|| unreachable!());
        if let Some(chain_id) = self.chain_id() {
            map.insert("chainId".to_string(), Value::String(hex_u64(chain_id)));
        }
        if let Some(max_fee) = self.max_fee_per_gas() {
            map.insert("maxFeePerGas".to_string(), Value::String(hex_u256(max_fee)));
        }
        if let Some(max_priority) = self.max_priority_fee_per_gas() {
            map.insert(
                "maxPriorityFeePerGas".to_string(),
                Value::String(hex_u256(max_priority)),
            );
        }
        if self.tx_type() > 0 {
            let list: Vec<Value> = self
                .access_list()
                .iter()
                .map(|item| {
                    json!({
                        "address": item.address.to_string(),
                        "storageKeys": item
                            .storage_keys
                            .iter()
                            .map(|k| k.to_string())
                            .collect::<Vec<_>>(),
                    })
                })
                .collect();
            map.insert("accessList".to_string(), Value::Array(list));
        }
        if let Some(from) = sender {
            map.insert("from".to_string(), Value::String(from.to_string()));
        }
        obj
    }

    fn v_json(&self) -> String {
        match self {
            EthTransaction::Legacy(tx) => hex_u256(tx.v),
            EthTransaction::AccessList(tx) => hex_u64(u64::from(tx.v)),
            EthTransaction::DynamicFee(tx) => hex_u64(u64::from(tx.v)),
        }
    }

    fn r_value(&self) -> U256 {
        match self {
            EthTransaction::Legacy(tx) => tx.r,
            EthTransaction::AccessList(tx) => tx.r,
            EthTransaction::DynamicFee(tx) => tx.r,
        }
    }

    fn s_value(&self) -> U256 {
        match self {
            EthTransaction::Legacy(tx) => tx.s,
            EthTransaction::AccessList(tx) => tx.s,
            EthTransaction::DynamicFee(tx) => tx.s,
        }
    }
}

/// Hex quantity encoding with the leading zeros trimmed.
fn hex_u64(v: u64) -> String {
    format!("{v:#x}")
}

fn hex_u256(v: U256) -> String {
    format!("{v:#x}")
}

fn address_of_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest.as_bytes()[12..]);
    Address(out)
}

fn append_legacy_body(s: &mut RlpStream, tx: &LegacyTx) {
    s.append(&tx.nonce);
    s.append(&tx.gas_price);
    s.append(&tx.gas);
    append_to(s, &tx.to);
    s.append(&tx.value);
    s.append(&tx.input);
}

fn append_to(s: &mut RlpStream, to: &Option<Address>) {
    match to {
        Some(address) => s.append(&address.0.to_vec()),
        None => s.append_empty_data(),
    };
}

fn append_access_list(s: &mut RlpStream, list: &[AccessListItem]) {
    s.begin_list(list.len());
    for item in list {
        s.begin_list(2);
        s.append(&item.address.0.to_vec());
        s.begin_list(item.storage_keys.len());
        for key in &item.storage_keys {
            s.append(&key.0.to_vec());
        }
    }
}

fn encode_legacy(tx: &LegacyTx) -> Vec<u8> {
    let mut s = RlpStream::new();
    s.begin_list(9);
    append_legacy_body(&mut s, tx);
    s.append(&tx.v);
    s.append(&tx.r);
    s.append(&tx.s);
    s.out().to_vec()
}

fn encode_access_list_tx(tx: &AccessListTx) -> Vec<u8> {
    let mut s = RlpStream::new();
    s.begin_list(11);
    s.append(&tx.chain_id);
    s.append(&tx.nonce);
    s.append(&tx.gas_price);
    s.append(&tx.gas);
    append_to(&mut s, &tx.to);
    s.append(&tx.value);
    s.append(&tx.input);
    append_access_list(&mut s, &tx.access_list);
    s.append(&tx.v);
    s.append(&tx.r);
    s.append(&tx.s);
    s.out().to_vec()
}

fn encode_dynamic_fee_tx(tx: &DynamicFeeTx) -> Vec<u8> {
    let mut s = RlpStream::new();
    s.begin_list(12);
    s.append(&tx.chain_id);
    s.append(&tx.nonce);
    s.append(&tx.max_priority_fee_per_gas);
    s.append(&tx.max_fee_per_gas);
    s.append(&tx.gas);
    append_to(&mut s, &tx.to);
    s.append(&tx.value);
    s.append(&tx.input);
    append_access_list(&mut s, &tx.access_list);
    s.append(&tx.v);
    s.append(&tx.r);
    s.append(&tx.s);
    s.out().to_vec()
}

fn decode_to(rlp: &Rlp) -> Result<Option<Address>, EthTxError> {
    let data = rlp.data()?;
    if data.is_empty() {
        Ok(None)
    } else {
        Address::from_slice(data).map(Some)
    }
}

fn decode_access_list(rlp: &Rlp) -> Result<Vec<AccessListItem>, EthTxError> {
    let count = rlp.item_count()?;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let item = rlp.at(i)?;
        let address = decode_to(&item.at(0)?)?.ok_or(EthTxError::InvalidField("access list"))?;
        let keys_rlp = item.at(1)?;
        let key_count = keys_rlp.item_count()?;
        let mut storage_keys = Vec::with_capacity(key_count);
        for j in 0..key_count {
            let data = keys_rlp.at(j)?.data()?;
            let key =
                Hash256::from_slice(data).map_err(|_| EthTxError::InvalidField("storage key"))?;
            storage_keys.push(key);
        }
        out.push(AccessListItem {
            address,
            storage_keys,
        });
    }
    Ok(out)
}

fn decode_legacy(rlp: &Rlp) -> Result<LegacyTx, EthTxError> {
    if rlp.item_count()? != 9 {
        return Err(EthTxError::InvalidField("legacy item count"));
    }
    Ok(LegacyTx {
        nonce: rlp.val_at(0)?,
        gas_price: rlp.val_at(1)?,
        gas: rlp.val_at(2)?,
        to: decode_to(&rlp.at(3)?)?,
        value: rlp.val_at(4)?,
        input: rlp.val_at(5)?,
        v: rlp.val_at(6)?,
        r: rlp.val_at(7)?,
        s: rlp.val_at(8)?,
    })
}

fn decode_access_list_tx(rlp: &Rlp) -> Result<AccessListTx, EthTxError> {
    if rlp.item_count()? != 11 {
        return Err(EthTxError::InvalidField("type-1 item count"));
    }
    Ok(AccessListTx {
        chain_id: rlp.val_at(0)?,
        nonce: rlp.val_at(1)?,
        gas_price: rlp.val_at(2)?,
        gas: rlp.val_at(3)?,
        to: decode_to(&rlp.at(4)?)?,
        value: rlp.val_at(5)?,
        input: rlp.val_at(6)?,
        access_list: decode_access_list(&rlp.at(7)?)?,
        v: rlp.val_at(8)?,
        r: rlp.val_at(9)?,
        s: rlp.val_at(10)?,
    })
}

fn decode_dynamic_fee_tx(rlp: &Rlp) -> Result<DynamicFeeTx, EthTxError> {
    if rlp.item_count()? != 12 {
        return Err(EthTxError::InvalidField("type-2 item count"));
    }
    Ok(DynamicFeeTx {
        chain_id: rlp.val_at(0)?,
        nonce: rlp.val_at(1)?,
        max_priority_fee_per_gas: rlp.val_at(2)?,
        max_fee_per_gas: rlp.val_at(3)?,
        gas: rlp.val_at(4)?,
        to: decode_to(&rlp.at(5)?)?,
        value: rlp.val_at(6)?,
        input: rlp.val_at(7)?,
        access_list: decode_access_list(&rlp.at(8)?)?,
        v: rlp.val_at(9)?,
        r: rlp.val_at(10)?,
        s: rlp.val_at(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    fn sample_legacy(v: u64) -> LegacyTx {
        LegacyTx {
            nonce: 7,
            gas_price: U256::from(20_000_000_000u64),
            gas: 21_000,
            to: Some(Address([0x11; 20])),
            value: U256::from(1_000_000u64),
            input: vec![],
            v: U256::from(v),
            r: U256::from(1),
            s: U256::from(1),
        }
    }

    fn sample_dynamic() -> DynamicFeeTx {
        DynamicFeeTx {
            chain_id: 1,
            nonce: 3,
            max_priority_fee_per_gas: U256::from(2_000_000_000u64),
            max_fee_per_gas: U256::from(30_000_000_000u64),
            gas: 100_000,
            to: Some(Address([0x22; 20])),
            value: U256::zero(),
            input: vec![0xAB, 0xCD, 0xEF, 0x01, 0x99],
            access_list: vec![AccessListItem {
                address: Address([0x33; 20]),
                storage_keys: vec![keccak256(b"slot")],
            }],
            v: 0,
            r: U256::from(1),
            s: U256::from(1),
        }
    }

    #[test]
    fn test_legacy_round_trip() {
        let tx = EthTransaction::Legacy(sample_legacy(37));
        let binary = tx.encode_binary();
        let decoded = EthTransaction::decode_binary(&binary).unwrap();
        assert_eq!(decoded, tx);
        // Legacy wire and binary forms coincide.
        assert_eq!(tx.encode_wire(), binary);
        let from_wire = EthTransaction::decode_wire(&binary).unwrap();
        assert_eq!(from_wire, tx);
    }

    #[test]
    fn test_dynamic_fee_round_trip_both_dialects() {
        let tx = EthTransaction::DynamicFee(sample_dynamic());
        let binary = tx.encode_binary();
        assert_eq!(binary[0], 0x02);
        assert_eq!(EthTransaction::decode_binary(&binary).unwrap(), tx);

        let wire = tx.encode_wire();
        assert_ne!(wire, binary);
        assert_eq!(EthTransaction::decode_wire(&wire).unwrap(), tx);
        // Hash is computed over the binary form regardless of dialect.
        assert_eq!(
            EthTransaction::decode_wire(&wire).unwrap().hash(),
            keccak256(&binary)
        );
    }

    #[test]
    fn test_chain_id_from_legacy_v() {
        // EIP-155: v = chain_id * 2 + 35 + parity.
        let tx = EthTransaction::Legacy(sample_legacy(5 * 2 + 35));
        assert_eq!(tx.chain_id(), Some(5));
        let pre155 = EthTransaction::Legacy(sample_legacy(27));
        assert_eq!(pre155.chain_id(), None);
    }

    #[test]
    fn test_method_id() {
        let tx = EthTransaction::DynamicFee(sample_dynamic());
        assert_eq!(tx.method_id(), "0xabcdef01");

        let bare = EthTransaction::Legacy(sample_legacy(27));
        assert_eq!(bare.method_id(), "0x");
    }

    #[test]
    fn test_unsupported_type_rejected() {
        let result = EthTransaction::decode_binary(&[0x05, 0xC0]);
        assert!(matches!(result, Err(EthTxError::UnsupportedType(0x05))));
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert!(matches!(
            EthTransaction::decode_binary(&[]),
            Err(EthTxError::Empty)
        ));
        assert!(matches!(
            EthTransaction::decode_wire(&[]),
            Err(EthTxError::Empty)
        ));
    }

    #[test]
    fn test_sender_recovery_dynamic_fee() {
        let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
        let expected = address_of_key(key.verifying_key());

        let mut inner = sample_dynamic();
        let unsigned = EthTransaction::DynamicFee(inner.clone());
        let sighash = unsigned.sighash().unwrap();
        let (signature, recovery_id) = key.sign_prehash_recoverable(sighash.as_bytes()).unwrap();

        let sig_bytes = signature.to_bytes();
        inner.r = U256::from_big_endian(&sig_bytes[..32]);
        inner.s = U256::from_big_endian(&sig_bytes[32..]);
        inner.v = recovery_id.to_byte();

        let signed = EthTransaction::DynamicFee(inner);
        assert_eq!(signed.sender().unwrap(), expected);
    }

    #[test]
    fn test_sender_recovery_legacy_eip155() {
        let key = SigningKey::from_slice(&[0x24; 32]).unwrap();
        let expected = address_of_key(key.verifying_key());

        let chain_id = 5u64;
        // Parity placeholder keeps chain_id() correct while signing.
        let mut inner = sample_legacy(chain_id * 2 + 35);
        let sighash = EthTransaction::Legacy(inner.clone()).sighash().unwrap();
        let (signature, recovery_id) = key.sign_prehash_recoverable(sighash.as_bytes()).unwrap();

        let sig_bytes = signature.to_bytes();
        inner.r = U256::from_big_endian(&sig_bytes[..32]);
        inner.s = U256::from_big_endian(&sig_bytes[32..]);
        inner.v = U256::from(chain_id * 2 + 35 + u64::from(recovery_id.to_byte()));

        let signed = EthTransaction::Legacy(inner);
        assert_eq!(signed.chain_id(), Some(chain_id));
        assert_eq!(signed.sender().unwrap(), expected);
    }

    #[test]
    fn test_json_projection_fields() {
        let tx = EthTransaction::DynamicFee(sample_dynamic());
        let json = tx.to_json(Some(&Address([0x44; 20])));
        assert_eq!(json["type"], "0x2");
        assert_eq!(json["chainId"], "0x1");
        assert_eq!(json["gas"], "0x186a0");
        assert!(json["maxFeePerGas"].is_string());
        assert_eq!(json["from"], format!("{}", Address([0x44; 20])));
        assert_eq!(json["accessList"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_contract_creation_to_is_null() {
        let mut inner = sample_legacy(27);
        inner.to = None;
        let tx = EthTransaction::Legacy(inner);
        let binary = tx.encode_binary();
        let decoded = EthTransaction::decode_binary(&binary).unwrap();
        assert_eq!(decoded.to(), None);
        assert!(decoded.to_json(None)["to"].is_null());
    }
}
