//! RLP envelope for compressed execution-layer blocks.

use crate::{CodecError, CompressedTx};
use primitive_types::U256;
use rlp::{Rlp, RlpStream};

/// The RLP wire envelope: a heterogeneous list
/// `(header, [(is_full, tx)…], trailer, total_difficulty, number)`.
///
/// `header` and `trailer` are opaque blobs carried through as raw RLP items
/// (each must already be one well-formed RLP item).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RlpBlockEnvelope {
    pub header: Vec<u8>,
    pub txs: Vec<CompressedTx>,
    pub trailer: Vec<u8>,
    pub total_difficulty: U256,
    pub number: U256,
}

impl RlpBlockEnvelope {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(5);
        s.append_raw(&self.header, 1);
        s.begin_list(self.txs.len());
        for tx in &self.txs {
            s.begin_list(2);
            s.append(&tx.is_full);
            s.append(&tx.tx);
        }
        s.append_raw(&self.trailer, 1);
        s.append(&self.total_difficulty);
        s.append(&self.number);
        s.out().to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let rlp = Rlp::new(bytes);
        if rlp.item_count()? != 5 {
            return Err(CodecError::Rlp(format!(
                "expected 5 envelope items, got {}",
                rlp.item_count()?
            )));
        }

        let header = rlp.at(0)?.as_raw().to_vec();

        let txs_rlp = rlp.at(1)?;
        let tx_count = txs_rlp.item_count()?;
        let mut txs = Vec::with_capacity(tx_count);
        for i in 0..tx_count {
            let item = txs_rlp.at(i)?;
            txs.push(CompressedTx {
                is_full: item.val_at(0)?,
                tx: item.val_at(1)?,
            });
        }

        Ok(Self {
            header,
            txs,
            trailer: rlp.at(2)?.as_raw().to_vec(),
            total_difficulty: rlp.val_at(3)?,
            number: rlp.val_at(4)?,
        })
    }
}

/// Total encoded size of an RLP list whose payload occupies `payload_len`
/// bytes (payload plus the list header).
#[must_use]
pub fn rlp_list_size(payload_len: u64) -> u64 {
    if payload_len < 56 {
        1 + payload_len
    } else {
        let mut len_bytes = 0u64;
        let mut rest = payload_len;
        while rest > 0 {
            len_bytes += 1;
            rest >>= 8;
        }
        1 + len_bytes + payload_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Wrap opaque bytes into a single valid RLP item for use as a blob.
    fn blob(data: &[u8]) -> Vec<u8> {
        rlp::encode(&data.to_vec()).to_vec()
    }

    #[test]
    fn test_round_trip() {
        let envelope = RlpBlockEnvelope {
            header: blob(&[0xAA; 40]),
            txs: vec![
                CompressedTx::full(vec![0x01, 0x02, 0x03]),
                CompressedTx::placeholder(),
                CompressedTx::full(vec![0xFF; 70]),
                CompressedTx::placeholder(),
            ],
            trailer: blob(&[0xBB; 8]),
            total_difficulty: U256::from(58_750_003_716_598_352_816_469u128),
            number: U256::from(15_537_394u64),
        };
        let encoded = envelope.encode();
        let decoded = RlpBlockEnvelope::decode(&encoded).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_empty_tx_list() {
        let envelope = RlpBlockEnvelope {
            header: blob(b"h"),
            txs: vec![],
            trailer: blob(b"t"),
            total_difficulty: U256::zero(),
            number: U256::one(),
        };
        let decoded = RlpBlockEnvelope::decode(&envelope.encode()).unwrap();
        assert!(decoded.txs.is_empty());
        assert_eq!(decoded.number, U256::one());
    }

    #[test]
    fn test_truncated_input_fails() {
        let envelope = RlpBlockEnvelope {
            header: blob(b"header"),
            txs: vec![CompressedTx::full(vec![1, 2, 3])],
            trailer: blob(b"trailer"),
            total_difficulty: U256::from(7),
            number: U256::from(9),
        };
        let mut encoded = envelope.encode();
        encoded.truncate(encoded.len() - 3);
        assert!(RlpBlockEnvelope::decode(&encoded).is_err());
    }

    #[test]
    fn test_wrong_item_count_fails() {
        let mut s = RlpStream::new_list(2);
        s.append(&1u8);
        s.append(&2u8);
        let err = RlpBlockEnvelope::decode(&s.out()).unwrap_err();
        assert!(matches!(err, CodecError::Rlp(_)));
    }

    #[test]
    fn test_list_size() {
        assert_eq!(rlp_list_size(0), 1);
        assert_eq!(rlp_list_size(55), 56);
        assert_eq!(rlp_list_size(56), 58);
        assert_eq!(rlp_list_size(255), 257);
        assert_eq!(rlp_list_size(256), 259);
        assert_eq!(rlp_list_size(65_536), 65_540);
    }
}
