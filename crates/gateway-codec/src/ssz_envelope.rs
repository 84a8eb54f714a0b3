//! SSZ envelope for compressed consensus-layer blocks.
//!
//! The container is fixed by the wire format:
//!
//! ```text
//! { block:  ByteList[367832],
//!   txs:    List[{is_full: bool, tx: ByteList[2^30]}, 2^20],
//!   number: u64 }
//! ```
//!
//! Standard SSZ offset encoding: the fixed region holds two 4-byte offsets
//! and the little-endian `number`; variable fields follow in order.

use crate::{CodecError, CompressedTx};

/// Maximum encoded size of the beacon block blob.
pub const MAX_BLOCK_LEN: usize = 367_832;
/// Maximum number of transaction slots.
pub const MAX_TX_COUNT: usize = 1 << 20;
/// Maximum size of one transaction.
pub const MAX_TX_LEN: usize = 1 << 30;

/// Fixed region: offset(block) + offset(txs) + number.
const FIXED_LEN: usize = 4 + 4 + 8;
/// Fixed region of one transaction slot: is_full + offset(tx).
const TX_FIXED_LEN: usize = 1 + 4;

/// The SSZ wire envelope for a compressed beacon block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SszBlockEnvelope {
    pub block: Vec<u8>,
    pub txs: Vec<CompressedTx>,
    pub number: u64,
}

impl SszBlockEnvelope {
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if self.block.len() > MAX_BLOCK_LEN {
            return Err(CodecError::SszOversize {
                field: "block",
                len: self.block.len(),
                max: MAX_BLOCK_LEN,
            });
        }
        if self.txs.len() > MAX_TX_COUNT {
            return Err(CodecError::SszOversize {
                field: "txs",
                len: self.txs.len(),
                max: MAX_TX_COUNT,
            });
        }

        let mut out = Vec::with_capacity(FIXED_LEN + self.block.len());
        out.extend_from_slice(&(FIXED_LEN as u32).to_le_bytes());
        out.extend_from_slice(&((FIXED_LEN + self.block.len()) as u32).to_le_bytes());
        out.extend_from_slice(&self.number.to_le_bytes());
        out.extend_from_slice(&self.block);

        // Transaction list: per-element offsets, then the elements.
        let mut offset = 4 * self.txs.len();
        for tx in &self.txs {
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            offset += TX_FIXED_LEN + tx.tx.len();
        }
        for tx in &self.txs {
            if tx.tx.len() > MAX_TX_LEN {
                return Err(CodecError::SszOversize {
                    field: "tx",
                    len: tx.tx.len(),
                    max: MAX_TX_LEN,
                });
            }
            out.push(u8::from(tx.is_full));
            out.extend_from_slice(&(TX_FIXED_LEN as u32).to_le_bytes());
            out.extend_from_slice(&tx.tx);
        }

        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < FIXED_LEN {
            return Err(CodecError::SszUnderflow {
                offset: 0,
                needed: FIXED_LEN,
                have: bytes.len(),
            });
        }

        let block_offset = read_u32(bytes, 0) as usize;
        let txs_offset = read_u32(bytes, 4) as usize;
        let number = u64::from_le_bytes(
            bytes[8..16].try_into().unwrap_or_else(|_| unreachable!()),
        );

        if block_offset != FIXED_LEN {
            return Err(CodecError::SszBadOffset {
                offset: block_offset,
                len: bytes.len(),
            });
        }
        if txs_offset < block_offset || txs_offset > bytes.len() {
            return Err(CodecError::SszBadOffset {
                offset: txs_offset,
                len: bytes.len(),
            });
        }

        let block = bytes[block_offset..txs_offset].to_vec();
        if block.len() > MAX_BLOCK_LEN {
            return Err(CodecError::SszOversize {
                field: "block",
                len: block.len(),
                max: MAX_BLOCK_LEN,
            });
        }

        let txs = decode_tx_list(&bytes[txs_offset..])?;
        Ok(Self { block, txs, number })
    }
}

fn decode_tx_list(blob: &[u8]) -> Result<Vec<CompressedTx>, CodecError> {
    if blob.is_empty() {
        return Ok(Vec::new());
    }
    if blob.len() < 4 {
        return Err(CodecError::SszUnderflow {
            offset: 0,
            needed: 4,
            have: blob.len(),
        });
    }

    let first_offset = read_u32(blob, 0) as usize;
    if first_offset == 0 || first_offset % 4 != 0 || first_offset > blob.len() {
        return Err(CodecError::SszBadOffset {
            offset: first_offset,
            len: blob.len(),
        });
    }
    let count = first_offset / 4;
    if count > MAX_TX_COUNT {
        return Err(CodecError::SszOversize {
            field: "txs",
            len: count,
            max: MAX_TX_COUNT,
        });
    }

    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        let offset = read_u32(blob, i * 4) as usize;
        if offset > blob.len() {
            return Err(CodecError::SszBadOffset {
                offset,
                len: blob.len(),
            });
        }
        if let Some(&prev) = offsets.last() {
            if offset < prev {
                return Err(CodecError::SszBadOffset {
                    offset,
                    len: blob.len(),
                });
            }
        }
        offsets.push(offset);
    }

    let mut txs = Vec::with_capacity(count);
    for i in 0..count {
        let start = offsets[i];
        let end = offsets.get(i + 1).copied().unwrap_or(blob.len());
        txs.push(decode_tx_slot(&blob[start..end], start)?);
    }
    Ok(txs)
}

fn decode_tx_slot(element: &[u8], at: usize) -> Result<CompressedTx, CodecError> {
    if element.len() < TX_FIXED_LEN {
        return Err(CodecError::SszUnderflow {
            offset: at,
            needed: TX_FIXED_LEN,
            have: element.len(),
        });
    }
    let is_full = match element[0] {
        0 => false,
        1 => true,
        other => return Err(CodecError::SszBadBool(other)),
    };
    let tx_offset = read_u32(element, 1) as usize;
    if tx_offset != TX_FIXED_LEN {
        return Err(CodecError::SszBadOffset {
            offset: tx_offset,
            len: element.len(),
        });
    }
    let tx = element[TX_FIXED_LEN..].to_vec();
    if tx.len() > MAX_TX_LEN {
        return Err(CodecError::SszOversize {
            field: "tx",
            len: tx.len(),
            max: MAX_TX_LEN,
        });
    }
    Ok(CompressedTx { is_full, tx })
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

/// On-wire byte size of one beacon-block transaction.
///
/// Beacon bodies carry non-legacy transactions with the type byte outside
/// the RLP envelope, while the gateway's internal form keeps it inside; SSZ
/// adds a 4-byte length prefix per transaction. The correction below
/// accounts for both, keyed off the first byte of the internal encoding.
#[must_use]
pub fn beacon_transaction_length(raw_tx: &[u8]) -> usize {
    if raw_tx.is_empty() {
        return 0;
    }

    let mut len = raw_tx.len() as i64 + 4;
    let first = raw_tx[0];
    if first < 0xC0 {
        if first == 0x80 {
            len -= 2;
        } else if first > 0x80 {
            len -= i64::from(first) - 0xB7 + 1;
        }
    }
    len.max(0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let envelope = SszBlockEnvelope {
            block: vec![0x5A; 300],
            txs: vec![
                CompressedTx::full(vec![0xC1; 64]),
                CompressedTx::placeholder(),
                CompressedTx::full(vec![]),
                CompressedTx::placeholder(),
                CompressedTx::full(vec![0x02; 1500]),
            ],
            number: 6_000_123,
        };
        let encoded = envelope.encode().unwrap();
        let decoded = SszBlockEnvelope::decode(&encoded).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_empty_lists() {
        let envelope = SszBlockEnvelope {
            block: vec![],
            txs: vec![],
            number: 0,
        };
        let decoded = SszBlockEnvelope::decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_truncated_fixed_region() {
        let err = SszBlockEnvelope::decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, CodecError::SszUnderflow { .. }));
    }

    #[test]
    fn test_corrupt_offset_rejected() {
        let envelope = SszBlockEnvelope {
            block: vec![1, 2, 3],
            txs: vec![CompressedTx::full(vec![9])],
            number: 1,
        };
        let mut encoded = envelope.encode().unwrap();
        // Point the txs offset past the end of the payload.
        encoded[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        let err = SszBlockEnvelope::decode(&encoded).unwrap_err();
        assert!(matches!(err, CodecError::SszBadOffset { .. }));
    }

    #[test]
    fn test_bad_bool_rejected() {
        let envelope = SszBlockEnvelope {
            block: vec![],
            txs: vec![CompressedTx::full(vec![7, 7])],
            number: 1,
        };
        let mut encoded = envelope.encode().unwrap();
        // The is_full byte of the first slot sits right after its offset table.
        let slot_start = FIXED_LEN + 4;
        encoded[slot_start] = 0x17;
        let err = SszBlockEnvelope::decode(&encoded).unwrap_err();
        assert_eq!(err, CodecError::SszBadBool(0x17));
    }

    #[test]
    fn test_oversized_block_rejected() {
        let envelope = SszBlockEnvelope {
            block: vec![0; MAX_BLOCK_LEN + 1],
            txs: vec![],
            number: 1,
        };
        assert!(matches!(
            envelope.encode().unwrap_err(),
            CodecError::SszOversize { field: "block", .. }
        ));
    }

    #[test]
    fn test_beacon_transaction_length_table() {
        // Empty input.
        assert_eq!(beacon_transaction_length(&[]), 0);

        // Legacy transaction (RLP list, first byte >= 0xC0): length prefix only.
        let legacy = [0xF8, 0x01, 0x02];
        assert_eq!(beacon_transaction_length(&legacy), legacy.len() + 4);

        // Typed envelope wrapped as an empty RLP string.
        let empty_string = [0x80];
        assert_eq!(
            beacon_transaction_length(&empty_string),
            empty_string.len() + 4 - 2
        );

        // Long-string wrapper with a one-byte length field.
        let mut long1 = vec![0xB8, 0x40];
        long1.extend(std::iter::repeat(0u8).take(0x40));
        assert_eq!(beacon_transaction_length(&long1), long1.len() + 4 - 2);

        // Long-string wrapper with a two-byte length field.
        let mut long2 = vec![0xB9, 0x01, 0x00];
        long2.extend(std::iter::repeat(0u8).take(0x100));
        assert_eq!(beacon_transaction_length(&long2), long2.len() + 4 - 3);

        // Short-string wrapper: the correction term goes negative.
        let short = [0x81, 0xFF];
        let expected = (short.len() as i64 + 4 - (0x81i64 - 0xB7 + 1)) as usize;
        assert_eq!(beacon_transaction_length(&short), expected);
    }
}
