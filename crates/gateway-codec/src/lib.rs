//! # Compressed-Block Envelope Codecs
//!
//! Two wire envelopes carry compressed blocks between gateways:
//!
//! - **RLP** for execution-layer blocks:
//!   `(header, [(is_full, tx)…], trailer, total_difficulty, number)`
//! - **SSZ** for consensus-layer blocks:
//!   `{block: bytes, txs: [(is_full, tx)…], number: u64}`
//!
//! A transaction entry is either fully present (`is_full = true`) or a
//! placeholder whose position lines up with an entry of the outer
//! broadcast's short-ID list.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod rlp_envelope;
pub mod ssz_envelope;

pub use rlp_envelope::{rlp_list_size, RlpBlockEnvelope};
pub use ssz_envelope::{beacon_transaction_length, SszBlockEnvelope};

use thiserror::Error;

/// Errors from envelope encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("rlp envelope decoding failed: {0}")]
    Rlp(String),

    #[error("ssz envelope underflow: needed {needed} bytes at offset {offset}, have {have}")]
    SszUnderflow {
        offset: usize,
        needed: usize,
        have: usize,
    },

    #[error("ssz offset {offset} out of order or out of bounds (len {len})")]
    SszBadOffset { offset: usize, len: usize },

    #[error("ssz {field} length {len} exceeds maximum {max}")]
    SszOversize {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid boolean byte {0:#04x} in ssz envelope")]
    SszBadBool(u8),
}

impl From<rlp::DecoderError> for CodecError {
    fn from(e: rlp::DecoderError) -> Self {
        CodecError::Rlp(e.to_string())
    }
}

/// One transaction slot of a compressed block: either the full bytes or a
/// placeholder to be filled from the short-ID list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedTx {
    pub is_full: bool,
    pub tx: Vec<u8>,
}

impl CompressedTx {
    /// A fully inlined transaction.
    pub fn full(tx: Vec<u8>) -> Self {
        Self { is_full: true, tx }
    }

    /// A short-ID placeholder.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            is_full: false,
            tx: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_empty() {
        let slot = CompressedTx::placeholder();
        assert!(!slot.is_full);
        assert!(slot.tx.is_empty());
    }
}
