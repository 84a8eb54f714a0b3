//! Conversion seam between node-side and gateway-side representations.

use gateway_types::{Block, Tx};
use thiserror::Error;

/// Errors from representation conversion.
#[derive(Debug, Clone, Error)]
pub enum ConvertError {
    #[error("transaction conversion failed: {0}")]
    Transaction(String),

    #[error("block conversion failed: {0}")]
    Block(String),
}

/// Translates between the blockchain ecosystem's transaction/block types and
/// the gateway's internal ones. The bridge embeds one of these; everything
/// else depends only on the four operations, never on the node-side types.
pub trait Converter: Send + Sync {
    /// Node-side transaction representation.
    type NodeTx;
    /// Node-side block representation.
    type NodeBlock;

    fn transaction_to_gateway(&self, tx: Self::NodeTx) -> Result<Tx, ConvertError>;
    fn transaction_from_gateway(&self, tx: &Tx) -> Result<Self::NodeTx, ConvertError>;
    fn block_to_gateway(&self, block: Self::NodeBlock) -> Result<Block, ConvertError>;
    fn block_from_gateway(&self, block: &Block) -> Result<Self::NodeBlock, ConvertError>;
}
