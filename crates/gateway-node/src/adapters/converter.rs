//! Conversion between the Ethereum ecosystem's representations and the
//! gateway's internal ones.

use gateway_bridge::{ConvertError, Converter};
use gateway_types::{
    Block, BlockTransaction, BlockType, EthTransaction, Hash256, NetworkNum, Tx, TxFlags, U256,
};

/// An execution-layer block as the node workers hand it over: opaque RLP
/// header and uncles items plus the wire encodings of its transactions.
#[derive(Debug, Clone)]
pub struct EthNodeBlock {
    pub hash: Hash256,
    pub header: Vec<u8>,
    pub transactions: Vec<Vec<u8>>,
    pub uncles: Vec<u8>,
    pub total_difficulty: U256,
    pub number: u64,
}

/// Converter for Ethereum execution-layer payloads.
pub struct EthConverter {
    pub network_num: NetworkNum,
}

impl Converter for EthConverter {
    type NodeTx = EthTransaction;
    type NodeBlock = EthNodeBlock;

    fn transaction_to_gateway(&self, tx: EthTransaction) -> Result<Tx, ConvertError> {
        Ok(Tx::new(
            tx.hash(),
            tx.encode_wire(),
            self.network_num,
            TxFlags::default(),
            gateway_types::AccountId::default(),
        ))
    }

    fn transaction_from_gateway(&self, tx: &Tx) -> Result<EthTransaction, ConvertError> {
        EthTransaction::decode_wire(&tx.content).map_err(|e| ConvertError::Transaction(e.to_string()))
    }

    fn block_to_gateway(&self, block: EthNodeBlock) -> Result<Block, ConvertError> {
        let mut txs = Vec::with_capacity(block.transactions.len());
        let mut size = block.header.len() + block.uncles.len();
        for raw in block.transactions {
            let eth_tx = EthTransaction::decode_wire(&raw)
                .map_err(|e| ConvertError::Block(e.to_string()))?;
            size += raw.len();
            txs.push(BlockTransaction::new(eth_tx.hash(), raw));
        }
        Ok(Block::new(
            block.hash,
            Hash256::ZERO,
            BlockType::Eth,
            block.header,
            txs,
            block.uncles,
            Some(block.total_difficulty),
            block.number,
            size,
        ))
    }

    fn block_from_gateway(&self, block: &Block) -> Result<EthNodeBlock, ConvertError> {
        if block.block_type != BlockType::Eth {
            return Err(ConvertError::Block(format!(
                "cannot convert block type {:?} to an execution-layer block",
                block.block_type
            )));
        }
        Ok(EthNodeBlock {
            hash: block.hash,
            header: block.header.clone(),
            transactions: block.txs.iter().map(|t| t.content().to_vec()).collect(),
            uncles: block.trailer.clone(),
            total_difficulty: block.total_difficulty.unwrap_or_default(),
            number: block.number,
        })
    }
}
