//! Contract to the transaction store.

use dashmap::DashMap;
use gateway_types::{Hash256, ShortId};
use std::time::Instant;

/// A stored transaction as the block processor sees it.
#[derive(Debug, Clone)]
pub struct StoredTx {
    pub hash: Hash256,
    /// Wire encoding of the transaction.
    pub content: Vec<u8>,
    /// Short IDs assigned by the relay network, oldest first.
    pub short_ids: Vec<ShortId>,
    /// When the store first saw the transaction.
    pub add_time: Instant,
}

/// Lookup surface of the external transaction store. The store itself, its
/// eviction policy, and its locking are outside the gateway core.
pub trait TxStore: Send + Sync {
    fn get(&self, hash: &Hash256) -> Option<StoredTx>;
    fn get_tx_by_short_id(&self, short_id: ShortId) -> Option<StoredTx>;
}

/// In-memory store used by the runtime wiring and by tests.
#[derive(Default)]
pub struct MemoryTxStore {
    by_hash: DashMap<Hash256, StoredTx>,
    by_short_id: DashMap<ShortId, Hash256>,
}

impl MemoryTxStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction, indexing every short ID it carries.
    pub fn add(&self, hash: Hash256, content: Vec<u8>, short_ids: Vec<ShortId>) {
        for short_id in &short_ids {
            self.by_short_id.insert(*short_id, hash);
        }
        self.by_hash.insert(
            hash,
            StoredTx {
                hash,
                content,
                short_ids,
                add_time: Instant::now(),
            },
        );
    }

    /// Attach another short ID to a known transaction.
    pub fn assign_short_id(&self, hash: &Hash256, short_id: ShortId) {
        if let Some(mut entry) = self.by_hash.get_mut(hash) {
            entry.short_ids.push(short_id);
            self.by_short_id.insert(short_id, *hash);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

impl TxStore for MemoryTxStore {
    fn get(&self, hash: &Hash256) -> Option<StoredTx> {
        self.by_hash.get(hash).map(|e| e.clone())
    }

    fn get_tx_by_short_id(&self, short_id: ShortId) -> Option<StoredTx> {
        let hash = *self.by_short_id.get(&short_id)?;
        self.by_hash.get(&hash).map(|e| e.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_types::keccak256;

    #[test]
    fn test_lookup_by_hash_and_short_id() {
        let store = MemoryTxStore::new();
        let hash = keccak256(b"tx");
        store.add(hash, vec![1, 2, 3], vec![42]);

        let by_hash = store.get(&hash).unwrap();
        assert_eq!(by_hash.content, vec![1, 2, 3]);
        assert_eq!(by_hash.short_ids, vec![42]);

        let by_sid = store.get_tx_by_short_id(42).unwrap();
        assert_eq!(by_sid.hash, hash);

        assert!(store.get_tx_by_short_id(43).is_none());
    }

    #[test]
    fn test_assign_short_id_later() {
        let store = MemoryTxStore::new();
        let hash = keccak256(b"late");
        store.add(hash, vec![9], vec![]);
        assert!(store.get(&hash).unwrap().short_ids.is_empty());

        store.assign_short_id(&hash, 7);
        assert_eq!(store.get(&hash).unwrap().short_ids, vec![7]);
        assert_eq!(store.get_tx_by_short_id(7).unwrap().hash, hash);
    }
}
