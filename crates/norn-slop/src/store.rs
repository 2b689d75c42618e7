use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;

use norn_types::{Key, NodeId, StoreError};
use norn_versioning::VectorClock;

use crate::keys::{node_prefix, slop_key};
use crate::slop::Slop;

fn encode<T: serde::Serialize>(val: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serde::encode_to_vec(val, bincode::config::standard())
        .map_err(|e| StoreError::Storage(e.to_string()))
}

fn decode<T: for<'de> serde::Deserialize<'de>>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(v, _)| v)
        .map_err(|e| StoreError::Storage(e.to_string()))
}

/// Durable holding area for deferred-operation records.
///
/// Methods use RPITIT (`-> impl Future + Send`) matching the `HintedHandoff`
/// and `ReplicaStore` traits. This avoids any `async-trait` dependency.
///
/// A record is keyed by `(target node, store, key)` — see [`crate::keys`] —
/// so stashing the same hint twice overwrites rather than duplicates, which
/// makes handoff retries idempotent-safe.
pub trait SlopStore: Send + Sync + 'static {
    /// Durably accept one record together with the version it carries.
    fn put(
        &self,
        slop: Slop,
        version: VectorClock,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// All records waiting for delivery to `node_id`, in storage-key order.
    /// Consumed by the slop pusher (external).
    fn pending_for_node(
        &self,
        node_id: NodeId,
    ) -> impl Future<Output = Result<Vec<(Slop, VectorClock)>, StoreError>> + Send;

    /// Remove a delivered record. Returns whether it was present.
    fn remove(
        &self,
        node_id: NodeId,
        store_name: &str,
        key: &Key,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// Serialized per-record format stored in [`MemSlopStore`].
#[derive(serde::Serialize, serde::Deserialize)]
struct StoredHint {
    slop: Slop,
    version: VectorClock,
}

/// In-memory `SlopStore` backed by a `BTreeMap` of bincode-encoded records.
///
/// Intended for unit tests and the demo binary; not persisted across
/// restarts.
#[derive(Clone)]
pub struct MemSlopStore {
    inner: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemSlopStore {
    pub fn new() -> Self {
        MemSlopStore { inner: Arc::new(RwLock::new(BTreeMap::new())) }
    }

    /// Total number of stashed records, across all target nodes.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

impl Default for MemSlopStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SlopStore for MemSlopStore {
    async fn put(&self, slop: Slop, version: VectorClock) -> Result<(), StoreError> {
        if slop.store_name().is_empty() {
            return Err(StoreError::InvalidArgument("slop store name must not be empty".into()));
        }
        let key = slop.make_key();
        let encoded = encode(&StoredHint { slop, version })?;
        self.inner.write().await.insert(key, encoded);
        Ok(())
    }

    async fn pending_for_node(&self, node_id: NodeId) -> Result<Vec<(Slop, VectorClock)>, StoreError> {
        let prefix = node_prefix(node_id);
        let g = self.inner.read().await;
        let mut out = Vec::new();
        for (_, raw) in g.range(prefix.to_vec()..).take_while(|(k, _)| k.starts_with(&prefix)) {
            let hint: StoredHint = decode(raw)?;
            out.push((hint.slop, hint.version));
        }
        Ok(out)
    }

    async fn remove(&self, node_id: NodeId, store_name: &str, key: &Key) -> Result<bool, StoreError> {
        let storage_key = slop_key(node_id, store_name, key);
        Ok(self.inner.write().await.remove(&storage_key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slop::SlopOp;

    fn put_slop(node_id: NodeId, key: &str, value: &[u8]) -> Slop {
        Slop::new("demo", SlopOp::Put, Key::from(key), Some(value.to_vec()), node_id, 100)
    }

    #[tokio::test]
    async fn put_pending_remove_round_trip() {
        let store = MemSlopStore::new();
        let version = VectorClock::new().incremented(1, 100).unwrap();

        store.put(put_slop(2, "k1", b"v1"), version.clone()).await.unwrap();
        store.put(put_slop(2, "k2", b"v2"), version.clone()).await.unwrap();
        store.put(put_slop(3, "k1", b"v3"), version.clone()).await.unwrap();

        let pending = store.pending_for_node(2).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|(s, v)| s.node_id() == 2 && *v == version));

        let removed = store.remove(2, "demo", &Key::from("k1")).await.unwrap();
        assert!(removed);
        assert_eq!(store.pending_for_node(2).await.unwrap().len(), 1);
        assert_eq!(store.pending_for_node(3).await.unwrap().len(), 1);

        // Removing again is a no-op.
        assert!(!store.remove(2, "demo", &Key::from("k1")).await.unwrap());
    }

    #[tokio::test]
    async fn retried_hint_overwrites() {
        let store = MemSlopStore::new();
        let version = VectorClock::new().incremented(1, 100).unwrap();

        store.put(put_slop(2, "k", b"old"), version.clone()).await.unwrap();
        store.put(put_slop(2, "k", b"new"), version.clone()).await.unwrap();

        let pending = store.pending_for_node(2).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0.value(), Some(&b"new"[..]));
    }

    #[tokio::test]
    async fn empty_store_name_rejected() {
        let store = MemSlopStore::new();
        let version = VectorClock::new();
        let slop = Slop::new("", SlopOp::Put, Key::from("k"), Some(vec![1]), 2, 0);
        let err = store.put(slop, version).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn pending_survives_encode_decode() {
        let store = MemSlopStore::new();
        let version = VectorClock::new().incremented(5, 7).unwrap();
        let slop = Slop::new("demo", SlopOp::Delete, Key::from("gone"), None, 9, 123);

        store.put(slop.clone(), version.clone()).await.unwrap();
        let pending = store.pending_for_node(9).await.unwrap();
        assert_eq!(pending, vec![(slop, version)]);
    }
}
