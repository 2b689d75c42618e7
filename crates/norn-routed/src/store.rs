use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use norn_types::{Key, NodeId, StoreError};
use norn_versioning::{Occurred, Versioned};

/// Write surface of one replica, as seen from the routing layer. The real
/// implementation sits behind the network transport (external); the in-memory
/// one below backs tests and the demo binary.
pub trait ReplicaStore: Send + Sync + 'static {
    fn put(
        &self,
        key: &Key,
        versioned: &Versioned,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get(&self, key: &Key) -> impl Future<Output = Result<Option<Versioned>, StoreError>> + Send;
}

/// In-memory `ReplicaStore` with failure injection.
///
/// Intended for unit tests and the demo binary; `set_down` makes every write
/// fail the way an unreachable node does.
pub struct MemReplicaStore {
    node_id: NodeId,
    data: Arc<RwLock<BTreeMap<Key, Versioned>>>,
    down: AtomicBool,
}

impl MemReplicaStore {
    pub fn new(node_id: NodeId) -> Self {
        MemReplicaStore {
            node_id,
            data: Arc::new(RwLock::new(BTreeMap::new())),
            down: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn is_down(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }
}

impl ReplicaStore for MemReplicaStore {
    async fn put(&self, key: &Key, versioned: &Versioned) -> Result<(), StoreError> {
        if self.is_down() {
            return Err(StoreError::Unreachable {
                node: self.node_id,
                reason: "node is down".into(),
            });
        }

        let mut g = self.data.write().await;
        if let Some(current) = g.get(key) {
            // A write whose version is dominated by (or equal to) the stored
            // one is obsolete and must not clobber newer data.
            if matches!(
                versioned.version().compare(current.version()),
                Occurred::Before | Occurred::Equal
            ) {
                return Err(StoreError::Storage(format!(
                    "obsolete version for key {key:?} on node {}",
                    self.node_id
                )));
            }
        }
        g.insert(key.clone(), versioned.clone());
        Ok(())
    }

    async fn get(&self, key: &Key) -> Result<Option<Versioned>, StoreError> {
        if self.is_down() {
            return Err(StoreError::Unreachable {
                node: self.node_id,
                reason: "node is down".into(),
            });
        }
        Ok(self.data.read().await.get(key).cloned())
    }
}
