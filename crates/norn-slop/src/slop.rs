use norn_types::{Key, NodeId};

/// Kind of write a slop defers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SlopOp {
    Put,
    Delete,
}

/// A deferred-operation record: one write (or delete) that was destined for
/// `node_id` but could not be delivered directly. Stashed at another node and
/// replayed to the true target by the slop pusher (external) once the target
/// is reachable again.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Slop {
    store_name: String,
    op: SlopOp,
    key: Key,
    /// `None` for deletes.
    value: Option<Vec<u8>>,
    node_id: NodeId,
    arrived_ms: i64,
}

impl Slop {
    pub fn new(
        store_name: impl Into<String>,
        op: SlopOp,
        key: Key,
        value: Option<Vec<u8>>,
        node_id: NodeId,
        arrived_ms: i64,
    ) -> Self {
        Slop {
            store_name: store_name.into(),
            op,
            key,
            value,
            node_id,
            arrived_ms,
        }
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn op(&self) -> SlopOp {
        self.op
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn arrived_ms(&self) -> i64 {
        self.arrived_ms
    }

    /// Storage key under which this record is stashed; see [`crate::keys`].
    pub fn make_key(&self) -> Vec<u8> {
        crate::keys::slop_key(self.node_id, &self.store_name, &self.key)
    }
}
