use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub type NodeId = u64;

/// Replica ids above this bound are rejected by vector-clock advances.
/// Clock entries are per-replica, so ids are expected to stay within the
/// cluster's (small) id space; anything larger is a caller bug.
pub const MAX_REPLICA_ID: NodeId = u16::MAX as NodeId;

/// One cluster member, as reported by membership (external). Identity is the
/// id; host and zone are routing metadata the write path only logs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub host: String,
    pub zone: u32,
}

impl Node {
    pub fn new(id: NodeId, host: impl Into<String>, zone: u32) -> Self {
        Node { id, host: host.into(), zone }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {} ({}, zone {})", self.id, self.host, self.zone)
    }
}

/// An opaque record identifier. Equality and hashing are byte-exact.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Key(Vec<u8>);

impl Key {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Key(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for Key {
    fn from(bytes: &[u8]) -> Self {
        Key(bytes.to_vec())
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.as_bytes().to_vec())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keys are usually printable; fall back to hex when they are not.
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "Key({s:?})"),
            Err(_) => {
                write!(f, "Key(0x")?;
                for b in &self.0 {
                    write!(f, "{b:02x}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Direct delivery to a replica failed; the original cause recorded by
    /// the preference-list delivery step.
    #[error("put operation failed on node {node}: {reason}")]
    Unreachable { node: NodeId, reason: String },

    /// Direct delivery failed, but the write was durably queued to slop
    /// storage for eventual delivery. Degraded success, not data loss.
    #[error("put operation failed on node {node}, but has been persisted to slop storage for eventual delivery")]
    UnreachableButQueued {
        node: NodeId,
        #[source]
        source: Box<StoreError>,
    },

    /// Neither direct delivery nor any slop-capable node accepted the write.
    /// The durability contract may not have been met.
    #[error("no slop-capable node available for node {node}")]
    InsufficientOperationalNodes {
        node: NodeId,
        #[source]
        source: Box<StoreError>,
    },

    /// Programming-contract violation; never expected in normal operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation timed out")]
    Timeout,

    #[error("storage error: {0}")]
    Storage(String),
}

/// Injected time source, in milliseconds since the Unix epoch.
///
/// Vector-clock advances and slop timestamps take their time from here rather
/// than sampling the wall clock internally, so they stay deterministic under
/// test.
pub trait WallClock: Send + Sync + 'static {
    fn now_ms(&self) -> i64;
}

/// Production clock backed by `SystemTime`.
#[derive(Debug, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

/// Manually driven clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        ManualClock { now_ms: AtomicI64::new(now_ms) }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl WallClock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
