use std::collections::BTreeMap;

use norn_types::{NodeId, StoreError, MAX_REPLICA_ID};

/// Result of comparing two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurred {
    /// `self` causally precedes `other`.
    Before,
    /// `self` causally follows `other`.
    After,
    /// Identical counters.
    Equal,
    /// Neither dominates: the writes happened concurrently.
    Concurrent,
}

/// Causal version: one monotonically increasing counter per replica, plus the
/// wall-clock time of the last advance.
///
/// The counter map is a `BTreeMap` so iteration (and therefore serialization
/// and `Debug` output) is deterministic; comparison itself never depends on
/// iteration order. The timestamp is bookkeeping for slop replay and conflict
/// diagnostics — it takes no part in equality or causal comparison.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct VectorClock {
    entries: BTreeMap<NodeId, u64>,
    timestamp_ms: i64,
}

impl VectorClock {
    pub fn new() -> Self {
        VectorClock::default()
    }

    /// Counter for `replica_id`; absent entries count as zero.
    pub fn counter(&self, replica_id: NodeId) -> u64 {
        self.entries.get(&replica_id).copied().unwrap_or(0)
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// Number of replicas with a non-zero counter.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, u64)> + '_ {
        self.entries.iter().map(|(&id, &c)| (id, c))
    }

    /// Return a copy of this clock advanced for `replica_id` at `now_ms`.
    ///
    /// The result strictly causally follows `self`: the counter for
    /// `replica_id` is incremented by exactly one and every other counter is
    /// unchanged. `now_ms` is supplied by the caller so the advance stays
    /// deterministic under test.
    pub fn incremented(&self, replica_id: NodeId, now_ms: i64) -> Result<VectorClock, StoreError> {
        if replica_id > MAX_REPLICA_ID {
            return Err(StoreError::InvalidArgument(format!(
                "replica id {replica_id} exceeds maximum {MAX_REPLICA_ID}"
            )));
        }

        let mut next = self.clone();
        *next.entries.entry(replica_id).or_insert(0) += 1;
        next.timestamp_ms = now_ms;
        Ok(next)
    }

    /// Causal comparison, a pure function of the two counter maps.
    pub fn compare(&self, other: &VectorClock) -> Occurred {
        let mut self_greater = false;
        let mut other_greater = false;

        for (&id, &count) in &self.entries {
            match count.cmp(&other.counter(id)) {
                std::cmp::Ordering::Greater => self_greater = true,
                std::cmp::Ordering::Less => other_greater = true,
                std::cmp::Ordering::Equal => {}
            }
        }
        for (&id, &count) in &other.entries {
            if count > self.counter(id) {
                other_greater = true;
            }
        }

        match (self_greater, other_greater) {
            (true, false) => Occurred::After,
            (false, true) => Occurred::Before,
            (false, false) => Occurred::Equal,
            (true, true) => Occurred::Concurrent,
        }
    }

    /// Pointwise maximum of both clocks. The merged clock dominates (or
    /// equals) both inputs; its timestamp is the later of the two.
    pub fn merged(&self, other: &VectorClock) -> VectorClock {
        let mut entries = self.entries.clone();
        for (&id, &count) in &other.entries {
            let entry = entries.entry(id).or_insert(0);
            *entry = (*entry).max(count);
        }
        VectorClock {
            entries,
            timestamp_ms: self.timestamp_ms.max(other.timestamp_ms),
        }
    }
}

/// Counters only; the timestamp is not part of the causal identity.
impl PartialEq for VectorClock {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for VectorClock {}

/// A payload paired with its causal version. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Versioned<T = Vec<u8>> {
    value: T,
    version: VectorClock,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: VectorClock) -> Self {
        Versioned { value, version }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn version(&self) -> &VectorClock {
        &self.version
    }

    pub fn into_parts(self) -> (T, VectorClock) {
        (self.value, self.version)
    }
}
