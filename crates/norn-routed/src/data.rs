use norn_types::{Node, NodeId, StoreError};
use norn_versioning::Versioned;

/// Per-node handoff diagnostic: whether the hint for `node` was durably
/// queued. Kept alongside the single fatal-error slot so callers can see the
/// full picture even though the verdict is last-write-wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HintOutcome {
    pub node: NodeId,
    pub queued: bool,
}

/// Mutable context shared by all actions executing one client put request.
///
/// Owned exclusively by the request's task; it is never shared across
/// requests, so no locking is involved. Created when routing begins, mutated
/// by each action, read once by the caller for the final verdict, then
/// discarded.
#[derive(Debug, Default)]
pub struct PutPipelineData {
    store_name: String,
    failed_nodes: Vec<Node>,
    versioned_copy: Option<Versioned>,
    fatal_error: Option<StoreError>,
    hint_outcomes: Vec<HintOutcome>,
    cancelled: bool,
}

impl PutPipelineData {
    pub fn new(store_name: impl Into<String>) -> Self {
        PutPipelineData { store_name: store_name.into(), ..Default::default() }
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Record a node the direct write failed on. Each node is recorded at
    /// most once per request; the recorded order is the deterministic order
    /// the handoff action later processes.
    pub fn add_failed_node(&mut self, node: Node) {
        if !self.failed_nodes.iter().any(|n| n.id == node.id) {
            self.failed_nodes.push(node);
        }
    }

    pub fn failed_nodes(&self) -> &[Node] {
        &self.failed_nodes
    }

    /// The causally-advanced copy shared by all failed nodes of this request,
    /// once the handoff action has computed it.
    pub fn versioned_copy(&self) -> Option<&Versioned> {
        self.versioned_copy.as_ref()
    }

    pub fn set_versioned_copy(&mut self, copy: Versioned) {
        self.versioned_copy = Some(copy);
    }

    pub fn fatal_error(&self) -> Option<&StoreError> {
        self.fatal_error.as_ref()
    }

    /// Remove and return the current verdict, typically to wrap it in a new
    /// classification before putting it back.
    pub fn take_fatal_error(&mut self) -> Option<StoreError> {
        self.fatal_error.take()
    }

    pub fn set_fatal_error(&mut self, error: StoreError) {
        self.fatal_error = Some(error);
    }

    pub fn hint_outcomes(&self) -> &[HintOutcome] {
        &self.hint_outcomes
    }

    pub fn push_hint_outcome(&mut self, outcome: HintOutcome) {
        self.hint_outcomes.push(outcome);
    }

    /// Mark the request cancelled (client disconnect). Actions check this
    /// before starting each per-node step; they still signal completion.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}
