use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use norn_types::{Node, NodeId};
use norn_versioning::VectorClock;

use crate::slop::Slop;
use crate::store::SlopStore;

/// Capability to stash a deferred-operation record somewhere other than its
/// failed target.
///
/// `send_hint` never raises into the caller: a failed attempt is communicated
/// purely through the returned boolean (plus warn-level diagnostics), and the
/// decision about the overall write's fate stays with the caller.
pub trait HintedHandoff: Send + Sync + 'static {
    /// Attempt to durably place `slop` at some node other than `target` (the
    /// node that failed). Returns whether any node accepted it.
    fn send_hint(
        &self,
        target: &Node,
        version: &VectorClock,
        slop: Slop,
    ) -> impl Future<Output = bool> + Send;
}

/// Node-selection strategy for hint destinations. Cluster-topology-aware
/// implementations (proximity, zone-crossing) live with the routing layer;
/// this crate ships only the trivial ordering below.
pub trait HintTargetSelector: Send + Sync + 'static {
    /// Candidate destinations for a hint whose true target is `failed`,
    /// best first. Must not include `failed` itself.
    fn select(&self, failed: &Node) -> Vec<Node>;
}

/// Candidates are all registered members except the failed node, in ascending
/// id order. Deterministic, which keeps tests and replay reproducible.
pub struct NodeIdOrder {
    members: Vec<Node>,
}

impl NodeIdOrder {
    pub fn new(mut members: Vec<Node>) -> Self {
        members.sort_by_key(|n| n.id);
        NodeIdOrder { members }
    }
}

impl HintTargetSelector for NodeIdOrder {
    fn select(&self, failed: &Node) -> Vec<Node> {
        self.members
            .iter()
            .filter(|n| n.id != failed.id)
            .cloned()
            .collect()
    }
}

/// `HintedHandoff` over a set of reachable slop stores, one per cluster
/// member. Candidates come from the selector; every stash attempt is bounded
/// by `timeout` so a hung store cannot stall the write pipeline.
pub struct ClusterHandoff<S, P> {
    stores: HashMap<NodeId, Arc<S>>,
    selector: P,
    timeout: Duration,
}

impl<S: SlopStore, P: HintTargetSelector> ClusterHandoff<S, P> {
    pub fn new(selector: P, timeout: Duration) -> Self {
        ClusterHandoff { stores: HashMap::new(), selector, timeout }
    }

    /// Register the slop store handle for one reachable member.
    pub fn register(&mut self, node_id: NodeId, store: Arc<S>) {
        self.stores.insert(node_id, store);
    }
}

impl<S: SlopStore, P: HintTargetSelector> HintedHandoff for ClusterHandoff<S, P> {
    async fn send_hint(&self, target: &Node, version: &VectorClock, slop: Slop) -> bool {
        for candidate in self.selector.select(target) {
            if candidate.id == target.id {
                // Selector contract violation; never hand the hint back to
                // the node that just failed.
                continue;
            }
            let Some(store) = self.stores.get(&candidate.id) else {
                continue;
            };

            match tokio::time::timeout(self.timeout, store.put(slop.clone(), version.clone())).await
            {
                Ok(Ok(())) => {
                    tracing::debug!(
                        target_node = target.id,
                        slop_node = candidate.id,
                        store = slop.store_name(),
                        "hint queued to slop storage"
                    );
                    return true;
                }
                Ok(Err(err)) => {
                    tracing::warn!(
                        target_node = target.id,
                        slop_node = candidate.id,
                        %err,
                        "slop store refused hint"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        target_node = target.id,
                        slop_node = candidate.id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "slop store timed out"
                    );
                }
            }
        }

        tracing::warn!(target_node = target.id, "no slop-capable node accepted the hint");
        false
    }
}
