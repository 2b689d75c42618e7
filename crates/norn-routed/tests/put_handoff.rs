//! End-to-end put pipeline: preference-list delivery followed by hinted
//! handoff, against in-memory replicas and slop stores.

use std::sync::Arc;
use std::time::Duration;

use norn_routed::{
    Event, MemReplicaStore, PerformPutHintedHandoff, PerformSerialPut, Pipeline, PutPipelineData,
    ReplicaStore,
};
use norn_slop::{ClusterHandoff, MemSlopStore, NodeIdOrder, SlopStore};
use norn_types::{Key, ManualClock, Node, NodeId, StoreError};
use norn_versioning::{Versioned, VectorClock};

struct Cluster {
    nodes: Vec<Node>,
    replicas: Vec<Arc<MemReplicaStore>>,
    slop_stores: Vec<Arc<MemSlopStore>>,
}

impl Cluster {
    /// Three members; the listed ones are down. Slop stores are registered
    /// only for nodes that are up.
    fn new(down: &[NodeId]) -> Self {
        let nodes: Vec<Node> = (1..=3)
            .map(|id| Node::new(id, format!("node{id}.local"), 0))
            .collect();
        let replicas: Vec<Arc<MemReplicaStore>> = nodes
            .iter()
            .map(|n| {
                let store = Arc::new(MemReplicaStore::new(n.id));
                store.set_down(down.contains(&n.id));
                store
            })
            .collect();
        let slop_stores = nodes.iter().map(|_| Arc::new(MemSlopStore::new())).collect();
        Cluster { nodes, replicas, slop_stores }
    }

    fn handoff(&self) -> ClusterHandoff<MemSlopStore, NodeIdOrder> {
        let mut handoff = ClusterHandoff::new(
            NodeIdOrder::new(self.nodes.clone()),
            Duration::from_millis(50),
        );
        for (node, store) in self.nodes.iter().zip(&self.slop_stores) {
            if !self.replicas[(node.id - 1) as usize].is_down() {
                handoff.register(node.id, store.clone());
            }
        }
        handoff
    }

    async fn put(
        &self,
        handoff: ClusterHandoff<MemSlopStore, NodeIdOrder>,
        required: usize,
        clock: Arc<ManualClock>,
        versioned: Versioned,
    ) -> Result<PutPipelineData, StoreError> {
        let key = Key::from("user:42");
        let preference_list: Vec<(Node, Arc<MemReplicaStore>)> = self
            .nodes
            .iter()
            .cloned()
            .zip(self.replicas.iter().cloned())
            .collect();

        let mut pipeline = Pipeline::new();
        pipeline.register(
            Event::Started,
            Box::new(PerformSerialPut::new(
                preference_list,
                key.clone(),
                versioned.clone(),
                required,
                Event::Applied,
            )),
        );
        pipeline.register(
            Event::Applied,
            Box::new(PerformPutHintedHandoff::new(
                key,
                versioned,
                Arc::new(handoff),
                clock,
                Event::Completed,
            )),
        );

        let mut ctx = PutPipelineData::new("demo");
        pipeline.run(Event::Started, &mut ctx).await?;
        Ok(ctx)
    }
}

fn original_versioned() -> Versioned {
    // Written once by node 1: {1:1}@t0.
    let clock = VectorClock::new().incremented(1, 0).unwrap();
    Versioned::new(b"payload".to_vec(), clock)
}

#[tokio::test]
async fn quorum_met_hints_are_best_effort() {
    let cluster = Cluster::new(&[3]);
    let clock = Arc::new(ManualClock::new(1_000));
    let ctx = cluster
        .put(cluster.handoff(), 2, clock, original_versioned())
        .await
        .unwrap();

    // Two of three replicas took the write; the request succeeded and the
    // hint for node 3 is backup only.
    assert!(ctx.fatal_error().is_none());
    assert_eq!(ctx.failed_nodes().len(), 1);
    assert_eq!(ctx.hint_outcomes().len(), 1);
    assert!(ctx.hint_outcomes()[0].queued);

    // The hint landed on the first reachable member in id order.
    let pending = cluster.slop_stores[0].pending_for_node(3).await.unwrap();
    assert_eq!(pending.len(), 1);
    let (slop, version) = &pending[0];
    assert_eq!(slop.node_id(), 3);
    assert_eq!(slop.value(), Some(&b"payload"[..]));

    // Version advanced once for the first failed node (3) at the handoff time.
    let expected = VectorClock::new()
        .incremented(1, 0)
        .unwrap()
        .incremented(3, 1_000)
        .unwrap();
    assert_eq!(version, &expected);
    assert_eq!(version.timestamp_ms(), 1_000);
}

#[tokio::test]
async fn missed_quorum_with_handoff_degrades_instead_of_failing() {
    let cluster = Cluster::new(&[3]);
    let clock = Arc::new(ManualClock::new(1_000));
    // required = 3 cannot be met with one node down.
    let ctx = cluster
        .put(cluster.handoff(), 3, clock, original_versioned())
        .await
        .unwrap();

    match ctx.fatal_error() {
        Some(StoreError::UnreachableButQueued { node: 3, source }) => {
            assert!(matches!(source.as_ref(), StoreError::Unreachable { node: 3, .. }));
        }
        other => panic!("unexpected verdict: {other:?}"),
    }
    assert_eq!(cluster.slop_stores[0].pending_for_node(3).await.unwrap().len(), 1);
}

#[tokio::test]
async fn two_failed_nodes_share_one_advanced_version() {
    let cluster = Cluster::new(&[2, 3]);
    let clock = Arc::new(ManualClock::new(1_000));
    let ctx = cluster
        .put(cluster.handoff(), 1, clock, original_versioned())
        .await
        .unwrap();

    assert!(ctx.fatal_error().is_none());

    let store1 = &cluster.slop_stores[0];
    let for_node2 = store1.pending_for_node(2).await.unwrap();
    let for_node3 = store1.pending_for_node(3).await.unwrap();
    assert_eq!(for_node2.len(), 1);
    assert_eq!(for_node3.len(), 1);

    // Both records carry the same advanced clock: one increment (for node 2,
    // the first recorded failure), not one per failed node.
    let expected = VectorClock::new()
        .incremented(1, 0)
        .unwrap()
        .incremented(2, 1_000)
        .unwrap();
    assert_eq!(for_node2[0].1, expected);
    assert_eq!(for_node3[0].1, expected);
}

#[tokio::test]
async fn no_slop_capable_node_is_a_hard_failure() {
    let cluster = Cluster::new(&[2, 3]);
    let clock = Arc::new(ManualClock::new(1_000));

    // A handoff with no registered stores: every hint is refused.
    let empty_handoff: ClusterHandoff<MemSlopStore, NodeIdOrder> = ClusterHandoff::new(
        NodeIdOrder::new(cluster.nodes.clone()),
        Duration::from_millis(50),
    );

    let ctx = cluster
        .put(empty_handoff, 2, clock, original_versioned())
        .await
        .unwrap();

    // Node 3 is the last processed failure; its refusal decides the verdict
    // and wraps node 2's classification.
    match ctx.fatal_error() {
        Some(StoreError::InsufficientOperationalNodes { node: 3, source }) => {
            assert!(matches!(
                source.as_ref(),
                StoreError::InsufficientOperationalNodes { node: 2, .. }
            ));
        }
        other => panic!("unexpected verdict: {other:?}"),
    }

    let outcomes: Vec<(NodeId, bool)> =
        ctx.hint_outcomes().iter().map(|o| (o.node, o.queued)).collect();
    assert_eq!(outcomes, vec![(2, false), (3, false)]);
}

#[tokio::test]
async fn surviving_replica_holds_the_original_version() {
    let cluster = Cluster::new(&[2, 3]);
    let clock = Arc::new(ManualClock::new(1_000));
    let versioned = original_versioned();
    cluster
        .put(cluster.handoff(), 1, clock, versioned.clone())
        .await
        .unwrap();

    // The direct write carries the original version; only slops carry the
    // advanced copy.
    let stored = cluster.replicas[0].get(&Key::from("user:42")).await.unwrap().unwrap();
    assert_eq!(stored.version(), versioned.version());
}
