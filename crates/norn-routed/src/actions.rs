use std::sync::Arc;

use norn_slop::{HintedHandoff, Slop, SlopOp};
use norn_types::{Key, Node, StoreError, WallClock};
use norn_versioning::Versioned;

use crate::data::{HintOutcome, PutPipelineData};
use crate::pipeline::{Action, ActionFuture, Event, EventSink};
use crate::store::ReplicaStore;

/// Preference-list delivery: writes the versioned value to every node of the
/// preference list in order, recording failures into the request state.
///
/// If fewer than `required` replicas accept the write, the last delivery
/// failure becomes the request's fatal error; the hinted-handoff action
/// downstream then decides whether that stays fatal. Always signals its
/// completion event so handoff runs even after a missed quorum.
pub struct PerformSerialPut<S> {
    preference_list: Vec<(Node, Arc<S>)>,
    key: Key,
    versioned: Versioned,
    required: usize,
    complete_event: Event,
}

impl<S: ReplicaStore> PerformSerialPut<S> {
    pub fn new(
        preference_list: Vec<(Node, Arc<S>)>,
        key: Key,
        versioned: Versioned,
        required: usize,
        complete_event: Event,
    ) -> Self {
        PerformSerialPut { preference_list, key, versioned, required, complete_event }
    }

    async fn run(
        &mut self,
        ctx: &mut PutPipelineData,
        events: &mut EventSink,
    ) -> Result<(), StoreError> {
        if self.required > self.preference_list.len() {
            return Err(StoreError::InvalidArgument(format!(
                "required writes {} exceeds preference list size {}",
                self.required,
                self.preference_list.len()
            )));
        }

        let mut successes = 0usize;
        let mut last_failure: Option<StoreError> = None;

        for (node, store) in &self.preference_list {
            if ctx.is_cancelled() {
                break;
            }
            match store.put(&self.key, &self.versioned).await {
                Ok(()) => {
                    successes += 1;
                    tracing::trace!(node = node.id, key = ?self.key, "put applied");
                }
                Err(err) => {
                    tracing::warn!(node = node.id, key = ?self.key, %err, "put failed");
                    ctx.add_failed_node(node.clone());
                    last_failure = Some(err);
                }
            }
        }

        if successes < self.required {
            if let Some(err) = last_failure {
                ctx.set_fatal_error(err);
            }
        }

        events.add_event(self.complete_event);
        Ok(())
    }
}

impl<S: ReplicaStore> Action<PutPipelineData> for PerformSerialPut<S> {
    fn execute<'a>(
        &'a mut self,
        ctx: &'a mut PutPipelineData,
        events: &'a mut EventSink,
    ) -> ActionFuture<'a> {
        Box::pin(self.run(ctx, events))
    }
}

/// Hinted handoff for a put: for every node the direct write failed on, stash
/// a deferred-operation record elsewhere in the cluster and fold the result
/// into the request's fatal-error verdict.
///
/// The causally-advanced copy of the value is computed at most once per
/// request — advancing the original version for the first failed node's id —
/// and shared by every record; one advance already dominates the original
/// write, and a per-node advance would grow the clock without bound.
///
/// The fatal-error slot holds a single classification: each processed node
/// wraps whatever is currently there, so the last node's outcome decides
/// whether the request surfaces as degraded-but-queued or as a hard failure.
/// When no fatal error was recorded upstream the write met its quorum and the
/// hints are purely best-effort backup; the slot stays empty either way.
pub struct PerformPutHintedHandoff<H, T> {
    key: Key,
    versioned: Versioned,
    handoff: Arc<H>,
    clock: Arc<T>,
    complete_event: Event,
}

impl<H: HintedHandoff, T: WallClock> PerformPutHintedHandoff<H, T> {
    pub fn new(
        key: Key,
        versioned: Versioned,
        handoff: Arc<H>,
        clock: Arc<T>,
        complete_event: Event,
    ) -> Self {
        PerformPutHintedHandoff { key, versioned, handoff, clock, complete_event }
    }

    async fn run(
        &mut self,
        ctx: &mut PutPipelineData,
        events: &mut EventSink,
    ) -> Result<(), StoreError> {
        let failed_nodes = ctx.failed_nodes().to_vec();

        for failed_node in failed_nodes {
            if ctx.is_cancelled() {
                break;
            }

            let copy = match ctx.versioned_copy() {
                Some(copy) => copy.clone(),
                None => {
                    let advanced = self
                        .versioned
                        .version()
                        .incremented(failed_node.id, self.clock.now_ms())?;
                    let copy = Versioned::new(self.versioned.value().clone(), advanced);
                    ctx.set_versioned_copy(copy.clone());
                    copy
                }
            };

            tracing::trace!(
                node = failed_node.id,
                store = ctx.store_name(),
                key = ?self.key,
                version = ?copy.version(),
                "performing hinted handoff"
            );

            let slop = Slop::new(
                ctx.store_name(),
                SlopOp::Put,
                self.key.clone(),
                Some(copy.value().clone()),
                failed_node.id,
                self.clock.now_ms(),
            );

            let persisted = self.handoff.send_hint(&failed_node, copy.version(), slop).await;
            ctx.push_hint_outcome(HintOutcome { node: failed_node.id, queued: persisted });

            if let Some(cause) = ctx.take_fatal_error() {
                let classified = if persisted {
                    tracing::warn!(
                        node = failed_node.id,
                        "put unreachable on node, queued to slop storage"
                    );
                    StoreError::UnreachableButQueued {
                        node: failed_node.id,
                        source: Box::new(cause),
                    }
                } else {
                    tracing::error!(node = failed_node.id, "no slop-capable node available");
                    StoreError::InsufficientOperationalNodes {
                        node: failed_node.id,
                        source: Box::new(cause),
                    }
                };
                ctx.set_fatal_error(classified);
            }
        }

        events.add_event(self.complete_event);
        Ok(())
    }
}

impl<H: HintedHandoff, T: WallClock> Action<PutPipelineData> for PerformPutHintedHandoff<H, T> {
    fn execute<'a>(
        &'a mut self,
        ctx: &'a mut PutPipelineData,
        events: &'a mut EventSink,
    ) -> ActionFuture<'a> {
        Box::pin(self.run(ctx, events))
    }
}
