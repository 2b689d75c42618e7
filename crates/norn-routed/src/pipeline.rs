use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;

use norn_types::StoreError;

/// Events a put pipeline steps through. An action is registered under the
/// event that triggers it; `Completed` is terminal and has no action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Request entered the pipeline.
    Started,
    /// Preference-list delivery finished (some nodes may have failed).
    Applied,
    /// Pipeline is done; the caller inspects the request state for the verdict.
    Completed,
}

/// Collects the completion event an action signals.
///
/// Handed fresh to every action invocation, so "signals completion exactly
/// once" is checkable by counting what landed here.
#[derive(Debug, Default)]
pub struct EventSink {
    events: Vec<Event>,
}

impl EventSink {
    pub fn new() -> Self {
        EventSink::default()
    }

    pub fn add_event(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }
}

pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

/// One unit of pipeline work over the shared per-request state `C`.
///
/// The boxed-future signature (rather than RPITIT) keeps the trait
/// object-safe so heterogeneous actions can share one event-keyed map,
/// without pulling in an `async-trait` dependency.
pub trait Action<C>: Send {
    fn execute<'a>(&'a mut self, ctx: &'a mut C, events: &'a mut EventSink) -> ActionFuture<'a>;
}

/// Minimal event-driven sequencer: runs the action bound to the current
/// event, collects the single event that action signals, and advances.
///
/// An action signals at most one event per invocation; zero events (or the
/// terminal `Completed`) ends the run. This is deliberately not a general
/// workflow engine — it defines the execution contract the write-path
/// actions rely on.
pub struct Pipeline<C> {
    actions: HashMap<Event, Box<dyn Action<C>>>,
}

impl<C> Pipeline<C> {
    pub fn new() -> Self {
        Pipeline { actions: HashMap::new() }
    }

    pub fn register(&mut self, event: Event, action: Box<dyn Action<C>>) {
        self.actions.insert(event, action);
    }

    pub async fn run(&mut self, start: Event, ctx: &mut C) -> Result<(), StoreError> {
        let mut queue = VecDeque::from([start]);

        while let Some(event) = queue.pop_front() {
            if event == Event::Completed {
                return Ok(());
            }

            let action = self.actions.get_mut(&event).ok_or_else(|| {
                StoreError::InvalidArgument(format!("no action registered for event {event:?}"))
            })?;

            let mut sink = EventSink::new();
            action.execute(ctx, &mut sink).await?;

            let emitted = sink.events();
            if emitted.len() > 1 {
                return Err(StoreError::InvalidArgument(format!(
                    "action for event {event:?} signaled {} events, at most one allowed",
                    emitted.len()
                )));
            }
            queue.extend(emitted.iter().copied());
        }

        Ok(())
    }
}

impl<C> Default for Pipeline<C> {
    fn default() -> Self {
        Self::new()
    }
}
