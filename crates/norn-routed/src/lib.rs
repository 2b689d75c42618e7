pub mod actions;
pub mod data;
pub mod pipeline;
pub mod store;

pub use actions::{PerformPutHintedHandoff, PerformSerialPut};
pub use data::{HintOutcome, PutPipelineData};
pub use pipeline::{Action, Event, EventSink, Pipeline};
pub use store::{MemReplicaStore, ReplicaStore};
