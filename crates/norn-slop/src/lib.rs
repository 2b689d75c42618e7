pub mod handoff;
pub mod keys;
pub mod slop;
pub mod store;

pub use handoff::{ClusterHandoff, HintTargetSelector, HintedHandoff, NodeIdOrder};
pub use slop::{Slop, SlopOp};
pub use store::{MemSlopStore, SlopStore};
