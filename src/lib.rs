//! Scheduling core of a dataflow-graph execution engine.
//!
//! Given an acyclic computation graph, the crate computes deterministic
//! topological execution orders (a default order and a priority-aware order
//! for memory-conscious training execution) and exposes them, together with
//! filtered partition views, through a read-only [`view::ComputationView`]
//! snapshot consumed by the executor and by graph-rewrite passes.

pub mod error;
pub mod graph;
pub mod logger;
pub mod partition;
pub mod passes;
pub mod scheduler;
pub mod view;
