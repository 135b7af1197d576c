use crate::graph::node::NodeIndex;

/// Dense index into the graph's value arena. A value keeps its id for the
/// lifetime of the graph; ids are never reused.
pub type ValueId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Float,
    Float16,
    BFloat16,
    Double,
    Int32,
    Int64,
    Bool,
}

/// A named, typed edge endpoint (tensor slot). Produced by at most one node
/// (or it is a graph input / initializer) and consumed by zero or more nodes.
#[derive(Debug, Clone)]
pub struct Value {
    pub name: String,
    pub dtype: Option<ElementType>,

    /// The node producing this value, if any. Cleared when the producer is
    /// removed from the graph.
    pub(crate) producer: Option<NodeIndex>,

    /// Consuming nodes, deduplicated, in registration order. A consumer using
    /// the value at several argument positions appears once; the per-argument
    /// edges are derived by the graph.
    pub(crate) consumers: Vec<NodeIndex>,
}

impl Value {
    pub(crate) fn new(name: impl Into<String>, dtype: Option<ElementType>) -> Self {
        Value { name: name.into(), dtype, producer: None, consumers: Vec::new() }
    }

    pub fn producer(&self) -> Option<NodeIndex> {
        self.producer
    }

    pub fn consumers(&self) -> &[NodeIndex] {
        &self.consumers
    }
}
