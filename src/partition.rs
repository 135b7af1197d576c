use crate::graph::node::NodeIndex;

/// Immutable description of a node subset treated as one opaque
/// meta-operation: the member node indices plus the declared boundary values
/// that make the subset callable from outside.
///
/// Produced by rewrite/partitioning passes and handed to a computation view at
/// construction; the view validates it against the graph, not this type.
#[derive(Debug, Clone)]
pub struct PartitionDescriptor {
    pub name: String,
    /// Member node indices, in the order the producing pass declared them.
    pub nodes: Vec<NodeIndex>,
    /// Declared boundary input value names, in call order.
    pub inputs: Vec<String>,
    /// Declared boundary output value names, in call order.
    pub outputs: Vec<String>,
}

impl PartitionDescriptor {
    pub fn new(
        name: impl Into<String>,
        nodes: Vec<NodeIndex>,
        inputs: Vec<String>,
        outputs: Vec<String>,
    ) -> Self {
        PartitionDescriptor { name: name.into(), nodes, inputs, outputs }
    }
}
