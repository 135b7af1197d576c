use std::collections::HashMap;

use crate::graph::value::ValueId;

/// Stable node index, unique for the lifetime of the owning graph and never
/// reused: removing a node leaves a tombstone behind.
pub type NodeIndex = usize;

/// Operation type of the marker node separating the forward and the backward
/// pass of a training graph. It has no structural purpose beyond being that
/// separator.
pub const YIELD_OP: &str = "YieldOp";

pub const SHAPE_OP: &str = "Shape";
pub const SIZE_OP: &str = "Size";

/// Attribute tagging a node as belonging to the backward pass. Produced by an
/// upstream pass; absence, or an even counter value, means forward.
pub const BACKWARD_PASS_ATTRIBUTE: &str = "__backwardpass";

/// Attribute carrying the externally computed critical-path impact of a
/// recompute-duplicate node. Higher impact unblocks the critical path sooner.
pub const CRITICAL_PATH_IMPACT_ATTRIBUTE: &str = "__critical_path_impact";

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Int(i64),
    Float(f64),
    String(String),
    Ints(Vec<i64>),
}

/// Scheduling priority classes. The numeric value is what the scheduler
/// compares: lower runs earlier, independent of topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPriority {
    GlobalHigh = -100,
    LocalHigh = -10,
    Default = 0,
    LocalLow = 10,
    GlobalLow = 100,
}

impl ExecutionPriority {
    pub fn value(self) -> i32 {
        self as i32
    }
}

/// A unit of computation in the DAG. Edges to predecessors and successors are
/// derived from the values it shares with other nodes; the graph owns that
/// bookkeeping.
#[derive(Debug, Clone)]
pub struct OperationNode {
    pub(crate) index: NodeIndex,
    pub name: String,
    pub op_type: String,
    pub(crate) inputs: Vec<ValueId>,
    pub(crate) implicit_inputs: Vec<ValueId>,
    pub(crate) outputs: Vec<ValueId>,
    pub attributes: HashMap<String, AttributeValue>,
    pub priority: i32,
}

impl OperationNode {
    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn inputs(&self) -> &[ValueId] {
        &self.inputs
    }

    /// Inputs captured from an outer scope by nested-scope nodes. They behave
    /// like inputs for edge and initializer purposes.
    pub fn implicit_inputs(&self) -> &[ValueId] {
        &self.implicit_inputs
    }

    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    /// All consumed values: explicit inputs followed by implicit inputs. The
    /// position in this sequence is the node's destination argument index.
    pub fn consumed_values(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.inputs.iter().chain(self.implicit_inputs.iter()).copied()
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: AttributeValue) {
        self.attributes.insert(name.into(), value);
    }

    pub fn attribute_int(&self, name: &str) -> Option<i64> {
        match self.attributes.get(name) {
            Some(AttributeValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// A pure shape/size query: reads only the shape of its input, never the
    /// values, so its producer's output memory can be released early.
    pub fn is_shape_or_size(&self) -> bool {
        self.op_type == SHAPE_OP || self.op_type == SIZE_OP
    }

    pub fn is_boundary(&self) -> bool {
        self.op_type == YIELD_OP
    }

    /// Forward/backward tag consumed as an opaque hint: absence of the
    /// backward attribute, or an even counter, means forward.
    pub fn is_forward_pass(&self) -> bool {
        match self.attribute_int(BACKWARD_PASS_ATTRIBUTE) {
            None => true,
            // Plain `%` keeps the sign of a negative counter, so test the
            // remainder for zero rather than for one.
            Some(counter) => counter % 2 == 0,
        }
    }

    pub fn critical_path_impact(&self) -> Option<i64> {
        self.attribute_int(CRITICAL_PATH_IMPACT_ATTRIBUTE)
    }
}
