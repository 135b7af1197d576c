use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};
use crate::graph::node::{AttributeValue, NodeIndex, OperationNode};
use crate::graph::value::{ElementType, Value, ValueId};

/// Constant tensor payload backing an initializer value. The scheduling core
/// never looks inside; it only needs identity and the "is this a constant"
/// query.
#[derive(Debug, Clone)]
pub struct TensorData {
    pub dtype: ElementType,
    pub dims: Vec<i64>,
    pub raw: Vec<u8>,
}

impl TensorData {
    pub fn new(dtype: ElementType, dims: Vec<i64>) -> Self {
        TensorData { dtype, dims, raw: Vec::new() }
    }
}

/// A directed edge between two nodes, derived from a shared value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub src: NodeIndex,
    pub dst: NodeIndex,
    /// Position of the value in the source node's output list.
    pub src_arg: usize,
    /// Position of the value in the destination node's consumed-value list
    /// (explicit inputs first, then implicit inputs).
    pub dst_arg: usize,
    pub value: ValueId,
}

/// Mutable DAG of operation nodes and values.
///
/// Nodes live in an arena addressed by a stable integer index; removing a node
/// leaves a `None` tombstone and the index is never reused. Values are interned
/// by name and shared by id between their producer and all consumers, so edges
/// are derived rather than stored.
#[derive(Debug, Clone)]
pub struct Graph {
    pub name: String,
    nodes: Vec<Option<OperationNode>>,
    node_count: usize,
    values: Vec<Value>,
    value_index: HashMap<String, ValueId>,
    inputs: Vec<ValueId>,
    inputs_including_initializers: Vec<ValueId>,
    outputs: Vec<ValueId>,
    initializers: HashMap<String, TensorData>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Graph {
            name: name.into(),
            nodes: Vec::new(),
            node_count: 0,
            values: Vec::new(),
            value_index: HashMap::new(),
            inputs: Vec::new(),
            inputs_including_initializers: Vec::new(),
            outputs: Vec::new(),
            initializers: HashMap::new(),
        }
    }

    // ---- value surface ----

    /// Interns a value by name. Re-declaring an existing name returns the
    /// existing id; a type given on a later declaration fills a missing one.
    pub fn add_value(&mut self, name: impl Into<String>, dtype: Option<ElementType>) -> ValueId {
        let name = name.into();
        if let Some(&id) = self.value_index.get(&name) {
            if self.values[id].dtype.is_none() {
                self.values[id].dtype = dtype;
            }
            return id;
        }
        let id = self.values.len();
        self.values.push(Value::new(name.clone(), dtype));
        self.value_index.insert(name, id);
        id
    }

    /// Declares a non-constant graph input.
    pub fn add_graph_input(&mut self, name: impl Into<String>, dtype: ElementType) -> ValueId {
        let id = self.add_value(name, Some(dtype));
        self.inputs.push(id);
        self.inputs_including_initializers.push(id);
        id
    }

    /// Declares a constant (initializer) value.
    pub fn add_initializer(&mut self, name: impl Into<String>, tensor: TensorData) -> ValueId {
        let name = name.into();
        let id = self.add_value(name.clone(), Some(tensor.dtype));
        self.initializers.insert(name, tensor);
        self.inputs_including_initializers.push(id);
        id
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id]
    }

    pub fn value_id(&self, name: &str) -> Option<ValueId> {
        self.value_index.get(name).copied()
    }

    pub fn value_name(&self, id: ValueId) -> &str {
        &self.values[id].name
    }

    pub fn is_initializer(&self, name: &str) -> bool {
        self.initializers.contains_key(name)
    }

    pub fn initializer(&self, name: &str) -> Option<&TensorData> {
        self.initializers.get(name)
    }

    pub fn initializers(&self) -> &HashMap<String, TensorData> {
        &self.initializers
    }

    pub fn inputs(&self) -> &[ValueId] {
        &self.inputs
    }

    pub fn inputs_including_initializers(&self) -> &[ValueId] {
        &self.inputs_including_initializers
    }

    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    pub fn set_outputs(&mut self, outputs: &[ValueId]) {
        self.outputs = outputs.to_vec();
    }

    // ---- node surface ----

    /// Adds a node consuming `inputs` and producing `outputs`.
    ///
    /// Fails if any output value already has a producer: a value is produced
    /// by at most one node.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        op_type: impl Into<String>,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<NodeIndex> {
        let name = name.into();
        for &out in outputs {
            if let Some(existing) = self.values[out].producer {
                return Err(Error::Inconsistency(format!(
                    "value '{}' already produced by node {} while adding node '{}'",
                    self.values[out].name, existing, name
                )));
            }
        }

        let index = self.nodes.len();
        let node = OperationNode {
            index,
            name,
            op_type: op_type.into(),
            inputs: inputs.to_vec(),
            implicit_inputs: Vec::new(),
            outputs: outputs.to_vec(),
            attributes: HashMap::new(),
            priority: 0,
        };
        self.nodes.push(Some(node));
        self.node_count += 1;

        for &out in outputs {
            self.values[out].producer = Some(index);
        }
        for &input in inputs {
            if !self.values[input].consumers.contains(&index) {
                self.values[input].consumers.push(index);
            }
        }
        Ok(index)
    }

    /// Registers outer-scope values captured by a nested-scope node.
    pub fn set_implicit_inputs(&mut self, index: NodeIndex, implicit: &[ValueId]) -> Result<()> {
        let node = self.node_checked_mut(index)?;
        node.implicit_inputs = implicit.to_vec();
        for &input in implicit {
            if !self.values[input].consumers.contains(&index) {
                self.values[input].consumers.push(index);
            }
        }
        Ok(())
    }

    /// Rewires the explicit input at `dst_arg` of `index` to `new_value`,
    /// keeping consumer bookkeeping consistent.
    pub fn replace_input(&mut self, index: NodeIndex, dst_arg: usize, new_value: ValueId) -> Result<()> {
        let node = self.node_checked_mut(index)?;
        let old_value = *node.inputs.get(dst_arg).ok_or_else(|| {
            Error::Inconsistency(format!("node {} has no input argument {}", index, dst_arg))
        })?;
        node.inputs[dst_arg] = new_value;

        let still_consumed = self.nodes[index]
            .as_ref()
            .map(|n| n.consumed_values().any(|v| v == old_value))
            .unwrap_or(false);
        if !still_consumed {
            self.values[old_value].consumers.retain(|&c| c != index);
        }
        if !self.values[new_value].consumers.contains(&index) {
            self.values[new_value].consumers.push(index);
        }
        Ok(())
    }

    /// Removes a node, tombstoning its index. The node must have no remaining
    /// out-edges; rewrite passes rewire consumers first.
    pub fn remove_node(&mut self, index: NodeIndex) -> Result<()> {
        if !self.out_edges(index).is_empty() {
            return Err(Error::Inconsistency(format!(
                "cannot remove node {} while downstream nodes still consume its outputs",
                index
            )));
        }
        let node = self.nodes.get_mut(index).and_then(|slot| slot.take()).ok_or_else(|| {
            Error::Inconsistency(format!("cannot remove node {}: not present in the graph", index))
        })?;
        self.node_count -= 1;

        for input in node.inputs.iter().chain(node.implicit_inputs.iter()) {
            self.values[*input].consumers.retain(|&c| c != index);
        }
        for &out in &node.outputs {
            self.values[out].producer = None;
        }
        log::debug!("removed node {} ('{}') from graph '{}'", index, node.name, self.name);
        Ok(())
    }

    pub fn node(&self, index: NodeIndex) -> Option<&OperationNode> {
        self.nodes.get(index).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, index: NodeIndex) -> Option<&mut OperationNode> {
        self.nodes.get_mut(index).and_then(Option::as_mut)
    }

    fn node_checked_mut(&mut self, index: NodeIndex) -> Result<&mut OperationNode> {
        self.nodes
            .get_mut(index)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::Inconsistency(format!("node {} is not present in the graph", index)))
    }

    pub fn set_priority(&mut self, index: NodeIndex, priority: i32) -> Result<()> {
        self.node_checked_mut(index)?.priority = priority;
        Ok(())
    }

    pub fn set_attribute(&mut self, index: NodeIndex, name: &str, value: AttributeValue) -> Result<()> {
        self.node_checked_mut(index)?.set_attribute(name, value);
        Ok(())
    }

    /// Iterates live nodes in index order.
    pub fn nodes(&self) -> impl Iterator<Item = &OperationNode> {
        self.nodes.iter().filter_map(Option::as_ref)
    }

    pub fn number_of_nodes(&self) -> usize {
        self.node_count
    }

    /// One past the highest index ever assigned; valid indices are below this
    /// even when their slot is a tombstone.
    pub fn max_node_index(&self) -> usize {
        self.nodes.len()
    }

    // ---- edge surface ----

    /// Incoming edges of `index`, one per consumed value with a live producer,
    /// in destination-argument order.
    pub fn in_edges(&self, index: NodeIndex) -> Vec<Edge> {
        let Some(node) = self.node(index) else { return Vec::new() };
        let mut edges = Vec::new();
        for (dst_arg, value) in node.consumed_values().enumerate() {
            let Some(src) = self.values[value].producer else { continue };
            let Some(producer) = self.node(src) else { continue };
            let src_arg = producer.outputs.iter().position(|&o| o == value).unwrap_or(0);
            edges.push(Edge { src, dst: index, src_arg, dst_arg, value });
        }
        edges
    }

    /// Outgoing edges of `index`, one per (consumer, argument) pair.
    pub fn out_edges(&self, index: NodeIndex) -> Vec<Edge> {
        let Some(node) = self.node(index) else { return Vec::new() };
        let mut edges = Vec::new();
        for (src_arg, &value) in node.outputs.iter().enumerate() {
            for &dst in &self.values[value].consumers {
                let Some(consumer) = self.node(dst) else { continue };
                for (dst_arg, consumed) in consumer.consumed_values().enumerate() {
                    if consumed == value {
                        edges.push(Edge { src: index, dst, src_arg, dst_arg, value });
                    }
                }
            }
        }
        edges
    }

    pub fn input_edge_count(&self, index: NodeIndex) -> usize {
        self.in_edges(index).len()
    }

    /// Unique predecessor nodes, index-sorted for determinism.
    pub fn predecessors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let set: BTreeSet<NodeIndex> = self.in_edges(index).iter().map(|e| e.src).collect();
        set.into_iter().collect()
    }

    /// Unique successor nodes, index-sorted for determinism.
    pub fn successors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let set: BTreeSet<NodeIndex> = self.out_edges(index).iter().map(|e| e.dst).collect();
        set.into_iter().collect()
    }

    /// Live nodes with no outgoing edges.
    pub fn sink_nodes(&self) -> Vec<NodeIndex> {
        self.nodes().filter(|n| self.out_edges(n.index()).is_empty()).map(|n| n.index()).collect()
    }

    /// Producer node of a value, if the value exists and its producer is live.
    pub fn producer_node(&self, value: ValueId) -> Option<NodeIndex> {
        self.values[value].producer.filter(|&p| self.node(p).is_some())
    }

    // ---- traversal ----

    /// Iterative reverse DFS over predecessor edges, starting from `from`.
    ///
    /// `leave` fires in post-order; because the traversal direction is already
    /// reversed, the leave sequence is a forward topological order of the
    /// visited region. `stop(from, to)` prunes the edge into `to`.
    ///
    /// Neighbor expansion is index-sorted, so equally-ready candidates resolve
    /// to the lower node index and the traversal is deterministic. A
    /// predecessor found open on the current path is a back edge and reported
    /// as a fatal cycle.
    pub fn reverse_dfs_from<F, S>(&self, from: &[NodeIndex], mut leave: F, stop: S) -> Result<()>
    where
        F: FnMut(NodeIndex),
        S: Fn(NodeIndex, NodeIndex) -> bool,
    {
        const UNVISITED: u8 = 0;
        const IN_PROGRESS: u8 = 1;
        const DONE: u8 = 2;

        let mut state = vec![UNVISITED; self.max_node_index()];
        let mut stack: Vec<(NodeIndex, bool)> = Vec::new();

        let mut roots = from.to_vec();
        roots.sort_unstable();
        roots.dedup();
        for &root in roots.iter().rev() {
            stack.push((root, false));
        }

        while let Some((current, entered)) = stack.pop() {
            if entered {
                state[current] = DONE;
                leave(current);
                continue;
            }
            if state[current] != UNVISITED {
                // Stale duplicate push; the node was reached through another path.
                continue;
            }
            state[current] = IN_PROGRESS;
            stack.push((current, true));

            let preds = self.predecessors(current);
            for &pred in preds.iter().rev() {
                if stop(current, pred) {
                    continue;
                }
                match state[pred] {
                    UNVISITED => stack.push((pred, false)),
                    IN_PROGRESS => {
                        return Err(Error::CycleDetected(format!(
                            "back edge from node {} to node {} during reverse traversal",
                            current, pred
                        )));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}
