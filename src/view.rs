use std::collections::{BTreeMap, HashSet};

use crate::error::{Error, Result};
use crate::graph::graph::{Graph, TensorData};
use crate::graph::node::{NodeIndex, OperationNode};
use crate::graph::value::ValueId;
use crate::partition::PartitionDescriptor;
use crate::scheduler::default_order::build_default_order;
use crate::scheduler::priority_order::build_priority_order;

/// Which of the two precomputed topological orders to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOrder {
    Default,
    PriorityBased,
}

/// Read-only snapshot over a graph, optionally restricted to a partition.
///
/// Construction is eager and synchronous: both topological orders are computed
/// over the full graph on the calling thread, then restricted to the exposed
/// node subset by a stable filter. The finished view never mutates the graph
/// and is safe to share for concurrent reads; the graph must not be mutated
/// while a view is being built or used, which is the graph owner's
/// responsibility.
#[derive(Debug)]
pub struct ComputationView<'g> {
    graph: &'g Graph,
    partition: Option<PartitionDescriptor>,
    filtered_node_indices: HashSet<NodeIndex>,
    root_nodes: Vec<NodeIndex>,
    order_default: Vec<NodeIndex>,
    order_priority: Vec<NodeIndex>,
    filtered_inputs: Vec<ValueId>,
    filtered_inputs_including_initializers: Vec<ValueId>,
    filtered_outputs: Vec<ValueId>,
    filtered_initializers: BTreeMap<String, &'g TensorData>,
}

impl<'g> ComputationView<'g> {
    /// View over the whole graph.
    pub fn new(graph: &'g Graph) -> Result<Self> {
        Self::build(graph, None)
    }

    /// View restricted to the partition's node subset. Fails fast if the
    /// descriptor references a node or value the graph does not have; that is
    /// a bug in the pass that produced the descriptor.
    pub fn with_partition(graph: &'g Graph, partition: PartitionDescriptor) -> Result<Self> {
        Self::build(graph, Some(partition))
    }

    fn build(graph: &'g Graph, partition: Option<PartitionDescriptor>) -> Result<Self> {
        let order_default = build_default_order(graph)?;
        let order_priority = build_priority_order(graph)?;

        let root_nodes = graph
            .nodes()
            .filter(|n| graph.input_edge_count(n.index()) == 0)
            .map(|n| n.index())
            .collect();

        let mut view = ComputationView {
            graph,
            partition: None,
            filtered_node_indices: HashSet::new(),
            root_nodes,
            order_default,
            order_priority,
            filtered_inputs: Vec::new(),
            filtered_inputs_including_initializers: Vec::new(),
            filtered_outputs: Vec::new(),
            filtered_initializers: BTreeMap::new(),
        };

        if let Some(partition) = partition {
            view.apply_partition(partition)?;
        }
        Ok(view)
    }

    fn apply_partition(&mut self, partition: PartitionDescriptor) -> Result<()> {
        let graph = self.graph;
        for &index in &partition.nodes {
            if graph.node(index).is_none() {
                return Err(Error::InvalidPartition(format!(
                    "partition '{}' references node {} which is not present in graph '{}'",
                    partition.name, index, graph.name
                )));
            }
        }

        for name in &partition.inputs {
            let id = graph.value_id(name).ok_or_else(|| {
                Error::InvalidPartition(format!(
                    "partition '{}' declares input '{}' which is not a value of graph '{}'",
                    partition.name, name, graph.name
                ))
            })?;
            self.filtered_inputs_including_initializers.push(id);
            if !graph.is_initializer(name) {
                self.filtered_inputs.push(id);
            }
        }

        for name in &partition.outputs {
            let id = graph.value_id(name).ok_or_else(|| {
                Error::InvalidPartition(format!(
                    "partition '{}' declares output '{}' which is not a value of graph '{}'",
                    partition.name, name, graph.name
                ))
            })?;
            self.filtered_outputs.push(id);
        }

        let filtered: HashSet<NodeIndex> = partition.nodes.iter().copied().collect();

        // Stable restriction: relative order from the unfiltered computation
        // is preserved.
        self.order_default.retain(|index| filtered.contains(index));
        self.order_priority.retain(|index| filtered.contains(index));

        // The constants actually referenced by an exposed node, through
        // explicit or implicit inputs.
        for &index in &partition.nodes {
            let Some(node) = graph.node(index) else { continue };
            for value in node.consumed_values() {
                let name = graph.value_name(value);
                if let Some(tensor) = graph.initializer(name) {
                    self.filtered_initializers.insert(name.to_string(), tensor);
                }
            }
        }

        log::debug!(
            "view '{}' exposes {} of {} nodes of graph '{}'",
            partition.name,
            filtered.len(),
            graph.number_of_nodes(),
            graph.name
        );
        self.filtered_node_indices = filtered;
        self.partition = Some(partition);
        Ok(())
    }

    /// Partition name when filtered, graph name otherwise.
    pub fn name(&self) -> &str {
        match &self.partition {
            Some(partition) => &partition.name,
            None => &self.graph.name,
        }
    }

    pub fn is_filtered(&self) -> bool {
        self.partition.is_some()
    }

    /// The requested immutable order, restricted to the exposed node set.
    pub fn nodes_in_topological_order(&self, order: ExecutionOrder) -> &[NodeIndex] {
        match order {
            ExecutionOrder::Default => &self.order_default,
            ExecutionOrder::PriorityBased => &self.order_priority,
        }
    }

    /// Nodes with no incoming edges. Defined only for the unfiltered view;
    /// asking a filtered view is a precondition violation.
    pub fn root_nodes(&self) -> Result<&[NodeIndex]> {
        if self.partition.is_some() {
            return Err(Error::InvalidQuery("root nodes are not supported on a filtered view".to_string()));
        }
        Ok(&self.root_nodes)
    }

    /// The node at `index`, or `None` when it is filtered out or was removed
    /// from the graph.
    pub fn node(&self, index: NodeIndex) -> Option<&'g OperationNode> {
        if self.partition.is_some() && !self.filtered_node_indices.contains(&index) {
            return None;
        }
        self.graph.node(index)
    }

    /// Exposed nodes in index order.
    pub fn nodes(&self) -> impl Iterator<Item = &'g OperationNode> + '_ {
        self.graph
            .nodes()
            .filter(|n| self.partition.is_none() || self.filtered_node_indices.contains(&n.index()))
    }

    pub fn number_of_nodes(&self) -> usize {
        match &self.partition {
            Some(partition) => partition.nodes.len(),
            None => self.graph.number_of_nodes(),
        }
    }

    pub fn max_node_index(&self) -> usize {
        self.graph.max_node_index()
    }

    /// Exposed inputs excluding initializers.
    pub fn inputs(&self) -> &[ValueId] {
        match &self.partition {
            Some(_) => &self.filtered_inputs,
            None => self.graph.inputs(),
        }
    }

    /// Exposed inputs including initializers.
    pub fn inputs_including_initializers(&self) -> &[ValueId] {
        match &self.partition {
            Some(_) => &self.filtered_inputs_including_initializers,
            None => self.graph.inputs_including_initializers(),
        }
    }

    pub fn outputs(&self) -> &[ValueId] {
        match &self.partition {
            Some(_) => &self.filtered_outputs,
            None => self.graph.outputs(),
        }
    }

    /// Constant lookup. On a filtered view the constant must be referenced by
    /// an exposed node.
    pub fn initializer(&self, name: &str) -> Option<&'g TensorData> {
        if self.partition.is_some() {
            return self.filtered_initializers.get(name).copied();
        }
        self.graph.initializer(name)
    }

    pub fn is_initializer(&self, name: &str) -> bool {
        self.initializer(name).is_some()
    }

    /// Names of the exposed constants, sorted.
    pub fn initializer_names(&self) -> Vec<String> {
        if self.partition.is_some() {
            return self.filtered_initializers.keys().cloned().collect();
        }
        let mut names: Vec<String> = self.graph.initializers().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Whether any output of the node is an exposed graph output.
    pub fn node_produces_graph_output(&self, index: NodeIndex) -> bool {
        let Some(node) = self.node(index) else { return false };
        node.outputs().iter().any(|out| self.outputs().contains(out))
    }
}
