use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet, VecDeque};

use crate::error::{Error, Result};
use crate::graph::graph::Graph;
use crate::graph::node::NodeIndex;
use crate::graph::value::ValueId;
use crate::scheduler::comparator::{PriorityNodeCompare, PrioritySortKey};
use crate::scheduler::default_order::shape_size_hoist_map;

/// Computes the priority-aware topological order.
///
/// A training graph (one containing the forward/backward boundary node) is
/// scheduled in two phases: the forward subgraph first, in reverse-DFS order
/// from the boundary's predecessors, then the remaining region through a
/// priority-queue Kahn pass that keeps branch subgraphs together as atomic
/// grouped units. A graph without the boundary gets a single ungrouped Kahn
/// pass driven by the same comparator.
pub fn build_priority_order(graph: &Graph) -> Result<Vec<NodeIndex>> {
    match graph.nodes().find(|n| n.is_boundary()).map(|n| n.index()) {
        Some(boundary) => {
            log::debug!("graph '{}': boundary node {} found, building training order", graph.name, boundary);
            build_training_order(graph, boundary)
        }
        None => {
            log::debug!("graph '{}': no boundary node, plain priority Kahn pass", graph.name);
            kahn_with_priorities(graph)
        }
    }
}

/// Kahn's algorithm with the priority comparator as the only tie-break.
fn kahn_with_priorities(graph: &Graph) -> Result<Vec<NodeIndex>> {
    let cmp = PriorityNodeCompare::new(graph);
    let mut in_degree = vec![0usize; graph.max_node_index()];
    let mut heap: BinaryHeap<Reverse<PrioritySortKey>> = BinaryHeap::new();

    for node in graph.nodes() {
        let degree = graph.input_edge_count(node.index());
        in_degree[node.index()] = degree;
        if degree == 0 {
            heap.push(Reverse(cmp.sort_key(node.index())));
        }
    }

    let mut order = Vec::with_capacity(graph.number_of_nodes());
    while let Some(Reverse(key)) = heap.pop() {
        let current = key.index();
        order.push(current);
        for edge in graph.out_edges(current) {
            in_degree[edge.dst] -= 1;
            if in_degree[edge.dst] == 0 {
                heap.push(Reverse(cmp.sort_key(edge.dst)));
            }
        }
    }

    if order.len() != graph.number_of_nodes() {
        return Err(Error::CycleDetected(format!(
            "priority order emitted {} of {} nodes in graph '{}'",
            order.len(),
            graph.number_of_nodes(),
            graph.name
        )));
    }
    Ok(order)
}

/// A set of branch-subgraph nodes scheduled as one atomic block: every member
/// shares the same set of downstream external consumers. Lives only for the
/// duration of one priority-order computation.
#[derive(Debug, Default)]
struct GroupNode {
    /// Members in branch-BFS admission order, which is internally topological.
    nodes: Vec<NodeIndex>,
    /// Values consumed by a member but produced outside the unit.
    input_values: Vec<ValueId>,
    /// Values produced by a member and consumed outside the unit, or not
    /// consumed at all.
    output_values: Vec<ValueId>,
}

impl GroupNode {
    fn finalize(&mut self, graph: &Graph) {
        let members: HashSet<NodeIndex> = self.nodes.iter().copied().collect();
        for &member in &self.nodes {
            let Some(node) = graph.node(member) else { continue };
            for value in node.consumed_values() {
                let produced_inside = graph.producer_node(value).map(|p| members.contains(&p)).unwrap_or(false);
                if !produced_inside && !self.input_values.contains(&value) {
                    self.input_values.push(value);
                }
            }
            for &value in node.outputs() {
                let consumers = graph.value(value).consumers();
                let escapes = consumers.is_empty() || consumers.iter().any(|c| !members.contains(c));
                if escapes && !self.output_values.contains(&value) {
                    self.output_values.push(value);
                }
            }
        }
    }
}

fn build_training_order(graph: &Graph, boundary: NodeIndex) -> Result<Vec<NodeIndex>> {
    // Forward-set discovery: everything reachable backwards from the
    // boundary's direct predecessors runs first, in traversal order.
    let forward_roots = graph.predecessors(boundary);
    let mut forward_set: HashSet<NodeIndex> = HashSet::new();
    let mut order: Vec<NodeIndex> = Vec::with_capacity(graph.number_of_nodes());
    graph.reverse_dfs_from(
        &forward_roots,
        |n| {
            forward_set.insert(n);
            order.push(n);
        },
        |_, _| false,
    )?;
    log::debug!("graph '{}': {} forward nodes before boundary {}", graph.name, order.len(), boundary);

    // Metadata hoist into the forward region: a shape/size node whose producer
    // already runs forward joins the forward set right after that producer.
    for (producer, consumer) in shape_size_hoist_map(graph) {
        if !forward_set.contains(&producer) || forward_set.contains(&consumer) {
            continue;
        }
        if let Some(pos) = order.iter().position(|&n| n == producer) {
            order.insert(pos + 1, consumer);
            forward_set.insert(consumer);
            log::trace!("hoisted shape/size node {} into the forward set after {}", consumer, producer);
        }
    }

    let mut schedule = PrioritySchedule::new(graph, boundary, &forward_set, order)?;
    schedule.run()?;
    let order = schedule.into_order();

    if order.len() != graph.number_of_nodes() {
        return Err(Error::CycleDetected(format!(
            "priority order emitted {} of {} nodes in graph '{}'",
            order.len(),
            graph.number_of_nodes(),
            graph.name
        )));
    }
    Ok(order)
}

/// Priority-queue Kahn pass over the non-forward region, with branch-subgraph
/// grouping. Readiness is tracked per value: a value is ready once the graph
/// provides it (input or initializer), a forward node produced it, or the
/// scheduling loop emitted its producer.
struct PrioritySchedule<'g> {
    graph: &'g Graph,
    cmp: PriorityNodeCompare<'g>,
    non_forward_total: usize,
    groups: Vec<GroupNode>,
    node_to_group: HashMap<NodeIndex, usize>,
    value_to_group: HashMap<ValueId, usize>,
    group_emitted: Vec<bool>,
    emitted: HashSet<NodeIndex>,
    already_ready: HashSet<ValueId>,
    heap: BinaryHeap<Reverse<PrioritySortKey>>,
    order: Vec<NodeIndex>,
    emitted_count: usize,
}

impl<'g> PrioritySchedule<'g> {
    fn new(
        graph: &'g Graph,
        boundary: NodeIndex,
        forward_set: &HashSet<NodeIndex>,
        forward_order: Vec<NodeIndex>,
    ) -> Result<Self> {
        let cmp = PriorityNodeCompare::new(graph);
        let non_forward_total = graph.number_of_nodes() - forward_order.len();

        // Everything the graph provides up front is ready.
        let mut already_ready: HashSet<ValueId> = graph.inputs_including_initializers().iter().copied().collect();
        for name in graph.initializers().keys() {
            if let Some(value) = graph.value_id(name) {
                already_ready.insert(value);
            }
        }

        // Effective in-degree of the non-forward region: edges from forward
        // nodes are pre-satisfied, and the values they carry are ready. The
        // boundary node itself is forced ready.
        let mut in_degree = vec![0usize; graph.max_node_index()];
        let mut heap: BinaryHeap<Reverse<PrioritySortKey>> = BinaryHeap::new();
        let mut branch_roots: Vec<NodeIndex> = Vec::new();

        for node in graph.nodes() {
            let index = node.index();
            if forward_set.contains(&index) {
                continue;
            }
            if index == boundary {
                in_degree[index] = 0;
                log::trace!("seeding ready queue with boundary node {}", index);
                heap.push(Reverse(cmp.sort_key(index)));
                continue;
            }
            let mut degree = 0;
            for edge in graph.in_edges(index) {
                if forward_set.contains(&edge.src) {
                    already_ready.insert(edge.value);
                } else {
                    degree += 1;
                }
            }
            in_degree[index] = degree;
            if degree == 0 {
                log::trace!("node {} is a branch root", index);
                branch_roots.push(index);
                heap.push(Reverse(cmp.sort_key(index)));
            }
        }

        let (groups, node_to_group, value_to_group) =
            discover_branch_groups(graph, forward_set, boundary, &branch_roots, &in_degree)?;
        let group_count = groups.len();

        Ok(PrioritySchedule {
            graph,
            cmp,
            non_forward_total,
            groups,
            node_to_group,
            value_to_group,
            group_emitted: vec![false; group_count],
            emitted: HashSet::new(),
            already_ready,
            heap,
            order: forward_order,
            emitted_count: 0,
        })
    }

    fn run(&mut self) -> Result<()> {
        while let Some(Reverse(key)) = self.heap.pop() {
            let current = key.index();
            if self.emitted.contains(&current) {
                continue;
            }

            // A grouped node never runs alone: its whole unit goes out as one
            // contiguous block, prerequisite units first.
            if let Some(&group) = self.node_to_group.get(&current) {
                self.emit_group(group)?;
                continue;
            }

            // Pending inputs produced by grouped units force those units out
            // now. Pending inputs of the boundary node are forward outputs
            // that are already scheduled, so they are skipped here.
            for edge in self.graph.in_edges(current) {
                if !self.already_ready.contains(&edge.value) {
                    if let Some(&group) = self.value_to_group.get(&edge.value) {
                        self.emit_group(group)?;
                    }
                }
            }

            self.emit_node(current);
            self.consider_successors(current);
        }

        if self.emitted_count != self.non_forward_total {
            return Err(Error::CycleDetected(format!(
                "non-forward region emitted {} of {} nodes in graph '{}'",
                self.emitted_count, self.non_forward_total, self.graph.name
            )));
        }
        Ok(())
    }

    fn into_order(self) -> Vec<NodeIndex> {
        self.order
    }

    fn emit_node(&mut self, index: NodeIndex) {
        log::trace!("emit node {}", index);
        self.order.push(index);
        self.emitted.insert(index);
        self.emitted_count += 1;
        if let Some(node) = self.graph.node(index) {
            for &out in node.outputs() {
                self.already_ready.insert(out);
            }
        }
    }

    /// Emits a grouped unit: prerequisite units (producers of its not-yet-ready
    /// inputs) first, recursively and exactly once, then every member
    /// contiguously, then the members' successors are examined for readiness.
    fn emit_group(&mut self, group: usize) -> Result<()> {
        if self.group_emitted[group] {
            return Ok(());
        }
        self.group_emitted[group] = true;

        let inputs = self.groups[group].input_values.clone();
        for value in inputs {
            if self.already_ready.contains(&value) {
                continue;
            }
            match self.value_to_group.get(&value).copied() {
                Some(dependency) => self.emit_group(dependency)?,
                None => {
                    return Err(Error::Inconsistency(format!(
                        "group input value '{}' is neither ready nor produced by a grouped unit",
                        self.graph.value_name(value)
                    )));
                }
            }
        }

        let members = self.groups[group].nodes.clone();
        log::trace!("emit grouped unit of {} nodes: {:?}", members.len(), members);
        for &member in &members {
            self.emit_node(member);
        }
        for &member in &members {
            self.consider_successors(member);
        }
        Ok(())
    }

    /// Queue eligibility: a successor enters the ready queue when every input
    /// value is ready, or when every not-yet-ready input is produced by a
    /// known grouped unit (deferred readiness resolved on pop).
    fn consider_successors(&mut self, index: NodeIndex) {
        for edge in self.graph.out_edges(index) {
            let successor = edge.dst;
            if self.emitted.contains(&successor) {
                continue;
            }
            let mut all_ready = true;
            let mut pending_all_grouped = true;
            for in_edge in self.graph.in_edges(successor) {
                if !self.already_ready.contains(&in_edge.value) {
                    all_ready = false;
                    if !self.value_to_group.contains_key(&in_edge.value) {
                        pending_all_grouped = false;
                        break;
                    }
                }
            }
            if all_ready || pending_all_grouped {
                log::trace!("push node {} into ready queue", successor);
                self.heap.push(Reverse(self.cmp.sort_key(successor)));
            }
        }
    }
}

/// Branch-subgraph discovery and grouping.
///
/// BFS forward from the branch roots admits a successor only once its whole
/// effective in-degree is supplied by admitted nodes, yielding the maximal
/// subgraph driven purely by the roots. Each member is then tagged, by reverse
/// DFS from every value crossing out of the subgraph, with the external
/// consumer nodes it feeds; members with identical consumer sets merge into
/// one grouped unit.
#[allow(clippy::type_complexity)]
fn discover_branch_groups(
    graph: &Graph,
    forward_set: &HashSet<NodeIndex>,
    boundary: NodeIndex,
    branch_roots: &[NodeIndex],
    in_degree: &[usize],
) -> Result<(Vec<GroupNode>, HashMap<NodeIndex, usize>, HashMap<ValueId, usize>)> {
    let mut subgraph: Vec<NodeIndex> = branch_roots.to_vec();
    let mut in_subgraph: HashSet<NodeIndex> = branch_roots.iter().copied().collect();
    let mut remaining = in_degree.to_vec();
    let mut queue: VecDeque<NodeIndex> = branch_roots.iter().copied().collect();

    while let Some(current) = queue.pop_front() {
        for edge in graph.out_edges(current) {
            // Zero remaining degree marks the boundary node or an already
            // admitted successor; neither is expanded again.
            if remaining[edge.dst] == 0 {
                continue;
            }
            remaining[edge.dst] -= 1;
            if remaining[edge.dst] == 0 {
                queue.push_back(edge.dst);
                subgraph.push(edge.dst);
                in_subgraph.insert(edge.dst);
            }
        }
    }
    log::debug!("branch subgraph spans {} nodes from {} roots", subgraph.len(), branch_roots.len());

    // Edges leaving the subgraph identify the external consumers and the
    // values that feed them.
    let mut crossings: Vec<(NodeIndex, ValueId)> = Vec::new();
    for &member in &subgraph {
        for edge in graph.out_edges(member) {
            if !in_subgraph.contains(&edge.dst) && !crossings.contains(&(edge.dst, edge.value)) {
                crossings.push((edge.dst, edge.value));
            }
        }
    }

    // Tag every subgraph node with the external consumers it transitively
    // feeds, stopping at forward nodes and at the boundary node.
    let mut associated: HashMap<NodeIndex, BTreeSet<NodeIndex>> = HashMap::new();
    for &(consumer, value) in &crossings {
        let Some(end_node) = graph.producer_node(value) else { continue };
        graph.reverse_dfs_from(
            &[end_node],
            |n| {
                associated.entry(n).or_default().insert(consumer);
            },
            |_, to| forward_set.contains(&to) || to == boundary,
        )?;
    }

    // Identical consumer sets share one unit. Members keep BFS admission
    // order, so each unit's node list is itself topologically ordered.
    let mut groups: Vec<GroupNode> = Vec::new();
    let mut key_to_group: HashMap<BTreeSet<NodeIndex>, usize> = HashMap::new();
    let mut node_to_group: HashMap<NodeIndex, usize> = HashMap::new();
    for &member in &subgraph {
        let key = associated.get(&member).cloned().unwrap_or_default();
        let group = *key_to_group.entry(key).or_insert_with(|| {
            groups.push(GroupNode::default());
            groups.len() - 1
        });
        groups[group].nodes.push(member);
        node_to_group.insert(member, group);
    }

    let mut value_to_group: HashMap<ValueId, usize> = HashMap::new();
    for (id, group) in groups.iter_mut().enumerate() {
        group.finalize(graph);
        for &value in &group.output_values {
            value_to_group.insert(value, id);
        }
        log::trace!(
            "grouped unit {}: nodes {:?}, inputs {:?}, outputs {:?}",
            id,
            group.nodes,
            group.input_values,
            group.output_values
        );
    }

    Ok((groups, node_to_group, value_to_group))
}
