use std::collections::{BTreeMap, HashSet};

use crate::error::{Error, Result};
use crate::graph::graph::Graph;
use crate::graph::node::NodeIndex;

/// Computes the default topological order: reverse DFS from every sink over
/// predecessor edges, whose leave order is already forward-topological, with
/// the lower node index winning ties. A training graph then gets the
/// shape/size hoist applied so metadata queries run right after their
/// producer and the producer's output can be released early.
pub fn build_default_order(graph: &Graph) -> Result<Vec<NodeIndex>> {
    let sinks = graph.sink_nodes();
    let mut order = Vec::with_capacity(graph.number_of_nodes());
    graph.reverse_dfs_from(&sinks, |n| order.push(n), |_, _| false)?;

    if order.len() != graph.number_of_nodes() {
        return Err(Error::CycleDetected(format!(
            "default order emitted {} of {} nodes in graph '{}'",
            order.len(),
            graph.number_of_nodes(),
            graph.name
        )));
    }

    log::debug!("default order for graph '{}' covers {} nodes", graph.name, order.len());
    Ok(hoist_after_producer(order, &shape_size_hoist_map(graph)))
}

/// Maps a producer node to the shape/size consumer hoisted next to it.
///
/// A shape/size node with no in-edge reads a graph input and has nothing to
/// hoist after. When one producer feeds several shape/size consumers, only the
/// first-visited (lowest-index) one is claimed; the others keep their default
/// placement.
pub(crate) fn shape_size_hoist_map(graph: &Graph) -> BTreeMap<NodeIndex, NodeIndex> {
    let mut map = BTreeMap::new();
    for node in graph.nodes() {
        if !node.is_shape_or_size() {
            continue;
        }
        let Some(edge) = graph.in_edges(node.index()).into_iter().next() else { continue };
        map.entry(edge.src).or_insert_with(|| {
            log::trace!("shape/size node {} will be hoisted after producer {}", node.index(), edge.src);
            node.index()
        });
    }
    map
}

/// Re-inserts each hoisted metadata node immediately after its producer.
/// Idempotent: a node already adjacent stays where it is, and a hoisted node's
/// later occurrence in the base order is skipped.
pub(crate) fn hoist_after_producer(
    order: Vec<NodeIndex>,
    hoist: &BTreeMap<NodeIndex, NodeIndex>,
) -> Vec<NodeIndex> {
    let mut result = Vec::with_capacity(order.len());
    let mut placed: HashSet<NodeIndex> = HashSet::with_capacity(order.len());
    for node in order {
        if placed.contains(&node) {
            continue;
        }
        result.push(node);
        placed.insert(node);
        if let Some(&consumer) = hoist.get(&node) {
            if placed.insert(consumer) {
                result.push(consumer);
            }
        }
    }
    result
}
