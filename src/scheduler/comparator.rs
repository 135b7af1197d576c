use std::cmp::{Ordering, Reverse};

use crate::graph::graph::Graph;
use crate::graph::node::{ExecutionPriority, NodeIndex};

/// Sort key realizing the scheduling tie-break among ready candidates; lower
/// sorts earlier. Field order is the comparison order:
///
/// 1. shape/size metadata operations before anything else,
/// 2. lower numeric priority class first,
/// 3. at default priority only, forward-pass nodes before backward-pass nodes,
/// 4. at local-low priority only, higher critical-path impact first (a missing
///    impact attribute counts as the minimum impact, keeping the order total),
/// 5. lower node index as the stable fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PrioritySortKey {
    not_metadata: bool,
    priority: i32,
    backward: u8,
    impact: Reverse<i64>,
    index: NodeIndex,
}

/// Comparator for the priority-queue Kahn pass, parameterized by the one piece
/// of state it needs: the graph whose attributes and priorities it reads.
pub struct PriorityNodeCompare<'g> {
    graph: &'g Graph,
}

impl<'g> PriorityNodeCompare<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        PriorityNodeCompare { graph }
    }

    pub fn sort_key(&self, index: NodeIndex) -> PrioritySortKey {
        let node = self.graph.node(index).expect("sort key requested for a tombstoned node");
        let priority = node.priority;

        // The forward/backward preference only separates default-priority
        // nodes; the impact preference only separates local-low recompute
        // duplicates. Outside those classes the fields are neutral.
        let backward = if priority == ExecutionPriority::Default.value() && !node.is_forward_pass() { 1 } else { 0 };
        let impact = if priority == ExecutionPriority::LocalLow.value() {
            node.critical_path_impact().unwrap_or(i64::MIN)
        } else {
            0
        };

        PrioritySortKey {
            not_metadata: !node.is_shape_or_size(),
            priority,
            backward,
            impact: Reverse(impact),
            index,
        }
    }

    pub fn compare(&self, a: NodeIndex, b: NodeIndex) -> Ordering {
        self.sort_key(a).cmp(&self.sort_key(b))
    }
}

impl PrioritySortKey {
    pub fn index(&self) -> NodeIndex {
        self.index
    }
}
