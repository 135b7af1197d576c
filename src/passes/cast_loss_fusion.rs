use crate::error::Result;
use crate::graph::graph::Graph;
use crate::graph::value::ElementType;
use crate::view::{ComputationView, ExecutionOrder};

const CAST_OP: &str = "Cast";
const LOSS_OP: &str = "SoftmaxCrossEntropyLoss";

/// Folds away a redundant up-cast feeding a loss computation.
///
/// The loss kernel accepts half-precision inputs directly, so a `Cast`
/// (Float16 to Float) whose only consumer is the loss node's logits input is
/// dead weight: the pass rewires the loss to the cast's input and removes the
/// cast.
///
/// Also the illustrative rewrite-pass contract: a pass walks the default
/// order of a fresh view, touches only nodes reachable through it, and
/// reports whether it modified the graph.
pub struct CastLossFusion;

impl CastLossFusion {
    pub fn apply(&self, graph: &mut Graph) -> Result<bool> {
        let order = {
            let view = ComputationView::new(graph)?;
            view.nodes_in_topological_order(ExecutionOrder::Default).to_vec()
        };

        let mut modified = false;
        for index in order {
            // The node may have been removed by an earlier rewrite.
            let Some(node) = graph.node(index) else { continue };
            if node.op_type != LOSS_OP {
                continue;
            }

            let Some(edge) = graph.in_edges(index).into_iter().next() else { continue };
            let Some(cast) = graph.node(edge.src) else { continue };
            if cast.op_type != CAST_OP {
                continue;
            }

            // The cast's output must feed nothing but this loss input.
            if graph.out_edges(cast.index()).len() != 1 {
                continue;
            }
            let cast_input = match cast.inputs().first() {
                Some(&v) => v,
                None => continue,
            };
            let from_half = graph.value(cast_input).dtype == Some(ElementType::Float16);
            let to_float = cast.outputs().first().map(|&v| graph.value(v).dtype) == Some(Some(ElementType::Float));
            if !from_half || !to_float {
                continue;
            }

            let cast_index = cast.index();
            graph.replace_input(index, edge.dst_arg, cast_input)?;
            graph.remove_node(cast_index)?;
            log::debug!("fused cast node {} into loss node {}", cast_index, index);
            modified = true;
        }

        Ok(modified)
    }
}
