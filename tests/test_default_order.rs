use dataflow_scheduler::error::Error;
use dataflow_scheduler::graph::graph::Graph;
use dataflow_scheduler::graph::node::NodeIndex;
use dataflow_scheduler::graph::value::ElementType;
use dataflow_scheduler::scheduler::default_order::build_default_order;
use dataflow_scheduler::view::{ComputationView, ExecutionOrder};

fn position(order: &[NodeIndex], node: NodeIndex) -> usize {
    order.iter().position(|&n| n == node).unwrap_or_else(|| panic!("node {} missing from order {:?}", node, order))
}

fn assert_topological(graph: &Graph, order: &[NodeIndex]) {
    for node in graph.nodes() {
        for edge in graph.out_edges(node.index()) {
            assert!(
                position(order, edge.src) < position(order, edge.dst),
                "edge {} -> {} violated in {:?}",
                edge.src,
                edge.dst,
                order
            );
        }
    }
}

/// A -> B -> D, A -> C(Shape) -> D.
fn shape_diamond() -> (Graph, [NodeIndex; 4]) {
    let mut g = Graph::new("shape_diamond");
    let x = g.add_graph_input("x", ElementType::Float);
    let a_out = g.add_value("a_out", Some(ElementType::Float));
    let b_out = g.add_value("b_out", Some(ElementType::Float));
    let c_out = g.add_value("c_out", Some(ElementType::Int64));
    let d_out = g.add_value("d_out", Some(ElementType::Float));
    let a = g.add_node("A", "Gemm", &[x], &[a_out]).unwrap();
    let b = g.add_node("B", "Relu", &[a_out], &[b_out]).unwrap();
    let c = g.add_node("C", "Shape", &[a_out], &[c_out]).unwrap();
    let d = g.add_node("D", "Gemm", &[b_out, c_out], &[d_out]).unwrap();
    g.set_outputs(&[d_out]);
    (g, [a, b, c, d])
}

#[test]
fn order_is_topological_and_a_permutation() {
    let (g, nodes) = shape_diamond();
    let order = build_default_order(&g).unwrap();

    assert_topological(&g, &order);

    let mut sorted = order.clone();
    sorted.sort_unstable();
    let mut expected: Vec<NodeIndex> = nodes.to_vec();
    expected.sort_unstable();
    assert_eq!(sorted, expected, "order must cover every node exactly once");
}

#[test]
fn shape_consumer_runs_immediately_after_its_producer() {
    let (g, [a, _b, c, d]) = shape_diamond();
    let order = build_default_order(&g).unwrap();

    assert_eq!(position(&order, c), position(&order, a) + 1, "shape node must be hoisted next to its producer");
    assert!(position(&order, c) < position(&order, d));
}

#[test]
fn only_the_first_shape_consumer_is_hoisted() {
    let mut g = Graph::new("two_shapes");
    let x = g.add_graph_input("x", ElementType::Float);
    let a_out = g.add_value("a_out", Some(ElementType::Float));
    let s1_out = g.add_value("s1_out", Some(ElementType::Int64));
    let s2_out = g.add_value("s2_out", Some(ElementType::Int64));
    let y_out = g.add_value("y_out", Some(ElementType::Float));
    let a = g.add_node("A", "Gemm", &[x], &[a_out]).unwrap();
    let s1 = g.add_node("S1", "Shape", &[a_out], &[s1_out]).unwrap();
    let s2 = g.add_node("S2", "Size", &[a_out], &[s2_out]).unwrap();
    let y = g.add_node("Y", "Gemm", &[s1_out, s2_out], &[y_out]).unwrap();
    g.set_outputs(&[y_out]);

    let order = build_default_order(&g).unwrap();
    assert_topological(&g, &order);
    assert_eq!(position(&order, s1), position(&order, a) + 1);
    assert!(position(&order, s2) > position(&order, a), "the second metadata consumer keeps a valid placement");
    assert!(position(&order, s2) < position(&order, y));
}

#[test]
fn repeated_construction_is_deterministic() {
    let (g, _) = shape_diamond();
    let first = build_default_order(&g).unwrap();
    let second = build_default_order(&g).unwrap();
    assert_eq!(first, second);

    let view_a = ComputationView::new(&g).unwrap();
    let view_b = ComputationView::new(&g).unwrap();
    assert_eq!(
        view_a.nodes_in_topological_order(ExecutionOrder::Default),
        view_b.nodes_in_topological_order(ExecutionOrder::Default)
    );
    assert_eq!(
        view_a.nodes_in_topological_order(ExecutionOrder::PriorityBased),
        view_b.nodes_in_topological_order(ExecutionOrder::PriorityBased)
    );
}

#[test]
fn unreachable_cycle_is_fatal() {
    // n0 and n1 feed each other; no sink exists, so nothing can be emitted.
    let mut g = Graph::new("pure_cycle");
    let v1 = g.add_value("v1", Some(ElementType::Float));
    let v2 = g.add_value("v2", Some(ElementType::Float));
    g.add_node("n0", "Gemm", &[v2], &[v1]).unwrap();
    g.add_node("n1", "Gemm", &[v1], &[v2]).unwrap();

    let err = build_default_order(&g).unwrap_err();
    assert!(matches!(err, Error::CycleDetected(_)), "expected a cycle error, got {:?}", err);
    assert!(ComputationView::new(&g).is_err(), "view construction must fail on a cyclic graph");
}

#[test]
fn cycle_reachable_from_a_sink_is_fatal() {
    // A -> B -> C -> A, with C also feeding a sink S.
    let mut g = Graph::new("reachable_cycle");
    let va = g.add_value("va", Some(ElementType::Float));
    let vb = g.add_value("vb", Some(ElementType::Float));
    let vc = g.add_value("vc", Some(ElementType::Float));
    let vs = g.add_value("vs", Some(ElementType::Float));
    g.add_node("A", "Gemm", &[vc], &[va]).unwrap();
    g.add_node("B", "Gemm", &[va], &[vb]).unwrap();
    g.add_node("C", "Gemm", &[vb], &[vc]).unwrap();
    g.add_node("S", "Relu", &[vc], &[vs]).unwrap();
    g.set_outputs(&[vs]);

    let err = build_default_order(&g).unwrap_err();
    assert!(matches!(err, Error::CycleDetected(_)), "expected a cycle error, got {:?}", err);
}
