use dataflow_scheduler::error::Error;
use dataflow_scheduler::graph::graph::{Graph, TensorData};
use dataflow_scheduler::graph::node::NodeIndex;
use dataflow_scheduler::graph::value::{ElementType, ValueId};
use dataflow_scheduler::partition::PartitionDescriptor;
use dataflow_scheduler::view::{ComputationView, ExecutionOrder};

struct Fixture {
    graph: Graph,
    a: ValueId,
    c: ValueId,
    w2: ValueId,
}

/// x --n0(Gemm,w1)--> a --n1(Relu)--> b --n2(Gemm,w2)--> c --n4(Gemm)--> d
///                    a --n3(Shape)-----------------> s --^
fn fixture() -> Fixture {
    let mut g = Graph::new("main");
    let x = g.add_graph_input("x", ElementType::Float);
    let w1 = g.add_initializer("w1", TensorData::new(ElementType::Float, vec![2, 2]));
    let w2 = g.add_initializer("w2", TensorData::new(ElementType::Float, vec![2, 2]));
    let a = g.add_value("a", Some(ElementType::Float));
    let b = g.add_value("b", Some(ElementType::Float));
    let c = g.add_value("c", Some(ElementType::Float));
    let s = g.add_value("s", Some(ElementType::Int64));
    let d = g.add_value("d", Some(ElementType::Float));
    g.add_node("n0", "Gemm", &[x, w1], &[a]).unwrap();
    g.add_node("n1", "Relu", &[a], &[b]).unwrap();
    g.add_node("n2", "Gemm", &[b, w2], &[c]).unwrap();
    g.add_node("n3", "Shape", &[a], &[s]).unwrap();
    g.add_node("n4", "Gemm", &[c, s], &[d]).unwrap();
    g.set_outputs(&[d]);
    Fixture { graph: g, a, c, w2 }
}

fn middle_partition() -> PartitionDescriptor {
    PartitionDescriptor::new("sub", vec![1, 2], vec!["a".into(), "w2".into()], vec!["c".into()])
}

fn restrict(order: &[NodeIndex], keep: &[NodeIndex]) -> Vec<NodeIndex> {
    order.iter().copied().filter(|n| keep.contains(n)).collect()
}

#[test]
fn filtered_orders_are_stable_restrictions_of_the_full_orders() {
    let f = fixture();
    let full = ComputationView::new(&f.graph).unwrap();
    let sub = ComputationView::with_partition(&f.graph, middle_partition()).unwrap();

    for order in [ExecutionOrder::Default, ExecutionOrder::PriorityBased] {
        let expected = restrict(full.nodes_in_topological_order(order), &[1, 2]);
        assert_eq!(sub.nodes_in_topological_order(order), expected.as_slice());
    }
    assert_eq!(sub.nodes_in_topological_order(ExecutionOrder::Default), &[1, 2]);
}

#[test]
fn filtered_view_exposes_declared_boundary_values() {
    let f = fixture();
    let sub = ComputationView::with_partition(&f.graph, middle_partition()).unwrap();

    assert!(sub.is_filtered());
    assert_eq!(sub.name(), "sub");
    assert_eq!(sub.inputs(), &[f.a], "initializer inputs are excluded from the plain input list");
    assert_eq!(sub.inputs_including_initializers(), &[f.a, f.w2]);
    assert_eq!(sub.outputs(), &[f.c]);
}

#[test]
fn filtered_view_exposes_only_referenced_initializers() {
    let f = fixture();
    let full = ComputationView::new(&f.graph).unwrap();
    let sub = ComputationView::with_partition(&f.graph, middle_partition()).unwrap();

    assert_eq!(full.initializer_names(), vec!["w1".to_string(), "w2".to_string()]);
    assert!(full.initializer("w1").is_some());

    assert_eq!(sub.initializer_names(), vec!["w2".to_string()]);
    assert!(sub.initializer("w2").is_some());
    assert!(sub.initializer("w1").is_none(), "no exposed node references w1");
    assert!(sub.is_initializer("w2"));
    assert!(!sub.is_initializer("w1"));
}

#[test]
fn implicitly_referenced_initializers_survive_filtering() {
    // A nested-scope node captures its constant through an implicit input
    // rather than an explicit one.
    let mut g = Graph::new("nested");
    let x = g.add_graph_input("x", ElementType::Float);
    let w_outer = g.add_initializer("w_outer", TensorData::new(ElementType::Float, vec![2]));
    let w_body = g.add_initializer("w_body", TensorData::new(ElementType::Float, vec![2]));
    let a = g.add_value("a", Some(ElementType::Float));
    let o = g.add_value("o", Some(ElementType::Float));
    g.add_node("n0", "Gemm", &[x, w_outer], &[a]).unwrap();
    let body = g.add_node("body", "Loop", &[a], &[o]).unwrap();
    g.set_implicit_inputs(body, &[w_body]).unwrap();
    g.set_outputs(&[o]);

    let part = PartitionDescriptor::new("body", vec![body], vec!["a".into()], vec!["o".into()]);
    let sub = ComputationView::with_partition(&g, part).unwrap();

    assert!(sub.initializer("w_body").is_some(), "constant captured through an implicit input must be exposed");
    assert!(sub.initializer("w_outer").is_none(), "no exposed node references w_outer");
    assert_eq!(sub.initializer_names(), vec!["w_body".to_string()]);
}

#[test]
fn node_queries_respect_the_filter() {
    let f = fixture();
    let sub = ComputationView::with_partition(&f.graph, middle_partition()).unwrap();

    assert!(sub.node(0).is_none());
    assert!(sub.node(1).is_some());
    assert_eq!(sub.number_of_nodes(), 2);
    assert_eq!(sub.max_node_index(), 5, "index space is shared with the full graph");
    let exposed: Vec<NodeIndex> = sub.nodes().map(|n| n.index()).collect();
    assert_eq!(exposed, vec![1, 2]);

    assert!(sub.node_produces_graph_output(2), "n2 produces the declared output c");
    assert!(!sub.node_produces_graph_output(1));
}

#[test]
fn root_nodes_are_only_defined_on_the_unfiltered_view() {
    let f = fixture();
    let full = ComputationView::new(&f.graph).unwrap();
    assert_eq!(full.root_nodes().unwrap(), &[0]);

    let sub = ComputationView::with_partition(&f.graph, middle_partition()).unwrap();
    let err = sub.root_nodes().unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)), "expected an invalid-query error, got {:?}", err);
}

#[test]
fn partition_referencing_a_missing_node_is_rejected() {
    let f = fixture();
    let bad = PartitionDescriptor::new("bad", vec![99], Vec::new(), Vec::new());
    let err = ComputationView::with_partition(&f.graph, bad).unwrap_err();
    assert!(matches!(err, Error::InvalidPartition(_)), "expected an invalid-partition error, got {:?}", err);
}

#[test]
fn partition_referencing_a_missing_value_is_rejected() {
    let f = fixture();
    let bad = PartitionDescriptor::new("bad", vec![1], vec!["no_such_value".into()], Vec::new());
    let err = ComputationView::with_partition(&f.graph, bad).unwrap_err();
    assert!(matches!(err, Error::InvalidPartition(_)));
}
