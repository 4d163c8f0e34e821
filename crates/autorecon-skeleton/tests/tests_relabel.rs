// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

mod common;

use autorecon_config::RelabelConfig;
use autorecon_skeleton::{GraphBuilder, Relabeler};
use autorecon_structures::NeuriteType;
use common::*;

#[test]
fn test_mislabeled_slab_in_axon_is_absorbed() {
    let (mut graph, summary) = GraphBuilder::new(graph_config())
        .build(&tube_with_dendrite_slab(24))
        .unwrap();
    assert_eq!(summary.axon_components, 2);
    assert_eq!(summary.dendrite_components, 1);
    assert!(count_kind(&graph, NeuriteType::Dendrite) >= 1);

    let result = Relabeler::new(RelabelConfig::default()).relabel(&mut graph).unwrap();

    assert!(result.nodes_changed >= 1);
    assert_eq!(count_kind(&graph, NeuriteType::Dendrite), 0);
    let root = graph.root().unwrap();
    assert_eq!(graph.node(root).unwrap().kind, NeuriteType::Soma);
    graph.validate().unwrap();
}

#[test]
fn test_relabel_of_built_graph_is_idempotent() {
    let (mut graph, _) = GraphBuilder::new(graph_config())
        .build(&tube_with_dendrite_slab(20))
        .unwrap();
    let relabeler = Relabeler::new(RelabelConfig::default());
    relabeler.relabel(&mut graph).unwrap();
    let once: Vec<_> = graph.nodes().copied().collect();

    let again = relabeler.relabel(&mut graph).unwrap();
    let twice: Vec<_> = graph.nodes().copied().collect();
    assert_eq!(again.nodes_changed, 0);
    assert_eq!(once, twice);
}

#[test]
fn test_uniform_axon_untouched() {
    let (mut graph, _) = GraphBuilder::new(graph_config()).build(&soma_and_tube()).unwrap();
    let before: Vec<_> = graph.nodes().copied().collect();
    let summary = Relabeler::new(RelabelConfig::default()).relabel(&mut graph).unwrap();
    let after: Vec<_> = graph.nodes().copied().collect();

    assert_eq!(summary.nodes_changed, 0);
    assert_eq!(before, after);
}
