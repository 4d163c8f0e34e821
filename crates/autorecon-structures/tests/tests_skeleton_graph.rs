// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use autorecon_structures::{NeuriteType, NodeId, ReconError, SkeletonGraph, SkeletonNode};
use proptest::prelude::*;

/// Build a tree from a parent table: entry `i` is the parent slot of node
/// `i + 1`, always pointing at an earlier node.
fn tree_from_parents(parents: &[usize], kinds: &[u8]) -> SkeletonGraph {
    let mut graph = SkeletonGraph::new();
    graph
        .add_node(SkeletonNode::new(NodeId(1), NeuriteType::Soma, [0.0, 0.0, 0.0], 3.0))
        .unwrap();
    for (i, (&parent, &kind)) in parents.iter().zip(kinds).enumerate() {
        let id = NodeId(i as u32 + 2);
        let kind = if kind % 2 == 0 { NeuriteType::Axon } else { NeuriteType::Dendrite };
        graph
            .add_node(SkeletonNode::new(id, kind, [i as f64, 1.0, 0.5], 0.5))
            .unwrap();
        graph.set_parent(id, Some(NodeId(parent as u32 + 1))).unwrap();
    }
    graph
}

fn parent_table() -> impl Strategy<Value = (Vec<usize>, Vec<u8>)> {
    (1usize..60).prop_flat_map(|n| {
        let parents = (0..n).map(|i| 0..=i).collect::<Vec<_>>();
        (parents, proptest::collection::vec(any::<u8>(), n))
    })
}

proptest! {
    #[test]
    fn random_trees_validate((parents, kinds) in parent_table()) {
        let graph = tree_from_parents(&parents, &kinds);
        prop_assert!(graph.validate().is_ok());

        let order = graph.breadth_first().unwrap();
        prop_assert_eq!(order.len(), graph.len());
        prop_assert_eq!(order[0], NodeId(1));

        // every parent appears before its children
        let position: std::collections::HashMap<_, _> =
            order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        for id in &order {
            if let Some(parent) = graph.parent(*id) {
                prop_assert!(position[&parent] < position[id]);
            }
        }
    }

    #[test]
    fn bincode_round_trip_preserves_structure((parents, kinds) in parent_table()) {
        let mut graph = tree_from_parents(&parents, &kinds);
        graph.freeze().unwrap();
        let bytes = bincode::serialize(&graph).unwrap();
        let restored: SkeletonGraph = bincode::deserialize(&bytes).unwrap();

        prop_assert!(restored.is_frozen());
        prop_assert_eq!(restored.breadth_first().unwrap(), graph.breadth_first().unwrap());
        for node in graph.nodes() {
            prop_assert_eq!(restored.node(node.id), Some(node));
            prop_assert_eq!(restored.parent(node.id), graph.parent(node.id));
            prop_assert_eq!(
                restored.children(node.id).collect::<Vec<_>>(),
                graph.children(node.id).collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn geodesic_distance_grows_away_from_root((parents, kinds) in parent_table()) {
        let graph = tree_from_parents(&parents, &kinds);
        let distances = graph.geodesic_distances().unwrap();
        for node in graph.nodes() {
            if let Some(parent) = graph.parent(node.id) {
                prop_assert!(distances[&node.id] >= distances[&parent]);
            }
        }
    }
}

#[test]
fn test_json_record_omits_children_index() {
    let graph = tree_from_parents(&[0, 0, 1], &[0, 1, 0]);
    let json = serde_json::to_value(&graph).unwrap();
    let object = json.as_object().unwrap();
    assert!(object.contains_key("nodes"));
    assert!(!object.contains_key("children"));
    assert_eq!(object["nodes"].as_array().unwrap().len(), 4);
}

#[test]
fn test_deserialize_rejects_frozen_invalid_graph() {
    // two roots, marked frozen
    let json = serde_json::json!({
        "nodes": [
            [{"id": 1, "kind": "Soma", "position": [0.0, 0.0, 0.0], "radius": 1.0}, null],
            [{"id": 2, "kind": "Axon", "position": [1.0, 0.0, 0.0], "radius": 1.0}, null]
        ],
        "frozen": true
    });
    let result: Result<SkeletonGraph, _> = serde_json::from_value(json);
    assert!(result.is_err());
}

#[test]
fn test_detached_fragment_reported_as_topology_violation() {
    let mut graph = tree_from_parents(&[0, 1], &[0, 0]);
    graph.set_parent(NodeId(3), None).unwrap();
    match graph.validate() {
        Err(ReconError::TopologyViolation(message)) => assert!(message.contains("root")),
        other => panic!("expected topology violation, got {:?}", other),
    }
}
