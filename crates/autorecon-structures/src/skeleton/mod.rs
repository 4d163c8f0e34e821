// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Rooted neuron skeleton: typed centerline nodes joined by parent links.

mod graph;
mod node;

pub use graph::SkeletonGraph;
pub use node::{NeuriteType, NodeId, SkeletonNode};
