// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::labels::VoxelClass;
use crate::volume::Position;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Node identifier, unique within one specimen. Positive, as in SWC files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compartment type of a skeleton node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NeuriteType {
    Soma,
    Axon,
    Dendrite,
}

impl NeuriteType {
    /// SWC type code (0 is reserved for background pass-through)
    pub fn swc_code(self) -> i32 {
        match self {
            NeuriteType::Soma => 1,
            NeuriteType::Axon => 2,
            NeuriteType::Dendrite => 3,
        }
    }

    pub fn from_swc_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(NeuriteType::Soma),
            2 => Some(NeuriteType::Axon),
            3 => Some(NeuriteType::Dendrite),
            _ => None,
        }
    }

    pub fn is_neurite(self) -> bool {
        self != NeuriteType::Soma
    }
}

impl From<NeuriteType> for VoxelClass {
    fn from(kind: NeuriteType) -> Self {
        match kind {
            NeuriteType::Soma => VoxelClass::Soma,
            NeuriteType::Axon => VoxelClass::Axon,
            NeuriteType::Dendrite => VoxelClass::Dendrite,
        }
    }
}

impl TryFrom<VoxelClass> for NeuriteType {
    type Error = VoxelClass;

    fn try_from(class: VoxelClass) -> Result<Self, Self::Error> {
        match class {
            VoxelClass::Soma => Ok(NeuriteType::Soma),
            VoxelClass::Axon => Ok(NeuriteType::Axon),
            VoxelClass::Dendrite => Ok(NeuriteType::Dendrite),
            VoxelClass::Background => Err(class),
        }
    }
}

/// One centerline point of the reconstructed tree. The parent link lives in
/// the owning [`super::SkeletonGraph`], not here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkeletonNode {
    pub id: NodeId,
    pub kind: NeuriteType,
    /// `[x, y, z]` in micrometers
    pub position: Position,
    /// Micrometers, never negative
    pub radius: f64,
}

impl SkeletonNode {
    pub fn new(id: NodeId, kind: NeuriteType, position: Position, radius: f64) -> Self {
        Self {
            id,
            kind,
            position,
            radius,
        }
    }
}
