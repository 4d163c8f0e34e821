// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! 26-connected foreground components of a label volume.

use autorecon_structures::{LabelVolume, VoxelClass, VoxelIndex};
use ndarray::{Array3, Zip};
use rayon::prelude::*;
use std::collections::VecDeque;

/// Offsets to the 26 neighbors of a voxel, `[dz, dy, dx]`, in raster order
pub(crate) const OFFSETS_26: [[i64; 3]; 26] = offsets_26();

const fn offsets_26() -> [[i64; 3]; 26] {
    let mut out = [[0i64; 3]; 26];
    let mut i = 0;
    let mut dz = -1;
    while dz <= 1 {
        let mut dy = -1;
        while dy <= 1 {
            let mut dx = -1;
            while dx <= 1 {
                if !(dz == 0 && dy == 0 && dx == 0) {
                    out[i] = [dz, dy, dx];
                    i += 1;
                }
                dx += 1;
            }
            dy += 1;
        }
        dz += 1;
    }
    out
}

/// `index + offset` if it stays inside `shape`
pub(crate) fn shifted(shape: [usize; 3], index: VoxelIndex, offset: [i64; 3]) -> Option<VoxelIndex> {
    let mut out = [0usize; 3];
    for axis in 0..3 {
        let v = index[axis] as i64 + offset[axis];
        if v < 0 || v >= shape[axis] as i64 {
            return None;
        }
        out[axis] = v as usize;
    }
    Some(out)
}

/// One connected blob of a single class
#[derive(Debug, Clone)]
pub struct Component {
    /// 1-based, unique across classes
    pub id: u32,
    pub class: VoxelClass,
    /// Voxels in discovery order
    pub voxels: Vec<VoxelIndex>,
}

impl Component {
    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }
}

/// Surviving components plus a voxel → component id map (0 = none)
#[derive(Debug)]
pub struct ComponentSet {
    pub components: Vec<Component>,
    pub map: Array3<u32>,
    pub discarded: usize,
}

impl ComponentSet {
    pub fn of_class(&self, class: VoxelClass) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(move |c| c.class == class)
    }

    pub fn get(&self, id: u32) -> Option<&Component> {
        id.checked_sub(1).and_then(|i| self.components.get(i as usize))
    }
}

/// Voxels of `class` with at least `min_confidence`
pub fn class_mask(labels: &LabelVolume, class: VoxelClass, min_confidence: f32) -> Array3<bool> {
    let mut mask = Array3::from_elem(labels.labels().raw_dim(), false);
    Zip::from(&mut mask)
        .and(labels.labels())
        .and(labels.confidence())
        .for_each(|m, &label, &confidence| {
            *m = label == class && confidence >= min_confidence;
        });
    mask
}

/// 26-connected components of a boolean mask, in raster discovery order
pub fn label_mask(mask: &Array3<bool>) -> Vec<Vec<VoxelIndex>> {
    let (z, y, x) = mask.dim();
    let shape = [z, y, x];
    let mut seen = Array3::from_elem((z, y, x), false);
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for ((iz, iy, ix), &inside) in mask.indexed_iter() {
        if !inside || seen[[iz, iy, ix]] {
            continue;
        }
        let mut voxels = Vec::new();
        seen[[iz, iy, ix]] = true;
        queue.push_back([iz, iy, ix]);
        while let Some(voxel) = queue.pop_front() {
            voxels.push(voxel);
            for offset in OFFSETS_26 {
                if let Some(next) = shifted(shape, voxel, offset) {
                    if mask[next] && !seen[next] {
                        seen[next] = true;
                        queue.push_back(next);
                    }
                }
            }
        }
        components.push(voxels);
    }
    components
}

/// Find every foreground component and drop debris.
///
/// Soma components need `min_soma_voxels`, axon and dendrite components need
/// `min_component_voxels`. Classes are labeled in parallel; ids are assigned
/// in class order, then discovery order.
pub fn extract_components(
    labels: &LabelVolume,
    min_confidence: f32,
    min_component_voxels: usize,
    min_soma_voxels: usize,
) -> ComponentSet {
    let per_class: Vec<(VoxelClass, Vec<Vec<VoxelIndex>>)> = VoxelClass::FOREGROUND
        .par_iter()
        .map(|&class| (class, label_mask(&class_mask(labels, class, min_confidence))))
        .collect();

    let mut map = Array3::zeros(labels.labels().raw_dim());
    let mut components = Vec::new();
    let mut discarded = 0;
    for (class, blobs) in per_class {
        let minimum = if class == VoxelClass::Soma {
            min_soma_voxels
        } else {
            min_component_voxels
        };
        for voxels in blobs {
            if voxels.len() < minimum.max(1) {
                discarded += 1;
                continue;
            }
            let id = components.len() as u32 + 1;
            for &voxel in &voxels {
                map[voxel] = id;
            }
            components.push(Component { id, class, voxels });
        }
    }

    ComponentSet {
        components,
        map,
        discarded,
    }
}
