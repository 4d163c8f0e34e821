// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Volume loading from a directory of z-slices.
//!
//! One grayscale image per z-plane (TIFF or PNG, 8 or 16 bit), ordered by
//! file name. Voxel size comes from a JSON sidecar in the same directory, then
//! from the caller (batch manifest), then from the configured default.

use autorecon_config::VolumeConfig;
use autorecon_structures::{ReconError, ReconResult, Volume, VoxelSpacing};
use image::ImageError;
use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Slice files of a stack directory, sorted by file name
pub fn list_slices(dir: &Path, extensions: &[String]) -> ReconResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ReconError::from_io(format!("listing {}", dir.display()), e))?;

    let mut slices = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| ReconError::from_io(format!("listing {}", dir.display()), e))?
            .path();
        let accepted = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if accepted && path.is_file() {
            slices.push(path);
        }
    }
    slices.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    if slices.is_empty() {
        return Err(ReconError::MalformedInput(format!(
            "no slice images ({}) found in {}",
            extensions.join(", "),
            dir.display()
        )));
    }
    Ok(slices)
}

/// Voxel size from the sidecar file, if the stack has one
pub fn read_voxel_size_sidecar(dir: &Path, file_name: &str) -> ReconResult<Option<VoxelSpacing>> {
    let path = dir.join(file_name);
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)
        .map_err(|e| ReconError::from_io(format!("reading {}", path.display()), e))?;
    let spacing: VoxelSpacing = serde_json::from_str(&text).map_err(|e| {
        ReconError::MalformedInput(format!("invalid voxel size file {}: {}", path.display(), e))
    })?;
    spacing.validate()?;
    Ok(Some(spacing))
}

/// Sidecar, then `manifest`, then the configured default
pub fn resolve_spacing(
    dir: &Path,
    config: &VolumeConfig,
    manifest: Option<VoxelSpacing>,
) -> ReconResult<VoxelSpacing> {
    if let Some(spacing) = read_voxel_size_sidecar(dir, &config.voxel_size_file)? {
        return Ok(spacing);
    }
    match manifest {
        Some(spacing) => {
            spacing.validate()?;
            Ok(spacing)
        }
        None => VoxelSpacing::from_zyx(config.default_voxel_size_um),
    }
}

fn decode_slice(path: &Path) -> ReconResult<Array2<f32>> {
    let image = image::open(path).map_err(|e| match e {
        ImageError::IoError(io) => ReconError::from_io(format!("reading slice {}", path.display()), io),
        other => ReconError::MalformedInput(format!(
            "cannot decode slice {}: {}",
            path.display(),
            other
        )),
    })?;
    let gray = image.into_luma16();
    let (width, height) = gray.dimensions();
    let samples: Vec<f32> = gray.into_raw().into_iter().map(f32::from).collect();
    Array2::from_shape_vec((height as usize, width as usize), samples).map_err(|e| {
        ReconError::Internal(format!("slice buffer of {} has wrong size: {}", path.display(), e))
    })
}

/// Load and normalize a slice stack
pub fn load_volume(
    dir: &Path,
    config: &VolumeConfig,
    manifest_spacing: Option<VoxelSpacing>,
) -> ReconResult<Volume> {
    let spacing = resolve_spacing(dir, config, manifest_spacing)?;
    let slices = list_slices(dir, &config.slice_extensions)?;
    debug!(
        target: "autorecon-segmentation",
        "Decoding {} slices from {}",
        slices.len(),
        dir.display()
    );

    let planes = slices
        .par_iter()
        .map(|path| decode_slice(path))
        .collect::<ReconResult<Vec<_>>>()?;

    let first = planes[0].dim();
    if let Some((index, plane)) = planes.iter().enumerate().find(|(_, p)| p.dim() != first) {
        return Err(ReconError::MalformedInput(format!(
            "slice {} is {}x{} but the stack starts with {}x{}",
            slices[index].display(),
            plane.dim().1,
            plane.dim().0,
            first.1,
            first.0
        )));
    }

    let views: Vec<_> = planes.iter().map(|p| p.view()).collect();
    let raw: Array3<f32> = ndarray::stack(Axis(0), &views)
        .map_err(|e| ReconError::Internal(format!("stacking slices: {}", e)))?;

    let volume = Volume::normalized(raw, spacing, config.invert_intensity)?;
    info!(
        target: "autorecon-segmentation",
        "Loaded volume {:?} from {} ({:?} um voxels)",
        volume.shape(),
        dir.display(),
        spacing.as_zyx()
    );
    Ok(volume)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_list_slices_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        for name in ["z002.png", "z000.PNG", "z001.tif", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let exts = VolumeConfig::default().slice_extensions;
        let slices = list_slices(dir.path(), &exts).unwrap();
        let names: Vec<_> = slices
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["z000.PNG", "z001.tif", "z002.png"]);
    }

    #[test]
    fn test_missing_directory_is_malformed() {
        let err = list_slices(Path::new("/no/such/stack"), &["png".to_string()]).unwrap_err();
        assert!(matches!(err, ReconError::MalformedInput(_)));
    }

    #[test]
    fn test_spacing_precedence() {
        let dir = tempdir().unwrap();
        let config = VolumeConfig::default();
        let manifest = VoxelSpacing::new(3.0, 0.25, 0.25).unwrap();

        let fallback = resolve_spacing(dir.path(), &config, None).unwrap();
        assert_eq!(fallback.as_zyx(), config.default_voxel_size_um);

        assert_eq!(resolve_spacing(dir.path(), &config, Some(manifest)).unwrap(), manifest);

        std::fs::write(
            dir.path().join(&config.voxel_size_file),
            r#"{"z": 2.0, "y": 0.3, "x": 0.3}"#,
        )
        .unwrap();
        let sidecar = resolve_spacing(dir.path(), &config, Some(manifest)).unwrap();
        assert_eq!(sidecar.as_zyx(), [2.0, 0.3, 0.3]);
    }

    #[test]
    fn test_bad_sidecar_rejected() {
        let dir = tempdir().unwrap();
        let config = VolumeConfig::default();
        std::fs::write(
            dir.path().join(&config.voxel_size_file),
            r#"{"z": 0.0, "y": 0.3, "x": 0.3}"#,
        )
        .unwrap();
        assert!(matches!(
            resolve_spacing(dir.path(), &config, None),
            Err(ReconError::MalformedInput(_))
        ));
    }
}
