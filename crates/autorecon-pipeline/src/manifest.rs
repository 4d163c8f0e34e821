// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Batch manifests.
//!
//! ```toml
//! [[specimens]]
//! id = "mouse_017"
//! input = "stacks/mouse_017"      # relative to the manifest file
//! voxel_size_um = [2.0, 0.5, 0.5] # optional, [z, y, x]
//! ```

use autorecon_structures::{ReconError, ReconResult, VoxelSpacing};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// One specimen to reconstruct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecimenSpec {
    pub id: String,
    pub input: PathBuf,
    #[serde(default)]
    pub voxel_size_um: Option<[f64; 3]>,
}

impl SpecimenSpec {
    pub fn new(id: impl Into<String>, input: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            voxel_size_um: None,
        }
    }

    pub fn with_voxel_size(mut self, zyx: [f64; 3]) -> Self {
        self.voxel_size_um = Some(zyx);
        self
    }

    /// Manifest voxel size, validated
    pub fn spacing(&self) -> ReconResult<Option<VoxelSpacing>> {
        self.voxel_size_um.map(VoxelSpacing::from_zyx).transpose()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchManifest {
    #[serde(default)]
    pub specimens: Vec<SpecimenSpec>,
}

/// An id names the specimen's checkpoint directory and output file, so it
/// must be a single, non-empty path component
pub fn validate_specimen_id(id: &str) -> ReconResult<()> {
    let usable = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\'])
        && !id.chars().any(char::is_control);
    if usable {
        Ok(())
    } else {
        Err(ReconError::MalformedInput(format!(
            "specimen id '{}' cannot be used as a directory name",
            id.escape_debug()
        )))
    }
}

impl BatchManifest {
    /// Ids must be non-empty, unique and usable as a directory name
    pub fn validate(&self) -> ReconResult<()> {
        let mut seen = BTreeSet::new();
        for specimen in &self.specimens {
            let id = specimen.id.as_str();
            validate_specimen_id(id)?;
            if !seen.insert(id) {
                return Err(ReconError::MalformedInput(format!(
                    "specimen id '{}' listed twice",
                    id
                )));
            }
            specimen.spacing()?;
        }
        Ok(())
    }
}

/// Parse a TOML manifest. Relative inputs are resolved against `base_dir`.
pub fn parse_manifest(text: &str, base_dir: &Path) -> ReconResult<BatchManifest> {
    let mut manifest: BatchManifest = toml::from_str(text)
        .map_err(|e| ReconError::MalformedInput(format!("batch manifest: {}", e)))?;
    for specimen in &mut manifest.specimens {
        if specimen.input.is_relative() {
            specimen.input = base_dir.join(&specimen.input);
        }
    }
    manifest.validate()?;
    Ok(manifest)
}

pub fn load_manifest(path: &Path) -> ReconResult<BatchManifest> {
    let text = fs::read_to_string(path)
        .map_err(|e| ReconError::from_io(format!("reading manifest {}", path.display()), e))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let manifest = parse_manifest(&text, base_dir)?;
    info!(
        target: "autorecon-pipeline",
        "[MANIFEST] {} specimens from {}",
        manifest.specimens.len(),
        path.display()
    );
    Ok(manifest)
}

/// One specimen per sub-directory of `root`, sorted by name
pub fn discover_specimens(root: &Path) -> ReconResult<BatchManifest> {
    let entries = fs::read_dir(root)
        .map_err(|e| ReconError::from_io(format!("listing {}", root.display()), e))?;
    let mut specimens = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ReconError::from_io(format!("listing {}", root.display()), e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with('.') {
                continue;
            }
            specimens.push(SpecimenSpec::new(name, path.clone()));
        }
    }
    specimens.sort_by(|a, b| a.id.cmp(&b.id));
    let manifest = BatchManifest { specimens };
    manifest.validate()?;
    info!(
        target: "autorecon-pipeline",
        "[MANIFEST] discovered {} specimens under {}",
        manifest.specimens.len(),
        root.display()
    );
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_resolves_relative_inputs() {
        let text = r#"
            [[specimens]]
            id = "a"
            input = "stacks/a"
            voxel_size_um = [2.0, 0.5, 0.5]

            [[specimens]]
            id = "b"
            input = "/abs/b"
        "#;
        let manifest = parse_manifest(text, Path::new("/batch")).unwrap();
        assert_eq!(manifest.specimens.len(), 2);
        assert_eq!(manifest.specimens[0].input, PathBuf::from("/batch/stacks/a"));
        assert_eq!(manifest.specimens[1].input, PathBuf::from("/abs/b"));
        let spacing = manifest.specimens[0].spacing().unwrap().unwrap();
        assert_eq!(spacing.as_zyx(), [2.0, 0.5, 0.5]);
        assert!(manifest.specimens[1].spacing().unwrap().is_none());
    }

    #[test]
    fn test_bad_manifests_rejected() {
        let duplicate = "[[specimens]]\nid = \"a\"\ninput = \"x\"\n[[specimens]]\nid = \"a\"\ninput = \"y\"\n";
        let slash = "[[specimens]]\nid = \"a/b\"\ninput = \"x\"\n";
        let spacing = "[[specimens]]\nid = \"a\"\ninput = \"x\"\nvoxel_size_um = [0.0, 1.0, 1.0]\n";
        let syntax = "[[specimens]\n";
        for text in [duplicate, slash, spacing, syntax] {
            let err = parse_manifest(text, Path::new(".")).unwrap_err();
            assert!(matches!(err, ReconError::MalformedInput(_)), "{}", text);
        }
    }

    #[test]
    fn test_specimen_id_must_be_one_path_component() {
        for id in ["mouse_017", "a.b", "...", "x y"] {
            assert!(validate_specimen_id(id).is_ok(), "{}", id);
        }
        for id in ["", ".", "..", "a/b", "../up", "a\\b", "tab\tid"] {
            let err = validate_specimen_id(id).unwrap_err();
            assert!(matches!(err, ReconError::MalformedInput(_)), "{:?}", id);
        }
    }

    #[test]
    fn test_discover_sorted_subdirectories() {
        let dir = tempdir().unwrap();
        for name in ["zeta", "alpha", ".hidden"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let manifest = discover_specimens(dir.path()).unwrap();
        let ids: Vec<&str> = manifest.specimens.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }
}
