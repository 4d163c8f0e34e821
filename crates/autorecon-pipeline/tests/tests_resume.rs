// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

mod common;

use autorecon_pipeline::{CheckpointStore, Pipeline, RunState, SpecimenSpec, Stage};
use autorecon_segmentation::IntensityBandClassifier;
use autorecon_structures::FailureKind;
use common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_resume_skips_completed_stages() {
    let root = tempdir().unwrap();
    let specimens = vec![write_specimen(root.path(), "s1", &neuron_stack())];
    let config = test_config(root.path());
    let store = CheckpointStore::new(&config.system.work_dir, "s1").unwrap();

    let exhausted = Arc::new(ExhaustedClassifier::default());
    let first = Pipeline::with_classifier(config.clone(), exhausted.clone())
        .run_batch(&specimens)
        .unwrap();
    let report = first.specimen("s1").unwrap();
    assert_eq!(report.failed_stage, Some(Stage::Segment));
    assert_eq!(report.failure_kind, Some(FailureKind::ResourceExhaustion));
    assert!(!report.needs_review);
    assert!(exhausted.calls.load(Ordering::SeqCst) > 0);
    assert!(store.artifact_path(Stage::Load).unwrap().is_file());

    // terminal failure stays put until retry_failed is set
    let good = Arc::new(IntensityBandClassifier::default());
    let second = Pipeline::with_classifier(config.clone(), good.clone())
        .run_batch(&specimens)
        .unwrap();
    assert!(second.specimen("s1").unwrap().stages_run.is_empty());
    assert_eq!(second.failed, 1);

    let mut retry_config = config;
    retry_config.checkpoint.retry_failed = true;
    let third = Pipeline::with_classifier(retry_config, good)
        .run_batch(&specimens)
        .unwrap();
    let report = third.specimen("s1").unwrap();
    assert!(report.is_done());
    assert_eq!(
        report.stages_run,
        vec![Stage::Segment, Stage::BuildGraph, Stage::Relabel, Stage::Write]
    );

    let run = store.load_run().unwrap().unwrap();
    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.attempts, 3);
    assert_eq!(run.times_completed(Stage::Load), 1);
    assert_eq!(run.times_completed(Stage::Segment), 1);
}

#[test]
fn test_changed_input_starts_over() {
    let root = tempdir().unwrap();
    let config = test_config(root.path());
    let pipeline = Pipeline::new(config);

    let original = write_specimen(root.path(), "s1", &neuron_stack());
    pipeline.run_batch(&[original]).unwrap();

    let moved_dir = root.path().join("moved");
    let moved = write_specimen(&moved_dir, "copy", &neuron_stack());
    let relocated = SpecimenSpec::new("s1", moved.input.clone()).with_voxel_size([1.0, 1.0, 1.0]);
    let report = pipeline.run_batch(&[relocated]).unwrap();
    let s1 = report.specimen("s1").unwrap();
    assert!(s1.is_done());
    assert_eq!(s1.stages_run, Stage::ALL.to_vec());
}

#[test]
fn test_missing_artifact_restarts_specimen() {
    let root = tempdir().unwrap();
    let specimens = vec![write_specimen(root.path(), "s1", &neuron_stack())];
    let mut config = test_config(root.path());
    let store = CheckpointStore::new(&config.system.work_dir, "s1").unwrap();

    Pipeline::with_classifier(config.clone(), Arc::new(ExhaustedClassifier::default()))
        .run_batch(&specimens)
        .unwrap();
    std::fs::remove_file(store.artifact_path(Stage::Load).unwrap()).unwrap();

    config.checkpoint.retry_failed = true;
    let report = Pipeline::new(config).run_batch(&specimens).unwrap();
    let s1 = report.specimen("s1").unwrap();
    assert!(s1.is_done());
    assert_eq!(s1.stages_run, Stage::ALL.to_vec());
}

#[test]
fn test_classifier_panic_fails_only_its_stage() {
    let root = tempdir().unwrap();
    let specimens = vec![write_specimen(root.path(), "s1", &neuron_stack())];
    let config = test_config(root.path());
    let output_dir = config.system.output_dir.clone();

    let report = Pipeline::with_classifier(config, Arc::new(PanickingClassifier))
        .run_batch(&specimens)
        .unwrap();
    let s1 = report.specimen("s1").unwrap();
    assert_eq!(s1.failed_stage, Some(Stage::Segment));
    assert!(s1.reason.as_deref().unwrap().contains("panicked"));
    assert_eq!(s1.stages_run, vec![Stage::Load, Stage::Segment]);
    assert!(!output_dir.join("s1.swc").exists());
}
