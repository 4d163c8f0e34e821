// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Batch orchestration.

Every specimen walks `Load -> Segment -> BuildGraph -> Relabel -> Write`
on its own worker of a bounded pool. After each stage the run record and
the stage artifact are checkpointed, so a later batch resumes from the
last completed stage. A failure, including a panic, is confined to the
specimen it happened in.
*/

use crate::checkpoint::CheckpointStore;
use crate::context::{Outcome, RunContext};
use crate::manifest::SpecimenSpec;
use crate::report::{BatchReport, SpecimenReport};
use crate::retry::{retry_with_backoff, BackoffPolicy};
use crate::run::PipelineRun;
use crate::state::{RunState, Stage};
use crate::timeout::{run_with_timeout, write_with_timeout};
use autorecon_config::AutoreconConfig;
use autorecon_segmentation::{load_volume, Classifier, IntensityBandClassifier, SegmentationEngine};
use autorecon_skeleton::{quantized, stage_swc, GraphBuilder, MorphometrySummary, Relabeler};
use autorecon_structures::{FailureKind, LabelVolume, ReconError, ReconResult, SkeletonGraph, Volume};
use chrono::Utc;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Stage outputs still in memory, so consecutive stages skip the reload
#[derive(Default)]
struct StageData {
    volume: Option<Volume>,
    labels: Option<LabelVolume>,
    graph: Option<SkeletonGraph>,
}

/// Runs batches of specimens through the reconstruction stages
pub struct Pipeline {
    context: RunContext,
    classifier: Arc<dyn Classifier>,
}

impl Pipeline {
    /// Pipeline using the built-in intensity band classifier
    pub fn new(config: AutoreconConfig) -> Self {
        let classifier = Arc::new(IntensityBandClassifier::new(config.inference.band.clone()));
        Self::with_classifier(config, classifier)
    }

    pub fn with_classifier(config: AutoreconConfig, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            context: RunContext::new(config),
            classifier,
        }
    }

    /// Shared context; `context().cancel()` stops the batch at the next
    /// stage boundary
    pub fn context(&self) -> &RunContext {
        &self.context
    }

    fn config(&self) -> &AutoreconConfig {
        self.context.config()
    }

    /// Reconstruct every specimen and write `batch_report.json` into the
    /// output directory. Reports come back in manifest order.
    pub fn run_batch(&self, specimens: &[SpecimenSpec]) -> ReconResult<BatchReport> {
        let started_at = Utc::now();
        let workers = self.config().system.resolved_parallelism();
        self.context.begin_batch(specimens.len());
        info!(
            target: "autorecon-pipeline",
            "[BATCH] starting {} specimens on {} workers",
            specimens.len(),
            workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("autorecon-specimen-{}", i))
            .build()
            .map_err(|e| ReconError::Internal(format!("building specimen pool: {}", e)))?;

        let reports: Vec<SpecimenReport> = pool.install(|| {
            specimens
                .par_iter()
                .map(|spec| self.run_specimen(spec))
                .collect()
        });

        let report = BatchReport::new(started_at, reports);
        let path = report.write(&self.config().system.output_dir)?;
        report.log_summary();
        info!(target: "autorecon-pipeline", "[BATCH] report written to {}", path.display());
        Ok(report)
    }

    /// Reconstruct one specimen. Never fails: whatever goes wrong ends up
    /// in the returned report.
    pub fn run_specimen(&self, spec: &SpecimenSpec) -> SpecimenReport {
        self.context.specimen_started();
        let mut reached = Stage::Load;
        let report = match catch_unwind(AssertUnwindSafe(|| self.drive(spec, &mut reached))) {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                error!(target: "autorecon-pipeline", "[{}] {} at {}", spec.id, e, reached);
                SpecimenReport::crashed(&spec.id, reached, &e)
            }
            Err(payload) => {
                let e = ReconError::Internal(format!("worker panicked: {}", panic_message(payload.as_ref())));
                error!(target: "autorecon-pipeline", "[{}] {} at {}", spec.id, e, reached);
                SpecimenReport::crashed(&spec.id, reached, &e)
            }
        };

        let outcome = if report.cancelled {
            Outcome::Cancelled
        } else if report.is_failed() {
            Outcome::Failed
        } else {
            Outcome::Done
        };
        let progress = self.context.specimen_finished(outcome);
        info!(
            target: "autorecon-pipeline",
            "[BATCH] {}/{} specimens finished ({} failed)",
            progress.finished(),
            progress.total,
            progress.failed
        );
        report
    }

    /// `reached` follows the stage in flight so a crash is reported where it
    /// happened
    fn drive(&self, spec: &SpecimenSpec, reached: &mut Stage) -> ReconResult<SpecimenReport> {
        let started = Instant::now();
        let config = self.config();
        let store = CheckpointStore::new(&config.system.work_dir, &spec.id)?;
        let mut run = self.resume_or_start(spec, &store)?;
        *reached = stage_reached(&run.state);
        run.attempts += 1;
        self.persist(&store, &run)?;

        if let RunState::Failed { stage, kind, reason } = &run.state {
            if *kind == FailureKind::TransientIo || config.checkpoint.retry_failed {
                info!(
                    target: "autorecon-pipeline",
                    "[{}] retrying after earlier {} failure: {}",
                    spec.id,
                    stage,
                    reason
                );
                run.rewind_failure();
            } else {
                info!(
                    target: "autorecon-pipeline",
                    "[{}] keeping earlier {} failure ({:?}); set checkpoint.retry_failed to re-run",
                    spec.id,
                    stage,
                    kind
                );
                return Ok(SpecimenReport::from_run(&run, Vec::new(), false, elapsed_ms(started)));
            }
        }
        if run.state == RunState::Done {
            debug!(target: "autorecon-pipeline", "[{}] already done", spec.id);
            return Ok(SpecimenReport::from_run(&run, Vec::new(), false, elapsed_ms(started)));
        }

        let mut data = StageData::default();
        let mut stages_run = Vec::new();
        let mut cancelled = false;

        while let Some(stage) = run.state.next_stage() {
            *reached = stage;
            if self.context.is_cancelled() {
                cancelled = true;
                break;
            }
            let stage_started = Instant::now();
            debug!(target: "autorecon-pipeline", "[{}] {} started", spec.id, stage);
            let result = catch_unwind(AssertUnwindSafe(|| {
                self.execute(stage, spec, &store, &mut run, &mut data)
            }))
            .unwrap_or_else(|payload| {
                Err(ReconError::Internal(format!(
                    "{} stage panicked: {}",
                    stage,
                    panic_message(payload.as_ref())
                )))
            });
            stages_run.push(stage);

            match result {
                Ok(artifact) => {
                    let millis = elapsed_ms(stage_started);
                    run.complete(stage, millis, artifact)?;
                    info!(
                        target: "autorecon-pipeline",
                        "[{}] {} done in {} ms",
                        spec.id,
                        stage,
                        millis
                    );
                    if let Err(e) = self.persist(&store, &run) {
                        run.fail(stage, &e)?;
                        break;
                    }
                }
                Err(ReconError::Cancelled(reason)) => {
                    info!(
                        target: "autorecon-pipeline",
                        "[{}] {} interrupted: {}",
                        spec.id,
                        stage,
                        reason
                    );
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    if e.kind().needs_manual_review() {
                        warn!(target: "autorecon-pipeline", "[{}] {} needs review: {}", spec.id, stage, e);
                    } else {
                        error!(target: "autorecon-pipeline", "[{}] {} failed: {}", spec.id, stage, e);
                    }
                    run.fail(stage, &e)?;
                    if let Err(persist_err) = self.persist(&store, &run) {
                        error!(
                            target: "autorecon-pipeline",
                            "[{}] could not record failure: {}",
                            spec.id,
                            persist_err
                        );
                    }
                    break;
                }
            }
        }

        if run.state == RunState::Written {
            if !config.checkpoint.keep_intermediate_artifacts {
                store.remove_artifacts();
                run.artifacts.clear();
            }
            run.finish()?;
            self.persist(&store, &run)?;
            info!(
                target: "autorecon-pipeline",
                "[{}] reconstruction complete in {} ms",
                spec.id,
                elapsed_ms(started)
            );
        }

        Ok(SpecimenReport::from_run(&run, stages_run, cancelled, elapsed_ms(started)))
    }

    /// Load the checkpointed run when it still describes this specimen
    fn resume_or_start(&self, spec: &SpecimenSpec, store: &CheckpointStore) -> ReconResult<PipelineRun> {
        let fresh = || PipelineRun::new(spec.id.clone(), spec.input.clone(), spec.voxel_size_um);
        if !self.config().checkpoint.resume {
            store.clear()?;
            return Ok(fresh());
        }

        let previous = match store.load_run() {
            Ok(previous) => previous,
            Err(e) => {
                warn!(
                    target: "autorecon-pipeline",
                    "[{}] unreadable checkpoint, starting over: {}",
                    spec.id,
                    e
                );
                None
            }
        };
        let Some(run) = previous else {
            store.clear()?;
            return Ok(fresh());
        };

        if run.input != spec.input || run.voxel_size_um != spec.voxel_size_um {
            warn!(
                target: "autorecon-pipeline",
                "[{}] input changed since the last checkpoint, starting over",
                spec.id
            );
            store.clear()?;
            return Ok(fresh());
        }
        if !checkpoint_intact(&run, store) {
            warn!(
                target: "autorecon-pipeline",
                "[{}] checkpoint artifact missing, starting over",
                spec.id
            );
            store.clear()?;
            return Ok(fresh());
        }

        if run.state != RunState::Pending {
            info!(
                target: "autorecon-pipeline",
                "[{}] resuming from {}",
                spec.id,
                run.state
            );
        }
        Ok(run)
    }

    fn execute(
        &self,
        stage: Stage,
        spec: &SpecimenSpec,
        store: &CheckpointStore,
        run: &mut PipelineRun,
        data: &mut StageData,
    ) -> ReconResult<Option<PathBuf>> {
        let config = self.config();
        match stage {
            Stage::Load => {
                let volume = self.load(spec)?;
                let path = self.save(store, stage, &volume)?;
                data.volume = Some(volume);
                Ok(Some(path))
            }
            Stage::Segment => {
                let volume = match data.volume.take() {
                    Some(volume) => volume,
                    None => self.reload(store, Stage::Load)?,
                };
                let engine = SegmentationEngine::new(config.inference.clone(), Arc::clone(&self.classifier))?;
                let labels = engine.segment(&volume, self.context.cancel_flag())?;
                let path = self.save(store, stage, &labels)?;
                data.labels = Some(labels);
                Ok(Some(path))
            }
            Stage::BuildGraph => {
                let labels = match data.labels.take() {
                    Some(labels) => labels,
                    None => self.reload(store, Stage::Segment)?,
                };
                let (graph, summary) = GraphBuilder::new(config.graph.clone()).build(&labels)?;
                let path = self.save(store, stage, &graph)?;
                run.build_summary = Some(summary);
                data.graph = Some(graph);
                Ok(Some(path))
            }
            Stage::Relabel => {
                let mut graph = match data.graph.take() {
                    Some(graph) => graph,
                    None => self.reload(store, Stage::BuildGraph)?,
                };
                let summary = Relabeler::new(config.relabel.clone()).relabel(&mut graph)?;
                let path = self.save(store, stage, &graph)?;
                run.relabel_summary = Some(summary);
                data.graph = Some(graph);
                Ok(Some(path))
            }
            Stage::Write => {
                let graph = match data.graph.take() {
                    Some(graph) => graph,
                    None => self.reload(store, Stage::Relabel)?,
                };
                let mut graph = quantized(&graph)?;
                graph.freeze()?;
                let path = config.system.output_dir.join(format!("{}.swc", spec.id));
                let header = vec![
                    format!("autorecon {}", crate::VERSION),
                    format!("specimen: {}", spec.id),
                    format!("source: {}", spec.input.display()),
                ];
                self.with_io_retry(&format!("write {}", spec.id), || {
                    let (path, graph, header) = (path.clone(), graph.clone(), header.clone());
                    write_with_timeout("write", self.io_timeout(), move || stage_swc(&path, &graph, &header))
                })?;
                info!(
                    target: "autorecon-pipeline",
                    "[{}] wrote {} nodes to {}",
                    spec.id,
                    graph.len(),
                    path.display()
                );
                run.morphometry = Some(MorphometrySummary::of(&graph));
                run.output = Some(path);
                Ok(None)
            }
        }
    }

    fn load(&self, spec: &SpecimenSpec) -> ReconResult<Volume> {
        let spacing = spec.spacing()?;
        self.with_io_retry(&format!("load {}", spec.id), || {
            let input = spec.input.clone();
            let volume_config = self.config().volume.clone();
            run_with_timeout("load", self.io_timeout(), move || {
                load_volume(&input, &volume_config, spacing)
            })
        })
    }

    fn save<T: Serialize>(&self, store: &CheckpointStore, stage: Stage, value: &T) -> ReconResult<PathBuf> {
        self.with_io_retry(&format!("checkpoint {}", stage), || store.save_artifact(stage, value))
    }

    fn reload<T: DeserializeOwned>(&self, store: &CheckpointStore, stage: Stage) -> ReconResult<T> {
        debug!(target: "autorecon-pipeline", "reloading {} artifact from {}", stage, store.dir().display());
        self.with_io_retry(&format!("reload {}", stage), || store.load_artifact(stage))
    }

    fn persist(&self, store: &CheckpointStore, run: &PipelineRun) -> ReconResult<()> {
        self.with_io_retry("save run record", || store.save_run(run))
    }

    fn with_io_retry<T>(&self, name: &str, operation: impl FnMut() -> ReconResult<T>) -> ReconResult<T> {
        let mut policy = BackoffPolicy::new(&self.config().retry);
        retry_with_backoff(operation, &mut policy, name, self.context.cancel_flag())
    }

    fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.config().timeouts.io_timeout_ms)
    }
}

/// Stage a run in `state` is at or was last working on
fn stage_reached(state: &RunState) -> Stage {
    match state {
        RunState::Failed { stage, .. } => *stage,
        state => state.next_stage().unwrap_or(Stage::Write),
    }
}

/// The artifact the next stage starts from is still on disk
fn checkpoint_intact(run: &PipelineRun, store: &CheckpointStore) -> bool {
    let resume_state = match &run.state {
        RunState::Failed { stage, .. } => stage.starting_state(),
        state => state.clone(),
    };
    if resume_state == RunState::Written || resume_state.is_terminal() {
        return true;
    }
    match resume_state.last_completed().and_then(|stage| store.artifact_path(stage)) {
        Some(path) => path.is_file(),
        None => true,
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_stage_reached_follows_run_state() {
        assert_eq!(stage_reached(&RunState::Pending), Stage::Load);
        assert_eq!(stage_reached(&RunState::Segmented), Stage::BuildGraph);
        assert_eq!(stage_reached(&RunState::Relabeled), Stage::Write);
        assert_eq!(stage_reached(&RunState::Written), Stage::Write);
        assert_eq!(stage_reached(&RunState::Done), Stage::Write);
        let failed = RunState::Failed {
            stage: Stage::Relabel,
            kind: FailureKind::TopologyViolation,
            reason: "cycle".into(),
        };
        assert_eq!(stage_reached(&failed), Stage::Relabel);
    }

    #[test]
    fn test_missing_artifact_breaks_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "s1").unwrap();
        let mut run = PipelineRun::new("s1", PathBuf::from("in"), None);
        assert!(checkpoint_intact(&run, &store));

        run.complete(Stage::Load, 1, store.artifact_path(Stage::Load)).unwrap();
        assert!(!checkpoint_intact(&run, &store));

        store.save_artifact(Stage::Load, &vec![1_u8, 2, 3]).unwrap();
        assert!(checkpoint_intact(&run, &store));

        run.fail(Stage::Segment, &ReconError::ResourceExhausted("tile".into()))
            .unwrap();
        assert!(checkpoint_intact(&run, &store));
    }
}
