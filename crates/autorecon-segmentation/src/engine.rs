// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Tiled segmentation inference.

Tiles are handed to a fixed set of worker threads over a crossbeam channel;
results come back on a second channel and are merged by the [`Stitcher`] on
the calling thread. The label volume is produced only after every tile has
reported. Waiting for a result is bounded by the tile timeout; on expiry,
error or cancellation the workers are told to stop and the partial
accumulation is dropped.
*/

use crate::classifier::{Classifier, ClassifierError};
use crate::stitching::Stitcher;
use crate::tiling::TileGrid;
use autorecon_config::InferenceConfig;
use autorecon_structures::{LabelVolume, ReconError, ReconResult, Volume};
use crossbeam::channel::{self, RecvTimeoutError};
use ndarray::Array4;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the collector wakes up to look at the cancellation flag
const CANCEL_POLL: Duration = Duration::from_millis(50);

type TileOutcome = (usize, Result<Array4<f32>, ClassifierError>);

/// Runs a [`Classifier`] over a whole volume, tile by tile
pub struct SegmentationEngine {
    config: InferenceConfig,
    classifier: Arc<dyn Classifier>,
}

impl SegmentationEngine {
    /// # Errors
    /// `MalformedInput` if the margin is smaller than the classifier's context
    /// radius or the tile does not exceed twice the margin.
    pub fn new(config: InferenceConfig, classifier: Arc<dyn Classifier>) -> ReconResult<Self> {
        let radius = classifier.context_radius();
        for axis in 0..3 {
            if config.margin[axis] < radius[axis] {
                return Err(ReconError::MalformedInput(format!(
                    "tile margin {:?} is smaller than the context radius {:?} of classifier '{}'",
                    config.margin,
                    radius,
                    classifier.name()
                )));
            }
            if config.tile_shape[axis] <= 2 * config.margin[axis] {
                return Err(ReconError::MalformedInput(format!(
                    "tile shape {:?} must exceed twice the margin {:?}",
                    config.tile_shape, config.margin
                )));
            }
        }
        if config.max_concurrent_tiles == 0 {
            return Err(ReconError::MalformedInput(
                "max_concurrent_tiles must be at least 1".to_string(),
            ));
        }
        Ok(Self { config, classifier })
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Segment `volume` into a label volume of the same extent.
    ///
    /// On classifier resource exhaustion the core is halved and the whole
    /// volume is retried once.
    pub fn segment(&self, volume: &Volume, cancel: &Arc<AtomicBool>) -> ReconResult<LabelVolume> {
        let grid = TileGrid::plan(volume.shape(), self.config.tile_shape, self.config.margin)?;
        info!(
            target: "autorecon-segmentation",
            "Segmenting volume {:?} with {} tiles of {:?} (core {:?}, {:?} stitching)",
            volume.shape(),
            grid.len(),
            grid.tile_shape,
            grid.core_shape,
            self.config.stitch_policy
        );

        match self.run_grid(volume, &grid, cancel) {
            Err(ReconError::ResourceExhausted(reason)) => {
                let smaller = grid.halved()?;
                warn!(
                    target: "autorecon-segmentation",
                    "Classifier exhausted resources ({}); retrying with core {:?}",
                    reason,
                    smaller.core_shape
                );
                self.run_grid(volume, &smaller, cancel)
            }
            other => other,
        }
    }

    fn run_grid(
        &self,
        volume: &Volume,
        grid: &TileGrid,
        cancel: &Arc<AtomicBool>,
    ) -> ReconResult<LabelVolume> {
        let started = Instant::now();
        let tiles = Arc::new(grid.tiles.clone());
        let data = volume.shared_data();
        let stop = Arc::new(AtomicBool::new(false));

        let (job_tx, job_rx) = channel::unbounded::<usize>();
        for index in 0..tiles.len() {
            // receiver is alive, send on an unbounded channel cannot fail
            let _ = job_tx.send(index);
        }
        drop(job_tx);

        let workers = self.config.max_concurrent_tiles.min(tiles.len()).max(1);
        let (result_tx, result_rx) = channel::bounded::<TileOutcome>(workers * 2);

        for worker in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let tiles = Arc::clone(&tiles);
            let data = Arc::clone(&data);
            let classifier = Arc::clone(&self.classifier);
            let worker_stop = Arc::clone(&stop);
            let worker_cancel = Arc::clone(cancel);

            std::thread::Builder::new()
                .name(format!("autorecon-tile-{}", worker))
                .spawn(move || {
                    while let Ok(index) = job_rx.recv() {
                        if worker_stop.load(Ordering::Relaxed) || worker_cancel.load(Ordering::Relaxed) {
                            break;
                        }
                        let input = tiles[index].extract(data.view());
                        let outcome = catch_unwind(AssertUnwindSafe(|| classifier.predict(input.view())))
                            .unwrap_or_else(|_| {
                                Err(ClassifierError::Failed("classifier panicked".to_string()))
                            });
                        if result_tx.send((index, outcome)).is_err() {
                            break;
                        }
                    }
                })
                .map_err(|e| {
                    stop.store(true, Ordering::Relaxed);
                    ReconError::Internal(format!("failed to spawn tile worker: {}", e))
                })?;
        }
        drop(result_tx);

        let mut stitcher = Stitcher::new(self.config.stitch_policy, grid.volume_shape);
        let timeout = Duration::from_millis(self.config.tile_timeout_ms);
        let outcome = self.collect(&result_rx, grid, &mut stitcher, timeout, cancel);
        stop.store(true, Ordering::Relaxed);
        outcome?;

        let labels = stitcher.finish(volume.spacing())?;
        debug!(
            target: "autorecon-segmentation",
            "Stitched {} tiles in {:?}",
            grid.len(),
            started.elapsed()
        );
        Ok(labels)
    }

    fn collect(
        &self,
        results: &channel::Receiver<TileOutcome>,
        grid: &TileGrid,
        stitcher: &mut Stitcher,
        timeout: Duration,
        cancel: &AtomicBool,
    ) -> ReconResult<()> {
        let mut remaining = grid.len();
        let mut deadline = Instant::now() + timeout;

        while remaining > 0 {
            if cancel.load(Ordering::Relaxed) {
                return Err(ReconError::Cancelled(
                    "segmentation interrupted".to_string(),
                ));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ReconError::Timeout {
                    operation: format!("waiting for tile results ({} outstanding)", remaining),
                    after_ms: self.config.tile_timeout_ms,
                });
            }

            match results.recv_timeout(CANCEL_POLL.min(deadline - now)) {
                Ok((index, Ok(probabilities))) => {
                    let tile = &grid.tiles[index];
                    Stitcher::check_prediction(tile, probabilities.view())?;
                    stitcher.add(tile, probabilities.view());
                    remaining -= 1;
                    deadline = Instant::now() + timeout;
                }
                Ok((index, Err(ClassifierError::ResourceExhausted(reason)))) => {
                    return Err(ReconError::ResourceExhausted(format!(
                        "tile {}: {}",
                        index, reason
                    )));
                }
                Ok((index, Err(ClassifierError::Failed(reason)))) => {
                    return Err(ReconError::MalformedInput(format!(
                        "classifier failed on tile {}: {}",
                        index, reason
                    )));
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ReconError::Internal(format!(
                        "tile workers stopped with {} tiles outstanding",
                        remaining
                    )));
                }
            }
        }
        Ok(())
    }
}
