//! Batch alignment: one reference, many candidates, a fixed worker pool.
//!
//! Reference features are computed once and borrowed by every candidate
//! pipeline (decode, detect, match, estimate). Workers report
//! `(slot, outcome)` over a channel and results are placed by slot, so
//! output order never depends on scheduling. Cancellation is cooperative
//! and checked between stages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use align_stack_core::Frame;
use align_stack_features::{DescriptorMatcher, FeatureDetector, Features, MatchStrategy};
use log::{debug, info, warn};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[cfg(feature = "image")]
use crate::ImageFileDecoder;
use crate::{
    AlignError, AlignParams, AlignmentResult, AlignmentStatus, BatchResult, BatchState,
    CombineRule, EngineConfig, Estimate, FeatureCache, FrameDecoder, FrameSource,
    HomographyEstimator, ImageWarper, SkipReason, StackMerger, StackResult, WarpedFrame,
};

pub struct AlignmentOrchestrator {
    config: EngineConfig,
    detector: FeatureDetector,
    matcher: DescriptorMatcher,
    estimator: HomographyEstimator,
    decoder: Arc<dyn FrameDecoder>,
    pool: rayon::ThreadPool,
    cache: FeatureCache,
    run_lock: Mutex<()>,
    active: Mutex<Option<Arc<AtomicBool>>>,
    state: Mutex<BatchState>,
}

/// Per-candidate context shared by all workers of one invocation.
struct Batch<'a> {
    reference: &'a Features,
    strategy: MatchStrategy,
    params: &'a AlignParams,
    cancel: &'a AtomicBool,
}

impl Batch<'_> {
    fn checkpoint(&self) -> Result<(), AlignError> {
        if self.cancel.load(Ordering::Acquire) {
            Err(AlignError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// What a candidate pipeline produced before it stopped.
#[derive(Default)]
struct Progress {
    frame: Option<Arc<Frame>>,
    match_count: usize,
}

impl AlignmentOrchestrator {
    /// Orchestrator decoding paths with [`ImageFileDecoder`].
    #[cfg(feature = "image")]
    pub fn new(config: EngineConfig) -> Result<Self, AlignError> {
        Self::with_decoder(config, Arc::new(ImageFileDecoder))
    }

    pub fn with_decoder(
        config: EngineConfig,
        decoder: Arc<dyn FrameDecoder>,
    ) -> Result<Self, AlignError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers.unwrap_or(0))
            .thread_name(|i| format!("align-worker-{i}"))
            .build()
            .map_err(|e| AlignError::ThreadPool(e.to_string()))?;
        debug!("worker pool with {} threads", pool.current_num_threads());

        Ok(Self {
            detector: FeatureDetector::new(config.detector.clone()),
            matcher: DescriptorMatcher::new(config.matcher.clone()),
            estimator: HomographyEstimator::new(config.ransac.clone()),
            config,
            decoder,
            pool,
            cache: FeatureCache::new(),
            run_lock: Mutex::new(()),
            active: Mutex::new(None),
            state: Mutex::new(BatchState::Idle),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// State of the latest invocation.
    pub fn state(&self) -> BatchState {
        *self.state.lock()
    }

    /// Ask the running invocation, if any, to stop at its next checkpoint.
    pub fn cancel(&self) {
        if let Some(token) = self.active.lock().as_ref() {
            token.store(true, Ordering::Release);
        }
    }

    pub fn cached_features(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Align every source against `sources[params.reference_index]`.
    ///
    /// Candidate-local failures become skipped results. Invalid parameters
    /// and reference failures fail the whole batch. Starting a new call
    /// cancels the one in flight and waits for it to finish.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(sources = sources.len()))
    )]
    pub fn align(
        &self,
        sources: &[FrameSource],
        params: &AlignParams,
    ) -> Result<BatchResult, AlignError> {
        let token = Arc::new(AtomicBool::new(false));
        if let Some(previous) = self.active.lock().replace(Arc::clone(&token)) {
            previous.store(true, Ordering::Release);
        }

        let _running = self.run_lock.lock();
        let outcome = if token.load(Ordering::Acquire) {
            Err(AlignError::Cancelled)
        } else {
            *self.state.lock() = BatchState::Running;
            self.run(sources, params, &token)
        };

        *self.state.lock() = BatchState::after(&outcome);
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|t| Arc::ptr_eq(t, &token)) {
            *active = None;
        }
        outcome
    }

    fn run(
        &self,
        sources: &[FrameSource],
        params: &AlignParams,
        cancel: &AtomicBool,
    ) -> Result<BatchResult, AlignError> {
        params.validate(sources.len())?;
        let reference_index = params.reference_index;
        let reference_source = &sources[reference_index];

        let reference = reference_source.load(self.decoder.as_ref())?;
        let reference_features =
            self.features_for(reference_source, &reference, params.feature_sensitivity)?;
        if reference_features.is_empty() {
            return Err(AlignError::InsufficientFeatures);
        }

        let strategy = params
            .matcher_method
            .resolve(2 * reference_features.len(), self.config.matcher.crossover);
        info!(
            "aligning {} candidates against #{reference_index} {} ({} features, {strategy} matcher)",
            sources.len() - 1,
            reference.path().display(),
            reference_features.len()
        );

        let batch = Batch {
            reference: &reference_features,
            strategy,
            params,
            cancel,
        };
        let candidates: Vec<(usize, &FrameSource)> = sources
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != reference_index)
            .collect();

        let (tx, rx) = mpsc::channel();
        self.pool.scope(|scope| {
            for (slot, &(index, source)) in candidates.iter().enumerate() {
                let tx = tx.clone();
                let batch = &batch;
                scope.spawn(move |_| {
                    let outcome = self.process_candidate(index, source, batch);
                    // The receiver outlives the scope.
                    let _ = tx.send((slot, outcome));
                });
            }
        });
        drop(tx);

        let mut slots: Vec<Option<AlignmentResult>> = vec![None; candidates.len()];
        let mut failure = None;
        for (slot, outcome) in rx {
            match outcome {
                Ok(result) => slots[slot] = Some(result),
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }
        if cancel.load(Ordering::Acquire) {
            info!("alignment cancelled");
            return Err(AlignError::Cancelled);
        }
        if let Some(err) = failure {
            return Err(err);
        }

        let results = slots
            .into_iter()
            .enumerate()
            .map(|(slot, r)| {
                r.ok_or_else(|| AlignError::Internal(format!("candidate slot {slot} is empty")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let aligned = results.iter().filter(|r| r.is_aligned()).count();
        info!("{aligned} of {} candidates aligned", results.len());

        Ok(BatchResult {
            reference_index,
            reference_path: reference.path().to_path_buf(),
            reference_features: reference_features.len(),
            reference,
            results,
            method_used: strategy,
            min_matches: params.min_matches,
        })
    }

    fn process_candidate(
        &self,
        index: usize,
        source: &FrameSource,
        batch: &Batch<'_>,
    ) -> Result<AlignmentResult, AlignError> {
        let path = source.path().to_path_buf();
        let mut progress = Progress::default();

        let (status, inlier_count) = match self.align_candidate(index, source, batch, &mut progress)
        {
            Ok(estimate) => {
                debug!(
                    "#{index} {}: {} inliers of {} matches",
                    path.display(),
                    estimate.inlier_count(),
                    progress.match_count
                );
                let inliers = estimate.inlier_count();
                (
                    AlignmentStatus::Aligned {
                        homography: estimate.homography,
                    },
                    inliers,
                )
            }
            Err(err) => {
                let reason = SkipReason::from_error(&err).ok_or(err)?;
                warn!("skipping #{index} {}: {reason}", path.display());
                (AlignmentStatus::Skipped { reason }, 0)
            }
        };

        Ok(AlignmentResult {
            index,
            path,
            status,
            inlier_count,
            match_count: progress.match_count,
            frame: progress.frame,
        })
    }

    fn align_candidate(
        &self,
        index: usize,
        source: &FrameSource,
        batch: &Batch<'_>,
        progress: &mut Progress,
    ) -> Result<Estimate, AlignError> {
        let params = batch.params;

        batch.checkpoint()?;
        let frame = source.load(self.decoder.as_ref())?;
        progress.frame = Some(Arc::clone(&frame));

        batch.checkpoint()?;
        let features = self.features_for(source, &frame, params.feature_sensitivity)?;

        batch.checkpoint()?;
        let matches = self.matcher.match_descriptors(
            &batch.reference.descriptors,
            &features.descriptors,
            batch.strategy,
        );
        progress.match_count = matches.len();
        debug!(
            "#{index}: {} features, {} matches",
            features.len(),
            matches.len()
        );

        batch.checkpoint()?;
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed_for(index));
        self.estimator.estimate(
            &matches,
            &batch.reference.keypoints,
            &features.keypoints,
            params.min_matches,
            params.allow_rotation,
            &mut rng,
        )
    }

    /// Detect on the frame's luma, reusing cached features for path sources.
    fn features_for(
        &self,
        source: &FrameSource,
        frame: &Frame,
        sensitivity: f32,
    ) -> Result<Arc<Features>, AlignError> {
        let cacheable = self.config.cache_features && matches!(source, FrameSource::Path(_));
        if cacheable {
            if let Some(hit) = self.cache.get(frame.path(), sensitivity) {
                debug!("feature cache hit for {}", frame.path().display());
                return Ok(hit);
            }
        }

        let gray;
        let view = match frame.gray_view() {
            Some(view) => view,
            None => {
                gray = frame.to_gray();
                gray.view()
            }
        };
        let features = self.detector.detect(&view, sensitivity)?;

        Ok(if cacheable {
            self.cache.insert(frame.path(), sensitivity, features)
        } else {
            Arc::new(features)
        })
    }

    /// Warp every aligned candidate of `batch` into the reference grid and
    /// merge them with the reference.
    ///
    /// Candidates whose channel layout differs from the reference are
    /// converted first.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(rule = ?rule))
    )]
    pub fn stack(&self, batch: &BatchResult, rule: CombineRule) -> Result<StackResult, AlignError> {
        let reference = batch.reference.as_ref();
        let (width, height) = reference.dimensions();
        let channels = reference.channels();

        self.pool.install(|| {
            let layers = batch
                .aligned()
                .map(|r| {
                    let (Some(frame), Some(homography)) = (r.frame.as_ref(), r.homography()) else {
                        return Err(AlignError::Internal(format!(
                            "aligned frame #{} carries no pixels",
                            r.index
                        )));
                    };
                    let converted;
                    let frame = if frame.channels() == channels {
                        &**frame
                    } else {
                        converted = frame
                            .convert_channels(channels)
                            .map_err(|e| AlignError::Internal(e.to_string()))?;
                        &converted
                    };
                    ImageWarper.warp(frame, homography, width, height)
                })
                .collect::<Result<Vec<WarpedFrame>, _>>()?;

            info!(
                "stacking {} layers onto {}x{} reference ({rule:?})",
                layers.len(),
                width,
                height
            );
            StackMerger::new(rule).merge(reference, &layers)
        })
    }
}
