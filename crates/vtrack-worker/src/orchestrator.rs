//! The tracking pipeline state machine.
//!
//! A run walks a fixed stage sequence, writing a checkpoint to the task
//! store after each stage. Every stage error is caught once, in
//! [`Orchestrator::run`], and turned into a Failed record. Nothing produced
//! along the way is rolled back; [`Orchestrator::cleanup`] is the only thing
//! that removes per-task files.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures_util::{FutureExt, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn, Instrument};

use vtrack_inference::{DetectionOutput, InferenceContext, PromptSampler, SeedPrompt, TrackerSession, VideoTracker};
use vtrack_media::{probe_video, Annotator, FrameExtractor, VideoAssembler};
use vtrack_models::{
    annotated_frame_file_name, labels_by_id, Checkpoint, FrameSegments, FrameSequence, ObjectId, PromptType,
    SegmentMap, Task, TaskId, TaskStatus, TrackingRequest,
};
use vtrack_store::{submission_fingerprint, TaskStore};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::layout::WorkspaceLayout;
use crate::logging::TaskLogger;
use crate::metrics;
use crate::retry::{retry_async, RetryResult};

/// Rounds of handing a dedup fingerprint over before giving up on dedup.
const MAX_CLAIM_ATTEMPTS: usize = 3;

/// Outcome of [`Orchestrator::submit`].
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// The id belongs to an earlier identical submission
    pub deduplicated: bool,
}

/// Per-run inputs, fixed at submission.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub video: PathBuf,
    pub prompt: String,
    pub prompt_type: PromptType,
    pub request: TrackingRequest,
}

pub struct Orchestrator {
    store: Arc<dyn TaskStore>,
    inference: InferenceContext,
    extractor: Arc<dyn FrameExtractor>,
    assembler: Arc<dyn VideoAssembler>,
    annotator: Annotator,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        inference: InferenceContext,
        extractor: Arc<dyn FrameExtractor>,
        assembler: Arc<dyn VideoAssembler>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            inference,
            extractor,
            assembler,
            annotator: Annotator::default(),
            config,
        }
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn store(&self) -> Arc<dyn TaskStore> {
        Arc::clone(&self.store)
    }

    pub fn inference(&self) -> &InferenceContext {
        &self.inference
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.config.layout
    }

    /// Create a Pending task for `request` and start its run in the background.
    ///
    /// Fails without creating anything if the request is invalid or the
    /// initial record cannot be written.
    pub async fn submit(self: &Arc<Self>, video: PathBuf, request: TrackingRequest) -> PipelineResult<Submission> {
        request
            .validate()
            .map_err(|e| PipelineError::InvalidRequest(e.to_string()))?;

        let prompt_type = self.config.prompt_type_for(request.prompt_type);
        let task = Task::new(TaskId::new());

        let fingerprint = if self.config.dedup_enabled {
            let fingerprint =
                submission_fingerprint(&request.file_id, &request.text_prompt, prompt_type, request.thresholds());
            if let Some(existing) = self.claim_submission(&fingerprint, &task.id).await? {
                return Ok(existing);
            }
            Some(fingerprint)
        } else {
            None
        };

        if let Err(e) = self.persist(&task).await {
            if let Some(fingerprint) = &fingerprint {
                if let Err(release_err) = self.store.release_fingerprint(fingerprint, &task.id).await {
                    warn!(task_id = %task.id, "Submission fingerprint not released: {}", release_err);
                }
            }
            return Err(e);
        }
        metrics::record_task_submitted(prompt_type.as_str());

        let submission = Submission {
            task_id: task.id.clone(),
            status: task.status,
            deduplicated: false,
        };
        let spec = RunSpec {
            video,
            prompt: request.text_prompt.trim().to_string(),
            prompt_type,
            request,
        };

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run(task, spec).await;
        });

        Ok(submission)
    }

    /// Claim `fingerprint` for `id`, or return the live task that holds it.
    ///
    /// Owners that finished, failed or were never stored lose the claim to `id`.
    async fn claim_submission(&self, fingerprint: &str, id: &TaskId) -> PipelineResult<Option<Submission>> {
        let ttl = self.config.dedup_ttl;
        let mut owner = self
            .store
            .claim_fingerprint(fingerprint, id, ttl)
            .await
            .map_err(PipelineError::Persistence)?;

        for _ in 0..MAX_CLAIM_ATTEMPTS {
            let Some(existing) = owner else {
                return Ok(None);
            };
            match self.store.get(&existing).await.map_err(PipelineError::Persistence)? {
                Some(current) if !current.is_terminal() => {
                    info!(task_id = %existing, "Duplicate submission, reusing task");
                    metrics::record_task_deduplicated();
                    return Ok(Some(Submission {
                        task_id: existing,
                        status: current.status,
                        deduplicated: true,
                    }));
                }
                _ => {
                    owner = self
                        .store
                        .replace_fingerprint(fingerprint, &existing, id, ttl)
                        .await
                        .map_err(PipelineError::Persistence)?;
                }
            }
        }

        if let Some(contender) = owner {
            warn!(task_id = %id, contender = %contender, "Fingerprint still contended, not deduplicating");
        }
        Ok(None)
    }

    /// Drive one task to a terminal state and return the last state reached.
    ///
    /// This is the single place stage failures are caught. A panic inside a
    /// stage is treated like any other failure.
    pub async fn run(&self, mut task: Task, spec: RunSpec) -> Task {
        let logger = TaskLogger::new(&task.id, spec.prompt_type);
        let span = logger.create_span();

        async {
            logger.log_start(&spec.prompt, &spec.video);
            let started = Instant::now();

            let outcome = AssertUnwindSafe(self.execute(&mut task, &spec, &logger))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(PipelineError::Internal("pipeline stage panicked".to_string())));

            match outcome {
                Ok(()) => {
                    metrics::record_task_completed();
                    logger.log_completion(
                        started.elapsed().as_secs_f64(),
                        task.result_locator.as_deref().unwrap_or_default(),
                    );
                }
                Err(e) => {
                    metrics::record_task_failed(e.stage());
                    logger.log_failure(e.stage(), task.progress, &e.to_string());
                    self.record_failure(&mut task, &e, &logger).await;
                }
            }
        }
        .instrument(span)
        .await;

        task
    }

    /// Delete a task's transient artifacts. Safe to repeat.
    pub async fn cleanup(&self, id: &TaskId) -> PipelineResult<usize> {
        Ok(self.config.layout.cleanup(id).await?)
    }

    async fn execute(&self, task: &mut Task, spec: &RunSpec, logger: &TaskLogger) -> PipelineResult<()> {
        let layout = &self.config.layout;
        self.checkpoint(task, Checkpoint::Started, logger).await?;

        let frames = timed(
            "extraction",
            logger,
            self.extractor.extract(&spec.video, &layout.frames_dir(&task.id)),
        )
        .await
        .map_err(PipelineError::Extraction)?;
        logger.log_progress(&format!("Extracted {} frames", frames.len()));
        self.checkpoint(task, Checkpoint::FramesExtracted, logger).await?;

        let tracker = self.inference.tracker();
        let session = timed("tracker_init", logger, tracker.init(frames.dir()))
            .await
            .map_err(PipelineError::TrackerInit)?;
        let session_id = session.id().to_string();

        let tracked = self.track(task, spec, &frames, tracker.as_ref(), session, logger).await;
        if let Err(e) = tracker.release(&session_id).await {
            logger.log_warning(&format!("tracker session {} not released: {}", session_id, e));
        }
        let (detection, segments) = tracked?;

        let started = Instant::now();
        let annotated = self.annotate(task, &frames, &detection, segments).await;
        finish_stage("annotation", logger, started, annotated.is_ok());
        let annotated = annotated?;

        let fps = self.output_fps(spec, logger).await;
        let output = layout.output_path(&task.id);
        let video = timed("assembly", logger, self.assembler.assemble(&annotated, &output, fps))
            .await
            .map_err(PipelineError::Assembly)?;
        logger.log_progress(&format!(
            "Wrote {} frames at {} fps to {}",
            video.frame_count,
            fps,
            video.path.display()
        ));
        self.checkpoint(task, Checkpoint::AnnotationComplete, logger).await?;

        let mut next = task.clone();
        next.complete(format!("/api/download/{}", task.id))
            .map_err(PipelineError::InvalidTransition)?;
        self.persist(&next).await?;
        *task = next;
        Ok(())
    }

    /// Detection, seeding and propagation against one tracker session.
    async fn track(
        &self,
        task: &mut Task,
        spec: &RunSpec,
        frames: &FrameSequence,
        tracker: &dyn VideoTracker,
        session: TrackerSession,
        logger: &TaskLogger,
    ) -> PipelineResult<(DetectionOutput, SegmentMap)> {
        self.checkpoint(task, Checkpoint::TrackerInitialized, logger).await?;

        let seed_frame = frames.first().ok_or(PipelineError::NoFrames)?;
        let detector = self.inference.detector();
        let detection = timed(
            "detection",
            logger,
            detector.detect(seed_frame, &spec.prompt, spec.request.thresholds()),
        )
        .await
        .map_err(PipelineError::Detection)?;
        if detection.is_empty() {
            return Err(PipelineError::DetectionEmpty {
                prompt: spec.prompt.clone(),
            });
        }
        logger.log_detections(&detection.detections);
        self.checkpoint(task, Checkpoint::ObjectsDetected, logger).await?;

        let started = Instant::now();
        let seeded = self
            .seed(tracker, &session, seed_frame.index, &detection, spec.prompt_type, logger)
            .await;
        finish_stage("seeding", logger, started, seeded.is_ok());
        let seeded = seeded?;
        self.checkpoint(task, Checkpoint::TrackerSeeded, logger).await?;

        let started = Instant::now();
        let segments = self.propagate(tracker, session, &seeded, frames.len()).await;
        finish_stage("propagation", logger, started, segments.is_ok());
        let segments = segments?;
        logger.log_progress(&format!("Propagated masks over {} frames", segments.len()));
        self.checkpoint(task, Checkpoint::PropagationComplete, logger).await?;

        Ok((detection, segments))
    }

    /// Register one prompt per detected object. Returns the seeded ids.
    async fn seed(
        &self,
        tracker: &dyn VideoTracker,
        session: &TrackerSession,
        frame_index: u32,
        detection: &DetectionOutput,
        mode: PromptType,
        logger: &TaskLogger,
    ) -> PipelineResult<BTreeSet<ObjectId>> {
        let sampler = PromptSampler::new(mode, self.config.points_per_object);
        let prompts: Vec<(ObjectId, SeedPrompt)> = {
            let mut rng = match self.config.sampling_seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            detection
                .iter()
                .map(|(d, mask)| (d.object_id, sampler.prompt_for(&d.bbox, mask, &mut rng)))
                .collect()
        };

        let mut seeded = BTreeSet::new();
        for (object_id, prompt) in prompts {
            if prompt.is_empty() {
                logger.log_warning(&format!("object {} has an empty mask, not seeded", object_id));
                continue;
            }
            tracker
                .seed(session, frame_index, object_id, &prompt)
                .await
                .map_err(|e| PipelineError::seeding(format!("object {}: {}", object_id, e)))?;
            seeded.insert(object_id);
        }

        if seeded.is_empty() {
            return Err(PipelineError::seeding("no detected object could be seeded"));
        }
        Ok(seeded)
    }

    /// Collect the propagation stream, rejecting anything out of order or unknown.
    async fn propagate(
        &self,
        tracker: &dyn VideoTracker,
        session: TrackerSession,
        seeded: &BTreeSet<ObjectId>,
        frame_count: usize,
    ) -> PipelineResult<SegmentMap> {
        let mut stream = tracker
            .propagate(session)
            .await
            .map_err(|e| PipelineError::propagation(e.to_string()))?;

        let mut segments = SegmentMap::new();
        let mut last: Option<u32> = None;
        while let Some(item) = stream.next().await {
            let (index, frame_segments) = item.map_err(|e| PipelineError::propagation(e.to_string()))?;

            if let Some(prev) = last {
                if index <= prev {
                    return Err(PipelineError::propagation(format!(
                        "frame {} arrived after frame {}",
                        index, prev
                    )));
                }
            }
            if index as usize >= frame_count {
                return Err(PipelineError::propagation(format!(
                    "frame {} is outside the {}-frame video",
                    index, frame_count
                )));
            }
            if let Some(unknown) = frame_segments.keys().find(|id| !seeded.contains(id)) {
                return Err(PipelineError::propagation(format!(
                    "frame {} contains unseeded object {}",
                    index, unknown
                )));
            }

            last = Some(index);
            segments.insert(index, frame_segments);
        }

        Ok(segments)
    }

    /// Render every frame, in index order, into the task's results directory.
    async fn annotate(
        &self,
        task: &Task,
        frames: &FrameSequence,
        detection: &DetectionOutput,
        mut segments: SegmentMap,
    ) -> PipelineResult<Vec<PathBuf>> {
        let results_dir = self.config.layout.results_dir(&task.id);
        tokio::fs::create_dir_all(&results_dir).await?;

        let labels = labels_by_id(&detection.detections);
        let jobs: Vec<(PathBuf, PathBuf, FrameSegments)> = frames
            .iter()
            .map(|f| {
                (
                    f.path.clone(),
                    results_dir.join(annotated_frame_file_name(f.index)),
                    segments.remove(&f.index).unwrap_or_default(),
                )
            })
            .collect();
        let annotator = self.annotator.clone();

        tokio::task::spawn_blocking(move || annotate_all(&annotator, jobs, &labels)).await?
    }

    async fn output_fps(&self, spec: &RunSpec, logger: &TaskLogger) -> f64 {
        if !spec.request.match_source_fps {
            return self.config.output_fps;
        }
        match probe_video(&spec.video).await {
            Ok(info) if info.fps > 0.0 => info.fps,
            Ok(_) => self.config.output_fps,
            Err(e) => {
                logger.log_warning(&format!("source frame rate unavailable, using default: {}", e));
                self.config.output_fps
            }
        }
    }

    /// Persist the next checkpoint, then adopt it locally.
    ///
    /// The local copy only moves once the store accepted the write, so a
    /// failed write leaves `task` at the last persisted state.
    async fn checkpoint(&self, task: &mut Task, checkpoint: Checkpoint, logger: &TaskLogger) -> PipelineResult<()> {
        let mut next = task.clone();
        next.advance(checkpoint).map_err(PipelineError::InvalidTransition)?;
        self.persist(&next).await?;
        *task = next;
        logger.log_checkpoint(checkpoint);
        Ok(())
    }

    /// Store the Failed record for a run.
    ///
    /// A run that never got its first checkpoint stored is still Pending; it
    /// is moved to Processing first so the stored history never skips a state.
    async fn record_failure(&self, task: &mut Task, error: &PipelineError, logger: &TaskLogger) {
        if task.status == TaskStatus::Pending {
            if let Err(e) = self.checkpoint(task, Checkpoint::Started, logger).await {
                logger.log_error(&format!("task left pending, start was not stored: {}", e));
                return;
            }
        }
        if let Err(e) = task.fail(error.to_string()) {
            logger.log_error(&format!("cannot mark task failed: {}", e));
            return;
        }
        if let Err(e) = self.persist(task).await {
            logger.log_error(&format!("failed state was not stored: {}", e));
        }
    }

    /// Write a record, retrying with backoff. Exhausted retries are counted
    /// and returned, never dropped.
    async fn persist(&self, task: &Task) -> PipelineResult<()> {
        let store = &self.store;
        match retry_async(&self.config.store_retry, || store.put(task)).await {
            RetryResult::Success(()) => Ok(()),
            RetryResult::Failed { error, attempts } => {
                metrics::record_store_write_failure();
                tracing::error!(
                    task_id = %task.id,
                    status = %task.status,
                    attempts,
                    "Task store write failed: {}", error
                );
                Err(PipelineError::Persistence(error))
            }
        }
    }
}

fn annotate_all(
    annotator: &Annotator,
    jobs: Vec<(PathBuf, PathBuf, FrameSegments)>,
    labels: &BTreeMap<ObjectId, String>,
) -> PipelineResult<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(jobs.len());
    for (input, output, segments) in jobs {
        annotator
            .annotate_file(&input, &output, &segments, labels)
            .map_err(|e| PipelineError::annotation(format!("{}: {}", display_name(&input), e)))?;
        written.push(output);
    }
    Ok(written)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn timed<T, E, F>(stage: &'static str, logger: &TaskLogger, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let out = fut.await;
    finish_stage(stage, logger, started, out.is_ok());
    out
}

fn finish_stage(stage: &str, logger: &TaskLogger, started: Instant, ok: bool) {
    let elapsed = started.elapsed().as_secs_f64();
    metrics::record_stage_duration(stage, elapsed, ok);
    if ok {
        logger.log_stage(stage, elapsed);
    }
}
