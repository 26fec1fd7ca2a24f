//! End-to-end orchestrator runs against in-process fakes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use image::{Rgb, RgbImage};
use tempfile::TempDir;

use vtrack_inference::{
    DetectionOutput, Detector, InferenceContext, InferenceResult, PropagationStream, SeedPrompt, TrackerSession,
    VideoTracker,
};
use vtrack_media::{AssembledVideo, FrameExtractor, MediaError, MediaResult, VideoAssembler};
use vtrack_models::{
    frame_file_name, BoundingBox, DetectionResult, Frame, FrameSegments, FrameSequence, Mask, ObjectId, PromptType,
    Task, TaskId, TaskStatus, Thresholds, TrackingRequest,
};
use vtrack_store::{MemoryTaskStore, StoreError, StoreResult, TaskStore};
use vtrack_worker::{Orchestrator, PipelineConfig, PipelineError, RetryConfig, RunSpec, WorkspaceLayout};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

fn car_box() -> BoundingBox {
    BoundingBox::new(8.0, 6.0, 20.0, 16.0)
}

fn car_mask() -> Mask {
    box_mask(&car_box())
}

fn box_mask(b: &BoundingBox) -> Mask {
    let (x1, y1, x2, y2) = (b.x1 as u32, b.y1 as u32, b.x2 as u32, b.y2 as u32);
    Mask::from_fn(WIDTH, HEIGHT, |x, y| (x1..x2).contains(&x) && (y1..y2).contains(&y))
}

/// One of three side-by-side boxes, low enough that labels sit above them.
fn column_box(column: u32) -> BoundingBox {
    let x = 2.0 + 21.0 * column as f32;
    BoundingBox::new(x, 22.0, x + 14.0, 46.0)
}

/// Pixel well inside `b`, clear of its outline.
fn center_of(b: &BoundingBox) -> (u32, u32) {
    (((b.x1 + b.x2) / 2.0) as u32, ((b.y1 + b.y2) / 2.0) as u32)
}

fn is_background(pixel: &Rgb<u8>) -> bool {
    pixel.0.iter().all(|c| (*c as i32 - 90).abs() < 12)
}

struct FakeExtractor {
    frames: u32,
}

#[async_trait]
impl FrameExtractor for FakeExtractor {
    async fn extract(&self, video: &Path, output_dir: &Path) -> MediaResult<FrameSequence> {
        if !video.exists() {
            return Err(MediaError::FileNotFound(video.to_path_buf()));
        }
        tokio::fs::create_dir_all(output_dir).await?;
        let mut frames = Vec::new();
        for index in 0..self.frames {
            let path = output_dir.join(frame_file_name(index));
            RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([90, 90, 90])).save(&path)?;
            frames.push(Frame { index, path });
        }
        Ok(FrameSequence::new(output_dir, frames)?)
    }
}

/// Finds cars at fixed boxes for the prompt "car" and panics on "boom".
struct FakeDetector {
    boxes: Vec<BoundingBox>,
    empty_masks: bool,
}

impl Default for FakeDetector {
    fn default() -> Self {
        Self {
            boxes: vec![car_box()],
            empty_masks: false,
        }
    }
}

impl FakeDetector {
    fn with_boxes(boxes: Vec<BoundingBox>) -> Self {
        Self {
            boxes,
            empty_masks: false,
        }
    }

    fn with_empty_masks() -> Self {
        Self {
            empty_masks: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Detector for FakeDetector {
    async fn detect(&self, frame: &Frame, prompt: &str, _thresholds: Thresholds) -> InferenceResult<DetectionOutput> {
        assert_eq!(frame.index, 0, "detection must run on the seed frame");
        if prompt == "boom" {
            panic!("detector blew up");
        }
        if prompt != "car" {
            return Ok(DetectionOutput::default());
        }
        let detections = self
            .boxes
            .iter()
            .enumerate()
            .map(|(i, bbox)| DetectionResult {
                object_id: i as ObjectId + 1,
                label: "car".to_string(),
                confidence: 0.87,
                bbox: *bbox,
            })
            .collect();
        let masks = self
            .boxes
            .iter()
            .map(|b| if self.empty_masks { Mask::empty(WIDTH, HEIGHT) } else { box_mask(b) })
            .collect();
        Ok(DetectionOutput { detections, masks })
    }
}

#[derive(Default)]
enum Emission {
    #[default]
    InOrder,
    Reversed,
    WithStranger,
    /// Object 2 is lost on odd frames and every object on frame 2.
    Dropping,
}

fn seed_mask(prompt: &SeedPrompt) -> Mask {
    match prompt {
        SeedPrompt::Box(b) => box_mask(b),
        SeedPrompt::Mask(m) => m.clone(),
        SeedPrompt::Points(_) => car_mask(),
    }
}

#[derive(Default)]
struct FakeTracker {
    frames: u32,
    emission: Emission,
    seeds: Mutex<Vec<(u32, ObjectId, SeedPrompt)>>,
    released: AtomicUsize,
}

impl FakeTracker {
    fn new(frames: u32) -> Self {
        Self {
            frames,
            ..Default::default()
        }
    }

    fn with_emission(mut self, emission: Emission) -> Self {
        self.emission = emission;
        self
    }

    fn seeds(&self) -> Vec<(u32, ObjectId, SeedPrompt)> {
        self.seeds.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoTracker for FakeTracker {
    async fn init(&self, frame_dir: &Path) -> InferenceResult<TrackerSession> {
        assert!(frame_dir.is_dir());
        Ok(TrackerSession::new("fake-session"))
    }

    async fn seed(
        &self,
        session: &TrackerSession,
        frame_index: u32,
        object_id: ObjectId,
        prompt: &SeedPrompt,
    ) -> InferenceResult<()> {
        assert_eq!(session.id(), "fake-session");
        self.seeds.lock().unwrap().push((frame_index, object_id, prompt.clone()));
        Ok(())
    }

    async fn propagate(&self, _session: TrackerSession) -> InferenceResult<PropagationStream> {
        let seeded: Vec<(ObjectId, Mask)> = self.seeds().iter().map(|(_, id, p)| (*id, seed_mask(p))).collect();
        let mut indices: Vec<u32> = (0..self.frames).collect();
        if matches!(self.emission, Emission::Reversed) {
            indices.reverse();
        }
        let stranger = matches!(self.emission, Emission::WithStranger);
        let dropping = matches!(self.emission, Emission::Dropping);

        let items: Vec<InferenceResult<(u32, FrameSegments)>> = indices
            .into_iter()
            .map(|index| {
                let mut segments: FrameSegments = seeded.iter().cloned().collect();
                if stranger && index == 3 {
                    segments.insert(99, car_mask());
                }
                if dropping && index % 2 == 1 {
                    segments.remove(&2);
                }
                if dropping && index == 2 {
                    segments.clear();
                }
                Ok((index, segments))
            })
            .collect();
        Ok(stream::iter(items).boxed())
    }

    async fn release(&self, session_id: &str) -> InferenceResult<()> {
        assert_eq!(session_id, "fake-session");
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FakeAssembler {
    frames: Mutex<Vec<PathBuf>>,
    fps: Mutex<Option<f64>>,
}

#[async_trait]
impl VideoAssembler for FakeAssembler {
    async fn assemble(&self, frames: &[PathBuf], output: &Path, fps: f64) -> MediaResult<AssembledVideo> {
        if frames.is_empty() {
            return Err(MediaError::no_frames("No images found to assemble"));
        }
        *self.frames.lock().unwrap() = frames.to_vec();
        *self.fps.lock().unwrap() = Some(fps);
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, b"mp4").await?;
        Ok(AssembledVideo {
            path: output.to_path_buf(),
            frame_count: frames.len(),
            width: WIDTH,
            height: HEIGHT,
        })
    }
}

/// Memory store that remembers every accepted write and can start refusing.
struct RecordingStore {
    inner: MemoryTaskStore,
    history: Mutex<Vec<Task>>,
    accept_limit: Option<usize>,
    /// Refuse this many Processing writes before accepting them again.
    refuse_processing: AtomicUsize,
    refuse_all: AtomicBool,
}

impl RecordingStore {
    fn new(accept_limit: Option<usize>) -> Self {
        Self {
            inner: MemoryTaskStore::default(),
            history: Mutex::new(Vec::new()),
            accept_limit,
            refuse_processing: AtomicUsize::new(0),
            refuse_all: AtomicBool::new(false),
        }
    }

    fn refusing_processing(writes: usize) -> Self {
        let store = Self::new(None);
        store.refuse_processing.store(writes, Ordering::SeqCst);
        store
    }

    fn history_for(&self, id: &TaskId) -> Vec<Task> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|t| &t.id == id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TaskStore for RecordingStore {
    async fn put(&self, task: &Task) -> StoreResult<()> {
        if self.refuse_all.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("store offline"));
        }
        if task.status == TaskStatus::Processing
            && self
                .refuse_processing
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(StoreError::unavailable("store refused processing write"));
        }
        {
            let mut history = self.history.lock().unwrap();
            if self.accept_limit.is_some_and(|limit| history.len() >= limit) {
                return Err(StoreError::unavailable("store refused write"));
            }
            history.push(task.clone());
        }
        self.inner.put(task).await
    }

    async fn get(&self, id: &TaskId) -> StoreResult<Option<Task>> {
        self.inner.get(id).await
    }

    async fn claim_fingerprint(&self, fingerprint: &str, id: &TaskId, ttl: Duration) -> StoreResult<Option<TaskId>> {
        self.inner.claim_fingerprint(fingerprint, id, ttl).await
    }

    async fn replace_fingerprint(
        &self,
        fingerprint: &str,
        stale: &TaskId,
        id: &TaskId,
        ttl: Duration,
    ) -> StoreResult<Option<TaskId>> {
        self.inner.replace_fingerprint(fingerprint, stale, id, ttl).await
    }

    async fn release_fingerprint(&self, fingerprint: &str, id: &TaskId) -> StoreResult<()> {
        self.inner.release_fingerprint(fingerprint, id).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }
}

struct Harness {
    _root: TempDir,
    video: PathBuf,
    store: Arc<RecordingStore>,
    tracker: Arc<FakeTracker>,
    assembler: Arc<FakeAssembler>,
    orchestrator: Arc<Orchestrator>,
}

impl Harness {
    async fn new(tracker: FakeTracker, configure: impl FnOnce(&mut PipelineConfig)) -> Self {
        Self::build(tracker, FakeDetector::default(), RecordingStore::new(None), configure).await
    }

    async fn with_store(
        tracker: FakeTracker,
        store: RecordingStore,
        configure: impl FnOnce(&mut PipelineConfig),
    ) -> Self {
        Self::build(tracker, FakeDetector::default(), store, configure).await
    }

    async fn with_detector(tracker: FakeTracker, detector: FakeDetector) -> Self {
        Self::build(tracker, detector, RecordingStore::new(None), |_| {}).await
    }

    async fn build(
        tracker: FakeTracker,
        detector: FakeDetector,
        store: RecordingStore,
        configure: impl FnOnce(&mut PipelineConfig),
    ) -> Self {
        let root = TempDir::new().unwrap();
        let layout = WorkspaceLayout::under(root.path());
        layout.ensure_dirs().await.unwrap();
        let video = layout.upload_path("clip", "mp4");
        tokio::fs::write(&video, b"not decoded by the fake").await.unwrap();

        let frames = tracker.frames;
        let store = Arc::new(store);
        let tracker = Arc::new(tracker);
        let assembler = Arc::new(FakeAssembler::default());

        let mut config = PipelineConfig::default().with_layout(layout);
        config.store_retry = RetryConfig::new("test_put")
            .with_max_retries(1)
            .with_base_delay(Duration::from_millis(1));
        configure(&mut config);

        let inference = InferenceContext::new(Arc::new(detector), tracker.clone());
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            inference,
            Arc::new(FakeExtractor { frames }),
            assembler.clone(),
            config,
        ));

        Self {
            _root: root,
            video,
            store,
            tracker,
            assembler,
            orchestrator,
        }
    }

    async fn wait_terminal(&self, id: &TaskId) -> Task {
        for _ in 0..1000 {
            if let Some(task) = self.store.get(id).await.unwrap() {
                if task.is_terminal() {
                    return task;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} never reached a terminal state", id);
    }
}

fn assert_monotonic(history: &[Task]) {
    let progress: Vec<f32> = history.iter().map(|t| t.progress.unwrap_or(0.0)).collect();
    assert!(
        progress.windows(2).all(|w| w[0] <= w[1]),
        "progress regressed: {:?}",
        progress
    );

    let statuses: Vec<TaskStatus> = history.iter().map(|t| t.status).collect();
    assert_eq!(statuses.first(), Some(&TaskStatus::Pending));
    for pair in statuses.windows(2) {
        assert!(
            pair[0] == pair[1] || pair[0].can_transition_to(pair[1]),
            "illegal transition {:?} -> {:?}",
            pair[0],
            pair[1]
        );
    }
    assert_eq!(statuses.iter().filter(|s| s.is_terminal()).count(), 1);
}

#[tokio::test]
async fn test_car_video_completes() {
    let h = Harness::new(FakeTracker::new(150), |_| {}).await;

    let submission = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "car"))
        .await
        .unwrap();
    assert_eq!(submission.status, TaskStatus::Pending);
    assert!(!submission.deduplicated);

    let task = h.wait_terminal(&submission.task_id).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, Some(100.0));
    assert_eq!(
        task.result_locator.as_deref(),
        Some(format!("/api/download/{}", submission.task_id).as_str())
    );
    assert!(task.error.is_none());

    let seeds = h.tracker.seeds();
    assert_eq!(seeds.len(), 1);
    assert_eq!(seeds[0].0, 0);
    assert_eq!(seeds[0].1, 1);
    assert_eq!(seeds[0].2, SeedPrompt::Box(car_box()));
    assert_eq!(h.tracker.released.load(Ordering::SeqCst), 1);

    let frames = h.assembler.frames.lock().unwrap().clone();
    assert_eq!(frames.len(), 150);
    let names: Vec<String> = frames
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names[0], "annotated_frame_00000.jpg");
    assert_eq!(names[10], "annotated_frame_00010.jpg");
    assert_eq!(names[149], "annotated_frame_00149.jpg");
    assert!(frames.iter().all(|p| p.exists()));
    assert_eq!(*h.assembler.fps.lock().unwrap(), Some(30.0));

    let layout = h.orchestrator.layout();
    assert!(layout.output_path(&submission.task_id).exists());

    let history = h.store.history_for(&submission.task_id);
    assert_monotonic(&history);
    let checkpoints: Vec<f32> = history.iter().filter_map(|t| t.progress).collect();
    assert_eq!(checkpoints, vec![0.0, 0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 70.0, 100.0]);
}

#[tokio::test]
async fn test_annotated_frames_show_the_tracked_object() {
    let h = Harness::new(FakeTracker::new(3), |_| {}).await;
    let submission = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "car"))
        .await
        .unwrap();
    h.wait_terminal(&submission.task_id).await;

    let frames = h.assembler.frames.lock().unwrap().clone();
    let annotated = image::open(&frames[1]).unwrap().to_rgb8();
    let inside = annotated.get_pixel(14, 12);
    let outside = annotated.get_pixel(60, 44);

    assert!(is_background(outside), "background changed: {:?}", outside);
    assert!(!is_background(inside), "mask not drawn: {:?}", inside);
}

#[tokio::test]
async fn test_unmatched_prompt_fails_at_detection() {
    let h = Harness::new(FakeTracker::new(150), |_| {}).await;

    let submission = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "unicorn"))
        .await
        .unwrap();
    let task = h.wait_terminal(&submission.task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    let error = task.error.clone().unwrap();
    assert!(error.contains("No objects detected"), "{}", error);
    assert!(error.contains("unicorn"));
    assert!(task.result_locator.is_none());
    assert!(task.progress.unwrap() < 30.0);

    let history = h.store.history_for(&submission.task_id);
    assert_monotonic(&history);
    assert!(history.iter().all(|t| t.progress.unwrap_or(0.0) < 30.0));
    assert!(h.tracker.seeds().is_empty());
    assert_eq!(h.tracker.released.load(Ordering::SeqCst), 1);
    assert!(h.assembler.frames.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_point_mode_seeds_sampled_clicks() {
    let h = Harness::new(FakeTracker::new(5), |config| {
        config.sampling_seed = Some(11);
        config.points_per_object = 6;
    })
    .await;

    let mut request = TrackingRequest::new("clip", "car");
    request.prompt_type = Some(PromptType::Point);
    let submission = h.orchestrator.submit(h.video.clone(), request).await.unwrap();
    let task = h.wait_terminal(&submission.task_id).await;
    assert_eq!(task.status, TaskStatus::Completed);

    let seeds = h.tracker.seeds();
    assert_eq!(seeds.len(), 1);
    match &seeds[0].2 {
        SeedPrompt::Points(points) => {
            assert_eq!(points.len(), 6);
            let mask = car_mask();
            assert!(points.iter().all(|p| mask.is_set(p.x, p.y)));
        }
        other => panic!("expected point prompt, got {:?}", other),
    }
}

#[tokio::test]
async fn test_configured_prompt_type_applies_by_default() {
    let h = Harness::new(FakeTracker::new(2), |config| {
        config.default_prompt_type = PromptType::Mask;
    })
    .await;

    let submission = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "car"))
        .await
        .unwrap();
    h.wait_terminal(&submission.task_id).await;

    let seeds = h.tracker.seeds();
    assert_eq!(seeds[0].2, SeedPrompt::Mask(car_mask()));
}

#[tokio::test]
async fn test_out_of_order_propagation_fails() {
    let h = Harness::new(FakeTracker::new(4).with_emission(Emission::Reversed), |_| {}).await;

    let submission = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "car"))
        .await
        .unwrap();
    let task = h.wait_terminal(&submission.task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.unwrap().contains("propagation"));
    assert_eq!(task.progress, Some(40.0));
    assert_eq!(h.tracker.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unseeded_object_in_propagation_fails() {
    let h = Harness::new(FakeTracker::new(6).with_emission(Emission::WithStranger), |_| {}).await;

    let submission = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "car"))
        .await
        .unwrap();
    let task = h.wait_terminal(&submission.task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.unwrap().contains("unseeded object 99"));
}

#[tokio::test]
async fn test_missing_video_fails_at_extraction() {
    let h = Harness::new(FakeTracker::new(3), |_| {}).await;

    let submission = h
        .orchestrator
        .submit(h.video.with_extension("mkv"), TrackingRequest::new("clip", "car"))
        .await
        .unwrap();
    let task = h.wait_terminal(&submission.task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.unwrap().starts_with("Frame extraction failed"));
    assert_eq!(task.progress, Some(0.0));
}

#[tokio::test]
async fn test_invalid_request_creates_nothing() {
    let h = Harness::new(FakeTracker::new(3), |_| {}).await;

    let mut request = TrackingRequest::new("clip", "car");
    request.box_threshold = 1.5;
    let err = h.orchestrator.submit(h.video.clone(), request).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)));

    let err = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)));
    assert!(h.store.history.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_store_outage_during_run_is_surfaced() {
    // Pending, Started and FramesExtracted are accepted; everything after is refused.
    let h = Harness::with_store(FakeTracker::new(3), RecordingStore::new(Some(3)), |_| {}).await;

    let task = Task::new(TaskId::new());
    h.store.put(&task).await.unwrap();
    let id = task.id.clone();

    let finished = h
        .orchestrator
        .run(
            task,
            RunSpec {
                video: h.video.clone(),
                prompt: "car".to_string(),
                prompt_type: PromptType::Box,
                request: TrackingRequest::new("clip", "car"),
            },
        )
        .await;

    assert_eq!(finished.status, TaskStatus::Failed);
    assert!(finished.error.unwrap().contains("Task store write failed"));

    let stored = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Processing);
    assert_eq!(stored.progress, Some(10.0));
}

#[tokio::test]
async fn test_duplicate_submission_reuses_task() {
    let h = Harness::new(FakeTracker::new(2), |config| config.dedup_enabled = true).await;

    let first = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "car"))
        .await
        .unwrap();
    let second = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "  CAR "))
        .await
        .unwrap();

    assert_eq!(second.task_id, first.task_id);
    assert!(second.deduplicated);

    let mut other = TrackingRequest::new("clip", "car");
    other.prompt_type = Some(PromptType::Point);
    let third = h.orchestrator.submit(h.video.clone(), other).await.unwrap();
    assert_ne!(third.task_id, first.task_id);

    h.wait_terminal(&first.task_id).await;
    h.wait_terminal(&third.task_id).await;
}

#[tokio::test]
async fn test_cleanup_after_run_is_idempotent() {
    let h = Harness::new(FakeTracker::new(4), |_| {}).await;
    let submission = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "car"))
        .await
        .unwrap();
    h.wait_terminal(&submission.task_id).await;

    let layout = h.orchestrator.layout();
    assert!(layout.frames_dir(&submission.task_id).exists());
    assert!(layout.results_dir(&submission.task_id).exists());

    assert_eq!(h.orchestrator.cleanup(&submission.task_id).await.unwrap(), 2);
    assert_eq!(h.orchestrator.cleanup(&submission.task_id).await.unwrap(), 0);
    assert!(!layout.frames_dir(&submission.task_id).exists());
    assert!(layout.output_path(&submission.task_id).exists());

    assert_eq!(h.orchestrator.cleanup(&TaskId::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_several_objects_keep_their_ids_while_some_drop_out() {
    let boxes: Vec<BoundingBox> = (0..3).map(column_box).collect();
    let h = Harness::with_detector(
        FakeTracker::new(4).with_emission(Emission::Dropping),
        FakeDetector::with_boxes(boxes.clone()),
    )
    .await;

    let submission = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "car"))
        .await
        .unwrap();
    let task = h.wait_terminal(&submission.task_id).await;
    assert_eq!(task.status, TaskStatus::Completed, "{:?}", task.error);

    let seeds = h.tracker.seeds();
    let ids: Vec<ObjectId> = seeds.iter().map(|(_, id, _)| *id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(seeds.iter().all(|(frame, _, _)| *frame == 0));
    for (seed, bbox) in seeds.iter().zip(&boxes) {
        assert_eq!(seed.2, SeedPrompt::Box(*bbox));
    }

    let frames = h.assembler.frames.lock().unwrap().clone();
    assert_eq!(frames.len(), 4);
    let drawn = |frame: usize, object: usize| {
        let image = image::open(&frames[frame]).unwrap().to_rgb8();
        let (x, y) = center_of(&boxes[object]);
        !is_background(image.get_pixel(x, y))
    };

    assert!(drawn(0, 0) && drawn(0, 1) && drawn(0, 2));
    assert!(drawn(1, 0) && !drawn(1, 1) && drawn(1, 2));
    assert!(!drawn(2, 0) && !drawn(2, 1) && !drawn(2, 2));
    assert!(drawn(3, 0) && !drawn(3, 1) && drawn(3, 2));
}

#[tokio::test]
async fn test_point_mode_with_only_empty_masks_fails_seeding() {
    let h = Harness::with_detector(FakeTracker::new(3), FakeDetector::with_empty_masks()).await;

    let mut request = TrackingRequest::new("clip", "car");
    request.prompt_type = Some(PromptType::Point);
    let submission = h.orchestrator.submit(h.video.clone(), request).await.unwrap();
    let task = h.wait_terminal(&submission.task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.unwrap().starts_with("Tracker seeding failed"));
    assert_eq!(task.progress, Some(30.0));
    assert!(h.tracker.seeds().is_empty());
    assert_eq!(h.tracker.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_video_without_frames_fails() {
    let h = Harness::new(FakeTracker::new(0), |_| {}).await;

    let submission = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "car"))
        .await
        .unwrap();
    let task = h.wait_terminal(&submission.task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("Video contains no frames"));
    assert!(task.result_locator.is_none());
    assert!(h.assembler.frames.lock().unwrap().is_empty());
    assert_monotonic(&h.store.history_for(&submission.task_id));
}

#[tokio::test]
async fn test_panicking_stage_fails_the_task() {
    let h = Harness::new(FakeTracker::new(3), |_| {}).await;

    let submission = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "boom"))
        .await
        .unwrap();
    let task = h.wait_terminal(&submission.task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("Internal error: pipeline stage panicked"));
    assert_eq!(task.progress, Some(20.0));
    assert_monotonic(&h.store.history_for(&submission.task_id));
}

#[tokio::test]
async fn test_unstored_start_still_passes_through_processing() {
    // Both attempts at the first Processing write are refused.
    let h = Harness::with_store(FakeTracker::new(3), RecordingStore::refusing_processing(2), |_| {}).await;

    let submission = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "car"))
        .await
        .unwrap();
    let task = h.wait_terminal(&submission.task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.unwrap().contains("Task store write failed"));
    assert_eq!(task.progress, Some(0.0));

    let history = h.store.history_for(&submission.task_id);
    assert_monotonic(&history);
    let statuses: Vec<TaskStatus> = history.iter().map(|t| t.status).collect();
    assert_eq!(statuses, vec![TaskStatus::Pending, TaskStatus::Processing, TaskStatus::Failed]);
}

#[tokio::test]
async fn test_finished_submission_is_not_reused() {
    let h = Harness::new(FakeTracker::new(2), |config| config.dedup_enabled = true).await;

    let failed = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "unicorn"))
        .await
        .unwrap();
    assert_eq!(h.wait_terminal(&failed.task_id).await.status, TaskStatus::Failed);

    let retried = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "unicorn"))
        .await
        .unwrap();
    assert_ne!(retried.task_id, failed.task_id);
    assert!(!retried.deduplicated);
    h.wait_terminal(&retried.task_id).await;

    let completed = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "car"))
        .await
        .unwrap();
    assert_eq!(h.wait_terminal(&completed.task_id).await.status, TaskStatus::Completed);

    let again = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "car"))
        .await
        .unwrap();
    assert_ne!(again.task_id, completed.task_id);
    assert!(!again.deduplicated);
    assert_eq!(h.wait_terminal(&again.task_id).await.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_unstored_submission_does_not_block_resubmission() {
    let h = Harness::new(FakeTracker::new(2), |config| config.dedup_enabled = true).await;

    h.store.refuse_all.store(true, Ordering::SeqCst);
    let err = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "car"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Persistence(_)));
    assert!(h.store.history.lock().unwrap().is_empty());

    h.store.refuse_all.store(false, Ordering::SeqCst);
    let submission = h
        .orchestrator
        .submit(h.video.clone(), TrackingRequest::new("clip", "car"))
        .await
        .unwrap();
    assert!(!submission.deduplicated);
    assert_eq!(h.wait_terminal(&submission.task_id).await.status, TaskStatus::Completed);
}
