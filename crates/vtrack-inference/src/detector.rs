//! Text-prompted detection on the seed frame.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use vtrack_models::{BoundingBox, DetectionResult, Frame, Mask, ObjectId, Thresholds};

use crate::client::InferenceClient;
use crate::codec::decode_mask;
use crate::error::{InferenceError, InferenceResult};
use crate::types::{GroundRequest, GroundResponse, SegmentRequest, SegmentResponse};

/// Everything the detection stage hands to seeding.
///
/// `masks[i]` belongs to `detections[i]`.
#[derive(Debug, Clone, Default)]
pub struct DetectionOutput {
    pub detections: Vec<DetectionResult>,
    pub masks: Vec<Mask>,
}

impl DetectionOutput {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DetectionResult, &Mask)> {
        self.detections.iter().zip(self.masks.iter())
    }
}

#[async_trait]
pub trait Detector: Send + Sync {
    /// Detect objects matching `prompt` on one frame.
    ///
    /// An empty output is not an error here; the caller decides.
    async fn detect(&self, frame: &Frame, prompt: &str, thresholds: Thresholds) -> InferenceResult<DetectionOutput>;
}

/// Detector backed by the inference service's `/ground` and `/segment` calls.
pub struct HttpDetector {
    client: Arc<InferenceClient>,
}

impl HttpDetector {
    pub fn new(client: Arc<InferenceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, frame: &Frame, prompt: &str, thresholds: Thresholds) -> InferenceResult<DetectionOutput> {
        let path = frame.path.clone();
        let (width, height) = tokio::task::spawn_blocking(move || image::image_dimensions(&path)).await??;
        let image_path = frame.path.to_string_lossy().into_owned();

        let grounded: GroundResponse = self
            .client
            .post_json(
                "/ground",
                &GroundRequest {
                    image_path: image_path.clone(),
                    prompt: prompt.to_string(),
                    box_threshold: thresholds.box_threshold,
                    text_threshold: thresholds.text_threshold,
                },
            )
            .await?;

        let detections = to_detections(&grounded, width, height)?;
        debug!(
            frame = frame.index,
            raw = grounded.boxes.len(),
            kept = detections.len(),
            "Grounding finished"
        );
        if detections.is_empty() {
            return Ok(DetectionOutput::default());
        }

        let segmented: SegmentResponse = self
            .client
            .post_json(
                "/segment",
                &SegmentRequest {
                    image_path,
                    boxes: detections.iter().map(|d| d.bbox.to_array()).collect(),
                },
            )
            .await?;

        if segmented.masks.len() != detections.len() {
            return Err(InferenceError::invalid_response(format!(
                "expected {} masks, got {}",
                detections.len(),
                segmented.masks.len()
            )));
        }

        let masks = tokio::task::spawn_blocking(move || {
            segmented
                .masks
                .iter()
                .map(|m| decode_mask(m))
                .collect::<InferenceResult<Vec<_>>>()
        })
        .await??;

        info!(frame = frame.index, objects = detections.len(), "Detected objects");
        Ok(DetectionOutput { detections, masks })
    }
}

/// Convert normalized center-form boxes to clamped corner-form detections.
///
/// Degenerate boxes are dropped before ids are assigned, so ids stay dense
/// from 1.
fn to_detections(response: &GroundResponse, width: u32, height: u32) -> InferenceResult<Vec<DetectionResult>> {
    if response.confidences.len() != response.boxes.len() || response.labels.len() != response.boxes.len() {
        return Err(InferenceError::invalid_response(format!(
            "mismatched grounding output: {} boxes, {} confidences, {} labels",
            response.boxes.len(),
            response.confidences.len(),
            response.labels.len()
        )));
    }
    if let Some(bad) = response.confidences.iter().find(|c| !(0.0..=1.0).contains(*c)) {
        return Err(InferenceError::invalid_response(format!(
            "detection confidence out of range: {}",
            bad
        )));
    }

    let detections = response
        .boxes
        .iter()
        .zip(&response.confidences)
        .zip(&response.labels)
        .map(|((b, confidence), label)| {
            (
                BoundingBox::from_normalized_cxcywh(b[0], b[1], b[2], b[3], width, height),
                *confidence,
                label,
            )
        })
        .filter(|(bbox, _, _)| bbox.is_valid())
        .enumerate()
        .map(|(i, (bbox, confidence, label))| DetectionResult {
            object_id: i as ObjectId + 1,
            label: label.trim().to_string(),
            confidence,
            bbox,
        })
        .collect();

    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InferenceConfig;
    use crate::codec::encode_mask;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ground(boxes: Vec<[f32; 4]>, labels: &[&str]) -> GroundResponse {
        GroundResponse {
            confidences: vec![0.8; boxes.len()],
            boxes,
            labels: labels.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_boxes_are_converted_to_pixels() {
        let response = ground(vec![[0.5, 0.5, 0.5, 0.5]], &["car"]);
        let detections = to_detections(&response, 200, 100).unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].object_id, 1);
        assert_eq!(detections[0].bbox, BoundingBox::new(50.0, 25.0, 150.0, 75.0));
    }

    #[test]
    fn test_degenerate_boxes_dropped_before_ids() {
        let response = ground(
            vec![[0.5, 0.5, 0.0, 0.2], [0.25, 0.25, 0.2, 0.2], [1.2, 0.5, 0.1, 0.1], [0.75, 0.75, 0.2, 0.2]],
            &["car", "car", "car", "truck"],
        );
        let detections = to_detections(&response, 100, 100).unwrap();

        let ids: Vec<_> = detections.iter().map(|d| d.object_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(detections[1].label, "truck");
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let mut response = ground(vec![[0.5, 0.5, 0.2, 0.2]], &["car"]);
        response.labels.clear();
        assert!(to_detections(&response, 10, 10).is_err());
    }

    #[test]
    fn test_confidence_outside_unit_range_rejected() {
        for bad in [1.5, -0.1, f32::NAN] {
            let mut response = ground(vec![[0.5, 0.5, 0.2, 0.2]], &["car"]);
            response.confidences[0] = bad;
            let err = to_detections(&response, 10, 10).unwrap_err();
            assert!(matches!(err, InferenceError::InvalidResponse(ref m) if m.contains("confidence")));
        }

        let mut response = ground(vec![[0.5, 0.5, 0.2, 0.2]], &["car"]);
        response.confidences[0] = 1.0;
        assert_eq!(to_detections(&response, 10, 10).unwrap()[0].confidence, 1.0);
    }

    async fn frame_on_disk(dir: &TempDir) -> Frame {
        let path = dir.path().join("00000.jpg");
        RgbImage::from_pixel(64, 48, Rgb([10, 10, 10])).save(&path).unwrap();
        Frame { index: 0, path }
    }

    #[tokio::test]
    async fn test_detect_grounds_then_segments() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let frame = frame_on_disk(&dir).await;

        Mock::given(method("POST"))
            .and(path("/ground"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "boxes": [[0.5, 0.5, 0.25, 0.5]],
                "confidences": [0.9],
                "labels": ["car"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mask = Mask::from_fn(64, 48, |x, y| (24..40).contains(&x) && (12..36).contains(&y));
        Mock::given(method("POST"))
            .and(path("/segment"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "masks": [encode_mask(&mask).unwrap()] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = InferenceClient::new(InferenceConfig {
            base_url: server.uri(),
            ..Default::default()
        })
        .unwrap();
        let detector = HttpDetector::new(Arc::new(client));

        let output = detector.detect(&frame, "car", Thresholds::default()).await.unwrap();
        assert_eq!(output.len(), 1);
        assert_eq!(output.detections[0].label, "car");
        assert_eq!(output.detections[0].bbox, BoundingBox::new(24.0, 12.0, 40.0, 36.0));
        assert_eq!(output.masks[0], mask);
    }

    #[tokio::test]
    async fn test_no_boxes_skips_segmentation() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let frame = frame_on_disk(&dir).await;

        Mock::given(method("POST"))
            .and(path("/ground"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "boxes": [], "confidences": [], "labels": []
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/segment"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let client = InferenceClient::new(InferenceConfig {
            base_url: server.uri(),
            ..Default::default()
        })
        .unwrap();
        let output = HttpDetector::new(Arc::new(client))
            .detect(&frame, "unicorn", Thresholds::default())
            .await
            .unwrap();
        assert!(output.is_empty());
    }
}
