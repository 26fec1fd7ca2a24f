//! Stateful video tracking sessions.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::de::IgnoredAny;
use tracing::{debug, info, warn};

use vtrack_models::{FrameSegments, ObjectId};

use crate::client::InferenceClient;
use crate::codec::{decode_mask, encode_mask};
use crate::error::{InferenceError, InferenceResult};
use crate::sampler::SeedPrompt;
use crate::types::{CreateSessionRequest, CreateSessionResponse, PromptRequest, PropagatedFrame};

/// Opaque per-run tracker handle.
///
/// Not `Clone`: one run owns one session, and propagation consumes it.
#[derive(Debug)]
pub struct TrackerSession {
    id: String,
}

impl TrackerSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Lazily produced `(frame_index, masks)` pairs.
pub type PropagationStream = BoxStream<'static, InferenceResult<(u32, FrameSegments)>>;

#[async_trait]
pub trait VideoTracker: Send + Sync {
    /// Open a session over a directory of extracted frames.
    async fn init(&self, frame_dir: &std::path::Path) -> InferenceResult<TrackerSession>;

    /// Register the initial prompt for one object.
    async fn seed(
        &self,
        session: &TrackerSession,
        frame_index: u32,
        object_id: ObjectId,
        prompt: &SeedPrompt,
    ) -> InferenceResult<()>;

    /// Start propagation. The object set is frozen from here on.
    async fn propagate(&self, session: TrackerSession) -> InferenceResult<PropagationStream>;

    /// Free the remote session. Best effort.
    async fn release(&self, session_id: &str) -> InferenceResult<()>;
}

pub struct HttpTracker {
    client: Arc<InferenceClient>,
}

impl HttpTracker {
    pub fn new(client: Arc<InferenceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VideoTracker for HttpTracker {
    async fn init(&self, frame_dir: &std::path::Path) -> InferenceResult<TrackerSession> {
        let response: CreateSessionResponse = self
            .client
            .post_json(
                "/video/sessions",
                &CreateSessionRequest {
                    frame_dir: frame_dir.to_string_lossy().into_owned(),
                },
            )
            .await?;
        if response.session_id.is_empty() {
            return Err(InferenceError::invalid_response("empty session id"));
        }
        info!(session = %response.session_id, "Tracker session opened");
        Ok(TrackerSession::new(response.session_id))
    }

    async fn seed(
        &self,
        session: &TrackerSession,
        frame_index: u32,
        object_id: ObjectId,
        prompt: &SeedPrompt,
    ) -> InferenceResult<()> {
        let mut request = PromptRequest {
            frame_index,
            object_id,
            points: None,
            labels: None,
            bbox: None,
            mask: None,
        };
        match prompt {
            SeedPrompt::Points(points) => {
                request.points = Some(points.iter().map(|p| [p.x, p.y]).collect());
                request.labels = Some(vec![1; points.len()]);
            }
            SeedPrompt::Box(bbox) => request.bbox = Some(bbox.to_array()),
            SeedPrompt::Mask(mask) => {
                let mask = mask.clone();
                request.mask = Some(tokio::task::spawn_blocking(move || encode_mask(&mask)).await??);
            }
        }

        let _: IgnoredAny = self
            .client
            .post_json(&format!("/video/sessions/{}/prompts", session.id()), &request)
            .await?;
        debug!(session = %session.id(), object_id, kind = %prompt.kind(), "Seeded object");
        Ok(())
    }

    async fn propagate(&self, session: TrackerSession) -> InferenceResult<PropagationStream> {
        let response = self
            .client
            .post_stream(&format!("/video/sessions/{}/propagate", session.id()))
            .await?;

        let frames = ndjson_lines(response.bytes_stream()).then(|line| async move {
            let frame: PropagatedFrame = serde_json::from_slice(&line?)?;
            let index = frame.frame_index;
            let segments = tokio::task::spawn_blocking(move || {
                frame
                    .objects
                    .iter()
                    .map(|o| decode_mask(&o.mask).map(|m| (o.object_id, m)))
                    .collect::<InferenceResult<FrameSegments>>()
            })
            .await??;
            Ok::<_, InferenceError>((index, segments))
        });

        Ok(frames.boxed())
    }

    async fn release(&self, session_id: &str) -> InferenceResult<()> {
        match self.client.delete(&format!("/video/sessions/{}", session_id)).await {
            Ok(()) => {
                debug!(session = %session_id, "Tracker session released");
                Ok(())
            }
            Err(e) => {
                warn!(session = %session_id, "Failed to release tracker session: {}", e);
                Err(e)
            }
        }
    }
}

struct LineReader<S> {
    inner: Pin<Box<S>>,
    buf: Vec<u8>,
    done: bool,
}

/// Split a chunked byte stream into non-blank newline-delimited records.
fn ndjson_lines<S, B, E>(chunks: S) -> impl Stream<Item = InferenceResult<Vec<u8>>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<InferenceError> + Send + 'static,
{
    let reader = LineReader {
        inner: Box::pin(chunks),
        buf: Vec::new(),
        done: false,
    };

    stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(pos) = reader.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = reader.buf.drain(..=pos).collect();
                if is_blank(&line) {
                    continue;
                }
                return Some((Ok(line), reader));
            }
            if reader.done {
                if is_blank(&reader.buf) {
                    return None;
                }
                let line = std::mem::take(&mut reader.buf);
                return Some((Ok(line), reader));
            }
            match reader.inner.next().await {
                Some(Ok(chunk)) => reader.buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    reader.done = true;
                    reader.buf.clear();
                    return Some((Err(e.into()), reader));
                }
                None => reader.done = true,
            }
        }
    })
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|b| b.is_ascii_whitespace())
}
