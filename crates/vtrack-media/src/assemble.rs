//! Frame sequence to video reassembly.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use vtrack_models::parse_frame_index;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Output frame rate when nothing else is configured.
pub const DEFAULT_OUTPUT_FPS: f64 = 30.0;

/// A written output video.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledVideo {
    pub path: PathBuf,
    /// Frames actually encoded after skipping unreadable ones
    pub frame_count: usize,
    pub width: u32,
    pub height: u32,
}

/// Reassembles ordered frames into a playable video.
#[async_trait]
pub trait VideoAssembler: Send + Sync {
    /// Encode `frames` to `output` at `fps`.
    ///
    /// Frames are ordered by the numeric index at the end of their file stem.
    async fn assemble(&self, frames: &[PathBuf], output: &Path, fps: f64) -> MediaResult<AssembledVideo>;
}

/// Output encoding settings. The frame rate is chosen per call.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    pub codec: String,
    pub pixel_format: String,
    pub crf: u8,
    /// Kill FFmpeg after this many seconds
    pub timeout_secs: Option<u64>,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            pixel_format: "yuv420p".to_string(),
            crf: 23,
            timeout_secs: None,
        }
    }
}

impl AssemblerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            codec: std::env::var("OUTPUT_CODEC").unwrap_or(defaults.codec),
            pixel_format: std::env::var("OUTPUT_PIX_FMT").unwrap_or(defaults.pixel_format),
            crf: std::env::var("OUTPUT_CRF")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.crf),
            timeout_secs: std::env::var("FFMPEG_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()),
        }
    }
}

/// FFmpeg-backed assembler streaming frames over `image2pipe`.
#[derive(Debug, Clone, Default)]
pub struct FfmpegVideoAssembler {
    config: AssemblerConfig,
}

impl FfmpegVideoAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Assemble every image in `dir`.
    pub async fn assemble_dir(&self, dir: &Path, output: &Path, fps: f64) -> MediaResult<AssembledVideo> {
        let frames = list_images(dir).await?;
        self.assemble(&frames, output, fps).await
    }

    fn build_command(&self, output: &Path, fps: f64) -> FfmpegCommand {
        FfmpegCommand::from_stdin(output)
            .input_args(["-f", "image2pipe"])
            .input_frame_rate(fps)
            .video_filter("pad=ceil(iw/2)*2:ceil(ih/2)*2")
            .video_codec(&self.config.codec)
            .pixel_format(&self.config.pixel_format)
            .crf(self.config.crf)
            .output_args(["-movflags", "+faststart"])
    }

    fn runner(&self) -> FfmpegRunner {
        match self.config.timeout_secs {
            Some(secs) => FfmpegRunner::new().with_timeout(secs),
            None => FfmpegRunner::new(),
        }
    }
}

#[async_trait]
impl VideoAssembler for FfmpegVideoAssembler {
    async fn assemble(&self, frames: &[PathBuf], output: &Path, fps: f64) -> MediaResult<AssembledVideo> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(MediaError::internal(format!("invalid output frame rate: {}", fps)));
        }
        let ordered = order_frames(frames);
        if ordered.is_empty() {
            return Err(MediaError::no_frames("No images found to assemble"));
        }

        let (valid, width, height) = tokio::task::spawn_blocking(move || validate_frames(ordered)).await??;

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let frame_count = valid.len();
        self.runner()
            .run_piped(&self.build_command(output, fps), valid, move |p| {
                debug!(frame = p.frame, percent = p.frame_percentage(frame_count as u64), "Encoding frames");
            })
            .await?;

        info!(frames = frame_count, fps, output = %output.display(), "Assembled video");
        Ok(AssembledVideo {
            path: output.to_path_buf(),
            frame_count,
            width,
            height,
        })
    }
}

/// Sort by trailing numeric index; paths without one are dropped.
pub fn order_frames(frames: &[PathBuf]) -> Vec<PathBuf> {
    let mut indexed: Vec<(u32, PathBuf)> = frames
        .iter()
        .filter_map(|p| {
            let index = p.file_stem().and_then(|s| s.to_str()).and_then(parse_frame_index);
            if index.is_none() {
                warn!(path = %p.display(), "Skipping frame without numeric index");
            }
            index.map(|i| (i, p.clone()))
        })
        .collect();
    indexed.sort_by_key(|(i, _)| *i);
    indexed.into_iter().map(|(_, p)| p).collect()
}

/// Drop unreadable frames and frames whose size differs from the first good one.
fn validate_frames(ordered: Vec<PathBuf>) -> MediaResult<(Vec<PathBuf>, u32, u32)> {
    let mut size: Option<(u32, u32)> = None;
    let mut valid = Vec::with_capacity(ordered.len());

    for path in ordered {
        match image::image_dimensions(&path) {
            Ok(dims) => match size {
                None => {
                    size = Some(dims);
                    valid.push(path);
                }
                Some(expected) if expected == dims => valid.push(path),
                Some(expected) => {
                    warn!(path = %path.display(), ?dims, ?expected, "Skipping frame with mismatched size");
                }
            },
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable frame"),
        }
    }

    match size {
        Some((w, h)) => Ok((valid, w, h)),
        None => Err(MediaError::no_frames("No valid frames could be loaded")),
    }
}

async fn list_images(dir: &Path) -> MediaResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| matches!(e.as_str(), "jpg" | "jpeg" | "png"));
        if is_image {
            out.push(path);
        }
    }
    Ok(out)
}
