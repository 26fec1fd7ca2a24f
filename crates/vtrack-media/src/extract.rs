//! Video to frame sequence decoding.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use vtrack_models::{parse_frame_index, Frame, FrameSequence};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::probe_video;

/// Decodes a video into an ordered, contiguous frame sequence.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Write every frame of `video` into `output_dir` and return them in order.
    async fn extract(&self, video: &Path, output_dir: &Path) -> MediaResult<FrameSequence>;
}

/// Frame extraction settings.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// JPEG quality scale passed to `-q:v` (2 = best)
    pub jpeg_quality: u8,
    /// Keep every n-th frame; 1 keeps all
    pub stride: u32,
    /// Kill FFmpeg after this many seconds
    pub timeout_secs: Option<u64>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 2,
            stride: 1,
            timeout_secs: None,
        }
    }
}

impl ExtractorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            jpeg_quality: std::env::var("FRAME_JPEG_QUALITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.jpeg_quality),
            stride: std::env::var("FRAME_STRIDE")
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .filter(|s| *s > 0)
                .unwrap_or(defaults.stride),
            timeout_secs: std::env::var("FFMPEG_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()),
        }
    }
}

/// FFmpeg-backed extractor writing `{index:05}.jpg` from 0.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrameExtractor {
    config: ExtractorConfig,
}

impl FfmpegFrameExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    fn build_command(&self, video: &Path, output_dir: &Path) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(video, output_dir.join("%05d.jpg"))
            .output_args(["-an", "-vsync", "0"])
            .quality_scale(self.config.jpeg_quality)
            .output_args(["-start_number", "0"]);

        if self.config.stride > 1 {
            cmd = cmd.video_filter(format!("select='not(mod(n\\,{}))'", self.config.stride));
        }
        cmd
    }

    fn runner(&self) -> FfmpegRunner {
        match self.config.timeout_secs {
            Some(secs) => FfmpegRunner::new().with_timeout(secs),
            None => FfmpegRunner::new(),
        }
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract(&self, video: &Path, output_dir: &Path) -> MediaResult<FrameSequence> {
        let info = probe_video(video).await?;
        debug!(
            width = info.width,
            height = info.height,
            fps = info.fps,
            frames = ?info.frame_count,
            "Probed source video"
        );

        tokio::fs::create_dir_all(output_dir).await?;
        let total = info.frame_count.unwrap_or(0);
        self.runner()
            .run_with_progress(&self.build_command(video, output_dir), move |p| {
                debug!(frame = p.frame, percent = p.frame_percentage(total), "Decoding frames");
            })
            .await?;

        let frames = scan_frames(output_dir).await?;
        info!(frames = frames.len(), dir = %output_dir.display(), "Extracted frames");
        Ok(frames)
    }
}

/// Collect `{index}.jpg` files in `dir` into a contiguous sequence.
///
/// Files whose stem is not purely numeric are ignored.
pub async fn scan_frames(dir: &Path) -> MediaResult<FrameSequence> {
    let mut frames = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_jpeg = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
        if !is_jpeg {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if !stem.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if let Some(index) = parse_frame_index(stem) {
            frames.push(Frame { index, path });
        }
    }

    Ok(FrameSequence::new(dir, frames)?)
}
