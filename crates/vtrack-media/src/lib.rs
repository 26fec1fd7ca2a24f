//! Frame-level media processing for the tracking pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a runner with progress parsing
//! - FFprobe metadata
//! - Frame extraction into a contiguous, numerically ordered sequence
//! - Annotation of tracked objects onto frames
//! - Reassembly of annotated frames into an output video

pub mod annotate;
pub mod assemble;
pub mod command;
pub mod error;
pub mod extract;
pub mod font;
pub mod probe;
pub mod progress;

pub use annotate::{color_for, AnnotationStyle, Annotator};
pub use assemble::{order_frames, AssembledVideo, AssemblerConfig, FfmpegVideoAssembler, VideoAssembler, DEFAULT_OUTPUT_FPS};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use extract::{scan_frames, ExtractorConfig, FfmpegFrameExtractor, FrameExtractor};
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
