//! Decoded frame sequences.

use std::path::{Path, PathBuf};

use crate::error::{ModelError, ModelResult};

/// A decoded frame on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: u32,
    pub path: PathBuf,
}

/// Ordered frames indexed contiguously from 0.
#[derive(Debug, Clone, Default)]
pub struct FrameSequence {
    dir: PathBuf,
    frames: Vec<Frame>,
}

impl FrameSequence {
    /// Build from frames in any order. Fails unless indices are exactly 0..N-1.
    pub fn new(dir: impl Into<PathBuf>, mut frames: Vec<Frame>) -> ModelResult<Self> {
        frames.sort_by_key(|f| f.index);
        for (expected, frame) in frames.iter().enumerate() {
            if frame.index != expected as u32 {
                return Err(ModelError::NonContiguousFrames {
                    expected: expected as u32,
                    found: frame.index,
                });
            }
        }
        Ok(Self {
            dir: dir.into(),
            frames,
        })
    }

    /// Directory holding the frame files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The seed frame.
    pub fn first(&self) -> Option<&Frame> {
        self.frames.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }
}

/// Canonical frame file name for an index.
pub fn frame_file_name(index: u32) -> String {
    format!("{:05}.jpg", index)
}

/// Canonical annotated frame file name for an index.
pub fn annotated_frame_file_name(index: u32) -> String {
    format!("annotated_frame_{:05}.jpg", index)
}

/// Parse the trailing decimal index of a file stem, e.g. `annotated_frame_00012` -> 12.
pub fn parse_frame_index(stem: &str) -> Option<u32> {
    let digits_start = stem
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    stem[digits_start..].parse().ok()
}
