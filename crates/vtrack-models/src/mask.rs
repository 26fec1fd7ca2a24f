//! Binary segmentation masks and the per-frame segment maps built from them.

use std::collections::BTreeMap;

use crate::error::{ModelError, ModelResult};
use crate::geometry::{BoundingBox, Point};

/// Tracking identity assigned at detection time, starting at 1.
pub type ObjectId = u32;

/// Pixel values above this are inside the mask (0.5 of full scale).
pub const MASK_THRESHOLD: u8 = 127;

/// Single-channel mask, row-major, one byte per pixel.
#[derive(Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Mask {
    /// An empty mask of the given size.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> ModelResult<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(ModelError::MaskSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    /// Build a binary mask from a per-pixel predicate.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        let mut mask = Self::empty(width, height);
        for y in 0..height {
            for x in 0..width {
                if f(x, y) {
                    mask.set(x, y, true);
                }
            }
        }
        mask
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn is_set(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.data[self.offset(x, y)] > MASK_THRESHOLD
    }

    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        if x < self.width && y < self.height {
            let i = self.offset(x, y);
            self.data[i] = if on { 255 } else { 0 };
        }
    }

    /// All set pixels in row-major order.
    pub fn set_points(&self) -> Vec<Point> {
        self.data
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > MASK_THRESHOLD)
            .map(|(i, _)| {
                let i = i as u32;
                Point::new(i % self.width, i / self.width)
            })
            .collect()
    }

    pub fn count_set(&self) -> usize {
        self.data.iter().filter(|v| **v > MASK_THRESHOLD).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count_set() == 0
    }

    /// Tight box around the set pixels, exclusive on the right and bottom.
    pub fn extent(&self) -> Option<BoundingBox> {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0;
        let mut max_y = 0;
        let mut any = false;

        for y in 0..self.height {
            for x in 0..self.width {
                if self.data[self.offset(x, y)] > MASK_THRESHOLD {
                    any = true;
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }
            }
        }

        any.then(|| BoundingBox::new(min_x as f32, min_y as f32, (max_x + 1) as f32, (max_y + 1) as f32))
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

impl std::fmt::Debug for Mask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mask")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("set", &self.count_set())
            .finish()
    }
}

/// Masks of the objects visible on one frame. Absence means "not visible".
pub type FrameSegments = BTreeMap<ObjectId, Mask>;

/// Propagation output: frame index to the objects visible on that frame.
pub type SegmentMap = BTreeMap<u32, FrameSegments>;
