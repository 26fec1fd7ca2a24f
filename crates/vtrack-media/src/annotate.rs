//! Rendering of tracked objects onto frames.

use std::collections::BTreeMap;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb, RgbImage};

use vtrack_models::{FrameSegments, Mask, ObjectId};

use crate::error::{MediaError, MediaResult};
use crate::font;

/// Colours assigned to object ids in rotation.
const PALETTE: [[u8; 3]; 10] = [
    [230, 25, 75],
    [60, 180, 75],
    [255, 225, 25],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
    [70, 240, 240],
    [240, 50, 230],
    [210, 245, 60],
    [0, 128, 128],
];

/// Stable colour for an object id.
pub fn color_for(object_id: ObjectId) -> Rgb<u8> {
    let i = (object_id.saturating_sub(1) as usize) % PALETTE.len();
    Rgb(PALETTE[i])
}

/// Visual parameters for annotations.
#[derive(Debug, Clone)]
pub struct AnnotationStyle {
    /// Mask overlay opacity in [0, 1]
    pub mask_alpha: f32,
    /// Rectangle stroke width in pixels
    pub box_thickness: u32,
    /// Glyph scale factor
    pub text_scale: u32,
    /// Padding around label text
    pub label_padding: u32,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            mask_alpha: 0.45,
            box_thickness: 2,
            text_scale: 2,
            label_padding: 3,
        }
    }
}

/// Draws mask overlays, boxes and labels for every object on a frame.
#[derive(Debug, Clone, Default)]
pub struct Annotator {
    style: AnnotationStyle,
}

impl Annotator {
    pub fn new(style: AnnotationStyle) -> Self {
        Self { style }
    }

    /// Render `segments` onto a copy of `frame` in ascending object id order.
    ///
    /// Labels missing from `labels` render as `object_{id}`.
    pub fn annotate(&self, frame: &RgbImage, segments: &FrameSegments, labels: &BTreeMap<ObjectId, String>) -> RgbImage {
        let mut out = frame.clone();

        for (&object_id, mask) in segments {
            let color = color_for(object_id);
            let fitted;
            let mask = if mask.width() == out.width() && mask.height() == out.height() {
                mask
            } else {
                fitted = fit_mask(mask, out.width(), out.height());
                &fitted
            };

            let Some(extent) = mask.extent() else {
                continue;
            };

            self.overlay_mask(&mut out, mask, color);
            let (x1, y1) = (extent.x1 as u32, extent.y1 as u32);
            let (x2, y2) = (extent.x2 as u32 - 1, extent.y2 as u32 - 1);
            self.draw_rect(&mut out, x1, y1, x2, y2, color);

            let label = labels
                .get(&object_id)
                .cloned()
                .unwrap_or_else(|| format!("object_{}", object_id));
            self.draw_label(&mut out, x1, y1, &label, color);
        }

        out
    }

    /// Read `input`, annotate it and write the result to `output`.
    ///
    /// Blocking; call from `spawn_blocking`.
    pub fn annotate_file(
        &self,
        input: &Path,
        output: &Path,
        segments: &FrameSegments,
        labels: &BTreeMap<ObjectId, String>,
    ) -> MediaResult<()> {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
        let frame = image::open(input)?.to_rgb8();
        let annotated = self.annotate(&frame, segments, labels);
        annotated.save(output)?;
        Ok(())
    }

    fn overlay_mask(&self, img: &mut RgbImage, mask: &Mask, color: Rgb<u8>) {
        let a = self.style.mask_alpha.clamp(0.0, 1.0);
        for p in mask.set_points() {
            let px = img.get_pixel_mut(p.x, p.y);
            for c in 0..3 {
                px.0[c] = (px.0[c] as f32 * (1.0 - a) + color.0[c] as f32 * a).round() as u8;
            }
        }
    }

    fn draw_rect(&self, img: &mut RgbImage, x1: u32, y1: u32, x2: u32, y2: u32, color: Rgb<u8>) {
        let max_x = img.width() - 1;
        let max_y = img.height() - 1;
        for t in 0..self.style.box_thickness {
            let (left, top) = (x1 + t, y1 + t);
            let (right, bottom) = (x2.saturating_sub(t), y2.saturating_sub(t));
            if left > right || top > bottom {
                break;
            }
            for x in left..=right.min(max_x) {
                img.put_pixel(x, top.min(max_y), color);
                img.put_pixel(x, bottom.min(max_y), color);
            }
            for y in top..=bottom.min(max_y) {
                img.put_pixel(left.min(max_x), y, color);
                img.put_pixel(right.min(max_x), y, color);
            }
        }
    }

    /// Filled banner above the box, or inside its top edge when there is no room.
    fn draw_label(&self, img: &mut RgbImage, x: u32, box_top: u32, text: &str, color: Rgb<u8>) {
        let scale = self.style.text_scale.max(1);
        let pad = self.style.label_padding;
        let banner_w = font::text_width(text, scale) + 2 * pad;
        let banner_h = font::text_height(scale) + 2 * pad;
        let top = if box_top >= banner_h { box_top - banner_h } else { box_top };

        let right = (x + banner_w).min(img.width());
        let bottom = (top + banner_h).min(img.height());
        for py in top..bottom {
            for px in x..right {
                img.put_pixel(px, py, color);
            }
        }

        font::draw_text(img, (x + pad) as i64, (top + pad) as i64, text, scale, text_color(color));
    }
}

/// Black on light colours, white on dark ones.
fn text_color(background: Rgb<u8>) -> Rgb<u8> {
    let [r, g, b] = background.0;
    let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    if luma > 150.0 {
        Rgb([0, 0, 0])
    } else {
        Rgb([255, 255, 255])
    }
}

/// Nearest-neighbour resize of a mask to the frame size.
fn fit_mask(mask: &Mask, width: u32, height: u32) -> Mask {
    let gray = GrayImage::from_raw(mask.width(), mask.height(), mask.as_raw().to_vec());
    match gray {
        Some(gray) => {
            let resized = imageops::resize(&gray, width, height, FilterType::Nearest);
            Mask::from_raw(width, height, resized.into_raw()).unwrap_or_else(|_| Mask::empty(width, height))
        }
        None => Mask::empty(width, height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([100, 100, 100]))
    }

    fn square(w: u32, h: u32, x0: u32, y0: u32, size: u32) -> Mask {
        Mask::from_fn(w, h, |x, y| x >= x0 && x < x0 + size && y >= y0 && y < y0 + size)
    }

    #[test]
    fn test_empty_segments_leave_frame_unchanged() {
        let frame = gray_frame(64, 48);
        let out = Annotator::default().annotate(&frame, &FrameSegments::new(), &BTreeMap::new());
        assert_eq!(out, frame);
    }

    #[test]
    fn test_present_object_is_drawn() {
        let frame = gray_frame(100, 100);
        let mut segments = FrameSegments::new();
        segments.insert(1, square(100, 100, 40, 40, 20));
        let labels = BTreeMap::from([(1, "car".to_string())]);

        let out = Annotator::default().annotate(&frame, &segments, &labels);

        // Box corner takes the object colour.
        assert_eq!(*out.get_pixel(40, 40), color_for(1));
        // Interior is blended, not untouched.
        assert_ne!(*out.get_pixel(50, 50), Rgb([100, 100, 100]));
        // Far corner untouched.
        assert_eq!(*out.get_pixel(99, 99), Rgb([100, 100, 100]));
    }

    #[test]
    fn test_empty_mask_contributes_nothing() {
        let frame = gray_frame(32, 32);
        let mut segments = FrameSegments::new();
        segments.insert(3, Mask::empty(32, 32));
        let out = Annotator::default().annotate(&frame, &segments, &BTreeMap::new());
        assert_eq!(out, frame);
    }

    #[test]
    fn test_overlap_renders_higher_id_last() {
        let frame = gray_frame(80, 80);
        let style = AnnotationStyle {
            mask_alpha: 1.0,
            ..Default::default()
        };
        let mut segments = FrameSegments::new();
        segments.insert(2, square(80, 80, 30, 30, 30));
        segments.insert(1, square(80, 80, 30, 30, 30));

        let out = Annotator::new(style.clone()).annotate(&frame, &segments, &BTreeMap::new());
        assert_eq!(*out.get_pixel(45, 45), color_for(2));

        let again = Annotator::new(style).annotate(&frame, &segments, &BTreeMap::new());
        assert_eq!(out, again);
    }

    #[test]
    fn test_mask_is_fitted_to_frame_size() {
        let frame = gray_frame(80, 80);
        let mut segments = FrameSegments::new();
        segments.insert(1, square(20, 20, 5, 5, 10));
        let style = AnnotationStyle {
            mask_alpha: 1.0,
            ..Default::default()
        };
        let out = Annotator::new(style).annotate(&frame, &segments, &BTreeMap::new());
        // Scaled mask covers 20..40 on each axis.
        assert_eq!(*out.get_pixel(30, 30), color_for(1));
        assert_eq!(*out.get_pixel(50, 50), Rgb([100, 100, 100]));
    }

    #[test]
    fn test_palette_is_stable() {
        assert_eq!(color_for(1), color_for(11));
        assert_ne!(color_for(1), color_for(2));
        assert_eq!(text_color(Rgb([255, 225, 25])), Rgb([0, 0, 0]));
        assert_eq!(text_color(Rgb([0, 0, 0])), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_annotate_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("00000.jpg");
        let output = dir.path().join("annotated_frame_00000.jpg");
        gray_frame(32, 24).save(&input).unwrap();

        let mut segments = FrameSegments::new();
        segments.insert(1, square(32, 24, 4, 4, 8));
        Annotator::default()
            .annotate_file(&input, &output, &segments, &BTreeMap::new())
            .unwrap();

        assert_eq!(image::image_dimensions(&output).unwrap(), (32, 24));
    }
}
