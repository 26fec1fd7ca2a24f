//! Mask wire format: base64-encoded 8-bit grayscale PNG.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{GrayImage, ImageFormat};

use vtrack_models::Mask;

use crate::error::{InferenceError, InferenceResult};

pub fn encode_mask(mask: &Mask) -> InferenceResult<String> {
    let gray = GrayImage::from_raw(mask.width(), mask.height(), mask.as_raw().to_vec())
        .ok_or_else(|| InferenceError::Internal("mask buffer does not match its dimensions".to_string()))?;
    let mut png = Cursor::new(Vec::new());
    gray.write_to(&mut png, ImageFormat::Png)?;
    Ok(STANDARD.encode(png.into_inner()))
}

/// Decode a mask. Colour or alpha PNGs are reduced to luma.
pub fn decode_mask(encoded: &str) -> InferenceResult<Mask> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| InferenceError::mask_decode(format!("invalid base64: {}", e)))?;
    let img = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
        .map_err(|e| InferenceError::mask_decode(format!("invalid PNG: {}", e)))?;
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    Mask::from_raw(w, h, gray.into_raw()).map_err(|e| InferenceError::mask_decode(e.to_string()))
}
