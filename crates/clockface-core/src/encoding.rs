//! Wire encodings for descriptors and snapshots.
//!
//! A descriptor travels as base64 of its JSON array; a snapshot travels
//! as a `data:image/jpeg;base64,` URL.

use crate::types::{Descriptor, DescriptorError};
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use thiserror::Error;

const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("jpeg encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
    #[error("empty snapshot frame")]
    EmptyFrame,
}

/// Encode a descriptor as base64(JSON array of numbers).
pub fn encode_descriptor(descriptor: &Descriptor) -> Result<String, EncodingError> {
    let json = serde_json::to_string(descriptor.values())?;
    Ok(BASE64_STANDARD.encode(json.as_bytes()))
}

/// Inverse of [`encode_descriptor`]. Validates the decoded values.
pub fn decode_descriptor(encoded: &str) -> Result<Descriptor, EncodingError> {
    let bytes = BASE64_STANDARD.decode(encoded.trim())?;
    let values: Vec<f32> = serde_json::from_slice(&bytes)?;
    Ok(Descriptor::new(values)?)
}

/// Encode a still frame as a JPEG data URL.
pub fn encode_snapshot(frame: &RgbImage, quality: u8) -> Result<String, EncodingError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(EncodingError::EmptyFrame);
    }
    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
    encoder.encode_image(frame)?;

    let mut url = String::with_capacity(JPEG_DATA_URL_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
    url.push_str(JPEG_DATA_URL_PREFIX);
    BASE64_STANDARD.encode_string(&jpeg, &mut url);
    Ok(url)
}
