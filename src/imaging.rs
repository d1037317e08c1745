//! Frame pixel operations: crop, scale and JPEG encoding

use crate::errors::CameraError;
use crate::types::{Resolution, VideoFrame};
use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use std::io::Cursor;

/// View a frame's RGB8 buffer as an image
pub fn to_rgb_image(frame: &VideoFrame) -> Result<RgbImage, CameraError> {
    RgbImage::from_raw(frame.width, frame.height, frame.data.to_vec()).ok_or_else(|| {
        CameraError::CaptureUnavailable(format!(
            "frame buffer does not match {}x{} RGB (got {} bytes)",
            frame.width,
            frame.height,
            frame.data.len()
        ))
    })
}

/// Scale a frame to `target`, keeping the frame as-is when it already matches
pub fn resize_frame(frame: &VideoFrame, target: Resolution, filter: FilterType) -> Result<VideoFrame, CameraError> {
    if frame.resolution() == target {
        return Ok(frame.clone());
    }
    let img = to_rgb_image(frame)?;
    let resized = imageops::resize(&img, target.width, target.height, filter);
    Ok(VideoFrame::new(resized.into_raw(), target.width, target.height, frame.device_id.clone()).with_pts(frame.pts))
}

/// Centre region covering `1 / zoom` of each dimension
pub fn centre_crop_rect(source: Resolution, zoom: f64) -> (u32, u32, u32, u32) {
    if source.is_empty() {
        return (0, 0, source.width, source.height);
    }
    let zoom = if zoom.is_finite() && zoom >= 1.0 { zoom } else { 1.0 };
    let w = ((source.width as f64 / zoom).round() as u32).clamp(1, source.width.max(1));
    let h = ((source.height as f64 / zoom).round() as u32).clamp(1, source.height.max(1));
    let x = (source.width - w) / 2;
    let y = (source.height - h) / 2;
    (x, y, w, h)
}

/// Draw the centre-cropped `zoom` region of `frame` scaled onto a `surface` sized frame
pub fn crop_and_scale(frame: &VideoFrame, zoom: f64, surface: Resolution) -> Result<VideoFrame, CameraError> {
    if frame.resolution().is_empty() {
        return Err(CameraError::CaptureUnavailable("empty frame".to_string()));
    }
    let img = to_rgb_image(frame)?;
    let (x, y, w, h) = centre_crop_rect(frame.resolution(), zoom);
    let cropped = imageops::crop_imm(&img, x, y, w, h).to_image();
    let scaled = imageops::resize(&cropped, surface.width, surface.height, FilterType::Triangle);
    Ok(VideoFrame::new(scaled.into_raw(), surface.width, surface.height, frame.device_id.clone()).with_pts(frame.pts))
}

/// Encode a frame as JPEG
pub fn encode_jpeg(frame: &VideoFrame, quality: u8) -> Result<Bytes, CameraError> {
    let img = DynamicImage::ImageRgb8(to_rgb_image(frame)?);
    let mut buffer = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    img.write_with_encoder(encoder)?;
    Ok(Bytes::from(buffer))
}

/// Pixel size of an encoded image, read from its header
pub fn encoded_dimensions(data: &[u8]) -> Result<Resolution, CameraError> {
    let (width, height) = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| CameraError::CaptureUnavailable(format!("unreadable image: {}", e)))?
        .into_dimensions()?;
    Ok(Resolution::new(width, height))
}
