//! Motion-JPEG fragment encoder
//!
//! Platform default encoder for backends without a hardware video codec. Each
//! video frame becomes one JPEG image; a fragment is the concatenation of the
//! images encoded since the previous flush. Audio is not muxed.

use super::{FragmentEncoder, RecorderOptions};
use crate::errors::CameraError;
use crate::imaging;
use crate::types::VideoFrame;
use bytes::{Bytes, BytesMut};

pub const MJPEG_MIME: &str = "video/x-motion-jpeg";

/// Map a bitrate target onto JPEG quality
fn quality_for(options: &RecorderOptions) -> u8 {
    let pixels_per_second = options.resolution.pixels().max(1) as f64 * options.frame_rate.max(1.0);
    let bits_per_pixel = options.video_bits_per_second as f64 / pixels_per_second;
    match bits_per_pixel {
        b if b >= 1.0 => 90,
        b if b >= 0.3 => 80,
        b if b >= 0.1 => 70,
        _ => 55,
    }
}

pub struct MjpegEncoder {
    quality: u8,
    pending: BytesMut,
    frames: u64,
}

impl MjpegEncoder {
    pub fn new(options: &RecorderOptions) -> Self {
        let quality = quality_for(options);
        log::debug!(
            "MJPEG encoder at {} ({} bps -> quality {})",
            options.resolution,
            options.video_bits_per_second,
            quality
        );
        Self {
            quality,
            pending: BytesMut::new(),
            frames: 0,
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames
    }
}

impl FragmentEncoder for MjpegEncoder {
    fn mime_type(&self) -> &str {
        MJPEG_MIME
    }

    fn push_video(&mut self, frame: &VideoFrame) -> Result<(), CameraError> {
        let jpeg = imaging::encode_jpeg(frame, self.quality)
            .map_err(|e| CameraError::RecordingFailed(format!("MJPEG encode failed: {}", e)))?;
        self.pending.extend_from_slice(&jpeg);
        self.frames += 1;
        Ok(())
    }

    fn push_audio(&mut self, _samples: &[f32]) -> Result<(), CameraError> {
        Ok(())
    }

    fn flush(&mut self) -> Result<Bytes, CameraError> {
        Ok(self.pending.split().freeze())
    }
}
