//! Still photo capture

use crate::errors::CameraError;
use crate::imaging;
use crate::platform::{self, VideoTrack};
use crate::types::{Artifact, ArtifactKind, Resolution};
use image::imageops::FilterType;
use std::sync::Arc;

pub const PHOTO_MIME: &str = "image/jpeg";

/// Capture a still from `track`
///
/// Uses the platform's high-quality still API when it has one, tagged with the
/// size of the image it returned. Otherwise the
/// current frame is scaled to the track resolution (`fallback` when the track
/// reports none) and encoded as JPEG.
pub async fn capture_photo(
    track: Arc<dyn VideoTrack>,
    fallback: Resolution,
    jpeg_quality: u8,
) -> Result<Artifact, CameraError> {
    if !track.is_live() {
        return Err(CameraError::CaptureUnavailable("camera track has ended".to_string()));
    }

    let settings = track.settings();
    let target = if settings.resolution.is_empty() {
        fallback
    } else {
        settings.resolution
    };

    let still = track.clone();
    match platform::blocking(move || still.take_photo()).await {
        Ok(Some(data)) if !data.is_empty() => {
            // Still sensors often differ from the stream resolution
            let resolution = imaging::encoded_dimensions(&data).unwrap_or_else(|e| {
                log::debug!("Still photo size unreadable, assuming {}: {}", target, e);
                target
            });
            log::info!("Photo captured with the still API at {} ({} bytes)", resolution, data.len());
            return Ok(Artifact::new(ArtifactKind::Photo, PHOTO_MIME, data, resolution));
        }
        Ok(_) => log::debug!("No still API on this track, grabbing a frame"),
        Err(e) => log::warn!("Still capture failed, falling back to frame grab: {}", e),
    }

    let data = platform::blocking(move || {
        let frame = track.grab_frame()?;
        let scaled = imaging::resize_frame(&frame, target, FilterType::Triangle)?;
        imaging::encode_jpeg(&scaled, jpeg_quality)
    })
    .await?;

    log::info!("Photo captured from frame at {} ({} bytes)", target, data.len());
    Ok(Artifact::new(ArtifactKind::Photo, PHOTO_MIME, data, target))
}
