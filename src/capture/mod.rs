//! Capture session: still photos and video recording

pub mod codec;
pub mod recording;
pub mod snapshot;

pub use codec::{candidate_list, extension_for, negotiate, CODEC_CANDIDATES};
pub use recording::{CaptureSession, RecordingInfo, RecordingSource, RecordingStatus};
pub use snapshot::{capture_photo, PHOTO_MIME};
