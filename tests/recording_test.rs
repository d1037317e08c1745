//! Capture session: photos, codec negotiation and fragment recording

use cinecraft::capture::{CaptureSession, RecordingSource, RecordingStatus};
use cinecraft::config::CineCraftConfig;
use cinecraft::errors::CameraError;
use cinecraft::stream::{AcquireTarget, StreamController};
use cinecraft::testing::{recorded_audio_blocks, recorded_frames, SimEvent, SimulatedBackend, SIM_DEFAULT_MIME};
use cinecraft::timing::PTSClock;
use cinecraft::types::{ArtifactKind, Resolution};
use std::sync::Arc;
use std::time::Duration;

async fn setup(sim: &SimulatedBackend) -> (StreamController, CaptureSession) {
    let config = CineCraftConfig::default();
    let stream = StreamController::new(Arc::new(sim.clone()), &config.camera);
    let capture = CaptureSession::new(Arc::new(sim.clone()), &config, stream.recording_latch(), PTSClock::new());
    stream.acquire(AcquireTarget::Default).await.unwrap();
    (stream, capture)
}

async fn stream_source(stream: &StreamController) -> RecordingSource {
    RecordingSource::Stream(stream.track().await.unwrap())
}

fn is_jpeg(data: &[u8]) -> bool {
    data.len() > 4 && data[0] == 0xFF && data[1] == 0xD8
}

#[tokio::test]
async fn test_photo_from_frame_grab() {
    let sim = SimulatedBackend::phone();
    let (stream, capture) = setup(&sim).await;

    let photo = capture.capture_photo(stream.track().await).await.unwrap();
    assert_eq!(photo.kind, ArtifactKind::Photo);
    assert_eq!(photo.mime_type, "image/jpeg");
    assert_eq!((photo.width, photo.height), (320, 240));
    assert!(is_jpeg(&photo.data));
}

#[tokio::test]
async fn test_photo_prefers_still_api() {
    let sim = SimulatedBackend::builder()
        .device("back:0", "Back Camera")
        .still_capture(true)
        .build();
    let (stream, capture) = setup(&sim).await;

    let photo = capture.capture_photo(stream.track().await).await.unwrap();
    assert!(is_jpeg(&photo.data));
}

#[tokio::test]
async fn test_still_photo_tagged_with_its_own_size() {
    let sim = SimulatedBackend::builder()
        .device("back:0", "Back Camera")
        .still_resolution(640, 480)
        .build();
    let (stream, capture) = setup(&sim).await;

    // The stream runs at 320x240; the still sensor does not
    let photo = capture.capture_photo(stream.track().await).await.unwrap();
    assert!(is_jpeg(&photo.data));
    assert_eq!((photo.width, photo.height), (640, 480));
}

#[tokio::test]
async fn test_photo_without_stream() {
    let sim = SimulatedBackend::phone();
    let (stream, capture) = setup(&sim).await;
    stream.release().await.unwrap();

    let result = capture.capture_photo(stream.track().await).await;
    assert!(matches!(result, Err(CameraError::CaptureUnavailable(_))));
}

#[tokio::test]
async fn test_negotiates_first_supported_candidate() {
    let sim = SimulatedBackend::phone();
    let (stream, capture) = setup(&sim).await;

    // The default preference (mp4/h264) is not recordable on this platform
    let info = capture.start_recording(stream_source(&stream).await).await.unwrap();
    assert_eq!(info.negotiated.as_deref(), Some("video/webm;codecs=vp9,opus"));
    assert_eq!(info.mime_type, "video/webm;codecs=vp9,opus");
    assert_eq!(info.resolution, Resolution::new(320, 240));

    let artifact = capture.stop_recording().await.unwrap();
    assert_eq!(artifact.extension(), "webm");
}

#[tokio::test]
async fn test_preferred_codec_wins_when_supported() {
    let sim = SimulatedBackend::phone();
    let (stream, capture) = setup(&sim).await;
    capture.set_preferred_codec(Some("video/webm;codecs=vp8".to_string()));

    let info = capture.start_recording(stream_source(&stream).await).await.unwrap();
    assert_eq!(info.negotiated.as_deref(), Some("video/webm;codecs=vp8"));
    capture.stop_recording().await.unwrap();
}

#[tokio::test]
async fn test_platform_default_when_nothing_matches() {
    let sim = SimulatedBackend::builder()
        .device("back:0", "Back Camera")
        .supported_mimes(&[])
        .build();
    let (stream, capture) = setup(&sim).await;

    let info = capture.start_recording(stream_source(&stream).await).await.unwrap();
    assert_eq!(info.negotiated, None);
    assert_eq!(info.mime_type, SIM_DEFAULT_MIME);
    capture.stop_recording().await.unwrap();
}

#[tokio::test]
async fn test_encoder_init_failure_retries_with_default() {
    let sim = SimulatedBackend::builder()
        .device("back:0", "Back Camera")
        .broken_encoder("video/webm;codecs=vp9,opus")
        .build();
    let (stream, capture) = setup(&sim).await;

    let info = capture.start_recording(stream_source(&stream).await).await.unwrap();
    assert_eq!(info.negotiated, None);
    assert_eq!(info.mime_type, SIM_DEFAULT_MIME);
    capture.stop_recording().await.unwrap();
}

#[tokio::test]
async fn test_encoder_failure_leaves_session_idle() {
    let sim = SimulatedBackend::builder()
        .device("back:0", "Back Camera")
        .audio_device("mic:0", "Built-in Mic")
        .broken_encoder("video/webm;codecs=vp9,opus")
        .broken_encoder(SIM_DEFAULT_MIME)
        .build();
    let (stream, capture) = setup(&sim).await;

    let result = capture.start_recording(stream_source(&stream).await).await;
    assert!(matches!(result, Err(CameraError::RecordingFailed(_))));
    assert_eq!(capture.recording_status(), RecordingStatus::Idle);

    // The microphone opened for the attempt is released and the stream can be torn down
    assert!(sim.events().iter().any(|e| matches!(e, SimEvent::AudioStopped { .. })));
    assert!(stream.release().await.unwrap());
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let sim = SimulatedBackend::phone();
    let (stream, capture) = setup(&sim).await;

    capture.start_recording(stream_source(&stream).await).await.unwrap();
    let second = capture.start_recording(stream_source(&stream).await).await;
    assert!(matches!(second, Err(CameraError::InvalidState(_))));
    assert!(capture.is_recording());
    capture.stop_recording().await.unwrap();
}

#[tokio::test]
async fn test_stop_without_recording() {
    let sim = SimulatedBackend::phone();
    let (_stream, capture) = setup(&sim).await;
    assert!(matches!(capture.stop_recording().await, Err(CameraError::NoActiveRecording)));
}

#[tokio::test]
async fn test_fragments_accumulate_then_concatenate_once() {
    let sim = SimulatedBackend::phone();
    let (stream, capture) = setup(&sim).await;
    let mut status = capture.subscribe_status();

    capture.start_recording(stream_source(&stream).await).await.unwrap();
    assert_eq!(*status.borrow_and_update(), RecordingStatus::Recording);

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert!(capture.buffered_fragments() >= 2, "timeslice fragments buffered");

    let artifact = capture.stop_recording().await.unwrap();
    assert_eq!(artifact.kind, ArtifactKind::Video);
    assert_eq!(capture.buffered_fragments(), 0);
    assert_eq!(capture.recording_status(), RecordingStatus::Idle);

    let frames = recorded_frames(&artifact.data);
    assert!(frames.len() >= 5);
    assert!(frames.iter().all(|f| *f == Resolution::new(320, 240)));
}

#[tokio::test]
async fn test_teardown_refused_while_recording() {
    let sim = SimulatedBackend::phone();
    let (stream, capture) = setup(&sim).await;
    capture.start_recording(stream_source(&stream).await).await.unwrap();

    assert!(matches!(stream.release().await, Err(CameraError::InvalidState(_))));
    assert!(stream.track().await.unwrap().is_live());

    capture.stop_recording().await.unwrap();
    assert!(stream.release().await.unwrap());
}

#[tokio::test]
async fn test_audio_recorded_with_microphone() {
    let sim = SimulatedBackend::phone();
    let (stream, capture) = setup(&sim).await;

    let info = capture.start_recording(stream_source(&stream).await).await.unwrap();
    assert!(info.has_audio);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let artifact = capture.stop_recording().await.unwrap();

    assert!(recorded_audio_blocks(&artifact.data) > 0);
    assert!(sim.events().iter().any(|e| matches!(e, SimEvent::AudioStopped { .. })));
}

#[tokio::test]
async fn test_video_only_when_microphone_disabled_or_missing() {
    let sim = SimulatedBackend::phone();
    let (stream, capture) = setup(&sim).await;
    capture.set_microphone_enabled(false);

    let info = capture.start_recording(stream_source(&stream).await).await.unwrap();
    assert!(!info.has_audio);
    capture.stop_recording().await.unwrap();

    let no_mic = SimulatedBackend::builder().device("back:0", "Back Camera").build();
    let (stream, capture) = setup(&no_mic).await;
    let info = capture.start_recording(stream_source(&stream).await).await.unwrap();
    assert!(!info.has_audio);
    capture.stop_recording().await.unwrap();
}

#[tokio::test]
async fn test_recorder_failure_returns_to_idle() {
    let sim = SimulatedBackend::phone();
    let (stream, capture) = setup(&sim).await;
    let mut status = capture.subscribe_status();
    capture.start_recording(stream_source(&stream).await).await.unwrap();

    sim.unplug("back:0");
    tokio::time::timeout(Duration::from_secs(2), status.wait_for(|s| *s == RecordingStatus::Idle))
        .await
        .expect("recorder noticed the lost camera")
        .unwrap();

    assert!(matches!(capture.stop_recording().await, Err(CameraError::RecordingFailed(_))));
    assert_eq!(capture.buffered_fragments(), 0);
    // Nothing holds the recording latch any more
    assert!(stream.release().await.unwrap());
}

#[tokio::test]
async fn test_abandon_while_starting_cancels_the_start() {
    let sim = SimulatedBackend::builder()
        .device("back:0", "Back Camera")
        .audio_device("mic:0", "Built-in Mic")
        .audio_latency(Duration::from_millis(150))
        .build();
    let (stream, capture) = setup(&sim).await;
    let source = stream_source(&stream).await;
    let mut status = capture.subscribe_status();

    // Abandon lands while the start is still waiting for the microphone
    let (started, abandoned) = tokio::join!(capture.start_recording(source), async {
        status.wait_for(|s| *s == RecordingStatus::Starting).await.unwrap();
        capture.abandon_recording()
    });

    assert!(abandoned);
    assert!(matches!(started, Err(CameraError::InvalidState(_))));
    assert_eq!(capture.recording_status(), RecordingStatus::Idle);
    assert!(capture.current_recording().is_none());
    assert!(sim.events().iter().any(|e| matches!(e, SimEvent::AudioStopped { .. })));
    assert!(!sim.events().iter().any(|e| matches!(e, SimEvent::EncoderCreated { .. })));

    // Nothing is left holding the stream or the session
    assert!(stream.release().await.is_ok());
    assert!(matches!(capture.stop_recording().await, Err(CameraError::NoActiveRecording)));
}
