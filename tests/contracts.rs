//! Contract tests: each scenario must exercise the invariants it covers

use cinecraft::capture::{CaptureSession, RecordingSource};
use cinecraft::catalog::DeviceCatalog;
use cinecraft::config::CineCraftConfig;
use cinecraft::invariant_ppt::*;
use cinecraft::stream::{AcquireTarget, StreamController, SwitchPolicy};
use cinecraft::testing::SimulatedBackend;
use cinecraft::timing::PTSClock;
use cinecraft::zoom::ZoomStrategy;
use std::sync::Arc;
use std::time::Duration;

fn setup(sim: &SimulatedBackend, config: &CineCraftConfig) -> (StreamController, CaptureSession) {
    let stream = StreamController::new(Arc::new(sim.clone()), &config.camera);
    let capture = CaptureSession::new(Arc::new(sim.clone()), config, stream.recording_latch(), PTSClock::new());
    (stream, capture)
}

#[tokio::test]
async fn contract_stream_lifecycle() {
    clear_invariant_log();
    let sim = SimulatedBackend::phone();
    let (stream, capture) = setup(&sim, &CineCraftConfig::default());

    stream.acquire(AcquireTarget::from("back:0")).await.unwrap();
    stream
        .switch_device("back:2", &capture, SwitchPolicy::Finalize)
        .await
        .unwrap();
    stream.release().await.unwrap();

    contract_test("stream lifecycle", &[SINGLE_ACTIVE_STREAM, NO_TEARDOWN_WHILE_RECORDING]);
}

#[tokio::test]
async fn contract_recording_flush() {
    clear_invariant_log();
    let sim = SimulatedBackend::phone();
    let (stream, capture) = setup(&sim, &CineCraftConfig::default());
    let session = stream.acquire(AcquireTarget::Default).await.unwrap();

    capture.start_recording(RecordingSource::Stream(session.track)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    capture.stop_recording().await.unwrap();

    contract_test("recording flush", &[FRAGMENTS_FLUSH_FROM_STOPPING, FRAGMENTS_FLUSHED_ONCE]);
}

#[tokio::test]
async fn contract_zoom_range() {
    clear_invariant_log();
    let mut config = CineCraftConfig::default();
    config.zoom.surface_resolution = [160, 90];
    let sim = SimulatedBackend::builder().device("back:0", "Back Camera").build();
    let (stream, capture) = setup(&sim, &config);
    let catalog = DeviceCatalog::new(Arc::new(sim.clone()), config.camera.facing);
    stream.acquire(AcquireTarget::Default).await.unwrap();

    let zoom = ZoomStrategy::new(config.zoom.clone(), PTSClock::new());
    for level in [0.0, 2.5, 42.0, 1.0] {
        zoom.apply_zoom(level, &stream, &catalog, &capture).await.unwrap();
    }
    zoom.reset().await;

    contract_test("zoom range", &[ZOOM_LEVEL_IN_RANGE]);
}
