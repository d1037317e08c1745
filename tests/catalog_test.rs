//! Device catalog against the simulated backend

use cinecraft::catalog::{DeviceCatalog, UNKNOWN_CAMERA_LABEL};
use cinecraft::errors::CameraError;
use cinecraft::permissions::PermissionStatus;
use cinecraft::testing::{SimEvent, SimulatedBackend};
use cinecraft::types::{AudioKind, FacingMode, LensRole, RawDeviceInfo};
use std::sync::Arc;

fn catalog(sim: &SimulatedBackend) -> DeviceCatalog {
    DeviceCatalog::new(Arc::new(sim.clone()), FacingMode::Environment)
}

#[tokio::test]
async fn test_enumerate_unlocks_labels_with_throwaway_stream() {
    let sim = SimulatedBackend::phone();
    let catalog = catalog(&sim);

    let devices = catalog.enumerate().await.unwrap();

    let roles: Vec<_> = devices.iter().map(|d| (d.id.as_str(), d.role)).collect();
    assert_eq!(
        roles,
        vec![
            ("back:0", LensRole::Main),
            ("back:2", LensRole::Ultrawide),
            ("back:3", LensRole::Telephoto),
        ]
    );
    assert_eq!(devices[0].display_label, "Back Camera");

    // The throwaway stream was opened and released
    let events = sim.events();
    assert!(matches!(events.first(), Some(SimEvent::VideoOpened { .. })));
    assert!(matches!(events.last(), Some(SimEvent::VideoStopped { .. })));
    assert_eq!(sim.live_video_tracks(), 0);
}

#[tokio::test]
async fn test_enumerate_skips_unlock_when_granted() {
    let sim = SimulatedBackend::builder()
        .device("back:0", "Back Camera")
        .permission(PermissionStatus::Granted)
        .build();
    let devices = catalog(&sim).enumerate().await.unwrap();

    assert_eq!(devices.len(), 1);
    assert!(sim.opened_cameras().is_empty());
}

#[tokio::test]
async fn test_enumerate_denied() {
    let sim = SimulatedBackend::phone();
    sim.set_permission(PermissionStatus::Denied);

    let result = catalog(&sim).enumerate().await;
    assert!(matches!(result, Err(CameraError::PermissionDenied(_))));
    assert!(sim.opened_cameras().is_empty());
}

#[tokio::test]
async fn test_failed_unlock_falls_back_to_positions() {
    let sim = SimulatedBackend::phone();
    sim.set_video_error(Some(CameraError::Backend("camera service crashed".to_string())));

    let devices = catalog(&sim).enumerate().await.unwrap();

    // Labels stay hidden, so nothing is filtered as front-facing
    assert_eq!(devices.len(), 4);
    assert!(devices.iter().all(|d| d.display_label == UNKNOWN_CAMERA_LABEL));
    let roles: Vec<_> = devices.iter().map(|d| d.role).collect();
    assert_eq!(
        roles,
        vec![LensRole::Main, LensRole::Ultrawide, LensRole::Telephoto, LensRole::Telephoto]
    );
}

#[tokio::test]
async fn test_refresh_sees_plugged_devices() {
    let sim = SimulatedBackend::phone();
    let catalog = catalog(&sim);
    catalog.enumerate().await.unwrap();

    sim.plug(RawDeviceInfo::video("back:4", "Back Macro Camera"));
    let devices = catalog.refresh().await.unwrap();
    assert_eq!(devices.len(), 4);
    assert_eq!(catalog.device("back:4").await.map(|d| d.role), Some(LensRole::Ultrawide));

    // First match wins for a role
    assert_eq!(
        catalog.find_role(LensRole::Ultrawide).await.map(|d| d.id),
        Some("back:2".to_string())
    );
}

#[tokio::test]
async fn test_audio_enumeration_prefers_usb() {
    let sim = SimulatedBackend::phone();
    sim.plug(RawDeviceInfo::audio("usb:1", "USB-C Microphone").with_audio_format(1, 44_100));
    let catalog = catalog(&sim);
    catalog.enumerate().await.unwrap();

    let mics = catalog.enumerate_audio().await.unwrap();
    assert_eq!(mics.len(), 2);
    assert_eq!(mics[0].kind, AudioKind::Builtin);

    let preferred = catalog.preferred_audio_device().await.unwrap();
    assert_eq!(preferred.id, "usb:1");
    assert_eq!(preferred.kind, AudioKind::Usb);
    assert_eq!(preferred.sample_rate, 44_100);
}
