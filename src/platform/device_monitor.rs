//! Device monitoring and hot-plug detection
//!
//! Polls the backend's device list and emits connect/disconnect events so the
//! catalog can be re-enumerated while the application runs.

use super::MediaBackend;
use crate::errors::CameraError;
use crate::types::RawDeviceInfo;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Device event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Connected(String),    // Device ID
    Disconnected(String), // Device ID
    Changed(String),      // Device ID (label or format changed)
}

impl DeviceEvent {
    pub fn device_id(&self) -> &str {
        match self {
            DeviceEvent::Connected(id) | DeviceEvent::Disconnected(id) | DeviceEvent::Changed(id) => id,
        }
    }
}

/// Device monitor for detecting camera and microphone changes
pub struct DeviceMonitor {
    backend: Arc<dyn MediaBackend>,
    poll_interval: Duration,
    active_devices: Arc<RwLock<HashMap<String, RawDeviceInfo>>>,
    event_sender: mpsc::UnboundedSender<DeviceEvent>,
    event_receiver: Mutex<mpsc::UnboundedReceiver<DeviceEvent>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceMonitor {
    /// Create a new device monitor
    pub fn new(backend: Arc<dyn MediaBackend>, poll_interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            backend,
            poll_interval: poll_interval.max(Duration::from_millis(10)),
            active_devices: Arc::new(RwLock::new(HashMap::new())),
            event_sender: tx,
            event_receiver: Mutex::new(rx),
            poll_task: Mutex::new(None),
        }
    }

    /// Start monitoring for device changes
    pub async fn start_monitoring(&self) -> Result<(), CameraError> {
        let mut task = self.poll_task.lock().await;
        if task.is_some() {
            return Ok(());
        }

        log::info!(
            "Starting device monitoring on {} backend (every {:?})",
            self.backend.name(),
            self.poll_interval
        );

        // Initial scan establishes the baseline without emitting events
        let backend = self.backend.clone();
        let initial = super::blocking(move || backend.list_devices()).await?;
        {
            let mut active = self.active_devices.write().await;
            *active = initial.into_iter().map(|d| (d.id.clone(), d)).collect();
        }

        let backend = self.backend.clone();
        let active_devices = self.active_devices.clone();
        let event_sender = self.event_sender.clone();
        let period = self.poll_interval;

        *task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;

                let backend = backend.clone();
                match super::blocking(move || backend.list_devices()).await {
                    Ok(devices) => {
                        let mut active = active_devices.write().await;
                        for event in diff_devices(&active, &devices) {
                            log::info!("Device event: {:?}", event);
                            if event_sender.send(event).is_err() {
                                return;
                            }
                        }
                        *active = devices.into_iter().map(|d| (d.id.clone(), d)).collect();
                    }
                    Err(e) => log::debug!("Device scan failed: {}", e),
                }
            }
        }));

        Ok(())
    }

    /// Stop monitoring for device changes
    pub async fn stop_monitoring(&self) {
        if let Some(task) = self.poll_task.lock().await.take() {
            log::info!("Stopping device monitoring");
            task.abort();
        }
    }

    pub async fn is_monitoring(&self) -> bool {
        self.poll_task.lock().await.is_some()
    }

    /// Inject an event from a platform push notification
    pub fn notify_change(&self, event: DeviceEvent) {
        log::debug!("Device change notified: {:?}", event);
        let _ = self.event_sender.send(event);
    }

    /// Get next device event (non-blocking)
    pub async fn poll_event(&self) -> Option<DeviceEvent> {
        let mut rx = self.event_receiver.lock().await;
        rx.try_recv().ok()
    }

    /// Wait for next device event
    pub async fn wait_for_event(&self) -> Option<DeviceEvent> {
        let mut rx = self.event_receiver.lock().await;
        rx.recv().await
    }

    /// Get list of currently known devices
    pub async fn get_active_devices(&self) -> Vec<RawDeviceInfo> {
        let devices = self.active_devices.read().await;
        let mut list: Vec<RawDeviceInfo> = devices.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }
}

impl Drop for DeviceMonitor {
    fn drop(&mut self) {
        if let Ok(mut task) = self.poll_task.try_lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}

/// Events turning `old` into `new`: disconnections first, then connections
/// and changes in listing order
pub fn diff_devices(old: &HashMap<String, RawDeviceInfo>, new: &[RawDeviceInfo]) -> Vec<DeviceEvent> {
    let mut events = Vec::new();

    let mut gone: Vec<&String> = old
        .keys()
        .filter(|id| !new.iter().any(|d| &d.id == *id))
        .collect();
    gone.sort();
    events.extend(gone.into_iter().map(|id| DeviceEvent::Disconnected(id.clone())));

    for device in new {
        match old.get(&device.id) {
            None => events.push(DeviceEvent::Connected(device.id.clone())),
            Some(previous) if previous != device => events.push(DeviceEvent::Changed(device.id.clone())),
            Some(_) => {}
        }
    }

    events
}
