//! Native desktop backend built on nokhwa (and cpal with the `audio` feature)
//!
//! Desktop webcams expose neither hardware zoom nor a torch, so zoom always
//! degrades to the software path and torch requests are rejected. Recording
//! uses the built-in motion-JPEG encoder.

use super::mjpeg::{MjpegEncoder, MJPEG_MIME};
use super::{
    AudioConstraints, AudioTrack, FragmentEncoder, MediaBackend, RecorderOptions, TrackCapabilities, TrackSettings,
    VideoConstraints, VideoTrack,
};
use crate::errors::CameraError;
use crate::permissions::{self, PermissionStatus};
use crate::timing::PTSClock;
use crate::types::{RawDeviceInfo, Resolution, VideoFrame};
use bytes::Bytes;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType};
use nokhwa::{query, CallbackCamera};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Backend for locally attached webcams
pub struct NativeBackend {
    clock: PTSClock,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self { clock: PTSClock::new() }
    }

    fn list_cameras() -> Result<Vec<RawDeviceInfo>, CameraError> {
        let cameras = query(ApiBackend::Auto)
            .map_err(|e| CameraError::Backend(format!("Failed to query cameras: {}", e)))?;

        Ok(cameras
            .into_iter()
            .map(|info| RawDeviceInfo::video(info.index().to_string(), info.human_name()))
            .collect())
    }

    fn requested_format(constraints: &VideoConstraints) -> RequestedFormat<'static> {
        match constraints.ideal_resolution {
            Some(res) => {
                let fps = constraints.ideal_frame_rate.unwrap_or(30.0).round().max(1.0) as u32;
                let format = CameraFormat::new(
                    nokhwa::utils::Resolution::new(res.width, res.height),
                    FrameFormat::MJPEG,
                    fps,
                );
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format))
            }
            None => RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        }
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaBackend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn permission_status(&self) -> PermissionStatus {
        permissions::check_permission_detailed().status
    }

    fn list_devices(&self) -> Result<Vec<RawDeviceInfo>, CameraError> {
        #[allow(unused_mut)]
        let mut devices = Self::list_cameras()?;
        #[cfg(feature = "audio")]
        devices.extend(audio::list_inputs()?);
        Ok(devices)
    }

    fn request_video(&self, constraints: &VideoConstraints) -> Result<Arc<dyn VideoTrack>, CameraError> {
        let index = match &constraints.device_id {
            Some(id) => id
                .parse::<u32>()
                .map_err(|_| CameraError::DeviceNotFound(format!("not a native camera index: {}", id)))?,
            None => {
                let first = Self::list_cameras()?
                    .into_iter()
                    .next()
                    .ok_or_else(|| CameraError::DeviceNotFound("no camera attached".to_string()))?;
                first
                    .id
                    .parse::<u32>()
                    .map_err(|_| CameraError::DeviceNotFound(first.id.clone()))?
            }
        };

        log::debug!("Opening native camera {} with {}", index, constraints);
        let mut camera = CallbackCamera::new(CameraIndex::Index(index), Self::requested_format(constraints), |_| {})
            .map_err(|e| map_open_error(index, e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| map_open_error(index, e.to_string()))?;

        Ok(Arc::new(NativeVideoTrack {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: index.to_string(),
            camera: Mutex::new(camera),
            live: AtomicBool::new(true),
            clock: self.clock.clone(),
        }))
    }

    fn request_audio(&self, constraints: &AudioConstraints) -> Result<Arc<dyn AudioTrack>, CameraError> {
        #[cfg(feature = "audio")]
        {
            audio::open(constraints)
        }
        #[cfg(not(feature = "audio"))]
        {
            let _ = constraints;
            Err(CameraError::Unsupported("built without microphone support".to_string()))
        }
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_type.starts_with(MJPEG_MIME)
    }

    fn create_encoder(&self, options: &RecorderOptions) -> Result<Box<dyn FragmentEncoder>, CameraError> {
        match options.mime_type.as_deref() {
            None => Ok(Box::new(MjpegEncoder::new(options))),
            Some(mime) if self.is_type_supported(mime) => Ok(Box::new(MjpegEncoder::new(options))),
            Some(mime) => Err(CameraError::Unsupported(format!("cannot record {}", mime))),
        }
    }
}

fn map_open_error(index: u32, message: String) -> CameraError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") {
        CameraError::PermissionDenied(message)
    } else if lower.contains("busy") || lower.contains("in use") {
        CameraError::DeviceBusy(format!("camera {}: {}", index, message))
    } else {
        CameraError::Backend(format!("camera {}: {}", index, message))
    }
}

struct NativeVideoTrack {
    id: String,
    device_id: String,
    camera: Mutex<CallbackCamera>,
    live: AtomicBool,
    clock: PTSClock,
}

impl VideoTrack for NativeVideoTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn settings(&self) -> TrackSettings {
        let (resolution, frame_rate) = match self.camera.lock() {
            Ok(camera) => {
                let res = camera
                    .resolution()
                    .map(|r| Resolution::new(r.width_x, r.height_y))
                    .unwrap_or(Resolution::new(0, 0));
                let fps = camera.frame_rate().map(|f| f as f64).unwrap_or(0.0);
                (res, fps)
            }
            Err(_) => (Resolution::new(0, 0), 0.0),
        };
        TrackSettings {
            device_id: self.device_id.clone(),
            resolution,
            frame_rate,
        }
    }

    fn capabilities(&self) -> TrackCapabilities {
        TrackCapabilities::default()
    }

    fn apply_zoom(&self, _level: f64) -> Result<(), CameraError> {
        Err(CameraError::ZoomUnsupported("native webcams have no hardware zoom".to_string()))
    }

    fn set_torch(&self, _enabled: bool) -> Result<(), CameraError> {
        Err(CameraError::Unsupported("torch not available on this camera".to_string()))
    }

    fn grab_frame(&self) -> Result<VideoFrame, CameraError> {
        if !self.is_live() {
            return Err(CameraError::CaptureUnavailable("track stopped".to_string()));
        }
        let mut camera = self
            .camera
            .lock()
            .map_err(|_| CameraError::CaptureUnavailable("Failed to lock camera".to_string()))?;

        let buffer = camera
            .poll_frame()
            .map_err(|e| CameraError::CaptureUnavailable(format!("Failed to capture frame: {}", e)))?;
        let width = buffer.resolution().width_x;
        let height = buffer.resolution().height_y;
        let rgb = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::CaptureUnavailable(format!("Failed to decode frame: {}", e)))?;

        Ok(VideoFrame::new(rgb.into_raw(), width, height, self.device_id.clone()).with_pts(self.clock.pts()))
    }

    fn take_photo(&self) -> Result<Option<Bytes>, CameraError> {
        Ok(None)
    }

    fn stop(&self) {
        if !self.live.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut camera) = self.camera.lock() {
            if let Err(e) = camera.stop_stream() {
                log::warn!("Failed to stop camera {}: {}", self.device_id, e);
            }
        }
        log::debug!("Native track {} stopped", self.id);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl Drop for NativeVideoTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(feature = "audio")]
mod audio {
    use super::*;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::thread::JoinHandle;
    use std::time::Duration;

    /// Maximum buffered callbacks before new audio is dropped
    const MAX_BUFFER_CHUNKS: usize = 256;

    fn device_id(index: usize, name: &str) -> String {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        format!("audio_{}_{:08x}", index, hasher.finish() & 0xFFFF_FFFF)
    }

    fn find_device(id: Option<&str>) -> Result<(String, cpal::Device), CameraError> {
        let host = cpal::default_host();
        match id {
            None => {
                let device = host
                    .default_input_device()
                    .ok_or_else(|| CameraError::DeviceNotFound("no default microphone".to_string()))?;
                Ok(("default".to_string(), device))
            }
            Some(wanted) => host
                .input_devices()
                .map_err(|e| CameraError::Backend(format!("Failed to enumerate audio devices: {}", e)))?
                .enumerate()
                .find(|(index, device)| {
                    device
                        .name()
                        .map(|name| device_id(*index, &name) == wanted)
                        .unwrap_or(false)
                })
                .map(|(_, device)| (wanted.to_string(), device))
                .ok_or_else(|| CameraError::DeviceNotFound(wanted.to_string())),
        }
    }

    pub(super) fn list_inputs() -> Result<Vec<RawDeviceInfo>, CameraError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| CameraError::Backend(format!("Failed to enumerate audio devices: {}", e)))?;

        Ok(devices
            .enumerate()
            .filter_map(|(index, device)| {
                let name = device.name().ok()?;
                let info = RawDeviceInfo::audio(device_id(index, &name), name);
                Some(match device.default_input_config() {
                    Ok(config) => info.with_audio_format(config.channels(), config.sample_rate().0),
                    Err(_) => info,
                })
            })
            .collect())
    }

    pub(super) fn open(constraints: &AudioConstraints) -> Result<Arc<dyn AudioTrack>, CameraError> {
        let (device_id, device) = find_device(constraints.device_id.as_deref())?;
        let config = cpal::StreamConfig {
            channels: constraints.channel_count,
            sample_rate: cpal::SampleRate(constraints.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (sender, receiver) = crossbeam_channel::bounded::<Vec<f32>>(MAX_BUFFER_CHUNKS);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), CameraError>>(1);
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();

        // cpal streams are not Send; the stream lives on its own thread
        let handle = std::thread::spawn(move || {
            let stream = device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = sender.try_send(data.to_vec());
                },
                |err| log::error!("Audio capture error: {}", err),
                None,
            );
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(CameraError::Backend(format!("Failed to build stream: {}", e))));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(CameraError::Backend(format!("Failed to start stream: {}", e))));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            while thread_running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(20));
            }
        });

        ready_rx
            .recv()
            .map_err(|_| CameraError::Backend("audio thread exited".to_string()))??;

        Ok(Arc::new(NativeAudioTrack {
            id: uuid::Uuid::new_v4().to_string(),
            device_id,
            sample_rate: constraints.sample_rate,
            channels: constraints.channel_count,
            receiver,
            running,
            handle: Mutex::new(Some(handle)),
        }))
    }

    struct NativeAudioTrack {
        id: String,
        device_id: String,
        sample_rate: u32,
        channels: u16,
        receiver: crossbeam_channel::Receiver<Vec<f32>>,
        running: Arc<AtomicBool>,
        handle: Mutex<Option<JoinHandle<()>>>,
    }

    impl AudioTrack for NativeAudioTrack {
        fn id(&self) -> &str {
            &self.id
        }

        fn device_id(&self) -> &str {
            &self.device_id
        }

        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn channels(&self) -> u16 {
            self.channels
        }

        fn read_samples(&self) -> Vec<f32> {
            self.receiver.try_iter().flatten().collect()
        }

        fn stop(&self) {
            self.running.store(false, Ordering::SeqCst);
            if let Ok(mut handle) = self.handle.lock() {
                if let Some(handle) = handle.take() {
                    let _ = handle.join();
                }
            }
        }

        fn is_live(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    impl Drop for NativeAudioTrack {
        fn drop(&mut self) {
            self.stop();
        }
    }
}
