//! Testing utilities for CineCraft
//!
//! A simulated media backend, an in-memory artifact store and synthetic frame
//! data, so the whole capture flow runs offline without camera hardware.

pub mod memory_store;
pub mod simulated;
pub mod synthetic_data;

pub use memory_store::MemoryStore;
pub use simulated::{
    recorded_audio_blocks, recorded_frames, SimEncoder, SimEvent, SimulatedBackend, SimulatedBackendBuilder,
    SIM_DEFAULT_MIME,
};
pub use synthetic_data::{synthetic_audio_samples, synthetic_video_frame};
