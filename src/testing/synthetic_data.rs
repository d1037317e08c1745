//! Synthetic frames and audio for offline testing
//!
//! Frames carry a gradient that shifts with the frame number, so consecutive
//! frames differ and crops of different regions are distinguishable.

use crate::types::VideoFrame;

/// Gradient RGB8 frame that changes every frame
pub fn synthetic_video_frame(frame_number: u64, width: u32, height: u32, device_id: &str) -> VideoFrame {
    let mut data = vec![0u8; (width as usize) * (height as usize) * 3];

    let base = (frame_number % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = ((y as usize) * (width as usize) + x as usize) * 3;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }

    VideoFrame::new(data, width, height, device_id)
}

/// Interleaved 440 Hz sine block, amplitude 0.3
pub fn synthetic_audio_samples(block: u64, samples_per_channel: usize, channels: u16, sample_rate: u32) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    let sample_rate = sample_rate.max(1) as f64;
    let frequency = 440.0;

    let mut samples = vec![0.0f32; samples_per_channel * channels];
    for i in 0..samples_per_channel {
        let t = (block as f64 * samples_per_channel as f64 + i as f64) / sample_rate;
        let value = (2.0 * std::f64::consts::PI * frequency * t).sin() as f32 * 0.3;
        for c in 0..channels {
            samples[i * channels + c] = value;
        }
    }
    samples
}
