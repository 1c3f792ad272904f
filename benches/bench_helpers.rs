//! Test signals for the benchmarks

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use resonare_core::domain::audio::{PcmBuffer, Result};
use std::f32::consts::PI;

/// Mix of 100 Hz, 1 kHz and 10 kHz at 0.3 each
pub fn generate_test_signal(frames: usize, sample_rate: u32) -> Vec<f32> {
    (0..frames)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * PI * 100.0 * t).sin() * 0.3
                + (2.0 * PI * 1000.0 * t).sin() * 0.3
                + (2.0 * PI * 10000.0 * t).sin() * 0.3
        })
        .collect()
}

/// Seeded white noise in [-1, 1)
pub fn generate_white_noise(frames: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..frames).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect()
}

/// Stereo buffer: test signal on the left, noise at -12 dB on the right
pub fn stereo_buffer(seconds: f32, sample_rate: u32) -> Result<PcmBuffer> {
    let frames = (seconds * sample_rate as f32) as usize;
    let left = generate_test_signal(frames, sample_rate);
    let right = generate_white_noise(frames, 7)
        .into_iter()
        .map(|s| s * 0.25)
        .collect();
    PcmBuffer::new(sample_rate, vec![left, right])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_test_signal() {
        let signal = generate_test_signal(512, 48000);
        assert_eq!(signal.len(), 512);
        assert!(signal.iter().all(|s| s.abs() <= 0.9 + 1e-6));
    }

    #[test]
    fn test_white_noise_is_seeded() {
        let a = generate_white_noise(256, 1);
        assert_eq!(a, generate_white_noise(256, 1));
        assert!(a.iter().all(|&s| (-1.0..1.0).contains(&s)));
    }

    #[test]
    fn test_stereo_buffer_shape() {
        let buffer = stereo_buffer(0.5, 48000).unwrap();
        assert_eq!(buffer.number_of_channels(), 2);
        assert_eq!(buffer.len(), 24000);
    }
}
