//! Cross-crate tests for resonare
//!
//! The helpers below build test signals; the test modules exercise the full
//! pipeline from WAV files through effect chains and back.

use resonare_core::domain::audio::{PcmBuffer, Result};

#[cfg(test)]
mod pipeline_integration;
#[cfg(test)]
mod properties;

pub fn generate_sine_wave(frequency: f32, sample_rate: u32, duration_ms: f32) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * duration_ms / 1000.0) as usize;
    (0..num_samples)
        .map(|i| 2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32)
        .map(|phase| phase.sin())
        .collect()
}

pub fn generate_silence(num_samples: usize) -> Vec<f32> {
    vec![0.0; num_samples]
}

/// Stereo buffer: sine on the left, half-amplitude sine an octave up on the right
pub fn stereo_test_buffer(sample_rate: u32, duration_ms: f32) -> Result<PcmBuffer> {
    let left = generate_sine_wave(440.0, sample_rate, duration_ms)
        .into_iter()
        .map(|s| s * 0.6)
        .collect();
    let right = generate_sine_wave(880.0, sample_rate, duration_ms)
        .into_iter()
        .map(|s| s * 0.3)
        .collect();
    PcmBuffer::new(sample_rate, vec![left, right])
}

pub fn calc_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

pub fn calc_peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
}
