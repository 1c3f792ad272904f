//! Visualization analysis
//!
//! Two read-only views of a buffer for display:
//! - [`Waveform`]: one representative sample of channel 0 per pixel column
//! - [`Spectrogram`]: 8-bit magnitude spectra over successive,
//!   non-overlapping windows, with the colour mapping a renderer paints
//!
//! Both are computed eagerly. A caller may draw them progressively, but the
//! analysis itself holds no state between calls.

use crate::domain::audio::{AudioError, PcmBuffer, Result};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// WAVEFORM
// ============================================================================

/// One sample of channel 0 per pixel column
///
/// Column `x` shows sample `x * step` with `step = ceil(len / width)`.
/// Skipped samples are not aggregated, so dense material aliases.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waveform {
    step: usize,
    samples: Vec<f32>,
}

impl Waveform {
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn width(&self) -> usize {
        self.samples.len()
    }

    /// Polyline vertices on a canvas of the given height: `(x, (1 + v) * h / 2)`
    pub fn points(&self, height: f32) -> Vec<(f32, f32)> {
        self.samples
            .iter()
            .enumerate()
            .map(|(x, v)| (x as f32, (1.0 + v) * height / 2.0))
            .collect()
    }
}

/// Downsample channel 0 of `buffer` to `width` values
///
/// Columns past the last sample (buffers shorter than `width`) read 0.
pub fn waveform(buffer: &PcmBuffer, width: usize) -> Result<Waveform> {
    if buffer.is_empty() {
        return Err(AudioError::EmptyInput);
    }
    if width == 0 {
        return Err(AudioError::InvalidParameter(
            "waveform width must be positive".to_string(),
        ));
    }
    let data = buffer.channel(0).ok_or(AudioError::EmptyInput)?;
    let step = data.len().div_ceil(width);
    let samples = (0..width)
        .map(|x| data.get(x * step).copied().unwrap_or(0.0))
        .collect();
    Ok(Waveform { step, samples })
}

// ============================================================================
// COLOUR
// ============================================================================

/// HSL colour, hue in degrees, saturation and lightness in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hsl {
    pub hue: f32,
    pub saturation: f32,
    pub lightness: f32,
}

impl Hsl {
    /// Blue (240) for silence through red (near 0) for full scale
    pub fn from_level(value: u8) -> Self {
        Self {
            hue: (1.0 - f32::from(value) / 256.0) * 240.0,
            saturation: 100.0,
            lightness: 50.0,
        }
    }

    pub fn to_rgb(self) -> [u8; 3] {
        let s = (self.saturation / 100.0).clamp(0.0, 1.0);
        let l = (self.lightness / 100.0).clamp(0.0, 1.0);
        let h = self.hue.rem_euclid(360.0) / 60.0;

        let chroma = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let x = chroma * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        let m = l - chroma / 2.0;
        let to_byte = |c: f32| ((c + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        [to_byte(r), to_byte(g), to_byte(b)]
    }
}

impl fmt::Display for Hsl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hsl({}, {}%, {}%)",
            self.hue, self.saturation, self.lightness
        )
    }
}

// ============================================================================
// SPECTROGRAM
// ============================================================================

/// Spectrum analysis parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Window length `N`; frames advance by `N` samples
    pub fft_size: usize,
    /// Level mapped to byte 0
    pub min_decibels: f32,
    /// Level mapped to byte 255
    pub max_decibels: f32,
    /// Exponential smoothing of magnitudes across frames, in [0, 1)
    pub smoothing: f32,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            min_decibels: -100.0,
            max_decibels: -30.0,
            smoothing: 0.8,
        }
    }
}

impl AnalysisSettings {
    pub fn validate(&self) -> Result<()> {
        if !(32..=32768).contains(&self.fft_size) || !self.fft_size.is_power_of_two() {
            return Err(AudioError::InvalidParameter(format!(
                "fft_size must be a power of two in [32, 32768], got {}",
                self.fft_size
            )));
        }
        if !(self.min_decibels < self.max_decibels) {
            return Err(AudioError::InvalidParameter(format!(
                "min_decibels ({}) must be below max_decibels ({})",
                self.min_decibels, self.max_decibels
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(AudioError::InvalidParameter(format!(
                "smoothing must be within [0, 1), got {}",
                self.smoothing
            )));
        }
        Ok(())
    }

    /// `N / 2`
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

/// One analysis window: `N / 2` levels from low to high frequency
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectrumFrame {
    pub index: usize,
    pub levels: Vec<u8>,
}

impl SpectrumFrame {
    pub fn colors(&self) -> impl Iterator<Item = Hsl> + '_ {
        self.levels.iter().map(|&v| Hsl::from_level(v))
    }
}

/// Rectangle a renderer fills
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Cell {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: Hsl,
}

/// Eagerly computed, time-ordered spectrum frames of channel 0
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spectrogram {
    sample_rate: u32,
    fft_size: usize,
    slice_width: f32,
    frames: Vec<SpectrumFrame>,
}

impl Spectrogram {
    pub fn frames(&self) -> &[SpectrumFrame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<SpectrumFrame> {
        self.frames
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Width of one frame's slice: `W / (len / N)`
    pub fn slice_width(&self) -> f32 {
        self.slice_width
    }

    /// Centre frequency of bin `k` in Hz
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.fft_size as f32
    }

    /// Cells of every frame on a canvas of the given height
    ///
    /// Frame `i` occupies `x = i * slice_width`; bin 0 sits at the bottom.
    pub fn cells(&self, height: f32) -> Vec<Cell> {
        let mut cells = Vec::with_capacity(self.frames.len() * self.fft_size / 2);
        for frame in &self.frames {
            let bins = frame.levels.len().max(1) as f32;
            let cell_height = height / bins;
            let x = frame.index as f32 * self.slice_width;
            for (bin, color) in frame.colors().enumerate() {
                cells.push(Cell {
                    x,
                    y: height - (bin + 1) as f32 * cell_height,
                    width: self.slice_width,
                    height: cell_height,
                    color,
                });
            }
        }
        cells
    }
}

/// Windowed FFT analyzer producing byte-scaled magnitude spectra
///
/// Magnitudes follow the usual analyser convention: Blackman window,
/// `|X[k]| / N`, optional smoothing against the previous frame, then dB
/// mapped linearly from `[min_decibels, max_decibels]` onto `[0, 255]`.
pub struct SpectrogramAnalyzer {
    settings: AnalysisSettings,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl SpectrogramAnalyzer {
    pub fn new(settings: AnalysisSettings) -> Result<Self> {
        settings.validate()?;
        let fft = FftPlanner::new().plan_fft_forward(settings.fft_size);
        let window = blackman_window(settings.fft_size);
        Ok(Self {
            settings,
            fft,
            window,
        })
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Analyze channel 0 of `buffer` for a canvas `width` pixels wide
    ///
    /// There are `ceil(len / N)` frames; the last one is zero-padded.
    pub fn analyze(&self, buffer: &PcmBuffer, width: f32) -> Result<Spectrogram> {
        if buffer.is_empty() {
            return Err(AudioError::EmptyInput);
        }
        if !width.is_finite() || width <= 0.0 {
            return Err(AudioError::InvalidParameter(format!(
                "spectrogram width must be positive, got {}",
                width
            )));
        }
        let data = buffer.channel(0).ok_or(AudioError::EmptyInput)?;
        let n = self.settings.fft_size;
        let bins = self.settings.frequency_bin_count();

        let mut smoothed = vec![0.0_f32; bins];
        let mut spectrum = vec![Complex::new(0.0_f32, 0.0); n];
        let frames = data
            .chunks(n)
            .enumerate()
            .map(|(index, chunk)| {
                for (i, slot) in spectrum.iter_mut().enumerate() {
                    let sample = chunk.get(i).copied().unwrap_or(0.0);
                    *slot = Complex::new(sample * self.window[i], 0.0);
                }
                self.fft.process(&mut spectrum);
                SpectrumFrame {
                    index,
                    levels: self.levels(&spectrum[..bins], &mut smoothed),
                }
            })
            .collect::<Vec<_>>();

        let slice_width = width / (data.len() as f32 / n as f32);
        debug!(
            frames = frames.len(),
            bins,
            slice_width,
            "spectrogram analysed"
        );
        Ok(Spectrogram {
            sample_rate: buffer.sample_rate(),
            fft_size: n,
            slice_width,
            frames,
        })
    }

    fn levels(&self, spectrum: &[Complex<f32>], smoothed: &mut [f32]) -> Vec<u8> {
        let norm = 1.0 / self.settings.fft_size as f32;
        let tau = self.settings.smoothing;
        let min_db = self.settings.min_decibels;
        let range_scale = 255.0 / (self.settings.max_decibels - min_db);

        spectrum
            .iter()
            .zip(smoothed.iter_mut())
            .map(|(bin, state)| {
                let magnitude = bin.norm() * norm;
                *state = tau * *state + (1.0 - tau) * magnitude;
                if !state.is_finite() {
                    *state = 0.0;
                }
                let db = 20.0 * state.log10();
                let scaled = range_scale * (db - min_db);
                if scaled.is_nan() || scaled <= 0.0 {
                    0
                } else {
                    scaled.min(255.0) as u8
                }
            })
            .collect()
    }
}

/// Spectrogram of channel 0 with the given settings
pub fn spectrogram(
    buffer: &PcmBuffer,
    width: f32,
    settings: &AnalysisSettings,
) -> Result<Spectrogram> {
    SpectrogramAnalyzer::new(settings.clone())?.analyze(buffer, width)
}

/// `0.42 - 0.5 cos(2πn/N) + 0.08 cos(4πn/N)`
fn blackman_window(len: usize) -> Vec<f32> {
    let scale = std::f32::consts::TAU / len as f32;
    (0..len)
        .map(|n| {
            let phase = n as f32 * scale;
            0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
        })
        .collect()
}
