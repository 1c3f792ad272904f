//! Digital Signal Processing primitives for offline rendering
//!
//! This module provides the building blocks the effect library is made of:
//! - Biquad filters (audio-EQ-cookbook IIR sections, six shapes)
//! - Dynamic range compressor with soft knee and linked detection
//! - Hard noise gate
//! - Synthetic impulse responses and FFT convolution for reverb
//!
//! Primitives work on plain `f32` slices; wrapping them into buffers and
//! signal graphs is the job of the render engine.

use crate::domain::audio::{AudioError, PcmBuffer, Result};
use num_complex::Complex;
use rand::Rng;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// Parameter constants shared by the effect library
pub mod params {
    /// Floor used when converting silence to decibels
    pub const DB_FLOOR: f32 = -120.0;

    /// Q giving a maximally flat (Butterworth) low/high pass response
    pub const BUTTERWORTH_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;
    /// Default Q of the band pass shape
    pub const BANDPASS_Q: f32 = 1.0;
    /// Shelf slope S = 1 expressed as a Q
    pub const SHELF_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

    /// Parametric EQ band layout
    pub const EQ_LOW_SHELF_FREQ: f32 = 320.0;
    pub const EQ_PEAKING_FREQ: f32 = 1000.0;
    pub const EQ_PEAKING_Q: f32 = 0.5;
    pub const EQ_HIGH_SHELF_FREQ: f32 = 3200.0;

    /// Compressor mapping: threshold = -50 + amount * 50 dB
    pub const COMPRESSOR_THRESHOLD_FLOOR_DB: f32 = -50.0;
    pub const COMPRESSOR_KNEE_DB: f32 = 40.0;
    pub const COMPRESSOR_RATIO: f32 = 12.0;
    pub const COMPRESSOR_ATTACK_SEC: f32 = 0.0;
    pub const COMPRESSOR_RELEASE_SEC: f32 = 0.25;

    /// Length of the synthetic reverb tail in seconds
    pub const IMPULSE_SECONDS: u32 = 2;
    /// Number of channels of the synthetic impulse response
    pub const IMPULSE_CHANNELS: usize = 2;

    /// Convolution normalisation constants (-58 dB calibration at 44.1 kHz)
    pub const IMPULSE_GAIN_CALIBRATION_DB: f32 = -58.0;
    pub const IMPULSE_GAIN_CALIBRATION_RATE: f32 = 44100.0;
    pub const IMPULSE_MIN_POWER: f32 = 0.000125;
}

/// Convert decibels to a linear gain factor
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert a linear amplitude to decibels, floored at [`params::DB_FLOOR`]
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 0.0 {
        params::DB_FLOOR
    } else {
        (20.0 * gain.log10()).max(params::DB_FLOOR)
    }
}

// ============================================================================
// BIQUAD FILTER
// ============================================================================

/// Response shape of a biquad section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterShape {
    Lowpass,
    Highpass,
    Bandpass,
    #[serde(rename = "lowshelf")]
    LowShelf,
    #[serde(rename = "highshelf")]
    HighShelf,
    Peaking,
}

impl FilterShape {
    /// Q used when the caller does not provide one
    pub fn default_q(self) -> f32 {
        match self {
            FilterShape::Lowpass | FilterShape::Highpass => params::BUTTERWORTH_Q,
            FilterShape::Bandpass | FilterShape::Peaking => params::BANDPASS_Q,
            FilterShape::LowShelf | FilterShape::HighShelf => params::SHELF_Q,
        }
    }

    /// Whether the gain parameter affects the response
    pub fn uses_gain(self) -> bool {
        matches!(
            self,
            FilterShape::LowShelf | FilterShape::HighShelf | FilterShape::Peaking
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FilterShape::Lowpass => "lowpass",
            FilterShape::Highpass => "highpass",
            FilterShape::Bandpass => "bandpass",
            FilterShape::LowShelf => "lowshelf",
            FilterShape::HighShelf => "highshelf",
            FilterShape::Peaking => "peaking",
        }
    }
}

impl std::str::FromStr for FilterShape {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lowpass" => Ok(FilterShape::Lowpass),
            "highpass" => Ok(FilterShape::Highpass),
            "bandpass" => Ok(FilterShape::Bandpass),
            "lowshelf" => Ok(FilterShape::LowShelf),
            "highshelf" => Ok(FilterShape::HighShelf),
            "peaking" => Ok(FilterShape::Peaking),
            other => Err(AudioError::InvalidParameter(format!(
                "unknown filter shape '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for FilterShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Second-order section coefficients, divided through by `a0`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    /// Passthrough
    fn default() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

/// Intermediate terms shared by every cookbook formula
struct CookbookTerms {
    a: f32,
    cos_w0: f32,
    alpha: f32,
}

impl CookbookTerms {
    fn new(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        Self {
            a: 10.0_f32.powf(gain_db / 40.0),
            cos_w0: w0.cos(),
            alpha: w0.sin() / (2.0 * q),
        }
    }
}

impl BiquadCoeffs {
    fn normalized(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Second order low pass, -3 dB at `freq` for Q = 1/sqrt(2)
    #[must_use]
    pub fn lowpass(sample_rate: f32, freq: f32, q: f32) -> Self {
        let t = CookbookTerms::new(sample_rate, freq, 0.0, q);
        let b1 = 1.0 - t.cos_w0;
        Self::normalized(
            b1 / 2.0,
            b1,
            b1 / 2.0,
            1.0 + t.alpha,
            -2.0 * t.cos_w0,
            1.0 - t.alpha,
        )
    }

    #[must_use]
    pub fn highpass(sample_rate: f32, freq: f32, q: f32) -> Self {
        let t = CookbookTerms::new(sample_rate, freq, 0.0, q);
        let b0 = (1.0 + t.cos_w0) / 2.0;
        Self::normalized(
            b0,
            -(1.0 + t.cos_w0),
            b0,
            1.0 + t.alpha,
            -2.0 * t.cos_w0,
            1.0 - t.alpha,
        )
    }

    /// Band pass with constant 0 dB peak gain
    #[must_use]
    pub fn bandpass(sample_rate: f32, freq: f32, q: f32) -> Self {
        let t = CookbookTerms::new(sample_rate, freq, 0.0, q);
        Self::normalized(
            t.alpha,
            0.0,
            -t.alpha,
            1.0 + t.alpha,
            -2.0 * t.cos_w0,
            1.0 - t.alpha,
        )
    }

    /// Gain applied below `freq`
    #[must_use]
    pub fn low_shelf(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let CookbookTerms { a, cos_w0, alpha } = CookbookTerms::new(sample_rate, freq, gain_db, q);

        let b0 = a * ((a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha);
        let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0);
        let b2 = a * ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha);

        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0);
        let a2 = (a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    /// Gain applied above `freq`
    #[must_use]
    pub fn high_shelf(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let CookbookTerms { a, cos_w0, alpha } = CookbookTerms::new(sample_rate, freq, gain_db, q);

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha);

        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_w0);
        let a2 = (a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    /// Bell around `freq` with width set by `q`
    #[must_use]
    pub fn peaking(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let CookbookTerms { a, cos_w0, alpha } = CookbookTerms::new(sample_rate, freq, gain_db, q);

        Self::normalized(
            1.0 + alpha * a,
            -2.0 * cos_w0,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_w0,
            1.0 - alpha / a,
        )
    }

    /// Coefficients for any shape; `gain_db` is ignored by pass/band shapes
    #[must_use]
    pub fn for_shape(shape: FilterShape, sample_rate: f32, freq: f32, q: f32, gain_db: f32) -> Self {
        match shape {
            FilterShape::Lowpass => Self::lowpass(sample_rate, freq, q),
            FilterShape::Highpass => Self::highpass(sample_rate, freq, q),
            FilterShape::Bandpass => Self::bandpass(sample_rate, freq, q),
            FilterShape::LowShelf => Self::low_shelf(sample_rate, freq, gain_db, q),
            FilterShape::HighShelf => Self::high_shelf(sample_rate, freq, gain_db, q),
            FilterShape::Peaking => Self::peaking(sample_rate, freq, gain_db, q),
        }
    }
}

/// Direct Form I biquad with its two-sample input and output history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    /// `[x[n-1], x[n-2]]`
    inputs: [f32; 2],
    /// `[y[n-1], y[n-2]]`
    outputs: [f32; 2],
}

impl BiquadFilter {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            inputs: [0.0; 2],
            outputs: [0.0; 2],
        }
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let BiquadCoeffs { b0, b1, b2, a1, a2 } = self.coeffs;
        let [x1, x2] = self.inputs;
        let [y1, y2] = self.outputs;

        let y = b0 * x + b1 * x1 + b2 * x2 - a1 * y1 - a2 * y2;
        self.inputs = [x, x1];
        self.outputs = [y, y1];
        y
    }

    /// Filter `samples` in place, carrying history across calls
    pub fn process(&mut self, samples: &mut [f32]) {
        samples
            .iter_mut()
            .for_each(|s| *s = self.process_sample(*s));
    }

    /// Forget the history
    pub fn reset(&mut self) {
        self.inputs = [0.0; 2];
        self.outputs = [0.0; 2];
    }
}

/// One configured biquad section: shape, corner/center frequency, Q and gain
///
/// Frequencies outside `(0, nyquist)` are rejected, not clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadStage {
    pub shape: FilterShape,
    pub frequency: f32,
    pub q: f32,
    #[serde(default)]
    pub gain_db: f32,
}

impl BiquadStage {
    /// Stage with the shape's default Q and 0 dB gain
    pub fn new(shape: FilterShape, frequency: f32) -> Self {
        Self {
            shape,
            frequency,
            q: shape.default_q(),
            gain_db: 0.0,
        }
    }

    pub fn with_q(mut self, q: f32) -> Self {
        self.q = q;
        self
    }

    pub fn with_gain(mut self, gain_db: f32) -> Self {
        self.gain_db = gain_db;
        self
    }

    /// Check parameters that do not depend on the sample rate
    pub fn validate(&self) -> Result<()> {
        if !self.frequency.is_finite() || self.frequency <= 0.0 {
            return Err(AudioError::InvalidParameter(format!(
                "{} frequency must be positive, got {}",
                self.shape, self.frequency
            )));
        }
        if !self.q.is_finite() || self.q <= 0.0 {
            return Err(AudioError::InvalidParameter(format!(
                "{} Q must be positive, got {}",
                self.shape, self.q
            )));
        }
        if !self.gain_db.is_finite() {
            return Err(AudioError::InvalidParameter(format!(
                "{} gain must be finite",
                self.shape
            )));
        }
        Ok(())
    }

    /// Full validation against the rate the stage will run at
    pub fn validate_for(&self, sample_rate: u32) -> Result<()> {
        self.validate()?;
        let nyquist = sample_rate as f32 / 2.0;
        if self.frequency >= nyquist {
            return Err(AudioError::InvalidParameter(format!(
                "{} frequency {} Hz is at or above Nyquist ({} Hz)",
                self.shape, self.frequency, nyquist
            )));
        }
        Ok(())
    }

    pub fn coeffs(&self, sample_rate: u32) -> BiquadCoeffs {
        BiquadCoeffs::for_shape(
            self.shape,
            sample_rate as f32,
            self.frequency,
            self.q,
            self.gain_db,
        )
    }

    /// Filter one channel in place, starting from rest
    pub fn process_channel(&self, sample_rate: u32, samples: &mut [f32]) {
        let mut filter = BiquadFilter::new(self.coeffs(sample_rate));
        filter.process(samples);
        trace!(
            shape = %self.shape,
            frequency = self.frequency,
            q = self.q,
            gain_db = self.gain_db,
            samples = samples.len(),
            "biquad stage processed"
        );
    }

    /// Apply the stage to every channel of `buffer`, producing a new buffer
    pub fn apply(&self, buffer: &PcmBuffer) -> Result<PcmBuffer> {
        self.validate_for(buffer.sample_rate())?;
        let channels = buffer
            .channels()
            .map(|channel| {
                let mut out = channel.to_vec();
                self.process_channel(buffer.sample_rate(), &mut out);
                out
            })
            .collect();
        PcmBuffer::new(buffer.sample_rate(), channels)
    }
}

// ============================================================================
// DYNAMIC RANGE COMPRESSOR
// ============================================================================

/// Compressor parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorParams {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack_sec: f32,
    pub release_sec: f32,
    #[serde(default)]
    pub makeup_gain_db: f32,
}

impl CompressorParams {
    /// Map a 0..1 amount onto the fixed compressor curve
    ///
    /// threshold = -50 + amount * 50 dB, knee 40 dB, ratio 12:1,
    /// attack 0 s, release 0.25 s.
    pub fn from_amount(amount: f32) -> Self {
        Self {
            threshold_db: params::COMPRESSOR_THRESHOLD_FLOOR_DB
                + amount * -params::COMPRESSOR_THRESHOLD_FLOOR_DB,
            knee_db: params::COMPRESSOR_KNEE_DB,
            ratio: params::COMPRESSOR_RATIO,
            attack_sec: params::COMPRESSOR_ATTACK_SEC,
            release_sec: params::COMPRESSOR_RELEASE_SEC,
            makeup_gain_db: 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let finite = [
            self.threshold_db,
            self.knee_db,
            self.ratio,
            self.attack_sec,
            self.release_sec,
            self.makeup_gain_db,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(AudioError::InvalidParameter(
                "compressor parameters must be finite".to_string(),
            ));
        }
        if self.ratio < 1.0 {
            return Err(AudioError::InvalidParameter(format!(
                "compressor ratio must be >= 1, got {}",
                self.ratio
            )));
        }
        if self.knee_db < 0.0 || self.attack_sec < 0.0 || self.release_sec < 0.0 {
            return Err(AudioError::InvalidParameter(
                "compressor knee, attack and release must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self::from_amount(0.0)
    }
}

/// Feed-forward dynamic range compressor
///
/// Detection is linked: the loudest channel of each frame drives a single
/// gain that is applied to every channel. Attack and release smooth the
/// gain reduction signal, not the detector.
#[derive(Debug, Clone)]
pub struct Compressor {
    params: CompressorParams,
    attack_coeff: f32,
    release_coeff: f32,
    // Current gain reduction in dB (<= 0)
    reduction_db: f32,
}

impl Compressor {
    pub fn new(params: CompressorParams, sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        Self {
            params,
            attack_coeff: Self::smoothing_coeff(params.attack_sec, sr),
            release_coeff: Self::smoothing_coeff(params.release_sec, sr),
            reduction_db: 0.0,
        }
    }

    /// One-pole coefficient for a time constant; zero time means instant
    fn smoothing_coeff(time_sec: f32, sample_rate: f32) -> f32 {
        if time_sec <= 0.0 {
            0.0
        } else {
            (-1.0 / (time_sec * sample_rate)).exp()
        }
    }

    pub fn params(&self) -> CompressorParams {
        self.params
    }

    /// Static curve: output level in dB for an input level in dB
    ///
    /// Below the knee the signal passes, above it the slope is 1/ratio, and
    /// inside the knee a quadratic blends the two.
    pub fn static_curve(&self, input_db: f32) -> f32 {
        let CompressorParams {
            threshold_db,
            knee_db,
            ratio,
            ..
        } = self.params;
        let over = input_db - threshold_db;

        if knee_db > 0.0 && 2.0 * over.abs() <= knee_db {
            let x = over + knee_db / 2.0;
            input_db + (1.0 / ratio - 1.0) * x * x / (2.0 * knee_db)
        } else if over > 0.0 {
            threshold_db + over / ratio
        } else {
            input_db
        }
    }

    /// Compute the gain for one detector level and advance the envelope
    #[inline]
    fn next_gain(&mut self, level: f32) -> f32 {
        let level_db = gain_to_db(level);
        let target = self.static_curve(level_db) - level_db;

        // More reduction is the attack direction
        let coeff = if target < self.reduction_db {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.reduction_db = coeff * self.reduction_db + (1.0 - coeff) * target;

        db_to_gain(self.reduction_db + self.params.makeup_gain_db)
    }

    /// Compress equally long channels in place with a shared gain
    pub fn process(&mut self, channels: &mut [Vec<f32>]) {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for frame in 0..frames {
            let level = channels
                .iter()
                .fold(0.0_f32, |peak, channel| peak.max(channel[frame].abs()));
            let gain = self.next_gain(level);
            for channel in channels.iter_mut() {
                channel[frame] *= gain;
            }
        }
    }

    pub fn reset(&mut self) {
        self.reduction_db = 0.0;
    }
}

// ============================================================================
// NOISE GATE
// ============================================================================

/// Hard noise gate
///
/// Samples whose magnitude is strictly above the threshold pass unchanged,
/// everything else is zeroed. There is no attack, hold or release.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseGate {
    threshold_db: f32,
}

impl NoiseGate {
    pub fn new(threshold_db: f32) -> Result<Self> {
        if !threshold_db.is_finite() {
            return Err(AudioError::InvalidParameter(
                "noise gate threshold must be finite".to_string(),
            ));
        }
        Ok(Self { threshold_db })
    }

    pub fn threshold_db(&self) -> f32 {
        self.threshold_db
    }

    /// `10^(threshold_db / 20)`
    pub fn threshold_linear(&self) -> f32 {
        db_to_gain(self.threshold_db)
    }

    pub fn process(&self, samples: &mut [f32]) {
        let threshold = self.threshold_linear();
        for sample in samples.iter_mut() {
            if sample.abs() <= threshold {
                *sample = 0.0;
            }
        }
    }
}

// ============================================================================
// IMPULSE RESPONSE + CONVOLUTION
// ============================================================================

/// Synthesize a decaying-noise reverb tail
///
/// Every channel holds `seconds * sample_rate` samples where sample `i` is
/// `uniform(-1, 1) * (1 - i/N)^2`. A fresh response is drawn from `rng` on
/// every call.
pub fn generate_impulse_response<R: Rng + ?Sized>(
    sample_rate: u32,
    seconds: u32,
    number_of_channels: usize,
    rng: &mut R,
) -> Result<PcmBuffer> {
    let length = sample_rate as usize * seconds as usize;
    let channels = (0..number_of_channels)
        .map(|_| {
            (0..length)
                .map(|i| {
                    let decay = 1.0 - i as f32 / length as f32;
                    rng.gen_range(-1.0_f32..1.0) * decay * decay
                })
                .collect()
        })
        .collect();
    PcmBuffer::new(sample_rate, channels)
}

/// Scale applied to an impulse response so its loudness is calibrated
///
/// Power is the RMS over all channels, floored at a minimum; the scale is
/// its reciprocal times a -58 dB calibration, corrected for sample rate, and
/// halved for four-channel (true stereo) responses.
pub fn impulse_normalization_scale(impulse: &PcmBuffer) -> f32 {
    let count = impulse.number_of_channels() * impulse.len();
    let energy: f64 = impulse
        .channels()
        .flat_map(|channel| channel.iter())
        .map(|&s| f64::from(s) * f64::from(s))
        .sum();

    let mut power = if count == 0 {
        0.0
    } else {
        (energy / count as f64).sqrt() as f32
    };
    if !power.is_finite() || power < params::IMPULSE_MIN_POWER {
        power = params::IMPULSE_MIN_POWER;
    }

    let mut scale = 1.0 / power;
    scale *= db_to_gain(params::IMPULSE_GAIN_CALIBRATION_DB);
    scale *= params::IMPULSE_GAIN_CALIBRATION_RATE / impulse.sample_rate() as f32;
    if impulse.number_of_channels() == 4 {
        scale *= 0.5;
    }
    scale
}

/// Zero-filled vector whose allocation failure is reported, not fatal
pub fn try_filled<T: Clone>(len: usize, value: T) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|e| {
        AudioError::RenderFailure(format!("cannot allocate {} elements: {}", len, e))
    })?;
    buf.resize(len, value);
    Ok(buf)
}

/// Overlap-add FFT convolution with a fixed kernel
///
/// The kernel spectrum is computed once. Signals are cut into blocks of
/// `fft_len - kernel_len + 1` samples with `fft_len = next_pow2(2 * kernel_len)`,
/// so working memory depends on the kernel length only.
pub struct FftConvolver {
    kernel_len: usize,
    block_len: usize,
    /// Kernel spectrum with the inverse transform's `1 / fft_len` folded in
    spectrum: Vec<Complex<f64>>,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl FftConvolver {
    pub fn new(kernel: &[f32]) -> Result<Self> {
        if kernel.is_empty() {
            return Err(AudioError::InvalidParameter(
                "convolution kernel must not be empty".to_string(),
            ));
        }
        let fft_len = (2 * kernel.len()).next_power_of_two();
        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(fft_len);
        let inverse = planner.plan_fft_inverse(fft_len);

        let mut spectrum = try_filled(fft_len, Complex::new(0.0, 0.0))?;
        for (slot, &k) in spectrum.iter_mut().zip(kernel) {
            slot.re = f64::from(k);
        }
        let mut scratch = try_filled(forward.get_inplace_scratch_len(), Complex::new(0.0, 0.0))?;
        forward.process_with_scratch(&mut spectrum, &mut scratch);

        let norm = 1.0 / fft_len as f64;
        spectrum.iter_mut().for_each(|c| *c *= norm);

        trace!(kernel_len = kernel.len(), fft_len, "convolver planned");
        Ok(Self {
            kernel_len: kernel.len(),
            block_len: fft_len - kernel.len() + 1,
            spectrum,
            forward,
            inverse,
        })
    }

    pub fn kernel_len(&self) -> usize {
        self.kernel_len
    }

    /// Add `gain * (signal * kernel)[i]` to `out[i]` for every `i < out.len()`
    ///
    /// Convolution output past the end of `out` is dropped.
    pub fn accumulate(&self, signal: &[f32], gain: f32, out: &mut [f32]) -> Result<()> {
        let fft_len = self.spectrum.len();
        let zero = Complex::new(0.0, 0.0);
        let mut block = try_filled(fft_len, zero)?;
        let scratch_len = self
            .forward
            .get_inplace_scratch_len()
            .max(self.inverse.get_inplace_scratch_len());
        let mut scratch = try_filled(scratch_len, zero)?;
        let gain = f64::from(gain);

        for (start, chunk) in (0..)
            .step_by(self.block_len)
            .zip(signal.chunks(self.block_len))
        {
            if start >= out.len() {
                break;
            }
            block.fill(zero);
            for (slot, &s) in block.iter_mut().zip(chunk) {
                slot.re = f64::from(s);
            }
            self.forward.process_with_scratch(&mut block, &mut scratch);
            for (b, k) in block.iter_mut().zip(&self.spectrum) {
                *b *= *k;
            }
            self.inverse.process_with_scratch(&mut block, &mut scratch);

            let produced = chunk.len() + self.kernel_len - 1;
            for (o, c) in out[start..].iter_mut().zip(&block[..produced]) {
                *o += (c.re * gain) as f32;
            }
        }
        Ok(())
    }
}

/// Full linear convolution
///
/// The result has `signal.len() + kernel.len() - 1` samples and matches
/// direct convolution up to floating point rounding. Either input being
/// empty yields an empty result.
pub fn convolve(signal: &[f32], kernel: &[f32]) -> Result<Vec<f32>> {
    if signal.is_empty() || kernel.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = try_filled(signal.len() + kernel.len() - 1, 0.0)?;
    FftConvolver::new(kernel)?.accumulate(signal, 1.0, &mut out)?;
    Ok(out)
}

// ============================================================================
// TESTS
// ============================================================================
