//! Effect library
//!
//! An [`EffectRequest`] names one offline transformation plus its validated
//! parameters. Each request knows how to lay out its own [`SignalGraph`];
//! the [`RenderEngine`](crate::domain::render::RenderEngine) executes it.
//!
//! The wire names (`timeStretch`, `noiseGate`, ...) match the effect names
//! used by the control surface, so requests round-trip through presets and
//! the CLI unchanged.

use crate::domain::audio::{AudioError, PcmBuffer, Result};
use crate::domain::dsp::{params, BiquadStage, CompressorParams, FilterShape, NoiseGate};
use crate::domain::render::{
    BiquadChain, ConvolverMix, Dynamics, Gate, RenderSettings, SampleRemap, SignalGraph,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every effect kind the control surface can dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EffectKind {
    Filter,
    TimeStretch,
    PitchShift,
    Reverb,
    NoiseGate,
    Compression,
    Eq,
    Volume,
}

impl EffectKind {
    pub const ALL: [EffectKind; 8] = [
        EffectKind::Filter,
        EffectKind::TimeStretch,
        EffectKind::PitchShift,
        EffectKind::Reverb,
        EffectKind::NoiseGate,
        EffectKind::Compression,
        EffectKind::Eq,
        EffectKind::Volume,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EffectKind::Filter => "filter",
            EffectKind::TimeStretch => "timeStretch",
            EffectKind::PitchShift => "pitchShift",
            EffectKind::Reverb => "reverb",
            EffectKind::NoiseGate => "noiseGate",
            EffectKind::Compression => "compression",
            EffectKind::Eq => "eq",
            EffectKind::Volume => "volume",
        }
    }

    /// Volume is a playback control, everything else renders a new buffer
    pub fn is_buffer_transform(self) -> bool {
        !matches!(self, EffectKind::Volume)
    }
}

impl FromStr for EffectKind {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self> {
        EffectKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AudioError::UnsupportedEffect(s.to_string()))
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw parameter value: a single number or a list of numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EffectValue {
    Scalar(f32),
    List(Vec<f32>),
}

impl EffectValue {
    fn scalar(&self, kind: EffectKind) -> Result<f32> {
        match self {
            EffectValue::Scalar(v) => Ok(*v),
            EffectValue::List(values) => match values.as_slice() {
                [v] => Ok(*v),
                _ => Err(AudioError::InvalidParameter(format!(
                    "{} takes a single number, got {} values",
                    kind,
                    values.len()
                ))),
            },
        }
    }

    fn list(&self) -> Vec<f32> {
        match self {
            EffectValue::Scalar(v) => vec![*v],
            EffectValue::List(values) => values.clone(),
        }
    }
}

impl From<f32> for EffectValue {
    fn from(value: f32) -> Self {
        EffectValue::Scalar(value)
    }
}

impl From<f64> for EffectValue {
    fn from(value: f64) -> Self {
        EffectValue::Scalar(value as f32)
    }
}

impl From<Vec<f32>> for EffectValue {
    fn from(values: Vec<f32>) -> Self {
        EffectValue::List(values)
    }
}

impl<const N: usize> From<[f32; N]> for EffectValue {
    fn from(values: [f32; N]) -> Self {
        EffectValue::List(values.to_vec())
    }
}

// ============================================================================
// PARAMETERS
// ============================================================================

/// Basic filter: one biquad at a caller-given frequency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    pub shape: FilterShape,
    pub frequency: f32,
    /// `None` uses the configured default, then the shape's own default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeStretchParams {
    pub factor: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchShiftParams {
    pub semitones: f32,
}

impl PitchShiftParams {
    /// `2^(semitones / 12)`
    pub fn pitch_factor(&self) -> f64 {
        2.0_f64.powf(f64::from(self.semitones) / 12.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverbParams {
    pub amount: f32,
    /// Seed for the impulse response; `None` draws from system entropy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseGateParams {
    pub threshold_db: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionParams {
    pub amount: f32,
}

/// Gains of the three EQ bands in dB
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqParams {
    pub low_db: f32,
    pub mid_db: f32,
    pub high_db: f32,
}

impl EqParams {
    /// Low shelf 320 Hz -> peaking 1 kHz (Q 0.5) -> high shelf 3.2 kHz
    pub fn stages(&self) -> [BiquadStage; 3] {
        [
            BiquadStage::new(FilterShape::LowShelf, params::EQ_LOW_SHELF_FREQ)
                .with_gain(self.low_db),
            BiquadStage::new(FilterShape::Peaking, params::EQ_PEAKING_FREQ)
                .with_q(params::EQ_PEAKING_Q)
                .with_gain(self.mid_db),
            BiquadStage::new(FilterShape::HighShelf, params::EQ_HIGH_SHELF_FREQ)
                .with_gain(self.high_db),
        ]
    }
}

/// Live playback gain (linear)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeParams {
    pub gain: f32,
}

impl VolumeParams {
    pub const MAX_GAIN: f32 = 2.0;
}

// ============================================================================
// EFFECT REQUEST
// ============================================================================

/// One validated effect invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "camelCase")]
pub enum EffectRequest {
    Filter(FilterParams),
    TimeStretch(TimeStretchParams),
    PitchShift(PitchShiftParams),
    Reverb(ReverbParams),
    NoiseGate(NoiseGateParams),
    Compression(CompressionParams),
    Eq(EqParams),
    Volume(VolumeParams),
}

fn invalid(message: String) -> AudioError {
    AudioError::InvalidParameter(message)
}

fn require_finite(kind: EffectKind, name: &str, value: f32) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(format!("{} {} must be finite, got {}", kind, name, value)))
    }
}

fn require_unit(kind: EffectKind, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{} amount must be within [0, 1], got {}", kind, value)))
    }
}

impl EffectRequest {
    /// Dispatch a named effect with a raw value
    ///
    /// `lowpass`, `highpass` and `bandpass` are accepted as filter names;
    /// plain `filter` defaults to a low pass. Unknown names fail with
    /// [`AudioError::UnsupportedEffect`].
    pub fn parse(name: &str, value: impl Into<EffectValue>) -> Result<Self> {
        let value = value.into();
        match name {
            "lowpass" | "highpass" | "bandpass" => {
                let shape = name.parse::<FilterShape>()?;
                Self::filter_from_value(shape, &value)
            }
            _ => Self::from_kind(name.parse()?, value),
        }
    }

    /// Build and validate a request of a known kind
    pub fn from_kind(kind: EffectKind, value: impl Into<EffectValue>) -> Result<Self> {
        let value = value.into();
        let request = match kind {
            EffectKind::Filter => return Self::filter_from_value(FilterShape::Lowpass, &value),
            EffectKind::TimeStretch => EffectRequest::TimeStretch(TimeStretchParams {
                factor: value.scalar(kind)?,
            }),
            EffectKind::PitchShift => EffectRequest::PitchShift(PitchShiftParams {
                semitones: value.scalar(kind)?,
            }),
            EffectKind::Reverb => EffectRequest::Reverb(ReverbParams {
                amount: value.scalar(kind)?,
                seed: None,
            }),
            EffectKind::NoiseGate => EffectRequest::NoiseGate(NoiseGateParams {
                threshold_db: value.scalar(kind)?,
            }),
            EffectKind::Compression => EffectRequest::Compression(CompressionParams {
                amount: value.scalar(kind)?,
            }),
            EffectKind::Eq => match value.list().as_slice() {
                &[low_db, mid_db, high_db] => EffectRequest::Eq(EqParams {
                    low_db,
                    mid_db,
                    high_db,
                }),
                other => {
                    return Err(invalid(format!(
                        "eq takes exactly 3 gains (low, mid, high), got {}",
                        other.len()
                    )))
                }
            },
            EffectKind::Volume => EffectRequest::Volume(VolumeParams {
                gain: value.scalar(kind)?,
            }),
        };
        request.validate()?;
        Ok(request)
    }

    /// `[frequency]` or `[frequency, q]`
    fn filter_from_value(shape: FilterShape, value: &EffectValue) -> Result<Self> {
        let (frequency, q) = match value.list().as_slice() {
            &[frequency] => (frequency, None),
            &[frequency, q] => (frequency, Some(q)),
            other => {
                return Err(invalid(format!(
                    "filter takes a frequency and an optional Q, got {} values",
                    other.len()
                )))
            }
        };
        let request = EffectRequest::Filter(FilterParams {
            shape,
            frequency,
            q,
        });
        request.validate()?;
        Ok(request)
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            EffectRequest::Filter(_) => EffectKind::Filter,
            EffectRequest::TimeStretch(_) => EffectKind::TimeStretch,
            EffectRequest::PitchShift(_) => EffectKind::PitchShift,
            EffectRequest::Reverb(_) => EffectKind::Reverb,
            EffectRequest::NoiseGate(_) => EffectKind::NoiseGate,
            EffectRequest::Compression(_) => EffectKind::Compression,
            EffectRequest::Eq(_) => EffectKind::Eq,
            EffectRequest::Volume(_) => EffectKind::Volume,
        }
    }

    /// Parameter checks that do not depend on the input buffer
    pub fn validate(&self) -> Result<()> {
        let kind = self.kind();
        match self {
            EffectRequest::Filter(p) => {
                let mut stage = BiquadStage::new(p.shape, p.frequency);
                if let Some(q) = p.q {
                    stage = stage.with_q(q);
                }
                stage.validate()
            }
            EffectRequest::TimeStretch(p) => {
                require_finite(kind, "factor", p.factor)?;
                if p.factor <= 0.0 {
                    return Err(invalid(format!(
                        "timeStretch factor must be positive, got {}",
                        p.factor
                    )));
                }
                Ok(())
            }
            EffectRequest::PitchShift(p) => require_finite(kind, "semitones", p.semitones),
            EffectRequest::Reverb(p) => require_unit(kind, p.amount),
            EffectRequest::NoiseGate(p) => require_finite(kind, "threshold", p.threshold_db),
            EffectRequest::Compression(p) => require_unit(kind, p.amount),
            EffectRequest::Eq(p) => {
                require_finite(kind, "low gain", p.low_db)?;
                require_finite(kind, "mid gain", p.mid_db)?;
                require_finite(kind, "high gain", p.high_db)
            }
            EffectRequest::Volume(p) => {
                if !(0.0..=VolumeParams::MAX_GAIN).contains(&p.gain) {
                    return Err(invalid(format!(
                        "volume must be within [0, {}], got {}",
                        VolumeParams::MAX_GAIN,
                        p.gain
                    )));
                }
                Ok(())
            }
        }
    }

    /// Samples per channel the render of this request produces
    pub fn output_length(&self, input: &PcmBuffer) -> usize {
        match self {
            EffectRequest::TimeStretch(p) => time_stretch_length(input.len(), p.factor),
            EffectRequest::Reverb(_) => reverb_length(input.len(), input.sample_rate()),
            _ => input.len(),
        }
    }

    /// Same request with a fixed impulse response seed, if it is a reverb
    pub fn with_seed(&self, seed: u32) -> Self {
        match self {
            EffectRequest::Reverb(p) => EffectRequest::Reverb(ReverbParams {
                seed: Some(seed),
                ..*p
            }),
            other => other.clone(),
        }
    }

    /// Lay out the signal graph that renders this request over `input`
    ///
    /// Validation against the buffer (Nyquist) happens here, before the
    /// render allocates anything.
    pub fn build_graph(&self, input: &PcmBuffer, settings: &RenderSettings) -> Result<SignalGraph> {
        self.validate()?;
        let sample_rate = input.sample_rate();
        let length = self.output_length(input);

        let graph = match self {
            EffectRequest::Filter(p) => {
                let q = p.q.or(settings.filter_q).unwrap_or_else(|| p.shape.default_q());
                let stage = BiquadStage::new(p.shape, p.frequency).with_q(q);
                stage.validate_for(sample_rate)?;
                SignalGraph::new(self.kind().as_str(), length)
                    .connect(BiquadChain::new(vec![stage]))
            }
            EffectRequest::Eq(p) => {
                let stages = p.stages();
                for stage in &stages {
                    stage.validate_for(sample_rate)?;
                }
                SignalGraph::new(self.kind().as_str(), length)
                    .connect(BiquadChain::new(stages.to_vec()))
            }
            EffectRequest::TimeStretch(p) => SignalGraph::new(self.kind().as_str(), length)
                .with_playback_rate(1.0 / f64::from(p.factor)),
            EffectRequest::PitchShift(p) => SignalGraph::new(self.kind().as_str(), length)
                .connect(SampleRemap::new(
                    p.pitch_factor(),
                    settings.pitch_block_size,
                    settings.channel_policy,
                )),
            EffectRequest::NoiseGate(p) => SignalGraph::new(self.kind().as_str(), length)
                .connect(Gate::new(NoiseGate::new(p.threshold_db)?, settings.channel_policy)),
            EffectRequest::Compression(p) => {
                let params = CompressorParams::from_amount(p.amount);
                params.validate()?;
                SignalGraph::new(self.kind().as_str(), length).connect(Dynamics::new(params))
            }
            EffectRequest::Reverb(p) => {
                let mut rng = match p.seed {
                    Some(seed) => ChaCha8Rng::seed_from_u64(u64::from(seed)),
                    None => ChaCha8Rng::from_entropy(),
                };
                SignalGraph::new(self.kind().as_str(), length).connect(ConvolverMix::new(
                    p.amount,
                    input.len(),
                    settings.reverb_normalize,
                    &mut rng,
                    sample_rate,
                )?)
            }
            EffectRequest::Volume(_) => {
                return Err(AudioError::UnsupportedEffect(
                    "volume is a playback gain, not a buffer transform".to_string(),
                ))
            }
        };
        Ok(graph)
    }
}

/// `ceil(length * factor)`
pub fn time_stretch_length(length: usize, factor: f32) -> usize {
    (length as f64 * f64::from(factor)).ceil() as usize
}

/// Input plus the two second reverb tail
pub fn reverb_length(length: usize, sample_rate: u32) -> usize {
    length + params::IMPULSE_SECONDS as usize * sample_rate as usize
}

impl fmt::Display for EffectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectRequest::Filter(p) => write!(f, "{} {:.0} Hz", p.shape, p.frequency),
            EffectRequest::TimeStretch(p) => write!(f, "timeStretch x{}", p.factor),
            EffectRequest::PitchShift(p) => write!(f, "pitchShift {:+} st", p.semitones),
            EffectRequest::Reverb(p) => write!(f, "reverb {:.2}", p.amount),
            EffectRequest::NoiseGate(p) => write!(f, "noiseGate {} dB", p.threshold_db),
            EffectRequest::Compression(p) => write!(f, "compression {:.2}", p.amount),
            EffectRequest::Eq(p) => {
                write!(f, "eq [{}, {}, {}] dB", p.low_db, p.mid_db, p.high_db)
            }
            EffectRequest::Volume(p) => write!(f, "volume x{}", p.gain),
        }
    }
}
