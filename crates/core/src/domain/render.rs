//! Offline render engine
//!
//! A render lays out a [`SignalGraph`]: a source node reading the input
//! buffer (optionally at a different playback rate), a chain of processing
//! [`Stage`]s, and a clamping sink. The whole graph runs synchronously over
//! a fixed-length [`RenderBlock`] and yields a new [`PcmBuffer`].

use crate::domain::audio::{clamp_sample, AudioError, PcmBuffer, Result};
use crate::domain::dsp::{
    generate_impulse_response, impulse_normalization_scale, params, try_filled, BiquadStage,
    Compressor, CompressorParams, FftConvolver, NoiseGate,
};
use crate::domain::effects::EffectRequest;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// How single-channel style processors treat multi-channel input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelPolicy {
    /// Every channel is processed independently
    #[default]
    PerChannel,
    /// Channel 0 is processed and copied to every output channel
    FirstChannel,
}

/// Knobs of the render engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Renders longer than this are refused before allocation
    pub max_render_seconds: u32,
    /// Applies to pitch shift and noise gate
    pub channel_policy: ChannelPolicy,
    /// Remap pitch within fixed blocks instead of over the whole buffer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_block_size: Option<usize>,
    /// Loudness-normalize the reverb impulse response
    pub reverb_normalize: bool,
    /// Q used by the basic filter when the request has none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_q: Option<f32>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            max_render_seconds: 600,
            channel_policy: ChannelPolicy::PerChannel,
            pitch_block_size: None,
            reverb_normalize: true,
            filter_q: None,
        }
    }
}

impl RenderSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_render_seconds == 0 {
            return Err(AudioError::InvalidParameter(
                "max_render_seconds must be positive".to_string(),
            ));
        }
        if self.pitch_block_size == Some(0) {
            return Err(AudioError::InvalidParameter(
                "pitch_block_size must be positive".to_string(),
            ));
        }
        if let Some(q) = self.filter_q {
            if !q.is_finite() || q <= 0.0 {
                return Err(AudioError::InvalidParameter(format!(
                    "filter_q must be positive, got {}",
                    q
                )));
            }
        }
        Ok(())
    }
}

/// Cooperative cancellation flag shared between a render and its caller
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AudioError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// RENDER BLOCK
// ============================================================================

/// Working storage a graph renders into
#[derive(Debug)]
pub struct RenderBlock {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl RenderBlock {
    /// Zeroed block; allocation failure is reported instead of aborting
    pub fn allocate(sample_rate: u32, number_of_channels: usize, length: usize) -> Result<Self> {
        let alloc_error = |e: std::collections::TryReserveError| {
            AudioError::RenderFailure(format!(
                "cannot allocate {} x {} samples: {}",
                number_of_channels, length, e
            ))
        };

        let mut channels = Vec::new();
        channels
            .try_reserve_exact(number_of_channels)
            .map_err(alloc_error)?;
        for _ in 0..number_of_channels {
            let mut channel = Vec::new();
            channel.try_reserve_exact(length).map_err(alloc_error)?;
            channel.resize(length, 0.0);
            channels.push(channel);
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }

    /// Run `f` over the channels the policy selects
    ///
    /// With [`ChannelPolicy::FirstChannel`] the processed channel 0 then
    /// overwrites every other channel.
    pub fn for_each_channel(&mut self, policy: ChannelPolicy, mut f: impl FnMut(&mut [f32])) {
        match policy {
            ChannelPolicy::PerChannel => {
                for channel in &mut self.channels {
                    f(channel);
                }
            }
            ChannelPolicy::FirstChannel => {
                if let Some((first, rest)) = self.channels.split_first_mut() {
                    f(first);
                    for channel in rest {
                        channel.copy_from_slice(&first[..]);
                    }
                }
            }
        }
    }

    fn clamp(&mut self) {
        for sample in self.channels.iter_mut().flat_map(|c| c.iter_mut()) {
            *sample = clamp_sample(*sample);
        }
    }

    fn into_buffer(self) -> Result<PcmBuffer> {
        PcmBuffer::new(self.sample_rate, self.channels)
    }
}

// ============================================================================
// STAGES
// ============================================================================

/// One processing node of a signal graph
///
/// Stages process the whole block in place. A stage must not change the
/// block length or channel count.
pub trait Stage: Send {
    fn process(&mut self, block: &mut RenderBlock) -> Result<()>;

    /// Name for logging
    fn name(&self) -> &str;
}

/// Cascade of biquad sections, each channel filtered from rest
pub struct BiquadChain {
    stages: Vec<BiquadStage>,
}

impl BiquadChain {
    pub fn new(stages: Vec<BiquadStage>) -> Self {
        Self { stages }
    }
}

impl Stage for BiquadChain {
    fn process(&mut self, block: &mut RenderBlock) -> Result<()> {
        let sample_rate = block.sample_rate();
        for stage in &self.stages {
            stage.validate_for(sample_rate)?;
        }
        for channel in block.channels_mut() {
            for stage in &self.stages {
                stage.process_channel(sample_rate, channel);
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "biquad"
    }
}

/// Nearest-index resampling of each channel: `out[i] = in[round(i * factor)]`
///
/// Indices past the end read silence. With a block size the remap restarts
/// at every block boundary and never reads past the block it is in.
pub struct SampleRemap {
    factor: f64,
    block_size: Option<usize>,
    policy: ChannelPolicy,
}

impl SampleRemap {
    pub fn new(factor: f64, block_size: Option<usize>, policy: ChannelPolicy) -> Self {
        Self {
            factor,
            block_size,
            policy,
        }
    }

    fn remap(&self, source: &[f32], out: &mut [f32]) {
        let len = source.len();
        let block = self.block_size.unwrap_or(len).max(1);
        for (start, chunk) in (0..).step_by(block).zip(out.chunks_mut(block)) {
            for (j, slot) in chunk.iter_mut().enumerate() {
                let k = (j as f64 * self.factor).round() as usize;
                *slot = if k < block {
                    source.get(start + k).copied().unwrap_or(0.0)
                } else {
                    0.0
                };
            }
        }
    }
}

impl Stage for SampleRemap {
    fn process(&mut self, block: &mut RenderBlock) -> Result<()> {
        let mut scratch = vec![0.0; block.len()];
        block.for_each_channel(self.policy, |channel| {
            self.remap(channel, &mut scratch);
            channel.copy_from_slice(&scratch);
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "sample-remap"
    }
}

/// Hard noise gate
pub struct Gate {
    gate: NoiseGate,
    policy: ChannelPolicy,
}

impl Gate {
    pub fn new(gate: NoiseGate, policy: ChannelPolicy) -> Self {
        Self { gate, policy }
    }
}

impl Stage for Gate {
    fn process(&mut self, block: &mut RenderBlock) -> Result<()> {
        let gate = &self.gate;
        block.for_each_channel(self.policy, |channel| gate.process(channel));
        Ok(())
    }

    fn name(&self) -> &str {
        "noise-gate"
    }
}

/// Compressor with linked detection over all channels
pub struct Dynamics {
    params: CompressorParams,
}

impl Dynamics {
    pub fn new(params: CompressorParams) -> Self {
        Self { params }
    }
}

impl Stage for Dynamics {
    fn process(&mut self, block: &mut RenderBlock) -> Result<()> {
        self.params.validate()?;
        let mut compressor = Compressor::new(self.params, block.sample_rate());
        compressor.process(block.channels_mut());
        Ok(())
    }

    fn name(&self) -> &str {
        "compressor"
    }
}

/// Dry/wet mix of the signal with its convolution by an impulse response
///
/// Output is `(1 - amount) * dry + amount * scale * (dry * ir)`. Mono input
/// is convolved with the mean of the impulse channels; channel `c` of a
/// multi-channel input uses impulse channel `c % channels`.
pub struct ConvolverMix {
    amount: f32,
    input_length: usize,
    impulse: PcmBuffer,
    scale: f32,
}

impl ConvolverMix {
    /// Draws a fresh two second, two channel impulse response from `rng`
    pub fn new<R: Rng + ?Sized>(
        amount: f32,
        input_length: usize,
        normalize: bool,
        rng: &mut R,
        sample_rate: u32,
    ) -> Result<Self> {
        let impulse = generate_impulse_response(
            sample_rate,
            params::IMPULSE_SECONDS,
            params::IMPULSE_CHANNELS,
            rng,
        )?;
        Ok(Self::with_impulse(amount, input_length, impulse, normalize))
    }

    pub fn with_impulse(
        amount: f32,
        input_length: usize,
        impulse: PcmBuffer,
        normalize: bool,
    ) -> Self {
        let scale = if normalize {
            impulse_normalization_scale(&impulse)
        } else {
            1.0
        };
        Self {
            amount,
            input_length,
            impulse,
            scale,
        }
    }

    /// One convolver per impulse channel, or one over their mean for mono input
    fn convolvers(&self, number_of_channels: usize) -> Result<Vec<FftConvolver>> {
        let impulse_channels = self.impulse.number_of_channels();
        if number_of_channels == 1 && impulse_channels > 1 {
            let norm = 1.0 / impulse_channels as f32;
            let mut mean = try_filled(self.impulse.len(), 0.0)?;
            for ir in self.impulse.channels() {
                for (m, &s) in mean.iter_mut().zip(ir) {
                    *m += s * norm;
                }
            }
            return Ok(vec![FftConvolver::new(&mean)?]);
        }
        self.impulse.channels().map(FftConvolver::new).collect()
    }
}

impl Stage for ConvolverMix {
    fn process(&mut self, block: &mut RenderBlock) -> Result<()> {
        if self.amount == 0.0 {
            return Ok(());
        }
        let convolvers = self.convolvers(block.number_of_channels())?;
        let dry_gain = 1.0 - self.amount;
        let wet_gain = self.amount * self.scale;

        for (index, channel) in block.channels_mut().iter_mut().enumerate() {
            let dry_len = self.input_length.min(channel.len());
            let mut dry = try_filled(dry_len, 0.0)?;
            dry.copy_from_slice(&channel[..dry_len]);

            channel.iter_mut().for_each(|s| *s *= dry_gain);
            convolvers[index % convolvers.len()].accumulate(&dry, wet_gain, channel)?;
            trace!(channel = index, dry_len, "convolved channel");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "convolver"
    }
}

// ============================================================================
// SIGNAL GRAPH
// ============================================================================

/// Source -> stages -> clamping sink, rendered to a fixed length
pub struct SignalGraph {
    label: &'static str,
    output_length: usize,
    playback_rate: f64,
    stages: Vec<Box<dyn Stage>>,
}

impl fmt::Debug for SignalGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalGraph")
            .field("label", &self.label)
            .field("output_length", &self.output_length)
            .field("playback_rate", &self.playback_rate)
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl SignalGraph {
    pub fn new(label: &'static str, output_length: usize) -> Self {
        Self {
            label,
            output_length,
            playback_rate: 1.0,
            stages: Vec::new(),
        }
    }

    /// Source reads input position `i * rate` for output sample `i`
    pub fn with_playback_rate(mut self, rate: f64) -> Self {
        self.playback_rate = rate;
        self
    }

    pub fn connect(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn output_length(&self) -> usize {
        self.output_length
    }

    pub fn label(&self) -> &str {
        self.label
    }

    /// Number of processing stages between source and sink
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run the graph over `input`
    ///
    /// The output has the input's sample rate and channel count, exactly
    /// `output_length()` samples, and every sample within [-1, 1].
    pub fn render(mut self, input: &PcmBuffer, cancel: &CancelToken) -> Result<PcmBuffer> {
        if input.is_empty() {
            return Err(AudioError::EmptyInput);
        }
        cancel.check()?;

        let mut block = RenderBlock::allocate(
            input.sample_rate(),
            input.number_of_channels(),
            self.output_length,
        )?;
        self.fill_source(input, &mut block);

        for stage in &mut self.stages {
            cancel.check()?;
            stage.process(&mut block)?;
            trace!(graph = self.label, stage = stage.name(), "stage done");
        }
        cancel.check()?;

        block.clamp();
        block.into_buffer()
    }

    fn fill_source(&self, input: &PcmBuffer, block: &mut RenderBlock) {
        let rate = self.playback_rate;
        for (out, source) in block.channels_mut().iter_mut().zip(input.channels()) {
            if rate == 1.0 {
                let n = out.len().min(source.len());
                out[..n].copy_from_slice(&source[..n]);
                continue;
            }
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = interpolate(source, i as f64 * rate);
            }
        }
    }
}

/// Linear interpolation at a fractional position; silence past the end
fn interpolate(source: &[f32], position: f64) -> f32 {
    let index = position.floor() as usize;
    let frac = (position - index as f64) as f32;
    match source.get(index) {
        Some(&a) => {
            if frac == 0.0 {
                return a;
            }
            let b = source.get(index + 1).copied().unwrap_or(0.0);
            a + (b - a) * frac
        }
        None => 0.0,
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Executes effect requests against buffers
///
/// The engine holds no per-render state: every render builds its own graph,
/// so one engine can serve concurrent renders from several threads.
#[derive(Debug, Clone, Default)]
pub struct RenderEngine {
    settings: RenderSettings,
}

impl RenderEngine {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn render(&self, input: &PcmBuffer, request: &EffectRequest) -> Result<PcmBuffer> {
        self.render_with_cancel(input, request, &CancelToken::new())
    }

    /// Render with a cancel token checked between graph stages
    #[instrument(level = "debug", skip_all, fields(effect = %request))]
    pub fn render_with_cancel(
        &self,
        input: &PcmBuffer,
        request: &EffectRequest,
        cancel: &CancelToken,
    ) -> Result<PcmBuffer> {
        request.validate()?;
        if input.is_empty() {
            return Err(AudioError::EmptyInput);
        }

        let output_length = request.output_length(input);
        let limit = u64::from(self.settings.max_render_seconds) * u64::from(input.sample_rate());
        if output_length as u64 > limit {
            return Err(AudioError::RenderFailure(format!(
                "render of {} samples exceeds the {} s limit",
                output_length, self.settings.max_render_seconds
            )));
        }

        let graph = request.build_graph(input, &self.settings)?;
        debug!(
            effect = %request,
            channels = input.number_of_channels(),
            sample_rate = input.sample_rate(),
            input_len = input.len(),
            output_len = output_length,
            stages = graph.len(),
            "rendering"
        );
        graph.render(input, cancel)
    }
}
