//! PCM buffers and the audio error type
//!
//! A [`PcmBuffer`] is the value every component of the pipeline consumes and
//! produces. It is never mutated after construction: effects always allocate
//! a fresh buffer and leave their input untouched.

use thiserror::Error;

/// Errors that can occur while validating, rendering or analysing audio
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AudioError {
    /// A parameter is out of range or malformed
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The requested effect kind is not known
    #[error("Unsupported effect: {0}")]
    UnsupportedEffect(String),

    /// There is no audio to process (absent or zero-length buffer)
    #[error("Empty input: nothing to process")]
    EmptyInput,

    /// The render could not be completed (allocation, size limits)
    #[error("Render failure: {0}")]
    RenderFailure(String),

    /// The render was aborted through its cancel token
    #[error("Render cancelled")]
    Cancelled,
}

impl AudioError {
    /// `EmptyInput` means "nothing to do" rather than a hard failure
    pub fn is_no_op(&self) -> bool {
        matches!(self, AudioError::EmptyInput)
    }
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Multi-channel block of floating point samples at a fixed sample rate
///
/// Invariant: at least one channel, and every channel holds exactly
/// `len()` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    sample_rate: u32,
    length: usize,
    channels: Vec<Vec<f32>>,
}

impl PcmBuffer {
    /// Build a buffer from per-channel sample vectors
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidParameter(
                "sample rate must be positive".to_string(),
            ));
        }
        let length = match channels.first() {
            Some(first) => first.len(),
            None => {
                return Err(AudioError::InvalidParameter(
                    "a buffer needs at least one channel".to_string(),
                ))
            }
        };
        if let Some((index, channel)) = channels
            .iter()
            .enumerate()
            .find(|(_, channel)| channel.len() != length)
        {
            return Err(AudioError::InvalidParameter(format!(
                "channel {} has {} samples, expected {}",
                index,
                channel.len(),
                length
            )));
        }

        Ok(Self {
            sample_rate,
            length,
            channels,
        })
    }

    /// Single channel buffer
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Result<Self> {
        Self::new(sample_rate, vec![samples])
    }

    /// Buffer of `length` zero samples on every channel
    pub fn silence(sample_rate: u32, number_of_channels: usize, length: usize) -> Result<Self> {
        Self::new(sample_rate, vec![vec![0.0; length]; number_of_channels])
    }

    /// De-interleave `frame0ch0, frame0ch1, frame1ch0, ...` into channels
    ///
    /// A trailing partial frame is dropped.
    pub fn from_interleaved(
        sample_rate: u32,
        number_of_channels: usize,
        samples: &[f32],
    ) -> Result<Self> {
        if number_of_channels == 0 {
            return Err(AudioError::InvalidParameter(
                "a buffer needs at least one channel".to_string(),
            ));
        }
        let frames = samples.len() / number_of_channels;
        let mut channels = vec![Vec::with_capacity(frames); number_of_channels];
        for frame in samples.chunks_exact(number_of_channels) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
        Self::new(sample_rate, channels)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Duration in seconds (`len / sample_rate`)
    pub fn duration_secs(&self) -> f64 {
        self.length as f64 / self.sample_rate as f64
    }

    /// Half the sample rate
    pub fn nyquist(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.channels.iter().map(Vec::as_slice)
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Frames interleaved in channel order
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.length * self.channels.len());
        for frame in 0..self.length {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
        out
    }

    /// Largest absolute sample value over all channels
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|channel| channel.iter())
            .fold(0.0_f32, |peak, sample| peak.max(sample.abs()))
    }
}

/// Clamp a sample to the legal [-1.0, 1.0] range
#[inline]
pub fn clamp_sample(sample: f32) -> f32 {
    sample.clamp(-1.0, 1.0)
}
