use super::{Result, WavError};
use hound::{SampleFormat, WavReader};
use resonare_core::domain::audio::PcmBuffer;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;
use tracing::{debug, instrument};

/// Read a WAV file into a buffer, samples normalized to [-1, 1]
#[instrument(skip(path))]
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<PcmBuffer> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let buffer = decode(WavReader::new(BufReader::new(file))?)?;
    debug!(
        path = %path.display(),
        channels = buffer.number_of_channels(),
        sample_rate = buffer.sample_rate(),
        frames = buffer.len(),
        "WAV read"
    );
    Ok(buffer)
}

/// Decode an in-memory WAV image
pub fn decode_wav(bytes: &[u8]) -> Result<PcmBuffer> {
    decode(WavReader::new(Cursor::new(bytes))?)
}

fn decode<R: Read>(reader: WavReader<R>) -> Result<PcmBuffer> {
    let spec = reader.spec();
    let channels = usize::from(spec.channels);

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, bits @ 8..=32) => {
            let scale = 1.0 / (1_i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()?
        }
        (format, bits) => {
            return Err(WavError::Unsupported(format!(
                "{:?} samples with {} bits",
                format, bits
            )))
        }
    };

    Ok(PcmBuffer::from_interleaved(
        spec.sample_rate,
        channels,
        &interleaved,
    )?)
}
