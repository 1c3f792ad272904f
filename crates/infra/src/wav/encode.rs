use super::{Result, WavError};
use resonare_core::domain::audio::{clamp_sample, PcmBuffer};
use std::path::Path;
use tracing::{debug, info, instrument};

/// RIFF header + `fmt ` chunk + `data` chunk header
pub const WAV_HEADER_LEN: usize = 44;

const BITS_PER_SAMPLE: u16 = 16;

/// Clamp to [-1, 1], scale by 32768 (negative) or 32767 (positive), truncate
#[inline]
pub fn sample_to_pcm16(sample: f32) -> i16 {
    let s = clamp_sample(sample);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Encode a buffer as a 16-bit PCM WAV file image
///
/// Samples are interleaved frame by frame in channel order.
pub fn encode_wav(buffer: &PcmBuffer) -> Result<Vec<u8>> {
    let channels = u16::try_from(buffer.number_of_channels())
        .map_err(|_| WavError::TooLarge(format!("{} channels", buffer.number_of_channels())))?;
    let sample_rate = buffer.sample_rate();
    let block_align = channels
        .checked_mul(BITS_PER_SAMPLE / 8)
        .ok_or_else(|| WavError::TooLarge(format!("{} channels", channels)))?;
    let byte_rate = u32::from(block_align)
        .checked_mul(sample_rate)
        .ok_or_else(|| WavError::TooLarge(format!("byte rate at {} Hz", sample_rate)))?;
    let data_size = u32::try_from(buffer.len() as u64 * u64::from(block_align))
        .ok()
        .filter(|size| *size <= u32::MAX - 36)
        .ok_or_else(|| WavError::TooLarge(format!("{} frames", buffer.len())))?;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(WAV_HEADER_LEN + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    let channel_data: Vec<&[f32]> = buffer.channels().collect();
    for frame in 0..buffer.len() {
        for channel in &channel_data {
            buf.extend_from_slice(&sample_to_pcm16(channel[frame]).to_le_bytes());
        }
    }

    debug!(
        channels,
        sample_rate,
        frames = buffer.len(),
        bytes = buf.len(),
        "WAV encoded"
    );
    Ok(buf)
}

/// Encode and write to `path`
#[instrument(skip(buffer, path))]
pub fn write_wav<P: AsRef<Path>>(path: P, buffer: &PcmBuffer) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode_wav(buffer)?;
    std::fs::write(path, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "WAV written");
    Ok(())
}

/// Async variant of [`write_wav`]; creates missing parent directories
#[instrument(skip(buffer, path))]
pub async fn save_wav<P: AsRef<Path>>(path: P, buffer: &PcmBuffer) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode_wav(buffer)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &bytes).await?;
    info!(path = %path.display(), bytes = bytes.len(), "WAV saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u16(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    fn read_u32(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn read_i16(bytes: &[u8], offset: usize) -> i16 {
        i16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    #[test]
    fn test_header_layout() {
        let buffer = PcmBuffer::new(44100, vec![vec![0.0; 100], vec![0.0; 100]]).unwrap();
        let wav = encode_wav(&buffer).unwrap();

        assert_eq!(wav.len(), WAV_HEADER_LEN + 400);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(read_u32(&wav, 4), 36 + 400);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(read_u32(&wav, 16), 16);
        assert_eq!(read_u16(&wav, 20), 1);
        assert_eq!(read_u16(&wav, 22), 2);
        assert_eq!(read_u32(&wav, 24), 44100);
        assert_eq!(read_u32(&wav, 28), 44100 * 2 * 2);
        assert_eq!(read_u16(&wav, 32), 4);
        assert_eq!(read_u16(&wav, 34), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(read_u32(&wav, 40), 400);
    }

    #[test]
    fn test_sample_scaling() {
        let buffer = PcmBuffer::mono(1, vec![0.0, 0.5, -0.5, 1.0, -1.0]).unwrap();
        let wav = encode_wav(&buffer).unwrap();

        assert_eq!(read_i16(&wav, 44), 0);
        assert_eq!(read_i16(&wav, 46), 16383);
        assert_eq!(read_i16(&wav, 48), -16384);
        assert_eq!(read_i16(&wav, 50), 32767);
        assert_eq!(read_i16(&wav, 52), -32768);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        assert_eq!(sample_to_pcm16(1.7), 32767);
        assert_eq!(sample_to_pcm16(-3.0), -32768);
        assert_eq!(sample_to_pcm16(f32::NAN), 0);
    }

    #[test]
    fn test_interleaving() {
        let buffer = PcmBuffer::new(8000, vec![vec![1.0, 0.0], vec![-1.0, 0.5]]).unwrap();
        let wav = encode_wav(&buffer).unwrap();
        assert_eq!(read_i16(&wav, 44), 32767);
        assert_eq!(read_i16(&wav, 46), -32768);
        assert_eq!(read_i16(&wav, 48), 0);
        assert_eq!(read_i16(&wav, 50), 16383);
    }

    #[test]
    fn test_empty_buffer_is_header_only() {
        let buffer = PcmBuffer::silence(22050, 1, 0).unwrap();
        let wav = encode_wav(&buffer).unwrap();
        assert_eq!(wav.len(), WAV_HEADER_LEN);
        assert_eq!(read_u32(&wav, 40), 0);
    }
}
