//! WAV container support
//!
//! Export writes the fixed 44-byte RIFF/WAVE layout (16-bit PCM,
//! little-endian) byte for byte. Import goes through `hound` and accepts
//! integer and float PCM.

mod decode;
mod encode;

pub use decode::{decode_wav, read_wav};
pub use encode::{encode_wav, sample_to_pcm16, save_wav, write_wav, WAV_HEADER_LEN};

use resonare_core::domain::audio::AudioError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WavError>;

/// Errors that can occur while reading or writing WAV files
#[derive(Debug, Error)]
pub enum WavError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV decoding error: {0}")]
    Decode(#[from] hound::Error),

    #[error("Invalid audio: {0}")]
    Audio(#[from] AudioError),

    #[error("Unsupported WAV format: {0}")]
    Unsupported(String),

    #[error("Buffer does not fit in a WAV container: {0}")]
    TooLarge(String),
}
