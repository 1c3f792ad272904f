//! File I/O for resonare: WAV encoding for export and decoding for import

pub mod wav;

pub use wav::*;
