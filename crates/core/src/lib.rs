//! Offline audio processing core for resonare
//!
//! Buffers, DSP primitives, the effect library, the offline render engine,
//! and the waveform/spectrogram analyzers all live under [`domain`].

pub mod domain;

pub use domain::*;
