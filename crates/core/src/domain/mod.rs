//! Domain entities and business rules

pub mod analysis;
pub mod audio;
pub mod chain;
pub mod config;
pub mod dsp;
pub mod effects;
pub mod render;

// Re-export specific items to avoid ambiguous glob imports (two `Result` aliases)
pub use analysis::{
    spectrogram, waveform, AnalysisSettings, Cell, Hsl, Spectrogram, SpectrogramAnalyzer,
    SpectrumFrame, Waveform,
};
pub use audio::{clamp_sample, AudioError, PcmBuffer};
pub use chain::{replay, replay_with_cancel, EditSession, EffectChain};
pub use config::{ConfigError, ConfigManager, ExportConfig, PresetManager, ResonareConfig};
pub use dsp::{
    db_to_gain, gain_to_db, BiquadCoeffs, BiquadFilter, BiquadStage, Compressor,
    CompressorParams, FilterShape, NoiseGate,
};
pub use effects::{
    CompressionParams, EffectKind, EffectRequest, EffectValue, EqParams, FilterParams,
    NoiseGateParams, PitchShiftParams, ReverbParams, TimeStretchParams, VolumeParams,
};
pub use render::{
    CancelToken, ChannelPolicy, RenderBlock, RenderEngine, RenderSettings, SignalGraph, Stage,
};
