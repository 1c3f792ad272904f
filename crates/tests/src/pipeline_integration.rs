//! Integration tests for the offline pipeline
//!
//! These tests go through the public surface of every crate: WAV files in,
//! effect chains through the render engine and edit session, WAV files out.

use crate::{calc_peak, calc_rms, generate_silence, generate_sine_wave, stereo_test_buffer};
use resonare_app::{parse_effect_arg, render_file};
use resonare_core::domain::analysis::{spectrogram, waveform, AnalysisSettings};
use resonare_core::domain::audio::{AudioError, PcmBuffer};
use resonare_core::domain::chain::{replay, EditSession, EffectChain};
use resonare_core::domain::config::PresetManager;
use resonare_core::domain::effects::EffectRequest;
use resonare_core::domain::render::{RenderEngine, RenderSettings};
use resonare_infra::wav::{decode_wav, encode_wav, read_wav, write_wav};
use tempfile::TempDir;

fn effect(arg: &str) -> EffectRequest {
    parse_effect_arg(arg).unwrap()
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn test_compressing_silence_keeps_silence() {
    let input = PcmBuffer::mono(44100, generate_silence(44100)).unwrap();
    let out = RenderEngine::default()
        .render(&input, &effect("compression=0"))
        .unwrap();

    assert_eq!(out.len(), 44100);
    assert_eq!(out.sample_rate(), 44100);
    assert!(out.channel(0).unwrap().iter().all(|&s| s == 0.0));
}

#[test]
fn test_dry_reverb_is_padded_input() {
    let input = stereo_test_buffer(8000, 100.0).unwrap();
    let out = RenderEngine::default()
        .render(&input, &effect("reverb=0"))
        .unwrap();

    assert_eq!(out.len(), input.len() + 2 * 8000);
    assert_eq!(out.number_of_channels(), 2);
    for (out_ch, in_ch) in out.channels().zip(input.channels()) {
        assert_eq!(&out_ch[..in_ch.len()], in_ch);
        assert!(out_ch[in_ch.len()..].iter().all(|&s| s == 0.0));
    }
}

#[test]
fn test_zero_db_gate_silences_everything() {
    let input = stereo_test_buffer(22050, 50.0).unwrap();
    let out = RenderEngine::default()
        .render(&input, &effect("noiseGate=0"))
        .unwrap();
    assert!(out.channels().all(|c| c.iter().all(|&s| s == 0.0)));
}

#[test]
fn test_highpass_removes_low_tone() {
    let sr = 44100;
    let input = PcmBuffer::mono(sr, generate_sine_wave(50.0, sr, 500.0)).unwrap();
    let out = RenderEngine::default()
        .render(&input, &effect("highpass=2000"))
        .unwrap();
    let tail = &out.channel(0).unwrap()[sr as usize / 10..];
    assert!(calc_rms(tail) < 0.01);
}

#[test]
fn test_unknown_effect_is_reported_not_fatal() {
    let err = EffectRequest::parse("bitcrush", 0.5).unwrap_err();
    assert_eq!(err, AudioError::UnsupportedEffect("bitcrush".to_string()));
}

#[test]
fn test_wav_export_scaling() {
    let buffer = PcmBuffer::mono(1, vec![0.0, 0.5, -0.5, 1.0, -1.0]).unwrap();
    let bytes = encode_wav(&buffer).unwrap();
    let read = |offset: usize| i16::from_le_bytes([bytes[offset], bytes[offset + 1]]);

    assert_eq!(read(44), 0);
    assert!(matches!(read(46), 16383 | 16384));
    assert_eq!(read(48), -16384);
    assert_eq!(read(50), 32767);
    assert_eq!(read(52), -32768);
}

// ============================================================================
// SESSION AND REPLAY
// ============================================================================

#[test]
fn test_session_matches_replay_for_mixed_chain() {
    let input = stereo_test_buffer(16000, 250.0).unwrap();
    let mut session = EditSession::new(RenderEngine::default(), input.clone());
    for arg in [
        "lowpass=3000",
        "compression=0.4",
        "timeStretch=1.25",
        "reverb=0.2",
        "pitchShift=-3",
        "eq=2,0,-4",
        "noiseGate=-60",
    ] {
        assert!(session.apply(effect(arg)).unwrap());
    }

    let replayed = replay(session.engine(), &input, session.chain()).unwrap();
    assert_eq!(&replayed, session.current());
    assert_eq!(session.current().number_of_channels(), 2);
    assert!(calc_peak(&session.current().interleaved()) <= 1.0);
}

#[test]
fn test_undo_all_returns_to_original() {
    let input = stereo_test_buffer(8000, 100.0).unwrap();
    let mut session = EditSession::new(RenderEngine::default(), input.clone());
    session.apply(effect("timeStretch=2")).unwrap();
    session.apply(effect("reverb=0.7")).unwrap();

    while session.undo().unwrap() {}
    assert_eq!(session.current(), &input);
    assert!(session.can_redo());
}

#[test]
fn test_concurrent_renders_share_source() {
    let input = stereo_test_buffer(22050, 200.0).unwrap();
    let engine = RenderEngine::default();
    let request = effect("eq=6,-3,2");

    let results: Vec<PcmBuffer> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| engine.render(&input, &request).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn test_first_channel_policy_upmixes() {
    let engine = RenderEngine::new(RenderSettings {
        channel_policy: resonare_core::domain::render::ChannelPolicy::FirstChannel,
        ..RenderSettings::default()
    });
    let input = stereo_test_buffer(8000, 100.0).unwrap();
    let out = engine.render(&input, &effect("pitchShift=7")).unwrap();
    assert_eq!(out.channel(0), out.channel(1));
}

// ============================================================================
// FILES AND PRESETS
// ============================================================================

#[tokio::test]
async fn test_render_file_end_to_end() {
    let dir = TempDir::new().unwrap();
    let input_path = dir.path().join("in.wav");
    let output_path = dir.path().join("nested").join("out.wav");
    let input = stereo_test_buffer(22050, 200.0).unwrap();
    write_wav(&input_path, &input).unwrap();

    let chain: EffectChain = ["timeStretch=1.5", "compression=0.3", "volume=0.8"]
        .into_iter()
        .map(effect)
        .collect();
    let report = render_file(&input_path, &output_path, chain, RenderSettings::default())
        .await
        .unwrap();

    let expected_len = (input.len() as f64 * 1.5).ceil() as usize;
    assert_eq!(report.frames, expected_len);
    assert_eq!(report.applied, 2);
    assert_eq!(report.volume, 0.8);

    let written = read_wav(&output_path).unwrap();
    assert_eq!(written.len(), expected_len);
    assert_eq!(written.sample_rate(), 22050);
    assert_eq!(written.number_of_channels(), 2);
}

#[tokio::test]
async fn test_render_file_reports_bad_input() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.wav");
    let result = render_file(
        &missing,
        &dir.path().join("out.wav"),
        EffectChain::new(),
        RenderSettings::default(),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_preset_drives_session() {
    let dir = TempDir::new().unwrap();
    let presets = PresetManager::new(dir.path().to_path_buf());
    let chain: EffectChain = ["bandpass=800", "reverb=0.3", "noiseGate=-50"]
        .into_iter()
        .map(effect)
        .collect::<EffectChain>()
        .seeded();
    presets.save_preset("radio", &chain).await.unwrap();

    let loaded = presets.load_preset("radio").await.unwrap();
    assert_eq!(loaded, chain);

    let input = stereo_test_buffer(16000, 100.0).unwrap();
    let mut session = EditSession::new(RenderEngine::default(), input.clone());
    session.load_chain(&loaded).unwrap();
    let expected = replay(&RenderEngine::default(), &input, &chain).unwrap();
    assert_eq!(session.current(), &expected);
}

#[test]
fn test_export_reimport_analysis() {
    let sr = 44100;
    let input = PcmBuffer::mono(sr, generate_sine_wave(1000.0, sr, 100.0)).unwrap();
    let processed = RenderEngine::default()
        .render(&input, &effect("lowpass=5000"))
        .unwrap();
    let reimported = decode_wav(&encode_wav(&processed).unwrap()).unwrap();

    let wave = waveform(&reimported, 200).unwrap();
    assert_eq!(wave.width(), 200);

    let spec = spectrogram(&reimported, 400.0, &AnalysisSettings::default()).unwrap();
    assert_eq!(spec.frames().len(), reimported.len().div_ceil(2048));
    let loudest = spec.frames()[0]
        .levels
        .iter()
        .enumerate()
        .max_by_key(|(_, v)| **v)
        .map(|(i, _)| i)
        .unwrap();
    let peak_hz = spec.bin_frequency(loudest);
    assert!((peak_hz - 1000.0).abs() < 100.0, "peak at {} Hz", peak_hz);
}
