//! Property tests over random buffers and parameters

use proptest::prelude::*;
use resonare_core::domain::analysis::{spectrogram, waveform, AnalysisSettings};
use resonare_core::domain::audio::PcmBuffer;
use resonare_core::domain::effects::{EffectKind, EffectRequest};
use resonare_core::domain::render::RenderEngine;

fn arb_buffer() -> impl Strategy<Value = PcmBuffer> {
    (
        prop::sample::select(vec![8000u32, 22050, 44100]),
        1usize..=3,
        1usize..400,
    )
        .prop_flat_map(|(sample_rate, channels, len)| {
            prop::collection::vec(prop::collection::vec(-1.0f32..=1.0, len), channels)
                .prop_map(move |data| PcmBuffer::new(sample_rate, data).unwrap())
        })
}

fn arb_request() -> impl Strategy<Value = EffectRequest> {
    prop_oneof![
        (200.0f32..3500.0).prop_map(|f| EffectRequest::parse("lowpass", f).unwrap()),
        (200.0f32..3500.0).prop_map(|f| EffectRequest::parse("highpass", f).unwrap()),
        (0.5f32..2.0).prop_map(|f| EffectRequest::parse("timeStretch", f).unwrap()),
        (-12.0f32..12.0).prop_map(|s| EffectRequest::parse("pitchShift", s).unwrap()),
        (0.0f32..=1.0, any::<u32>())
            .prop_map(|(a, seed)| EffectRequest::parse("reverb", a).unwrap().with_seed(seed)),
        (-80.0f32..0.0).prop_map(|db| EffectRequest::parse("noiseGate", db).unwrap()),
        (0.0f32..=1.0).prop_map(|a| EffectRequest::parse("compression", a).unwrap()),
        (-12.0f32..12.0, -12.0f32..12.0, -12.0f32..12.0)
            .prop_map(|(l, m, h)| EffectRequest::parse("eq", vec![l, m, h]).unwrap()),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_render_preserves_format_and_range(input in arb_buffer(), request in arb_request()) {
        let out = RenderEngine::default().render(&input, &request).unwrap();

        prop_assert_eq!(out.sample_rate(), input.sample_rate());
        prop_assert_eq!(out.number_of_channels(), input.number_of_channels());
        prop_assert_eq!(out.len(), request.output_length(&input));
        prop_assert!(out.channels().flatten().all(|s| s.is_finite() && s.abs() <= 1.0));
    }

    #[test]
    fn prop_time_stretch_length_is_ceiling(input in arb_buffer(), factor in 0.25f32..4.0) {
        let request = EffectRequest::parse("timeStretch", factor).unwrap();
        let out = RenderEngine::default().render(&input, &request).unwrap();
        let expected = (input.len() as f64 * f64::from(factor)).ceil() as usize;
        prop_assert_eq!(out.len(), expected);
    }

    #[test]
    fn prop_zero_pitch_shift_is_identity(input in arb_buffer()) {
        let request = EffectRequest::parse("pitchShift", 0.0).unwrap();
        let out = RenderEngine::default().render(&input, &request).unwrap();
        prop_assert_eq!(out, input);
    }

    #[test]
    fn prop_zero_db_gate_is_silent(input in arb_buffer()) {
        let request = EffectRequest::parse("noiseGate", 0.0).unwrap();
        let out = RenderEngine::default().render(&input, &request).unwrap();
        prop_assert!(out.channels().flatten().all(|&s| s == 0.0));
    }

    #[test]
    fn prop_flat_eq_is_near_identity(input in arb_buffer()) {
        let request = EffectRequest::parse("eq", vec![0.0_f32, 0.0, 0.0]).unwrap();
        let out = RenderEngine::default().render(&input, &request).unwrap();
        for (a, b) in out.channels().flatten().zip(input.channels().flatten()) {
            prop_assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
        }
    }

    #[test]
    fn prop_waveform_has_one_sample_per_column(input in arb_buffer(), width in 1usize..1000) {
        let wave = waveform(&input, width).unwrap();
        prop_assert_eq!(wave.width(), width);
        prop_assert_eq!(wave.step(), input.len().div_ceil(width));
    }

    #[test]
    fn prop_spectrogram_frame_count(input in arb_buffer(), fft_pow in 5u32..10) {
        let settings = AnalysisSettings {
            fft_size: 1 << fft_pow,
            ..AnalysisSettings::default()
        };
        let spec = spectrogram(&input, 640.0, &settings).unwrap();
        prop_assert_eq!(spec.frames().len(), input.len().div_ceil(settings.fft_size));
        for frame in spec.frames() {
            prop_assert_eq!(frame.levels.len(), settings.fft_size / 2);
        }
    }

    #[test]
    fn prop_wire_names_round_trip(index in 0usize..EffectKind::ALL.len()) {
        let kind = EffectKind::ALL[index];
        prop_assert_eq!(kind.as_str().parse::<EffectKind>().unwrap(), kind);
    }
}
