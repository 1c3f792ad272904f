//! `KIND=VALUE` effect arguments
//!
//! `VALUE` is a number (`reverb=0.4`) or a comma separated list
//! (`eq=3,-2,1.5`).

use resonare_core::domain::effects::{EffectRequest, EffectValue};

/// Parse one `--effect` argument into a validated request
pub fn parse_effect_arg(arg: &str) -> Result<EffectRequest, String> {
    let (kind, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KIND=VALUE, got {:?}", arg))?;

    let numbers = value
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| format!("{:?} is not a number: {}", part.trim(), e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let value = match numbers.as_slice() {
        [single] => EffectValue::Scalar(*single),
        _ => EffectValue::List(numbers),
    };
    EffectRequest::parse(kind.trim(), value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use resonare_core::domain::effects::{EqParams, FilterParams};
    use resonare_core::domain::dsp::FilterShape;

    #[test]
    fn test_scalar_argument() {
        let request = parse_effect_arg("lowpass=1200").unwrap();
        assert_eq!(
            request,
            EffectRequest::Filter(FilterParams {
                shape: FilterShape::Lowpass,
                frequency: 1200.0,
                q: None,
            })
        );
    }

    #[test]
    fn test_list_argument() {
        let request = parse_effect_arg("eq=3, -2, 1.5").unwrap();
        assert_eq!(
            request,
            EffectRequest::Eq(EqParams {
                low_db: 3.0,
                mid_db: -2.0,
                high_db: 1.5,
            })
        );
    }

    #[test]
    fn test_malformed_arguments() {
        assert!(parse_effect_arg("reverb").is_err());
        assert!(parse_effect_arg("reverb=lots").is_err());
        assert!(parse_effect_arg("eq=1,2").is_err());

        let err = parse_effect_arg("chorus=0.5").unwrap_err();
        assert!(err.contains("chorus"));
    }
}
