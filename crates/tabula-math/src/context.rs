use std::num::NonZeroU64;
use std::sync::RwLock;

use bigdecimal::{BigDecimal, RoundingMode};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Rounding applied when a decimal result exceeds the configured precision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    Up,
    Down,
    Ceiling,
    Floor,
    HalfUp,
    HalfDown,
    #[default]
    HalfEven,
}

impl From<Rounding> for RoundingMode {
    fn from(r: Rounding) -> Self {
        match r {
            Rounding::Up => RoundingMode::Up,
            Rounding::Down => RoundingMode::Down,
            Rounding::Ceiling => RoundingMode::Ceiling,
            Rounding::Floor => RoundingMode::Floor,
            Rounding::HalfUp => RoundingMode::HalfUp,
            Rounding::HalfDown => RoundingMode::HalfDown,
            Rounding::HalfEven => RoundingMode::HalfEven,
        }
    }
}

/// Precision and rounding for arbitrary-precision decimal arithmetic.
///
/// `precision` counts significant digits; zero means unlimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MathConfig {
    /// Significant digits kept by decimal division and by conversion into a
    /// decimal (0 = unlimited).
    pub precision: u64,
    /// Rounding mode used when digits are dropped.
    #[serde(default)]
    pub rounding: Rounding,
}

impl Default for MathConfig {
    fn default() -> Self {
        Self::decimal64()
    }
}

impl MathConfig {
    /// 7 digits, half-even.
    pub const fn decimal32() -> Self {
        Self { precision: 7, rounding: Rounding::HalfEven }
    }

    /// 16 digits, half-even. The process default.
    pub const fn decimal64() -> Self {
        Self { precision: 16, rounding: Rounding::HalfEven }
    }

    /// 34 digits, half-even.
    pub const fn decimal128() -> Self {
        Self { precision: 34, rounding: Rounding::HalfEven }
    }

    /// No rounding except on division, which falls back to the decimal
    /// library's own division precision.
    pub const fn unlimited() -> Self {
        Self { precision: 0, rounding: Rounding::HalfUp }
    }

    /// Round `value` to this context.
    pub fn round(&self, value: BigDecimal) -> BigDecimal {
        match NonZeroU64::new(self.precision) {
            Some(precision) => value.with_precision_round(precision, self.rounding.into()),
            None => value,
        }
    }
}

static CONTEXT: RwLock<MathConfig> = RwLock::new(MathConfig::decimal64());

/// The process-wide decimal context.
pub fn math_config() -> MathConfig {
    *CONTEXT.read().expect("math context lock poisoned")
}

/// Replace the process-wide decimal context, returning the previous one.
pub fn set_math_config(config: MathConfig) -> MathConfig {
    let mut guard = CONTEXT.write().expect("math context lock poisoned");
    let previous = std::mem::replace(&mut *guard, config);
    info!(precision = config.precision, rounding = ?config.rounding, "math context updated");
    previous
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn presets() {
        assert_eq!(MathConfig::default(), MathConfig::decimal64());
        assert_eq!(MathConfig::decimal32().precision, 7);
        assert_eq!(MathConfig::decimal128().precision, 34);
        assert_eq!(MathConfig::unlimited().precision, 0);
    }

    #[test]
    fn rounding_to_precision() {
        let v = BigDecimal::from_str("1.23456789").unwrap();
        let r = MathConfig::decimal32().round(v.clone());
        assert_eq!(r.to_string(), "1.234568");
        assert_eq!(MathConfig::unlimited().round(v.clone()), v);

        let down = MathConfig { precision: 3, rounding: Rounding::Down };
        assert_eq!(down.round(BigDecimal::from_str("9.999").unwrap()).to_string(), "9.99");
    }

    #[test]
    fn config_from_toml() {
        let config: MathConfig = toml::from_str("precision = 34\nrounding = \"half_up\"").unwrap();
        assert_eq!(config.precision, 34);
        assert_eq!(config.rounding, Rounding::HalfUp);

        let config: MathConfig = toml::from_str("precision = 7").unwrap();
        assert_eq!(config.rounding, Rounding::HalfEven);
    }
}
