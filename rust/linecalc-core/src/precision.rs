use rust_decimal::Decimal;
use std::str::FromStr;

/// Threaded through `EvaluationContext`; governs how many significant digits
/// survive a round trip through `f64` for transcendental functions.
///
/// Plain `+ - * /` never go through this — `Decimal` arithmetic is exact (or,
/// for division, exact to `Decimal`'s own 28-digit scale), which is what
/// makes `0.1 + 0.2 == 0.3` hold without special-casing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecisionConfig {
    pub significant_digits: u32,
}

impl Default for PrecisionConfig {
    fn default() -> Self {
        Self {
            significant_digits: 20,
        }
    }
}

impl PrecisionConfig {
    pub fn new(significant_digits: u32) -> Self {
        Self {
            significant_digits: significant_digits.clamp(1, 28),
        }
    }

    /// Round `d` to this config's number of significant digits.
    pub fn round(&self, d: Decimal) -> Decimal {
        round_significant(d, self.significant_digits)
    }

    /// Compute a transcendental function via `f64`, then round the result
    /// back to the configured precision.
    pub fn via_f64(&self, d: Decimal, f: impl FnOnce(f64) -> f64) -> Decimal {
        let input = d.to_string().parse::<f64>().unwrap_or(0.0);
        let out = f(input);
        let rounded = format!("{:.*e}", (self.significant_digits as usize).saturating_sub(1), out);
        Decimal::from_scientific(&rounded)
            .ok()
            .or_else(|| Decimal::from_str(&out.to_string()).ok())
            .map(|v| self.round(v))
            .unwrap_or_default()
    }
}

/// Round a `Decimal` to `digits` significant figures (not decimal places).
pub fn round_significant(d: Decimal, digits: u32) -> Decimal {
    if d.is_zero() {
        return d;
    }
    let magnitude = d.abs().to_string().trim_start_matches('-').len() as i64;
    let int_digits = {
        let abs = d.abs();
        if abs >= Decimal::ONE {
            abs.trunc().to_string().len() as i64
        } else {
            // leading zeros after the decimal point count negatively
            let s = abs.to_string();
            let frac = s.split('.').nth(1).unwrap_or("");
            let leading_zeros = frac.chars().take_while(|c| *c == '0').count() as i64;
            -leading_zeros
        }
    };
    let _ = magnitude;
    let dp = (digits as i64 - int_digits).max(0) as u32;
    d.round_dp(dp.min(28))
}

/// Approximation of sqrt using `Decimal`'s own checked sqrt when available,
/// falling back to an `f64` round trip for everything else.
pub fn decimal_sqrt(d: Decimal, precision: &PrecisionConfig) -> Option<Decimal> {
    if d.is_sign_negative() {
        return None;
    }
    d.sqrt().map(|v| precision.round(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_significant_truncates_int_digits() {
        assert_eq!(round_significant(dec!(123.456), 4), dec!(123.5));
    }

    #[test]
    fn test_round_significant_zero_is_zero() {
        assert_eq!(round_significant(dec!(0), 5), dec!(0));
    }

    #[test]
    fn test_round_significant_small_fraction_keeps_leading_zeros() {
        let rounded = round_significant(dec!(0.000123456), 3);
        assert_eq!(rounded, dec!(0.000123));
    }

    #[test]
    fn test_precision_config_clamps_to_valid_range() {
        assert_eq!(PrecisionConfig::new(0).significant_digits, 1);
        assert_eq!(PrecisionConfig::new(100).significant_digits, 28);
    }

    #[test]
    fn test_decimal_sqrt_of_negative_is_none() {
        let p = PrecisionConfig::default();
        assert!(decimal_sqrt(dec!(-1), &p).is_none());
    }

    #[test]
    fn test_decimal_sqrt_perfect_square() {
        let p = PrecisionConfig::default();
        assert_eq!(decimal_sqrt(dec!(9), &p).unwrap(), dec!(3));
    }

    #[test]
    fn test_via_f64_rounds_transcendental_result() {
        let p = PrecisionConfig::new(5);
        let result = p.via_f64(dec!(0), |_| std::f64::consts::PI);
        assert_eq!(result, dec!(3.1416));
    }
}
