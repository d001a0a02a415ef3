//! The unit table: base-dimension symbols, aliases, linear conversion
//! factors, the temperature affine special case, and expansion of derived
//! units (`Hz`, `N`, `Pa`, `J`, `W`, ...) into their base decomposition.

use crate::dimension::{DimEntry, Dimension, DimensionMap};
use crate::error::CoreError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// The SI (or otherwise canonical) unit used as the common ground for a
/// dimension's linear conversion factors.
pub fn base_symbol(dim: Dimension) -> &'static str {
    match dim {
        Dimension::Length => "m",
        Dimension::Mass => "kg",
        Dimension::Time => "s",
        Dimension::Temperature => "k",
        Dimension::Data => "b",
        Dimension::Volume => "l",
        Dimension::Currency => "usd",
        Dimension::Angle => "rad",
    }
}

/// Look up a bare (atomic, non-compound) unit symbol or alias.
///
/// Returns the dimension it belongs to and the multiplicative factor to
/// convert a value expressed in this unit into the dimension's base unit.
/// Temperature is linear here too (Kelvin as base); the Celsius/Fahrenheit
/// *offset* is handled separately in [`to_kelvin`]/[`from_kelvin`] because it
/// cannot be expressed as a pure multiplicative factor.
pub fn lookup_unit(name: &str) -> Option<(Dimension, Decimal)> {
    let n = name.to_ascii_lowercase();
    let entry = match n.as_str() {
        // length
        "m" | "meter" | "meters" | "metre" | "metres" => (Dimension::Length, Decimal::ONE),
        "km" | "kilometer" | "kilometers" | "kilometre" | "kilometres" => {
            (Dimension::Length, dec!(1000))
        }
        "cm" | "centimeter" | "centimeters" => (Dimension::Length, dec!(0.01)),
        "mm" | "millimeter" | "millimeters" => (Dimension::Length, dec!(0.001)),
        "nm" | "nanometer" | "nanometers" => (Dimension::Length, dec!(0.000000001)),
        "mi" | "mile" | "miles" => (Dimension::Length, dec!(1609.344)),
        "yd" | "yard" | "yards" => (Dimension::Length, dec!(0.9144)),
        "ft" | "foot" | "feet" => (Dimension::Length, dec!(0.3048)),
        "in" | "inch" | "inches" => (Dimension::Length, dec!(0.0254)),

        // mass
        "kg" | "kilogram" | "kilograms" => (Dimension::Mass, Decimal::ONE),
        "g" | "gram" | "grams" => (Dimension::Mass, dec!(0.001)),
        "mg" | "milligram" | "milligrams" => (Dimension::Mass, dec!(0.000001)),
        "lb" | "lbs" | "pound" | "pounds" => (Dimension::Mass, dec!(0.45359237)),
        "oz" | "ounce" | "ounces" => (Dimension::Mass, dec!(0.028349523125)),
        "t" | "ton" | "tonne" | "tonnes" | "metricton" => (Dimension::Mass, dec!(1000)),

        // time
        "s" | "sec" | "secs" | "second" | "seconds" => (Dimension::Time, Decimal::ONE),
        "ms" | "millisecond" | "milliseconds" => (Dimension::Time, dec!(0.001)),
        "min" | "mins" | "minute" | "minutes" => (Dimension::Time, dec!(60)),
        "h" | "hr" | "hrs" | "hour" | "hours" => (Dimension::Time, dec!(3600)),
        "day" | "days" => (Dimension::Time, dec!(86400)),
        "week" | "weeks" => (Dimension::Time, dec!(604800)),
        // Approximate linear factors; date + quantity arithmetic special-cases
        // these two as calendar (not fixed-duration) shifts, see linecalc-rt's
        // date module.
        "month" | "months" => (Dimension::Time, dec!(2592000)), // 30 days
        "year" | "years" | "yr" | "yrs" => (Dimension::Time, dec!(31557600)), // 365.25 days

        // temperature (linear part only, base = Kelvin)
        "k" | "kelvin" => (Dimension::Temperature, Decimal::ONE),
        "c" | "celsius" | "°c" => (Dimension::Temperature, Decimal::ONE),
        "f" | "fahrenheit" | "°f" => (Dimension::Temperature, Decimal::ONE),

        // data
        "b" | "byte" | "bytes" => (Dimension::Data, Decimal::ONE),
        "kb" | "kilobyte" | "kilobytes" => (Dimension::Data, dec!(1000)),
        "mb" | "megabyte" | "megabytes" => (Dimension::Data, dec!(1000000)),
        "gb" | "gigabyte" | "gigabytes" => (Dimension::Data, dec!(1000000000)),
        "tb" | "terabyte" | "terabytes" => (Dimension::Data, dec!(1000000000000i64)),
        "kib" | "kibibyte" | "kibibytes" => (Dimension::Data, dec!(1024)),
        "mib" | "mebibyte" | "mebibytes" => (Dimension::Data, dec!(1048576)),
        "gib" | "gibibyte" | "gibibytes" => (Dimension::Data, dec!(1073741824)),
        "bit" | "bits" => (Dimension::Data, dec!(0.125)),

        // volume
        "l" | "liter" | "liters" | "litre" | "litres" => (Dimension::Volume, Decimal::ONE),
        "ml" | "milliliter" | "milliliters" => (Dimension::Volume, dec!(0.001)),
        "gal" | "gallon" | "gallons" => (Dimension::Volume, dec!(3.785411784)),
        "qt" | "quart" | "quarts" => (Dimension::Volume, dec!(0.946352946)),
        "pt" | "pint" | "pints" => (Dimension::Volume, dec!(0.473176473)),
        "cup" | "cups" => (Dimension::Volume, dec!(0.2365882365)),
        "floz" | "fluidounce" | "fluidounces" => (Dimension::Volume, dec!(0.0295735295625)),

        // angle
        "rad" | "radian" | "radians" => (Dimension::Angle, Decimal::ONE),
        "deg" | "degree" | "degrees" => (Dimension::Angle, dec!(0.017453292519943295)),
        "grad" | "gradian" | "gradians" => (Dimension::Angle, dec!(0.015707963267948967)),

        _ => return currency_unit(&n),
    };
    Some(entry)
}

fn currency_unit(n: &str) -> Option<(Dimension, Decimal)> {
    const CODES: &[&str] = &[
        "usd", "eur", "gbp", "jpy", "chf", "cad", "aud", "cny", "inr", "krw", "mxn", "brl",
    ];
    if CODES.contains(&n) {
        Some((Dimension::Currency, Decimal::ONE))
    } else {
        None
    }
}

pub fn is_temperature_unit(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "k" | "kelvin" | "c" | "celsius" | "°c" | "f" | "fahrenheit" | "°f"
    )
}

pub fn is_currency_unit(name: &str) -> bool {
    currency_unit(&name.to_ascii_lowercase()).is_some()
}

/// Convert a value expressed in `unit` (a temperature unit) to Kelvin.
pub fn to_kelvin(value: Decimal, unit: &str) -> Result<Decimal, CoreError> {
    match unit.to_ascii_lowercase().as_str() {
        "k" | "kelvin" => Ok(value),
        "c" | "celsius" | "°c" => Ok(value + dec!(273.15)),
        "f" | "fahrenheit" | "°f" => Ok((value - dec!(32)) * dec!(5) / dec!(9) + dec!(273.15)),
        other => Err(CoreError::InvalidUnit(other.to_string())),
    }
}

/// Convert a Kelvin value to the given temperature unit.
pub fn from_kelvin(value: Decimal, unit: &str) -> Result<Decimal, CoreError> {
    match unit.to_ascii_lowercase().as_str() {
        "k" | "kelvin" => Ok(value),
        "c" | "celsius" | "°c" => Ok(value - dec!(273.15)),
        "f" | "fahrenheit" | "°f" => Ok((value - dec!(273.15)) * dec!(9) / dec!(5) + dec!(32)),
        other => Err(CoreError::InvalidUnit(other.to_string())),
    }
}

/// Expand a derived-unit symbol (`Hz`, `N`, `Pa`, `J`, `W`) into its base
/// `DimensionMap`, with exponent 1 on the whole compound.
pub fn derived_unit(name: &str) -> Option<DimensionMap> {
    let mut map = DimensionMap::new();
    match name {
        "Hz" | "hz" => {
            map.insert(Dimension::Time, DimEntry::new(-1, "s"));
        }
        "N" => {
            map.insert(Dimension::Mass, DimEntry::new(1, "kg"));
            map.insert(Dimension::Length, DimEntry::new(1, "m"));
            map.insert(Dimension::Time, DimEntry::new(-2, "s"));
        }
        "Pa" | "pa" => {
            map.insert(Dimension::Mass, DimEntry::new(1, "kg"));
            map.insert(Dimension::Length, DimEntry::new(-1, "m"));
            map.insert(Dimension::Time, DimEntry::new(-2, "s"));
        }
        "J" => {
            map.insert(Dimension::Mass, DimEntry::new(1, "kg"));
            map.insert(Dimension::Length, DimEntry::new(2, "m"));
            map.insert(Dimension::Time, DimEntry::new(-2, "s"));
        }
        "W" => {
            map.insert(Dimension::Mass, DimEntry::new(1, "kg"));
            map.insert(Dimension::Length, DimEntry::new(2, "m"));
            map.insert(Dimension::Time, DimEntry::new(-3, "s"));
        }
        _ => return None,
    }
    Some(map)
}

/// Names recognised as "unit fragments" by the lexer's greedy compound-unit
/// scan. Includes every alias above plus the derived-unit symbols.
pub fn is_known_unit_fragment(name: &str) -> bool {
    lookup_unit(name).is_some() || derived_unit(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_unit_aliases_agree() {
        let (dim_a, factor_a) = lookup_unit("kilometers").unwrap();
        let (dim_b, factor_b) = lookup_unit("km").unwrap();
        assert_eq!(dim_a, dim_b);
        assert_eq!(factor_a, factor_b);
    }

    #[test]
    fn test_celsius_to_kelvin_round_trip() {
        let k = to_kelvin(dec!(100), "celsius").unwrap();
        assert_eq!(k, dec!(373.15));
        let back = from_kelvin(k, "celsius").unwrap();
        assert_eq!(back, dec!(100));
    }

    #[test]
    fn test_fahrenheit_freezing_point_is_273_15_kelvin() {
        let k = to_kelvin(dec!(32), "fahrenheit").unwrap();
        assert_eq!(k, dec!(273.15));
    }

    #[test]
    fn test_is_temperature_unit() {
        assert!(is_temperature_unit("F"));
        assert!(is_temperature_unit("kelvin"));
        assert!(!is_temperature_unit("m"));
    }

    #[test]
    fn test_is_currency_unit() {
        assert!(is_currency_unit("USD"));
        assert!(!is_currency_unit("kg"));
    }

    #[test]
    fn test_derived_unit_newton_decomposes() {
        let n = derived_unit("N").unwrap();
        assert_eq!(n.0.get(&Dimension::Mass).unwrap().exponent, 1);
        assert_eq!(n.0.get(&Dimension::Length).unwrap().exponent, 1);
        assert_eq!(n.0.get(&Dimension::Time).unwrap().exponent, -2);
    }

    #[test]
    fn test_is_known_unit_fragment() {
        assert!(is_known_unit_fragment("cm"));
        assert!(is_known_unit_fragment("Hz"));
        assert!(!is_known_unit_fragment("bogon"));
    }
}
