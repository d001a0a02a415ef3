//! Compound-unit dimension algebra.

use crate::error::CoreError;
use crate::units;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The closed set of base dimensions a `Quantity` can carry an exponent on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Length,
    Mass,
    Time,
    Temperature,
    Data,
    Volume,
    Currency,
    Angle,
}

/// One dimension's exponent and the unit it is currently expressed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimEntry {
    pub exponent: i32,
    pub unit: String,
}

impl DimEntry {
    pub fn new(exponent: i32, unit: &str) -> Self {
        Self {
            exponent,
            unit: unit.to_string(),
        }
    }
}

/// A mapping from base dimension to `(exponent, unit)`.
///
/// Invariant: no entry ever has `exponent == 0` — any operation that would
/// produce one removes the entry instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionMap(pub BTreeMap<Dimension, DimEntry>);

impl DimensionMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn single(dim: Dimension, unit: &str, exponent: i32) -> Self {
        let mut m = Self::new();
        if exponent != 0 {
            m.insert(dim, DimEntry::new(exponent, unit));
        }
        m
    }

    pub fn insert(&mut self, dim: Dimension, entry: DimEntry) {
        if entry.exponent == 0 {
            self.0.remove(&dim);
        } else {
            self.0.insert(dim, entry);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when this is exactly one dimension at exponent 1 — the common
    /// case for `5 kg`, `3 m`, etc.
    pub fn simple_unit(&self) -> Option<&str> {
        if self.0.len() == 1 {
            let (_, entry) = self.0.iter().next().unwrap();
            if entry.exponent == 1 {
                return Some(&entry.unit);
            }
        }
        None
    }

    /// Parse a (possibly compound) unit expression: `m`, `m/s`, `kg*m/s^2`,
    /// `kg·m/s²`, or a bare derived-unit name (`N`, `J`, `W`, `Hz`, `Pa`).
    pub fn parse(expr: &str) -> Result<Self, CoreError> {
        let expr = expr.trim();
        if let Some(derived) = units::derived_unit(expr) {
            return Ok(derived);
        }
        let (numer, denom) = match expr.split_once('/') {
            Some((n, d)) => (n, Some(d)),
            None => (expr, None),
        };
        let mut map = Self::new();
        for frag in split_fragments(numer) {
            apply_fragment(&mut map, &frag, 1)?;
        }
        if let Some(d) = denom {
            for frag in split_fragments(d) {
                apply_fragment(&mut map, &frag, -1)?;
            }
        }
        Ok(map)
    }

    /// Merge two dimension maps, summing exponents and dropping zeros.
    pub fn mul(&self, other: &DimensionMap) -> DimensionMap {
        let mut out = self.clone();
        for (dim, entry) in other.0.iter() {
            let new_exp = out
                .0
                .get(dim)
                .map(|e| e.exponent)
                .unwrap_or(0)
                + entry.exponent;
            let unit = out
                .0
                .get(dim)
                .map(|e| e.unit.clone())
                .unwrap_or_else(|| entry.unit.clone());
            out.insert(*dim, DimEntry::new(new_exp, &unit));
        }
        out
    }

    pub fn reciprocal(&self) -> DimensionMap {
        let mut out = Self::new();
        for (dim, entry) in self.0.iter() {
            out.insert(*dim, DimEntry::new(-entry.exponent, &entry.unit));
        }
        out
    }

    pub fn div(&self, other: &DimensionMap) -> DimensionMap {
        self.mul(&other.reciprocal())
    }

    pub fn pow(&self, exp: i32) -> DimensionMap {
        let mut out = Self::new();
        for (dim, entry) in self.0.iter() {
            out.insert(*dim, DimEntry::new(entry.exponent * exp, &entry.unit));
        }
        out
    }

    /// Same dimension keys and exponents (units may differ — addition
    /// converts the right operand before combining).
    pub fn same_shape(&self, other: &DimensionMap) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        self.0.iter().all(|(dim, e)| {
            other
                .0
                .get(dim)
                .map(|oe| oe.exponent == e.exponent)
                .unwrap_or(false)
        })
    }

    /// Scalar factor to multiply a value expressed in `self`'s units by, to
    /// get the value expressed in base units for every dimension.
    pub fn factor_to_base(&self) -> Result<Decimal, CoreError> {
        let mut factor = Decimal::ONE;
        for entry in self.0.values() {
            let (_, base_factor) = units::lookup_unit(&entry.unit)
                .ok_or_else(|| CoreError::InvalidUnit(entry.unit.clone()))?;
            factor *= pow_decimal(base_factor, entry.exponent);
        }
        Ok(factor)
    }

    /// Scalar factor to convert a value from this unit to `target`, when both
    /// describe the same dimension shape. Does not handle temperature
    /// (affine) or currency (external rate) — callers special-case those.
    pub fn factor_to(&self, target: &DimensionMap) -> Result<Decimal, CoreError> {
        if !self.same_shape(target) {
            return Err(CoreError::IncompatibleDimensions {
                left: self.to_string(),
                right: target.to_string(),
            });
        }
        Ok(self.factor_to_base()? / target.factor_to_base()?)
    }

    pub fn is_single_currency(&self) -> bool {
        self.0.len() == 1 && self.0.contains_key(&Dimension::Currency)
    }

    pub fn is_single_temperature(&self) -> bool {
        self.0.len() == 1
            && self
                .0
                .get(&Dimension::Temperature)
                .map(|e| e.exponent == 1)
                .unwrap_or(false)
    }

    /// The unit-category tag the `is` operator recognises (`length`,
    /// `weight`, ...), for a single dimension at exponent 1. Compound units
    /// and `Angle` have no category tag.
    pub fn category_tag(&self) -> Option<&'static str> {
        if self.0.len() != 1 {
            return None;
        }
        let (dim, entry) = self.0.iter().next().unwrap();
        if entry.exponent != 1 {
            return None;
        }
        match dim {
            Dimension::Length => Some("length"),
            Dimension::Mass => Some("weight"),
            Dimension::Volume => Some("volume"),
            Dimension::Temperature => Some("temperature"),
            Dimension::Data => Some("data"),
            Dimension::Time => Some("time"),
            Dimension::Currency => Some("currency"),
            Dimension::Angle => None,
        }
    }
}

impl fmt::Display for DimensionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "1");
        }
        let positives: Vec<String> = self
            .0
            .values()
            .filter(|e| e.exponent > 0)
            .map(|e| fmt_entry(&e.unit, e.exponent))
            .collect();
        let negatives: Vec<String> = self
            .0
            .values()
            .filter(|e| e.exponent < 0)
            .map(|e| fmt_entry(&e.unit, -e.exponent))
            .collect();
        let numer = if positives.is_empty() {
            "1".to_string()
        } else {
            positives.join("*")
        };
        if negatives.is_empty() {
            write!(f, "{}", numer)
        } else {
            write!(f, "{}/{}", numer, negatives.join("*"))
        }
    }
}

fn fmt_entry(unit: &str, exp: i32) -> String {
    if exp == 1 {
        unit.to_string()
    } else {
        format!("{}^{}", unit, exp)
    }
}

fn pow_decimal(base: Decimal, exp: i32) -> Decimal {
    if exp == 0 {
        return Decimal::ONE;
    }
    let positive = exp.unsigned_abs();
    let mut acc = Decimal::ONE;
    for _ in 0..positive {
        acc *= base;
    }
    if exp < 0 {
        Decimal::ONE / acc
    } else {
        acc
    }
}

fn split_fragments(s: &str) -> Vec<String> {
    s.replace('·', "*")
        .split(['*', ' '])
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

fn apply_fragment(map: &mut DimensionMap, frag: &str, sign: i32) -> Result<(), CoreError> {
    let (unit, exp) = split_exponent(frag);
    if let Some(derived) = units::derived_unit(unit) {
        let scaled = derived.pow(sign * exp);
        *map = map.mul(&scaled);
        return Ok(());
    }
    let (dim, _) = units::lookup_unit(unit).ok_or_else(|| CoreError::InvalidUnit(unit.to_string()))?;
    let current = map.0.get(&dim).map(|e| e.exponent).unwrap_or(0);
    map.insert(dim, DimEntry::new(current + sign * exp, unit));
    Ok(())
}

/// Split a unit fragment into its base name and integer exponent, handling
/// `m2`, `m^2`, `m²`, `m³`.
fn split_exponent(frag: &str) -> (&str, i32) {
    if let Some(stripped) = frag.strip_suffix('²') {
        return (stripped, 2);
    }
    if let Some(stripped) = frag.strip_suffix('³') {
        return (stripped, 3);
    }
    if let Some((base, exp)) = frag.split_once('^') {
        if let Ok(e) = exp.parse::<i32>() {
            return (base, e);
        }
    }
    (frag, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_simple_unit() {
        let m = DimensionMap::parse("m").unwrap();
        assert_eq!(m.simple_unit(), Some("m"));
    }

    #[test]
    fn test_parse_compound_unit() {
        let m = DimensionMap::parse("kg*m/s^2").unwrap();
        assert_eq!(m.0.get(&Dimension::Mass).unwrap().exponent, 1);
        assert_eq!(m.0.get(&Dimension::Length).unwrap().exponent, 1);
        assert_eq!(m.0.get(&Dimension::Time).unwrap().exponent, -2);
    }

    #[test]
    fn test_derived_unit_matches_manual_compound() {
        let newton = DimensionMap::parse("N").unwrap();
        let manual = DimensionMap::parse("kg*m/s^2").unwrap();
        assert!(newton.same_shape(&manual));
    }

    #[test]
    fn test_reciprocal_and_div() {
        let m = DimensionMap::single(Dimension::Length, "m", 1);
        let s = DimensionMap::single(Dimension::Time, "s", 1);
        let speed = m.div(&s);
        assert_eq!(speed.0.get(&Dimension::Length).unwrap().exponent, 1);
        assert_eq!(speed.0.get(&Dimension::Time).unwrap().exponent, -1);
    }

    #[test]
    fn test_mul_cancels_to_empty() {
        let m = DimensionMap::single(Dimension::Length, "m", 1);
        let per_m = DimensionMap::single(Dimension::Length, "m", -1);
        let result = m.mul(&per_m);
        assert!(result.is_empty());
    }

    #[test]
    fn test_factor_to_converts_km_to_m() {
        let km = DimensionMap::single(Dimension::Length, "km", 1);
        let m = DimensionMap::single(Dimension::Length, "m", 1);
        assert_eq!(km.factor_to(&m).unwrap(), dec!(1000));
    }

    #[test]
    fn test_incompatible_dimensions_rejected() {
        let m = DimensionMap::single(Dimension::Length, "m", 1);
        let kg = DimensionMap::single(Dimension::Mass, "kg", 1);
        assert!(matches!(m.factor_to(&kg), Err(CoreError::IncompatibleDimensions { .. })));
    }

    #[test]
    fn test_unknown_unit_rejected() {
        assert!(matches!(
            DimensionMap::parse("bogon"),
            Err(CoreError::InvalidUnit(_))
        ));
    }

    #[test]
    fn test_display_formats_numerator_and_denominator() {
        let speed = DimensionMap::parse("m/s").unwrap();
        assert_eq!(speed.to_string(), "m/s");
    }

    #[test]
    fn test_category_tag_maps_mass_to_weight() {
        let kg = DimensionMap::single(Dimension::Mass, "kg", 1);
        assert_eq!(kg.category_tag(), Some("weight"));
    }

    #[test]
    fn test_category_tag_none_for_compound_units() {
        let speed = DimensionMap::parse("m/s").unwrap();
        assert_eq!(speed.category_tag(), None);
    }
}
