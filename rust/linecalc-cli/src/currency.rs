//! A tiny static exchange-rate table, wired in as `EvaluationContext`'s
//! `currency_rate` callback. Demonstration only — a live feed is explicitly
//! out of scope; a real deployment supplies its own
//! `Fn(&str, &str) -> Option<Decimal>`.

use linecalc_core::Decimal;
use rust_decimal_macros::dec;
use std::rc::Rc;

const RATES_TO_USD: &[(&str, Decimal)] = &[
    ("usd", dec!(1)),
    ("eur", dec!(1.08)),
    ("gbp", dec!(1.27)),
    ("jpy", dec!(0.0067)),
    ("chf", dec!(1.12)),
    ("cad", dec!(0.74)),
    ("aud", dec!(0.66)),
    ("cny", dec!(0.14)),
    ("inr", dec!(0.012)),
    ("krw", dec!(0.00073)),
    ("mxn", dec!(0.059)),
    ("brl", dec!(0.20)),
];

fn to_usd(code: &str) -> Option<Decimal> {
    RATES_TO_USD
        .iter()
        .find(|(c, _)| *c == code.to_ascii_lowercase())
        .map(|(_, r)| *r)
}

pub fn static_rate_table() -> Rc<dyn Fn(&str, &str) -> Option<Decimal>> {
    Rc::new(|from: &str, to: &str| {
        let from_usd = to_usd(from)?;
        let to_usd_rate = to_usd(to)?;
        Some(from_usd / to_usd_rate)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_currency_round_trips_to_one() {
        let rate = static_rate_table();
        assert_eq!(rate("usd", "usd"), Some(dec!(1)));
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let rate = static_rate_table();
        assert_eq!(rate("EUR", "usd"), Some(dec!(1.08)));
    }

    #[test]
    fn test_unknown_code_returns_none() {
        let rate = static_rate_table();
        assert_eq!(rate("xyz", "usd"), None);
    }
}
