//! Date/timezone resolution: turning a parsed `DateLiteral`
//! or a relative word (`today`, `now`, ...) into a `Value::Date`, attaching
//! vs. converting timezones, and period-aware date arithmetic.

use crate::error::EvalError;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use linecalc_core::ast::DateLiteral;
use linecalc_core::{Decimal, DimensionMap, Value};
use std::str::FromStr;

/// Supplies "now" to the evaluator. Production code uses `SystemTimeSource`;
/// tests can inject a fixed instant for determinism.
pub trait TimeSource {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Resolve a user-supplied timezone label (alias, raw IANA id, or
/// `utc±N`) to a `chrono_tz::Tz`.
pub fn resolve_timezone(label: &str) -> Result<Tz, EvalError> {
    let lower = label.to_ascii_lowercase();
    if lower == "local" {
        return Ok(Tz::UTC);
    }
    if let Some((_, iana)) = linecalc_core::tz_names::TZ_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(a, z)| (*a, *z))
    {
        return Tz::from_str(iana).map_err(|_| EvalError::UnknownTimezone(label.to_string()));
    }
    if linecalc_core::tz_names::parse_utc_offset(&lower).is_some() {
        // Fixed-offset pseudo-zones aren't in the Olson table; the caller
        // applies the numeric offset directly instead of going through `Tz`.
        return Err(EvalError::UnknownTimezone(label.to_string()));
    }
    Tz::from_str(label).map_err(|_| EvalError::UnknownTimezone(label.to_string()))
}

/// Build the UTC instant for a literal's date/time components, given the
/// zone to interpret wall-clock time in (the literal's own `@tz`, or the
/// context's system zone when absent).
pub fn resolve_date_literal(
    lit: &DateLiteral,
    system_timezone: &str,
    time_source: &dyn TimeSource,
) -> Result<Value, EvalError> {
    let zone_label = lit.timezone.clone();
    let interpret_tz = zone_label.as_deref().unwrap_or(system_timezone);

    let now = time_source.now();
    let naive_date = match (lit.day, lit.month, lit.year) {
        (Some(d), Some(m), Some(y)) => NaiveDate::from_ymd_opt(y, m, d)
            .ok_or_else(|| EvalError::InvalidDate(format!("{d:02}.{m:02}.{y:04}")))?,
        _ => localize(now, interpret_tz)?.date_naive(),
    };
    let naive_time = match (lit.hour, lit.minute) {
        (Some(h), Some(mi)) => {
            NaiveTime::from_hms_opt(h, mi, 0).ok_or_else(|| EvalError::InvalidDate(format!("{h:02}:{mi:02}")))?
        }
        _ => NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
    };
    let naive = NaiveDateTime::new(naive_date, naive_time);
    let instant = to_utc(naive, interpret_tz)?;
    Ok(Value::Date {
        instant,
        timezone: zone_label,
        has_time_component: lit.has_time_component,
    })
}

/// `today` / `now` / `tomorrow` / `yesterday` — resolved relative to the
/// context's system timezone, with no explicit zone label attached.
pub fn resolve_relative_word(
    word: &str,
    system_timezone: &str,
    time_source: &dyn TimeSource,
) -> Option<Result<Value, EvalError>> {
    let now = time_source.now();
    match word.to_ascii_lowercase().as_str() {
        "now" => Some(Ok(Value::Date {
            instant: now,
            timezone: None,
            has_time_component: true,
        })),
        "today" => Some(today_at_midnight(now, system_timezone, 0)),
        "tomorrow" => Some(today_at_midnight(now, system_timezone, 1)),
        "yesterday" => Some(today_at_midnight(now, system_timezone, -1)),
        _ => None,
    }
}

fn today_at_midnight(now: DateTime<Utc>, tz: &str, day_offset: i64) -> Result<Value, EvalError> {
    let local_date = localize(now, tz)?.date_naive() + Duration::days(day_offset);
    let naive = NaiveDateTime::new(local_date, NaiveTime::from_hms_opt(0, 0, 0).unwrap());
    Ok(Value::Date {
        instant: to_utc(naive, tz)?,
        timezone: None,
        has_time_component: false,
    })
}

fn localize(instant: DateTime<Utc>, tz_label: &str) -> Result<DateTime<Tz>, EvalError> {
    let tz = resolve_timezone(tz_label)?;
    Ok(instant.with_timezone(&tz))
}

fn to_utc(naive: NaiveDateTime, tz_label: &str) -> Result<DateTime<Utc>, EvalError> {
    if let Some(offset_hours) = linecalc_core::tz_names::parse_utc_offset(tz_label) {
        let shifted = naive - Duration::hours(offset_hours as i64);
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(shifted, Utc));
    }
    let tz = resolve_timezone(tz_label)?;
    match tz.from_local_datetime(&naive).single() {
        Some(dt) => Ok(dt.with_timezone(&Utc)),
        None => {
            // Ambiguous/nonexistent local time (DST edges): fall back to the
            // earliest valid interpretation rather than erroring.
            tz.from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| EvalError::InvalidDate(naive.to_string()))
        }
    }
}

/// `date +/- quantity`. Calendar units (`month`, `year`) shift by field
/// rather than by a fixed number of seconds; everything else converts the
/// quantity to seconds and adds a fixed `Duration`.
pub fn add_duration_to_date(
    instant: DateTime<Utc>,
    value: Decimal,
    dimensions: &DimensionMap,
    negate: bool,
) -> Result<DateTime<Utc>, EvalError> {
    let unit = dimensions
        .simple_unit()
        .ok_or_else(|| EvalError::Other("date arithmetic requires a single time unit".to_string()))?
        .to_string();
    let signed = if negate { -value } else { value };
    match unit.to_ascii_lowercase().as_str() {
        "month" | "months" => shift_months(instant, signed),
        "year" | "years" | "yr" | "yrs" => shift_months(instant, signed * Decimal::from(12)),
        _ => {
            let seconds = signed * dimensions.factor_to_base()?;
            let whole = seconds.trunc();
            let frac_nanos = ((seconds - whole) * Decimal::from(1_000_000_000)).trunc();
            let secs_i64: i64 = whole
                .to_string()
                .parse()
                .map_err(|_| EvalError::Other("duration out of range".to_string()))?;
            let nanos_i64: i64 = frac_nanos.to_string().parse().unwrap_or(0);
            Ok(instant + Duration::seconds(secs_i64) + Duration::nanoseconds(nanos_i64))
        }
    }
}

fn shift_months(instant: DateTime<Utc>, months: Decimal) -> Result<DateTime<Utc>, EvalError> {
    let whole_months: i64 = months.trunc().to_string().parse().unwrap_or(0);
    let shifted = if whole_months >= 0 {
        instant.checked_add_months(Months::new(whole_months as u32))
    } else {
        instant.checked_sub_months(Months::new((-whole_months) as u32))
    };
    shifted.ok_or_else(|| EvalError::InvalidDate("month shift out of range".to_string()))
}

/// `date1 - date2` -> a `Quantity` in seconds.
pub fn difference_seconds(a: DateTime<Utc>, b: DateTime<Utc>) -> Decimal {
    let delta = a - b;
    Decimal::from(delta.num_milliseconds()) / Decimal::from(1000)
}

/// Format a date for display. There's no single canonical rendering beyond
/// conversion correctness, so this matches common calculator convention:
/// `DD.MM.YYYY[ HH:MM][ zone]`.
pub fn format_date(instant: DateTime<Utc>, timezone: Option<&str>, has_time: bool) -> String {
    let tz_label = timezone.unwrap_or("UTC");
    let local = if let Some(offset) = linecalc_core::tz_names::parse_utc_offset(tz_label) {
        instant + Duration::hours(offset as i64)
    } else if let Ok(tz) = resolve_timezone(tz_label) {
        instant.with_timezone(&tz).naive_local().and_utc()
    } else {
        instant
    };
    if has_time {
        format!(
            "{:02}.{:02}.{:04} {:02}:{:02}",
            local.day(),
            local.month(),
            local.year(),
            local.hour(),
            local.minute()
        )
    } else {
        format!("{:02}.{:02}.{:04}", local.day(), local.month(), local.year())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linecalc_core::{Dimension, DimensionMap};
    use rust_decimal_macros::dec;

    struct FixedTime(DateTime<Utc>);
    impl TimeSource for FixedTime {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn fixed_noon_jan_1_2025() -> FixedTime {
        FixedTime(
            NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap()
                .and_utc(),
        )
    }

    fn blank_literal() -> DateLiteral {
        DateLiteral {
            day: None,
            month: None,
            year: None,
            hour: None,
            minute: None,
            timezone: None,
            has_time_component: false,
        }
    }

    #[test]
    fn test_resolve_explicit_date_literal() {
        let lit = DateLiteral {
            day: Some(15),
            month: Some(6),
            year: Some(2024),
            ..blank_literal()
        };
        let v = resolve_date_literal(&lit, "UTC", &fixed_noon_jan_1_2025()).unwrap();
        match v {
            Value::Date { instant, .. } => {
                assert_eq!(instant.date_naive(), NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
            }
            other => panic!("expected Date, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_calendar_date_is_rejected() {
        let lit = DateLiteral {
            day: Some(31),
            month: Some(2),
            year: Some(2024),
            ..blank_literal()
        };
        let err = resolve_date_literal(&lit, "UTC", &fixed_noon_jan_1_2025()).unwrap_err();
        assert!(matches!(err, EvalError::InvalidDate(_)));
    }

    #[test]
    fn test_relative_word_today_and_tomorrow() {
        let src = fixed_noon_jan_1_2025();
        let today = resolve_relative_word("today", "UTC", &src).unwrap().unwrap();
        let tomorrow = resolve_relative_word("tomorrow", "UTC", &src).unwrap().unwrap();
        match (today, tomorrow) {
            (Value::Date { instant: t, .. }, Value::Date { instant: tm, .. }) => {
                assert_eq!((tm - t).num_days(), 1);
            }
            _ => panic!("expected Date values"),
        }
    }

    #[test]
    fn test_relative_word_unknown_returns_none() {
        assert!(resolve_relative_word("whenever", "UTC", &fixed_noon_jan_1_2025()).is_none());
    }

    #[test]
    fn test_resolve_timezone_alias_and_unknown() {
        assert!(resolve_timezone("UTC").is_ok());
        assert!(matches!(resolve_timezone("not_a_zone"), Err(EvalError::UnknownTimezone(_))));
    }

    #[test]
    fn test_add_duration_days() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc();
        let dims = DimensionMap::single(Dimension::Time, "day", 1);
        let result = add_duration_to_date(start, dec!(3), &dims, false).unwrap();
        assert_eq!(result.date_naive(), NaiveDate::from_ymd_opt(2025, 1, 4).unwrap());
    }

    #[test]
    fn test_add_duration_months_shifts_calendar_field() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc();
        let dims = DimensionMap::single(Dimension::Time, "month", 1);
        let result = add_duration_to_date(start, dec!(1), &dims, false).unwrap();
        // chrono's checked_add_months clamps Jan 31 + 1 month to the last valid day.
        assert_eq!(result.month(), 2);
    }

    #[test]
    fn test_difference_seconds() {
        let a = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 10).unwrap().and_utc();
        let b = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc();
        assert_eq!(difference_seconds(a, b), dec!(10));
    }

    #[test]
    fn test_format_date_without_time() {
        let instant = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc();
        assert_eq!(format_date(instant, None, false), "07.03.2025");
    }
}
