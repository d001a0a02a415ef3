//! Timezone name table: common city/region names and `utc±N` offsets mapped
//! to IANA zone identifiers. Shared by the lexer (greedy multi-word
//! lookahead for the `@<timezone>` suffix) and the evaluator (resolving a
//! user-supplied label to an actual zone).

/// `(lowercase alias, IANA zone id)`. Multi-word aliases are listed with a
/// single space between words; the lexer's lookahead normalises whitespace
/// before matching.
pub const TZ_ALIASES: &[(&str, &str)] = &[
    ("utc", "UTC"),
    ("gmt", "UTC"),
    ("london", "Europe/London"),
    ("paris", "Europe/Paris"),
    ("berlin", "Europe/Berlin"),
    ("madrid", "Europe/Madrid"),
    ("rome", "Europe/Rome"),
    ("moscow", "Europe/Moscow"),
    ("tokyo", "Asia/Tokyo"),
    ("beijing", "Asia/Shanghai"),
    ("shanghai", "Asia/Shanghai"),
    ("hong kong", "Asia/Hong_Kong"),
    ("singapore", "Asia/Singapore"),
    ("seoul", "Asia/Seoul"),
    ("mumbai", "Asia/Kolkata"),
    ("delhi", "Asia/Kolkata"),
    ("kolkata", "Asia/Kolkata"),
    ("dubai", "Asia/Dubai"),
    ("sydney", "Australia/Sydney"),
    ("melbourne", "Australia/Melbourne"),
    ("auckland", "Pacific/Auckland"),
    ("new york", "America/New_York"),
    ("los angeles", "America/Los_Angeles"),
    ("chicago", "America/Chicago"),
    ("denver", "America/Denver"),
    ("toronto", "America/Toronto"),
    ("vancouver", "America/Vancouver"),
    ("mexico city", "America/Mexico_City"),
    ("sao paulo", "America/Sao_Paulo"),
    ("buenos aires", "America/Argentina/Buenos_Aires"),
    ("cairo", "Africa/Cairo"),
    ("johannesburg", "Africa/Johannesburg"),
    ("lagos", "Africa/Lagos"),
    ("local", "LOCAL"),
];

/// Longest-prefix match of `text` (already lowercased) against the alias
/// table, returning the matched alias's word count so the caller knows how
/// many words to consume.
pub fn longest_alias_match(words: &[&str]) -> Option<(usize, &'static str)> {
    for take in (1..=words.len().min(3)).rev() {
        let candidate = words[..take].join(" ");
        if let Some((_, iana)) = TZ_ALIASES.iter().find(|(alias, _)| *alias == candidate) {
            return Some((take, iana));
        }
    }
    None
}

/// `utc+N` / `utc-N` fixed-offset pseudo-zones are handled separately by the
/// evaluator since they are not table lookups.
pub fn parse_utc_offset(label: &str) -> Option<i32> {
    let l = label.to_ascii_lowercase();
    let rest = l.strip_prefix("utc")?;
    if rest.is_empty() {
        return None;
    }
    rest.parse::<i32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_alias_match_prefers_multi_word() {
        let words = ["new", "york", "is", "nice"];
        let (take, iana) = longest_alias_match(&words).unwrap();
        assert_eq!(take, 2);
        assert_eq!(iana, "America/New_York");
    }

    #[test]
    fn test_longest_alias_match_single_word() {
        let words = ["tokyo", "time"];
        let (take, iana) = longest_alias_match(&words).unwrap();
        assert_eq!(take, 1);
        assert_eq!(iana, "Asia/Tokyo");
    }

    #[test]
    fn test_longest_alias_match_no_match() {
        assert!(longest_alias_match(&["nowhere"]).is_none());
    }

    #[test]
    fn test_parse_utc_offset_positive_and_negative() {
        assert_eq!(parse_utc_offset("utc+5"), Some(5));
        assert_eq!(parse_utc_offset("UTC-8"), Some(-8));
    }

    #[test]
    fn test_parse_utc_offset_bare_utc_is_not_an_offset() {
        assert_eq!(parse_utc_offset("utc"), None);
    }

    #[test]
    fn test_parse_utc_offset_rejects_non_utc_label() {
        assert_eq!(parse_utc_offset("tokyo"), None);
    }
}
