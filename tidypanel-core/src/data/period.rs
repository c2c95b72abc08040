//! Date and period label parsing.

use chrono::NaiveDate;

const ISO_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parse a date cell: ISO dates, ISO date-times (date part kept), the
/// locale's extra formats, then compact period labels.
pub fn parse_date(raw: &str, extra_formats: &[String]) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in ISO_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    // 2020-01-31T00:00:00, 2020-01-31 12:30
    if let (Some(head), Some(sep)) = (s.get(..10), s.get(10..11)) {
        if sep == "T" || sep == " " {
            if let Ok(date) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
                return Some(date);
            }
        }
    }

    for fmt in extra_formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    parse_period(s)
}

/// Parse a period label to the first day of the period.
///
/// The label must start with a four-digit year. Quarters (`2020-Q1`,
/// `2020Q3`) map to the quarter's first month. Otherwise non-digits are
/// stripped and the digits read as `%Y%m%d`, `%Y%m` or `%Y`.
pub fn parse_period(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim().to_ascii_uppercase();
    if !s.get(..4).is_some_and(|y| y.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }

    if let Some((year_part, quarter_part)) = s.split_once('Q') {
        let year_digits: String = year_part.chars().filter(char::is_ascii_digit).collect();
        let quarter: u32 = quarter_part.trim().parse().ok()?;
        if year_digits.len() != 4 || !(1..=4).contains(&quarter) {
            return None;
        }
        let year: i32 = year_digits.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, (quarter - 1) * 3 + 1, 1);
    }

    let digits: String = s.chars().filter(char::is_ascii_digit).collect();
    let year: i32 = digits.get(..4)?.parse().ok()?;
    match digits.len() {
        8 => NaiveDate::from_ymd_opt(year, digits[4..6].parse().ok()?, digits[6..8].parse().ok()?),
        6 => NaiveDate::from_ymd_opt(year, digits[4..6].parse().ok()?, 1),
        4 => NaiveDate::from_ymd_opt(year, 1, 1),
        _ => None,
    }
}
