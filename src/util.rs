// Utility helpers for parsing, normalisation and number formatting.
//
// This module centralizes all the "dirty" cell handling so the stages can
// assume clean, typed values.
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use num_format::{Locale, ToFormattedString};

/// Parse a cell into `f64` while being forgiving about the formatting found
/// in spreadsheet exports.
///
/// - Trims whitespace and a leading euro sign.
/// - Rejects values that contain alphabetic characters.
/// - Accepts `1234.56`, `1,234.56`, `1.234,56` and `1234,56`.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim().trim_start_matches('€').trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let normalized = match (s.rfind('.'), s.rfind(',')) {
        // Whichever separator comes last is the decimal one.
        (Some(dot), Some(comma)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (None, Some(_)) if s.matches(',').count() == 1 => s.replace(',', "."),
        (None, Some(_)) => s.replace(',', ""),
        _ => s,
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d/%m/%Y %H:%M",
];

/// Parse an order timestamp. A plain date is taken as midnight; the time of
/// day is kept, so period bounds compare the full timestamp.
pub fn parse_datetime_safe(s: Option<&str>) -> Option<NaiveDateTime> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Convert an Excel serial (1900 date system, fraction = time of day) to a
/// timestamp, rounded to the second. Out-of-range serials yield `None`.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(NaiveTime::MIN);
    let days = serial.floor();
    let seconds = ((serial - days) * 86_400.0).round() as i64;
    epoch
        .checked_add_signed(Duration::try_days(days as i64)?)?
        .checked_add_signed(Duration::try_seconds(seconds)?)
}

pub fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Trim a text cell; blank cells become `None`.
pub fn clean_text(s: Option<String>) -> Option<String> {
    let s = s?;
    let t = s.trim();
    if t.is_empty() {
        None
    } else if t.len() == s.len() {
        Some(s)
    } else {
        Some(t.to_string())
    }
}

/// Lower-case and drop space characters, used for name containment checks.
pub fn normalize_name(s: &str) -> String {
    s.to_lowercase().replace(' ', "")
}

/// Trim and lower-case an e-mail address; blank addresses become `None`.
pub fn normalize_email(s: Option<&str>) -> Option<String> {
    let e = s?.trim().to_lowercase();
    if e.is_empty() {
        None
    } else {
        Some(e)
    }
}

/// Case-insensitive equality where a missing side never matches.
pub fn eq_ignore_case(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
        _ => false,
    }
}

/// Round to two decimals, ties to even (the way spreadsheet tooling rounds
/// binary floats).
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}

/// Relative/absolute tolerance comparison: `|a - b| <= 1e-8 + 1e-5 * |b|`.
pub fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

/// `100 * count / total`, rounded to two decimals and rendered with a
/// trailing `%` (`50.0%`, `33.33%`). An empty group yields an empty string.
pub fn format_pct(count: usize, total: usize) -> String {
    if total == 0 {
        return String::new();
    }
    let pct = round2(100.0 * count as f64 / total as f64);
    if pct.fract() == 0.0 {
        format!("{:.1}%", pct)
    } else {
        format!("{}%", pct)
    }
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals plus locale-aware thousands separators (`1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

// `display_with` helpers for the tabled previews.

pub fn display_opt_f64(v: &Option<f64>) -> String {
    v.map(|v| format_number(v, 2)).unwrap_or_default()
}

pub fn display_opt_str(v: &Option<String>) -> String {
    v.clone().unwrap_or_default()
}

pub fn display_opt_datetime(v: &Option<NaiveDateTime>) -> String {
    v.as_ref().map(format_datetime).unwrap_or_default()
}
