//! Display formatting for amounts, ratios and timestamps.

use chrono::{DateTime, TimeZone};

/// Placeholder for a missing value
pub const MISSING: &str = "\u{2013}";

/// Insert `,` every three digits of an unsigned integer string
fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn currency_symbol(code: &str) -> Option<&'static str> {
    match code.to_ascii_uppercase().as_str() {
        "USD" => Some("$"),
        "EUR" => Some("\u{20ac}"),
        "GBP" => Some("\u{a3}"),
        "JPY" => Some("\u{a5}"),
        _ => None,
    }
}

/// `-$1,234.50` style currency amount with two decimals
#[must_use]
pub fn format_currency(value: f64, code: &str) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let fixed = format!("{:.2}", value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    let amount = format!("{}.{cents}", group_thousands(whole));

    match currency_symbol(code) {
        Some(symbol) => format!("{sign}{symbol}{amount}"),
        None => format!("{sign}{} {amount}", code.to_ascii_uppercase()),
    }
}

/// `12.34%`, or a dash when absent
#[must_use]
pub fn format_percent(value: Option<f64>, digits: usize) -> String {
    match value {
        Some(v) => format!("{v:.digits$}%"),
        None => MISSING.to_string(),
    }
}

/// `12.3 pips`
#[must_use]
pub fn format_pips(value: f64) -> String {
    format!("{value:.1} pips")
}

/// `0.25 lots`
#[must_use]
pub fn format_lots(value: f64) -> String {
    format!("{value:.2} lots")
}

/// `MM/DD/YYYY HH:MM:SS` in the timestamp's own zone
#[must_use]
pub fn format_timestamp<Tz: TimeZone>(value: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    value.format("%m/%d/%Y %H:%M:%S").to_string()
}
