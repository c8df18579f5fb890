//! Human-readable formatting for choice labels and explanation facts.

use crate::numbers::round_significant;

/// Compact USD amount: `$1.23B`, `$450M`, `$12.5K`.
#[must_use]
pub fn format_usd(value: f64) -> String {
    if !value.is_finite() {
        return String::from("n/a");
    }
    let sign = if value < 0.0 { "-" } else { "" };
    let abs = value.abs();
    let (scaled, suffix) = if abs >= 1.0e12 {
        (abs / 1.0e12, "T")
    } else if abs >= 1.0e9 {
        (abs / 1.0e9, "B")
    } else if abs >= 1.0e6 {
        (abs / 1.0e6, "M")
    } else if abs >= 1.0e3 {
        (abs / 1.0e3, "K")
    } else {
        (abs, "")
    };
    let rounded = round_significant(scaled, 3);
    let text = if rounded >= 100.0 || (suffix.is_empty() && rounded >= 10.0) {
        format!("{rounded:.0}")
    } else if rounded >= 10.0 {
        format!("{rounded:.1}")
    } else {
        format!("{rounded:.2}")
    };
    format!("{sign}${}{suffix}", trim_zeros(&text))
}

fn trim_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// Signed percentage with one decimal: `+12.3%`, `-4.0%`.
#[must_use]
pub fn format_change(fraction: f64) -> String {
    let pct = fraction * 100.0;
    if pct >= 0.0 {
        format!("+{pct:.1}%")
    } else {
        format!("{pct:.1}%")
    }
}

/// Unsigned share: `42.5%`.
#[must_use]
pub fn format_share(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

/// Ordinal rank: `#1`, `#27`.
#[must_use]
pub fn format_rank(rank: u32) -> String {
    format!("#{rank}")
}

/// Thousands separators for counts.
#[must_use]
pub fn format_count(value: u32) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usd_formatting_scales() {
        assert_eq!(format_usd(1_234_000_000.0), "$1.23B");
        assert_eq!(format_usd(450_000_000.0), "$450M");
        assert_eq!(format_usd(12_500.0), "$12.5K");
        assert_eq!(format_usd(2_000_000_000_000.0), "$2T");
        assert_eq!(format_usd(999.0), "$999");
        assert_eq!(format_usd(-5_000_000.0), "-$5M");
    }

    #[test]
    fn percent_and_counts() {
        assert_eq!(format_change(0.123), "+12.3%");
        assert_eq!(format_change(-0.04), "-4.0%");
        assert_eq!(format_share(0.425), "42.5%");
        assert_eq!(format_count(1_234_567), "1,234,567");
        assert_eq!(format_count(12), "12");
        assert_eq!(format_rank(3), "#3");
    }
}
