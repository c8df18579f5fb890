//! Pure numeric functions over time series and value pairs.
//!
//! Series are time-ascending `TimePoint` slices; every function returns
//! `None` rather than guessing when its input is too thin.

use serde::{Deserialize, Serialize};

use crate::constants::{
    SECONDS_PER_DAY, VOLATILITY_MIN_RETURNS, VOLATILITY_NORMALIZER, WINSOR_HIGH_PCT,
    WINSOR_LOW_PCT,
};
use crate::numbers::{floor_f64_to_usize, usize_to_f64};
use crate::snapshot::TimePoint;

/// Highest value seen in a series and when it happened.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllTimeHigh {
    pub value: f64,
    pub time: i64,
}

/// Index of the latest point at or before `time`, by binary search.
#[must_use]
pub fn index_at_or_before(series: &[TimePoint], time: i64) -> Option<usize> {
    let upper = series.partition_point(|point| point.time <= time);
    upper.checked_sub(1)
}

/// Relative change between the latest point and the latest point at or
/// before `days` earlier.
#[must_use]
pub fn percent_change(series: &[TimePoint], days: i64) -> Option<f64> {
    if series.len() < 2 {
        return None;
    }
    let latest = series.last()?;
    let cutoff = latest.time.saturating_sub(days.saturating_mul(SECONDS_PER_DAY));
    let past_idx = index_at_or_before(series, cutoff)?;
    let past = series[past_idx].value;
    if past <= 0.0 {
        return None;
    }
    Some((latest.value - past) / past)
}

/// Normalized separation of two values: `|a - b| / max(a, b)`.
#[must_use]
pub fn ab_margin(a: f64, b: f64) -> Option<f64> {
    let max = a.max(b);
    if !max.is_finite() || max <= 0.0 {
        return None;
    }
    Some((a - b).abs() / max)
}

/// Lead of the first value over the second in a descending list.
#[must_use]
pub fn top2_margin(sorted_desc: &[f64]) -> Option<f64> {
    let (first, second) = match sorted_desc {
        [first, second, ..] => (*first, *second),
        _ => return None,
    };
    if first <= 0.0 {
        return None;
    }
    Some((first - second) / first)
}

fn quantile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let position = pct.clamp(0.0, 1.0) * usize_to_f64(sorted.len() - 1);
    let lower = floor_f64_to_usize(position).min(sorted.len() - 1);
    let upper = (lower + 1).min(sorted.len() - 1);
    let weight = position - usize_to_f64(lower);
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Log returns of the trailing window ending at the latest point.
fn trailing_log_returns(series: &[TimePoint], window_days: i64) -> Vec<f64> {
    let Some(latest) = series.last() else {
        return Vec::new();
    };
    let start = latest
        .time
        .saturating_sub(window_days.saturating_mul(SECONDS_PER_DAY));
    let first_idx = series.partition_point(|point| point.time < start);
    series[first_idx..]
        .windows(2)
        .filter(|pair| pair[0].value > 0.0 && pair[1].value > 0.0)
        .map(|pair| (pair[1].value / pair[0].value).ln())
        .filter(|value| value.is_finite())
        .collect()
}

/// Winsorized standard deviation of trailing log returns, normalized to `[0, 1]`.
#[must_use]
pub fn volatility_score(series: &[TimePoint], window_days: i64) -> Option<f64> {
    let returns = trailing_log_returns(series, window_days);
    if returns.len() < VOLATILITY_MIN_RETURNS {
        return None;
    }
    let mut sorted = returns.clone();
    sorted.sort_by(f64::total_cmp);
    let low = quantile(&sorted, WINSOR_LOW_PCT);
    let high = quantile(&sorted, WINSOR_HIGH_PCT);
    let clipped: Vec<f64> = returns.iter().map(|r| r.clamp(low, high)).collect();
    let n = usize_to_f64(clipped.len());
    let mean = clipped.iter().sum::<f64>() / n;
    let variance = clipped.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    Some((variance.sqrt() / VOLATILITY_NORMALIZER).clamp(0.0, 1.0))
}

/// Maximum value and its timestamp; the earliest occurrence wins ties.
#[must_use]
pub fn find_all_time_high(series: &[TimePoint]) -> Option<AllTimeHigh> {
    let mut best: Option<AllTimeHigh> = None;
    for point in series {
        if best.is_none_or(|current| point.value > current.value) {
            best = Some(AllTimeHigh {
                value: point.value,
                time: point.time,
            });
        }
    }
    best
}

/// Fractional distance of the latest value below the all-time high.
#[must_use]
pub fn drawdown_from_high(series: &[TimePoint]) -> Option<f64> {
    let ath = find_all_time_high(series)?;
    let latest = series.last()?;
    if ath.value <= 0.0 {
        return None;
    }
    Some(((ath.value - latest.value) / ath.value).max(0.0))
}

/// Share of `part` in `total`, `None` when the total is not positive.
#[must_use]
pub fn share_of(part: f64, total: f64) -> Option<f64> {
    if !total.is_finite() || total <= 0.0 {
        return None;
    }
    Some((part / total).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = SECONDS_PER_DAY;

    fn daily(values: &[f64]) -> Vec<TimePoint> {
        values
            .iter()
            .enumerate()
            .map(|(idx, value)| TimePoint::new(i64::try_from(idx).unwrap() * DAY, *value))
            .collect()
    }

    #[test]
    fn ab_margin_scenarios() {
        assert!((ab_margin(100.0, 50.0).unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(ab_margin(100.0, 50.0), ab_margin(50.0, 100.0));
        assert!(ab_margin(7.0, 7.0).unwrap().abs() < f64::EPSILON);
        assert!(ab_margin(0.0, 0.0).is_none());
        assert!(ab_margin(-3.0, -1.0).is_none());
    }

    #[test]
    fn top2_margin_scenarios() {
        assert!((top2_margin(&[100.0, 80.0, 60.0]).unwrap() - 0.2).abs() < 1e-12);
        assert!(top2_margin(&[100.0]).is_none());
        assert!(top2_margin(&[0.0, 0.0]).is_none());
    }

    #[test]
    fn percent_change_uses_point_at_or_before_cutoff() {
        let series = daily(&[100.0, 110.0, 120.0, 130.0, 150.0]);
        let change = percent_change(&series, 2).unwrap();
        assert!((change - (150.0 - 120.0) / 120.0).abs() < 1e-12);
        let beyond = percent_change(&series, 30);
        assert!(beyond.is_none(), "no point before the cutoff");
        assert!(percent_change(&series[..1], 1).is_none());
    }

    #[test]
    fn percent_change_handles_gaps_and_non_positive_past() {
        let series = vec![
            TimePoint::new(0, 0.0),
            TimePoint::new(3 * DAY, 50.0),
            TimePoint::new(10 * DAY, 75.0),
        ];
        assert!((percent_change(&series, 5).unwrap() - 0.5).abs() < 1e-12);
        assert!(percent_change(&series, 9).is_none());
    }

    #[test]
    fn volatility_requires_enough_returns() {
        let short = daily(&[1.0, 1.1, 1.0, 1.2, 1.1]);
        assert!(volatility_score(&short, 30).is_none());
        let flat = daily(&[5.0; 12]);
        assert!(volatility_score(&flat, 30).unwrap().abs() < 1e-12);
    }

    #[test]
    fn volatility_is_clamped_and_winsorized() {
        let wild: Vec<f64> = (0..20)
            .map(|i| if i % 2 == 0 { 1.0 } else { 3.0 })
            .collect();
        let score = volatility_score(&daily(&wild), 30).unwrap();
        assert!((score - 1.0).abs() < f64::EPSILON);

        let mut calm: Vec<f64> = (0..20).map(|i| 100.0 + f64::from(i % 3)).collect();
        calm[10] = 1_000.0;
        let spiky = volatility_score(&daily(&calm), 30).unwrap();
        assert!(spiky <= 1.0);
    }

    #[test]
    fn all_time_high_prefers_first_occurrence() {
        let series = daily(&[1.0, 5.0, 3.0, 5.0]);
        let ath = find_all_time_high(&series).unwrap();
        assert_eq!(ath.time, DAY);
        assert!((ath.value - 5.0).abs() < f64::EPSILON);
        assert!(find_all_time_high(&[]).is_none());
        let drawdown = drawdown_from_high(&daily(&[10.0, 4.0])).unwrap();
        assert!((drawdown - 0.6).abs() < 1e-12);
    }
}
