//! Calendar distractors for "when did it happen" questions.

use crate::calendar::{YearMonth, YearQuarter};
use crate::seed::{derive_seed, sample};

/// Where wrong months and quarters are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingPool<T> {
    /// Periods within `n` steps either side of the correct one.
    Window(i32),
    /// Every period in the inclusive range, capped at `cap` entries closest
    /// to the correct one.
    Range { first: T, last: T, cap: usize },
}

fn pool_ordinals(correct: i64, pool: TimingPool<i64>) -> Vec<i64> {
    match pool {
        TimingPool::Window(width) => (-i64::from(width)..=i64::from(width))
            .filter(|offset| *offset != 0)
            .map(|offset| correct + offset)
            .collect(),
        TimingPool::Range { first, last, cap } => {
            let mut ordinals: Vec<i64> = (first..=last).filter(|ord| *ord != correct).collect();
            ordinals.sort_by_key(|ord| (ord.abs_diff(correct), *ord));
            ordinals.truncate(cap);
            ordinals.sort_unstable();
            ordinals
        }
    }
}

fn sample_ordinals(correct: i64, pool: TimingPool<i64>, count: usize, seed: u64) -> Option<Vec<i64>> {
    let ordinals = pool_ordinals(correct, pool);
    if ordinals.len() < count {
        return None;
    }
    Some(sample(&ordinals, count, seed))
}

/// `count` distinct months other than `correct`, or `None` if the pool is too small.
#[must_use]
pub fn month_distractors(
    correct: YearMonth,
    pool: TimingPool<YearMonth>,
    count: usize,
    seed: u64,
) -> Option<Vec<YearMonth>> {
    let pool = match pool {
        TimingPool::Window(width) => TimingPool::Window(width),
        TimingPool::Range { first, last, cap } => TimingPool::Range {
            first: first.ordinal(),
            last: last.ordinal(),
            cap,
        },
    };
    sample_ordinals(correct.ordinal(), pool, count, derive_seed(seed, &["timing", "month"]))?
        .into_iter()
        .map(YearMonth::from_ordinal)
        .collect()
}

/// `count` distinct quarters other than `correct`.
#[must_use]
pub fn quarter_distractors(
    correct: YearQuarter,
    pool: TimingPool<YearQuarter>,
    count: usize,
    seed: u64,
) -> Option<Vec<YearQuarter>> {
    let pool = match pool {
        TimingPool::Window(width) => TimingPool::Window(width),
        TimingPool::Range { first, last, cap } => TimingPool::Range {
            first: first.ordinal(),
            last: last.ordinal(),
            cap,
        },
    };
    sample_ordinals(correct.ordinal(), pool, count, derive_seed(seed, &["timing", "quarter"]))?
        .into_iter()
        .map(YearQuarter::from_ordinal)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distractors::arrange;
    use std::collections::BTreeSet;

    #[test]
    fn month_window_excludes_correct_and_stays_distinct() {
        let june = YearMonth::parse("2024-06").unwrap();
        for seed in 0..16 {
            let months = month_distractors(june, TimingPool::Window(3), 3, seed).unwrap();
            assert_eq!(months.len(), 3);
            let keys: BTreeSet<String> = months.iter().map(ToString::to_string).collect();
            assert_eq!(keys.len(), 3);
            assert!(!keys.contains("2024-06"));
            assert!(months.iter().all(|m| m.ordinal().abs_diff(june.ordinal()) <= 3));

            let wrong: Vec<String> = months.iter().map(|m| m.display()).collect();
            let (choices, answer) = arrange(june.display(), wrong, seed);
            assert_eq!(choices.len(), 4);
            assert_eq!(choices.iter().filter(|c| *c == "June 2024").count(), 1);
            assert_eq!(choices[answer], "June 2024");
        }
    }

    #[test]
    fn range_pool_caps_and_prefers_nearby() {
        let correct = YearMonth::parse("2022-01").unwrap();
        let first = YearMonth::parse("2000-01").unwrap();
        let last = YearMonth::parse("2024-12").unwrap();
        let pool = TimingPool::Range { first, last, cap: 4 };
        let months = month_distractors(correct, pool, 4, 2).unwrap();
        let keys: BTreeSet<String> = months.iter().map(ToString::to_string).collect();
        let expected: BTreeSet<String> = ["2021-11", "2021-12", "2022-02", "2022-03"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn small_range_returns_none() {
        let correct = YearMonth::parse("2024-02").unwrap();
        let pool = TimingPool::Range {
            first: YearMonth::parse("2024-01").unwrap(),
            last: YearMonth::parse("2024-03").unwrap(),
            cap: 240,
        };
        assert!(month_distractors(correct, pool, 3, 1).is_none());
    }

    #[test]
    fn quarter_window_is_deterministic() {
        let q = YearQuarter::new(2023, 4).unwrap();
        let a = quarter_distractors(q, TimingPool::Window(2), 3, 9).unwrap();
        assert_eq!(a, quarter_distractors(q, TimingPool::Window(2), 3, 9).unwrap());
        assert!(!a.contains(&q));
    }
}
