//! Numeric distractors: ratio buckets, band windows and separated values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::bands::BandSet;
use crate::constants::BUCKET_RATIO_STEP;
use crate::metrics::ab_margin;
use crate::numbers::round_significant;
use crate::seed::{SeededRng, derive_seed, sample, shuffle};

/// Geometric ranges around a value, the correct range in a middle slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buckets {
    /// `(low, high)` bounds in display order; `low` inclusive.
    pub ranges: Vec<(f64, f64)>,
    pub answer_index: usize,
    /// Relative distance of the value to the nearer edge of its range.
    pub margin: f64,
}

impl Buckets {
    /// Render every range with `format`, `"$1M to $2.5M"` style.
    #[must_use]
    pub fn labels(&self, format: fn(f64) -> String) -> Vec<String> {
        self.ranges
            .iter()
            .map(|(low, high)| format!("{} to {}", format(*low), format(*high)))
            .collect()
    }
}

/// Index positions that are not at either end of a `count`-wide list.
fn middle_positions(count: usize) -> Vec<usize> {
    if count <= 2 {
        (0..count).collect()
    } else {
        (1..count - 1).collect()
    }
}

/// Build `count` ratio buckets of width [`BUCKET_RATIO_STEP`] with the
/// bucket containing `value` placed in a seed-chosen middle position.
#[must_use]
pub fn bucketed(value: f64, count: usize, seed: u64) -> Option<Buckets> {
    if !value.is_finite() || value <= 0.0 || count < 2 {
        return None;
    }
    let mut rng = SeededRng::new(derive_seed(seed, &["numeric", "bucketed"]));
    let positions = middle_positions(count);
    let answer_index = positions[rng.next_below(positions.len())];

    // Offset of the value inside its bucket, in log space, kept off the edges.
    let offset = 0.25 + 0.5 * rng.next_float();
    let mut low = round_significant(value / BUCKET_RATIO_STEP.powf(offset), 2);
    if low > value {
        low = round_significant(value / BUCKET_RATIO_STEP, 2);
    }
    let mut high = round_significant(low * BUCKET_RATIO_STEP, 2);
    if high <= value {
        high = value * 1.01;
        low = high / BUCKET_RATIO_STEP;
    }

    let mut ranges = Vec::with_capacity(count);
    for idx in 0..count {
        let steps = i32::try_from(idx).ok()? - i32::try_from(answer_index).ok()?;
        let factor = BUCKET_RATIO_STEP.powi(steps);
        let range_low = if steps == 0 { low } else { round_significant(low * factor, 2) };
        let range_high = if steps == 0 {
            high
        } else {
            round_significant(low * factor * BUCKET_RATIO_STEP, 2)
        };
        ranges.push((range_low, range_high));
    }
    let margin = ab_margin(value, low)
        .into_iter()
        .chain(ab_margin(value, high))
        .fold(1.0_f64, f64::min);
    Some(Buckets {
        ranges,
        answer_index,
        margin,
    })
}

/// A contiguous window of band indices containing the correct band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandWindow {
    pub indices: Vec<usize>,
    pub answer_index: usize,
}

impl BandWindow {
    #[must_use]
    pub fn labels(&self, set: &BandSet) -> Vec<String> {
        self.indices
            .iter()
            .filter_map(|idx| set.labels.get(*idx))
            .map(|label| (*label).to_string())
            .collect()
    }
}

/// Choose `count` adjacent bands of `set` around the band holding `value`,
/// preferring windows where the correct band is not at an edge.
#[must_use]
pub fn band_window(set: &BandSet, value: f64, count: usize, seed: u64) -> Option<BandWindow> {
    if count < 2 || set.len() < count {
        return None;
    }
    let correct = set.index(value);
    let max_start = set.len() - count;
    let containing: Vec<usize> = (0..=max_start)
        .filter(|start| correct >= *start && correct < start + count)
        .collect();
    let interior: Vec<usize> = containing
        .iter()
        .copied()
        .filter(|start| correct > *start && correct + 1 < start + count)
        .collect();
    let starts = if interior.is_empty() || count == 2 {
        containing
    } else {
        interior
    };
    let mut rng = SeededRng::new(derive_seed(seed, &["numeric", "window"]));
    let start = starts[rng.next_below(starts.len())];
    Some(BandWindow {
        indices: (start..start + count).collect(),
        answer_index: correct - start,
    })
}

/// Separated numeric choices with the correct value's index tracked through
/// the shuffle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChoices {
    pub values: Vec<f64>,
    pub labels: Vec<String>,
    pub answer_index: usize,
    /// Smallest relative gap between the correct value and a distractor.
    pub margin: f64,
}

/// Pick `count` distractor values at least `min_separation` (relative) away
/// from `correct`, then shuffle them together with the correct value.
///
/// Candidates whose rendered label collides with an earlier one are dropped
/// before sampling so no two choices read the same.
#[must_use]
pub fn value_choices(
    correct: f64,
    candidates: &[f64],
    count: usize,
    min_separation: f64,
    seed: u64,
    format: fn(f64) -> String,
) -> Option<ValueChoices> {
    let correct_label = format(correct);
    let mut labels_seen = BTreeSet::from([correct_label.clone()]);
    let separated: Vec<f64> = candidates
        .iter()
        .copied()
        .filter(|candidate| candidate.is_finite())
        .filter(|candidate| {
            ab_margin(*candidate, correct).is_some_and(|margin| margin >= min_separation)
        })
        .filter(|candidate| labels_seen.insert(format(*candidate)))
        .collect();
    if separated.len() < count {
        return None;
    }
    let picked = sample(&separated, count, derive_seed(seed, &["numeric", "sample"]));
    let margin = picked
        .iter()
        .filter_map(|value| ab_margin(*value, correct))
        .fold(1.0_f64, f64::min);

    let mut tagged: Vec<(f64, bool)> = vec![(correct, true)];
    tagged.extend(picked.into_iter().map(|value| (value, false)));
    let arranged = shuffle(&tagged, derive_seed(seed, &["numeric", "arrange"]));
    let answer_index = arranged.iter().position(|(_, is_correct)| *is_correct)?;
    Some(ValueChoices {
        labels: arranged.iter().map(|(value, _)| format(*value)).collect(),
        values: arranged.into_iter().map(|(value, _)| value).collect(),
        answer_index,
        margin,
    })
}
