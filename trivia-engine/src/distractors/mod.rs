//! Wrong-answer selection.
//!
//! Everything here is a pure function of its inputs and seed: identical
//! inputs produce identical distractors in identical order.

pub mod entity;
pub mod numeric;
pub mod timing;

pub use entity::{DistractorConstraints, EntityCandidate, pick};
pub use numeric::{BandWindow, Buckets, ValueChoices, band_window, bucketed, value_choices};
pub use timing::{TimingPool, month_distractors, quarter_distractors};

use crate::seed::{derive_seed, shuffle};

/// Shuffle the correct label in with its distractors, tracking where it lands.
#[must_use]
pub fn arrange(correct: String, wrong: Vec<String>, seed: u64) -> (Vec<String>, usize) {
    let mut tagged: Vec<(String, bool)> = Vec::with_capacity(wrong.len() + 1);
    tagged.push((correct, true));
    tagged.extend(wrong.into_iter().map(|label| (label, false)));
    let arranged = shuffle(&tagged, derive_seed(seed, &["arrange"]));
    let answer_index = arranged
        .iter()
        .position(|(_, is_correct)| *is_correct)
        .unwrap_or(0);
    (arranged.into_iter().map(|(label, _)| label).collect(), answer_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrange_tracks_the_correct_label() {
        let wrong = vec!["b".to_string(), "c".to_string(), "d".to_string()];
        for seed in 0..16 {
            let (choices, idx) = arrange("a".to_string(), wrong.clone(), seed);
            assert_eq!(choices.len(), 4);
            assert_eq!(choices[idx], "a");
        }
    }
}
