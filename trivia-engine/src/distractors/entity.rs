//! Entity distractors: wrong answers drawn from a peer pool.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::constants::{DEFAULT_CATEGORY_CAP, RANK_TIER_LIMITS};
use crate::metrics::ab_margin;
use crate::seed::{derive_seed, shuffle};

/// One selectable entity (protocol, chain, category, token).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCandidate {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Comparison value, usually TVL.
    pub value: f64,
    #[serde(default)]
    pub rank: Option<u32>,
}

impl EntityCandidate {
    #[must_use]
    pub fn new(id: &str, label: &str, value: f64) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            category: None,
            value,
            rank: None,
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: Option<&str>) -> Self {
        self.category = category.map(str::to_string);
        self
    }

    #[must_use]
    pub const fn with_rank(mut self, rank: Option<u32>) -> Self {
        self.rank = rank;
        self
    }
}

/// Filters and ordering preferences for [`pick`].
#[derive(Debug, Clone, PartialEq)]
pub struct DistractorConstraints {
    /// Ids that must never appear.
    pub avoid: BTreeSet<String>,
    /// Every distractor must share this category.
    pub must_match_category: Option<String>,
    /// Minimum relative separation from the correct value.
    pub min_value_margin: Option<f64>,
    /// Drop candidates ranked beyond this.
    pub max_rank: Option<u32>,
    pub exclude_categories: BTreeSet<String>,
    /// Order candidates by rank distance to this rank, closest tier first.
    pub prefer_near_rank: Option<u32>,
    /// Maximum distractors sharing one category.
    pub category_cap: usize,
}

impl Default for DistractorConstraints {
    fn default() -> Self {
        Self {
            avoid: BTreeSet::new(),
            must_match_category: None,
            min_value_margin: None,
            max_rank: None,
            exclude_categories: BTreeSet::new(),
            prefer_near_rank: None,
            category_cap: DEFAULT_CATEGORY_CAP,
        }
    }
}

impl DistractorConstraints {
    #[must_use]
    pub fn with_cap(category_cap: usize) -> Self {
        Self {
            category_cap,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn avoiding<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.avoid.extend(ids.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn same_category(mut self, category: Option<&str>) -> Self {
        self.must_match_category = category.map(str::to_string);
        self
    }

    #[must_use]
    pub const fn min_margin(mut self, margin: f64) -> Self {
        self.min_value_margin = Some(margin);
        self
    }

    #[must_use]
    pub const fn max_rank(mut self, rank: u32) -> Self {
        self.max_rank = Some(rank);
        self
    }

    #[must_use]
    pub fn excluding_category(mut self, category: &str) -> Self {
        self.exclude_categories.insert(category.to_string());
        self
    }

    #[must_use]
    pub const fn near_rank(mut self, rank: u32) -> Self {
        self.prefer_near_rank = Some(rank);
        self
    }

    fn admits(&self, candidate: &EntityCandidate, correct_id: &str, correct_value: Option<f64>) -> bool {
        if candidate.id == correct_id || self.avoid.contains(&candidate.id) {
            return false;
        }
        if let Some(required) = &self.must_match_category
            && candidate.category.as_deref() != Some(required.as_str())
        {
            return false;
        }
        if let (Some(min), Some(correct)) = (self.min_value_margin, correct_value)
            && ab_margin(candidate.value, correct).is_none_or(|margin| margin < min)
        {
            return false;
        }
        if let Some(max_rank) = self.max_rank
            && candidate.rank.is_some_and(|rank| rank > max_rank)
        {
            return false;
        }
        if let Some(category) = &candidate.category
            && self.exclude_categories.contains(category)
        {
            return false;
        }
        true
    }
}

fn rank_tier(rank: Option<u32>, target: u32) -> usize {
    let Some(rank) = rank else {
        return RANK_TIER_LIMITS.len();
    };
    let distance = rank.abs_diff(target);
    RANK_TIER_LIMITS
        .iter()
        .position(|limit| distance <= *limit)
        .unwrap_or(RANK_TIER_LIMITS.len())
}

/// Deterministic ordering of the admitted candidates.
fn order_candidates(
    admitted: Vec<EntityCandidate>,
    prefer_near_rank: Option<u32>,
    seed: u64,
) -> Vec<EntityCandidate> {
    let Some(target) = prefer_near_rank else {
        return shuffle(&admitted, derive_seed(seed, &["entity", "all"]));
    };
    let mut tiers: Vec<Vec<EntityCandidate>> = vec![Vec::new(); RANK_TIER_LIMITS.len() + 1];
    for candidate in admitted {
        tiers[rank_tier(candidate.rank, target)].push(candidate);
    }
    let mut ordered = Vec::new();
    for (tier_idx, tier) in tiers.iter().enumerate() {
        let tier_label = tier_idx.to_string();
        ordered.extend(shuffle(tier, derive_seed(seed, &["entity", "tier", &tier_label])));
    }
    ordered
}

/// Pick exactly `count` distractors for `correct_id`, or `None` when the
/// filtered pool cannot supply that many.
///
/// No distractor shares a label with another or with `correct_label`, even
/// when ids differ.
///
/// Identical inputs always produce identical output, content and order.
#[must_use]
pub fn pick(
    correct_id: &str,
    correct_label: &str,
    pool: &[EntityCandidate],
    count: usize,
    constraints: &DistractorConstraints,
    seed: u64,
    correct_value: Option<f64>,
) -> Option<Vec<EntityCandidate>> {
    let mut seen_ids = BTreeSet::new();
    let admitted: Vec<EntityCandidate> = pool
        .iter()
        .filter(|candidate| constraints.admits(candidate, correct_id, correct_value))
        .filter(|candidate| candidate.label != correct_label)
        .filter(|candidate| seen_ids.insert(candidate.id.clone()))
        .cloned()
        .collect();
    if admitted.len() < count {
        return None;
    }

    let ordered = order_candidates(admitted, constraints.prefer_near_rank, seed);
    let cap = constraints.category_cap.max(1);
    let mut per_category: BTreeMap<String, usize> = BTreeMap::new();
    let mut seen_labels = BTreeSet::from([correct_label.to_string()]);
    let mut accepted = Vec::with_capacity(count);
    for candidate in ordered {
        if accepted.len() == count {
            break;
        }
        if !seen_labels.insert(candidate.label.clone()) {
            continue;
        }
        if let Some(category) = &candidate.category {
            let used = per_category.entry(category.clone()).or_insert(0);
            if *used >= cap {
                continue;
            }
            *used += 1;
        }
        accepted.push(candidate);
    }
    (accepted.len() == count).then_some(accepted)
}
