//! Question drafts, final questions and the signals that score them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::calendar::{YearMonth, YearQuarter};
use crate::constants::{FALSE_LABEL, FAMILIAR_RANK_MAX, KNOWN_RANK_MAX, TRUE_LABEL};
use crate::error::ConfigurationError;
use crate::topics::TopicList;

/// Answer format of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionFormat {
    TrueFalse,
    /// Two named options (A or B).
    Binary,
    Choice4,
    Choice6,
}

impl QuestionFormat {
    /// Number of choices the format requires.
    #[must_use]
    pub const fn cardinality(self) -> usize {
        match self {
            Self::TrueFalse | Self::Binary => 2,
            Self::Choice4 => 4,
            Self::Choice6 => 6,
        }
    }

    /// A-priori probability of guessing right.
    #[must_use]
    pub const fn guess_probability(self) -> f64 {
        match self {
            Self::TrueFalse | Self::Binary => 0.5,
            Self::Choice4 => 0.25,
            Self::Choice6 => 1.0 / 6.0,
        }
    }

    /// Number of wrong answers the format needs.
    #[must_use]
    pub const fn distractor_count(self) -> usize {
        self.cardinality() - 1
    }

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::TrueFalse => "tf",
            Self::Binary => "ab",
            Self::Choice4 => "mc4",
            Self::Choice6 => "mc6",
        }
    }

    /// The two canonical true/false labels, in index order.
    #[must_use]
    pub fn true_false_choices() -> Vec<String> {
        vec![TRUE_LABEL.to_string(), FALSE_LABEL.to_string()]
    }
}

impl fmt::Display for QuestionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Target difficulty of a slot, and the discretized difficulty of a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTarget {
    Easy,
    Medium,
    Hard,
}

impl DifficultyTarget {
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for DifficultyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// How well-known a subject is, discretized from its size rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamiliarityBucket {
    Household,
    Known,
    Niche,
}

impl FamiliarityBucket {
    #[must_use]
    pub const fn from_rank(rank: u32) -> Self {
        if rank <= FAMILIAR_RANK_MAX {
            Self::Household
        } else if rank <= KNOWN_RANK_MAX {
            Self::Known
        } else {
            Self::Niche
        }
    }

    #[must_use]
    pub const fn is_familiar(self) -> bool {
        matches!(self, Self::Household)
    }
}

/// Transient inputs to the difficulty score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultySignals {
    pub format: QuestionFormat,
    pub familiarity: FamiliarityBucket,
    pub margin: Option<f64>,
    pub volatility: Option<f64>,
}

/// A typed value inside explanation facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FactValue {
    Usd(f64),
    /// Signed relative change (0.12 = +12%).
    Change(f64),
    /// Unsigned share of a whole (0.4 = 40%).
    Share(f64),
    Rank(u32),
    Count(u32),
    Text(String),
    Month(YearMonth),
    Quarter(YearQuarter),
    Flag(bool),
}

/// One named fact an explanation may cite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub key: String,
    pub value: FactValue,
}

/// Structured facts carrying every number an explanation needs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExplainFacts(pub Vec<Fact>);

impl ExplainFacts {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: FactValue) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: &str, value: FactValue) {
        self.0.push(Fact {
            key: key.to_string(),
            value,
        });
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FactValue> {
        self.0.iter().find(|fact| fact.key == key).map(|fact| &fact.value)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Fact> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Template output before explanation text is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub template_id: String,
    pub format: QuestionFormat,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clues: Vec<String>,
    pub choices: Vec<String>,
    pub answer_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_value: Option<bool>,
    pub signals: DifficultySignals,
    pub facts: ExplainFacts,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl QuestionDraft {
    /// The correct choice label.
    #[must_use]
    pub fn correct_choice(&self) -> Option<&str> {
        self.choices.get(self.answer_index).map(String::as_str)
    }

    /// Check the output contract every template and fallback must honor.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] describing the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let template = self.template_id.clone();
        if self.prompt.trim().is_empty() {
            return Err(ConfigurationError::EmptyPrompt { template });
        }
        let expected = self.format.cardinality();
        if self.choices.len() != expected {
            return Err(ConfigurationError::ChoiceCardinality {
                template,
                format: self.format,
                expected,
                actual: self.choices.len(),
            });
        }
        if self.answer_index >= self.choices.len() {
            return Err(ConfigurationError::AnswerIndexOutOfRange {
                template,
                index: self.answer_index,
                len: self.choices.len(),
            });
        }
        for (idx, label) in self.choices.iter().enumerate() {
            if label.trim().is_empty() || self.choices[..idx].contains(label) {
                return Err(ConfigurationError::DuplicateChoice {
                    template,
                    label: label.clone(),
                });
            }
        }
        if self.format == QuestionFormat::TrueFalse {
            if self.choices != QuestionFormat::true_false_choices() {
                return Err(ConfigurationError::TrueFalseLabels { template });
            }
            let expected_value = self.answer_index == 0;
            if self.answer_value != Some(expected_value) {
                return Err(ConfigurationError::TrueFalseValue {
                    template,
                    value: self.answer_value,
                    index: self.answer_index,
                });
            }
        } else if self.answer_value.is_some() {
            return Err(ConfigurationError::UnexpectedAnswerValue { template });
        }
        Ok(())
    }
}

/// Where an accepted question came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionSource {
    Template,
    Fallback,
}

/// Final, immutable question within an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Unique within the episode.
    pub id: String,
    pub slot: String,
    pub target: DifficultyTarget,
    pub score: f64,
    pub source: QuestionSource,
    pub topics: TopicList,
    #[serde(flatten)]
    pub draft: QuestionDraft,
    pub explanation: String,
}
