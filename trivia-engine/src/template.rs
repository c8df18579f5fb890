//! Declarative question templates and the factory that runs them.
//!
//! A template is a plain record of functions: a prerequisite check, a format
//! proposal, one extraction step that may fail for data reasons, and pure
//! render steps over the extracted data. [`create_template`] wraps any such
//! record into the uniform [`QuestionTemplate`] object the builder walks.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use crate::context::Context;
use crate::error::ConfigurationError;
use crate::question::{DifficultySignals, ExplainFacts, QuestionDraft, QuestionFormat};
use crate::snapshot::SubjectKind;
use crate::topics::{SemanticTopic, TopicList};

/// Ordered formats a template can render, richest first.
pub type FormatList = SmallVec<[QuestionFormat; 4]>;

/// Machine-readable reason a candidate declined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DeclineReason {
    WrongSubject {
        expected: SubjectKind,
        actual: SubjectKind,
    },
    MissingData {
        field: String,
    },
    InsufficientData {
        field: String,
        have: usize,
        need: usize,
    },
    NotApplicable {
        detail: String,
    },
}

impl DeclineReason {
    #[must_use]
    pub fn missing(field: &str) -> Self {
        Self::MissingData {
            field: field.to_string(),
        }
    }

    #[must_use]
    pub fn insufficient(field: &str, have: usize, need: usize) -> Self {
        Self::InsufficientData {
            field: field.to_string(),
            have,
            need,
        }
    }

    #[must_use]
    pub fn not_applicable(detail: &str) -> Self {
        Self::NotApplicable {
            detail: detail.to_string(),
        }
    }
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongSubject { expected, actual } => {
                write!(f, "built for {expected} subjects, not {actual}")
            }
            Self::MissingData { field } => write!(f, "missing {field}"),
            Self::InsufficientData { field, have, need } => {
                write!(f, "{field}: have {have}, need {need}")
            }
            Self::NotApplicable { detail } => f.write_str(detail),
        }
    }
}

/// Prerequisite check outcome.
pub type Prereq = Result<(), DeclineReason>;

/// Shorthand for prerequisite checks over optional data.
///
/// # Errors
///
/// Returns [`DeclineReason::MissingData`] when `value` is `None`.
pub fn require<T>(value: Option<T>, field: &str) -> Result<T, DeclineReason> {
    value.ok_or_else(|| DeclineReason::missing(field))
}

/// Shorthand for minimum-size checks.
///
/// # Errors
///
/// Returns [`DeclineReason::InsufficientData`] when `have < need`.
pub fn require_len(have: usize, need: usize, field: &str) -> Prereq {
    if have < need {
        Err(DeclineReason::insufficient(field, have, need))
    } else {
        Ok(())
    }
}

/// A draft together with the semantic topics it actually disclosed.
#[derive(Debug, Clone, PartialEq)]
pub struct Instantiated {
    pub draft: QuestionDraft,
    pub topics: TopicList,
}

/// Uniform runtime object for templates and fallbacks.
pub trait QuestionTemplate: Send + Sync {
    fn id(&self) -> &str;

    fn subject(&self) -> Option<SubjectKind>;

    /// Topics the candidate may disclose, used for the pre-check.
    fn declared_topics(&self) -> &[SemanticTopic];

    /// Reusable candidates never block and are never blocked by topic overlap.
    fn is_reusable(&self) -> bool {
        false
    }

    /// Whether the candidate can run against `ctx`, including subject match.
    ///
    /// # Errors
    ///
    /// Returns the reason the candidate declines.
    fn check_prereqs(&self, ctx: &Context) -> Prereq;

    fn propose_formats(&self, ctx: &Context) -> FormatList;

    /// Run extraction and rendering for one format.
    ///
    /// Returns `Ok(None)` when extraction declines for data reasons.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] when the rendered draft violates the
    /// output contract.
    fn instantiate(
        &self,
        ctx: &Context,
        format: QuestionFormat,
        seed: u64,
    ) -> Result<Option<Instantiated>, ConfigurationError>;
}

/// Declarative description of one question type over extracted data `D`.
pub struct TemplateConfig<D> {
    pub id: &'static str,
    pub subject: SubjectKind,
    pub topics: &'static [SemanticTopic],
    /// Topics computed from the extraction, replacing `topics` when set.
    pub dynamic_topics: Option<fn(&D) -> TopicList>,
    pub reusable: bool,
    pub prereqs: fn(&Context) -> Prereq,
    pub formats: fn(&Context) -> FormatList,
    pub extract: fn(&Context, QuestionFormat, u64) -> Option<D>,
    pub prompt: fn(&D) -> String,
    pub clues: Option<fn(&D) -> Vec<String>>,
    pub choices: fn(&D) -> Vec<String>,
    pub answer_index: fn(&D) -> usize,
    pub answer_value: Option<fn(&D) -> Option<bool>>,
    pub margin: fn(&D) -> Option<f64>,
    pub facts: fn(&D) -> ExplainFacts,
}

struct ConfiguredTemplate<D> {
    config: TemplateConfig<D>,
}

/// Difficulty signals for a draft rendered against `ctx`.
#[must_use]
pub fn signals_for(ctx: &Context, format: QuestionFormat, margin: Option<f64>) -> DifficultySignals {
    DifficultySignals {
        format,
        familiarity: ctx.derived.familiarity,
        margin,
        volatility: ctx.derived.volatility_30d,
    }
}

impl<D: 'static> QuestionTemplate for ConfiguredTemplate<D> {
    fn id(&self) -> &str {
        self.config.id
    }

    fn subject(&self) -> Option<SubjectKind> {
        Some(self.config.subject)
    }

    fn declared_topics(&self) -> &[SemanticTopic] {
        self.config.topics
    }

    fn is_reusable(&self) -> bool {
        self.config.reusable
    }

    fn check_prereqs(&self, ctx: &Context) -> Prereq {
        if ctx.subject != self.config.subject {
            return Err(DeclineReason::WrongSubject {
                expected: self.config.subject,
                actual: ctx.subject,
            });
        }
        (self.config.prereqs)(ctx)
    }

    fn propose_formats(&self, ctx: &Context) -> FormatList {
        (self.config.formats)(ctx)
    }

    fn instantiate(
        &self,
        ctx: &Context,
        format: QuestionFormat,
        seed: u64,
    ) -> Result<Option<Instantiated>, ConfigurationError> {
        let config = &self.config;
        let Some(data) = (config.extract)(ctx, format, seed) else {
            return Ok(None);
        };
        let prompt = (config.prompt)(&data);
        let clues = config.clues.map(|clues| clues(&data)).unwrap_or_default();
        let choices = (config.choices)(&data);
        let answer_index = (config.answer_index)(&data);
        let answer_value = config.answer_value.and_then(|value| value(&data));
        let margin = (config.margin)(&data);
        let facts = (config.facts)(&data);

        let draft = QuestionDraft {
            template_id: config.id.to_string(),
            format,
            prompt,
            clues,
            choices,
            answer_index,
            answer_value,
            signals: signals_for(ctx, format, margin),
            facts,
            notes: Vec::new(),
        };
        draft.validate()?;

        let topics = config.dynamic_topics.map_or_else(
            || config.topics.iter().copied().collect(),
            |dynamic| dynamic(&data),
        );
        Ok(Some(Instantiated { draft, topics }))
    }
}

/// Wrap a declarative config into the uniform runtime object.
#[must_use]
pub fn create_template<D: 'static>(config: TemplateConfig<D>) -> Box<dyn QuestionTemplate> {
    Box::new(ConfiguredTemplate { config })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::protocol_context;
    use crate::question::FactValue;
    use smallvec::smallvec;

    struct Pair {
        answer: usize,
        choices: Vec<String>,
        show_size: bool,
    }

    fn extract_pair(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<Pair> {
        let show_size = ctx.topic.rank > 10;
        let answer = usize::try_from(seed % 2).ok()?;
        let choices = match format {
            QuestionFormat::TrueFalse => QuestionFormat::true_false_choices(),
            _ => vec!["left".to_string(), "right".to_string()],
        };
        Some(Pair {
            answer,
            choices,
            show_size,
        })
    }

    fn pair_config() -> TemplateConfig<Pair> {
        TemplateConfig {
            id: "pair",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::PeerComparison],
            dynamic_topics: Some(|pair: &Pair| {
                let mut topics: TopicList = smallvec![SemanticTopic::PeerComparison];
                if pair.show_size {
                    topics.push(SemanticTopic::SizeBand);
                }
                topics
            }),
            reusable: false,
            prereqs: |_| Ok(()),
            formats: |_| smallvec![QuestionFormat::Binary, QuestionFormat::TrueFalse],
            extract: extract_pair,
            prompt: |_| "Pick one".to_string(),
            clues: None,
            choices: |pair| pair.choices.clone(),
            answer_index: |pair| pair.answer,
            answer_value: Some(|pair| Some(pair.answer == 0)),
            margin: |_| Some(0.2),
            facts: |pair| ExplainFacts::new().with("answer", FactValue::Flag(pair.answer == 0)),
        }
    }

    #[test]
    fn instantiate_is_deterministic_and_returns_topics() {
        let template = create_template(pair_config());
        let ctx = protocol_context(14);
        let first = template
            .instantiate(&ctx, QuestionFormat::TrueFalse, 4)
            .unwrap()
            .unwrap();
        let second = template
            .instantiate(&ctx, QuestionFormat::TrueFalse, 4)
            .unwrap()
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.draft.answer_value, Some(true));
        assert!(first.topics.contains(&SemanticTopic::SizeBand));
        assert_eq!(first.draft.signals.margin, Some(0.2));
    }

    #[test]
    fn contract_violations_surface_as_configuration_errors() {
        let template = create_template(pair_config());
        let ctx = protocol_context(3);
        // Binary drafts must not carry a boolean answer value.
        let err = template
            .instantiate(&ctx, QuestionFormat::Binary, 1)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnexpectedAnswerValue { .. }));
        let err = template
            .instantiate(&ctx, QuestionFormat::Choice4, 1)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::ChoiceCardinality { .. }));
    }

    #[test]
    fn subject_mismatch_declines() {
        let mut config = pair_config();
        config.subject = SubjectKind::Chain;
        let template = create_template(config);
        let ctx = protocol_context(3);
        assert!(matches!(
            template.check_prereqs(&ctx),
            Err(DeclineReason::WrongSubject { .. })
        ));
    }

    #[test]
    fn decline_reasons_render() {
        assert_eq!(
            DeclineReason::insufficient("peers", 2, 5).to_string(),
            "peers: have 2, need 5"
        );
        assert_eq!(require::<u8>(None, "fees").unwrap_err().to_string(), "missing fees");
        assert!(require_len(3, 3, "x").is_ok());
    }
}
