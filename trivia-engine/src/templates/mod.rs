//! The closed catalog of question templates for protocols and chains.
//!
//! Most templates extract into a [`ChoicePick`]: the choices, answer and
//! margin are settled during extraction and the render steps read them back.
//! Only the prompt differs per template. Templates with richer output (clue
//! based identification, head-to-heads) carry their own data type.

use smallvec::smallvec;
use std::collections::BTreeSet;

use crate::bands::BandSet;
use crate::constants::TIGHT_MARGIN;
use crate::context::Context;
use crate::distractors::{DistractorConstraints, EntityCandidate, arrange, band_window, pick};
use crate::error::ConfigurationError;
use crate::fallbacks::{Fallback, standard_fallbacks};
use crate::question::{DifficultyTarget, ExplainFacts, QuestionFormat};
use crate::seed::{SeededRng, derive_seed};
use crate::snapshot::SubjectKind;
use crate::template::{
    FormatList, Prereq, QuestionTemplate, TemplateConfig, create_template,
};
use crate::topics::SemanticTopic;

pub mod comparison;
pub mod identity;
pub mod momentum;
pub mod scale;

/// Extracted data shared by single-answer templates.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoicePick {
    pub subject: String,
    pub format: QuestionFormat,
    /// Statement under test for true/false drafts.
    pub claim: Option<String>,
    pub choices: Vec<String>,
    pub answer_index: usize,
    pub truth: Option<bool>,
    pub margin: Option<f64>,
    pub facts: ExplainFacts,
}

impl ChoicePick {
    /// Multiple-choice or binary pick; `wrong` must hold exactly the
    /// distractor count the format needs. Declines when any two labels match.
    #[must_use]
    pub fn options(
        subject: &str,
        format: QuestionFormat,
        correct: String,
        wrong: Vec<String>,
        seed: u64,
    ) -> Option<Self> {
        if format == QuestionFormat::TrueFalse || wrong.len() != format.distractor_count() {
            return None;
        }
        let mut distinct = BTreeSet::from([correct.as_str()]);
        if !wrong.iter().all(|label| distinct.insert(label.as_str())) {
            return None;
        }
        let (choices, answer_index) = arrange(correct, wrong, seed);
        Some(Self {
            subject: subject.to_string(),
            format,
            claim: None,
            choices,
            answer_index,
            truth: None,
            margin: None,
            facts: ExplainFacts::new(),
        })
    }

    /// Pick over choices already in display order. Declines when the
    /// labels collide or do not match the format.
    #[must_use]
    pub fn listed(
        subject: &str,
        format: QuestionFormat,
        choices: Vec<String>,
        answer_index: usize,
    ) -> Option<Self> {
        let distinct: BTreeSet<&str> = choices.iter().map(String::as_str).collect();
        if format == QuestionFormat::TrueFalse
            || choices.len() != format.cardinality()
            || distinct.len() != choices.len()
            || answer_index >= choices.len()
        {
            return None;
        }
        Some(Self {
            subject: subject.to_string(),
            format,
            claim: None,
            choices,
            answer_index,
            truth: None,
            margin: None,
            facts: ExplainFacts::new(),
        })
    }

    /// True/false pick over `claim`.
    #[must_use]
    pub fn statement(subject: &str, claim: String, truth: bool) -> Self {
        Self {
            subject: subject.to_string(),
            format: QuestionFormat::TrueFalse,
            claim: Some(claim),
            choices: QuestionFormat::true_false_choices(),
            answer_index: if truth { 0 } else { 1 },
            truth: Some(truth),
            margin: None,
            facts: ExplainFacts::new(),
        }
    }

    #[must_use]
    pub const fn with_margin(mut self, margin: Option<f64>) -> Self {
        self.margin = margin;
        self
    }

    #[must_use]
    pub fn with_facts(mut self, facts: ExplainFacts) -> Self {
        self.facts = facts;
        self
    }

    /// The claim text, or an empty string for non true/false picks.
    #[must_use]
    pub fn claim_text(&self) -> &str {
        self.claim.as_deref().unwrap_or_default()
    }
}

fn pick_choices(pick: &ChoicePick) -> Vec<String> {
    pick.choices.clone()
}

const fn pick_answer_index(pick: &ChoicePick) -> usize {
    pick.answer_index
}

const fn pick_answer_value(pick: &ChoicePick) -> Option<bool> {
    pick.truth
}

const fn pick_margin(pick: &ChoicePick) -> Option<f64> {
    pick.margin
}

fn pick_facts(pick: &ChoicePick) -> ExplainFacts {
    pick.facts.clone()
}

/// The parts of a [`ChoicePick`] template that differ per question type.
pub struct ChoiceTemplate {
    pub id: &'static str,
    pub subject: SubjectKind,
    pub topics: &'static [SemanticTopic],
    pub prereqs: fn(&Context) -> Prereq,
    pub formats: fn(&Context) -> FormatList,
    pub extract: fn(&Context, QuestionFormat, u64) -> Option<ChoicePick>,
    pub prompt: fn(&ChoicePick) -> String,
}

impl From<ChoiceTemplate> for TemplateConfig<ChoicePick> {
    fn from(spec: ChoiceTemplate) -> Self {
        Self {
            id: spec.id,
            subject: spec.subject,
            topics: spec.topics,
            dynamic_topics: None,
            reusable: false,
            prereqs: spec.prereqs,
            formats: spec.formats,
            extract: spec.extract,
            prompt: spec.prompt,
            clues: None,
            choices: pick_choices,
            answer_index: pick_answer_index,
            answer_value: Some(pick_answer_value),
            margin: pick_margin,
            facts: pick_facts,
        }
    }
}

/// Build a boxed template from a [`ChoiceTemplate`] spec.
#[must_use]
pub fn choice(spec: ChoiceTemplate) -> Box<dyn QuestionTemplate> {
    create_template(TemplateConfig::from(spec))
}

/// Seeded coin flip.
#[must_use]
pub fn coin(seed: u64, label: &str) -> bool {
    SeededRng::new(derive_seed(seed, &[label])).next_float() < 0.5
}

/// Seeded choice between phrasing variants.
#[must_use]
pub fn phrasing<'a>(seed: u64, variants: &[&'a str]) -> &'a str {
    if variants.is_empty() {
        return "";
    }
    let idx = SeededRng::new(derive_seed(seed, &["phrasing"])).next_below(variants.len());
    variants[idx]
}

/// Band labels read mid-sentence: `Under $10M` becomes `under $10M`.
#[must_use]
pub fn lower_first(label: &str) -> String {
    let mut chars = label.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_lowercase().chain(chars).collect()
    })
}

/// `True or false: ...` prompt for statement picks.
#[must_use]
pub fn statement_prompt(pick: &ChoicePick) -> String {
    format!("True or false: {}", pick.claim_text())
}

/// Formats a band question can offer for `value`, richest first.
///
/// Values sitting close to a band boundary degrade to true/false only.
#[must_use]
pub fn band_formats(set: &BandSet, value: Option<f64>) -> FormatList {
    let Some(value) = value else {
        return FormatList::new();
    };
    if set.boundary_distance(value) < TIGHT_MARGIN {
        return smallvec![QuestionFormat::TrueFalse];
    }
    let mut formats = FormatList::new();
    if set.len() >= 6 {
        formats.push(QuestionFormat::Choice6);
    }
    if set.len() >= 4 {
        formats.push(QuestionFormat::Choice4);
    }
    formats.push(QuestionFormat::Binary);
    formats.push(QuestionFormat::TrueFalse);
    formats
}

/// Formats for single-answer entity questions, given the answer's lead.
#[must_use]
pub fn entity_formats(lead: Option<f64>, pool_size: usize) -> FormatList {
    if lead.is_some_and(|lead| lead < TIGHT_MARGIN) {
        return smallvec![QuestionFormat::TrueFalse];
    }
    let mut formats = FormatList::new();
    if pool_size >= QuestionFormat::Choice6.distractor_count() {
        formats.push(QuestionFormat::Choice6);
    }
    if pool_size >= QuestionFormat::Choice4.distractor_count() {
        formats.push(QuestionFormat::Choice4);
    }
    if pool_size >= 1 {
        formats.push(QuestionFormat::Binary);
        formats.push(QuestionFormat::TrueFalse);
    }
    formats
}

/// Neighbouring band index for a false claim or a binary foil.
fn neighbour_band(set: &BandSet, correct: usize, seed: u64) -> usize {
    let last = set.len().saturating_sub(1);
    if correct == 0 {
        1.min(last)
    } else if correct >= last || coin(seed, "neighbour") {
        correct - 1
    } else {
        correct + 1
    }
}

/// Band question: the answer is the band label holding `value`.
///
/// `statement` renders a true/false claim from the subject name and a band
/// label.
#[must_use]
pub fn band_pick(
    subject: &str,
    format: QuestionFormat,
    seed: u64,
    set: &BandSet,
    value: f64,
    statement: fn(&str, &str) -> String,
) -> Option<ChoicePick> {
    let correct = set.index(value).min(set.len().saturating_sub(1));
    let correct_label = set.labels.get(correct)?;
    let margin = Some(set.boundary_distance(value));
    let pick = match format {
        QuestionFormat::TrueFalse => {
            let truth = coin(seed, "claim");
            let claimed = if truth {
                correct
            } else {
                neighbour_band(set, correct, seed)
            };
            let claimed_label = set.labels.get(claimed)?;
            if !truth && claimed == correct {
                return None;
            }
            ChoicePick::statement(subject, statement(subject, claimed_label), truth)
        }
        QuestionFormat::Binary => {
            let foil = neighbour_band(set, correct, seed);
            if foil == correct {
                return None;
            }
            let foil_label = set.labels.get(foil)?;
            ChoicePick::options(
                subject,
                format,
                (*correct_label).to_string(),
                vec![(*foil_label).to_string()],
                seed,
            )?
        }
        QuestionFormat::Choice4 | QuestionFormat::Choice6 => {
            let window = band_window(set, value, format.cardinality(), seed)?;
            ChoicePick::listed(subject, format, window.labels(set), window.answer_index)?
        }
    };
    Some(pick.with_margin(margin))
}

/// Entity question: the answer is `correct`, distractors come from `pool`.
///
/// For true/false the claim names either the answer or one distractor.
#[must_use]
pub fn entity_pick(
    subject: &str,
    format: QuestionFormat,
    seed: u64,
    correct: &EntityCandidate,
    pool: &[EntityCandidate],
    constraints: &DistractorConstraints,
    statement: fn(&str, &str) -> String,
) -> Option<ChoicePick> {
    let needed = format.distractor_count().max(1);
    let wrong = pick(
        &correct.id,
        &correct.label,
        pool,
        needed,
        constraints,
        derive_seed(seed, &["entity"]),
        Some(correct.value),
    )?;
    if format == QuestionFormat::TrueFalse {
        let truth = coin(seed, "claim");
        let named = if truth {
            correct.label.as_str()
        } else {
            wrong.first()?.label.as_str()
        };
        return Some(ChoicePick::statement(subject, statement(subject, named), truth));
    }
    let labels = wrong.into_iter().map(|candidate| candidate.label).collect();
    ChoicePick::options(subject, format, correct.label.clone(), labels, seed)
}

/// Plain labelled pool from a list of names, used for categories and tokens.
#[must_use]
pub fn label_pool<I, S>(names: I) -> Vec<EntityCandidate>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = BTreeSet::new();
    names
        .into_iter()
        .filter(|name| !name.as_ref().trim().is_empty())
        .filter(|name| seen.insert(name.as_ref().to_string()))
        .map(|name| EntityCandidate::new(name.as_ref(), name.as_ref(), 0.0))
        .collect()
}

/// Every protocol and chain template.
#[must_use]
pub fn standard_templates() -> Vec<Box<dyn QuestionTemplate>> {
    let mut templates = Vec::new();
    templates.extend(identity::templates());
    templates.extend(scale::templates());
    templates.extend(comparison::templates());
    templates.extend(momentum::templates());
    templates
}

/// Templates and fallbacks the builder can draw from, with unique ids.
pub struct Catalog {
    templates: Vec<Box<dyn QuestionTemplate>>,
    fallbacks: Vec<Fallback>,
}

impl Catalog {
    /// Assemble a catalog, rejecting duplicate ids.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateCandidate`] when two entries
    /// share an id.
    pub fn new(
        templates: Vec<Box<dyn QuestionTemplate>>,
        fallbacks: Vec<Fallback>,
    ) -> Result<Self, ConfigurationError> {
        let mut ids = BTreeSet::new();
        let all_ids = templates
            .iter()
            .map(|template| template.id().to_string())
            .chain(fallbacks.iter().map(|fallback| fallback.id.to_string()));
        for id in all_ids {
            if !ids.insert(id.clone()) {
                return Err(ConfigurationError::DuplicateCandidate(id));
            }
        }
        Ok(Self {
            templates,
            fallbacks,
        })
    }

    /// The full protocol and chain catalog.
    ///
    /// # Errors
    ///
    /// Returns an error only if the built-in catalog has duplicate ids.
    pub fn standard() -> Result<Self, ConfigurationError> {
        Self::new(standard_templates(), standard_fallbacks())
    }

    #[must_use]
    pub fn template(&self, id: &str) -> Option<&dyn QuestionTemplate> {
        self.templates
            .iter()
            .find(|template| template.id() == id)
            .map(Box::as_ref)
    }

    pub fn templates(&self) -> impl Iterator<Item = &dyn QuestionTemplate> + '_ {
        self.templates.iter().map(Box::as_ref)
    }

    /// Fallbacks for a difficulty tier and subject kind, in library order.
    pub fn fallbacks_for(
        &self,
        tier: DifficultyTarget,
        kind: SubjectKind,
    ) -> impl Iterator<Item = &Fallback> + '_ {
        self.fallbacks
            .iter()
            .filter(move |fallback| fallback.tier == tier && fallback.applies_to(kind))
    }

    #[must_use]
    pub fn fallbacks(&self) -> &[Fallback] {
        &self.fallbacks
    }
}
