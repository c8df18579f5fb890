//! Identity templates: who the subject is, what it is, what it trades as.

use smallvec::smallvec;

use crate::bands::{COUNT_BANDS, PROTOCOL_COUNT_BANDS, size_band};
use crate::context::Context;
use crate::distractors::{DistractorConstraints, EntityCandidate, arrange, pick};
use crate::question::{ExplainFacts, FactValue, QuestionFormat};
use crate::seed::derive_seed;
use crate::snapshot::SubjectKind;
use crate::template::{
    FormatList, Prereq, QuestionTemplate, TemplateConfig, create_template, require, require_len,
};
use crate::templates::{ChoicePick, ChoiceTemplate, choice, entity_pick, label_pool, statement_prompt};
use crate::topics::{SemanticTopic, TopicList};

const MIN_CLUES: usize = 2;

/// A "guess the subject from these clues" question.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub kind: SubjectKind,
    pub clues: Vec<String>,
    pub choices: Vec<String>,
    pub answer_index: usize,
    /// Facts the clues revealed, identity included.
    pub revealed: TopicList,
    pub facts: ExplainFacts,
}

struct Clues {
    lines: Vec<String>,
    revealed: TopicList,
}

impl Clues {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            revealed: smallvec![SemanticTopic::Identity],
        }
    }

    fn add(&mut self, line: String, topic: SemanticTopic) {
        self.lines.push(line);
        self.revealed.push(topic);
    }
}

fn chain_footprint_clue(count: usize) -> String {
    if count == 1 {
        String::from("Deployed on a single chain")
    } else {
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        format!("Deployed on {} chains", COUNT_BANDS.label(f64::from(count)))
    }
}

fn protocol_clues(ctx: &Context) -> Clues {
    let mut clues = Clues::new();
    if let Some(category) = &ctx.topic.category {
        clues.add(format!("A {category} protocol"), SemanticTopic::Category);
    }
    if ctx.derived.chain_count > 0 {
        clues.add(
            chain_footprint_clue(ctx.derived.chain_count),
            SemanticTopic::ChainFootprint,
        );
    }
    // Size is only a useful hint for subjects players are unlikely to know.
    if !ctx.derived.familiarity.is_familiar() {
        clues.add(
            format!("Holds {} in TVL", size_band(ctx.topic.tvl)),
            SemanticTopic::SizeBand,
        );
    }
    clues
}

/// Protocol count on a chain, from the topic or the chain ranking.
pub(crate) fn chain_protocol_count(ctx: &Context) -> Option<u32> {
    ctx.topic.protocol_count.or_else(|| {
        ctx.raw
            .chains
            .iter()
            .find(|chain| chain.slug == ctx.topic.slug)
            .and_then(|chain| chain.protocol_count)
    })
}

/// Native token symbol of a chain.
pub(crate) fn chain_token(ctx: &Context) -> Option<String> {
    ctx.topic.symbol.clone().or_else(|| {
        ctx.raw
            .chains
            .iter()
            .find(|chain| chain.slug == ctx.topic.slug)
            .and_then(|chain| chain.token_symbol.clone())
    })
}

fn chain_clues(ctx: &Context) -> Clues {
    let mut clues = Clues::new();
    if let Some(count) = chain_protocol_count(ctx) {
        clues.add(
            format!(
                "Hosts {} protocols",
                PROTOCOL_COUNT_BANDS.label(f64::from(count)).to_lowercase()
            ),
            SemanticTopic::ProtocolCount,
        );
    }
    if let Some(category) = &ctx.derived.dominant_category {
        clues.add(
            format!("Its largest category by TVL is {}", category.label),
            SemanticTopic::DominantCategory,
        );
    }
    if !ctx.derived.familiarity.is_familiar() {
        clues.add(
            format!("Holds {} in TVL", size_band(ctx.topic.tvl)),
            SemanticTopic::SizeBand,
        );
    }
    clues
}

fn fingerprint_prereqs(ctx: &Context) -> Prereq {
    require_len(
        ctx.peer_pool().len(),
        QuestionFormat::Choice4.distractor_count(),
        "peer pool",
    )?;
    let clues = match ctx.subject {
        SubjectKind::Protocol => protocol_clues(ctx),
        SubjectKind::Chain => chain_clues(ctx),
    };
    require_len(clues.lines.len(), MIN_CLUES, "clues")
}

fn fingerprint_formats(_ctx: &Context) -> FormatList {
    smallvec![QuestionFormat::Choice6, QuestionFormat::Choice4]
}

fn fingerprint_distractors(
    ctx: &Context,
    count: usize,
    seed: u64,
    same_category: bool,
) -> Option<Vec<EntityCandidate>> {
    let subject = ctx.subject_candidate();
    let base = DistractorConstraints::with_cap(ctx.distractors.category_cap)
        .max_rank(ctx.distractors.max_rank)
        .near_rank(ctx.topic.rank);
    if same_category && ctx.topic.category.is_some() {
        let strict = DistractorConstraints {
            category_cap: count,
            ..base.clone().same_category(ctx.topic.category.as_deref())
        };
        let found = pick(&subject.id, &subject.label, ctx.peer_pool(), count, &strict, seed, None);
        if found.is_some() {
            return found;
        }
    }
    pick(&subject.id, &subject.label, ctx.peer_pool(), count, &base, seed, None)
}

fn extract_fingerprint(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<Fingerprint> {
    let clues = match ctx.subject {
        SubjectKind::Protocol => protocol_clues(ctx),
        SubjectKind::Chain => chain_clues(ctx),
    };
    if clues.lines.len() < MIN_CLUES || format == QuestionFormat::TrueFalse {
        return None;
    }
    let category_shown = clues.revealed.contains(&SemanticTopic::Category);
    let wrong = fingerprint_distractors(
        ctx,
        format.distractor_count(),
        derive_seed(seed, &["fingerprint", "peers"]),
        category_shown,
    )?;
    let (choices, answer_index) = arrange(
        ctx.topic.name.clone(),
        wrong.into_iter().map(|candidate| candidate.label).collect(),
        seed,
    );
    let facts = ExplainFacts::new()
        .with("answer", FactValue::Text(ctx.topic.name.clone()))
        .with("rank", FactValue::Rank(ctx.topic.rank))
        .with("tvl", FactValue::Usd(ctx.topic.tvl));
    Some(Fingerprint {
        kind: ctx.subject,
        clues: clues.lines,
        choices,
        answer_index,
        revealed: clues.revealed,
        facts,
    })
}

fn fingerprint_prompt(data: &Fingerprint) -> String {
    format!("Which {} matches all of these clues?", data.kind)
}

fn fingerprint_config(id: &'static str, subject: SubjectKind) -> TemplateConfig<Fingerprint> {
    TemplateConfig {
        id,
        subject,
        topics: &[SemanticTopic::Identity],
        dynamic_topics: Some(|data: &Fingerprint| data.revealed.clone()),
        reusable: false,
        prereqs: fingerprint_prereqs,
        formats: fingerprint_formats,
        extract: extract_fingerprint,
        prompt: fingerprint_prompt,
        clues: Some(|data: &Fingerprint| data.clues.clone()),
        choices: |data| data.choices.clone(),
        answer_index: |data| data.answer_index,
        answer_value: None,
        margin: |_| None,
        facts: |data| data.facts.clone(),
    }
}

// Category -----------------------------------------------------------------

fn category_pool(ctx: &Context) -> Vec<EntityCandidate> {
    label_pool(
        ctx.raw
            .categories
            .iter()
            .map(|aggregate| aggregate.name.as_str())
            .chain(ctx.raw.protocols.iter().filter_map(|p| p.category.as_deref())),
    )
}

fn category_prereqs(ctx: &Context) -> Prereq {
    let category = require(ctx.topic.category.as_deref(), "topic.category")?;
    let others = category_pool(ctx)
        .iter()
        .filter(|candidate| candidate.id != category)
        .count();
    require_len(others, 1, "category pool")
}

fn category_formats(ctx: &Context) -> FormatList {
    let others = category_pool(ctx).len().saturating_sub(1);
    let mut formats = FormatList::new();
    if others >= QuestionFormat::Choice4.distractor_count() {
        formats.push(QuestionFormat::Choice4);
    }
    formats.push(QuestionFormat::Binary);
    formats.push(QuestionFormat::TrueFalse);
    formats
}

fn category_claim(subject: &str, category: &str) -> String {
    format!("{subject} is a {category} protocol.")
}

fn extract_category(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let category = ctx.topic.category.clone()?;
    let correct = EntityCandidate::new(&category, &category, 0.0);
    let constraints = DistractorConstraints::with_cap(usize::MAX);
    let facts = ExplainFacts::new()
        .with("category", FactValue::Text(category))
        .with("rank", FactValue::Rank(ctx.topic.rank));
    entity_pick(
        &ctx.topic.name,
        format,
        seed,
        &correct,
        &category_pool(ctx),
        &constraints,
        category_claim,
    )
    .map(|pick| pick.with_facts(facts))
}

fn category_prompt(pick: &ChoicePick) -> String {
    if pick.format == QuestionFormat::TrueFalse {
        return statement_prompt(pick);
    }
    format!("Which category does {} belong to?", pick.subject)
}

// Native token -------------------------------------------------------------

fn token_pool(ctx: &Context) -> Vec<EntityCandidate> {
    label_pool(ctx.raw.chains.iter().filter_map(|chain| chain.token_symbol.as_deref()))
}

fn token_prereqs(ctx: &Context) -> Prereq {
    let token = require(chain_token(ctx), "topic.symbol")?;
    let others = token_pool(ctx)
        .iter()
        .filter(|candidate| candidate.id != token)
        .count();
    require_len(others, 1, "token pool")
}

fn token_formats(_ctx: &Context) -> FormatList {
    smallvec![
        QuestionFormat::Choice4,
        QuestionFormat::Binary,
        QuestionFormat::TrueFalse
    ]
}

fn token_claim(subject: &str, token: &str) -> String {
    format!("The native token of {subject} is {token}.")
}

fn extract_token(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let token = chain_token(ctx)?;
    let correct = EntityCandidate::new(&token, &token, 0.0);
    let facts = ExplainFacts::new()
        .with("token", FactValue::Text(token))
        .with("rank", FactValue::Rank(ctx.topic.rank));
    entity_pick(
        &ctx.topic.name,
        format,
        seed,
        &correct,
        &token_pool(ctx),
        &DistractorConstraints::with_cap(usize::MAX),
        token_claim,
    )
    .map(|pick| pick.with_facts(facts))
}

fn token_prompt(pick: &ChoicePick) -> String {
    if pick.format == QuestionFormat::TrueFalse {
        return statement_prompt(pick);
    }
    format!("What is the native token of {}?", pick.subject)
}

pub(crate) fn templates() -> Vec<Box<dyn QuestionTemplate>> {
    vec![
        create_template(fingerprint_config("protocol_fingerprint", SubjectKind::Protocol)),
        create_template(fingerprint_config("chain_fingerprint", SubjectKind::Chain)),
        choice(ChoiceTemplate {
            id: "protocol_category",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::Category],
            prereqs: category_prereqs,
            formats: category_formats,
            extract: extract_category,
            prompt: category_prompt,
        }),
        choice(ChoiceTemplate {
            id: "chain_native_token",
            subject: SubjectKind::Chain,
            topics: &[SemanticTopic::NativeToken],
            prereqs: token_prereqs,
            formats: token_formats,
            extract: extract_token,
            prompt: token_prompt,
        }),
    ]
}
