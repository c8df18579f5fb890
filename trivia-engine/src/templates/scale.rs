//! Scale templates: how big the subject is and how its TVL is spread.

use crate::bands::{
    CONCENTRATION_BANDS, COUNT_BANDS, PROTOCOL_COUNT_BANDS, RANK_BANDS, SIZE_BANDS,
};
use crate::context::{Context, Leader};
use crate::distractors::{DistractorConstraints, EntityCandidate};
use crate::numbers::usize_to_f64;
use crate::question::{ExplainFacts, FactValue, QuestionFormat};
use crate::snapshot::SubjectKind;
use crate::template::{DeclineReason, FormatList, Prereq, QuestionTemplate, require, require_len};
use crate::templates::identity::chain_protocol_count;
use crate::templates::{
    ChoicePick, ChoiceTemplate, band_formats, band_pick, choice, entity_formats, entity_pick,
    label_pool, lower_first, statement_prompt,
};
use crate::topics::SemanticTopic;

fn band_prompt(pick: &ChoicePick, question: &str) -> String {
    if pick.format == QuestionFormat::TrueFalse {
        statement_prompt(pick)
    } else {
        question.replace("{subject}", &pick.subject)
    }
}

fn positive_tvl(ctx: &Context) -> Prereq {
    if ctx.topic.tvl.is_finite() && ctx.topic.tvl > 0.0 {
        Ok(())
    } else {
        Err(DeclineReason::not_applicable("subject has no positive TVL"))
    }
}

fn leader_candidate(leader: &Leader) -> EntityCandidate {
    EntityCandidate::new(&leader.id, &leader.label, leader.value)
}

// Size band ----------------------------------------------------------------

fn size_formats(ctx: &Context) -> FormatList {
    band_formats(&SIZE_BANDS, Some(ctx.topic.tvl))
}

fn size_claim(subject: &str, label: &str) -> String {
    format!("{subject} holds {} in total value locked.", lower_first(label))
}

fn extract_size(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let facts = ExplainFacts::new()
        .with("tvl", FactValue::Usd(ctx.topic.tvl))
        .with("size_band", FactValue::Text(SIZE_BANDS.label(ctx.topic.tvl).to_string()));
    band_pick(&ctx.topic.name, format, seed, &SIZE_BANDS, ctx.topic.tvl, size_claim)
        .map(|pick| pick.with_facts(facts))
}

fn size_prompt(pick: &ChoicePick) -> String {
    band_prompt(pick, "Which range contains {subject}'s total value locked?")
}

// Rank band ----------------------------------------------------------------

fn rank_value(ctx: &Context) -> f64 {
    f64::from(ctx.topic.rank)
}

fn rank_prereqs(ctx: &Context) -> Prereq {
    if ctx.topic.rank == 0 {
        return Err(DeclineReason::missing("topic.rank"));
    }
    Ok(())
}

fn rank_formats(ctx: &Context) -> FormatList {
    band_formats(&RANK_BANDS, Some(rank_value(ctx)))
}

fn rank_claim(subject: &str, label: &str) -> String {
    format!("{subject} sits in the \"{label}\" group when ranked by TVL.")
}

fn extract_rank(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let facts = ExplainFacts::new()
        .with("rank", FactValue::Rank(ctx.topic.rank))
        .with("tvl", FactValue::Usd(ctx.topic.tvl));
    band_pick(&ctx.topic.name, format, seed, &RANK_BANDS, rank_value(ctx), rank_claim)
        .map(|pick| pick.with_facts(facts))
}

fn protocol_rank_prompt(pick: &ChoicePick) -> String {
    band_prompt(pick, "Where does {subject} rank among all protocols by TVL?")
}

fn chain_rank_prompt(pick: &ChoicePick) -> String {
    band_prompt(pick, "Where does {subject} rank among all chains by TVL?")
}

// Chain footprint ----------------------------------------------------------

fn chain_count_value(ctx: &Context) -> Option<f64> {
    (ctx.derived.chain_count > 0).then(|| usize_to_f64(ctx.derived.chain_count))
}

fn chain_count_prereqs(ctx: &Context) -> Prereq {
    require(chain_count_value(ctx), "topic.chains").map(|_| ())
}

fn chain_count_formats(ctx: &Context) -> FormatList {
    band_formats(&COUNT_BANDS, chain_count_value(ctx))
}

fn chain_count_claim(subject: &str, label: &str) -> String {
    if label == "1" {
        format!("{subject} is deployed on a single chain.")
    } else {
        format!("{subject} is deployed on {} chains.", lower_first(label))
    }
}

fn extract_chain_count(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let count = chain_count_value(ctx)?;
    let facts = ExplainFacts::new().with(
        "chains",
        FactValue::Count(u32::try_from(ctx.derived.chain_count).unwrap_or(u32::MAX)),
    );
    band_pick(&ctx.topic.name, format, seed, &COUNT_BANDS, count, chain_count_claim)
        .map(|pick| pick.with_facts(facts))
}

fn chain_count_prompt(pick: &ChoicePick) -> String {
    band_prompt(pick, "On how many chains is {subject} deployed?")
}

// Top chain ----------------------------------------------------------------

fn top_chain_prereqs(ctx: &Context) -> Prereq {
    require(ctx.derived.top_chain.as_ref(), "derived.top_chain")?;
    require_len(ctx.raw.chain_tvls.len(), 2, "raw.chain_tvls")
}

fn top_chain_formats(ctx: &Context) -> FormatList {
    let lead = ctx.derived.top_chain.as_ref().and_then(|leader| leader.lead);
    entity_formats(lead, ctx.chain_pool().len().saturating_sub(1))
}

fn top_chain_claim(subject: &str, chain: &str) -> String {
    format!("{subject} holds more of its TVL on {chain} than on any other chain.")
}

fn extract_top_chain(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let leader = ctx.derived.top_chain.as_ref()?;
    let correct = leader_candidate(leader);
    // Any other large chain is a plausible wrong answer.
    let constraints = DistractorConstraints::with_cap(usize::MAX)
        .max_rank(ctx.distractors.max_rank)
        .near_rank(1);
    let facts = ExplainFacts::new()
        .with("top_chain", FactValue::Text(leader.label.clone()))
        .with("top_chain_share", FactValue::Share(leader.share))
        .with("top_chain_tvl", FactValue::Usd(leader.value));
    let pool: Vec<EntityCandidate> = ctx
        .chain_pool()
        .iter()
        .filter(|chain| chain.label != leader.label)
        .cloned()
        .collect();
    entity_pick(
        &ctx.topic.name,
        format,
        seed,
        &correct,
        &pool,
        &constraints,
        top_chain_claim,
    )
    .map(|pick| {
        pick.with_margin(leader.lead.or(Some(leader.share)))
            .with_facts(facts)
    })
}

fn top_chain_prompt(pick: &ChoicePick) -> String {
    band_prompt(pick, "On which chain does {subject} hold the most TVL?")
}

// Chain concentration ------------------------------------------------------

fn top_chain_share(ctx: &Context) -> Option<f64> {
    ctx.derived.top_chain.as_ref().map(|leader| leader.share)
}

fn concentration_formats(ctx: &Context) -> FormatList {
    band_formats(&CONCENTRATION_BANDS, top_chain_share(ctx))
}

fn concentration_claim(subject: &str, label: &str) -> String {
    format!(
        "{subject} keeps {} of its TVL on its largest chain.",
        lower_first(label)
    )
}

fn extract_concentration(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let leader = ctx.derived.top_chain.as_ref()?;
    let facts = ExplainFacts::new()
        .with("top_chain", FactValue::Text(leader.label.clone()))
        .with("top_chain_share", FactValue::Share(leader.share));
    band_pick(
        &ctx.topic.name,
        format,
        seed,
        &CONCENTRATION_BANDS,
        leader.share,
        concentration_claim,
    )
    .map(|pick| pick.with_facts(facts))
}

fn concentration_prompt(pick: &ChoicePick) -> String {
    band_prompt(pick, "What share of {subject}'s TVL sits on its largest chain?")
}

// Top protocol on a chain --------------------------------------------------

fn onchain_pool(ctx: &Context) -> Vec<EntityCandidate> {
    ctx.raw
        .chain_protocols
        .iter()
        .filter(|protocol| protocol.tvl.is_finite() && protocol.tvl > 0.0)
        .map(|protocol| {
            EntityCandidate::new(&protocol.slug, &protocol.name, protocol.tvl)
                .with_category(protocol.category.as_deref())
                .with_rank(protocol.rank)
        })
        .collect()
}

fn top_protocol_prereqs(ctx: &Context) -> Prereq {
    require(ctx.derived.top_protocol.as_ref(), "raw.chain_protocols")?;
    require_len(ctx.raw.chain_protocols.len(), 2, "raw.chain_protocols")
}

fn top_protocol_formats(ctx: &Context) -> FormatList {
    let lead = ctx.derived.top_protocol.as_ref().and_then(|leader| leader.lead);
    entity_formats(lead, onchain_pool(ctx).len().saturating_sub(1))
}

fn top_protocol_claim(subject: &str, protocol: &str) -> String {
    format!("{protocol} is the largest protocol on {subject} by TVL.")
}

fn extract_top_protocol(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let leader = ctx.derived.top_protocol.as_ref()?;
    let correct = leader_candidate(leader);
    let constraints = DistractorConstraints::with_cap(ctx.distractors.category_cap);
    let facts = ExplainFacts::new()
        .with("top_protocol", FactValue::Text(leader.label.clone()))
        .with("top_protocol_tvl", FactValue::Usd(leader.value))
        .with("top_protocol_share", FactValue::Share(leader.share));
    entity_pick(
        &ctx.topic.name,
        format,
        seed,
        &correct,
        &onchain_pool(ctx),
        &constraints,
        top_protocol_claim,
    )
    .map(|pick| pick.with_margin(leader.lead).with_facts(facts))
}

fn top_protocol_prompt(pick: &ChoicePick) -> String {
    band_prompt(pick, "Which protocol holds the most TVL on {subject}?")
}

// Protocol count -----------------------------------------------------------

fn protocol_count_value(ctx: &Context) -> Option<f64> {
    chain_protocol_count(ctx).map(f64::from)
}

fn protocol_count_prereqs(ctx: &Context) -> Prereq {
    require(chain_protocol_count(ctx), "topic.protocol_count").map(|_| ())
}

fn protocol_count_formats(ctx: &Context) -> FormatList {
    band_formats(&PROTOCOL_COUNT_BANDS, protocol_count_value(ctx))
}

fn protocol_count_claim(subject: &str, label: &str) -> String {
    format!("{subject} hosts {} protocols.", lower_first(label))
}

fn extract_protocol_count(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let count = chain_protocol_count(ctx)?;
    let facts = ExplainFacts::new().with("protocol_count", FactValue::Count(count));
    band_pick(
        &ctx.topic.name,
        format,
        seed,
        &PROTOCOL_COUNT_BANDS,
        f64::from(count),
        protocol_count_claim,
    )
    .map(|pick| pick.with_facts(facts))
}

fn protocol_count_prompt(pick: &ChoicePick) -> String {
    band_prompt(pick, "How many protocols are deployed on {subject}?")
}

// Dominant category --------------------------------------------------------

fn category_choices(ctx: &Context) -> Vec<EntityCandidate> {
    label_pool(
        ctx.raw
            .chain_protocols
            .iter()
            .filter_map(|protocol| protocol.category.as_deref())
            .chain(ctx.raw.categories.iter().map(|aggregate| aggregate.name.as_str())),
    )
}

fn dominant_prereqs(ctx: &Context) -> Prereq {
    require(ctx.derived.dominant_category.as_ref(), "raw.chain_protocols")?;
    require_len(category_choices(ctx).len(), 2, "categories")
}

fn dominant_formats(ctx: &Context) -> FormatList {
    let lead = ctx
        .derived
        .dominant_category
        .as_ref()
        .and_then(|leader| leader.lead);
    entity_formats(lead, category_choices(ctx).len().saturating_sub(1))
}

fn dominant_claim(subject: &str, category: &str) -> String {
    format!("{category} is the largest category on {subject} by TVL.")
}

fn extract_dominant(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let leader = ctx.derived.dominant_category.as_ref()?;
    let correct = EntityCandidate::new(&leader.id, &leader.label, 0.0);
    let facts = ExplainFacts::new()
        .with("dominant_category", FactValue::Text(leader.label.clone()))
        .with("dominant_category_share", FactValue::Share(leader.share));
    entity_pick(
        &ctx.topic.name,
        format,
        seed,
        &correct,
        &category_choices(ctx),
        &DistractorConstraints::with_cap(usize::MAX),
        dominant_claim,
    )
    .map(|pick| pick.with_margin(leader.lead).with_facts(facts))
}

fn dominant_prompt(pick: &ChoicePick) -> String {
    band_prompt(pick, "Which category holds the most TVL on {subject}?")
}

// Protocol concentration ---------------------------------------------------

fn top_protocol_share(ctx: &Context) -> Option<f64> {
    ctx.derived.top_protocol.as_ref().map(|leader| leader.share)
}

fn protocol_concentration_formats(ctx: &Context) -> FormatList {
    band_formats(&CONCENTRATION_BANDS, top_protocol_share(ctx))
}

fn protocol_concentration_claim(subject: &str, label: &str) -> String {
    format!(
        "The largest protocol on {subject} holds {} of the chain's TVL.",
        lower_first(label)
    )
}

fn extract_protocol_concentration(
    ctx: &Context,
    format: QuestionFormat,
    seed: u64,
) -> Option<ChoicePick> {
    let leader = ctx.derived.top_protocol.as_ref()?;
    let facts = ExplainFacts::new()
        .with("top_protocol", FactValue::Text(leader.label.clone()))
        .with("top_protocol_share", FactValue::Share(leader.share));
    band_pick(
        &ctx.topic.name,
        format,
        seed,
        &CONCENTRATION_BANDS,
        leader.share,
        protocol_concentration_claim,
    )
    .map(|pick| pick.with_facts(facts))
}

fn protocol_concentration_prompt(pick: &ChoicePick) -> String {
    band_prompt(pick, "What share of {subject}'s TVL sits in its largest protocol?")
}

pub(crate) fn templates() -> Vec<Box<dyn QuestionTemplate>> {
    vec![
        choice(ChoiceTemplate {
            id: "protocol_size_band",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::SizeBand],
            prereqs: positive_tvl,
            formats: size_formats,
            extract: extract_size,
            prompt: size_prompt,
        }),
        choice(ChoiceTemplate {
            id: "chain_size_band",
            subject: SubjectKind::Chain,
            topics: &[SemanticTopic::SizeBand],
            prereqs: positive_tvl,
            formats: size_formats,
            extract: extract_size,
            prompt: size_prompt,
        }),
        choice(ChoiceTemplate {
            id: "protocol_rank_band",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::TvlRank],
            prereqs: rank_prereqs,
            formats: rank_formats,
            extract: extract_rank,
            prompt: protocol_rank_prompt,
        }),
        choice(ChoiceTemplate {
            id: "chain_rank_band",
            subject: SubjectKind::Chain,
            topics: &[SemanticTopic::TvlRank],
            prereqs: rank_prereqs,
            formats: rank_formats,
            extract: extract_rank,
            prompt: chain_rank_prompt,
        }),
        choice(ChoiceTemplate {
            id: "protocol_chain_count",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::ChainFootprint],
            prereqs: chain_count_prereqs,
            formats: chain_count_formats,
            extract: extract_chain_count,
            prompt: chain_count_prompt,
        }),
        choice(ChoiceTemplate {
            id: "protocol_top_chain",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::TopChain],
            prereqs: top_chain_prereqs,
            formats: top_chain_formats,
            extract: extract_top_chain,
            prompt: top_chain_prompt,
        }),
        choice(ChoiceTemplate {
            id: "protocol_chain_concentration",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::ChainConcentration],
            prereqs: top_chain_prereqs,
            formats: concentration_formats,
            extract: extract_concentration,
            prompt: concentration_prompt,
        }),
        choice(ChoiceTemplate {
            id: "chain_top_protocol",
            subject: SubjectKind::Chain,
            topics: &[SemanticTopic::TopProtocol],
            prereqs: top_protocol_prereqs,
            formats: top_protocol_formats,
            extract: extract_top_protocol,
            prompt: top_protocol_prompt,
        }),
        choice(ChoiceTemplate {
            id: "chain_protocol_count",
            subject: SubjectKind::Chain,
            topics: &[SemanticTopic::ProtocolCount],
            prereqs: protocol_count_prereqs,
            formats: protocol_count_formats,
            extract: extract_protocol_count,
            prompt: protocol_count_prompt,
        }),
        choice(ChoiceTemplate {
            id: "chain_dominant_category",
            subject: SubjectKind::Chain,
            topics: &[SemanticTopic::DominantCategory],
            prereqs: dominant_prereqs,
            formats: dominant_formats,
            extract: extract_dominant,
            prompt: dominant_prompt,
        }),
        choice(ChoiceTemplate {
            id: "chain_protocol_concentration",
            subject: SubjectKind::Chain,
            topics: &[SemanticTopic::ProtocolConcentration],
            prereqs: top_protocol_prereqs,
            formats: protocol_concentration_formats,
            extract: extract_protocol_concentration,
            prompt: protocol_concentration_prompt,
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::{chain_context, protocol_context};

    fn template(id: &str) -> Box<dyn QuestionTemplate> {
        templates().into_iter().find(|t| t.id() == id).unwrap()
    }

    #[test]
    fn lower_first_only_touches_first_char() {
        assert_eq!(lower_first("Under $10M"), "under $10M");
        assert_eq!(lower_first(""), "");
    }

    #[test]
    fn top_chain_answer_is_the_largest_share() {
        let ctx = protocol_context(9);
        let top_chain = template("protocol_top_chain");
        assert!(top_chain.check_prereqs(&ctx).is_ok());
        let out = top_chain
            .instantiate(&ctx, QuestionFormat::Choice4, 12)
            .unwrap()
            .unwrap();
        assert_eq!(out.draft.correct_choice(), Some("Chain 1"));
        assert_eq!(out.draft.signals.margin, ctx.derived.top_chain.as_ref().unwrap().lead);
    }

    #[test]
    fn chain_templates_decline_for_protocols() {
        let ctx = protocol_context(9);
        for id in ["chain_top_protocol", "chain_protocol_count", "chain_size_band"] {
            assert!(template(id).check_prereqs(&ctx).is_err(), "{id}");
        }
    }

    #[test]
    fn chain_top_protocol_and_concentration() {
        let ctx = chain_context(6);
        let out = template("chain_top_protocol")
            .instantiate(&ctx, QuestionFormat::Choice4, 3)
            .unwrap()
            .unwrap();
        assert_eq!(out.draft.correct_choice(), Some("ONCHAIN1"));

        let concentration = template("chain_protocol_concentration");
        let formats = concentration.propose_formats(&ctx);
        assert!(!formats.is_empty());
        for format in formats {
            let out = concentration.instantiate(&ctx, format, 3).unwrap().unwrap();
            assert_eq!(out.draft.choices.len(), format.cardinality());
        }
    }

    #[test]
    fn size_band_true_false_is_consistent() {
        let ctx = chain_context(6);
        let size = template("chain_size_band");
        for seed in 0..16 {
            let out = size
                .instantiate(&ctx, QuestionFormat::TrueFalse, seed)
                .unwrap()
                .unwrap();
            let claims_truth = out
                .draft
                .prompt
                .contains(&lower_first(SIZE_BANDS.label(ctx.topic.tvl)));
            assert_eq!(out.draft.answer_value, Some(claims_truth));
        }
    }
}
