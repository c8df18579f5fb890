//! Safe fallback questions for slots no template could fill.
//!
//! Fallbacks are ordinary templates tagged with a difficulty tier. They ask
//! about facts every validated snapshot carries, so at least one of them
//! should render for any subject. The builder accepts them without a score
//! match; the tier is the difficulty guarantee.

use smallvec::smallvec;

use crate::bands::{CHANGE_BANDS, PROTOCOL_COUNT_BANDS, RANK_BANDS, SIZE_BANDS};
use crate::constants::TREND_CLEAR_MOVE;
use crate::context::Context;
use crate::display::format_usd;
use crate::distractors::{DistractorConstraints, EntityCandidate};
use crate::metrics::ab_margin;
use crate::question::{DifficultyTarget, ExplainFacts, FactValue, QuestionFormat};
use crate::snapshot::SubjectKind;
use crate::template::{DeclineReason, FormatList, Prereq, QuestionTemplate, require};
use crate::templates::identity::chain_protocol_count;
use crate::templates::{
    ChoicePick, ChoiceTemplate, band_pick, choice, coin, entity_pick, label_pool, lower_first,
    statement_prompt,
};
use crate::topics::SemanticTopic;

/// Smallest weekly move the direction fallback will ask about.
const WEEKLY_MIN_MOVE: f64 = 0.005;
/// Smallest size gap for the bigger-peer fallback.
const PEER_MIN_MARGIN: f64 = 0.5;

/// A template reserved for filling exhausted slots.
pub struct Fallback {
    pub id: &'static str,
    pub tier: DifficultyTarget,
    template: Box<dyn QuestionTemplate>,
}

impl Fallback {
    fn new(tier: DifficultyTarget, spec: ChoiceTemplate) -> Self {
        Self {
            id: spec.id,
            tier,
            template: choice(spec),
        }
    }

    #[must_use]
    pub fn applies_to(&self, kind: SubjectKind) -> bool {
        self.template.subject() == Some(kind)
    }

    #[must_use]
    pub fn template(&self) -> &dyn QuestionTemplate {
        self.template.as_ref()
    }
}

impl std::fmt::Debug for Fallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fallback")
            .field("id", &self.id)
            .field("tier", &self.tier)
            .finish_non_exhaustive()
    }
}

fn always(_ctx: &Context) -> Prereq {
    Ok(())
}

fn true_false(_ctx: &Context) -> FormatList {
    smallvec![QuestionFormat::TrueFalse]
}

fn binary(_ctx: &Context) -> FormatList {
    smallvec![QuestionFormat::Binary]
}

fn four_way(_ctx: &Context) -> FormatList {
    smallvec![QuestionFormat::Choice4]
}

// TVL threshold ------------------------------------------------------------

/// Largest 1-2-5 step at or below `value`.
fn nice_floor(value: f64) -> f64 {
    let scale = 10_f64.powf(value.log10().floor());
    let mantissa = value / scale;
    let step = if mantissa >= 5.0 {
        5.0
    } else if mantissa >= 2.0 {
        2.0
    } else {
        1.0
    };
    step * scale
}

/// Smallest 1-2-5 step at or above `value`.
fn nice_ceil(value: f64) -> f64 {
    let scale = 10_f64.powf(value.log10().floor());
    let mantissa = value / scale;
    let step = if mantissa <= 1.0 {
        1.0
    } else if mantissa <= 2.0 {
        2.0
    } else if mantissa <= 5.0 {
        5.0
    } else {
        10.0
    };
    step * scale
}

fn positive_tvl(ctx: &Context) -> Prereq {
    if ctx.topic.tvl.is_finite() && ctx.topic.tvl > 0.0 {
        Ok(())
    } else {
        Err(DeclineReason::not_applicable("subject has no positive TVL"))
    }
}

fn extract_threshold(ctx: &Context, _format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let tvl = ctx.topic.tvl;
    if !(tvl.is_finite() && tvl > 0.0) {
        return None;
    }
    // Thresholds sit at least a factor of three away from the real value.
    let truth = coin(seed, "threshold");
    let threshold = if truth {
        nice_floor(tvl / 3.0)
    } else {
        nice_ceil(tvl * 3.0)
    };
    let claim = format!(
        "{} holds more than {} in total value locked.",
        ctx.topic.name,
        format_usd(threshold)
    );
    let facts = ExplainFacts::new().with("tvl", FactValue::Usd(tvl));
    Some(
        ChoicePick::statement(&ctx.topic.name, claim, truth)
            .with_margin(ab_margin(tvl, threshold))
            .with_facts(facts),
    )
}

// Weekly direction ---------------------------------------------------------

fn weekly_prereqs(ctx: &Context) -> Prereq {
    let change = require(ctx.derived.changes.d7, "derived.changes.d7")?;
    if change.abs() < WEEKLY_MIN_MOVE {
        return Err(DeclineReason::not_applicable("weekly move too small"));
    }
    Ok(())
}

fn extract_weekly(ctx: &Context, _format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let change = ctx.derived.changes.d7.filter(|c| c.abs() >= WEEKLY_MIN_MOVE)?;
    let claims_rising = coin(seed, "weekly");
    let word = if claims_rising { "higher" } else { "lower" };
    let claim = format!(
        "{}'s TVL is {word} today than it was a week ago.",
        ctx.topic.name
    );
    let facts = ExplainFacts::new().with("change_7d", FactValue::Change(change));
    Some(
        ChoicePick::statement(&ctx.topic.name, claim, claims_rising == (change > 0.0))
            .with_margin(Some((change.abs() / TREND_CLEAR_MOVE).min(1.0)))
            .with_facts(facts),
    )
}

// Bigger peer --------------------------------------------------------------

/// Nearest-ranked peer whose TVL differs clearly from the subject's.
fn distant_peer(ctx: &Context) -> Option<&EntityCandidate> {
    ctx.peer_pool()
        .iter()
        .filter(|peer| peer.id != ctx.topic.slug)
        .filter(|peer| {
            ab_margin(ctx.topic.tvl, peer.value).is_some_and(|margin| margin >= PEER_MIN_MARGIN)
        })
        .min_by_key(|peer| {
            (
                peer.rank.map_or(u32::MAX, |rank| rank.abs_diff(ctx.topic.rank)),
                peer.id.clone(),
            )
        })
}

fn bigger_peer_prereqs(ctx: &Context) -> Prereq {
    require(distant_peer(ctx), "peers with a clear size gap").map(|_| ())
}

fn extract_bigger_peer(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let peer = distant_peer(ctx)?;
    let subject = ctx.subject_candidate();
    let (winner, loser) = if subject.value > peer.value {
        (&subject, peer)
    } else {
        (peer, &subject)
    };
    let facts = ExplainFacts::new()
        .with(&format!("tvl:{}", winner.label), FactValue::Usd(winner.value))
        .with(&format!("tvl:{}", loser.label), FactValue::Usd(loser.value));
    ChoicePick::options(
        &ctx.topic.name,
        format,
        winner.label.clone(),
        vec![loser.label.clone()],
        seed,
    )
    .map(|pick| {
        pick.with_margin(ab_margin(winner.value, loser.value))
            .with_facts(facts)
    })
}

fn bigger_peer_prompt(pick: &ChoicePick) -> String {
    format!(
        "Which holds more TVL: {} or {}?",
        pick.choices[0], pick.choices[1]
    )
}

// Medium band facts --------------------------------------------------------

fn rank_claim(subject: &str, label: &str) -> String {
    format!("{subject} sits in the \"{label}\" group when ranked by TVL.")
}

fn extract_rank(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let facts = ExplainFacts::new().with("rank", FactValue::Rank(ctx.topic.rank));
    band_pick(
        &ctx.topic.name,
        format,
        seed,
        &RANK_BANDS,
        f64::from(ctx.topic.rank),
        rank_claim,
    )
    .map(|pick| pick.with_facts(facts))
}

fn rank_prompt(pick: &ChoicePick) -> String {
    format!("Which group does {} fall into when ranked by TVL?", pick.subject)
}

fn size_claim(subject: &str, label: &str) -> String {
    format!("{subject} holds {} in total value locked.", lower_first(label))
}

fn extract_size(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let facts = ExplainFacts::new().with("tvl", FactValue::Usd(ctx.topic.tvl));
    band_pick(&ctx.topic.name, format, seed, &SIZE_BANDS, ctx.topic.tvl, size_claim)
        .map(|pick| pick.with_facts(facts))
}

fn size_prompt(pick: &ChoicePick) -> String {
    format!("Roughly how much value is locked in {}?", pick.subject)
}

fn change_prereqs(ctx: &Context) -> Prereq {
    require(ctx.derived.changes.d30, "derived.changes.d30").map(|_| ())
}

fn change_claim(subject: &str, label: &str) -> String {
    format!("Over the past 30 days, {subject}'s TVL is {}.", lower_first(label))
}

fn extract_change(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let change = ctx.derived.changes.d30?;
    let facts = ExplainFacts::new().with("change_30d", FactValue::Change(change));
    band_pick(&ctx.topic.name, format, seed, &CHANGE_BANDS, change, change_claim)
        .map(|pick| pick.with_facts(facts))
}

fn change_prompt(pick: &ChoicePick) -> String {
    format!("How did {}'s TVL move over the past 30 days?", pick.subject)
}

fn category_choices(ctx: &Context) -> Vec<EntityCandidate> {
    label_pool(ctx.raw.categories.iter().map(|aggregate| aggregate.name.as_str()))
}

fn category_prereqs(ctx: &Context) -> Prereq {
    let category = require(ctx.topic.category.as_deref(), "topic.category")?;
    let others = category_choices(ctx)
        .into_iter()
        .filter(|candidate| candidate.id != category)
        .count();
    if others < QuestionFormat::Choice4.distractor_count() {
        return Err(DeclineReason::insufficient("raw.categories", others, 3));
    }
    Ok(())
}

fn category_claim(subject: &str, category: &str) -> String {
    format!("{subject} is a {category} protocol.")
}

fn extract_category(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let category = ctx.topic.category.as_deref()?;
    let correct = EntityCandidate::new(category, category, 0.0);
    let facts = ExplainFacts::new().with("category", FactValue::Text(category.to_string()));
    entity_pick(
        &ctx.topic.name,
        format,
        seed,
        &correct,
        &category_choices(ctx),
        &DistractorConstraints::with_cap(usize::MAX),
        category_claim,
    )
    .map(|pick| pick.with_facts(facts))
}

fn category_prompt(pick: &ChoicePick) -> String {
    format!("Which category does {} belong to?", pick.subject)
}

fn protocol_count_prereqs(ctx: &Context) -> Prereq {
    require(chain_protocol_count(ctx), "topic.protocol_count").map(|_| ())
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
    format!("How many protocols are deployed on {}?", pick.subject)
}

fn easy_for(kind: SubjectKind, ids: [&'static str; 3]) -> Vec<Fallback> {
    let [threshold, weekly, peer] = ids;
    vec![
        Fallback::new(
            DifficultyTarget::Easy,
            ChoiceTemplate {
                id: threshold,
                subject: kind,
                topics: &[SemanticTopic::SizeBand],
                prereqs: positive_tvl,
                formats: true_false,
                extract: extract_threshold,
                prompt: statement_prompt,
            },
        ),
        Fallback::new(
            DifficultyTarget::Easy,
            ChoiceTemplate {
                id: weekly,
                subject: kind,
                topics: &[SemanticTopic::Change7d],
                prereqs: weekly_prereqs,
                formats: true_false,
                extract: extract_weekly,
                prompt: statement_prompt,
            },
        ),
        Fallback::new(
            DifficultyTarget::Easy,
            ChoiceTemplate {
                id: peer,
                subject: kind,
                topics: &[SemanticTopic::PeerComparison],
                prereqs: bigger_peer_prereqs,
                formats: binary,
                extract: extract_bigger_peer,
                prompt: bigger_peer_prompt,
            },
        ),
    ]
}

fn medium_for(kind: SubjectKind, ids: [&'static str; 3]) -> Vec<Fallback> {
    let [rank, size, change] = ids;
    vec![
        Fallback::new(
            DifficultyTarget::Medium,
            ChoiceTemplate {
                id: rank,
                subject: kind,
                topics: &[SemanticTopic::TvlRank],
                prereqs: always,
                formats: four_way,
                extract: extract_rank,
                prompt: rank_prompt,
            },
        ),
        Fallback::new(
            DifficultyTarget::Medium,
            ChoiceTemplate {
                id: size,
                subject: kind,
                topics: &[SemanticTopic::SizeBand],
                prereqs: positive_tvl,
                formats: four_way,
                extract: extract_size,
                prompt: size_prompt,
            },
        ),
        Fallback::new(
            DifficultyTarget::Medium,
            ChoiceTemplate {
                id: change,
                subject: kind,
                topics: &[SemanticTopic::Trend30d],
                prereqs: change_prereqs,
                formats: four_way,
                extract: extract_change,
                prompt: change_prompt,
            },
        ),
    ]
}

/// The fallback library, easy entries first, each tier in trial order.
#[must_use]
pub fn standard_fallbacks() -> Vec<Fallback> {
    let mut fallbacks = Vec::new();
    fallbacks.extend(easy_for(
        SubjectKind::Protocol,
        [
            "fallback_protocol_tvl_threshold",
            "fallback_protocol_weekly_direction",
            "fallback_protocol_bigger_peer",
        ],
    ));
    fallbacks.extend(easy_for(
        SubjectKind::Chain,
        [
            "fallback_chain_tvl_threshold",
            "fallback_chain_weekly_direction",
            "fallback_chain_bigger_peer",
        ],
    ));
    fallbacks.extend(medium_for(
        SubjectKind::Protocol,
        [
            "fallback_protocol_rank_band",
            "fallback_protocol_size_band",
            "fallback_protocol_change_band",
        ],
    ));
    fallbacks.push(Fallback::new(
        DifficultyTarget::Medium,
        ChoiceTemplate {
            id: "fallback_protocol_category",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::Category],
            prereqs: category_prereqs,
            formats: four_way,
            extract: extract_category,
            prompt: category_prompt,
        },
    ));
    fallbacks.extend(medium_for(
        SubjectKind::Chain,
        [
            "fallback_chain_rank_band",
            "fallback_chain_size_band",
            "fallback_chain_change_band",
        ],
    ));
    fallbacks.push(Fallback::new(
        DifficultyTarget::Medium,
        ChoiceTemplate {
            id: "fallback_chain_protocol_count",
            subject: SubjectKind::Chain,
            topics: &[SemanticTopic::ProtocolCount],
            prereqs: protocol_count_prereqs,
            formats: four_way,
            extract: extract_protocol_count,
            prompt: protocol_count_prompt,
        },
    ));
    fallbacks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::{chain_context, protocol_context};

    #[test]
    fn nice_steps_bracket_the_value() {
        assert!((nice_floor(3.4e8) - 2.0e8).abs() < 1.0);
        assert!((nice_floor(7.0e9) - 5.0e9).abs() < 1.0);
        assert!((nice_ceil(3.4e8) - 5.0e8).abs() < 1.0);
        assert!((nice_ceil(6.0e8) - 1.0e9).abs() < 1.0);
        assert!((nice_ceil(1.0e6) - 1.0e6).abs() < 1e-6);
    }

    #[test]
    fn every_fallback_renders_for_rich_snapshots() {
        let protocol = protocol_context(14);
        let chain = chain_context(6);
        for fallback in standard_fallbacks() {
            let ctx = if fallback.applies_to(SubjectKind::Protocol) {
                &protocol
            } else {
                &chain
            };
            let template = fallback.template();
            assert!(template.check_prereqs(ctx).is_ok(), "{}", fallback.id);
            for format in template.propose_formats(ctx) {
                let out = template.instantiate(ctx, format, 7).unwrap();
                let out = out.unwrap_or_else(|| panic!("{} declined", fallback.id));
                assert_eq!(out.draft.choices.len(), format.cardinality());
            }
        }
    }

    #[test]
    fn threshold_claims_match_the_value() {
        let ctx = chain_context(6);
        let fallback = standard_fallbacks()
            .into_iter()
            .find(|f| f.id == "fallback_chain_tvl_threshold")
            .unwrap();
        for seed in 0..16 {
            let out = fallback
                .template()
                .instantiate(&ctx, QuestionFormat::TrueFalse, seed)
                .unwrap()
                .unwrap();
            let margin = out.draft.signals.margin.unwrap();
            assert!(margin >= 0.6, "{margin}");
        }
    }

    #[test]
    fn tiers_never_include_hard() {
        assert!(
            standard_fallbacks()
                .iter()
                .all(|f| f.tier != DifficultyTarget::Hard)
        );
    }
}
