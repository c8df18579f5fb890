//! Comparison templates: the subject against its peers.

use smallvec::smallvec;

use crate::constants::{MIN_PEERS_FOR_COMPARISON, TIGHT_MARGIN};
use crate::context::{Context, nearest_peer_margin};
use crate::display::{format_share, format_usd};
use crate::distractors::{DistractorConstraints, EntityCandidate, bucketed, value_choices};
use crate::metrics::{ab_margin, top2_margin};
use crate::question::{ExplainFacts, FactValue, QuestionFormat};
use crate::seed::derive_seed;
use crate::snapshot::SubjectKind;
use crate::template::{DeclineReason, FormatList, Prereq, QuestionTemplate, require, require_len};
use crate::templates::{
    ChoicePick, ChoiceTemplate, choice, coin, entity_formats, entity_pick, statement_prompt,
};
use crate::topics::SemanticTopic;

fn by_value_desc(field: &mut [EntityCandidate]) {
    field.sort_by(|a, b| b.value.total_cmp(&a.value).then_with(|| a.id.cmp(&b.id)));
}

// Head-to-head -------------------------------------------------------------

/// The subject and its `peers` nearest same-kind peers, largest first.
fn duel_field(ctx: &Context, peers: usize) -> Vec<EntityCandidate> {
    let mut field: Vec<EntityCandidate> = std::iter::once(ctx.subject_candidate())
        .chain(ctx.derived.nearby_peers.iter().take(peers).cloned())
        .collect();
    by_value_desc(&mut field);
    field
}

fn field_lead(field: &[EntityCandidate]) -> Option<f64> {
    let values: Vec<f64> = field.iter().map(|candidate| candidate.value).collect();
    top2_margin(&values)
}

fn duel_prereqs(ctx: &Context) -> Prereq {
    require_len(ctx.derived.nearby_peers.len(), 1, "derived.nearby_peers")?;
    require(nearest_peer_margin(ctx), "derived.nearby_peers").map(|_| ())
}

fn duel_formats(ctx: &Context) -> FormatList {
    let Some(margin) = nearest_peer_margin(ctx) else {
        return FormatList::new();
    };
    if margin < TIGHT_MARGIN {
        return smallvec![QuestionFormat::TrueFalse];
    }
    let mut formats = FormatList::new();
    if ctx.derived.nearby_peers.len() >= 3
        && field_lead(&duel_field(ctx, 3)).is_some_and(|lead| lead >= TIGHT_MARGIN)
    {
        formats.push(QuestionFormat::Choice4);
    }
    formats.push(QuestionFormat::Binary);
    formats.push(QuestionFormat::TrueFalse);
    formats
}

fn extract_duel(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let subject = ctx.subject_candidate();
    let peer = ctx.derived.nearby_peers.first()?;
    let facts = ExplainFacts::new()
        .with(&format!("tvl:{}", subject.label), FactValue::Usd(subject.value))
        .with(&format!("tvl:{}", peer.label), FactValue::Usd(peer.value));
    let pick = match format {
        QuestionFormat::TrueFalse => {
            let (first, second) = if coin(seed, "order") {
                (&subject, peer)
            } else {
                (peer, &subject)
            };
            let margin = ab_margin(first.value, second.value)?;
            if margin <= f64::EPSILON {
                return None;
            }
            let claim = format!("{} holds more TVL than {}.", first.label, second.label);
            ChoicePick::statement(&ctx.topic.name, claim, first.value > second.value)
                .with_margin(Some(margin))
        }
        QuestionFormat::Binary => {
            let mut field = vec![subject, peer.clone()];
            by_value_desc(&mut field);
            let margin = field_lead(&field);
            let [winner, loser] = <[EntityCandidate; 2]>::try_from(field).ok()?;
            ChoicePick::options(&ctx.topic.name, format, winner.label, vec![loser.label], seed)?
                .with_margin(margin)
        }
        QuestionFormat::Choice4 | QuestionFormat::Choice6 => {
            let field = duel_field(ctx, format.distractor_count());
            if field.len() != format.cardinality() {
                return None;
            }
            let margin = field_lead(&field);
            let mut labels = field.into_iter().map(|candidate| candidate.label);
            let winner = labels.next()?;
            ChoicePick::options(&ctx.topic.name, format, winner, labels.collect(), seed)?
                .with_margin(margin)
        }
    };
    Some(pick.with_facts(facts))
}

fn duel_prompt(pick: &ChoicePick, noun: &str) -> String {
    match pick.format {
        QuestionFormat::TrueFalse => statement_prompt(pick),
        QuestionFormat::Binary => format!(
            "Which holds more TVL: {} or {}?",
            pick.choices[0], pick.choices[1]
        ),
        QuestionFormat::Choice4 | QuestionFormat::Choice6 => {
            format!("Which of these {noun} holds the most TVL?")
        }
    }
}

fn protocol_duel_prompt(pick: &ChoicePick) -> String {
    duel_prompt(pick, "protocols")
}

fn chain_duel_prompt(pick: &ChoicePick) -> String {
    duel_prompt(pick, "chains")
}

// Category leader ----------------------------------------------------------

/// Every protocol in the subject's category, the subject included, largest first.
fn category_field(ctx: &Context) -> Vec<EntityCandidate> {
    let mut field: Vec<EntityCandidate> = std::iter::once(ctx.subject_candidate())
        .chain(ctx.derived.category_peers.iter().cloned())
        .collect();
    by_value_desc(&mut field);
    field
}

fn category_leader_prereqs(ctx: &Context) -> Prereq {
    require(ctx.topic.category.as_deref(), "topic.category")?;
    require_len(ctx.derived.category_peers.len(), 2, "derived.category_peers")
}

fn category_leader_formats(ctx: &Context) -> FormatList {
    let field = category_field(ctx);
    entity_formats(field_lead(&field), field.len().saturating_sub(1))
}

fn category_leader_claim(subject: &str, leader: &str) -> String {
    format!("{leader} holds more TVL than any other protocol in {subject}'s category.")
}

fn extract_category_leader(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let category = ctx.topic.category.as_deref()?;
    let field = category_field(ctx);
    let leader = field.first()?;
    let facts = ExplainFacts::new()
        .with("category", FactValue::Text(category.to_string()))
        .with("category_leader", FactValue::Text(leader.label.clone()))
        .with("category_leader_tvl", FactValue::Usd(leader.value));
    let constraints = DistractorConstraints::with_cap(usize::MAX).same_category(Some(category));
    entity_pick(
        &ctx.topic.name,
        format,
        seed,
        leader,
        &field,
        &constraints,
        category_leader_claim,
    )
    .map(|pick| pick.with_margin(field_lead(&field)).with_facts(facts))
}

fn category_leader_prompt(pick: &ChoicePick) -> String {
    if pick.format == QuestionFormat::TrueFalse {
        return statement_prompt(pick);
    }
    match pick.facts.get("category") {
        Some(FactValue::Text(name)) => format!("Which protocol holds the most TVL in {name}?"),
        _ => format!("Which protocol leads {}'s category by TVL?", pick.subject),
    }
}

// Fee efficiency -----------------------------------------------------------

/// Fees over a year at the current daily rate, as a share of TVL.
fn annual_fee_yield(ctx: &Context) -> Option<f64> {
    ctx.derived
        .fees_to_tvl
        .map(|ratio| ratio * 365.0)
        .filter(|fee_yield| fee_yield.is_finite() && *fee_yield > 0.0)
}

fn fee_yield_prereqs(ctx: &Context) -> Prereq {
    require(annual_fee_yield(ctx), "derived.fees_to_tvl").map(|_| ())
}

fn range_formats(_ctx: &Context) -> FormatList {
    smallvec![QuestionFormat::Choice4, QuestionFormat::Binary]
}

fn extract_fee_yield(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let fee_yield = annual_fee_yield(ctx)?;
    let buckets = bucketed(fee_yield, format.cardinality(), seed)?;
    let facts = ExplainFacts::new()
        .with("fees_24h", FactValue::Usd(ctx.derived.fees_24h?))
        .with("tvl", FactValue::Usd(ctx.topic.tvl))
        .with("annual_fee_yield", FactValue::Share(fee_yield));
    ChoicePick::listed(
        &ctx.topic.name,
        format,
        buckets.labels(format_share),
        buckets.answer_index,
    )
    .map(|pick| pick.with_margin(Some(buckets.margin)).with_facts(facts))
}

fn fee_yield_prompt(pick: &ChoicePick) -> String {
    format!(
        "At its current daily rate, what share of its TVL would {} earn in fees over a year?",
        pick.subject
    )
}

// Weekly mover -------------------------------------------------------------

struct Mover {
    id: String,
    label: String,
    change: f64,
}

/// The subject and its nearest peers with a known 7-day change, strongest first.
fn movers(ctx: &Context, peers: usize) -> Option<Vec<Mover>> {
    let own = Mover {
        id: ctx.topic.slug.clone(),
        label: ctx.topic.name.clone(),
        change: ctx.derived.changes.d7?,
    };
    let mut field: Vec<Mover> = std::iter::once(own)
        .chain(
            ctx.derived
                .nearby_peers
                .iter()
                .filter_map(|peer| {
                    let change = ctx
                        .raw
                        .protocols
                        .iter()
                        .find(|protocol| protocol.slug == peer.id)?
                        .change_7d?;
                    change.is_finite().then(|| Mover {
                        id: peer.id.clone(),
                        label: peer.label.clone(),
                        change,
                    })
                })
                .take(peers),
        )
        .collect();
    field.sort_by(|a, b| b.change.total_cmp(&a.change).then_with(|| a.id.cmp(&b.id)));
    Some(field)
}

/// Gap between the strongest and the runner-up move, in percentage points.
fn mover_gap(field: &[Mover]) -> Option<f64> {
    match field {
        [first, second, ..] => Some(first.change - second.change),
        _ => None,
    }
}

fn mover_prereqs(ctx: &Context) -> Prereq {
    require(ctx.derived.changes.d7, "derived.changes.d7")?;
    let known = movers(ctx, usize::MAX).map_or(0, |field| field.len().saturating_sub(1));
    require_len(known, MIN_PEERS_FOR_COMPARISON, "protocols.change_7d")
}

fn mover_formats(ctx: &Context) -> FormatList {
    match movers(ctx, 3).as_deref().and_then(mover_gap) {
        Some(gap) if gap >= 0.01 => smallvec![
            QuestionFormat::Choice4,
            QuestionFormat::Binary,
            QuestionFormat::TrueFalse
        ],
        Some(_) => smallvec![QuestionFormat::TrueFalse],
        None => FormatList::new(),
    }
}

fn extract_mover(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let field = movers(ctx, format.distractor_count())?;
    if field.len() != format.cardinality() {
        return None;
    }
    let gap = mover_gap(&field)?;
    if gap <= 0.0 {
        return None;
    }
    let mut facts = ExplainFacts::new();
    for mover in &field {
        facts.push(&format!("change_7d:{}", mover.label), FactValue::Change(mover.change));
    }
    let pick = if format == QuestionFormat::TrueFalse {
        // Subject against the single peer in the field.
        let own_first = field[0].id == ctx.topic.slug;
        let peer = if own_first { &field[1] } else { &field[0] };
        let claim = format!(
            "{}'s TVL grew faster over the past week than {}'s.",
            ctx.topic.name, peer.label
        );
        ChoicePick::statement(&ctx.topic.name, claim, own_first)
    } else {
        let mut labels = field.into_iter().map(|mover| mover.label);
        let winner = labels.next()?;
        ChoicePick::options(&ctx.topic.name, format, winner, labels.collect(), seed)?
    };
    Some(pick.with_margin(Some(gap)).with_facts(facts))
}

fn mover_prompt(pick: &ChoicePick) -> String {
    match pick.format {
        QuestionFormat::TrueFalse => statement_prompt(pick),
        QuestionFormat::Binary => format!(
            "Which saw the stronger TVL change over the past 7 days: {} or {}?",
            pick.choices[0], pick.choices[1]
        ),
        QuestionFormat::Choice4 | QuestionFormat::Choice6 => {
            "Which of these protocols saw the strongest TVL change over the past 7 days?"
                .to_string()
        }
    }
}

// Chain fees ---------------------------------------------------------------

fn other_chain_fees(ctx: &Context) -> Vec<f64> {
    ctx.raw
        .chains
        .iter()
        .filter(|chain| chain.slug != ctx.topic.slug)
        .filter_map(|chain| chain.fees_24h)
        .filter(|fees| fees.is_finite() && *fees > 0.0)
        .collect()
}

fn chain_fees_prereqs(ctx: &Context) -> Prereq {
    let fees = require(ctx.derived.fees_24h, "fees.total_24h")?;
    if fees <= 0.0 {
        return Err(DeclineReason::not_applicable("chain reported no fees"));
    }
    require_len(
        other_chain_fees(ctx).len(),
        QuestionFormat::Choice4.distractor_count(),
        "chains.fees_24h",
    )
}

fn extract_chain_fees(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let fees = ctx.derived.fees_24h?;
    let values = value_choices(
        fees,
        &other_chain_fees(ctx),
        format.distractor_count(),
        ctx.distractors.value_separation,
        derive_seed(seed, &["fees"]),
        format_usd,
    )?;
    let facts = ExplainFacts::new().with("fees_24h", FactValue::Usd(fees));
    ChoicePick::listed(&ctx.topic.name, format, values.labels, values.answer_index)
        .map(|pick| pick.with_margin(Some(values.margin)).with_facts(facts))
}

fn chain_fees_prompt(pick: &ChoicePick) -> String {
    format!(
        "How much did users pay in fees on {} over the last 24 hours?",
        pick.subject
    )
}

pub(crate) fn templates() -> Vec<Box<dyn QuestionTemplate>> {
    vec![
        choice(ChoiceTemplate {
            id: "protocol_peer_duel",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::PeerComparison],
            prereqs: duel_prereqs,
            formats: duel_formats,
            extract: extract_duel,
            prompt: protocol_duel_prompt,
        }),
        choice(ChoiceTemplate {
            id: "chain_duel",
            subject: SubjectKind::Chain,
            topics: &[SemanticTopic::PeerComparison],
            prereqs: duel_prereqs,
            formats: duel_formats,
            extract: extract_duel,
            prompt: chain_duel_prompt,
        }),
        choice(ChoiceTemplate {
            id: "protocol_category_leader",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::CategoryLeader, SemanticTopic::Category],
            prereqs: category_leader_prereqs,
            formats: category_leader_formats,
            extract: extract_category_leader,
            prompt: category_leader_prompt,
        }),
        choice(ChoiceTemplate {
            id: "protocol_fee_efficiency",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::FeeEfficiency],
            prereqs: fee_yield_prereqs,
            formats: range_formats,
            extract: extract_fee_yield,
            prompt: fee_yield_prompt,
        }),
        choice(ChoiceTemplate {
            id: "protocol_mover_7d",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::Change7d],
            prereqs: mover_prereqs,
            formats: mover_formats,
            extract: extract_mover,
            prompt: mover_prompt,
        }),
        choice(ChoiceTemplate {
            id: "chain_fees",
            subject: SubjectKind::Chain,
            topics: &[SemanticTopic::Fees],
            prereqs: chain_fees_prereqs,
            formats: range_formats,
            extract: extract_chain_fees,
            prompt: chain_fees_prompt,
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
    fn duel_answer_is_the_larger_entity() {
        let ctx = protocol_context(3);
        let duel = template("protocol_peer_duel");
        assert!(duel.check_prereqs(&ctx).is_ok());
        for format in duel.propose_formats(&ctx) {
            for seed in 0..8 {
                let out = duel.instantiate(&ctx, format, seed).unwrap().unwrap();
                match format {
                    QuestionFormat::TrueFalse => {
                        let claims_subject_bigger =
                            out.draft.prompt.starts_with("True or false: PROTO3 ");
                        // proto2 is the nearest peer and always larger.
                        assert_eq!(out.draft.answer_value, Some(!claims_subject_bigger));
                    }
                    _ => {
                        let winner = out.draft.correct_choice().unwrap();
                        assert!(winner == "PROTO1" || winner == "PROTO2", "{winner}");
                    }
                }
            }
        }
    }

    #[test]
    fn category_leader_draws_from_the_same_category() {
        let ctx = protocol_context(14);
        let leader = template("protocol_category_leader");
        let out = leader
            .instantiate(&ctx, QuestionFormat::Choice4, 5)
            .unwrap()
            .unwrap();
        assert_eq!(out.draft.correct_choice(), Some("PROTO2"));
        assert!(out.draft.prompt.contains("Liquid Staking"));
        for label in &out.draft.choices {
            let rank: u32 = label.trim_start_matches("PROTO").parse().unwrap();
            assert_eq!(rank % 6, 2, "{label}");
        }
    }

    #[test]
    fn mover_picks_the_strongest_week() {
        let ctx = protocol_context(14);
        let mover = template("protocol_mover_7d");
        assert!(mover.check_prereqs(&ctx).is_ok());
        let out = mover
            .instantiate(&ctx, QuestionFormat::Choice4, 1)
            .unwrap()
            .unwrap();
        // Field is proto13, proto15, proto12 and the subject; change_7d is 1% per rank.
        assert_eq!(out.draft.correct_choice(), Some("PROTO15"));
    }

    #[test]
    fn fee_templates_hold_their_value() {
        let ctx = protocol_context(14);
        let out = template("protocol_fee_efficiency")
            .instantiate(&ctx, QuestionFormat::Choice4, 2)
            .unwrap()
            .unwrap();
        assert_eq!(out.draft.choices.len(), 4);

        let ctx = chain_context(4);
        let fees = template("chain_fees");
        assert!(fees.check_prereqs(&ctx).is_ok());
        let out = fees
            .instantiate(&ctx, QuestionFormat::Choice4, 2)
            .unwrap()
            .unwrap();
        assert_eq!(out.draft.correct_choice(), Some(format_usd(7.5e5).as_str()));
    }
}
