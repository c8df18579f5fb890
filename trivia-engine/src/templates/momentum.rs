//! Momentum and history templates: trends, peaks, listings and flows.

use smallvec::smallvec;

use crate::bands::{CHANGE_BANDS, DRAWDOWN_BANDS};
use crate::calendar::{YearMonth, YearQuarter};
use crate::constants::{MIN_SERIES_POINTS, TIGHT_MARGIN, TREND_CLEAR_MOVE, TREND_MIN_MOVE};
use crate::context::Context;
use crate::display::format_usd;
use crate::distractors::{TimingPool, bucketed, month_distractors, quarter_distractors};
use crate::metrics::ab_margin;
use crate::question::{ExplainFacts, FactValue, QuestionFormat};
use crate::snapshot::SubjectKind;
use crate::template::{DeclineReason, FormatList, Prereq, QuestionTemplate, require, require_len};
use crate::templates::{
    ChoicePick, ChoiceTemplate, band_formats, band_pick, choice, coin, lower_first, phrasing,
    statement_prompt,
};
use crate::topics::SemanticTopic;

fn enough_history(ctx: &Context) -> Prereq {
    require_len(ctx.raw.tvl_series.len(), MIN_SERIES_POINTS, "raw.tvl_series")
}

/// Claim over a named answer, or choices with `wrong` as distractors.
fn timing_pick(
    subject: &str,
    format: QuestionFormat,
    seed: u64,
    correct: String,
    wrong: Vec<String>,
    claim: fn(&str, &str) -> String,
) -> Option<ChoicePick> {
    if format == QuestionFormat::TrueFalse {
        let truth = coin(seed, "claim");
        let named = if truth { correct } else { wrong.into_iter().next()? };
        return Some(ChoicePick::statement(subject, claim(subject, &named), truth));
    }
    let wrong = wrong.into_iter().take(format.distractor_count()).collect();
    ChoicePick::options(subject, format, correct, wrong, seed)
}

// 30-day trend -------------------------------------------------------------

fn clear_trend(ctx: &Context) -> Option<f64> {
    ctx.derived
        .changes
        .d30
        .filter(|change| change.abs() >= TREND_MIN_MOVE)
}

fn trend_prereqs(ctx: &Context) -> Prereq {
    enough_history(ctx)?;
    let change = require(ctx.derived.changes.d30, "derived.changes.d30")?;
    if change.abs() < TREND_MIN_MOVE {
        return Err(DeclineReason::not_applicable("30-day move too small to call a direction"));
    }
    Ok(())
}

fn trend_formats(ctx: &Context) -> FormatList {
    if clear_trend(ctx).is_some() {
        smallvec![QuestionFormat::TrueFalse, QuestionFormat::Binary]
    } else {
        FormatList::new()
    }
}

const RISING_CLAIMS: [&str; 2] = [
    "{subject}'s TVL is higher today than it was 30 days ago.",
    "{subject} has grown its TVL over the past 30 days.",
];

const FALLING_CLAIMS: [&str; 2] = [
    "{subject}'s TVL is lower today than it was 30 days ago.",
    "{subject} has lost TVL over the past 30 days.",
];

fn extract_trend(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let change = clear_trend(ctx)?;
    let rising = change > 0.0;
    let margin = Some((change.abs() / TREND_CLEAR_MOVE).min(1.0));
    let facts = ExplainFacts::new()
        .with("change_30d", FactValue::Change(change))
        .with("tvl", FactValue::Usd(ctx.topic.tvl));
    let subject = ctx.topic.name.as_str();
    let pick = match format {
        QuestionFormat::TrueFalse => {
            let claims_rising = coin(seed, "direction");
            let variants = if claims_rising {
                &RISING_CLAIMS
            } else {
                &FALLING_CLAIMS
            };
            let claim = phrasing(seed, variants).replace("{subject}", subject);
            ChoicePick::statement(subject, claim, claims_rising == rising)
        }
        QuestionFormat::Binary => ChoicePick::listed(
            subject,
            format,
            vec!["Up".to_string(), "Down".to_string()],
            usize::from(!rising),
        )?,
        QuestionFormat::Choice4 | QuestionFormat::Choice6 => return None,
    };
    Some(pick.with_margin(margin).with_facts(facts))
}

fn trend_prompt(pick: &ChoicePick) -> String {
    if pick.format == QuestionFormat::TrueFalse {
        statement_prompt(pick)
    } else {
        format!(
            "Over the past 30 days, did {}'s TVL go up or down?",
            pick.subject
        )
    }
}

// 30-day change band -------------------------------------------------------

fn change_prereqs(ctx: &Context) -> Prereq {
    enough_history(ctx)?;
    require(ctx.derived.changes.d30, "derived.changes.d30").map(|_| ())
}

fn change_formats(ctx: &Context) -> FormatList {
    band_formats(&CHANGE_BANDS, ctx.derived.changes.d30)
}

fn change_claim(subject: &str, label: &str) -> String {
    format!(
        "Over the past 30 days, {subject}'s TVL is {}.",
        lower_first(label)
    )
}

fn extract_change(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let change = ctx.derived.changes.d30?;
    let facts = ExplainFacts::new().with("change_30d", FactValue::Change(change));
    band_pick(&ctx.topic.name, format, seed, &CHANGE_BANDS, change, change_claim)
        .map(|pick| pick.with_facts(facts))
}

fn change_prompt(pick: &ChoicePick) -> String {
    if pick.format == QuestionFormat::TrueFalse {
        statement_prompt(pick)
    } else {
        format!("How did {}'s TVL move over the past 30 days?", pick.subject)
    }
}

// All-time high month ------------------------------------------------------

fn ath_month(ctx: &Context) -> Option<YearMonth> {
    ctx.derived
        .ath
        .as_ref()
        .and_then(|ath| YearMonth::from_timestamp(ath.time))
}

/// Months around `correct` when the window fits inside the series history,
/// otherwise the whole history.
fn month_pool(ctx: &Context, correct: YearMonth) -> Option<TimingPool<YearMonth>> {
    let first = YearMonth::from_timestamp(ctx.raw.tvl_series.first()?.time)?;
    let last = YearMonth::from_date(ctx.date);
    let width = ctx.distractors.month_window;
    let lo = correct.offset(-i64::from(width))?;
    let hi = correct.offset(i64::from(width))?;
    if lo >= first && hi <= last {
        Some(TimingPool::Window(width))
    } else {
        Some(TimingPool::Range {
            first,
            last,
            cap: ctx.distractors.history_cap,
        })
    }
}

fn ath_prereqs(ctx: &Context) -> Prereq {
    enough_history(ctx)?;
    require(ath_month(ctx), "derived.ath").map(|_| ())
}

fn timing_formats(_ctx: &Context) -> FormatList {
    smallvec![
        QuestionFormat::Choice6,
        QuestionFormat::Choice4,
        QuestionFormat::Binary,
        QuestionFormat::TrueFalse
    ]
}

fn ath_claim(subject: &str, month: &str) -> String {
    format!("{subject}'s TVL reached its all-time high in {month}.")
}

fn extract_ath(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let correct = ath_month(ctx)?;
    let ath = ctx.derived.ath.as_ref()?;
    let pool = month_pool(ctx, correct)?;
    let count = format.distractor_count().max(1);
    let wrong = month_distractors(correct, pool, count, seed)?;
    let facts = ExplainFacts::new()
        .with("ath_month", FactValue::Month(correct))
        .with("ath_tvl", FactValue::Usd(ath.value))
        .with("tvl", FactValue::Usd(ctx.topic.tvl));
    timing_pick(
        &ctx.topic.name,
        format,
        seed,
        correct.display(),
        wrong.into_iter().map(YearMonth::display).collect(),
        ath_claim,
    )
    .map(|pick| pick.with_facts(facts))
}

fn ath_prompt(pick: &ChoicePick) -> String {
    if pick.format == QuestionFormat::TrueFalse {
        statement_prompt(pick)
    } else {
        format!("In which month did {}'s TVL hit its all-time high?", pick.subject)
    }
}

// Listing quarter ----------------------------------------------------------

fn listing_quarter(ctx: &Context) -> Option<YearQuarter> {
    ctx.topic.listed_at.and_then(YearQuarter::from_timestamp)
}

fn quarter_pool(ctx: &Context, correct: YearQuarter) -> Option<TimingPool<YearQuarter>> {
    let current = YearQuarter::from_month(YearMonth::from_date(ctx.date));
    let width = ctx.distractors.quarter_window;
    if correct.offset(i64::from(width))? <= current {
        return Some(TimingPool::Window(width));
    }
    Some(TimingPool::Range {
        first: correct.offset(-2 * i64::from(width))?,
        last: current,
        cap: ctx.distractors.history_cap,
    })
}

fn listing_prereqs(ctx: &Context) -> Prereq {
    require(listing_quarter(ctx), "topic.listed_at").map(|_| ())
}

fn listing_formats(ctx: &Context) -> FormatList {
    // A 2-quarter window only yields four distinct wrong quarters.
    let mut formats = timing_formats(ctx);
    if ctx.distractors.quarter_window < 3 {
        formats.retain(|format| *format != QuestionFormat::Choice6);
    }
    formats
}

fn listing_claim(subject: &str, quarter: &str) -> String {
    format!("{subject} was first listed in {quarter}.")
}

fn extract_listing(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let correct = listing_quarter(ctx)?;
    let pool = quarter_pool(ctx, correct)?;
    let wrong = quarter_distractors(correct, pool, format.distractor_count().max(1), seed)?;
    let facts = ExplainFacts::new().with("listed", FactValue::Quarter(correct));
    timing_pick(
        &ctx.topic.name,
        format,
        seed,
        correct.display(),
        wrong.into_iter().map(YearQuarter::display).collect(),
        listing_claim,
    )
    .map(|pick| pick.with_facts(facts))
}

fn listing_prompt(pick: &ChoicePick) -> String {
    if pick.format == QuestionFormat::TrueFalse {
        statement_prompt(pick)
    } else {
        format!("In which quarter was {} first listed?", pick.subject)
    }
}

// Drawdown -----------------------------------------------------------------

fn drawdown_prereqs(ctx: &Context) -> Prereq {
    enough_history(ctx)?;
    require(ctx.derived.drawdown, "derived.drawdown").map(|_| ())
}

fn drawdown_formats(ctx: &Context) -> FormatList {
    band_formats(&DRAWDOWN_BANDS, ctx.derived.drawdown)
}

fn drawdown_claim(subject: &str, label: &str) -> String {
    format!("{subject}'s TVL is {}.", lower_first(label))
}

fn extract_drawdown(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let drawdown = ctx.derived.drawdown?;
    let mut facts = ExplainFacts::new().with("drawdown", FactValue::Share(drawdown));
    if let Some(ath) = &ctx.derived.ath {
        facts.push("ath_tvl", FactValue::Usd(ath.value));
    }
    band_pick(&ctx.topic.name, format, seed, &DRAWDOWN_BANDS, drawdown, drawdown_claim)
        .map(|pick| pick.with_facts(facts))
}

fn drawdown_prompt(pick: &ChoicePick) -> String {
    if pick.format == QuestionFormat::TrueFalse {
        statement_prompt(pick)
    } else {
        format!("How far is {}'s TVL from its all-time high?", pick.subject)
    }
}

// Fees band ----------------------------------------------------------------

fn fees_prereqs(ctx: &Context) -> Prereq {
    let fees = require(ctx.derived.fees_24h, "fees.total_24h")?;
    if fees > 0.0 {
        Ok(())
    } else {
        Err(DeclineReason::not_applicable("no fees in the last 24 hours"))
    }
}

fn fees_formats(_ctx: &Context) -> FormatList {
    smallvec![QuestionFormat::Choice4, QuestionFormat::Binary]
}

fn extract_fees(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let fees = ctx.derived.fees_24h?;
    let buckets = bucketed(fees, format.cardinality(), seed)?;
    let facts = ExplainFacts::new().with("fees_24h", FactValue::Usd(fees));
    ChoicePick::listed(
        &ctx.topic.name,
        format,
        buckets.labels(format_usd),
        buckets.answer_index,
    )
    .map(|pick| pick.with_margin(Some(buckets.margin)).with_facts(facts))
}

fn fees_prompt(pick: &ChoicePick) -> String {
    format!(
        "How much did {} generate in fees over the last 24 hours?",
        pick.subject
    )
}

// Volume direction ---------------------------------------------------------

/// 24h volume against the trailing 7-day daily average.
fn volume_pair(ctx: &Context) -> Option<(f64, f64)> {
    let volume = ctx.raw.volume.as_ref()?;
    let day = volume.total_24h.filter(|v| v.is_finite() && *v >= 0.0)?;
    let average = volume.total_7d.filter(|v| v.is_finite() && *v > 0.0)? / 7.0;
    Some((day, average))
}

fn volume_margin(ctx: &Context) -> Option<f64> {
    volume_pair(ctx).and_then(|(day, average)| ab_margin(day, average))
}

fn volume_prereqs(ctx: &Context) -> Prereq {
    require(volume_pair(ctx), "volume.total_24h")?;
    if volume_margin(ctx).is_some_and(|margin| margin >= TIGHT_MARGIN) {
        Ok(())
    } else {
        Err(DeclineReason::not_applicable("24h volume too close to the weekly average"))
    }
}

fn volume_formats(_ctx: &Context) -> FormatList {
    smallvec![QuestionFormat::TrueFalse, QuestionFormat::Binary]
}

fn extract_volume(ctx: &Context, format: QuestionFormat, seed: u64) -> Option<ChoicePick> {
    let (day, average) = volume_pair(ctx)?;
    let above = day > average;
    let facts = ExplainFacts::new()
        .with("volume_24h", FactValue::Usd(day))
        .with("volume_7d_daily_avg", FactValue::Usd(average));
    let subject = ctx.topic.name.as_str();
    let pick = match format {
        QuestionFormat::TrueFalse => {
            let claims_above = coin(seed, "direction");
            let side = if claims_above { "above" } else { "below" };
            let claim = format!(
                "{subject}'s trading volume over the last 24 hours was {side} its 7-day daily average."
            );
            ChoicePick::statement(subject, claim, claims_above == above)
        }
        QuestionFormat::Binary => ChoicePick::listed(
            subject,
            format,
            vec!["Above".to_string(), "Below".to_string()],
            usize::from(!above),
        )?,
        QuestionFormat::Choice4 | QuestionFormat::Choice6 => return None,
    };
    Some(pick.with_margin(volume_margin(ctx)).with_facts(facts))
}

fn volume_prompt(pick: &ChoicePick) -> String {
    if pick.format == QuestionFormat::TrueFalse {
        statement_prompt(pick)
    } else {
        format!(
            "Was {}'s trading volume over the last 24 hours above or below its 7-day daily average?",
            pick.subject
        )
    }
}

pub(crate) fn templates() -> Vec<Box<dyn QuestionTemplate>> {
    vec![
        choice(ChoiceTemplate {
            id: "protocol_trend_30d",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::Trend30d],
            prereqs: trend_prereqs,
            formats: trend_formats,
            extract: extract_trend,
            prompt: trend_prompt,
        }),
        choice(ChoiceTemplate {
            id: "chain_trend_30d",
            subject: SubjectKind::Chain,
            topics: &[SemanticTopic::Trend30d],
            prereqs: trend_prereqs,
            formats: trend_formats,
            extract: extract_trend,
            prompt: trend_prompt,
        }),
        choice(ChoiceTemplate {
            id: "protocol_change_30d",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::Trend30d],
            prereqs: change_prereqs,
            formats: change_formats,
            extract: extract_change,
            prompt: change_prompt,
        }),
        choice(ChoiceTemplate {
            id: "chain_change_30d",
            subject: SubjectKind::Chain,
            topics: &[SemanticTopic::Trend30d],
            prereqs: change_prereqs,
            formats: change_formats,
            extract: extract_change,
            prompt: change_prompt,
        }),
        choice(ChoiceTemplate {
            id: "protocol_ath_month",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::AllTimeHigh],
            prereqs: ath_prereqs,
            formats: timing_formats,
            extract: extract_ath,
            prompt: ath_prompt,
        }),
        choice(ChoiceTemplate {
            id: "chain_ath_month",
            subject: SubjectKind::Chain,
            topics: &[SemanticTopic::AllTimeHigh],
            prereqs: ath_prereqs,
            formats: timing_formats,
            extract: extract_ath,
            prompt: ath_prompt,
        }),
        choice(ChoiceTemplate {
            id: "protocol_listing_quarter",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::Listing],
            prereqs: listing_prereqs,
            formats: listing_formats,
            extract: extract_listing,
            prompt: listing_prompt,
        }),
        choice(ChoiceTemplate {
            id: "protocol_drawdown",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::Drawdown],
            prereqs: drawdown_prereqs,
            formats: drawdown_formats,
            extract: extract_drawdown,
            prompt: drawdown_prompt,
        }),
        choice(ChoiceTemplate {
            id: "protocol_fees_band",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::Fees],
            prereqs: fees_prereqs,
            formats: fees_formats,
            extract: extract_fees,
            prompt: fees_prompt,
        }),
        choice(ChoiceTemplate {
            id: "protocol_volume_direction",
            subject: SubjectKind::Protocol,
            topics: &[SemanticTopic::Volume],
            prereqs: volume_prereqs,
            formats: volume_formats,
            extract: extract_volume,
            prompt: volume_prompt,
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::{chain_context, protocol_context};
    use std::collections::BTreeSet;

    fn template(id: &str) -> Box<dyn QuestionTemplate> {
        templates().into_iter().find(|t| t.id() == id).unwrap()
    }

    #[test]
    fn trend_answers_follow_the_series() {
        let rising = protocol_context(14);
        let falling = chain_context(6);
        assert!(rising.derived.changes.d30.unwrap() > TREND_MIN_MOVE);
        assert!(falling.derived.changes.d30.unwrap() < -TREND_MIN_MOVE);

        let out = template("protocol_trend_30d")
            .instantiate(&rising, QuestionFormat::Binary, 0)
            .unwrap()
            .unwrap();
        assert_eq!(out.draft.correct_choice(), Some("Up"));

        let trend = template("chain_trend_30d");
        for seed in 0..12 {
            let out = trend
                .instantiate(&falling, QuestionFormat::TrueFalse, seed)
                .unwrap()
                .unwrap();
            let claims_up = out.draft.prompt.contains("higher") || out.draft.prompt.contains("grown");
            assert_eq!(out.draft.answer_value, Some(!claims_up));
        }
    }

    #[test]
    fn ath_month_distractors_stay_inside_history() {
        let ctx = chain_context(6);
        let ath = template("chain_ath_month");
        assert!(ath.check_prereqs(&ctx).is_ok());
        for seed in 0..8 {
            let out = ath
                .instantiate(&ctx, QuestionFormat::Choice4, seed)
                .unwrap()
                .unwrap();
            // Falling series peaks on its first day.
            assert_eq!(out.draft.correct_choice(), Some("June 2023"));
            let unique: BTreeSet<&String> = out.draft.choices.iter().collect();
            assert_eq!(unique.len(), 4);
            assert!(out.draft.choices.iter().all(|choice| {
                choice.ends_with("2023") || choice.ends_with("2024")
            }));
        }
    }

    #[test]
    fn listing_quarter_uses_window_around_the_answer() {
        let ctx = protocol_context(14);
        let listing = template("protocol_listing_quarter");
        assert!(!listing.propose_formats(&ctx).contains(&QuestionFormat::Choice6));
        let out = listing
            .instantiate(&ctx, QuestionFormat::Choice4, 3)
            .unwrap()
            .unwrap();
        assert_eq!(out.draft.correct_choice(), Some("Q2 2022"));
    }

    #[test]
    fn volume_direction_compares_against_weekly_average() {
        let ctx = protocol_context(14);
        let volume = template("protocol_volume_direction");
        assert!(volume.check_prereqs(&ctx).is_ok());
        let out = volume
            .instantiate(&ctx, QuestionFormat::Binary, 1)
            .unwrap()
            .unwrap();
        assert_eq!(out.draft.correct_choice(), Some("Above"));

        let chain = chain_context(6);
        assert!(template("protocol_volume_direction").check_prereqs(&chain).is_err());
    }

    #[test]
    fn band_templates_render_every_proposed_format() {
        let ctx = protocol_context(14);
        for id in ["protocol_change_30d", "protocol_drawdown", "protocol_fees_band"] {
            let band = template(id);
            assert!(band.check_prereqs(&ctx).is_ok(), "{id}");
            for format in band.propose_formats(&ctx) {
                let out = band.instantiate(&ctx, format, 9).unwrap().unwrap();
                assert_eq!(out.draft.choices.len(), format.cardinality(), "{id} {format}");
            }
        }
    }
}
