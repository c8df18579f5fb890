use std::collections::BTreeSet;

use chrono::NaiveDate;
use trivia_engine::distractors::{TimingPool, month_distractors};
use trivia_engine::{
    Catalog, Context, DistractorConfig, QuestionDraft, QuestionFormat, QuestionTemplate,
    SubjectSnapshot, YearMonth, derive_seed,
};

fn contexts() -> Vec<Context> {
    let day = NaiveDate::from_ymd_opt(2024, 7, 24).unwrap();
    [
        include_str!("../../assets/snapshots/aave.json"),
        include_str!("../../assets/snapshots/arbitrum.json"),
    ]
    .into_iter()
    .map(|json| {
        let snapshot = SubjectSnapshot::from_json(json).unwrap();
        Context::build(day, &snapshot, DistractorConfig::default()).unwrap()
    })
    .collect()
}

fn check_draft(draft: &QuestionDraft, format: QuestionFormat) {
    let id = &draft.template_id;
    assert_eq!(draft.format, format, "{id}");
    assert!(!draft.prompt.trim().is_empty(), "{id}");
    assert_eq!(draft.choices.len(), format.cardinality(), "{id}");
    assert!(draft.answer_index < draft.choices.len(), "{id}");
    let unique: BTreeSet<&String> = draft.choices.iter().collect();
    assert_eq!(unique.len(), draft.choices.len(), "{id}: {:?}", draft.choices);
    if format == QuestionFormat::TrueFalse {
        assert_eq!(draft.choices, ["True", "False"], "{id}");
        assert_eq!(draft.answer_value, Some(draft.answer_index == 0), "{id}");
    } else {
        assert_eq!(draft.answer_value, None, "{id}");
    }
    if let Some(margin) = draft.signals.margin {
        assert!(margin.is_finite() && margin >= 0.0, "{id}: margin {margin}");
    }
}

/// Runs every proposed format of `template` over a spread of seeds.
/// Returns how many drafts rendered.
fn exercise(template: &dyn QuestionTemplate, ctx: &Context) -> usize {
    if template.check_prereqs(ctx).is_err() {
        return 0;
    }
    let mut rendered = 0;
    for format in template.propose_formats(ctx) {
        for salt in 0..8u8 {
            let seed = derive_seed(0xD1CE, &[template.id(), format.key(), &salt.to_string()]);
            let first = template.instantiate(ctx, format, seed).unwrap();
            let second = template.instantiate(ctx, format, seed).unwrap();
            assert_eq!(first, second, "{} is not deterministic", template.id());
            if let Some(out) = first {
                check_draft(&out.draft, format);
                assert!(!out.topics.is_empty(), "{}", template.id());
                rendered += 1;
            }
        }
    }
    rendered
}

#[test]
fn every_template_renders_valid_drafts() {
    let catalog = Catalog::standard().unwrap();
    for ctx in contexts() {
        let mut productive = 0;
        for template in catalog.templates() {
            if exercise(template, &ctx) > 0 {
                productive += 1;
            }
        }
        assert!(productive >= 6, "{}: only {productive} templates ran", ctx.topic.slug);
    }
}

#[test]
fn every_fallback_renders_valid_drafts() {
    let catalog = Catalog::standard().unwrap();
    for ctx in contexts() {
        let rendered: usize = catalog
            .fallbacks()
            .iter()
            .filter(|fallback| fallback.applies_to(ctx.subject))
            .map(|fallback| exercise(fallback.template(), &ctx))
            .sum();
        assert!(rendered > 0, "{}", ctx.topic.slug);
    }
}

#[test]
fn month_distractors_around_mid_year() {
    let june = YearMonth::parse("2024-06").unwrap();
    let months = month_distractors(june, TimingPool::Window(3), 3, 99).unwrap();
    assert_eq!(months.len(), 3);
    let unique: BTreeSet<YearMonth> = months.iter().copied().collect();
    assert_eq!(unique.len(), 3);
    assert!(!months.contains(&june));
    assert!(
        months
            .iter()
            .all(|month| (month.ordinal() - june.ordinal()).abs() <= 3)
    );
}
