//! QA scenarios run against every (snapshot, date) case.

use anyhow::{Result, ensure};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use trivia_engine::{
    Catalog, EngineConfig, Episode, FactsRenderer, QuestionFormat, QuestionSource, SubjectSnapshot,
    build_episode, matches_target,
};

/// Inputs shared by every check of one case.
pub struct ScenarioCase<'a> {
    pub date: NaiveDate,
    pub snapshot: &'a SubjectSnapshot,
    pub config: &'a EngineConfig,
    pub catalog: &'a Catalog,
}

impl ScenarioCase<'_> {
    pub fn build(&self) -> Result<Episode> {
        Ok(build_episode(
            self.date,
            self.snapshot,
            self.config,
            self.catalog,
            &FactsRenderer,
        )?)
    }

    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.snapshot.topic.slug, self.date)
    }
}

type Check = fn(&ScenarioCase<'_>) -> Result<()>;

#[derive(Clone, Copy)]
pub struct Scenario {
    pub key: &'static str,
    pub description: &'static str,
    check: Check,
}

impl Scenario {
    pub fn run(&self, case: &ScenarioCase<'_>) -> Result<()> {
        (self.check)(case)
    }
}

const SCENARIOS: [Scenario; 5] = [
    Scenario {
        key: "smoke",
        description: "Episode builds and every question carries an explanation",
        check: smoke,
    },
    Scenario {
        key: "determinism",
        description: "Two builds of the same case are byte-identical",
        check: determinism,
    },
    Scenario {
        key: "answer-integrity",
        description: "Choice counts, answer indexes and true/false labels are consistent",
        check: answer_integrity,
    },
    Scenario {
        key: "dedup",
        description: "No semantic topic, prompt or question id repeats",
        check: dedup,
    },
    Scenario {
        key: "difficulty",
        description: "Every slot is filled and template scores match slot targets",
        check: difficulty,
    },
];

#[must_use]
pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    SCENARIOS
        .iter()
        .map(|scenario| (scenario.key, scenario.description))
        .collect()
}

#[must_use]
pub fn get_scenario(key: &str) -> Option<Scenario> {
    SCENARIOS.iter().copied().find(|scenario| scenario.key == key)
}

fn smoke(case: &ScenarioCase<'_>) -> Result<()> {
    let episode = case.build()?;
    ensure!(!episode.questions.is_empty(), "episode has no questions");
    for question in &episode.questions {
        ensure!(
            !question.explanation.trim().is_empty(),
            "{} has an empty explanation",
            question.id
        );
    }
    Ok(())
}

fn determinism(case: &ScenarioCase<'_>) -> Result<()> {
    let first = case.build()?;
    let second = case.build()?;
    ensure!(
        serde_json::to_string(&first)? == serde_json::to_string(&second)?,
        "serialized episodes differ"
    );
    ensure!(
        first.metadata.digest == second.metadata.digest,
        "digests differ: {} vs {}",
        first.metadata.digest,
        second.metadata.digest
    );
    ensure!(first.digest_matches(), "stored digest does not match content");
    Ok(())
}

fn answer_integrity(case: &ScenarioCase<'_>) -> Result<()> {
    for question in case.build()?.questions {
        let draft = &question.draft;
        ensure!(
            draft.choices.len() == draft.format.cardinality(),
            "{}: {} choices for {}",
            question.id,
            draft.choices.len(),
            draft.format
        );
        ensure!(
            draft.answer_index < draft.choices.len(),
            "{}: answer index {} out of range",
            question.id,
            draft.answer_index
        );
        if draft.format == QuestionFormat::TrueFalse {
            ensure!(
                draft.choices == QuestionFormat::true_false_choices(),
                "{}: non-canonical true/false labels",
                question.id
            );
            ensure!(
                draft.answer_value == Some(draft.answer_index == 0),
                "{}: true/false value disagrees with the answer index",
                question.id
            );
        }
    }
    Ok(())
}

fn dedup(case: &ScenarioCase<'_>) -> Result<()> {
    let episode = case.build()?;
    let mut ids = BTreeSet::new();
    let mut prompts = BTreeSet::new();
    let mut topics = BTreeSet::new();
    for question in &episode.questions {
        ensure!(ids.insert(question.id.as_str()), "duplicate id {}", question.id);
        ensure!(
            prompts.insert(question.draft.prompt.as_str()),
            "{} repeats a prompt",
            question.id
        );
        for topic in &question.topics {
            ensure!(topics.insert(*topic), "{} repeats topic {topic}", question.id);
        }
    }
    Ok(())
}

fn difficulty(case: &ScenarioCase<'_>) -> Result<()> {
    let episode = case.build()?;
    if let Some(unfilled) = episode.report.unfilled.first() {
        anyhow::bail!(
            "slot {} unfilled: {}",
            unfilled.slot,
            unfilled.reasons.join("; ")
        );
    }
    for question in &episode.questions {
        if question.source == QuestionSource::Template {
            ensure!(
                matches_target(question.score, question.target, &case.config.difficulty),
                "{} scored {:.3} for a {} slot",
                question.id,
                question.score,
                question.target
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> SubjectSnapshot {
        SubjectSnapshot::from_json(include_str!("../../../assets/snapshots/aave.json")).unwrap()
    }

    #[test]
    fn catalog_lists_every_scenario() {
        let keys: Vec<&str> = list_scenarios().into_iter().map(|(key, _)| key).collect();
        assert_eq!(
            keys,
            ["smoke", "determinism", "answer-integrity", "dedup", "difficulty"]
        );
        assert!(get_scenario("dedup").is_some());
        assert!(get_scenario("unknown").is_none());
    }

    #[test]
    fn structural_scenarios_pass_on_the_fixture() {
        let snapshot = snapshot();
        let config = EngineConfig::default();
        let catalog = Catalog::standard().unwrap();
        let case = ScenarioCase {
            date: NaiveDate::from_ymd_opt(2024, 7, 24).unwrap(),
            snapshot: &snapshot,
            config: &config,
            catalog: &catalog,
        };
        assert_eq!(case.label(), "aave 2024-07-24");
        for key in ["smoke", "determinism", "answer-integrity", "dedup"] {
            let scenario = get_scenario(key).unwrap();
            scenario.run(&case).unwrap();
        }
    }

    #[test]
    fn broken_snapshots_fail_smoke() {
        let mut snapshot = snapshot();
        snapshot.raw.tvl_series.reverse();
        let config = EngineConfig::default();
        let catalog = Catalog::standard().unwrap();
        let case = ScenarioCase {
            date: NaiveDate::from_ymd_opt(2024, 7, 24).unwrap(),
            snapshot: &snapshot,
            config: &config,
            catalog: &catalog,
        };
        let err = get_scenario("smoke").unwrap().run(&case).unwrap_err();
        assert!(err.to_string().contains("time-ascending"));
    }
}
