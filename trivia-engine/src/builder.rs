//! Slot-by-slot episode assembly.
//!
//! For each slot the builder walks the slot's candidate list in order and
//! accepts the first candidate whose draft fits the slot: allowed format,
//! no repeated semantic topic, no repeated prompt, and a difficulty score
//! matching the target. When every candidate declines it tries the slot's
//! fallback tier, and only then leaves the slot unfilled. Every decline is
//! recorded in the [`BuildReport`].

use std::collections::BTreeSet;

use crate::config::EngineConfig;
use crate::context::Context;
use crate::difficulty::{classify, matches_target, score};
use crate::error::ConfigurationError;
use crate::explain::ExplanationRenderer;
use crate::question::{Question, QuestionSource};
use crate::seed::derive_seed;
use crate::slots::SlotSpec;
use crate::template::{DeclineReason, QuestionTemplate};
use crate::templates::Catalog;
use crate::topics::{SemanticTopicSet, join_topics};
use crate::trace::{BuildReport, DiagnosticNote, NoteKind, SlotExhausted, SlotOutcome};

/// Questions, per-slot outcomes and diagnostics of one build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutput {
    pub questions: Vec<Question>,
    pub outcomes: Vec<SlotOutcome>,
    pub report: BuildReport,
}

/// State owned by a single build.
#[derive(Default)]
struct BuildState {
    topics: SemanticTopicSet,
    prompts: BTreeSet<String>,
    report: BuildReport,
}

impl BuildState {
    fn decline(&mut self, note: DiagnosticNote) {
        log::debug!("{}", note.summary());
        self.report.record(note);
    }
}

/// Runs the slot loop against a catalog and configuration.
pub struct EpisodeBuilder<'a> {
    catalog: &'a Catalog,
    config: &'a EngineConfig,
    renderer: &'a dyn ExplanationRenderer,
}

impl<'a> EpisodeBuilder<'a> {
    #[must_use]
    pub fn new(
        catalog: &'a Catalog,
        config: &'a EngineConfig,
        renderer: &'a dyn ExplanationRenderer,
    ) -> Self {
        Self {
            catalog,
            config,
            renderer,
        }
    }

    /// Every slot must list only ids the catalog knows.
    fn check_slot_table(&self, ctx: &Context) -> Result<(), ConfigurationError> {
        for slot in &self.config.slots {
            for id in slot.candidates(ctx.subject) {
                if self.catalog.template(id).is_none() {
                    return Err(ConfigurationError::UnknownCandidate {
                        slot: slot.label.clone(),
                        id: id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Fill every slot for `ctx`.
    ///
    /// Data-driven declines never fail the build; an unfillable slot is
    /// reported in [`BuildReport::unfilled`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] when the slot table names an unknown
    /// template or a candidate renders a draft that breaks its contract.
    pub fn build(&self, ctx: &Context, episode_seed: u64) -> Result<BuildOutput, ConfigurationError> {
        self.check_slot_table(ctx)?;
        let mut state = BuildState::default();
        let mut questions = Vec::with_capacity(self.config.slots.len());
        let mut outcomes = Vec::with_capacity(self.config.slots.len());

        for slot in &self.config.slots {
            let (question, tried) = self.fill_slot(slot, ctx, episode_seed, &mut state)?;
            let outcome = SlotOutcome {
                slot: slot.label.clone(),
                target: slot.target,
                filled_by: question.as_ref().map(|q| q.draft.template_id.clone()),
                source: question.as_ref().map(|q| q.source),
                candidates_tried: tried,
            };
            if let Some(question) = question {
                state.topics.merge(&question.topics);
                state.prompts.insert(question.draft.prompt.clone());
                questions.push(question);
            } else {
                let reasons = state.report.decline_summaries(&slot.label);
                log::warn!(
                    "slot {} ({}) left unfilled after {tried} candidates",
                    slot.label,
                    slot.target
                );
                state.report.unfilled.push(SlotExhausted {
                    slot: slot.label.clone(),
                    target: slot.target,
                    reasons,
                });
            }
            outcomes.push(outcome);
        }

        Ok(BuildOutput {
            questions,
            outcomes,
            report: state.report,
        })
    }

    fn fill_slot(
        &self,
        slot: &SlotSpec,
        ctx: &Context,
        episode_seed: u64,
        state: &mut BuildState,
    ) -> Result<(Option<Question>, usize), ConfigurationError> {
        let mut tried = 0;
        for id in slot.candidates(ctx.subject) {
            let Some(template) = self.catalog.template(id) else {
                continue;
            };
            tried += 1;
            if let Some(question) =
                self.try_candidate(template, QuestionSource::Template, slot, ctx, episode_seed, state)?
            {
                return Ok((Some(question), tried));
            }
        }

        state.report.record(DiagnosticNote::new(
            &slot.label,
            "",
            NoteKind::TemplatesExhausted,
            format!("trying {} fallbacks", slot.fallback_tier()),
        ));
        for fallback in self.catalog.fallbacks_for(slot.fallback_tier(), ctx.subject) {
            tried += 1;
            if let Some(question) = self.try_candidate(
                fallback.template(),
                QuestionSource::Fallback,
                slot,
                ctx,
                episode_seed,
                state,
            )? {
                return Ok((Some(question), tried));
            }
        }
        Ok((None, tried))
    }

    fn try_candidate(
        &self,
        template: &dyn QuestionTemplate,
        source: QuestionSource,
        slot: &SlotSpec,
        ctx: &Context,
        episode_seed: u64,
        state: &mut BuildState,
    ) -> Result<Option<Question>, ConfigurationError> {
        let id = template.id();
        let label = slot.label.as_str();

        if let Err(reason) = template.check_prereqs(ctx) {
            let kind = match reason {
                DeclineReason::WrongSubject { .. } => NoteKind::WrongSubject,
                _ => NoteKind::PrereqNotMet,
            };
            state.decline(DiagnosticNote::new(label, id, kind, reason.to_string()));
            return Ok(None);
        }

        let reusable = template.is_reusable();
        if !reusable {
            let overlap = state.topics.overlap(template.declared_topics());
            if !overlap.is_empty() {
                state.decline(DiagnosticNote::new(
                    label,
                    id,
                    NoteKind::TopicOverlap,
                    join_topics(&overlap),
                ));
                return Ok(None);
            }
        }

        let proposed = template.propose_formats(ctx);
        let formats: Vec<_> = slot
            .formats
            .iter()
            .copied()
            .filter(|format| proposed.contains(format))
            .collect();
        if formats.is_empty() {
            let offered: Vec<&str> = proposed.iter().map(|format| format.key()).collect();
            state.decline(DiagnosticNote::new(
                label,
                id,
                NoteKind::FormatsDisallowed,
                format!("offered [{}]", offered.join(", ")),
            ));
            return Ok(None);
        }

        for format in formats {
            let seed = derive_seed(episode_seed, &[label, id, format.key()]);
            let Some(instantiated) = template.instantiate(ctx, format, seed)? else {
                state.decline(
                    DiagnosticNote::new(label, id, NoteKind::ExtractionFailed, "")
                        .with_format(format),
                );
                continue;
            };
            let draft = instantiated.draft;
            let topics = instantiated.topics;

            if !reusable {
                let overlap = state.topics.overlap(&topics);
                if !overlap.is_empty() {
                    state.decline(
                        DiagnosticNote::new(label, id, NoteKind::TopicOverlap, join_topics(&overlap))
                            .with_format(format),
                    );
                    continue;
                }
            }
            if state.prompts.contains(&draft.prompt) {
                state.decline(
                    DiagnosticNote::new(label, id, NoteKind::DuplicatePrompt, "")
                        .with_format(format),
                );
                continue;
            }

            let difficulty = &self.config.difficulty;
            let value = score(&draft.signals, difficulty);
            if source == QuestionSource::Template && !matches_target(value, slot.target, difficulty) {
                state.decline(
                    DiagnosticNote::new(
                        label,
                        id,
                        NoteKind::OffTarget,
                        format!(
                            "score {value:.3} reads {}, slot wants {}",
                            classify(value, difficulty),
                            slot.target
                        ),
                    )
                    .with_format(format),
                );
                continue;
            }

            state.report.record(
                DiagnosticNote::new(label, id, NoteKind::Accepted, format!("score {value:.3}"))
                    .with_format(format),
            );
            log::info!("slot {label} filled by {id}/{format} (score {value:.3})");
            let explanation = self.renderer.render(&draft);
            return Ok(Some(Question {
                id: format!("{label}-{id}"),
                slot: label.to_string(),
                target: slot.target,
                score: value,
                source,
                topics,
                draft,
                explanation,
            }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistractorConfig;
    use crate::context::tests::{chain_context, protocol_context, protocol_snapshot};
    use crate::snapshot::SubjectKind;
    use chrono::NaiveDate;
    use crate::explain::FactsRenderer;
    use crate::question::{DifficultyTarget, QuestionFormat};
    use crate::slots::default_slot_table;

    fn build(ctx: &Context, config: &EngineConfig) -> BuildOutput {
        let catalog = Catalog::standard().unwrap();
        EpisodeBuilder::new(&catalog, config, &FactsRenderer)
            .build(ctx, 42)
            .unwrap()
    }

    #[test]
    fn topics_never_repeat_within_an_episode() {
        for ctx in [protocol_context(14), protocol_context(3), chain_context(6)] {
            let out = build(&ctx, &EngineConfig::default());
            let mut seen = BTreeSet::new();
            for question in &out.questions {
                for topic in &question.topics {
                    assert!(seen.insert(*topic), "{} repeats {topic}", question.id);
                }
            }
            let prompts: BTreeSet<&String> = out.questions.iter().map(|q| &q.draft.prompt).collect();
            assert_eq!(prompts.len(), out.questions.len());
        }
    }

    #[test]
    fn accepted_templates_match_their_slot() {
        let config = EngineConfig::default();
        let out = build(&protocol_context(14), &config);
        assert_eq!(out.outcomes.len(), config.slots.len());
        for (question, slot) in out.questions.iter().zip(&config.slots) {
            assert!(slot.allows(question.draft.format), "{}", question.id);
            if question.source == QuestionSource::Template {
                assert!(matches_target(question.score, slot.target, &config.difficulty));
            }
        }
    }

    #[test]
    fn builds_are_deterministic() {
        let ctx = chain_context(6);
        let config = EngineConfig::default();
        assert_eq!(build(&ctx, &config), build(&ctx, &config));
    }

    #[test]
    fn unknown_slot_candidates_are_configuration_errors() {
        let mut config = EngineConfig::default();
        config.slots[2].protocol.push("no_such_template".to_string());
        let catalog = Catalog::standard().unwrap();
        let err = EpisodeBuilder::new(&catalog, &config, &FactsRenderer)
            .build(&protocol_context(14), 1)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownCandidate { .. }));
    }

    /// A one-slot table whose only candidate needs volume data.
    fn lone_slot(index: usize, formats: Vec<QuestionFormat>) -> EngineConfig {
        let mut slot = default_slot_table().swap_remove(index);
        slot.protocol = vec!["protocol_volume_direction".to_string()];
        slot.formats = formats;
        EngineConfig {
            slots: vec![slot],
            ..EngineConfig::default()
        }
    }

    #[test]
    fn exhausted_hard_slot_falls_back_to_medium_tier() {
        let config = lone_slot(4, default_slot_table()[4].formats.clone());
        let mut ctx = protocol_context(14);
        ctx.raw.volume = None;
        let out = build(&ctx, &config);
        let closer = &out.outcomes[0];
        assert_eq!(closer.source, Some(QuestionSource::Fallback));
        let catalog = Catalog::standard().unwrap();
        let medium: BTreeSet<&str> = catalog
            .fallbacks_for(DifficultyTarget::Medium, SubjectKind::Protocol)
            .map(|fallback| fallback.id)
            .collect();
        let easy: BTreeSet<&str> = catalog
            .fallbacks_for(DifficultyTarget::Easy, SubjectKind::Protocol)
            .map(|fallback| fallback.id)
            .collect();
        let question = &out.questions[0];
        assert!(medium.contains(question.draft.template_id.as_str()));
        assert_eq!(question.target, DifficultyTarget::Hard);
        assert_eq!(question.id, format!("closer-{}", question.draft.template_id));

        let notes: Vec<&DiagnosticNote> = out.report.notes_for("closer").collect();
        assert_eq!(notes[0].kind, NoteKind::PrereqNotMet);
        assert_eq!(notes[1].kind, NoteKind::TemplatesExhausted);
        assert!(notes[2..].iter().all(|note| medium.contains(note.candidate.as_str())));
        assert!(notes.iter().all(|note| !easy.contains(note.candidate.as_str())));
        assert!(!out.report.is_degraded());
    }

    #[test]
    fn same_name_peer_never_aborts_a_build() {
        let mut snapshot = protocol_snapshot(14);
        let mut twin = snapshot.raw.protocols[13].clone();
        twin.slug = "proto14-v2".to_string();
        twin.rank = Some(15);
        snapshot.raw.protocols.push(twin);
        let date = NaiveDate::from_ymd_opt(2024, 7, 24).unwrap();
        let ctx = Context::build(date, &snapshot, DistractorConfig::default()).unwrap();
        assert!(ctx.derived.nearby_peers.iter().all(|peer| peer.label != "PROTO14"));

        let catalog = Catalog::standard().unwrap();
        let config = EngineConfig::default();
        for seed in 0..64 {
            let out = EpisodeBuilder::new(&catalog, &config, &FactsRenderer)
                .build(&ctx, seed)
                .unwrap();
            for question in &out.questions {
                let labels: BTreeSet<&String> = question.draft.choices.iter().collect();
                assert_eq!(labels.len(), question.draft.choices.len(), "{}", question.id);
            }
        }
    }

    #[test]
    fn unfillable_slot_is_reported_not_fatal() {
        // Easy fallbacks only render true/false and binary.
        let config = lone_slot(0, vec![QuestionFormat::Choice6]);
        let mut ctx = protocol_context(14);
        ctx.raw.volume = None;
        let out = build(&ctx, &config);
        assert!(out.questions.is_empty());
        assert!(out.report.is_degraded());
        let unfilled = &out.report.unfilled[0];
        assert_eq!(unfilled.slot, "opener");
        assert!(unfilled.reasons.iter().any(|r| r.contains("prereq_not_met")));
        assert!(unfilled.reasons.iter().any(|r| r.contains("formats_disallowed")));
        assert!(out.outcomes[0].filled_by.is_none());
        assert!(out.outcomes[0].candidates_tried > 1);
    }
}
