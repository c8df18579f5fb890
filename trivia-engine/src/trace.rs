//! Structured diagnostics explaining why each slot chose what it chose.

use serde::{Deserialize, Serialize};

use crate::question::{DifficultyTarget, QuestionFormat, QuestionSource};

/// What happened to one candidate (or slot) at one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    WrongSubject,
    PrereqNotMet,
    FormatsDisallowed,
    TopicOverlap,
    ExtractionFailed,
    DuplicatePrompt,
    OffTarget,
    /// Every template for the slot declined; fallbacks come next.
    TemplatesExhausted,
    Accepted,
}

impl NoteKind {
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::WrongSubject => "wrong_subject",
            Self::PrereqNotMet => "prereq_not_met",
            Self::FormatsDisallowed => "formats_disallowed",
            Self::TopicOverlap => "topic_overlap",
            Self::ExtractionFailed => "extraction_failed",
            Self::DuplicatePrompt => "duplicate_prompt",
            Self::OffTarget => "off_target",
            Self::TemplatesExhausted => "templates_exhausted",
            Self::Accepted => "accepted",
        }
    }

    /// Whether the note records a decline rather than progress.
    #[must_use]
    pub const fn is_decline(self) -> bool {
        !matches!(self, Self::Accepted | Self::TemplatesExhausted)
    }
}

/// One diagnostic line recorded during assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticNote {
    pub slot: String,
    /// Candidate id; empty for slot-level notes.
    pub candidate: String,
    pub kind: NoteKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<QuestionFormat>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl DiagnosticNote {
    #[must_use]
    pub fn new(slot: &str, candidate: &str, kind: NoteKind, detail: impl Into<String>) -> Self {
        Self {
            slot: slot.to_string(),
            candidate: candidate.to_string(),
            kind,
            format: None,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub const fn with_format(mut self, format: QuestionFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// One-line rendering for logs and reports.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = format!("{}:{}", self.slot, self.kind.key());
        if !self.candidate.is_empty() {
            line.push(' ');
            line.push_str(&self.candidate);
        }
        if let Some(format) = self.format {
            line.push('/');
            line.push_str(format.key());
        }
        if !self.detail.is_empty() {
            line.push_str(" (");
            line.push_str(&self.detail);
            line.push(')');
        }
        line
    }
}

/// A slot no template or fallback could fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotExhausted {
    pub slot: String,
    pub target: DifficultyTarget,
    /// Summaries of every decline recorded for the slot.
    pub reasons: Vec<String>,
}

/// How one slot ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotOutcome {
    pub slot: String,
    pub target: DifficultyTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<QuestionSource>,
    pub candidates_tried: usize,
}

/// Diagnostics for a whole build.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BuildReport {
    pub notes: Vec<DiagnosticNote>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unfilled: Vec<SlotExhausted>,
}

impl BuildReport {
    pub fn record(&mut self, note: DiagnosticNote) {
        self.notes.push(note);
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.unfilled.is_empty()
    }

    /// Notes recorded for one slot, in order.
    pub fn notes_for<'a>(&'a self, slot: &'a str) -> impl Iterator<Item = &'a DiagnosticNote> + 'a {
        self.notes.iter().filter(move |note| note.slot == slot)
    }

    /// Decline summaries for one slot.
    #[must_use]
    pub fn decline_summaries(&self, slot: &str) -> Vec<String> {
        self.notes_for(slot)
            .filter(|note| note.kind.is_decline())
            .map(DiagnosticNote::summary)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summaries_are_compact() {
        let note = DiagnosticNote::new("core", "peer_duel", NoteKind::OffTarget, "score 0.31")
            .with_format(QuestionFormat::Choice4);
        assert_eq!(note.summary(), "core:off_target peer_duel/mc4 (score 0.31)");
        let slot_note = DiagnosticNote::new("closer", "", NoteKind::TemplatesExhausted, "");
        assert_eq!(slot_note.summary(), "closer:templates_exhausted");
    }

    #[test]
    fn report_filters_by_slot() {
        let mut report = BuildReport::default();
        report.record(DiagnosticNote::new("opener", "a", NoteKind::PrereqNotMet, "x"));
        report.record(DiagnosticNote::new("opener", "b", NoteKind::Accepted, ""));
        report.record(DiagnosticNote::new("core", "c", NoteKind::ExtractionFailed, ""));
        assert_eq!(report.notes_for("opener").count(), 2);
        assert_eq!(report.decline_summaries("opener").len(), 1);
        assert!(!report.is_degraded());
    }
}
