//! Explanation text attached to accepted questions.

use crate::display::{format_change, format_count, format_rank, format_share, format_usd};
use crate::question::{FactValue, QuestionDraft, QuestionFormat};

/// Turns a validated draft into the explanation shown after answering.
pub trait ExplanationRenderer: Send + Sync {
    fn render(&self, draft: &QuestionDraft) -> String;
}

/// Default renderer: the answer followed by every fact the draft carries.
#[derive(Debug, Clone, Copy, Default)]
pub struct FactsRenderer;

fn fact_label(key: &str) -> String {
    // `tvl:Aave` style keys name an entity.
    if let Some((metric, entity)) = key.split_once(':') {
        let metric = if metric == "tvl" {
            String::from("TVL")
        } else {
            metric.replace('_', " ")
        };
        return format!("{entity} {metric}");
    }
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Display form of a fact value.
#[must_use]
pub fn fact_value(value: &FactValue) -> String {
    match value {
        FactValue::Usd(amount) => format_usd(*amount),
        FactValue::Change(change) => format_change(*change),
        FactValue::Share(share) => format_share(*share),
        FactValue::Rank(rank) => format_rank(*rank),
        FactValue::Count(count) => format_count(*count),
        FactValue::Text(text) => text.clone(),
        FactValue::Month(month) => month.display(),
        FactValue::Quarter(quarter) => quarter.display(),
        FactValue::Flag(flag) => if *flag { "yes" } else { "no" }.to_string(),
    }
}

impl ExplanationRenderer for FactsRenderer {
    fn render(&self, draft: &QuestionDraft) -> String {
        let mut text = match (draft.format, draft.answer_value) {
            (QuestionFormat::TrueFalse, Some(true)) => String::from("The statement is true."),
            (QuestionFormat::TrueFalse, _) => String::from("The statement is false."),
            _ => format!("The answer is {}.", draft.correct_choice().unwrap_or_default()),
        };
        for fact in draft.facts.iter() {
            text.push(' ');
            text.push_str(&fact_label(&fact.key));
            text.push_str(": ");
            text.push_str(&fact_value(&fact.value));
            text.push('.');
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::{DifficultySignals, ExplainFacts, FamiliarityBucket};

    fn draft(format: QuestionFormat, choices: &[&str], answer: usize) -> QuestionDraft {
        QuestionDraft {
            template_id: "t".into(),
            format,
            prompt: "Q?".into(),
            clues: Vec::new(),
            choices: choices.iter().map(|c| (*c).to_string()).collect(),
            answer_index: answer,
            answer_value: (format == QuestionFormat::TrueFalse).then_some(answer == 0),
            signals: DifficultySignals {
                format,
                familiarity: FamiliarityBucket::Known,
                margin: None,
                volatility: None,
            },
            facts: ExplainFacts::new()
                .with("change_30d", FactValue::Change(0.123))
                .with("tvl:Aave", FactValue::Usd(2.5e10)),
            notes: Vec::new(),
        }
    }

    #[test]
    fn renders_answer_then_facts() {
        let text = FactsRenderer.render(&draft(QuestionFormat::Choice4, &["a", "b", "c", "d"], 2));
        assert_eq!(
            text,
            "The answer is c. Change 30d: +12.3%. Aave TVL: $25B."
        );
    }

    #[test]
    fn true_false_states_the_verdict() {
        let text = FactsRenderer.render(&draft(QuestionFormat::TrueFalse, &["True", "False"], 1));
        assert!(text.starts_with("The statement is false."));
    }
}
