//! Error taxonomy for the engine.
//!
//! Data-dependent declines (a prerequisite not met, an extraction that came
//! back empty, an exhausted slot) are ordinary values recorded in the build
//! report. Only programming defects and collaborator contract violations
//! surface here.

use thiserror::Error;

use crate::config::EngineConfigError;
use crate::question::QuestionFormat;
use crate::snapshot::SnapshotError;

/// A candidate or catalog violated its own output contract.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("{template}: empty prompt")]
    EmptyPrompt { template: String },
    #[error("{template}: format {format} expects {expected} choices, got {actual}")]
    ChoiceCardinality {
        template: String,
        format: QuestionFormat,
        expected: usize,
        actual: usize,
    },
    #[error("{template}: answer index {index} out of range for {len} choices")]
    AnswerIndexOutOfRange {
        template: String,
        index: usize,
        len: usize,
    },
    #[error("{template}: duplicate or blank choice label '{label}'")]
    DuplicateChoice { template: String, label: String },
    #[error("{template}: true/false choices must be the canonical labels")]
    TrueFalseLabels { template: String },
    #[error("{template}: true/false value {value:?} disagrees with answer index {index}")]
    TrueFalseValue {
        template: String,
        value: Option<bool>,
        index: usize,
    },
    #[error("{template}: answer value is only valid for true/false questions")]
    UnexpectedAnswerValue { template: String },
    #[error("{template}: proposed format {format} it cannot render")]
    UnsupportedFormat {
        template: String,
        format: QuestionFormat,
    },
    #[error("duplicate candidate id '{0}' in catalog")]
    DuplicateCandidate(String),
    #[error("slot '{slot}' references unknown template '{id}'")]
    UnknownCandidate { slot: String, id: String },
}

/// Failure of a whole build or of a collaborator around it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("snapshot rejected: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("invalid engine configuration: {0}")]
    Config(#[from] EngineConfigError),
    #[error("configuration defect: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("snapshot source failed: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("episode store failed: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("requested {requested} but the source returned {received}")]
    SubjectMismatch { requested: String, received: String },
    #[error("episode could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_template() {
        let err = ConfigurationError::ChoiceCardinality {
            template: String::from("peer_duel"),
            format: QuestionFormat::Choice4,
            expected: 4,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "peer_duel: format mc4 expects 4 choices, got 3"
        );
        let wrapped = EngineError::from(err);
        assert!(wrapped.to_string().starts_with("configuration defect"));
    }
}
