//! Upstream snapshot records consumed by the engine.
//!
//! These mirror what the external fetch layer hands over: the subject itself,
//! its history, and the peer lists the templates draw distractors from. Every
//! optional field is optional on purpose; absent data fails a template's
//! prerequisites rather than the build.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of subject an episode is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Protocol,
    Chain,
}

impl SubjectKind {
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Chain => "chain",
        }
    }

    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        if label.eq_ignore_ascii_case("protocol") {
            Some(Self::Protocol)
        } else if label.eq_ignore_ascii_case("chain") {
            Some(Self::Chain)
        } else {
            None
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Single observation in a time-ascending series. `time` is unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    pub time: i64,
    pub value: f64,
}

impl TimePoint {
    #[must_use]
    pub const fn new(time: i64, value: f64) -> Self {
        Self { time, value }
    }
}

/// The subject of the episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub slug: String,
    pub name: String,
    pub kind: SubjectKind,
    /// Protocol category (lending, dexes, ...). Absent for chains.
    #[serde(default)]
    pub category: Option<String>,
    /// Rank by TVL, 1-based.
    pub rank: u32,
    pub tvl: f64,
    /// Chains a protocol is deployed on.
    #[serde(default)]
    pub chains: Vec<String>,
    /// Number of protocols deployed on a chain.
    #[serde(default)]
    pub protocol_count: Option<u32>,
    /// Governance or native token symbol.
    #[serde(default)]
    pub symbol: Option<String>,
    /// Listing timestamp (unix seconds) on the upstream tracker.
    #[serde(default)]
    pub listed_at: Option<i64>,
}

/// One protocol in a ranking or peer list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolSummary {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub tvl: f64,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default)]
    pub change_7d: Option<f64>,
    #[serde(default)]
    pub fees_24h: Option<f64>,
}

/// One chain in a ranking list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSummary {
    pub slug: String,
    pub name: String,
    pub tvl: f64,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub protocol_count: Option<u32>,
    #[serde(default)]
    pub token_symbol: Option<String>,
    #[serde(default)]
    pub fees_24h: Option<f64>,
}

/// TVL a protocol holds on one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainShare {
    pub chain: String,
    pub tvl: f64,
}

/// Aggregate TVL for one protocol category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAggregate {
    pub name: String,
    pub tvl: f64,
    #[serde(default)]
    pub protocol_count: u32,
}

/// Fee, revenue or volume overview for the subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowOverview {
    #[serde(default)]
    pub total_24h: Option<f64>,
    #[serde(default)]
    pub total_7d: Option<f64>,
    #[serde(default)]
    pub total_30d: Option<f64>,
    #[serde(default)]
    pub series: Vec<TimePoint>,
}

/// Raw entity bag fetched once per build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RawEntities {
    /// Subject TVL history.
    #[serde(default)]
    pub tvl_series: Vec<TimePoint>,
    /// Protocol ranking (global list for protocols, the wider market for chains).
    #[serde(default)]
    pub protocols: Vec<ProtocolSummary>,
    /// Chain ranking.
    #[serde(default)]
    pub chains: Vec<ChainSummary>,
    /// Protocol TVL split by chain (protocol subjects only).
    #[serde(default)]
    pub chain_tvls: Vec<ChainShare>,
    /// Protocols deployed on the chain with their on-chain TVL (chain subjects only).
    #[serde(default)]
    pub chain_protocols: Vec<ProtocolSummary>,
    #[serde(default)]
    pub categories: Vec<CategoryAggregate>,
    #[serde(default)]
    pub fees: Option<FlowOverview>,
    #[serde(default)]
    pub revenue: Option<FlowOverview>,
    #[serde(default)]
    pub volume: Option<FlowOverview>,
}

/// Everything the upstream collaborator hands over for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSnapshot {
    pub topic: Topic,
    #[serde(default)]
    pub raw: RawEntities,
}

impl SubjectSnapshot {
    /// Load a snapshot from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into a snapshot.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Verify collaborator contracts the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns an error when a series is not time-ascending or a required
    /// value is not finite.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.topic.slug.trim().is_empty() {
            return Err(SnapshotError::MissingSlug);
        }
        if !self.topic.tvl.is_finite() {
            return Err(SnapshotError::NonFinite {
                field: "topic.tvl",
            });
        }
        check_ascending("raw.tvl_series", &self.raw.tvl_series)?;
        for (field, flow) in [
            ("raw.fees.series", self.raw.fees.as_ref()),
            ("raw.revenue.series", self.raw.revenue.as_ref()),
            ("raw.volume.series", self.raw.volume.as_ref()),
        ] {
            if let Some(flow) = flow {
                check_ascending(field, &flow.series)?;
            }
        }
        Ok(())
    }
}

fn check_ascending(field: &'static str, series: &[TimePoint]) -> Result<(), SnapshotError> {
    for (idx, pair) in series.windows(2).enumerate() {
        if pair[1].time < pair[0].time {
            return Err(SnapshotError::UnsortedSeries {
                field,
                index: idx + 1,
            });
        }
    }
    if series.iter().any(|point| !point.value.is_finite()) {
        return Err(SnapshotError::NonFinite { field });
    }
    Ok(())
}

/// Collaborator contract violations detected while accepting a snapshot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("topic slug is empty")]
    MissingSlug,
    #[error("{field} is not time-ascending at index {index}")]
    UnsortedSeries { field: &'static str, index: usize },
    #[error("{field} contains a non-finite value")]
    NonFinite { field: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_parses_with_optional_fields_missing() {
        let json = r#"{
            "topic": {
                "slug": "aave",
                "name": "Aave",
                "kind": "protocol",
                "category": "Lending",
                "rank": 2,
                "tvl": 21000000000.0
            },
            "raw": {
                "tvl_series": [
                    {"time": 1700000000, "value": 10.0},
                    {"time": 1700086400, "value": 11.0}
                ]
            }
        }"#;
        let snapshot = SubjectSnapshot::from_json(json).unwrap();
        assert_eq!(snapshot.topic.kind, SubjectKind::Protocol);
        assert!(snapshot.raw.fees.is_none());
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn unsorted_series_is_rejected() {
        let snapshot = SubjectSnapshot {
            topic: Topic {
                slug: "x".into(),
                name: "X".into(),
                kind: SubjectKind::Chain,
                category: None,
                rank: 1,
                tvl: 1.0,
                chains: Vec::new(),
                protocol_count: None,
                symbol: None,
                listed_at: None,
            },
            raw: RawEntities {
                tvl_series: vec![TimePoint::new(10, 1.0), TimePoint::new(5, 1.0)],
                ..RawEntities::default()
            },
        };
        assert_eq!(
            snapshot.validate(),
            Err(SnapshotError::UnsortedSeries {
                field: "raw.tvl_series",
                index: 1
            })
        );
    }

    #[test]
    fn subject_kind_parses_case_insensitively() {
        assert_eq!(SubjectKind::parse("Chain"), Some(SubjectKind::Chain));
        assert_eq!(SubjectKind::parse("dex"), None);
        assert_eq!(SubjectKind::Protocol.to_string(), "protocol");
    }
}
