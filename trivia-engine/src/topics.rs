//! Semantic topics: the facts a question discloses.
//!
//! Two questions in one episode never disclose the same fact. The set is
//! owned by a single build and only ever grows.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::fmt;

/// Inline list of topics a single question discloses.
pub type TopicList = SmallVec<[SemanticTopic; 4]>;

/// A fact class a question can reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticTopic {
    /// The subject's identity is the answer.
    Identity,
    Category,
    SizeBand,
    TvlRank,
    PeerComparison,
    CategoryLeader,
    ChainFootprint,
    TopChain,
    ChainConcentration,
    #[serde(rename = "trend_30d")]
    Trend30d,
    #[serde(rename = "change_7d")]
    Change7d,
    AllTimeHigh,
    Drawdown,
    Fees,
    FeeEfficiency,
    Listing,
    Volume,
    TopProtocol,
    ProtocolCount,
    DominantCategory,
    ProtocolConcentration,
    NativeToken,
}

impl SemanticTopic {
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Category => "category",
            Self::SizeBand => "size_band",
            Self::TvlRank => "tvl_rank",
            Self::PeerComparison => "peer_comparison",
            Self::CategoryLeader => "category_leader",
            Self::ChainFootprint => "chain_footprint",
            Self::TopChain => "top_chain",
            Self::ChainConcentration => "chain_concentration",
            Self::Trend30d => "trend_30d",
            Self::Change7d => "change_7d",
            Self::AllTimeHigh => "all_time_high",
            Self::Drawdown => "drawdown",
            Self::Fees => "fees",
            Self::FeeEfficiency => "fee_efficiency",
            Self::Listing => "listing",
            Self::Volume => "volume",
            Self::TopProtocol => "top_protocol",
            Self::ProtocolCount => "protocol_count",
            Self::DominantCategory => "dominant_category",
            Self::ProtocolConcentration => "protocol_concentration",
            Self::NativeToken => "native_token",
        }
    }
}

impl fmt::Display for SemanticTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Topics already disclosed within one episode build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticTopicSet {
    used: BTreeSet<SemanticTopic>,
}

impl SemanticTopicSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Topics from `topics` that were already disclosed, in input order.
    #[must_use]
    pub fn overlap(&self, topics: &[SemanticTopic]) -> Vec<SemanticTopic> {
        topics
            .iter()
            .copied()
            .filter(|topic| self.used.contains(topic))
            .collect()
    }

    #[must_use]
    pub fn intersects(&self, topics: &[SemanticTopic]) -> bool {
        topics.iter().any(|topic| self.used.contains(topic))
    }

    pub fn merge(&mut self, topics: &[SemanticTopic]) {
        self.used.extend(topics.iter().copied());
    }

    #[must_use]
    pub fn contains(&self, topic: SemanticTopic) -> bool {
        self.used.contains(&topic)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.used.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = SemanticTopic> + '_ {
        self.used.iter().copied()
    }
}

/// Human-readable topic list for diagnostics.
#[must_use]
pub fn join_topics(topics: &[SemanticTopic]) -> String {
    topics
        .iter()
        .map(|topic| topic.key())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_grows_and_reports_overlap() {
        let mut set = SemanticTopicSet::new();
        assert!(!set.intersects(&[SemanticTopic::SizeBand]));
        set.merge(&[SemanticTopic::SizeBand, SemanticTopic::Identity]);
        set.merge(&[SemanticTopic::SizeBand]);
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.overlap(&[SemanticTopic::Fees, SemanticTopic::Identity]),
            vec![SemanticTopic::Identity]
        );
        assert!(set.contains(SemanticTopic::SizeBand));
    }

    #[test]
    fn topics_serialize_as_snake_case() {
        let json = serde_json::to_string(&SemanticTopic::AllTimeHigh).unwrap();
        assert_eq!(json, "\"all_time_high\"");
        assert_eq!(
            join_topics(&[SemanticTopic::Trend30d, SemanticTopic::Fees]),
            "trend_30d,fees"
        );
    }
}
