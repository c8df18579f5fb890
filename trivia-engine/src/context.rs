//! Read-only build context handed to every template.
//!
//! Built once per episode from a validated snapshot; derived metrics are
//! computed here so templates and fallbacks never recompute them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::DistractorConfig;
use crate::constants::VOLATILITY_WINDOW_DAYS;
use crate::distractors::EntityCandidate;
use crate::metrics::{
    AllTimeHigh, ab_margin, drawdown_from_high, find_all_time_high, percent_change, share_of,
    top2_margin, volatility_score,
};
use crate::question::FamiliarityBucket;
use crate::snapshot::{RawEntities, SnapshotError, SubjectKind, SubjectSnapshot, Topic};

/// TVL changes over the standard look-back windows.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Changes {
    pub d1: Option<f64>,
    pub d7: Option<f64>,
    pub d30: Option<f64>,
    pub d90: Option<f64>,
    pub d365: Option<f64>,
}

/// A named share of the subject's TVL with its lead over the runner-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leader {
    pub id: String,
    pub label: String,
    pub value: f64,
    /// Fraction of the subject total the leader holds.
    pub share: f64,
    /// `top2_margin` against the runner-up, if there is one.
    pub lead: Option<f64>,
}

/// Metrics derived once from the raw snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub familiarity: FamiliarityBucket,
    pub changes: Changes,
    pub volatility_30d: Option<f64>,
    pub ath: Option<AllTimeHigh>,
    pub drawdown: Option<f64>,
    /// Same-kind peers ordered by rank distance to the subject.
    pub nearby_peers: Vec<EntityCandidate>,
    /// Protocols sharing the subject's category, TVL descending.
    pub category_peers: Vec<EntityCandidate>,
    /// 1-based position of the subject inside its category.
    pub category_rank: Option<u32>,
    /// Chain holding most of a protocol's TVL.
    pub top_chain: Option<Leader>,
    pub chain_count: usize,
    pub fees_24h: Option<f64>,
    pub fees_to_tvl: Option<f64>,
    /// Largest protocol on a chain.
    pub top_protocol: Option<Leader>,
    /// Category with the most TVL on a chain.
    pub dominant_category: Option<Leader>,
}

/// Everything a template may read during one build.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub date: NaiveDate,
    pub subject: SubjectKind,
    pub topic: Topic,
    pub raw: RawEntities,
    pub derived: DerivedMetrics,
    pub distractors: DistractorConfig,
    protocol_pool: Vec<EntityCandidate>,
    chain_pool: Vec<EntityCandidate>,
}

impl Context {
    /// Validate the snapshot and precompute derived metrics.
    ///
    /// # Errors
    ///
    /// Returns the snapshot contract violation, such as a series that is not
    /// time-ascending.
    pub fn build(
        date: NaiveDate,
        snapshot: &SubjectSnapshot,
        distractors: DistractorConfig,
    ) -> Result<Self, SnapshotError> {
        snapshot.validate()?;
        let topic = snapshot.topic.clone();
        let raw = snapshot.raw.clone();
        let protocol_pool = protocol_pool(&raw);
        let chain_pool = chain_pool(&raw);
        let derived = derive(&topic, &raw, &protocol_pool, &chain_pool);
        Ok(Self {
            date,
            subject: topic.kind,
            topic,
            raw,
            derived,
            distractors,
            protocol_pool,
            chain_pool,
        })
    }

    /// Ranked protocols as distractor candidates.
    #[must_use]
    pub fn protocol_pool(&self) -> &[EntityCandidate] {
        &self.protocol_pool
    }

    /// Ranked chains as distractor candidates.
    #[must_use]
    pub fn chain_pool(&self) -> &[EntityCandidate] {
        &self.chain_pool
    }

    /// Pool of the subject's own kind.
    #[must_use]
    pub fn peer_pool(&self) -> &[EntityCandidate] {
        match self.subject {
            SubjectKind::Protocol => &self.protocol_pool,
            SubjectKind::Chain => &self.chain_pool,
        }
    }

    /// The subject as a candidate, for comparisons against peers.
    #[must_use]
    pub fn subject_candidate(&self) -> EntityCandidate {
        EntityCandidate::new(&self.topic.slug, &self.topic.name, self.topic.tvl)
            .with_category(self.topic.category.as_deref())
            .with_rank(Some(self.topic.rank))
    }

    /// Date as `YYYY-MM-DD`, the form used in seeds.
    #[must_use]
    pub fn date_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

fn rank_or_position(rank: Option<u32>, idx: usize) -> Option<u32> {
    rank.or_else(|| u32::try_from(idx + 1).ok())
}

fn protocol_pool(raw: &RawEntities) -> Vec<EntityCandidate> {
    raw.protocols
        .iter()
        .enumerate()
        .filter(|(_, protocol)| protocol.tvl.is_finite() && protocol.tvl > 0.0)
        .map(|(idx, protocol)| {
            EntityCandidate::new(&protocol.slug, &protocol.name, protocol.tvl)
                .with_category(protocol.category.as_deref())
                .with_rank(rank_or_position(protocol.rank, idx))
        })
        .collect()
}

fn chain_pool(raw: &RawEntities) -> Vec<EntityCandidate> {
    raw.chains
        .iter()
        .enumerate()
        .filter(|(_, chain)| chain.tvl.is_finite() && chain.tvl > 0.0)
        .map(|(idx, chain)| {
            EntityCandidate::new(&chain.slug, &chain.name, chain.tvl)
                .with_rank(rank_or_position(chain.rank, idx))
        })
        .collect()
}

fn derive(
    topic: &Topic,
    raw: &RawEntities,
    protocol_pool: &[EntityCandidate],
    chain_pool: &[EntityCandidate],
) -> DerivedMetrics {
    let series = &raw.tvl_series;
    let changes = Changes {
        d1: percent_change(series, 1),
        d7: percent_change(series, 7),
        d30: percent_change(series, 30),
        d90: percent_change(series, 90),
        d365: percent_change(series, 365),
    };
    let own_pool = match topic.kind {
        SubjectKind::Protocol => protocol_pool,
        SubjectKind::Chain => chain_pool,
    };
    let nearby_peers = nearby_peers(topic, own_pool);
    let (category_peers, category_rank) = category_standing(topic, protocol_pool);
    let fees_24h = raw.fees.as_ref().and_then(|fees| fees.total_24h);
    let fees_to_tvl = fees_24h.and_then(|fees| share_of(fees, topic.tvl));
    let chain_count = topic.chains.len().max(raw.chain_tvls.len());

    DerivedMetrics {
        familiarity: FamiliarityBucket::from_rank(topic.rank),
        changes,
        volatility_30d: volatility_score(series, VOLATILITY_WINDOW_DAYS),
        ath: find_all_time_high(series),
        drawdown: drawdown_from_high(series),
        nearby_peers,
        category_peers,
        category_rank,
        top_chain: top_chain(raw),
        chain_count,
        fees_24h,
        fees_to_tvl,
        top_protocol: top_protocol(raw),
        dominant_category: dominant_category(raw),
    }
}

fn nearby_peers(topic: &Topic, pool: &[EntityCandidate]) -> Vec<EntityCandidate> {
    let mut peers: Vec<EntityCandidate> = pool
        .iter()
        .filter(|candidate| {
            candidate.id != topic.slug && candidate.label != topic.name && candidate.rank.is_some()
        })
        .cloned()
        .collect();
    peers.sort_by(|a, b| {
        let da = a.rank.map_or(u32::MAX, |rank| rank.abs_diff(topic.rank));
        let db = b.rank.map_or(u32::MAX, |rank| rank.abs_diff(topic.rank));
        da.cmp(&db).then_with(|| a.rank.cmp(&b.rank)).then_with(|| a.id.cmp(&b.id))
    });
    peers
}

fn category_standing(topic: &Topic, pool: &[EntityCandidate]) -> (Vec<EntityCandidate>, Option<u32>) {
    let Some(category) = topic.category.as_deref() else {
        return (Vec::new(), None);
    };
    let mut peers: Vec<EntityCandidate> = pool
        .iter()
        .filter(|candidate| {
            candidate.id != topic.slug
                && candidate.label != topic.name
                && candidate.category.as_deref() == Some(category)
        })
        .cloned()
        .collect();
    peers.sort_by(|a, b| b.value.total_cmp(&a.value).then_with(|| a.id.cmp(&b.id)));
    let above = peers.iter().filter(|peer| peer.value > topic.tvl).count();
    let rank = u32::try_from(above + 1).ok();
    (peers, rank)
}

fn leader_from(entries: Vec<(String, String, f64)>, total: f64) -> Option<Leader> {
    let mut entries: Vec<_> = entries
        .into_iter()
        .filter(|(_, _, value)| value.is_finite() && *value > 0.0)
        .collect();
    entries.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
    let values: Vec<f64> = entries.iter().map(|(_, _, value)| *value).collect();
    let lead = top2_margin(&values);
    let (id, label, value) = entries.into_iter().next()?;
    Some(Leader {
        share: share_of(value, total)?,
        id,
        label,
        value,
        lead,
    })
}

fn top_chain(raw: &RawEntities) -> Option<Leader> {
    let total: f64 = raw.chain_tvls.iter().map(|share| share.tvl.max(0.0)).sum();
    let entries = raw
        .chain_tvls
        .iter()
        .map(|share| {
            let label = raw
                .chains
                .iter()
                .find(|chain| chain.slug == share.chain || chain.name == share.chain)
                .map_or_else(|| share.chain.clone(), |chain| chain.name.clone());
            (share.chain.clone(), label, share.tvl)
        })
        .collect();
    leader_from(entries, total)
}

fn top_protocol(raw: &RawEntities) -> Option<Leader> {
    let total: f64 = raw.chain_protocols.iter().map(|p| p.tvl.max(0.0)).sum();
    let entries = raw
        .chain_protocols
        .iter()
        .map(|protocol| (protocol.slug.clone(), protocol.name.clone(), protocol.tvl))
        .collect();
    leader_from(entries, total)
}

fn dominant_category(raw: &RawEntities) -> Option<Leader> {
    let mut by_category: BTreeMap<String, f64> = BTreeMap::new();
    for protocol in &raw.chain_protocols {
        if let Some(category) = &protocol.category
            && protocol.tvl.is_finite()
            && protocol.tvl > 0.0
        {
            *by_category.entry(category.clone()).or_insert(0.0) += protocol.tvl;
        }
    }
    let total: f64 = by_category.values().sum();
    let entries = by_category
        .into_iter()
        .map(|(name, tvl)| (name.clone(), name, tvl))
        .collect();
    leader_from(entries, total)
}

/// Relative lead of the subject over its nearest same-kind peer.
#[must_use]
pub fn nearest_peer_margin(ctx: &Context) -> Option<f64> {
    let peer = ctx.derived.nearby_peers.first()?;
    ab_margin(ctx.topic.tvl, peer.value)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::snapshot::{
        CategoryAggregate, ChainShare, ChainSummary, FlowOverview, ProtocolSummary, TimePoint,
    };

    const DAY: i64 = 86_400;
    const START: i64 = 1_685_577_600; // 2023-06-01

    pub(crate) fn series(days: usize, base: f64, drift: f64) -> Vec<TimePoint> {
        (0..days)
            .map(|day| {
                let d = f64::from(u32::try_from(day).unwrap());
                let wobble = if day % 2 == 0 { 1.01 } else { 0.995 };
                let value = base * (1.0 + drift * d / 100.0) * wobble;
                TimePoint::new(START + i64::try_from(day).unwrap() * DAY, value)
            })
            .collect()
    }

    fn protocol(slug: &str, category: &str, tvl: f64, rank: u32) -> ProtocolSummary {
        ProtocolSummary {
            slug: slug.to_string(),
            name: slug.to_uppercase(),
            category: Some(category.to_string()),
            tvl,
            rank: Some(rank),
            chains: vec!["ethereum".into()],
            change_7d: Some(0.01 * f64::from(rank)),
            fees_24h: Some(tvl / 2000.0),
        }
    }

    const CATEGORIES: [&str; 6] = ["Lending", "Dexes", "Liquid Staking", "Bridge", "CDP", "Yield"];

    fn category_for(rank: u32) -> &'static str {
        CATEGORIES[usize::try_from(rank).unwrap() % CATEGORIES.len()]
    }

    fn protocol_rankings() -> Vec<ProtocolSummary> {
        (1..=40u32)
            .map(|r| protocol(&format!("proto{r}"), category_for(r), 4.0e10 / f64::from(r), r))
            .collect()
    }

    fn chain_tvl(rank: u32) -> f64 {
        6.0e10 / f64::from(rank * rank)
    }

    fn chain_rankings() -> Vec<ChainSummary> {
        (1..=40u32)
            .map(|r| ChainSummary {
                slug: format!("chain{r}"),
                name: format!("Chain {r}"),
                tvl: chain_tvl(r),
                rank: Some(r),
                protocol_count: Some(1200 / r),
                token_symbol: Some(format!("TK{r}")),
                fees_24h: Some(3.0e6 / f64::from(r)),
            })
            .collect()
    }

    fn categories() -> Vec<CategoryAggregate> {
        CATEGORIES
            .iter()
            .enumerate()
            .map(|(idx, name)| CategoryAggregate {
                name: (*name).to_string(),
                tvl: 1.0e10 * f64::from(u32::try_from(idx + 1).unwrap()),
                protocol_count: 30,
            })
            .collect()
    }

    /// A protocol snapshot rich enough for every protocol template.
    pub(crate) fn protocol_snapshot(rank: u32) -> SubjectSnapshot {
        let protocols = protocol_rankings();
        let chains = chain_rankings();
        SubjectSnapshot {
            topic: Topic {
                slug: format!("proto{rank}"),
                name: format!("PROTO{rank}"),
                kind: SubjectKind::Protocol,
                category: Some(category_for(rank).into()),
                rank,
                tvl: 4.0e10 / f64::from(rank),
                chains: vec!["chain1".into(), "chain2".into(), "chain3".into()],
                protocol_count: None,
                symbol: Some("PRT".into()),
                listed_at: Some(START - 400 * DAY),
            },
            raw: RawEntities {
                tvl_series: series(420, 4.0e10 / f64::from(rank), 0.1),
                protocols,
                chains,
                chain_tvls: vec![
                    ChainShare { chain: "chain1".into(), tvl: 0.7 * 4.0e10 / f64::from(rank) },
                    ChainShare { chain: "chain2".into(), tvl: 0.2 * 4.0e10 / f64::from(rank) },
                    ChainShare { chain: "chain3".into(), tvl: 0.1 * 4.0e10 / f64::from(rank) },
                ],
                chain_protocols: Vec::new(),
                categories: categories(),
                fees: Some(FlowOverview {
                    total_24h: Some(1.2e6),
                    total_7d: Some(8.0e6),
                    total_30d: Some(3.3e7),
                    series: Vec::new(),
                }),
                revenue: None,
                volume: Some(FlowOverview {
                    total_24h: Some(9.0e8),
                    total_7d: Some(5.0e9),
                    total_30d: None,
                    series: Vec::new(),
                }),
            },
        }
    }

    pub(crate) fn protocol_context(rank: u32) -> Context {
        let date = NaiveDate::from_ymd_opt(2024, 7, 24).unwrap();
        Context::build(date, &protocol_snapshot(rank), DistractorConfig::default()).unwrap()
    }

    /// A chain snapshot rich enough for every chain template.
    pub(crate) fn chain_snapshot(rank: u32) -> SubjectSnapshot {
        let tvl = chain_tvl(rank);
        let chain_protocols: Vec<ProtocolSummary> = (1..=20u32)
            .map(|r| {
                let share = 0.4 / f64::from(r);
                protocol(&format!("onchain{r}"), category_for(r + 1), tvl * share, r)
            })
            .collect();
        SubjectSnapshot {
            topic: Topic {
                slug: format!("chain{rank}"),
                name: format!("Chain {rank}"),
                kind: SubjectKind::Chain,
                category: None,
                rank,
                tvl,
                chains: Vec::new(),
                protocol_count: Some(1200 / rank),
                symbol: Some(format!("TK{rank}")),
                listed_at: None,
            },
            raw: RawEntities {
                tvl_series: series(420, tvl, -0.1),
                protocols: protocol_rankings(),
                chains: chain_rankings(),
                chain_tvls: Vec::new(),
                chain_protocols,
                categories: categories(),
                fees: Some(FlowOverview {
                    total_24h: Some(3.0e6 / f64::from(rank)),
                    total_7d: None,
                    total_30d: None,
                    series: Vec::new(),
                }),
                revenue: None,
                volume: None,
            },
        }
    }

    pub(crate) fn chain_context(rank: u32) -> Context {
        let date = NaiveDate::from_ymd_opt(2024, 7, 24).unwrap();
        Context::build(date, &chain_snapshot(rank), DistractorConfig::default()).unwrap()
    }

    #[test]
    fn derived_metrics_cover_protocol_subjects() {
        let ctx = protocol_context(14);
        let derived = &ctx.derived;
        assert_eq!(derived.familiarity, FamiliarityBucket::Known);
        assert!(derived.changes.d30.is_some());
        assert!(derived.volatility_30d.is_some());
        assert!(derived.ath.is_some());
        assert_eq!(derived.nearby_peers.first().unwrap().rank.unwrap().abs_diff(14), 1);
        assert!(derived.nearby_peers.iter().all(|peer| peer.id != "proto14"));
        assert!(derived.category_peers.iter().all(|peer| peer.category == ctx.topic.category));
        let top = derived.top_chain.as_ref().unwrap();
        assert_eq!(top.id, "chain1");
        assert_eq!(top.label, "Chain 1");
        assert!((top.share - 0.7).abs() < 1e-9);
        assert_eq!(derived.chain_count, 3);
        assert!(derived.fees_to_tvl.is_some());
        assert!(derived.top_protocol.is_none());
    }

    #[test]
    fn derived_metrics_cover_chain_subjects() {
        let ctx = chain_context(6);
        let derived = &ctx.derived;
        assert_eq!(derived.familiarity, FamiliarityBucket::Household);
        let top = derived.top_protocol.as_ref().unwrap();
        assert_eq!(top.id, "onchain1");
        assert!(top.lead.unwrap() > 0.4);
        let dominant = derived.dominant_category.as_ref().unwrap();
        assert!(dominant.share > 0.0 && dominant.share <= 1.0);
        assert!(derived.category_rank.is_none());
        assert!(derived.nearby_peers.iter().all(|peer| peer.id != "chain6"));
    }

    #[test]
    fn category_rank_counts_larger_peers() {
        let ctx = protocol_context(14);
        // Category index = rank % 6, so ranks 2 and 8 share the subject's category.
        assert_eq!(ctx.derived.category_rank, Some(3));
    }

    #[test]
    fn unsorted_series_fails_construction() {
        let mut snapshot = protocol_snapshot(3);
        snapshot.raw.tvl_series.swap(0, 1);
        let date = NaiveDate::from_ymd_opt(2024, 7, 24).unwrap();
        assert!(matches!(
            Context::build(date, &snapshot, DistractorConfig::default()),
            Err(SnapshotError::UnsortedSeries { .. })
        ));
    }
}
