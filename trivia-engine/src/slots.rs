//! The five-slot episode layout.
//!
//! Each slot names its difficulty target, the formats it accepts in
//! preference order, and per subject kind the ordered template ids to try.

use serde::{Deserialize, Serialize};

use crate::question::{DifficultyTarget, QuestionFormat};
use crate::snapshot::SubjectKind;

/// One position in an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSpec {
    pub label: String,
    pub target: DifficultyTarget,
    /// Accepted formats, most preferred first.
    pub formats: Vec<QuestionFormat>,
    /// Template ids tried for protocol subjects, in order.
    #[serde(default)]
    pub protocol: Vec<String>,
    /// Template ids tried for chain subjects, in order.
    #[serde(default)]
    pub chain: Vec<String>,
}

impl SlotSpec {
    fn new(
        label: &str,
        target: DifficultyTarget,
        formats: &[QuestionFormat],
        protocol: &[&str],
        chain: &[&str],
    ) -> Self {
        Self {
            label: label.to_string(),
            target,
            formats: formats.to_vec(),
            protocol: protocol.iter().map(|id| (*id).to_string()).collect(),
            chain: chain.iter().map(|id| (*id).to_string()).collect(),
        }
    }

    /// Ordered candidate ids for a subject kind.
    #[must_use]
    pub fn candidates(&self, kind: SubjectKind) -> &[String] {
        match kind {
            SubjectKind::Protocol => &self.protocol,
            SubjectKind::Chain => &self.chain,
        }
    }

    /// Fallback tier for this slot. Hard slots fall back to medium.
    #[must_use]
    pub const fn fallback_tier(&self) -> DifficultyTarget {
        match self.target {
            DifficultyTarget::Easy => DifficultyTarget::Easy,
            DifficultyTarget::Medium | DifficultyTarget::Hard => DifficultyTarget::Medium,
        }
    }

    /// Whether the slot accepts `format`.
    #[must_use]
    pub fn allows(&self, format: QuestionFormat) -> bool {
        self.formats.contains(&format)
    }
}

/// The standard opener / warmup / core / deep / closer table.
#[must_use]
pub fn default_slot_table() -> Vec<SlotSpec> {
    use DifficultyTarget::{Easy, Hard, Medium};
    use QuestionFormat::{Binary, Choice4, Choice6, TrueFalse};

    vec![
        SlotSpec::new(
            "opener",
            Easy,
            &[TrueFalse, Binary, Choice4],
            &[
                "protocol_category",
                "protocol_trend_30d",
                "protocol_peer_duel",
                "protocol_size_band",
                "protocol_volume_direction",
            ],
            &[
                "chain_native_token",
                "chain_trend_30d",
                "chain_duel",
                "chain_size_band",
            ],
        ),
        SlotSpec::new(
            "warmup",
            Easy,
            &[Binary, Choice4, TrueFalse],
            &[
                "protocol_peer_duel",
                "protocol_top_chain",
                "protocol_chain_count",
                "protocol_mover_7d",
                "protocol_size_band",
                "protocol_category",
            ],
            &[
                "chain_duel",
                "chain_top_protocol",
                "chain_protocol_count",
                "chain_size_band",
                "chain_native_token",
            ],
        ),
        SlotSpec::new(
            "core",
            Medium,
            &[Choice4, Binary, TrueFalse],
            &[
                "protocol_rank_band",
                "protocol_category_leader",
                "protocol_change_30d",
                "protocol_top_chain",
                "protocol_chain_concentration",
                "protocol_fees_band",
                "protocol_drawdown",
            ],
            &[
                "chain_rank_band",
                "chain_dominant_category",
                "chain_change_30d",
                "chain_protocol_concentration",
                "chain_top_protocol",
                "chain_fees",
            ],
        ),
        SlotSpec::new(
            "deep",
            Medium,
            &[Choice4, Choice6, Binary],
            &[
                "protocol_fee_efficiency",
                "protocol_ath_month",
                "protocol_drawdown",
                "protocol_fees_band",
                "protocol_change_30d",
                "protocol_listing_quarter",
                "protocol_chain_concentration",
            ],
            &[
                "chain_ath_month",
                "chain_fees",
                "chain_protocol_concentration",
                "chain_change_30d",
                "chain_dominant_category",
            ],
        ),
        SlotSpec::new(
            "closer",
            Hard,
            &[Choice6, Choice4, Binary, TrueFalse],
            &[
                "protocol_fingerprint",
                "protocol_ath_month",
                "protocol_listing_quarter",
                "protocol_rank_band",
                "protocol_fees_band",
                "protocol_fee_efficiency",
            ],
            &[
                "chain_fingerprint",
                "chain_ath_month",
                "chain_rank_band",
                "chain_fees",
                "chain_protocol_count",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SLOT_COUNT;
    use crate::templates::Catalog;

    #[test]
    fn default_table_shape() {
        let table = default_slot_table();
        assert_eq!(table.len(), SLOT_COUNT);
        let targets: Vec<DifficultyTarget> = table.iter().map(|slot| slot.target).collect();
        assert_eq!(
            targets,
            vec![
                DifficultyTarget::Easy,
                DifficultyTarget::Easy,
                DifficultyTarget::Medium,
                DifficultyTarget::Medium,
                DifficultyTarget::Hard
            ]
        );
        assert_eq!(table[4].fallback_tier(), DifficultyTarget::Medium);
        assert!(!table[3].allows(QuestionFormat::TrueFalse));
    }

    #[test]
    fn every_listed_candidate_exists_for_its_kind() {
        let catalog = Catalog::standard().unwrap();
        for slot in default_slot_table() {
            for kind in [SubjectKind::Protocol, SubjectKind::Chain] {
                for id in slot.candidates(kind) {
                    let template = catalog
                        .template(id)
                        .unwrap_or_else(|| panic!("{} lists unknown {id}", slot.label));
                    assert_eq!(template.subject(), Some(kind), "{id}");
                }
            }
        }
    }
}
