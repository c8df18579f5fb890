//! Finished episodes and the function that produces them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hasher;
use std::io;
use twox_hash::XxHash64;

use crate::builder::EpisodeBuilder;
use crate::config::EngineConfig;
use crate::constants::SLOT_COUNT;
use crate::context::Context;
use crate::error::EngineError;
use crate::explain::ExplanationRenderer;
use crate::question::Question;
use crate::seed::seed_from_parts;
use crate::snapshot::{SubjectKind, SubjectSnapshot, Topic};
use crate::templates::Catalog;
use crate::trace::{BuildReport, SlotOutcome};

/// Identifies one daily episode: the date and the subject it is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EpisodeKey {
    pub date: NaiveDate,
    pub subject_kind: SubjectKind,
    pub slug: String,
}

impl EpisodeKey {
    #[must_use]
    pub fn new(date: NaiveDate, subject_kind: SubjectKind, slug: &str) -> Self {
        Self {
            date,
            subject_kind,
            slug: slug.to_string(),
        }
    }

    #[must_use]
    pub fn for_topic(date: NaiveDate, topic: &Topic) -> Self {
        Self::new(date, topic.kind, &topic.slug)
    }

    /// Root seed of the episode. Every candidate seed derives from it.
    #[must_use]
    pub fn seed(&self) -> u64 {
        let date = self.date.format("%Y-%m-%d").to_string();
        seed_from_parts(&[date.as_str(), self.subject_kind.key(), self.slug.as_str()])
    }

    /// File-name friendly form, e.g. `2024-07-24-protocol-aave`.
    #[must_use]
    pub fn storage_name(&self) -> String {
        format!(
            "{}-{}-{}",
            self.date.format("%Y-%m-%d"),
            self.subject_kind.key(),
            self.slug
        )
    }
}

impl fmt::Display for EpisodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.date, self.subject_kind, self.slug)
    }
}

/// How an episode was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMetadata {
    pub date: NaiveDate,
    pub subject_kind: SubjectKind,
    pub episode_seed: u64,
    pub engine_version: String,
    pub outcomes: Vec<SlotOutcome>,
    /// True when at least one slot stayed empty.
    pub degraded: bool,
    /// Hex XxHash64 of the episode content, see [`Episode::content_digest`].
    #[serde(default)]
    pub digest: String,
}

/// A complete daily episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub topic: Topic,
    pub questions: Vec<Question>,
    pub metadata: EpisodeMetadata,
    #[serde(default)]
    pub report: BuildReport,
}

/// Feeds serialized bytes straight into the hasher.
struct HashWriter(XxHash64);

impl io::Write for HashWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Everything the digest covers. The report and the digest itself are left out.
#[derive(Serialize)]
struct DigestView<'a> {
    topic: &'a Topic,
    questions: &'a [Question],
    date: NaiveDate,
    subject_kind: SubjectKind,
    episode_seed: u64,
    engine_version: &'a str,
    outcomes: &'a [SlotOutcome],
}

impl Episode {
    #[must_use]
    pub fn key(&self) -> EpisodeKey {
        EpisodeKey::for_topic(self.metadata.date, &self.topic)
    }

    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.metadata.degraded
    }

    /// Recompute the content digest from the episode as it stands.
    ///
    /// # Errors
    ///
    /// Returns an error if the episode cannot be serialized.
    pub fn content_digest(&self) -> Result<String, serde_json::Error> {
        let view = DigestView {
            topic: &self.topic,
            questions: &self.questions,
            date: self.metadata.date,
            subject_kind: self.metadata.subject_kind,
            episode_seed: self.metadata.episode_seed,
            engine_version: &self.metadata.engine_version,
            outcomes: &self.metadata.outcomes,
        };
        let mut writer = HashWriter(XxHash64::with_seed(0));
        serde_json::to_writer(&mut writer, &view)?;
        Ok(format!("{:016x}", writer.0.finish()))
    }

    /// Whether the stored digest still matches the content.
    #[must_use]
    pub fn digest_matches(&self) -> bool {
        self.content_digest()
            .is_ok_and(|digest| digest == self.metadata.digest)
    }
}

/// Build the episode for `snapshot` on `date`.
///
/// The result is a pure function of the date, the snapshot, the configuration
/// and the catalog.
///
/// # Errors
///
/// Fails when the configuration is invalid, the snapshot breaks its contract,
/// or a template renders a draft that violates the draft invariants.
pub fn build_episode(
    date: NaiveDate,
    snapshot: &SubjectSnapshot,
    config: &EngineConfig,
    catalog: &Catalog,
    renderer: &dyn ExplanationRenderer,
) -> Result<Episode, EngineError> {
    config.validate()?;
    let key = EpisodeKey::for_topic(date, &snapshot.topic);
    let ctx = Context::build(date, snapshot, config.distractors)?;
    let episode_seed = key.seed();
    log::debug!("building {key} with seed {episode_seed:#018x}");

    let output = EpisodeBuilder::new(catalog, config, renderer).build(&ctx, episode_seed)?;
    let degraded = output.report.is_degraded();
    let mut episode = Episode {
        topic: snapshot.topic.clone(),
        questions: output.questions,
        metadata: EpisodeMetadata {
            date,
            subject_kind: snapshot.topic.kind,
            episode_seed,
            engine_version: config.engine_version.clone(),
            outcomes: output.outcomes,
            degraded,
            digest: String::new(),
        },
        report: output.report,
    };
    episode.metadata.digest = episode.content_digest()?;

    if degraded {
        log::warn!(
            "episode {key} degraded: {}/{SLOT_COUNT} slots filled",
            episode.questions.len()
        );
    } else {
        log::info!("episode {key} built, digest {}", episode.metadata.digest);
    }
    Ok(episode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::{chain_snapshot, protocol_snapshot};
    use crate::explain::FactsRenderer;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 24).unwrap()
    }

    fn build(snapshot: &SubjectSnapshot) -> Episode {
        let catalog = Catalog::standard().unwrap();
        build_episode(date(), snapshot, &EngineConfig::default(), &catalog, &FactsRenderer).unwrap()
    }

    #[test]
    fn keys_seed_from_date_kind_and_slug() {
        let key = EpisodeKey::new(date(), SubjectKind::Protocol, "aave");
        assert_eq!(key.storage_name(), "2024-07-24-protocol-aave");
        assert_eq!(key.seed(), seed_from_parts(&["2024-07-24", "protocol", "aave"]));
        let chain = EpisodeKey::new(date(), SubjectKind::Chain, "aave");
        assert_ne!(key.seed(), chain.seed());
    }

    #[test]
    fn episodes_are_reproducible() {
        let snapshot = protocol_snapshot(14);
        let first = build(&snapshot);
        let second = build(&snapshot);
        assert_eq!(first, second);
        assert_eq!(first.metadata.digest.len(), 16);
        assert!(first.digest_matches());
        assert_eq!(first.metadata.outcomes.len(), SLOT_COUNT);
        assert_eq!(first.key().slug, "proto14");
    }

    #[test]
    fn digest_tracks_content() {
        let mut episode = build(&chain_snapshot(6));
        assert!(episode.digest_matches());
        episode.questions[0].draft.prompt.push('!');
        assert!(!episode.digest_matches());
    }

    #[test]
    fn different_days_differ() {
        let snapshot = protocol_snapshot(3);
        let catalog = Catalog::standard().unwrap();
        let config = EngineConfig::default();
        let today = build_episode(date(), &snapshot, &config, &catalog, &FactsRenderer).unwrap();
        let tomorrow = build_episode(
            date().succ_opt().unwrap(),
            &snapshot,
            &config,
            &catalog,
            &FactsRenderer,
        )
        .unwrap();
        assert_ne!(today.metadata.episode_seed, tomorrow.metadata.episode_seed);
        assert_ne!(today.metadata.digest, tomorrow.metadata.digest);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let mut config = EngineConfig::default();
        config.slots.pop();
        let catalog = Catalog::standard().unwrap();
        let err = build_episode(date(), &protocol_snapshot(3), &config, &catalog, &FactsRenderer)
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
