//! Trivia Episode Engine
//!
//! Platform-agnostic core for deterministic daily trivia episodes about DeFi
//! protocols and chains. This crate turns a data snapshot into five graded
//! questions without I/O, clocks or ambient randomness; fetching data,
//! rendering questions and persisting episodes belong to the caller.

pub mod bands;
pub mod builder;
pub mod calendar;
pub mod config;
pub mod constants;
pub mod context;
pub mod difficulty;
pub mod display;
pub mod distractors;
pub mod episode;
pub mod error;
pub mod explain;
pub mod fallbacks;
pub mod metrics;
pub mod numbers;
pub mod question;
pub mod seed;
pub mod slots;
pub mod snapshot;
pub mod template;
pub mod templates;
pub mod topics;
pub mod trace;

// Re-export commonly used types
pub use builder::{BuildOutput, EpisodeBuilder};
pub use calendar::{YearMonth, YearQuarter};
pub use config::{DifficultyConfig, DistractorConfig, EngineConfig, EngineConfigError};
pub use constants::{ENGINE_VERSION, SLOT_COUNT, SLOT_LABELS};
pub use context::Context;
pub use difficulty::{classify, matches_target, score};
pub use episode::{Episode, EpisodeKey, EpisodeMetadata, build_episode};
pub use error::{ConfigurationError, EngineError};
pub use explain::{ExplanationRenderer, FactsRenderer};
pub use question::{
    DifficultySignals, DifficultyTarget, ExplainFacts, FactValue, FamiliarityBucket, Question,
    QuestionDraft, QuestionFormat, QuestionSource,
};
pub use seed::{SeededRng, derive_seed, sample, seed_from_parts, shuffle};
pub use slots::{SlotSpec, default_slot_table};
pub use snapshot::{SnapshotError, SubjectKind, SubjectSnapshot, Topic};
pub use template::{DeclineReason, QuestionTemplate, TemplateConfig, create_template};
pub use templates::Catalog;
pub use topics::{SemanticTopic, SemanticTopicSet};
pub use trace::{BuildReport, DiagnosticNote, NoteKind, SlotExhausted, SlotOutcome};

/// Trait for abstracting snapshot fetching
/// Platform-specific implementations should provide this
pub trait SnapshotSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the snapshot for the subject and date named by `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be fetched or parsed.
    fn load_snapshot(&self, key: &EpisodeKey) -> Result<SubjectSnapshot, Self::Error>;
}

/// Trait for abstracting episode persistence
/// Platform-specific implementations should provide this
pub trait EpisodeStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Save an episode
    ///
    /// # Errors
    ///
    /// Returns an error if the episode cannot be saved.
    fn save_episode(&self, key: &EpisodeKey, episode: &Episode) -> Result<(), Self::Error>;

    /// Load an episode
    ///
    /// # Errors
    ///
    /// Returns an error if the episode cannot be loaded.
    fn load_episode(&self, key: &EpisodeKey) -> Result<Option<Episode>, Self::Error>;

    /// Delete a stored episode
    ///
    /// # Errors
    ///
    /// Returns an error if the episode cannot be deleted.
    fn delete_episode(&self, key: &EpisodeKey) -> Result<(), Self::Error>;
}

/// Main engine binding a snapshot source and an episode store
pub struct EpisodeEngine<L, S>
where
    L: SnapshotSource,
    S: EpisodeStore,
{
    source: L,
    store: S,
    config: EngineConfig,
    catalog: Catalog,
    renderer: Box<dyn ExplanationRenderer>,
}

impl<L, S> EpisodeEngine<L, S>
where
    L: SnapshotSource,
    S: EpisodeStore,
{
    /// Create an engine with the default configuration, catalog and renderer
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in catalog is inconsistent.
    pub fn new(source: L, store: S) -> Result<Self, EngineError> {
        Ok(Self {
            source,
            store,
            config: EngineConfig::default(),
            catalog: Catalog::standard()?,
            renderer: Box::new(FactsRenderer),
        })
    }

    /// Replace the configuration after validating it
    ///
    /// # Errors
    ///
    /// Returns the first violated configuration invariant.
    pub fn with_config(mut self, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: impl ExplanationRenderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch the snapshot for `key` and build its episode
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be loaded, names a different
    /// subject, or the build hits a configuration defect.
    pub fn generate(&self, key: &EpisodeKey) -> Result<Episode, EngineError> {
        let snapshot = self
            .source
            .load_snapshot(key)
            .map_err(|err| EngineError::Source(Box::new(err)))?;
        let received = EpisodeKey::for_topic(key.date, &snapshot.topic);
        if &received != key {
            return Err(EngineError::SubjectMismatch {
                requested: key.to_string(),
                received: received.to_string(),
            });
        }
        build_episode(
            key.date,
            &snapshot,
            &self.config,
            &self.catalog,
            self.renderer.as_ref(),
        )
    }

    /// Build the episode for `key` and persist it
    ///
    /// # Errors
    ///
    /// Returns an error if generation or saving fails.
    pub fn generate_and_store(&self, key: &EpisodeKey) -> Result<Episode, EngineError> {
        let episode = self.generate(key)?;
        self.store
            .save_episode(key, &episode)
            .map_err(|err| EngineError::Store(Box::new(err)))?;
        Ok(episode)
    }

    /// Load a stored episode
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn load(&self, key: &EpisodeKey) -> Result<Option<Episode>, EngineError> {
        self.store
            .load_episode(key)
            .map_err(|err| EngineError::Store(Box::new(err)))
    }

    /// Delete a stored episode
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn delete(&self, key: &EpisodeKey) -> Result<(), EngineError> {
        self.store
            .delete_episode(key)
            .map_err(|err| EngineError::Store(Box::new(err)))
    }

    /// Rebuild a stored episode and compare it with what was saved
    ///
    /// Returns `None` when nothing is stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if loading or regeneration fails.
    pub fn regenerate_matches(&self, key: &EpisodeKey) -> Result<Option<bool>, EngineError> {
        let Some(stored) = self.load(key)? else {
            return Ok(None);
        };
        let fresh = self.generate(key)?;
        let matches = stored.digest_matches()
            && stored.metadata.digest == fresh.metadata.digest
            && stored.questions == fresh.questions;
        if !matches {
            log::warn!(
                "episode {key} no longer reproduces: stored {} vs rebuilt {}",
                stored.metadata.digest,
                fresh.metadata.digest
            );
        }
        Ok(Some(matches))
    }
}
