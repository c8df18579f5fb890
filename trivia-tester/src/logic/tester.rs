use anyhow::{Context, Result};
use chrono::NaiveDate;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use trivia_engine::{Catalog, EngineConfig, EpisodeEngine, EpisodeKey, SubjectSnapshot};

use super::adapters::{DirectoryStore, FileSnapshotSource};
use super::dates::DateSpec;
use super::scenarios::{Scenario, ScenarioCase};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub passed: bool,
    pub cases_run: usize,
    pub successful_cases: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
}

/// Outcome of persisting and re-auditing episodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSummary {
    pub stored: usize,
    pub reproduced: usize,
    pub failures: Vec<String>,
}

/// Loaded snapshots crossed with requested dates.
pub struct EpisodeTester {
    snapshots: Vec<SubjectSnapshot>,
    source: FileSnapshotSource,
    dates: Vec<DateSpec>,
    config: EngineConfig,
    catalog: Catalog,
    verbose: bool,
}

impl EpisodeTester {
    pub fn new<P: AsRef<Path>>(
        snapshot_paths: &[P],
        dates: Vec<DateSpec>,
        config: EngineConfig,
        verbose: bool,
    ) -> Result<Self> {
        config.validate().context("invalid engine configuration")?;
        let (source, snapshots) =
            FileSnapshotSource::from_paths(snapshot_paths).context("loading snapshots")?;
        let catalog = Catalog::standard().context("building the template catalog")?;
        Ok(Self {
            snapshots,
            source,
            dates,
            config,
            catalog,
            verbose,
        })
    }

    /// Every (snapshot, date) pair, skipping `latest` for snapshots without a series.
    fn cases(&self) -> Vec<(&SubjectSnapshot, NaiveDate)> {
        let mut cases = Vec::new();
        for snapshot in &self.snapshots {
            for spec in &self.dates {
                match spec.resolve(snapshot) {
                    Some(date) => cases.push((snapshot, date)),
                    None => log::warn!(
                        "{} has no TVL series; skipping {spec:?}",
                        snapshot.topic.slug
                    ),
                }
            }
        }
        cases
    }

    pub fn run_scenario(&self, scenario: &Scenario) -> ScenarioResult {
        if self.verbose {
            println!("🧪 Testing scenario: {}", scenario.key.bright_white());
        }

        let mut failures = Vec::new();
        let mut durations = Vec::new();
        let cases = self.cases();
        for (snapshot, date) in &cases {
            let case = ScenarioCase {
                date: *date,
                snapshot,
                config: &self.config,
                catalog: &self.catalog,
            };
            let start = Instant::now();
            match scenario.run(&case) {
                Ok(()) => {
                    let duration = start.elapsed();
                    durations.push(duration);
                    if self.verbose {
                        println!("  ✅ {} passed ({duration:?})", case.label());
                    }
                }
                Err(err) => {
                    let message = format!("{}: {err:#}", case.label());
                    if self.verbose {
                        println!("  ❌ {}", message.clone().red());
                    }
                    failures.push(message);
                }
            }
        }

        let average_duration = if durations.is_empty() {
            Duration::ZERO
        } else {
            durations.iter().sum::<Duration>() / u32::try_from(durations.len()).unwrap_or(1)
        };
        ScenarioResult {
            scenario_name: scenario.key.to_string(),
            passed: failures.is_empty(),
            cases_run: cases.len(),
            successful_cases: durations.len(),
            failures,
            average_duration,
        }
    }

    /// Generate, persist and re-audit every case through the engine facade.
    pub fn store_episodes(&self, dir: &Path) -> Result<StoreSummary> {
        let store = DirectoryStore::new(dir)
            .with_context(|| format!("opening store {}", dir.display()))?;
        let engine = EpisodeEngine::new(self.source.clone(), store)?
            .with_config(self.config.clone())?;

        let mut summary = StoreSummary::default();
        for (snapshot, date) in self.cases() {
            let key = EpisodeKey::for_topic(date, &snapshot.topic);
            match engine.generate_and_store(&key) {
                Ok(_) => summary.stored += 1,
                Err(err) => {
                    summary.failures.push(format!("{key}: {err}"));
                    continue;
                }
            }
            match engine.regenerate_matches(&key) {
                Ok(Some(true)) => summary.reproduced += 1,
                Ok(_) => summary.failures.push(format!("{key}: stored episode does not reproduce")),
                Err(err) => summary.failures.push(format!("{key}: {err}")),
            }
        }
        Ok(summary)
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_micros().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let micros = u128::deserialize(deserializer)?;
        Ok(Duration::from_micros(u64::try_from(micros).unwrap_or(0)))
    }
}
