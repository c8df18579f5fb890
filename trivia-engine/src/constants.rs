//! Centralized tuning constants for the question engine.
//!
//! These values define the deterministic math behind distractor selection,
//! difficulty scoring and the metric bands. Keeping them together ensures
//! episodes can only change through reviewed code changes, never through
//! ambient state.

// Seeding ------------------------------------------------------------------
pub(crate) const SEED_DOMAIN: &[u8] = b"TRIVIA-EPISODE";

// Formats ------------------------------------------------------------------
pub const TRUE_LABEL: &str = "True";
pub const FALSE_LABEL: &str = "False";

// Metrics ------------------------------------------------------------------
pub(crate) const SECONDS_PER_DAY: i64 = 86_400;
pub(crate) const VOLATILITY_NORMALIZER: f64 = 0.12;
pub(crate) const VOLATILITY_MIN_RETURNS: usize = 6;
pub(crate) const VOLATILITY_WINDOW_DAYS: i64 = 30;
pub(crate) const WINSOR_LOW_PCT: f64 = 0.10;
pub(crate) const WINSOR_HIGH_PCT: f64 = 0.90;

// Familiarity --------------------------------------------------------------
pub(crate) const FAMILIAR_RANK_MAX: u32 = 10;
pub(crate) const KNOWN_RANK_MAX: u32 = 50;

// Distractors --------------------------------------------------------------
pub(crate) const DEFAULT_CATEGORY_CAP: usize = 2;
pub(crate) const VALUE_CHOICE_MIN_SEPARATION: f64 = 0.12;
pub(crate) const DEFAULT_DISTRACTOR_MAX_RANK: u32 = 150;
pub(crate) const RANK_TIER_LIMITS: [u32; 3] = [10, 25, 50];
pub(crate) const MONTH_WINDOW: i32 = 3;
pub(crate) const QUARTER_WINDOW: i32 = 2;
pub(crate) const TIMING_HISTORY_CAP: usize = 240;
pub(crate) const BUCKET_RATIO_STEP: f64 = 2.5;

// Difficulty ---------------------------------------------------------------
pub(crate) const WEIGHT_FORMAT: f64 = 0.35;
pub(crate) const WEIGHT_FAMILIARITY: f64 = 0.25;
pub(crate) const WEIGHT_MARGIN: f64 = 0.30;
pub(crate) const WEIGHT_VOLATILITY: f64 = 0.10;
pub(crate) const MARGIN_CEILING: f64 = 0.5;
pub(crate) const NEUTRAL_SIGNAL: f64 = 0.5;
pub(crate) const EASY_UPPER: f64 = 0.45;
pub(crate) const MEDIUM_UPPER: f64 = 0.65;
pub(crate) const TARGET_TOLERANCE: f64 = 0.03;
pub(crate) const FAMILIARITY_HOUSEHOLD: f64 = 0.15;
pub(crate) const FAMILIARITY_KNOWN: f64 = 0.5;
pub(crate) const FAMILIARITY_NICHE: f64 = 0.85;

// Template gates -----------------------------------------------------------
/// Margin below which 4/6-option comparisons degrade to true/false.
pub(crate) const TIGHT_MARGIN: f64 = 0.08;
/// Smallest 30-day move that counts as a direction for trend questions.
pub(crate) const TREND_MIN_MOVE: f64 = 0.02;
/// 30-day move at which the direction reads as obvious.
pub(crate) const TREND_CLEAR_MOVE: f64 = 0.10;
pub(crate) const MIN_SERIES_POINTS: usize = 30;
pub(crate) const MIN_PEERS_FOR_COMPARISON: usize = 5;

// Engine -------------------------------------------------------------------
pub const SLOT_COUNT: usize = 5;
pub const SLOT_LABELS: [&str; SLOT_COUNT] = ["opener", "warmup", "core", "deep", "closer"];
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
