//! Difficulty scoring: signals in, a scalar in `[0, 1]` out.

use crate::config::DifficultyConfig;
use crate::constants::NEUTRAL_SIGNAL;
use crate::question::{DifficultySignals, DifficultyTarget, FamiliarityBucket, QuestionFormat};

/// Guess-rate term, scaled so six options map to 1.0.
fn format_term(format: QuestionFormat) -> f64 {
    let hardest = 1.0 - QuestionFormat::Choice6.guess_probability();
    (1.0 - format.guess_probability()) / hardest
}

fn familiarity_term(bucket: FamiliarityBucket, cfg: &DifficultyConfig) -> f64 {
    match bucket {
        FamiliarityBucket::Household => cfg.familiarity.household,
        FamiliarityBucket::Known => cfg.familiarity.known,
        FamiliarityBucket::Niche => cfg.familiarity.niche,
    }
}

/// Smaller margins are harder; a missing margin is neutral.
fn margin_term(margin: Option<f64>, cfg: &DifficultyConfig) -> f64 {
    margin.map_or(NEUTRAL_SIGNAL, |margin| {
        1.0 - (margin.max(0.0) / cfg.margin_ceiling).clamp(0.0, 1.0)
    })
}

fn volatility_term(volatility: Option<f64>) -> f64 {
    volatility.map_or(NEUTRAL_SIGNAL, |v| v.clamp(0.0, 1.0))
}

/// Weighted difficulty score in `[0, 1]`.
#[must_use]
pub fn score(signals: &DifficultySignals, cfg: &DifficultyConfig) -> f64 {
    let weights = cfg.weights;
    let total = weights.total();
    if total <= 0.0 {
        return NEUTRAL_SIGNAL;
    }
    let raw = weights.format * format_term(signals.format)
        + weights.familiarity * familiarity_term(signals.familiarity, cfg)
        + weights.margin * margin_term(signals.margin, cfg)
        + weights.volatility * volatility_term(signals.volatility);
    (raw / total).clamp(0.0, 1.0)
}

/// Discretize a score with the configured thresholds.
#[must_use]
pub fn classify(score: f64, cfg: &DifficultyConfig) -> DifficultyTarget {
    if score < cfg.easy_upper {
        DifficultyTarget::Easy
    } else if score < cfg.medium_upper {
        DifficultyTarget::Medium
    } else {
        DifficultyTarget::Hard
    }
}

/// Whether `score` lands in `target`'s band widened by the tolerance.
#[must_use]
pub fn matches_target(score: f64, target: DifficultyTarget, cfg: &DifficultyConfig) -> bool {
    let tol = cfg.tolerance;
    match target {
        DifficultyTarget::Easy => score < cfg.easy_upper + tol,
        DifficultyTarget::Medium => {
            score >= cfg.easy_upper - tol && score < cfg.medium_upper + tol
        }
        DifficultyTarget::Hard => score >= cfg.medium_upper - tol,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(
        format: QuestionFormat,
        familiarity: FamiliarityBucket,
        margin: Option<f64>,
        volatility: Option<f64>,
    ) -> DifficultySignals {
        DifficultySignals {
            format,
            familiarity,
            margin,
            volatility,
        }
    }

    #[test]
    fn richer_formats_and_tighter_margins_are_harder() {
        let cfg = DifficultyConfig::default();
        let fam = FamiliarityBucket::Known;
        let tf = score(&signals(QuestionFormat::TrueFalse, fam, Some(0.3), None), &cfg);
        let mc4 = score(&signals(QuestionFormat::Choice4, fam, Some(0.3), None), &cfg);
        let mc6 = score(&signals(QuestionFormat::Choice6, fam, Some(0.3), None), &cfg);
        assert!(tf < mc4 && mc4 < mc6);

        let wide = score(&signals(QuestionFormat::Choice4, fam, Some(0.5), None), &cfg);
        let tight = score(&signals(QuestionFormat::Choice4, fam, Some(0.02), None), &cfg);
        assert!(tight > wide);
    }

    #[test]
    fn missing_signals_are_neutral_not_zero() {
        let cfg = DifficultyConfig::default();
        let fam = FamiliarityBucket::Household;
        let none = score(&signals(QuestionFormat::Choice4, fam, None, None), &cfg);
        let mid = score(&signals(QuestionFormat::Choice4, fam, Some(0.25), Some(0.5)), &cfg);
        assert!((none - mid).abs() < 1e-12);
        let zero = score(&signals(QuestionFormat::Choice4, fam, Some(0.0), Some(0.0)), &cfg);
        assert!(zero > none - 0.2);
    }

    #[test]
    fn familiar_subjects_are_easier() {
        let cfg = DifficultyConfig::default();
        let household = score(
            &signals(QuestionFormat::Binary, FamiliarityBucket::Household, None, None),
            &cfg,
        );
        let niche = score(
            &signals(QuestionFormat::Binary, FamiliarityBucket::Niche, None, None),
            &cfg,
        );
        assert!(household < niche);
    }

    #[test]
    fn known_values() {
        let cfg = DifficultyConfig::default();
        // 0.35 * 0.6 + 0.25 * 0.15 + 0.30 * 0.0 + 0.10 * 0.5
        let easy = score(
            &signals(QuestionFormat::TrueFalse, FamiliarityBucket::Household, Some(0.6), None),
            &cfg,
        );
        assert!((easy - 0.2975).abs() < 1e-9);
        assert_eq!(classify(easy, &cfg), DifficultyTarget::Easy);
        // 0.35 + 0.25 * 0.85 + 0.30 * 0.5 + 0.10 * 0.5
        let hard = score(
            &signals(QuestionFormat::Choice6, FamiliarityBucket::Niche, None, None),
            &cfg,
        );
        assert!((hard - 0.7625).abs() < 1e-9);
        assert_eq!(classify(hard, &cfg), DifficultyTarget::Hard);
    }

    #[test]
    fn tolerance_widens_bands() {
        let cfg = DifficultyConfig::default();
        assert!(matches_target(0.46, DifficultyTarget::Easy, &cfg));
        assert!(!matches_target(0.49, DifficultyTarget::Easy, &cfg));
        assert!(matches_target(0.43, DifficultyTarget::Medium, &cfg));
        assert!(matches_target(0.63, DifficultyTarget::Hard, &cfg));
        assert!(!matches_target(0.61, DifficultyTarget::Hard, &cfg));
        assert!(!matches_target(0.70, DifficultyTarget::Medium, &cfg));
    }
}
