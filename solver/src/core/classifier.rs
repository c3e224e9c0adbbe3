//! Deterministic classification of score improvements.

use crate::core::types::StrategyTag;

/// Classify an improvement delta for the narrative log.
///
/// Thresholds, first match wins:
/// - `new_score == 100` -> `ProblemSolved`
/// - `delta >= 50` -> `MajorAlgorithmFix`
/// - `delta >= 20` -> `SignificantBugFix`
/// - `delta > 0` -> `MinorImprovement`
/// - otherwise -> `NoImprovement`
///
/// The delta is measured against the session's running best score, never the
/// immediately preceding attempt. Carries no control-flow effect.
pub fn classify(delta: f64, new_score: f64) -> StrategyTag {
    if new_score >= 100.0 {
        StrategyTag::ProblemSolved
    } else if delta >= 50.0 {
        StrategyTag::MajorAlgorithmFix
    } else if delta >= 20.0 {
        StrategyTag::SignificantBugFix
    } else if delta > 0.0 {
        StrategyTag::MinorImprovement
    } else {
        StrategyTag::NoImprovement
    }
}
