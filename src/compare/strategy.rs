use crate::compare::balanced::BalancedStrategy;
use crate::compare::equal::EqualStrategy;
use crate::compare::error::CompareError;
use crate::fingerprint::Fingerprint;

/// Accumulated scores may exceed their maximum by rounding error only
pub(crate) const SCORE_TOLERANCE: f64 = 1e-9;

/// Scores a release fingerprint against the fingerprint of a shipped binary
pub trait CompareStrategy: Send + Sync {
    /// Probability in `[0, 1]` that `target` is the release `source` was built from
    fn compare(&self, source: &Fingerprint, target: &Fingerprint) -> Result<f64, CompareError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StrategyKind {
    /// Weighted per-member similarity
    #[default]
    Balanced,
    /// Unweighted count of matching facts
    Equal,
}

impl StrategyKind {
    pub fn strategy(self) -> Box<dyn CompareStrategy> {
        match self {
            StrategyKind::Balanced => Box::new(BalancedStrategy),
            StrategyKind::Equal => Box::new(EqualStrategy),
        }
    }
}

/// Fails when `score` exceeds `max` beyond rounding
pub(crate) fn ensure_within(
    score: f64,
    max: f64,
    context: impl FnOnce() -> String,
) -> Result<f64, CompareError> {
    if score > max + SCORE_TOLERANCE {
        Err(CompareError::ScoreOverflow {
            context: context(),
            score,
        })
    } else {
        Ok(score)
    }
}
