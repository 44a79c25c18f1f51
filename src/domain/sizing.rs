//! Position sizing: confidence score -> target fraction of equity.

use crate::domain::error::StrategyError;

/// Maps a score to a target weight.
///
/// `get_target_weights` must agree element-for-element with
/// `get_target_weight`; the default implementation guarantees it.
pub trait PositionSizer: Send + Sync {
    fn get_target_weight(&self, score: f64) -> f64;

    fn get_target_weights(&self, scores: &[f64]) -> Vec<f64> {
        scores.iter().map(|s| self.get_target_weight(*s)).collect()
    }
}

/// Sentiment-driven sizing.
///
/// - score < min_threshold: 0.0 (risk off; the threshold itself is sized)
/// - otherwise: base_weight * (0.5 + 0.5 * score) * scale_factor
/// - clipped to [0, 1], or only floored at 0 with leverage
///
/// A score of -1 maps to 0, 0 to half the base weight and 1 to the full
/// base weight. Non-finite scores size to 0.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentSizer {
    base_weight: f64,
    min_threshold: f64,
    scale_factor: f64,
    allow_leverage: bool,
}

impl Default for SentimentSizer {
    fn default() -> Self {
        Self {
            base_weight: 1.0,
            min_threshold: 0.2,
            scale_factor: 1.0,
            allow_leverage: false,
        }
    }
}

impl SentimentSizer {
    pub fn new(
        base_weight: f64,
        min_threshold: f64,
        scale_factor: f64,
        allow_leverage: bool,
    ) -> Result<Self, StrategyError> {
        check_non_negative("base_weight", base_weight)?;
        check_non_negative("scale_factor", scale_factor)?;
        if !min_threshold.is_finite() {
            return Err(StrategyError::InvalidParameter {
                name: "min_threshold".into(),
                reason: format!("must be finite, got {}", min_threshold),
            });
        }
        Ok(Self {
            base_weight,
            min_threshold,
            scale_factor,
            allow_leverage,
        })
    }

    /// Default weights with a different cutoff.
    pub fn with_threshold(min_threshold: f64) -> Result<Self, StrategyError> {
        let d = Self::default();
        Self::new(d.base_weight, min_threshold, d.scale_factor, d.allow_leverage)
    }

    pub fn min_threshold(&self) -> f64 {
        self.min_threshold
    }

    pub fn allow_leverage(&self) -> bool {
        self.allow_leverage
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), StrategyError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(StrategyError::InvalidParameter {
            name: name.into(),
            reason: format!("must be finite and non-negative, got {}", value),
        })
    }
}

impl PositionSizer for SentimentSizer {
    fn get_target_weight(&self, score: f64) -> f64 {
        if !score.is_finite() || score < self.min_threshold {
            return 0.0;
        }
        let target = self.base_weight * (0.5 + 0.5 * score) * self.scale_factor;
        if self.allow_leverage {
            target.max(0.0)
        } else {
            target.clamp(0.0, 1.0)
        }
    }
}
