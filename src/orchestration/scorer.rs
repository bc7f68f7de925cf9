//! Confidence Scorer - turns handler results into normalized, decided scores
//!
//! Scoring never fails. A usable raw signal goes through the configured
//! monotonic mapping; anything else falls back to a completeness heuristic
//! over the handler's declared output fields.

use serde_json::Value;

use crate::config::{RouterConfig, SignalMapping};
use crate::core::{ConfidenceSignal, Decision, HandlerResult, InvocationContract, ScoredResult};

/// Score given to results with no signal and nothing to check them against
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    accept_threshold: f64,
    mapping: SignalMapping,
    logistic_midpoint: f64,
    logistic_steepness: f64,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

impl ConfidenceScorer {
    pub fn new(accept_threshold: f64) -> Self {
        Self {
            accept_threshold,
            ..Self::default()
        }
    }

    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            accept_threshold: config.accept_threshold,
            mapping: config.signal_mapping,
            logistic_midpoint: config.logistic_midpoint,
            logistic_steepness: config.logistic_steepness,
        }
    }

    pub fn with_mapping(mut self, mapping: SignalMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn accept_threshold(&self) -> f64 {
        self.accept_threshold
    }

    /// Score a result against the contract of the handler that produced it
    pub fn score(&self, result: HandlerResult, contract: &InvocationContract) -> ScoredResult {
        let completed = result.status.is_completed();
        let confidence = if !completed {
            0.0
        } else {
            match result.signal {
                ConfidenceSignal::Raw(raw) if raw.is_finite() => self.normalize(raw),
                _ => completeness(&result.content, contract),
            }
        };

        // Results that never completed are not accepted, even at threshold 0
        let decision = if completed && confidence >= self.accept_threshold {
            Decision::Accept
        } else {
            Decision::Retry
        };

        tracing::debug!(
            "Scored result from '{}': {:.3} ({:?})",
            result.handler_id,
            confidence,
            decision
        );

        ScoredResult {
            result,
            confidence,
            decision,
        }
    }

    /// Map a finite raw signal into [0, 1]
    pub fn normalize(&self, raw: f64) -> f64 {
        let mapped = match self.mapping {
            SignalMapping::Clamp => raw,
            SignalMapping::Percent => raw / 100.0,
            SignalMapping::Logistic => {
                1.0 / (1.0 + (-self.logistic_steepness * (raw - self.logistic_midpoint)).exp())
            }
        };
        mapped.clamp(0.0, 1.0)
    }
}

/// Fraction of required output fields present and non-null
fn completeness(content: &Value, contract: &InvocationContract) -> f64 {
    let required = contract.required_output_fields();
    if required.is_empty() {
        return NEUTRAL_CONFIDENCE;
    }
    let Some(object) = content.as_object() else {
        return NEUTRAL_CONFIDENCE;
    };
    let present = required
        .iter()
        .filter(|field| object.get(**field).is_some_and(|v| !v.is_null()))
        .count();
    present as f64 / required.len() as f64
}
