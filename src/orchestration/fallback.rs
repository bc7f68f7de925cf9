//! Fallback Policy - orders alternate handlers and decides when to stop
//!
//! The candidate chain is the registry's resolution for the task's domain,
//! in registration order. A handler appears in a record at most once.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::core::{DispatchRecord, ExhaustionReason, HandlerDescriptor};

/// Answer of the fallback policy for a record
#[derive(Debug, Clone, PartialEq)]
pub enum NextHandler<'a> {
    /// Try this handler next
    Next(&'a HandlerDescriptor),
    /// Latest attempt already meets the threshold
    Settled,
    /// Nothing left to try
    Exhausted(ExhaustionReason),
}

#[derive(Debug, Clone)]
pub struct FallbackPolicy<'a> {
    candidates: Vec<&'a HandlerDescriptor>,
    max_attempts: usize,
    backoff: RetryConfig,
}

impl<'a> FallbackPolicy<'a> {
    /// Policy over `candidates`; the budget defaults to one attempt per candidate
    pub fn new(candidates: Vec<&'a HandlerDescriptor>, max_attempts: Option<usize>) -> Self {
        let max_attempts = max_attempts.unwrap_or(candidates.len());
        Self {
            candidates,
            max_attempts,
            backoff: RetryConfig::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: RetryConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// First handler to invoke for a fresh record
    pub fn first(&self) -> Option<&'a HandlerDescriptor> {
        if self.max_attempts == 0 {
            return None;
        }
        self.candidates.first().copied()
    }

    /// Pick the handler to try after the record's latest attempt
    pub fn next_handler(&self, record: &DispatchRecord, accept_threshold: f64) -> NextHandler<'a> {
        let Some(last) = record.last_attempt() else {
            return match self.first() {
                Some(first) => NextHandler::Next(first),
                None => NextHandler::Exhausted(ExhaustionReason::BudgetReached),
            };
        };

        if last.result().status.is_completed() && last.scored.confidence >= accept_threshold {
            return NextHandler::Settled;
        }

        let untried = self
            .candidates
            .iter()
            .copied()
            .find(|c| !record.has_attempted(&c.id));
        match untried {
            None => NextHandler::Exhausted(ExhaustionReason::CandidatesExhausted),
            Some(_) if record.attempts.len() >= self.max_attempts => {
                NextHandler::Exhausted(ExhaustionReason::BudgetReached)
            }
            Some(next) => NextHandler::Next(next),
        }
    }

    /// Delay before the fallback that follows `attempts` completed attempts
    pub fn delay_before(&self, attempts: usize) -> Duration {
        self.backoff.calculate_delay(attempts.saturating_sub(1))
    }
}
