//! Dispatch Router - selects, invokes, scores and falls back across handlers
//!
//! Each task runs through an explicit state machine:
//!
//! ```text
//! Pending -> Invoking -> Scoring -> Accepted
//!                ^          |
//!                |          v
//!                +----- Retrying ----> Exhausted
//! ```
//!
//! Invocation is the only suspension point. It is bounded by the configured
//! timeout and races the task's cancel flag. Failed, timed-out and cancelled
//! invocations are scored 0 and never abort the dispatch on their own.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;

use super::fallback::{FallbackPolicy, NextHandler};
use super::registry::{HandlerRegistry, RegisteredHandler};
use super::scorer::ConfidenceScorer;
use crate::audit::AuditLog;
use crate::config::{Config, RetryConfig, RouterConfig};
use crate::core::{
    Attempt, CancelFlag, Decision, DispatchRecord, DispatchState, ExhaustionReason,
    HandlerDescriptor, HandlerResult, InvocationError, RouterError, Task,
};

pub struct DispatchRouter {
    registry: Arc<HandlerRegistry>,
    scorer: ConfidenceScorer,
    config: RouterConfig,
    retry: RetryConfig,
    audit: Option<Arc<AuditLog>>,
}

impl DispatchRouter {
    pub fn new(registry: Arc<HandlerRegistry>, config: &Config) -> Self {
        Self {
            registry,
            scorer: ConfidenceScorer::from_config(&config.router),
            config: config.router.clone(),
            retry: config.retry.clone(),
            audit: None,
        }
    }

    /// Router with default configuration
    pub fn with_defaults(registry: Arc<HandlerRegistry>) -> Self {
        Self::new(registry, &Config::default())
    }

    /// Append every finished record to `audit`
    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_accept_threshold(mut self, threshold: f64) -> Self {
        self.config.accept_threshold = threshold;
        self.scorer = ConfidenceScorer::from_config(&self.config);
        self
    }

    pub fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        self.config.invocation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<usize>) -> Self {
        self.config.max_attempts = max_attempts;
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn accept_threshold(&self) -> f64 {
        self.scorer.accept_threshold()
    }

    /// Route a task to completion
    ///
    /// Fails only when no handler serves the task's domain; every other
    /// outcome, including exhaustion, is reported through the record.
    pub async fn dispatch(&self, task: &Task) -> Result<DispatchRecord, RouterError> {
        self.dispatch_with_cancel(task, &CancelFlag::new()).await
    }

    /// Route a task, giving up early once `cancel` fires
    pub async fn dispatch_with_cancel(
        &self,
        task: &Task,
        cancel: &CancelFlag,
    ) -> Result<DispatchRecord, RouterError> {
        let candidates = self.registry.resolve(task.domain)?;
        let policy = FallbackPolicy::new(
            candidates.iter().map(|h| &h.descriptor).collect(),
            self.config.max_attempts.map(|n| n.max(1)),
        )
        .with_backoff(self.retry.clone());
        let threshold = self.scorer.accept_threshold();

        let mut record = DispatchRecord::open(task);
        tracing::debug!(
            "Dispatching task {} to {} ({} candidates, budget {})",
            task.id,
            task.domain,
            candidates.len(),
            policy.max_attempts()
        );

        let mut next = policy.first();
        while let Some(descriptor) = next.take() {
            let Some(entry) = candidates.iter().find(|h| h.descriptor.id == descriptor.id) else {
                break;
            };

            record.transition(DispatchState::Invoking);
            let started_at = Utc::now();
            let clock = Instant::now();
            let result = self.invoke(entry, task, cancel).await;
            let elapsed_ms = clock.elapsed().as_millis() as u64;

            record.transition(DispatchState::Scoring);
            let scored = self.scorer.score(result, &descriptor.contract);
            let decision = scored.decision;
            record.push_attempt(Attempt {
                descriptor: descriptor.clone(),
                scored,
                started_at,
                elapsed_ms,
            });

            if cancel.is_cancelled() {
                record.exhaust(ExhaustionReason::Cancelled);
                break;
            }
            if decision == Decision::Accept {
                record.accept();
                break;
            }

            match policy.next_handler(&record, threshold) {
                NextHandler::Next(fallback) => {
                    record.transition(DispatchState::Retrying);
                    tracing::debug!(
                        "Task {}: '{}' below threshold {:.2}, falling back to '{}'",
                        task.id,
                        descriptor.id,
                        threshold,
                        fallback.id
                    );
                    let delay = policy.delay_before(record.attempts.len());
                    if !delay.is_zero() && !self.backoff(delay, cancel).await {
                        record.exhaust(ExhaustionReason::Cancelled);
                        break;
                    }
                    next = Some(fallback);
                }
                NextHandler::Settled => {
                    record.accept();
                    break;
                }
                NextHandler::Exhausted(reason) => {
                    record.exhaust(reason);
                    break;
                }
            }
        }

        if !record.is_terminal() {
            record.exhaust(ExhaustionReason::CandidatesExhausted);
        }

        if record.is_accepted() {
            tracing::info!(
                "Task {} accepted from '{}' after {} attempt(s)",
                task.id,
                record.attempted_ids().last().copied().unwrap_or_default(),
                record.attempts.len()
            );
        } else {
            tracing::info!(
                "Task {} rejected after {} attempt(s): {:?}",
                task.id,
                record.attempts.len(),
                record.exhausted_by
            );
        }

        if let Some(audit) = &self.audit {
            audit.append(&record);
        }

        Ok(record)
    }

    /// Dispatch independent tasks concurrently
    pub async fn dispatch_all(&self, tasks: &[Task]) -> Vec<Result<DispatchRecord, RouterError>> {
        join_all(tasks.iter().map(|task| self.dispatch(task))).await
    }

    /// Invoke one handler, folding every failure mode into a result
    async fn invoke(
        &self,
        entry: &RegisteredHandler,
        task: &Task,
        cancel: &CancelFlag,
    ) -> HandlerResult {
        let id = entry.descriptor.id.as_str();
        let timeout = self.config.invocation_timeout();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(InvocationError::Cancelled),
            res = tokio::time::timeout(timeout, entry.handler.invoke(task)) => match res {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) => Err(InvocationError::failure(&e)),
                Err(_) => Err(InvocationError::Timeout { after: timeout }),
            },
        };

        match outcome {
            Ok(output) => HandlerResult::completed(id, output),
            Err(e) => {
                tracing::warn!("Handler '{}' on task {}: {}", id, task.id, e);
                HandlerResult::failed(id, e.status())
            }
        }
    }

    /// Sleep before a fallback; returns false if cancelled meanwhile
    async fn backoff(&self, delay: Duration, cancel: &CancelFlag) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// Descriptors a router would try for `task`, in fallback order
pub fn fallback_chain<'a>(
    registry: &'a HandlerRegistry,
    task: &Task,
) -> Result<Vec<&'a HandlerDescriptor>, RouterError> {
    Ok(registry
        .resolve(task.domain)?
        .into_iter()
        .map(|h| &h.descriptor)
        .collect())
}
