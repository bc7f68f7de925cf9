//! Domain error types
//!
//! These errors represent routing failures that are surfaced to the caller.
//! Per-attempt invocation errors are recovered inside the router and never
//! escape a dispatch; they only show up as failed results in the record.

use std::time::Duration;
use thiserror::Error;

use super::types::{Domain, InvocationStatus};

/// Errors surfaced by registration, configuration and dispatch
#[derive(Debug, Error)]
pub enum RouterError {
    /// A handler with this identifier is already registered
    #[error("Duplicate handler: {0}")]
    DuplicateHandler(String),

    /// No registered handler serves the requested domain
    #[error("No handler for domain: {0}")]
    NoHandlerForDomain(Domain),

    /// Descriptor is unusable (empty id, no domains, ...)
    #[error("Invalid descriptor '{id}': {reason}")]
    InvalidDescriptor { id: String, reason: String },

    /// Domain tag could not be parsed
    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    /// Configuration value out of range
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Errors from a single handler invocation
///
/// The router converts each of these into a zero-confidence result and moves
/// on to the next candidate.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// Handler returned an error
    #[error("Invocation failed: {0}")]
    Failure(String),

    /// Handler did not answer within the configured timeout
    #[error("Invocation timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    /// Task was cancelled while the handler was running
    #[error("Invocation cancelled")]
    Cancelled,
}

impl InvocationError {
    /// Wrap any handler error, keeping its full context chain
    pub fn failure(err: &anyhow::Error) -> Self {
        InvocationError::Failure(format!("{:#}", err))
    }

    /// Status recorded on the failed result
    pub fn status(&self) -> InvocationStatus {
        match self {
            InvocationError::Failure(msg) => InvocationStatus::Failed { error: msg.clone() },
            InvocationError::Timeout { after } => InvocationStatus::TimedOut {
                after_ms: after.as_millis() as u64,
            },
            InvocationError::Cancelled => InvocationStatus::Cancelled,
        }
    }
}
