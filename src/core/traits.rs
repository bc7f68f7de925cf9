//! Core traits for the dispatch layer
//!
//! The router depends only on these interfaces, so real model-serving
//! collaborators and test doubles plug in the same way.

use anyhow::Result;
use async_trait::async_trait;

use super::types::{HandlerOutput, Task};

/// An external agent capability that can attempt a task
///
/// How the handler reasons (prompt content, model choice, skills) is opaque
/// to the router. Returning `Err` marks the attempt as failed; the router
/// scores it 0 and falls back to the next candidate.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// Attempt the task
    async fn invoke(&self, task: &Task) -> Result<HandlerOutput>;
}

#[async_trait]
impl<F> AgentHandler for F
where
    F: Fn(&Task) -> Result<HandlerOutput> + Send + Sync,
{
    async fn invoke(&self, task: &Task) -> Result<HandlerOutput> {
        self(task)
    }
}
