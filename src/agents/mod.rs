//! Built-in offline agents
//!
//! Deterministic handlers for every domain so the router, the pipeline and
//! the CLI run without a model-serving backend.

pub mod keyword;

pub use keyword::{IntentScoreFn, KeywordHandler};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::core::{
    AgentHandler, Domain, HandlerDescriptor, HandlerOutput, InvocationContract, RouterError, Task,
};
use crate::orchestration::{HandlerRegistry, StageRouter};

/// Fields every stage handler must produce
const STAGE_OUTPUT_FIELDS: [&str; 2] = ["stage", "summary"];

/// Pass-through handler for the planner, director and render stages
///
/// Reports no confidence, so results are judged by output completeness.
#[derive(Debug, Clone)]
pub struct StageHandler {
    domain: Domain,
}

impl StageHandler {
    pub fn new(domain: Domain) -> Self {
        Self { domain }
    }

    pub fn contract() -> InvocationContract {
        InvocationContract::requiring(STAGE_OUTPUT_FIELDS)
    }
}

#[async_trait]
impl AgentHandler for StageHandler {
    async fn invoke(&self, task: &Task) -> Result<HandlerOutput> {
        let prior = task
            .context
            .as_ref()
            .map(|c| c.prior_outputs.len())
            .unwrap_or(0);
        Ok(HandlerOutput::unscored(json!({
            "stage": self.domain,
            "summary": format!("{} pass over: {}", self.domain.label(), task.description),
            "prior_outputs": prior,
        })))
    }
}

/// Registry holding one built-in handler per domain plus a generalist fallback
/// for each execution domain
pub fn builtin_registry() -> Result<HandlerRegistry, RouterError> {
    let mut registry = HandlerRegistry::new();

    for domain in [Domain::Planner, Domain::Director] {
        registry.register(stage_descriptor(domain), Arc::new(StageHandler::new(domain)))?;
    }

    for domain in Domain::EXECUTION {
        if let Some(handler) = KeywordHandler::for_domain(domain) {
            let descriptor = HandlerDescriptor::new(domain.as_str(), [domain])
                .with_description(handler.reason());
            registry.register(descriptor, Arc::new(handler))?;
        }
    }

    registry.register(
        HandlerDescriptor::new("generalist", Domain::EXECUTION)
            .with_description("Matches keywords from every execution domain"),
        Arc::new(KeywordHandler::generalist()),
    )?;

    registry.register(
        stage_descriptor(Domain::Render),
        Arc::new(StageHandler::new(Domain::Render)),
    )?;

    Ok(registry)
}

/// Stage router consulting the keyword scorer of every execution domain
pub fn builtin_stage_router(config: &PipelineConfig) -> StageRouter {
    let mut router = StageRouter::new(config.intent_threshold, config.fallback_stage);
    for domain in Domain::EXECUTION {
        if let Some(handler) = KeywordHandler::for_domain(domain) {
            router.register_scorer(domain, handler.intent_fn());
        }
    }
    router
}

fn stage_descriptor(domain: Domain) -> HandlerDescriptor {
    HandlerDescriptor::new(domain.as_str(), [domain])
        .with_contract(StageHandler::contract())
        .with_description(format!("{} stage", domain.label()))
}
