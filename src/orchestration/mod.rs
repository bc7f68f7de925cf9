//! Agent Orchestration - registry, scoring, fallback and dispatch

pub mod agent_router;
pub mod fallback;
pub mod pipeline;
pub mod registry;
pub mod scorer;

pub use agent_router::{fallback_chain, DispatchRouter};
pub use fallback::{FallbackPolicy, NextHandler};
pub use pipeline::{
    AgentPipeline, PipelineRun, PipelineStatus, ReviewVerdict, RoutingDecision, Stage, StageRouter,
};
pub use registry::{HandlerRegistry, RegisteredHandler};
pub use scorer::ConfidenceScorer;
