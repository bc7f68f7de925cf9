//! innovator-router: confidence-based dispatch of creative tasks to agents
//!
//! This library provides:
//! - A handler registry mapping task domains to agent capabilities
//! - Confidence scoring of handler results with accept/retry decisions
//! - Fallback across candidate handlers under an attempt budget
//! - A dispatch router state machine with timeouts and cancellation
//! - Stage routing through the Planner, Director, execution and Render agents
//! - A JSONL audit log of finished dispatches

pub mod agents;
pub mod audit;
pub mod config;
pub mod core;
pub mod orchestration;
pub mod transport;

pub use audit::AuditLog;
pub use config::Config;
pub use core::{
    AgentHandler, CancelFlag, DispatchOutcome, DispatchRecord, Domain, HandlerDescriptor,
    HandlerOutput, RouterError, Task,
};
pub use orchestration::{AgentPipeline, DispatchRouter, HandlerRegistry, StageRouter};
