//! Core domain modules
//!
//! Types, errors and traits shared by the orchestration layer, the audit log
//! and the CLI.

pub mod cancel;
pub mod errors;
pub mod traits;
pub mod types;

pub use cancel::CancelFlag;
pub use errors::{InvocationError, RouterError};
pub use traits::AgentHandler;
pub use types::*;
