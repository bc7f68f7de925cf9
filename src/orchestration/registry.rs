//! Handler Registry - maps agent identifiers to invocable capability descriptors
//!
//! Populated once at startup, then shared read-only (behind an `Arc`) by every
//! dispatch. Registration order is preserved and defines fallback order.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{AgentHandler, Domain, HandlerDescriptor, RouterError};

/// A descriptor paired with the handler that implements it
#[derive(Clone)]
pub struct RegisteredHandler {
    pub descriptor: HandlerDescriptor,
    pub handler: Arc<dyn AgentHandler>,
}

impl std::fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: Vec<RegisteredHandler>,
    index: HashMap<String, usize>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its descriptor's identifier
    pub fn register(
        &mut self,
        descriptor: HandlerDescriptor,
        handler: Arc<dyn AgentHandler>,
    ) -> Result<(), RouterError> {
        if descriptor.id.trim().is_empty() {
            return Err(RouterError::InvalidDescriptor {
                id: descriptor.id,
                reason: "identifier is empty".to_string(),
            });
        }
        if descriptor.domains.is_empty() {
            return Err(RouterError::InvalidDescriptor {
                id: descriptor.id,
                reason: "serves no domain".to_string(),
            });
        }
        if self.index.contains_key(&descriptor.id) {
            return Err(RouterError::DuplicateHandler(descriptor.id));
        }

        tracing::debug!(
            "Registered handler '{}' for {:?}",
            descriptor.id,
            descriptor.domains
        );
        self.index.insert(descriptor.id.clone(), self.handlers.len());
        self.handlers.push(RegisteredHandler {
            descriptor,
            handler,
        });
        Ok(())
    }

    /// Handlers serving `domain`, in registration order
    pub fn resolve(&self, domain: Domain) -> Result<Vec<&RegisteredHandler>, RouterError> {
        let matches: Vec<&RegisteredHandler> = self
            .handlers
            .iter()
            .filter(|h| h.descriptor.serves(domain))
            .collect();
        if matches.is_empty() {
            return Err(RouterError::NoHandlerForDomain(domain));
        }
        Ok(matches)
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredHandler> {
        self.index.get(id).map(|&i| &self.handlers[i])
    }

    /// All descriptors in registration order
    pub fn descriptors(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.handlers.iter().map(|h| &h.descriptor)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
