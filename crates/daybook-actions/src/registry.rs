//! The action registry: name → handler, populated once at startup.

use crate::context::ActionContext;
use crate::error::ActionError;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// A registered action handler.
///
/// Handlers touch the database and the broadcast queue only through the
/// context they are given.
pub type Handler =
    Box<dyn Fn(&ActionContext<'_>, &Value) -> Result<Value, ActionError> + Send + Sync>;

/// Errors from registry construction.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate action registration: {0}")]
    Duplicate(String),
}

/// Maps action names to handlers.
///
/// Built once during startup, then shared immutably behind an `Arc` — no
/// ambient global lookup, and no registration after the dispatcher exists.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Handler>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, rejecting duplicates.
    pub fn register<F>(&mut self, name: &str, handler: F) -> Result<(), RegistryError>
    where
        F: Fn(&ActionContext<'_>, &Value) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        if self.handlers.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.handlers.insert(name.to_string(), Box::new(handler));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
