//! Named task handler registry
//!
//! Handlers register under a string kind and are resolved at lease
//! time. Routing (kind → queue) comes from the handler itself.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, TaskError};
use crate::task::TaskHandler;

/// Thread-safe kind → handler registry
#[derive(Default, Clone)]
pub struct TaskRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn TaskHandler>>>>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; replaces any previous handler of the kind
    pub fn register(&self, handler: Arc<dyn TaskHandler>) {
        self.handlers
            .write()
            .insert(handler.kind().to_string(), handler);
    }

    /// Resolve a handler by kind
    pub fn resolve(&self, kind: &str) -> Result<Arc<dyn TaskHandler>> {
        self.handlers
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| TaskError::UnknownKind(kind.to_string()))
    }

    /// All registered kinds, ascending
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }
}
