//! Registry mapping task kinds to their handlers.

use super::TaskHandler;
use crate::task::domain::TaskKind;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error returned when no handler serves a kind.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("no handler registered for {0} tasks")]
pub struct MissingHandler(pub TaskKind);

/// Kind-indexed set of task handlers.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its own kind, returning the handler it
    /// replaced.
    pub fn register<H>(&mut self, handler: H) -> Option<Arc<dyn TaskHandler>>
    where
        H: TaskHandler + 'static,
    {
        self.register_shared(Arc::new(handler))
    }

    /// Registers an already shared handler.
    pub fn register_shared(
        &mut self,
        handler: Arc<dyn TaskHandler>,
    ) -> Option<Arc<dyn TaskHandler>> {
        let kind = handler.kind();
        tracing::debug!(%kind, "registered task handler");
        self.handlers.insert(kind, handler)
    }

    /// Returns the handler serving `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`MissingHandler`] when nothing is registered for the kind.
    pub fn get(&self, kind: TaskKind) -> Result<Arc<dyn TaskHandler>, MissingHandler> {
        self.handlers
            .get(&kind)
            .cloned()
            .ok_or(MissingHandler(kind))
    }

    /// Returns the registered kinds in [`TaskKind::ALL`] order.
    #[must_use]
    pub fn kinds(&self) -> Vec<TaskKind> {
        TaskKind::ALL
            .into_iter()
            .filter(|kind| self.handlers.contains_key(kind))
            .collect()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
