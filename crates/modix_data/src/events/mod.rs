//! Moderation action observers.
//!
//! # Responsibility
//! - Define the single capability a subsystem implements to react to new
//!   moderation actions.
//! - Fan a notification out to every registered observer.
//!
//! # Invariants
//! - Observers run one at a time, in registration order.
//! - The first failing observer stops the fan-out; later observers are not
//!   invoked.
//! - No timeout is applied; callers needing a deadline wrap `notify`.

use async_trait::async_trait;
use log::{debug, error};
use std::error::Error;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::model::moderation::ModerationActionCreationData;

/// Error type observers report.
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// Receives notifications about newly created moderation actions.
#[async_trait]
pub trait ModerationActionEventHandler: Send + Sync {
    /// Short name used in logs and in [`NotifyError`].
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn on_moderation_action_created(
        &self,
        moderation_action_id: i64,
        data: &ModerationActionCreationData,
    ) -> Result<(), HandlerError>;
}

/// An observer failed while being notified.
#[derive(Debug, Error)]
#[error("handler `{handler}` (position {position}) failed: {source}")]
pub struct NotifyError {
    pub handler: String,
    /// Zero-based registration index of the failing handler.
    pub position: usize,
    #[source]
    pub source: HandlerError,
}

/// Ordered set of moderation action observers, fixed at wiring time.
#[derive(Clone, Default)]
pub struct ModerationActionEventHandlers {
    handlers: Vec<Arc<dyn ModerationActionEventHandler>>,
}

impl ModerationActionEventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one observer; it runs after every observer registered before it.
    pub fn register(&mut self, handler: Arc<dyn ModerationActionEventHandler>) {
        self.handlers.push(handler);
    }

    /// Builder-style [`Self::register`].
    pub fn with(mut self, handler: Arc<dyn ModerationActionEventHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handler names in registration order.
    pub fn handler_names(&self) -> Vec<String> {
        self.handlers
            .iter()
            .map(|handler| handler.name().to_string())
            .collect()
    }

    /// Invokes every observer sequentially, awaiting each before the next.
    pub async fn notify(
        &self,
        moderation_action_id: i64,
        data: &ModerationActionCreationData,
    ) -> Result<(), NotifyError> {
        for (position, handler) in self.handlers.iter().enumerate() {
            let started_at = Instant::now();
            if let Err(source) = handler
                .on_moderation_action_created(moderation_action_id, data)
                .await
            {
                error!(
                    "event=moderation_action_notify module=events status=error action_id={} handler={} position={} duration_ms={} error={}",
                    moderation_action_id,
                    handler.name(),
                    position,
                    started_at.elapsed().as_millis(),
                    source
                );
                return Err(NotifyError {
                    handler: handler.name().to_string(),
                    position,
                    source,
                });
            }
            debug!(
                "event=moderation_action_notify module=events status=ok action_id={} handler={} duration_ms={}",
                moderation_action_id,
                handler.name(),
                started_at.elapsed().as_millis()
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for ModerationActionEventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModerationActionEventHandlers")
            .field("handlers", &self.handler_names())
            .finish()
    }
}
