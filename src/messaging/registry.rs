use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::stream::Envelope;

// ============================================================================
// Handler Registry & Dispatch
// ============================================================================

/// A message handler for one topic. Handlers log their own failures and
/// never propagate them: a bad message must not stall the consumer loop or
/// block offset commits.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, envelope: &Envelope);
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Registering the same topic twice is a wiring bug caught at startup,
    /// not something to recover from by overwriting.
    #[error("a handler is already registered for topic {0}")]
    DuplicateHandler(String),
}

/// Topic -> handler table. Owned by exactly one consumer instance; it is
/// populated during startup and never mutated from outside the loop that
/// owns it. Instances must not share one registry without external
/// synchronization.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), RegistryError> {
        if self.handlers.contains_key(topic) {
            return Err(RegistryError::DuplicateHandler(topic.to_string()));
        }

        self.handlers.insert(topic.to_string(), handler);
        tracing::info!(topic, "registered message handler for topic");
        Ok(())
    }

    /// Invoke the handler registered for the envelope's topic. A topic
    /// without a handler is logged and the message dropped; the caller
    /// still commits the offset.
    pub async fn dispatch(&self, envelope: &Envelope) {
        match self.handlers.get(&envelope.topic) {
            Some(handler) => handler.handle(envelope).await,
            None => {
                tracing::error!(
                    topic = %envelope.topic,
                    key = %envelope.key,
                    "no handler registered for topic, dropping message"
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
