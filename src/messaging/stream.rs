use std::time::Duration;

use async_trait::async_trait;

// ============================================================================
// Stream Collaborator Seam
// ============================================================================

/// One unit of stream data: routing key, topic, payload, and the commit
/// token (partition + offset) needed to acknowledge it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub key: String,
    pub topic: String,
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The bounded poll expired without a message. Not a failure; the
    /// consumer loop uses it as its latency signal.
    #[error("poll timed out")]
    Timeout,

    #[error(transparent)]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("failed to commit offset {offset} for {topic}/{partition}: {source}")]
    Commit {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: rdkafka::error::KafkaError,
    },
}

impl StreamError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StreamError::Timeout)
    }
}

/// The stream source consumed by the batch consumer. Mirrors what the
/// consumer actually needs from a broker client, so tests can script one.
#[async_trait]
pub trait MessageStream: Send + Sync {
    async fn subscribe(&self, topics: &[&str]) -> Result<(), StreamError>;

    /// Wait up to `timeout` for the next message.
    async fn poll(&self, timeout: Duration) -> Result<Envelope, StreamError>;

    /// Mark the envelope as consumed. Called only after the envelope was
    /// dispatched to its handler.
    async fn commit(&self, envelope: &Envelope) -> Result<(), StreamError>;
}
