use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::{Message, Offset, TopicPartitionList};

use super::stream::{Envelope, MessageStream, StreamError};

// ============================================================================
// Kafka Message Stream
// ============================================================================

pub const CONSUMER_GROUP_ID: &str = "order-service";
pub const AUTO_OFFSET_RESET: &str = "earliest";

pub struct KafkaMessageStream {
    consumer: StreamConsumer,
}

impl KafkaMessageStream {
    pub fn new(brokers: &str) -> Result<Self, StreamError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", CONSUMER_GROUP_ID)
            .set("auto.offset.reset", AUTO_OFFSET_RESET)
            // offsets are committed manually, after a batch is handled
            .set("enable.auto.commit", "false")
            .create()?;

        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageStream for KafkaMessageStream {
    async fn subscribe(&self, topics: &[&str]) -> Result<(), StreamError> {
        self.consumer.subscribe(topics)?;
        Ok(())
    }

    async fn poll(&self, timeout: Duration) -> Result<Envelope, StreamError> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Err(StreamError::Timeout),
            Ok(Err(err)) => Err(err.into()),
            Ok(Ok(message)) => Ok(Envelope {
                key: message
                    .key()
                    .map(|key| String::from_utf8_lossy(key).into_owned())
                    .unwrap_or_default(),
                topic: message.topic().to_string(),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                partition: message.partition(),
                offset: message.offset(),
            }),
        }
    }

    async fn commit(&self, envelope: &Envelope) -> Result<(), StreamError> {
        let commit_error = |source| StreamError::Commit {
            topic: envelope.topic.clone(),
            partition: envelope.partition,
            offset: envelope.offset,
            source,
        };

        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &envelope.topic,
                envelope.partition,
                // the committed offset is the NEXT offset to read
                Offset::Offset(envelope.offset + 1),
            )
            .map_err(commit_error)?;

        self.consumer
            .commit(&offsets, CommitMode::Sync)
            .map_err(commit_error)
    }
}
