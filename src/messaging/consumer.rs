use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::registry::HandlerRegistry;
use super::stream::{Envelope, MessageStream, StreamError};
use crate::metrics::Metrics;

// ============================================================================
// Batch Consumer - poll / buffer / flush loop
// ============================================================================
//
// One cooperative loop per consumer instance. Polling, buffering and
// flushing are strictly sequential within the loop: no concurrent flushes,
// no concurrent handler invocations. Scaling out means running more
// instances against more partitions, not adding parallelism here.
//
// ============================================================================

/// Flush after this many buffered events regardless of timing.
pub const BATCH_SIZE: usize = 5;

/// Bound on a single poll; an expiry with a non-empty buffer triggers a
/// flush so low traffic still gets a latency bound.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

pub struct BatchConsumer<S: MessageStream> {
    stream: S,
    registry: HandlerRegistry,
    metrics: Arc<Metrics>,
    /// Buffered envelopes grouped by key; order within a key is arrival
    /// order. Replaced wholesale on every flush.
    buffer: HashMap<String, Vec<Envelope>>,
    event_count: usize,
    instance_id: Uuid,
}

impl<S: MessageStream> BatchConsumer<S> {
    pub fn new(stream: S, registry: HandlerRegistry, metrics: Arc<Metrics>) -> Self {
        Self {
            stream,
            registry,
            metrics,
            buffer: HashMap::new(),
            event_count: 0,
            instance_id: Uuid::new_v4(),
        }
    }

    /// Subscribe and consume until the token is cancelled.
    ///
    /// Cancellation is observed only at the top of the loop, so an
    /// in-flight poll or flush always runs to completion first; a non-empty
    /// buffer gets one final flush before the loop exits.
    pub async fn run(
        &mut self,
        shutdown: CancellationToken,
        topics: &[&str],
    ) -> Result<(), StreamError> {
        self.stream.subscribe(topics).await?;
        tracing::info!(
            consumer_instance = %self.instance_id,
            ?topics,
            "successfully subscribed to topics"
        );

        loop {
            if shutdown.is_cancelled() {
                if self.event_count > 0 {
                    tracing::info!(
                        consumer_instance = %self.instance_id,
                        "processing last batch before shutdown"
                    );
                    self.flush().await;
                }
                break;
            }

            match self.stream.poll(POLL_TIMEOUT).await {
                Ok(envelope) => {
                    self.metrics.events_consumed.inc();
                    self.buffer
                        .entry(envelope.key.clone())
                        .or_default()
                        .push(envelope);
                    self.event_count += 1;

                    if self.event_count % BATCH_SIZE == 0 {
                        self.flush().await;
                    }
                }
                Err(StreamError::Timeout) => {
                    // Do not wait for BATCH_SIZE under low traffic.
                    if self.event_count > 0 {
                        self.flush().await;
                    }
                }
                Err(err) => {
                    // Poll errors are informational; the loop carries on.
                    tracing::warn!(
                        consumer_instance = %self.instance_id,
                        error = %err,
                        "error while polling stream"
                    );
                }
            }
        }

        tracing::info!(consumer_instance = %self.instance_id, "consumer stopped");
        Ok(())
    }

    /// Drain the buffer through handler dispatch, committing each offset
    /// after its handler invocation returns. Takes ownership of the buffer
    /// up front so nothing can observe it half-drained.
    async fn flush(&mut self) {
        let batch = std::mem::take(&mut self.buffer);
        let batch_count = self.event_count;
        self.event_count = 0;

        let batch_id = Uuid::new_v4();
        tracing::info!(
            consumer_instance = %self.instance_id,
            batch_id = %batch_id,
            batch_count,
            "processing new message batch"
        );

        for envelopes in batch.into_values() {
            for envelope in envelopes {
                self.registry.dispatch(&envelope).await;

                if let Err(err) = self.stream.commit(&envelope).await {
                    tracing::error!(
                        batch_id = %batch_id,
                        topic = %envelope.topic,
                        partition = envelope.partition,
                        offset = envelope.offset,
                        error = %err,
                        "failed to commit offset"
                    );
                }
            }
        }

        self.metrics.batches_flushed.inc();
    }

    #[cfg(test)]
    fn buffered_event_count(&self) -> usize {
        self.event_count
    }

    #[cfg(test)]
    fn buffer_is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rdkafka::error::KafkaError;
    use rdkafka::types::RDKafkaErrorCode;

    use super::*;
    use crate::db::{MemoryOrderStore, OrderStore};
    use crate::domain::order::OrderStatus;
    use crate::messaging::checkout::{CheckoutHandler, CHECKOUT_STATUS_TOPIC};
    use crate::messaging::registry::MessageHandler;

    /// One scripted poll outcome.
    enum Step {
        Deliver(Envelope),
        Timeout,
        /// Cancel the consumer's token, then fail the poll with a broker
        /// error. The loop logs it, continues, and observes the
        /// cancellation at the top of the next iteration.
        CancelThenFail(CancellationToken),
    }

    struct ScriptedStream {
        steps: Mutex<VecDeque<Step>>,
        committed: Mutex<Vec<(String, i64)>>,
    }

    impl ScriptedStream {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                committed: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl MessageStream for Arc<ScriptedStream> {
        async fn subscribe(&self, _topics: &[&str]) -> Result<(), StreamError> {
            Ok(())
        }

        async fn poll(&self, _timeout: Duration) -> Result<Envelope, StreamError> {
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Deliver(envelope)) => Ok(envelope),
                Some(Step::Timeout) | None => Err(StreamError::Timeout),
                Some(Step::CancelThenFail(token)) => {
                    token.cancel();
                    Err(StreamError::Kafka(KafkaError::MessageConsumption(
                        RDKafkaErrorCode::UnknownTopicOrPartition,
                    )))
                }
            }
        }

        async fn commit(&self, envelope: &Envelope) -> Result<(), StreamError> {
            self.committed
                .lock()
                .unwrap()
                .push((envelope.topic.clone(), envelope.offset));
            Ok(())
        }
    }

    struct CountingHandler {
        handled: Mutex<Vec<Envelope>>,
    }

    impl CountingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                handled: Mutex::new(Vec::new()),
            })
        }

        fn handled_count(&self) -> usize {
            self.handled.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        async fn handle(&self, envelope: &Envelope) {
            self.handled.lock().unwrap().push(envelope.clone());
        }
    }

    fn envelope(topic: &str, key: &str, offset: i64, payload: &str) -> Envelope {
        Envelope {
            key: key.to_string(),
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
            partition: 0,
            offset,
        }
    }

    fn registry_with(topic: &str, handler: Arc<dyn MessageHandler>) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register(topic, handler).unwrap();
        registry
    }

    #[tokio::test]
    async fn test_reaching_batch_size_triggers_one_flush() {
        let shutdown = CancellationToken::new();
        let keys = ["a", "b", "a", "c", "b"];
        let mut steps: Vec<Step> = keys
            .iter()
            .enumerate()
            .map(|(i, key)| Step::Deliver(envelope("test-topic", key, i as i64, "{}")))
            .collect();
        steps.push(Step::CancelThenFail(shutdown.clone()));

        let stream = ScriptedStream::new(steps);
        let handler = CountingHandler::new();
        let metrics = Arc::new(Metrics::new().unwrap());
        let mut consumer = BatchConsumer::new(
            stream.clone(),
            registry_with("test-topic", handler.clone()),
            metrics.clone(),
        );

        consumer.run(shutdown, &["test-topic"]).await.unwrap();

        assert_eq!(handler.handled_count(), 5);
        assert_eq!(stream.committed.lock().unwrap().len(), 5);
        // the size-triggered flush emptied everything, so shutdown had
        // nothing left to flush
        assert_eq!(metrics.batches_flushed.get(), 1);
        assert!(consumer.buffer_is_empty());
        assert_eq!(consumer.buffered_event_count(), 0);
    }

    #[tokio::test]
    async fn test_poll_timeout_flushes_non_empty_buffer() {
        let shutdown = CancellationToken::new();
        let stream = ScriptedStream::new(vec![
            Step::Deliver(envelope("test-topic", "a", 0, "{}")),
            Step::Timeout,
            Step::CancelThenFail(shutdown.clone()),
        ]);
        let handler = CountingHandler::new();
        let metrics = Arc::new(Metrics::new().unwrap());
        let mut consumer = BatchConsumer::new(
            stream.clone(),
            registry_with("test-topic", handler.clone()),
            metrics.clone(),
        );

        consumer.run(shutdown, &["test-topic"]).await.unwrap();

        assert_eq!(handler.handled_count(), 1);
        assert_eq!(stream.committed.lock().unwrap().len(), 1);
        assert_eq!(metrics.batches_flushed.get(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_flushes_remaining_buffer_once() {
        let shutdown = CancellationToken::new();
        let stream = ScriptedStream::new(vec![
            Step::Deliver(envelope("test-topic", "a", 0, "{}")),
            Step::Deliver(envelope("test-topic", "b", 1, "{}")),
            Step::CancelThenFail(shutdown.clone()),
        ]);
        let handler = CountingHandler::new();
        let metrics = Arc::new(Metrics::new().unwrap());
        let mut consumer = BatchConsumer::new(
            stream.clone(),
            registry_with("test-topic", handler.clone()),
            metrics.clone(),
        );

        consumer.run(shutdown, &["test-topic"]).await.unwrap();

        // the failed poll did not flush; the shutdown path did, exactly once
        assert_eq!(handler.handled_count(), 2);
        assert_eq!(stream.committed.lock().unwrap().len(), 2);
        assert_eq!(metrics.batches_flushed.get(), 1);
        assert!(consumer.buffer_is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_with_empty_buffer_skips_flush() {
        let shutdown = CancellationToken::new();
        let stream = ScriptedStream::new(vec![Step::CancelThenFail(shutdown.clone())]);
        let handler = CountingHandler::new();
        let metrics = Arc::new(Metrics::new().unwrap());
        let mut consumer = BatchConsumer::new(
            stream.clone(),
            registry_with("test-topic", handler.clone()),
            metrics.clone(),
        );

        consumer.run(shutdown, &["test-topic"]).await.unwrap();

        assert_eq!(handler.handled_count(), 0);
        assert!(stream.committed.lock().unwrap().is_empty());
        assert_eq!(metrics.batches_flushed.get(), 0);
    }

    #[tokio::test]
    async fn test_unknown_topic_still_commits_offset() {
        let shutdown = CancellationToken::new();
        let stream = ScriptedStream::new(vec![
            Step::Deliver(envelope("mystery-topic", "a", 7, "{}")),
            Step::Timeout,
            Step::CancelThenFail(shutdown.clone()),
        ]);
        let handler = CountingHandler::new();
        let metrics = Arc::new(Metrics::new().unwrap());
        let mut consumer = BatchConsumer::new(
            stream.clone(),
            registry_with("test-topic", handler.clone()),
            metrics.clone(),
        );

        consumer.run(shutdown, &["test-topic"]).await.unwrap();

        assert_eq!(handler.handled_count(), 0);
        assert_eq!(
            *stream.committed.lock().unwrap(),
            vec![("mystery-topic".to_string(), 7)]
        );
    }

    #[tokio::test]
    async fn test_checkout_event_end_to_end_with_idempotent_replay() {
        let store = Arc::new(MemoryOrderStore::new());
        let order = store.seed_order(
            "user-42",
            rust_decimal::Decimal::new(9900, 2),
            OrderStatus::PendingPayment,
        );

        let payload = format!(r#"{{"OrderId":"{}","Status":"finalized"}}"#, order.id);
        let shutdown = CancellationToken::new();
        let stream = ScriptedStream::new(vec![
            Step::Deliver(envelope(CHECKOUT_STATUS_TOPIC, "42", 0, &payload)),
            Step::Timeout,
            // replay of the same event after the first flush
            Step::Deliver(envelope(CHECKOUT_STATUS_TOPIC, "42", 1, &payload)),
            Step::Timeout,
            Step::CancelThenFail(shutdown.clone()),
        ]);

        let metrics = Arc::new(Metrics::new().unwrap());
        let handler = Arc::new(CheckoutHandler::new(store.clone(), metrics.clone()));
        let mut consumer = BatchConsumer::new(
            stream.clone(),
            registry_with(CHECKOUT_STATUS_TOPIC, handler),
            metrics.clone(),
        );

        consumer
            .run(shutdown, &[CHECKOUT_STATUS_TOPIC])
            .await
            .unwrap();

        let updated = store.get_order(order.id).await.unwrap();
        assert_eq!(updated.status, OrderStatus::AwaitingFulfillment);
        // the replay was a no-op: offsets committed for both deliveries,
        // storage written once
        assert_eq!(stream.committed.lock().unwrap().len(), 2);
        assert_eq!(store.status_write_count(), 1);
    }
}
