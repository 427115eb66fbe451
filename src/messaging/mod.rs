// ============================================================================
// Messaging - Batching Stream Consumer
// ============================================================================
//
// Everything between the Kafka wire and the domain handlers:
// - stream:   Envelope + the MessageStream collaborator seam
// - kafka:    MessageStream over an rdkafka StreamConsumer
// - registry: topic -> handler table owned by one consumer instance
// - consumer: the poll/buffer/flush loop
// - checkout: handler for checkout status events
//
// ============================================================================

pub mod checkout;
pub mod consumer;
pub mod kafka;
pub mod registry;
pub mod stream;

pub use checkout::{CheckoutHandler, CHECKOUT_STATUS_TOPIC};
pub use consumer::BatchConsumer;
pub use kafka::KafkaMessageStream;
pub use registry::{HandlerRegistry, MessageHandler, RegistryError};
pub use stream::{Envelope, MessageStream, StreamError};
