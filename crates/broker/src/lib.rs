pub mod backend;
pub mod client;
pub mod cloudevent;
pub mod config;
pub mod envelope;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod message;
pub mod publisher;
pub mod topology;

pub use backend::BrokerBackend;
pub use client::{BrokerAdmin, BrokerConsumer, BrokerProducer};
pub use cloudevent::{CloudEvent, to_cloudevent_headers};
pub use common::EventId;
pub use config::BrokerConfig;
pub use envelope::{EventEnvelope, decode_message};
pub use error::{BrokerError, Result};
pub use memory::{InMemoryAdmin, InMemoryBroker, InMemoryConsumer, InMemoryProducer};
pub use message::{BrokerMessage, HEADER_EVENT_TYPE, HEADER_TIMESTAMP, Headers, OutboundMessage};
pub use publisher::{EventPublisher, Publisher};
pub use topology::{TopicSpec, ensure_topics};
