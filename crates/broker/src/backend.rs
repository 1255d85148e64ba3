use crate::{BrokerAdmin, BrokerConsumer, BrokerProducer, InMemoryBroker};

#[cfg(feature = "kafka")]
use crate::BrokerConfig;

/// The broker a process talks to, chosen at startup.
#[derive(Clone)]
pub enum BrokerBackend {
    Memory(InMemoryBroker),
    #[cfg(feature = "kafka")]
    Kafka(BrokerConfig),
}

impl BrokerBackend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            #[cfg(feature = "kafka")]
            Self::Kafka(_) => "kafka",
        }
    }

    pub fn admin(&self) -> Box<dyn BrokerAdmin> {
        match self {
            Self::Memory(broker) => Box::new(broker.admin()),
            #[cfg(feature = "kafka")]
            Self::Kafka(config) => Box::new(crate::kafka::KafkaAdmin::new(config.clone())),
        }
    }

    pub fn producer(&self) -> Box<dyn BrokerProducer> {
        match self {
            Self::Memory(broker) => Box::new(broker.producer()),
            #[cfg(feature = "kafka")]
            Self::Kafka(config) => Box::new(crate::kafka::KafkaProducer::new(config.clone())),
        }
    }

    /// A consumer joining `group_id`.
    pub fn consumer(&self, group_id: &str, from_beginning: bool) -> Box<dyn BrokerConsumer> {
        match self {
            Self::Memory(broker) => Box::new(broker.consumer(group_id, from_beginning)),
            #[cfg(feature = "kafka")]
            Self::Kafka(config) => Box::new(crate::kafka::KafkaConsumer::new(BrokerConfig {
                group_id: group_id.to_string(),
                from_beginning,
                ..config.clone()
            })),
        }
    }
}
