//! Kafka-backed broker clients (`kafka` feature).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, Headers as _, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    BrokerAdmin, BrokerConfig, BrokerConsumer, BrokerError, BrokerMessage, BrokerProducer, Headers,
    OutboundMessage, Result, TopicSpec,
};

const LEADER_POLL_INTERVAL: Duration = Duration::from_millis(200);
const LEADER_POLL_ATTEMPTS: usize = 50;

fn client_config(config: &BrokerConfig, role: &str) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", config.bootstrap_servers())
        .set("client.id", format!("{}-{role}", config.client_id));
    client
}

fn transport(e: KafkaError) -> BrokerError {
    BrokerError::Transport(e.to_string())
}

/// Fetches cluster metadata off the async runtime; librdkafka blocks here.
async fn topic_metadata(
    client: Arc<AdminClient<DefaultClientContext>>,
    timeout: Duration,
) -> Result<Vec<(String, Vec<i32>)>> {
    tokio::task::spawn_blocking(move || {
        let metadata = client
            .inner()
            .fetch_metadata(None, Timeout::After(timeout))
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        Ok(metadata
            .topics()
            .iter()
            .map(|t| {
                let leaders = t.partitions().iter().map(|p| p.leader()).collect();
                (t.name().to_string(), leaders)
            })
            .collect())
    })
    .await
    .map_err(|e| BrokerError::Transport(e.to_string()))?
}

/// Topic administration over the Kafka admin API.
pub struct KafkaAdmin {
    config: BrokerConfig,
    client: RwLock<Option<Arc<AdminClient<DefaultClientContext>>>>,
}

impl KafkaAdmin {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
        }
    }

    async fn current(&self) -> Result<Arc<AdminClient<DefaultClientContext>>> {
        self.client
            .read()
            .await
            .clone()
            .ok_or(BrokerError::NotConnected)
    }

    async fn wait_for_leaders(
        &self,
        client: Arc<AdminClient<DefaultClientContext>>,
        names: &[&str],
    ) -> Result<()> {
        for _ in 0..LEADER_POLL_ATTEMPTS {
            let metadata = topic_metadata(client.clone(), self.config.request_timeout).await?;
            let ready = names.iter().all(|name| {
                metadata.iter().any(|(topic, leaders)| {
                    topic.as_str() == *name && !leaders.is_empty() && leaders.iter().all(|l| *l >= 0)
                })
            });
            if ready {
                return Ok(());
            }
            tokio::time::sleep(LEADER_POLL_INTERVAL).await;
        }
        Err(BrokerError::Unavailable(format!(
            "partition leaders not elected for {names:?}"
        )))
    }
}

#[async_trait]
impl BrokerAdmin for KafkaAdmin {
    async fn connect(&self) -> Result<()> {
        let client: AdminClient<DefaultClientContext> = client_config(&self.config, "admin")
            .create()
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        let client = Arc::new(client);

        // Creation is lazy in librdkafka; a metadata round trip proves reachability.
        topic_metadata(client.clone(), self.config.request_timeout).await?;
        *self.client.write().await = Some(client);
        debug!(brokers = %self.config.bootstrap_servers(), "Admin connected");
        Ok(())
    }

    async fn list_topics(&self) -> Result<Vec<String>> {
        let client = self.current().await?;
        let metadata = topic_metadata(client, self.config.request_timeout).await?;
        Ok(metadata.into_iter().map(|(name, _)| name).collect())
    }

    async fn create_topics(&self, topics: &[TopicSpec], wait_for_leaders: bool) -> Result<()> {
        let client = self.current().await?;
        let new_topics: Vec<NewTopic<'_>> = topics
            .iter()
            .map(|t| {
                NewTopic::new(
                    t.name(),
                    t.partitions() as i32,
                    TopicReplication::Fixed(t.replication_factor() as i32),
                )
            })
            .collect();
        let options = AdminOptions::new().operation_timeout(Some(self.config.request_timeout));

        let results = client
            .create_topics(new_topics.iter(), &options)
            .await
            .map_err(transport)?;

        for result in results {
            match result {
                Ok(name) => info!(topic = %name, "Topic created"),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    debug!(topic = %name, "Topic already exists")
                }
                Err((name, code)) => {
                    return Err(BrokerError::Transport(format!(
                        "failed to create topic '{name}': {code}"
                    )));
                }
            }
        }

        if wait_for_leaders {
            let names: Vec<&str> = topics.iter().map(TopicSpec::name).collect();
            self.wait_for_leaders(client, &names).await?;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.client.write().await.take();
        Ok(())
    }
}

/// Producer that waits for broker acknowledgement on every send.
pub struct KafkaProducer {
    config: BrokerConfig,
    producer: RwLock<Option<FutureProducer>>,
}

impl KafkaProducer {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            producer: RwLock::new(None),
        }
    }
}

#[async_trait]
impl BrokerProducer for KafkaProducer {
    async fn connect(&self) -> Result<()> {
        let producer: FutureProducer = client_config(&self.config, "producer")
            .set(
                "message.timeout.ms",
                self.config.request_timeout.as_millis().to_string(),
            )
            .create()
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        let connectivity_check = producer.clone();
        let timeout = self.config.request_timeout;
        tokio::task::spawn_blocking(move || {
            connectivity_check
                .client()
                .fetch_metadata(None, Timeout::After(timeout))
                .map(|_| ())
        })
        .await
        .map_err(|e| BrokerError::Transport(e.to_string()))?
        .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        *self.producer.write().await = Some(producer);
        Ok(())
    }

    async fn send(&self, topic: &str, message: OutboundMessage) -> Result<()> {
        let producer = self
            .producer
            .read()
            .await
            .clone()
            .ok_or(BrokerError::NotConnected)?;

        let mut headers = OwnedHeaders::new_with_capacity(message.headers.len());
        for (key, value) in &message.headers {
            headers = headers.insert(Header {
                key: key.as_str(),
                value: Some(value.as_bytes()),
            });
        }

        let mut record = FutureRecord::<str, [u8]>::to(topic)
            .payload(&message.payload)
            .headers(headers);
        if let Some(key) = message.key.as_deref() {
            record = record.key(key);
        }

        producer
            .send(record, Timeout::After(self.config.request_timeout))
            .await
            .map(|_| ())
            .map_err(|(e, _)| transport(e))
    }

    async fn disconnect(&self) -> Result<()> {
        let Some(producer) = self.producer.write().await.take() else {
            return Ok(());
        };
        let timeout = self.config.request_timeout;
        let flushed = tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
        .await
        .map_err(|e| BrokerError::Transport(e.to_string()))?;
        if let Err(e) = flushed {
            warn!(error = %e, "Producer flush incomplete");
        }
        Ok(())
    }
}

/// Consumer-group member backed by a [`StreamConsumer`].
pub struct KafkaConsumer {
    config: BrokerConfig,
    consumer: RwLock<Option<Arc<StreamConsumer>>>,
}

impl KafkaConsumer {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            consumer: RwLock::new(None),
        }
    }

    async fn current(&self) -> Result<Arc<StreamConsumer>> {
        self.consumer
            .read()
            .await
            .clone()
            .ok_or(BrokerError::Closed)
    }
}

fn to_broker_message<M: Message>(message: &M) -> BrokerMessage {
    let mut headers = Headers::new();
    if let Some(raw) = message.headers() {
        for header in raw.iter() {
            if let Some(value) = header.value.and_then(|v| std::str::from_utf8(v).ok()) {
                headers.insert(header.key.to_string(), value.to_string());
            }
        }
    }

    BrokerMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned()),
        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        headers,
    }
}

#[async_trait]
impl BrokerConsumer for KafkaConsumer {
    async fn connect(&self) -> Result<()> {
        let offset_reset = if self.config.from_beginning {
            "earliest"
        } else {
            "latest"
        };
        let consumer: StreamConsumer = client_config(&self.config, "consumer")
            .set("group.id", &self.config.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", offset_reset)
            .create()
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        *self.consumer.write().await = Some(Arc::new(consumer));
        Ok(())
    }

    async fn subscribe(&self, topics: &[String]) -> Result<()> {
        let consumer = self.current().await?;
        let names: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&names)
            .map_err(|e| BrokerError::Subscribe(e.to_string()))
    }

    async fn recv(&self) -> Result<BrokerMessage> {
        let consumer = self.current().await?;
        let message = consumer.recv().await.map_err(transport)?;
        Ok(to_broker_message(&message))
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(consumer) = self.consumer.write().await.take() {
            consumer.unsubscribe();
        }
        Ok(())
    }
}
