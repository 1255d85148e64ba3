//! Application configuration loaded from environment variables.

use std::time::Duration;

use broker::{BrokerConfig, TopicSpec};
use consumer::ConsumerConfig;
use domain::{MEDICINE_EVENTS_TOPIC, SUPPLIER_EVENTS_TOPIC};

/// Which broker the process talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerKind {
    Memory,
    Kafka,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Base URLs of the collaborator services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorUrls {
    pub centro: String,
    pub ruta: String,
    pub normativa: String,
    pub vehiculo: String,
    pub alerta: String,
}

/// Server configuration with sensible defaults.
///
/// Built once at startup and handed to component constructors. Malformed
/// numeric or boolean values fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub broker_kind: BrokerKind,
    pub kafka_brokers: Vec<String>,
    pub kafka_client_id: String,
    pub kafka_group_id: String,
    pub kafka_topics: Vec<String>,
    pub kafka_from_beginning: bool,
    /// Delivered messages the `memory` backend keeps per topic.
    pub memory_retention: usize,
    pub default_partitions: u32,
    pub default_replication_factor: u32,
    pub consumer_enabled: bool,
    pub chain_timeout: Duration,
    pub collaborators: CollaboratorUrls,
    pub database_url: Option<String>,
    pub event_mesh_url: Option<String>,
    pub event_mesh_source: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, e.g. a fixed map in tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str, default: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let flag = |key: &str, default: bool| {
            lookup(key)
                .and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => Some(true),
                    "false" | "0" | "no" => Some(false),
                    _ => None,
                })
                .unwrap_or(default)
        };
        let list = |key: &str, default: Vec<String>| {
            let items: Vec<String> = lookup(key)
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if items.is_empty() { default } else { items }
        };
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            service_name: text("SERVICE_NAME", defaults.service_name),
            host: text("HOST", defaults.host),
            port: parsed("PORT")
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(defaults.port),
            log_level: text("RUST_LOG", defaults.log_level),
            log_format: match optional("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            broker_kind: match optional("BROKER_BACKEND").as_deref() {
                Some("kafka") => BrokerKind::Kafka,
                _ => BrokerKind::Memory,
            },
            kafka_brokers: list("KAFKA_BROKERS", defaults.kafka_brokers),
            kafka_client_id: text("KAFKA_CLIENT_ID", defaults.kafka_client_id),
            kafka_group_id: text("KAFKA_GROUP_ID", defaults.kafka_group_id),
            kafka_topics: list("KAFKA_TOPICS", defaults.kafka_topics),
            kafka_from_beginning: flag("KAFKA_FROM_BEGINNING", defaults.kafka_from_beginning),
            memory_retention: parsed("MEMORY_BROKER_RETENTION")
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.memory_retention),
            default_partitions: parsed("KAFKA_DEFAULT_PARTITIONS")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.default_partitions),
            default_replication_factor: parsed("KAFKA_DEFAULT_REPLICATION_FACTOR")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.default_replication_factor),
            consumer_enabled: flag("CONSUMER_ENABLED", defaults.consumer_enabled),
            chain_timeout: parsed("CHAIN_TIMEOUT_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.chain_timeout),
            collaborators: CollaboratorUrls {
                centro: text("CENTRO_MS_URL", defaults.collaborators.centro),
                ruta: text("RUTA_MS_URL", defaults.collaborators.ruta),
                normativa: text("NORMATIVA_MS_URL", defaults.collaborators.normativa),
                vehiculo: text("VEHICULO_MS_URL", defaults.collaborators.vehiculo),
                alerta: text("ALERTA_MS_URL", defaults.collaborators.alerta),
            },
            database_url: optional("DATABASE_URL"),
            event_mesh_url: optional("EVENT_MESH_URL"),
            event_mesh_source: text("EVENT_MESH_SOURCE", defaults.event_mesh_source),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            brokers: self.kafka_brokers.clone(),
            client_id: self.kafka_client_id.clone(),
            group_id: self.kafka_group_id.clone(),
            from_beginning: self.kafka_from_beginning,
            ..BrokerConfig::default()
        }
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig::new(self.kafka_group_id.clone(), self.kafka_topics.clone())
    }

    /// Topic specs for the consumed topics plus the topics the domain services
    /// publish to, using the default sizing.
    pub fn topic_specs(&self) -> broker::Result<Vec<TopicSpec>> {
        let mut names: Vec<&str> = self.kafka_topics.iter().map(String::as_str).collect();
        for published in [SUPPLIER_EVENTS_TOPIC, MEDICINE_EVENTS_TOPIC] {
            if !names.contains(&published) {
                names.push(published);
            }
        }

        names
            .into_iter()
            .map(|name| {
                TopicSpec::new(
                    name,
                    self.default_partitions,
                    self.default_replication_factor,
                )
            })
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "CHOREO MS".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            broker_kind: BrokerKind::Memory,
            kafka_brokers: vec!["localhost:9092".to_string()],
            kafka_client_id: "choreo-ms".to_string(),
            kafka_group_id: "choreo-group".to_string(),
            kafka_topics: vec!["supplier-events".to_string()],
            kafka_from_beginning: false,
            memory_retention: 10_000,
            default_partitions: 1,
            default_replication_factor: 1,
            consumer_enabled: true,
            chain_timeout: Duration::from_millis(3000),
            collaborators: CollaboratorUrls {
                centro: "http://centro-distribucion-ms".to_string(),
                ruta: "http://ruta-ms".to_string(),
                normativa: "http://normativa-ms".to_string(),
                vehiculo: "http://vehiculo-ms".to_string(),
                alerta: "http://alerta-ms".to_string(),
            },
            database_url: None,
            event_mesh_url: None,
            event_mesh_source: "choreo-ms/worker".to_string(),
        }
    }
}
