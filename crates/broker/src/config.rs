use std::time::Duration;

/// Connection settings shared by the Kafka-backed clients.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Bootstrap broker addresses (`host:port`).
    pub brokers: Vec<String>,
    pub client_id: String,
    pub group_id: String,
    /// Start a new consumer group at the earliest retained offset instead of the log end.
    pub from_beginning: bool,
    /// Upper bound for a single admin/produce round trip.
    pub request_timeout: Duration,
}

impl BrokerConfig {
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            client_id: "choreo-ms".to_string(),
            group_id: "choreo-group".to_string(),
            from_beginning: false,
            request_timeout: Duration::from_secs(10),
        }
    }
}
