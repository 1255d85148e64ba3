use std::collections::HashSet;
use std::num::NonZeroU32;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{BrokerAdmin, BrokerError, Result};

/// A topic the service expects to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSpec {
    name: String,
    partitions: NonZeroU32,
    replication_factor: NonZeroU32,
}

impl TopicSpec {
    /// Validates and builds a topic spec. Name must be non-empty, counts positive.
    pub fn new(name: impl Into<String>, partitions: u32, replication_factor: u32) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: &str| BrokerError::InvalidTopicSpec {
            topic: name.clone(),
            reason: reason.to_string(),
        };

        if name.trim().is_empty() {
            return Err(invalid("topic name is empty"));
        }
        let partitions = NonZeroU32::new(partitions).ok_or_else(|| invalid("partitions must be positive"))?;
        let replication_factor = NonZeroU32::new(replication_factor)
            .ok_or_else(|| invalid("replication factor must be positive"))?;

        Ok(Self {
            name,
            partitions,
            replication_factor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partitions(&self) -> u32 {
        self.partitions.get()
    }

    pub fn replication_factor(&self) -> u32 {
        self.replication_factor.get()
    }
}

/// Makes sure every topic in `wanted` exists, creating the missing ones.
///
/// Topics that already exist are never touched, so repeated runs are no-ops.
/// The admin session is always closed before returning, success or not.
/// Returns the names of the topics this call created.
#[instrument(skip_all, fields(wanted = wanted.len()))]
pub async fn ensure_topics<A>(admin: &A, wanted: &[TopicSpec]) -> Result<Vec<String>>
where
    A: BrokerAdmin + ?Sized,
{
    if wanted.is_empty() {
        return Ok(Vec::new());
    }

    admin.connect().await?;
    let outcome = reconcile(admin, wanted).await;

    if let Err(e) = admin.disconnect().await {
        warn!(error = %e, "Failed to close admin session");
    }

    outcome
}

async fn reconcile<A>(admin: &A, wanted: &[TopicSpec]) -> Result<Vec<String>>
where
    A: BrokerAdmin + ?Sized,
{
    let missing = missing_topics(admin, wanted).await?;
    if missing.is_empty() {
        info!("All topics already exist");
        return Ok(Vec::new());
    }

    let created = match admin.create_topics(&missing, true).await {
        Ok(()) => missing,
        Err(BrokerError::TopicAlreadyExists(name)) => {
            // Another instance won the race for at least one topic.
            warn!(topic = %name, "Topic created concurrently, re-checking");
            let remaining = missing_topics(admin, &missing).await?;
            if !remaining.is_empty() {
                admin.create_topics(&remaining, true).await?;
            }
            remaining
        }
        Err(e) => return Err(e),
    };

    let names: Vec<String> = created.iter().map(|t| t.name().to_string()).collect();
    metrics::counter!("broker_topics_created_total").increment(names.len() as u64);
    info!(topics = ?names, "Created topics");

    Ok(names)
}

async fn missing_topics<A>(admin: &A, wanted: &[TopicSpec]) -> Result<Vec<TopicSpec>>
where
    A: BrokerAdmin + ?Sized,
{
    let existing: HashSet<String> = admin.list_topics().await?.into_iter().collect();
    let mut seen = HashSet::new();

    Ok(wanted
        .iter()
        .filter(|t| !existing.contains(t.name()) && seen.insert(t.name().to_string()))
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryBroker;

    fn spec(name: &str) -> TopicSpec {
        TopicSpec::new(name, 1, 1).unwrap()
    }

    #[test]
    fn rejects_non_positive_settings() {
        assert!(matches!(
            TopicSpec::new("t", 0, 1),
            Err(BrokerError::InvalidTopicSpec { .. })
        ));
        assert!(matches!(
            TopicSpec::new("t", 1, 0),
            Err(BrokerError::InvalidTopicSpec { .. })
        ));
        assert!(TopicSpec::new(" ", 1, 1).is_err());
    }

    #[tokio::test]
    async fn creates_only_missing_topics() {
        let broker = InMemoryBroker::new();
        broker.create_topic(spec("existing")).await.unwrap();

        let created = ensure_topics(&broker.admin(), &[spec("existing"), spec("new-topic")])
            .await
            .unwrap();

        assert_eq!(created, vec!["new-topic".to_string()]);
        assert_eq!(broker.topic_names().await, vec!["existing", "new-topic"]);
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let broker = InMemoryBroker::new();
        let admin = broker.admin();
        let wanted = [spec("a"), spec("b")];

        ensure_topics(&admin, &wanted).await.unwrap();
        let calls = broker.create_topic_calls();
        let created = ensure_topics(&admin, &wanted).await.unwrap();

        assert!(created.is_empty());
        assert_eq!(broker.create_topic_calls(), calls);
    }

    #[tokio::test]
    async fn duplicate_names_are_created_once() {
        let broker = InMemoryBroker::new();
        let created = ensure_topics(&broker.admin(), &[spec("a"), spec("a")])
            .await
            .unwrap();
        assert_eq!(created, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn keeps_requested_partition_count() {
        let broker = InMemoryBroker::new();
        let wanted = TopicSpec::new("wide", 4, 1).unwrap();
        ensure_topics(&broker.admin(), &[wanted.clone()]).await.unwrap();
        assert_eq!(broker.topic_spec("wide").await, Some(wanted));
    }

    #[tokio::test]
    async fn unreachable_broker_surfaces_unavailable() {
        let broker = InMemoryBroker::new();
        broker.set_unavailable(true);

        let result = ensure_topics(&broker.admin(), &[spec("a")]).await;
        assert!(matches!(result, Err(BrokerError::Unavailable(_))));
    }

    #[tokio::test]
    async fn admin_session_closed_after_failure() {
        let broker = InMemoryBroker::new();
        broker.fail_next_topic_creation();

        let result = ensure_topics(&broker.admin(), &[spec("a")]).await;
        assert!(result.is_err());
        assert_eq!(broker.open_admin_sessions(), 0);
    }

    #[tokio::test]
    async fn empty_request_does_not_connect() {
        let broker = InMemoryBroker::new();
        broker.set_unavailable(true);
        assert!(ensure_topics(&broker.admin(), &[]).await.unwrap().is_empty());
    }
}
