use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};

use crate::{
    BrokerAdmin, BrokerConsumer, BrokerError, BrokerMessage, BrokerProducer, OutboundMessage,
    Result, TopicSpec,
};

/// In-process broker used by tests and by the `memory` backend.
///
/// Topics are append-only logs. Consumer groups track one read position per
/// topic, so each message is delivered once per group. Cloning yields another
/// handle to the same broker.
///
/// Logs are unbounded unless built with [`InMemoryBroker::with_retention`],
/// which drops messages every group has already received once more than the
/// given number of them pile up.
///
/// Lock order: a consumer's `subscriptions`, then the broker `state`.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: RwLock<BrokerState>,
    // Delivered messages kept per topic; `None` keeps everything.
    retention: Option<usize>,
    arrivals: Notify,
    unavailable: AtomicBool,
    fail_publishes: AtomicUsize,
    fail_topic_creation: AtomicBool,
    create_topic_calls: AtomicUsize,
    open_admin_sessions: AtomicUsize,
}

#[derive(Default)]
struct BrokerState {
    topics: BTreeMap<String, TopicLog>,
    // (group, topic) -> absolute index of the next message to deliver
    positions: HashMap<(String, String), usize>,
}

impl BrokerState {
    /// Lowest read position on `topic` across groups, or `None` when no
    /// group reads it.
    fn min_position(&self, topic: &str) -> Option<usize> {
        self.positions
            .iter()
            .filter(|((_, t), _)| t == topic)
            .map(|(_, position)| *position)
            .min()
    }

    /// Drops messages of `topic` beyond the retention window.
    fn compact(&mut self, topic: &str, retention: Option<usize>) {
        let Some(retention) = retention else {
            return;
        };
        let min_position = self.min_position(topic);
        if let Some(log) = self.topics.get_mut(topic) {
            let delivered = min_position.unwrap_or_else(|| log.end()).min(log.end());
            log.truncate_before(delivered.saturating_sub(retention));
        }
    }
}

struct TopicLog {
    spec: TopicSpec,
    // Absolute index of `messages[0]`.
    base: usize,
    messages: Vec<BrokerMessage>,
    next_offsets: Vec<i64>,
}

impl TopicLog {
    fn new(spec: TopicSpec) -> Self {
        let partitions = spec.partitions() as usize;
        Self {
            spec,
            base: 0,
            messages: Vec::new(),
            next_offsets: vec![0; partitions],
        }
    }

    /// Absolute index one past the last appended message.
    fn end(&self) -> usize {
        self.base + self.messages.len()
    }

    /// The message at absolute index `position`, skipping ahead past anything
    /// already dropped.
    fn get(&self, position: usize) -> Option<(usize, &BrokerMessage)> {
        let position = position.max(self.base);
        self.messages
            .get(position - self.base)
            .map(|message| (position, message))
    }

    fn truncate_before(&mut self, position: usize) {
        if position > self.base {
            let count = (position - self.base).min(self.messages.len());
            self.messages.drain(..count);
            self.base += count;
        }
    }

    fn partition_for(&self, key: Option<&str>) -> usize {
        let partitions = self.next_offsets.len();
        match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % partitions as u64) as usize
            }
            None => self.end() % partitions,
        }
    }

    fn append(&mut self, topic: &str, message: OutboundMessage) {
        let partition = self.partition_for(message.key.as_deref());
        let offset = self.next_offsets[partition];
        self.next_offsets[partition] += 1;

        self.messages.push(BrokerMessage {
            topic: topic.to_string(),
            partition: partition as i32,
            offset,
            key: message.key,
            payload: message.payload,
            headers: message.headers,
        });
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker that keeps at most `retention` already-delivered messages per
    /// topic. Messages some group has not received yet are never dropped.
    pub fn with_retention(retention: usize) -> Self {
        Self {
            inner: Arc::new(Shared {
                retention: Some(retention),
                ..Shared::default()
            }),
        }
    }

    pub fn admin(&self) -> InMemoryAdmin {
        InMemoryAdmin {
            broker: self.clone(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn producer(&self) -> InMemoryProducer {
        InMemoryProducer {
            broker: self.clone(),
            connected: AtomicBool::new(false),
        }
    }

    /// A consumer in `group_id`. A group seen for the first time starts at the
    /// end of each topic unless `from_beginning` is set.
    pub fn consumer(&self, group_id: impl Into<String>, from_beginning: bool) -> InMemoryConsumer {
        InMemoryConsumer {
            broker: self.clone(),
            group_id: group_id.into(),
            from_beginning,
            subscriptions: RwLock::new(Vec::new()),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Creates a topic directly, bypassing any admin session.
    pub async fn create_topic(&self, spec: TopicSpec) -> Result<()> {
        let mut state = self.inner.state.write().await;
        if state.topics.contains_key(spec.name()) {
            return Err(BrokerError::TopicAlreadyExists(spec.name().to_string()));
        }
        state.topics.insert(spec.name().to_string(), TopicLog::new(spec));
        Ok(())
    }

    pub async fn topic_names(&self) -> Vec<String> {
        self.inner.state.read().await.topics.keys().cloned().collect()
    }

    pub async fn topic_spec(&self, name: &str) -> Option<TopicSpec> {
        self.inner
            .state
            .read()
            .await
            .topics
            .get(name)
            .map(|log| log.spec.clone())
    }

    /// Messages of `topic` still retained, in append order.
    pub async fn messages(&self, topic: &str) -> Vec<BrokerMessage> {
        self.inner
            .state
            .read()
            .await
            .topics
            .get(topic)
            .map(|log| log.messages.clone())
            .unwrap_or_default()
    }

    /// Moves a group's read position on `topic`, e.g. to simulate redelivery.
    /// A position before the retained messages resumes at the oldest one.
    pub async fn rewind_group(&self, group_id: &str, topic: &str, position: usize) {
        self.inner
            .state
            .write()
            .await
            .positions
            .insert((group_id.to_string(), topic.to_string()), position);
        self.inner.arrivals.notify_waiters();
    }

    pub async fn group_position(&self, group_id: &str, topic: &str) -> Option<usize> {
        self.inner
            .state
            .read()
            .await
            .positions
            .get(&(group_id.to_string(), topic.to_string()))
            .copied()
    }

    /// While set, connects fail with `Unavailable` and I/O fails with `Transport`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes the next `count` sends fail with a transport error.
    pub fn fail_next_publishes(&self, count: usize) {
        self.inner.fail_publishes.store(count, Ordering::SeqCst);
    }

    /// Makes the next `create_topics` call fail with a transport error.
    pub fn fail_next_topic_creation(&self) {
        self.inner.fail_topic_creation.store(true, Ordering::SeqCst);
    }

    pub fn create_topic_calls(&self) -> usize {
        self.inner.create_topic_calls.load(Ordering::SeqCst)
    }

    pub fn open_admin_sessions(&self) -> usize {
        self.inner.open_admin_sessions.load(Ordering::SeqCst)
    }

    fn is_unavailable(&self) -> bool {
        self.inner.unavailable.load(Ordering::SeqCst)
    }
}

/// Admin session on an [`InMemoryBroker`].
pub struct InMemoryAdmin {
    broker: InMemoryBroker,
    connected: AtomicBool,
}

impl InMemoryAdmin {
    fn ensure_connected(&self) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BrokerError::NotConnected);
        }
        if self.broker.is_unavailable() {
            return Err(BrokerError::Transport("in-memory broker unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerAdmin for InMemoryAdmin {
    async fn connect(&self) -> Result<()> {
        if self.broker.is_unavailable() {
            return Err(BrokerError::Unavailable("in-memory broker unavailable".into()));
        }
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.broker
                .inner
                .open_admin_sessions
                .fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn list_topics(&self) -> Result<Vec<String>> {
        self.ensure_connected()?;
        Ok(self.broker.topic_names().await)
    }

    async fn create_topics(&self, topics: &[TopicSpec], _wait_for_leaders: bool) -> Result<()> {
        self.ensure_connected()?;
        let shared = &self.broker.inner;
        shared.create_topic_calls.fetch_add(1, Ordering::SeqCst);

        if shared.fail_topic_creation.swap(false, Ordering::SeqCst) {
            return Err(BrokerError::Transport("injected topic creation failure".into()));
        }

        // All-or-nothing, like a single CreateTopics request that validates first.
        let mut state = shared.state.write().await;
        if let Some(existing) = topics.iter().find(|t| state.topics.contains_key(t.name())) {
            return Err(BrokerError::TopicAlreadyExists(existing.name().to_string()));
        }
        for spec in topics {
            state
                .topics
                .insert(spec.name().to_string(), TopicLog::new(spec.clone()));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.broker
                .inner
                .open_admin_sessions
                .fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Producer on an [`InMemoryBroker`].
pub struct InMemoryProducer {
    broker: InMemoryBroker,
    connected: AtomicBool,
}

#[async_trait]
impl BrokerProducer for InMemoryProducer {
    async fn connect(&self) -> Result<()> {
        if self.broker.is_unavailable() {
            return Err(BrokerError::Unavailable("in-memory broker unavailable".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, topic: &str, message: OutboundMessage) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BrokerError::NotConnected);
        }
        let shared = &self.broker.inner;
        if self.broker.is_unavailable() {
            return Err(BrokerError::Transport("in-memory broker unavailable".into()));
        }
        if shared
            .fail_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BrokerError::Transport("injected publish failure".into()));
        }

        {
            let mut state = shared.state.write().await;
            let log = state
                .topics
                .get_mut(topic)
                .ok_or_else(|| BrokerError::Publish {
                    topic: topic.to_string(),
                    reason: "unknown topic".to_string(),
                })?;
            log.append(topic, message);
            state.compact(topic, shared.retention);
        }

        shared.arrivals.notify_waiters();
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Consumer-group member on an [`InMemoryBroker`].
pub struct InMemoryConsumer {
    broker: InMemoryBroker,
    group_id: String,
    from_beginning: bool,
    subscriptions: RwLock<Vec<String>>,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl InMemoryConsumer {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    async fn next_available(&self) -> Option<BrokerMessage> {
        let subscriptions = self.subscriptions.read().await;
        let mut state = self.broker.inner.state.write().await;

        for topic in subscriptions.iter() {
            let BrokerState { topics, positions } = &mut *state;
            let Some(log) = topics.get(topic) else {
                continue;
            };
            let position = positions
                .entry((self.group_id.clone(), topic.clone()))
                .or_insert(0);
            if let Some((at, message)) = log.get(*position) {
                let message = message.clone();
                *position = at + 1;
                state.compact(topic, self.broker.inner.retention);
                return Some(message);
            }
        }
        None
    }
}

#[async_trait]
impl BrokerConsumer for InMemoryConsumer {
    async fn connect(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        if self.broker.is_unavailable() {
            return Err(BrokerError::Unavailable("in-memory broker unavailable".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, topics: &[String]) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BrokerError::NotConnected);
        }

        let mut subscriptions = self.subscriptions.write().await;
        let mut state = self.broker.inner.state.write().await;
        if let Some(unknown) = topics.iter().find(|t| !state.topics.contains_key(*t)) {
            return Err(BrokerError::Subscribe(format!("unknown topic '{unknown}'")));
        }

        for topic in topics {
            let start = if self.from_beginning {
                0
            } else {
                state.topics.get(topic).map_or(0, TopicLog::end)
            };
            state
                .positions
                .entry((self.group_id.clone(), topic.clone()))
                .or_insert(start);
            if !subscriptions.contains(topic) {
                subscriptions.push(topic.clone());
            }
        }
        Ok(())
    }

    async fn recv(&self) -> Result<BrokerMessage> {
        loop {
            // Register interest before checking state so a concurrent
            // append or disconnect cannot slip between check and wait.
            let arrived = self.broker.inner.arrivals.notified();

            if self.closed.load(Ordering::SeqCst) {
                return Err(BrokerError::Closed);
            }
            if !self.connected.load(Ordering::SeqCst) {
                return Err(BrokerError::NotConnected);
            }
            if self.broker.is_unavailable() {
                return Err(BrokerError::Transport("in-memory broker unavailable".into()));
            }
            if let Some(message) = self.next_available().await {
                return Ok(message);
            }

            arrived.await;
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        self.broker.inner.arrivals.notify_waiters();
        Ok(())
    }
}
