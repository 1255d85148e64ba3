//! The consumer loop: subscribe once, then deliver messages until shut down.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use broker::{BrokerConsumer, BrokerError, BrokerMessage, decode_message};
use futures_util::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::{ConsumerError, EventHandler, HandlerError, Result, ShutdownHandle};

/// Settings for one consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub group_id: String,
    pub topics: Vec<String>,
    /// Pause after a failed receive before polling again.
    pub error_backoff: Duration,
}

impl ConsumerConfig {
    pub fn new(group_id: impl Into<String>, topics: Vec<String>) -> Self {
        Self {
            group_id: group_id.into(),
            topics,
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// Lifecycle of a [`ConsumerLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connected,
    Subscribed,
    Running,
    Closed,
}

impl std::fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Subscribed => "subscribed",
            Self::Running => "running",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Counters describing what the loop has processed so far.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    handled: AtomicU64,
    failed: AtomicU64,
    malformed: AtomicU64,
}

impl ConsumerStats {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }

    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::SeqCst)
    }
}

/// Delivers messages from a consumer group to an [`EventHandler`].
///
/// `consume` only returns after a shutdown request (or if the broker ends the
/// stream on its own). Handler failures and panics are logged and counted,
/// and the loop moves on to the next message.
pub struct ConsumerLoop<C> {
    consumer: C,
    config: ConsumerConfig,
    state: Mutex<ConsumerState>,
    shutdown: ShutdownHandle,
    stats: ConsumerStats,
}

impl<C: BrokerConsumer> ConsumerLoop<C> {
    pub fn new(consumer: C, config: ConsumerConfig) -> Self {
        Self {
            consumer,
            config,
            state: Mutex::new(ConsumerState::Disconnected),
            shutdown: ShutdownHandle::new(),
            stats: ConsumerStats::default(),
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub async fn state(&self) -> ConsumerState {
        *self.state.lock().await
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    /// A handle that stops `consume` from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Connects the underlying consumer.
    pub async fn connect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            ConsumerState::Disconnected => {
                self.consumer.connect().await?;
                *state = ConsumerState::Connected;
                debug!(group = %self.config.group_id, "Consumer connected");
                Ok(())
            }
            ConsumerState::Connected | ConsumerState::Subscribed => Ok(()),
            other => Err(ConsumerError::InvalidState {
                operation: "connect",
                state: other,
            }),
        }
    }

    /// Subscribes the group to `topics`, connecting first if needed.
    ///
    /// The topics must already exist.
    #[instrument(skip(self), fields(group = %self.config.group_id))]
    pub async fn subscribe(&self, topics: &[String]) -> Result<()> {
        self.connect().await?;

        let mut state = self.state.lock().await;
        match *state {
            ConsumerState::Connected | ConsumerState::Subscribed => {
                self.consumer.subscribe(topics).await?;
                *state = ConsumerState::Subscribed;
                info!(?topics, "Consumer subscribed");
                Ok(())
            }
            other => Err(ConsumerError::InvalidState {
                operation: "subscribe",
                state: other,
            }),
        }
    }

    /// Subscribes to the configured topics.
    pub async fn subscribe_configured(&self) -> Result<()> {
        let topics = self.config.topics.clone();
        self.subscribe(&topics).await
    }

    /// Runs the loop until shutdown is requested.
    ///
    /// Returns `Ok(())` after a shutdown request and `StreamClosed` if the
    /// broker ended the subscription by itself. The consumer is closed either way.
    #[instrument(skip_all, fields(group = %self.config.group_id, handler = handler.name()))]
    pub async fn consume<H>(&self, handler: &H) -> Result<()>
    where
        H: EventHandler + ?Sized,
    {
        {
            let mut state = self.state.lock().await;
            if *state != ConsumerState::Subscribed {
                return Err(ConsumerError::InvalidState {
                    operation: "consume",
                    state: *state,
                });
            }
            *state = ConsumerState::Running;
        }
        info!("Consumer loop running");

        let outcome = loop {
            let received = tokio::select! {
                biased;
                _ = self.shutdown.requested() => break Ok(()),
                received = self.consumer.recv() => received,
            };

            match received {
                Ok(message) => {
                    if self.shutdown.is_requested() {
                        break Ok(());
                    }
                    self.dispatch(handler, message).await;
                }
                Err(BrokerError::Closed) if self.shutdown.is_requested() => break Ok(()),
                Err(BrokerError::Closed) => {
                    error!("Broker closed the message stream");
                    break Err(ConsumerError::StreamClosed);
                }
                Err(e) => {
                    warn!(error = %e, backoff = ?self.config.error_backoff, "Receive failed, retrying");
                    tokio::select! {
                        biased;
                        _ = self.shutdown.requested() => break Ok(()),
                        _ = tokio::time::sleep(self.config.error_backoff) => {}
                    }
                }
            }
        };

        self.close().await?;
        info!(
            received = self.stats.received(),
            failed = self.stats.failed(),
            "Consumer loop stopped"
        );
        outcome
    }

    async fn dispatch<H>(&self, handler: &H, message: BrokerMessage)
    where
        H: EventHandler + ?Sized,
    {
        let topic = message.topic.as_str();
        self.stats.received.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("consumer_messages_received_total", "topic" => topic.to_string())
            .increment(1);

        let event = match decode_message(&message) {
            Ok(event) => event,
            Err(e) => {
                self.stats.malformed.fetch_add(1, Ordering::SeqCst);
                metrics::counter!("consumer_malformed_messages_total", "topic" => topic.to_string())
                    .increment(1);
                warn!(
                    topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Skipping undecodable message"
                );
                return;
            }
        };

        let outcome = AssertUnwindSafe(handler.handle(topic, &event))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic.as_ref()))));

        match outcome {
            Ok(()) => {
                self.stats.handled.fetch_add(1, Ordering::SeqCst);
                debug!(
                    topic,
                    event_id = %event.event_id(),
                    event_type = event.event_type(),
                    "Event handled"
                );
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                metrics::counter!("consumer_handler_failures_total", "topic" => topic.to_string())
                    .increment(1);
                error!(
                    topic,
                    event_id = %event.event_id(),
                    event_type = event.event_type(),
                    error = %e,
                    "Handler failed, continuing"
                );
            }
        }
    }

    /// Stops the loop and disconnects. Idempotent; no handler runs afterwards.
    pub async fn close(&self) -> Result<()> {
        self.shutdown.close();

        let mut state = self.state.lock().await;
        if *state == ConsumerState::Closed {
            return Ok(());
        }
        let previous = std::mem::replace(&mut *state, ConsumerState::Closed);

        if previous != ConsumerState::Disconnected
            && let Err(e) = self.consumer.disconnect().await
        {
            warn!(error = %e, "Consumer disconnect failed");
        }
        info!(group = %self.config.group_id, "Consumer closed");
        Ok(())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
