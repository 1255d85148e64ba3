//! Integration tests: in-memory broker → ConsumerLoop → handlers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use broker::{
    BrokerConsumer, BrokerProducer, EventEnvelope, EventPublisher, Headers, InMemoryBroker,
    InMemoryConsumer, OutboundMessage, Publisher, TopicSpec,
};
use consumer::{
    ConsumerConfig, ConsumerError, ConsumerLoop, ConsumerState, EventHandler, HandlerError,
};
use serde_json::json;
use tokio::sync::Mutex;

const TOPIC: &str = "supplier-events";

/// Records every event id it sees; fails or panics on demand.
#[derive(Default)]
struct RecordingHandler {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl EventHandler for RecordingHandler {
    fn name(&self) -> &'static str {
        "RecordingHandler"
    }

    async fn handle(&self, _topic: &str, event: &EventEnvelope) -> Result<(), HandlerError> {
        self.seen.lock().await.push(event.event_id().to_string());
        match event.data()["mode"].as_str() {
            Some("fail") => Err(HandlerError::failed("requested failure")),
            Some("panic") => panic!("requested panic"),
            _ => Ok(()),
        }
    }
}

impl RecordingHandler {
    async fn seen(&self) -> Vec<String> {
        self.seen.lock().await.clone()
    }
}

struct Fixture {
    broker: InMemoryBroker,
    publisher: Publisher<broker::InMemoryProducer>,
    raw: Arc<InMemoryConsumer>,
    consumer: Arc<ConsumerLoop<Arc<InMemoryConsumer>>>,
    handler: Arc<RecordingHandler>,
}

async fn setup() -> Fixture {
    let broker = InMemoryBroker::new();
    broker
        .create_topic(TopicSpec::new(TOPIC, 3, 1).unwrap())
        .await
        .unwrap();

    let raw = Arc::new(broker.consumer("test-group", false));
    let mut config = ConsumerConfig::new("test-group", vec![TOPIC.to_string()]);
    config.error_backoff = Duration::from_millis(10);
    let consumer = Arc::new(ConsumerLoop::new(raw.clone(), config));
    consumer.subscribe_configured().await.unwrap();

    Fixture {
        publisher: Publisher::new(broker.producer()),
        broker,
        raw,
        consumer,
        handler: Arc::new(RecordingHandler::default()),
    }
}

fn spawn_loop(fixture: &Fixture) -> tokio::task::JoinHandle<consumer::Result<()>> {
    let consumer = fixture.consumer.clone();
    let handler = fixture.handler.clone();
    tokio::spawn(async move { consumer.consume(&handler).await })
}

async fn publish(fixture: &Fixture, mode: &str) -> EventEnvelope {
    let envelope = EventEnvelope::new("SUPPLIER_CREATED", json!({"mode": mode}));
    fixture.publisher.publish(TOPIC, &envelope).await.unwrap();
    envelope
}

async fn wait_for_seen(handler: &RecordingHandler, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while handler.seen().await.len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("handler did not see enough events in time");
}

#[tokio::test]
async fn loop_stays_alive_until_shutdown() {
    let fixture = setup().await;
    let mut task = spawn_loop(&fixture);

    for _ in 0..5 {
        publish(&fixture, "ok").await;
        let still_running = tokio::time::timeout(Duration::from_millis(50), &mut task).await;
        assert!(still_running.is_err(), "consume returned while running");
    }

    wait_for_seen(&fixture.handler, 5).await;
    assert_eq!(fixture.consumer.state().await, ConsumerState::Running);

    fixture.consumer.shutdown_handle().close();
    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(fixture.consumer.state().await, ConsumerState::Closed);
}

#[tokio::test]
async fn handler_failure_does_not_stop_the_loop() {
    let fixture = setup().await;
    let task = spawn_loop(&fixture);

    let first = publish(&fixture, "ok").await;
    let failing = publish(&fixture, "fail").await;
    let panicking = publish(&fixture, "panic").await;
    let last = publish(&fixture, "ok").await;

    wait_for_seen(&fixture.handler, 4).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        let stats = fixture.consumer.stats();
        while stats.handled() + stats.failed() < 4 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let seen = fixture.handler.seen().await;
    for envelope in [&first, &failing, &panicking, &last] {
        assert!(seen.contains(&envelope.event_id().to_string()));
    }

    let stats = fixture.consumer.stats();
    assert_eq!(stats.received(), 4);
    assert_eq!(stats.handled(), 2);
    assert_eq!(stats.failed(), 2);
    assert!(!task.is_finished());

    fixture.consumer.close().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn malformed_messages_are_skipped() {
    let fixture = setup().await;
    let task = spawn_loop(&fixture);

    let producer = fixture.broker.producer();
    producer.connect().await.unwrap();
    producer
        .send(
            TOPIC,
            OutboundMessage {
                key: None,
                payload: b"definitely not json".to_vec(),
                headers: Headers::new(),
            },
        )
        .await
        .unwrap();
    let good = publish(&fixture, "ok").await;

    wait_for_seen(&fixture.handler, 1).await;
    assert_eq!(fixture.handler.seen().await, vec![good.event_id().to_string()]);
    assert_eq!(fixture.consumer.stats().malformed(), 1);

    fixture.consumer.close().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn no_handler_runs_after_close() {
    let fixture = setup().await;
    let task = spawn_loop(&fixture);

    publish(&fixture, "ok").await;
    wait_for_seen(&fixture.handler, 1).await;

    fixture.consumer.close().await.unwrap();
    fixture.consumer.close().await.unwrap();
    task.await.unwrap().unwrap();

    publish(&fixture, "ok").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fixture.handler.seen().await.len(), 1);
}

#[tokio::test]
async fn broker_closing_the_stream_is_reported() {
    let fixture = setup().await;
    let task = spawn_loop(&fixture);
    tokio::time::sleep(Duration::from_millis(20)).await;

    fixture.raw.disconnect().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(ConsumerError::StreamClosed)));
    assert_eq!(fixture.consumer.state().await, ConsumerState::Closed);
}

#[tokio::test]
async fn transient_receive_errors_are_retried() {
    let fixture = setup().await;
    let task = spawn_loop(&fixture);

    fixture.broker.set_unavailable(true);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished());
    fixture.broker.set_unavailable(false);

    publish(&fixture, "ok").await;
    wait_for_seen(&fixture.handler, 1).await;

    fixture.consumer.close().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn redelivery_reaches_the_handler_again() {
    let fixture = setup().await;
    let task = spawn_loop(&fixture);

    let envelope = publish(&fixture, "ok").await;
    wait_for_seen(&fixture.handler, 1).await;

    fixture.broker.rewind_group("test-group", TOPIC, 0).await;
    wait_for_seen(&fixture.handler, 2).await;

    let id = envelope.event_id().to_string();
    assert_eq!(fixture.handler.seen().await, vec![id.clone(), id]);

    fixture.consumer.close().await.unwrap();
    task.await.unwrap().unwrap();
}
