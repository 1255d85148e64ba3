use broker::{
    BrokerConsumer, EventEnvelope, EventPublisher, InMemoryBroker, OutboundMessage, Publisher,
    TopicSpec, decode_message,
};
use criterion::{Criterion, criterion_group, criterion_main};

fn make_event(n: usize) -> EventEnvelope {
    EventEnvelope::new(
        "SUPPLIER_CREATED",
        serde_json::json!({
            "id": format!("supplier-{n}"),
            "name": "ACME Foods",
            "items": [{"sku": "SKU-1", "qty": 10}],
            "totalAmount": 125.5
        }),
    )
}

async fn broker_with_topic() -> InMemoryBroker {
    let broker = InMemoryBroker::new();
    broker
        .create_topic(TopicSpec::new("supplier-events", 3, 1).unwrap())
        .await
        .unwrap();
    broker
}

fn bench_encode_envelope(c: &mut Criterion) {
    let event = make_event(0);

    c.bench_function("broker/encode_envelope", |b| {
        b.iter(|| OutboundMessage::from_envelope(&event).unwrap());
    });
}

fn bench_publish_single(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let broker = rt.block_on(broker_with_topic());
    let publisher = Publisher::new(broker.producer());

    c.bench_function("broker/publish_single", |b| {
        b.iter(|| {
            rt.block_on(async {
                publisher
                    .publish("supplier-events", &make_event(1))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_publish_and_consume_100(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("broker/publish_and_consume_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let broker = broker_with_topic().await;
                let consumer = broker.consumer("bench", false);
                consumer.connect().await.unwrap();
                consumer
                    .subscribe(&["supplier-events".to_string()])
                    .await
                    .unwrap();

                let publisher = Publisher::new(broker.producer());
                for n in 0..100 {
                    publisher
                        .publish("supplier-events", &make_event(n))
                        .await
                        .unwrap();
                }
                for _ in 0..100 {
                    decode_message(&consumer.recv().await.unwrap()).unwrap();
                }
            });
        });
    });
}

criterion_group!(
    benches,
    bench_encode_envelope,
    bench_publish_single,
    bench_publish_and_consume_100,
);
criterion_main!(benches);
