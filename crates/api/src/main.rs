//! API server entry point.

use std::sync::Arc;

use api::audit::TracingAuditSink;
use api::config::{BrokerKind, Config, LogFormat};
use api::routes::chains::build_orchestrator;
use api::{AppState, create_app};
use broker::{BrokerBackend, BrokerConsumer, InMemoryBroker, Publisher, ensure_topics};
use chain::EventMeshForwarder;
use consumer::{ConsumerLoop, EventHandler, HandlerSet};
use domain::{
    InMemoryPurchasePlanRepository, InMemorySaleRepository, MEDICINE_EVENTS_TOPIC,
    MedicineService, PostgresSaleRepository, PurchasePlanHandler, SUPPLIER_EVENTS_TOPIC,
    SaleRepository, SupplierService,
};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(format: LogFormat, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn broker_backend(config: &Config) -> BrokerBackend {
    match config.broker_kind {
        BrokerKind::Memory => {
            BrokerBackend::Memory(InMemoryBroker::with_retention(config.memory_retention))
        }
        #[cfg(feature = "kafka")]
        BrokerKind::Kafka => BrokerBackend::Kafka(config.broker_config()),
        #[cfg(not(feature = "kafka"))]
        BrokerKind::Kafka => {
            tracing::error!("BROKER_BACKEND=kafka but this binary was built without the kafka feature");
            std::process::exit(1);
        }
    }
}

async fn sale_repository(config: &Config) -> Arc<dyn SaleRepository> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::info!("DATABASE_URL not set, keeping sales in memory");
        return Arc::new(InMemorySaleRepository::new());
    };

    let repository = PostgresSaleRepository::connect(url)
        .await
        .expect("failed to connect to the sales database");
    repository
        .run_migrations()
        .await
        .expect("failed to run sales migrations");
    tracing::info!("sales stored in PostgreSQL");
    Arc::new(repository)
}

type Consumer = ConsumerLoop<Box<dyn BrokerConsumer>>;

/// Connects and subscribes the consumer, then runs it on a background task.
async fn spawn_consumer(
    backend: &BrokerBackend,
    config: &Config,
    handler: HandlerSet,
) -> (Arc<Consumer>, JoinHandle<()>) {
    let consumer = Arc::new(ConsumerLoop::new(
        backend.consumer(&config.kafka_group_id, config.kafka_from_beginning),
        config.consumer_config(),
    ));
    consumer.connect().await.expect("failed to connect consumer");
    consumer
        .subscribe_configured()
        .await
        .expect("failed to subscribe consumer");

    let running = Arc::clone(&consumer);
    let task = tokio::spawn(async move {
        if let Err(e) = running.consume(&handler).await {
            tracing::error!(error = %e, "consumer loop stopped");
        }
    });
    (consumer, task)
}

#[tokio::main]
async fn main() {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(config.log_format, &config.log_level);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Broker topology; serving without our topics is pointless
    let backend = broker_backend(&config);
    tracing::info!(backend = backend.name(), "broker backend selected");
    let topics = config.topic_specs().expect("invalid topic configuration");
    let admin = backend.admin();
    ensure_topics(admin.as_ref(), &topics)
        .await
        .expect("failed to ensure broker topics");

    // 4. Publisher
    let publisher = Arc::new(Publisher::new(backend.producer()));
    publisher.connect().await.expect("failed to connect publisher");

    // 5. Stores and handlers
    let sales = sale_repository(&config).await;
    let purchase_plans = Arc::new(InMemoryPurchasePlanRepository::new());
    let plan_handler = Arc::new(PurchasePlanHandler::new(purchase_plans.clone()));
    let http_client = reqwest::Client::new();

    let mut handlers = HandlerSet::new().with(Arc::clone(&plan_handler));
    if let Some(url) = &config.event_mesh_url {
        tracing::info!(%url, "forwarding consumed events to the event mesh");
        handlers = handlers.with(EventMeshForwarder::new(
            http_client.clone(),
            url.clone(),
            config.event_mesh_source.clone(),
            config.chain_timeout,
        ));
    }

    // 6. Consumer loop
    let consumer = if config.consumer_enabled {
        Some(spawn_consumer(&backend, &config, handlers).await)
    } else {
        tracing::info!("consumer disabled");
        None
    };

    // 7. Build the application
    let state = Arc::new(AppState {
        service_name: config.service_name.clone(),
        orchestrator: build_orchestrator(
            &config.collaborators,
            config.chain_timeout,
            http_client,
        ),
        suppliers: SupplierService::new(publisher.clone(), SUPPLIER_EVENTS_TOPIC),
        medicines: MedicineService::new(publisher.clone(), MEDICINE_EVENTS_TOPIC),
        purchase_plans,
        sales,
        event_handler: plan_handler as Arc<dyn EventHandler>,
        audit: Arc::new(TracingAuditSink),
    });
    let app = create_app(state, metrics_handle);

    // 8. Serve until a shutdown signal
    let addr = config.addr();
    tracing::info!(%addr, service = %config.service_name, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 9. Close the consumer, then the publisher
    if let Some((consumer, task)) = consumer {
        if let Err(e) = consumer.close().await {
            tracing::warn!(error = %e, "consumer close failed");
        }
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "consumer task panicked");
        }
    }
    if let Err(e) = publisher.close().await {
        tracing::warn!(error = %e, "publisher close failed");
    }

    tracing::info!("server shut down gracefully");
}
