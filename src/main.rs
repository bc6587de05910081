use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use kitchen_flow::domain::order::{Actor, LineItem, OrderStatus, StaffRole, TransitionError};
use kitchen_flow::effects::{CounterPaymentGateway, LogNotificationSink, NotificationSink};
use kitchen_flow::messaging::RedpandaClient;
use kitchen_flow::metrics::{start_metrics_server, Metrics};
use kitchen_flow::store::{InMemoryOrderStore, OrderStore, ScyllaOrderStore};
use kitchen_flow::{AppConfig, OrderService, ServiceSettings, StoreBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // RUST_LOG wins over the configured filter
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)))
        .init();

    tracing::info!(store = ?config.store, "Starting kitchen flow order core");

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("Metrics registry created with {} metrics", metrics.registry().gather().len());

    if let Some(port) = config.metrics_port {
        let registry = Arc::new(metrics.registry().clone());
        std::thread::spawn(move || {
            let system = actix_web::rt::System::new();
            if let Err(e) = system.block_on(start_metrics_server(registry, port)) {
                tracing::error!(error = %e, "Metrics server error");
            }
        });
    }

    // === 2. Order store ===
    let store: Arc<dyn OrderStore> = match config.store {
        StoreBackend::Memory => Arc::new(InMemoryOrderStore::new()),
        StoreBackend::Scylla => {
            tracing::info!(nodes = ?config.scylla_nodes, "Connecting to ScyllaDB...");
            Arc::new(ScyllaOrderStore::connect(&config.scylla_nodes, &config.scylla_keyspace).await?)
        }
    };

    // === 3. Notification transport ===
    let notifier: Arc<dyn NotificationSink> = match config.redpanda_brokers {
        Some(ref brokers) => Arc::new(
            RedpandaClient::new(brokers, config.notification_topic.clone(), config.breaker())?
                .with_state_gauge(metrics.notification_breaker_state.clone()),
        ),
        None => {
            tracing::info!("No Redpanda brokers configured, notifications go to the log");
            Arc::new(LogNotificationSink)
        }
    };

    // === 4. Service ===
    let service = OrderService::start(
        store,
        notifier,
        Arc::new(CounterPaymentGateway),
        ServiceSettings::from_config(&config).with_metrics(metrics.clone()),
    );

    // === 5. Walk through the lifecycle ===
    run_service_flow(&service).await?;
    run_cancellation(&service).await?;

    // Effects run in the background
    tokio::time::sleep(Duration::from_secs(2)).await;

    let report = service.dead_letters(10).await?;
    tracing::info!(
        total = report.total_received,
        by_effect = ?report.by_effect,
        "Dead letter queue"
    );

    tracing::info!("Demo complete");
    Ok(())
}

/// Two chefs race for one order, then a waiter serves and closes it.
async fn run_service_flow(service: &OrderService) -> anyhow::Result<()> {
    let customer = Uuid::new_v4();
    let (chef_a, chef_b) = (Actor::kitchen(Uuid::new_v4()), Actor::kitchen(Uuid::new_v4()));
    let waiter = Actor::service(Uuid::new_v4());

    let order = service
        .place_order(
            customer,
            vec![
                LineItem::new(Uuid::new_v4(), 2),
                LineItem::new(Uuid::new_v4(), 1).with_modifier("no onions"),
            ],
        )
        .await?;
    tracing::info!(order_id = %order.id, version = order.version, "Order placed");

    let order = service.claim(order.id, StaffRole::Kitchen, chef_a, 0).await?;
    tracing::info!(order_id = %order.id, status = %order.status, version = order.version, "Chef A claimed");

    match service.claim(order.id, StaffRole::Kitchen, chef_b, 0).await {
        Err(e @ TransitionError::StaleVersion { .. }) => tracing::info!(error = %e, "Chef B was behind"),
        other => tracing::warn!(result = ?other.map(|o| o.version), "Unexpected result for stale claim"),
    }

    let current = service.get_order(order.id).await?;
    match service.claim(order.id, StaffRole::Kitchen, chef_b, current.version).await {
        Err(e @ TransitionError::ClaimDenied { .. }) => tracing::info!(error = %e, "Chef B denied"),
        other => tracing::warn!(result = ?other.map(|o| o.version), "Unexpected result for contested claim"),
    }

    let order = service
        .advance(order.id, OrderStatus::ReadyToServe, chef_a, order.version)
        .await?;
    let order = service.claim(order.id, StaffRole::Service, waiter, order.version).await?;
    let order = service
        .advance(order.id, OrderStatus::Completed, waiter, order.version)
        .await?;

    tracing::info!(order_id = %order.id, status = %order.status, version = order.version, "Order completed");
    Ok(())
}

/// Customer cancels before the kitchen picks the order up.
async fn run_cancellation(service: &OrderService) -> anyhow::Result<()> {
    let customer = Actor::customer(Uuid::new_v4());
    let order = service
        .place_order(customer.id, vec![LineItem::new(Uuid::new_v4(), 1)])
        .await?;

    let order = service
        .cancel(order.id, customer, order.version, Some("Changed my mind".to_string()))
        .await?;
    tracing::info!(order_id = %order.id, status = %order.status, "Order cancelled");

    let chef = Actor::kitchen(Uuid::new_v4());
    if let Err(e) = service.claim(order.id, StaffRole::Kitchen, chef, order.version).await {
        tracing::info!(error = %e, "Claim on cancelled order rejected");
    }

    Ok(())
}
