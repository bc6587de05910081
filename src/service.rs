use kameo::actor::ActorRef;
use kameo::mailbox;
use kameo::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::domain::order::{
    Actor as Caller, ClaimManager, LineItem, Order, OrderCommand, OrderStatus, PaymentStatus, StaffRole,
    TransitionEngine, TransitionError,
};
use crate::effects::{
    DeadLetterQueue, DeadLetterReport, EffectDispatcher, GetDeadLetters, NotificationSink, PaymentGateway,
    PaymentRecorded,
};
use crate::metrics::Metrics;
use crate::store::{OrderFilter, OrderStore};
use crate::utils::RetryConfig;

// ============================================================================
// Order Service - The surface exposed to dashboards and the ordering flow
// ============================================================================
//
// Reads:   get_order, list_orders, available_for, orders_held_by
// Writes:  place_order, claim, advance, cancel
// Admin:   release, reassign, release_all_held_by
// Payment: record_payment
//
// Callers poll the reads and send back the version they last saw with every
// write.
//
// ============================================================================

#[derive(Clone)]
pub struct ServiceSettings {
    pub notification_retry: RetryConfig,
    pub payment_retry: RetryConfig,
    pub admin_override_retry: RetryConfig,
    pub dead_letter_capacity: usize,
    pub metrics: Option<Arc<Metrics>>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            notification_retry: RetryConfig::notifications(),
            payment_retry: RetryConfig::payments(),
            admin_override_retry: RetryConfig::admin_override(),
            dead_letter_capacity: 1000,
            metrics: None,
        }
    }
}

impl ServiceSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            notification_retry: config.notification_retry(),
            payment_retry: config.payment_retry(),
            admin_override_retry: config.admin_override_retry(),
            dead_letter_capacity: config.dead_letter_capacity,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[derive(Clone)]
pub struct OrderService {
    engine: TransitionEngine,
    claims: ClaimManager,
    dispatcher: ActorRef<EffectDispatcher>,
    dlq: ActorRef<DeadLetterQueue>,
}

impl OrderService {
    /// Spawn the dead letter queue and effect dispatcher actors and wire the
    /// engine to them. Needs a running tokio runtime.
    pub fn start(
        store: Arc<dyn OrderStore>,
        notifier: Arc<dyn NotificationSink>,
        payments: Arc<dyn PaymentGateway>,
        settings: ServiceSettings,
    ) -> Self {
        let mut dlq = DeadLetterQueue::new(settings.dead_letter_capacity);
        if let Some(ref metrics) = settings.metrics {
            dlq = dlq.with_metrics(metrics.clone());
        }
        let dlq = DeadLetterQueue::spawn(dlq);

        let mut dispatcher = EffectDispatcher::new(store.clone(), notifier, payments, dlq.clone())
            .with_retry(settings.notification_retry, settings.payment_retry);
        if let Some(ref metrics) = settings.metrics {
            dispatcher = dispatcher.with_metrics(metrics.clone());
        }
        // Committed transitions never wait on effect delivery.
        let dispatcher = EffectDispatcher::spawn_with_mailbox(dispatcher, mailbox::unbounded());

        let mut engine = TransitionEngine::new(store, Arc::new(dispatcher.clone()));
        if let Some(metrics) = settings.metrics {
            engine = engine.with_metrics(metrics);
        }
        let claims = ClaimManager::new(engine.clone()).with_override_retry(settings.admin_override_retry);

        tracing::info!("Order service started");

        Self {
            engine,
            claims,
            dispatcher,
            dlq,
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, TransitionError> {
        self.engine.fetch(order_id).await
    }

    pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, TransitionError> {
        Ok(self.engine.store().list(filter).await?)
    }

    /// Unclaimed orders waiting in the role's queue.
    pub async fn available_for(&self, role: StaffRole) -> Result<Vec<Order>, TransitionError> {
        self.list_orders(&OrderFilter::available_for(role)).await
    }

    pub async fn orders_held_by(&self, staff_id: Uuid) -> Result<Vec<Order>, TransitionError> {
        self.list_orders(&OrderFilter::all().held_by(staff_id)).await
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    pub async fn place_order(&self, customer_id: Uuid, items: Vec<LineItem>) -> Result<Order, TransitionError> {
        self.engine.place(customer_id, items).await
    }

    pub async fn claim(
        &self,
        order_id: Uuid,
        role: StaffRole,
        actor: Caller,
        expected_version: u64,
    ) -> Result<Order, TransitionError> {
        self.claims.claim(order_id, role, actor, expected_version).await
    }

    pub async fn advance(
        &self,
        order_id: Uuid,
        to_status: OrderStatus,
        actor: Caller,
        expected_version: u64,
    ) -> Result<Order, TransitionError> {
        self.engine.advance(order_id, to_status, actor, expected_version).await
    }

    pub async fn cancel(
        &self,
        order_id: Uuid,
        actor: Caller,
        expected_version: u64,
        reason: Option<String>,
    ) -> Result<Order, TransitionError> {
        self.engine
            .apply(order_id, expected_version, OrderCommand::Cancel { reason }, actor)
            .await
    }

    // ------------------------------------------------------------------------
    // Administrative overrides
    // ------------------------------------------------------------------------

    pub async fn release(&self, order_id: Uuid, role: StaffRole, actor: Caller) -> Result<Order, TransitionError> {
        self.claims.release(order_id, role, actor).await
    }

    pub async fn reassign(
        &self,
        order_id: Uuid,
        role: StaffRole,
        new_holder: Caller,
        actor: Caller,
        expected_version: u64,
    ) -> Result<Order, TransitionError> {
        self.claims
            .reassign(order_id, role, new_holder, actor, expected_version)
            .await
    }

    pub async fn release_all_held_by(&self, holder_id: Uuid, actor: Caller) -> Result<Vec<Order>, TransitionError> {
        self.claims.release_all_held_by(holder_id, actor).await
    }

    // ------------------------------------------------------------------------
    // Payment subsystem
    // ------------------------------------------------------------------------

    /// Payment status reported by the payment subsystem. Does not change the
    /// order version.
    pub async fn record_payment(&self, order_id: Uuid, status: PaymentStatus) -> Result<Order, TransitionError> {
        let updated = self.engine.store().set_payment_status(order_id, status).await?;

        tracing::info!(
            order_id = %order_id,
            payment_status = %status,
            order_status = %updated.status,
            "Payment status recorded"
        );

        let recorded = PaymentRecorded {
            order_id,
            status,
            order_status: updated.status,
        };
        if self.dispatcher.tell(recorded).send().await.is_err() {
            tracing::error!(order_id = %order_id, "Effect dispatcher unavailable, payment effects dropped");
        }

        Ok(updated)
    }

    pub async fn dead_letters(&self, limit: usize) -> anyhow::Result<DeadLetterReport> {
        self.dlq
            .ask(GetDeadLetters { limit })
            .send()
            .await
            .map_err(|_| anyhow::anyhow!("dead letter queue unavailable"))
    }
}
