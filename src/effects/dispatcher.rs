use async_trait::async_trait;
use chrono::Utc;
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::Actor;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use super::dlq::{AddToDlq, DeadLetter, DeadLetterQueue};
use super::notifications::{plan_notifications, NotificationSink};
use super::payments::PaymentGateway;
use crate::domain::order::{EffectPublisher, OrderStatus, PaymentStatus, TransitionEvent};
use crate::metrics::Metrics;
use crate::store::OrderStore;
use crate::utils::{retry_with_backoff, RetryConfig, RetryResult};

// ============================================================================
// Effect Dispatcher Actor
// ============================================================================
//
// Turns committed transitions into side effects:
//
// - notifications from the catalogue in `notifications.rs`
// - COMPLETED: settlement check, result written to payment_status
// - CANCELLED: refund request when the order was already paid
//
// Each event id is dispatched once; duplicates are dropped. Every effect runs
// on its own task with exponential backoff and lands in the dead letter queue
// after its last attempt. Nothing here can undo a committed transition.
//
// ============================================================================

const DEFAULT_DEDUP_WINDOW: usize = 10_000;

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone)]
pub struct Dispatch(pub TransitionEvent);

/// A payment status that has already been written to the store.
#[derive(Debug, Clone)]
pub struct PaymentRecorded {
    pub order_id: Uuid,
    pub status: PaymentStatus,
    pub order_status: OrderStatus,
}

// ============================================================================
// Actor
// ============================================================================

pub struct EffectDispatcher {
    store: Arc<dyn OrderStore>,
    notifier: Arc<dyn NotificationSink>,
    payments: Arc<dyn PaymentGateway>,
    runner: EffectRunner,
    notification_retry: RetryConfig,
    payment_retry: RetryConfig,
    seen: HashSet<Uuid>,
    seen_order: VecDeque<Uuid>,
    dedup_window: usize,
}

impl EffectDispatcher {
    pub fn new(
        store: Arc<dyn OrderStore>,
        notifier: Arc<dyn NotificationSink>,
        payments: Arc<dyn PaymentGateway>,
        dlq: ActorRef<DeadLetterQueue>,
    ) -> Self {
        Self {
            store,
            notifier,
            payments,
            runner: EffectRunner { dlq, metrics: None },
            notification_retry: RetryConfig::notifications(),
            payment_retry: RetryConfig::payments(),
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.runner.metrics = Some(metrics);
        self
    }

    pub fn with_retry(mut self, notifications: RetryConfig, payments: RetryConfig) -> Self {
        self.notification_retry = notifications;
        self.payment_retry = payments;
        self
    }

    /// Number of recent event ids remembered for de-duplication.
    pub fn with_dedup_window(mut self, window: usize) -> Self {
        self.dedup_window = window.max(1);
        self
    }

    /// Returns false if the event id was already dispatched.
    fn remember(&mut self, event_id: Uuid) -> bool {
        if !self.seen.insert(event_id) {
            return false;
        }

        self.seen_order.push_back(event_id);
        if self.seen_order.len() > self.dedup_window {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    fn spawn_notifications(&self, event: &TransitionEvent) {
        for notification in plan_notifications(event) {
            let runner = self.runner.clone();
            let notifier = self.notifier.clone();
            let retry = self.notification_retry.clone();
            let (event_id, order_id) = (event.event_id, event.order_id);

            tokio::spawn(async move {
                let payload = letter_payload(&notification);
                let (notifier, notification) = (&notifier, &notification);

                runner
                    .run("notification", event_id, order_id, payload, retry, || async move {
                        notifier.deliver(notification).await
                    })
                    .await;
            });
        }
    }

    fn spawn_settlement_check(&self, event_id: Uuid, order_id: Uuid) {
        let runner = self.runner.clone();
        let store = self.store.clone();
        let payments = self.payments.clone();
        let retry = self.payment_retry.clone();

        tokio::spawn(async move {
            let (store, payments) = (&store, &payments);
            let payload = serde_json::json!({ "order_id": order_id });

            runner
                .run("settlement_check", event_id, order_id, payload, retry, || async move {
                    let status = payments.check_settlement(order_id).await?;
                    store.set_payment_status(order_id, status).await?;

                    tracing::info!(order_id = %order_id, payment_status = %status, "Settlement checked");
                    Ok::<(), anyhow::Error>(())
                })
                .await;
        });
    }

    fn spawn_refund(&self, event_id: Uuid, order_id: Uuid) {
        let runner = self.runner.clone();
        let store = self.store.clone();
        let payments = self.payments.clone();
        let retry = self.payment_retry.clone();

        tokio::spawn(async move {
            let (store, payments) = (&store, &payments);
            let payload = serde_json::json!({ "order_id": order_id });

            runner
                .run("refund_request", event_id, order_id, payload, retry, || async move {
                    let current = store.get(order_id).await?;
                    if !current.payment_status.is_settled() {
                        tracing::debug!(
                            order_id = %order_id,
                            payment_status = %current.payment_status,
                            "Nothing to refund"
                        );
                        return Ok(());
                    }

                    payments.request_refund(order_id).await?;
                    store.set_payment_status(order_id, PaymentStatus::RefundRequested).await?;

                    tracing::info!(order_id = %order_id, "Refund requested");
                    Ok::<(), anyhow::Error>(())
                })
                .await;
        });
    }
}

impl Actor for EffectDispatcher {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!(dedup_window = state.dedup_window, "EffectDispatcher started");
        Ok(state)
    }
}

impl Message<Dispatch> for EffectDispatcher {
    /// Whether the event was new.
    type Reply = bool;

    async fn handle(&mut self, msg: Dispatch, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let event = msg.0;

        if !self.remember(event.event_id) {
            tracing::debug!(event_id = %event.event_id, "Duplicate transition event ignored");
            if let Some(ref metrics) = self.runner.metrics {
                metrics.effects_deduplicated.inc();
            }
            return false;
        }

        tracing::debug!(
            event_id = %event.event_id,
            order_id = %event.order_id,
            event_type = event.event_type(),
            to = %event.to_status,
            "Dispatching effects"
        );

        self.spawn_notifications(&event);

        match event.to_status {
            OrderStatus::Completed => self.spawn_settlement_check(event.event_id, event.order_id),
            OrderStatus::Cancelled => self.spawn_refund(event.event_id, event.order_id),
            _ => {}
        }

        true
    }
}

impl Message<PaymentRecorded> for EffectDispatcher {
    type Reply = ();

    async fn handle(&mut self, msg: PaymentRecorded, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        // Money that arrives after a cancellation goes straight back.
        if msg.order_status == OrderStatus::Cancelled && msg.status.is_settled() {
            tracing::info!(order_id = %msg.order_id, "Payment settled on a cancelled order");
            self.spawn_refund(Uuid::now_v7(), msg.order_id);
        }
    }
}

#[async_trait]
impl EffectPublisher for ActorRef<EffectDispatcher> {
    async fn publish(&self, event: TransitionEvent) {
        let event_id = event.event_id;
        if self.tell(Dispatch(event)).send().await.is_err() {
            tracing::error!(event_id = %event_id, "Effect dispatcher unavailable, effects dropped");
        }
    }
}

// ============================================================================
// Effect Runner - retry, metrics, dead letters
// ============================================================================

/// What a dead letter carries about the failed effect. An effect that cannot
/// be encoded still gets a letter, with the encoding error in its place.
fn letter_payload<T: Serialize>(value: &T) -> serde_json::Value {
    match serde_json::to_value(value) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode effect payload");
            serde_json::json!({ "encode_error": e.to_string() })
        }
    }
}

#[derive(Clone)]
struct EffectRunner {
    dlq: ActorRef<DeadLetterQueue>,
    metrics: Option<Arc<Metrics>>,
}

impl EffectRunner {
    async fn run<F, Fut>(
        &self,
        effect: &'static str,
        event_id: Uuid,
        order_id: Uuid,
        payload: serde_json::Value,
        retry: RetryConfig,
        mut operation: F,
    ) where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let attempts = retry.max_attempts;
        let metrics = self.metrics.as_deref();

        let result = retry_with_backoff(retry, |attempt| {
            if let Some(metrics) = metrics {
                metrics.record_retry_attempt(effect, attempt);
            }
            operation()
        })
        .await;

        match result {
            RetryResult::Success(()) => {
                if let Some(metrics) = metrics {
                    metrics.record_effect(effect, true);
                }
            }
            RetryResult::Failed(e) | RetryResult::PermanentFailure(e) => {
                if let Some(metrics) = metrics {
                    metrics.record_effect(effect, false);
                }

                let letter = DeadLetter {
                    id: Uuid::new_v4(),
                    event_id,
                    order_id,
                    effect: effect.to_string(),
                    payload,
                    error_message: format!("{:#}", e),
                    attempts,
                    failed_at: Utc::now(),
                };

                if self.dlq.tell(AddToDlq(letter)).send().await.is_err() {
                    tracing::error!(
                        event_id = %event_id,
                        effect = effect,
                        "Dead letter queue unavailable, failed effect lost"
                    );
                }
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
