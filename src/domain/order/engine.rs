use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::aggregate::Order;
use super::commands::OrderCommand;
use super::errors::{OrderError, Rejection};
use super::events::TransitionEvent;
use super::value_objects::{Actor, LineItem, OrderStatus, StaffRole};
use crate::metrics::Metrics;
use crate::store::{OrderStore, StoreError};
use crate::utils::IsTransient;

// ============================================================================
// Transition Engine
// ============================================================================
//
// Every mutation of an order goes through `apply`:
//
// 1. Read the current record
// 2. A claim retried by its holder returns the order as is
// 3. Caller's expected version must match (StaleVersion otherwise)
// 4. Validate against the lifecycle and claim rules (Order::handle_command)
// 5. Compare-and-write the new record at version + 1
// 6. Hand the committed transition to the effect publisher
//
// Nothing is written on any error path. Effects are fire-and-forget: a
// failing effect never surfaces here.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Stale version for order {order_id}: expected {expected}, current is {actual}")]
    StaleVersion {
        order_id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid transition from {from}: {reason}")]
    InvalidTransition {
        from: OrderStatus,
        reason: Rejection,
    },

    #[error("The {role} claim is already taken by {holder_id}")]
    ClaimDenied {
        role: StaffRole,
        holder_id: Uuid,
    },

    #[error("Invalid order: {0}")]
    InvalidOrder(OrderError),

    #[error(transparent)]
    Store(StoreError),
}

impl TransitionError {
    /// Only a stale snapshot is worth retrying, after a refetch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransitionError::StaleVersion { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransitionError::NotFound(_) => "not_found",
            TransitionError::StaleVersion { .. } => "stale_version",
            TransitionError::InvalidTransition { .. } => "invalid_transition",
            TransitionError::ClaimDenied { .. } => "claim_denied",
            TransitionError::InvalidOrder(_) => "invalid_order",
            TransitionError::Store(_) => "store",
        }
    }
}

impl From<OrderError> for TransitionError {
    fn from(error: OrderError) -> Self {
        match error {
            OrderError::InvalidTransition { from, reason } => TransitionError::InvalidTransition { from, reason },
            OrderError::ClaimDenied { role, holder_id } => TransitionError::ClaimDenied { role, holder_id },
            other => TransitionError::InvalidOrder(other),
        }
    }
}

impl From<StoreError> for TransitionError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(order_id) => TransitionError::NotFound(order_id),
            StoreError::VersionConflict { order_id, expected, actual } => {
                TransitionError::StaleVersion { order_id, expected, actual }
            }
            other => TransitionError::Store(other),
        }
    }
}

impl IsTransient for TransitionError {
    fn is_transient(&self) -> bool {
        match self {
            TransitionError::StaleVersion { .. } => true,
            TransitionError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Receives committed transitions. Implementations must not block the caller.
#[async_trait]
pub trait EffectPublisher: Send + Sync {
    async fn publish(&self, event: TransitionEvent);
}

/// Publisher for callers that do not want any effects.
pub struct NoEffects;

#[async_trait]
impl EffectPublisher for NoEffects {
    async fn publish(&self, _event: TransitionEvent) {}
}

#[derive(Clone)]
pub struct TransitionEngine {
    store: Arc<dyn OrderStore>,
    effects: Arc<dyn EffectPublisher>,
    metrics: Option<Arc<Metrics>>,
}

impl TransitionEngine {
    pub fn new(store: Arc<dyn OrderStore>, effects: Arc<dyn EffectPublisher>) -> Self {
        Self {
            store,
            effects,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub async fn fetch(&self, order_id: Uuid) -> Result<Order, TransitionError> {
        Ok(self.store.get(order_id).await?)
    }

    /// Create a `PENDING` order at version 0.
    pub async fn place(&self, customer_id: Uuid, items: Vec<LineItem>) -> Result<Order, TransitionError> {
        let order = Order::place(customer_id, items, Utc::now())?;
        self.store.insert(&order).await?;

        tracing::info!(
            order_id = %order.id,
            customer_id = %customer_id,
            items = order.items.len(),
            "Order placed"
        );

        Ok(order)
    }

    pub async fn apply(
        &self,
        order_id: Uuid,
        expected_version: u64,
        command: OrderCommand,
        actor: Actor,
    ) -> Result<Order, TransitionError> {
        self.execute(order_id, expected_version, command, None, actor).await
    }

    /// Move the order to `to_status` using whichever transition reaches it.
    pub async fn advance(
        &self,
        order_id: Uuid,
        to_status: OrderStatus,
        actor: Actor,
        expected_version: u64,
    ) -> Result<Order, TransitionError> {
        match OrderCommand::advance_to(to_status) {
            Some(command) => {
                self.execute(order_id, expected_version, command, Some(to_status), actor)
                    .await
            }
            None => {
                // Nothing moves an order back to PENDING except an admin release.
                let current = self.fetch(order_id).await?;
                check_version(&current, expected_version)?;
                Err(TransitionError::InvalidTransition {
                    from: current.status,
                    reason: Rejection::UnreachableTarget(to_status),
                })
            }
        }
    }

    async fn execute(
        &self,
        order_id: Uuid,
        expected_version: u64,
        command: OrderCommand,
        target: Option<OrderStatus>,
        actor: Actor,
    ) -> Result<Order, TransitionError> {
        let started = Instant::now();
        let action = command.kind().as_str();

        let result = self.commit(order_id, expected_version, command, target, actor).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok((order, Some(event))) => {
                if let Some(ref metrics) = self.metrics {
                    metrics.record_commit(action, event.to_status.as_str(), elapsed);
                }

                tracing::info!(
                    order_id = %order_id,
                    event_id = %event.event_id,
                    from = %event.from_status,
                    to = %event.to_status,
                    version = order.version,
                    actor_id = %actor.id,
                    action = action,
                    "Transition committed"
                );

                self.effects.publish(event).await;
                Ok(order)
            }
            Ok((order, None)) => {
                tracing::debug!(
                    order_id = %order_id,
                    version = order.version,
                    actor_id = %actor.id,
                    action = action,
                    "Request already satisfied, nothing written"
                );
                Ok(order)
            }
            Err(e) => {
                if let Some(ref metrics) = self.metrics {
                    metrics.record_rejection(action, e.label(), elapsed);
                }

                tracing::debug!(
                    order_id = %order_id,
                    expected_version = expected_version,
                    actor_id = %actor.id,
                    action = action,
                    error = %e,
                    "Transition rejected"
                );
                Err(e)
            }
        }
    }

    async fn commit(
        &self,
        order_id: Uuid,
        expected_version: u64,
        command: OrderCommand,
        target: Option<OrderStatus>,
        actor: Actor,
    ) -> Result<(Order, Option<TransitionEvent>), TransitionError> {
        let current = self.store.get(order_id).await?;

        if current.is_replay(&command, &actor) {
            return Ok((current, None));
        }

        check_version(&current, expected_version)?;

        if let Some(to) = target {
            if !current.status.is_terminal() && !current.status.can_advance_to(to) {
                return Err(TransitionError::InvalidTransition {
                    from: current.status,
                    reason: Rejection::UnreachableTarget(to),
                });
            }
        }

        let Some(event) = current.handle_command(&command, &actor)? else {
            return Ok((current, None));
        };

        let now = Utc::now();
        let mut next = current.clone();
        let change = next.apply_event(&event, &actor, now);

        let committed = self.store.compare_and_swap(expected_version, &next).await?;

        let transition = TransitionEvent {
            event_id: Uuid::now_v7(),
            order_id,
            customer_id: committed.customer_id,
            version: committed.version,
            from_status: change.from_status,
            to_status: change.to_status,
            event,
            actor,
            payment_status: committed.payment_status,
            occurred_at: now,
        };

        Ok((committed, Some(transition)))
    }
}

fn check_version(order: &Order, expected_version: u64) -> Result<(), TransitionError> {
    if order.version != expected_version {
        return Err(TransitionError::StaleVersion {
            order_id: order.id,
            expected: expected_version,
            actual: order.version,
        });
    }
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderEvent;
    use crate::store::InMemoryOrderStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<TransitionEvent>>,
    }

    impl RecordingPublisher {
        fn events(&self) -> Vec<TransitionEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EffectPublisher for RecordingPublisher {
        async fn publish(&self, event: TransitionEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    async fn setup() -> (TransitionEngine, Arc<RecordingPublisher>, Order) {
        let store = Arc::new(InMemoryOrderStore::new());
        let effects = Arc::new(RecordingPublisher::default());
        let engine = TransitionEngine::new(store, effects.clone());

        let order = engine
            .place(Uuid::new_v4(), vec![LineItem::new(Uuid::new_v4(), 2)])
            .await
            .unwrap();

        (engine, effects, order)
    }

    #[tokio::test]
    async fn test_place_rejects_empty_order() {
        let (engine, _, _) = setup().await;
        let result = engine.place(Uuid::new_v4(), vec![]).await;
        assert!(matches!(result, Err(TransitionError::InvalidOrder(OrderError::EmptyItems))));
    }

    #[tokio::test]
    async fn test_commit_bumps_version_and_publishes() {
        let (engine, effects, order) = setup().await;
        let chef = Actor::kitchen(Uuid::new_v4());

        let updated = engine
            .advance(order.id, OrderStatus::Preparing, chef, 0)
            .await
            .unwrap();

        assert_eq!(updated.version, 1);
        assert_eq!(updated.status, OrderStatus::Preparing);

        let events = effects.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].version, 1);
        assert_eq!(events[0].from_status, OrderStatus::Pending);
        assert_eq!(events[0].to_status, OrderStatus::Preparing);
        assert_eq!(
            events[0].event,
            OrderEvent::Claimed {
                role: StaffRole::Kitchen,
                holder_id: chef.id
            }
        );
    }

    #[tokio::test]
    async fn test_stale_version_is_distinct_from_guard_failure() {
        let (engine, effects, order) = setup().await;
        let chef = Actor::kitchen(Uuid::new_v4());

        let result = engine.advance(order.id, OrderStatus::Preparing, chef, 3).await;
        assert!(matches!(
            result,
            Err(TransitionError::StaleVersion { expected: 3, actual: 0, .. })
        ));
        assert!(result.unwrap_err().is_retryable());

        let result = engine.advance(order.id, OrderStatus::ReadyToServe, chef, 0).await;
        assert!(matches!(
            result,
            Err(TransitionError::InvalidTransition {
                from: OrderStatus::Pending,
                reason: Rejection::UnreachableTarget(OrderStatus::ReadyToServe)
            })
        ));

        assert_eq!(engine.fetch(order.id).await.unwrap(), order);
        assert!(effects.events().is_empty());
    }

    #[tokio::test]
    async fn test_advance_to_pending_is_unreachable() {
        let (engine, _, order) = setup().await;
        let admin = Actor::administrator(Uuid::new_v4());

        let result = engine.advance(order.id, OrderStatus::Pending, admin, 0).await;
        assert!(matches!(
            result,
            Err(TransitionError::InvalidTransition {
                reason: Rejection::UnreachableTarget(OrderStatus::Pending),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let (engine, _, _) = setup().await;
        let chef = Actor::kitchen(Uuid::new_v4());

        let result = engine.advance(Uuid::new_v4(), OrderStatus::Preparing, chef, 0).await;
        assert!(matches!(result, Err(TransitionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_replayed_claim_publishes_nothing() {
        let (engine, effects, order) = setup().await;
        let chef = Actor::kitchen(Uuid::new_v4());
        let claim = OrderCommand::Claim { role: StaffRole::Kitchen };

        engine.apply(order.id, 0, claim.clone(), chef).await.unwrap();
        let replay = engine.apply(order.id, 0, claim, chef).await.unwrap();

        assert_eq!(replay.version, 1);
        assert_eq!(effects.events().len(), 1);
    }

    #[tokio::test]
    async fn test_claim_denied_after_commit() {
        let (engine, _, order) = setup().await;
        let chef_a = Actor::kitchen(Uuid::new_v4());
        let chef_b = Actor::kitchen(Uuid::new_v4());

        engine.advance(order.id, OrderStatus::Preparing, chef_a, 0).await.unwrap();
        let result = engine.advance(order.id, OrderStatus::Preparing, chef_b, 1).await;

        assert!(matches!(
            result,
            Err(TransitionError::ClaimDenied { role: StaffRole::Kitchen, holder_id }) if holder_id == chef_a.id
        ));
    }

    #[tokio::test]
    async fn test_metrics_record_commits_and_rejections() {
        let store = Arc::new(InMemoryOrderStore::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let engine = TransitionEngine::new(store, Arc::new(NoEffects)).with_metrics(metrics.clone());

        let order = engine
            .place(Uuid::new_v4(), vec![LineItem::new(Uuid::new_v4(), 1)])
            .await
            .unwrap();
        let chef = Actor::kitchen(Uuid::new_v4());

        engine.advance(order.id, OrderStatus::Preparing, chef, 0).await.unwrap();
        let _ = engine.advance(order.id, OrderStatus::Preparing, chef, 0).await;
        let _ = engine.advance(order.id, OrderStatus::ReadyToServe, chef, 0).await;

        assert_eq!(
            metrics.transitions_committed.with_label_values(&["claimed", "PREPARING"]).get(),
            1
        );
        assert_eq!(
            metrics.transitions_rejected.with_label_values(&["marked_ready", "stale_version"]).get(),
            1
        );
    }
}
