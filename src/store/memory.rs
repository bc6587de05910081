use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::order::{Order, PaymentStatus};
use super::order_store::{OrderFilter, OrderStore, StoreError};

// ============================================================================
// In-Memory Order Store
// ============================================================================
//
// Each order sits behind its own mutex. The map lock is only taken to find or
// insert a record and is never held while an order is being written, so
// writers on different orders never wait on each other.
//
// ============================================================================

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<Uuid, Arc<Mutex<Order>>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, order_id: Uuid) -> Result<Arc<Mutex<Order>>, StoreError> {
        self.orders
            .read()
            .await
            .get(&order_id)
            .cloned()
            .ok_or(StoreError::NotFound(order_id))
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(StoreError::AlreadyExists(order.id));
        }

        orders.insert(order.id, Arc::new(Mutex::new(order.clone())));

        tracing::debug!(order_id = %order.id, "Stored new order");
        Ok(())
    }

    async fn get(&self, order_id: Uuid) -> Result<Order, StoreError> {
        let record = self.record(order_id).await?;
        let order = record.lock().await.clone();
        Ok(order)
    }

    async fn compare_and_swap(&self, expected_version: u64, updated: &Order) -> Result<Order, StoreError> {
        let record = self.record(updated.id).await?;
        let mut stored = record.lock().await;

        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                order_id: updated.id,
                expected: expected_version,
                actual: stored.version,
            });
        }

        let payment_status = stored.payment_status;
        *stored = updated.clone();
        stored.payment_status = payment_status;

        Ok(stored.clone())
    }

    async fn set_payment_status(&self, order_id: Uuid, status: PaymentStatus) -> Result<Order, StoreError> {
        let record = self.record(order_id).await?;
        let mut stored = record.lock().await;
        stored.payment_status = status;
        Ok(stored.clone())
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let records: Vec<_> = self.orders.read().await.values().cloned().collect();

        let mut matching = Vec::new();
        for record in records {
            let order = record.lock().await;
            if filter.matches(&order) {
                matching.push(order.clone());
            }
        }

        matching.sort_by_key(|o| o.created_at);
        Ok(matching)
    }
}
