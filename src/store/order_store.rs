use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::order::{Order, OrderStatus, PaymentStatus, StaffRole};
use crate::utils::IsTransient;

// ============================================================================
// Order Store - Authoritative, versioned order records
// ============================================================================
//
// Responsibilities:
// 1. Insert new orders (version 0)
// 2. Compare-and-write: replace an order only if its stored version matches
// 3. Filtered reads for polling clients
// 4. Payment status updates driven by the effect dispatcher
//
// The store knows nothing about the lifecycle rules.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Order already exists: {0}")]
    AlreadyExists(Uuid),

    #[error("Concurrency conflict on order {order_id}: expected version {expected}, but current is {actual}")]
    VersionConflict {
        order_id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("Failed to encode order: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(error: impl std::fmt::Display) -> Self {
        StoreError::Backend(error.to_string())
    }
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}

/// Read filter used by dashboards that poll for work.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub statuses: Option<Vec<OrderStatus>>,
    pub claim_holder: Option<Uuid>,
    pub unclaimed: Option<StaffRole>,
    pub customer_id: Option<Uuid>,
    pub payment_status: Option<PaymentStatus>,
}

impl OrderFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.statuses.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn held_by(mut self, staff_id: Uuid) -> Self {
        self.claim_holder = Some(staff_id);
        self
    }

    pub fn placed_by(mut self, customer_id: Uuid) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }

    /// Orders sitting in the role's claim window with nobody holding them.
    pub fn available_for(role: StaffRole) -> Self {
        Self {
            statuses: Some(vec![role.claim_window()]),
            unclaimed: Some(role),
            ..Self::default()
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        if let Some(ref statuses) = self.statuses {
            if !statuses.contains(&order.status) {
                return false;
            }
        }

        if let Some(holder) = self.claim_holder {
            if order.roles_held_by(holder).is_empty() {
                return false;
            }
        }

        if let Some(role) = self.unclaimed {
            if order.claim(role).is_some() {
                return false;
            }
        }

        if let Some(customer_id) = self.customer_id {
            if order.customer_id != customer_id {
                return false;
            }
        }

        if let Some(payment_status) = self.payment_status {
            if order.payment_status != payment_status {
                return false;
            }
        }

        true
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a newly placed order. Fails if the id is taken.
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;

    async fn get(&self, order_id: Uuid) -> Result<Order, StoreError>;

    /// Replace the stored order with `updated` if and only if the stored
    /// version still equals `expected_version`. Returns the committed record.
    /// The stored payment status is kept; only the dispatcher changes it.
    async fn compare_and_swap(&self, expected_version: u64, updated: &Order) -> Result<Order, StoreError>;

    /// Overwrite the payment status without touching the order version.
    async fn set_payment_status(&self, order_id: Uuid, status: PaymentStatus) -> Result<Order, StoreError>;

    /// Orders matching `filter`, oldest first.
    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Claim, LineItem};
    use chrono::Utc;

    fn order() -> Order {
        Order::place(Uuid::new_v4(), vec![LineItem::new(Uuid::new_v4(), 1)], Utc::now()).unwrap()
    }

    #[test]
    fn test_available_for_kitchen() {
        let filter = OrderFilter::available_for(StaffRole::Kitchen);
        let mut order = order();
        assert!(filter.matches(&order));

        order.status = OrderStatus::Preparing;
        order.kitchen_claim = Some(Claim::new(Uuid::new_v4(), Utc::now()));
        assert!(!filter.matches(&order));
    }

    #[test]
    fn test_held_by_filter() {
        let chef = Uuid::new_v4();
        let mut order = order();
        order.status = OrderStatus::Preparing;
        order.kitchen_claim = Some(Claim::new(chef, Utc::now()));

        assert!(OrderFilter::all().held_by(chef).matches(&order));
        assert!(!OrderFilter::all().held_by(Uuid::new_v4()).matches(&order));
        assert!(OrderFilter::all()
            .with_status(OrderStatus::Preparing)
            .held_by(chef)
            .matches(&order));
        assert!(!OrderFilter::all().with_status(OrderStatus::Served).matches(&order));
    }

    #[test]
    fn test_customer_filter() {
        let order = order();
        assert!(OrderFilter::all().placed_by(order.customer_id).matches(&order));
        assert!(!OrderFilter::all().placed_by(Uuid::new_v4()).matches(&order));
    }

    #[test]
    fn test_payment_status_filter() {
        let mut order = order();
        let unpaid = OrderFilter::all().with_payment_status(PaymentStatus::Pending);
        let paid = OrderFilter::all().with_payment_status(PaymentStatus::Paid);
        assert!(unpaid.matches(&order));
        assert!(!paid.matches(&order));

        order.payment_status = PaymentStatus::Paid;
        assert!(paid.matches(&order));
        assert!(!paid.clone().placed_by(Uuid::new_v4()).matches(&order));
    }
}
