use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;

// ============================================================================
// Order Value Objects
// ============================================================================

/// A single line of an order as handed over by the ordering subsystem.
/// The core never interprets the menu reference or modifiers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LineItem {
    pub menu_item_id: Uuid,
    pub quantity: u32,
    #[serde(default)]
    pub modifiers: Vec<String>,
}

impl LineItem {
    pub fn new(menu_item_id: Uuid, quantity: u32) -> Self {
        Self {
            menu_item_id,
            quantity,
            modifiers: Vec::new(),
        }
    }

    pub fn with_modifier(mut self, modifier: impl Into<String>) -> Self {
        self.modifiers.push(modifier.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Preparing,
    ReadyToServe,
    Served,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Preparing,
        OrderStatus::ReadyToServe,
        OrderStatus::Served,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Forward edges of the lifecycle. Administrative claim releases are the
    /// only way to move backwards and are not listed here.
    pub fn successors(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Preparing, OrderStatus::Cancelled],
            OrderStatus::Preparing => &[OrderStatus::ReadyToServe, OrderStatus::Cancelled],
            OrderStatus::ReadyToServe => &[OrderStatus::Served],
            OrderStatus::Served => &[OrderStatus::Completed],
            OrderStatus::Completed | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        self.successors().contains(&next)
    }

    /// Cancellation is only possible before the kitchen hands the order over.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Preparing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::ReadyToServe => "READY_TO_SERVE",
            OrderStatus::Served => "SERVED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two staff pools that can hold a claim on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaffRole {
    Kitchen,
    Service,
}

impl StaffRole {
    /// Status in which this role's claim may be acquired.
    pub fn claim_window(&self) -> OrderStatus {
        match self {
            StaffRole::Kitchen => OrderStatus::Pending,
            StaffRole::Service => OrderStatus::ReadyToServe,
        }
    }

    /// Status the order holds for as long as this role's claim is set.
    pub fn held_status(&self) -> OrderStatus {
        match self {
            StaffRole::Kitchen => OrderStatus::Preparing,
            StaffRole::Service => OrderStatus::Served,
        }
    }

    pub fn actor_role(&self) -> ActorRole {
        match self {
            StaffRole::Kitchen => ActorRole::Kitchen,
            StaffRole::Service => ActorRole::Service,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Kitchen => "kitchen",
            StaffRole::Service => "service",
        }
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role supplied by the identity provider with every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Customer,
    Kitchen,
    Service,
    Administrator,
}

impl ActorRole {
    pub fn staff_role(&self) -> Option<StaffRole> {
        match self {
            ActorRole::Kitchen => Some(StaffRole::Kitchen),
            ActorRole::Service => Some(StaffRole::Service),
            ActorRole::Customer | ActorRole::Administrator => None,
        }
    }
}

/// Authenticated caller. The core trusts this value as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: Uuid, role: ActorRole) -> Self {
        Self { id, role }
    }

    pub fn customer(id: Uuid) -> Self {
        Self::new(id, ActorRole::Customer)
    }

    pub fn kitchen(id: Uuid) -> Self {
        Self::new(id, ActorRole::Kitchen)
    }

    pub fn service(id: Uuid) -> Self {
        Self::new(id, ActorRole::Service)
    }

    pub fn administrator(id: Uuid) -> Self {
        Self::new(id, ActorRole::Administrator)
    }

    pub fn is_administrator(&self) -> bool {
        self.role == ActorRole::Administrator
    }
}

/// Exclusive, role-scoped lock held by one staff member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub holder_id: Uuid,
    pub claimed_at: DateTime<Utc>,
}

impl Claim {
    pub fn new(holder_id: Uuid, claimed_at: DateTime<Utc>) -> Self {
        Self { holder_id, claimed_at }
    }

    pub fn is_held_by(&self, actor_id: Uuid) -> bool {
        self.holder_id == actor_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    RefundRequested,
    Refunded,
}

impl PaymentStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::RefundRequested => "REFUND_REQUESTED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            PaymentStatus::Pending,
            PaymentStatus::Paid,
            PaymentStatus::Failed,
            PaymentStatus::RefundRequested,
            PaymentStatus::Refunded,
        ]
        .into_iter()
        .find(|s| s.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of change produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Claimed,
    MarkedReady,
    Completed,
    Cancelled,
    ClaimReleased,
    ClaimReassigned,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Claimed => "claimed",
            TransitionKind::MarkedReady => "marked_ready",
            TransitionKind::Completed => "completed",
            TransitionKind::Cancelled => "cancelled",
            TransitionKind::ClaimReleased => "claim_released",
            TransitionKind::ClaimReassigned => "claim_reassigned",
        }
    }
}

/// Append-only audit record of one committed transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from_status: OrderStatus,
    pub to_status: OrderStatus,
    pub actor_id: Uuid,
    pub actor_role: ActorRole,
    pub action: TransitionKind,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses_have_no_successors() {
        for status in OrderStatus::ALL {
            assert_eq!(status.is_terminal(), status.successors().is_empty());
        }
    }

    #[test]
    fn test_lifecycle_edges() {
        assert!(OrderStatus::Pending.can_advance_to(OrderStatus::Preparing));
        assert!(OrderStatus::Preparing.can_advance_to(OrderStatus::ReadyToServe));
        assert!(OrderStatus::ReadyToServe.can_advance_to(OrderStatus::Served));
        assert!(OrderStatus::Served.can_advance_to(OrderStatus::Completed));

        assert!(!OrderStatus::Pending.can_advance_to(OrderStatus::ReadyToServe));
        assert!(!OrderStatus::ReadyToServe.can_advance_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Served.can_advance_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_advance_to(OrderStatus::Pending));
    }

    #[test]
    fn test_cancellable_window() {
        let cancellable: Vec<_> = OrderStatus::ALL
            .into_iter()
            .filter(|s| s.is_cancellable())
            .collect();
        assert_eq!(cancellable, vec![OrderStatus::Pending, OrderStatus::Preparing]);
    }

    #[test]
    fn test_role_windows() {
        assert_eq!(StaffRole::Kitchen.claim_window(), OrderStatus::Pending);
        assert_eq!(StaffRole::Kitchen.held_status(), OrderStatus::Preparing);
        assert_eq!(StaffRole::Service.claim_window(), OrderStatus::ReadyToServe);
        assert_eq!(StaffRole::Service.held_status(), OrderStatus::Served);

        for role in [StaffRole::Kitchen, StaffRole::Service] {
            assert!(role.claim_window().can_advance_to(role.held_status()));
            assert_eq!(role.actor_role().staff_role(), Some(role));
        }
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&OrderStatus::ReadyToServe).unwrap();
        assert_eq!(json, "\"READY_TO_SERVE\"");
        assert_eq!(OrderStatus::parse("ready_to_serve"), Some(OrderStatus::ReadyToServe));
        assert_eq!(OrderStatus::parse("shipped"), None);
    }

    #[test]
    fn test_payment_status_parse() {
        assert_eq!(PaymentStatus::parse("refund_requested"), Some(PaymentStatus::RefundRequested));
        assert!(PaymentStatus::Paid.is_settled());
        assert!(!PaymentStatus::Pending.is_settled());
    }
}
