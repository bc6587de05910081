use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::value_objects::{Actor, OrderStatus, PaymentStatus, StaffRole, TransitionKind};

// ============================================================================
// Order Events - What a committed transition did
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Claimed {
        role: StaffRole,
        holder_id: Uuid,
    },
    MarkedReady {
        released_holder: Uuid,
    },
    Completed {
        released_holder: Uuid,
    },
    Cancelled {
        reason: Option<String>,
    },
    ClaimReleased {
        role: StaffRole,
        previous_holder: Uuid,
    },
    ClaimReassigned {
        role: StaffRole,
        previous_holder: Option<Uuid>,
        new_holder: Uuid,
    },
}

impl OrderEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Claimed { .. } => "OrderClaimed",
            OrderEvent::MarkedReady { .. } => "OrderMarkedReady",
            OrderEvent::Completed { .. } => "OrderCompleted",
            OrderEvent::Cancelled { .. } => "OrderCancelled",
            OrderEvent::ClaimReleased { .. } => "OrderClaimReleased",
            OrderEvent::ClaimReassigned { .. } => "OrderClaimReassigned",
        }
    }

    pub fn kind(&self) -> TransitionKind {
        match self {
            OrderEvent::Claimed { .. } => TransitionKind::Claimed,
            OrderEvent::MarkedReady { .. } => TransitionKind::MarkedReady,
            OrderEvent::Completed { .. } => TransitionKind::Completed,
            OrderEvent::Cancelled { .. } => TransitionKind::Cancelled,
            OrderEvent::ClaimReleased { .. } => TransitionKind::ClaimReleased,
            OrderEvent::ClaimReassigned { .. } => TransitionKind::ClaimReassigned,
        }
    }
}

/// Envelope handed to the effect dispatcher once a transition has committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub event_id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    /// Order version produced by this transition.
    pub version: u64,
    pub from_status: OrderStatus,
    pub to_status: OrderStatus,
    pub event: OrderEvent,
    pub actor: Actor,
    pub payment_status: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

impl TransitionEvent {
    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}
