use std::fmt;
use uuid::Uuid;
use super::value_objects::{OrderStatus, StaffRole};

// ============================================================================
// Order Business Rule Errors
// ============================================================================

/// Why a transition request was refused by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The order's current status does not allow this action.
    WrongState,
    /// The order is completed or cancelled.
    Terminal,
    /// Actor does not hold the claim this action requires.
    NotClaimHolder(StaffRole),
    /// Actor does not belong to the staff pool the action is scoped to.
    NotInStaffPool(StaffRole),
    /// Only the customer who placed the order or an administrator may cancel.
    NotOwner,
    AdministratorOnly,
    NoClaimHeld(StaffRole),
    /// The claim is now held by someone other than the expected holder.
    HolderChanged(StaffRole),
    /// No transition leads to the requested status.
    UnreachableTarget(OrderStatus),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::WrongState => write!(f, "action not allowed in current status"),
            Rejection::Terminal => write!(f, "order is closed"),
            Rejection::NotClaimHolder(role) => write!(f, "actor does not hold the {} claim", role),
            Rejection::NotInStaffPool(role) => write!(f, "actor is not {} staff", role),
            Rejection::NotOwner => write!(f, "only the order owner or an administrator may cancel"),
            Rejection::AdministratorOnly => write!(f, "administrator override required"),
            Rejection::NoClaimHeld(role) => write!(f, "no {} claim is held", role),
            Rejection::HolderChanged(role) => write!(f, "the {} claim has changed hands", role),
            Rejection::UnreachableTarget(to) => write!(f, "{} is not adjacent to the current status", to),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("Invalid transition from {from}: {reason}")]
    InvalidTransition {
        from: OrderStatus,
        reason: Rejection,
    },

    #[error("The {role} claim is already held by {holder_id}")]
    ClaimDenied {
        role: StaffRole,
        holder_id: Uuid,
    },

    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Invalid item quantity: {0}")]
    InvalidQuantity(u32),
}

impl OrderError {
    pub fn invalid(from: OrderStatus, reason: Rejection) -> Self {
        OrderError::InvalidTransition { from, reason }
    }
}
