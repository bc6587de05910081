use uuid::Uuid;
use super::value_objects::{Actor, OrderStatus, StaffRole, TransitionKind};

// ============================================================================
// Order Commands - Transition requests issued by staff, customers and admins
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum OrderCommand {
    /// Acquire the role's claim and advance into the role's phase.
    Claim {
        role: StaffRole,
    },
    /// Kitchen claim holder hands the order over to service.
    MarkReady,
    /// Service claim holder closes the order.
    MarkCompleted,
    Cancel {
        reason: Option<String>,
    },
    /// Administrative override: drop the claim and requeue the order.
    /// With `holder` set, only that staff member's claim is dropped.
    Release {
        role: StaffRole,
        holder: Option<Uuid>,
    },
    /// Administrative override: hand the claim to another member of the
    /// role's staff pool.
    Reassign {
        role: StaffRole,
        new_holder: Actor,
    },
}

impl OrderCommand {
    /// Maps a requested target status onto the command that reaches it.
    pub fn advance_to(target: OrderStatus) -> Option<Self> {
        match target {
            OrderStatus::Preparing => Some(OrderCommand::Claim { role: StaffRole::Kitchen }),
            OrderStatus::ReadyToServe => Some(OrderCommand::MarkReady),
            OrderStatus::Served => Some(OrderCommand::Claim { role: StaffRole::Service }),
            OrderStatus::Completed => Some(OrderCommand::MarkCompleted),
            OrderStatus::Cancelled => Some(OrderCommand::Cancel { reason: None }),
            OrderStatus::Pending => None,
        }
    }

    pub fn kind(&self) -> TransitionKind {
        match self {
            OrderCommand::Claim { .. } => TransitionKind::Claimed,
            OrderCommand::MarkReady => TransitionKind::MarkedReady,
            OrderCommand::MarkCompleted => TransitionKind::Completed,
            OrderCommand::Cancel { .. } => TransitionKind::Cancelled,
            OrderCommand::Release { .. } => TransitionKind::ClaimReleased,
            OrderCommand::Reassign { .. } => TransitionKind::ClaimReassigned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_targets() {
        assert_eq!(
            OrderCommand::advance_to(OrderStatus::Preparing),
            Some(OrderCommand::Claim { role: StaffRole::Kitchen })
        );
        assert_eq!(
            OrderCommand::advance_to(OrderStatus::Served),
            Some(OrderCommand::Claim { role: StaffRole::Service })
        );
        assert_eq!(OrderCommand::advance_to(OrderStatus::Completed), Some(OrderCommand::MarkCompleted));
        assert_eq!(OrderCommand::advance_to(OrderStatus::Pending), None);
    }
}
