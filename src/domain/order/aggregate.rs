use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::claims::{self, ClaimOutcome};
use super::commands::OrderCommand;
use super::errors::{OrderError, Rejection};
use super::events::OrderEvent;
use super::value_objects::{
    Actor, Claim, LineItem, OrderStatus, PaymentStatus, StaffRole, StatusChange, TransitionKind,
};

// ============================================================================
// Order Aggregate - Lifecycle rules
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub customer_id: Uuid,
    pub version: u64,

    pub items: Vec<LineItem>,
    pub status: OrderStatus,

    // Claims, one slot per staff pool
    pub kitchen_claim: Option<Claim>,
    pub service_claim: Option<Claim>,

    pub payment_status: PaymentStatus,

    // Audit Trail
    pub status_history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a fresh `PENDING` order at version 0.
    pub fn place(customer_id: Uuid, items: Vec<LineItem>, now: DateTime<Utc>) -> Result<Self, OrderError> {
        Self::validate_items(&items)?;

        Ok(Self {
            id: Uuid::new_v4(),
            customer_id,
            version: 0,
            items,
            status: OrderStatus::Pending,
            kitchen_claim: None,
            service_claim: None,
            payment_status: PaymentStatus::Pending,
            status_history: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    fn validate_items(items: &[LineItem]) -> Result<(), OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyItems);
        }

        for item in items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity(item.quantity));
            }
        }

        Ok(())
    }

    pub fn claim(&self, role: StaffRole) -> Option<&Claim> {
        match role {
            StaffRole::Kitchen => self.kitchen_claim.as_ref(),
            StaffRole::Service => self.service_claim.as_ref(),
        }
    }

    fn claim_slot(&mut self, role: StaffRole) -> &mut Option<Claim> {
        match role {
            StaffRole::Kitchen => &mut self.kitchen_claim,
            StaffRole::Service => &mut self.service_claim,
        }
    }

    /// Roles whose claim is currently held by `staff_id`.
    pub fn roles_held_by(&self, staff_id: Uuid) -> Vec<StaffRole> {
        [StaffRole::Kitchen, StaffRole::Service]
            .into_iter()
            .filter(|role| self.claim(*role).is_some_and(|c| c.is_held_by(staff_id)))
            .collect()
    }

    /// A claim retried by the staff member who already holds it.
    pub fn is_replay(&self, command: &OrderCommand, actor: &Actor) -> bool {
        match command {
            OrderCommand::Claim { role } => {
                matches!(claims::evaluate_claim(self, *role, actor), Ok(ClaimOutcome::Reassert))
            }
            _ => false,
        }
    }

    /// Validate a command against the current state. `Ok(None)` means the
    /// command is already satisfied and nothing needs to be written.
    pub fn handle_command(&self, command: &OrderCommand, actor: &Actor) -> Result<Option<OrderEvent>, OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::invalid(self.status, Rejection::Terminal));
        }

        let event = match command {
            OrderCommand::Claim { role } => match claims::evaluate_claim(self, *role, actor)? {
                ClaimOutcome::Reassert => return Ok(None),
                ClaimOutcome::Acquire => OrderEvent::Claimed {
                    role: *role,
                    holder_id: actor.id,
                },
            },

            OrderCommand::MarkReady => OrderEvent::MarkedReady {
                released_holder: self.require_holder(StaffRole::Kitchen, actor)?,
            },

            OrderCommand::MarkCompleted => OrderEvent::Completed {
                released_holder: self.require_holder(StaffRole::Service, actor)?,
            },

            OrderCommand::Cancel { reason } => {
                if !self.status.is_cancellable() {
                    return Err(OrderError::invalid(self.status, Rejection::WrongState));
                }
                if !actor.is_administrator() && actor.id != self.customer_id {
                    return Err(OrderError::invalid(self.status, Rejection::NotOwner));
                }

                OrderEvent::Cancelled { reason: reason.clone() }
            }

            OrderCommand::Release { role, holder } => {
                self.require_administrator(actor)?;

                let previous_holder = self
                    .claim(*role)
                    .map(|c| c.holder_id)
                    .ok_or(OrderError::invalid(self.status, Rejection::NoClaimHeld(*role)))?;

                if holder.is_some_and(|expected| expected != previous_holder) {
                    return Err(OrderError::invalid(self.status, Rejection::HolderChanged(*role)));
                }

                OrderEvent::ClaimReleased {
                    role: *role,
                    previous_holder,
                }
            }

            OrderCommand::Reassign { role, new_holder } => {
                self.require_administrator(actor)?;

                if new_holder.role.staff_role() != Some(*role) {
                    return Err(OrderError::invalid(self.status, Rejection::NotInStaffPool(*role)));
                }

                let previous_holder = if self.status == role.held_status() {
                    match self.claim(*role) {
                        Some(claim) if claim.is_held_by(new_holder.id) => return Ok(None),
                        Some(claim) => Some(claim.holder_id),
                        None => None,
                    }
                } else if self.status == role.claim_window() {
                    None
                } else {
                    return Err(OrderError::invalid(self.status, Rejection::WrongState));
                };

                OrderEvent::ClaimReassigned {
                    role: *role,
                    previous_holder,
                    new_holder: new_holder.id,
                }
            }
        };

        let target = self.next_status(&event);
        if target != self.status && !self.status.can_advance_to(target) && !is_override(&event) {
            return Err(OrderError::invalid(self.status, Rejection::UnreachableTarget(target)));
        }

        Ok(Some(event))
    }

    /// Apply a validated event: new status, claim slots, history, version.
    pub fn apply_event(&mut self, event: &OrderEvent, actor: &Actor, at: DateTime<Utc>) -> StatusChange {
        let from_status = self.status;
        let to_status = self.next_status(event);

        match event {
            OrderEvent::Claimed { role, holder_id } => {
                *self.claim_slot(*role) = Some(Claim::new(*holder_id, at));
            }
            OrderEvent::MarkedReady { .. } => {
                self.kitchen_claim = None;
            }
            OrderEvent::Completed { .. } => {
                self.service_claim = None;
            }
            OrderEvent::Cancelled { .. } => {
                self.kitchen_claim = None;
                self.service_claim = None;
            }
            OrderEvent::ClaimReleased { role, .. } => {
                *self.claim_slot(*role) = None;
            }
            OrderEvent::ClaimReassigned { role, new_holder, .. } => {
                *self.claim_slot(*role) = Some(Claim::new(*new_holder, at));
            }
        }

        let change = StatusChange {
            from_status,
            to_status,
            actor_id: actor.id,
            actor_role: actor.role,
            action: event.kind(),
            timestamp: at,
        };

        self.status = to_status;
        self.version += 1;
        self.updated_at = at;
        self.status_history.push(change.clone());

        change
    }

    fn next_status(&self, event: &OrderEvent) -> OrderStatus {
        match event {
            OrderEvent::Claimed { role, .. } => role.held_status(),
            OrderEvent::MarkedReady { .. } => OrderStatus::ReadyToServe,
            OrderEvent::Completed { .. } => OrderStatus::Completed,
            OrderEvent::Cancelled { .. } => OrderStatus::Cancelled,
            OrderEvent::ClaimReleased { role, .. } => role.claim_window(),
            OrderEvent::ClaimReassigned { role, .. } => role.held_status(),
        }
    }

    fn require_holder(&self, role: StaffRole, actor: &Actor) -> Result<Uuid, OrderError> {
        if self.status != role.held_status() {
            return Err(OrderError::invalid(self.status, Rejection::WrongState));
        }

        match self.claim(role) {
            Some(claim) if claim.is_held_by(actor.id) => Ok(claim.holder_id),
            _ => Err(OrderError::invalid(self.status, Rejection::NotClaimHolder(role))),
        }
    }

    fn require_administrator(&self, actor: &Actor) -> Result<(), OrderError> {
        if actor.is_administrator() {
            Ok(())
        } else {
            Err(OrderError::invalid(self.status, Rejection::AdministratorOnly))
        }
    }
}

/// Administrative releases move an order back into its queue state.
fn is_override(event: &OrderEvent) -> bool {
    matches!(event.kind(), TransitionKind::ClaimReleased | TransitionKind::ClaimReassigned)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_order() -> (Order, Actor) {
        let customer = Actor::customer(Uuid::new_v4());
        let order = Order::place(
            customer.id,
            vec![LineItem::new(Uuid::new_v4(), 2).with_modifier("oat milk")],
            Utc::now(),
        )
        .unwrap();
        (order, customer)
    }

    fn run(order: &mut Order, command: OrderCommand, actor: &Actor) -> Result<Option<StatusChange>, OrderError> {
        match order.handle_command(&command, actor)? {
            Some(event) => Ok(Some(order.apply_event(&event, actor, Utc::now()))),
            None => Ok(None),
        }
    }

    #[test]
    fn test_place_order_validation() {
        assert!(matches!(
            Order::place(Uuid::new_v4(), vec![], Utc::now()),
            Err(OrderError::EmptyItems)
        ));
        assert!(matches!(
            Order::place(Uuid::new_v4(), vec![LineItem::new(Uuid::new_v4(), 0)], Utc::now()),
            Err(OrderError::InvalidQuantity(0))
        ));

        let (order, _) = pending_order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.version, 0);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.status_history.is_empty());
    }

    #[test]
    fn test_full_lifecycle_updates_claims_and_history() {
        let (mut order, _) = pending_order();
        let chef = Actor::kitchen(Uuid::new_v4());
        let waiter = Actor::service(Uuid::new_v4());

        run(&mut order, OrderCommand::Claim { role: StaffRole::Kitchen }, &chef).unwrap();
        assert_eq!(order.status, OrderStatus::Preparing);
        assert_eq!(order.kitchen_claim.unwrap().holder_id, chef.id);

        run(&mut order, OrderCommand::MarkReady, &chef).unwrap();
        assert_eq!(order.status, OrderStatus::ReadyToServe);
        assert!(order.kitchen_claim.is_none());

        run(&mut order, OrderCommand::Claim { role: StaffRole::Service }, &waiter).unwrap();
        assert_eq!(order.status, OrderStatus::Served);
        assert_eq!(order.service_claim.unwrap().holder_id, waiter.id);

        run(&mut order, OrderCommand::MarkCompleted, &waiter).unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert!(order.service_claim.is_none());

        assert_eq!(order.version, 4);
        let path: Vec<_> = order.status_history.iter().map(|c| (c.from_status, c.to_status)).collect();
        assert_eq!(
            path,
            vec![
                (OrderStatus::Pending, OrderStatus::Preparing),
                (OrderStatus::Preparing, OrderStatus::ReadyToServe),
                (OrderStatus::ReadyToServe, OrderStatus::Served),
                (OrderStatus::Served, OrderStatus::Completed),
            ]
        );
        assert_eq!(order.status_history[2].actor_id, waiter.id);
    }

    #[test]
    fn test_second_chef_is_denied() {
        let (mut order, _) = pending_order();
        let chef_a = Actor::kitchen(Uuid::new_v4());
        let chef_b = Actor::kitchen(Uuid::new_v4());

        run(&mut order, OrderCommand::Claim { role: StaffRole::Kitchen }, &chef_a).unwrap();
        let result = order.handle_command(&OrderCommand::Claim { role: StaffRole::Kitchen }, &chef_b);

        assert_eq!(
            result,
            Err(OrderError::ClaimDenied {
                role: StaffRole::Kitchen,
                holder_id: chef_a.id
            })
        );
    }

    #[test]
    fn test_holder_reclaim_is_a_no_op() {
        let (mut order, _) = pending_order();
        let chef = Actor::kitchen(Uuid::new_v4());
        let claim = OrderCommand::Claim { role: StaffRole::Kitchen };

        run(&mut order, claim.clone(), &chef).unwrap();
        let before = order.clone();

        assert!(order.is_replay(&claim, &chef));
        assert_eq!(order.handle_command(&claim, &chef), Ok(None));
        assert_eq!(order, before);
    }

    #[test]
    fn test_only_holder_marks_ready() {
        let (mut order, _) = pending_order();
        let chef = Actor::kitchen(Uuid::new_v4());
        let other_chef = Actor::kitchen(Uuid::new_v4());

        run(&mut order, OrderCommand::Claim { role: StaffRole::Kitchen }, &chef).unwrap();
        let result = order.handle_command(&OrderCommand::MarkReady, &other_chef);

        assert_eq!(
            result,
            Err(OrderError::invalid(OrderStatus::Preparing, Rejection::NotClaimHolder(StaffRole::Kitchen)))
        );
    }

    #[test]
    fn test_waiter_cannot_claim_kitchen_phase() {
        let (order, _) = pending_order();
        let waiter = Actor::service(Uuid::new_v4());

        assert_eq!(
            order.handle_command(&OrderCommand::Claim { role: StaffRole::Kitchen }, &waiter),
            Err(OrderError::invalid(OrderStatus::Pending, Rejection::NotInStaffPool(StaffRole::Kitchen)))
        );
        assert_eq!(
            order.handle_command(&OrderCommand::Claim { role: StaffRole::Service }, &waiter),
            Err(OrderError::invalid(OrderStatus::Pending, Rejection::WrongState))
        );
    }

    #[test]
    fn test_cancellation_guards() {
        let (mut order, owner) = pending_order();
        let stranger = Actor::customer(Uuid::new_v4());
        let cancel = OrderCommand::Cancel { reason: Some("changed my mind".to_string()) };

        assert_eq!(
            order.handle_command(&cancel, &stranger),
            Err(OrderError::invalid(OrderStatus::Pending, Rejection::NotOwner))
        );

        run(&mut order, cancel.clone(), &owner).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);

        let chef = Actor::kitchen(Uuid::new_v4());
        assert_eq!(
            order.handle_command(&OrderCommand::Claim { role: StaffRole::Kitchen }, &chef),
            Err(OrderError::invalid(OrderStatus::Cancelled, Rejection::Terminal))
        );
    }

    #[test]
    fn test_cancel_while_preparing_drops_kitchen_claim() {
        let (mut order, _) = pending_order();
        let chef = Actor::kitchen(Uuid::new_v4());
        let admin = Actor::administrator(Uuid::new_v4());

        run(&mut order, OrderCommand::Claim { role: StaffRole::Kitchen }, &chef).unwrap();
        run(&mut order, OrderCommand::Cancel { reason: None }, &admin).unwrap();

        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.kitchen_claim.is_none());
    }

    #[test]
    fn test_no_cancel_once_ready() {
        let (mut order, owner) = pending_order();
        let chef = Actor::kitchen(Uuid::new_v4());

        run(&mut order, OrderCommand::Claim { role: StaffRole::Kitchen }, &chef).unwrap();
        run(&mut order, OrderCommand::MarkReady, &chef).unwrap();

        assert_eq!(
            order.handle_command(&OrderCommand::Cancel { reason: None }, &owner),
            Err(OrderError::invalid(OrderStatus::ReadyToServe, Rejection::WrongState))
        );
    }

    #[test]
    fn test_release_requeues_order() {
        let (mut order, _) = pending_order();
        let chef = Actor::kitchen(Uuid::new_v4());
        let admin = Actor::administrator(Uuid::new_v4());
        let release = OrderCommand::Release { role: StaffRole::Kitchen, holder: None };

        assert_eq!(
            order.handle_command(&release, &admin),
            Err(OrderError::invalid(OrderStatus::Pending, Rejection::NoClaimHeld(StaffRole::Kitchen)))
        );

        run(&mut order, OrderCommand::Claim { role: StaffRole::Kitchen }, &chef).unwrap();
        assert_eq!(
            order.handle_command(&release, &chef),
            Err(OrderError::invalid(OrderStatus::Preparing, Rejection::AdministratorOnly))
        );

        let change = run(&mut order, release, &admin).unwrap().unwrap();
        assert_eq!(change.to_status, OrderStatus::Pending);
        assert_eq!(change.action, TransitionKind::ClaimReleased);
        assert!(order.kitchen_claim.is_none());
        assert_eq!(order.version, 2);
    }

    #[test]
    fn test_reassign_swaps_holder() {
        let (mut order, _) = pending_order();
        let chef_a = Actor::kitchen(Uuid::new_v4());
        let chef_b = Actor::kitchen(Uuid::new_v4());
        let admin = Actor::administrator(Uuid::new_v4());

        run(&mut order, OrderCommand::Claim { role: StaffRole::Kitchen }, &chef_a).unwrap();
        let reassign = OrderCommand::Reassign { role: StaffRole::Kitchen, new_holder: chef_b };

        run(&mut order, reassign.clone(), &admin).unwrap();
        assert_eq!(order.status, OrderStatus::Preparing);
        assert_eq!(order.kitchen_claim.unwrap().holder_id, chef_b.id);

        assert_eq!(order.handle_command(&reassign, &admin), Ok(None));
    }

    #[test]
    fn test_reassign_from_queue_claims_on_behalf() {
        let (mut order, _) = pending_order();
        let waiter = Actor::service(Uuid::new_v4());
        let admin = Actor::administrator(Uuid::new_v4());

        let result = order.handle_command(
            &OrderCommand::Reassign { role: StaffRole::Service, new_holder: waiter },
            &admin,
        );
        assert_eq!(result, Err(OrderError::invalid(OrderStatus::Pending, Rejection::WrongState)));

        let chef = Actor::kitchen(Uuid::new_v4());
        run(&mut order, OrderCommand::Reassign { role: StaffRole::Kitchen, new_holder: chef }, &admin).unwrap();
        assert_eq!(order.status, OrderStatus::Preparing);
        assert_eq!(order.kitchen_claim.unwrap().holder_id, chef.id);
    }

    #[test]
    fn test_reassign_stays_within_staff_pool() {
        let (mut order, customer) = pending_order();
        let chef = Actor::kitchen(Uuid::new_v4());
        let waiter = Actor::service(Uuid::new_v4());
        let admin = Actor::administrator(Uuid::new_v4());

        run(&mut order, OrderCommand::Claim { role: StaffRole::Kitchen }, &chef).unwrap();

        for outsider in [waiter, customer, admin] {
            assert_eq!(
                order.handle_command(
                    &OrderCommand::Reassign { role: StaffRole::Kitchen, new_holder: outsider },
                    &admin
                ),
                Err(OrderError::invalid(OrderStatus::Preparing, Rejection::NotInStaffPool(StaffRole::Kitchen)))
            );
        }
        assert_eq!(order.kitchen_claim.unwrap().holder_id, chef.id);
    }

    #[test]
    fn test_release_of_named_holder_refuses_someone_else() {
        let (mut order, _) = pending_order();
        let chef_a = Actor::kitchen(Uuid::new_v4());
        let chef_b = Actor::kitchen(Uuid::new_v4());
        let admin = Actor::administrator(Uuid::new_v4());

        run(&mut order, OrderCommand::Claim { role: StaffRole::Kitchen }, &chef_a).unwrap();
        run(&mut order, OrderCommand::Reassign { role: StaffRole::Kitchen, new_holder: chef_b }, &admin).unwrap();

        let release_a = OrderCommand::Release { role: StaffRole::Kitchen, holder: Some(chef_a.id) };
        assert_eq!(
            order.handle_command(&release_a, &admin),
            Err(OrderError::invalid(OrderStatus::Preparing, Rejection::HolderChanged(StaffRole::Kitchen)))
        );

        let release_b = OrderCommand::Release { role: StaffRole::Kitchen, holder: Some(chef_b.id) };
        run(&mut order, release_b, &admin).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.kitchen_claim.is_none());
    }

    #[test]
    fn test_claims_never_overlap_phases() {
        let (mut order, _) = pending_order();
        let chef = Actor::kitchen(Uuid::new_v4());
        let waiter = Actor::service(Uuid::new_v4());

        let steps = [
            (OrderCommand::Claim { role: StaffRole::Kitchen }, chef),
            (OrderCommand::MarkReady, chef),
            (OrderCommand::Claim { role: StaffRole::Service }, waiter),
            (OrderCommand::MarkCompleted, waiter),
        ];

        for (command, actor) in steps {
            run(&mut order, command, &actor).unwrap();
            assert_eq!(order.kitchen_claim.is_some(), order.status == OrderStatus::Preparing);
            assert_eq!(order.service_claim.is_some(), order.status == OrderStatus::Served);
        }
    }

    #[test]
    fn test_roles_held_by() {
        let (mut order, _) = pending_order();
        let chef = Actor::kitchen(Uuid::new_v4());

        assert!(order.roles_held_by(chef.id).is_empty());
        run(&mut order, OrderCommand::Claim { role: StaffRole::Kitchen }, &chef).unwrap();
        assert_eq!(order.roles_held_by(chef.id), vec![StaffRole::Kitchen]);
    }
}
