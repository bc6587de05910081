use uuid::Uuid;

use super::aggregate::Order;
use super::commands::OrderCommand;
use super::engine::{TransitionEngine, TransitionError};
use super::errors::{OrderError, Rejection};
use super::value_objects::{Actor, StaffRole};
use crate::store::OrderFilter;
use crate::utils::{retry_on_transient, RetryConfig};

// ============================================================================
// Claim Manager - Kitchen and service claim locks
// ============================================================================
//
// Both roles share one guard, parameterized by the role's claim window:
//
//   role      claim window      held status
//   kitchen   PENDING           PREPARING
//   service   READY_TO_SERVE    SERVED
//
// Acquiring a claim and advancing into the held status are one write. The
// claim goes away when the holder moves the order on, when it is cancelled,
// or when an administrator releases or reassigns it.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Nobody holds the claim and the order sits in the claim window.
    Acquire,
    /// The actor already holds the claim; nothing to write.
    Reassert,
}

/// The claim guard, shared by both staff pools.
pub fn evaluate_claim(order: &Order, role: StaffRole, actor: &Actor) -> Result<ClaimOutcome, OrderError> {
    if order.status.is_terminal() {
        return Err(OrderError::invalid(order.status, Rejection::Terminal));
    }

    if actor.role.staff_role() != Some(role) {
        return Err(OrderError::invalid(order.status, Rejection::NotInStaffPool(role)));
    }

    if let Some(claim) = order.claim(role) {
        if claim.is_held_by(actor.id) {
            return Ok(ClaimOutcome::Reassert);
        }
        return Err(OrderError::ClaimDenied {
            role,
            holder_id: claim.holder_id,
        });
    }

    if order.status != role.claim_window() {
        return Err(OrderError::invalid(order.status, Rejection::WrongState));
    }

    Ok(ClaimOutcome::Acquire)
}

#[derive(Clone)]
pub struct ClaimManager {
    engine: TransitionEngine,
    override_retry: RetryConfig,
}

impl ClaimManager {
    pub fn new(engine: TransitionEngine) -> Self {
        Self {
            engine,
            override_retry: RetryConfig::admin_override(),
        }
    }

    pub fn with_override_retry(mut self, retry: RetryConfig) -> Self {
        self.override_retry = retry;
        self
    }

    /// Acquire the role's claim and advance the order into the role's phase.
    /// Retried by the current holder it returns the order unchanged, whatever
    /// version the retry carries.
    pub async fn claim(
        &self,
        order_id: Uuid,
        role: StaffRole,
        actor: Actor,
        expected_version: u64,
    ) -> Result<Order, TransitionError> {
        self.engine
            .apply(order_id, expected_version, OrderCommand::Claim { role }, actor)
            .await
    }

    /// Administrative release. Administrators act on whatever the order looks
    /// like right now, so a stale snapshot is refetched and the release tried
    /// again.
    pub async fn release(&self, order_id: Uuid, role: StaffRole, actor: Actor) -> Result<Order, TransitionError> {
        self.release_claim(order_id, role, None, actor).await
    }

    /// Release that only goes through while `holder` (when given) still holds
    /// the claim.
    async fn release_claim(
        &self,
        order_id: Uuid,
        role: StaffRole,
        holder: Option<Uuid>,
        actor: Actor,
    ) -> Result<Order, TransitionError> {
        let engine = &self.engine;

        retry_on_transient(self.override_retry.clone(), |attempt| async move {
            let current = engine.fetch(order_id).await?;

            tracing::debug!(
                order_id = %order_id,
                role = %role,
                version = current.version,
                attempt = attempt,
                "Releasing claim"
            );

            engine
                .apply(order_id, current.version, OrderCommand::Release { role, holder }, actor)
                .await
        })
        .await
        .into_result()
    }

    pub async fn reassign(
        &self,
        order_id: Uuid,
        role: StaffRole,
        new_holder: Actor,
        actor: Actor,
        expected_version: u64,
    ) -> Result<Order, TransitionError> {
        self.engine
            .apply(order_id, expected_version, OrderCommand::Reassign { role, new_holder }, actor)
            .await
    }

    /// Release every claim held by a staff member who is no longer available.
    /// Claims that moved on between the lookup and the release are skipped.
    pub async fn release_all_held_by(&self, holder_id: Uuid, actor: Actor) -> Result<Vec<Order>, TransitionError> {
        let held = self
            .engine
            .store()
            .list(&OrderFilter::all().held_by(holder_id))
            .await?;

        let mut released = Vec::new();
        for order in held {
            for role in order.roles_held_by(holder_id) {
                match self.release_claim(order.id, role, Some(holder_id), actor).await {
                    Ok(updated) => released.push(updated),
                    Err(TransitionError::InvalidTransition {
                        reason: Rejection::NoClaimHeld(_) | Rejection::HolderChanged(_),
                        ..
                    }) => {
                        tracing::debug!(order_id = %order.id, role = %role, "Claim already gone");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        tracing::info!(
            holder_id = %holder_id,
            released = released.len(),
            "Released claims held by staff member"
        );

        Ok(released)
    }
}
