use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::order::PaymentStatus;

/// The payment subsystem as seen from the order core.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Ask the processor where the order's payment stands.
    async fn check_settlement(&self, order_id: Uuid) -> anyhow::Result<PaymentStatus>;

    async fn request_refund(&self, order_id: Uuid) -> anyhow::Result<()>;
}

/// Pay-at-the-counter setup: anything that reaches the end of service has
/// been paid, refunds are handled by hand at the till.
pub struct CounterPaymentGateway;

#[async_trait]
impl PaymentGateway for CounterPaymentGateway {
    async fn check_settlement(&self, order_id: Uuid) -> anyhow::Result<PaymentStatus> {
        tracing::debug!(order_id = %order_id, "Counter payment treated as settled");
        Ok(PaymentStatus::Paid)
    }

    async fn request_refund(&self, order_id: Uuid) -> anyhow::Result<()> {
        tracing::info!(order_id = %order_id, "Refund to be handed out at the counter");
        Ok(())
    }
}
