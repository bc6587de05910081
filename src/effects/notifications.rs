use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::{OrderEvent, OrderStatus, StaffRole, TransitionEvent};

// ============================================================================
// Notification Catalogue
// ============================================================================
//
// Which messages a committed transition produces:
//
//   to PREPARING        customer "being prepared"
//   to READY_TO_SERVE   customer "ready" + service pool "ready to serve"
//   to SERVED           customer "enjoy your meal"
//   to COMPLETED        customer "thank you"
//   to CANCELLED        customer "cancelled"
//   claim released      customer "minor delay" + role's pool "back in queue"
//   claim reassigned    new holder "assigned to you", previous holder
//                       "reassigned", customer as for the new status
//
// Delivery is someone else's job (NotificationSink).
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recipient {
    Customer(Uuid),
    Staff(Uuid),
    StaffPool(StaffRole),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Info,
    OrderReady,
    OrderAssigned,
    Delay,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: Recipient,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    fn new(
        event: &TransitionEvent,
        recipient: Recipient,
        kind: NotificationKind,
        title: &str,
        message: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient,
            kind,
            title: title.to_string(),
            message,
            data: serde_json::json!({
                "order_id": event.order_id,
                "status": event.to_status,
                "version": event.version,
                "event_id": event.event_id,
            }),
            created_at: event.occurred_at,
        }
    }

    /// Routing key for the broker: everything about one order lands in one
    /// partition.
    pub fn key(&self) -> String {
        self.data
            .get("order_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Short order reference shown to people.
fn short_ref(order_id: Uuid) -> String {
    order_id.simple().to_string()[..8].to_string()
}

pub fn plan_notifications(event: &TransitionEvent) -> Vec<Notification> {
    let order_ref = short_ref(event.order_id);
    let customer = Recipient::Customer(event.customer_id);
    let mut planned = Vec::new();

    match event.event {
        OrderEvent::ClaimReleased { role, .. } => {
            planned.push(Notification::new(
                event,
                customer,
                NotificationKind::Delay,
                "Minor delay",
                format!("Your order #{} is being handed to another member of our team.", order_ref),
            ));
            planned.push(Notification::new(
                event,
                Recipient::StaffPool(role),
                NotificationKind::Info,
                "Order Back in Queue",
                format!("Order #{} is waiting to be picked up again.", order_ref),
            ));
            return planned;
        }

        OrderEvent::ClaimReassigned {
            role,
            previous_holder,
            new_holder,
        } => {
            let instruction = match role {
                StaffRole::Kitchen => "Please start preparation.",
                StaffRole::Service => "Please serve it.",
            };
            planned.push(Notification::new(
                event,
                Recipient::Staff(new_holder),
                NotificationKind::OrderAssigned,
                "Order Assigned to You",
                format!("Order #{} has been assigned to you by an administrator. {}", order_ref, instruction),
            ));

            if let Some(previous) = previous_holder {
                planned.push(Notification::new(
                    event,
                    Recipient::Staff(previous),
                    NotificationKind::Info,
                    "Order Reassigned",
                    format!("Order #{} has been reassigned to a colleague.", order_ref),
                ));
            }

            // Only a claim made on someone's behalf changes what the customer sees.
            if event.from_status == event.to_status {
                return planned;
            }
        }

        _ => {}
    }

    match event.to_status {
        OrderStatus::Preparing => planned.push(Notification::new(
            event,
            customer,
            NotificationKind::Info,
            "Your order is being prepared!",
            format!("Your order #{} is now being prepared by our chef.", order_ref),
        )),
        OrderStatus::ReadyToServe => {
            planned.push(Notification::new(
                event,
                customer,
                NotificationKind::OrderReady,
                "Your order is ready!",
                format!("Your order #{} is ready and will be served soon.", order_ref),
            ));
            planned.push(Notification::new(
                event,
                Recipient::StaffPool(StaffRole::Service),
                NotificationKind::OrderReady,
                "Order Ready to Serve",
                format!("Order #{} is ready to serve. Please pick it up.", order_ref),
            ));
        }
        OrderStatus::Served => planned.push(Notification::new(
            event,
            customer,
            NotificationKind::Info,
            "Enjoy your meal!",
            format!("Your order #{} has been served.", order_ref),
        )),
        OrderStatus::Completed => planned.push(Notification::new(
            event,
            customer,
            NotificationKind::Info,
            "Thank you!",
            format!("Your order #{} is complete. We hope you enjoyed it.", order_ref),
        )),
        OrderStatus::Cancelled => {
            let message = match event.event {
                OrderEvent::Cancelled { reason: Some(ref reason) } => {
                    format!("Your order #{} has been cancelled: {}", order_ref, reason)
                }
                _ => format!("Your order #{} has been cancelled.", order_ref),
            };
            planned.push(Notification::new(
                event,
                customer,
                NotificationKind::Cancelled,
                "Order Cancelled",
                message,
            ));
        }
        OrderStatus::Pending => {}
    }

    planned
}

// ============================================================================
// Delivery
// ============================================================================

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Writes notifications to the log. Used when no broker is configured.
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::info!(
            notification_id = %notification.id,
            recipient = ?notification.recipient,
            kind = ?notification.kind,
            title = %notification.title,
            "{}",
            notification.message
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Actor, PaymentStatus};

    fn event(from_status: OrderStatus, to_status: OrderStatus, order_event: OrderEvent) -> TransitionEvent {
        TransitionEvent {
            event_id: Uuid::now_v7(),
            order_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            version: 2,
            from_status,
            to_status,
            event: order_event,
            actor: Actor::kitchen(Uuid::new_v4()),
            payment_status: PaymentStatus::Pending,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_ready_to_serve_notifies_service_pool() {
        let event = event(
            OrderStatus::Preparing,
            OrderStatus::ReadyToServe,
            OrderEvent::MarkedReady {
                released_holder: Uuid::new_v4(),
            },
        );

        let planned = plan_notifications(&event);
        let recipients: Vec<_> = planned.iter().map(|n| n.recipient).collect();

        assert_eq!(
            recipients,
            vec![
                Recipient::Customer(event.customer_id),
                Recipient::StaffPool(StaffRole::Service)
            ]
        );
        assert_eq!(planned[1].title, "Order Ready to Serve");
        assert_eq!(planned[1].key(), event.order_id.to_string());
    }

    #[test]
    fn test_release_warns_customer_of_delay() {
        let event = event(
            OrderStatus::Preparing,
            OrderStatus::Pending,
            OrderEvent::ClaimReleased {
                role: StaffRole::Kitchen,
                previous_holder: Uuid::new_v4(),
            },
        );

        let planned = plan_notifications(&event);
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].kind, NotificationKind::Delay);
        assert_eq!(planned[1].recipient, Recipient::StaffPool(StaffRole::Kitchen));
    }

    #[test]
    fn test_reassign_in_place_skips_customer() {
        let new_holder = Uuid::new_v4();
        let previous = Uuid::new_v4();
        let event = event(
            OrderStatus::Preparing,
            OrderStatus::Preparing,
            OrderEvent::ClaimReassigned {
                role: StaffRole::Kitchen,
                previous_holder: Some(previous),
                new_holder,
            },
        );

        let planned = plan_notifications(&event);
        let recipients: Vec<_> = planned.iter().map(|n| n.recipient).collect();
        assert_eq!(recipients, vec![Recipient::Staff(new_holder), Recipient::Staff(previous)]);
        assert_eq!(planned[0].title, "Order Assigned to You");
    }

    #[test]
    fn test_cancellation_carries_reason() {
        let event = event(
            OrderStatus::Pending,
            OrderStatus::Cancelled,
            OrderEvent::Cancelled {
                reason: Some("table left".to_string()),
            },
        );

        let planned = plan_notifications(&event);
        assert_eq!(planned.len(), 1);
        assert!(planned[0].message.ends_with("table left"));
    }
}
