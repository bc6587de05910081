// ============================================================================
// Effects - What happens after a transition commits
// ============================================================================

pub mod dispatcher;
pub mod dlq;
pub mod notifications;
pub mod payments;

pub use dispatcher::{Dispatch, EffectDispatcher, PaymentRecorded};
pub use dlq::{AddToDlq, DeadLetter, DeadLetterQueue, DeadLetterReport, GetDeadLetters};
pub use notifications::{plan_notifications, LogNotificationSink, Notification, NotificationKind, NotificationSink, Recipient};
pub use payments::{CounterPaymentGateway, PaymentGateway};
