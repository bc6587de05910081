use chrono::{DateTime, Utc};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::reply::{Reply, ReplyError};
use kameo::Actor;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

use crate::metrics::Metrics;

// ============================================================================
// Dead Letter Queue Actor
// ============================================================================
//
// Holds effects that failed every retry so an operator can look at them.
// Bounded: once full, the oldest letter is dropped to make room.
//
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub event_id: Uuid,
    pub order_id: Uuid,
    pub effect: String,
    pub payload: serde_json::Value,
    pub error_message: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

// ============================================================================
// Messages
// ============================================================================

pub struct AddToDlq(pub DeadLetter);

pub struct GetDeadLetters {
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DeadLetterReport {
    /// Letters received since start, including any evicted ones
    pub total_received: u64,
    pub by_effect: HashMap<String, u64>,
    /// Newest first
    pub letters: Vec<DeadLetter>,
}

impl Reply for DeadLetterReport {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> {
        Ok(self)
    }

    fn into_any_err(self) -> Option<Box<dyn ReplyError>> {
        None
    }

    fn into_value(self) -> Self::Value {
        self
    }
}

// ============================================================================
// Actor
// ============================================================================

pub struct DeadLetterQueue {
    letters: VecDeque<DeadLetter>,
    capacity: usize,
    total_received: u64,
    by_effect: HashMap<String, u64>,
    metrics: Option<Arc<Metrics>>,
}

impl DeadLetterQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            letters: VecDeque::new(),
            capacity: capacity.max(1),
            total_received: 0,
            by_effect: HashMap::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

impl Actor for DeadLetterQueue {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!(capacity = state.capacity, "DeadLetterQueue started");
        Ok(state)
    }
}

impl Message<AddToDlq> for DeadLetterQueue {
    type Reply = ();

    async fn handle(&mut self, msg: AddToDlq, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let letter = msg.0;

        tracing::error!(
            event_id = %letter.event_id,
            order_id = %letter.order_id,
            effect = %letter.effect,
            attempts = letter.attempts,
            error = %letter.error_message,
            "Effect moved to dead letter queue"
        );

        if let Some(ref metrics) = self.metrics {
            metrics.record_dead_letter(&letter.effect);
        }

        self.total_received += 1;
        *self.by_effect.entry(letter.effect.clone()).or_insert(0) += 1;

        if self.letters.len() == self.capacity {
            if let Some(evicted) = self.letters.pop_front() {
                tracing::warn!(letter_id = %evicted.id, "Dead letter queue full, dropping oldest letter");
            }
        }
        self.letters.push_back(letter);
    }
}

impl Message<GetDeadLetters> for DeadLetterQueue {
    type Reply = DeadLetterReport;

    async fn handle(&mut self, msg: GetDeadLetters, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        DeadLetterReport {
            total_received: self.total_received,
            by_effect: self.by_effect.clone(),
            letters: self.letters.iter().rev().take(msg.limit).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kameo::prelude::*;

    fn letter(effect: &str) -> DeadLetter {
        DeadLetter {
            id: Uuid::new_v4(),
            event_id: Uuid::now_v7(),
            order_id: Uuid::new_v4(),
            effect: effect.to_string(),
            payload: serde_json::Value::Null,
            error_message: "gateway timeout".to_string(),
            attempts: 5,
            failed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_bounded_queue_keeps_newest() {
        let dlq = DeadLetterQueue::spawn(DeadLetterQueue::new(2));

        let letters: Vec<_> = ["notification", "refund_request", "refund_request"]
            .into_iter()
            .map(letter)
            .collect();
        for l in &letters {
            assert!(dlq.tell(AddToDlq(l.clone())).send().await.is_ok());
        }

        let Ok(report) = dlq.ask(GetDeadLetters { limit: 10 }).send().await else {
            panic!("dead letter queue stopped");
        };

        assert_eq!(report.total_received, 3);
        assert_eq!(report.by_effect.get("refund_request"), Some(&2));
        let kept: Vec<_> = report.letters.iter().map(|l| l.id).collect();
        assert_eq!(kept, vec![letters[2].id, letters[1].id]);
    }
}
