use anyhow::{Context as _, Result};
use async_trait::async_trait;
use prometheus::IntGauge;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;

use crate::effects::{Notification, NotificationSink};
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

// ============================================================================
// Redpanda Notification Transport
// ============================================================================
//
// Notifications are published as JSON onto one topic, keyed by order id so a
// consumer sees an order's messages in commit order. The producer sits behind
// a circuit breaker: while the broker is down, sends fail fast and the effect
// dispatcher's retries and dead letter queue take over.
//
// ============================================================================

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RedpandaClient {
    producer: FutureProducer,
    topic: String,
    circuit_breaker: CircuitBreaker,
}

impl RedpandaClient {
    pub fn new(brokers: &str, topic: impl Into<String>, breaker: CircuitBreakerConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .with_context(|| format!("Failed to create Redpanda producer for {}", brokers))?;

        Ok(Self {
            producer,
            topic: topic.into(),
            circuit_breaker: CircuitBreaker::new("redpanda", breaker),
        })
    }

    pub fn with_state_gauge(mut self, gauge: IntGauge) -> Self {
        self.circuit_breaker = self.circuit_breaker.with_state_gauge(gauge);
        self
    }

    pub async fn publish(&self, key: &str, payload: &str) -> Result<()> {
        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(&self.topic).key(key).payload(payload);

                self.producer
                    .send(record, Timeout::After(SEND_TIMEOUT))
                    .await
                    .map_err(|(e, _)| anyhow::anyhow!("Kafka send error: {}", e))?;

                Ok::<(), anyhow::Error>(())
            })
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(topic = %self.topic, key = %key, "Published to Redpanda");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::warn!(topic = %self.topic, "Circuit breaker open, Redpanda unavailable");
                Err(anyhow::anyhow!("Circuit breaker open for Redpanda"))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, topic = %self.topic, "Failed to publish to Redpanda");
                Err(e)
            }
        }
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }
}

#[async_trait]
impl NotificationSink for RedpandaClient {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let payload = serde_json::to_string(notification).context("Failed to encode notification")?;
        self.publish(&notification.key(), &payload).await
    }
}
