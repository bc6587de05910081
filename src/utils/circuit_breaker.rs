use prometheus::IntGauge;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards a collaborator that can go away for a while (the notification
// broker). After `failure_threshold` consecutive failures calls are refused
// without touching the collaborator until `cooldown` has passed; then a
// trial call is let through and `success_threshold` successes close it again.
//
//   Closed --failures--> Open --cooldown--> HalfOpen --successes--> Closed
//                          ^                    |
//                          +------failure-------+
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding: 0 = closed, 1 = open, 2 = half-open.
    pub fn as_gauge(&self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    inner: Arc<Mutex<BreakerState>>,
    config: CircuitBreakerConfig,
    gauge: Option<IntGauge>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
            })),
            config,
            gauge: None,
        }
    }

    /// Mirror every state change into a prometheus gauge.
    pub fn with_state_gauge(mut self, gauge: IntGauge) -> Self {
        gauge.set(CircuitState::Closed.as_gauge());
        self.gauge = Some(gauge);
        self
    }

    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        {
            let mut inner = self.inner.lock().await;
            if inner.state == CircuitState::Open {
                let cooled_down = inner
                    .opened_at
                    .is_some_and(|opened| opened.elapsed() >= self.config.cooldown);
                if !cooled_down {
                    return Err(CircuitBreakerError::CircuitOpen);
                }
                inner.half_open_successes = 0;
                self.move_to(&mut inner, CircuitState::HalfOpen);
            }
        }

        match operation.await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(error) => {
                self.record_failure().await;
                Err(CircuitBreakerError::OperationFailed(error))
            }
        }
    }

    async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_failures = 0;

        if inner.state == CircuitState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.success_threshold {
                inner.opened_at = None;
                self.move_to(&mut inner, CircuitState::Closed);
            }
        }
    }

    async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_failures += 1;

        let trip = match inner.state {
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };

        if trip {
            inner.opened_at = Some(Instant::now());
            self.move_to(&mut inner, CircuitState::Open);
        }
    }

    fn move_to(&self, inner: &mut BreakerState, next: CircuitState) {
        tracing::warn!(
            breaker = self.name,
            from = ?inner.state,
            to = ?next,
            failures = inner.consecutive_failures,
            "Circuit breaker state change"
        );
        inner.state = next;
        if let Some(ref gauge) = self.gauge {
            gauge.set(next.as_gauge());
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.opened_at = None;
        if inner.state != CircuitState::Closed {
            self.move_to(&mut inner, CircuitState::Closed);
        }
    }
}

#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    CircuitOpen,
    OperationFailed(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::CircuitOpen => write!(f, "Circuit breaker is open"),
            CircuitBreakerError::OperationFailed(e) => write!(f, "Operation failed: {}", e),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for CircuitBreakerError<E> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, cooldown: Duration, success_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold,
                cooldown,
                success_threshold,
            },
        )
    }

    #[tokio::test]
    async fn test_opens_after_consecutive_failures() {
        let cb = breaker(3, Duration::from_secs(60), 1);

        for _ in 0..3 {
            assert!(cb.call(async { Err::<(), _>("broker down") }).await.is_err());
        }
        assert_eq!(cb.state().await, CircuitState::Open);

        let result = cb.call(async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen)));
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let cb = breaker(2, Duration::from_secs(60), 1);

        let _ = cb.call(async { Err::<(), _>("blip") }).await;
        let _ = cb.call(async { Ok::<_, &str>(()) }).await;
        let _ = cb.call(async { Err::<(), _>("blip") }).await;

        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_trial_closes_circuit() {
        let gauge = IntGauge::new("test_breaker_state", "test").unwrap();
        let cb = breaker(2, Duration::from_millis(50), 1).with_state_gauge(gauge.clone());

        for _ in 0..2 {
            let _ = cb.call(async { Err::<(), _>("broker down") }).await;
        }
        assert_eq!(gauge.get(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cb.call(async { Ok::<_, &str>(()) }).await.is_ok());
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(gauge.get(), 0);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(1, Duration::from_millis(20), 2);

        let _ = cb.call(async { Err::<(), _>("broker down") }).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        let _ = cb.call(async { Err::<(), _>("still down") }).await;

        assert_eq!(cb.state().await, CircuitState::Open);

        cb.reset().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }
}
