//! Circuit-breaker-guarded connection attempts.
//!
//! [`guarded_connect`] is a single attempt: it fails fast with
//! `ArbitrageError::CircuitBreakerOpen` while the breaker refuses, and feeds
//! the outcome of a real attempt back into the breaker.
//! [`connect_with_retry`] wraps it in the reconnection loop, with exponential
//! backoff between failed attempts and cooldown waits while the breaker is
//! open.

use std::time::Duration;

use tracing::{debug, info, warn};
use xarb_core::circuit_breaker::CircuitBreaker;
use xarb_core::error::{ArbitrageError, IngestionError};

use crate::ExchangeConnector;

/// Backoff settings for [`connect_with_retry`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Real connection attempts before giving up. Refusals by an open
    /// breaker do not count.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

/// One connection attempt, gated by `breaker`.
pub async fn guarded_connect(
    connector: &dyn ExchangeConnector,
    breaker: &CircuitBreaker,
) -> Result<(), ArbitrageError> {
    let exchange = connector.exchange();
    if !breaker.can_attempt() {
        return Err(ArbitrageError::CircuitBreakerOpen {
            exchange: exchange.to_string(),
            failure_count: breaker.failure_count(),
        });
    }

    match connector.connect().await {
        Ok(()) => {
            breaker.record_success();
            Ok(())
        }
        Err(e) => {
            breaker.record_failure();
            Err(IngestionError::ConnectionFailed {
                exchange: exchange.to_string(),
                reason: e.reason().to_string(),
            }
            .into())
        }
    }
}

/// Connect, retrying failed attempts with exponential backoff until
/// `policy.max_attempts` real attempts have failed.
///
/// Returns the last connection error when attempts run out.
pub async fn connect_with_retry(
    connector: &dyn ExchangeConnector,
    breaker: &CircuitBreaker,
    policy: RetryPolicy,
) -> Result<(), ArbitrageError> {
    let exchange = connector.exchange();
    let mut backoff = policy.initial_backoff;
    let mut attempts = 0u32;

    loop {
        match guarded_connect(connector, breaker).await {
            Ok(()) => {
                info!("[{exchange}] connected after {} attempt(s)", attempts + 1);
                return Ok(());
            }
            Err(ArbitrageError::CircuitBreakerOpen { failure_count, .. }) => {
                let wait = breaker.remaining_cooldown().max(Duration::from_millis(1));
                debug!("[{exchange}] breaker open ({failure_count} failures), waiting {wait:?}");
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                attempts += 1;
                if attempts >= policy.max_attempts {
                    warn!("[{exchange}] giving up after {attempts} attempt(s): {e}");
                    return Err(e);
                }
                warn!("[{exchange}] {e}, retrying in {backoff:?}");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xarb_core::circuit_breaker::CircuitBreakerConfig;

    use crate::replay::ReplayConnector;

    fn breaker(failures: u32, timeout_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: failures,
            timeout: Duration::from_millis(timeout_ms),
            success_threshold: 1,
        })
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            max_attempts,
        }
    }

    #[tokio::test]
    async fn success_keeps_breaker_closed() {
        let c = ReplayConnector::from_quotes("binance", vec![]);
        let cb = breaker(3, 1000);
        guarded_connect(&c, &cb).await.unwrap();
        assert!(c.is_connected());
        assert!(cb.current_state().is_closed());
    }

    #[tokio::test]
    async fn failures_trip_breaker_and_then_fail_fast() {
        let c = ReplayConnector::from_quotes("coinbase", vec![]).fail_connects(10);
        let cb = breaker(2, 60_000);

        for _ in 0..2 {
            let err = guarded_connect(&c, &cb).await.unwrap_err();
            assert!(matches!(
                err,
                ArbitrageError::Ingestion(IngestionError::ConnectionFailed { .. })
            ));
        }
        let err = guarded_connect(&c, &cb).await.unwrap_err();
        match err {
            ArbitrageError::CircuitBreakerOpen {
                exchange,
                failure_count,
            } => {
                assert_eq!(exchange, "coinbase");
                assert_eq!(failure_count, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn open_breaker_does_not_touch_the_connector() {
        let c = ReplayConnector::from_quotes("okx", vec![]).fail_connects(1);
        let cb = breaker(1, 60_000);
        assert!(guarded_connect(&c, &cb).await.is_err());
        // The connector would now succeed, but the breaker refuses.
        assert!(guarded_connect(&c, &cb).await.is_err());
        assert!(!c.is_connected());
    }

    #[tokio::test]
    async fn retry_rides_through_cooldown() {
        let c = ReplayConnector::from_quotes("kraken", vec![]).fail_connects(2);
        let cb = breaker(2, 20);
        connect_with_retry(&c, &cb, fast_policy(5)).await.unwrap();
        assert!(c.is_connected());
        // Probe succeeded with success_threshold 1.
        assert!(cb.current_state().is_closed());
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let c = ReplayConnector::from_quotes("bybit", vec![]).fail_connects(100);
        let cb = breaker(100, 20);
        let err = connect_with_retry(&c, &cb, fast_policy(3)).await.unwrap_err();
        assert!(err.to_string().contains("bybit"));
        assert_eq!(cb.failure_count(), 3);
    }
}
