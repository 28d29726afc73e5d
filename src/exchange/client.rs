// src/exchange/client.rs
//
// Exchange boundary: the client trait every venue adapter implements,
// candle window clamping and the retry/throttle decorator.
use crate::domain::errors::{ExchangeError, ExchangeResult};
use crate::domain::models::{AccountBalance, Candle, OrderConfirmation, TradeOrder};
use crate::exchange::rate_limit::RateLimiter;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Venue-imposed ceiling on candles per request.
pub const MAX_CANDLES_PER_REQUEST: i64 = 350;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    OneMinute,
    FiveMinute,
    FifteenMinute,
    OneHour,
    SixHour,
    OneDay,
}

impl Granularity {
    pub fn seconds(&self) -> i64 {
        match self {
            Granularity::OneMinute => 60,
            Granularity::FiveMinute => 300,
            Granularity::FifteenMinute => 900,
            Granularity::OneHour => 3_600,
            Granularity::SixHour => 21_600,
            Granularity::OneDay => 86_400,
        }
    }

    pub fn from_seconds(secs: i64) -> ExchangeResult<Self> {
        match secs {
            60 => Ok(Granularity::OneMinute),
            300 => Ok(Granularity::FiveMinute),
            900 => Ok(Granularity::FifteenMinute),
            3_600 => Ok(Granularity::OneHour),
            21_600 => Ok(Granularity::SixHour),
            86_400 => Ok(Granularity::OneDay),
            other => Err(ExchangeError::Api(format!(
                "unsupported granularity: {other}s"
            ))),
        }
    }
}

/// Shrink a candle request so it never asks for more than the venue
/// allows in one call. The end is pulled in; the start is kept.
pub fn clamp_candle_window(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    granularity: Granularity,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let span_secs = (end - start).num_seconds();
    let max_span = MAX_CANDLES_PER_REQUEST * granularity.seconds();
    if span_secs > max_span {
        (start, start + ChronoDuration::seconds(max_span))
    } else {
        (start, end)
    }
}

/// Venue adapter seam. Implementations stay thin: translate requests and
/// responses, no business logic.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn fetch_candles(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> ExchangeResult<Vec<Candle>>;

    async fn place_order(&self, order: &TradeOrder) -> ExchangeResult<OrderConfirmation>;

    async fn get_balance(&self) -> ExchangeResult<AccountBalance>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// How long one call may wait on the throttle before giving up.
    pub limiter_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            limiter_timeout: Duration::from_secs(30),
        }
    }
}

/// Decorator that throttles and retries every call to the wrapped
/// client. Backoff doubles per attempt; authentication failures are
/// surfaced immediately.
pub struct RetryingClient<C> {
    inner: C,
    limiter: Arc<RateLimiter>,
    config: RetryConfig,
}

impl<C: ExchangeClient> RetryingClient<C> {
    pub fn new(inner: C, limiter: Arc<RateLimiter>, config: RetryConfig) -> Self {
        Self {
            inner,
            limiter,
            config,
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> ExchangeResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ExchangeResult<T>>,
    {
        let mut last_error = None;
        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                let delay = self.config.base_delay * 2u32.pow(attempt - 1);
                log::warn!("{operation}: retry {attempt} after {delay:?}");
                tokio::time::sleep(delay).await;
            }

            self.limiter.acquire(self.config.limiter_timeout).await?;
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => {
                    log::error!("{operation}: fatal error: {err}");
                    return Err(err);
                }
                Err(err) => {
                    log::warn!("{operation}: attempt {} failed: {err}", attempt + 1);
                    last_error = Some(err);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| ExchangeError::Api(format!("{operation}: no attempts made"))))
    }
}

#[async_trait]
impl<C: ExchangeClient> ExchangeClient for RetryingClient<C> {
    async fn fetch_candles(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> ExchangeResult<Vec<Candle>> {
        let (start, end) = clamp_candle_window(start, end, granularity);
        self.run("fetch_candles", || {
            self.inner.fetch_candles(symbol, start, end, granularity)
        })
        .await
    }

    async fn place_order(&self, order: &TradeOrder) -> ExchangeResult<OrderConfirmation> {
        self.run("place_order", || self.inner.place_order(order)).await
    }

    async fn get_balance(&self) -> ExchangeResult<AccountBalance> {
        self.run("get_balance", || self.inner.get_balance()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::rate_limit::RateCaps;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyClient {
        calls: AtomicU32,
        fail_first: u32,
        error: fn() -> ExchangeError,
    }

    #[async_trait]
    impl ExchangeClient for FlakyClient {
        async fn fetch_candles(
            &self,
            _symbol: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _granularity: Granularity,
        ) -> ExchangeResult<Vec<Candle>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err((self.error)())
            } else {
                Ok(Vec::new())
            }
        }

        async fn place_order(&self, _order: &TradeOrder) -> ExchangeResult<OrderConfirmation> {
            Err(ExchangeError::Order("unsupported in test".to_string()))
        }

        async fn get_balance(&self) -> ExchangeResult<AccountBalance> {
            Ok(AccountBalance::new(0.0, "USD"))
        }
    }

    fn retrying(fail_first: u32, error: fn() -> ExchangeError) -> RetryingClient<FlakyClient> {
        RetryingClient::new(
            FlakyClient {
                calls: AtomicU32::new(0),
                fail_first,
                error,
            },
            Arc::new(RateLimiter::new(RateCaps::default())),
            RetryConfig {
                base_delay: Duration::from_millis(10),
                ..RetryConfig::default()
            },
        )
    }

    #[test]
    fn clamps_oversized_windows() {
        let start = Utc::now() - ChronoDuration::days(30);
        let end = Utc::now();
        let (s, e) = clamp_candle_window(start, end, Granularity::OneHour);
        assert_eq!(s, start);
        assert_eq!((e - s).num_seconds(), 350 * 3_600);

        // Small windows pass through untouched.
        let start = Utc::now() - ChronoDuration::hours(10);
        let (s, e) = clamp_candle_window(start, end, Granularity::OneHour);
        assert_eq!((s, e), (start, end));
    }

    #[test]
    fn granularity_round_trips_seconds() {
        assert_eq!(Granularity::from_seconds(3_600).unwrap(), Granularity::OneHour);
        assert!(Granularity::from_seconds(7).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors() {
        let client = retrying(2, || ExchangeError::Connection("reset".to_string()));
        let candles = client
            .fetch_candles("BTC-USD", Utc::now() - ChronoDuration::hours(1), Utc::now(), Granularity::OneMinute)
            .await
            .unwrap();
        assert!(candles.is_empty());
        assert_eq!(client.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn authentication_errors_fail_fast() {
        let client = retrying(5, || ExchangeError::Authentication("bad key".to_string()));
        let err = client
            .fetch_candles("BTC-USD", Utc::now() - ChronoDuration::hours(1), Utc::now(), Granularity::OneMinute)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Authentication(_)));
        assert_eq!(client.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_the_last_error() {
        let client = retrying(10, || ExchangeError::Api("boom".to_string()));
        let err = client
            .fetch_candles("BTC-USD", Utc::now() - ChronoDuration::hours(1), Utc::now(), Granularity::OneMinute)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Api(_)));
        assert_eq!(client.inner().calls.load(Ordering::SeqCst), 3);
    }
}
