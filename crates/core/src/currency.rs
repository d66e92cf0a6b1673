use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RateSourceError {
    #[error("rate source unavailable: {0}")]
    Unavailable(String),
    #[error("no rate published for {from}->{to}")]
    UnknownPair { from: String, to: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    /// The rate lookup failed. Callers decide whether to retry or accept the
    /// unconverted amount; the converter never substitutes a rate of 1.
    #[error("currency rate source unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("no rate published for {from}->{to}")]
    UnknownPair { from: String, to: String },
}

impl From<RateSourceError> for ConversionError {
    fn from(value: RateSourceError) -> Self {
        match value {
            RateSourceError::Unavailable(message) => Self::UpstreamUnavailable(message),
            RateSourceError::UnknownPair { from, to } => Self::UnknownPair { from, to },
        }
    }
}

/// External rate provider: a live HTTP API in production, a static table in
/// tests and development.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn rate(&self, from: &str, to: &str) -> Result<Decimal, RateSourceError>;
}

/// Fixed in-memory rate table.
#[derive(Debug, Default)]
pub struct StaticRateTable {
    rates: HashMap<(String, String), Decimal>,
}

impl StaticRateTable {
    pub fn new(rates: Vec<(&str, &str, Decimal)>) -> Self {
        let rates = rates
            .into_iter()
            .map(|(from, to, rate)| ((normalize(from), normalize(to)), rate))
            .collect();
        Self { rates }
    }
}

#[async_trait]
impl RateSource for StaticRateTable {
    async fn rate(&self, from: &str, to: &str) -> Result<Decimal, RateSourceError> {
        self.rates.get(&(normalize(from), normalize(to))).copied().ok_or_else(|| {
            RateSourceError::UnknownPair { from: normalize(from), to: normalize(to) }
        })
    }
}

struct CachedRate {
    rate: Decimal,
    fetched_at: Instant,
}

/// Converts submitted amounts into the company currency, memoizing rates
/// for a short TTL since rates are not per-request precision-critical here.
pub struct CurrencyConverter {
    source: Box<dyn RateSource>,
    cache_ttl: Duration,
    cache: Mutex<HashMap<(String, String), CachedRate>>,
}

impl CurrencyConverter {
    pub fn new(source: Box<dyn RateSource>, cache_ttl: Duration) -> Self {
        Self { source, cache_ttl, cache: Mutex::new(HashMap::new()) }
    }

    /// Identity conversions return the amount unchanged without any lookup.
    pub async fn convert(
        &self,
        amount: Decimal,
        from: &str,
        to: &str,
    ) -> Result<Decimal, ConversionError> {
        let from = normalize(from);
        let to = normalize(to);
        if from == to {
            return Ok(amount);
        }

        let rate = self.lookup(&from, &to).await?;
        Ok(amount * rate)
    }

    async fn lookup(&self, from: &str, to: &str) -> Result<Decimal, ConversionError> {
        let key = (from.to_string(), to.to_string());

        if let Ok(cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&key) {
                if cached.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(cached.rate);
                }
            }
        }

        let rate = self.source.rate(from, to).await?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, CachedRate { rate, fetched_at: Instant::now() });
        }

        Ok(rate)
    }
}

fn normalize(currency: &str) -> String {
    currency.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use super::{
        ConversionError, CurrencyConverter, RateSource, RateSourceError, StaticRateTable,
    };

    struct CountingSource {
        inner: StaticRateTable,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RateSource for CountingSource {
        async fn rate(&self, from: &str, to: &str) -> Result<Decimal, RateSourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.rate(from, to).await
        }
    }

    struct FailingSource;

    #[async_trait]
    impl RateSource for FailingSource {
        async fn rate(&self, _from: &str, _to: &str) -> Result<Decimal, RateSourceError> {
            Err(RateSourceError::Unavailable("connection refused".to_string()))
        }
    }

    fn usd_eur_table() -> StaticRateTable {
        StaticRateTable::new(vec![("EUR", "USD", Decimal::new(110, 2))])
    }

    #[tokio::test]
    async fn identity_conversion_returns_amount_unchanged() {
        let converter =
            CurrencyConverter::new(Box::new(FailingSource), Duration::from_secs(300));

        // No lookup happens, so even a failing source cannot break this.
        let amount = Decimal::new(10_000, 2);
        let converted = converter.convert(amount, "USD", "usd").await.expect("identity");
        assert_eq!(converted, amount);
    }

    #[tokio::test]
    async fn cross_currency_conversion_multiplies_by_the_rate() {
        let converter =
            CurrencyConverter::new(Box::new(usd_eur_table()), Duration::from_secs(300));

        let converted = converter
            .convert(Decimal::new(10_000, 2), "EUR", "USD")
            .await
            .expect("conversion should succeed");
        assert_eq!(converted, Decimal::new(1_100_000, 4));
    }

    #[tokio::test]
    async fn lookup_failure_surfaces_upstream_unavailable() {
        let converter =
            CurrencyConverter::new(Box::new(FailingSource), Duration::from_secs(300));

        let error = converter
            .convert(Decimal::new(10_000, 2), "EUR", "USD")
            .await
            .expect_err("failing source must not fall back to rate=1");
        assert!(matches!(error, ConversionError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn unknown_pair_is_distinguished_from_outages() {
        let converter =
            CurrencyConverter::new(Box::new(usd_eur_table()), Duration::from_secs(300));

        let error = converter
            .convert(Decimal::ONE, "GBP", "JPY")
            .await
            .expect_err("unlisted pair should fail");
        assert_eq!(
            error,
            ConversionError::UnknownPair { from: "GBP".to_string(), to: "JPY".to_string() }
        );
    }

    #[tokio::test]
    async fn rates_are_cached_within_the_ttl() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = CountingSource { inner: usd_eur_table(), calls: calls.clone() };
        let converter = CurrencyConverter::new(Box::new(source), Duration::from_secs(300));

        converter.convert(Decimal::ONE, "EUR", "USD").await.expect("first");
        converter.convert(Decimal::TWO, "EUR", "USD").await.expect("second");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_ttl_disables_caching() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = CountingSource { inner: usd_eur_table(), calls: calls.clone() };
        let converter = CurrencyConverter::new(Box::new(source), Duration::ZERO);

        converter.convert(Decimal::ONE, "EUR", "USD").await.expect("first");
        converter.convert(Decimal::TWO, "EUR", "USD").await.expect("second");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
