use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::warn;

use expensey_core::config::RatesConfig;
use expensey_core::currency::{RateSource, RateSourceError};

/// HTTP currency-rate client: `GET {base_url}/rate?from=&to=` returning
/// `{ "rate": <number> }`. Every request carries an explicit timeout and the
/// lookup is retried a bounded number of times before the failure surfaces
/// to the submission path.
pub struct HttpRateSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
}

#[derive(Debug, Deserialize)]
struct RateResponse {
    rate: serde_json::Number,
}

impl HttpRateSource {
    pub fn new(base_url: String, timeout: Duration, max_retries: u32) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { client, base_url, api_key: None, max_retries }
    }

    pub fn from_config(config: &RatesConfig) -> Self {
        let base_url = config.base_url.clone().unwrap_or_default();
        let mut source = Self::new(
            base_url,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        );
        source.api_key =
            config.api_key.as_ref().map(|key| key.expose_secret().to_string());
        source
    }

    async fn fetch(&self, from: &str, to: &str) -> Result<Decimal, RateSourceError> {
        let url = format!("{}/rate", self.base_url.trim_end_matches('/'));
        let mut request = self.client.get(&url).query(&[("from", from), ("to", to)]);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| RateSourceError::Unavailable(error.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RateSourceError::UnknownPair {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(RateSourceError::Unavailable(format!(
                "rate endpoint returned {}",
                response.status()
            )));
        }

        let payload: RateResponse = response
            .json()
            .await
            .map_err(|error| RateSourceError::Unavailable(error.to_string()))?;

        Decimal::from_str(&payload.rate.to_string()).map_err(|error| {
            RateSourceError::Unavailable(format!("unparseable rate `{}`: {error}", payload.rate))
        })
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    async fn rate(&self, from: &str, to: &str) -> Result<Decimal, RateSourceError> {
        let mut attempt = 0;
        loop {
            match self.fetch(from, to).await {
                Ok(rate) => return Ok(rate),
                // An unpublished pair will not appear on retry.
                Err(error @ RateSourceError::UnknownPair { .. }) => return Err(error),
                Err(error) => {
                    if attempt >= self.max_retries {
                        return Err(error);
                    }
                    attempt += 1;
                    warn!(
                        event_name = "rates.fetch.retry",
                        from = %from,
                        to = %to,
                        attempt,
                        error = %error,
                        "currency rate fetch failed, retrying"
                    );
                }
            }
        }
    }
}
