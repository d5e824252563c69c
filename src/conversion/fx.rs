//! Currency conversion into the workspace reporting currency.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::types::Currency;

#[derive(Debug, Error)]
pub enum FxError {
    #[error("no rate from {from} to {to}")]
    MissingRate { from: Currency, to: Currency },

    #[error("rate from {from} to {to} is not usable: {rate}")]
    InvalidRate { from: Currency, to: Currency, rate: f64 },

    #[error("FX request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("FX service returned HTTP {0}")]
    Status(u16),
}

#[async_trait]
pub trait FxRates: Send + Sync {
    /// Units of `to` per unit of `from`.
    async fn rate(&self, from: &Currency, to: &Currency) -> Result<f64, FxError>;
}

/// Converts minor units of `from` into minor units of `to`, rounding half
/// away from zero.
pub async fn convert(
    fx: &dyn FxRates,
    amount: i64,
    from: &Currency,
    to: &Currency,
) -> Result<i64, FxError> {
    if from == to {
        return Ok(amount);
    }
    let rate = fx.rate(from, to).await?;
    if !rate.is_finite() || rate <= 0.0 {
        return Err(FxError::InvalidRate {
            from: from.clone(),
            to: to.clone(),
            rate,
        });
    }
    Ok((amount as f64 * rate).round() as i64)
}

/// A fixed rate table. Empty means only same-currency conversions succeed.
#[derive(Debug, Clone, Default)]
pub struct StaticFxRates {
    rates: HashMap<(Currency, Currency), f64>,
}

impl StaticFxRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, from: Currency, to: Currency, rate: f64) -> Self {
        self.rates.insert((from, to), rate);
        self
    }
}

#[async_trait]
impl FxRates for StaticFxRates {
    async fn rate(&self, from: &Currency, to: &Currency) -> Result<f64, FxError> {
        self.rates
            .get(&(from.clone(), to.clone()))
            .copied()
            .ok_or_else(|| FxError::MissingRate {
                from: from.clone(),
                to: to.clone(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct LatestRates {
    rates: HashMap<String, f64>,
}

/// `GET {base}/latest?base=FROM` returning `{"rates": {"EUR": 0.92, ...}}`.
#[derive(Debug, Clone)]
pub struct HttpFxRates {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFxRates {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FxError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(HttpFxRates {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl FxRates for HttpFxRates {
    async fn rate(&self, from: &Currency, to: &Currency) -> Result<f64, FxError> {
        let response = self
            .client
            .get(format!("{}/latest", self.base_url))
            .query(&[("base", from.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FxError::Status(response.status().as_u16()));
        }
        let latest: LatestRates = response.json().await?;
        latest
            .rates
            .get(to.as_str())
            .copied()
            .ok_or_else(|| FxError::MissingRate {
                from: from.clone(),
                to: to.clone(),
            })
    }
}
