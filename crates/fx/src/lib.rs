//! FX rates service backed by OpenExchangeRates with a KV cache.
//!
//! Rates are USD-based (the upstream free tier only supports that) and
//! cached for about an hour. Conversion follows the upstream
//! convention: 1 USD = `rates[CCY]` units of CCY, so
//! `usd = amount / rates[CCY]`.
//!
//! The reconciler treats any FX failure as a per-row skip; this service
//! therefore only fails for non-USD conversions and never invents a
//! rate.

use {
    kv_store::{Store, prefix, ttl},
    reqwest::Client,
    std::{collections::HashMap, time::Duration},
    url::Url,
};

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(clap::Parser)]
pub struct Arguments {
    /// OpenExchangeRates application id. FX conversion is disabled
    /// without it and non-USD rows are skipped.
    #[clap(long, env, default_value = "")]
    pub openexchangerates_key: String,

    /// Base URL of the OpenExchangeRates API.
    #[clap(long, env, default_value = "https://openexchangerates.org/api/")]
    pub fx_base_url: Url,
}

impl std::fmt::Display for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "openexchangerates_key: SECRET")?;
        writeln!(f, "fx_base_url: {}", self.fx_base_url)?;
        Ok(())
    }
}

/// A snapshot of USD-based rates.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FxRates {
    pub base: String,
    pub timestamp: i64,
    pub rates: HashMap<String, f64>,
}

impl FxRates {
    /// `amount / rates[currency]`, or `None` when the rate is missing
    /// or non-positive. USD passes through untouched.
    pub fn to_usd(&self, amount: f64, currency: &str) -> Option<f64> {
        let currency = currency.to_uppercase();
        if currency == "USD" {
            return Some(amount);
        }
        match self.rates.get(&currency) {
            Some(&rate) if rate > 0. => Some(amount / rate),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FxError {
    #[error("only base=USD is supported, got {0}")]
    UnsupportedBase(String),
    #[error("OPENEXCHANGERATES_KEY is not set")]
    MissingApiKey,
    #[error("missing or invalid FX rate for {0}")]
    MissingRate(String),
    #[error("malformed rates response: {0}")]
    Malformed(&'static str),
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub struct FxService {
    client: Client,
    base_url: Url,
    app_id: String,
    store: Store,
}

impl FxService {
    pub fn new(client: Client, args: &Arguments, store: Store) -> Self {
        Self {
            client,
            base_url: args.fx_base_url.clone(),
            app_id: args.openexchangerates_key.clone(),
            store,
        }
    }

    /// Latest USD-based rates, cache first. `force_refresh` bypasses
    /// the cache read (but still refreshes the cache on success).
    pub async fn get_latest(&self, base: &str, force_refresh: bool) -> Result<FxRates, FxError> {
        let base = base.to_uppercase();
        if base != "USD" {
            return Err(FxError::UnsupportedBase(base));
        }

        let cache_key = format!("{}{base}", prefix::FX_RATES);
        if !force_refresh
            && let Ok(Some(cached)) = self.store.get_json::<FxRates>(&cache_key).await
            && !cached.rates.is_empty()
        {
            return Ok(cached);
        }

        let rates = self.fetch_latest().await?;
        if let Err(error) = self.store.set_json(&cache_key, &rates, ttl::FX_RATES).await {
            tracing::warn!(?error, "failed to cache fx rates");
        }
        Ok(rates)
    }

    /// Converts `amount` of `currency` into USD, rounded to cents.
    ///
    /// When the rate is missing from the given (or cached) snapshot the
    /// conversion retries exactly once with a forced refresh before
    /// failing; a currency newly listed upstream should not be skipped
    /// for a whole cache lifetime.
    pub async fn convert_to_usd(
        &self,
        amount: f64,
        currency: &str,
        rates: Option<&FxRates>,
    ) -> Result<f64, FxError> {
        let currency = currency.to_uppercase();
        if currency == "USD" {
            return Ok(round_cents(amount));
        }

        let snapshot = match rates {
            Some(rates) => rates.clone(),
            None => self.get_latest("USD", false).await?,
        };
        if let Some(usd) = snapshot.to_usd(amount, &currency) {
            return Ok(round_cents(usd));
        }

        let refreshed = self.get_latest("USD", true).await?;
        refreshed
            .to_usd(amount, &currency)
            .map(round_cents)
            .ok_or(FxError::MissingRate(currency))
    }

    async fn fetch_latest(&self) -> Result<FxRates, FxError> {
        if self.app_id.is_empty() {
            return Err(FxError::MissingApiKey);
        }
        let mut url = self
            .base_url
            .join("latest.json")
            .expect("unexpectedly invalid URL segment");
        url.query_pairs_mut().append_pair("app_id", &self.app_id);
        let response: LatestResponse = self
            .client
            .get(url)
            .timeout(UPSTREAM_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_latest(response)
    }
}

#[derive(Debug, serde::Deserialize)]
struct LatestResponse {
    base: Option<String>,
    timestamp: Option<i64>,
    rates: Option<HashMap<String, f64>>,
}

fn parse_latest(response: LatestResponse) -> Result<FxRates, FxError> {
    let base = response.base.unwrap_or_else(|| "USD".to_string()).to_uppercase();
    if base != "USD" {
        return Err(FxError::UnsupportedBase(base));
    }

    let mut rates: HashMap<String, f64> = response
        .rates
        .ok_or(FxError::Malformed("missing rates"))?
        .into_iter()
        .map(|(currency, rate)| (currency.to_uppercase(), rate))
        .collect();
    if rates.is_empty() {
        return Err(FxError::Malformed("empty rates"));
    }
    rates.entry("USD".to_string()).or_insert(1.0);

    let timestamp = response
        .timestamp
        .unwrap_or_else(|| chrono::Utc::now().timestamp());

    Ok(FxRates {
        base,
        timestamp,
        rates,
    })
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.).round() / 100.
}

#[cfg(test)]
mod tests {
    use {super::*, maplit::hashmap};

    fn rates() -> FxRates {
        FxRates {
            base: "USD".to_string(),
            timestamp: 1_700_000_000,
            rates: hashmap! {
                "USD".to_string() => 1.0,
                "JPY".to_string() => 149.5,
                "EUR".to_string() => 0.92,
                "BROKEN".to_string() => 0.0,
            },
        }
    }

    #[test]
    fn converts_with_usd_base_convention() {
        let rates = rates();
        assert_eq!(rates.to_usd(1499., "USD"), Some(1499.));
        assert_eq!(rates.to_usd(149.5, "JPY"), Some(1.));
        assert_eq!(rates.to_usd(92., "eur"), Some(100.));
    }

    #[test]
    fn missing_or_non_positive_rates_do_not_convert() {
        let rates = rates();
        assert_eq!(rates.to_usd(100., "KRW"), None);
        assert_eq!(rates.to_usd(100., "BROKEN"), None);
    }

    #[test]
    fn parse_requires_usd_base() {
        let result = parse_latest(LatestResponse {
            base: Some("EUR".to_string()),
            timestamp: Some(1),
            rates: Some(hashmap! {"JPY".to_string() => 149.5}),
        });
        assert!(matches!(result, Err(FxError::UnsupportedBase(_))));
    }

    #[test]
    fn parse_inserts_usd_and_uppercases() {
        let parsed = parse_latest(LatestResponse {
            base: None,
            timestamp: Some(42),
            rates: Some(hashmap! {"jpy".to_string() => 149.5}),
        })
        .unwrap();
        assert_eq!(parsed.rates.get("USD"), Some(&1.0));
        assert_eq!(parsed.rates.get("JPY"), Some(&149.5));
        assert_eq!(parsed.timestamp, 42);
    }

    #[test]
    fn parse_rejects_empty_rates() {
        let result = parse_latest(LatestResponse {
            base: None,
            timestamp: None,
            rates: Some(HashMap::new()),
        });
        assert!(matches!(result, Err(FxError::Malformed(_))));
        let result = parse_latest(LatestResponse {
            base: None,
            timestamp: None,
            rates: None,
        });
        assert!(matches!(result, Err(FxError::Malformed(_))));
    }

    #[test]
    fn rounding_is_to_the_cent() {
        assert_eq!(round_cents(1068.8963210702342), 1068.9);
        assert_eq!(round_cents(0.005), 0.01);
    }

    #[tokio::test]
    #[ignore]
    async fn upstream_latest_round_trip() {
        use clap::Parser;
        let args = Arguments::parse_from(["fx"]);
        let pool = sqlx::PgPool::connect("postgresql://").await.unwrap();
        let service = FxService::new(Client::new(), &args, Store::new(pool));
        let rates = service.get_latest("USD", true).await.unwrap();
        assert_eq!(rates.base, "USD");
        assert!(rates.rates.len() > 100);
    }
}
