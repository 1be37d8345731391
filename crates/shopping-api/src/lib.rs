//! Paid shopping-search API client.
//!
//! Every upstream call costs money, so this client is strictly
//! cache-first: shopping queries are cached for about an hour, product
//! detail lookups for a week. The detail endpoint is the expensive one
//! and is only ever called selectively by the hosting code, never in
//! bulk.

pub mod currency;

use {
    kv_store::{Store, prefix, ttl},
    reqwest::{Client, StatusCode},
    serde_json::Value,
    std::time::Duration,
    url::Url,
};

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(clap::Parser)]
pub struct Arguments {
    /// API key for the shopping search provider. Ingestion returns no
    /// results without it.
    #[clap(long, env, default_value = "")]
    pub shopping_api_key: String,

    /// Base search URL of the provider.
    #[clap(long, env, default_value = "https://serpapi.com/search")]
    pub shopping_api_url: Url,

    /// Store raw provider response bodies in the KV store (short TTL)
    /// for debugging.
    #[clap(long, env)]
    pub shopping_api_debug: bool,
}

impl std::fmt::Display for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "shopping_api_key: SECRET")?;
        writeln!(f, "shopping_api_url: {}", self.shopping_api_url)?;
        writeln!(f, "shopping_api_debug: {}", self.shopping_api_debug)?;
        Ok(())
    }
}

/// One parsed row from a shopping search.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ShoppingResult {
    pub product_id: String,
    pub title: String,
    pub price: f64,
    pub currency: String,
    pub merchant: String,
    pub product_link: String,
    pub detail_token: Option<String>,
    pub thumbnail: Option<String>,
    /// `None` means the provider did not flag the listing as second
    /// hand.
    pub second_hand_condition: Option<String>,
}

/// Parsed product-detail response (first usable online seller).
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DetailResult {
    pub product_id: String,
    pub merchant_url: String,
    pub total_price: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ShoppingApiError {
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Abstract shopping API. Provides a mockable implementation.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ShoppingApi: Send + Sync {
    /// Searches the shopping feed for `query` in country `gl`.
    async fn search_shopping<'a>(
        &'a self,
        query: &'a str,
        gl: &'a str,
        hl: &'a str,
        location: Option<&'a str>,
        use_cache: bool,
    ) -> Result<Vec<ShoppingResult>, ShoppingApiError>;

    /// Fetches seller details for one product. Expensive; cache-first
    /// with a long TTL, and an unusable response is `None`, not an
    /// error.
    async fn get_detail(
        &self,
        product_id: &str,
        use_cache: bool,
    ) -> Result<Option<DetailResult>, ShoppingApiError>;
}

pub struct DefaultShoppingApi {
    client: Client,
    base_url: Url,
    api_key: String,
    debug: bool,
    store: Store,
}

impl DefaultShoppingApi {
    pub fn new(client: Client, args: &Arguments, store: Store) -> Self {
        Self {
            client,
            base_url: args.shopping_api_url.clone(),
            api_key: args.shopping_api_key.clone(),
            debug: args.shopping_api_debug,
            store,
        }
    }

    fn shopping_cache_key(query: &str, gl: &str, hl: &str, location: Option<&str>) -> String {
        let input = format!("{query}|{gl}|{hl}|{}", location.unwrap_or(""));
        format!(
            "{}{}",
            prefix::SHOPPING,
            &sku_keys::sha256_hex(&input)[..16]
        )
    }

    async fn fetch(&self, url: Url) -> Result<(StatusCode, String), ShoppingApiError> {
        let response = self
            .client
            .get(url)
            .timeout(UPSTREAM_TIMEOUT)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    async fn store_debug_payload(&self, key_suffix: &str, body: &str) {
        if !self.debug {
            return;
        }
        let key = format!("{}{key_suffix}", prefix::DEBUG);
        if let Err(error) = self.store.set(&key, body, ttl::DEBUG_PAYLOAD).await {
            tracing::warn!(key, ?error, "failed to store debug payload");
        }
    }
}

#[async_trait::async_trait]
impl ShoppingApi for DefaultShoppingApi {
    async fn search_shopping<'a>(
        &'a self,
        query: &'a str,
        gl: &'a str,
        hl: &'a str,
        location: Option<&'a str>,
        use_cache: bool,
    ) -> Result<Vec<ShoppingResult>, ShoppingApiError> {
        if self.api_key.is_empty() {
            tracing::warn!("shopping API key not configured, returning no results");
            return Ok(Vec::new());
        }

        let cache_key = Self::shopping_cache_key(query, gl, hl, location);
        if use_cache
            && let Ok(Some(cached)) = self.store.get_json::<Vec<ShoppingResult>>(&cache_key).await
        {
            tracing::debug!(query, gl, "shopping cache hit");
            return Ok(cached);
        }

        tracing::info!(query, gl, "shopping cache miss, calling provider");
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("engine", "google_shopping")
            .append_pair("q", query)
            .append_pair("gl", gl)
            .append_pair("hl", hl)
            .append_pair("api_key", &self.api_key);
        if let Some(location) = location {
            url.query_pairs_mut().append_pair("location", location);
        }

        let (status, body) = self.fetch(url).await?;
        if !status.is_success() {
            return Err(ShoppingApiError::Status { status, body });
        }
        self.store_debug_payload(&cache_key, &body).await;

        let data: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        let results = parse_shopping_results(&data, gl);

        if use_cache && !results.is_empty() {
            if let Err(error) = self
                .store
                .set_json(&cache_key, &results, ttl::SHOPPING_CACHE)
                .await
            {
                tracing::warn!(?error, "failed to cache shopping results");
            }
        }
        Ok(results)
    }

    async fn get_detail(
        &self,
        product_id: &str,
        use_cache: bool,
    ) -> Result<Option<DetailResult>, ShoppingApiError> {
        if self.api_key.is_empty() {
            tracing::warn!("shopping API key not configured for detail call");
            return Ok(None);
        }

        let cache_key = format!("{}{product_id}", prefix::DETAIL);
        if use_cache
            && let Ok(Some(cached)) = self.store.get_json::<DetailResult>(&cache_key).await
        {
            return Ok(Some(cached));
        }

        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("engine", "google_immersive_product")
            .append_pair("product_id", product_id)
            .append_pair("api_key", &self.api_key);

        let (status, body) = self.fetch(url).await?;
        if !status.is_success() {
            tracing::warn!(%status, product_id, "detail call failed");
            return Ok(None);
        }
        self.store_debug_payload(&format!("detail:{product_id}"), &body)
            .await;

        let data: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        let result = parse_detail_result(&data, product_id);

        if use_cache && let Some(result) = &result {
            if let Err(error) = self.store.set_json(&cache_key, result, ttl::DETAIL_CACHE).await {
                tracing::warn!(?error, "failed to cache detail result");
            }
        }
        Ok(result)
    }
}

/// Parses a shopping search response: the organic `shopping_results`
/// array plus the `inline_shopping_results` ads. Ads rows may lack a
/// product id; a stable one is synthesized from the link hash.
pub fn parse_shopping_results(data: &Value, gl: &str) -> Vec<ShoppingResult> {
    let mut results = Vec::new();
    for item in array(data, "shopping_results") {
        if let Some(result) = parse_shopping_item(item, gl)
            && !result.product_id.is_empty()
            && result.price > 0.
        {
            results.push(result);
        }
    }
    for item in array(data, "inline_shopping_results") {
        let Some(mut result) = parse_shopping_item(item, gl) else {
            continue;
        };
        if result.price <= 0. {
            continue;
        }
        if result.product_id.is_empty() {
            if result.product_link.is_empty() {
                continue;
            }
            result.product_id = sku_keys::sha256_hex(&result.product_link)[..16].to_string();
        }
        results.push(result);
    }
    results
}

fn parse_shopping_item(item: &Value, gl: &str) -> Option<ShoppingResult> {
    let title = string(item, "title")?;
    let currency = currency::resolve(
        item.get("currency").and_then(Value::as_str),
        item.get("price").and_then(Value::as_str),
        item.get("alternative_price")
            .and_then(|alt| alt.get("currency"))
            .and_then(Value::as_str),
        gl,
    );
    // Ads rows carry `link` instead of `product_link` and expose the
    // detail token under a different key.
    let product_link = string(item, "product_link")
        .or_else(|| string(item, "link"))
        .unwrap_or_default();
    let detail_token = string(item, "serpapi_product_api")
        .or_else(|| string(item, "serpapi_immersive_product_api"))
        .filter(|token| !token.is_empty());

    Some(ShoppingResult {
        product_id: string(item, "product_id").unwrap_or_default(),
        title,
        price: item.get("extracted_price").map(parse_price).unwrap_or(0.),
        currency,
        merchant: string(item, "source").unwrap_or_default(),
        product_link,
        detail_token,
        thumbnail: string(item, "thumbnail"),
        second_hand_condition: string(item, "second_hand_condition"),
    })
}

/// Parses the detail response: the first online seller with a proper
/// `https://` link wins.
pub fn parse_detail_result(data: &Value, product_id: &str) -> Option<DetailResult> {
    let sellers = data
        .get("sellers_results")
        .and_then(|sellers| sellers.get("online_sellers"))
        .and_then(Value::as_array)?;
    for seller in sellers {
        if let Some(link) = string(seller, "link")
            && link.starts_with("https://")
        {
            return Some(DetailResult {
                product_id: product_id.to_string(),
                merchant_url: link,
                total_price: seller.get("total_price").map(parse_price).filter(|p| *p > 0.),
            });
        }
    }
    None
}

/// Parses a price that may arrive as a number or a display string.
pub fn parse_price(value: &Value) -> f64 {
    match value {
        Value::Number(number) => number.as_f64().unwrap_or(0.),
        Value::String(text) => {
            let cleaned: String = text
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            cleaned.parse().unwrap_or(0.)
        }
        _ => 0.,
    }
}

fn array<'a>(data: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    data.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter())
        .into_iter()
        .flatten()
}

fn string(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|value| !value.is_empty())
}
