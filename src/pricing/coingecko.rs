// CoinGecko simple-price client for batched USD lookups
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

pub const COINGECKO_BASE: &str = "https://api.coingecko.com/api/v3";

/// Largest id batch CoinGecko accepts comfortably in one query string
pub const MAX_IDS_PER_REQUEST: usize = 250;

/// External price service queried by feed-specific ids
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Feed name, used in logs
    fn name(&self) -> &str;

    /// USD price per feed id. Ids the feed does not know are simply absent.
    async fn fetch_usd(&self, ids: &[String]) -> Result<HashMap<String, f64>>;
}

#[derive(Debug, Clone, Deserialize)]
struct SimplePrice {
    usd: Option<f64>,
}

pub struct CoinGeckoClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    fn simple_price_url(&self) -> String {
        format!("{}/simple/price", self.base_url)
    }
}

impl Default for CoinGeckoClient {
    fn default() -> Self {
        Self::new(COINGECKO_BASE, None, Duration::from_secs(10))
    }
}

#[async_trait]
impl PriceFeed for CoinGeckoClient {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn fetch_usd(&self, ids: &[String]) -> Result<HashMap<String, f64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        if ids.len() > MAX_IDS_PER_REQUEST {
            return Err(Error::PriceFeed(format!(
                "{} ids in one request exceeds limit of {}",
                ids.len(),
                MAX_IDS_PER_REQUEST
            )));
        }

        let mut req = self
            .client
            .get(self.simple_price_url())
            .query(&[("ids", ids.join(",")), ("vs_currencies", "usd".to_string())]);
        if let Some(key) = &self.api_key {
            req = req.header("x-cg-demo-api-key", key);
        }

        let resp = req.send().await?.error_for_status()?;
        let body = resp.text().await?;
        let prices = parse_simple_price(&body)?;
        debug!("CoinGecko returned {} of {} requested prices", prices.len(), ids.len());
        Ok(prices)
    }
}

/// Parse `{"bitcoin":{"usd":61000.0},"foo":{}}` keeping positive prices only
pub fn parse_simple_price(body: &str) -> Result<HashMap<String, f64>> {
    let data: HashMap<String, SimplePrice> = serde_json::from_str(body)?;
    Ok(data
        .into_iter()
        .filter_map(|(id, p)| {
            p.usd
                .filter(|usd| usd.is_finite() && *usd > 0.0)
                .map(|usd| (id, usd))
        })
        .collect())
}
