//! USD price resolution
//!
//! Prices come from an ordered chain of strategies, evaluated per asset and
//! short-circuiting at the first hit:
//!
//! 1. manual override
//! 2. stable-asset fallback ($1, disabled in strict mode)
//! 3. basis symbol with a cached price
//! 4. cached price for the asset itself
//! 5. batched live fetch (see [`resolver::PriceResolver`])
//!
//! An asset nothing resolves is `unknown`. That is a valid terminal state,
//! not an error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

pub mod coingecko;
pub mod resolver;
pub mod store;
pub mod strategies;

pub use coingecko::{CoinGeckoClient, PriceFeed};
pub use resolver::PriceResolver;
pub use store::{JsonFilePriceStore, MemoryPriceStore, PriceStore};
pub use strategies::{BasisSymbolStrategy, CachedStrategy, OverrideStrategy, StableFallbackStrategy};

/// Tickers treated as USD-pegged when no better price exists
pub const DEFAULT_STABLE_TICKERS: &[&str] = &[
    "USDC", "USDT", "DAI", "BUSD", "TUSD", "USDP", "PYUSD", "FDUSD", "GUSD",
];

/// How a price was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceMethod {
    Override,
    StableFallback,
    BasisSymbol,
    Cached,
    Coingecko,
    Unknown,
}

impl fmt::Display for PriceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceMethod::Override => write!(f, "override"),
            PriceMethod::StableFallback => write!(f, "stable_fallback"),
            PriceMethod::BasisSymbol => write!(f, "basis_symbol"),
            PriceMethod::Cached => write!(f, "cached"),
            PriceMethod::Coingecko => write!(f, "coingecko"),
            PriceMethod::Unknown => write!(f, "unknown"),
        }
    }
}

/// Resolved USD price for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub asset_id: String,
    pub usd: Option<f64>,
    pub method: PriceMethod,
    /// Where the price came from: basis symbol, feed id, "manual", ...
    pub reference: String,
}

impl PriceRecord {
    pub fn new(asset_id: &str, usd: f64, method: PriceMethod, reference: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            usd: Some(usd),
            method,
            reference: reference.to_string(),
        }
    }

    pub fn unknown(asset_id: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            usd: None,
            method: PriceMethod::Unknown,
            reference: String::new(),
        }
    }

    /// Usable for valuation: present and strictly positive
    pub fn known_usd(&self) -> Option<f64> {
        self.usd.filter(|p| p.is_finite() && *p > 0.0)
    }

    pub fn is_known(&self) -> bool {
        self.known_usd().is_some()
    }
}

/// One link of the resolution chain
pub trait PriceStrategy: Send + Sync {
    /// Method reported for prices this strategy produces
    fn method(&self) -> PriceMethod;

    /// Resolve a price, or `None` to defer to the next strategy
    fn try_resolve(&self, asset_id: &str) -> Option<PriceRecord>;
}

/// Case-insensitive substring match against stable tickers
#[derive(Debug, Clone)]
pub struct StableHeuristic {
    tickers: Vec<String>,
}

impl StableHeuristic {
    pub fn new<I, S>(tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tickers: tickers
                .into_iter()
                .map(|t| t.as_ref().trim().to_ascii_uppercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn is_stable(&self, asset_id: &str) -> bool {
        let upper = asset_id.to_ascii_uppercase();
        self.tickers.iter().any(|t| upper.contains(t.as_str()))
    }
}

impl Default for StableHeuristic {
    fn default() -> Self {
        Self::new(DEFAULT_STABLE_TICKERS)
    }
}

/// Prices for every asset in a run, keyed by asset id
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceBook {
    records: BTreeMap<String, PriceRecord>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: PriceRecord) {
        self.records.insert(record.asset_id.clone(), record);
    }

    /// Price record for an asset; unknown if it was never resolved
    pub fn get(&self, asset_id: &str) -> PriceRecord {
        self.records
            .get(asset_id)
            .cloned()
            .unwrap_or_else(|| PriceRecord::unknown(asset_id))
    }

    pub fn known_usd(&self, asset_id: &str) -> Option<f64> {
        self.records.get(asset_id).and_then(PriceRecord::known_usd)
    }

    pub fn records(&self) -> impl Iterator<Item = &PriceRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of assets satisfied by each method
    pub fn method_counts(&self) -> BTreeMap<PriceMethod, usize> {
        let mut counts = BTreeMap::new();
        for record in self.records.values() {
            *counts.entry(record.method).or_insert(0) += 1;
        }
        counts
    }
}

/// A usable price is finite and strictly positive
pub fn checked_usd(asset_id: &str, usd: f64) -> Result<f64> {
    if usd.is_finite() && usd > 0.0 {
        Ok(usd)
    } else {
        Err(Error::InvalidPrice {
            asset: asset_id.to_string(),
            price: usd,
        })
    }
}
