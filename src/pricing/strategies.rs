//! Local price strategies
//!
//! Everything here resolves from data already in memory. Live fetching is
//! batched and lives in the resolver.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::pricing::{checked_usd, PriceMethod, PriceRecord, PriceStrategy, StableHeuristic};

/// Manual USD prices; absolute precedence over everything else
#[derive(Debug, Clone, Default)]
pub struct OverrideStrategy {
    prices: BTreeMap<String, f64>,
}

impl OverrideStrategy {
    /// Overrides of zero, negative or non-finite prices are dropped as invalid
    pub fn new(raw: &BTreeMap<String, f64>) -> Self {
        let mut prices = BTreeMap::new();
        for (asset, &usd) in raw {
            match checked_usd(asset, usd) {
                Ok(usd) => {
                    prices.insert(asset.clone(), usd);
                }
                Err(e) => warn!("Ignoring price override: {}", e),
            }
        }
        Self { prices }
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl PriceStrategy for OverrideStrategy {
    fn method(&self) -> PriceMethod {
        PriceMethod::Override
    }

    fn try_resolve(&self, asset_id: &str) -> Option<PriceRecord> {
        self.prices
            .get(asset_id)
            .map(|&usd| PriceRecord::new(asset_id, usd, self.method(), "manual"))
    }
}

/// Fixed $1 for assets that look USD-pegged
#[derive(Debug, Clone)]
pub struct StableFallbackStrategy {
    heuristic: StableHeuristic,
    strict: bool,
}

impl StableFallbackStrategy {
    pub fn new(heuristic: StableHeuristic, strict: bool) -> Self {
        Self { heuristic, strict }
    }
}

impl PriceStrategy for StableFallbackStrategy {
    fn method(&self) -> PriceMethod {
        PriceMethod::StableFallback
    }

    fn try_resolve(&self, asset_id: &str) -> Option<PriceRecord> {
        if self.strict || !self.heuristic.is_stable(asset_id) {
            return None;
        }
        Some(PriceRecord::new(asset_id, 1.0, self.method(), "usd_peg"))
    }
}

/// Wrapped/derivative assets priced from their underlying's cached price
#[derive(Debug, Clone)]
pub struct BasisSymbolStrategy {
    basis: BTreeMap<String, String>,
    cache: Arc<BTreeMap<String, f64>>,
}

impl BasisSymbolStrategy {
    pub fn new(basis: BTreeMap<String, String>, cache: Arc<BTreeMap<String, f64>>) -> Self {
        Self { basis, cache }
    }
}

impl PriceStrategy for BasisSymbolStrategy {
    fn method(&self) -> PriceMethod {
        PriceMethod::BasisSymbol
    }

    fn try_resolve(&self, asset_id: &str) -> Option<PriceRecord> {
        let symbol = self.basis.get(asset_id)?;
        let usd = self.cache.get(symbol).copied().filter(|p| *p > 0.0)?;
        Some(PriceRecord::new(asset_id, usd, self.method(), symbol))
    }
}

/// Prices persisted by earlier runs
#[derive(Debug, Clone)]
pub struct CachedStrategy {
    cache: Arc<BTreeMap<String, f64>>,
}

impl CachedStrategy {
    pub fn new(cache: Arc<BTreeMap<String, f64>>) -> Self {
        Self { cache }
    }
}

impl PriceStrategy for CachedStrategy {
    fn method(&self) -> PriceMethod {
        PriceMethod::Cached
    }

    fn try_resolve(&self, asset_id: &str) -> Option<PriceRecord> {
        let usd = self.cache.get(asset_id).copied().filter(|p| *p > 0.0)?;
        Some(PriceRecord::new(asset_id, usd, self.method(), "cache"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(entries: &[(&str, f64)]) -> Arc<BTreeMap<String, f64>> {
        Arc::new(entries.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    #[test]
    fn test_override_rejects_non_positive() {
        let raw: BTreeMap<String, f64> = [
            ("BTC".to_string(), 60_000.0),
            ("DUST".to_string(), 0.0),
            ("NEG".to_string(), -3.0),
        ]
        .into_iter()
        .collect();
        let strategy = OverrideStrategy::new(&raw);
        assert_eq!(strategy.len(), 1);
        assert_eq!(strategy.try_resolve("BTC").unwrap().usd, Some(60_000.0));
        assert!(strategy.try_resolve("DUST").is_none());
        assert!(strategy.try_resolve("NEG").is_none());
    }

    #[test]
    fn test_stable_fallback_respects_strict() {
        let lenient = StableFallbackStrategy::new(StableHeuristic::default(), false);
        let record = lenient.try_resolve("USDC").unwrap();
        assert_eq!(record.usd, Some(1.0));
        assert_eq!(record.method, PriceMethod::StableFallback);
        assert!(lenient.try_resolve("ETH").is_none());

        let strict = StableFallbackStrategy::new(StableHeuristic::default(), true);
        assert!(strict.try_resolve("USDC").is_none());
    }

    #[test]
    fn test_basis_symbol_needs_cached_underlying() {
        let basis: BTreeMap<String, String> = [
            ("WBTC".to_string(), "BTC".to_string()),
            ("STETH".to_string(), "ETH".to_string()),
        ]
        .into_iter()
        .collect();
        let strategy = BasisSymbolStrategy::new(basis, cache(&[("BTC", 61_000.0)]));

        let record = strategy.try_resolve("WBTC").unwrap();
        assert_eq!(record.usd, Some(61_000.0));
        assert_eq!(record.reference, "BTC");
        assert!(strategy.try_resolve("STETH").is_none());
        assert!(strategy.try_resolve("BTC").is_none());
    }

    #[test]
    fn test_cached_skips_non_positive() {
        let strategy = CachedStrategy::new(cache(&[("ETH", 3_000.0), ("OLD", 0.0)]));
        assert_eq!(strategy.try_resolve("ETH").unwrap().method, PriceMethod::Cached);
        assert!(strategy.try_resolve("OLD").is_none());
        assert!(strategy.try_resolve("SOL").is_none());
    }
}
