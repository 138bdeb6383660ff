//! Price resolver
//!
//! Runs the local strategy chain for every asset, then batch-fetches the
//! leftovers from the live feed. A live price never replaces one found
//! earlier in the chain: only assets the chain left unknown are queried.

use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::PricingConfig;
use crate::error::Result;
use crate::pricing::coingecko::PriceFeed;
use crate::pricing::store::PriceStore;
use crate::pricing::strategies::{
    BasisSymbolStrategy, CachedStrategy, OverrideStrategy, StableFallbackStrategy,
};
use crate::pricing::{
    checked_usd, PriceBook, PriceMethod, PriceRecord, PriceStrategy, StableHeuristic,
};

pub struct PriceResolver {
    chain: Vec<Box<dyn PriceStrategy>>,
    store: Box<dyn PriceStore>,
    feed: Option<Arc<dyn PriceFeed>>,
    /// assetId -> live feed id
    feed_ids: BTreeMap<String, String>,
    chunk_size: usize,
    concurrency: usize,
    offline: bool,
}

impl PriceResolver {
    /// Build the standard chain: override, stable, basis symbol, cache
    pub fn new(
        config: &PricingConfig,
        store: Box<dyn PriceStore>,
        feed: Option<Arc<dyn PriceFeed>>,
    ) -> Self {
        let cache = Arc::new(store.snapshot().clone());
        let chain: Vec<Box<dyn PriceStrategy>> = vec![
            Box::new(OverrideStrategy::new(&config.overrides)),
            Box::new(StableFallbackStrategy::new(
                StableHeuristic::new(&config.stable_tickers),
                config.strict,
            )),
            Box::new(BasisSymbolStrategy::new(
                config.basis_symbols.clone(),
                cache.clone(),
            )),
            Box::new(CachedStrategy::new(cache)),
        ];

        Self {
            chain,
            store,
            feed,
            feed_ids: config.coingecko_ids.clone(),
            chunk_size: config.chunk_size.max(1),
            concurrency: config.fetch_concurrency.max(1),
            offline: config.offline,
        }
    }

    /// Resolver with a caller-supplied chain
    pub fn with_chain(
        chain: Vec<Box<dyn PriceStrategy>>,
        store: Box<dyn PriceStore>,
        feed: Option<Arc<dyn PriceFeed>>,
        feed_ids: BTreeMap<String, String>,
        chunk_size: usize,
    ) -> Self {
        Self {
            chain,
            store,
            feed,
            feed_ids,
            chunk_size: chunk_size.max(1),
            concurrency: 1,
            offline: false,
        }
    }

    pub fn store(&self) -> &dyn PriceStore {
        self.store.as_ref()
    }

    /// Walk the local chain; first hit wins
    pub fn resolve(&self, asset_id: &str) -> PriceRecord {
        self.chain
            .iter()
            .find_map(|strategy| strategy.try_resolve(asset_id))
            .unwrap_or_else(|| PriceRecord::unknown(asset_id))
    }

    /// Resolve every asset, live-fetch what is left, merge the cache and
    /// persist it. Feed failures degrade to unknown prices; only a cache
    /// write failure is returned as an error.
    pub async fn resolve_all<I, S>(&mut self, assets: I) -> Result<PriceBook>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let assets: BTreeSet<String> = assets
            .into_iter()
            .map(|a| a.as_ref().to_string())
            .collect();

        let mut book = PriceBook::new();
        let mut unresolved = Vec::new();
        for asset in &assets {
            let record = self.resolve(asset);
            if record.method == PriceMethod::Unknown {
                unresolved.push(asset.clone());
            }
            book.insert(record);
        }

        debug!(
            total = assets.len(),
            unresolved = unresolved.len(),
            "Local price chain finished"
        );

        let fetched = self.fetch_live(&unresolved).await;
        for (asset, record) in &fetched {
            self.store.upsert(asset, record.usd.unwrap_or_default());
            book.insert(record.clone());
        }

        if !fetched.is_empty() {
            self.store.persist()?;
        }

        info!(
            assets = book.len(),
            live = fetched.len(),
            unknown = book.method_counts().get(&PriceMethod::Unknown).copied().unwrap_or(0),
            "Prices resolved"
        );
        Ok(book)
    }

    /// Live prices for `unresolved` assets that have a feed id.
    /// Assets sharing a feed id are fetched once.
    async fn fetch_live(&self, unresolved: &[String]) -> BTreeMap<String, PriceRecord> {
        let mut fetched = BTreeMap::new();
        let feed = match (&self.feed, self.offline) {
            (Some(feed), false) => feed.clone(),
            (_, true) => {
                if !unresolved.is_empty() {
                    debug!("Offline mode: skipping live fetch for {} assets", unresolved.len());
                }
                return fetched;
            }
            (None, false) => return fetched,
        };

        // feed id -> assets waiting on it
        let mut by_feed_id: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for asset in unresolved {
            if let Some(id) = self.feed_ids.get(asset).filter(|id| !id.is_empty()) {
                by_feed_id.entry(id.as_str()).or_default().push(asset.as_str());
            }
        }
        if by_feed_id.is_empty() {
            return fetched;
        }

        let ids: Vec<String> = by_feed_id.keys().map(|id| id.to_string()).collect();
        let chunks: Vec<Vec<String>> = ids.chunks(self.chunk_size).map(|c| c.to_vec()).collect();
        info!(
            "Fetching {} prices from {} in {} chunk(s)",
            ids.len(),
            feed.name(),
            chunks.len()
        );

        let results: Vec<_> = stream::iter(chunks.into_iter().enumerate())
            .map(|(i, chunk)| {
                let feed = feed.clone();
                async move {
                    let result = feed.fetch_usd(&chunk).await;
                    (i, chunk.len(), result)
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        for (i, size, result) in results {
            let prices = match result {
                Ok(prices) => prices,
                Err(e) => {
                    warn!(chunk = i, size, "Price chunk failed, leaving assets unknown: {}", e);
                    continue;
                }
            };
            for (id, usd) in prices {
                let usd = match checked_usd(&id, usd) {
                    Ok(usd) => usd,
                    Err(e) => {
                        warn!("Dropping live price: {}", e);
                        continue;
                    }
                };
                if let Some(waiting) = by_feed_id.get(id.as_str()) {
                    for asset in waiting {
                        fetched.insert(
                            asset.to_string(),
                            PriceRecord::new(asset, usd, PriceMethod::Coingecko, &id),
                        );
                    }
                }
            }
        }

        fetched
    }
}
