//! Persistent price cache
//!
//! The cache is read fully at the start of a run and rewritten fully at the
//! end. Writes merge: entries this run did not touch are kept, so offline
//! runs still see prices from earlier online runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Key-value store of USD prices keyed by asset id (or basis symbol)
pub trait PriceStore: Send + Sync {
    /// Everything currently known
    fn snapshot(&self) -> &BTreeMap<String, f64>;

    /// Insert or replace one price
    fn upsert(&mut self, key: &str, usd: f64);

    /// Write the merged contents back to durable storage
    fn persist(&self) -> Result<()>;
}

/// In-memory store; `persist` is a no-op
#[derive(Debug, Clone, Default)]
pub struct MemoryPriceStore {
    entries: BTreeMap<String, f64>,
}

impl MemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl PriceStore for MemoryPriceStore {
    fn snapshot(&self) -> &BTreeMap<String, f64> {
        &self.entries
    }

    fn upsert(&mut self, key: &str, usd: f64) {
        self.entries.insert(key.to_string(), usd);
    }

    fn persist(&self) -> Result<()> {
        Ok(())
    }
}

/// JSON object file `{ "ETH": 3012.5, ... }`
#[derive(Debug, Clone)]
pub struct JsonFilePriceStore {
    path: PathBuf,
    entries: BTreeMap<String, f64>,
}

impl JsonFilePriceStore {
    /// Open the cache; a missing file is an empty cache
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let data = std::fs::read_to_string(&path)
                .map_err(|e| Error::PriceCache(format!("{}: {}", path.display(), e)))?;
            parse_cache(&data)
                .map_err(|e| Error::PriceCache(format!("{}: {}", path.display(), e)))?
        } else {
            debug!("No price cache at {}, starting empty", path.display());
            BTreeMap::new()
        };

        info!("Loaded {} cached prices from {}", entries.len(), path.display());
        Ok(Self { path, entries })
    }
}

impl PriceStore for JsonFilePriceStore {
    fn snapshot(&self) -> &BTreeMap<String, f64> {
        &self.entries
    }

    fn upsert(&mut self, key: &str, usd: f64) {
        self.entries.insert(key.to_string(), usd);
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&self.entries)?;

        // Write-then-rename so a crash never leaves a truncated cache
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)
            .map_err(|e| Error::PriceCache(format!("{}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| Error::PriceCache(format!("{}: {}", self.path.display(), e)))?;

        debug!("Saved {} prices to {}", self.entries.len(), self.path.display());
        Ok(())
    }
}

/// Keep only positive numeric entries; anything else is skipped
fn parse_cache(data: &str) -> std::result::Result<BTreeMap<String, f64>, serde_json::Error> {
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(data)?;
    let mut entries = BTreeMap::new();
    for (key, value) in raw {
        match value.as_f64().filter(|p| p.is_finite() && *p > 0.0) {
            Some(usd) => {
                entries.insert(key, usd);
            }
            None => warn!("Skipping unusable cached price for {}: {}", key, value),
        }
    }
    Ok(entries)
}
