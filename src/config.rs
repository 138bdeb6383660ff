//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::ledger::DEFAULT_LEDGER_PATTERN;
use crate::pricing::coingecko::{COINGECKO_BASE, MAX_IDS_PER_REQUEST};
use crate::pricing::{checked_usd, DEFAULT_STABLE_TICKERS};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub inputs: InputsConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub eligibility: EligibilityConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

/// Where run inputs and state live
#[derive(Debug, Clone, Deserialize)]
pub struct InputsConfig {
    #[serde(default = "default_inventory_path")]
    pub inventory_path: String,
    #[serde(default = "default_plan_path")]
    pub plan_path: String,
    /// Directory holding the append-only completion ledgers
    #[serde(default = "default_state_dir")]
    pub ledger_dir: String,
    #[serde(default = "default_ledger_pattern")]
    pub ledger_pattern: String,
    #[serde(default = "default_price_cache_path")]
    pub price_cache_path: String,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            inventory_path: default_inventory_path(),
            plan_path: default_plan_path(),
            ledger_dir: default_state_dir(),
            ledger_pattern: default_ledger_pattern(),
            price_cache_path: default_price_cache_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    /// Never hit the network; cache and static tables only
    #[serde(default)]
    pub offline: bool,
    /// Disable the $1 stable-asset fallback
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_stable_tickers")]
    pub stable_tickers: Vec<String>,
    /// assetId -> manual USD price (tables file only)
    #[serde(skip)]
    pub overrides: BTreeMap<String, f64>,
    /// assetId -> underlying symbol whose cached price it tracks
    #[serde(skip)]
    pub basis_symbols: BTreeMap<String, String>,
    /// assetId -> CoinGecko coin id
    #[serde(skip)]
    pub coingecko_ids: BTreeMap<String, String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Chunks in flight at once; 1 means strictly sequential
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            offline: false,
            strict: false,
            stable_tickers: default_stable_tickers(),
            overrides: BTreeMap::new(),
            basis_symbols: BTreeMap::new(),
            coingecko_ids: BTreeMap::new(),
            chunk_size: default_chunk_size(),
            fetch_concurrency: default_fetch_concurrency(),
            api_base: default_api_base(),
            api_key: default_api_key(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EligibilityConfig {
    /// Floor for stable assets, read as token units at $1
    #[serde(default = "default_stablecoin_min_usd")]
    pub stablecoin_min_usd: f64,
    /// USD floor for priced non-stable assets
    #[serde(default = "default_min_usd_per_tx")]
    pub min_usd_per_tx: f64,
    /// assetId -> explicit minimum amount in token units (tables file only)
    #[serde(skip)]
    pub min_amounts: BTreeMap<String, f64>,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            stablecoin_min_usd: default_stablecoin_min_usd(),
            min_usd_per_tx: default_min_usd_per_tx(),
            min_amounts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Vaults holding at least this much USD are material
    #[serde(default = "default_materiality_usd")]
    pub materiality_usd: f64,
    #[serde(default = "default_true")]
    pub write_csv: bool,
    #[serde(default = "default_true")]
    pub write_jsonl: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            materiality_usd: default_materiality_usd(),
            write_csv: true,
            write_jsonl: true,
        }
    }
}

/// Asset-keyed lookup tables kept in a JSON file next to the config.
/// Asset ids are case-sensitive and the layered loader lowercases keys, so
/// these tables are only read from this file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingTables {
    #[serde(default)]
    pub overrides: BTreeMap<String, f64>,
    #[serde(default)]
    pub basis_symbols: BTreeMap<String, String>,
    #[serde(default)]
    pub coingecko_ids: BTreeMap<String, String>,
    #[serde(default)]
    pub min_amounts: BTreeMap<String, f64>,
}

impl MappingTables {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read mapping tables {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("Invalid mapping tables {}", path.display()))
    }
}

/// Keys the layered loader must not carry; see [`MappingTables`]
const ASSET_KEYED_TABLES: &[&str] = &[
    "pricing.overrides",
    "pricing.basis_symbols",
    "pricing.coingecko_ids",
    "eligibility.min_amounts",
];

// Default value functions
fn default_inventory_path() -> String {
    "data/inventory.csv".into()
}

fn default_plan_path() -> String {
    "data/plan.csv".into()
}

fn default_state_dir() -> String {
    "state".into()
}

fn default_ledger_pattern() -> String {
    DEFAULT_LEDGER_PATTERN.into()
}

fn default_price_cache_path() -> String {
    "state/price_cache.json".into()
}

fn default_stable_tickers() -> Vec<String> {
    DEFAULT_STABLE_TICKERS.iter().map(|t| t.to_string()).collect()
}

fn default_chunk_size() -> usize {
    200
}

fn default_fetch_concurrency() -> usize {
    1
}

fn default_api_base() -> String {
    std::env::var("COINGECKO_API_BASE").unwrap_or_else(|_| COINGECKO_BASE.into())
}

fn default_api_key() -> String {
    std::env::var("COINGECKO_API_KEY").unwrap_or_default()
}

fn default_timeout_ms() -> u64 {
    10000
}

fn default_stablecoin_min_usd() -> f64 {
    0.25
}

fn default_min_usd_per_tx() -> f64 {
    0.01
}

fn default_output_dir() -> String {
    "reports".into()
}

fn default_materiality_usd() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file, optional mapping tables, and environment
    pub fn load<P: AsRef<Path>>(path: P, tables: Option<&Path>) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SWEEP_)
            .add_source(
                config::Environment::with_prefix("SWEEP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        reject_asset_tables(&settings)?;

        let mut config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Large override/mapping tables usually live in their own file
        if let Some(tables) = tables {
            let tables = MappingTables::load(tables)?;
            config.apply_tables(tables);
        }

        config.validate()?;

        Ok(config)
    }

    /// Merge mapping tables; entries from the tables file win
    pub fn apply_tables(&mut self, tables: MappingTables) {
        self.pricing.overrides.extend(tables.overrides);
        self.pricing.basis_symbols.extend(tables.basis_symbols);
        self.pricing.coingecko_ids.extend(tables.coingecko_ids);
        self.eligibility.min_amounts.extend(tables.min_amounts);
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.pricing.chunk_size == 0 || self.pricing.chunk_size > MAX_IDS_PER_REQUEST {
            anyhow::bail!(
                "pricing.chunk_size must be between 1 and {}, got {}",
                MAX_IDS_PER_REQUEST,
                self.pricing.chunk_size
            );
        }

        if self.pricing.fetch_concurrency == 0 {
            anyhow::bail!("pricing.fetch_concurrency must be at least 1");
        }

        if self.eligibility.stablecoin_min_usd < 0.0 {
            anyhow::bail!("eligibility.stablecoin_min_usd cannot be negative");
        }

        if self.eligibility.min_usd_per_tx < 0.0 {
            anyhow::bail!("eligibility.min_usd_per_tx cannot be negative");
        }

        for (asset, min) in &self.eligibility.min_amounts {
            if !min.is_finite() || *min < 0.0 {
                anyhow::bail!("eligibility.min_amounts.{} must be a non-negative number", asset);
            }
        }

        // Invalid overrides are dropped by the resolver, not fatal
        for (asset, usd) in &self.pricing.overrides {
            if let Err(e) = checked_usd(asset, *usd) {
                tracing::warn!("{}; the override will be ignored", e);
            }
        }

        if self.pricing.strict {
            tracing::warn!("Strict pricing enabled - stable assets will not default to $1");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Inputs:
    inventory: {}
    plan: {}
    ledger_dir: {} ({})
    price_cache: {}
  Pricing:
    offline: {}
    strict: {}
    stable_tickers: {:?}
    overrides: {}
    basis_symbols: {}
    coingecko_ids: {}
    chunk_size: {}
    fetch_concurrency: {}
    api_base: {}
    api_key: {}
  Eligibility:
    stablecoin_min_usd: {}
    min_usd_per_tx: {}
    min_amounts: {}
  Report:
    output_dir: {}
    materiality_usd: {}
"#,
            self.inputs.inventory_path,
            self.inputs.plan_path,
            self.inputs.ledger_dir,
            self.inputs.ledger_pattern,
            self.inputs.price_cache_path,
            self.pricing.offline,
            self.pricing.strict,
            self.pricing.stable_tickers,
            self.pricing.overrides.len(),
            self.pricing.basis_symbols.len(),
            self.pricing.coingecko_ids.len(),
            self.pricing.chunk_size,
            self.pricing.fetch_concurrency,
            mask_url(&self.pricing.api_base),
            if self.pricing.api_key.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            self.eligibility.stablecoin_min_usd,
            self.eligibility.min_usd_per_tx,
            self.eligibility.min_amounts.len(),
            self.report.output_dir,
            self.report.materiality_usd,
        )
    }
}

/// Asset-keyed tables set in the TOML file or environment would arrive with
/// lowercased keys and silently never match an asset id
fn reject_asset_tables(settings: &config::Config) -> Result<()> {
    for key in ASSET_KEYED_TABLES {
        if let Ok(table) = settings.get_table(key) {
            if !table.is_empty() {
                anyhow::bail!(
                    "{} is keyed by case-sensitive asset ids; move it to the --tables JSON file",
                    key
                );
            }
        }
    }
    Ok(())
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inputs: InputsConfig::default(),
            pricing: PricingConfig::default(),
            eligibility: EligibilityConfig::default(),
            report: ReportConfig::default(),
        }
    }
}
