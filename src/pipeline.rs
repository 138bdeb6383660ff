//! One reconciliation run
//!
//! ledger -> completed set; inventory + plan -> remaining rows -> asset set
//! -> prices -> classified rows -> summaries. Inputs are loaded in full
//! before anything is priced, so a missing input aborts with no output.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::aggregate::{summarize_by_asset, summarize_by_reason, vault_materiality, GroupSummary, VaultMateriality};
use crate::config::{Config, InputsConfig};
use crate::eligibility::{classify_remaining, Classification, MinRules, Reason};
use crate::error::Result;
use crate::inventory::{read_inventory, read_plan, Inventory, PlanRow};
use crate::ledger::CompletedSet;
use crate::pricing::{
    CoinGeckoClient, JsonFilePriceStore, PriceBook, PriceFeed, PriceResolver, StableHeuristic,
};

/// Everything a run reads from disk
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub inventory: Inventory,
    pub plan: Vec<PlanRow>,
    pub completed: CompletedSet,
}

impl RunInputs {
    /// Load inventory, plan and ledgers; any failure here is fatal
    pub fn load(config: &InputsConfig) -> Result<Self> {
        let completed = CompletedSet::load(&config.ledger_dir, &config.ledger_pattern)?;
        let inventory = Inventory::new(read_inventory(&config.inventory_path)?);
        let plan = read_plan(&config.plan_path)?;
        Ok(Self {
            inventory,
            plan,
            completed,
        })
    }

    /// Assets that need a price: remaining plan rows plus held inventory
    pub fn asset_ids(&self) -> BTreeSet<String> {
        let mut assets = self.inventory.asset_ids();
        for row in &self.plan {
            if !self.completed.contains(&row.row_id()) {
                assets.insert(row.asset_id.clone());
            }
        }
        assets
    }
}

/// Completed vs remaining plan rows, from the plan and ledgers alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStatus {
    pub completed_ids: usize,
    pub plan_rows: usize,
    pub completed_in_plan: usize,
}

impl LedgerStatus {
    pub fn remaining(&self) -> usize {
        self.plan_rows - self.completed_in_plan
    }
}

/// Does not read the inventory, so it works before a snapshot exists
pub fn ledger_status(config: &InputsConfig) -> Result<LedgerStatus> {
    let completed = CompletedSet::load(&config.ledger_dir, &config.ledger_pattern)?;
    let plan = read_plan(&config.plan_path)?;
    let completed_in_plan = plan
        .iter()
        .filter(|row| completed.contains(&row.row_id()))
        .count();
    Ok(LedgerStatus {
        completed_ids: completed.len(),
        plan_rows: plan.len(),
        completed_in_plan,
    })
}

/// Headline numbers for a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunTotals {
    pub plan_rows: usize,
    pub completed_rows: usize,
    pub remaining_rows: usize,
    pub by_reason: BTreeMap<String, usize>,
    pub usd_known_total: f64,
    pub usd_ready_total: f64,
    pub unknown_price_rows: usize,
    pub price_methods: BTreeMap<String, usize>,
    pub material_vaults: usize,
}

/// Output of one run, handed to the report emitter
#[derive(Debug, Clone)]
pub struct RunReport {
    pub prices: PriceBook,
    pub classification: Classification,
    pub by_asset: Vec<GroupSummary>,
    pub by_reason: Vec<GroupSummary>,
    pub vaults: Vec<VaultMateriality>,
    pub totals: RunTotals,
}

/// Cache-backed resolver with the live feed unless pricing is offline
pub fn build_resolver(config: &Config) -> Result<PriceResolver> {
    let store = JsonFilePriceStore::open(&config.inputs.price_cache_path)?;
    let feed: Option<Arc<dyn PriceFeed>> = if config.pricing.offline {
        None
    } else {
        let key = Some(config.pricing.api_key.clone());
        Some(Arc::new(CoinGeckoClient::new(
            &config.pricing.api_base,
            key,
            Duration::from_millis(config.pricing.timeout_ms),
        )))
    };
    Ok(PriceResolver::new(&config.pricing, Box::new(store), feed))
}

pub fn min_rules(config: &Config) -> MinRules {
    MinRules::from_config(
        &config.eligibility,
        StableHeuristic::new(&config.pricing.stable_tickers),
    )
}

/// Price, classify and aggregate. The resolver persists its merged cache.
pub async fn run(
    inputs: &RunInputs,
    resolver: &mut PriceResolver,
    rules: &MinRules,
    materiality_usd: f64,
) -> Result<RunReport> {
    let prices = resolver.resolve_all(inputs.asset_ids()).await?;
    let classification = classify_remaining(
        &inputs.plan,
        &inputs.completed,
        &prices,
        rules,
        &inputs.inventory,
    );

    let by_asset = summarize_by_asset(&classification.rows);
    let by_reason = summarize_by_reason(&classification.rows);
    let vaults = vault_materiality(&inputs.inventory, &prices, materiality_usd);
    let totals = totals(inputs, &classification, &prices, &vaults);

    info!(
        plan = totals.plan_rows,
        completed = totals.completed_rows,
        remaining = totals.remaining_rows,
        usd_known = totals.usd_known_total,
        unknown_price = totals.unknown_price_rows,
        "Reconciliation complete"
    );

    Ok(RunReport {
        prices,
        classification,
        by_asset,
        by_reason,
        vaults,
        totals,
    })
}

fn totals(
    inputs: &RunInputs,
    classification: &Classification,
    prices: &PriceBook,
    vaults: &[VaultMateriality],
) -> RunTotals {
    let rows = &classification.rows;
    let by_reason = Reason::all()
        .iter()
        .map(|r| (r.to_string(), classification.count(*r)))
        .collect();
    let price_methods = prices
        .method_counts()
        .into_iter()
        .map(|(m, n)| (m.to_string(), n))
        .collect();

    RunTotals {
        plan_rows: inputs.plan.len(),
        completed_rows: classification.completed,
        remaining_rows: rows.len(),
        by_reason,
        usd_known_total: rows.iter().filter_map(|r| r.estimated_usd).sum(),
        usd_ready_total: rows
            .iter()
            .filter(|r| r.reason == Reason::ReadyToExecute)
            .filter_map(|r| r.estimated_usd)
            .sum(),
        unknown_price_rows: rows.iter().filter(|r| r.estimated_usd.is_none()).count(),
        price_methods,
        material_vaults: vaults.iter().filter(|v| v.material).count(),
    }
}
