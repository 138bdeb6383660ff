//! Execution-readiness classification
//!
//! Every remaining plan row gets exactly one [`Reason`]. Priority order:
//!
//! 1. `NEEDS_GAS` - gas required but not provisioned. Wins over everything,
//!    a gas-blocked row is not actionable at any value.
//! 2. `BELOW_MIN` - a minimum applies and the amount is strictly below it.
//! 3. `UNKNOWN_PRICE` - only when nothing above disqualified the row.
//! 4. `READY_TO_EXECUTE`
//!
//! An unknown price never produces a minimum, so unpriced rows are never
//! silently dropped into `BELOW_MIN`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::config::EligibilityConfig;
use crate::inventory::{Inventory, PlanRow};
use crate::ledger::CompletedSet;
use crate::pricing::{PriceBook, PriceRecord, StableHeuristic};

/// Execution readiness of one remaining transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    ReadyToExecute,
    NeedsGas,
    BelowMin,
    UnknownPrice,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::ReadyToExecute => "READY_TO_EXECUTE",
            Reason::NeedsGas => "NEEDS_GAS",
            Reason::BelowMin => "BELOW_MIN",
            Reason::UnknownPrice => "UNKNOWN_PRICE",
        }
    }

    pub fn all() -> [Reason; 4] {
        [
            Reason::ReadyToExecute,
            Reason::NeedsGas,
            Reason::BelowMin,
            Reason::UnknownPrice,
        ]
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rule produced a row's minimum amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinBasis {
    /// Explicit per-asset table entry
    AssetOverride,
    /// Stable asset: USD floor read as token units
    StableUsd,
    /// USD floor divided by the known price
    PricedUsd,
    /// Price unknown, no floor applies
    None,
}

impl fmt::Display for MinBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinBasis::AssetOverride => write!(f, "asset_override"),
            MinBasis::StableUsd => write!(f, "stable_usd"),
            MinBasis::PricedUsd => write!(f, "priced_usd"),
            MinBasis::None => write!(f, "none"),
        }
    }
}

/// Minimum-transfer thresholds
#[derive(Debug, Clone)]
pub struct MinRules {
    /// assetId -> minimum amount in token units
    pub per_asset: BTreeMap<String, f64>,
    pub stable_min_usd: f64,
    pub non_stable_min_usd: f64,
    pub stable: StableHeuristic,
}

impl MinRules {
    pub fn from_config(config: &EligibilityConfig, stable: StableHeuristic) -> Self {
        Self {
            per_asset: config.min_amounts.clone(),
            stable_min_usd: config.stablecoin_min_usd,
            non_stable_min_usd: config.min_usd_per_tx,
            stable,
        }
    }

    /// Minimum amount for an asset at a given price, by precedence:
    /// per-asset table, stable floor, USD floor over known price, none.
    pub fn min_amount(&self, asset_id: &str, known_usd: Option<f64>) -> (Option<f64>, MinBasis) {
        if let Some(&min) = self.per_asset.get(asset_id) {
            return (Some(min), MinBasis::AssetOverride);
        }
        if self.stable.is_stable(asset_id) {
            return (Some(self.stable_min_usd), MinBasis::StableUsd);
        }
        match known_usd {
            Some(usd) => (Some(self.non_stable_min_usd / usd), MinBasis::PricedUsd),
            None => (None, MinBasis::None),
        }
    }
}

impl Default for MinRules {
    fn default() -> Self {
        Self::from_config(&EligibilityConfig::default(), StableHeuristic::default())
    }
}

/// A remaining plan row with valuation and readiness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRow {
    #[serde(flatten)]
    pub row: PlanRow,
    pub row_id: String,
    pub price_usd: Option<f64>,
    pub price_method: crate::pricing::PriceMethod,
    pub estimated_usd: Option<f64>,
    pub reason: Reason,
    pub min_amount: Option<f64>,
    pub min_basis: MinBasis,
    /// Available balance of the asset in the source vault, if held
    pub source_available: Option<f64>,
}

/// Classify one row. Never fails; every row gets exactly one reason.
pub fn classify(row: &PlanRow, price: &PriceRecord, rules: &MinRules) -> ClassifiedRow {
    let known_usd = price.known_usd();
    let estimated_usd = known_usd.map(|usd| row.amount * usd);
    let (min_amount, min_basis) = rules.min_amount(&row.asset_id, known_usd);

    let reason = if row.is_gas_blocked() {
        Reason::NeedsGas
    } else if min_amount.map_or(false, |min| row.amount < min) {
        Reason::BelowMin
    } else if known_usd.is_none() {
        Reason::UnknownPrice
    } else {
        Reason::ReadyToExecute
    };

    ClassifiedRow {
        row: row.clone(),
        row_id: row.row_id().to_string(),
        price_usd: known_usd,
        price_method: price.method,
        estimated_usd,
        reason,
        min_amount,
        min_basis,
        source_available: None,
    }
}

/// Plan rows split into completed and classified remaining rows
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Remaining rows, in plan order
    pub rows: Vec<ClassifiedRow>,
    /// Plan rows skipped because their row id is in a completed ledger
    pub completed: usize,
}

impl Classification {
    pub fn count(&self, reason: Reason) -> usize {
        self.rows.iter().filter(|r| r.reason == reason).count()
    }
}

/// Drop completed rows and classify the rest, in plan order
pub fn classify_remaining(
    plan: &[PlanRow],
    completed: &CompletedSet,
    prices: &PriceBook,
    rules: &MinRules,
    inventory: &Inventory,
) -> Classification {
    let mut out = Classification::default();
    for row in plan {
        if completed.contains(&row.row_id()) {
            out.completed += 1;
            continue;
        }
        let mut classified = classify(row, &prices.get(&row.asset_id), rules);
        classified.source_available = inventory.available(&row.source_vault_id, &row.asset_id);
        out.rows.push(classified);
    }

    debug!(
        remaining = out.rows.len(),
        completed = out.completed,
        ready = out.count(Reason::ReadyToExecute),
        needs_gas = out.count(Reason::NeedsGas),
        below_min = out.count(Reason::BelowMin),
        unknown_price = out.count(Reason::UnknownPrice),
        "Classified plan rows"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{InventoryPosition, RowId};
    use crate::pricing::PriceMethod;

    fn rules() -> MinRules {
        MinRules {
            per_asset: BTreeMap::new(),
            stable_min_usd: 0.25,
            non_stable_min_usd: 0.01,
            stable: StableHeuristic::default(),
        }
    }

    fn row(asset: &str, amount: f64, requires_gas: bool, gas_ready: bool) -> PlanRow {
        PlanRow {
            source_vault_id: "V1".to_string(),
            asset_id: asset.to_string(),
            amount,
            destination_vault_id: "V2".to_string(),
            requires_gas,
            gas_asset_id: if requires_gas { "ETH".to_string() } else { String::new() },
            gas_ready,
        }
    }

    fn stable_price(asset: &str) -> PriceRecord {
        PriceRecord::new(asset, 1.0, PriceMethod::StableFallback, "usd_peg")
    }

    #[test]
    fn test_stable_ready_scenario() {
        let c = classify(&row("USDC", 50.0, false, false), &stable_price("USDC"), &rules());
        assert_eq!(c.price_usd, Some(1.0));
        assert_eq!(c.price_method, PriceMethod::StableFallback);
        assert_eq!(c.estimated_usd, Some(50.0));
        assert_eq!(c.min_amount, Some(0.25));
        assert_eq!(c.min_basis, MinBasis::StableUsd);
        assert_eq!(c.reason, Reason::ReadyToExecute);
        assert_eq!(c.row_id, "V1|USDC|V2");
    }

    #[test]
    fn test_needs_gas_scenario() {
        let c = classify(&row("USDC", 50.0, true, false), &stable_price("USDC"), &rules());
        assert_eq!(c.reason, Reason::NeedsGas);
        assert_eq!(c.estimated_usd, Some(50.0));
    }

    #[test]
    fn test_needs_gas_beats_below_min_and_unknown() {
        let tiny = classify(&row("USDC", 0.01, true, false), &stable_price("USDC"), &rules());
        assert_eq!(tiny.reason, Reason::NeedsGas);

        let unpriced = classify(&row("XYZ", 10.0, true, false), &PriceRecord::unknown("XYZ"), &rules());
        assert_eq!(unpriced.reason, Reason::NeedsGas);
    }

    #[test]
    fn test_gas_ready_not_blocked() {
        let c = classify(&row("USDC", 50.0, true, true), &stable_price("USDC"), &rules());
        assert_eq!(c.reason, Reason::ReadyToExecute);
    }

    #[test]
    fn test_min_boundary_is_inclusive() {
        let price = PriceRecord::new("LINK", 10.0, PriceMethod::Cached, "cache");
        let c = classify(&row("LINK", 0.001, false, false), &price, &rules());
        assert_eq!(c.min_basis, MinBasis::PricedUsd);
        assert!((c.min_amount.unwrap() - 0.001).abs() < 1e-15);
        assert_eq!(c.reason, Reason::ReadyToExecute);

        let below = classify(&row("LINK", 0.0009, false, false), &price, &rules());
        assert_eq!(below.reason, Reason::BelowMin);
    }

    #[test]
    fn test_unknown_price_never_below_min() {
        let c = classify(&row("XYZ", 0.0000001, false, false), &PriceRecord::unknown("XYZ"), &rules());
        assert_eq!(c.reason, Reason::UnknownPrice);
        assert_eq!(c.min_amount, None);
        assert_eq!(c.min_basis, MinBasis::None);
        assert_eq!(c.estimated_usd, None);
    }

    #[test]
    fn test_asset_override_applies_without_price() {
        let mut rules = rules();
        rules.per_asset.insert("XYZ".into(), 5.0);
        let below = classify(&row("XYZ", 1.0, false, false), &PriceRecord::unknown("XYZ"), &rules);
        assert_eq!(below.reason, Reason::BelowMin);
        assert_eq!(below.min_basis, MinBasis::AssetOverride);

        let above = classify(&row("XYZ", 6.0, false, false), &PriceRecord::unknown("XYZ"), &rules);
        assert_eq!(above.reason, Reason::UnknownPrice);
    }

    #[test]
    fn test_stable_floor_independent_of_price() {
        // strict mode: stable asset priced by the feed slightly off peg
        let price = PriceRecord::new("USDT", 0.5, PriceMethod::Coingecko, "tether");
        let c = classify(&row("USDT", 0.2, false, false), &price, &rules());
        assert_eq!(c.min_amount, Some(0.25));
        assert_eq!(c.reason, Reason::BelowMin);
        assert_eq!(c.estimated_usd, Some(0.1));
    }

    #[test]
    fn test_zero_price_is_unknown() {
        let price = PriceRecord::new("ABC", 0.0, PriceMethod::Cached, "cache");
        let c = classify(&row("ABC", 3.0, false, false), &price, &rules());
        assert_eq!(c.price_usd, None);
        assert_eq!(c.reason, Reason::UnknownPrice);
    }

    #[test]
    fn test_classify_remaining_excludes_completed() {
        let plan = vec![
            row("USDC", 50.0, false, false),
            PlanRow {
                source_vault_id: "V3".into(),
                ..row("ETH", 1.0, false, false)
            },
        ];
        let completed: CompletedSet = [RowId::new("V3", "ETH", "V2")].into_iter().collect();
        let mut prices = PriceBook::new();
        prices.insert(stable_price("USDC"));
        let inventory = Inventory::new(vec![InventoryPosition {
            vault_id: "V1".into(),
            asset_id: "USDC".into(),
            available: 100.0,
            total: 100.0,
        }]);

        let out = classify_remaining(&plan, &completed, &prices, &rules(), &inventory);
        assert_eq!(out.completed, 1);
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].row_id, "V1|USDC|V2");
        assert_eq!(out.rows[0].source_available, Some(100.0));
        assert!(out.rows.iter().all(|r| !completed.contains_str(&r.row_id)));
    }

    #[test]
    fn test_reason_serialization() {
        let json = serde_json::to_string(&Reason::ReadyToExecute).unwrap();
        assert_eq!(json, r#""READY_TO_EXECUTE""#);
        assert_eq!(Reason::BelowMin.to_string(), "BELOW_MIN");
    }
}
