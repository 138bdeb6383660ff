//! Roll-ups over classified rows
//!
//! Groups are keyed in BTreeMaps and sorted by descending known USD, then
//! descending row count, then key, so repeated runs emit identical reports.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::eligibility::ClassifiedRow;
use crate::inventory::Inventory;
use crate::pricing::PriceBook;

/// Linear interpolation between order statistics.
///
/// `sorted` must be ascending; `p` is a fraction in [0, 1]. For n values the
/// rank is `(n - 1) * p`, blended between its floor and ceiling neighbours.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let p = p.clamp(0.0, 1.0);
    let rank = (sorted.len() - 1) as f64 * p;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let weight = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * weight)
}

/// Aggregate statistics for one group of rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub key: String,
    pub rows: usize,
    /// Distinct source vaults
    pub wallets: usize,
    pub amount_sum: f64,
    /// Sum over rows with a known USD estimate
    pub usd_known_sum: f64,
    /// Rows without a USD estimate
    pub unknown_count: usize,
    pub usd_median: Option<f64>,
    pub usd_p90: Option<f64>,
    pub usd_max: Option<f64>,
}

#[derive(Default)]
struct GroupAcc {
    rows: usize,
    wallets: BTreeSet<String>,
    amount_sum: f64,
    usd: Vec<f64>,
    unknown: usize,
}

impl GroupAcc {
    fn add(&mut self, row: &ClassifiedRow) {
        self.rows += 1;
        self.wallets.insert(row.row.source_vault_id.clone());
        self.amount_sum += row.row.amount;
        match row.estimated_usd {
            Some(usd) => self.usd.push(usd),
            None => self.unknown += 1,
        }
    }

    fn finish(mut self, key: String) -> GroupSummary {
        self.usd.sort_by(|a, b| a.total_cmp(b));
        GroupSummary {
            key,
            rows: self.rows,
            wallets: self.wallets.len(),
            amount_sum: self.amount_sum,
            usd_known_sum: self.usd.iter().sum(),
            unknown_count: self.unknown,
            usd_median: percentile(&self.usd, 0.5),
            usd_p90: percentile(&self.usd, 0.9),
            usd_max: self.usd.last().copied(),
        }
    }
}

/// Report order: USD desc, rows desc, key asc
fn report_order(a: &GroupSummary, b: &GroupSummary) -> Ordering {
    b.usd_known_sum
        .total_cmp(&a.usd_known_sum)
        .then_with(|| b.rows.cmp(&a.rows))
        .then_with(|| a.key.cmp(&b.key))
}

/// Group rows by an arbitrary key
pub fn summarize_by<F>(rows: &[ClassifiedRow], key: F) -> Vec<GroupSummary>
where
    F: Fn(&ClassifiedRow) -> String,
{
    let mut groups: BTreeMap<String, GroupAcc> = BTreeMap::new();
    for row in rows {
        groups.entry(key(row)).or_default().add(row);
    }
    let mut out: Vec<GroupSummary> = groups
        .into_iter()
        .map(|(key, acc)| acc.finish(key))
        .collect();
    out.sort_by(report_order);
    out
}

pub fn summarize_by_asset(rows: &[ClassifiedRow]) -> Vec<GroupSummary> {
    summarize_by(rows, |r| r.row.asset_id.clone())
}

pub fn summarize_by_reason(rows: &[ClassifiedRow]) -> Vec<GroupSummary> {
    summarize_by(rows, |r| r.reason.to_string())
}

/// USD value of one vault's inventory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VaultMateriality {
    pub vault_id: String,
    pub positions: usize,
    pub usd_known: f64,
    /// Positions whose asset has no known price
    pub unpriced_positions: usize,
    pub material: bool,
}

/// Value each vault's available balances and flag the material ones
pub fn vault_materiality(
    inventory: &Inventory,
    prices: &PriceBook,
    threshold_usd: f64,
) -> Vec<VaultMateriality> {
    let mut vaults: BTreeMap<&str, (usize, f64, usize)> = BTreeMap::new();
    for position in inventory.positions() {
        let entry = vaults.entry(position.vault_id.as_str()).or_default();
        entry.0 += 1;
        match prices.known_usd(&position.asset_id) {
            Some(usd) => entry.1 += position.available * usd,
            None => entry.2 += 1,
        }
    }

    let mut out: Vec<VaultMateriality> = vaults
        .into_iter()
        .map(|(vault_id, (positions, usd_known, unpriced))| VaultMateriality {
            vault_id: vault_id.to_string(),
            positions,
            usd_known,
            unpriced_positions: unpriced,
            material: usd_known >= threshold_usd,
        })
        .collect();
    out.sort_by(|a, b| {
        b.usd_known
            .total_cmp(&a.usd_known)
            .then_with(|| a.vault_id.cmp(&b.vault_id))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::{MinBasis, Reason};
    use crate::inventory::{InventoryPosition, PlanRow};
    use crate::pricing::{PriceMethod, PriceRecord};

    fn classified(source: &str, asset: &str, amount: f64, usd: Option<f64>, reason: Reason) -> ClassifiedRow {
        let row = PlanRow {
            source_vault_id: source.to_string(),
            asset_id: asset.to_string(),
            amount,
            destination_vault_id: "0".to_string(),
            requires_gas: false,
            gas_asset_id: String::new(),
            gas_ready: false,
        };
        ClassifiedRow {
            row_id: row.row_id().to_string(),
            row,
            price_usd: usd.map(|u| u / amount),
            price_method: if usd.is_some() { PriceMethod::Cached } else { PriceMethod::Unknown },
            estimated_usd: usd,
            reason,
            min_amount: None,
            min_basis: MinBasis::None,
            source_available: None,
        }
    }

    #[test]
    fn test_percentile_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.5), Some(2.5));
        let p90 = percentile(&values, 0.9).unwrap();
        assert!((p90 - 3.7).abs() < 1e-12);
        assert_eq!(percentile(&values, 1.0), Some(4.0));
        assert_eq!(percentile(&values, 0.0), Some(1.0));
    }

    #[test]
    fn test_percentile_edges() {
        assert_eq!(percentile(&[], 0.5), None);
        assert_eq!(percentile(&[7.0], 0.9), Some(7.0));
    }

    #[test]
    fn test_summarize_by_asset() {
        let rows = vec![
            classified("1", "ETH", 1.0, Some(3000.0), Reason::ReadyToExecute),
            classified("2", "ETH", 0.5, Some(1500.0), Reason::NeedsGas),
            classified("2", "ETH", 0.1, None, Reason::UnknownPrice),
            classified("3", "USDC", 100.0, Some(100.0), Reason::ReadyToExecute),
        ];
        let summary = summarize_by_asset(&rows);
        assert_eq!(summary.len(), 2);

        let eth = &summary[0];
        assert_eq!(eth.key, "ETH");
        assert_eq!(eth.rows, 3);
        assert_eq!(eth.wallets, 2);
        assert!((eth.amount_sum - 1.6).abs() < 1e-12);
        assert_eq!(eth.usd_known_sum, 4500.0);
        assert_eq!(eth.unknown_count, 1);
        assert_eq!(eth.usd_median, Some(2250.0));
        assert_eq!(eth.usd_max, Some(3000.0));

        assert_eq!(summary[1].key, "USDC");
    }

    #[test]
    fn test_sort_ties_by_row_count_then_key() {
        let rows = vec![
            classified("1", "AAA", 1.0, None, Reason::UnknownPrice),
            classified("1", "BBB", 1.0, None, Reason::UnknownPrice),
            classified("2", "BBB", 1.0, None, Reason::UnknownPrice),
            classified("1", "CCC", 1.0, None, Reason::UnknownPrice),
        ];
        let keys: Vec<String> = summarize_by_asset(&rows).into_iter().map(|g| g.key).collect();
        assert_eq!(keys, vec!["BBB", "AAA", "CCC"]);
    }

    #[test]
    fn test_summarize_by_reason() {
        let rows = vec![
            classified("1", "ETH", 1.0, Some(3000.0), Reason::ReadyToExecute),
            classified("2", "BTC", 0.01, Some(600.0), Reason::ReadyToExecute),
            classified("2", "XYZ", 5.0, None, Reason::UnknownPrice),
        ];
        let summary = summarize_by_reason(&rows);
        assert_eq!(summary[0].key, "READY_TO_EXECUTE");
        assert_eq!(summary[0].rows, 2);
        assert_eq!(summary[0].usd_known_sum, 3600.0);
        assert_eq!(summary[1].key, "UNKNOWN_PRICE");
        assert_eq!(summary[1].unknown_count, 1);
        assert_eq!(summary[1].usd_median, None);
    }

    #[test]
    fn test_vault_materiality() {
        let inventory = Inventory::new(vec![
            InventoryPosition { vault_id: "1".into(), asset_id: "USDC".into(), available: 0.5, total: 0.5 },
            InventoryPosition { vault_id: "2".into(), asset_id: "ETH".into(), available: 1.0, total: 1.0 },
            InventoryPosition { vault_id: "2".into(), asset_id: "XYZ".into(), available: 9.0, total: 9.0 },
        ]);
        let mut prices = PriceBook::new();
        prices.insert(PriceRecord::new("USDC", 1.0, PriceMethod::StableFallback, "usd_peg"));
        prices.insert(PriceRecord::new("ETH", 3000.0, PriceMethod::Cached, "cache"));

        let vaults = vault_materiality(&inventory, &prices, 1.0);
        assert_eq!(vaults.len(), 2);
        assert_eq!(vaults[0].vault_id, "2");
        assert!(vaults[0].material);
        assert_eq!(vaults[0].unpriced_positions, 1);
        assert_eq!(vaults[1].usd_known, 0.5);
        assert!(!vaults[1].material);
    }
}
