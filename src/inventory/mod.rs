//! Vault inventory and transfer plan inputs
//!
//! Positions are rebuilt from a snapshot on every run; nothing here is
//! persisted or mutated after load.

pub mod input;
pub mod types;

pub use input::{read_inventory, read_plan};
pub use types::{InventoryPosition, PlanRow, RowId};

use std::collections::{BTreeSet, HashMap};

/// Indexed view over one inventory snapshot
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    positions: Vec<InventoryPosition>,
    /// (vault, asset) -> index into positions
    index: HashMap<(String, String), usize>,
}

impl Inventory {
    pub fn new(positions: Vec<InventoryPosition>) -> Self {
        let mut inventory = Self::default();
        for position in positions.into_iter().filter(|p| p.is_retained()) {
            let key = (position.vault_id.clone(), position.asset_id.clone());
            match inventory.index.get(&key) {
                // Duplicate snapshot lines for one vault/asset are summed
                Some(&i) => {
                    inventory.positions[i].available += position.available;
                    inventory.positions[i].total += position.total;
                }
                None => {
                    inventory.index.insert(key, inventory.positions.len());
                    inventory.positions.push(position);
                }
            }
        }
        inventory
    }

    pub fn positions(&self) -> &[InventoryPosition] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Available balance of an asset in a vault, if the vault holds it
    pub fn available(&self, vault_id: &str, asset_id: &str) -> Option<f64> {
        self.index
            .get(&(vault_id.to_string(), asset_id.to_string()))
            .map(|&i| self.positions[i].available)
    }

    /// Distinct asset ids, sorted
    pub fn asset_ids(&self) -> BTreeSet<String> {
        self.positions.iter().map(|p| p.asset_id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(vault: &str, asset: &str, available: f64, total: f64) -> InventoryPosition {
        InventoryPosition {
            vault_id: vault.to_string(),
            asset_id: asset.to_string(),
            available,
            total,
        }
    }

    #[test]
    fn test_inventory_lookup() {
        let inv = Inventory::new(vec![
            pos("1", "USDC", 100.0, 100.0),
            pos("1", "ETH", 0.0, 0.0),
            pos("2", "ETH", 1.5, 2.0),
        ]);
        assert_eq!(inv.len(), 2);
        assert_eq!(inv.available("1", "USDC"), Some(100.0));
        assert_eq!(inv.available("1", "ETH"), None);
        assert_eq!(inv.available("2", "ETH"), Some(1.5));
        let assets: Vec<_> = inv.asset_ids().into_iter().collect();
        assert_eq!(assets, vec!["ETH".to_string(), "USDC".to_string()]);
    }

    #[test]
    fn test_duplicate_positions_summed() {
        let inv = Inventory::new(vec![pos("1", "BTC", 0.5, 0.5), pos("1", "BTC", 0.25, 0.5)]);
        assert_eq!(inv.len(), 1);
        assert_eq!(inv.available("1", "BTC"), Some(0.75));
        assert_eq!(inv.positions()[0].total, 1.0);
    }
}
