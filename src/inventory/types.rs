//! Core types for inventory and transfer plans
//!
//! Defines vault positions, planned transfer rows, and the row identifier
//! used for idempotent completion tracking.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A balance held by one vault in one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryPosition {
    /// Custodial vault account identifier
    pub vault_id: String,
    /// Custodial asset identifier (e.g. "USDC", "ETH", "WBTC_ETH")
    pub asset_id: String,
    /// Amount available for transfer
    pub available: f64,
    /// Total amount including locked/pending balances
    pub total: f64,
}

impl InventoryPosition {
    /// Empty positions are dropped when parsing a snapshot
    pub fn is_retained(&self) -> bool {
        self.total > 0.0 || self.available > 0.0
    }
}

/// One planned transfer from a source vault to a destination vault
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRow {
    pub source_vault_id: String,
    pub asset_id: String,
    pub amount: f64,
    pub destination_vault_id: String,
    /// Transfer needs a gas asset in the source vault before it can execute
    pub requires_gas: bool,
    /// Gas asset used for the transfer (empty when not applicable)
    pub gas_asset_id: String,
    /// Gas has already been provisioned in the source vault
    pub gas_ready: bool,
}

impl PlanRow {
    pub fn row_id(&self) -> RowId {
        RowId::new(
            &self.source_vault_id,
            &self.asset_id,
            &self.destination_vault_id,
        )
    }

    /// Gas is required but not provisioned yet
    pub fn is_gas_blocked(&self) -> bool {
        self.requires_gas && !self.gas_ready
    }
}

/// Composite key `source|asset|destination`, the unit of idempotence
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RowId {
    pub source_vault_id: String,
    pub asset_id: String,
    pub destination_vault_id: String,
}

impl RowId {
    pub fn new(source: &str, asset: &str, destination: &str) -> Self {
        Self {
            source_vault_id: source.to_string(),
            asset_id: asset.to_string(),
            destination_vault_id: destination.to_string(),
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.source_vault_id, self.asset_id, self.destination_vault_id
        )
    }
}

impl FromStr for RowId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('|').collect();
        match parts.as_slice() {
            [source, asset, destination]
                if !source.is_empty() && !asset.is_empty() && !destination.is_empty() =>
            {
                Ok(RowId::new(source, asset, destination))
            }
            _ => Err(Error::InvalidRowId(s.to_string())),
        }
    }
}

impl From<RowId> for String {
    fn from(id: RowId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for RowId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
