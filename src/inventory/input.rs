//! CSV readers for inventory snapshots and transfer plans
//!
//! Column names are resolved by first match against per-field alias lists,
//! so exports from different tools load without manual renaming. String
//! booleans are normalized here, once; nothing downstream re-parses them.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::inventory::types::{InventoryPosition, PlanRow};

const VAULT_ALIASES: &[&str] = &["vaultId", "vaultAccountId", "vault_id", "vault_account_id", "vault"];
const ASSET_ALIASES: &[&str] = &["assetId", "asset_id", "asset", "symbol"];
const AVAILABLE_ALIASES: &[&str] = &["available", "availableAmount", "available_amount", "availableBalance"];
const TOTAL_ALIASES: &[&str] = &["total", "totalAmount", "total_amount", "balance"];

const SOURCE_ALIASES: &[&str] = &["sourceVaultId", "source_vault_id", "fromVaultId", "from_vault_id", "vaultId"];
const AMOUNT_ALIASES: &[&str] = &["amount", "qty", "quantity"];
const DESTINATION_ALIASES: &[&str] = &["destinationVaultId", "destination_vault_id", "toVaultId", "to_vault_id"];
const REQUIRES_GAS_ALIASES: &[&str] = &["requiresGas", "requires_gas", "needsGas", "needs_gas"];
const GAS_ASSET_ALIASES: &[&str] = &["gasAssetId", "gas_asset_id", "gasAsset"];
const GAS_READY_ALIASES: &[&str] = &["gasReady", "gas_ready"];

/// Header positions for one CSV source
struct Columns {
    source_name: String,
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(source_name: &str, headers: &csv::StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
            .collect();
        Self {
            source_name: source_name.to_string(),
            index,
        }
    }

    /// First alias present in the header wins
    fn find(&self, aliases: &[&str]) -> Option<usize> {
        aliases
            .iter()
            .find_map(|alias| self.index.get(&alias.to_ascii_lowercase()).copied())
    }

    fn require(&self, aliases: &[&str]) -> Result<usize> {
        self.find(aliases).ok_or_else(|| Error::MissingColumn {
            source_name: self.source_name.clone(),
            column: aliases[0].to_string(),
            accepted: aliases.join(", "),
        })
    }
}

/// Lenient numeric parse: blanks and garbage become zero
pub fn parse_amount(raw: &str) -> f64 {
    raw.trim()
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Tabular boolean convention: only a case-insensitive "true" is true
pub fn parse_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

fn field(record: &csv::StringRecord, idx: usize) -> &str {
    record.get(idx).map(str::trim).unwrap_or("")
}

fn open(path: &Path) -> Result<std::fs::File> {
    if !path.exists() {
        return Err(Error::MissingFile(path.display().to_string()));
    }
    Ok(std::fs::File::open(path)?)
}

fn reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input)
}

/// Parse an inventory snapshot, dropping empty positions
pub fn parse_inventory<R: Read>(input: R, source_name: &str) -> Result<Vec<InventoryPosition>> {
    let mut rdr = reader(input);
    let cols = Columns::new(source_name, rdr.headers()?);

    let vault = cols.require(VAULT_ALIASES)?;
    let asset = cols.require(ASSET_ALIASES)?;
    let available = cols.require(AVAILABLE_ALIASES)?;
    let total = cols.require(TOTAL_ALIASES)?;

    let mut positions = Vec::new();
    let mut dropped = 0usize;
    for record in rdr.records() {
        let record = record?;
        let position = InventoryPosition {
            vault_id: field(&record, vault).to_string(),
            asset_id: field(&record, asset).to_string(),
            available: parse_amount(field(&record, available)),
            total: parse_amount(field(&record, total)),
        };
        if position.vault_id.is_empty() || position.asset_id.is_empty() || !position.is_retained() {
            dropped += 1;
            continue;
        }
        positions.push(position);
    }

    debug!(source = source_name, kept = positions.len(), dropped, "Parsed inventory");
    Ok(positions)
}

/// Parse a transfer plan
pub fn parse_plan<R: Read>(input: R, source_name: &str) -> Result<Vec<PlanRow>> {
    let mut rdr = reader(input);
    let cols = Columns::new(source_name, rdr.headers()?);

    let source = cols.require(SOURCE_ALIASES)?;
    let asset = cols.require(ASSET_ALIASES)?;
    let amount = cols.require(AMOUNT_ALIASES)?;
    let destination = cols.require(DESTINATION_ALIASES)?;
    // Gas columns are optional; plans without them never block on gas
    let requires_gas = cols.find(REQUIRES_GAS_ALIASES);
    let gas_asset = cols.find(GAS_ASSET_ALIASES);
    let gas_ready = cols.find(GAS_READY_ALIASES);

    let mut rows = Vec::new();
    let mut incomplete = 0usize;
    for record in rdr.records() {
        let record = record?;
        let source_vault_id = field(&record, source).to_string();
        let asset_id = field(&record, asset).to_string();
        let destination_vault_id = field(&record, destination).to_string();
        if source_vault_id.is_empty() || asset_id.is_empty() || destination_vault_id.is_empty() {
            incomplete += 1;
            continue;
        }
        rows.push(PlanRow {
            source_vault_id,
            asset_id,
            amount: parse_amount(field(&record, amount)),
            destination_vault_id,
            requires_gas: requires_gas.map(|i| parse_flag(field(&record, i))).unwrap_or(false),
            gas_asset_id: gas_asset.map(|i| field(&record, i).to_string()).unwrap_or_default(),
            gas_ready: gas_ready.map(|i| parse_flag(field(&record, i))).unwrap_or(false),
        });
    }

    if incomplete > 0 {
        warn!(
            source = source_name,
            skipped = incomplete,
            "Skipping plan rows without source, asset or destination"
        );
    }
    debug!(source = source_name, rows = rows.len(), "Parsed plan");
    Ok(rows)
}

/// Load an inventory snapshot from disk
pub fn read_inventory<P: AsRef<Path>>(path: P) -> Result<Vec<InventoryPosition>> {
    let path = path.as_ref();
    let positions = parse_inventory(open(path)?, &path.display().to_string())?;
    info!("Loaded {} inventory positions from {}", positions.len(), path.display());
    Ok(positions)
}

/// Load a transfer plan from disk
pub fn read_plan<P: AsRef<Path>>(path: P) -> Result<Vec<PlanRow>> {
    let path = path.as_ref();
    let rows = parse_plan(open(path)?, &path.display().to_string())?;
    info!("Loaded {} plan rows from {}", rows.len(), path.display());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_lenient() {
        assert_eq!(parse_amount("12.5"), 12.5);
        assert_eq!(parse_amount(" 1,000.25 "), 1000.25);
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_amount("n/a"), 0.0);
        assert_eq!(parse_amount("NaN"), 0.0);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" TRUE "));
        assert!(!parse_flag("yes"));
        assert!(!parse_flag("1"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_inventory_aliases_and_retention() {
        let csv = "vaultAccountId,assetId,availableAmount,totalAmount\n\
                   1,USDC,100,100\n\
                   2,ETH,0,0\n\
                   3,BTC,0,0.25\n";
        let positions = parse_inventory(csv.as_bytes(), "inventory.csv").unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].vault_id, "1");
        assert_eq!(positions[1].asset_id, "BTC");
        assert_eq!(positions[1].total, 0.25);
    }

    #[test]
    fn test_inventory_missing_column() {
        let csv = "vaultId,assetId,available\n1,USDC,5\n";
        let err = parse_inventory(csv.as_bytes(), "inventory.csv").unwrap_err();
        match err {
            Error::MissingColumn { column, source_name, .. } => {
                assert_eq!(column, "total");
                assert_eq!(source_name, "inventory.csv");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_plan_flags_normalized() {
        let csv = "sourceVaultId,assetId,amount,destinationVaultId,requiresGas,gasAssetId,gasReady\n\
                   1,USDC,50,2,True,ETH,false\n\
                   1,ETH,abc,2,false,,\n";
        let rows = parse_plan(csv.as_bytes(), "plan.csv").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].requires_gas);
        assert!(!rows[0].gas_ready);
        assert_eq!(rows[0].gas_asset_id, "ETH");
        assert_eq!(rows[1].amount, 0.0);
        assert!(!rows[1].requires_gas);
    }

    #[test]
    fn test_plan_without_gas_columns() {
        let csv = "from_vault_id,asset,qty,to_vault_id\n4,SOL,1.5,9\n";
        let rows = parse_plan(csv.as_bytes(), "plan.csv").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row_id().to_string(), "4|SOL|9");
        assert!(!rows[0].is_gas_blocked());
    }

    #[test]
    fn test_plan_rows_without_ids_are_skipped() {
        let csv = "sourceVaultId,assetId,amount,destinationVaultId\n\
                   1,USDC,5,2\n\
                   ,USDC,5,2\n\
                   1,,5,2\n\
                   1,ETH,1,\n";
        let rows = parse_plan(csv.as_bytes(), "plan.csv").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row_id().to_string(), "1|USDC|2");
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_plan("/nonexistent/plan.csv").unwrap_err();
        assert!(matches!(err, Error::MissingFile(_)));
        assert!(err.is_fatal());
    }
}
