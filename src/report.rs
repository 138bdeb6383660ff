//! Report emitter
//!
//! Writes run output as CSV, JSONL and JSON files, and renders a short
//! console summary. Nothing here feeds back into classification.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::aggregate::GroupSummary;
use crate::config::ReportConfig;
use crate::eligibility::ClassifiedRow;
use crate::error::Result;
use crate::pipeline::RunReport;
use crate::pricing::PriceBook;

/// Flat CSV shape of a classified row
#[derive(Debug, Serialize)]
struct ClassifiedRecord<'a> {
    row_id: &'a str,
    source_vault_id: &'a str,
    asset_id: &'a str,
    amount: f64,
    destination_vault_id: &'a str,
    requires_gas: bool,
    gas_asset_id: &'a str,
    gas_ready: bool,
    price_usd: Option<f64>,
    price_method: String,
    estimated_usd: Option<f64>,
    reason: &'static str,
    min_amount: Option<f64>,
    min_basis: String,
    source_available: Option<f64>,
}

impl<'a> From<&'a ClassifiedRow> for ClassifiedRecord<'a> {
    fn from(r: &'a ClassifiedRow) -> Self {
        Self {
            row_id: &r.row_id,
            source_vault_id: &r.row.source_vault_id,
            asset_id: &r.row.asset_id,
            amount: r.row.amount,
            destination_vault_id: &r.row.destination_vault_id,
            requires_gas: r.row.requires_gas,
            gas_asset_id: &r.row.gas_asset_id,
            gas_ready: r.row.gas_ready,
            price_usd: r.price_usd,
            price_method: r.price_method.to_string(),
            estimated_usd: r.estimated_usd,
            reason: r.reason.as_str(),
            min_amount: r.min_amount,
            min_basis: r.min_basis.to_string(),
            source_available: r.source_available,
        }
    }
}

#[derive(Debug, Serialize)]
struct PriceRow<'a> {
    asset_id: &'a str,
    usd: Option<f64>,
    method: String,
    reference: &'a str,
}

fn write_csv<T: Serialize, I: IntoIterator<Item = T>>(path: &Path, records: I) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_classified_csv(path: &Path, rows: &[ClassifiedRow]) -> Result<()> {
    write_csv(path, rows.iter().map(ClassifiedRecord::from))
}

pub fn write_summary_csv(path: &Path, groups: &[GroupSummary]) -> Result<()> {
    write_csv(path, groups)
}

pub fn write_prices_csv(path: &Path, prices: &PriceBook) -> Result<()> {
    write_csv(
        path,
        prices.records().map(|p| PriceRow {
            asset_id: &p.asset_id,
            usd: p.usd,
            method: p.method.to_string(),
            reference: &p.reference,
        }),
    )
}

/// One JSON object per line
pub fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for item in items {
        serde_json::to_writer(&mut out, item)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// Write every configured report into `dir`; returns the paths written
pub fn write_reports(dir: &Path, report: &RunReport, config: &ReportConfig) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    if config.write_csv {
        let path = dir.join("classified.csv");
        write_classified_csv(&path, &report.classification.rows)?;
        written.push(path);

        let path = dir.join("by_asset.csv");
        write_summary_csv(&path, &report.by_asset)?;
        written.push(path);

        let path = dir.join("by_reason.csv");
        write_summary_csv(&path, &report.by_reason)?;
        written.push(path);

        let path = dir.join("vault_materiality.csv");
        write_csv(&path, &report.vaults)?;
        written.push(path);

        let path = dir.join("prices.csv");
        write_prices_csv(&path, &report.prices)?;
        written.push(path);
    }

    if config.write_jsonl {
        let path = dir.join("classified.jsonl");
        write_jsonl(&path, &report.classification.rows)?;
        written.push(path);
    }

    let path = dir.join("summary.json");
    std::fs::write(&path, serde_json::to_string_pretty(&report.totals)?)?;
    written.push(path);

    info!("Wrote {} report file(s) to {}", written.len(), dir.display());
    Ok(written)
}

fn fmt_usd(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("${:.2}", v),
        None => "-".to_string(),
    }
}

/// Console summary of a run
pub fn render_summary(report: &RunReport) -> String {
    let t = &report.totals;
    let mut out = String::new();
    out.push_str(&format!(
        "Plan rows: {}  completed: {}  remaining: {}\n",
        t.plan_rows, t.completed_rows, t.remaining_rows
    ));
    out.push_str(&format!(
        "Known USD: ${:.2}  ready USD: ${:.2}  unpriced rows: {}\n\n",
        t.usd_known_total, t.usd_ready_total, t.unknown_price_rows
    ));

    out.push_str(&format!(
        "{:<18} {:>6} {:>8} {:>14} {:>8}\n",
        "REASON", "ROWS", "WALLETS", "USD", "UNKNOWN"
    ));
    for g in &report.by_reason {
        out.push_str(&format!(
            "{:<18} {:>6} {:>8} {:>14.2} {:>8}\n",
            g.key, g.rows, g.wallets, g.usd_known_sum, g.unknown_count
        ));
    }

    out.push_str(&format!(
        "\n{:<18} {:>6} {:>14} {:>12} {:>12} {:>12}\n",
        "ASSET", "ROWS", "USD", "MEDIAN", "P90", "MAX"
    ));
    for g in report.by_asset.iter().take(20) {
        out.push_str(&format!(
            "{:<18} {:>6} {:>14.2} {:>12} {:>12} {:>12}\n",
            g.key,
            g.rows,
            g.usd_known_sum,
            fmt_usd(g.usd_median),
            fmt_usd(g.usd_p90),
            fmt_usd(g.usd_max)
        ));
    }
    if report.by_asset.len() > 20 {
        out.push_str(&format!("... {} more assets\n", report.by_asset.len() - 20));
    }

    out.push_str("\nPrice methods:");
    for (method, count) in &t.price_methods {
        out.push_str(&format!(" {}={}", method, count));
    }
    out.push('\n');
    out
}

/// Console table of resolved prices
pub fn render_prices(prices: &PriceBook) -> String {
    let mut out = format!("{:<20} {:>16} {:<16} {}\n", "ASSET", "USD", "METHOD", "REFERENCE");
    for p in prices.records() {
        let usd = p
            .usd
            .map(|v| format!("{:.6}", v))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<20} {:>16} {:<16} {}\n",
            p.asset_id,
            usd,
            p.method.to_string(),
            p.reference
        ));
    }
    out
}
