//! CLI command implementations

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::Config;
use crate::inventory::RowId;
use crate::ledger::{CompletedSet, LedgerWriter};
use crate::pipeline::{self, RunInputs};
use crate::report;

/// Full reconciliation: price, classify, aggregate, write reports
pub async fn analyze(config: &Config, out: Option<String>) -> Result<()> {
    if config.pricing.offline {
        warn!("Running OFFLINE - prices come from overrides, stable fallback and cache only");
    }

    // Fatal input problems surface here, before any output is written
    let inputs = RunInputs::load(&config.inputs).context("Failed to load run inputs")?;
    info!(
        "Inputs: {} inventory positions, {} plan rows, {} completed row ids",
        inputs.inventory.len(),
        inputs.plan.len(),
        inputs.completed.len()
    );

    let mut resolver = pipeline::build_resolver(config)?;
    let rules = pipeline::min_rules(config);
    let run = pipeline::run(&inputs, &mut resolver, &rules, config.report.materiality_usd).await?;

    let dir = PathBuf::from(out.unwrap_or_else(|| config.report.output_dir.clone()));
    let written = report::write_reports(&dir, &run, &config.report)?;
    for path in &written {
        info!("  {}", path.display());
    }

    println!("{}", report::render_summary(&run));
    Ok(())
}

/// Resolve and print prices for every asset in the inputs
pub async fn prices(config: &Config) -> Result<()> {
    let inputs = RunInputs::load(&config.inputs).context("Failed to load run inputs")?;
    let mut resolver = pipeline::build_resolver(config)?;
    let book = resolver.resolve_all(inputs.asset_ids()).await?;

    println!("{}", report::render_prices(&book));
    for (method, count) in book.method_counts() {
        println!("  {:<16} {}", method.to_string(), count);
    }
    Ok(())
}

/// Completed vs remaining counts without pricing anything
pub fn ledger_status(config: &Config) -> Result<()> {
    let status = pipeline::ledger_status(&config.inputs).context("Failed to read plan and ledgers")?;

    println!("Ledger directory: {}", config.inputs.ledger_dir);
    println!("Completed row ids: {}", status.completed_ids);
    println!("Plan rows: {}", status.plan_rows);
    println!("  completed: {}", status.completed_in_plan);
    println!("  remaining: {}", status.remaining());
    Ok(())
}

/// Append row ids to today's ledger file
pub fn mark_complete(config: &Config, ids: &[String], dry_run: bool) -> Result<()> {
    let ids: Vec<RowId> = ids
        .iter()
        .map(|s| s.parse::<RowId>())
        .collect::<std::result::Result<_, _>>()?;

    let mut completed = CompletedSet::load(&config.inputs.ledger_dir, &config.inputs.ledger_pattern)?;
    let fresh: Vec<&RowId> = ids.iter().filter(|id| !completed.contains(id)).collect();
    if fresh.is_empty() {
        println!("All {} row id(s) are already recorded as completed", ids.len());
        return Ok(());
    }

    if dry_run {
        println!("[DRY RUN] Would record {} row id(s):", fresh.len());
        for id in fresh {
            println!("  {}", id);
        }
        return Ok(());
    }

    let writer = LedgerWriter::new(&config.inputs.ledger_dir)?;
    let appended = writer.append(&mut completed, &ids)?;
    println!("Recorded {} row id(s) as completed", appended);
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}
