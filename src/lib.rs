//! Custodial Sweep Reconciler Library
//!
//! Reconciles vault inventory against a transfer plan, resolves USD prices
//! through a layered strategy chain, and classifies every remaining
//! transfer by execution readiness.

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod pipeline;
pub mod pricing;
pub mod report;

// Re-export commonly used types
pub use config::Config;
pub use eligibility::{classify, ClassifiedRow, MinRules, Reason};
pub use error::{Error, Result};
pub use inventory::{InventoryPosition, PlanRow, RowId};
pub use ledger::CompletedSet;
pub use pricing::{PriceMethod, PriceRecord, PriceResolver};
