//! Error types for the sweep reconciler

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sweep reconciler
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Required input file not found: {0}")]
    MissingFile(String),

    #[error("Missing required column '{column}' in {source_name} (accepted: {accepted})")]
    MissingColumn {
        source_name: String,
        column: String,
        accepted: String,
    },

    #[error("Ledger directory not found: {0}")]
    LedgerDirMissing(String),

    #[error("Invalid row id '{0}': expected source|asset|destination")]
    InvalidRowId(String),

    // Pricing errors
    #[error("Price feed request failed: {0}")]
    PriceFeed(String),

    #[error("Invalid price for {asset}: {price}")]
    InvalidPrice { asset: String, price: f64 },

    #[error("Price cache persistence failed: {0}")]
    PriceCache(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("CSV error: {0}")]
    Csv(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Fatal errors abort the run before any output is written
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::MissingFile(_)
                | Error::MissingColumn { .. }
                | Error::LedgerDirMissing(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Csv(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::PriceFeed(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
