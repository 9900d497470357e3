//! Missed-margin analysis of FiscFree lease-bike orders against the
//! Hellorider catalog.
//!
//! Orders are matched to catalog prices by article number, with a fuzzy
//! brand/type fallback, then scored per order, aggregated per period and per
//! supplier, tagged with the supplier's Formule and written as a six-sheet
//! workbook.

pub mod aggregate;
pub mod config;
pub mod control;
pub mod error;
pub mod formula;
pub mod loader;
pub mod lookup;
pub mod matcher;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod reports;
pub mod types;
pub mod util;

pub use config::{AnalysisConfig, CliArgs, FormulaPolicy};
pub use control::{CancelToken, Progress, RunControl};
pub use error::{AnalysisError, Result};
pub use pipeline::run;
pub use types::{AnalysisInput, AnalysisReport, RunStats};
