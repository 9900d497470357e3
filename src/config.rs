use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::loader::InputPaths;
use crate::types::Period;

/// What to do when one supplier name maps to several Formule values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FormulaPolicy {
    /// Emit one enriched row per Formule value and log a warning.
    #[default]
    FanOut,
    /// Abort the run.
    Reject,
}

/// Tunables of the analysis itself. `Default` holds the business rules.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub vat_factor: f64,
    pub margin_share: f64,
    pub diff_15_factor: f64,
    pub diff_25_factor: f64,
    /// Period the supplier overview and the order sheets are limited to.
    pub focus_period: Period,
    pub parallel_fuzzy: bool,
    pub formula_policy: FormulaPolicy,
    pub not_applicable: String,
    pub overview_comment: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            vat_factor: 1.21,
            margin_share: 0.10,
            diff_15_factor: 0.85,
            diff_25_factor: 0.75,
            focus_period: Period::FromApril2025,
            parallel_fuzzy: true,
            formula_policy: FormulaPolicy::FanOut,
            not_applicable: "N.v.t.".to_string(),
            overview_comment: "Om appels met appels te vergelijken wordt de marge voor 2-4-2025 \
                               ook berekend met 10% van de verkoopprijs"
                .to_string(),
        }
    }
}

/// Command line of the `marge-analyse` binary. Every flag can also come
/// from the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "marge-analyse", version, about = "FiscFree / Hellorider margin analysis")]
pub struct CliArgs {
    /// FiscFree order export (.xlsx or .csv)
    #[arg(long, env = "MARGE_ORDERS", default_value = "data/fiscfree.xlsx")]
    pub orders: PathBuf,

    /// Hellorider catalog export
    #[arg(long, env = "MARGE_CATALOG", default_value = "data/hellorider.xlsx")]
    pub catalog: PathBuf,

    /// Dealer overview holding the Formule per e-mail address
    #[arg(long, env = "MARGE_DEALERS", default_value = "data/dealers.xlsx")]
    pub dealers: PathBuf,

    /// Supplier name / e-mail mapping
    #[arg(long = "email-map", env = "MARGE_EMAIL_MAP", default_value = "data/mail_fiscfree.xlsx")]
    pub email_map: PathBuf,

    /// Junk rows above the dealer overview header
    #[arg(long, env = "MARGE_DEALER_SKIP_ROWS", default_value_t = 6)]
    pub dealer_skip_rows: usize,

    /// Output workbook
    #[arg(long, env = "MARGE_OUT", default_value = "FiscFree_misgelopen_marge_analyse.xlsx")]
    pub out: PathBuf,

    /// Also write every sheet as CSV into this directory
    #[arg(long = "csv-dir", env = "MARGE_CSV_DIR")]
    pub csv_dir: Option<PathBuf>,

    /// Run the fuzzy match on a single thread
    #[arg(long, env = "MARGE_SEQUENTIAL")]
    pub sequential: bool,

    /// Give up when the fuzzy match takes longer than this
    #[arg(long = "timeout-secs", env = "MARGE_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    #[arg(long = "formula-policy", env = "MARGE_FORMULA_POLICY", value_enum, default_value_t = FormulaPolicy::FanOut)]
    pub formula_policy: FormulaPolicy,

    /// Load, analyse and write once without the interactive menu
    #[arg(long)]
    pub batch: bool,
}

impl CliArgs {
    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            parallel_fuzzy: !self.sequential,
            formula_policy: self.formula_policy,
            ..AnalysisConfig::default()
        }
    }

    pub fn input_paths(&self) -> InputPaths {
        InputPaths {
            orders: self.orders.clone(),
            catalog: self.catalog.clone(),
            dealers: self.dealers.clone(),
            email_map: self.email_map.clone(),
            dealer_skip_rows: self.dealer_skip_rows,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
