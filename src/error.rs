use thiserror::Error;

/// Everything that can stop an analysis run.
///
/// Value-level problems (an unparseable date, a missing price) never end up
/// here; they are recovered to missing values by the loader and the stages.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("lookup table has duplicate key '{key}' after deduplication")]
    DuplicateLookupKey { key: String },

    #[error("supplier '{name}' maps to {count} Formule values")]
    AmbiguousFormula { name: String, count: usize },

    #[error("analysis cancelled after {processed} of {total} fuzzy rows")]
    Cancelled { processed: usize, total: usize },

    #[error("table '{table}': missing column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("unsupported input format: {path}")]
    UnsupportedFormat { path: String },

    #[error("table '{table}' has no header row")]
    EmptyTable { table: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excel read error: {0}")]
    Xlsx(#[from] calamine::Error),

    #[error("Excel write error: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
