//! Error types for record parsing and WDL fitting

/// レコード解析・キャリブレーション計算のエラー
#[derive(thiserror::Error, Debug)]
pub enum WdlError {
    /// Wrong number of `;`-separated fields
    #[error("expected {expected} fields, got {actual}: {line:?}")]
    FieldCount {
        expected: usize,
        actual: usize,
        line: String,
    },

    /// A field could not be parsed
    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    /// Outcome outside {-1, 0, 1}
    #[error("outcome must be -1, 0 or 1, got {0}")]
    InvalidOutcome(i32),

    /// Least-squares system has no unique solution
    #[error("least-squares fit is singular: {0}")]
    Singular(String),

    /// The shifted win polynomial has only complex roots
    #[error("shifted win-rate polynomial has no real root")]
    NoRealRoot,

    /// File I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for WDL operations
pub type WdlResult<T> = Result<T, WdlError>;
