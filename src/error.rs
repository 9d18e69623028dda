//! Engine error taxonomy.
//!
//! Distinguishes three propagation classes: engine errors (this enum)
//! abort the whole case, step errors are recorded on `StepResult` and
//! end that step only, and assertion failures are recorded on
//! `AssertionResult` and never unwind at all. Only the first class is
//! represented here as a Rust error type; the other two are plain
//! data.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("case failed structural validation: {0}")]
    YamlValidation(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse CSV: {0}")]
    CsvParse(#[from] csv::Error),

    #[error("CSV file not found: {0}")]
    CsvFileNotFound(String),

    #[error("internal engine error: {0}")]
    Internal(String),

    #[error("step timed out after {0}ms")]
    Timeout(u64),

    #[error("request timed out")]
    RequestTimeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("TLS error: {0}")]
    Ssl(String),

    #[error("database connection error: {0}")]
    DbConnection(String),

    #[error("database query error: {0}")]
    DbQuery(String),

    #[error("data source not found: {0}")]
    DbDatasourceNotFound(String),

    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    #[error("extraction failed: {0}")]
    ExtractFailed(String),

    #[error("keyword not found: {0}")]
    KeywordNotFound(String),

    #[error("keyword execution error: {0}")]
    KeywordExecution(String),

    #[error("variable not found: {0}")]
    VariableNotFound(String),

    #[error("variable render error: {0}")]
    VariableRender(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl EngineError {
    /// The machine-readable taxonomy code, used in `ErrorInfo.code`
    /// and to match `RetryPolicy.retry_on`/`stop_on` entries.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::YamlParse(_) => "YAML_PARSE_ERROR",
            EngineError::YamlValidation(_) => "YAML_VALIDATION_ERROR",
            EngineError::FileNotFound(_) => "FILE_NOT_FOUND",
            EngineError::CsvParse(_) => "CSV_PARSE_ERROR",
            EngineError::CsvFileNotFound(_) => "CSV_FILE_NOT_FOUND",
            EngineError::Internal(_) => "ENGINE_INTERNAL_ERROR",
            EngineError::Timeout(_) => "TIMEOUT_ERROR",
            EngineError::RequestTimeout => "REQUEST_TIMEOUT",
            EngineError::Connection(_) => "CONNECTION_ERROR",
            EngineError::Ssl(_) => "SSL_ERROR",
            EngineError::DbConnection(_) => "DB_CONNECTION_ERROR",
            EngineError::DbQuery(_) => "DB_QUERY_ERROR",
            EngineError::DbDatasourceNotFound(_) => "DB_DATASOURCE_NOT_FOUND",
            EngineError::AssertionFailed(_) => "ASSERTION_FAILED",
            EngineError::ExtractFailed(_) => "EXTRACT_FAILED",
            EngineError::KeywordNotFound(_) => "KEYWORD_NOT_FOUND",
            EngineError::KeywordExecution(_) => "KEYWORD_EXECUTION_ERROR",
            EngineError::VariableNotFound(_) => "VARIABLE_NOT_FOUND",
            EngineError::VariableRender(_) => "VARIABLE_RENDER_ERROR",
            EngineError::Unsupported(_) => "UNSUPPORTED",
        }
    }

    /// Whether this error kind is retryable by default (used when a
    /// `RetryPolicy.retry_on` list is empty, meaning "all").
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::RequestTimeout
                | EngineError::Connection(_)
                | EngineError::Timeout(_)
                | EngineError::DbConnection(_)
        )
    }
}

pub fn map_reqwest_error(err: &reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::RequestTimeout
    } else if err.is_connect() {
        EngineError::Connection(err.to_string())
    } else {
        EngineError::Connection(err.to_string())
    }
}
