use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcmineError {
    #[error("Invalid event at index {index} ({identifier}): {reason}")]
    Validation {
        index: usize,
        identifier: String,
        reason: String,
    },

    #[error("Invalid reference model: {0}")]
    InvalidReferenceModel(String),

    #[error("Invalid date range '{0}', expected YYYY-MM-DD/YYYY-MM-DD")]
    InvalidDateRange(String),

    #[error("Forecast unavailable for '{kpi_type}': {reason}")]
    ForecastUnavailable { kpi_type: String, reason: String },

    #[error("Analysis task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProcmineError>;
