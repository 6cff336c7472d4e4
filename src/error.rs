use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Invalid scenario rate {value}: must be between {min} and {max}")]
    InvalidScenarioRate { value: f64, min: f64, max: f64 },

    #[error("Invalid report template: {0}")]
    InvalidTemplate(String),

    #[error("Statement shape error: {0}")]
    StatementShape(String),

    #[error("Text encoding error: {0}")]
    Encoding(String),

    #[error("Narrative store error: {0}")]
    StoreError(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DashboardError>;
