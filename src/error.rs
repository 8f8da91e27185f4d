use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record found (ID collision): {0}")]
    Collision(String),

    #[error("Failed to fetch CSV: HTTP {status}")]
    FetchFailed { status: u16 },

    #[error("Failed to reach data source: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("No valid data found in CSV. Please check the format.")]
    NoValidData,

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "perfdash::validation", %message, "validation error");
        AppError::Validation(message)
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        let id = id.into();
        warn!(target: "perfdash::store", %id, "record not found");
        AppError::NotFound(id)
    }

    pub fn collision(id: impl Into<String>) -> Self {
        let id = id.into();
        error!(target: "perfdash::store", %id, "duplicate record id");
        AppError::Collision(id)
    }

    pub fn fetch_failed(status: u16) -> Self {
        warn!(target: "perfdash::ingest", status, "remote CSV fetch failed");
        AppError::FetchFailed { status }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_)
                | AppError::Collision(_)
                | AppError::NoValidData
                | AppError::Csv(_)
        )
    }
}
