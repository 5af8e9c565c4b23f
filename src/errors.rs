use crate::services::budget::BudgetError;
use crate::services::gpx::GpxError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Bad feed response: {0}")]
    BadFeedResponse(String),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("GPX parsing error: {0}")]
    Gpx(#[from] GpxError),

    #[error("Route budget error: {0}")]
    Budget(#[from] BudgetError),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => {
                AppError::ExternalServiceError(format!("HTTP {}: {}", status.as_u16(), err))
            }
            None => AppError::ExternalServiceError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpx_error_converts() {
        let err: AppError = GpxError::MissingAttribute {
            element: "trkpt".to_string(),
            attribute: "lat".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Gpx(_)));
        assert!(err.to_string().contains("lat"));
    }

    #[test]
    fn test_budget_error_converts() {
        let err: AppError = BudgetError::Exhausted {
            tokens: 120,
            max_tokens: 10,
        }
        .into();
        assert!(err.to_string().contains("120"));
    }
}
