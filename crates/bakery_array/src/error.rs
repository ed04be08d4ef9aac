use bakery_core::contract::ValidationError;
use thiserror::Error;

/// Failure taxonomy for batch combine-and-write.
///
/// Nothing in this crate catches or retries these; they propagate to the
/// orchestrator unchanged.
#[derive(Debug, Error)]
pub enum BakeryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("source unavailable: {url}: {reason}")]
    SourceUnavailable { url: String, reason: String },

    #[error("dataset conflict: {0}")]
    DatasetConflict(String),

    #[error("storage access failed for '{locator}': {reason}")]
    StorageAccess { locator: String, reason: String },
}

impl BakeryError {
    pub fn source_unavailable(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn storage_access(locator: impl Into<String>, reason: impl ToString) -> Self {
        Self::StorageAccess {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::DatasetConflict(message.into())
    }

    /// Stable snake_case code used in outcome records and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::DatasetConflict(_) => "dataset_conflict",
            Self::StorageAccess { .. } => "storage_access",
        }
    }
}

impl From<ValidationError> for BakeryError {
    fn from(error: ValidationError) -> Self {
        Self::InvalidArgument(error.message().to_string())
    }
}

pub type Result<T, E = BakeryError> = std::result::Result<T, E>;
