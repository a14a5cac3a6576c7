use crate::compliance::Rejection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown IANA timezone '{0}'")]
    InvalidTimezone(String),

    #[error("Completion rejected: {0}")]
    CompletionRejected(Rejection),

    #[error("Transaction rolled back: {source}")]
    TransactionFailed {
        #[source]
        source: Box<ScheduleError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScheduleError {
    pub fn not_found(entity: &'static str, id: &str) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    /// Errors that describe the request rather than the infrastructure.
    /// These pass through a rolled-back transaction unchanged.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::InvalidState(_)
                | Self::Validation(_)
                | Self::InvalidTimezone(_)
                | Self::CompletionRejected(_)
        )
    }

    /// Stable machine-readable kind, used by the runner's JSON responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Database(_)           => "database",
            Self::Serialization(_)      => "serialization",
            Self::NotFound { .. }       => "not_found",
            Self::InvalidState(_)       => "invalid_state",
            Self::Validation(_)         => "validation",
            Self::InvalidTimezone(_)    => "validation",
            Self::CompletionRejected(_) => "rejected",
            Self::TransactionFailed { .. } => "transaction_failure",
            Self::Other(_)              => "internal",
        }
    }
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
