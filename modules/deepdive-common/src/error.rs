use thiserror::Error;
use uuid::Uuid;

/// Failure reported by one of the external providers (search, fetch, completion).
///
/// Never fatal to a run: every call site has an explicit fallback branch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider transport error: {0}")]
    Transport(String),

    #[error("Malformed provider output: {0}")]
    Malformed(String),
}

/// Errors that abort a deep dive run and are recorded on the lead by the job.
#[derive(Error, Debug)]
pub enum DeepDiveError {
    #[error("Lead not found: {0}")]
    LeadNotFound(Uuid),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl DeepDiveError {
    /// Short machine-friendly label used as the prefix of persisted error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            DeepDiveError::LeadNotFound(_) => "LeadNotFound",
            DeepDiveError::Storage(_) => "StorageError",
            DeepDiveError::Config(_) => "ConfigError",
            DeepDiveError::Anyhow(_) => "RuntimeError",
        }
    }
}
