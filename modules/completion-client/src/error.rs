use thiserror::Error;

pub type Result<T> = std::result::Result<T, CompletionError>;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("No structured output in response")]
    Empty,

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CompletionError::Decode(err.to_string())
        } else {
            CompletionError::Network(err.to_string())
        }
    }
}
