use async_trait::async_trait;

pub mod openrouter;

pub use openrouter::OpenRouterClient;

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl CompletionError {
    /// Whether a later identical request could plausibly succeed.
    /// Only used for logging; failed requests are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Http(e) => e.is_timeout() || e.is_connect(),
            CompletionError::Api { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            CompletionError::InvalidResponse(_) => false,
        }
    }
}

/// Answers a question using a document's text as context.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, question: &str, context: &str) -> Result<String, CompletionError>;
}
