use thiserror::Error;

/// Failures a `resolve` call can surface. The HTTP layer maps each variant
/// to a status code and a stable `code` string; none of them are retried
/// inside the pipeline.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Prompt was missing or empty after sanitization
    #[error("Invalid or empty prompt")]
    EmptyPrompt,

    /// LLM output failed schema validation; carries the validator's messages
    #[error("Invalid intent from LLM: {}", .0.join(", "))]
    InvalidIntent(Vec<String>),

    /// Intent names a dataset that is not in the catalog
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    /// LLM call failed, returned no content, or returned unparseable content
    #[error("LLM provider error: {0}")]
    Provider(String),
}

impl ResolveError {
    /// Stable machine-readable code for the HTTP error body
    pub fn code(&self) -> &'static str {
        match self {
            ResolveError::EmptyPrompt => "INVALID_REQUEST",
            // A dataset the LLM invented is the same failure class as an
            // otherwise invalid intent, so both map to a client error.
            ResolveError::InvalidIntent(_) | ResolveError::UnknownDataset(_) => "INVALID_INTENT",
            ResolveError::Provider(_) => "INTERNAL_ERROR",
        }
    }
}
