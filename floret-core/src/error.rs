use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("prompt must not be empty")]
    EmptyPrompt,
    #[error("at most {max} adapters are allowed, got {0}", max = crate::MAX_ADAPTERS)]
    TooManyAdapters(usize),
}

/// Everything that can go wrong between submitting a prompt and holding the image bytes.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("inference service returned {status}: {body}")]
    Inference { status: u16, body: String },
    #[error("malformed inference result: {0}")]
    MalformedResult(String),
    #[error("image fetch returned status {0}")]
    FetchStatus(u16),
}

impl GenerationError {
    /// Short stable label, used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Network(_) => "network",
            GenerationError::Inference { .. } => "inference",
            GenerationError::MalformedResult(_) => "malformed_result",
            GenerationError::FetchStatus(_) => "fetch_status",
        }
    }
}

impl From<serde_json::Error> for GenerationError {
    fn from(err: serde_json::Error) -> Self {
        GenerationError::MalformedResult(err.to_string())
    }
}

/// The only failure callers of [`crate::ImageGenerator`] get to see.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("failed to generate image")]
pub struct GenerationFailed;
