pub mod error;
pub mod fal;
pub mod fetch;
pub mod payload;
pub mod pipeline;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use error::*;
pub use fal::FalQueueClient;
pub use fetch::HttpImageFetcher;
pub use payload::*;
pub use pipeline::*;

/// Maximum number of style adapters a single request may carry.
pub const MAX_ADAPTERS: usize = 3;

/// MIME type of every image the pipeline hands back.
pub const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// A LoRA style adapter: where to load it from and how strongly to apply it.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct AdapterSpec {
    pub path: String,
    pub scale: f64,
}

impl AdapterSpec {
    pub fn new(path: impl Into<String>, scale: f64) -> Self {
        Self {
            path: path.into(),
            scale,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
    adapters: Vec<AdapterSpec>,
    enable_safety_checker: bool,
}

impl GenerationRequest {
    pub fn new(
        prompt: impl Into<String>,
        adapters: Vec<AdapterSpec>,
        enable_safety_checker: bool,
    ) -> Result<Self, RequestError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(RequestError::EmptyPrompt);
        }
        if adapters.len() > MAX_ADAPTERS {
            return Err(RequestError::TooManyAdapters(adapters.len()));
        }
        Ok(Self {
            prompt,
            adapters,
            enable_safety_checker,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn adapters(&self) -> &[AdapterSpec] {
        &self.adapters
    }

    pub fn enable_safety_checker(&self) -> bool {
        self.enable_safety_checker
    }
}

/// Raw image bytes ready to be sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub data: Bytes,
    pub content_type: &'static str,
}

impl ImagePayload {
    pub fn jpeg(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            content_type: IMAGE_CONTENT_TYPE,
        }
    }
}

/// Anything that can turn a [`GenerationRequest`] into an image.
///
/// Failures are deliberately opaque here: implementors log the cause and
/// return [`GenerationFailed`].
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<ImagePayload, GenerationFailed>;
}
