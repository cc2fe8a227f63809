use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, error, info};

use crate::{
    GenerationError, GenerationFailed, GenerationRequest, ImageGenerator, ImagePayload,
    InferencePayload, InferenceResult,
};

pub const DEFAULT_MODEL: &str = "fal-ai/flux-lora";

/// Submits a payload to a hosted model and waits for the raw JSON result.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn submit_and_wait(
        &self,
        model: &str,
        payload: &InferencePayload,
    ) -> Result<serde_json::Value, GenerationError>;
}

/// Downloads a generated image.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, GenerationError>;
}

pub struct Pipeline<B, F> {
    backend: B,
    fetcher: F,
    model: String,
}

impl<B: InferenceBackend, F: ImageFetcher> Pipeline<B, F> {
    pub fn new(backend: B, fetcher: F, model: impl Into<String>) -> Self {
        Self {
            backend,
            fetcher,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Runs one generation end to end, keeping the failure kind.
    pub async fn run(&self, request: &GenerationRequest) -> Result<ImagePayload, GenerationError> {
        let payload = InferencePayload::from(request);
        info!(
            model = %self.model,
            adapters = payload.loras.len(),
            safety_checker = payload.enable_safety_checker,
            image_size = %payload.image_size,
            "submitting generation"
        );

        let raw = self.backend.submit_and_wait(&self.model, &payload).await?;
        let result = InferenceResult::from_value(raw)?;
        let url = result.image_url();
        debug!(url, "fetching generated image");

        let data = self.fetcher.fetch(url).await?;
        info!(bytes = data.len(), "image generated");
        Ok(ImagePayload::jpeg(data))
    }
}

#[async_trait]
impl<B: InferenceBackend, F: ImageFetcher> ImageGenerator for Pipeline<B, F> {
    async fn generate(&self, request: GenerationRequest) -> Result<ImagePayload, GenerationFailed> {
        self.run(&request).await.map_err(|e| {
            error!(kind = e.kind(), error = %e, "image generation failed");
            GenerationFailed
        })
    }
}
