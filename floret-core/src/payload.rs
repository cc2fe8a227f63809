use serde::{Deserialize, Serialize};

use crate::{AdapterSpec, GenerationError, GenerationRequest};

pub const NUM_INFERENCE_STEPS: u32 = 28;
pub const GUIDANCE_SCALE: f64 = 3.5;
pub const NUM_IMAGES: u32 = 1;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSize {
    #[serde(rename = "landscape_4_3")]
    Landscape4x3,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
}

serde_plain::derive_display_from_serialize!(ImageSize);
serde_plain::derive_display_from_serialize!(OutputFormat);

/// JSON body submitted to the inference endpoint.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct InferencePayload {
    pub prompt: String,
    pub image_size: ImageSize,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
    pub num_images: u32,
    pub enable_safety_checker: bool,
    pub output_format: OutputFormat,
    // The service treats an empty list differently from no list at all.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub loras: Vec<AdapterSpec>,
}

impl From<&GenerationRequest> for InferencePayload {
    fn from(request: &GenerationRequest) -> Self {
        Self {
            prompt: request.prompt().to_string(),
            image_size: ImageSize::Landscape4x3,
            num_inference_steps: NUM_INFERENCE_STEPS,
            guidance_scale: GUIDANCE_SCALE,
            num_images: NUM_IMAGES,
            enable_safety_checker: request.enable_safety_checker(),
            output_format: OutputFormat::Jpeg,
            loras: request.adapters().to_vec(),
        }
    }
}

/// The part of the inference response we care about: the first image's URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceResult {
    image_url: String,
}

impl InferenceResult {
    pub fn from_value(value: serde_json::Value) -> Result<Self, GenerationError> {
        let url = value.pointer("/images/0/url").ok_or_else(|| {
            GenerationError::MalformedResult("result has no images[0].url".into())
        })?;
        let url = url.as_str().ok_or_else(|| {
            GenerationError::MalformedResult(format!("images[0].url is not a string: {url}"))
        })?;
        Ok(Self {
            image_url: url.to_string(),
        })
    }

    pub fn image_url(&self) -> &str {
        &self.image_url
    }
}
