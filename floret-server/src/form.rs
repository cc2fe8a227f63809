use std::collections::HashMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use floret_core::{AdapterSpec, GenerationRequest, RequestError, MAX_ADAPTERS};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("Missing required field: prompt")]
    MissingPrompt,
    #[error(transparent)]
    Invalid(#[from] RequestError),
}

impl IntoResponse for FormError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

/// The submitted form, as raw field values.
///
/// Empty values are treated as absent, matching how browsers submit blank inputs.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct GenerationForm(HashMap<String, String>);

impl GenerationForm {
    fn field(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn prompt(&self) -> Option<&str> {
        self.field("prompt").filter(|prompt| !prompt.trim().is_empty())
    }

    /// Only an exact `on`, which is what a checked checkbox submits.
    pub fn safety_checker_enabled(&self) -> bool {
        self.0.get("enable_safety").map(String::as_str) == Some("on")
    }

    /// Complete `lora_path_{i}` / `lora_scale_{i}` pairs, in slot order.
    pub fn adapters(&self) -> Vec<AdapterSpec> {
        (0..MAX_ADAPTERS).filter_map(|slot| self.adapter(slot)).collect()
    }

    fn adapter(&self, slot: usize) -> Option<AdapterSpec> {
        let path = self.field(&format!("lora_path_{slot}"));
        let scale = self.field(&format!("lora_scale_{slot}"));
        match (path, scale) {
            (Some(path), Some(scale)) => match scale.trim().parse::<f64>() {
                Ok(value) if value.is_finite() => Some(AdapterSpec::new(path, value)),
                _ => {
                    debug!(slot, scale, "skipping adapter with unusable scale");
                    None
                }
            },
            (None, None) => None,
            _ => {
                debug!(slot, "skipping incomplete adapter pair");
                None
            }
        }
    }

    pub fn into_request(self) -> Result<GenerationRequest, FormError> {
        let prompt = self.prompt().ok_or(FormError::MissingPrompt)?;
        Ok(GenerationRequest::new(
            prompt,
            self.adapters(),
            self.safety_checker_enabled(),
        )?)
    }
}
