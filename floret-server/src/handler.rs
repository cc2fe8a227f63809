use axum::{
    extract::State,
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    response::{Html, IntoResponse, Response},
    Form, Json,
};
use floret_core::{GenerationFailed, ImagePayload};
use serde_json::json;
use tracing::{debug, warn};

use crate::{form::GenerationForm, AppState};

pub const DOWNLOAD_FILENAME: &str = "generated_image.jpg";
pub const GENERATION_FAILED_MESSAGE: &str = "Failed to generate image";

const INDEX_HTML: &str = include_str!("../templates/index.html");

/// GET / - the generation form
pub async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// POST / - generate an image and return it as a download
pub async fn generate_image_handler(
    State(state): State<AppState>,
    Form(form): Form<GenerationForm>,
) -> Response {
    let request = match form.into_request() {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected generation form: {}", e);
            return e.into_response();
        }
    };
    debug!(
        "Generation request received: prompt_len={}, adapters={}, safety_checker={}",
        request.prompt().len(),
        request.adapters().len(),
        request.enable_safety_checker()
    );

    match state.0.generate(request).await {
        Ok(image) => image_response(image),
        Err(GenerationFailed) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": GENERATION_FAILED_MESSAGE })),
        )
            .into_response(),
    }
}

fn image_response(image: ImagePayload) -> Response {
    (
        [
            (CONTENT_TYPE, image.content_type.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{DOWNLOAD_FILENAME}\""),
            ),
        ],
        image.data,
    )
        .into_response()
}
