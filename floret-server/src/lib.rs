pub mod config;
pub mod form;
pub mod handler;
pub mod logging;
pub mod rate_limit;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use floret_core::ImageGenerator;
use tower_http::trace::TraceLayer;

use crate::handler::{generate_image_handler, index_handler};
use crate::rate_limit::{enforce_rate_limit, ClientLimiter};

// Application state holding the image generator shared by all requests.
#[derive(Clone)]
pub struct AppState(pub Arc<dyn ImageGenerator>);

/// Builds the single-route app, with `limiter` guarding both methods of `/`.
pub fn router(generator: Arc<dyn ImageGenerator>, limiter: Arc<dyn ClientLimiter>) -> Router {
    Router::new()
        .route("/", get(index_handler).post(generate_image_handler))
        .route_layer(middleware::from_fn_with_state(limiter, enforce_rate_limit))
        .with_state(AppState(generator))
        .layer(TraceLayer::new_for_http())
}
