//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, static file serving, and OpenAPI documentation.

use crate::{
    handlers,
    models::{AnalysisStatus, AnalyzeImagePayload, ErrorResponse},
    state::AppState,
};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, header},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Captured camera frames arrive as base64 inside JSON.
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_session,
        handlers::analyze_image,
        handlers::check_analysis,
    ),
    components(
        schemas(AnalyzeImagePayload, AnalysisStatus, ErrorResponse)
    ),
    tags(
        (name = "Parley API", description = "Ephemeral realtime credentials and image analysis")
    )
)]
pub struct ApiDoc;

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let static_dir = app_state.config.static_dir.clone();

    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/session", get(handlers::get_session))
        .route("/analyze-image", post(handlers::analyze_image))
        .route("/check-analysis/{id}", get(handlers::check_analysis))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Anything not routed is looked up in the static client directory.
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
        .fallback_service(ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors())
}
