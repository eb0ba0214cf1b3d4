//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling HTTP requests for credential
//! minting and image analysis. It uses `utoipa` doc comments to generate
//! OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use base64::{
    Engine, alphabet,
    engine::{GeneralPurpose, GeneralPurposeConfig},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    models::{AnalysisStatus, AnalyzeImagePayload, ErrorResponse},
    state::AppState,
};

pub const ANALYSIS_ID_HEADER: HeaderName = HeaderName::from_static("x-analysis-id");

pub enum ApiError {
    BadRequest {
        error: &'static str,
        details: &'static str,
    },
    Upstream {
        error: &'static str,
        details: Option<String>,
        source: anyhow::Error,
    },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest { error, details } => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: error.to_string(),
                    details: Some(details.to_string()),
                }),
            )
                .into_response(),
            ApiError::Upstream {
                error,
                details,
                source,
            } => {
                error!("{}: {:?}", error, source);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: error.to_string(),
                        details,
                    }),
                )
                    .into_response()
            }
        }
    }
}

/// Mint an ephemeral credential for a realtime session.
#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "Upstream session object, including `client_secret.value`", body = serde_json::Value),
        (status = 500, description = "Upstream failure", body = ErrorResponse)
    )
)]
pub async fn get_session(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let session = state
        .sessions
        .mint()
        .await
        .map_err(|source| ApiError::Upstream {
            error: "Failed to get session token",
            details: None,
            source,
        })?;
    Ok(Json(session))
}

/// Padded standard base64. Unused bits in the final quantum are ignored.
const IMAGE_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// The image must be a non-empty string of padded base64.
fn validate_image(image: &Value) -> Result<&str, ApiError> {
    let image = image
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or(ApiError::BadRequest {
            error: "Invalid image data format",
            details: "Image data must be a base64 string",
        })?;
    IMAGE_BASE64
        .decode(image)
        .map_err(|_| ApiError::BadRequest {
            error: "Invalid base64 format",
            details: "Image data is not properly base64 encoded",
        })?;
    Ok(image)
}

/// Describe the contents of a JPEG image.
///
/// The id of the stored result is returned in the `x-analysis-id` header.
#[utoipa::path(
    post,
    path = "/analyze-image",
    request_body = AnalyzeImagePayload,
    responses(
        (status = 200, description = "Chat completion describing the image", body = serde_json::Value,
            headers(("x-analysis-id" = String, description = "Id for /check-analysis/{id}"))),
        (status = 400, description = "Image is missing or not base64", body = ErrorResponse),
        (status = 500, description = "Upstream failure", body = ErrorResponse)
    )
)]
pub async fn analyze_image(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AnalyzeImagePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let image = validate_image(&payload.image)?;
    info!(image_len = image.len(), "Analyzing image");

    let analysis = state
        .analyzer
        .analyze(image)
        .await
        .map_err(|source| ApiError::Upstream {
            error: "Failed to analyze image",
            details: Some(format!("{:#}", source)),
            source,
        })?;

    let id = state.analyses.insert(analysis.clone());
    let header = HeaderValue::try_from(id.to_string()).map_err(|e| ApiError::Upstream {
        error: "Failed to analyze image",
        details: None,
        source: e.into(),
    })?;
    Ok(([(ANALYSIS_ID_HEADER, header)], Json(analysis)))
}

/// Look up the result of an earlier analysis.
#[utoipa::path(
    get,
    path = "/check-analysis/{id}",
    responses(
        (status = 200, description = "The stored result, or `no_analysis`", body = AnalysisStatus)
    ),
    params(
        ("id" = String, Path, description = "Value of the `x-analysis-id` header")
    )
)]
pub async fn check_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<AnalysisStatus> {
    let result = Uuid::parse_str(&id)
        .ok()
        .and_then(|id| state.analyses.get(&id));
    Json(match result {
        Some(result) => AnalysisStatus::Complete { result },
        None => AnalysisStatus::none(),
    })
}
