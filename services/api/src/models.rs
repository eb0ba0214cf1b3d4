//! Request and response bodies, documented for OpenAPI with `utoipa`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct AnalyzeImagePayload {
    /// Base64-encoded JPEG, without the `data:` prefix.
    #[serde(default)]
    #[schema(value_type = String, example = "/9j/4AAQSkZJRg==")]
    pub image: Value,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct ErrorResponse {
    #[schema(example = "Failed to analyze image")]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisStatus {
    Complete {
        #[schema(value_type = Object)]
        result: Value,
    },
    NoAnalysis {
        message: String,
    },
}

impl AnalysisStatus {
    pub fn none() -> Self {
        AnalysisStatus::NoAnalysis {
            message: "No image analysis has been performed yet".to_string(),
        }
    }
}
