//! REST API types for frontend integration.
//!
//! Text outputs travel as `content`, workbooks as base64 in `contentBase64`.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{OutputKind, PrettifyStatus, RenderOutput};
use crate::transform::pipeline::GeneratedOutput;
use crate::validation::ValidationReport;

/// Response sent to the frontend after a render.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Status: "ready", "warning"
    pub status: String,

    /// Suggested download name
    pub file_name: String,

    pub output_kind: OutputKind,

    /// Text output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Workbook output, base64 encoded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_base64: Option<String>,

    /// Dataset names the template could use
    pub datasets: Vec<String>,

    pub prettify: PrettifyStatus,

    pub validation: Option<ValidationReport>,

    /// Whether the result came from the render cache
    pub cached: bool,
}

impl RenderResponse {
    pub fn new(generated: GeneratedOutput, cached: bool) -> Self {
        let warning = matches!(generated.prettify, PrettifyStatus::Failed(_))
            || generated.validation.as_ref().is_some_and(|r| !r.is_ok());

        let (content, content_base64) = match &generated.output {
            RenderOutput::Text(text) => (Some(text.clone()), None),
            RenderOutput::Spreadsheet(bytes) => (
                None,
                Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            ),
        };

        RenderResponse {
            job_id: Uuid::new_v4().to_string(),
            status: if warning { "warning" } else { "ready" }.to_string(),
            file_name: format!("output.{}", generated.extension),
            output_kind: generated.output.kind(),
            content,
            content_base64,
            datasets: generated.datasets,
            prettify: generated.prettify,
            validation: generated.validation,
            cached,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "datasets": [],
        "validation": null
    })
}
