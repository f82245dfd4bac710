//! HTTP Server for the JinjaXcat API.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | POST   | `/api/render`     | Render a template against uploads    |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |
//!
//! `/api/render` takes a multipart form:
//!
//! | field         | content                                   |
//! |---------------|-------------------------------------------|
//! | `input`       | data file, repeatable                     |
//! | `template`    | template file                             |
//! | `key_mapping` | JSON object `{"old": "new"}`, optional    |
//! | `prettify`    | `true` / `false`, optional                |
//! | `validation`  | `xml` / `json`, optional                  |
//! | `schema`      | schema file, optional                     |

use axum::{
    extract::{Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, RenderResponse};
use crate::cache::{ContentCache, ContentKey};
use crate::config::{Settings, ValidationKind};
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::models::Upload;
use crate::render::{EnvironmentConfig, HierarchyCache, PluginRegistry, Renderer};
use crate::transform::pipeline::{generate_output, GenerateOptions, GeneratedOutput};

/// Shared state of the server.
pub struct AppState {
    pub settings: Settings,
    pub plugins: Arc<PluginRegistry>,
    /// Finished renders keyed by a digest of the whole request
    pub renders: Arc<ContentCache<GeneratedOutput>>,
    pub hierarchy: HierarchyCache,
}

impl AppState {
    pub fn new(settings: Settings, plugins: Arc<PluginRegistry>) -> Self {
        Self {
            renders: ContentCache::shared(settings.cache_size),
            hierarchy: ContentCache::shared(settings.cache_size),
            settings,
            plugins,
        }
    }
}

/// A decoded `/api/render` form.
#[derive(Debug, Default)]
pub struct RenderRequest {
    pub inputs: Vec<Upload>,
    pub template: Option<Upload>,
    pub key_mapping: BTreeMap<String, String>,
    pub prettify: bool,
    pub validation: Option<ValidationKind>,
    pub schema: Option<Upload>,
}

impl RenderRequest {
    /// Digest of everything that influences the output.
    pub fn cache_key(&self) -> ContentKey {
        let roles = self
            .inputs
            .iter()
            .map(|u| ("input", u))
            .chain(self.template.iter().map(|u| ("template", u)))
            .chain(self.schema.iter().map(|u| ("schema", u)));

        let mut builder = ContentKey::builder();
        for (role, upload) in roles {
            builder = builder.part(role).part(&upload.name).part(&upload.bytes);
        }
        builder
            .json(&self.key_mapping)
            .json(&self.prettify)
            .json(&self.validation)
            .finish()
    }

    /// `.rest` inputs fetch live data, so their renders are never reused.
    pub fn is_cacheable(&self) -> bool {
        !self.inputs.iter().any(|u| u.extension() == "rest")
    }
}

/// Parse a form flag: `true`, `1`, `yes` and `on` are true.
fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn reject(err: ServerError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::Pipeline(PipelineError::Config(_))
        | ServerError::Pipeline(PipelineError::Load { .. })
        | ServerError::Pipeline(PipelineError::Render(_))
        | ServerError::Pipeline(PipelineError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        ServerError::Pipeline(PipelineError::IoError(_)) | ServerError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    log_error(err.to_string());
    (status, Json(error_response(&err.to_string())))
}

/// Start the HTTP server
pub async fn start_server(settings: Settings, plugins: Arc<PluginRegistry>) -> Result<(), Box<dyn std::error::Error>> {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    let port = settings.port;
    let state = Arc::new(AppState::new(settings, plugins));

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/render", post(render))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 JinjaXcat server running on http://localhost:{}", port);
    println!("   POST /api/render - Render a template");
    println!("   GET  /api/logs   - SSE log stream");
    println!("   GET  /health     - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "jinjaxcat",
        "version": env!("CARGO_PKG_VERSION"),
        "xsd": cfg!(feature = "xsd"),
        "endpoints": {
            "render": "POST /api/render",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn read_request(mut multipart: Multipart) -> ServerResult<RenderRequest> {
    let mut request = RenderRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        let file_name = field.file_name().map(|s| s.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?
            .to_vec();
        let text = || String::from_utf8_lossy(&bytes).into_owned();

        match name.as_str() {
            "input" | "template" | "schema" => {
                let file_name = file_name
                    .ok_or_else(|| ServerError::BadRequest(format!("Field '{}' must be a file", name)))?;
                let upload = Upload::new(file_name, bytes.clone());
                match name.as_str() {
                    "input" => request.inputs.push(upload),
                    "template" => request.template = Some(upload),
                    _ => request.schema = Some(upload),
                }
            }
            "key_mapping" => {
                let raw = text();
                if !raw.trim().is_empty() {
                    request.key_mapping = serde_json::from_str(&raw)
                        .map_err(|e| ServerError::BadRequest(format!("Invalid key_mapping: {}", e)))?;
                }
            }
            "prettify" => request.prettify = parse_flag(&text()),
            "validation" => {
                request.validation = match text().trim().to_ascii_lowercase().as_str() {
                    "" | "none" => None,
                    "xml" => Some(ValidationKind::Xml),
                    "json" => Some(ValidationKind::Json),
                    other => {
                        return Err(ServerError::BadRequest(format!("Unknown validation type '{}'", other)))
                    }
                };
            }
            other => log_info(format!("Ignoring form field '{}'", other)),
        }
    }

    Ok(request)
}

async fn render_request(state: Arc<AppState>, request: RenderRequest) -> ServerResult<RenderResponse> {
    let template = request
        .template
        .clone()
        .ok_or_else(|| ServerError::BadRequest("No template provided".to_string()))?;

    let key = request.cache_key();
    let cacheable = request.is_cacheable();
    if cacheable {
        if let Some(generated) = state.renders.get(&key) {
            log_info(format!("Serving '{}' from the render cache", template.name));
            return Ok(RenderResponse::new(generated, true));
        }
    }

    log_info(format!(
        "NEW RENDER: {} with {} input file(s)",
        template.name,
        request.inputs.len()
    ));

    let worker_state = state.clone();
    let generated = tokio::task::spawn_blocking(move || {
        let renderer = Renderer::new(&EnvironmentConfig {
            strict_undefined: false,
            http_timeout: worker_state.settings.http_timeout,
            hierarchy_cache: Some(worker_state.hierarchy.clone()),
            plugins: worker_state.plugins.clone(),
        });
        let options = GenerateOptions {
            prettify: request.prettify,
            validation: request.validation,
            schema: request.schema,
            key_mapping: request.key_mapping,
            ..GenerateOptions::from_settings(&worker_state.settings)
        };
        generate_output(&request.inputs, &template, &renderer, &options)
    })
    .await
    .map_err(|e| ServerError::Internal(format!("Render task failed: {}", e)))??;

    if cacheable {
        state.renders.put(key, generated.clone());
    }
    Ok(RenderResponse::new(generated, false))
}

/// Render endpoint
async fn render(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<RenderResponse>, (StatusCode, Json<Value>)> {
    let request = read_request(multipart).await.map_err(reject)?;
    let response = render_request(state, request).await.map_err(reject)?;
    Ok(Json(response))
}
