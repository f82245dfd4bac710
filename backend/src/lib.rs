//! # JinjaXcat - data files in, templated documents out
//!
//! JinjaXcat loads tabular and structured data (CSV, XLSX, JSON, REST
//! endpoints), exposes every dataset to a Jinja template and writes the
//! rendered document, optionally prettified and checked against a schema.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ CSV / XLSX  │────▶│   Loader    │────▶│  Renderer   │────▶│  Prettify   │
//! │ JSON / REST │     │ (datasets)  │     │ (text/xlsx) │     │  Validate   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jinjaxcat::{generate_output, GenerateOptions, Renderer, Upload};
//!
//! let inputs = vec![Upload::from_path("articles.csv")?];
//! let template = Upload::from_path("catalog.xml")?;
//! let generated = generate_output(&inputs, &template, &Renderer::default(), &GenerateOptions::default())?;
//! println!("{}", generated.output.as_text().unwrap_or_default());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Uploads, rendering context and outputs
//! - [`config`] - Environment settings and YAML run configurations
//! - [`loader`] - CSV, XLSX, JSON and REST loaders
//! - [`xlsx`] - Workbook reading and writing
//! - [`render`] - Template environment, extensions and rendering modes
//! - [`prettify`] - XML and CSV reformatting
//! - [`validation`] - DTD, XSD and JSON Schema validation
//! - [`transform`] - Dataset remapping and the end-to-end pipeline
//! - [`cache`] - Content-keyed LRU caches
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;
pub mod config;

// Ingestion
pub mod loader;
pub mod xlsx;

// Rendering
pub mod render;

// Post-processing
pub mod prettify;
pub mod validation;

// Orchestration
pub mod transform;

// Caching
pub mod cache;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    LoadError,
    RenderError,
    PrettifyError,
    ValidationError,
    PipelineError,
    ServerError,
};

// =============================================================================
// Re-exports - Models and configuration
// =============================================================================

pub use models::{
    Upload,
    RenderContext,
    RenderOutput,
    OutputKind,
    PrettifyStatus,
};

pub use config::{RunConfig, Settings, ValidationKind, parse_key_mapping};

// =============================================================================
// Re-exports - Loaders
// =============================================================================

pub use loader::{load_upload, load_uploads, LoadOptions};
pub use loader::csv::{
    csv_to_json,
    parse_bytes_auto,
    detect_encoding,
    detect_delimiter,
    decode_content,
    CsvError,
    ParseResult,
};

// =============================================================================
// Re-exports - Rendering
// =============================================================================

pub use render::{
    build_environment,
    EnvironmentConfig,
    HierarchyCache,
    PluginRegistry,
    Renderer,
    TemplateFunctionPlugin,
    TemplatePlugin,
};

// =============================================================================
// Re-exports - Post-processing
// =============================================================================

pub use prettify::{beautify, prettify_csv, prettify_xml};
pub use validation::{
    validate_json,
    validate_output,
    validate_xml,
    SchemaKind,
    ValidationReport,
    ValidationStatus,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    generate_output,
    run_config,
    GenerateOptions,
    GeneratedOutput,
};
pub use transform::remap_keys;

// =============================================================================
// Re-exports - Cache
// =============================================================================

pub use cache::{ContentCache, ContentKey};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{RenderResponse, error_response};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
