//! Error types for the JinjaXcat rendering pipeline.
//!
//! This module defines the error hierarchy shared by every stage:
//!
//! - [`ConfigError`] - Invalid invocation or configuration (fatal, nothing rendered)
//! - [`LoadError`] - Ingestion failures for one input file
//! - [`RenderError`] - Template syntax/evaluation and workbook errors
//! - [`PrettifyError`] - Local formatting failures (never escape the pipeline)
//! - [`ValidationError`] - Hard validation errors (unreadable or unknown schema)
//! - [`PipelineError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

use crate::loader::csv::CsvError;
use crate::xlsx::XlsxError;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors caused by the invocation itself. They abort before any rendering.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two inputs produced the same dataset name.
    #[error("Duplicate detected: the dataset '{0}' already exists. Please rename your input files.")]
    DuplicateDataset(String),

    /// Mandatory keys absent from a run configuration.
    #[error("Missing mandatory key(s) in configuration: {}", .0.join(", "))]
    MissingKeys(Vec<String>),

    /// REST description uses a verb other than GET.
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// REST description cannot be parsed.
    #[error("Invalid REST request description: {0}")]
    InvalidRequest(String),

    /// Schema file extension is neither `.dtd`, `.xsd` nor `.json`.
    #[error("Invalid file extension for validation: {0}")]
    UnrecognizedSchema(String),

    /// XML validation requested without a schema file.
    #[error("XML validation requires a schema file (.dtd or .xsd)")]
    MissingSchema,

    /// Key mapping entry not in `old=new` form.
    #[error("Invalid key mapping '{0}': expected old=new")]
    InvalidMapping(String),

    /// Environment setting with an unusable value.
    #[error("Invalid setting {key}: {message}")]
    InvalidSetting { key: String, message: String },

    /// Failed to read a configuration file.
    #[error("Cannot read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse a YAML configuration.
    #[error("Failed to load the YAML configuration: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

// =============================================================================
// Ingestion Errors
// =============================================================================

/// Errors while turning one upload into datasets.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Encoding could not be determined or applied.
    #[error("Failed to detect encoding: {0}")]
    EncodingError(String),

    /// Malformed CSV content.
    #[error("Invalid CSV: {0}")]
    Csv(#[from] CsvError),

    /// Malformed workbook.
    #[error("Invalid workbook: {0}")]
    Xlsx(#[from] XlsxError),

    /// Malformed JSON document or response body.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport failure while calling a REST endpoint.
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// REST endpoint answered with a non-2xx status.
    #[error("HTTP status {status} for url ({url})")]
    HttpStatus { status: u16, url: String },

    /// Configuration problem found while loading (REST description, duplicates).
    #[error(transparent)]
    Config(#[from] ConfigError),
}

// =============================================================================
// Rendering Errors
// =============================================================================

/// Errors raised while rendering a template.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Template syntax or evaluation error, with MiniJinja debug info.
    #[error("{}", describe_template_error(.0))]
    Template(#[from] minijinja::Error),

    /// Template workbook could not be read or written.
    #[error("Workbook error: {0}")]
    Workbook(#[from] XlsxError),

    /// Template bytes could not be decoded.
    #[error("Failed to decode template: {0}")]
    EncodingError(String),
}

/// Formats a MiniJinja error together with its template location.
fn describe_template_error(err: &minijinja::Error) -> String {
    match (err.name(), err.line()) {
        (Some(name), Some(line)) => format!("{} (in {}:{})", err, name, line),
        _ => err.to_string(),
    }
}

// =============================================================================
// Post-processing Errors
// =============================================================================

/// Prettify failures. The pipeline turns these into "original retained".
#[derive(Debug, Error)]
pub enum PrettifyError {
    /// Output is not well-formed XML.
    #[error("Output is not well-formed XML: {0}")]
    InvalidXml(String),

    /// Output could not be interpreted as delimited text.
    #[error("Output is not valid CSV: {0}")]
    InvalidCsv(String),
}

/// Hard validation errors. Validation *failures* are reports, not errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Schema kind not recognized.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Schema kind known but not compiled into this build.
    #[error("{0} validation is not available in this build")]
    Unavailable(String),

    /// Schema file could not be read.
    #[error("Cannot read schema {path}: {source}")]
    SchemaIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the error type returned by [`crate::transform::pipeline::generate_output`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid invocation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// One input file could not be loaded.
    #[error("Failed to load '{file}': {source}")]
    Load {
        file: String,
        #[source]
        source: LoadError,
    },

    /// Rendering failed.
    #[error("Generation failed: {0}")]
    Render(#[from] RenderError),

    /// Validation could not run.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Reading inputs or writing the output failed.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for configuration handling.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for loader operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // ConfigError -> PipelineError
        let config_err = ConfigError::DuplicateDataset("articles".into());
        let pipeline_err: PipelineError = config_err.into();
        assert!(pipeline_err.to_string().contains("articles"));

        // ConfigError -> LoadError keeps the message untouched
        let load_err: LoadError = ConfigError::UnsupportedMethod("POST".into()).into();
        assert_eq!(load_err.to_string(), "Unsupported HTTP method: POST");
    }

    #[test]
    fn test_missing_keys_format() {
        let err = ConfigError::MissingKeys(vec!["template_file".into(), "output_file".into()]);
        let msg = err.to_string();
        assert!(msg.contains("template_file, output_file"));
    }

    #[test]
    fn test_template_error_mentions_location() {
        let env = minijinja::Environment::new();
        let err = env
            .render_named_str("report.xml", "{{ unclosed", ())
            .unwrap_err();
        let msg = RenderError::from(err).to_string();
        assert!(msg.contains("report.xml"));
    }
}
