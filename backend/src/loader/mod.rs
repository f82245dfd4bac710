//! Format loaders: uploads → named datasets.
//!
//! | extension | dataset(s)                                  |
//! |-----------|---------------------------------------------|
//! | `.csv`    | `stem` → array of string records            |
//! | `.xlsx`   | `{sheet}_{stem}` per sheet, string records  |
//! | `.json`   | `stem` → parsed document                    |
//! | `.rest`   | `stem` → JSON answer of a GET request       |
//!
//! Any other extension is skipped with a warning.

pub mod csv;
pub mod json;
pub mod rest;
pub mod xlsx;

use serde_json::Value;
use std::time::Duration;

use crate::api::logs::{log_info, log_success, log_warning};
use crate::error::{ConfigError, ConfigResult, LoadResult, PipelineError, PipelineResult};
use crate::models::{RenderContext, Upload};

/// Knobs for the loaders.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Timeout applied to `.rest` requests.
    pub http_timeout: Duration,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(10),
        }
    }
}

/// Datasets produced by one upload. Unknown extensions produce none.
pub fn load_upload(upload: &Upload, options: &LoadOptions) -> LoadResult<Vec<(String, Value)>> {
    let stem = upload.dataset_name();
    let datasets = match upload.extension().as_str() {
        "csv" => {
            let parsed = csv::parse_bytes_auto(&upload.bytes)?;
            log_info(format!(
                "{}: encoding {}, delimiter {:?}, {} columns",
                upload.name,
                parsed.encoding,
                parsed.delimiter,
                parsed.headers.len()
            ));
            vec![(stem, Value::Array(parsed.records))]
        }
        "xlsx" => xlsx::load_workbook(&upload.bytes, &stem)?,
        "json" => vec![(stem, json::load_json(&upload.bytes)?)],
        "rest" => vec![(stem, rest::load_rest(&upload.bytes, options.http_timeout)?)],
        other => {
            log_warning(format!(
                "Ignoring '{}': unsupported extension '{}'",
                upload.name, other
            ));
            Vec::new()
        }
    };
    Ok(datasets)
}

/// Register a dataset, refusing to overwrite an existing name.
pub fn insert_dataset(context: &mut RenderContext, name: String, value: Value) -> ConfigResult<()> {
    if context.contains_key(&name) {
        return Err(ConfigError::DuplicateDataset(name));
    }
    context.insert(name, value);
    Ok(())
}

/// Build the rendering context from every upload.
pub fn load_uploads(uploads: &[Upload], options: &LoadOptions) -> PipelineResult<RenderContext> {
    let mut context = RenderContext::new();

    for upload in uploads {
        log_info(format!("Loading {}", upload.name));
        let datasets = load_upload(upload, options).map_err(|source| PipelineError::Load {
            file: upload.name.clone(),
            source,
        })?;

        for (name, value) in datasets {
            let size = match &value {
                Value::Array(items) => items.len(),
                _ => 1,
            };
            insert_dataset(&mut context, name.clone(), value)?;
            log_success(format!("Dataset '{}' loaded ({} records)", name, size));
        }
    }

    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xlsx::fixtures;

    #[test]
    fn test_mixed_formats() {
        let uploads = vec![
            Upload::new("articles.csv", "sku;qty\nA-1;3\n"),
            Upload::new("groups.json", r#"[{"GROUP_ID": "0"}]"#),
            Upload::new("notes.txt", "ignored"),
        ];
        let context = load_uploads(&uploads, &LoadOptions::default()).unwrap();

        assert_eq!(context.len(), 2);
        assert_eq!(context["articles"][0]["qty"], "3");
        assert_eq!(context["groups"][0]["GROUP_ID"], "0");
    }

    #[test]
    fn test_duplicate_name_across_formats_is_fatal() {
        let uploads = vec![
            Upload::new("catalog.csv", "a\n1\n"),
            Upload::new("catalog.json", "[]"),
        ];
        let err = load_uploads(&uploads, &LoadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::DuplicateDataset(ref name)) if name == "catalog"
        ));
    }

    #[test]
    fn test_sheet_name_collision_is_fatal() {
        let workbook = fixtures::workbook(&[("Sheet1", vec![vec!["a"], vec!["1"]])]);
        let uploads = vec![
            Upload::new("data.xlsx", workbook),
            Upload::new("Sheet1_data.csv", "a\n2\n"),
        ];
        let err = load_uploads(&uploads, &LoadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::DuplicateDataset(_))
        ));
    }

    #[test]
    fn test_load_error_names_the_file() {
        let uploads = vec![Upload::new("broken.json", "{")];
        let err = load_uploads(&uploads, &LoadOptions::default()).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
