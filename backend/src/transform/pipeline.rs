//! High-level pipeline API: uploads in, rendered artifact out.
//!
//! Every invocation runs the same stages:
//!
//! ```text
//! load → remap → render → prettify? → validate?
//! ```
//!
//! Loading, remapping and rendering errors abort the run. Prettify and
//! validation never do: their outcome travels next to the output.
//!
//! # Example
//!
//! ```rust,ignore
//! use jinjaxcat::models::Upload;
//! use jinjaxcat::render::Renderer;
//! use jinjaxcat::transform::{generate_output, GenerateOptions};
//!
//! let inputs = vec![Upload::from_path("articles.csv")?];
//! let template = Upload::from_path("catalog.xml")?;
//! let generated = generate_output(&inputs, &template, &Renderer::default(), &GenerateOptions::default())?;
//! std::fs::write("out.xml", generated.output.as_bytes())?;
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::remap::remap_keys;
use crate::cache::ContentCache;
use crate::api::logs::{log_info, log_success, log_warning};
use crate::config::{RunConfig, Settings, ValidationKind};
use crate::error::{PipelineResult, ValidationError};
use crate::loader::{load_uploads, LoadOptions};
use crate::models::{extension_of, OutputKind, PrettifyStatus, RenderOutput, Upload};
use crate::prettify::beautify;
use crate::render::{EnvironmentConfig, PluginRegistry, Renderer};
use crate::validation::{validate_output, ValidationReport};

/// Options of one pipeline run.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Extension deciding prettify and escaping; defaults to the template's.
    pub output_extension: Option<String>,

    /// Run the prettifier on text outputs
    pub prettify: bool,

    /// Validation to run on text outputs
    pub validation: Option<ValidationKind>,

    /// Schema file (`.dtd`, `.xsd` or `.json`)
    pub schema: Option<Upload>,

    /// Dataset renames applied before rendering
    pub key_mapping: BTreeMap<String, String>,

    /// Errors listed in a KO report
    pub max_validation_errors: usize,

    pub load: LoadOptions,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            output_extension: None,
            prettify: false,
            validation: None,
            schema: None,
            key_mapping: BTreeMap::new(),
            max_validation_errors: 100,
            load: LoadOptions::default(),
        }
    }
}

impl GenerateOptions {
    /// Options carrying the process settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_validation_errors: settings.max_validation_errors,
            load: LoadOptions {
                http_timeout: settings.http_timeout,
            },
            ..Self::default()
        }
    }
}

/// Result of a complete pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedOutput {
    /// Rendered artifact, prettified when requested and possible
    #[serde(skip)]
    pub output: RenderOutput,

    /// Output extension, without the dot
    pub extension: String,

    /// Dataset names visible to the template
    pub datasets: Vec<String>,

    pub prettify: PrettifyStatus,

    pub validation: Option<ValidationReport>,
}

/// Run the pipeline on in-memory uploads.
pub fn generate_output(
    inputs: &[Upload],
    template: &Upload,
    renderer: &Renderer,
    options: &GenerateOptions,
) -> PipelineResult<GeneratedOutput> {
    log_info(format!("Loading {} input file(s)...", inputs.len()));
    let context = load_uploads(inputs, &options.load)?;
    let context = remap_keys(context, &options.key_mapping);
    let mut datasets: Vec<String> = context.keys().cloned().collect();
    datasets.sort();
    log_success(format!("Datasets available: {}", datasets.join(", ")));

    let extension = options
        .output_extension
        .clone()
        .unwrap_or_else(|| template.extension());

    log_info(format!("Rendering template '{}'...", template.name));
    let output = renderer.render_as(template, &context, &extension)?;
    log_success(format!("Generated {} bytes", output.as_bytes().len()));

    let (output, prettify) = if !options.prettify {
        (output, PrettifyStatus::Skipped)
    } else {
        match output {
            RenderOutput::Text(text) => {
                let (text, status) = beautify(text, &extension);
                (RenderOutput::Text(text), status)
            }
            RenderOutput::Spreadsheet(bytes) => {
                log_warning("Spreadsheet outputs are not beautified");
                (RenderOutput::Spreadsheet(bytes), PrettifyStatus::Skipped)
            }
        }
    };

    let validation = match (options.validation, output.kind()) {
        (None, _) => None,
        (Some(_), OutputKind::Spreadsheet) => {
            log_warning("Spreadsheet outputs are not validated");
            None
        }
        (Some(kind), OutputKind::Text) => {
            let text = output.as_text().unwrap_or_default();
            Some(validate_output(
                text,
                kind,
                options.schema.as_ref(),
                options.max_validation_errors,
            )?)
        }
    };

    Ok(GeneratedOutput {
        output,
        extension,
        datasets,
        prettify,
        validation,
    })
}

/// Plugins from the configured directory, or none.
pub fn load_plugins(settings: &Settings) -> PluginRegistry {
    let Some(dir) = settings.plugin_dir.as_deref() else {
        return PluginRegistry::new();
    };
    match PluginRegistry::from_dir(dir) {
        Ok(registry) => {
            log_info(format!("{} plugin file(s) found in {}", registry.len(), dir.display()));
            registry
        }
        Err(e) => {
            log_warning(format!("Cannot read plugin directory {}: {}", dir.display(), e));
            PluginRegistry::new()
        }
    }
}

/// Rendering environment for the process settings, with a fresh hierarchy cache.
pub fn environment_config(settings: &Settings, plugins: Arc<PluginRegistry>, strict_undefined: bool) -> EnvironmentConfig {
    EnvironmentConfig {
        strict_undefined,
        http_timeout: settings.http_timeout,
        hierarchy_cache: Some(ContentCache::shared(settings.cache_size)),
        plugins,
    }
}

/// Write the artifact, creating missing parent directories.
pub fn write_output(path: &Path, generated: &GeneratedOutput) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, generated.output.as_bytes())
}

/// Read a schema file into an upload.
pub fn read_schema(path: &Path) -> Result<Upload, ValidationError> {
    Upload::from_path(path).map_err(|source| ValidationError::SchemaIo {
        path: path.display().to_string(),
        source,
    })
}

/// Execute a YAML run configuration end to end and write its output file.
pub fn run_config(
    config: &RunConfig,
    settings: &Settings,
    plugins: Arc<PluginRegistry>,
) -> PipelineResult<GeneratedOutput> {
    let inputs = config
        .input_files
        .iter()
        .map(Upload::from_path)
        .collect::<std::io::Result<Vec<_>>>()?;
    let template = Upload::from_path(&config.template_file)?;
    let schema = config.schema_file.as_deref().map(read_schema).transpose()?;

    let renderer = Renderer::new(&environment_config(settings, plugins, false));
    let options = GenerateOptions {
        output_extension: Some(extension_of(&config.output_file.to_string_lossy())),
        prettify: config.beautify_output,
        validation: config.effective_validation(),
        schema,
        key_mapping: config.key_mapping.clone(),
        ..GenerateOptions::from_settings(settings)
    };

    let generated = generate_output(&inputs, &template, &renderer, &options)?;
    write_output(&config.output_file, &generated)?;
    log_success(format!("Output written to {}", config.output_file.display()));
    Ok(generated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::validation::ValidationStatus;
    use tempfile::TempDir;

    fn inputs() -> Vec<Upload> {
        vec![
            Upload::new("articles.csv", "SKU;Name\nA1;Chair\nB2;Table & co\n"),
            Upload::new("meta.json", r#"{"title": "Spring"}"#),
        ]
    }

    const TEMPLATE: &str = "<catalog title=\"{{ meta.title }}\">{% for a in products %}<item sku=\"{{ a.SKU }}\">{{ a.Name }}</item>{% endfor %}</catalog>";

    fn options() -> GenerateOptions {
        GenerateOptions {
            key_mapping: BTreeMap::from([("articles".to_string(), "products".to_string())]),
            ..GenerateOptions::default()
        }
    }

    #[test]
    fn test_generate_with_mapping() {
        let template = Upload::new("catalog.xml", TEMPLATE);
        let generated = generate_output(&inputs(), &template, &Renderer::default(), &options()).unwrap();

        assert_eq!(generated.datasets, vec!["meta".to_string(), "products".to_string()]);
        assert_eq!(
            generated.output.as_text().unwrap(),
            "<catalog title=\"Spring\"><item sku=\"A1\">Chair</item><item sku=\"B2\">Table &amp; co</item></catalog>"
        );
        assert_eq!(generated.prettify, PrettifyStatus::Skipped);
        assert!(generated.validation.is_none());
    }

    #[test]
    fn test_prettify_and_validate() {
        let template = Upload::new("catalog.xml", TEMPLATE);
        let opts = GenerateOptions {
            prettify: true,
            validation: Some(ValidationKind::Xml),
            schema: Some(Upload::new(
                "catalog.dtd",
                "<!ELEMENT catalog (item+)>\n<!ATTLIST catalog title CDATA #REQUIRED>\n<!ELEMENT item (#PCDATA)>\n<!ATTLIST item sku ID #REQUIRED>",
            )),
            ..options()
        };
        let generated = generate_output(&inputs(), &template, &Renderer::default(), &opts).unwrap();

        assert_eq!(generated.prettify, PrettifyStatus::Applied);
        assert!(generated.output.as_text().unwrap().contains("\n  <item sku=\"A1\">Chair</item>"));
        assert_eq!(generated.validation.unwrap().status, ValidationStatus::Ok);
    }

    #[test]
    fn test_output_extension_drives_escaping() {
        let template = Upload::new("catalog.j2", TEMPLATE);
        let opts = GenerateOptions {
            output_extension: Some("xml".into()),
            prettify: true,
            ..options()
        };
        let generated = generate_output(&inputs(), &template, &Renderer::default(), &opts).unwrap();

        assert_eq!(generated.extension, "xml");
        assert_eq!(generated.prettify, PrettifyStatus::Applied);
        assert!(generated.output.as_text().unwrap().contains("Table &amp; co"));
    }

    #[test]
    fn test_failed_prettify_keeps_output() {
        let template = Upload::new("broken.xml", "<a>{{ meta.title }}");
        let opts = GenerateOptions {
            prettify: true,
            ..GenerateOptions::default()
        };
        let generated = generate_output(&inputs(), &template, &Renderer::default(), &opts).unwrap();

        assert!(matches!(generated.prettify, PrettifyStatus::Failed(_)));
        assert_eq!(generated.output.as_text().unwrap(), "<a>Spring");
    }

    #[test]
    fn test_duplicate_dataset_aborts() {
        let inputs = vec![
            Upload::new("articles.csv", "a\n1\n"),
            Upload::new("articles.json", "[]"),
        ];
        let template = Upload::new("out.txt", "x");
        let err = generate_output(&inputs, &template, &Renderer::default(), &GenerateOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("articles"));
    }

    #[test]
    fn test_render_error_aborts() {
        let template = Upload::new("out.txt", "{% for %}");
        let err = generate_output(&inputs(), &template, &Renderer::default(), &GenerateOptions::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Render(_)));
    }

    #[test]
    fn test_run_config_writes_output() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("articles.csv"), "SKU,Price\nA1,10\nB2,12\n").unwrap();
        std::fs::write(
            dir.path().join("prices.csv"),
            "SKU;Price\n{% for a in articles %}\n{{ a.SKU }} ; {{ a.Price }}\n{% endfor %}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("run.yml"),
            "input_files: [articles.csv]\ntemplate_file: prices.csv\noutput_file: out/prices.csv\nbeautify_output: true\n",
        )
        .unwrap();

        let config = RunConfig::from_file(dir.path().join("run.yml")).unwrap();
        let generated = run_config(&config, &Settings::default(), Arc::new(PluginRegistry::new())).unwrap();

        assert_eq!(generated.prettify, PrettifyStatus::Applied);
        let written = std::fs::read_to_string(dir.path().join("out/prices.csv")).unwrap();
        assert_eq!(written, "SKU;Price\nA1;10\nB2;12");
    }
}
