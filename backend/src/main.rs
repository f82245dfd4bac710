//! JinjaXcat CLI - Render data files through Jinja templates
//!
//! # Main Commands
//!
//! ```bash
//! jinjaxcat render -i articles.csv -i groups.xlsx -t catalog.xml -o out.xml --prettify
//! jinjaxcat run config.yml          # Run a YAML configuration
//! jinjaxcat serve                   # Start HTTP server (port 3000)
//! ```
//!
//! # Utility Commands
//!
//! ```bash
//! jinjaxcat load articles.csv       # Show the datasets a template would see
//! jinjaxcat prettify out.xml        # Reformat an XML or CSV file
//! jinjaxcat validate out.xml -s catalog.xsd
//! ```

use clap::{Parser, Subcommand};
use jinjaxcat::api::logs::{log_error, log_info, log_success};
use jinjaxcat::transform::pipeline::{environment_config, load_plugins, read_schema, write_output};
use jinjaxcat::{
    generate_output, load_uploads, parse_key_mapping, prettify::Formatter, run_config,
    validate_output, GenerateOptions, PluginRegistry, RenderOutput, Renderer, RunConfig, Settings,
    Upload, ValidationKind,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "jinjaxcat")]
#[command(about = "Render CSV, XLSX, JSON and REST data through Jinja templates", long_about = None)]
struct Cli {
    /// Directory of *.jinja / *.j2 template plugins (overrides JINJAXCAT_PLUGIN_DIR)
    #[arg(long, global = true)]
    plugin_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template against input files
    Render {
        /// Input data file (.csv, .xlsx, .json, .rest), repeatable
        #[arg(short, long = "input", required = true)]
        inputs: Vec<PathBuf>,

        /// Template file (.xlsx for spreadsheet mode, any text otherwise)
        #[arg(short, long)]
        template: PathBuf,

        /// Output file (default: stdout, text outputs only)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Prettify XML and CSV outputs
        #[arg(short, long)]
        prettify: bool,

        /// Validate the output
        #[arg(long, value_enum)]
        validation: Option<ValidationKind>,

        /// Schema file (.dtd, .xsd or .json)
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Rename a dataset before rendering, as old=new (repeatable)
        #[arg(short, long = "map")]
        map: Vec<String>,

        /// Fail on undefined template variables
        #[arg(long)]
        strict: bool,
    },

    /// Run a YAML configuration file
    Run {
        /// Configuration file
        config: PathBuf,
    },

    /// Load input files and print the rendering context as JSON
    Load {
        /// Input data files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Prettify an XML or CSV file
    Prettify {
        /// File to reformat
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a file against a DTD, XSD or JSON Schema
    Validate {
        /// File to validate
        input: PathBuf,

        /// Schema file (.dtd, .xsd or .json)
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: JINJAXCAT_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match load_settings(cli.plugin_dir) {
        Ok(settings) => match cli.command {
            Commands::Render {
                inputs,
                template,
                output,
                prettify,
                validation,
                schema,
                map,
                strict,
            } => {
                cmd_render(
                    settings,
                    inputs,
                    template,
                    output,
                    prettify,
                    validation,
                    schema,
                    map,
                    strict,
                )
                .await
            }

            Commands::Run { config } => cmd_run(settings, config).await,

            Commands::Load { inputs, output } => cmd_load(settings, inputs, output).await,

            Commands::Prettify { input, output } => cmd_prettify(&input, output.as_deref()),

            Commands::Validate { input, schema } => cmd_validate(&settings, &input, schema.as_deref()),

            Commands::Serve { port } => cmd_serve(settings, port).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        log_error(format!("Error: {}", e));
        std::process::exit(1);
    }
}

fn load_settings(plugin_dir: Option<PathBuf>) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut settings = Settings::from_env()?;
    if plugin_dir.is_some() {
        settings.plugin_dir = plugin_dir;
    }
    Ok(settings)
}

#[allow(clippy::too_many_arguments)]
async fn cmd_render(
    settings: Settings,
    inputs: Vec<PathBuf>,
    template: PathBuf,
    output: Option<PathBuf>,
    prettify: bool,
    validation: Option<ValidationKind>,
    schema: Option<PathBuf>,
    map: Vec<String>,
    strict: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let key_mapping = parse_key_mapping(&map)?;
    let inputs = inputs
        .iter()
        .map(Upload::from_path)
        .collect::<std::io::Result<Vec<_>>>()?;
    let template = Upload::from_path(&template)?;
    let schema = schema.as_deref().map(read_schema).transpose()?;

    let validation = match (validation, &schema) {
        (Some(kind), _) => Some(kind),
        (None, Some(schema)) if schema.extension() == "json" => Some(ValidationKind::Json),
        (None, Some(_)) => Some(ValidationKind::Xml),
        (None, None) => None,
    };
    let output_extension = output
        .as_deref()
        .and_then(|p| p.extension())
        .map(|e| e.to_string_lossy().to_ascii_lowercase());

    let generated = tokio::task::spawn_blocking(move || {
        let plugins = Arc::new(load_plugins(&settings));
        let renderer = Renderer::new(&environment_config(&settings, plugins, strict));
        let options = GenerateOptions {
            output_extension,
            prettify,
            validation,
            schema,
            key_mapping,
            ..GenerateOptions::from_settings(&settings)
        };
        generate_output(&inputs, &template, &renderer, &options)
    })
    .await??;

    match (&output, &generated.output) {
        (Some(path), _) => {
            write_output(path, &generated)?;
            log_success(format!("Output written to {}", path.display()));
        }
        (None, RenderOutput::Text(text)) => println!("{}", text),
        (None, RenderOutput::Spreadsheet(_)) => {
            return Err("Spreadsheet outputs need --output".into());
        }
    }

    Ok(())
}

async fn cmd_run(settings: Settings, config: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    log_info(format!("Running configuration {}", config.display()));
    let config = RunConfig::from_file(&config)?;

    tokio::task::spawn_blocking(move || {
        let plugins = Arc::new(load_plugins(&settings));
        run_config(&config, &settings, plugins)
    })
    .await??;

    Ok(())
}

async fn cmd_load(
    settings: Settings,
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let uploads = inputs
        .iter()
        .map(Upload::from_path)
        .collect::<std::io::Result<Vec<_>>>()?;

    let options = GenerateOptions::from_settings(&settings).load;
    let context = tokio::task::spawn_blocking(move || load_uploads(&uploads, &options)).await??;

    for (name, value) in &context {
        let size = value.as_array().map_or(1, Vec::len);
        log_info(format!("{}: {} record(s)", name, size));
    }

    let json = serde_json::to_string_pretty(&context)?;
    write_text(&json, output.as_deref())
}

fn cmd_prettify(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let upload = Upload::from_path(input)?;
    let formatter = Formatter::for_extension(&upload.extension())
        .ok_or_else(|| format!("No beautifier for '{}'", upload.name))?;

    let content = String::from_utf8(upload.bytes)?;
    let pretty = formatter.format(&content)?;
    write_text(&pretty, output)
}

fn cmd_validate(settings: &Settings, input: &Path, schema: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    log_info(format!("Validating: {}", input.display()));

    let content = fs::read_to_string(input)?;
    let schema = schema.map(read_schema).transpose()?;
    let kind = match &schema {
        Some(schema) if schema.extension() == "json" => ValidationKind::Json,
        Some(_) => ValidationKind::Xml,
        None => ValidationKind::Json,
    };

    let report = validate_output(&content, kind, schema.as_ref(), settings.max_validation_errors)?;
    if !report.is_ok() {
        std::process::exit(1);
    }

    Ok(())
}

async fn cmd_serve(mut settings: Settings, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port {
        settings.port = port;
    }
    let plugins: Arc<PluginRegistry> = Arc::new(load_plugins(&settings));
    jinjaxcat::server::start_server(settings, plugins).await
}

fn write_text(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            log_success(format!("Output written to: {}", p.display()));
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
