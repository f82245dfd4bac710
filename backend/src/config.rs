//! Runtime settings and YAML run configurations.
//!
//! Settings come from the environment (a `.env` file is loaded by the CLI
//! through `dotenvy`):
//!
//! | variable                          | default |
//! |-----------------------------------|---------|
//! | `JINJAXCAT_HTTP_TIMEOUT_SECS`     | `10`    |
//! | `JINJAXCAT_PLUGIN_DIR`            | unset   |
//! | `JINJAXCAT_MAX_VALIDATION_ERRORS` | `100`   |
//! | `JINJAXCAT_CACHE_SIZE`            | `32`    |
//! | `JINJAXCAT_PORT`                  | `3000`  |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

pub const ENV_HTTP_TIMEOUT: &str = "JINJAXCAT_HTTP_TIMEOUT_SECS";
pub const ENV_PLUGIN_DIR: &str = "JINJAXCAT_PLUGIN_DIR";
pub const ENV_MAX_VALIDATION_ERRORS: &str = "JINJAXCAT_MAX_VALIDATION_ERRORS";
pub const ENV_CACHE_SIZE: &str = "JINJAXCAT_CACHE_SIZE";
pub const ENV_PORT: &str = "JINJAXCAT_PORT";

/// Process-wide settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub http_timeout: Duration,
    pub plugin_dir: Option<PathBuf>,
    pub max_validation_errors: usize,
    pub cache_size: NonZeroUsize,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(10),
            plugin_dir: None,
            max_validation_errors: 100,
            cache_size: NonZeroUsize::MIN.saturating_add(31),
            port: 3000,
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup, unset keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let defaults = Self::default();

        let timeout_secs: u64 = parse_var(&lookup, ENV_HTTP_TIMEOUT)?
            .unwrap_or(defaults.http_timeout.as_secs());
        let cache_size: usize = parse_var(&lookup, ENV_CACHE_SIZE)?
            .unwrap_or(defaults.cache_size.get());
        let cache_size = NonZeroUsize::new(cache_size).ok_or_else(|| ConfigError::InvalidSetting {
            key: ENV_CACHE_SIZE.to_string(),
            message: "must be greater than zero".to_string(),
        })?;

        Ok(Self {
            http_timeout: Duration::from_secs(timeout_secs),
            plugin_dir: lookup(ENV_PLUGIN_DIR)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            max_validation_errors: parse_var(&lookup, ENV_MAX_VALIDATION_ERRORS)?
                .unwrap_or(defaults.max_validation_errors),
            cache_size,
            port: parse_var(&lookup, ENV_PORT)?.unwrap_or(defaults.port),
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidSetting {
                key: key.to_string(),
                message: format!("'{}': {}", raw, e),
            }),
    }
}

/// Kind of validation requested for an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ValidationKind {
    /// DTD or XSD, chosen by the schema file extension
    Xml,
    /// JSON syntax, plus JSON Schema when a schema file is given
    Json,
}

/// One pipeline run described in YAML.
///
/// ```yaml
/// input_files: [articles.csv, groups.xlsx]
/// template_file: catalog.xml
/// output_file: out/catalog.xml
/// beautify_output: true
/// schema_file: bmecat_2005.xsd
/// key_mapping:
///   Sheet1_groups: groups
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub input_files: Vec<PathBuf>,
    pub template_file: PathBuf,
    pub output_file: PathBuf,
    #[serde(default)]
    pub beautify_output: bool,
    #[serde(default)]
    pub validation_type: Option<ValidationKind>,
    #[serde(default)]
    pub schema_file: Option<PathBuf>,
    #[serde(default)]
    pub key_mapping: BTreeMap<String, String>,
}

const MANDATORY_KEYS: [&str; 3] = ["input_files", "template_file", "output_file"];

impl RunConfig {
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(content)?;
        let missing: Vec<String> = MANDATORY_KEYS
            .iter()
            .filter(|key| raw.get(**key).map_or(true, |v| v.is_null()))
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingKeys(missing));
        }
        Ok(serde_yaml::from_value(raw)?)
    }

    /// Load a configuration file. Relative paths inside it are resolved
    /// against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.input_files.iter_mut().for_each(resolve);
        resolve(&mut self.template_file);
        resolve(&mut self.output_file);
        if let Some(schema) = self.schema_file.as_mut() {
            resolve(schema);
        }
    }

    /// Validation kind, inferred as XML when only a schema file is given.
    pub fn effective_validation(&self) -> Option<ValidationKind> {
        match (self.validation_type, &self.schema_file) {
            (Some(kind), _) => Some(kind),
            (None, Some(schema)) => match crate::models::extension_of(&schema.to_string_lossy()).as_str() {
                "json" => Some(ValidationKind::Json),
                _ => Some(ValidationKind::Xml),
            },
            (None, None) => None,
        }
    }
}

/// Parse `old=new` key mapping arguments.
pub fn parse_key_mapping<S: AsRef<str>>(entries: &[S]) -> ConfigResult<BTreeMap<String, String>> {
    entries
        .iter()
        .map(|entry| {
            let entry = entry.as_ref();
            match entry.split_once('=') {
                Some((old, new)) if !old.trim().is_empty() && !new.trim().is_empty() => {
                    Ok((old.trim().to_string(), new.trim().to_string()))
                }
                _ => Err(ConfigError::InvalidMapping(entry.to_string())),
            }
        })
        .collect()
}
