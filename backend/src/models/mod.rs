//! Domain models shared across the pipeline.
//!
//! - [`Upload`]: a named, byte-bearing input (data file or template)
//! - [`RenderContext`]: dataset name → dataset, handed to templates wholesale
//! - [`RenderOutput`]: the rendered artifact, text or workbook bytes
//! - [`PrettifyStatus`]: outcome of the optional beautify pass

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Rendering context: every dataset of one invocation keyed by its name.
pub type RenderContext = Map<String, Value>;

/// A file handed to the pipeline, either from disk or from a multipart upload.
#[derive(Debug, Clone)]
pub struct Upload {
    /// File name including extension (no directories).
    pub name: String,
    /// Raw content.
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, keeping only its base name.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(Self { name, bytes })
    }

    /// Lowercased extension without the dot (`"csv"`, `"xlsx"`, ...).
    pub fn extension(&self) -> String {
        extension_of(&self.name)
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(0) | None => &self.name,
            Some(idx) => &self.name[..idx],
        }
    }

    /// Dataset name derived from the file name (`"my file-2.csv"` → `"my_file_2"`).
    pub fn dataset_name(&self) -> String {
        normalize_name(self.stem())
    }
}

/// Lowercased extension of a file name, without the dot.
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9A-Za-z]+").unwrap());

/// Replace runs of non-alphanumeric characters by `_` and trim the ends.
pub fn normalize_name(raw: &str) -> String {
    NON_ALNUM
        .replace_all(raw, "_")
        .trim_matches('_')
        .to_string()
}

/// Shape of a rendered artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Any text format (xml, csv, json, txt, html, ...).
    Text,
    /// A binary xlsx workbook.
    Spreadsheet,
}

impl OutputKind {
    /// Spreadsheet for `xlsx`, text for everything else.
    pub fn from_extension(extension: &str) -> Self {
        if extension.eq_ignore_ascii_case("xlsx") {
            OutputKind::Spreadsheet
        } else {
            OutputKind::Text
        }
    }
}

/// Result of rendering a template.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutput {
    /// Flat text output.
    Text(String),
    /// Serialized xlsx workbook.
    Spreadsheet(Vec<u8>),
}

impl RenderOutput {
    pub fn kind(&self) -> OutputKind {
        match self {
            RenderOutput::Text(_) => OutputKind::Text,
            RenderOutput::Spreadsheet(_) => OutputKind::Spreadsheet,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RenderOutput::Text(text) => Some(text),
            RenderOutput::Spreadsheet(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RenderOutput::Text(text) => text.as_bytes(),
            RenderOutput::Spreadsheet(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            RenderOutput::Text(text) => text.into_bytes(),
            RenderOutput::Spreadsheet(bytes) => bytes,
        }
    }
}

/// Outcome of the optional prettify pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum PrettifyStatus {
    /// Output was reformatted.
    Applied,
    /// Not requested, or no formatter for this extension.
    Skipped,
    /// Could not beautify, original retained.
    Failed(String),
}
