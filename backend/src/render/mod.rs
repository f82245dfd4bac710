//! Template rendering.
//!
//! The template's extension selects the mode:
//!
//! - `.xlsx`: spreadsheet mode, see [`spreadsheet`]
//! - anything else: text mode, the whole template is evaluated once
//!
//! Both modes share one [`minijinja::Environment`] built by
//! [`environment::build_environment`].

pub mod environment;
pub mod extensions;
pub mod hierarchy;
pub mod plugins;
pub mod spreadsheet;

pub use environment::{build_environment, EnvironmentConfig};
pub use extensions::HierarchyCache;
pub use plugins::{PluginRegistry, TemplateFunctionPlugin, TemplatePlugin};

use minijinja::{Environment, Value};

use crate::error::{RenderError, RenderResult};
use crate::loader::csv::{decode_content, detect_encoding};
use crate::models::{OutputKind, RenderContext, RenderOutput, Upload};

/// Renders templates against a context.
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    pub fn new(config: &EnvironmentConfig) -> Self {
        Self {
            env: build_environment(config),
        }
    }

    pub fn environment(&self) -> &Environment<'static> {
        &self.env
    }

    /// Render `template` against every dataset of `context`.
    pub fn render(&self, template: &Upload, context: &RenderContext) -> RenderResult<RenderOutput> {
        self.render_as(template, context, &template.extension())
    }

    /// Like [`Renderer::render`], escaping text for `output_extension`
    /// instead of the template's own extension.
    pub fn render_as(
        &self,
        template: &Upload,
        context: &RenderContext,
        output_extension: &str,
    ) -> RenderResult<RenderOutput> {
        let ctx = Value::from_serialize(context);
        match OutputKind::from_extension(&template.extension()) {
            OutputKind::Text => {
                let source = decode_template(&template.bytes)?;
                let name = escape_name(template, output_extension);
                let text = self.env.render_named_str(&name, &source, ctx)?;
                Ok(RenderOutput::Text(text))
            }
            OutputKind::Spreadsheet => Ok(RenderOutput::Spreadsheet(
                spreadsheet::render_workbook(&self.env, &template.bytes, &ctx)?,
            )),
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(&EnvironmentConfig::default())
    }
}

/// Name the template is rendered under; its extension picks the escaping.
fn escape_name(template: &Upload, output_extension: &str) -> String {
    if template.extension() == output_extension.to_ascii_lowercase() {
        template.name.clone()
    } else {
        format!("{}.{}", template.name, output_extension)
    }
}

/// Template bytes to text, encoding auto-detected.
fn decode_template(bytes: &[u8]) -> RenderResult<String> {
    let encoding = detect_encoding(bytes);
    decode_content(bytes, &encoding).map_err(|e| RenderError::EncodingError(e.message))
}
