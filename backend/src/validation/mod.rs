//! Schema validation of rendered outputs.
//!
//! # Validation Modes
//!
//! ## XML
//! The schema kind comes from the schema file extension:
//! - `.dtd`: built-in validator, see [`dtd`]
//! - `.xsd`: libxml2, behind the `xsd` cargo feature
//!
//! ## JSON
//! The output must parse as JSON. With a `.json` schema file it is also
//! checked against that JSON Schema (draft auto-detected).
//!
//! # Reports
//!
//! A failed validation is not an error: it is a [`ValidationReport`] with
//! status `KO`. Only an unusable invocation (unknown schema extension,
//! missing schema) is a [`ValidationError`].
//!
//! ```rust,ignore
//! use jinjaxcat::models::Upload;
//! use jinjaxcat::validation::validate_xml;
//!
//! let schema = Upload::new("catalog.dtd", "<!ELEMENT catalog EMPTY>");
//! let report = validate_xml("<catalog/>", &schema, 100)?;
//! assert!(report.is_ok());
//! ```

pub mod dtd;
pub mod xml;
#[cfg(feature = "xsd")]
pub mod xsd;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::logs::{log_error, log_success};
use crate::config::ValidationKind;
use crate::error::{ConfigError, ValidationError};
use crate::models::{extension_of, Upload};

/// Validation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "KO")]
    Ko,
}

/// Outcome of a validation, reported independently of the written output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub title: String,
    pub message: String,
}

impl ValidationReport {
    pub fn ok(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Ok,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn ko(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Ko,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ValidationStatus::Ok
    }

    /// OK report naming the schema kind.
    pub fn passed(kind: SchemaKind) -> Self {
        Self::ok(
            "Validation Passed",
            format!(
                "The {} output successfully matches the specified ({}) schema.",
                kind.document(),
                kind.label()
            ),
        )
    }

    /// KO report listing at most `max_errors` of `errors`.
    pub fn failed(kind: SchemaKind, errors: &[String], max_errors: usize) -> Self {
        let shown = errors.len().min(max_errors);
        let listed: Vec<String> = errors[..shown].iter().map(|e| format!("- {}", e)).collect();
        Self::ko(
            "Validation Failed",
            format!(
                "The {} output does not conform to the specified ({}) schema!\n\nDisplaying {} out of {} errors in the output file:\n\n{}",
                kind.document(),
                kind.label(),
                shown,
                errors.len(),
                listed.join("\n")
            ),
        )
    }
}

/// Schema languages, keyed by schema file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Dtd,
    Xsd,
    JsonSchema,
}

impl SchemaKind {
    pub fn from_file_name(name: &str) -> Result<Self, ConfigError> {
        match extension_of(name).as_str() {
            "dtd" => Ok(SchemaKind::Dtd),
            "xsd" => Ok(SchemaKind::Xsd),
            "json" => Ok(SchemaKind::JsonSchema),
            other => Err(ConfigError::UnrecognizedSchema(format!(".{}", other))),
        }
    }

    /// `(.DTD)`-style label used in reports.
    pub fn label(self) -> &'static str {
        match self {
            SchemaKind::Dtd => ".DTD",
            SchemaKind::Xsd => ".XSD",
            SchemaKind::JsonSchema => ".JSON",
        }
    }

    fn document(self) -> &'static str {
        match self {
            SchemaKind::Dtd | SchemaKind::Xsd => "XML",
            SchemaKind::JsonSchema => "JSON",
        }
    }
}

fn schema_text(schema: &Upload) -> String {
    let text = String::from_utf8_lossy(&schema.bytes);
    text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
}

/// Validate XML output against a DTD or XSD.
pub fn validate_xml(xml: &str, schema: &Upload, max_errors: usize) -> Result<ValidationReport, ValidationError> {
    let kind = SchemaKind::from_file_name(&schema.name)?;

    match kind {
        SchemaKind::Dtd => {
            let document = match xml::parse_document(xml) {
                Ok(document) => document,
                Err(e) => return Ok(ValidationReport::ko("XMLSyntaxError", e.to_string())),
            };
            let dtd = match dtd::Dtd::parse(&schema_text(schema)) {
                Ok(dtd) => dtd,
                Err(e) => return Ok(ValidationReport::ko("DTDParseError", e.to_string())),
            };
            let errors = dtd.validate(&document);
            if errors.is_empty() {
                Ok(ValidationReport::passed(kind))
            } else {
                Ok(ValidationReport::failed(kind, &errors, max_errors))
            }
        }
        SchemaKind::Xsd => validate_xsd(xml, schema, max_errors),
        SchemaKind::JsonSchema => Err(ConfigError::UnrecognizedSchema(".json".to_string()).into()),
    }
}

#[cfg(feature = "xsd")]
fn validate_xsd(xml: &str, schema: &Upload, max_errors: usize) -> Result<ValidationReport, ValidationError> {
    if let Err(e) = xml::parse_document(xml) {
        return Ok(ValidationReport::ko("XMLSyntaxError", e.to_string()));
    }
    Ok(xsd::validate(xml, &schema.bytes, max_errors))
}

#[cfg(not(feature = "xsd"))]
fn validate_xsd(_xml: &str, _schema: &Upload, _max_errors: usize) -> Result<ValidationReport, ValidationError> {
    Err(ValidationError::Unavailable("XSD".to_string()))
}

/// Errors of `data` against a JSON Schema, `Err` when the schema itself is invalid.
pub fn json_schema_errors(schema: &Value, data: &Value) -> Result<Vec<String>, String> {
    let validator = jsonschema::validator_for(schema).map_err(|e| format!("Invalid schema: {}", e))?;
    Ok(validator.iter_errors(data).map(|e| e.to_string()).collect())
}

/// Validate JSON output, optionally against a JSON Schema.
pub fn validate_json(text: &str, schema: Option<&Upload>, max_errors: usize) -> Result<ValidationReport, ValidationError> {
    let data: Value = match serde_json::from_str(text) {
        Ok(data) => data,
        Err(e) => return Ok(ValidationReport::ko("JSONDecodeError", e.to_string())),
    };
    let Some(schema) = schema else {
        return Ok(ValidationReport::ok("Validation Passed", "The output is well-formed JSON."));
    };

    let kind = SchemaKind::from_file_name(&schema.name)?;
    if kind != SchemaKind::JsonSchema {
        return Err(ConfigError::UnrecognizedSchema(kind.label().to_lowercase()).into());
    }
    let schema_value: Value = match serde_json::from_str(&schema_text(schema)) {
        Ok(value) => value,
        Err(e) => return Ok(ValidationReport::ko("SchemaError", format!("Invalid schema: {}", e))),
    };

    match json_schema_errors(&schema_value, &data) {
        Err(message) => Ok(ValidationReport::ko("SchemaError", message)),
        Ok(errors) if errors.is_empty() => Ok(ValidationReport::passed(kind)),
        Ok(errors) => Ok(ValidationReport::failed(kind, &errors, max_errors)),
    }
}

/// Validate an output as requested and log the report.
pub fn validate_output(
    text: &str,
    kind: ValidationKind,
    schema: Option<&Upload>,
    max_errors: usize,
) -> Result<ValidationReport, ValidationError> {
    let report = match kind {
        ValidationKind::Xml => {
            let schema = schema.ok_or(ConfigError::MissingSchema)?;
            validate_xml(text, schema, max_errors)?
        }
        ValidationKind::Json => validate_json(text, schema, max_errors)?,
    };

    if report.is_ok() {
        log_success(&report.message);
    } else {
        log_error(format!("{}: {}", report.title, report.message));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DTD: &str = "<!ELEMENT catalog (item*)>\n<!ELEMENT item EMPTY>\n<!ATTLIST item sku CDATA #REQUIRED>";

    #[test]
    fn test_dtd_ok() {
        let schema = Upload::new("catalog.dtd", DTD);
        let report = validate_xml("<catalog><item sku=\"A\"/></catalog>", &schema, 100).unwrap();

        assert!(report.is_ok());
        assert_eq!(report.title, "Validation Passed");
        assert_eq!(
            report.message,
            "The XML output successfully matches the specified (.DTD) schema."
        );
    }

    #[test]
    fn test_dtd_ko_is_capped() {
        let schema = Upload::new("catalog.dtd", DTD);
        let items: String = (0..5).map(|_| "<item/>").collect();
        let report = validate_xml(&format!("<catalog>{}</catalog>", items), &schema, 2).unwrap();

        assert_eq!(report.status, ValidationStatus::Ko);
        assert!(report.message.contains("Displaying 2 out of 5 errors"));
        assert_eq!(report.message.matches("does not carry attribute sku").count(), 2);
    }

    #[test]
    fn test_syntax_error_is_a_report() {
        let schema = Upload::new("catalog.dtd", DTD);
        let report = validate_xml("<catalog><item></catalog>", &schema, 100).unwrap();
        assert_eq!(report.title, "XMLSyntaxError");
    }

    #[test]
    fn test_broken_dtd_is_a_report() {
        let schema = Upload::new("catalog.dtd", "<!ELEMENT catalog (a | b, c)>");
        let report = validate_xml("<catalog/>", &schema, 100).unwrap();
        assert_eq!(report.title, "DTDParseError");
    }

    #[test]
    fn test_unknown_schema_extension() {
        let schema = Upload::new("catalog.rng", "");
        let err = validate_xml("<catalog/>", &schema, 100).unwrap_err();
        assert_eq!(err.to_string(), "Invalid file extension for validation: .rng");
    }

    #[test]
    fn test_xml_without_schema() {
        let err = validate_output("<a/>", ValidationKind::Xml, None, 100).unwrap_err();
        assert!(matches!(err, ValidationError::Config(ConfigError::MissingSchema)));
    }

    #[test]
    fn test_json_syntax() {
        let ok = validate_json("{\"a\": [1, 2]}", None, 100).unwrap();
        assert!(ok.is_ok());

        let ko = validate_json("{\"a\": }", None, 100).unwrap();
        assert_eq!(ko.title, "JSONDecodeError");
    }

    #[test]
    fn test_json_schema() {
        let schema = Upload::new(
            "items.json",
            r#"{"type": "array", "items": {"type": "object", "required": ["sku"]}}"#,
        );
        let ok = validate_json(r#"[{"sku": "A"}]"#, Some(&schema), 100).unwrap();
        assert!(ok.is_ok());
        assert!(ok.message.contains("(.JSON)"));

        let ko = validate_json(r#"[{"sku": "A"}, {}, {"name": 1}]"#, Some(&schema), 100).unwrap();
        assert!(!ko.is_ok());
        assert!(ko.message.contains("Displaying 2 out of 2 errors"));
    }

    #[test]
    fn test_report_serialization() {
        let json = serde_json::to_value(ValidationReport::ko("Validation Failed", "x")).unwrap();
        assert_eq!(json["status"], "KO");
    }
}
