//! XSD validation through libxml2.

use libxml::parser::Parser;
use libxml::schemas::{SchemaParserContext, SchemaValidationContext};

use super::{SchemaKind, ValidationReport};

fn describe(error: &libxml::error::StructuredError) -> String {
    let message = error
        .message
        .as_ref()
        .map(|m| m.trim().to_string())
        .unwrap_or_else(|| "unknown error".to_string());
    match error.line {
        Some(line) => format!("line {}: {}", line, message),
        None => message,
    }
}

/// Validate `xml` against the XSD in `schema`.
///
/// The schema is compiled from memory, so `xs:include` and `xs:import` with
/// relative locations resolve against the working directory.
pub fn validate(xml: &str, schema: &[u8], max_errors: usize) -> ValidationReport {
    let document = match Parser::default().parse_string(xml) {
        Ok(document) => document,
        Err(e) => return ValidationReport::ko("XMLSyntaxError", format!("{:?}", e)),
    };

    let mut schema_parser = SchemaParserContext::from_buffer(schema);
    let mut context = match SchemaValidationContext::from_parser(&mut schema_parser) {
        Ok(context) => context,
        Err(errors) => {
            let errors: Vec<String> = errors.iter().map(describe).collect();
            return ValidationReport::ko("XMLSchemaParseError", errors.join("\n"));
        }
    };

    match context.validate_document(&document) {
        Ok(()) => ValidationReport::passed(SchemaKind::Xsd),
        Err(errors) => {
            let errors: Vec<String> = errors.iter().map(describe).collect();
            ValidationReport::failed(SchemaKind::Xsd, &errors, max_errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_XSD: &str = r#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="catalog">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="item" maxOccurs="unbounded">
          <xs:complexType>
            <xs:attribute name="sku" type="xs:string" use="required"/>
            <xs:attribute name="price" type="xs:decimal"/>
          </xs:complexType>
        </xs:element>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

    #[test]
    fn test_xsd_ok() {
        let report = validate(
            r#"<catalog><item sku="A" price="1.5"/><item sku="B"/></catalog>"#,
            CATALOG_XSD.as_bytes(),
            100,
        );
        assert!(report.is_ok(), "{:?}", report);
        assert!(report.message.contains("(.XSD)"));
    }

    #[test]
    fn test_xsd_ko_is_capped() {
        let items: String = (0..5).map(|_| "<item/>").collect();
        let report = validate(&format!("<catalog>{}</catalog>", items), CATALOG_XSD.as_bytes(), 3);

        assert!(!report.is_ok());
        assert!(report.message.contains("Displaying 3 out of 5 errors"), "{}", report.message);
        assert_eq!(report.message.matches("'sku'").count(), 3);
    }

    #[test]
    fn test_broken_schema() {
        let report = validate("<catalog/>", b"<xs:schema", 100);
        assert_eq!(report.title, "XMLSchemaParseError");
    }
}
