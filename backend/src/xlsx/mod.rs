//! Minimal XLSX workbook access.
//!
//! A workbook is a zip archive of SpreadsheetML parts. This module reads the
//! sheet list, shared strings and cell grids, lets callers overwrite cells,
//! and writes the archive back. Parts that were not modified are copied
//! verbatim, so styles, drawings and defined names survive a round trip.
//!
//! ```text
//! xl/workbook.xml              → sheet names + relationship ids
//! xl/_rels/workbook.xml.rels   → relationship id → worksheet part
//! xl/sharedStrings.xml         → string table for `t="s"` cells
//! xl/worksheets/sheetN.xml     → <sheetData> rows and cells
//! ```

mod sheet;

pub use sheet::{column_letters, parse_reference, CellValue, Worksheet};

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, Write};
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use sheet::attributes;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const CALC_CHAIN_PART: &str = "xl/calcChain.xml";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// Errors while reading or writing a workbook.
#[derive(Debug, Error)]
pub enum XlsxError {
    /// The container is not a readable zip archive.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A part contains malformed XML.
    #[error("XML error in {part}: {message}")]
    Xml { part: String, message: String },

    /// A mandatory part is missing.
    #[error("Missing workbook part: {0}")]
    MissingPart(String),

    /// IO error while reading or writing parts.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing a sheet failed.
    #[error("Failed to serialize sheet: {0}")]
    Format(#[from] std::fmt::Error),
}

/// An opened workbook.
pub struct Workbook {
    source: Vec<u8>,
    sheets: Vec<Worksheet>,
}

impl Workbook {
    /// Parse a workbook from its xlsx bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;

        let workbook_xml = read_part(&mut archive, WORKBOOK_PART)?
            .ok_or_else(|| XlsxError::MissingPart(WORKBOOK_PART.to_string()))?;
        let rels_xml = read_part(&mut archive, WORKBOOK_RELS_PART)?
            .ok_or_else(|| XlsxError::MissingPart(WORKBOOK_RELS_PART.to_string()))?;
        let shared_strings = match read_part(&mut archive, SHARED_STRINGS_PART)? {
            Some(xml) => parse_shared_strings(&xml)?,
            None => Vec::new(),
        };

        let targets = parse_relationships(&rels_xml)?;
        let mut sheets = Vec::new();
        for (name, rel_id) in parse_sheet_list(&workbook_xml)? {
            let Some(target) = targets.get(&rel_id) else {
                continue;
            };
            let part = resolve_target(target);
            let xml = read_part(&mut archive, &part)?
                .ok_or_else(|| XlsxError::MissingPart(part.clone()))?;
            sheets.push(Worksheet::parse(name, part, &xml, &shared_strings)?);
        }

        Ok(Self {
            source: bytes.to_vec(),
            sheets,
        })
    }

    /// Sheets in workbook order.
    pub fn sheets(&self) -> &[Worksheet] {
        &self.sheets
    }

    pub fn sheets_mut(&mut self) -> &mut [Worksheet] {
        &mut self.sheets
    }

    pub fn sheet(&self, name: &str) -> Option<&Worksheet> {
        self.sheets.iter().find(|s| s.name() == name)
    }

    /// Serialize the workbook, rewriting only the sheets that were modified.
    ///
    /// Once a sheet is rewritten the calculation chain may point at cells
    /// that no longer hold formulas, so it is dropped together with its
    /// relationship and content type. Excel rebuilds it on load.
    pub fn to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        let mut archive = ZipArchive::new(Cursor::new(self.source.as_slice()))?;
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options: FileOptions<'_, ()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);
        let dirty = self.sheets.iter().any(Worksheet::is_dirty);

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_string();
            if dirty && name == CALC_CHAIN_PART {
                continue;
            }
            if dirty && (name == WORKBOOK_RELS_PART || name == CONTENT_TYPES_PART) {
                let mut xml = String::new();
                file.read_to_string(&mut xml)?;
                drop(file);
                writer.start_file(name.as_str(), options)?;
                writer.write_all(strip_calc_chain(&name, &xml)?.as_bytes())?;
                continue;
            }
            match self.sheets.iter().find(|s| s.is_dirty() && s.part() == name) {
                Some(sheet) => {
                    drop(file);
                    writer.start_file(name, options)?;
                    writer.write_all(sheet.to_xml()?.as_bytes())?;
                }
                None => writer.raw_copy_file(file)?,
            }
        }

        Ok(writer.finish()?.into_inner())
    }
}

/// Copy `xml` without the elements that reference the calculation chain.
fn strip_calc_chain(part: &str, xml: &str) -> Result<String, XlsxError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = quick_xml::Writer::new(Vec::new());
    loop {
        let event = reader.read_event().map_err(|e| xml_error(part, e))?;
        match &event {
            Event::Eof => break,
            Event::Empty(e) if references_calc_chain(e).map_err(|e| xml_error(part, e))? => continue,
            Event::Start(e) if references_calc_chain(e).map_err(|e| xml_error(part, e))? => {
                let end = e.to_end().into_owned();
                reader.read_to_end(end.name()).map_err(|e| xml_error(part, e))?;
                continue;
            }
            _ => {}
        }
        writer.write_event(event).map_err(|e| xml_error(part, e))?;
    }
    String::from_utf8(writer.into_inner()).map_err(|e| xml_error(part, e))
}

fn references_calc_chain(e: &quick_xml::events::BytesStart<'_>) -> Result<bool, String> {
    let attrs = attributes(e)?;
    let value = |key: &str| attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
    Ok(match e.local_name().as_ref() {
        b"Relationship" => value("Type").is_some_and(|t| t.ends_with("/calcChain")),
        b"Override" => value("PartName") == Some("/xl/calcChain.xml"),
        _ => false,
    })
}

/// Read a part as UTF-8 text, `None` when absent.
fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, XlsxError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(Some(content))
}

/// Relationship targets are relative to `xl/` unless absolute.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn xml_error(part: &str, err: impl std::fmt::Display) -> XlsxError {
    XlsxError::Xml {
        part: part.to_string(),
        message: err.to_string(),
    }
}

/// `(sheet name, relationship id)` in workbook order.
fn parse_sheet_list(xml: &str) -> Result<Vec<(String, String)>, XlsxError> {
    let mut reader = Reader::from_str(xml);
    let mut sheets = Vec::new();
    loop {
        match reader.read_event().map_err(|e| xml_error(WORKBOOK_PART, e))? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"sheet" => {
                let attrs = attributes(e).map_err(|e| xml_error(WORKBOOK_PART, e))?;
                let name = attrs.iter().find(|(k, _)| k == "name").map(|(_, v)| v.clone());
                let rel_id = attrs
                    .iter()
                    .find(|(k, _)| k.ends_with(":id"))
                    .map(|(_, v)| v.clone());
                if let (Some(name), Some(rel_id)) = (name, rel_id) {
                    sheets.push((name, rel_id));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(sheets)
}

/// Relationship id → target path.
fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, XlsxError> {
    let mut reader = Reader::from_str(xml);
    let mut targets = HashMap::new();
    loop {
        match reader
            .read_event()
            .map_err(|e| xml_error(WORKBOOK_RELS_PART, e))?
        {
            Event::Start(ref e) | Event::Empty(ref e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let attrs = attributes(e).map_err(|e| xml_error(WORKBOOK_RELS_PART, e))?;
                let id = attrs.iter().find(|(k, _)| k == "Id").map(|(_, v)| v.clone());
                let target = attrs.iter().find(|(k, _)| k == "Target").map(|(_, v)| v.clone());
                if let (Some(id), Some(target)) = (id, target) {
                    targets.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(targets)
}

/// Shared string table. Rich-text runs are concatenated, phonetic runs skipped.
fn parse_shared_strings(xml: &str) -> Result<Vec<String>, XlsxError> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut phonetic_depth = 0usize;

    loop {
        match reader
            .read_event()
            .map_err(|e| xml_error(SHARED_STRINGS_PART, e))?
        {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => phonetic_depth += 1,
                b"t" if phonetic_depth == 0 => in_text = true,
                _ => {}
            },
            Event::Empty(ref e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(ref t) if in_text => {
                let text = t.unescape().map_err(|e| xml_error(SHARED_STRINGS_PART, e))?;
                if let Some(s) = current.as_mut() {
                    s.push_str(&text);
                }
            }
            Event::CData(ref c) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&String::from_utf8_lossy(c));
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"si" => {
                    if let Some(s) = current.take() {
                        strings.push(s);
                    }
                }
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Builds small workbooks for tests.

    use super::*;

    /// Build an xlsx where each sheet is a grid of strings starting at A1.
    ///
    /// Cells that parse as numbers are written as numeric cells, empty strings
    /// are left out, everything else goes through the shared string table.
    pub(crate) fn workbook(sheets: &[(&str, Vec<Vec<&str>>)]) -> Vec<u8> {
        let mut shared: Vec<String> = Vec::new();
        let mut sheet_parts = Vec::new();

        for (_, grid) in sheets {
            let mut xml = String::from(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
            );
            for (r, row) in grid.iter().enumerate() {
                let row_number = r + 1;
                xml.push_str(&format!(r#"<row r="{}">"#, row_number));
                for (c, value) in row.iter().enumerate() {
                    if value.is_empty() {
                        continue;
                    }
                    let reference = format!("{}{}", column_letters(c as u32 + 1), row_number);
                    if value.parse::<f64>().is_ok() {
                        xml.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, reference, value));
                    } else {
                        let idx = shared.len();
                        shared.push(value.to_string());
                        xml.push_str(&format!(r#"<c r="{}" t="s"><v>{}</v></c>"#, reference, idx));
                    }
                }
                xml.push_str("</row>");
            }
            xml.push_str("</sheetData></worksheet>");
            sheet_parts.push(xml);
        }

        let mut workbook = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
        );
        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (i, (name, _)) in sheets.iter().enumerate() {
            workbook.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                name,
                i + 1,
                i + 1
            ));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
                i + 1,
                i + 1
            ));
        }
        workbook.push_str("</sheets></workbook>");
        rels.push_str("</Relationships>");

        let mut strings = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">"#,
            shared.len()
        );
        for s in &shared {
            strings.push_str(&format!(
                "<si><t>{}</t></si>",
                quick_xml::escape::escape(s.as_str())
            ));
        }
        strings.push_str("</sst>");

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options: FileOptions<'_, ()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut add = |name: &str, content: &str| {
            writer.start_file(name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        };
        add(
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#,
        );
        add(WORKBOOK_PART, &workbook);
        add(WORKBOOK_RELS_PART, &rels);
        add(SHARED_STRINGS_PART, &strings);
        for (i, part) in sheet_parts.iter().enumerate() {
            add(&format!("xl/worksheets/sheet{}.xml", i + 1), part);
        }
        writer.finish().unwrap().into_inner()
    }
}
