//! Optional reformatting of text outputs.
//!
//! | extension | formatter |
//! |-----------|-----------|
//! | `xml`     | re-indented with two spaces, declaration kept or added |
//! | `csv`     | rows padded to the widest row, cells trimmed, blank rows dropped |
//!
//! Formatting never fails the pipeline: [`beautify`] keeps the original text
//! when the formatter rejects it and reports why in a [`PrettifyStatus`].

use quick_xml::events::{BytesDecl, Event};
use quick_xml::{Reader, Writer};

use crate::api::logs::{log_success, log_warning};
use crate::error::PrettifyError;
use crate::models::PrettifyStatus;

/// Indentation width of prettified XML.
const XML_INDENT: usize = 2;

/// Formatters known by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formatter {
    Xml,
    Csv,
}

impl Formatter {
    pub fn for_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "xml" => Some(Formatter::Xml),
            "csv" => Some(Formatter::Csv),
            _ => None,
        }
    }

    pub fn format(self, content: &str) -> Result<String, PrettifyError> {
        match self {
            Formatter::Xml => prettify_xml(content),
            Formatter::Csv => prettify_csv(content),
        }
    }
}

/// Prettify `content` when a formatter exists for `extension`.
///
/// Returns the text to write and what happened to it.
pub fn beautify(content: String, extension: &str) -> (String, PrettifyStatus) {
    let Some(formatter) = Formatter::for_extension(extension) else {
        log_warning(format!("No beautifier for '.{}' outputs, output written as is", extension));
        return (content, PrettifyStatus::Skipped);
    };

    match formatter.format(&content) {
        Ok(pretty) => {
            log_success("Output beautified");
            (pretty, PrettifyStatus::Applied)
        }
        Err(e) => {
            log_warning(format!("Could not beautify the output, original retained: {}", e));
            (content, PrettifyStatus::Failed(e.to_string()))
        }
    }
}

fn invalid_xml(reader: &Reader<&[u8]>, message: impl std::fmt::Display) -> PrettifyError {
    PrettifyError::InvalidXml(format!("{} (at byte {})", message, reader.buffer_position()))
}

/// Re-indent a well-formed XML document.
///
/// Whitespace-only text nodes are dropped, mixed text stays on its element's
/// line. A document without declaration gets `<?xml version="1.0" encoding="UTF-8"?>`.
pub fn prettify_xml(content: &str) -> Result<String, PrettifyError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', XML_INDENT);
    let mut depth = 0usize;
    let mut roots = 0usize;
    let mut seen_decl = false;
    let mut started = false;

    loop {
        let event = reader.read_event().map_err(|e| invalid_xml(&reader, e))?;

        match &event {
            Event::Eof => break,
            Event::Decl(_) => {
                if started {
                    return Err(invalid_xml(&reader, "XML declaration not at start of document"));
                }
                seen_decl = true;
            }
            Event::Start(e) | Event::Empty(e) => {
                if depth == 0 {
                    roots += 1;
                    if roots > 1 {
                        return Err(invalid_xml(&reader, "junk after document element"));
                    }
                }
                for attr in e.attributes() {
                    let attr = attr.map_err(|err| invalid_xml(&reader, err))?;
                    attr.unescape_value().map_err(|err| invalid_xml(&reader, err))?;
                }
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Text(t) => {
                if depth == 0 {
                    return Err(invalid_xml(&reader, "text outside the document element"));
                }
                t.unescape().map_err(|err| invalid_xml(&reader, err))?;
            }
            _ => {}
        }

        if !started && !seen_decl {
            writer
                .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
                .map_err(|e| PrettifyError::InvalidXml(e.to_string()))?;
        }
        started = true;

        writer
            .write_event(event)
            .map_err(|e| PrettifyError::InvalidXml(e.to_string()))?;
    }

    if depth != 0 {
        return Err(invalid_xml(&reader, "unclosed element at end of document"));
    }
    if roots == 0 {
        return Err(invalid_xml(&reader, "no element found"));
    }

    let pretty = String::from_utf8(writer.into_inner())
        .map_err(|e| PrettifyError::InvalidXml(e.to_string()))?;
    Ok(pretty
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Delimiters recognised on the header row.
const CSV_DELIMITERS: [char; 5] = [',', ';', '\t', '|', ':'];

/// Align a delimited text on its widest row.
///
/// The delimiter is the most frequent candidate of the header row. Cells are
/// split on it without quote handling, so every line keeps its own content.
pub fn prettify_csv(content: &str) -> Result<String, PrettifyError> {
    let rows: Vec<&str> = content.trim().split('\n').collect();
    let header = rows.first().copied().unwrap_or_default();

    let delimiter = CSV_DELIMITERS
        .iter()
        .map(|&c| (c, header.matches(c).count()))
        .filter(|&(_, n)| n > 0)
        .fold(None, |acc: Option<(char, usize)>, (c, n)| match acc {
            Some((_, best)) if best >= n => acc,
            _ => Some((c, n)),
        })
        .map(|(c, _)| c)
        .ok_or_else(|| PrettifyError::InvalidCsv("could not determine delimiter".to_string()))?;

    let width = rows
        .iter()
        .map(|row| row.split(delimiter).count())
        .max()
        .unwrap_or(0);

    let separator = delimiter.to_string();
    let formatted: Vec<String> = rows
        .iter()
        .map(|row| {
            let mut cells: Vec<&str> = row.split(delimiter).map(str::trim).collect();
            cells.resize(width, "");
            cells
        })
        .filter(|cells| cells.iter().any(|c| !c.is_empty()))
        .map(|cells| cells.join(&separator))
        .collect();

    Ok(formatted.join("\n"))
}
