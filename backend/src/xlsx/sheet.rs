//! Worksheet model.
//!
//! Only `<sheetData>` is modeled. Everything before and after it (columns,
//! merged cells, page setup, ...) is kept as raw XML and written back as is.
//! Each cell keeps its original inner XML, so formulas and untouched values
//! survive until the cell is overwritten.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::XlsxError;

/// Value held by a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Error(String),
}

impl CellValue {
    /// Display form used when a cell is read as a string.
    ///
    /// Integral numbers have no fractional part, booleans are `TRUE`/`FALSE`.
    pub fn to_display_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(text) => text.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(true) => "TRUE".to_string(),
            CellValue::Bool(false) => "FALSE".to_string(),
            CellValue::Error(code) => code.clone(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[derive(Debug, Clone, Default)]
struct Row {
    attrs: Vec<(String, String)>,
    cells: BTreeMap<u32, Cell>,
}

#[derive(Debug, Clone)]
struct Cell {
    /// Attributes other than `r` and `t` (style index, ...).
    attrs: Vec<(String, String)>,
    cell_type: Option<String>,
    /// Raw XML between `<c>` and `</c>`.
    inner: String,
    value: CellValue,
}

impl Cell {
    fn empty() -> Self {
        Self {
            attrs: Vec::new(),
            cell_type: None,
            inner: String::new(),
            value: CellValue::Empty,
        }
    }
}

/// One sheet of a workbook.
#[derive(Debug, Clone)]
pub struct Worksheet {
    name: String,
    part: String,
    prefix: String,
    suffix: String,
    /// Namespace prefix of SpreadsheetML elements, e.g. `"x:"`, usually empty.
    tag_prefix: String,
    rows: BTreeMap<u32, Row>,
    dirty: bool,
}

/// Cell being read.
struct CellBuilder {
    col: u32,
    attrs: Vec<(String, String)>,
    cell_type: Option<String>,
    inner_start: usize,
    raw_value: String,
    inline_text: String,
    in_value: bool,
    in_text: bool,
}

impl CellBuilder {
    fn open(e: &BytesStart<'_>, inner_start: usize, last_col: &mut u32) -> Result<Self, String> {
        let mut col = None;
        let mut cell_type = None;
        let mut attrs = Vec::new();
        for (key, value) in attributes(e)? {
            match key.as_str() {
                "r" => col = parse_reference(&value).map(|(c, _)| c),
                "t" => cell_type = Some(value),
                _ => attrs.push((key, value)),
            }
        }
        let col = col.unwrap_or(*last_col + 1);
        *last_col = col;
        Ok(Self {
            col,
            attrs,
            cell_type,
            inner_start,
            raw_value: String::new(),
            inline_text: String::new(),
            in_value: false,
            in_text: false,
        })
    }

    fn finish(self, inner: String, shared: &[String]) -> (u32, Cell) {
        let raw = self.raw_value;
        let value = match self.cell_type.as_deref() {
            Some("s") => raw
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|idx| shared.get(idx).cloned())
                .map(CellValue::Text)
                .unwrap_or(CellValue::Empty),
            Some("inlineStr") => CellValue::Text(self.inline_text),
            Some("str") | Some("d") => CellValue::Text(raw),
            Some("b") => CellValue::Bool(raw.trim() == "1"),
            Some("e") => CellValue::Error(raw),
            _ if raw.trim().is_empty() => CellValue::Empty,
            _ => match raw.trim().parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::Text(raw),
            },
        };
        (
            self.col,
            Cell {
                attrs: self.attrs,
                cell_type: self.cell_type,
                inner,
                value,
            },
        )
    }
}

impl Worksheet {
    pub(crate) fn parse(
        name: String,
        part: String,
        xml: &str,
        shared: &[String],
    ) -> Result<Self, XlsxError> {
        let xml_err = |message: String| XlsxError::Xml {
            part: part.clone(),
            message,
        };

        let mut reader = Reader::from_str(xml);
        let mut rows: BTreeMap<u32, Row> = BTreeMap::new();
        let mut prefix_end = None;
        let mut suffix_start = None;
        let mut tag_prefix = String::new();
        let mut current_row: Option<(u32, Row)> = None;
        let mut current_cell: Option<CellBuilder> = None;
        let mut last_row = 0u32;
        let mut last_col = 0u32;

        loop {
            let before = reader.buffer_position() as usize;
            let event = reader.read_event().map_err(|e| xml_err(e.to_string()))?;
            let after = reader.buffer_position() as usize;

            match event {
                Event::Start(ref e) if e.local_name().as_ref() == b"sheetData" => {
                    tag_prefix = qualified_prefix(e.name().as_ref());
                    prefix_end = Some(before);
                }
                Event::Empty(ref e) if e.local_name().as_ref() == b"sheetData" => {
                    tag_prefix = qualified_prefix(e.name().as_ref());
                    prefix_end = Some(before);
                    suffix_start = Some(after);
                }
                Event::End(ref e) if e.local_name().as_ref() == b"sheetData" => {
                    suffix_start = Some(after);
                }
                Event::Start(ref e) if e.local_name().as_ref() == b"row" => {
                    current_row = Some(open_row(e, &mut last_row).map_err(&xml_err)?);
                    last_col = 0;
                }
                Event::Empty(ref e) if e.local_name().as_ref() == b"row" => {
                    let (number, row) = open_row(e, &mut last_row).map_err(&xml_err)?;
                    rows.insert(number, row);
                }
                Event::End(ref e) if e.local_name().as_ref() == b"row" => {
                    if let Some((number, row)) = current_row.take() {
                        rows.insert(number, row);
                    }
                }
                Event::Start(ref e) if e.local_name().as_ref() == b"c" => {
                    current_cell =
                        Some(CellBuilder::open(e, after, &mut last_col).map_err(&xml_err)?);
                }
                Event::Empty(ref e) if e.local_name().as_ref() == b"c" => {
                    let builder = CellBuilder::open(e, after, &mut last_col).map_err(&xml_err)?;
                    let (col, cell) = builder.finish(String::new(), shared);
                    if let Some((_, row)) = current_row.as_mut() {
                        row.cells.insert(col, cell);
                    }
                }
                Event::End(ref e) if e.local_name().as_ref() == b"c" => {
                    if let Some(builder) = current_cell.take() {
                        let inner = xml[builder.inner_start..before].to_string();
                        let (col, cell) = builder.finish(inner, shared);
                        if let Some((_, row)) = current_row.as_mut() {
                            row.cells.insert(col, cell);
                        }
                    }
                }
                Event::Start(ref e) => {
                    if let Some(builder) = current_cell.as_mut() {
                        match e.local_name().as_ref() {
                            b"v" => builder.in_value = true,
                            b"t" => builder.in_text = true,
                            _ => {}
                        }
                    }
                }
                Event::End(ref e) => {
                    if let Some(builder) = current_cell.as_mut() {
                        match e.local_name().as_ref() {
                            b"v" => builder.in_value = false,
                            b"t" => builder.in_text = false,
                            _ => {}
                        }
                    }
                }
                Event::Text(ref t) => {
                    if let Some(builder) = current_cell.as_mut() {
                        if builder.in_value || builder.in_text {
                            let text = t.unescape().map_err(|e| xml_err(e.to_string()))?;
                            if builder.in_value {
                                builder.raw_value.push_str(&text);
                            } else {
                                builder.inline_text.push_str(&text);
                            }
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let (Some(prefix_end), Some(suffix_start)) = (prefix_end, suffix_start) else {
            return Err(XlsxError::MissingPart(format!("sheetData in {}", part)));
        };

        Ok(Self {
            prefix: xml[..prefix_end].to_string(),
            suffix: xml[suffix_start..].to_string(),
            name,
            part,
            tag_prefix,
            rows,
            dirty: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Zip entry name of this sheet.
    pub fn part(&self) -> &str {
        &self.part
    }

    /// Whether a cell was modified since loading.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Value at a 1-based `(row, col)`, `None` when the cell does not exist.
    pub fn cell(&self, row: u32, col: u32) -> Option<&CellValue> {
        self.rows.get(&row)?.cells.get(&col).map(|c| &c.value)
    }

    /// Text value at `(row, col)`; numbers and booleans return `None`.
    pub fn cell_text(&self, row: u32, col: u32) -> Option<&str> {
        self.cell(row, col)?.as_text()
    }

    /// Rows in order, each with its non-missing cells in column order.
    pub fn rows(&self) -> Vec<(u32, Vec<(u32, &CellValue)>)> {
        self.rows
            .iter()
            .map(|(number, row)| {
                let cells = row.cells.iter().map(|(col, c)| (*col, &c.value)).collect();
                (*number, cells)
            })
            .collect()
    }

    /// Overwrite a cell, keeping its style.
    pub fn set_cell(&mut self, row: u32, col: u32, value: CellValue) {
        let p = &self.tag_prefix;
        let cell = self
            .rows
            .entry(row)
            .or_default()
            .cells
            .entry(col)
            .or_insert_with(Cell::empty);

        match &value {
            CellValue::Empty => {
                cell.cell_type = None;
                cell.inner.clear();
            }
            CellValue::Text(text) => {
                cell.cell_type = Some("inlineStr".to_string());
                cell.inner = format!(
                    "<{p}is><{p}t xml:space=\"preserve\">{}</{p}t></{p}is>",
                    escape(text.as_str())
                );
            }
            CellValue::Number(n) => {
                cell.cell_type = None;
                cell.inner = format!("<{p}v>{}</{p}v>", n);
            }
            CellValue::Bool(b) => {
                cell.cell_type = Some("b".to_string());
                cell.inner = format!("<{p}v>{}</{p}v>", u8::from(*b));
            }
            CellValue::Error(code) => {
                cell.cell_type = Some("e".to_string());
                cell.inner = format!("<{p}v>{}</{p}v>", escape(code.as_str()));
            }
        }
        cell.value = value;
        self.dirty = true;
    }

    /// Serialize the sheet part.
    pub(crate) fn to_xml(&self) -> Result<String, std::fmt::Error> {
        let p = &self.tag_prefix;
        let mut out = String::with_capacity(self.prefix.len() + self.suffix.len() + 1024);
        out.push_str(&self.prefix);

        if self.rows.is_empty() {
            write!(out, "<{p}sheetData/>")?;
        } else {
            write!(out, "<{p}sheetData>")?;
            for (number, row) in &self.rows {
                write!(out, "<{p}row r=\"{}\"{}>", number, format_attrs(&row.attrs))?;
                for (col, cell) in &row.cells {
                    write!(
                        out,
                        "<{p}c r=\"{}{}\"{}",
                        column_letters(*col),
                        number,
                        format_attrs(&cell.attrs)
                    )?;
                    if let Some(t) = &cell.cell_type {
                        write!(out, " t=\"{}\"", escape(t.as_str()))?;
                    }
                    if cell.inner.is_empty() {
                        out.push_str("/>");
                    } else {
                        write!(out, ">{}</{p}c>", cell.inner)?;
                    }
                }
                write!(out, "</{p}row>")?;
            }
            write!(out, "</{p}sheetData>")?;
        }

        out.push_str(&self.suffix);
        Ok(out)
    }
}

fn open_row(e: &BytesStart<'_>, last_row: &mut u32) -> Result<(u32, Row), String> {
    let mut number = None;
    let mut attrs = Vec::new();
    for (key, value) in attributes(e)? {
        match key.as_str() {
            "r" => number = value.trim().parse::<u32>().ok(),
            // spans go stale once cells are added
            "spans" => {}
            _ => attrs.push((key, value)),
        }
    }
    let number = number.unwrap_or(*last_row + 1);
    *last_row = number;
    Ok((
        number,
        Row {
            attrs,
            cells: BTreeMap::new(),
        },
    ))
}

fn format_attrs(attrs: &[(String, String)]) -> String {
    attrs
        .iter()
        .map(|(k, v)| format!(" {}=\"{}\"", k, escape(v.as_str())))
        .collect()
}

fn qualified_prefix(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    match name.find(':') {
        Some(idx) => name[..=idx].to_string(),
        None => String::new(),
    }
}

/// Decoded `(key, value)` attribute pairs.
pub(crate) fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, String> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| err.to_string())?
            .into_owned();
        out.push((key, value));
    }
    Ok(out)
}

/// `"B12"` → `(2, 12)`, both 1-based.
pub fn parse_reference(reference: &str) -> Option<(u32, u32)> {
    let reference = reference.trim().trim_start_matches('$');
    let split = reference.find(|c: char| !c.is_ascii_alphabetic())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() {
        return None;
    }
    let mut col = 0u32;
    for c in letters.chars() {
        col = col
            .checked_mul(26)?
            .checked_add(c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
    }
    let row = digits.trim_start_matches('$').parse::<u32>().ok()?;
    Some((col, row))
}

/// 1-based column index to letters (`1` → `A`, `27` → `AA`).
pub fn column_letters(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = ((col - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        col = (col - 1) / 26;
    }
    letters.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="urn:x"><cols><col min="1" max="1"/></cols><sheetData><row r="1" spans="1:3"><c r="A1" s="3" t="inlineStr"><is><t>{{ a }}</t></is></c><c r="C1"><f>SUM(1,2)</f><v>3</v></c></row><row r="4"><c r="B4" t="b"><v>1</v></c></row></sheetData><mergeCells count="0"/></worksheet>"#;

    #[test]
    fn test_references() {
        assert_eq!(parse_reference("A1"), Some((1, 1)));
        assert_eq!(parse_reference("AA10"), Some((27, 10)));
        assert_eq!(parse_reference("$C$7"), Some((3, 7)));
        assert_eq!(parse_reference("12"), None);
        assert_eq!(column_letters(1), "A");
        assert_eq!(column_letters(26), "Z");
        assert_eq!(column_letters(28), "AB");
    }

    #[test]
    fn test_oversized_column_is_rejected() {
        assert_eq!(parse_reference("MWLQKWU1"), Some((u32::MAX, 1)));
        assert_eq!(parse_reference("MWLQKWV1"), None);
        assert_eq!(parse_reference("ZZZZZZZZ1"), None);
    }

    #[test]
    fn test_parse_cells() {
        let sheet = Worksheet::parse("S".into(), "xl/worksheets/sheet1.xml".into(), SHEET, &[])
            .unwrap();
        assert_eq!(sheet.cell_text(1, 1), Some("{{ a }}"));
        assert_eq!(sheet.cell(1, 3), Some(&CellValue::Number(3.0)));
        assert_eq!(sheet.cell(4, 2), Some(&CellValue::Bool(true)));
        assert_eq!(sheet.cell(2, 1), None);
        assert!(!sheet.is_dirty());
    }

    #[test]
    fn test_write_preserves_surroundings_and_style() {
        let mut sheet =
            Worksheet::parse("S".into(), "xl/worksheets/sheet1.xml".into(), SHEET, &[]).unwrap();
        sheet.set_cell(1, 1, CellValue::Text("x < y".into()));
        let xml = sheet.to_xml().unwrap();

        assert!(xml.contains(r#"<cols><col min="1" max="1"/></cols>"#));
        assert!(xml.ends_with(r#"<mergeCells count="0"/></worksheet>"#));
        assert!(xml.contains(r#"<c r="A1" s="3" t="inlineStr"><is><t xml:space="preserve">x &lt; y</t></is></c>"#));
        assert!(xml.contains("<f>SUM(1,2)</f>"));
        assert!(!xml.contains("spans"));
    }

    #[test]
    fn test_display_strings() {
        assert_eq!(CellValue::Number(42.0).to_display_string(), "42");
        assert_eq!(CellValue::Number(2.5).to_display_string(), "2.5");
        assert_eq!(CellValue::Bool(false).to_display_string(), "FALSE");
        assert_eq!(CellValue::Empty.to_display_string(), "");
    }
}
