//! CSV to JSON records with encoding and delimiter auto-detection.
//!
//! Every record is a JSON object keyed by header, every value a string.

use serde_json::{Map, Value};

use crate::api::logs::log_warning;

/// Delimiters tried by the sniffer, in tie-break order.
const DELIMITER_CANDIDATES: [char; 5] = [',', ';', '\t', '|', ':'];

/// Lines looked at by the sniffer.
const SNIFF_LINES: usize = 5;

/// CSV parsing error with context
#[derive(Debug, Clone)]
pub struct CsvError {
    pub line: usize,
    pub column: Option<String>,
    pub value: Option<String>,
    pub message: String,
}

impl std::fmt::Display for CsvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.column, &self.value) {
            (Some(col), Some(val)) => {
                write!(f, "Line {}, column '{}' (value '{}'): {}", self.line, col, val, self.message)
            }
            (Some(col), None) => {
                write!(f, "Line {}, column '{}': {}", self.line, col, self.message)
            }
            _ => {
                write!(f, "Line {}: {}", self.line, self.message)
            }
        }
    }
}

impl std::error::Error for CsvError {}

impl CsvError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column: None,
            value: None,
            message: message.into(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    fn from_csv(err: &csv::Error) -> Self {
        let line = err.position().map(|p| p.line() as usize).unwrap_or(0);
        Self::new(line, err.to_string())
    }
}

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Parsed records as JSON objects
    pub records: Vec<Value>,
    /// Detected encoding label
    pub encoding: String,
    /// Detected delimiter
    pub delimiter: char,
    /// Column headers
    pub headers: Vec<String>,
    /// Whether the lenient fallback was needed
    pub lenient: bool,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" | "utf-8-sig" => "utf-8".to_string(),
        "iso-8859-1" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes with the given encoding label. A leading BOM is stripped.
pub fn decode_content(bytes: &[u8], encoding: &str) -> Result<String, CsvError> {
    let label = match encoding.to_lowercase().as_str() {
        "ascii" | "utf-8-sig" | "utf8" => "utf-8".to_string(),
        other => other.to_string(),
    };
    let codec = encoding_rs::Encoding::for_label(label.as_bytes())
        .ok_or_else(|| CsvError::new(0, format!("Unsupported encoding: {}", encoding)))?;

    let (decoded, _, had_errors) = codec.decode(bytes);
    if had_errors {
        log_warning(format!(
            "Some bytes could not be decoded as {}, replaced by U+FFFD",
            codec.name()
        ));
    }
    Ok(decoded.into_owned())
}

/// Occurrences of `delimiter` outside double quotes.
fn count_unquoted(line: &str, delimiter: char) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for c in line.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

/// Sniff the delimiter on the first lines.
///
/// A candidate that appears the same non-zero number of times on every
/// sampled line wins, the highest count first. Otherwise the candidate most
/// frequent on the header line is used, then `,`.
pub fn detect_delimiter(content: &str) -> char {
    let sample: Vec<&str> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();

    let Some(header) = sample.first() else {
        return ',';
    };

    let mut best: Option<(char, usize)> = None;
    for &candidate in &DELIMITER_CANDIDATES {
        let counts: Vec<usize> = sample.iter().map(|l| count_unquoted(l, candidate)).collect();
        let first = counts[0];
        if first > 0 && counts.iter().all(|&c| c == first) {
            if best.map_or(true, |(_, n)| first > n) {
                best = Some((candidate, first));
            }
        }
    }
    if let Some((delimiter, _)) = best {
        return delimiter;
    }

    DELIMITER_CANDIDATES
        .iter()
        .map(|&c| (c, count_unquoted(header, c)))
        .filter(|&(_, n)| n > 0)
        .fold(None, |acc: Option<(char, usize)>, (c, n)| match acc {
            Some((_, best)) if best >= n => acc,
            _ => Some((c, n)),
        })
        .map(|(c, _)| c)
        .unwrap_or(',')
}

/// Header names, duplicates suffixed `.1`, `.2`, ... so no column is lost.
fn dedupe_headers(raw: &csv::StringRecord) -> Vec<String> {
    let mut headers: Vec<String> = Vec::with_capacity(raw.len());
    for name in raw.iter() {
        let mut candidate = name.to_string();
        let mut n = 1;
        while headers.contains(&candidate) {
            candidate = format!("{}.{}", name, n);
            n += 1;
        }
        headers.push(candidate);
    }
    headers
}

fn to_record(headers: &[String], row: &csv::StringRecord) -> Value {
    let mut obj = Map::new();
    for (i, header) in headers.iter().enumerate() {
        let value = row.get(i).unwrap_or("");
        obj.insert(header.clone(), Value::String(value.to_string()));
    }
    Value::Object(obj)
}

/// Parse with quoting honored and a fixed field count.
fn parse_strict(content: &str, delimiter: char) -> Result<(Vec<String>, Vec<Value>), CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(false)
        .from_reader(content.as_bytes());

    let headers = dedupe_headers(reader.headers().map_err(|e| CsvError::from_csv(&e))?);
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| CsvError::from_csv(&e))?;
        records.push(to_record(&headers, &row));
    }
    Ok((headers, records))
}

/// Parse with quoting disabled, padding short rows and reporting extra fields.
fn parse_lenient(content: &str, delimiter: char) -> Result<(Vec<String>, Vec<Value>), CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .from_reader(content.as_bytes());

    let headers = dedupe_headers(reader.headers().map_err(|e| CsvError::from_csv(&e))?);
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| CsvError::from_csv(&e))?;
        if row.len() > headers.len() {
            let line = row.position().map(|p| p.line()).unwrap_or(0);
            log_warning(format!(
                "Line {}: {} extra field(s) ignored",
                line,
                row.len() - headers.len()
            ));
        }
        records.push(to_record(&headers, &row));
    }
    Ok((headers, records))
}

/// Parse decoded CSV text with an explicit delimiter.
///
/// # Example
/// ```ignore
/// let rows = csv_to_json("name;age\nAlice;30", ';')?;
/// assert_eq!(rows[0]["age"], "30");
/// ```
pub fn csv_to_json(content: &str, delimiter: char) -> Result<Vec<Value>, CsvError> {
    parse_string(content, delimiter, "utf-8".to_string()).map(|r| r.records)
}

/// Parse decoded CSV text and return metadata.
pub fn parse_string(content: &str, delimiter: char, encoding: String) -> Result<ParseResult, CsvError> {
    if content.trim().is_empty() {
        return Err(CsvError::new(1, "Empty CSV file"));
    }

    let (headers, records, lenient) = match parse_strict(content, delimiter) {
        Ok((headers, records)) => (headers, records, false),
        Err(strict_err) => {
            log_warning(format!(
                "Strict CSV parsing failed ({}), retrying without quoting",
                strict_err
            ));
            let (headers, records) = parse_lenient(content, delimiter)?;
            (headers, records, true)
        }
    };

    Ok(ParseResult {
        records,
        encoding,
        delimiter,
        headers,
        lenient,
    })
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> Result<ParseResult, CsvError> {
    if bytes.is_empty() {
        return Err(CsvError::new(1, "Empty CSV file"));
    }
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    parse_string(&content, delimiter, encoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_csv() {
        let csv = "name;age\nAlice;30\nBob;25";
        let rows = csv_to_json(csv, ';').unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "Alice");
        assert_eq!(rows[0]["age"], "30");
        assert_eq!(rows[1]["name"], "Bob");
        assert_eq!(rows[1]["age"], "25");
    }

    #[test]
    fn test_quoted_values_keep_delimiters() {
        let csv = "name,comment\n\"Smith, John\",\"said \"\"hi\"\"\"";
        let rows = csv_to_json(csv, ',').unwrap();

        assert_eq!(rows[0]["name"], "Smith, John");
        assert_eq!(rows[0]["comment"], "said \"hi\"");
    }

    #[test]
    fn test_empty_lines_skipped() {
        let csv = "a;b\n1;2\n\n3;4\n";
        let rows = csv_to_json(csv, ';').unwrap();

        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_blank_fields_are_empty_strings() {
        let csv = "a;b;c\n1;;3";
        let rows = csv_to_json(csv, ';').unwrap();

        assert_eq!(rows[0]["a"], "1");
        assert_eq!(rows[0]["b"], "");
        assert_eq!(rows[0]["c"], "3");
    }

    #[test]
    fn test_ragged_rows_fall_back_to_lenient() {
        let result = parse_string("a;b;c\n1;2\n4;5;6;7", ';', "utf-8".into()).unwrap();

        assert!(result.lenient);
        assert_eq!(result.records[0]["c"], "");
        assert_eq!(result.records[1]["c"], "6");
        assert_eq!(result.records[1].as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_duplicate_headers_are_suffixed() {
        let rows = csv_to_json("id,id,name\n1,2,x", ',').unwrap();
        assert_eq!(rows[0]["id"], "1");
        assert_eq!(rows[0]["id.1"], "2");
    }

    #[test]
    fn test_error_message_format() {
        let err = CsvError::new(5, "Invalid value")
            .with_column("age")
            .with_value("abc");

        let msg = err.to_string();
        assert!(msg.contains("Line 5"));
        assert!(msg.contains("column 'age'"));
        assert!(msg.contains("value 'abc'"));
    }

    #[test]
    fn test_empty_csv_error() {
        let err = parse_bytes_auto(b"").unwrap_err();
        assert!(err.message.contains("Empty"));
        assert!(csv_to_json("  \n", ';').is_err());
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
        assert_eq!(detect_delimiter("a:b\n1:2"), ':');
    }

    #[test]
    fn test_detect_delimiter_ignores_quoted_commas() {
        let content = "name;city\n\"Doe, Jane\";Paris\n\"Roe, Rick\";Lyon";
        assert_eq!(detect_delimiter(content), ';');
    }

    #[test]
    fn test_detect_delimiter_single_column() {
        assert_eq!(detect_delimiter("name\nAlice\nBob"), ',');
    }

    #[test]
    fn test_auto_parse() {
        let csv = "name;age\nAlice;30\nBob;25";
        let result = parse_bytes_auto(csv.as_bytes()).unwrap();

        assert_eq!(result.delimiter, ';');
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.headers, vec!["name", "age"]);
    }

    #[test]
    fn test_utf8_bom_is_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"id,label\n1,one");
        let result = parse_bytes_auto(&bytes).unwrap();

        assert_eq!(result.headers[0], "id");
        assert_eq!(result.records[0]["id"], "1");
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Société");
    }
}
