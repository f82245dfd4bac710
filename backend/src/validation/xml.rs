//! Minimal XML tree used by the DTD validator.
//!
//! Names are kept qualified (`bme:ARTICLE`), which is how DTDs refer to them.
//! Only the predefined entities and character references are resolved.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Well-formedness error, reported with its 1-based line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlSyntaxError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for XmlSyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, line {}", self.message, self.line)
    }
}

impl std::error::Error for XmlSyntaxError {}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
    pub line: usize,
}

impl Element {
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// True when some text child holds more than whitespace.
    pub fn has_text(&self) -> bool {
        self.children
            .iter()
            .any(|n| matches!(n, Node::Text(t) if !t.trim().is_empty()))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Parsed document: its root element and the DOCTYPE name if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub doctype: Option<String>,
    pub root: Element,
}

/// Byte offsets of every newline, built once per document.
struct LineIndex {
    newlines: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let newlines = source
            .bytes()
            .enumerate()
            .filter(|&(_, b)| b == b'\n')
            .map(|(i, _)| i)
            .collect();
        Self { newlines }
    }

    /// 1-based line of the byte at `position`.
    fn line_at(&self, position: usize) -> usize {
        self.newlines.partition_point(|&n| n < position) + 1
    }
}

fn open_element(lines: &LineIndex, e: &BytesStart<'_>, position: usize) -> Result<Element, XmlSyntaxError> {
    let line = lines.line_at(position);
    let err = |message: String| XmlSyntaxError { line, message };

    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|x| err(x.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|x| err(x.to_string()))?;
        attributes.push((key, value.into_owned()));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
        line,
    })
}

/// Parse `source` into a [`Document`], rejecting anything not well-formed.
pub fn parse_document(source: &str) -> Result<Document, XmlSyntaxError> {
    let mut reader = Reader::from_str(source);
    let lines = LineIndex::new(source);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut doctype = None;

    loop {
        let position = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|e| XmlSyntaxError {
            line: lines.line_at(reader.buffer_position() as usize),
            message: e.to_string(),
        })?;
        let fail = |message: &str| XmlSyntaxError {
            line: lines.line_at(position),
            message: message.to_string(),
        };

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                if stack.is_empty() && root.is_some() {
                    return Err(fail("Extra content at the end of the document"));
                }
                let element = open_element(&lines, e, position)?;
                if matches!(event, Event::Start(_)) {
                    stack.push(element);
                } else {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| fail("Unexpected end tag"))?;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(ref t) => {
                let text = t.unescape().map_err(|e| fail(&e.to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Text(text.into_owned())),
                    None if text.trim().is_empty() => {}
                    None => return Err(fail("Content outside the document element")),
                }
            }
            Event::CData(ref c) => {
                let text = String::from_utf8_lossy(&c[..]).into_owned();
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Text(text)),
                    None => return Err(fail("CDATA outside the document element")),
                }
            }
            Event::DocType(ref d) => {
                let raw = String::from_utf8_lossy(&d[..]).into_owned();
                doctype = raw.split_whitespace().next().map(str::to_string);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlSyntaxError {
            line: lines.line_at(source.len()),
            message: format!("Premature end of data in tag {} line {}", open.name, open.line),
        });
    }
    let root = root.ok_or_else(|| XmlSyntaxError {
        line: 1,
        message: "Document is empty".to_string(),
    })?;
    Ok(Document { doctype, root })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => *root = Some(element),
    }
}
