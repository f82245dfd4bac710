//! DTD parsing and validation.
//!
//! Supported declarations:
//!
//! - `<!ELEMENT>` with `EMPTY`, `ANY`, mixed content and children models
//!   (sequences, choices, `?`, `*`, `+`)
//! - `<!ATTLIST>` with `CDATA`, `ID`, `IDREF(S)`, `ENTITY`/`ENTITIES`,
//!   `NMTOKEN(S)`, `NOTATION` and enumerations; `#REQUIRED`, `#IMPLIED`,
//!   `#FIXED` and plain defaults
//! - internal parameter entities (`<!ENTITY % name "...">`), expanded in
//!   later declarations
//!
//! Comments, processing instructions, general entities and notations are
//! read and ignored. Conditional sections are rejected.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::xml::{Document, Element};

/// DTD syntax error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtdParseError(pub String);

impl std::fmt::Display for DtdParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for DtdParseError {}

type ParseResult<T> = Result<T, DtdParseError>;

fn parse_error<T>(message: impl Into<String>) -> ParseResult<T> {
    Err(DtdParseError(message.into()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    Once,
    Optional,
    ZeroOrMore,
    OneOrMore,
}

impl Occurrence {
    fn suffix(self) -> &'static str {
        match self {
            Occurrence::Once => "",
            Occurrence::Optional => "?",
            Occurrence::ZeroOrMore => "*",
            Occurrence::OneOrMore => "+",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticleKind {
    Name(String),
    Seq(Vec<Particle>),
    Choice(Vec<Particle>),
}

/// One node of a children content model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Particle {
    pub kind: ParticleKind,
    pub occurrence: Occurrence,
}

impl std::fmt::Display for Particle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ParticleKind::Name(name) => write!(f, "{}", name)?,
            ParticleKind::Seq(items) | ParticleKind::Choice(items) => {
                let sep = if matches!(self.kind, ParticleKind::Seq(_)) { " , " } else { " | " };
                let parts: Vec<String> = items.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", parts.join(sep))?
            }
        }
        f.write_str(self.occurrence.suffix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSpec {
    Empty,
    Any,
    /// `(#PCDATA | a | b)*`, the list holds the allowed element names.
    Mixed(Vec<String>),
    Children(Particle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeType {
    CData,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Notation(Vec<String>),
    Enumeration(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultDecl {
    Required,
    Implied,
    Fixed(String),
    Value(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDef {
    pub name: String,
    pub kind: AttributeType,
    pub default: DefaultDecl,
}

/// A parsed DTD.
#[derive(Debug, Clone, Default)]
pub struct Dtd {
    elements: HashMap<String, ContentSpec>,
    attributes: HashMap<String, Vec<AttributeDef>>,
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.') || !c.is_ascii()
}

fn is_name(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == ':' || !c.is_ascii() => chars.all(is_name_char),
        _ => false,
    }
}

fn is_nmtoken(value: &str) -> bool {
    !value.is_empty() && value.chars().all(is_name_char)
}

/// Character cursor over one declaration or the whole subset.
struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> ParseResult<()> {
        self.skip_ws();
        match self.bump() {
            Some(found) if found == c => Ok(()),
            Some(found) => parse_error(format!("expected '{}', found '{}'", c, found)),
            None => parse_error(format!("expected '{}', found end of declaration", c)),
        }
    }

    fn name(&mut self) -> ParseResult<String> {
        self.skip_ws();
        let start = self.pos;
        while self.peek().is_some_and(is_name_char) {
            self.bump();
        }
        if start == self.pos {
            return parse_error(format!("name expected near '{}'", snippet(self.rest())));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn quoted(&mut self) -> ParseResult<String> {
        self.skip_ws();
        let quote = match self.bump() {
            Some(q @ ('"' | '\'')) => q,
            _ => return parse_error("quoted literal expected"),
        };
        let start = self.pos;
        while let Some(c) = self.bump() {
            if c == quote {
                return Ok(self.src[start..self.pos - 1].to_string());
            }
        }
        parse_error("unterminated literal")
    }

    fn occurrence(&mut self) -> Occurrence {
        match self.peek() {
            Some('?') => {
                self.bump();
                Occurrence::Optional
            }
            Some('*') => {
                self.bump();
                Occurrence::ZeroOrMore
            }
            Some('+') => {
                self.bump();
                Occurrence::OneOrMore
            }
            _ => Occurrence::Once,
        }
    }

    /// Text up to and including the `>` closing the current markup
    /// declaration, quotes respected.
    fn declaration(&mut self) -> ParseResult<&'a str> {
        let start = self.pos;
        let mut quote: Option<char> = None;
        while let Some(c) = self.bump() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(c),
                (None, '>') => return Ok(&self.src[start..self.pos]),
                (None, _) => {}
            }
        }
        parse_error(format!("unterminated declaration '{}'", snippet(&self.src[start..])))
    }

    fn skip_past(&mut self, terminator: &str) -> ParseResult<()> {
        match self.rest().find(terminator) {
            Some(idx) => {
                self.pos += idx + terminator.len();
                Ok(())
            }
            None => parse_error(format!("'{}' expected", terminator)),
        }
    }
}

fn snippet(text: &str) -> String {
    text.chars().take(30).collect()
}

/// Parameter entity expansion depth.
const MAX_ENTITY_DEPTH: usize = 16;

impl Dtd {
    /// Parse an external DTD subset.
    pub fn parse(source: &str) -> ParseResult<Self> {
        let mut dtd = Dtd::default();
        let mut entities = HashMap::new();
        dtd.parse_subset(source, &mut entities, 0)?;
        Ok(dtd)
    }

    fn parse_subset(&mut self, source: &str, entities: &mut HashMap<String, String>, depth: usize) -> ParseResult<()> {
        if depth > MAX_ENTITY_DEPTH {
            return parse_error("parameter entities nested too deeply");
        }
        let mut cursor = Cursor::new(source);
        loop {
            cursor.skip_ws();
            if cursor.at_end() {
                return Ok(());
            }
            if cursor.eat("<!--") {
                cursor.skip_past("-->")?;
            } else if cursor.eat("<?") {
                cursor.skip_past("?>")?;
            } else if cursor.rest().starts_with("<![") {
                return parse_error("conditional sections are not supported");
            } else if cursor.rest().starts_with("<!") {
                let raw = cursor.declaration()?;
                let expanded = expand_entities(raw, entities, depth)?;
                self.parse_declaration(&expanded, entities)?;
            } else if cursor.eat("%") {
                let name = cursor.name()?;
                cursor.expect(';')?;
                let value = entities
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| DtdParseError(format!("undeclared parameter entity %{};", name)))?;
                self.parse_subset(&value, entities, depth + 1)?;
            } else {
                return parse_error(format!("unexpected content '{}'", snippet(cursor.rest())));
            }
        }
    }

    fn parse_declaration(&mut self, decl: &str, entities: &mut HashMap<String, String>) -> ParseResult<()> {
        let body = decl
            .strip_suffix('>')
            .ok_or_else(|| DtdParseError(format!("malformed declaration '{}'", snippet(decl))))?;
        let mut cursor = Cursor::new(body);

        if cursor.eat("<!ELEMENT") {
            let name = cursor.name()?;
            let spec = parse_content_spec(&mut cursor)?;
            cursor.skip_ws();
            if !cursor.at_end() {
                return parse_error(format!("unexpected '{}' in declaration of {}", snippet(cursor.rest()), name));
            }
            if self.elements.insert(name.clone(), spec).is_some() {
                return parse_error(format!("Redefinition of element {}", name));
            }
        } else if cursor.eat("<!ATTLIST") {
            let element = cursor.name()?;
            let defs = parse_attribute_defs(&mut cursor)?;
            let known = self.attributes.entry(element).or_default();
            for def in defs {
                // The first declaration of an attribute is binding.
                if !known.iter().any(|d| d.name == def.name) {
                    known.push(def);
                }
            }
        } else if cursor.eat("<!ENTITY") {
            cursor.skip_ws();
            if cursor.eat("%") {
                let name = cursor.name()?;
                cursor.skip_ws();
                if matches!(cursor.peek(), Some('"' | '\'')) {
                    let value = cursor.quoted()?;
                    entities.entry(name).or_insert(value);
                }
            }
        } else if !cursor.eat("<!NOTATION") {
            return parse_error(format!("unknown declaration '{}'", snippet(decl)));
        }
        Ok(())
    }

    pub fn element(&self, name: &str) -> Option<&ContentSpec> {
        self.elements.get(name)
    }

    pub fn attributes_of(&self, element: &str) -> &[AttributeDef] {
        self.attributes.get(element).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every validity error of `document`, in document order.
    pub fn validate(&self, document: &Document) -> Vec<String> {
        let mut state = ValidationState::default();
        self.validate_element(&document.root, &mut state);

        for (id, line) in &state.references {
            if !state.ids.contains(id) {
                state
                    .errors
                    .push(format!("line {}: IDREF attribute references an unknown ID \"{}\"", line, id));
            }
        }
        state.errors
    }

    fn validate_element(&self, element: &Element, state: &mut ValidationState) {
        let line = element.line;
        let mut report = |message: String| state.errors.push(format!("line {}: {}", line, message));

        match self.elements.get(&element.name) {
            None => report(format!("No declaration for element {}", element.name)),
            Some(ContentSpec::Any) => {}
            Some(ContentSpec::Empty) => {
                if !element.children.is_empty() {
                    report(format!("Element {} was declared EMPTY this one has content", element.name));
                }
            }
            Some(ContentSpec::Mixed(allowed)) => {
                for child in element.child_elements() {
                    if allowed.is_empty() {
                        report(format!(
                            "Element {} was declared #PCDATA but contains non text nodes",
                            element.name
                        ));
                        break;
                    }
                    if !allowed.contains(&child.name) {
                        report(format!(
                            "Element {} is not declared in {} list of possible children",
                            child.name, element.name
                        ));
                    }
                }
            }
            Some(ContentSpec::Children(model)) => {
                if element.has_text() {
                    report(format!("Element {} contains text but was declared with element content", element.name));
                }
                let names: Vec<&str> = element.child_elements().map(|c| c.name.as_str()).collect();
                if !matches_model(model, &names) {
                    let got: String = names.iter().map(|n| format!("{} ", n)).collect();
                    report(format!(
                        "Element {} content does not follow the DTD, expecting {}, got ({})",
                        element.name, model, got
                    ));
                }
            }
        }

        self.validate_attributes(element, state);
        for child in element.child_elements() {
            self.validate_element(child, state);
        }
    }

    fn validate_attributes(&self, element: &Element, state: &mut ValidationState) {
        let defs = self.attributes_of(&element.name);
        let line = element.line;

        for (name, value) in &element.attributes {
            let Some(def) = defs.iter().find(|d| &d.name == name) else {
                if !(name == "xmlns" || name.starts_with("xmlns:") || name.starts_with("xml:")) {
                    state.errors.push(format!(
                        "line {}: No declaration for attribute {} of element {}",
                        line, name, element.name
                    ));
                }
                continue;
            };
            state.check_value(element, def, value);
        }

        for def in defs {
            if element.attribute(&def.name).is_some() {
                continue;
            }
            if def.default == DefaultDecl::Required {
                state.errors.push(format!(
                    "line {}: Element {} does not carry attribute {}",
                    line, element.name, def.name
                ));
            }
        }
    }
}

#[derive(Default)]
struct ValidationState {
    errors: Vec<String>,
    ids: HashSet<String>,
    references: Vec<(String, usize)>,
}

impl ValidationState {
    fn check_value(&mut self, element: &Element, def: &AttributeDef, raw: &str) {
        let line = element.line;
        let value = match def.kind {
            AttributeType::CData => raw.to_string(),
            _ => raw.split_whitespace().collect::<Vec<_>>().join(" "),
        };
        let mut report = |message: String| self.errors.push(format!("line {}: {}", line, message));

        if let DefaultDecl::Fixed(fixed) = &def.default {
            if &value != fixed {
                report(format!(
                    "Value for attribute {} of {} is different from default \"{}\"",
                    def.name, element.name, fixed
                ));
            }
        }

        let syntax_ok = match &def.kind {
            AttributeType::CData => true,
            AttributeType::Id | AttributeType::IdRef | AttributeType::Entity => is_name(&value),
            AttributeType::IdRefs | AttributeType::Entities => {
                !value.is_empty() && value.split(' ').all(is_name)
            }
            AttributeType::NmToken => is_nmtoken(&value),
            AttributeType::NmTokens => !value.is_empty() && value.split(' ').all(is_nmtoken),
            AttributeType::Enumeration(options) | AttributeType::Notation(options) => {
                if !options.contains(&value) {
                    report(format!(
                        "Value \"{}\" for attribute {} of {} is not among the enumerated set",
                        value, def.name, element.name
                    ));
                }
                true
            }
        };
        if !syntax_ok {
            report(format!(
                "Syntax of value for attribute {} of {} is not valid",
                def.name, element.name
            ));
            return;
        }

        match def.kind {
            AttributeType::Id => {
                if !self.ids.insert(value.clone()) {
                    self.errors.push(format!("line {}: ID {} already defined", line, value));
                }
            }
            AttributeType::IdRef => self.references.push((value, line)),
            AttributeType::IdRefs => self
                .references
                .extend(value.split(' ').map(|v| (v.to_string(), line))),
            _ => {}
        }
    }
}

fn expand_entities(raw: &str, entities: &HashMap<String, String>, depth: usize) -> ParseResult<String> {
    if !raw.contains('%') || raw.starts_with("<!ENTITY") && !raw[8..].trim_start().starts_with('%') {
        return Ok(raw.to_string());
    }
    if depth > MAX_ENTITY_DEPTH {
        return parse_error("parameter entities nested too deeply");
    }

    let mut out = String::with_capacity(raw.len());
    let mut cursor = Cursor::new(raw);
    let mut quote: Option<char> = None;
    while let Some(c) = cursor.bump() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                out.push(c);
            }
            (None, '"' | '\'') => {
                quote = Some(c);
                out.push(c);
            }
            (None, '%') if cursor.peek().is_some_and(|n| is_name_char(n) && !n.is_whitespace()) => {
                let name = cursor.name()?;
                cursor.expect(';')?;
                let value = entities
                    .get(&name)
                    .ok_or_else(|| DtdParseError(format!("undeclared parameter entity %{};", name)))?;
                out.push(' ');
                out.push_str(&expand_entities(value, entities, depth + 1)?);
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

fn parse_content_spec(cursor: &mut Cursor<'_>) -> ParseResult<ContentSpec> {
    cursor.skip_ws();
    if cursor.eat("EMPTY") {
        return Ok(ContentSpec::Empty);
    }
    if cursor.eat("ANY") {
        return Ok(ContentSpec::Any);
    }
    if cursor.peek() != Some('(') {
        return parse_error(format!("content model expected near '{}'", snippet(cursor.rest())));
    }

    let checkpoint = cursor.pos;
    cursor.bump();
    cursor.skip_ws();
    if cursor.eat("#PCDATA") {
        let mut names = Vec::new();
        loop {
            cursor.skip_ws();
            match cursor.bump() {
                Some('|') => names.push(cursor.name()?),
                Some(')') => break,
                _ => return parse_error("malformed mixed content model"),
            }
        }
        let star = cursor.eat("*");
        if !names.is_empty() && !star {
            return parse_error("mixed content with element names must end with ')*'");
        }
        return Ok(ContentSpec::Mixed(names));
    }

    cursor.pos = checkpoint;
    Ok(ContentSpec::Children(parse_particle(cursor)?))
}

fn parse_particle(cursor: &mut Cursor<'_>) -> ParseResult<Particle> {
    cursor.skip_ws();
    if cursor.peek() != Some('(') {
        let name = cursor.name()?;
        return Ok(Particle {
            kind: ParticleKind::Name(name),
            occurrence: cursor.occurrence(),
        });
    }

    cursor.bump();
    let mut items = vec![parse_particle(cursor)?];
    let mut separator: Option<char> = None;
    loop {
        cursor.skip_ws();
        match cursor.bump() {
            Some(')') => break,
            Some(c @ ('|' | ',')) => {
                if separator.is_some_and(|s| s != c) {
                    return parse_error("mixing ',' and '|' in one group");
                }
                separator = Some(c);
                items.push(parse_particle(cursor)?);
            }
            _ => return parse_error("malformed content model"),
        }
    }

    let kind = if separator == Some('|') {
        ParticleKind::Choice(items)
    } else {
        ParticleKind::Seq(items)
    };
    Ok(Particle {
        kind,
        occurrence: cursor.occurrence(),
    })
}

fn parse_attribute_defs(cursor: &mut Cursor<'_>) -> ParseResult<Vec<AttributeDef>> {
    let mut defs = Vec::new();
    loop {
        cursor.skip_ws();
        if cursor.at_end() {
            return Ok(defs);
        }
        let name = cursor.name()?;
        cursor.skip_ws();

        let kind = if cursor.peek() == Some('(') {
            AttributeType::Enumeration(parse_enumeration(cursor)?)
        } else {
            match cursor.name()?.as_str() {
                "CDATA" => AttributeType::CData,
                "ID" => AttributeType::Id,
                "IDREF" => AttributeType::IdRef,
                "IDREFS" => AttributeType::IdRefs,
                "ENTITY" => AttributeType::Entity,
                "ENTITIES" => AttributeType::Entities,
                "NMTOKEN" => AttributeType::NmToken,
                "NMTOKENS" => AttributeType::NmTokens,
                "NOTATION" => {
                    cursor.skip_ws();
                    AttributeType::Notation(parse_enumeration(cursor)?)
                }
                other => return parse_error(format!("unknown attribute type {} for {}", other, name)),
            }
        };

        cursor.skip_ws();
        let default = if cursor.eat("#REQUIRED") {
            DefaultDecl::Required
        } else if cursor.eat("#IMPLIED") {
            DefaultDecl::Implied
        } else if cursor.eat("#FIXED") {
            DefaultDecl::Fixed(cursor.quoted()?)
        } else {
            DefaultDecl::Value(cursor.quoted()?)
        };

        defs.push(AttributeDef { name, kind, default });
    }
}

fn parse_enumeration(cursor: &mut Cursor<'_>) -> ParseResult<Vec<String>> {
    cursor.expect('(')?;
    let mut values = Vec::new();
    loop {
        values.push(cursor.name()?);
        cursor.skip_ws();
        match cursor.bump() {
            Some('|') => continue,
            Some(')') => return Ok(values),
            _ => return parse_error("malformed enumeration"),
        }
    }
}

/// Whether the child element names satisfy `model` entirely.
pub fn matches_model(model: &Particle, names: &[&str]) -> bool {
    match_particle(model, names, 0).contains(&names.len())
}

/// Every position reachable after matching `particle` from `start`.
fn match_particle(particle: &Particle, names: &[&str], start: usize) -> BTreeSet<usize> {
    let once = |from: usize| match_once(particle, names, from);

    match particle.occurrence {
        Occurrence::Once => once(start),
        Occurrence::Optional => {
            let mut ends = once(start);
            ends.insert(start);
            ends
        }
        Occurrence::ZeroOrMore | Occurrence::OneOrMore => {
            let mut reached = BTreeSet::new();
            if particle.occurrence == Occurrence::ZeroOrMore {
                reached.insert(start);
            }
            let mut frontier: Vec<usize> = vec![start];
            let mut expanded = HashSet::new();
            while let Some(pos) = frontier.pop() {
                if !expanded.insert(pos) {
                    continue;
                }
                for end in once(pos) {
                    if reached.insert(end) || end != pos {
                        frontier.push(end);
                    }
                }
            }
            reached
        }
    }
}

fn match_once(particle: &Particle, names: &[&str], start: usize) -> BTreeSet<usize> {
    match &particle.kind {
        ParticleKind::Name(name) => {
            if names.get(start) == Some(&name.as_str()) {
                BTreeSet::from([start + 1])
            } else {
                BTreeSet::new()
            }
        }
        ParticleKind::Seq(items) => items.iter().fold(BTreeSet::from([start]), |positions, item| {
            positions
                .into_iter()
                .flat_map(|pos| match_particle(item, names, pos))
                .collect()
        }),
        ParticleKind::Choice(items) => items
            .iter()
            .flat_map(|item| match_particle(item, names, start))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::xml::parse_document;

    const CATALOG_DTD: &str = r#"
<!-- catalog -->
<!ENTITY % text "(#PCDATA)">
<!ELEMENT catalog (header, (item | bundle)+, footer?)>
<!ATTLIST catalog version CDATA #FIXED "2.0"
                  xmlns CDATA #IMPLIED>
<!ELEMENT header %text;>
<!ELEMENT item (name, price*)>
<!ATTLIST item sku ID #REQUIRED
               kind (simple | variant) "simple"
               parent IDREF #IMPLIED>
<!ELEMENT bundle EMPTY>
<!ATTLIST bundle items IDREFS #REQUIRED>
<!ELEMENT name %text;>
<!ELEMENT price (#PCDATA)>
<!ELEMENT footer (#PCDATA | b)*>
<!ELEMENT b ANY>
"#;

    fn errors(xml: &str) -> Vec<String> {
        let dtd = Dtd::parse(CATALOG_DTD).unwrap();
        dtd.validate(&parse_document(xml).unwrap())
    }

    #[test]
    fn test_valid_document() {
        let errs = errors(
            r#"<catalog version="2.0">
  <header>Spring</header>
  <item sku="A1"><name>Chair</name><price>10</price><price>9</price></item>
  <item sku="A2" kind="variant" parent="A1"><name>Chair XL</name></item>
  <bundle items="A1 A2"/>
  <footer>see <b>terms</b></footer>
</catalog>"#,
        );
        assert!(errs.is_empty(), "{:?}", errs);
    }

    #[test]
    fn test_content_model_violation() {
        let errs = errors(r#"<catalog><item sku="A1"><name>x</name></item></catalog>"#);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].contains("Element catalog content does not follow the DTD"));
        assert!(errs[0].contains("expecting (header , (item | bundle)+ , footer?)"));
        assert!(errs[0].contains("got (item )"));
    }

    #[test]
    fn test_attribute_rules() {
        let errs = errors(
            r#"<catalog version="3.0">
  <header>h</header>
  <item kind="other" color="red"><name>x</name></item>
  <item sku="A1"><name>y</name></item>
  <item sku="A1" parent="ZZ"><name>z</name></item>
</catalog>"#,
        );
        let all = errs.join("\n");
        assert!(all.contains("different from default \"2.0\""));
        assert!(all.contains("Value \"other\" for attribute kind of item is not among the enumerated set"));
        assert!(all.contains("No declaration for attribute color of element item"));
        assert!(all.contains("Element item does not carry attribute sku"));
        assert!(all.contains("ID A1 already defined"));
        assert!(all.contains("references an unknown ID \"ZZ\""));
    }

    #[test]
    fn test_element_rules() {
        let errs = errors(
            r#"<catalog><header>h<b/></header><bundle items="X">text</bundle><unknown/><footer><i/></footer></catalog>"#,
        );
        let all = errs.join("\n");
        assert!(all.contains("Element header was declared #PCDATA but contains non text nodes"));
        assert!(all.contains("Element bundle was declared EMPTY this one has content"));
        assert!(all.contains("No declaration for element unknown"));
        assert!(all.contains("Element i is not declared in footer list of possible children"));
    }

    #[test]
    fn test_errors_carry_lines() {
        let errs = errors("<catalog>\n<header>h</header>\n<item><name>n</name></item>\n</catalog>");
        assert_eq!(errs, vec!["line 3: Element item does not carry attribute sku".to_string()]);
    }

    #[test]
    fn test_model_matching() {
        let mut cursor = Cursor::new("((a, b)*, c?)");
        let model = parse_particle(&mut cursor).unwrap();
        assert!(matches_model(&model, &[]));
        assert!(matches_model(&model, &["a", "b", "a", "b", "c"]));
        assert!(!matches_model(&model, &["a", "c"]));
        assert!(!matches_model(&model, &["c", "c"]));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Dtd::parse("<!ELEMENT a (b, c | d)>").is_err());
        assert!(Dtd::parse("<!ELEMENT a (#PCDATA | b)>").is_err());
        assert!(Dtd::parse("<!ELEMENT a EMPTY>\n<!ELEMENT a ANY>").is_err());
        assert!(Dtd::parse("<!ELEMENT a %missing;>").is_err());
        assert!(Dtd::parse("garbage").is_err());
        assert!(Dtd::parse("<![INCLUDE[ <!ELEMENT a ANY> ]]>").is_err());
    }
}
