/// Table extraction from JaCoCo HTML report pages.
///
/// JaCoCo writes its pages as XHTML, so a lenient `quick-xml` reader is
/// enough to build a document tree:
///   <html>
///     <body>
///       <h1>com.acme</h1>
///       <table class="coverage" id="coveragetable">
///         <thead><tr><td>Element</td><td>Missed Instructions</td>...</tr></thead>
///         <tfoot><tr><td>Total</td>...</tr></tfoot>
///         <tbody>
///           <tr><td><a href="Foo.html" class="el_class">Foo</a></td>...</tr>
///         </tbody>
///       </table>
///     </body>
///   </html>
///
/// Notes:
///   - End-tag names are not checked; an end tag closes the nearest open
///     element of the same name and unmatched end tags are dropped.
///   - HTML void elements (`<br>`, `<img>`, ...) never take children.
///   - Only the first `<table>` in document order is used.
///   - Column count comes from the `<thead>` cells; `<tfoot>` (the Total
///     row) is never walked.
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{CovcrawlError, Result};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

const DOCUMENT: &str = "#document";

/// Open elements allowed at once. Tree walks recurse per level, so deeper
/// input is rejected instead of built.
pub const MAX_DEPTH: usize = 512;

/// A node of the parsed document.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with lowercased tag and attribute names.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn new(name: String, attributes: Vec<(String, String)>) -> Self {
        Self {
            name,
            attributes,
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Direct element children, in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> + '_ {
        self.children.iter().filter_map(|child| match child {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// Pre-order search for the first element named `name`, starting with
    /// `self`.
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.elements().find_map(|child| child.find(name))
    }

    /// Text content of this element and its descendants, with separate text
    /// nodes joined by a single space.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect(&mut out);
        out
    }

    /// Target of the first `<a href>` in pre-order.
    pub fn first_link(&self) -> Option<&str> {
        if self.name == "a" {
            if let Some(href) = self.attr("href") {
                return Some(href);
            }
        }
        self.elements().find_map(Element::first_link)
    }

    fn collect(&self, text: &mut String) {
        for child in &self.children {
            match child {
                Node::Element(el) => el.collect(text),
                Node::Text(t) => {
                    let t = t.trim();
                    if t.is_empty() {
                        continue;
                    }
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(t);
                }
            }
        }
    }
}

/// A parsed page.
#[derive(Debug, Clone)]
pub struct Document {
    root: Element,
}

impl Document {
    /// Build a document tree from raw page bytes.
    pub fn parse(input: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(input);
        reader.trim_text(true);
        reader.check_end_names(false);

        let mut stack = vec![Element::new(DOCUMENT.to_string(), Vec::new())];
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Err(e) => {
                    return Err(CovcrawlError::Xml {
                        source: e,
                        position: reader.buffer_position(),
                    })
                }
                Ok(Event::Eof) => break,
                Ok(Event::Start(ref e)) => {
                    let element = start_element(e);
                    if VOID_ELEMENTS.contains(&element.name.as_str()) {
                        append(&mut stack, Node::Element(element));
                    } else {
                        // The document root does not count.
                        if stack.len() > MAX_DEPTH {
                            return Err(CovcrawlError::NestingTooDeep(MAX_DEPTH));
                        }
                        stack.push(element);
                    }
                }
                Ok(Event::Empty(ref e)) => {
                    append(&mut stack, Node::Element(start_element(e)));
                }
                Ok(Event::End(ref e)) => {
                    close(&mut stack, &lowercase(e.local_name().as_ref()));
                }
                Ok(Event::Text(ref e)) => {
                    let text = e
                        .unescape_with(html_entity)
                        .map(Cow::into_owned)
                        .unwrap_or_else(|_| String::from_utf8_lossy(e).into_owned());
                    if !text.is_empty() {
                        append(&mut stack, Node::Text(text));
                    }
                }
                Ok(Event::CData(ref e)) => {
                    append(&mut stack, Node::Text(String::from_utf8_lossy(e).into_owned()));
                }
                // Declarations, doctype, comments and processing instructions
                // carry nothing we read.
                Ok(_) => {}
            }
            buf.clear();
        }

        // Unclosed elements are closed at end of input.
        close(&mut stack, DOCUMENT);
        let root = stack
            .pop()
            .unwrap_or_else(|| Element::new(DOCUMENT.to_string(), Vec::new()));
        Ok(Self { root })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }
}

fn start_element(e: &BytesStart) -> Element {
    let attributes = e
        .html_attributes()
        .flatten()
        .map(|attr| {
            let key = lowercase(attr.key.local_name().as_ref());
            let value = attr
                .unescape_value()
                .map(Cow::into_owned)
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            (key, value)
        })
        .collect();
    Element::new(lowercase(e.local_name().as_ref()), attributes)
}

fn lowercase(name: &[u8]) -> String {
    String::from_utf8_lossy(name).to_ascii_lowercase()
}

fn append(stack: &mut [Element], node: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

/// Close the innermost open element named `name` and everything opened
/// after it. The document root is never popped, so closing `DOCUMENT`
/// folds every open element back into the root.
fn close(stack: &mut Vec<Element>, name: &str) {
    let Some(index) = stack.iter().rposition(|el| el.name == name) else {
        return;
    };
    let keep = index.max(1);
    while stack.len() > keep {
        if let Some(element) = stack.pop() {
            append(stack, Node::Element(element));
        }
    }
}

/// The few named entities JaCoCo pages use beyond the XML predefined ones.
fn html_entity(name: &str) -> Option<&'static str> {
    match name {
        "nbsp" => Some("\u{a0}"),
        "copy" => Some("\u{a9}"),
        "middot" => Some("\u{b7}"),
        "hellip" => Some("\u{2026}"),
        "ndash" => Some("\u{2013}"),
        "mdash" => Some("\u{2014}"),
        _ => None,
    }
}

/// The content of one table cell: its rendered text and, if the cell holds a
/// link, the first link target.
///
/// `Display` and `FromStr` use the `text=...;href=...;` encoding, with `%`,
/// `;` and `=` escaped as `%25`, `%3B` and `%3D` inside values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    pub text: String,
    pub href: Option<String>,
}

impl Cell {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            href: None,
        }
    }

    pub fn link(text: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            href: Some(href.into()),
        }
    }

    fn from_element(cell: &Element) -> Self {
        Self {
            text: cell.text(),
            href: cell.first_link().map(str::to_string),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "text={};", escape_value(&self.text))?;
        if let Some(href) = &self.href {
            write!(f, "href={};", escape_value(href))?;
        }
        Ok(())
    }
}

impl FromStr for Cell {
    type Err = CovcrawlError;

    fn from_str(payload: &str) -> Result<Self> {
        let malformed = || CovcrawlError::MalformedCell(payload.to_string());
        let mut cell = Cell::default();
        for part in payload.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(malformed)?;
            let value = unescape_value(value).ok_or_else(malformed)?;
            match key {
                "text" => cell.text = value,
                "href" => cell.href = Some(value),
                _ => return Err(malformed()),
            }
        }
        Ok(cell)
    }
}

fn escape_value(value: &str) -> Cow<'_, str> {
    if !value.contains(['%', ';', '=']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            ';' => out.push_str("%3B"),
            '=' => out.push_str("%3D"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn unescape_value(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let decoded = match rest.get(pos + 1..pos + 3)? {
            "25" => '%',
            "3B" => ';',
            "3D" => '=',
            _ => return None,
        };
        out.push(decoded);
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Some(out)
}

// ── Table extraction ───────────────────────────────────────────────────────

fn is_cell(el: &Element) -> bool {
    el.name == "td" || el.name == "th"
}

fn children_named<'a>(el: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    el.elements().filter(move |child| child.name == name)
}

/// The first `<table>` of the document, in pre-order.
pub fn extract_table(doc: &Document) -> Result<&Element> {
    doc.root().find("table").ok_or(CovcrawlError::TableNotFound)
}

/// Number of header cells in the table's `<thead>`. Every body row must
/// have exactly this many cells.
pub fn count_columns(table: &Element) -> Result<usize> {
    let head = children_named(table, "thead")
        .next()
        .ok_or(CovcrawlError::NoHeaderFound)?;
    let count = children_named(head, "tr")
        .flat_map(|row| row.elements().filter(|el| is_cell(el)))
        .count();
    if count == 0 {
        return Err(CovcrawlError::NoHeaderFound);
    }
    Ok(count)
}

/// Visit every `<tbody>` cell left to right, top to bottom, passing the
/// table's column count along with each cell.
pub fn walk_rows<F>(table: &Element, mut visit: F) -> Result<()>
where
    F: FnMut(Cell, usize) -> Result<()>,
{
    let column_count = count_columns(table)?;
    let mut row_index = 0;
    for body in children_named(table, "tbody") {
        for row in children_named(body, "tr") {
            let cells: Vec<&Element> = row.elements().filter(|el| is_cell(el)).collect();
            if cells.len() != column_count {
                return Err(CovcrawlError::RowLengthMismatch {
                    row: row_index,
                    expected: column_count,
                    found: cells.len(),
                });
            }
            for cell in cells {
                visit(Cell::from_element(cell), column_count)?;
            }
            row_index += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_of(html: &str) -> Document {
        Document::parse(html.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_tolerates_html_markup() {
        let doc = table_of(
            "<html><body><p>one<br>two</p><div><span>unclosed</div></b><img src=x></body></html>",
        );
        let body = doc.root().find("body").unwrap();
        let p = body.find("p").unwrap();
        assert_eq!(p.text(), "one two");
        assert!(p.find("br").unwrap().children.is_empty());
        // </div> closes the unclosed <span> with it.
        let div = body.find("div").unwrap();
        assert_eq!(div.find("span").unwrap().text(), "unclosed");
        assert_eq!(body.find("img").unwrap().attr("src"), Some("x"));
    }

    #[test]
    fn test_parse_rejects_deep_nesting() {
        let mut input = b"<h1>x</h1>".to_vec();
        input.extend(b"<div>".repeat(200_000));
        let err = Document::parse(&input).unwrap_err();
        assert!(matches!(err, CovcrawlError::NestingTooDeep(MAX_DEPTH)));
        assert!(err.is_page_structural());

        // Exactly at the limit is fine.
        let within = format!("{}x{}", "<div>".repeat(MAX_DEPTH), "</div>".repeat(MAX_DEPTH));
        let doc = table_of(&within);
        assert_eq!(doc.root().text(), "x");
    }

    #[test]
    fn test_first_link() {
        let doc = table_of(r#"<td><a name="top">t</a><span><a href="Foo.html">Foo</a></span><a href="x">x</a></td>"#);
        assert_eq!(doc.root().first_link(), Some("Foo.html"));
        assert_eq!(table_of("<td>plain</td>").root().first_link(), None);
    }

    #[test]
    fn test_parse_entities() {
        let doc = table_of("<p>a&nbsp;b &amp; &lt;init&gt;</p>");
        assert_eq!(doc.root().find("p").unwrap().text(), "a\u{a0}b & <init>");

        // Unknown entities leave the raw text in place.
        let doc = table_of("<p>x &unknown; y</p>");
        assert_eq!(doc.root().find("p").unwrap().text(), "x &unknown; y");
    }

    #[test]
    fn test_extract_first_table_in_preorder() {
        let doc = table_of(
            "<div><div><table id=\"inner\"></table></div></div><table id=\"second\"></table>",
        );
        assert_eq!(extract_table(&doc).unwrap().attr("id"), Some("inner"));
    }

    #[test]
    fn test_table_not_found() {
        let doc = table_of("<html><body><h1>x</h1></body></html>");
        assert!(matches!(
            extract_table(&doc),
            Err(CovcrawlError::TableNotFound)
        ));
    }

    #[test]
    fn test_no_header() {
        let doc = table_of("<table><tbody><tr><td>a</td></tr></tbody></table>");
        let table = extract_table(&doc).unwrap();
        assert!(matches!(
            count_columns(table),
            Err(CovcrawlError::NoHeaderFound)
        ));
        assert!(matches!(
            walk_rows(table, |_, _| Ok(())),
            Err(CovcrawlError::NoHeaderFound)
        ));
    }

    #[test]
    fn test_walk_rows_order_and_links() {
        let doc = table_of(
            r#"<table>
                 <thead><tr><th>Element</th><th>Cov.</th></tr></thead>
                 <tfoot><tr><td>Total</td><td>50%</td></tr></tfoot>
                 <tbody>
                   <tr><td><a href="a/index.html">a</a></td><td>10%</td></tr>
                   <tr><td><span>b</span></td><td>20%</td></tr>
                 </tbody>
               </table>"#,
        );
        let table = extract_table(&doc).unwrap();
        let mut seen = Vec::new();
        walk_rows(table, |cell, columns| {
            assert_eq!(columns, 2);
            seen.push(cell);
            Ok(())
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![
                Cell::link("a", "a/index.html"),
                Cell::text("10%"),
                Cell::text("b"),
                Cell::text("20%"),
            ]
        );
    }

    #[test]
    fn test_walk_rows_row_length_mismatch() {
        let doc = table_of(
            "<table><thead><tr><td>A</td><td>B</td></tr></thead>\
             <tbody><tr><td>1</td><td>2</td></tr><tr><td>3</td></tr></tbody></table>",
        );
        let table = extract_table(&doc).unwrap();
        let err = walk_rows(table, |_, _| Ok(())).unwrap_err();
        assert!(matches!(
            err,
            CovcrawlError::RowLengthMismatch {
                row: 1,
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn test_walk_jacoco_package_page() {
        let input = include_bytes!("../tests/fixtures/site/com.acme/index.html");
        let doc = Document::parse(input).unwrap();
        let table = extract_table(&doc).unwrap();
        assert_eq!(count_columns(table).unwrap(), 13);

        let mut cells = Vec::new();
        walk_rows(table, |cell, _| {
            cells.push(cell);
            Ok(())
        })
        .unwrap();
        assert_eq!(cells.len(), 26);
        assert_eq!(cells[0], Cell::link("Foo", "Foo.html"));
        // Bar-chart cells hold only images.
        assert_eq!(cells[1], Cell::text(""));
        assert_eq!(cells[2].text, "74%");
        assert_eq!(cells[13], Cell::link("Bar", "Bar.html"));
    }

    #[test]
    fn test_cell_encoding() {
        let cell = Cell::link("a=b; 100%", "Foo.java.html#L10");
        let encoded = cell.to_string();
        assert_eq!(encoded, "text=a%3Db%3B 100%25;href=Foo.java.html#L10;");
        assert_eq!(encoded.parse::<Cell>().unwrap(), cell);

        assert_eq!("text=42;".parse::<Cell>().unwrap(), Cell::text("42"));
        assert_eq!("".parse::<Cell>().unwrap(), Cell::default());
    }

    #[test]
    fn test_cell_malformed() {
        for payload in ["garbage", "text=1;bogus", "colour=red;", "text=50%;"] {
            let err = payload.parse::<Cell>().unwrap_err();
            assert!(
                matches!(err, CovcrawlError::MalformedCell(ref p) if p == payload),
                "{payload}: {err}"
            );
        }
    }
}
