// 📄 Document Model - Parsed XML plus its raw text
// Immutable element arena in document order, queried by local tag name

use crate::error::{BralnikError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashSet;

// ============================================================================
// ARENA TYPES
// ============================================================================

#[derive(Debug, Clone)]
enum Node {
    Element(usize),
    Text(String),
}

#[derive(Debug, Clone)]
struct Element {
    name: String,
    children: Vec<Node>,
    /// One past the last descendant index (elements are stored in pre-order)
    end: usize,
}

/// A parsed cadastral document.
///
/// Owned by one extraction call and never mutated after `parse`.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    file_name: String,
    raw: String,
    elements: Vec<Element>,
}

/// Borrowed view of one element.
#[derive(Debug, Clone, Copy)]
pub struct ElementRef<'a> {
    doc: &'a XmlDocument,
    id: usize,
}

// ============================================================================
// PARSING
// ============================================================================

impl XmlDocument {
    /// Parse a whole document. Ill-formed XML is the one failure reported
    /// for a document as a whole.
    pub fn parse(file_name: &str, raw: String) -> Result<Self> {
        let elements = build_elements(file_name, &raw)?;

        Ok(XmlDocument {
            file_name: file_name.to_string(),
            raw,
            elements,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The document exactly as read.
    pub fn raw_text(&self) -> &str {
        &self.raw
    }

    /// All elements with the given local name, in document order.
    pub fn elements_by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.elements
            .iter()
            .enumerate()
            .filter(move |(_, el)| el.name == tag)
            .map(move |(id, _)| ElementRef { doc: self, id })
    }

    pub fn count_by_tag(&self, tag: &str) -> usize {
        self.elements.iter().filter(|el| el.name == tag).count()
    }

    /// Trimmed text of the first element with this tag.
    pub fn first_text(&self, tag: &str) -> Option<String> {
        self.elements_by_tag(tag)
            .next()
            .map(|el| el.text_content().trim().to_string())
    }

    /// Non-empty trimmed texts of every element with this tag, first
    /// occurrence order, duplicates removed.
    pub fn unique_texts(&self, tag: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut values = Vec::new();

        for el in self.elements_by_tag(tag) {
            let text = el.text_content().trim().to_string();
            if !text.is_empty() && seen.insert(text.clone()) {
                values.push(text);
            }
        }

        values
    }
}

fn malformed(file_name: &str, reason: impl Into<String>) -> BralnikError {
    BralnikError::MalformedDocument {
        file_name: file_name.to_string(),
        reason: reason.into(),
    }
}

fn open_element(elements: &mut Vec<Element>, stack: &[usize], name: String) -> usize {
    let id = elements.len();
    elements.push(Element {
        name,
        children: Vec::new(),
        end: id + 1,
    });
    if let Some(&parent) = stack.last() {
        elements[parent].children.push(Node::Element(id));
    }
    id
}

fn push_text(elements: &mut [Element], stack: &[usize], text: String) {
    // Text outside the root element (whitespace between declarations) is dropped
    if let Some(&parent) = stack.last() {
        elements[parent].children.push(Node::Text(text));
    }
}

fn build_elements(file_name: &str, raw: &str) -> Result<Vec<Element>> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().check_end_names = true;

    let mut elements: Vec<Element> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let id = open_element(&mut elements, &stack, name);
                stack.push(id);
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                open_element(&mut elements, &stack, name);
            }
            Ok(Event::End(_)) => {
                let id = stack
                    .pop()
                    .ok_or_else(|| malformed(file_name, "closing tag without opening tag"))?;
                elements[id].end = elements.len();
            }
            Ok(Event::Text(e)) => {
                let text = match e.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(_) => String::from_utf8_lossy(&e).into_owned(),
                };
                push_text(&mut elements, &stack, text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                push_text(&mut elements, &stack, text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(file_name, e.to_string())),
        }
    }

    if let Some(&open) = stack.last() {
        return Err(malformed(
            file_name,
            format!("unclosed element <{}>", elements[open].name),
        ));
    }

    if elements.is_empty() {
        return Err(malformed(file_name, "no root element"));
    }

    Ok(elements)
}

// ============================================================================
// ELEMENT VIEW
// ============================================================================

impl<'a> ElementRef<'a> {
    pub fn name(&self) -> &'a str {
        &self.doc.elements[self.id].name
    }

    /// Descendants (not self) with the given local name, in document order.
    pub fn descendants_by_tag(&self, tag: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        let doc = self.doc;
        let range = (self.id + 1)..doc.elements[self.id].end;
        range
            .filter(move |&id| doc.elements[id].name == tag)
            .map(move |id| ElementRef { doc, id })
    }

    /// Concatenated text and CDATA of every descendant, untrimmed.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(self.id, &mut out);
        out
    }

    fn collect_text(&self, id: usize, out: &mut String) {
        for child in &self.doc.elements[id].children {
            match child {
                Node::Text(text) => out.push_str(text),
                Node::Element(child_id) => self.collect_text(*child_id, out),
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ns:elaborat xmlns:ns="urn:test">
  <pooblascenecId> 4711 </pooblascenecId>
  <katastrskiPostopek>
    <vrstaKatastrskegaPostopka>Parcelacija</vrstaKatastrskegaPostopka>
    <sestavina><sestavinaEid>1001</sestavinaEid></sestavina>
  </katastrskiPostopek>
  <katastrskiPostopek>
    <vrstaKatastrskegaPostopka>Parcelacija</vrstaKatastrskegaPostopka>
    <sestavina><sestavinaEid>1002</sestavinaEid></sestavina>
    <prazno/>
  </katastrskiPostopek>
  <datoteka><![CDATA[{"tip":"x"}]]></datoteka>
</ns:elaborat>"#;

    fn sample() -> XmlDocument {
        XmlDocument::parse("sample.xml", SAMPLE.to_string()).unwrap()
    }

    #[test]
    fn test_parse_and_count() {
        let doc = sample();
        assert_eq!(doc.file_name(), "sample.xml");
        assert_eq!(doc.count_by_tag("katastrskiPostopek"), 2);
        assert_eq!(doc.count_by_tag("elaborat"), 1);
        assert_eq!(doc.count_by_tag("prazno"), 1);
        assert_eq!(doc.count_by_tag("missing"), 0);
    }

    #[test]
    fn test_first_text_trims() {
        let doc = sample();
        assert_eq!(doc.first_text("pooblascenecId"), Some("4711".to_string()));
        assert_eq!(doc.first_text("missing"), None);
    }

    #[test]
    fn test_unique_texts_keeps_first_order() {
        let doc = sample();
        assert_eq!(
            doc.unique_texts("vrstaKatastrskegaPostopka"),
            vec!["Parcelacija".to_string()]
        );
    }

    #[test]
    fn test_descendants_are_scoped() {
        let doc = sample();
        let procedures: Vec<_> = doc.elements_by_tag("katastrskiPostopek").collect();
        assert_eq!(procedures.len(), 2);

        let first: Vec<String> = procedures[0]
            .descendants_by_tag("sestavinaEid")
            .map(|el| el.text_content())
            .collect();
        assert_eq!(first, vec!["1001".to_string()]);

        let second: Vec<String> = procedures[1]
            .descendants_by_tag("sestavinaEid")
            .map(|el| el.text_content())
            .collect();
        assert_eq!(second, vec!["1002".to_string()]);
    }

    #[test]
    fn test_cdata_text_content() {
        let doc = sample();
        let payload = doc.elements_by_tag("datoteka").next().unwrap();
        assert_eq!(payload.name(), "datoteka");
        assert_eq!(payload.text_content(), r#"{"tip":"x"}"#);
    }

    #[test]
    fn test_escaped_text_is_unescaped() {
        let doc = XmlDocument::parse("e.xml", "<a><b>x &amp; y</b></a>".to_string()).unwrap();
        assert_eq!(doc.first_text("b"), Some("x & y".to_string()));
    }

    #[test]
    fn test_raw_text_preserved() {
        let doc = sample();
        assert_eq!(doc.raw_text(), SAMPLE);
    }

    #[test]
    fn test_mismatched_tag_is_malformed() {
        let result = XmlDocument::parse("bad.xml", "<a><b></a>".to_string());
        assert!(matches!(result, Err(BralnikError::MalformedDocument { .. })));
    }

    #[test]
    fn test_unclosed_tag_is_malformed() {
        let result = XmlDocument::parse("bad.xml", "<a><b>text</b>".to_string());
        assert!(matches!(result, Err(BralnikError::MalformedDocument { .. })));
    }

    #[test]
    fn test_empty_input_is_malformed() {
        let result = XmlDocument::parse("empty.xml", "   ".to_string());
        assert!(matches!(result, Err(BralnikError::MalformedDocument { .. })));
    }
}
