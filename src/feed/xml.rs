//! Streaming XML element reader.
//!
//! Feed documents run to hundreds of megabytes, so the whole document is
//! never materialized. `ElementStream` is a pull iterator over
//! `quick_xml::Reader` that yields one [`Element`] per fully-closed watched
//! tag; only the subtree of the currently-open watched element is buffered.
//! Because the consumer pulls the next element only after its database write
//! completed, the pull loop is the pause/resume backpressure contract: at any
//! time memory holds one subtree plus one in-flight write.

use std::io::BufRead;

use anyhow::{bail, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

/// A fully-closed XML element: tag name, accumulated text, and closed child
/// elements. Tag lookups are case-insensitive because chains disagree on
/// casing (`ChainID` / `ChainId` / `CHAINID`).
#[derive(Debug, Clone, Default)]
pub struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn named(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_named(&self, tag: &str) -> bool {
        self.name.eq_ignore_ascii_case(tag)
    }

    /// Trimmed text content of this element.
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Trimmed text of the first direct child with the given tag name.
    pub fn child_text(&self, tag: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|c| c.is_named(tag))
            .map(|c| c.text())
    }

    /// Like [`Self::child_text`] but returns "" when the child is absent.
    pub fn field(&self, tag: &str) -> String {
        self.child_text(tag).unwrap_or("").to_string()
    }
}

/// Pull iterator yielding one [`Element`] per closed watched tag.
pub struct ElementStream<R: BufRead> {
    reader: Reader<R>,
    watched: Vec<String>,
    buf: Vec<u8>,
}

impl<R: BufRead> ElementStream<R> {
    pub fn new(source: R, watched: &[&str]) -> Self {
        Self {
            reader: Reader::from_reader(source),
            watched: watched.iter().map(|t| t.to_string()).collect(),
            buf: Vec::new(),
        }
    }

    fn is_watched(&self, name: &str) -> bool {
        self.watched.iter().any(|w| w.eq_ignore_ascii_case(name))
    }

    /// Next closed watched element, or `None` at end of document.
    /// Malformed XML is a hard error: the document cannot be trusted past it.
    pub fn next_element(&mut self) -> Result<Option<Element>> {
        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .with_context(|| {
                    format!("xml error at byte {}", self.reader.buffer_position())
                })?;
            match event {
                Event::Start(start) => {
                    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                    if self.is_watched(&name) {
                        return Ok(Some(self.collect_subtree(name)?));
                    }
                }
                Event::Empty(start) => {
                    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                    if self.is_watched(&name) {
                        return Ok(Some(Element::named(name)));
                    }
                }
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }

    // Buffers exactly one subtree: the watched element that just opened.
    fn collect_subtree(&mut self, root_name: String) -> Result<Element> {
        let mut stack: Vec<Element> = vec![Element::named(root_name)];
        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .with_context(|| {
                    format!("xml error at byte {}", self.reader.buffer_position())
                })?;
            match event {
                Event::Start(start) => {
                    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                    stack.push(Element::named(name));
                }
                Event::Empty(start) => {
                    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Element::named(name));
                    }
                }
                Event::Text(text) => {
                    let decoded = match text.unescape() {
                        Ok(cow) => cow.into_owned(),
                        // best-effort: feeds occasionally carry raw ampersands
                        Err(_) => String::from_utf8_lossy(text.as_ref()).into_owned(),
                    };
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&decoded);
                    }
                }
                Event::CData(cdata) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(cdata.as_ref()));
                    }
                }
                Event::End(_) => {
                    let done = match stack.pop() {
                        Some(el) => el,
                        None => bail!("unbalanced end tag"),
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(done),
                        None => return Ok(done),
                    }
                }
                Event::Eof => bail!("document ended inside an open element"),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream<'a>(xml: &'a str, watched: &[&str]) -> ElementStream<&'a [u8]> {
        ElementStream::new(xml.as_bytes(), watched)
    }

    #[test]
    fn yields_watched_leaves_in_document_order() {
        let xml = "<Root><ChainId>7290</ChainId><Other>x</Other><ChainName>שופרסל</ChainName></Root>";
        let mut s = stream(xml, &["ChainId", "ChainName"]);
        let first = s.next_element().unwrap().unwrap();
        assert!(first.is_named("CHAINID"));
        assert_eq!(first.text(), "7290");
        let second = s.next_element().unwrap().unwrap();
        assert_eq!(second.text(), "שופרסל");
        assert!(s.next_element().unwrap().is_none());
    }

    #[test]
    fn matches_tags_case_insensitively() {
        let xml = "<Root><CHAINID> 123 </CHAINID></Root>";
        let mut s = stream(xml, &["ChainId"]);
        let el = s.next_element().unwrap().unwrap();
        assert_eq!(el.text(), "123");
    }

    #[test]
    fn container_element_exposes_children_by_tag() {
        let xml = "<Stores><Store><StoreID>054</StoreID><StoreName>סניף מרכז</StoreName>\
                   <Address>הרצל 1</Address><City>תל אביב</City></Store></Stores>";
        let mut s = stream(xml, &["Store"]);
        let store = s.next_element().unwrap().unwrap();
        assert_eq!(store.child_text("StoreId"), Some("054"));
        assert_eq!(store.field("City"), "תל אביב");
        assert_eq!(store.field("SubChainId"), "");
    }

    #[test]
    fn nested_watched_tag_inside_subtree_stays_a_child() {
        // SubChainId is watched at document level, but when a chain nests it
        // inside Store it must arrive as a child of the store record.
        let xml = "<Root><Store><StoreID>1</StoreID><SubChainID>5</SubChainID></Store>\
                   <SubChainID>9</SubChainID></Root>";
        let mut s = stream(xml, &["Store", "SubChainId"]);
        let store = s.next_element().unwrap().unwrap();
        assert!(store.is_named("Store"));
        assert_eq!(store.child_text("SubChainId"), Some("5"));
        let top = s.next_element().unwrap().unwrap();
        assert!(top.is_named("SubChainId"));
        assert_eq!(top.text(), "9");
    }

    #[test]
    fn truncated_document_is_an_error() {
        let xml = "<Root><Item><ItemCode>123";
        let mut s = stream(xml, &["Item"]);
        assert!(s.next_element().is_err());
    }

    #[test]
    fn empty_element_yields_empty_fields() {
        let xml = "<Root><Item/></Root>";
        let mut s = stream(xml, &["Item"]);
        let el = s.next_element().unwrap().unwrap();
        assert_eq!(el.text(), "");
        assert_eq!(el.field("ItemCode"), "");
    }
}
