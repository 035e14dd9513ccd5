//! Small element tree over `quick-xml` events.
//!
//! Feed elements such as `<title>` may wrap their text in nested markup
//! (`<title><a href="/x">Headline</a></title>`). Reading only the direct
//! text of such an element yields nothing, so text is always gathered
//! recursively through every descendant with [`XmlElement::text`].

use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    /// Qualified name as written, e.g. `dc:creator`.
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First child whose local name is `local`.
    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.local_name() == local)
    }

    /// First child whose qualified name is exactly `name`.
    pub fn child_qualified(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.elements().filter(move |e| e.local_name() == local)
    }

    /// All text in this element and its descendants, trimmed.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out.trim().to_string()
    }

    /// Trimmed recursive text of the first child named `local`.
    pub fn child_text(&self, local: &str) -> Option<String> {
        self.child(local).map(XmlElement::text)
    }
}

fn collect_text(elem: &XmlElement, out: &mut String) {
    for child in &elem.children {
        match child {
            XmlNode::Text(t) => out.push_str(t),
            XmlNode::Element(e) => collect_text(e, out),
        }
    }
}

fn utf8(bytes: &[u8]) -> Result<&str, ParseError> {
    std::str::from_utf8(bytes).map_err(|e| ParseError::Xml(e.to_string()))
}

fn open_element(start: &BytesStart<'_>) -> Result<XmlElement, ParseError> {
    let name = utf8(start.name().as_ref())?.to_string();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::Xml(e.to_string()))?;
        let key = utf8(attr.key.as_ref())?.to_string();
        let raw = utf8(&attr.value)?;
        let value = unescape(raw)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| raw.to_string());
        attrs.push((key, value));
    }
    Ok(XmlElement {
        name,
        attrs,
        children: Vec::new(),
    })
}

fn push_text(stack: &mut [XmlElement], text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(top) = stack.last_mut() {
        if let Some(XmlNode::Text(prev)) = top.children.last_mut() {
            prev.push_str(&text);
        } else {
            top.children.push(XmlNode::Text(text));
        }
    }
}

/// Parse a whole document and return its root element.
pub fn parse_document(xml: &str) -> Result<XmlElement, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            ParseError::Xml(format!("at byte {}: {e}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(start) => stack.push(open_element(&start)?),
            Event::Empty(start) => {
                let elem = open_element(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(elem)),
                    None => root = root.or(Some(elem)),
                }
            }
            Event::End(_) => {
                let elem = stack
                    .pop()
                    .ok_or_else(|| ParseError::Xml("unbalanced end tag".into()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(elem)),
                    None => root = root.or(Some(elem)),
                }
            }
            Event::Text(t) => {
                let raw = utf8(&t)?;
                let text = unescape(raw)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| raw.to_string());
                push_text(&mut stack, text);
            }
            Event::CData(c) => {
                let text = utf8(&c)?.to_string();
                push_text(&mut stack, text);
            }
            Event::GeneralRef(r) => {
                // Entity references arrive separately from the text around them.
                let name = utf8(&r)?;
                let literal = format!("&{name};");
                let text = unescape(&literal)
                    .map(|v| v.into_owned())
                    .unwrap_or(literal);
                push_text(&mut stack, text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ParseError::Xml(format!(
            "unexpected end of document inside <{}>",
            stack.last().map(|e| e.name.as_str()).unwrap_or_default()
        )));
    }
    root.ok_or_else(|| ParseError::Xml("empty document".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_markup_text_is_collected() {
        let doc = parse_document(r#"<item><title><a href="/x">News Here</a></title></item>"#).unwrap();
        assert_eq!(doc.child_text("title").unwrap(), "News Here");
    }

    #[test]
    fn mixed_text_and_tails_are_joined_in_order() {
        let doc = parse_document("<d>Hello <b>bold</b> world <i>again</i>!</d>").unwrap();
        assert_eq!(doc.text(), "Hello bold world again!");
    }

    #[test]
    fn entities_and_cdata_are_decoded() {
        let doc = parse_document("<d>Tom &amp; Jerry <![CDATA[<p>raw</p>]]> &#169;</d>").unwrap();
        assert_eq!(doc.text(), "Tom & Jerry <p>raw</p> ©");
    }

    #[test]
    fn attributes_and_prefixed_names() {
        let doc = parse_document(
            r#"<feed xmlns:dc="http://purl.org/dc/elements/1.1/"><link href="https://a.test/?x=1&amp;y=2"/><dc:creator>Ann</dc:creator></feed>"#,
        )
        .unwrap();
        assert_eq!(doc.child("link").unwrap().attr("href"), Some("https://a.test/?x=1&y=2"));
        assert_eq!(doc.child("creator").unwrap().text(), "Ann");
        assert!(doc.child_qualified("dc:creator").is_some());
    }

    #[test]
    fn truncated_document_is_an_error() {
        assert!(parse_document("<rss><channel><item>").is_err());
        assert!(parse_document("").is_err());
    }
}
