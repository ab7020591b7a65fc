// src/document.rs

//! Attributed-tree XML documents
//!
//! A minimal element tree (name, attributes, text, children) with a
//! `quick-xml` reader and writer. The registry builds one of these from its
//! in-memory model when a product is flushed and walks one when a product is
//! opened; nothing else in the crate touches XML directly.

use crate::error::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fs::{self, Permissions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// One element of a document tree
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    /// Create an empty element
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create an element holding only text content
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    /// Get an attribute value
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing any previous value
    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    /// Builder form of [`Element::set_attr`]
    pub fn attr_with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Text content, as written
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Child elements in document order
    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// Append a child element
    pub fn push_child(&mut self, child: Element) {
        self.children.push(child);
    }
}

/// A parsed or freshly built XML document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub root: Element,
}

impl Document {
    /// Create a document around a root element
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    /// Parse a document from a file
    pub fn parse_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::parse_str(&content)
            .map_err(|e| Error::MalformedDocument(format!("{}: {}", path.display(), e)))
    }

    /// Parse a document from a string
    pub fn parse_str(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);

        let mut buf = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    stack.push(element_from_start(&e)?);
                }
                Ok(Event::Empty(e)) => {
                    let element = element_from_start(&e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(t)) => {
                    if let Some(top) = stack.last_mut() {
                        let text = t
                            .unescape()
                            .map_err(|e| Error::MalformedDocument(format!("Bad text content: {}", e)))?;
                        // Indentation between elements; content keeps its whitespace
                        if !text.trim().is_empty() {
                            top.text.push_str(&text);
                        }
                    }
                }
                Ok(Event::CData(c)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| Error::MalformedDocument("Unbalanced closing tag".to_string()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::MalformedDocument(format!(
                        "Parse error at position {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
                _ => {}
            }
            buf.clear();
        }

        if let Some(open) = stack.last() {
            return Err(Error::MalformedDocument(format!("Unclosed element <{}>", open.name)));
        }

        root.map(Self::new)
            .ok_or_else(|| Error::MalformedDocument("Document has no root element".to_string()))
    }

    /// Serialize to an indented XML string
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(serialize_error)?;
        write_element(&mut writer, &self.root)?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).map_err(|e| Error::IoError(format!("Serialized document is not UTF-8: {}", e)))
    }

    /// Write the document to `path`
    ///
    /// The content goes to a temporary file in the same directory which is
    /// then renamed over `path`, so readers never observe a partial document.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let xml = self.to_xml()?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut temp = NamedTempFile::new_in(dir)
            .map_err(|e| Error::IoError(format!("Failed to create temporary file in {}: {}", dir.display(), e)))?;
        temp.write_all(xml.as_bytes())?;
        temp.as_file().set_permissions(Permissions::from_mode(0o644))?;
        temp.persist(path)
            .map_err(|e| Error::IoError(format!("Failed to write {}: {}", path.display(), e.error)))?;

        debug!("Wrote {} bytes to {}", xml.len(), path.display());
        Ok(())
    }
}

fn element_from_start(start: &BytesStart) -> Result<Element> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());

    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::MalformedDocument(format!("Bad attribute in <{}>: {}", element.name, e)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::MalformedDocument(format!("Bad attribute value for {}: {}", key, e)))?
            .into_owned();
        element.attributes.push((key, value));
    }

    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        Ok(())
    } else if root.is_none() {
        *root = Some(element);
        Ok(())
    } else {
        Err(Error::MalformedDocument(format!(
            "Second root element <{}>",
            element.name
        )))
    }
}

fn write_element<W: Write>(writer: &mut Writer<W>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.text.is_empty() && element.children.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(serialize_error);
    }

    writer.write_event(Event::Start(start)).map_err(serialize_error)?;
    if !element.text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&element.text)))
            .map_err(serialize_error)?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(serialize_error)
}

fn serialize_error(e: quick_xml::Error) -> Error {
    Error::IoError(format!("Failed to serialize document: {}", e))
}
