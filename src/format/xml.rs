// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Lossless XML tree for in-place edits of a diagram body.
//!
//! Elements keep their original start-tag text until an attribute is changed, and text,
//! comments, CDATA and declarations are kept as written, so serializing an unmodified tree
//! reproduces the input. Edits touch only the elements they change.

use std::borrow::Cow;
use std::fmt;

use quick_xml::escape::{escape, unescape};
use quick_xml::events::attributes::AttrError;
use quick_xml::events::Event;
use quick_xml::Reader;

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("malformed XML at byte {position}: {source}")]
    Syntax {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },
    #[error("malformed XML attribute: {0}")]
    Attr(#[from] AttrError),
    #[error("malformed XML: invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed XML: <{name}> is never closed")]
    Unclosed { name: String },
    #[error("malformed XML: unexpected </{name}>")]
    UnexpectedEnd { name: String },
}

/// Handle to an element of one [`XmlTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(usize);

#[derive(Debug, Clone)]
struct Attr {
    key: String,
    /// Escaped value as it appears between the quotes.
    raw: String,
}

#[derive(Debug, Clone)]
struct Element {
    name: String,
    attrs: Vec<Attr>,
    /// Start-tag content between `<` and `>` (without a trailing `/`); `None` once edited.
    raw_start: Option<String>,
    raw_end: Option<String>,
    self_closing: bool,
    children: Vec<usize>,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element(Element),
    /// Escaped character data, entity references included.
    Text(String),
    /// Comment, CDATA, declaration, processing instruction or doctype, verbatim.
    Markup(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<usize>,
    kind: NodeKind,
}

/// Description of an element to insert with [`XmlTree::append_element`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<NewElement>,
}

impl NewElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds an attribute with an unescaped value.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    pub fn child(mut self, child: NewElement) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct XmlTree {
    nodes: Vec<Node>,
    top: Vec<usize>,
}

impl XmlTree {
    pub fn parse(input: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(input);
        let mut tree = Self::default();
        let mut stack: Vec<usize> = Vec::new();

        loop {
            let event = reader.read_event().map_err(|source| XmlError::Syntax {
                position: reader.error_position() as u64,
                source,
            })?;
            match event {
                Event::Start(e) => {
                    let element = parse_start(&e, false)?;
                    let idx = tree.push(stack.last().copied(), NodeKind::Element(element));
                    stack.push(idx);
                }
                Event::Empty(e) => {
                    let element = parse_start(&e, true)?;
                    tree.push(stack.last().copied(), NodeKind::Element(element));
                }
                Event::End(e) => {
                    let name = std::str::from_utf8(e.name().as_ref())?.to_owned();
                    let Some(open) = stack.pop() else {
                        return Err(XmlError::UnexpectedEnd { name });
                    };
                    let raw_end = std::str::from_utf8(&e)?.to_owned();
                    if let NodeKind::Element(element) = &mut tree.nodes[open].kind {
                        if element.name != name {
                            return Err(XmlError::UnexpectedEnd { name });
                        }
                        element.raw_end = Some(raw_end);
                    }
                }
                Event::Text(e) => {
                    let raw = std::str::from_utf8(&e)?;
                    tree.push_text(stack.last().copied(), raw);
                }
                Event::GeneralRef(e) => {
                    let raw = format!("&{};", std::str::from_utf8(&e)?);
                    tree.push_text(stack.last().copied(), &raw);
                }
                Event::CData(e) => {
                    let raw = format!("<![CDATA[{}]]>", std::str::from_utf8(&e)?);
                    tree.push(stack.last().copied(), NodeKind::Markup(raw));
                }
                Event::Comment(e) => {
                    let raw = format!("<!--{}-->", std::str::from_utf8(&e)?);
                    tree.push(stack.last().copied(), NodeKind::Markup(raw));
                }
                Event::Decl(e) => {
                    let raw = format!("<?{}?>", std::str::from_utf8(&e)?);
                    tree.push(stack.last().copied(), NodeKind::Markup(raw));
                }
                Event::PI(e) => {
                    let raw = format!("<?{}?>", std::str::from_utf8(&e)?);
                    tree.push(stack.last().copied(), NodeKind::Markup(raw));
                }
                Event::DocType(e) => {
                    let raw = format!("<!DOCTYPE {}>", std::str::from_utf8(&e)?.trim());
                    tree.push(stack.last().copied(), NodeKind::Markup(raw));
                }
                Event::Eof => break,
            }
        }

        if let Some(open) = stack.pop() {
            let name = tree.element(open).map(|e| e.name.clone()).unwrap_or_default();
            return Err(XmlError::Unclosed { name });
        }
        Ok(tree)
    }

    fn push(&mut self, parent: Option<usize>, kind: NodeKind) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node { parent, kind });
        match parent {
            Some(parent) => {
                if let NodeKind::Element(element) = &mut self.nodes[parent].kind {
                    element.children.push(idx);
                }
            }
            None => self.top.push(idx),
        }
        idx
    }

    fn push_text(&mut self, parent: Option<usize>, raw: &str) {
        let siblings = match parent {
            Some(parent) => self.element(parent).map(|e| e.children.as_slice()),
            None => Some(self.top.as_slice()),
        };
        if let Some(&last) = siblings.and_then(|s| s.last()) {
            if let NodeKind::Text(text) = &mut self.nodes[last].kind {
                text.push_str(raw);
                return;
            }
        }
        self.push(parent, NodeKind::Text(raw.to_owned()));
    }

    fn element(&self, idx: usize) -> Option<&Element> {
        match &self.nodes[idx].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, idx: usize) -> Option<&mut Element> {
        match &mut self.nodes[idx].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Top-level elements in document order.
    pub fn roots(&self) -> Vec<ElementId> {
        self.top
            .iter()
            .copied()
            .filter(|&idx| self.element(idx).is_some())
            .map(ElementId)
            .collect()
    }

    /// Every attached element in document order.
    pub fn elements(&self) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self.top.iter().rev().copied().collect();
        while let Some(idx) = stack.pop() {
            if let Some(element) = self.element(idx) {
                out.push(ElementId(idx));
                stack.extend(element.children.iter().rev().copied());
            }
        }
        out
    }

    /// Element descendants of `id` in document order, `id` excluded.
    pub fn descendants(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self.child_indices(id).iter().rev().copied().collect();
        while let Some(idx) = stack.pop() {
            if let Some(element) = self.element(idx) {
                out.push(ElementId(idx));
                stack.extend(element.children.iter().rev().copied());
            }
        }
        out
    }

    fn child_indices(&self, id: ElementId) -> &[usize] {
        self.element(id.0)
            .map(|e| e.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn children(&self, id: ElementId) -> Vec<ElementId> {
        self.child_indices(id)
            .iter()
            .copied()
            .filter(|&idx| self.element(idx).is_some())
            .map(ElementId)
            .collect()
    }

    pub fn first_child_named(&self, id: ElementId, name: &str) -> Option<ElementId> {
        self.children(id).into_iter().find(|&c| self.name(c) == name)
    }

    pub fn find_first(&self, name: &str) -> Option<ElementId> {
        self.elements().into_iter().find(|&id| self.name(id) == name)
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.nodes[id.0].parent.map(ElementId)
    }

    pub fn name(&self, id: ElementId) -> &str {
        self.element(id.0).map(|e| e.name.as_str()).unwrap_or("")
    }

    /// Unescaped attribute value. Values with entities XML does not define are returned raw.
    pub fn attr(&self, id: ElementId, key: &str) -> Option<Cow<'_, str>> {
        let raw = self.raw_attr(id, key)?;
        Some(unescape(raw).unwrap_or(Cow::Borrowed(raw)))
    }

    pub fn raw_attr(&self, id: ElementId, key: &str) -> Option<&str> {
        self.element(id.0)?
            .attrs
            .iter()
            .find(|attr| attr.key == key)
            .map(|attr| attr.raw.as_str())
    }

    pub fn has_attr(&self, id: ElementId, key: &str) -> bool {
        self.raw_attr(id, key).is_some()
    }

    /// Sets an attribute to an unescaped value. Returns `false` when the value was already set.
    pub fn set_attr(&mut self, id: ElementId, key: &str, value: &str) -> bool {
        let raw = escape_attr(value);
        let Some(element) = self.element_mut(id.0) else {
            return false;
        };
        match element.attrs.iter_mut().find(|attr| attr.key == key) {
            Some(attr) if attr.raw == raw => return false,
            Some(attr) => attr.raw = raw,
            None => element.attrs.push(Attr {
                key: key.to_owned(),
                raw,
            }),
        }
        element.raw_start = None;
        true
    }

    pub fn remove_attr(&mut self, id: ElementId, key: &str) -> bool {
        let Some(element) = self.element_mut(id.0) else {
            return false;
        };
        let before = element.attrs.len();
        element.attrs.retain(|attr| attr.key != key);
        if element.attrs.len() == before {
            return false;
        }
        element.raw_start = None;
        true
    }

    /// Detaches an element (and its subtree) together with the whitespace text before it.
    pub fn remove(&mut self, id: ElementId) {
        let Some(parent) = self.nodes[id.0].parent else {
            self.top.retain(|&idx| idx != id.0);
            return;
        };
        let leading_ws = {
            let siblings = self.child_indices(ElementId(parent));
            siblings
                .iter()
                .position(|&idx| idx == id.0)
                .and_then(|pos| pos.checked_sub(1))
                .map(|pos| siblings[pos])
                .filter(|&prev| {
                    matches!(&self.nodes[prev].kind, NodeKind::Text(t) if t.trim().is_empty())
                })
        };
        if let Some(element) = self.element_mut(parent) {
            element
                .children
                .retain(|&idx| idx != id.0 && Some(idx) != leading_ws);
        }
        self.nodes[id.0].parent = None;
    }

    /// Appends `new` as the last element child of `parent`, indented like its siblings.
    pub fn append_element(&mut self, parent: ElementId, new: &NewElement) -> ElementId {
        let (insert_at, separator) = self.insertion_point(parent);
        let mut inserted = Vec::new();
        if !separator.is_empty() {
            inserted.push(self.alloc(Some(parent.0), NodeKind::Text(separator.clone())));
        }
        let child = self.build(parent.0, new, &separator);
        inserted.push(child);

        if let Some(element) = self.element_mut(parent.0) {
            if element.self_closing {
                element.self_closing = false;
                element.raw_end = None;
            }
            let at = insert_at.min(element.children.len());
            element.children.splice(at..at, inserted);
        }
        ElementId(child)
    }

    /// Where to insert the next element child and the whitespace to put before it.
    fn insertion_point(&self, parent: ElementId) -> (usize, String) {
        let children = self.child_indices(parent);
        let last_element = children
            .iter()
            .rposition(|&idx| self.element(idx).is_some());
        match last_element {
            Some(pos) => {
                let separator = pos
                    .checked_sub(1)
                    .and_then(|prev| match &self.nodes[children[prev]].kind {
                        NodeKind::Text(text) if text.trim().is_empty() => Some(text.clone()),
                        _ => None,
                    })
                    .unwrap_or_default();
                (pos + 1, separator)
            }
            None => match children.last().map(|&idx| &self.nodes[idx].kind) {
                Some(NodeKind::Text(text)) if text.trim().is_empty() && text.contains('\n') => {
                    (children.len() - 1, format!("{text}  "))
                }
                _ => (children.len(), String::new()),
            },
        }
    }

    fn alloc(&mut self, parent: Option<usize>, kind: NodeKind) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node { parent, kind });
        idx
    }

    fn build(&mut self, parent: usize, new: &NewElement, separator: &str) -> usize {
        let idx = self.alloc(
            Some(parent),
            NodeKind::Element(Element {
                name: new.name.clone(),
                attrs: new
                    .attrs
                    .iter()
                    .map(|(key, value)| Attr {
                        key: key.clone(),
                        raw: escape_attr(value),
                    })
                    .collect(),
                raw_start: None,
                raw_end: None,
                self_closing: new.children.is_empty(),
                children: Vec::new(),
            }),
        );

        let inner_separator = if separator.is_empty() {
            String::new()
        } else {
            format!("{separator}  ")
        };
        let mut children = Vec::new();
        for child in &new.children {
            if !inner_separator.is_empty() {
                children.push(self.alloc(Some(idx), NodeKind::Text(inner_separator.clone())));
            }
            children.push(self.build(idx, child, &inner_separator));
        }
        if !new.children.is_empty() && !separator.is_empty() {
            children.push(self.alloc(Some(idx), NodeKind::Text(separator.to_owned())));
        }
        if let Some(element) = self.element_mut(idx) {
            element.children = children;
        }
        idx
    }

    fn write_node(&self, idx: usize, out: &mut String) {
        match &self.nodes[idx].kind {
            NodeKind::Text(raw) | NodeKind::Markup(raw) => out.push_str(raw),
            NodeKind::Element(element) => {
                out.push('<');
                match &element.raw_start {
                    Some(raw) => out.push_str(raw),
                    None => write_start(element, out),
                }
                if element.self_closing && element.children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for &child in &element.children {
                    self.write_node(child, out);
                }
                out.push_str("</");
                out.push_str(element.raw_end.as_deref().unwrap_or(&element.name));
                out.push('>');
            }
        }
    }

    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        for &idx in &self.top {
            self.write_node(idx, &mut out);
        }
        out
    }
}

impl fmt::Display for XmlTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml_string())
    }
}

fn parse_start(
    e: &quick_xml::events::BytesStart<'_>,
    self_closing: bool,
) -> Result<Element, XmlError> {
    let name = std::str::from_utf8(e.name().as_ref())?.to_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        attrs.push(Attr {
            key: std::str::from_utf8(attr.key.as_ref())?.to_owned(),
            raw: std::str::from_utf8(&attr.value)?.to_owned(),
        });
    }
    Ok(Element {
        name,
        attrs,
        raw_start: Some(std::str::from_utf8(e)?.to_owned()),
        raw_end: None,
        self_closing,
        children: Vec::new(),
    })
}

fn write_start(element: &Element, out: &mut String) {
    out.push_str(&element.name);
    for attr in &element.attrs {
        let quote = if attr.raw.contains('"') { '\'' } else { '"' };
        out.push(' ');
        out.push_str(&attr.key);
        out.push('=');
        out.push(quote);
        out.push_str(&attr.raw);
        out.push(quote);
    }
}

fn escape_attr(value: &str) -> String {
    escape(value).replace('\n', "&#xa;")
}
