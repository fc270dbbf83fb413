//! HTML tree adapter.
//!
//! html5ever parses into an `RcDom`; the result is copied into an index
//! arena so the isolation passes can walk and edit nodes by `NodeId`
//! without reference-counted borrows.

use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, parse_fragment, LocalName, Namespace, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Doctype { name: String },
    Element { tag: String, attrs: Vec<Attr> },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct Dom {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

/// Elements serialized without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text content is written unescaped.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "noscript",
];

const HTML_NS: &str = "http://www.w3.org/1999/xhtml";

impl Dom {
    /// Parses a full document; html5ever adds any missing `html`/`head`/`body`.
    pub fn parse_document(markup: &str) -> Self {
        let rc = parse_document(RcDom::default(), Default::default()).one(markup);
        let mut dom = Dom::default();
        let children: Vec<Handle> = rc.document.children.borrow().iter().cloned().collect();
        for child in children {
            if let Some(id) = dom.import(&child, None) {
                dom.roots.push(id);
            }
        }
        dom
    }

    /// Parses markup as the contents of a `<body>`, without any wrappers.
    pub fn parse_fragment(markup: &str) -> Self {
        let context = QualName::new(None, Namespace::from(HTML_NS), LocalName::from("body"));
        let rc = parse_fragment(RcDom::default(), Default::default(), context, vec![]).one(markup);
        let mut dom = Dom::default();

        // html5ever places fragment nodes under a synthetic <html> element.
        let top: Vec<Handle> = rc.document.children.borrow().iter().cloned().collect();
        for handle in top {
            let children: Vec<Handle> = match &handle.data {
                NodeData::Element { .. } => handle.children.borrow().iter().cloned().collect(),
                _ => vec![handle.clone()],
            };
            for child in children {
                if let Some(id) = dom.import(&child, None) {
                    dom.roots.push(id);
                }
            }
        }
        dom
    }

    fn import(&mut self, handle: &Handle, parent: Option<NodeId>) -> Option<NodeId> {
        let kind = match &handle.data {
            NodeData::Doctype { name, .. } => NodeKind::Doctype {
                name: name.to_string(),
            },
            NodeData::Element { name, attrs, .. } => NodeKind::Element {
                tag: name.local.to_string(),
                attrs: attrs
                    .borrow()
                    .iter()
                    .map(|a| Attr {
                        name: attr_name(&a.name),
                        value: a.value.to_string(),
                    })
                    .collect(),
            },
            NodeData::Text { contents } => NodeKind::Text(contents.borrow().to_string()),
            NodeData::Comment { contents } => NodeKind::Comment(contents.to_string()),
            NodeData::Document | NodeData::ProcessingInstruction { .. } => return None,
        };

        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
        });
        let children: Vec<Handle> = handle.children.borrow().iter().cloned().collect();
        for child in children {
            if let Some(child_id) = self.import(&child, Some(id)) {
                self.nodes[id].children.push(child_id);
            }
        }
        Some(id)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attrs(&self, id: NodeId) -> &[Attr] {
        match &self.nodes[id].kind {
            NodeKind::Element { attrs, .. } => attrs,
            _ => &[],
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attrs(id)
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Replaces the attribute's value, or appends it when absent.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: String) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id].kind {
            match attrs.iter_mut().find(|a| a.name == name) {
                Some(attr) => attr.value = value,
                None => attrs.push(Attr {
                    name: name.to_string(),
                    value,
                }),
            }
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, value: String) {
        if let NodeKind::Text(text) = &mut self.nodes[id].kind {
            *text = value;
        }
    }

    /// First element among the document roots with the given tag.
    pub fn find_element(&self, tag: &str) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if self.tag(id) == Some(tag) {
                return Some(id);
            }
            stack.extend(self.nodes[id].children.iter().rev());
        }
        None
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for &root in &self.roots {
            self.write_node(root, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        match &node.kind {
            NodeKind::Doctype { name } => {
                out.push_str("<!DOCTYPE ");
                out.push_str(name);
                out.push('>');
            }
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Text(text) => {
                let raw = node
                    .parent
                    .and_then(|p| self.tag(p))
                    .is_some_and(|t| RAW_TEXT_ELEMENTS.contains(&t));
                if raw {
                    out.push_str(text);
                } else {
                    escape_text(text, out);
                }
            }
            NodeKind::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for attr in attrs {
                    out.push(' ');
                    out.push_str(&attr.name);
                    out.push_str("=\"");
                    escape_attr(&attr.value, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                for &child in &node.children {
                    self.write_node(child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

fn attr_name(name: &QualName) -> String {
    match &name.prefix {
        Some(prefix) => format!("{}:{}", prefix, name.local),
        None => name.local.to_string(),
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_has_no_wrappers() {
        let dom = Dom::parse_fragment("<p class=\"a\">Hi</p><span>x</span>");
        assert_eq!(dom.roots().len(), 2);
        assert_eq!(dom.serialize(), "<p class=\"a\">Hi</p><span>x</span>");
    }

    #[test]
    fn test_document_adds_wrappers() {
        let dom = Dom::parse_document("<!DOCTYPE html><html><body><p>x</p></body></html>");
        assert_eq!(
            dom.serialize(),
            "<!DOCTYPE html><html><head></head><body><p>x</p></body></html>"
        );
        assert!(dom.find_element("p").is_some());
    }

    #[test]
    fn test_void_elements_and_escaping() {
        let dom = Dom::parse_fragment("<img src=\"a.png\"><p>a &amp; b</p>");
        assert_eq!(dom.serialize(), "<img src=\"a.png\"><p>a &amp; b</p>");
    }

    #[test]
    fn test_script_text_stays_raw() {
        let dom = Dom::parse_fragment("<script src=\"x.js\">if (a < b) {}</script>");
        assert_eq!(
            dom.serialize(),
            "<script src=\"x.js\">if (a < b) {}</script>"
        );
    }

    #[test]
    fn test_set_attr_and_text() {
        let mut dom = Dom::parse_fragment("<p>Hi</p>");
        let p = dom.roots()[0];
        dom.set_attr(p, "class", "one".to_string());
        dom.set_attr(p, "class", "two".to_string());
        let text = dom.children(p)[0];
        dom.set_text(text, "Bye".to_string());
        assert_eq!(dom.serialize(), "<p class=\"two\">Bye</p>");
        assert_eq!(dom.parent(text), Some(p));
    }

    #[test]
    fn test_braces_survive_parsing() {
        let dom = Dom::parse_fragment("<a href=\"/u/{id}\">{name}</a>");
        let a = dom.roots()[0];
        assert_eq!(dom.attr(a, "href"), Some("/u/{id}"));
        assert_eq!(dom.text(dom.children(a)[0]), Some("{name}"));
    }
}
