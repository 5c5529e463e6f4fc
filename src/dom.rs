//! Host Document Model
//!
//! A small arena-backed stand-in for the host UI platform's element tree.
//! It provides just what the runtime needs from the host: markup parsing,
//! attributes, isolated scope roots attached to elements, node replacement
//! and document-order traversal.
//!
//! Markup is parsed with html5ever. Script elements created by parsing are
//! inert (the host refuses to execute injected script markup); script
//! elements created through [`Document::create_element`] are executable.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ElementData {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    /// Root of the isolated rendering scope attached to this element.
    pub scope: Option<NodeId>,
    /// Set for script elements that came from parsed markup.
    pub inert: bool,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Root,
    Element(ElementData),
    Text(String),
    /// Root of an isolated rendering scope. Not a child of its host.
    ScopeRoot { host: NodeId },
}

#[derive(Debug, Clone)]
struct NodeEntry {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Content accepted by [`Document::fill_slot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotContent {
    Text(String),
    Node(NodeId),
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeEntry>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Document {
            nodes: vec![NodeEntry {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Parse a complete host document from markup.
    pub fn parse(markup: &str) -> Self {
        let mut document = Document::new();
        let root = document.root();
        document.append_markup(root, markup);
        document
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeEntry {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn entry(&self, node: NodeId) -> Option<&NodeEntry> {
        self.nodes.get(node.0)
    }

    fn element(&self, node: NodeId) -> Option<&ElementData> {
        match self.entry(node).map(|e| &e.kind) {
            Some(NodeKind::Element(data)) => Some(data),
            _ => None,
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Option<&mut ElementData> {
        match self.nodes.get_mut(node.0).map(|e| &mut e.kind) {
            Some(NodeKind::Element(data)) => Some(data),
            _ => None,
        }
    }

    pub fn kind(&self, node: NodeId) -> Option<&NodeKind> {
        self.entry(node).map(|e| &e.kind)
    }

    /// Create a detached, executable element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            scope: None,
            inert: false,
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.entry(node).and_then(|e| e.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.entry(node).map(|e| e.children.as_slice()).unwrap_or(&[])
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|e| e.tag.as_str())
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    pub fn is_inert(&self, node: NodeId) -> bool {
        self.element(node).map(|e| e.inert).unwrap_or(false)
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).and_then(|e| {
            e.attributes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
        })
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.attribute(node, name).is_some()
    }

    pub fn attributes(&self, node: NodeId) -> &[(String, String)] {
        self.element(node)
            .map(|e| e.attributes.as_slice())
            .unwrap_or(&[])
    }

    /// Set an attribute, returning the previous value.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Option<String> {
        let element = self.element_mut(node)?;
        let name = name.to_ascii_lowercase();
        match element.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => Some(std::mem::replace(existing, value.to_string())),
            None => {
                element.attributes.push((name, value.to_string()));
                None
            }
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Option<String> {
        let element = self.element_mut(node)?;
        let index = element.attributes.iter().position(|(n, _)| n == name)?;
        Some(element.attributes.remove(index).1)
    }

    pub fn scope_of(&self, host: NodeId) -> Option<NodeId> {
        self.element(host).and_then(|e| e.scope)
    }

    pub fn host_of(&self, scope: NodeId) -> Option<NodeId> {
        match self.kind(scope) {
            Some(NodeKind::ScopeRoot { host }) => Some(*host),
            _ => None,
        }
    }

    /// Attach an isolated scope root to `host`, reusing an existing one.
    pub fn attach_scope(&mut self, host: NodeId) -> Option<NodeId> {
        if let Some(existing) = self.scope_of(host) {
            return Some(existing);
        }
        self.element(host)?;
        let scope = self.push(NodeKind::ScopeRoot { host });
        if let Some(element) = self.element_mut(host) {
            element.scope = Some(scope);
        }
        Some(scope)
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.parent(node) {
            if let Some(entry) = self.nodes.get_mut(parent.0) {
                entry.children.retain(|c| *c != node);
            }
        }
        if let Some(entry) = self.nodes.get_mut(node.0) {
            entry.parent = None;
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if self.entry(parent).is_none() || self.entry(child).is_none() {
            return;
        }
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Put `replacement` where `old` is and detach `old`.
    pub fn replace_node(&mut self, old: NodeId, replacement: NodeId) {
        let Some(parent) = self.parent(old) else {
            return;
        };
        self.detach(replacement);
        let Some(position) = self.nodes[parent.0].children.iter().position(|c| *c == old) else {
            return;
        };
        self.nodes[parent.0].children[position] = replacement;
        self.nodes[replacement.0].parent = Some(parent);
        self.nodes[old.0].parent = None;
    }

    pub fn remove(&mut self, node: NodeId) {
        self.detach(node);
    }

    pub fn clear_children(&mut self, node: NodeId) {
        let children = self.children(node).to_vec();
        for child in children {
            self.detach(child);
        }
    }

    /// Replace the content of `node` with `text`. A lone text child is
    /// rewritten in place so repeated renders allocate nothing.
    pub fn set_text_content(&mut self, node: NodeId, text: &str) {
        if let [only] = self.children(node) {
            let only = *only;
            if let Some(NodeKind::Text(current)) = self.nodes.get_mut(only.0).map(|e| &mut e.kind) {
                if text.is_empty() {
                    self.detach(only);
                } else {
                    current.clear();
                    current.push_str(text);
                }
                return;
            }
        }
        self.clear_children(node);
        if !text.is_empty() {
            let text_node = self.create_text(text);
            self.append_child(node, text_node);
        }
    }

    /// Number of nodes ever allocated, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Concatenated text of the light-tree descendants of `node`.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        if let Some(NodeKind::Text(text)) = self.kind(node) {
            out.push_str(text);
            return;
        }
        for child in self.children(node) {
            self.collect_text(*child, out);
        }
    }

    /// True when `node` is reachable from the document root, crossing
    /// scope roots through their hosts.
    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == self.root() {
                return true;
            }
            match self.kind(current) {
                Some(NodeKind::ScopeRoot { host }) => current = *host,
                Some(_) => match self.parent(current) {
                    Some(parent) => current = parent,
                    None => return false,
                },
                None => return false,
            }
        }
    }

    /// Descendants of `node` in document order, excluding `node` itself.
    /// With `cross_scopes`, an element's scope root and its subtree are
    /// visited before the element's light children.
    pub fn descendants(&self, node: NodeId, cross_scopes: bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_descendants(node, cross_scopes, &mut out);
        out
    }

    fn collect_descendants(&self, node: NodeId, cross_scopes: bool, out: &mut Vec<NodeId>) {
        if cross_scopes {
            if let Some(scope) = self.scope_of(node) {
                out.push(scope);
                self.collect_descendants(scope, cross_scopes, out);
            }
        }
        for child in self.children(node) {
            out.push(*child);
            self.collect_descendants(*child, cross_scopes, out);
        }
    }

    pub fn elements_by_tag(&self, root: NodeId, tag: &str, cross_scopes: bool) -> Vec<NodeId> {
        self.descendants(root, cross_scopes)
            .into_iter()
            .filter(|n| self.tag(*n) == Some(tag))
            .collect()
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root(), true)
            .into_iter()
            .find(|n| self.attribute(*n, "id") == Some(id))
    }

    /// Parse `markup` and append the resulting nodes to `parent`.
    /// Returns the nodes appended directly under `parent`.
    pub fn append_markup(&mut self, parent: NodeId, markup: &str) -> Vec<NodeId> {
        let dom = parse_document(RcDom::default(), Default::default()).one(markup);
        let before = self.children(parent).len();
        self.import_handle(&dom.document, parent);
        self.children(parent)[before..].to_vec()
    }

    pub fn replace_children_with_markup(&mut self, parent: NodeId, markup: &str) -> Vec<NodeId> {
        self.clear_children(parent);
        self.append_markup(parent, markup)
    }

    fn import_handle(&mut self, handle: &Handle, parent: NodeId) {
        match &handle.data {
            NodeData::Document => {
                for child in handle.children.borrow().iter() {
                    self.import_handle(child, parent);
                }
            }
            NodeData::Element { name, attrs, .. } => {
                let tag = name.local.to_string();
                // The parser always synthesises these wrappers around a fragment.
                if tag == "html" || tag == "head" || tag == "body" {
                    for child in handle.children.borrow().iter() {
                        self.import_handle(child, parent);
                    }
                    return;
                }
                let attributes = attrs
                    .borrow()
                    .iter()
                    .map(|a| (a.name.local.to_string(), a.value.to_string()))
                    .collect();
                let inert = tag == "script";
                let id = self.push(NodeKind::Element(ElementData {
                    tag,
                    attributes,
                    scope: None,
                    inert,
                }));
                self.append_child(parent, id);
                for child in handle.children.borrow().iter() {
                    self.import_handle(child, id);
                }
            }
            NodeData::Text { contents } => {
                let id = self.create_text(&contents.borrow());
                self.append_child(parent, id);
            }
            _ => {}
        }
    }

    /// Fill a slot of `host`.
    ///
    /// The default slot (`"slot"`) replaces the host's light children while
    /// keeping children that carry a `slot` attribute. A named slot replaces
    /// the children of the matching `[slot=name]` child, or appends a new
    /// `<span slot=name>` when none exists.
    pub fn fill_slot(&mut self, host: NodeId, name: &str, contents: Vec<SlotContent>) {
        let nodes: Vec<NodeId> = contents
            .into_iter()
            .map(|content| match content {
                SlotContent::Text(text) => self.create_text(&text),
                SlotContent::Node(node) => node,
            })
            .collect();

        if name == "slot" {
            let named: Vec<NodeId> = self
                .children(host)
                .iter()
                .copied()
                .filter(|c| self.has_attribute(*c, "slot"))
                .collect();
            self.clear_children(host);
            for node in nodes.into_iter().chain(named) {
                self.append_child(host, node);
            }
            return;
        }

        let existing = self
            .descendants(host, false)
            .into_iter()
            .find(|n| self.attribute(*n, "slot") == Some(name));
        let target = match existing {
            Some(slot) => {
                self.clear_children(slot);
                slot
            }
            None => {
                let span = self.create_element("span");
                self.set_attribute(span, "slot", name);
                self.append_child(host, span);
                span
            }
        };
        for node in nodes {
            self.append_child(target, node);
        }
    }

    /// Serialise the children of `node` (light tree only) for inspection.
    pub fn to_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(node) {
            self.write_html(*child, &mut out);
        }
        out
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        match self.kind(node) {
            Some(NodeKind::Text(text)) => out.push_str(&escape_text(text)),
            Some(NodeKind::Element(element)) => {
                out.push('<');
                out.push_str(&element.tag);
                for (name, value) in &element.attributes {
                    out.push_str(&format!(" {}=\"{}\"", name, escape_attribute(value)));
                }
                out.push('>');
                for child in self.children(node) {
                    self.write_html(*child, out);
                }
                out.push_str(&format!("</{}>", element.tag));
            }
            _ => {}
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_wrappers_are_flattened() {
        let doc = Document::parse("<p id=\"a\">Hello</p><span>World</span>");
        let top: Vec<&str> = doc
            .children(doc.root())
            .iter()
            .filter_map(|n| doc.tag(*n))
            .collect();
        assert_eq!(top, vec!["p", "span"]);
        assert_eq!(doc.text_content(doc.root()), "HelloWorld");
    }

    #[test]
    fn test_parsed_scripts_are_inert() {
        let mut doc = Document::parse("<div><script>setup()</script></div>");
        let script = doc.elements_by_tag(doc.root(), "script", false)[0];
        assert!(doc.is_inert(script));
        assert_eq!(doc.text_content(script), "setup()");

        let fresh = doc.create_element("script");
        assert!(!doc.is_inert(fresh));
    }

    #[test]
    fn test_scope_traversal_and_connection() {
        let mut doc = Document::parse("<data-consumer id=\"host\"><b>light</b></data-consumer>");
        let host = doc.element_by_id("host").unwrap();
        let scope = doc.attach_scope(host).unwrap();
        doc.append_markup(scope, "<i>shadow</i>");

        let light = doc.descendants(host, false);
        assert_eq!(light.len(), 2);

        let all = doc.descendants(host, true);
        assert_eq!(all[0], scope);
        assert_eq!(doc.tag(all[1]), Some("i"));

        let italic = all[1];
        assert!(doc.is_connected(italic));
        doc.remove(host);
        assert!(!doc.is_connected(italic));
    }

    #[test]
    fn test_replace_node_keeps_position() {
        let mut doc = Document::parse("<a></a><b></b><c></c>");
        let b = doc.children(doc.root())[1];
        let fresh = doc.create_element("em");
        doc.replace_node(b, fresh);
        assert_eq!(doc.to_html(doc.root()), "<a></a><em></em><c></c>");
        assert_eq!(doc.parent(b), None);
    }

    #[test]
    fn test_fill_default_slot_keeps_named_children() {
        let mut doc =
            Document::parse("<x-host id=\"h\">old<span slot=\"title\">T</span></x-host>");
        let host = doc.element_by_id("h").unwrap();
        doc.fill_slot(host, "slot", vec![SlotContent::Text("new".to_string())]);
        assert_eq!(
            doc.to_html(host),
            "new<span slot=\"title\">T</span>"
        );
    }

    #[test]
    fn test_fill_named_slot_creates_span() {
        let mut doc = Document::parse("<x-host id=\"h\"></x-host>");
        let host = doc.element_by_id("h").unwrap();
        doc.fill_slot(host, "footer", vec![SlotContent::Text("bye".to_string())]);
        assert_eq!(doc.to_html(host), "<span slot=\"footer\">bye</span>");

        doc.fill_slot(host, "footer", vec![SlotContent::Text("again".to_string())]);
        assert_eq!(doc.to_html(host), "<span slot=\"footer\">again</span>");
    }

    #[test]
    fn test_repeated_text_writes_reuse_the_text_node() {
        let mut doc = Document::parse("<p id=\"p\">start</p>");
        let p = doc.element_by_id("p").unwrap();
        let before = doc.node_count();

        for i in 0..1000 {
            doc.set_text_content(p, &i.to_string());
        }
        assert_eq!(doc.node_count(), before);
        assert_eq!(doc.text_content(p), "999");

        doc.set_text_content(p, "");
        assert!(doc.children(p).is_empty());
        doc.set_text_content(p, "back");
        assert_eq!(doc.node_count(), before + 1);
        assert_eq!(doc.text_content(p), "back");
    }
}
