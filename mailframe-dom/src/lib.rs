//! Mutable document tree for the mailframe email page.
//!
//! The tree is an arena of nodes addressed by [`NodeId`]. It is built once
//! from the email markup (see [`parse_html`]), mutated in place by the
//! normalization pipeline, and thrown away on the next content reset together
//! with the stylesheets and event listeners it owns.

use log::trace;

mod css;
mod parse;
mod serialize;
mod style;

pub use css::{CssRule, SheetSource, StyleSheet};
pub use parse::parse_html;
pub use style::{
    format_number, format_px, html_font_size_px, Declaration, Length, StyleDecls,
    DEFAULT_FONT_SIZE_PX,
};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Error returned when a stylesheet cannot be read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SheetError {
    /// The sheet was linked from another origin; its rules are not readable.
    #[error("stylesheet {href} cannot be introspected")]
    CrossOrigin { href: String },
    #[error("invalid stylesheet: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Doctype(String),
    Element(Element),
    Text(String),
    Comment(String),
}

/// An element with its (lowercase) tag name and attributes in source order.
///
/// The `style` attribute is parsed once when it is set and kept alongside the
/// raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    style: StyleDecls,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            attrs: Vec::new(),
            style: StyleDecls::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if name.eq_ignore_ascii_case("style") {
            self.style = StyleDecls::parse(&value);
        }
        match self
            .attrs
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value,
            None => self.attrs.push((name.to_ascii_lowercase(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self
            .attrs
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        if name.eq_ignore_ascii_case("style") {
            self.style = StyleDecls::new();
        }
        Some(self.attrs.remove(pos).1)
    }

    /// Parsed `style` attribute (empty when absent).
    pub fn style(&self) -> StyleDecls {
        self.style.clone()
    }

    pub fn style_ref(&self) -> &StyleDecls {
        &self.style
    }

    /// Replace the `style` attribute, removing it when `decls` is empty.
    /// The declarations are stored as given, without a parse round-trip.
    pub fn set_style(&mut self, decls: &StyleDecls) {
        if decls.is_empty() {
            self.remove_attr("style");
            return;
        }
        let text = decls.to_string();
        match self.attrs.iter_mut().find(|(k, _)| k == "style") {
            Some((_, v)) => *v = text,
            None => self.attrs.push(("style".to_string(), text)),
        }
        self.style = decls.clone();
    }
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

// ---------------------------------------------------------------------------
// Event listeners
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Click,
    Load,
}

/// What a wired listener does when its event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerAction {
    /// Suppress navigation and report the anchor's URL to the host.
    ReportLink,
    /// Schedule a height recomputation.
    ReportHeight,
    /// Hide the target element.
    HideOnClick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Listener {
    pub target: NodeId,
    pub event: EventType,
    pub action: ListenerAction,
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    stylesheets: Vec<StyleSheet>,
    listeners: Vec<Listener>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document holding only the root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                data: NodeData::Document,
            }],
            stylesheets: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].data {
            NodeData::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn text_mut(&mut self, id: NodeId) -> Option<&mut String> {
        match &mut self.nodes[id.0].data {
            NodeData::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(Element::name)
    }

    pub fn is_element(&self, id: NodeId, tag: &str) -> bool {
        self.tag_name(id).is_some_and(|n| n.eq_ignore_ascii_case(tag))
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|el| el.attr(name))
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let Some(el) = self.element_mut(id) {
            el.set_attr(name, value);
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        self.element_mut(id).and_then(|el| el.remove_attr(name))
    }

    pub fn style(&self, id: NodeId) -> StyleDecls {
        self.element(id).map(Element::style).unwrap_or_default()
    }

    pub fn set_style(&mut self, id: NodeId, decls: &StyleDecls) {
        if let Some(el) = self.element_mut(id) {
            el.set_style(decls);
        }
    }

    /// Set one inline style property, keeping the rest of the attribute.
    pub fn set_style_property(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let mut decls = self.style(id);
        decls.set(name, value);
        self.set_style(id, &decls);
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Whether the node is still reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cur = id;
        loop {
            if cur == self.root() {
                return true;
            }
            match self.parent(cur) {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    /// All descendants of `id` in document (pre-)order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Descendant elements of `id` with the given tag, in document order.
    pub fn elements_named(&self, id: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.is_element(n, tag))
            .collect()
    }

    pub fn element_by_id(&self, element_id: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|&n| self.attr(n, "id") == Some(element_id))
    }

    pub fn body(&self) -> Option<NodeId> {
        self.elements_named(self.root(), "body").into_iter().next()
    }

    /// Nearest ancestor-or-self element with the given tag.
    pub fn closest(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if self.is_element(n, tag) {
                return Some(n);
            }
            cur = self.parent(n);
        }
        None
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(t) = self.text(id) {
            return t.to_string();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    pub fn append_child(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            data,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Detach a node (and its subtree) from the tree. Listeners on detached
    /// nodes are dropped.
    pub fn remove(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        self.nodes[parent.0].children.retain(|&c| c != id);
        self.nodes[id.0].parent = None;
        self.listeners.retain(|l| l.target != id);
        let detached = self.descendants(id);
        self.listeners.retain(|l| !detached.contains(&l.target));
        trace!("removed node {} with {} descendants", id.0, detached.len());
    }

    // -- Stylesheets --

    pub fn stylesheets(&self) -> &[StyleSheet] {
        &self.stylesheets
    }

    pub fn stylesheets_mut(&mut self) -> &mut [StyleSheet] {
        &mut self.stylesheets
    }

    pub fn add_stylesheet(&mut self, sheet: StyleSheet) {
        self.stylesheets.push(sheet);
    }

    pub(crate) fn stylesheet_owned_by(&self, id: NodeId) -> Option<&StyleSheet> {
        self.stylesheets.iter().find(|s| s.owner() == Some(id))
    }

    // -- Listeners --

    pub fn add_event_listener(&mut self, target: NodeId, event: EventType, action: ListenerAction) {
        self.listeners.push(Listener {
            target,
            event,
            action,
        });
    }

    /// Actions wired on `target` for `event`, in registration order.
    pub fn listeners(&self, target: NodeId, event: EventType) -> Vec<ListenerAction> {
        self.listeners
            .iter()
            .filter(|l| l.target == target && l.event == event)
            .map(|l| l.action)
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // -- Computed values --

    /// Font size in effect on a node, following inline `font-size`,
    /// `<font size>` and inheritance. Stylesheet rules are not matched.
    pub fn computed_font_size(&self, id: NodeId) -> f32 {
        let mut chain = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            chain.push(n);
            cur = self.parent(n);
        }
        chain
            .iter()
            .rev()
            .fold(DEFAULT_FONT_SIZE_PX, |size, &n| self.resolve_font_size(n, size))
    }

    /// Font size of `id` given the size in effect on its parent.
    pub fn resolve_font_size(&self, id: NodeId, parent_size: f32) -> f32 {
        let Some(el) = self.element(id) else {
            return parent_size;
        };
        if let Some(len) = el.style_ref().get("font-size").and_then(Length::parse) {
            return len.to_px(parent_size, parent_size);
        }
        if el.name() == "font" {
            if let Some(px) = el.attr("size").and_then(html_font_size_px) {
                return px;
            }
        }
        parent_size
    }

    /// Serialize the whole document to HTML.
    pub fn to_html(&self) -> String {
        serialize::to_html(self, self.root())
    }

    /// Serialize the children of `id` (its "inner HTML").
    pub fn inner_html(&self, id: NodeId) -> String {
        serialize::inner_html(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new();
        let root = doc.root();
        let div = doc.append_child(root, NodeData::Element(Element::new("div").with_attr("id", "c")));
        let p = doc.append_child(div, NodeData::Element(Element::new("P")));
        let text = doc.append_child(p, NodeData::Text("hello".into()));
        (doc, div, p, text)
    }

    #[test]
    fn descendants_are_preorder() {
        let (mut doc, div, p, text) = sample();
        let span = doc.append_child(div, NodeData::Element(Element::new("span")));
        assert_eq!(doc.descendants(doc.root()), vec![div, p, text, span]);
        assert_eq!(doc.elements_named(doc.root(), "p"), vec![p]);
        assert_eq!(doc.element_by_id("c"), Some(div));
        assert_eq!(doc.closest(text, "div"), Some(div));
    }

    #[test]
    fn attributes_are_case_insensitive() {
        let (mut doc, div, _, _) = sample();
        doc.set_attr(div, "WIDTH", "600");
        assert_eq!(doc.attr(div, "width"), Some("600"));
        assert_eq!(doc.remove_attr(div, "Width"), Some("600".to_string()));
        assert_eq!(doc.attr(div, "width"), None);
    }

    #[test]
    fn style_property_roundtrip() {
        let (mut doc, div, _, _) = sample();
        doc.set_style_property(div, "width", "10px");
        doc.set_style_property(div, "color", "red");
        assert_eq!(doc.attr(div, "style"), Some("width: 10px; color: red"));
    }

    #[test]
    fn written_styles_are_kept_as_given() {
        let mut el = Element::new("div").with_attr("style", "COLOR: #FFFFFF; width: 10px");
        assert_eq!(el.style().get("color"), Some("#fff"));
        assert_eq!(el.attr("style"), Some("COLOR: #FFFFFF; width: 10px"));

        let mut decls = el.style();
        decls.set("transform", "scale(0.5)");
        el.set_style(&decls);
        assert_eq!(el.style().get("transform"), Some("scale(0.5)"));
        assert_eq!(el.attr("style"), Some("color: #fff; width: 10px; transform: scale(0.5)"));

        el.remove_attr("style");
        assert!(el.style().is_empty());
    }

    #[test]
    fn remove_detaches_subtree_and_listeners() {
        let (mut doc, div, p, text) = sample();
        doc.add_event_listener(text, EventType::Click, ListenerAction::ReportLink);
        doc.add_event_listener(div, EventType::Click, ListenerAction::ReportLink);
        doc.remove(p);
        assert!(!doc.is_attached(text));
        assert!(doc.is_attached(div));
        assert_eq!(doc.listener_count(), 1);
        assert_eq!(doc.text_content(div), "");
    }

    #[test]
    fn font_size_inherits_and_resolves() {
        let (mut doc, div, p, text) = sample();
        assert_eq!(doc.computed_font_size(text), 16.0);
        doc.set_style_property(div, "font-size", "20px");
        doc.set_style_property(p, "font-size", "1.5em");
        assert_eq!(doc.computed_font_size(text), 30.0);
        let font = doc.append_child(
            div,
            NodeData::Element(Element::new("font").with_attr("size", "5")),
        );
        assert_eq!(doc.computed_font_size(font), 24.0);
        assert_eq!(doc.resolve_font_size(p, 10.0), 15.0);
    }

    #[test]
    fn deep_nesting_is_walked_without_recursion() {
        let mut doc = Document::new();
        let mut parent = doc.root();
        for _ in 0..50_000 {
            parent = doc.append_child(parent, NodeData::Element(Element::new("div")));
        }
        let outermost = doc.children(doc.root())[0];
        doc.set_style_property(outermost, "font-size", "20px");
        assert_eq!(doc.computed_font_size(parent), 20.0);
        assert_eq!(doc.closest(parent, "body"), None);
        assert_eq!(doc.to_html().matches("<div>").count(), 50_000);
    }
}
