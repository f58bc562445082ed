//! # Document tree
//!
//! The tree builder's output: an arena of nodes indexed by [`NodeId`].
//! Nodes are never freed; detaching a node only unlinks it from its parent,
//! so ids stay valid while the post-processor moves content around.
//!
//! Every document has the same skeleton, `#document > html > (head, body)`,
//! and parsed content lives under [`Document::body`].

mod builder;

pub use builder::TreeBuilder;
pub(crate) use builder::FOSTER_BOX;

use wikiweave_syntax::{SourceRange, Syntax};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.attrs.push((key.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, key: &str) {
        self.attrs.retain(|(k, _)| k != key);
    }

    pub fn has_type_of(&self, value: &str) -> bool {
        self.attr("typeof")
            .is_some_and(|t| t.split_whitespace().any(|v| v == value))
    }

    /// Put `value` first in the `typeof` list.
    pub fn prepend_type_of(&mut self, value: &str) {
        let type_of = match self.attr("typeof") {
            Some(existing) if !existing.is_empty() => format!("{value} {existing}"),
            _ => value.to_string(),
        };
        self.set_attr("typeof", type_of);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Document,
    Element(Element),
    Text(String),
    Comment(String),
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "bgsound", "br", "col", "command", "embed", "frame", "hr",
    "img", "input", "keygen", "link", "meta", "param", "source", "track", "wbr",
];

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

/// Source-range record computed for a node: where it starts and ends in
/// the page source and how wide its opening and closing syntax is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dsr {
    pub start: usize,
    pub end: usize,
    pub open_width: usize,
    pub close_width: usize,
}

impl Dsr {
    pub fn range(self) -> SourceRange {
        SourceRange::new(self.start, self.end)
    }

    /// Range between the opening and closing syntax.
    pub fn inner(self) -> Option<SourceRange> {
        let start = self.start + self.open_width;
        let end = self.end.checked_sub(self.close_width)?;
        (start <= end).then(|| SourceRange::new(start, end))
    }

    pub fn to_array(self) -> [usize; 4] {
        [self.start, self.end, self.open_width, self.close_width]
    }
}

impl From<SourceRange> for Dsr {
    fn from(range: SourceRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
            open_width: 0,
            close_width: 0,
        }
    }
}

/// Provenance carried by a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeData {
    /// Source range of the opening tag (or of the whole node for text and
    /// comments).
    pub start_tsr: Option<SourceRange>,
    pub end_tsr: Option<SourceRange>,
    pub dsr: Option<Dsr>,
    pub stx: Option<Syntax>,
    pub src: Option<String>,
    pub auto_inserted_start: bool,
    pub auto_inserted_end: bool,
    pub fostered: bool,
    /// Created while a transclusion was open.
    pub in_transclusion: bool,
    /// Source covered by the expansion this node wraps.
    pub tpl_range: Option<SourceRange>,
    /// Argument description from an expansion start marker.
    pub tpl_arg_info: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    body: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut document = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            body: NodeId(0),
        };
        document.root = document.create(NodeKind::Document);
        let html = document.create_element(Element::new("html"));
        let head = document.create_element(Element::new("head"));
        let body = document.create_element(Element::new("body"));
        document.append(document.root, html);
        document.append(html, head);
        document.append(html, body);
        document.body = body;
        document
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    pub fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0].data
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId, name: &str) -> bool {
        self.element(id).is_some_and(|e| e.name == name)
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            data: NodeData::default(),
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn create_element(&mut self, element: Element) -> NodeId {
        self.create(NodeKind::Element(element))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.create(NodeKind::Text(text.into()))
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Insert `child` right before `reference`, a child of some node.
    pub fn insert_before(&mut self, reference: NodeId, child: NodeId) {
        self.detach(child);
        let Some(parent) = self.parent(reference) else {
            return;
        };
        let index = self.index_in_parent(reference).unwrap_or(0);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(index, child);
    }

    /// Insert `child` right after `reference`.
    pub fn insert_after(&mut self, reference: NodeId, child: NodeId) {
        self.detach(child);
        let Some(parent) = self.parent(reference) else {
            return;
        };
        let index = self.index_in_parent(reference).map_or(0, |i| i + 1);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(index, child);
    }

    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    /// Put `wrapper` where `id` is and move `id` inside it.
    pub fn wrap(&mut self, id: NodeId, wrapper: NodeId) {
        self.insert_before(id, wrapper);
        self.append(wrapper, id);
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        self.children(parent).get(index + 1).copied()
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        index
            .checked_sub(1)
            .and_then(|i| self.children(parent).get(i).copied())
    }

    /// `id` and everything below it, in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev());
        }
        out
    }

    /// `id`'s ancestors, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(node) = current {
            out.push(node);
            current = self.parent(node);
        }
        out
    }

    pub fn has_ancestor_named(&self, id: NodeId, name: &str) -> bool {
        self.ancestors(id).into_iter().any(|a| self.is_element(a, name))
    }

    /// Concatenated text below `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }
}
