//! Tokens to a [`Document`].
//!
//! A cut-down HTML tree construction algorithm: a stack of open elements,
//! implied end tags, implied `tbody`/`tr`, void elements and foster
//! parenting. End tags that match nothing open are dropped.
//!
//! Every table is preceded by a `meta typeof="mw:FosterBox"` marker. Content
//! that is not allowed where it appears inside a table is moved in front
//! of the table (after the marker) and flagged `fostered`; the
//! post-processor uses the marker to find it again.

use wikiweave_syntax::{SourceRange, Tag, Token};

use super::{Document, Element, NodeId, NodeKind, is_void};
use crate::tokens::{MarkerKind, wrapper_marker};

pub(crate) const FOSTER_BOX: &str = "mw:FosterBox";

/// With one of these as the current node, text and non-table elements are
/// fostered.
const TABLE_CONTEXT: &[&str] = &["table", "tbody", "thead", "tfoot", "tr"];

const TABLE_STRUCTURE: &[&str] = &[
    "caption", "colgroup", "col", "tbody", "thead", "tfoot", "tr", "td", "th",
];

/// Opening one of these closes an open `p`.
const CLOSES_P: &[&str] = &[
    "address", "blockquote", "center", "dd", "div", "dl", "dt", "fieldset", "figure", "footer",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "ol", "p", "pre", "section",
    "table", "ul",
];

const BUTTON_SCOPE: &[&str] = &["button", "caption", "table", "td", "th"];
const CELL_SCOPE: &[&str] = &["caption", "table", "td", "th"];

fn is_html_whitespace(text: &str) -> bool {
    text.chars()
        .all(|c| matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0c'))
}

fn element_from(tag: &Tag, name: &str) -> Element {
    let mut element = Element::new(name);
    for attr in &tag.attribs {
        let key = attr.key_string().trim().to_ascii_lowercase();
        if key.is_empty() || element.attr(&key).is_some() {
            continue;
        }
        element.attrs.push((key, attr.value.to_plain_string()));
    }
    if let Some(expanded) = &tag.data.tmp.expanded_attrs
        && element.attr("data-mw").is_none()
    {
        element.attrs.push(("data-mw".to_string(), expanded.clone()));
    }
    element
}

/// Contiguous source ranges merge; anything else loses its range.
fn merge_ranges(a: Option<SourceRange>, b: Option<SourceRange>) -> Option<SourceRange> {
    match (a, b) {
        (Some(a), Some(b)) if a.end == b.start => Some(a.union(b)),
        _ => None,
    }
}

pub struct TreeBuilder {
    doc: Document,
    /// Open elements below `body`, outermost first.
    open: Vec<NodeId>,
    /// `about` ids of transclusions whose end marker has not been seen.
    transclusions: Vec<String>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            doc: Document::new(),
            open: Vec::new(),
            transclusions: Vec::new(),
        }
    }

    pub fn process(&mut self, tokens: Vec<Token>) {
        for token in tokens {
            self.push(token);
        }
    }

    pub fn push(&mut self, token: Token) {
        match &token {
            Token::TagOpen(tag) => self.start_tag(tag, false),
            Token::SelfClose(tag) => {
                self.start_tag(tag, true);
                self.track_marker(&token);
            }
            Token::TagClose(tag) => self.end_tag(tag),
            Token::Text(text) => self.insert_text(&text.value, text.data.tsr),
            Token::Newline(data) => self.insert_text("\n", data.tsr),
            Token::Comment(comment) => {
                let id = self.doc.create(NodeKind::Comment(comment.value.clone()));
                self.doc.data_mut(id).start_tsr = comment.data.tsr;
                self.doc.data_mut(id).in_transclusion = !self.transclusions.is_empty();
                let parent = self.current();
                self.doc.append(parent, id);
            }
            Token::EndOfInput(_) => self.pop_to(0),
        }
    }

    pub fn finish(mut self) -> Document {
        self.pop_to(0);
        self.doc
    }

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or(self.doc.body())
    }

    fn current_is(&self, names: &[&str]) -> bool {
        self.open.last().is_some_and(|&id| {
            self.doc
                .element(id)
                .is_some_and(|e| names.contains(&e.name.as_str()))
        })
    }

    fn in_table_context(&self) -> bool {
        self.current_is(TABLE_CONTEXT)
    }

    /// Stack index of the innermost open element named in `names`, unless
    /// one named in `boundaries` comes first.
    fn find_open(&self, names: &[&str], boundaries: &[&str]) -> Option<usize> {
        for (index, &id) in self.open.iter().enumerate().rev() {
            let Some(element) = self.doc.element(id) else {
                continue;
            };
            if names.contains(&element.name.as_str()) {
                return Some(index);
            }
            if boundaries.contains(&element.name.as_str()) {
                return None;
            }
        }
        None
    }

    /// Close every element from stack index `index` up without an end tag.
    fn pop_to(&mut self, index: usize) {
        while self.open.len() > index {
            if let Some(id) = self.open.pop() {
                self.doc.data_mut(id).auto_inserted_end = true;
            }
        }
    }

    fn close_implied(&mut self, name: &str) {
        if TABLE_STRUCTURE.contains(&name)
            && let Some(index) = self.find_open(&["caption"], &["table"])
        {
            self.pop_to(index);
        }
        if CLOSES_P.contains(&name)
            && let Some(index) = self.find_open(&["p"], BUTTON_SCOPE)
        {
            self.pop_to(index);
        }
        let scope = match name {
            "li" => self.find_open(&["li"], &["ol", "ul", "table", "td", "th", "caption"]),
            "dd" | "dt" => self.find_open(&["dd", "dt"], &["dl", "table", "td", "th", "caption"]),
            "td" | "th" => self.find_open(&["td", "th"], &["table"]),
            "tr" => self
                .find_open(&["tr"], &["table"])
                .or_else(|| self.find_open(&["td", "th"], &["table"])),
            "tbody" | "thead" | "tfoot" => {
                self.find_open(&["tbody", "thead", "tfoot"], &["table"])
            }
            "table" if self.in_table_context() => self.find_open(&["table"], &[]),
            _ => None,
        };
        if let Some(index) = scope {
            self.pop_to(index);
        }
    }

    /// An element the tree needs but the tokens did not open.
    fn open_implied(&mut self, name: &str) {
        let id = self.doc.create_element(Element::new(name));
        self.doc.data_mut(id).auto_inserted_start = true;
        self.doc.data_mut(id).in_transclusion = !self.transclusions.is_empty();
        let parent = self.current();
        self.doc.append(parent, id);
        self.open.push(id);
    }

    fn ensure_table_body(&mut self) {
        if self.current_is(&["table"]) {
            self.open_implied("tbody");
        }
    }

    fn ensure_row(&mut self) {
        self.ensure_table_body();
        if self.current_is(&["tbody", "thead", "tfoot"]) {
            self.open_implied("tr");
        }
    }

    /// Insert `id` in front of the innermost open table.
    fn foster(&mut self, id: NodeId) {
        self.doc.data_mut(id).fostered = true;
        match self.find_open(&["table"], &[]) {
            Some(index) => self.doc.insert_before(self.open[index], id),
            None => {
                let parent = self.current();
                self.doc.append(parent, id);
            }
        }
    }

    fn start_tag(&mut self, tag: &Tag, self_closing: bool) {
        let name = tag.name.as_str().to_ascii_lowercase();
        if matches!(name.as_str(), "html" | "head" | "body") {
            return;
        }
        self.close_implied(&name);
        match name.as_str() {
            "td" | "th" => self.ensure_row(),
            "tr" => self.ensure_table_body(),
            _ => {}
        }

        let fostered = self.in_table_context() && !TABLE_STRUCTURE.contains(&name.as_str());
        if name == "table" {
            let foster_box = self
                .doc
                .create_element(Element::new("meta"));
            if let Some(element) = self.doc.element_mut(foster_box) {
                element.set_attr("typeof", FOSTER_BOX);
            }
            let parent = self.current();
            self.doc.append(parent, foster_box);
        }

        let id = self.doc.create_element(element_from(tag, &name));
        let data = self.doc.data_mut(id);
        data.start_tsr = tag.data.tsr;
        data.stx = tag.data.stx;
        data.src = tag.data.src.clone();
        data.auto_inserted_start = tag.data.auto_inserted_start;
        data.auto_inserted_end = tag.data.auto_inserted_end;
        data.tpl_arg_info = tag.data.tmp.tpl_arg_info.clone();
        data.in_transclusion = !self.transclusions.is_empty();

        if fostered {
            self.foster(id);
        } else {
            let parent = self.current();
            self.doc.append(parent, id);
        }
        if !self_closing && !is_void(&name) {
            self.open.push(id);
        }
    }

    fn end_tag(&mut self, tag: &Tag) {
        let name = tag.name.as_str().to_ascii_lowercase();
        if matches!(name.as_str(), "html" | "head" | "body")
            || is_void(&name)
        {
            return;
        }
        let boundaries: &[&str] = match name.as_str() {
            "table" => &[],
            "p" => BUTTON_SCOPE,
            n if TABLE_STRUCTURE.contains(&n) => &["table"],
            _ => CELL_SCOPE,
        };
        let Some(index) = self.find_open(&[name.as_str()], boundaries) else {
            log::debug!("dropping unmatched end tag </{name}>");
            return;
        };
        self.pop_to(index + 1);
        if let Some(id) = self.open.pop() {
            self.doc.data_mut(id).end_tsr = tag.data.tsr;
        }
    }

    fn insert_text(&mut self, value: &str, tsr: Option<SourceRange>) {
        if value.is_empty() {
            return;
        }
        let in_transclusion = !self.transclusions.is_empty();

        if self.in_table_context() && !is_html_whitespace(value) {
            let table = self
                .find_open(&["table"], &[])
                .map(|index| self.open[index]);
            let previous = table.and_then(|t| self.doc.previous_sibling(t));
            if let Some(previous) = previous
                && self.doc.data(previous).fostered
                && self.merge_text(previous, value, tsr, in_transclusion)
            {
                return;
            }
            let id = self.doc.create_text(value);
            self.doc.data_mut(id).start_tsr = tsr;
            self.doc.data_mut(id).in_transclusion = in_transclusion;
            self.foster(id);
            return;
        }

        let parent = self.current();
        if let Some(&last) = self.doc.children(parent).last()
            && !self.doc.data(last).fostered
            && self.merge_text(last, value, tsr, in_transclusion)
        {
            return;
        }
        let id = self.doc.create_text(value);
        self.doc.data_mut(id).start_tsr = tsr;
        self.doc.data_mut(id).in_transclusion = in_transclusion;
        self.doc.append(parent, id);
    }

    /// Append to an existing text node; false when `id` is not text.
    fn merge_text(
        &mut self,
        id: NodeId,
        value: &str,
        tsr: Option<SourceRange>,
        in_transclusion: bool,
    ) -> bool {
        let node = self.doc.node_mut(id);
        let NodeKind::Text(text) = &mut node.kind else {
            return false;
        };
        text.push_str(value);
        node.data.start_tsr = merge_ranges(node.data.start_tsr, tsr);
        node.data.in_transclusion |= in_transclusion;
        true
    }

    fn track_marker(&mut self, token: &Token) {
        let Some(kind) = wrapper_marker(token) else {
            return;
        };
        let Some(about) = token.tag().and_then(|t| t.attr_string("about")) else {
            return;
        };
        match kind {
            MarkerKind::Start => self.transclusions.push(about),
            MarkerKind::End => self.transclusions.retain(|a| *a != about),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::meta;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use wikiweave_syntax::Tokenizer;

    /// Markup-like outline of the body; `*` marks fostered nodes.
    fn outline(doc: &Document, id: NodeId) -> String {
        let fostered = if doc.data(id).fostered { "*" } else { "" };
        match &doc.node(id).kind {
            NodeKind::Text(text) => format!("{fostered}{text}"),
            NodeKind::Comment(text) => format!("<!--{text}-->"),
            NodeKind::Element(element) => {
                let inner: String = doc
                    .children(id)
                    .iter()
                    .map(|&c| outline(doc, c))
                    .collect();
                if inner.is_empty() && is_void(&element.name) {
                    format!("{fostered}<{}/>", element.name)
                } else {
                    format!("{fostered}<{0}>{inner}</{0}>", element.name)
                }
            }
            NodeKind::Document => String::new(),
        }
    }

    fn build(source: &str) -> Document {
        let mut builder = TreeBuilder::new();
        builder.process(Tokenizer::default().tokenize(source, 0).unwrap());
        builder.finish()
    }

    fn body(doc: &Document) -> String {
        doc.children(doc.body())
            .iter()
            .map(|&c| outline(doc, c))
            .collect()
    }

    fn find(doc: &Document, name: &str) -> NodeId {
        doc.descendants(doc.root())
            .into_iter()
            .find(|&n| doc.is_element(n, name))
            .unwrap()
    }

    #[rstest]
    #[case("{|\n|-\n|a\n|}", "<meta/><table>\n<tbody><tr>\n<td>a\n</td></tr></tbody></table>")]
    #[case("{|\n|a\n|b\n|}", "<meta/><table>\n<tbody><tr><td>a\n</td><td>b\n</td></tr></tbody></table>")]
    #[case("<p>a<div>b</div>", "<p>a</p><div>b</div>")]
    #[case("<ul><li>a<li>b</ul>", "<ul><li>a</li><li>b</li></ul>")]
    #[case("a</span>b<br>", "ab<br/>")]
    #[case("{|\nfoo\n|}", "<meta/>*foo<table>\n\n</table>")]
    fn builds(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(body(&build(source)), expected);
    }

    #[test]
    fn implied_table_sections_are_flagged() {
        let doc = build("{|\n|a\n|}");
        let tbody = find(&doc, "tbody");
        assert!(doc.data(tbody).auto_inserted_start);
        assert!(doc.data(tbody).auto_inserted_end);
        let table = find(&doc, "table");
        assert!(!doc.data(table).auto_inserted_end);
        assert_eq!(doc.data(table).start_tsr, Some(SourceRange::new(0, 2)));
        assert_eq!(doc.data(table).end_tsr, Some(SourceRange::new(6, 8)));
    }

    #[test]
    fn elements_open_at_the_end_are_flagged() {
        let doc = build("<div>x");
        assert!(doc.data(find(&doc, "div")).auto_inserted_end);
    }

    #[test]
    fn contiguous_text_keeps_its_range() {
        let doc = build("a\nb");
        let text = doc.children(doc.body())[0];
        assert_eq!(doc.text(text), Some("a\nb"));
        assert_eq!(doc.data(text).start_tsr, Some(SourceRange::new(0, 3)));
    }

    #[test]
    fn content_between_markers_is_in_transclusion() {
        let start = meta("mw:Transclusion").with_attr("about", "#mwt0");
        let end = meta("mw:Transclusion/End").with_attr("about", "#mwt0");
        let mut builder = TreeBuilder::new();
        builder.process(vec![
            Token::text("a", None),
            Token::SelfClose(start),
            Token::TagOpen(Tag::element("b")),
            Token::text("x", None),
            Token::TagClose(Tag::element("b")),
            Token::SelfClose(end),
            Token::TagOpen(Tag::element("i")),
            Token::TagClose(Tag::element("i")),
        ]);
        let doc = builder.finish();
        assert!(doc.data(find(&doc, "b")).in_transclusion);
        assert!(!doc.data(find(&doc, "i")).in_transclusion);
    }
}
