//! # DOM post-processing
//!
//! Passes over a freshly built [`Document`], in order:
//!
//! 1. **Fostered content** ([`foster`]): content the tree builder moved out
//!    of tables is flagged and wrapped, and a table whose fostered content
//!    came from a transclusion is pulled inside that transclusion.
//! 2. **Encapsulation** ([`encapsulation`]): each pair of expansion markers
//!    becomes `about`/`typeof`/`data-mw` on the nodes between them.
//! 3. **Source ranges** ([`dsr`]): every node gets the range of page
//!    source it came from, where that can be known.

mod dsr;
mod encapsulation;
mod foster;

pub use dsr::compute_source_ranges;

use crate::context::ParseContext;
use crate::dom::{Document, NodeId};
use crate::tokens::MarkerKind;

pub fn run(doc: &mut Document, cx: &ParseContext) {
    foster::mark_fostered_content(doc, cx);
    encapsulation::encapsulate(doc, cx);
    compute_source_ranges(doc);
}

/// A transclusion or parameter marker meta, with its `about` id.
pub(crate) fn expansion_marker(doc: &Document, id: NodeId) -> Option<(MarkerKind, String)> {
    let element = doc.element(id)?;
    if element.name != "meta" {
        return None;
    }
    let about = element.attr("about")?;
    let type_of = element
        .attr("typeof")?
        .split_whitespace()
        .find(|t| t.starts_with("mw:Transclusion") || t.starts_with("mw:Param"))?;
    let kind = if type_of.ends_with("/End") {
        MarkerKind::End
    } else {
        MarkerKind::Start
    };
    Some((kind, about.to_string()))
}

/// The marker of `kind` for `about`, anywhere under `body`.
pub(crate) fn find_marker(doc: &Document, kind: MarkerKind, about: &str) -> Option<NodeId> {
    doc.descendants(doc.body())
        .into_iter()
        .find(|&n| expansion_marker(doc, n).is_some_and(|(k, a)| k == kind && a == about))
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use crate::dom::{NodeKind, TreeBuilder};
    use wikiweave_syntax::Token;

    pub(crate) fn build(tokens: Vec<Token>) -> Document {
        let mut builder = TreeBuilder::new();
        builder.process(tokens);
        builder.finish()
    }

    /// Body outline: elements with their `about`, `*` for fostered nodes.
    pub(crate) fn outline(doc: &Document, id: NodeId) -> String {
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
                let mut open = element.name.clone();
                if let Some(type_of) = element.attr("typeof") {
                    open.push_str(&format!(" {type_of}"));
                }
                if let Some(about) = element.attr("about") {
                    open.push_str(&format!(" {about}"));
                }
                format!("{fostered}<{open}>{inner}</{}>", element.name)
            }
            NodeKind::Document => String::new(),
        }
    }

    pub(crate) fn body(doc: &Document) -> String {
        doc.children(doc.body())
            .iter()
            .map(|&c| outline(doc, c))
            .collect()
    }
}
