//! Content the tree builder fostered out of tables.
//!
//! Everything between a foster box marker and its table was fostered.
//! Block and render-transparent elements stay as they are; runs of inline
//! content are gathered into a `p` (or a `span` when already inside a `p`).
//! The holder carries the `fostered` flag for the run, so the nodes moved
//! into it lose theirs. The marker is removed afterwards.
//!
//! When fostered content belongs to a transclusion, the transclusion is
//! stretched over the whole table: an end marker that was fostered out of
//! it, or left inside it, moves to just after the table. The start marker's
//! expansion range grows to cover the table's source.

use wikiweave_syntax::SourceRange;

use super::{expansion_marker, find_marker};
use crate::context::ParseContext;
use crate::dom::{Document, Element, FOSTER_BOX, NodeId};
use crate::tokens::MarkerKind;

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "blockquote", "caption", "center", "dd", "div", "dl", "dt", "fieldset",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "ol", "p",
    "pre", "section", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

fn is_foster_box(doc: &Document, id: NodeId) -> bool {
    doc.is_element(id, "meta") && doc.element(id).is_some_and(|e| e.has_type_of(FOSTER_BOX))
}

/// Elements that need no paragraph around them.
fn stands_alone(doc: &Document, id: NodeId) -> bool {
    doc.element(id).is_some_and(|e| {
        BLOCK_ELEMENTS.contains(&e.name.as_str()) || e.name == "meta" || e.name == "link"
    })
}

fn holder(doc: &mut Document, in_paragraph: bool) -> NodeId {
    let id = doc.create_element(Element::new(if in_paragraph { "span" } else { "p" }));
    doc.data_mut(id).fostered = true;
    id
}

pub(super) fn mark_fostered_content(doc: &mut Document, cx: &ParseContext) {
    let body = doc.body();
    mark_children(doc, body, cx);
}

fn mark_children(doc: &mut Document, parent: NodeId, cx: &ParseContext) {
    let mut index = 0;
    while let Some(&child) = doc.children(parent).get(index) {
        if is_foster_box(doc, child) {
            gather(doc, child, cx);
            doc.detach(child);
            continue;
        }
        if !doc.children(child).is_empty() {
            mark_children(doc, child, cx);
        }
        index += 1;
    }
}

/// Mark and wrap what lies between `foster_box` and its table.
fn gather(doc: &mut Document, foster_box: NodeId, cx: &ParseContext) {
    let mut fostered = Vec::new();
    let mut next = doc.next_sibling(foster_box);
    while let Some(sibling) = next {
        if doc.is_element(sibling, "table") {
            break;
        }
        fostered.push(sibling);
        next = doc.next_sibling(sibling);
    }
    let Some(table) = next else {
        log::debug!("foster box without a table");
        return;
    };
    if fostered.is_empty() {
        return;
    }

    let in_paragraph = doc.has_ancestor_named(foster_box, "p");
    let mut open: Option<NodeId> = None;
    for &node in &fostered {
        if stands_alone(doc, node) {
            doc.data_mut(node).fostered = true;
            open = None;
            continue;
        }
        let target = match open {
            Some(target) => target,
            None => {
                let target = holder(doc, in_paragraph);
                doc.insert_before(node, target);
                open = Some(target);
                target
            }
        };
        doc.data_mut(node).fostered = false;
        doc.append(target, node);
    }

    let from_transclusion = fostered.iter().any(|&node| {
        doc.descendants(node)
            .into_iter()
            .any(|n| doc.data(n).in_transclusion || expansion_marker(doc, n).is_some())
    });
    if from_transclusion {
        cover_table(doc, cx, foster_box, table, &fostered);
    }
}

/// Source of a table from its opening to its closing syntax, as far as
/// either is known.
fn table_range(doc: &Document, table: NodeId) -> Option<SourceRange> {
    let data = doc.data(table);
    match (data.start_tsr, data.end_tsr) {
        (Some(open), Some(close)) => Some(open.union(close)),
        (open, close) => open.or(close),
    }
}

fn stretch(doc: &mut Document, start_marker: NodeId, table: Option<SourceRange>) {
    let data = doc.data_mut(start_marker);
    let (Some(call), Some(table)) = (data.start_tsr, table) else {
        return;
    };
    let covered = data.tpl_range.unwrap_or(call);
    data.tpl_range = Some(covered.union(table));
}

fn cover_table(
    doc: &mut Document,
    cx: &ParseContext,
    foster_box: NodeId,
    table: NodeId,
    fostered: &[NodeId],
) {
    let range = table_range(doc, table);
    let markers: Vec<(NodeId, MarkerKind, String)> = fostered
        .iter()
        .filter_map(|&n| expansion_marker(doc, n).map(|(kind, about)| (n, kind, about)))
        .collect();

    let mut moved = false;
    for (node, kind, about) in &markers {
        match kind {
            MarkerKind::End => {
                let started_here = markers
                    .iter()
                    .any(|(_, k, a)| *k == MarkerKind::Start && a == about);
                if started_here {
                    continue;
                }
                doc.insert_after(table, *node);
                if let Some(start) = find_marker(doc, MarkerKind::Start, about) {
                    stretch(doc, start, range);
                }
                moved = true;
            }
            MarkerKind::Start => {
                let Some(end) = find_marker(doc, MarkerKind::End, about) else {
                    continue;
                };
                if doc.ancestors(end).contains(&table) {
                    doc.insert_after(table, end);
                    stretch(doc, *node, range);
                    moved = true;
                }
            }
        }
    }

    if markers.is_empty() && !moved && !doc.data(table).in_transclusion {
        let about = cx.new_about_id();
        let start = doc.create_element(marker_element("mw:Transclusion", &about));
        doc.data_mut(start).start_tsr = range;
        let end = doc.create_element(marker_element("mw:Transclusion/End", &about));
        doc.insert_before(foster_box, start);
        doc.insert_after(table, end);
    }
}

fn marker_element(type_of: &str, about: &str) -> Element {
    let mut element = Element::new("meta");
    element.set_attr("typeof", type_of);
    element.set_attr("about", about);
    element
}
