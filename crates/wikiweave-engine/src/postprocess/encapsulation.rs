//! Marker pairs to encapsulated content.
//!
//! The nodes between a start marker and the end marker with the same
//! `about` id are the output of one expansion. Where the markers ended up
//! at different depths, the range is lifted to their closest common
//! ancestor. Every node in the range gets the `about` id (text is wrapped
//! in a `span` to carry it) and the first one also gets the `typeof`, the
//! `data-mw` and the expansion's source range. Lifting can pull page source
//! into the range; the expansion's range then grows over it and the extra
//! source shows up as literal parts of `data-mw`. The markers are removed,
//! except that an expansion with no output keeps its start marker as the
//! wrapper.

use serde_json::{Value, json};
use wikiweave_syntax::SourceRange;

use super::{expansion_marker, find_marker};
use crate::context::ParseContext;
use crate::dom::{Document, Element, NodeId, NodeKind};
use crate::tokens::MarkerKind;

pub(super) fn encapsulate(doc: &mut Document, cx: &ParseContext) {
    let starts: Vec<(NodeId, String)> = doc
        .descendants(doc.body())
        .into_iter()
        .filter_map(|n| match expansion_marker(doc, n) {
            Some((MarkerKind::Start, about)) => Some((n, about)),
            _ => None,
        })
        .collect();

    for (start, about) in starts {
        let Some(end) = find_marker(doc, MarkerKind::End, &about) else {
            log::debug!("expansion {about} has no end marker");
            continue;
        };
        let Some(nodes) = covered(doc, start, end) else {
            continue;
        };
        wrap(doc, cx, start, end, &about, nodes);
    }
}

/// The siblings an expansion spans, below the closest common ancestor of
/// its markers.
fn covered(doc: &Document, start: NodeId, end: NodeId) -> Option<Vec<NodeId>> {
    let end_ancestors = doc.ancestors(end);
    let common = doc
        .ancestors(start)
        .into_iter()
        .find(|a| end_ancestors.contains(a))?;

    let top = |node: NodeId| -> Option<NodeId> {
        std::iter::once(node)
            .chain(doc.ancestors(node))
            .find(|&n| doc.parent(n) == Some(common))
    };
    let (first, last) = (top(start)?, top(end)?);
    let from = doc.index_in_parent(first)? + usize::from(first == start);
    let to = doc.index_in_parent(last)? + usize::from(last != end);
    let children = doc.children(common);
    Some(children.get(from..to).map(<[NodeId]>::to_vec).unwrap_or_default())
}

/// `data-mw` of a transclusion: the call's argument description, with any
/// extra source the expansion had to absorb as literal parts around it.
fn data_mw(
    cx: &ParseContext,
    info: &str,
    call: Option<SourceRange>,
    range: SourceRange,
) -> Option<String> {
    let info: Value = serde_json::from_str(info).ok()?;
    let mut parts = Vec::new();
    if let Some(call) = call
        && range.start < call.start
    {
        parts.push(Value::String(
            cx.page_slice(SourceRange::new(range.start, call.start)),
        ));
    }
    parts.push(json!({ "template": info }));
    if let Some(call) = call
        && call.end < range.end
    {
        parts.push(Value::String(
            cx.page_slice(SourceRange::new(call.end, range.end)),
        ));
    }
    Some(json!({ "parts": parts }).to_string())
}

/// Page source under `nodes`, as far as their tags and text record it.
fn source_extent(doc: &Document, nodes: &[NodeId]) -> Option<SourceRange> {
    nodes
        .iter()
        .flat_map(|&n| doc.descendants(n))
        .flat_map(|n| {
            let data = doc.data(n);
            [data.start_tsr, data.end_tsr]
        })
        .flatten()
        .reduce(SourceRange::union)
}

fn wrap(
    doc: &mut Document,
    cx: &ParseContext,
    start: NodeId,
    end: NodeId,
    about: &str,
    nodes: Vec<NodeId>,
) {
    let marker = doc.data(start).clone();
    let type_of = doc
        .element(start)
        .and_then(|e| e.attr("typeof"))
        .unwrap_or_default()
        .to_string();
    let range = match (marker.tpl_range.or(marker.start_tsr), source_extent(doc, &nodes)) {
        (Some(range), Some(absorbed)) => Some(range.union(absorbed)),
        (range, _) => range,
    };
    let data_mw = match (&marker.tpl_arg_info, range) {
        (Some(info), Some(range)) => data_mw(cx, info, marker.start_tsr, range),
        _ => None,
    };

    let mut wrapped = Vec::with_capacity(nodes.len());
    for node in nodes {
        match doc.node(node).kind {
            NodeKind::Text(_) => {
                let span = doc.create_element(Element::new("span"));
                doc.data_mut(span).in_transclusion = true;
                doc.wrap(node, span);
                wrapped.push(span);
            }
            NodeKind::Element(_) => wrapped.push(node),
            _ => {}
        }
    }

    let Some(&first) = wrapped.first() else {
        // Nothing to carry the expansion: the start marker does.
        if let Some(element) = doc.element_mut(start)
            && let Some(data_mw) = data_mw
        {
            element.set_attr("data-mw", data_mw);
        }
        doc.data_mut(start).tpl_range = range;
        doc.detach(end);
        return;
    };

    for &node in &wrapped {
        if let Some(element) = doc.element_mut(node) {
            element.set_attr("about", about);
        }
    }
    if let Some(element) = doc.element_mut(first) {
        element.prepend_type_of(&type_of);
        if let Some(data_mw) = data_mw {
            element.set_attr("data-mw", data_mw);
        }
    }
    let data = doc.data_mut(first);
    data.tpl_range = range;
    data.src = marker.src;
    doc.detach(start);
    doc.detach(end);
}
