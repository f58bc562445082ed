//! Source ranges for document nodes.
//!
//! Computed bottom-up. Text and comments take the range of the token they
//! came from. An element spans from its opening tag (or its first ranged
//! child) to its closing tag (or its last ranged child); the widths of the
//! opening and closing syntax are recorded alongside. A child whose range
//! falls outside its parent's content, or before a preceding sibling, loses
//! its range.
//!
//! Expansion output is opaque: the wrapper carrying the expansion's range
//! takes it as a whole, and the rest of the expansion's nodes get none.

use wikiweave_syntax::SourceRange;

use crate::dom::{Document, Dsr, NodeId, NodeKind};

pub fn compute_source_ranges(doc: &mut Document) {
    let body = doc.body();
    let dsr = compute(doc, body);
    doc.data_mut(body).dsr = dsr;
}

fn compute(doc: &mut Document, id: NodeId) -> Option<Dsr> {
    match &doc.node(id).kind {
        NodeKind::Text(_) | NodeKind::Comment(_) => return doc.data(id).start_tsr.map(Dsr::from),
        NodeKind::Document => return None,
        NodeKind::Element(_) => {}
    }
    if let Some(range) = doc.data(id).tpl_range {
        return Some(Dsr::from(range));
    }
    compute_children(doc, id);
    element_range(doc, id)
}

fn about(doc: &Document, id: NodeId) -> Option<String> {
    doc.element(id)?.attr("about").map(str::to_string)
}

fn compute_children(doc: &mut Document, parent: NodeId) {
    let children = doc.children(parent).to_vec();
    let mut group: Option<String> = None;
    for &child in &children {
        let child_about = about(doc, child);
        if group.is_some() && child_about == group && doc.data(child).tpl_range.is_none() {
            doc.data_mut(child).dsr = None;
            continue;
        }
        group = doc.data(child).tpl_range.and(child_about);
        let dsr = compute(doc, child);
        doc.data_mut(child).dsr = dsr;
    }

    let data = doc.data(parent);
    let (open, close) = (data.start_tsr, data.end_tsr);
    let low = open.map_or(0, |r| r.end);
    let high = close.map_or(usize::MAX, |r| r.start);

    let ranged: Vec<NodeId> = children
        .iter()
        .copied()
        .filter(|&c| !doc.data(c).fostered)
        .collect();

    if let ([only], Some(open), Some(close)) = (ranged.as_slice(), open, close)
        && doc.data(*only).dsr.is_none()
        && about(doc, *only).is_none()
        && open.end <= close.start
    {
        doc.data_mut(*only).dsr = Some(Dsr::from(SourceRange::new(open.end, close.start)));
    }

    let mut cursor = low;
    for child in ranged {
        let Some(dsr) = doc.data(child).dsr else {
            continue;
        };
        if dsr.start < cursor || dsr.end > high || dsr.start > dsr.end {
            log::debug!(
                "dropping source range {}..{} of node {}: outside {}..{}",
                dsr.start,
                dsr.end,
                child.index(),
                cursor,
                high
            );
            doc.data_mut(child).dsr = None;
            continue;
        }
        cursor = dsr.end;
    }
}

fn element_range(doc: &Document, id: NodeId) -> Option<Dsr> {
    let data = doc.data(id);
    let (open, close) = (data.start_tsr, data.end_tsr);
    let child_ranges: Vec<Dsr> = doc
        .children(id)
        .iter()
        .filter(|&&c| !doc.data(c).fostered)
        .filter_map(|&c| doc.data(c).dsr)
        .collect();

    let start = open
        .map(|r| r.start)
        .or_else(|| child_ranges.first().map(|d| d.start))?;
    let end = close
        .map(|r| r.end)
        .or_else(|| child_ranges.last().map(|d| d.end))
        .or_else(|| open.map(|r| r.end))?;
    if end < start {
        return None;
    }
    Some(Dsr {
        start,
        end,
        open_width: open.map_or(0, |r| r.len()),
        close_width: close.map_or(0, |r| r.len()),
    })
}
