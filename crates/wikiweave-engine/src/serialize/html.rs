use std::collections::BTreeMap;
use std::ops::Range;

use html_escape::{
    encode_double_quoted_attribute_to_string, encode_single_quoted_attribute_to_string,
    encode_text_to_string,
};
use serde::Serialize;
use wikiweave_syntax::Syntax;

use crate::dom::{Document, Element, NodeId, NodeKind, is_void};

/// Children of these are written as they are.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "style", "script", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

/// A newline right after the start tag of these is dropped by HTML parsers,
/// so one has to be added when the content starts with a newline.
const LEADING_NEWLINE_ELEMENTS: &[&str] = &["pre", "textarea", "listing"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Single-quote attribute values that contain more `"` than `'`.
    pub smart_quote: bool,
    /// Write the node's children, not the node itself.
    pub inner_only: bool,
    /// Record where each expansion's output lands.
    pub capture_offsets: bool,
    /// Add a `data-parsoid` attribute with each node's provenance.
    pub data_attribs: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            smart_quote: true,
            inner_only: false,
            capture_offsets: false,
            data_attribs: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Serialized {
    pub html: String,
    /// Expansion `about` id to the byte range of its output, relative to
    /// the start of the body's content.
    pub offsets: BTreeMap<String, Range<usize>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DataParsoid<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    stx: Option<Syntax>,
    #[serde(skip_serializing_if = "Option::is_none")]
    src: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    auto_inserted_start: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    auto_inserted_end: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    fostered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    dsr: Option<[usize; 4]>,
}

/// Serialize `node`. Serializing the document node writes a doctype first.
pub fn serialize(doc: &Document, node: NodeId, options: SerializeOptions) -> Serialized {
    let mut writer = Writer {
        doc,
        options,
        out: String::new(),
        body_start: None,
        offsets: BTreeMap::new(),
    };
    if options.inner_only {
        writer.children(node);
    } else {
        writer.node(node);
    }
    Serialized {
        html: writer.out,
        offsets: writer.offsets,
    }
}

/// The body's content as HTML.
pub fn body_html(doc: &Document) -> String {
    let options = SerializeOptions {
        inner_only: true,
        ..SerializeOptions::default()
    };
    serialize(doc, doc.body(), options).html
}

struct Writer<'a> {
    doc: &'a Document,
    options: SerializeOptions,
    out: String,
    body_start: Option<usize>,
    offsets: BTreeMap<String, Range<usize>>,
}

impl Writer<'_> {
    fn node(&mut self, id: NodeId) {
        let doc = self.doc;
        match &doc.node(id).kind {
            NodeKind::Document => {
                self.out.push_str("<!DOCTYPE html>\n");
                self.children(id);
            }
            NodeKind::Element(element) => self.element(id, element),
            NodeKind::Text(text) => {
                let raw = doc
                    .parent(id)
                    .and_then(|p| doc.element(p))
                    .is_some_and(|e| RAW_TEXT_ELEMENTS.contains(&e.name.as_str()));
                if raw {
                    self.out.push_str(text);
                } else {
                    encode_text_to_string(text, &mut self.out);
                }
            }
            NodeKind::Comment(text) => {
                self.out.push_str("<!--");
                self.out.push_str(text);
                self.out.push_str("-->");
            }
        }
    }

    fn children(&mut self, id: NodeId) {
        let doc = self.doc;
        let capture = self.options.capture_offsets && id == doc.body();
        if capture {
            self.body_start = Some(self.out.len());
        }
        for &child in doc.children(id) {
            let start = self.out.len();
            self.node(child);
            if capture {
                self.record_offset(child, start);
            }
        }
    }

    fn record_offset(&mut self, child: NodeId, start: usize) {
        let (Some(base), Some(about)) = (
            self.body_start,
            self.doc.element(child).and_then(|e| e.attr("about")),
        ) else {
            return;
        };
        let (start, end) = (start - base, self.out.len() - base);
        self.offsets
            .entry(about.to_string())
            .and_modify(|range| range.end = end)
            .or_insert(start..end);
    }

    fn element(&mut self, id: NodeId, element: &Element) {
        let doc = self.doc;
        let children = doc.children(id);
        self.out.push('<');
        self.out.push_str(&element.name);
        for (key, value) in &element.attrs {
            self.attribute(key, value);
        }
        if self.options.data_attribs
            && let Some(json) = self.data_parsoid(id)
        {
            self.attribute("data-parsoid", &json);
        }
        if is_void(&element.name) && children.is_empty() {
            self.out.push_str("/>");
            return;
        }
        self.out.push('>');

        if LEADING_NEWLINE_ELEMENTS.contains(&element.name.as_str())
            && children
                .first()
                .and_then(|&c| doc.text(c))
                .is_some_and(|t| t.starts_with('\n'))
        {
            self.out.push('\n');
        }
        self.children(id);
        self.out.push_str("</");
        self.out.push_str(&element.name);
        self.out.push('>');
    }

    fn attribute(&mut self, key: &str, value: &str) {
        self.out.push(' ');
        self.out.push_str(key);
        let doubles = value.matches('"').count();
        let singles = value.matches('\'').count();
        if self.options.smart_quote && doubles > singles {
            self.out.push_str("='");
            encode_single_quoted_attribute_to_string(value, &mut self.out);
            self.out.push('\'');
        } else {
            self.out.push_str("=\"");
            encode_double_quoted_attribute_to_string(value, &mut self.out);
            self.out.push('"');
        }
    }

    fn data_parsoid(&self, id: NodeId) -> Option<String> {
        let data = self.doc.data(id);
        let record = DataParsoid {
            stx: data.stx,
            src: data.src.as_deref(),
            auto_inserted_start: data.auto_inserted_start,
            auto_inserted_end: data.auto_inserted_end,
            fostered: data.fostered,
            dsr: data.dsr.map(|d| d.to_array()),
        };
        serde_json::to_string(&record)
            .map_err(|err| log::warn!("data-parsoid for node {}: {err}", id.index()))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Dsr;
    use crate::postprocess::test_util::build;
    use pretty_assertions::assert_eq;
    use wikiweave_syntax::{SourceRange, Tag, Token};

    fn element(doc: &mut Document, parent: NodeId, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        let mut element = Element::new(name);
        for (key, value) in attrs {
            element.set_attr(key, *value);
        }
        let id = doc.create_element(element);
        doc.append(parent, id);
        id
    }

    #[test]
    fn documents_get_a_doctype() {
        let doc = Document::new();
        let html = serialize(&doc, doc.root(), SerializeOptions::default()).html;
        assert_eq!(
            html,
            "<!DOCTYPE html>\n<html><head></head><body></body></html>"
        );
    }

    #[test]
    fn text_is_escaped_except_in_raw_text_elements() {
        let mut doc = Document::new();
        let body = doc.body();
        let p = element(&mut doc, body, "p", &[]);
        let text = doc.create_text("a < b & c");
        doc.append(p, text);
        let script = element(&mut doc, body, "script", &[]);
        let code = doc.create_text("if (a < b) {}");
        doc.append(script, code);

        assert_eq!(
            body_html(&doc),
            "<p>a &lt; b &amp; c</p><script>if (a < b) {}</script>"
        );
    }

    #[test]
    fn attribute_quotes_follow_the_value() {
        let mut doc = Document::new();
        let body = doc.body();
        element(&mut doc, body, "span", &[("title", r#"say "hi""#), ("lang", "it's")]);

        assert_eq!(
            body_html(&doc),
            r#"<span title='say "hi"' lang="it's"></span>"#
        );
        let plain = SerializeOptions {
            smart_quote: false,
            inner_only: true,
            ..SerializeOptions::default()
        };
        assert_eq!(
            serialize(&doc, body, plain).html,
            r#"<span title="say &quot;hi&quot;" lang="it's"></span>"#
        );
    }

    #[test]
    fn void_elements_self_close_and_pre_keeps_its_newline() {
        let mut doc = Document::new();
        let body = doc.body();
        element(&mut doc, body, "br", &[]);
        let pre = element(&mut doc, body, "pre", &[]);
        let text = doc.create_text("\nx");
        doc.append(pre, text);

        assert_eq!(body_html(&doc), "<br/><pre>\n\nx</pre>");
    }

    #[test]
    fn offsets_cover_every_node_of_an_expansion() {
        let mut doc = Document::new();
        let body = doc.body();
        let text = doc.create_text("a");
        doc.append(body, text);
        element(&mut doc, body, "span", &[("about", "#mwt0")]);
        element(&mut doc, body, "i", &[("about", "#mwt0")]);

        let options = SerializeOptions {
            inner_only: true,
            capture_offsets: true,
            ..SerializeOptions::default()
        };
        let out = serialize(&doc, body, options);
        assert_eq!(
            out.html,
            r##"a<span about="#mwt0"></span><i about="#mwt0"></i>"##
        );
        assert_eq!(out.offsets.get("#mwt0"), Some(&(1..49)));
    }

    #[test]
    fn data_attribs_carry_provenance() {
        let mut doc = build(vec![
            Token::TagOpen(Tag::element("b").with_tsr(Some(SourceRange::new(0, 3)))),
            Token::text("x", Some(SourceRange::new(3, 4))),
        ]);
        let b = doc.children(doc.body())[0];
        doc.data_mut(b).dsr = Some(Dsr {
            start: 0,
            end: 4,
            open_width: 3,
            close_width: 0,
        });
        let options = SerializeOptions {
            inner_only: true,
            data_attribs: true,
            ..SerializeOptions::default()
        };
        let html = serialize(&doc, doc.body(), options).html;
        assert!(html.starts_with(
            r#"<b data-parsoid='{"autoInsertedEnd":true,"dsr":[0,4,3,0]}'>"#
        ));
    }
}
