//! Keeps author-written HTML to a safe subset.
//!
//! Tags written in the source that are not on the allow list are rendered
//! back as text. Attributes lose event handlers, script URLs and unsafe
//! styles. Markup left inside attribute values is flattened to text.

use std::sync::OnceLock;

use regex::Regex;
use wikiweave_syntax::{AttrValue, Attribute, Rank, Syntax, Tag, Token};

use crate::error::TransformError;
use crate::pipeline::{Registration, StageContext, TokenFilter, TransformOutcome, Transformer};

const RANK: Rank = Rank::from_millis(2900);

const ALLOWED_ELEMENTS: &[&str] = &[
    "abbr", "b", "bdi", "bdo", "big", "blockquote", "br", "caption", "center", "cite", "code",
    "data", "dd", "del", "dfn", "div", "dl", "dt", "em", "font", "h1", "h2", "h3", "h4", "h5",
    "h6", "hr", "i", "ins", "kbd", "li", "link", "mark", "meta", "ol", "p", "pre", "q", "rb",
    "rp", "rt", "rtc", "ruby", "s", "samp", "small", "span", "strike", "strong", "sub", "sup",
    "table", "tbody", "td", "tfoot", "th", "thead", "time", "tr", "tt", "u", "ul", "var", "wbr",
];

const URL_ATTRIBUTES: &[&str] = &["href", "src", "cite", "action", "poster", "background"];

fn attribute_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_:][A-Za-z0-9_:.\-]*$").expect("Invalid attribute name regex")
    })
}

fn unsafe_style_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)expression\s*\(|url\s*\(|javascript\s*:|behavior\s*:|-moz-binding")
            .expect("Invalid style regex")
    })
}

fn unsafe_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(javascript|vbscript|data)\s*:").expect("Invalid URL regex")
    })
}

/// The attribute as it may be emitted, or `None` to drop it.
fn clean_attribute(attr: &Attribute) -> Option<Attribute> {
    let key = attr.key.to_plain_string().trim().to_string();
    if !attribute_name_regex().is_match(&key) || key.to_ascii_lowercase().starts_with("on") {
        return None;
    }
    let mut value = attr.value.to_plain_string();
    let lower = key.to_ascii_lowercase();
    if URL_ATTRIBUTES.contains(&lower.as_str()) && unsafe_url_regex().is_match(&value) {
        return None;
    }
    if lower == "style" && unsafe_style_regex().is_match(&value) {
        value = "/* insecure input */".to_string();
    }
    Some(Attribute {
        key: AttrValue::Str(key),
        value: AttrValue::Str(value),
        src_offsets: attr.src_offsets,
    })
}

fn clean_tag(mut tag: Tag) -> Tag {
    tag.attribs = tag.attribs.iter().filter_map(clean_attribute).collect();
    tag
}

/// Source text of a tag that is not allowed.
fn escaped(tag: &Tag, closing: bool, cx: &StageContext) -> Token {
    let text = match tag.data.tsr {
        Some(tsr) => cx.parse.page_slice(tsr),
        None if closing => format!("</{}>", tag.name),
        None => format!("<{}>", tag.name),
    };
    Token::text(text, tag.data.tsr)
}

#[derive(Debug)]
pub struct Sanitizer;

impl Transformer for Sanitizer {
    fn name(&self) -> &'static str {
        "Sanitizer"
    }

    fn registrations(&self) -> Vec<Registration> {
        vec![Registration::new(RANK, TokenFilter::Any)]
    }

    fn apply(
        &mut self,
        token: Token,
        _rank: Rank,
        cx: &StageContext,
    ) -> Result<TransformOutcome, TransformError> {
        let Some(tag) = token.tag() else {
            return Ok(TransformOutcome::Pass(token));
        };
        let written = tag.data.stx == Some(Syntax::Html);
        if written && !ALLOWED_ELEMENTS.contains(&tag.name.as_str()) {
            let closing = matches!(token, Token::TagClose(_));
            return Ok(TransformOutcome::Emit(vec![escaped(tag, closing, cx)]));
        }
        if tag.attribs.is_empty() {
            return Ok(TransformOutcome::Pass(token));
        }
        Ok(TransformOutcome::Pass(match token {
            Token::TagOpen(tag) => Token::TagOpen(clean_tag(tag)),
            Token::SelfClose(tag) => Token::SelfClose(clean_tag(tag)),
            Token::TagClose(tag) => Token::TagClose(clean_tag(tag)),
            other => other,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::stage_context_with;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use wikiweave_syntax::{SourceRange, Tokenizer};

    fn sanitize(source: &str) -> Token {
        let cx = stage_context_with(source, |_| {});
        let token = Tokenizer::default().tokenize(source, 0).unwrap()[0].clone();
        match Sanitizer.apply(token, RANK, &cx).unwrap() {
            TransformOutcome::Pass(token) => token,
            TransformOutcome::Emit(mut out) => out.remove(0),
            _ => panic!("unexpected outcome"),
        }
    }

    #[test]
    fn unknown_tags_become_text() {
        let token = sanitize("<script src=\"x.js\">");
        assert_eq!(token.as_text(), Some("<script src=\"x.js\">"));
        assert_eq!(token.tsr(), Some(SourceRange::new(0, 19)));
    }

    #[rstest]
    #[case("<div onclick=\"evil()\" class=\"a\">", &["class"])]
    #[case("<span title=\"t\" 9bad=\"x\">", &["title"])]
    #[case("<q cite=\"javascript:alert(1)\" lang=\"en\">", &["lang"])]
    fn drops_unsafe_attributes(#[case] source: &str, #[case] kept: &[&str]) {
        let token = sanitize(source);
        let keys: Vec<String> = token
            .tag()
            .map(|t| t.attribs.iter().map(Attribute::key_string).collect())
            .unwrap_or_default();
        assert_eq!(keys, kept);
    }

    #[test]
    fn unsafe_styles_are_neutralized() {
        let token = sanitize("<div style=\"width: expression(1)\">");
        assert_eq!(
            token.tag().unwrap().attr_string("style").as_deref(),
            Some("/* insecure input */")
        );
    }

    #[test]
    fn generated_tags_are_trusted() {
        let cx = stage_context_with("", |_| {});
        let token = Token::TagOpen(Tag::element("a").with_attr("rel", "mw:WikiLink"));
        let TransformOutcome::Pass(out) = Sanitizer.apply(token.clone(), RANK, &cx).unwrap() else {
            panic!("expected the tag to pass");
        };
        assert_eq!(out, token);
    }
}
