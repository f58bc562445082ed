//! Expansion of transclusions inside tag attributes.
//!
//! `<div class="{{c}}">` and `{| {{table style}}` carry their attribute keys
//! and values as token sequences. Each one is run through a
//! `TokensToTokens` pipeline; what comes back is cleaned up before it goes
//! back on the tag:
//!
//! - Encapsulation markers are stripped from the expanded values. When a
//!   table attribute expands to several lines, the first line stays on the
//!   tag and the rest becomes content after it, with the transclusion's
//!   start marker hoisted in front of the tag so the whole block is
//!   encapsulated together.
//! - A key that expanded to `k=v` text in place of a bare attribute is
//!   re-tokenized as an attribute list and spliced in.
//!
//! At the top level, a tag with expanded attributes is marked
//! `mw:ExpandedAttrs` and remembers the wikitext of those attributes.

use serde_json::{Value, json};
use wikiweave_syntax::{
    AttrContext, AttrValue, Attribute, Rank, Syntax, Tag, TagName, Token, Tokenizer,
    tokens_to_string,
};

use crate::error::TransformError;
use crate::pipeline::{
    Deferred, PipelineOptions, Registration, StageContext, TokenFilter, TransformOutcome,
    Transformer,
};
use crate::tokens::{MarkerKind, wrapper_marker};

const RANK: Rank = Rank::from_millis(1120);
/// Expanded tags are stamped here so they are not expanded again.
pub const EXPANDED_RANK: Rank = Rank::from_millis(1130);

const NAME: &str = "AttributeExpander";

fn is_table_tag(name: &TagName) -> bool {
    ["table", "tbody", "tr", "td", "th", "caption"]
        .iter()
        .any(|t| name.is_element(t))
}

/// Metas the pipeline generated itself are never expanded.
fn is_generated_meta(tag: &Tag) -> bool {
    tag.name.is_element("meta")
        && tag.attr_string("typeof").is_some_and(|t| {
            ["mw:TSRMarker", "mw:Placeholder", "mw:Transclusion", "mw:Param", "mw:Includes"]
                .iter()
                .any(|prefix| t.contains(prefix))
        })
}

fn wants_expansion(token: &Token) -> bool {
    let tag = match token {
        Token::TagOpen(tag) | Token::SelfClose(tag) => tag,
        _ => return false,
    };
    !matches!(tag.name, TagName::Template | TagName::TemplateArg)
        && !is_generated_meta(tag)
        && tag
            .attribs
            .iter()
            .any(|a| a.key.has_markup() || a.value.has_markup())
}

/// Position of the first newline outside `<noinclude>`-style sections.
fn newline_index(tokens: &[Token]) -> Option<usize> {
    let mut in_include = false;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::SelfClose(tag)
                if tag.name.is_element("meta")
                    && tag
                        .attr_string("typeof")
                        .is_some_and(|t| t.contains("mw:Includes/")) =>
            {
                in_include = wrapper_marker(token) == Some(MarkerKind::Start);
            }
            Token::Newline(_) if !in_include => return Some(i),
            _ => {}
        }
    }
    None
}

/// An expanded key or value after clean-up.
#[derive(Debug, Default)]
struct Cleaned {
    tokens: Vec<Token>,
    /// A transclusion contributed to the value.
    generated: bool,
    /// Start marker to place in front of the tag.
    hoisted: Option<Token>,
    /// Content that follows the tag.
    after: Vec<Token>,
}

fn strip_markers(tokens: Vec<Token>) -> Cleaned {
    let mut cleaned = Cleaned::default();
    for token in tokens {
        match wrapper_marker(&token) {
            Some(MarkerKind::Start) => cleaned.generated = true,
            Some(MarkerKind::End) => {}
            None => cleaned.tokens.push(token),
        }
    }
    cleaned
}

/// Split at the newline at `at`. Only transcluded values are split: the
/// transclusion's start marker moves in front of the tag and takes over
/// the tag's start offset.
fn split_lines(tag: &Tag, tokens: Vec<Token>, at: usize, wrap: bool) -> Cleaned {
    let Some(tag_tsr) = tag.data.tsr.filter(|_| wrap) else {
        return strip_markers(tokens);
    };
    let start = tokens[..at]
        .iter()
        .rposition(|t| wrapper_marker(t) == Some(MarkerKind::Start));
    let Some(start) = start else {
        return strip_markers(tokens);
    };

    let mut before = tokens;
    let after = before.split_off(at);
    let mut marker = before.remove(start);
    if let Some(tsr) = &mut marker.data_mut().tsr {
        tsr.start = tag_tsr.start;
    }
    let mut cleaned = strip_markers(before);
    cleaned.generated = true;
    cleaned.hoisted = Some(marker);
    cleaned.after = after;
    cleaned
}

fn clean(tag: &Tag, tokens: Vec<Token>, newlines_ok: bool, wrap: bool) -> Cleaned {
    match newline_index(&tokens).filter(|_| !newlines_ok) {
        Some(at) => split_lines(tag, tokens, at, wrap),
        None => strip_markers(tokens),
    }
}

fn to_value(tokens: Vec<Token>) -> AttrValue {
    if tokens.iter().all(|t| matches!(t, Token::Text(_))) {
        AttrValue::Str(tokens.iter().filter_map(Token::as_text).collect())
    } else {
        AttrValue::Tokens(tokens)
    }
}

/// Wikitext an attribute part was written as.
fn source_of(cx: &StageContext, attr: &Attribute, value: bool) -> String {
    match attr.src_offsets {
        Some([ks, ke, vs, ve]) => {
            let (start, end) = if value { (vs, ve) } else { (ks, ke) };
            cx.parse
                .page_slice(wikiweave_syntax::SourceRange::new(start, end))
        }
        None if value => attr.value.to_plain_string(),
        None => attr.key.to_plain_string(),
    }
}

/// Whole `key=value` wikitext of an attribute, for attributes that end up
/// after a split tag.
fn attribute_source(cx: &StageContext, attr: &Attribute) -> String {
    match attr.src_offsets {
        Some([ks, _, _, ve]) => cx
            .parse
            .page_slice(wikiweave_syntax::SourceRange::new(ks, ve)),
        None if attr.value.is_empty() => attr.key.to_plain_string(),
        None => format!(
            "{}=\"{}\"",
            attr.key.to_plain_string(),
            attr.value.to_plain_string()
        ),
    }
}

#[derive(Debug, Default)]
pub struct AttributeExpander;

impl Transformer for AttributeExpander {
    fn name(&self) -> &'static str {
        NAME
    }

    fn registrations(&self) -> Vec<Registration> {
        vec![Registration::new(RANK, TokenFilter::Any)]
    }

    fn apply(
        &mut self,
        token: Token,
        rank: Rank,
        cx: &StageContext,
    ) -> Result<TransformOutcome, TransformError> {
        if !wants_expansion(&token) {
            return Ok(TransformOutcome::Pass(token));
        }
        Ok(TransformOutcome::Defer(Deferred {
            rank,
            future: Box::pin(expand(cx.clone(), token)),
        }))
    }
}

async fn expand_part(
    cx: &StageContext,
    options: PipelineOptions,
    token: &Token,
    value: &AttrValue,
) -> Result<Option<Vec<Token>>, TransformError> {
    if !value.has_markup() {
        return Ok(None);
    }
    cx.parse
        .expand_tokens(options, cx.frame.clone(), value.to_tokens())
        .await
        .map(Some)
        .map_err(|err| TransformError::nested(NAME, token, err))
}

async fn expand(cx: StageContext, token: Token) -> Result<Vec<Token>, TransformError> {
    let (mut tag, self_closing) = match token.clone() {
        Token::TagOpen(tag) => (tag, false),
        Token::SelfClose(tag) => (tag, true),
        other => return Ok(vec![other]),
    };
    let wrap = cx.options.wrap_templates;
    let options = PipelineOptions {
        attr_expansion: true,
        ..cx.options
    };
    let newlines_ok = tag.data.stx == Some(Syntax::Html) || !is_table_tag(&tag.name);
    let attr_context = if newlines_ok {
        AttrContext::Html
    } else {
        AttrContext::Table
    };

    let mut attribs = Vec::with_capacity(tag.attribs.len());
    let mut hoisted = Vec::new();
    let mut after = Vec::new();
    let mut data_mw: Vec<Value> = Vec::new();

    let original = std::mem::take(&mut tag.attribs);
    let mut rest = original.iter();
    for attr in rest.by_ref() {
        let key = expand_part(&cx, options, &token, &attr.key).await?;
        let value = expand_part(&cx, options, &token, &attr.value).await?;
        let mut split = false;
        let mut generated = false;
        let mut reparsed = None;

        let key = match key {
            Some(tokens) => {
                let mut cleaned = clean(&tag, tokens, newlines_ok, wrap);
                generated |= cleaned.generated;
                split |= cleaned.hoisted.is_some();
                hoisted.extend(cleaned.hoisted.take());
                after.append(&mut cleaned.after);

                let text = tokens_to_string(&cleaned.tokens);
                let text = text.trim();
                if attr.value.is_empty() && text.contains('=') {
                    let mut tokenizer = Tokenizer::new(cx.parse.settings.memo);
                    reparsed = tokenizer
                        .tokenize_attributes(text, attr_context, 0)
                        .ok()
                        .filter(|found| !found.is_empty());
                }
                to_value(cleaned.tokens)
            }
            None => attr.key.clone(),
        };

        let key_text = key.to_plain_string();
        let value = match value {
            Some(tokens) if !key_text.starts_with("mw:") => {
                let mut cleaned = clean(&tag, tokens, newlines_ok, wrap);
                generated |= cleaned.generated;
                split |= cleaned.hoisted.is_some();
                hoisted.extend(cleaned.hoisted.take());
                after.append(&mut cleaned.after);
                to_value(cleaned.tokens)
            }
            Some(tokens) => AttrValue::Tokens(tokens),
            None => attr.value.clone(),
        };

        if wrap && (generated || (reparsed.is_some() && split)) {
            let txt = match &reparsed {
                Some(found) => found[0].key_string(),
                None => key_text.trim().to_string(),
            };
            let mut k = json!({ "txt": txt });
            if reparsed.is_some() || attr.key.has_markup() {
                k["wt"] = json!(source_of(&cx, attr, false));
            }
            let v = if reparsed.is_some() {
                json!({})
            } else {
                json!({ "wt": source_of(&cx, attr, true) })
            };
            data_mw.push(json!([k, v]));
        }

        match reparsed {
            Some(found) => attribs.extend(found.into_iter().map(|mut a| {
                a.src_offsets = None;
                a
            })),
            None => attribs.push(Attribute {
                key,
                value,
                src_offsets: attr.src_offsets,
            }),
        }
        if split {
            break;
        }
    }

    // Attributes after a split line are content too.
    for attr in rest {
        after.push(Token::text(format!(" {}", attribute_source(&cx, attr)), None));
    }

    tag.attribs = attribs;
    if !data_mw.is_empty() && tag.attr("about").is_none() {
        let type_of = match tag.attr_string("typeof") {
            Some(existing) => format!("{existing} mw:ExpandedAttrs"),
            None => "mw:ExpandedAttrs".to_string(),
        };
        tag.set_attr("about", cx.parse.new_about_id());
        tag.set_attr("typeof", type_of);
        tag.data.tmp.expanded_attrs = Some(json!({ "attribs": data_mw }).to_string());
    }

    let mut out = hoisted;
    out.push(if self_closing {
        Token::SelfClose(tag)
    } else {
        Token::TagOpen(tag)
    });
    out.extend(after);
    Ok(out
        .into_iter()
        .map(|t| t.with_rank(EXPANDED_RANK))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryFetcher;
    use crate::settings::ParserSettings;
    use crate::test_support::{run_local, stage_context_for, text_of, type_ofs};
    use pretty_assertions::assert_eq;
    use wikiweave_syntax::SourceRange;

    fn fetcher() -> MemoryFetcher {
        MemoryFetcher::new()
            .with_page("Template:Echo", "{{{1}}}")
            .with_page("Template:Attrs", "style=\"color:red\"")
            .with_page("Template:Tblattr", "class=\"x\"\nrest")
    }

    fn run(source: &str, wrap: bool) -> Vec<Token> {
        let cx = stage_context_for(source, fetcher(), ParserSettings::default(), |o| {
            o.wrap_templates = wrap
        });
        let token = Tokenizer::default().tokenize(source, 0).unwrap()[0].clone();
        match AttributeExpander.apply(token, RANK, &cx).unwrap() {
            TransformOutcome::Defer(deferred) => run_local(deferred.future).unwrap(),
            TransformOutcome::Pass(token) => vec![token],
            _ => panic!("unexpected outcome"),
        }
    }

    #[test]
    fn plain_attributes_pass_through() {
        let cx = stage_context_for("<div class=\"a\">", fetcher(), ParserSettings::default(), |_| {});
        let token = Tokenizer::default().tokenize("<div class=\"a\">", 0).unwrap()[0].clone();
        assert!(matches!(
            AttributeExpander.apply(token, RANK, &cx).unwrap(),
            TransformOutcome::Pass(_)
        ));
    }

    #[test]
    fn expands_templated_value() {
        let out = run("<div class=\"{{echo|big}}\">", false);
        assert_eq!(out.len(), 1);
        let tag = out[0].tag().unwrap();
        assert_eq!(tag.attr("class"), Some(&AttrValue::Str("big".to_string())));
        assert_eq!(out[0].rank(), Some(EXPANDED_RANK));
    }

    #[test]
    fn wrapped_expansion_marks_the_tag() {
        let out = run("<div class=\"{{echo|big}}\">", true);
        let tag = out[0].tag().unwrap();
        assert_eq!(tag.attr_string("class").as_deref(), Some("big"));
        assert!(tag.has_type_of("mw:ExpandedAttrs"));
        assert!(tag.attr("about").is_some());
        assert_eq!(
            tag.data.tmp.expanded_attrs.as_deref(),
            Some(r#"{"attribs":[[{"txt":"class"},{"wt":"{{echo|big}}"}]]}"#)
        );
    }

    #[test]
    fn key_value_text_is_reparsed_into_attributes() {
        let out = run("<div {{attrs}}>", false);
        let tag = out[0].tag().unwrap();
        assert_eq!(tag.attribs.len(), 1);
        assert_eq!(tag.attr_string("style").as_deref(), Some("color:red"));
    }

    #[test]
    fn multi_line_table_attributes_become_content() {
        let out = run("{|{{tblattr}}\n|}", true);
        assert_eq!(
            type_ofs(&out),
            vec!["mw:Transclusion", "mw:Transclusion/End"]
        );
        assert_eq!(out[0].tsr().map(|r| r.start), Some(0));
        let table = out[1].tag().unwrap();
        assert!(table.name.is_element("table"));
        assert!(table.has_type_of("mw:ExpandedAttrs"));
        assert_eq!(table.attr_string("class").as_deref(), Some("x"));
        assert_eq!(text_of(&out[2..]), "\nrest");
    }

    #[test]
    fn generated_metas_are_left_alone() {
        let mut meta = crate::tokens::meta("mw:Transclusion");
        meta.attribs.push(Attribute::new(
            "data",
            vec![Token::SelfClose(Tag::new(TagName::Template))],
        ));
        meta.data.tsr = Some(SourceRange::new(0, 1));
        assert!(!wants_expansion(&Token::SelfClose(meta)));
    }
}
