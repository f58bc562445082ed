//! `[[wiki links]]` and `[http://external links]`.

use wikiweave_syntax::{AttrValue, Rank, SourceRange, Syntax, Tag, TagName, Token};

use crate::error::TransformError;
use crate::pipeline::{Registration, StageContext, TokenFilter, TransformOutcome, Transformer};
use crate::settings::CATEGORY_NAMESPACE;

const RANK: Rank = Rank::from_millis(1150);

/// Source ranges of the parts around a link's content.
fn edges(tag: &Tag, content: Option<[usize; 4]>) -> (Option<SourceRange>, Option<SourceRange>) {
    let Some(tsr) = tag.data.tsr else {
        return (None, None);
    };
    match content {
        Some([_, _, start, end]) => (
            Some(SourceRange::new(tsr.start, start)),
            Some(SourceRange::new(end, tsr.end)),
        ),
        None => (None, None),
    }
}

fn value_tokens(value: &AttrValue, tsr: Option<SourceRange>) -> Vec<Token> {
    match value {
        AttrValue::Str(s) if s.is_empty() => Vec::new(),
        AttrValue::Str(s) => vec![Token::text(s.clone(), tsr)],
        AttrValue::Tokens(tokens) => tokens.clone(),
    }
}

/// The link as written, for targets that are not valid titles.
fn literal(tag: &Tag) -> Vec<Token> {
    let mut out = vec![Token::text("[[", None)];
    for (i, attr) in tag.attribs.iter().enumerate() {
        if i > 0 {
            out.push(Token::text("|", None));
        }
        out.extend(value_tokens(&attr.value, None));
    }
    out.push(Token::text("]]", None));
    out
}

fn wiki_link(tag: &Tag, cx: &StageContext) -> Vec<Token> {
    let Some(target) = tag.attribs.first() else {
        return literal(tag);
    };
    let raw = target.value.to_plain_string();
    let title = match cx.parse.titles().resolve(&raw, 0) {
        Ok(title) => title,
        Err(err) => {
            log::debug!("link target {raw:?} is not a title: {err}");
            return literal(tag);
        }
    };

    if title.namespace == CATEGORY_NAMESPACE && !raw.trim_start().starts_with(':') {
        let mut link = Tag::element("link")
            .with_attr("rel", "mw:PageProp/Category")
            .with_attr("href", title.href());
        link.data.tsr = tag.data.tsr;
        link.data.src = tag.data.src.clone();
        return vec![Token::SelfClose(link)];
    }

    let href = match &title.fragment {
        Some(fragment) => format!("{}#{}", title.href(), fragment.replace(' ', "_")),
        None => title.href(),
    };
    let piped = tag.attribs.get(1);
    let (open_tsr, close_tsr) = edges(tag, piped.or(Some(target)).and_then(|a| a.src_offsets));
    let content = match piped {
        Some(content) => value_tokens(&content.value, None),
        None => {
            let tsr = target
                .src_offsets
                .filter(|_| tag.data.tsr.is_some())
                .map(|[_, _, start, end]| SourceRange::new(start, end));
            value_tokens(&target.value, tsr)
        }
    };

    let mut open = Tag::element("a")
        .with_attr("rel", "mw:WikiLink")
        .with_attr("href", href)
        .with_attr("title", title.text());
    open.data.tsr = open_tsr;
    open.data.stx = Some(if piped.is_some() {
        Syntax::Piped
    } else {
        Syntax::Simple
    });
    let close = Tag::element("a").with_tsr(close_tsr);

    let mut out = Vec::with_capacity(content.len() + 2);
    out.push(Token::TagOpen(open));
    out.extend(content);
    out.push(Token::TagClose(close));
    out
}

fn ext_link(tag: &Tag) -> Vec<Token> {
    let href = tag.attr_string("href").unwrap_or_default();
    let content = tag.attribs.get(1);
    let tokens = content.map(|a| a.value.to_tokens()).unwrap_or_default();
    let (open_tsr, close_tsr) = edges(tag, content.and_then(|a| a.src_offsets));

    let class = if tokens.is_empty() {
        "external autonumber"
    } else {
        "external text"
    };
    let mut open = Tag::element("a")
        .with_attr("rel", "mw:ExtLink")
        .with_attr("class", class)
        .with_attr("href", href);
    open.data.tsr = open_tsr;
    let close = Tag::element("a").with_tsr(close_tsr);

    let mut out = Vec::with_capacity(tokens.len() + 2);
    out.push(Token::TagOpen(open));
    out.extend(tokens);
    out.push(Token::TagClose(close));
    out
}

/// Turns link tokens into `a` elements (and category links into `link`
/// page properties).
#[derive(Debug)]
pub struct LinkHandler;

impl Transformer for LinkHandler {
    fn name(&self) -> &'static str {
        "LinkHandler"
    }

    fn registrations(&self) -> Vec<Registration> {
        vec![
            Registration::new(RANK, TokenFilter::Tag(TagName::WikiLink)),
            Registration::new(RANK, TokenFilter::Tag(TagName::ExtLink)),
        ]
    }

    fn apply(
        &mut self,
        token: Token,
        _rank: Rank,
        cx: &StageContext,
    ) -> Result<TransformOutcome, TransformError> {
        let out = match &token {
            Token::SelfClose(tag) if tag.name == TagName::WikiLink => wiki_link(tag, cx),
            Token::SelfClose(tag) if tag.name == TagName::ExtLink => ext_link(tag),
            _ => return Ok(TransformOutcome::Pass(token)),
        };
        Ok(TransformOutcome::Emit(out))
    }
}
