//! Mid-line constructs: transclusions, links, quotes, tags and text.

use crate::lexer::{self, Atom};
use crate::token::{AttrValue, Attribute, Syntax, Tag, TagName, Token};

use super::attributes::{self, AttrContext};
use super::{Grammar, Stops, nested_content, push_text};
use crate::tokenizer::{NoMatch, Rule};

/// Double-underscore words recognised as behavior switches.
const BEHAVIOR_SWITCHES: &[&str] = &[
    "NOTOC",
    "FORCETOC",
    "TOC",
    "NOEDITSECTION",
    "NEWSECTIONLINK",
    "NONEWSECTIONLINK",
    "NOGALLERY",
    "HIDDENCAT",
    "NOCONTENTCONVERT",
    "NOCC",
    "NOTITLECONVERT",
    "NOTC",
    "INDEX",
    "NOINDEX",
    "STATICREDIRECT",
    "DISAMBIG",
];

/// URL schemes accepted in external links.
const URL_SCHEMES: &[&str] = &[
    "https://", "http://", "ftp://", "irc://", "news:", "mailto:", "//",
];

/// Inline content up to the end of the line, a stop, or the limit.
///
/// When the content is known to run out before its closing syntax, the
/// cursor jumps to the limit; the enclosing construct then fails.
pub(crate) fn inline_line(p: &mut Grammar<'_, '_>, stops: Stops, out: &mut Vec<Token>) {
    let mark = p.scan_mark();
    while !p.at_end() && !p.at_newline() && !stops.hit(p) {
        if p.scan_step(stops) {
            p.pos = p.limit;
            break;
        }
        let before = p.pos;
        if !construct(p, out) {
            literal(p, out);
        }
        debug_assert!(p.pos > before, "inline grammar stalled at {before}");
    }
    if stops.single_line {
        p.scan_done(mark, stops);
    }
}

/// Try the construct that can start at the cursor. Returns false (having
/// consumed nothing) when there is none.
fn construct(p: &mut Grammar<'_, '_>, out: &mut Vec<Token>) -> bool {
    let parsed = match p.peek_atom() {
        Some(Atom::LBrace) if p.at("{{") => p.memoized(Rule::TemplateOrArg, template_or_arg),
        Some(Atom::LBracket) if p.at("[[") => p.memoized(Rule::WikiLink, wikilink),
        Some(Atom::LBracket) => p.memoized(Rule::ExtLink, ext_link),
        Some(Atom::Lt) if p.at("<!--") => Ok(comment(p)),
        Some(Atom::Lt) => p.memoized(Rule::HtmlTag, html_tag),
        Some(Atom::Apostrophe) if p.at("''") => Ok(quote_run(p)),
        Some(Atom::Underscore) if p.at("__") => p.attempt(behavior_switch),
        _ => return false,
    };
    match parsed {
        Ok(tokens) => {
            for token in tokens {
                match token {
                    Token::Text(text) => match text.data.tsr {
                        Some(range) => push_text(out, &text.value, range),
                        None => out.push(Token::Text(text)),
                    },
                    other => out.push(other),
                }
            }
            true
        }
        Err(_) => false,
    }
}

/// A run of prose, or a single character that starts nothing.
fn literal(p: &mut Grammar<'_, '_>, out: &mut Vec<Token>) {
    let start = p.pos;
    let end = lexer::text_run_end(p.slice(0, p.limit), start, p.limit);
    if end > start {
        p.pos = end;
    } else {
        p.bump_char();
    }
    push_text(out, p.slice(start, p.pos), p.range(start, p.pos));
}

fn comment(p: &mut Grammar<'_, '_>) -> Vec<Token> {
    let start = p.pos;
    p.bump(4);
    let body_start = p.pos;
    let (body_end, end) = match p.rest().find("-->") {
        Some(idx) => (p.pos + idx, p.pos + idx + 3),
        None => (p.limit, p.limit),
    };
    p.pos = end;
    vec![Token::comment(
        p.slice(body_start, body_end),
        Some(p.range(start, end)),
    )]
}

/// `{{{` is tried as an argument first, then as a template whose target
/// starts with `{`.
pub(crate) fn template_or_arg(p: &mut Grammar<'_, '_>) -> Result<Vec<Token>, NoMatch> {
    if p.at("{{{") {
        if let Ok(tokens) = p.attempt(template_arg) {
            return Ok(tokens);
        }
    }
    p.attempt(template)
}

fn template(p: &mut Grammar<'_, '_>) -> Result<Vec<Token>, NoMatch> {
    let start = p.pos;
    if !p.at("{{") {
        return Err(p.no_match(Rule::TemplateOrArg));
    }
    p.bump(2);

    let target_start = p.pos;
    let target = nested_content(p, Stops::template());
    let target_end = p.pos;
    let mut attribs = vec![
        Attribute::new(attr_value(target), "").with_offsets(p.offsets([
            target_start,
            target_end,
            target_end,
            target_end,
        ])),
    ];

    while p.at("|") {
        p.bump(1);
        attribs.push(call_param(p, Stops::template()));
    }
    if !p.at("}}") {
        return Err(p.no_match(Rule::TemplateOrArg));
    }
    p.bump(2);

    Ok(vec![call_token(p, TagName::Template, attribs, start)])
}

fn template_arg(p: &mut Grammar<'_, '_>) -> Result<Vec<Token>, NoMatch> {
    let start = p.pos;
    p.bump(3);

    let name_start = p.pos;
    let name = nested_content(p, Stops::tplarg());
    let name_end = p.pos;
    let mut attribs = vec![
        Attribute::new(attr_value(name), "").with_offsets(p.offsets([
            name_start, name_end, name_end, name_end,
        ])),
    ];

    while p.at("|") {
        p.bump(1);
        let value_start = p.pos;
        let value = nested_content(p, Stops::tplarg());
        attribs.push(Attribute::new("", attr_value(value)).with_offsets(p.offsets([
            value_start,
            value_start,
            value_start,
            p.pos,
        ])));
    }
    if !p.at("}}}") {
        return Err(p.no_match(Rule::TemplateOrArg));
    }
    p.bump(3);

    Ok(vec![call_token(p, TagName::TemplateArg, attribs, start)])
}

fn call_token(p: &Grammar<'_, '_>, name: TagName, attribs: Vec<Attribute>, start: usize) -> Token {
    let mut tag = Tag::new(name).with_tsr(Some(p.range(start, p.pos)));
    tag.attribs = attribs;
    tag.data.src = Some(p.slice(start, p.pos).to_string());
    Token::SelfClose(tag)
}

/// `name=value` or a positional `value`.
///
/// Named offsets are `[key_start, key_end, value_start, value_end]`;
/// positional ones have an empty key range at the value start.
fn call_param(p: &mut Grammar<'_, '_>, stops: Stops) -> Attribute {
    let key_start = p.pos;
    let named = p.attempt(|p| {
        let key = nested_content(
            p,
            Stops {
                equals: true,
                ..stops
            },
        );
        if p.at("=") {
            let key_end = p.pos;
            p.bump(1);
            Ok((key, key_end))
        } else {
            Err(p.no_match(Rule::TemplateOrArg))
        }
    });

    match named {
        Ok((key, key_end)) => {
            let value_start = p.pos;
            let value = nested_content(p, stops);
            Attribute::new(attr_value(key), attr_value(value)).with_offsets(p.offsets([
                key_start,
                key_end,
                value_start,
                p.pos,
            ]))
        }
        Err(_) => {
            let value = nested_content(p, stops);
            Attribute::new("", attr_value(value)).with_offsets(p.offsets([
                key_start, key_start, key_start, p.pos,
            ]))
        }
    }
}

/// Plain text collapses to a string; anything else stays tokens.
pub(crate) fn attr_value(tokens: Vec<Token>) -> AttrValue {
    if tokens.iter().all(|t| matches!(t, Token::Text(_))) {
        AttrValue::Str(tokens.iter().filter_map(Token::as_text).collect())
    } else {
        AttrValue::Tokens(tokens)
    }
}

fn wikilink(p: &mut Grammar<'_, '_>) -> Result<Vec<Token>, NoMatch> {
    let start = p.pos;
    p.bump(2);

    let target_start = p.pos;
    let mut target = Vec::new();
    inline_line(
        p,
        Stops {
            link_target: true,
            single_line: true,
            ..Stops::default()
        },
        &mut target,
    );
    let target_end = p.pos;
    if target.is_empty() {
        return Err(p.no_match(Rule::WikiLink));
    }

    let mut tag = Tag::new(TagName::WikiLink);
    tag.attribs.push(
        Attribute::new("href", attr_value(target)).with_offsets(p.offsets([
            target_start,
            target_start,
            target_start,
            target_end,
        ])),
    );

    if p.at("|") {
        p.bump(1);
        let content_start = p.pos;
        let mut content = Vec::new();
        inline_line(
            p,
            Stops {
                wikilink: true,
                single_line: true,
                ..Stops::default()
            },
            &mut content,
        );
        tag.attribs.push(
            Attribute::new("mw:maybeContent", AttrValue::Tokens(content)).with_offsets(
                p.offsets([content_start, content_start, content_start, p.pos]),
            ),
        );
        tag.data.stx = Some(Syntax::Piped);
    } else {
        tag.data.stx = Some(Syntax::Simple);
    }

    if !p.at("]]") {
        return Err(p.no_match(Rule::WikiLink));
    }
    p.bump(2);

    tag.data.tsr = Some(p.range(start, p.pos));
    tag.data.src = Some(p.slice(start, p.pos).to_string());
    Ok(vec![Token::SelfClose(tag)])
}

fn ext_link(p: &mut Grammar<'_, '_>) -> Result<Vec<Token>, NoMatch> {
    let start = p.pos;
    p.bump(1);

    let url_start = p.pos;
    url(p)?;
    let url_end = p.pos;

    let mut content = Vec::new();
    p.skip_spaces();
    let content_start = p.pos;
    inline_line(
        p,
        Stops {
            extlink: true,
            single_line: true,
            ..Stops::default()
        },
        &mut content,
    );
    if !p.at("]") {
        return Err(p.no_match(Rule::ExtLink));
    }
    let content_end = p.pos;
    p.bump(1);

    let mut tag = Tag::new(TagName::ExtLink);
    tag.attribs.push(
        Attribute::new("href", p.slice(url_start, url_end)).with_offsets(p.offsets([
            url_start, url_start, url_start, url_end,
        ])),
    );
    tag.attribs.push(
        Attribute::new("mw:content", AttrValue::Tokens(content)).with_offsets(p.offsets([
            content_start,
            content_start,
            content_start,
            content_end,
        ])),
    );
    tag.data.tsr = Some(p.range(start, p.pos));
    tag.data.src = Some(p.slice(start, p.pos).to_string());
    Ok(vec![Token::SelfClose(tag)])
}

/// A bare URL: a known scheme followed by at least one URL character.
pub(crate) fn url(p: &mut Grammar<'_, '_>) -> Result<(), NoMatch> {
    let Some(scheme) = URL_SCHEMES.iter().find(|s| p.at_ci(s)) else {
        return Err(p.no_match(Rule::Url));
    };
    let start = p.pos;
    p.bump(scheme.len());
    let body_start = p.pos;
    while let Some(c) = p.rest().chars().next() {
        if c.is_whitespace() || matches!(c, '[' | ']' | '<' | '>' | '"' | '{' | '}' | '|') {
            break;
        }
        p.bump_char();
    }
    if p.pos == body_start {
        p.pos = start;
        return Err(p.no_match(Rule::Url));
    }
    Ok(())
}

/// Runs of apostrophes. Two, three and five are quote markers; four is an
/// apostrophe plus bold; more than five keeps only the last five.
fn quote_run(p: &mut Grammar<'_, '_>) -> Vec<Token> {
    let start = p.pos;
    let count = p.rest().bytes().take_while(|b| *b == b'\'').count();
    p.bump(count);

    let mut out = Vec::new();
    let (extra, marker) = match count {
        4 => (1, 3),
        n if n > 5 => (n - 5, 5),
        n => (0, n),
    };
    if extra > 0 {
        push_text(&mut out, &"'".repeat(extra), p.range(start, start + extra));
    }
    let marker_start = start + extra;
    let mut quote = Tag::new(TagName::Quote).with_tsr(Some(p.range(marker_start, p.pos)));
    quote.data.src = Some("'".repeat(marker));
    out.push(Token::SelfClose(quote));
    out
}

fn behavior_switch(p: &mut Grammar<'_, '_>) -> Result<Vec<Token>, NoMatch> {
    let start = p.pos;
    p.bump(2);
    let word_len = p
        .rest()
        .bytes()
        .take_while(|b| b.is_ascii_uppercase())
        .count();
    let word = p.slice(p.pos, p.pos + word_len);
    p.bump(word_len);
    if !BEHAVIOR_SWITCHES.contains(&word) || !p.at("__") {
        return Err(p.no_match(Rule::Inline));
    }
    p.bump(2);

    let mut tag = Tag::new(TagName::BehaviorSwitch)
        .with_attr("magic", word)
        .with_tsr(Some(p.range(start, p.pos)));
    tag.data.src = Some(p.slice(start, p.pos).to_string());
    Ok(vec![Token::SelfClose(tag)])
}

/// `<name attrs>`, `</name>`, `<name/>` and `<nowiki>` sections.
fn html_tag(p: &mut Grammar<'_, '_>) -> Result<Vec<Token>, NoMatch> {
    let start = p.pos;
    p.bump(1);
    let closing = p.at("/");
    if closing {
        p.bump(1);
    }

    let name_len = p
        .rest()
        .bytes()
        .enumerate()
        .take_while(|(i, b)| {
            if *i == 0 {
                b.is_ascii_alphabetic()
            } else {
                b.is_ascii_alphanumeric()
            }
        })
        .count();
    if name_len == 0 {
        return Err(p.no_match(Rule::HtmlTag));
    }
    if p.no_tag_end_ahead() {
        return Err(p.no_match(Rule::HtmlTag));
    }
    let name = p.slice(p.pos, p.pos + name_len).to_ascii_lowercase();
    p.bump(name_len);

    if !closing && name == "nowiki" {
        return nowiki(p, start);
    }

    let attribs = if closing {
        p.skip_spaces();
        Vec::new()
    } else {
        attributes::attribute_list(p, AttrContext::Html)
    };
    p.skip_spaces();
    let self_closing = p.at("/>");
    if self_closing {
        p.bump(2);
    } else if p.at(">") {
        p.bump(1);
    } else {
        return Err(p.no_match(Rule::HtmlTag));
    }

    let mut tag = Tag::element(&name).with_tsr(Some(p.range(start, p.pos)));
    tag.attribs = attribs;
    tag.data.stx = Some(Syntax::Html);
    Ok(vec![if closing {
        Token::TagClose(tag)
    } else if self_closing {
        Token::SelfClose(tag)
    } else {
        Token::TagOpen(tag)
    }])
}

/// Escaped section: the body is a single text token, wrapped in a marker
/// span so the serializer can restore the escaping.
fn nowiki(p: &mut Grammar<'_, '_>, start: usize) -> Result<Vec<Token>, NoMatch> {
    p.skip_spaces();
    let marker = || Tag::element("span").with_attr("typeof", "mw:Nowiki");

    if p.at("/>") {
        p.bump(2);
        let tag = marker().with_tsr(Some(p.range(start, p.pos)));
        return Ok(vec![Token::SelfClose(tag)]);
    }
    if !p.at(">") {
        return Err(p.no_match(Rule::HtmlTag));
    }
    p.bump(1);

    let body_start = p.pos;
    let rest_lower = p.rest().to_ascii_lowercase();
    let Some(idx) = rest_lower.find("</nowiki>") else {
        return Err(p.no_match(Rule::HtmlTag));
    };
    let body_end = body_start + idx;
    let end = body_end + "</nowiki>".len();
    p.pos = end;

    let mut tokens = vec![Token::TagOpen(
        marker().with_tsr(Some(p.range(start, body_start))),
    )];
    if body_end > body_start {
        tokens.push(Token::text(
            p.slice(body_start, body_end),
            Some(p.range(body_start, body_end)),
        ));
    }
    tokens.push(Token::TagClose(
        Tag::element("span").with_tsr(Some(p.range(body_end, end))),
    ));
    Ok(tokens)
}
