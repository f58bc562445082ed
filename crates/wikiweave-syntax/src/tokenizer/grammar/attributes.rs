//! Attribute lists for HTML tags and table lines.
//!
//! Names and values may contain transclusions (`class="{{c}}"`), in which
//! case the key or value is kept as tokens for the attribute expander.

use crate::token::{Attribute, Token};

use super::inline::{attr_value, template_or_arg};
use super::{Grammar, push_text};
use crate::tokenizer::Rule;

/// Which attribute syntax to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrContext {
    /// Inside `<tag ...>`: may span lines, ends at `>` or `/>`.
    Html,
    /// After `{|`, `|-` or before a cell's `|`: one line, ends at `|`.
    Table,
}

impl AttrContext {
    fn at_terminator(self, p: &Grammar<'_, '_>) -> bool {
        match self {
            AttrContext::Html => p.at(">") || p.at("/>"),
            AttrContext::Table => p.at("|") || p.at("!!") || p.at_newline(),
        }
    }

    fn skip_space(self, p: &mut Grammar<'_, '_>) {
        loop {
            match p.peek_byte() {
                Some(b' ' | b'\t') => p.bump(1),
                Some(b'\r' | b'\n') if self == AttrContext::Html => p.bump(1),
                _ => break,
            }
        }
    }
}

pub(crate) fn attribute_list(p: &mut Grammar<'_, '_>, ctx: AttrContext) -> Vec<Attribute> {
    let mut attribs = Vec::new();
    loop {
        ctx.skip_space(p);
        if p.at_end() || ctx.at_terminator(p) {
            break;
        }
        let before = p.pos;
        match attribute(p, ctx) {
            Some(attr) => attribs.push(attr),
            // Junk between HTML attributes is dropped; in tables it ends the list.
            None if ctx == AttrContext::Html => p.bump_char(),
            None => break,
        }
        if p.pos == before {
            break;
        }
    }
    attribs
}

fn attribute(p: &mut Grammar<'_, '_>, ctx: AttrContext) -> Option<Attribute> {
    let key_start = p.pos;
    let key = name(p, ctx);
    if key.is_empty() {
        return None;
    }
    let key_end = p.pos;

    let after_key = p.pos;
    ctx.skip_space(p);
    if !p.at("=") {
        p.pos = after_key;
        return Some(
            Attribute::new(attr_value(key), "")
                .with_offsets(p.offsets([key_start, key_end, key_end, key_end])),
        );
    }
    p.bump(1);
    ctx.skip_space(p);

    let (value, value_start, value_end) = value(p, ctx);
    Some(
        Attribute::new(attr_value(key), attr_value(value))
            .with_offsets(p.offsets([key_start, key_end, value_start, value_end])),
    )
}

fn name(p: &mut Grammar<'_, '_>, ctx: AttrContext) -> Vec<Token> {
    let mut out = Vec::new();
    while !p.at_end() && !ctx.at_terminator(p) {
        if p.at("{{") {
            if let Ok(tokens) = p.memoized(Rule::TemplateOrArg, template_or_arg) {
                out.extend(tokens);
                continue;
            }
        }
        let Some(c) = p.rest().chars().next() else {
            break;
        };
        if c.is_whitespace()
            || matches!(c, '=' | '"' | '\'' | '<' | '>' | '[' | ']' | '{' | '}' | '|')
            || (c == '/' && ctx == AttrContext::Html)
        {
            break;
        }
        let start = p.pos;
        p.bump_char();
        push_text(&mut out, p.slice(start, p.pos), p.range(start, p.pos));
    }
    out
}

/// Quoted or bare value. Returns the tokens and the local range of the
/// value inside any quotes.
fn value(p: &mut Grammar<'_, '_>, ctx: AttrContext) -> (Vec<Token>, usize, usize) {
    let quote = match p.peek_byte() {
        Some(q @ (b'"' | b'\'')) => {
            p.bump(1);
            Some(q)
        }
        _ => None,
    };

    let start = p.pos;
    let mut out = Vec::new();
    while !p.at_end() {
        let ends = match quote {
            Some(q) => p.peek_byte() == Some(q) || (ctx == AttrContext::Table && p.at_newline()),
            None => {
                p.peek_byte().is_some_and(|b| b.is_ascii_whitespace())
                    || match ctx {
                        AttrContext::Html => p.at(">") || p.at("/>"),
                        AttrContext::Table => p.at("|") || p.at("!!"),
                    }
            }
        };
        if ends {
            break;
        }
        if p.at("{{") {
            if let Ok(tokens) = p.memoized(Rule::TemplateOrArg, template_or_arg) {
                out.extend(tokens);
                continue;
            }
        }
        let char_start = p.pos;
        p.bump_char();
        push_text(&mut out, p.slice(char_start, p.pos), p.range(char_start, p.pos));
    }
    let end = p.pos;
    if let Some(q) = quote {
        if p.peek_byte() == Some(q) {
            p.bump(1);
        }
    }
    (out, start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::AttrValue;
    use crate::tokenizer::{MemoCache, MemoConfig};
    use pretty_assertions::assert_eq;

    fn parse(src: &str, ctx: AttrContext) -> (Vec<Attribute>, usize) {
        let mut memo = MemoCache::new(MemoConfig::default());
        let mut p = Grammar::new(src, 0, &mut memo);
        let attribs = attribute_list(&mut p, ctx);
        (attribs, p.pos)
    }

    #[test]
    fn html_attributes_with_mixed_quoting() {
        let (attribs, end) = parse(r#"class="a b" id='x' hidden width=3>"#, AttrContext::Html);
        let pairs: Vec<(String, String)> = attribs
            .iter()
            .map(|a| (a.key_string(), a.value.to_plain_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("class".to_string(), "a b".to_string()),
                ("id".to_string(), "x".to_string()),
                ("hidden".to_string(), String::new()),
                ("width".to_string(), "3".to_string()),
            ]
        );
        assert_eq!(end, 33);
        assert_eq!(attribs[0].src_offsets, Some([0, 5, 7, 10]));
    }

    #[test]
    fn table_attributes_stop_at_pipe() {
        let (attribs, end) = parse("style=\"color:red\" | cell", AttrContext::Table);
        assert_eq!(attribs.len(), 1);
        assert_eq!(&"style=\"color:red\" | cell"[end..], "| cell");
    }

    #[test]
    fn transclusion_in_value_is_kept_as_tokens() {
        let (attribs, _) = parse("class=\"x {{c}}\">", AttrContext::Html);
        match &attribs[0].value {
            AttrValue::Tokens(tokens) => {
                assert_eq!(tokens.len(), 2);
                assert_eq!(tokens[0].as_text(), Some("x "));
            }
            other => panic!("expected tokens, got {other:?}"),
        }
    }
}
