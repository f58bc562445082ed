//! Small helpers over token sequences shared by the transformers.

use wikiweave_syntax::{AttrValue, Attribute, Tag, TagName, Token};

fn is_blank(token: &Token) -> bool {
    match token {
        Token::Newline(_) => true,
        Token::Text(text) => text.value.trim().is_empty(),
        _ => false,
    }
}

/// Remove leading and trailing whitespace (text and newlines), looking
/// through comments at either end.
pub fn trim_tokens(mut tokens: Vec<Token>) -> Vec<Token> {
    let mut i = 0;
    while i < tokens.len() {
        if is_blank(&tokens[i]) {
            tokens.remove(i);
            continue;
        }
        match &mut tokens[i] {
            Token::Text(text) => {
                text.value = text.value.trim_start().to_string();
                break;
            }
            Token::Comment(_) => i += 1,
            _ => break,
        }
    }

    let mut j = tokens.len();
    while j > 0 {
        if is_blank(&tokens[j - 1]) {
            tokens.remove(j - 1);
            j -= 1;
            continue;
        }
        match &mut tokens[j - 1] {
            Token::Text(text) => {
                text.value = text.value.trim_end().to_string();
                break;
            }
            Token::Comment(_) => j -= 1,
            _ => break,
        }
    }
    tokens
}

/// Does any token, including tokens nested in attributes, start a
/// transclusion or argument?
pub fn contains_calls(tokens: &[Token]) -> bool {
    tokens.iter().any(|token| match token.tag() {
        Some(tag) if matches!(tag.name, TagName::Template | TagName::TemplateArg) => true,
        Some(tag) => tag.attribs.iter().any(attr_contains_calls),
        None => false,
    })
}

pub fn attr_contains_calls(attr: &Attribute) -> bool {
    value_contains_calls(&attr.key) || value_contains_calls(&attr.value)
}

fn value_contains_calls(value: &AttrValue) -> bool {
    match value {
        AttrValue::Str(_) => false,
        AttrValue::Tokens(tokens) => contains_calls(tokens),
    }
}

/// A `meta` tag with the given `typeof`.
pub fn meta(type_of: &str) -> Tag {
    Tag::element("meta").with_attr("typeof", type_of)
}

/// Inline diagnostic text wrapped in a placeholder span.
pub fn placeholder(message: impl Into<String>) -> Vec<Token> {
    vec![
        Token::TagOpen(Tag::element("span").with_attr("typeof", "mw:Placeholder")),
        Token::text(message, None),
        Token::TagClose(Tag::element("span")),
    ]
}

/// Kinds of marker metas that bracket generated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Start,
    End,
}

/// Is this a transclusion, parameter or include marker?
pub fn wrapper_marker(token: &Token) -> Option<MarkerKind> {
    let tag = token.tag()?;
    if !tag.name.is_element("meta") {
        return None;
    }
    let type_of = tag.attr_string("typeof")?;
    let generated = type_of.split_whitespace().find(|t| {
        t.starts_with("mw:Transclusion") || t.starts_with("mw:Param") || t.starts_with("mw:Includes/")
    })?;
    Some(if generated.ends_with("/End") {
        MarkerKind::End
    } else {
        MarkerKind::Start
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wikiweave_syntax::tokens_to_string;

    #[test]
    fn trim_looks_through_comments_and_newlines() {
        let tokens = vec![
            Token::newline(None),
            Token::text("  ", None),
            Token::comment("c", None),
            Token::text("  a ", None),
            Token::SelfClose(Tag::element("br")),
            Token::text(" b  ", None),
            Token::newline(None),
        ];
        let trimmed = trim_tokens(tokens);
        assert_eq!(trimmed.len(), 4);
        assert!(matches!(trimmed[0], Token::Comment(_)));
        assert_eq!(tokens_to_string(&trimmed), "a  b");
    }

    #[test]
    fn finds_calls_inside_attributes() {
        let template = Token::SelfClose(Tag::new(TagName::Template));
        let div = Tag::element("div").with_attr("class", vec![template]);
        assert!(contains_calls(&[Token::TagOpen(div)]));
        assert!(!contains_calls(&[Token::text("x", None)]));
    }

    #[test]
    fn recognises_wrapper_markers() {
        let start = Token::SelfClose(meta("mw:Transclusion"));
        let end = Token::SelfClose(meta("mw:Transclusion/End"));
        let other = Token::SelfClose(meta("mw:PageProp/notoc"));
        assert_eq!(wrapper_marker(&start), Some(MarkerKind::Start));
        assert_eq!(wrapper_marker(&end), Some(MarkerKind::End));
        assert_eq!(wrapper_marker(&other), None);
    }
}
