//! Deciding what a `{{...}}` call refers to.

use regex::Regex;
use std::sync::OnceLock;

use wikiweave_syntax::{TagName, Token, tokens_to_string};

use crate::context::ParseContext;
use crate::settings::TEMPLATE_NAMESPACE;
use crate::title::Title;

use super::functions;

fn subst_regex() -> &'static Regex {
    static SUBST_REGEX: OnceLock<Regex> = OnceLock::new();
    SUBST_REGEX.get_or_init(|| Regex::new(r"^(safe)?subst:").expect("Invalid subst regex"))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// A parser function, by canonical name, with the text after the colon.
    Function { name: String, arg: String },
    Template(Title),
    /// Not a valid call; rendered back as literal wikitext.
    Unresolvable,
}

/// Text of a template target, or `None` when it contains markup that
/// cannot be part of a title. Quotes contribute their apostrophes; comments
/// and nested calls are ignored.
fn resolvable_text(tokens: &[Token]) -> Option<String> {
    let mut text = String::new();
    for token in tokens {
        match token {
            Token::Text(t) => text.push_str(&t.value),
            Token::Newline(_) => text.push('\n'),
            Token::Comment(_) | Token::EndOfInput(_) => {}
            Token::SelfClose(tag) => match &tag.name {
                TagName::Quote => text.push_str(tag.data.src.as_deref().unwrap_or_default()),
                TagName::Template | TagName::TemplateArg => {}
                _ => return None,
            },
            Token::TagOpen(_) | Token::TagClose(_) => return None,
        }
    }
    Some(text)
}

/// Resolve an (already expanded) call target.
pub fn resolve(cx: &ParseContext, target: &[Token]) -> Target {
    let flat = tokens_to_string(target);
    let target_text = subst_regex().replace(flat.trim(), "").into_owned();

    let (prefix, rest) = match target_text.split_once(':') {
        Some((prefix, rest)) => (prefix.trim(), Some(rest)),
        None => (target_text.trim(), None),
    };
    let alias = cx.site.magic_word(prefix);
    let translated = alias.map_or_else(|| prefix.to_lowercase(), str::to_string);

    let is_function = match (alias, rest) {
        (Some(alias), Some(_)) => functions::is_native(alias),
        (Some(alias), None) => functions::is_variable(alias),
        (None, _) => false,
    } || (rest.is_some()
        && (translated.starts_with('#') || cx.site.is_function_hook(&translated)));
    if is_function {
        return Target::Function {
            name: translated,
            arg: rest.unwrap_or_default().to_string(),
        };
    }

    let Some(text) = resolvable_text(target) else {
        return Target::Unresolvable;
    };
    let text = subst_regex().replace(text.trim(), "").into_owned();
    let name = if !text.contains(':') && !text.starts_with(['#', '/', '.']) {
        let namespace = cx
            .site
            .namespace_name(TEMPLATE_NAMESPACE)
            .unwrap_or("Template");
        format!("{namespace}:{text}")
    } else {
        text
    };

    match cx.titles().resolve(&name, 0) {
        Ok(title) => Target::Template(title),
        Err(err) => {
            log::debug!("unresolvable template target {name:?}: {err}");
            Target::Unresolvable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::parse_context;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use wikiweave_syntax::Tag;

    fn text(s: &str) -> Vec<Token> {
        vec![Token::text(s, None)]
    }

    fn function(name: &str, arg: &str) -> Target {
        Target::Function {
            name: name.to_string(),
            arg: arg.to_string(),
        }
    }

    #[rstest]
    #[case("lc:ABC", function("lc", "ABC"))]
    #[case("#if: x ", function("if", " x"))]
    #[case("#invoke:Mod|f", function("invoke", "Mod|f"))]
    #[case("PAGENAME", function("pagename", ""))]
    #[case("#unknown:x", function("#unknown", "x"))]
    fn functions_by_alias_or_hook(#[case] target: &str, #[case] expected: Target) {
        let cx = parse_context();
        assert_eq!(resolve(&cx, &text(target)), expected);
    }

    #[rstest]
    #[case("foo bar", "Template:Foo_bar")]
    #[case("lc", "Template:Lc")]
    #[case("subst:echo", "Template:Echo")]
    #[case("User:Me/sig", "User:Me/sig")]
    #[case(":Main", "Main")]
    fn templates_get_the_template_namespace(#[case] target: &str, #[case] expected: &str) {
        let cx = parse_context();
        match resolve(&cx, &text(target)) {
            Target::Template(title) => assert_eq!(title.prefixed, expected),
            other => panic!("expected a template, got {other:?}"),
        }
    }

    #[test]
    fn markup_in_target_is_unresolvable() {
        let cx = parse_context();
        let target = vec![
            Token::text("a", None),
            Token::TagOpen(Tag::element("b")),
            Token::text("c", None),
        ];
        assert_eq!(resolve(&cx, &target), Target::Unresolvable);
        assert_eq!(resolve(&cx, &text("a{b")), Target::Unresolvable);
    }

    #[test]
    fn quotes_and_comments_are_allowed() {
        let cx = parse_context();
        let mut quote = Tag::new(TagName::Quote);
        quote.data.src = Some("''".to_string());
        let target = vec![
            Token::text("x", None),
            Token::SelfClose(quote),
            Token::comment("note", None),
        ];
        match resolve(&cx, &target) {
            Target::Template(title) => assert_eq!(title.prefixed, "Template:X''"),
            other => panic!("expected a template, got {other:?}"),
        }
    }
}
