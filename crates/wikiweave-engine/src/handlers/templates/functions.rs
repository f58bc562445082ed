//! Parser functions implemented natively.
//!
//! Functions receive the text after the colon (`arg`) and the call's
//! remaining parameters, all already expanded in the caller's frame.

use wikiweave_syntax::{Attribute, Token, tokens_to_string};

use crate::context::ParseContext;
use crate::tokens::trim_tokens;

const NATIVE: &[&str] = &[
    "lc",
    "uc",
    "lcfirst",
    "ucfirst",
    "if",
    "ifeq",
    "switch",
    "pagename",
    "fullpagename",
    "namespace",
];

/// Functions usable without a colon, like `{{PAGENAME}}`.
const VARIABLES: &[&str] = &["pagename", "fullpagename", "namespace"];

pub fn is_native(name: &str) -> bool {
    NATIVE.contains(&name)
}

pub fn is_variable(name: &str) -> bool {
    VARIABLES.contains(&name)
}

/// A parameter as the function sees it: `key=value` for named parameters.
fn param_tokens(param: &Attribute) -> Vec<Token> {
    let mut tokens = param.key.to_tokens();
    if !tokens.is_empty() {
        tokens.push(Token::text("=", None));
    }
    tokens.extend(param.value.to_tokens());
    tokens
}

fn nth(params: &[Attribute], n: usize) -> Vec<Token> {
    params
        .get(n)
        .map(|p| trim_tokens(param_tokens(p)))
        .unwrap_or_default()
}

fn text(value: String) -> Vec<Token> {
    if value.is_empty() {
        Vec::new()
    } else {
        vec![Token::text(value, None)]
    }
}

fn map_first(s: &str, f: impl Fn(char) -> String) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => f(first) + chars.as_str(),
        None => String::new(),
    }
}

/// Equality as `#ifeq` and `#switch` see it: numerically when both sides
/// are numbers.
fn loosely_equal(a: &str, b: &str) -> bool {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

fn switch(value: &str, params: &[Attribute]) -> Vec<Token> {
    let mut fall_through = false;
    let mut default = None;
    let last = params.len().saturating_sub(1);
    for (i, param) in params.iter().enumerate() {
        let key = param.key_string();
        if key.is_empty() {
            let case = tokens_to_string(&trim_tokens(param.value.to_tokens()));
            if i == last {
                // A trailing bare value is the default.
                return if fall_through || loosely_equal(&case, value) {
                    Vec::new()
                } else {
                    trim_tokens(param.value.to_tokens())
                };
            }
            if loosely_equal(&case, value) {
                fall_through = true;
            }
            continue;
        }
        let key = key.trim();
        if fall_through || loosely_equal(key, value) {
            return trim_tokens(param.value.to_tokens());
        }
        if key == "#default" {
            default = Some(param);
        }
    }
    default
        .map(|p| trim_tokens(p.value.to_tokens()))
        .unwrap_or_default()
}

/// Call a native function. `None` when `name` has no implementation.
pub fn call(
    name: &str,
    arg: &str,
    params: &[Attribute],
    cx: &ParseContext,
) -> Option<Vec<Token>> {
    let page = || cx.titles().resolve(&cx.page_title(), 0).ok();
    let out = match name {
        "lc" => text(arg.to_lowercase()),
        "uc" => text(arg.to_uppercase()),
        "lcfirst" => text(map_first(arg, |c| c.to_lowercase().collect())),
        "ucfirst" => text(map_first(arg, |c| c.to_uppercase().collect())),
        "if" => {
            if arg.trim().is_empty() {
                nth(params, 1)
            } else {
                nth(params, 0)
            }
        }
        "ifeq" => {
            let other = tokens_to_string(&nth(params, 0));
            if loosely_equal(arg.trim(), other.trim()) {
                nth(params, 1)
            } else {
                nth(params, 2)
            }
        }
        "switch" => switch(arg.trim(), params),
        "pagename" => text(page().map(|t| t.key_text()).unwrap_or_default()),
        "fullpagename" => text(page().map(|t| t.text()).unwrap_or_default()),
        "namespace" => text(
            page()
                .and_then(|t| cx.site.namespace_name(t.namespace).map(str::to_string))
                .unwrap_or_default(),
        ),
        _ => return None,
    };
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::parse_context;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn positional(values: &[&str]) -> Vec<Attribute> {
        values.iter().map(|v| Attribute::new("", *v)).collect()
    }

    fn run(name: &str, arg: &str, params: &[Attribute]) -> String {
        let cx = parse_context();
        cx.prime_page("Help:Getting started", "");
        tokens_to_string(&call(name, arg, params, &cx).unwrap())
    }

    #[rstest]
    #[case("lc", "AbC", "abc")]
    #[case("uc", "AbC", "ABC")]
    #[case("lcfirst", "ABC", "aBC")]
    #[case("ucfirst", "éa", "Éa")]
    #[case("pagename", "", "Getting started")]
    #[case("fullpagename", "", "Help:Getting started")]
    #[case("namespace", "", "Help")]
    fn string_functions(#[case] name: &str, #[case] arg: &str, #[case] expected: &str) {
        assert_eq!(run(name, arg, &[]), expected);
    }

    #[rstest]
    #[case(" x ", "yes")]
    #[case("   ", "no")]
    fn if_tests_for_non_blank(#[case] arg: &str, #[case] expected: &str) {
        assert_eq!(run("if", arg, &positional(&[" yes ", " no "])), expected);
    }

    #[test]
    fn if_keeps_equals_in_branches() {
        let params = vec![Attribute::new("a", "b")];
        assert_eq!(run("if", "x", &params), "a=b");
    }

    #[rstest]
    #[case("1", " 1.0 ", "same")]
    #[case("a", "b", "different")]
    fn ifeq_compares_numbers_numerically(
        #[case] arg: &str,
        #[case] other: &str,
        #[case] expected: &str,
    ) {
        let params = positional(&[other, "same", "different"]);
        assert_eq!(run("ifeq", arg, &params), expected);
    }

    #[rstest]
    #[case("b", "B")]
    #[case("c", "CD")]
    #[case("d", "CD")]
    #[case("z", "fallback")]
    fn switch_cases(#[case] arg: &str, #[case] expected: &str) {
        let params = vec![
            Attribute::new("a", "A"),
            Attribute::new("b", " B "),
            Attribute::new("", "c"),
            Attribute::new("d", "CD"),
            Attribute::new("#default", "fallback"),
        ];
        assert_eq!(run("switch", arg, &params), expected);
    }

    #[test]
    fn switch_trailing_bare_value_is_default() {
        let params = vec![Attribute::new("a", "A"), Attribute::new("", "other")];
        assert_eq!(run("switch", "q", &params), "other");
        assert_eq!(run("switch", "a", &params), "A");
    }

    #[test]
    fn unknown_functions_have_no_implementation() {
        let cx = parse_context();
        assert_eq!(call("invoke", "Mod", &[], &cx), None);
    }
}
