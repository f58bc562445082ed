//! Magic words answered without expanding anything.

use wikiweave_syntax::{AttrValue, Tag, Token, tokens_to_string};

use crate::pipeline::StageContext;
use crate::settings::TEMPLATE_NAMESPACE;
use crate::tokens::contains_calls;

use super::{arg_info, encapsulate};

/// Split `NAME:rest` after the first colon, keeping the colon on the name.
fn split_property(s: &str) -> (String, String) {
    match s.find(':') {
        Some(i) => (s[..=i].to_string(), s[i + 1..].to_string()),
        None => (s.to_string(), String::new()),
    }
}

/// Output for a call that is one of the magic words handled in place, or
/// `None` to expand it normally.
pub fn magic_word(tag: &Tag, cx: &StageContext) -> Option<Vec<Token>> {
    let target = tag.attribs.first()?;
    let (property, key) = match &target.key {
        AttrValue::Str(s) => {
            let (property, rest) = split_property(s);
            (property, vec![Token::text(rest, None)])
        }
        AttrValue::Tokens(tokens) => {
            let (Token::Text(first), rest) = tokens.split_first()? else {
                return None;
            };
            let (property, head) = split_property(&first.value);
            let mut key = vec![Token::text(head, None)];
            key.extend(rest.iter().cloned());
            (property, key)
        }
    };

    let site = &cx.parse.site;
    let property = property.trim();
    let name = site
        .magic_word(property)
        .or_else(|| site.magic_word(property.strip_suffix(':')?))?;

    match name {
        "!" => Some(pipe(tag, cx)),
        "defaultsort" | "displaytitle" => {
            let prop = match name {
                "defaultsort" => "mw:PageProp/categorydefaultsort",
                _ => "mw:PageProp/displaytitle",
            };
            // Templated keys are left for the attribute expander.
            let content = if contains_calls(&key) {
                AttrValue::Tokens(key)
            } else {
                AttrValue::Str(tokens_to_string(&key).trim().to_string())
            };
            let mut meta = Tag::element("meta")
                .with_attr("property", prop)
                .with_attr("content", content);
            meta.data = tag.data.clone();
            Some(vec![Token::SelfClose(meta)])
        }
        _ => None,
    }
}

/// `{{!}}`: a literal pipe on the page, a table cell separator inside a
/// template.
fn pipe(tag: &Tag, cx: &StageContext) -> Vec<Token> {
    if cx.options.in_template {
        return vec![Token::TagOpen(Tag::element("td"))];
    }
    let bar = vec![Token::text("|", None)];
    if !cx.options.wrap_templates {
        return bar;
    }
    let namespace = cx
        .parse
        .site
        .namespace_name(TEMPLATE_NAMESPACE)
        .unwrap_or("Template");
    let info = arg_info::describe(&cx.parse, tag, None, Some(format!("./{namespace}:!")));
    let info = serde_json::to_string(&info).ok();
    encapsulate(cx.parse.new_about_id(), tag, "mw:Transclusion", info, bar)
}
