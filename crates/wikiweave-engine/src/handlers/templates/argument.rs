//! `{{{name|default}}}`: substitution of the current frame's arguments.

use wikiweave_syntax::{Rank, Tag, Token};

use crate::error::{ParseError, TransformError};
use crate::pipeline::{Deferred, StageContext, TransformOutcome};
use crate::tokens::attr_contains_calls;

use super::{NAME, argument_options, encapsulate};

/// Value of the argument, falling back to the default and then to the call
/// itself as text.
fn value_or_default(
    cx: &StageContext,
    tag: &Tag,
    name: &str,
    default: Option<Vec<Token>>,
) -> Vec<Token> {
    if let Some(value) = cx.frame.args.named().get(name) {
        return value;
    }
    if let Some(default) = default {
        return default;
    }
    let literal = tag
        .data
        .src
        .clone()
        .unwrap_or_else(|| format!("{{{{{{{name}}}}}}}"));
    vec![Token::text(literal, None)]
}

fn wrap(cx: &StageContext, tag: &Tag, value: Vec<Token>) -> Vec<Token> {
    if !cx.options.wrap_templates {
        return value;
    }
    encapsulate(cx.parse.new_about_id(), tag, "mw:Param", None, value)
}

pub(super) fn apply(
    token: Token,
    rank: Rank,
    cx: &StageContext,
) -> Result<TransformOutcome, TransformError> {
    let Some(tag) = token.tag() else {
        return Ok(TransformOutcome::Pass(token));
    };
    if !tag.attribs.iter().any(attr_contains_calls) {
        let name = tag
            .attribs
            .first()
            .map(|a| a.key_string())
            .unwrap_or_default();
        let default = tag.attribs.get(1).map(|a| a.value.to_tokens());
        let value = value_or_default(cx, tag, name.trim(), default);
        return Ok(TransformOutcome::Emit(wrap(cx, tag, value)));
    }

    let about = cx.options.wrap_templates.then(|| cx.parse.new_about_id());
    Ok(TransformOutcome::Defer(Deferred {
        rank,
        future: Box::pin(expand(cx.clone(), token, about)),
    }))
}

/// Slow path: the name or the default contains calls of its own, which are
/// expanded in the current frame first. The default is only expanded when
/// it is used.
async fn expand(
    cx: StageContext,
    token: Token,
    about: Option<String>,
) -> Result<Vec<Token>, TransformError> {
    let Some(tag) = token.tag() else {
        return Ok(vec![token]);
    };
    let nested = |err: ParseError| TransformError::nested(NAME, &token, err);

    let name_tokens = tag
        .attribs
        .first()
        .map(|a| a.key.to_tokens())
        .unwrap_or_default();
    let name_tokens = cx
        .parse
        .expand_tokens(argument_options(&cx), cx.frame.clone(), name_tokens)
        .await
        .map_err(nested)?;
    let name = wikiweave_syntax::tokens_to_string(&name_tokens);
    let name = name.trim();

    let found = cx.frame.args.named().get(name);
    let value = match (found, tag.attribs.get(1)) {
        (Some(value), _) => value,
        (None, Some(default)) => cx
            .parse
            .expand_tokens(
                argument_options(&cx),
                cx.frame.clone(),
                default.value.to_tokens(),
            )
            .await
            .map_err(nested)?,
        (None, None) => value_or_default(&cx, tag, name, None),
    };

    Ok(match about {
        Some(about) => encapsulate(about, tag, "mw:Param", None, value),
        None => value,
    })
}
