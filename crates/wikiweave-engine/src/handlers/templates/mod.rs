//! # Template expansion
//!
//! `{{...}}` calls and `{{{...}}}` arguments, handled in stage 2.
//!
//! A call is first checked against the handful of magic words that are
//! answered on the spot (`{{!}}`, `DEFAULTSORT`, `DISPLAYTITLE`). Everything
//! else becomes an [`Expansion`], a small state machine run as a deferred
//! transformation:
//!
//! ```text
//! ResolvingTarget ─┬─ parser function ─→ FunctionCall ─────────────────┐
//!                  ├─ template ─→ CheckingLimits ─→ FetchingSource      │
//!                  │                    │                 │             │
//!                  │                    │ loop/depth      └→ Expanding ─┤
//!                  │                    └──────────────────────────────→ Encapsulating ─→ Done
//!                  └─ unresolvable ─→ Done (literal wikitext)
//! ```
//!
//! At the top level (`wrap_templates`) each expansion is bracketed with
//! `mw:Transclusion` start and end metas sharing an `about` id; the start
//! meta carries the call's source range, its source text and its argument
//! dictionary.

mod arg_info;
mod argument;
mod expansion;
mod functions;
mod magic;
mod target;

pub use arg_info::{ArgInfo, KeyInfo, ParamInfo, ParamMap, TargetInfo};
pub use expansion::Expansion;
pub use target::{Target, resolve as resolve_target};

use wikiweave_syntax::{Rank, Tag, TagName, Token};

use crate::error::TransformError;
use crate::pipeline::{
    Deferred, PipelineOptions, Registration, StageContext, TokenFilter, TransformOutcome,
    Transformer,
};
use crate::tokens::meta;

pub const TEMPLATE_RANK: Rank = Rank::from_millis(1100);

pub(crate) const NAME: &str = "TemplateHandler";

/// Options for expanding arguments and other caller-side content: in the
/// caller's frame and include mode, without wrappers.
fn argument_options(cx: &StageContext) -> PipelineOptions {
    PipelineOptions {
        is_include: cx.options.is_include,
        in_template: true,
        ..PipelineOptions::default()
    }
}

/// Bracket `content` with a start and an end marker of `type_of`. The start
/// marker takes the source range and text of `origin`.
pub(crate) fn encapsulate(
    about: String,
    origin: &Tag,
    type_of: &str,
    arg_info: Option<String>,
    content: Vec<Token>,
) -> Vec<Token> {
    let mut start = meta(type_of).with_attr("about", about.clone());
    start.data.tsr = origin.data.tsr;
    start.data.src = origin.data.src.clone();
    start.data.tmp.tpl_arg_info = arg_info;
    let end = meta(&format!("{type_of}/End")).with_attr("about", about);

    let mut out = Vec::with_capacity(content.len() + 2);
    out.push(Token::SelfClose(start));
    out.extend(content);
    out.push(Token::SelfClose(end));
    out
}

/// Expands `{{...}}` and `{{{...}}}`.
#[derive(Debug)]
pub struct TemplateHandler;

impl Transformer for TemplateHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn registrations(&self) -> Vec<Registration> {
        vec![
            Registration::new(TEMPLATE_RANK, TokenFilter::Tag(TagName::Template)),
            Registration::new(TEMPLATE_RANK, TokenFilter::Tag(TagName::TemplateArg)),
        ]
    }

    fn apply(
        &mut self,
        token: Token,
        rank: Rank,
        cx: &StageContext,
    ) -> Result<TransformOutcome, TransformError> {
        match token.tag_name() {
            Some(TagName::Template) => {
                if let Some(tag) = token.tag()
                    && let Some(out) = magic::magic_word(tag, cx)
                {
                    return Ok(TransformOutcome::Emit(out));
                }
                let expansion = Expansion::new(cx.clone(), token);
                Ok(TransformOutcome::Defer(Deferred {
                    rank,
                    future: Box::pin(expansion.run()),
                }))
            }
            Some(TagName::TemplateArg) => argument::apply(token, rank, cx),
            _ => Ok(TransformOutcome::Pass(token)),
        }
    }
}
