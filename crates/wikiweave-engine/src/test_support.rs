//! Fixtures shared by unit tests.

use std::future::Future;
use std::rc::Rc;

use wikiweave_syntax::Token;

use crate::context::ParseContext;
use crate::fetch::MemoryFetcher;
use crate::frame::Frame;
use crate::pipeline::{PipelineOptions, StageContext};
use crate::settings::ParserSettings;

pub(crate) const PAGE_TITLE: &str = "Main_Page";

pub(crate) fn parse_context() -> Rc<ParseContext> {
    Rc::new(ParseContext::new(
        ParserSettings::default(),
        Rc::new(MemoryFetcher::new()),
    ))
}

pub(crate) fn stage_context() -> StageContext {
    stage_context_with("", |_| {})
}

pub(crate) fn stage_context_with(
    source: &str,
    configure: impl FnOnce(&mut PipelineOptions),
) -> StageContext {
    stage_context_for(source, MemoryFetcher::new(), ParserSettings::default(), configure)
}

/// A context for parsing `source` as the main page, fetching templates
/// from `fetcher`.
pub(crate) fn stage_context_for(
    source: &str,
    fetcher: MemoryFetcher,
    settings: ParserSettings,
    configure: impl FnOnce(&mut PipelineOptions),
) -> StageContext {
    let parse = Rc::new(ParseContext::new(settings, Rc::new(fetcher)));
    parse.prime_page(PAGE_TITLE, source);
    let mut options = PipelineOptions::default();
    configure(&mut options);
    StageContext {
        parse,
        frame: Frame::root(PAGE_TITLE),
        options,
    }
}

/// Text and newlines, everything else dropped.
pub(crate) fn text_of(tokens: &[Token]) -> String {
    tokens
        .iter()
        .filter_map(|t| match t {
            Token::Text(text) => Some(text.value.as_str()),
            Token::Newline(_) => Some("\n"),
            _ => None,
        })
        .collect()
}

/// `typeof` of every meta tag, in order.
pub(crate) fn type_ofs(tokens: &[Token]) -> Vec<String> {
    tokens
        .iter()
        .filter_map(Token::tag)
        .filter(|tag| tag.name.is_element("meta"))
        .filter_map(|tag| tag.attr_string("typeof"))
        .collect()
}

/// Drive a future on a current-thread runtime inside a `LocalSet`, the way
/// the engine runs.
pub(crate) fn run_local<F: Future>(future: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("test runtime");
    tokio::task::LocalSet::new().block_on(&runtime, future)
}
