//! # wikiweave-engine
//!
//! Turns wikitext into an annotated document tree and serializes it back.
//!
//! ## Architecture Overview
//!
//! ```text
//! source ─▶ Tokenizer ─▶ Stage 1 ─▶ Stage 2 ─▶ Stage 3 ─▶ TreeBuilder ─▶ post-processing
//!           (syntax)     (sync)     (async)    (sync)     (dom)          (postprocess)
//! ```
//!
//! - [`pipeline`]: stages, the [`Transformer`](pipeline::Transformer) trait,
//!   token accumulators and the pipeline kinds.
//! - [`handlers`]: the transformers. Template expansion lives in
//!   [`handlers::templates`].
//! - [`dom`]: the document arena and the tree builder.
//! - [`postprocess`]: fostered content, encapsulation of expansions, source
//!   ranges.
//! - [`serialize`]: HTML output and source reconstruction.
//! - [`fetch`]: where template sources come from.
//!
//! All per-parse state lives in a [`ParseContext`]. The engine is
//! single-threaded: [`parse_document`] must run inside a
//! [`tokio::task::LocalSet`] on a current-thread runtime, and
//! [`parse_blocking`] sets one up.
//!
//! ## Quick Start
//!
//! ```
//! use std::rc::Rc;
//! use wikiweave_engine::{MemoryFetcher, ParseContext, ParserSettings, body_html, parse_blocking};
//!
//! let fetcher = MemoryFetcher::new().with_page("Template:Echo", "{{{1}}}");
//! let cx = Rc::new(ParseContext::new(ParserSettings::default(), Rc::new(fetcher)));
//! let doc = parse_blocking(&cx, "Main Page", "''hi'' {{echo|there}}").unwrap();
//! assert!(body_html(&doc).contains("<i>hi</i>"));
//! ```

pub mod context;
pub mod dom;
pub mod error;
pub mod fetch;
pub mod frame;
pub mod handlers;
pub mod pipeline;
pub mod postprocess;
pub mod serialize;
pub mod settings;
pub mod title;
pub mod tokens;

#[cfg(test)]
pub(crate) mod test_support;

use std::rc::Rc;

pub use context::ParseContext;
pub use dom::{Document, Dsr, Element, NodeData, NodeId, NodeKind};
pub use error::{ParseError, TransformError};
pub use fetch::{
    ContentFetcher, DirectoryFetcher, FetchError, MemoryFetcher, PageSource, RetryingFetcher,
    decode_api_response,
};
pub use frame::Frame;
pub use pipeline::{PipelineInput, PipelineKind, PipelineOptions, PipelineOutput};
pub use serialize::{
    ReconstructError, SerializeOptions, Serialized, body_html, reconstruct_source, serialize,
};
pub use settings::{ParserSettings, SiteConfig};
pub use title::{Title, TitleResolver, WikiTitleResolver};

/// Parse one page into a post-processed document.
///
/// Per-document state in `cx` (fetch cache, `about` counter) is reset first,
/// so one context can parse many pages in turn.
pub async fn parse_document(
    cx: &Rc<ParseContext>,
    title: &str,
    source: &str,
) -> Result<Document, ParseError> {
    cx.reset_for_new_document();
    cx.prime_page(title, source);
    let request = cx.request_id();
    log::debug!("[{request}] parsing {title} ({} bytes)", source.len());
    cx.run_pipeline(
        PipelineKind::WikitextToDocument,
        PipelineOptions::top_level(&cx.settings),
        Frame::root(title),
        PipelineInput::Wikitext {
            source: Rc::from(source),
            offset: 0,
        },
    )
    .await
    .and_then(PipelineOutput::into_document)
    .inspect(|_| log::debug!("[{request}] parsed {title}"))
    .inspect_err(|err| log::error!("[{request}] parsing {title} failed: {err}"))
}

/// [`parse_document`] on a fresh current-thread runtime.
pub fn parse_blocking(
    cx: &Rc<ParseContext>,
    title: &str,
    source: &str,
) -> Result<Document, ParseError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, parse_document(cx, title, source))
}
