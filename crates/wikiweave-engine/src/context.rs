//! Per-parse shared state.
//!
//! Everything that would otherwise be a global lives here: settings, the
//! site configuration, the fetcher, the per-name fetch cache, the pipeline
//! pool and the counter behind `about` ids. Transformers reach it through
//! [`crate::pipeline::StageContext::parse`].
//!
//! The context is single-threaded (`Rc`, `RefCell`, `Cell`). A long-lived
//! host can keep one context and call [`ParseContext::reset_for_new_document`]
//! between pages to keep the pool warm.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tokio::sync::OnceCell;
use uuid::Uuid;
use wikiweave_syntax::{SourceRange, Token};
use xi_rope::Rope;

use crate::error::ParseError;
use crate::fetch::{ContentFetcher, FetchError, RetryingFetcher};
use crate::frame::Frame;
use crate::pipeline::{Pipeline, PipelineInput, PipelineKind, PipelineOptions, PipelineOutput};
use crate::settings::{ParserSettings, SiteConfig};
use crate::title::{TitleResolver, WikiTitleResolver};

type SourceSlot = Rc<OnceCell<Result<Rc<str>, FetchError>>>;

/// The page being parsed.
#[derive(Debug, Default)]
pub struct PageInfo {
    pub title: String,
    pub source: Rope,
}

pub struct ParseContext {
    pub settings: ParserSettings,
    pub site: SiteConfig,
    titles: Box<dyn TitleResolver>,
    fetcher: Rc<dyn ContentFetcher>,
    page: RefCell<PageInfo>,
    request_id: Cell<Uuid>,
    next_about: Cell<u64>,
    pool: RefCell<HashMap<String, Vec<Pipeline>>>,
    sources: RefCell<HashMap<String, SourceSlot>>,
}

impl ParseContext {
    /// A context fetching through `fetcher`, which is wrapped in a
    /// [`RetryingFetcher`] configured from `settings`.
    pub fn new(settings: ParserSettings, fetcher: Rc<dyn ContentFetcher>) -> Self {
        let site = SiteConfig::default();
        let fetcher: Rc<dyn ContentFetcher> = Rc::new(RetryingFetcher::new(
            fetcher,
            settings.max_retries,
            settings.fetch_timeout,
            settings.backoff,
        ));
        Self {
            titles: Box::new(WikiTitleResolver::new(site.clone())),
            site,
            settings,
            fetcher,
            page: RefCell::new(PageInfo::default()),
            request_id: Cell::new(Uuid::new_v4()),
            next_about: Cell::new(0),
            pool: RefCell::new(HashMap::new()),
            sources: RefCell::new(HashMap::new()),
        }
    }

    /// Replace the site configuration. Also resets the title resolver to a
    /// [`WikiTitleResolver`] for the new site.
    #[must_use]
    pub fn with_site(mut self, site: SiteConfig) -> Self {
        self.titles = Box::new(WikiTitleResolver::new(site.clone()));
        self.site = site;
        self
    }

    #[must_use]
    pub fn with_title_resolver(mut self, titles: Box<dyn TitleResolver>) -> Self {
        self.titles = titles;
        self
    }

    pub fn titles(&self) -> &dyn TitleResolver {
        self.titles.as_ref()
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id.get()
    }

    /// Forget everything tied to the previous document. The pipeline pool
    /// survives.
    pub fn reset_for_new_document(&self) {
        self.request_id.set(Uuid::new_v4());
        self.next_about.set(0);
        self.sources.borrow_mut().clear();
        *self.page.borrow_mut() = PageInfo::default();
    }

    /// Record the page about to be parsed.
    pub fn prime_page(&self, title: impl Into<String>, source: &str) {
        let mut page = self.page.borrow_mut();
        page.title = title.into();
        page.source = Rope::from(source);
    }

    pub fn page_title(&self) -> String {
        self.page.borrow().title.clone()
    }

    /// Text of the page source in `range`, clamped to the source.
    pub fn page_slice(&self, range: SourceRange) -> String {
        let page = self.page.borrow();
        let len = page.source.len();
        let start = range.start.min(len);
        let end = range.end.min(len).max(start);
        match page.source.slice_to_cow(start..end) {
            Cow::Borrowed(s) => s.to_string(),
            Cow::Owned(s) => s,
        }
    }

    /// Fresh correlation id for an encapsulation wrapper.
    pub fn new_about_id(&self) -> String {
        let n = self.next_about.get();
        self.next_about.set(n + 1);
        format!("#mwt{n}")
    }

    /// Source of `name`, fetched at most once per document. Callers asking
    /// while a fetch is in flight wait for it instead of starting another.
    pub async fn fetch_source(&self, name: &str) -> Result<Rc<str>, FetchError> {
        let slot = self
            .sources
            .borrow_mut()
            .entry(name.to_string())
            .or_insert_with(|| Rc::new(OnceCell::new()))
            .clone();
        let fetcher = self.fetcher.clone();
        let name = name.to_string();
        slot.get_or_init(|| async move {
            log::debug!("fetching {name}");
            fetcher
                .fetch(&name, None)
                .await
                .map(|page| Rc::from(page.source))
        })
        .await
        .clone()
    }

    /// Outcome of an earlier fetch of `name`, if one completed.
    pub fn cached_source(&self, name: &str) -> Option<Result<Rc<str>, FetchError>> {
        self.sources.borrow().get(name)?.get().cloned()
    }

    /// Make `source` the cached source of `name`.
    pub fn seed_source(&self, name: &str, source: &str) {
        self.sources.borrow_mut().insert(
            name.to_string(),
            Rc::new(OnceCell::new_with(Some(Ok(Rc::from(source))))),
        );
    }

    /// A pipeline for `kind` and `options`: pooled if one is idle, new
    /// otherwise.
    pub fn take_pipeline(&self, kind: PipelineKind, options: PipelineOptions) -> Pipeline {
        let key = options.cache_key(kind);
        match self.pool.borrow_mut().get_mut(&key).and_then(Vec::pop) {
            Some(pipeline) => pipeline,
            None => {
                log::debug!("building pipeline {key}");
                Pipeline::new(kind, options, &self.settings)
            }
        }
    }

    /// Hand a pipeline back after its run has finished.
    pub fn return_pipeline(&self, pipeline: Pipeline) {
        let mut pool = self.pool.borrow_mut();
        let idle = pool.entry(pipeline.cache_key().to_string()).or_default();
        if idle.len() < self.settings.max_pooled_pipelines {
            idle.push(pipeline);
        }
    }

    /// Number of idle pipelines for a pool key.
    pub fn pooled(&self, key: &str) -> usize {
        self.pool.borrow().get(key).map_or(0, Vec::len)
    }

    /// Run a pooled pipeline once. Only a pipeline that finished cleanly
    /// goes back to the pool.
    pub async fn run_pipeline(
        self: &Rc<Self>,
        kind: PipelineKind,
        options: PipelineOptions,
        frame: Rc<Frame>,
        input: PipelineInput,
    ) -> Result<PipelineOutput, ParseError> {
        let mut pipeline = self.take_pipeline(kind, options);
        let result = pipeline.run(self, frame, input).await;
        match &result {
            Ok(_) => self.return_pipeline(pipeline),
            Err(err) => log::debug!("dropping pipeline {} after: {err}", pipeline.cache_key()),
        }
        result
    }

    /// Expand tokens in `frame` through a `TokensToTokens` pipeline.
    pub async fn expand_tokens(
        self: &Rc<Self>,
        options: PipelineOptions,
        frame: Rc<Frame>,
        tokens: Vec<Token>,
    ) -> Result<Vec<Token>, ParseError> {
        self.run_pipeline(
            PipelineKind::TokensToTokens,
            options,
            frame,
            PipelineInput::Tokens(tokens),
        )
        .await?
        .into_tokens()
    }
}
