//! # Pipelines
//!
//! A pipeline is a tokenizer plus up to three transform stages, optionally
//! followed by tree building and DOM post-processing:
//!
//! ```text
//! source → Tokenizer → Stage 1 (sync, [0,1)) → Stage 2 (async, [1,2))
//!        → Stage 3 (sync, [2,3)) → TreeBuilder → post-processing
//! ```
//!
//! Which parts run is decided by the [`PipelineKind`]. Nested content
//! (template bodies, arguments, attribute values) runs through the same
//! machinery: transformers ask the [`ParseContext`] for a pipeline of the
//! kind they need, run it and hand it back to the pool.
//!
//! Stage 2 is the only asynchronous stage. Its output is delivered over an
//! unbounded channel as [`StageEvent`]s; deferred work is stitched back into
//! order by [`TokenAccumulator`]s, so the consumer sees tokens in input
//! order no matter when fetches complete.

pub mod accumulator;
pub mod stage;
pub mod transformer;

pub use accumulator::{Downstream, StageEvent, TokenAccumulator};
pub use stage::{Stage, StageRun};
pub use transformer::{
    Deferred, Registration, StageContext, TokenFilter, TransformOutcome, Transformer,
};

use std::rc::Rc;

use tokio::sync::mpsc::unbounded_channel;
use wikiweave_syntax::{Rank, Token, Tokenizer, strip_end_of_input};

use crate::context::ParseContext;
use crate::dom::{Document, TreeBuilder};
use crate::error::ParseError;
use crate::frame::Frame;
use crate::handlers::{
    AttributeExpander, BehaviorSwitchHandler, IncludeDirectiveHandler, LinkHandler,
    ListHandler, OnlyIncludeHandler, ParagraphWrapper, QuoteTransformer, Sanitizer,
    TemplateHandler,
};
use crate::postprocess;
use crate::settings::ParserSettings;

pub const STAGE1_END: Rank = Rank::from_millis(1000);
pub const STAGE2_END: Rank = Rank::from_millis(2000);
pub const STAGE3_END: Rank = Rank::from_millis(3000);

/// What a pipeline consumes and produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// Wikitext to a post-processed document: the top-level parse.
    WikitextToDocument,
    /// Wikitext to fully expanded tokens: template bodies.
    WikitextToTokens,
    /// Tokens to expanded tokens: arguments and attribute values.
    TokensToTokens,
}

impl PipelineKind {
    pub fn key(self) -> &'static str {
        match self {
            PipelineKind::WikitextToDocument => "text/x-mediawiki/full",
            PipelineKind::WikitextToTokens => "text/x-mediawiki",
            PipelineKind::TokensToTokens => "tokens/x-mediawiki",
        }
    }

    fn reads_wikitext(self) -> bool {
        matches!(
            self,
            PipelineKind::WikitextToDocument | PipelineKind::WikitextToTokens
        )
    }

    fn builds_document(self) -> bool {
        matches!(self, PipelineKind::WikitextToDocument)
    }
}

/// Per-pipeline switches. Together with the kind they form the pool key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PipelineOptions {
    /// Content is being transcluded: `<noinclude>` hides, `<includeonly>`
    /// shows.
    pub is_include: bool,
    /// Bracket expansions with encapsulation markers.
    pub wrap_templates: bool,
    pub in_template: bool,
    /// Expanding the value of an attribute.
    pub attr_expansion: bool,
}

impl PipelineOptions {
    /// Options of the top-level parse.
    pub fn top_level(settings: &ParserSettings) -> Self {
        Self {
            wrap_templates: settings.wrap_templates,
            ..Self::default()
        }
    }

    /// Pool key for a pipeline of `kind` with these options.
    pub fn cache_key(&self, kind: PipelineKind) -> String {
        let mut key = kind.key().to_string();
        if !self.is_include {
            key.push_str("::noInclude");
        }
        if !self.wrap_templates {
            key.push_str("::noWrap");
        }
        if self.in_template {
            key.push_str("::inTemplate");
        }
        if self.attr_expansion {
            key.push_str("::attrExpansion");
        }
        key
    }
}

pub enum PipelineInput {
    /// Wikitext whose source ranges start at `offset`.
    Wikitext { source: Rc<str>, offset: usize },
    Tokens(Vec<Token>),
}

#[derive(Debug)]
pub enum PipelineOutput {
    Tokens(Vec<Token>),
    Document(Document),
}

impl PipelineOutput {
    pub fn into_tokens(self) -> Result<Vec<Token>, ParseError> {
        match self {
            PipelineOutput::Tokens(tokens) => Ok(tokens),
            PipelineOutput::Document(_) => Err(ParseError::Runtime(
                "expected tokens, pipeline produced a document".to_string(),
            )),
        }
    }

    pub fn into_document(self) -> Result<Document, ParseError> {
        match self {
            PipelineOutput::Document(document) => Ok(document),
            PipelineOutput::Tokens(_) => Err(ParseError::Runtime(
                "expected a document, pipeline produced tokens".to_string(),
            )),
        }
    }
}

pub struct Pipeline {
    kind: PipelineKind,
    options: PipelineOptions,
    key: String,
    tokenizer: Tokenizer,
    sync: Rc<Stage>,
    asynchronous: Rc<Stage>,
    /// Stage 3.
    document: Option<Rc<Stage>>,
}

impl Pipeline {
    pub fn new(kind: PipelineKind, options: PipelineOptions, settings: &ParserSettings) -> Self {
        let sync = Stage::new(
            "stage1",
            false,
            STAGE1_END,
            vec![
                Box::new(OnlyIncludeHandler::default()),
                Box::new(IncludeDirectiveHandler::default()),
                Box::new(BehaviorSwitchHandler),
            ],
        );
        let asynchronous = Stage::new(
            "stage2",
            true,
            STAGE2_END,
            vec![
                Box::new(TemplateHandler),
                Box::new(AttributeExpander),
                Box::new(LinkHandler),
            ],
        );
        let document = kind.builds_document().then(|| {
            Rc::new(Stage::new(
                "stage3",
                false,
                STAGE3_END,
                vec![
                    Box::new(QuoteTransformer::default()),
                    Box::new(ListHandler::default()),
                    Box::new(Sanitizer),
                    Box::new(ParagraphWrapper::default()),
                ],
            ))
        });

        Self {
            kind,
            options,
            key: options.cache_key(kind),
            tokenizer: Tokenizer::new(settings.memo),
            sync: Rc::new(sync),
            asynchronous: Rc::new(asynchronous),
            document,
        }
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    pub fn cache_key(&self) -> &str {
        &self.key
    }

    fn stages(&self) -> impl Iterator<Item = &Rc<Stage>> {
        [&self.sync, &self.asynchronous]
            .into_iter()
            .chain(self.document.iter())
    }

    /// Run the pipeline once in `frame`. After a successful run the
    /// pipeline is reset and can be reused. A failed run can leave stage 2
    /// tasks holding its stages, so the pipeline must be dropped.
    pub async fn run(
        &mut self,
        parse: &Rc<ParseContext>,
        frame: Rc<Frame>,
        input: PipelineInput,
    ) -> Result<PipelineOutput, ParseError> {
        log::debug!("running pipeline {} for {}", self.key, frame.title);
        let cx = StageContext {
            parse: parse.clone(),
            frame,
            options: self.options,
        };
        for stage in self.stages() {
            stage.init(&cx);
        }
        let result = self.run_stages(&cx, input).await;
        if result.is_ok() {
            self.reset();
        }
        result
    }

    async fn run_stages(
        &mut self,
        cx: &StageContext,
        input: PipelineInput,
    ) -> Result<PipelineOutput, ParseError> {
        if matches!(input, PipelineInput::Wikitext { .. }) != self.kind.reads_wikitext() {
            return Err(ParseError::Runtime(format!(
                "pipeline {} given the wrong kind of input",
                self.key
            )));
        }

        let mut sink = Sink::new(self.kind.builds_document());
        let sync = &self.sync;
        let (tx, mut rx) = unbounded_channel();
        let run = StageRun::new(self.asynchronous.clone(), cx.clone(), tx.clone());
        let mut head = Downstream::Channel(tx);
        match input {
            PipelineInput::Wikitext { source, offset } => {
                for chunk in self.tokenizer.chunks(&source, offset) {
                    let tokens = sync.process(chunk?, cx)?;
                    head = run.feed(tokens, head)?;
                    tokio::task::yield_now().await;
                }
            }
            PipelineInput::Tokens(tokens) => {
                let tokens = sync.process(prepare(tokens), cx)?;
                head = run.feed(tokens, head)?;
            }
        }
        head.close();
        drop(run);

        loop {
            match rx.recv().await {
                Some(StageEvent::Chunk(tokens)) => {
                    sink.push(self.document.as_deref(), tokens, cx)?;
                }
                Some(StageEvent::End) => break,
                Some(StageEvent::Failed(err)) => return Err(err.into()),
                None => {
                    return Err(ParseError::Runtime(format!(
                        "pipeline {} lost its output channel",
                        self.key
                    )));
                }
            }
        }
        sink.finish(cx)
    }

    /// Drop per-run transformer state before the pipeline is reused.
    pub fn reset(&mut self) {
        for stage in self.stages() {
            stage.reset();
        }
    }
}

/// Token input starts unranked and ends with an end-of-input marker.
fn prepare(mut tokens: Vec<Token>) -> Vec<Token> {
    for token in &mut tokens {
        token.data_mut().rank = None;
    }
    if !matches!(tokens.last(), Some(Token::EndOfInput(_))) {
        tokens.push(Token::end_of_input(None));
    }
    tokens
}

/// Where finished tokens go: collected, or built into a tree.
enum Sink {
    Tokens(Vec<Token>),
    Tree(TreeBuilder),
}

impl Sink {
    fn new(document: bool) -> Self {
        if document {
            Sink::Tree(TreeBuilder::new())
        } else {
            Sink::Tokens(Vec::new())
        }
    }

    fn push(
        &mut self,
        stage: Option<&Stage>,
        tokens: Vec<Token>,
        cx: &StageContext,
    ) -> Result<(), ParseError> {
        let tokens = match stage {
            Some(stage) => stage.process(tokens, cx)?,
            None => tokens,
        };
        match self {
            Sink::Tokens(out) => out.extend(tokens),
            Sink::Tree(builder) => builder.process(tokens),
        }
        Ok(())
    }

    fn finish(self, cx: &StageContext) -> Result<PipelineOutput, ParseError> {
        Ok(match self {
            Sink::Tokens(tokens) => PipelineOutput::Tokens(strip_end_of_input(tokens)),
            Sink::Tree(builder) => {
                let mut document = builder.finish();
                postprocess::run(&mut document, &cx.parse);
                PipelineOutput::Document(document)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(PipelineKind::WikitextToDocument, PipelineOptions::default(), "text/x-mediawiki/full::noInclude::noWrap")]
    #[case(
        PipelineKind::WikitextToTokens,
        PipelineOptions { is_include: true, in_template: true, ..Default::default() },
        "text/x-mediawiki::noWrap::inTemplate"
    )]
    #[case(
        PipelineKind::TokensToTokens,
        PipelineOptions { wrap_templates: true, attr_expansion: true, ..Default::default() },
        "tokens/x-mediawiki::noInclude::attrExpansion"
    )]
    fn cache_keys(
        #[case] kind: PipelineKind,
        #[case] options: PipelineOptions,
        #[case] expected: &str,
    ) {
        assert_eq!(options.cache_key(kind), expected);
    }

    #[test]
    fn top_level_options_follow_settings() {
        let settings = ParserSettings {
            wrap_templates: false,
            ..ParserSettings::default()
        };
        let options = PipelineOptions::top_level(&settings);
        assert!(!options.wrap_templates);
        assert!(!options.is_include);
    }

    #[test]
    fn prepare_clears_ranks_and_appends_end_of_input() {
        let tokens = prepare(vec![Token::text("a", None).with_rank(STAGE2_END)]);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].rank(), None);
        assert!(matches!(tokens[1], Token::EndOfInput(_)));
    }
}
