use std::rc::Rc;

use wikiweave_syntax::{Rank, TagName, Token, TokenKind};

use crate::context::ParseContext;
use crate::error::TransformError;
use crate::fetch::LocalFuture;
use crate::frame::Frame;

use super::PipelineOptions;

/// Which tokens a registration wants to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenFilter {
    /// Every token.
    Any,
    /// Tokens of one variant.
    Kind(TokenKind),
    /// Open, close and self-closing tags with this name.
    Tag(TagName),
}

impl TokenFilter {
    pub fn matches(&self, token: &Token) -> bool {
        match self {
            TokenFilter::Any => true,
            TokenFilter::Kind(kind) => token.kind() == *kind,
            TokenFilter::Tag(name) => token.tag_name() == Some(name),
        }
    }
}

/// One slot a transformer occupies in its stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub rank: Rank,
    pub filter: TokenFilter,
}

impl Registration {
    pub fn new(rank: Rank, filter: TokenFilter) -> Self {
        Self { rank, filter }
    }
}

/// What a pipeline run knows about where it is.
///
/// Transformers receive it with every token and must not keep it: it holds
/// the parse context, and the pipeline outlives the run.
#[derive(Clone)]
pub struct StageContext {
    pub parse: Rc<ParseContext>,
    pub frame: Rc<Frame>,
    pub options: PipelineOptions,
}

/// Result of an asynchronous transformation. The tokens are stamped with
/// `rank` and continue through the registrations above it.
pub struct Deferred {
    pub rank: Rank,
    pub future: LocalFuture<'static, Result<Vec<Token>, TransformError>>,
}

pub enum TransformOutcome {
    /// Keep the token; it moves past this registration.
    Pass(Token),
    /// Replace the token. Replacements are stamped with the registration's
    /// rank and offered to the registrations above it.
    Emit(Vec<Token>),
    /// Replace the token, stamping replacements with an explicit rank.
    EmitAt(Rank, Vec<Token>),
    /// Produce the replacement later. Only allowed in asynchronous stages.
    Defer(Deferred),
}

pub trait Transformer {
    fn name(&self) -> &'static str;

    fn registrations(&self) -> Vec<Registration>;

    /// Called at the start of every pipeline run.
    fn init(&mut self, _cx: &StageContext) {}

    /// Handle a token that matched the registration at `rank`.
    fn apply(
        &mut self,
        token: Token,
        rank: Rank,
        cx: &StageContext,
    ) -> Result<TransformOutcome, TransformError>;

    /// Drop all per-run state before the pipeline is reused.
    fn reset(&mut self) {}
}
