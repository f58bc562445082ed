//! Transform stages: an ordered list of registrations and the walk that
//! moves each token up through them.

use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::mpsc::UnboundedSender;
use wikiweave_syntax::{Rank, Token};

use super::accumulator::{Downstream, StageEvent, TokenAccumulator};
use super::transformer::{Deferred, StageContext, TokenFilter, TransformOutcome, Transformer};
use crate::error::TransformError;

struct Entry {
    rank: Rank,
    filter: TokenFilter,
    slot: usize,
}

/// Outcome of offering one token to the next registration above its rank.
enum Step {
    /// No registration left: the token leaves the stage.
    Done(Token),
    /// Tokens to walk next, in order.
    Replace(Vec<Token>),
    Defer(Deferred),
}

pub struct Stage {
    name: &'static str,
    asynchronous: bool,
    transformers: Vec<RefCell<Box<dyn Transformer>>>,
    entries: Vec<Entry>,
    end_rank: Rank,
}

impl Stage {
    pub fn new(
        name: &'static str,
        asynchronous: bool,
        end_rank: Rank,
        transformers: Vec<Box<dyn Transformer>>,
    ) -> Self {
        let mut entries: Vec<Entry> = transformers
            .iter()
            .enumerate()
            .flat_map(|(slot, t)| {
                t.registrations().into_iter().map(move |r| Entry {
                    rank: r.rank,
                    filter: r.filter,
                    slot,
                })
            })
            .collect();
        entries.sort_by_key(|e| e.rank);
        debug_assert!(entries.iter().all(|e| e.rank < end_rank));

        Self {
            name,
            asynchronous,
            transformers: transformers.into_iter().map(RefCell::new).collect(),
            entries,
            end_rank,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn end_rank(&self) -> Rank {
        self.end_rank
    }

    pub fn init(&self, cx: &StageContext) {
        for transformer in &self.transformers {
            transformer.borrow_mut().init(cx);
        }
    }

    pub fn reset(&self) {
        for transformer in &self.transformers {
            transformer.borrow_mut().reset();
        }
    }

    fn step(&self, token: Token, cx: &StageContext) -> Result<Step, TransformError> {
        let current = token.rank().unwrap_or(Rank::ZERO);
        let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.rank > current && e.filter.matches(&token))
        else {
            return Ok(Step::Done(token.with_rank(self.end_rank)));
        };

        let mut transformer = self.transformers[entry.slot].borrow_mut();
        let name = transformer.name();
        let kind = token.kind();
        let outcome = transformer.apply(token, entry.rank, cx).inspect_err(|err| {
            log::error!("{} stage: {err}", self.name);
        })?;

        Ok(match outcome {
            TransformOutcome::Pass(token) => Step::Replace(vec![token.with_rank(entry.rank)]),
            TransformOutcome::Emit(tokens) => Step::Replace(stamp(tokens, entry.rank)),
            TransformOutcome::EmitAt(rank, tokens) => Step::Replace(stamp(tokens, rank)),
            TransformOutcome::Defer(deferred) if self.asynchronous => Step::Defer(deferred),
            TransformOutcome::Defer(_) => {
                let err = TransformError {
                    transformer: name,
                    token: format!("{kind:?}"),
                    message: format!("deferred a token in synchronous stage {}", self.name),
                };
                log::error!("{} stage: {err}", self.name);
                return Err(err);
            }
        })
    }

    /// Run tokens through the stage. Replacements are walked depth-first so
    /// output order follows input order.
    pub fn process(
        &self,
        tokens: Vec<Token>,
        cx: &StageContext,
    ) -> Result<Vec<Token>, TransformError> {
        let mut work: Vec<Token> = tokens.into_iter().rev().collect();
        let mut out = Vec::with_capacity(work.len());
        while let Some(token) = work.pop() {
            match self.step(token, cx)? {
                Step::Done(token) => out.push(token),
                Step::Replace(tokens) => work.extend(tokens.into_iter().rev()),
                Step::Defer(deferred) => {
                    return Err(TransformError {
                        transformer: self.name,
                        token: format!("deferred at rank {}", deferred.rank),
                        message: "asynchronous result outside an asynchronous run".to_string(),
                    });
                }
            }
        }
        Ok(out)
    }
}

pub(crate) fn stamp(tokens: Vec<Token>, rank: Rank) -> Vec<Token> {
    tokens.into_iter().map(|t| t.with_rank(rank)).collect()
}

/// One run of an asynchronous stage: the stage, the run's context and the
/// channel failures are reported on.
#[derive(Clone)]
pub struct StageRun {
    stage: Rc<Stage>,
    cx: StageContext,
    events: UnboundedSender<StageEvent>,
}

impl StageRun {
    pub fn new(stage: Rc<Stage>, cx: StageContext, events: UnboundedSender<StageEvent>) -> Self {
        Self { stage, cx, events }
    }

    /// Walk `tokens` through the stage, writing finished tokens to `head`.
    ///
    /// Every deferred token splits the chain: an accumulator takes over
    /// `head`, the deferred work writes to its child side and the rest of
    /// the stream to its sibling side. Returns the new head, which the
    /// caller closes after the last chunk.
    pub fn feed(
        &self,
        tokens: Vec<Token>,
        mut head: Downstream,
    ) -> Result<Downstream, TransformError> {
        let mut work: Vec<Token> = tokens.into_iter().rev().collect();
        let mut ready = Vec::new();
        while let Some(token) = work.pop() {
            match self.stage.step(token, &self.cx)? {
                Step::Done(token) => ready.push(token),
                Step::Replace(tokens) => work.extend(tokens.into_iter().rev()),
                Step::Defer(deferred) => {
                    head.send(std::mem::take(&mut ready));
                    let acc = TokenAccumulator::shared(head);
                    self.spawn(deferred, Downstream::Child(acc.clone()));
                    head = Downstream::Sibling(acc);
                }
            }
        }
        head.send(ready);
        Ok(head)
    }

    fn spawn(&self, deferred: Deferred, child: Downstream) {
        let run = self.clone();
        tokio::task::spawn_local(async move {
            let result = deferred
                .future
                .await
                .and_then(|tokens| run.feed(stamp(tokens, deferred.rank), child));
            match result {
                Ok(head) => head.close(),
                Err(err) => run.fail(err),
            }
        });
    }

    fn fail(&self, err: TransformError) {
        log::error!("{} stage: {err}", self.stage.name);
        let _ = self.events.send(StageEvent::Failed(err));
    }
}
