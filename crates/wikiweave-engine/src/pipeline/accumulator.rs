//! Order-restoring joins for asynchronous stages.
//!
//! When a transformer defers a token, the stage inserts a
//! [`TokenAccumulator`] into its output chain. The deferred work (the
//! *child*) writes into one side, the rest of the stream (the *sibling*)
//! into the other. Child tokens pass straight through; sibling tokens wait
//! until the child is done. Chains of accumulators therefore emit tokens in
//! input order no matter which deferred task finishes first.

use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::mpsc::UnboundedSender;
use wikiweave_syntax::Token;

use crate::error::TransformError;

/// What an asynchronous stage delivers to its consumer.
#[derive(Debug)]
pub enum StageEvent {
    Chunk(Vec<Token>),
    End,
    Failed(TransformError),
}

/// Where a producer writes its tokens.
#[derive(Clone)]
pub enum Downstream {
    /// The stage output.
    Channel(UnboundedSender<StageEvent>),
    /// The child side of an accumulator.
    Child(Rc<RefCell<TokenAccumulator>>),
    /// The sibling side of an accumulator.
    Sibling(Rc<RefCell<TokenAccumulator>>),
}

impl Downstream {
    pub fn send(&self, tokens: Vec<Token>) {
        if tokens.is_empty() {
            return;
        }
        match self {
            // A closed receiver means the consumer already gave up.
            Downstream::Channel(tx) => {
                let _ = tx.send(StageEvent::Chunk(tokens));
            }
            Downstream::Child(acc) => acc.borrow_mut().receive_from_child(tokens),
            Downstream::Sibling(acc) => acc.borrow_mut().receive_from_sibling(tokens),
        }
    }

    /// Signal that this producer is finished.
    pub fn close(self) {
        match self {
            Downstream::Channel(tx) => {
                let _ = tx.send(StageEvent::End);
            }
            Downstream::Child(acc) => acc.borrow_mut().child_done(),
            Downstream::Sibling(acc) => acc.borrow_mut().sibling_done(),
        }
    }
}

pub struct TokenAccumulator {
    downstream: Option<Downstream>,
    child_done: bool,
    sibling_done: bool,
    sibling_buffer: Vec<Token>,
}

impl TokenAccumulator {
    pub fn new(downstream: Downstream) -> Self {
        Self {
            downstream: Some(downstream),
            child_done: false,
            sibling_done: false,
            sibling_buffer: Vec::new(),
        }
    }

    pub fn shared(downstream: Downstream) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new(downstream)))
    }

    pub fn receive_from_child(&mut self, tokens: Vec<Token>) {
        if let Some(downstream) = &self.downstream {
            downstream.send(tokens);
        }
    }

    pub fn child_done(&mut self) {
        self.child_done = true;
        let buffered = std::mem::take(&mut self.sibling_buffer);
        if let Some(downstream) = &self.downstream {
            downstream.send(buffered);
        }
        if self.sibling_done {
            self.close_downstream();
        }
    }

    pub fn receive_from_sibling(&mut self, tokens: Vec<Token>) {
        if self.child_done {
            if let Some(downstream) = &self.downstream {
                downstream.send(tokens);
            }
        } else {
            self.sibling_buffer.extend(tokens);
        }
    }

    pub fn sibling_done(&mut self) {
        self.sibling_done = true;
        if self.child_done {
            self.close_downstream();
        }
    }

    fn close_downstream(&mut self) {
        if let Some(downstream) = self.downstream.take() {
            downstream.close();
        }
    }
}
