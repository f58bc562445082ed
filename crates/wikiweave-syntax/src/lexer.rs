//! # Lexer - Character Classes for the Grammar
//!
//! The grammar in [`crate::tokenizer`] works on byte positions, but most of
//! the source is plain prose that no rule cares about. This module uses
//! [Logos] to split the input into small "atoms": one token per character
//! that can start or end wikitext syntax, and runs of everything else.
//!
//! [Logos]: https://docs.rs/logos
//!
//! The grammar uses atoms two ways:
//!
//! - [`peek`] tells it which construct could start at a position, so rule
//!   dispatch is a `match` on [`Atom`] rather than a chain of `starts_with`.
//! - [`text_run_end`] skips over prose in one call, so a long paragraph is
//!   one text token instead of one per character.
//!
//! Every byte belongs to exactly one atom. Characters Logos does not
//! recognise (exotic whitespace, for instance) come back as errors and are
//! treated as [`Atom::Text`].

use logos::Logos;
use std::ops::Range;

/// Atom kinds produced by the Logos lexer.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"")]
pub enum Atom {
    /// Line ending (LF or CRLF)
    #[regex(r"\r?\n")]
    Newline,

    /// Horizontal whitespace (spaces, tabs)
    #[regex(r"[ \t]+")]
    Whitespace,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("|")]
    Pipe,

    #[token("!")]
    Bang,

    #[token("=")]
    Equals,

    #[token("'")]
    Apostrophe,

    #[token("<")]
    Lt,

    #[token(">")]
    Gt,

    #[token("-")]
    Dash,

    #[token("*")]
    Star,

    #[token("#")]
    Hash,

    #[token(":")]
    Colon,

    #[token(";")]
    Semicolon,

    #[token("_")]
    Underscore,

    /// Anything without syntactic meaning
    #[regex(r#"[^\s{}\[\]|!='<>*#:;_-]+"#)]
    Text,
}

impl Atom {
    /// Atoms that never start or end a construct on their own.
    pub fn is_prose(self) -> bool {
        matches!(self, Atom::Text | Atom::Whitespace)
    }
}

/// A lexed atom with its byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme<'a> {
    pub atom: Atom,
    pub text: &'a str,
    pub span: Range<usize>,
}

/// Lex the whole input.
///
/// Guarantees that all bytes from the input appear in the output.
pub fn lex(input: &str) -> Vec<Lexeme<'_>> {
    let mut lexer = Atom::lexer(input);
    let mut lexemes = Vec::new();

    while let Some(result) = lexer.next() {
        lexemes.push(Lexeme {
            atom: result.unwrap_or(Atom::Text),
            text: lexer.slice(),
            span: lexer.span(),
        });
    }

    lexemes
}

/// The atom starting at byte `pos`, with its absolute span.
pub fn peek(input: &str, pos: usize) -> Option<(Atom, Range<usize>)> {
    let rest = input.get(pos..)?;
    let mut lexer = Atom::lexer(rest);
    let result = lexer.next()?;
    let span = lexer.span();
    Some((result.unwrap_or(Atom::Text), pos + span.start..pos + span.end))
}

/// End of the run of prose atoms starting at `pos` (never past `limit`).
///
/// Returns `pos` when the first atom is not prose.
pub fn text_run_end(input: &str, pos: usize, limit: usize) -> usize {
    let Some(rest) = input.get(pos..limit) else {
        return pos;
    };
    let mut lexer = Atom::lexer(rest);
    let mut end = pos;

    while let Some(result) = lexer.next() {
        if !result.unwrap_or(Atom::Text).is_prose() {
            break;
        }
        end = pos + lexer.span().end;
    }

    end
}
