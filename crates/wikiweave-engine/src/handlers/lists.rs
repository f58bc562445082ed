//! `*`, `#`, `;` and `:` list lines to nested `ul`/`ol`/`dl` elements.
//!
//! The handler keeps the bullets of the current line. Each new list line
//! is compared with them: levels that no longer match are closed, the
//! shared prefix stays open, and the new levels are opened inside the
//! current item. A line that does not start with bullets closes every
//! open list, so newlines are held back until the next line shows whether
//! the list continues.

use wikiweave_syntax::{Rank, SourceRange, Tag, TagName, Token, TokenKind};

use crate::error::TransformError;
use crate::pipeline::{Registration, StageContext, TokenFilter, TransformOutcome, Transformer};

const RANK: Rank = Rank::from_millis(2490);

fn list_element(bullet: char) -> &'static str {
    match bullet {
        '*' => "ul",
        '#' => "ol",
        _ => "dl",
    }
}

fn item_element(bullet: char) -> &'static str {
    match bullet {
        '*' | '#' => "li",
        ';' => "dt",
        _ => "dd",
    }
}

#[derive(Debug, Default)]
pub struct ListHandler {
    /// Bullets of the innermost open item, outermost first.
    open: Vec<char>,
    /// Newlines (and anything else) seen since the last list line ended.
    held: Vec<Token>,
}

impl ListHandler {
    fn close_level(&mut self, out: &mut Vec<Token>) {
        if let Some(bullet) = self.open.pop() {
            out.push(Token::TagClose(Tag::element(item_element(bullet))));
            out.push(Token::TagClose(Tag::element(list_element(bullet))));
        }
    }

    fn close_all(&mut self, out: &mut Vec<Token>) {
        while !self.open.is_empty() {
            self.close_level(out);
        }
    }

    /// Tokens for a list line with `bullets` at `tsr`.
    fn list_line(&mut self, bullets: &str, tsr: Option<SourceRange>) -> Vec<Token> {
        let new: Vec<char> = bullets.chars().collect();
        let shared = self
            .open
            .iter()
            .zip(&new)
            .take_while(|(a, b)| list_element(**a) == list_element(**b))
            .count();

        let mut out = Vec::new();
        while self.open.len() > shared {
            self.close_level(&mut out);
        }
        // A sibling item at the deepest shared level.
        if shared == new.len()
            && let Some(bullet) = self.open.pop()
        {
            out.push(Token::TagClose(Tag::element(item_element(bullet))));
            self.open.push(new[shared - 1]);
        }
        out.append(&mut self.held);

        if shared == new.len() {
            let bullet = new[shared - 1];
            out.push(Token::TagOpen(Tag::element(item_element(bullet)).with_tsr(tsr)));
            return out;
        }
        for (i, &bullet) in new.iter().enumerate().skip(shared) {
            out.push(Token::TagOpen(Tag::element(list_element(bullet))));
            let item_tsr = (i + 1 == new.len()).then_some(tsr).flatten();
            out.push(Token::TagOpen(
                Tag::element(item_element(bullet)).with_tsr(item_tsr),
            ));
            self.open.push(bullet);
        }
        out
    }
}

impl Transformer for ListHandler {
    fn name(&self) -> &'static str {
        "ListHandler"
    }

    fn registrations(&self) -> Vec<Registration> {
        vec![
            Registration::new(RANK, TokenFilter::Tag(TagName::ListItem)),
            Registration::new(RANK, TokenFilter::Kind(TokenKind::Newline)),
            Registration::new(RANK, TokenFilter::Kind(TokenKind::EndOfInput)),
            Registration::new(RANK, TokenFilter::Any),
        ]
    }

    fn apply(
        &mut self,
        token: Token,
        _rank: Rank,
        _cx: &StageContext,
    ) -> Result<TransformOutcome, TransformError> {
        if let Some(tag) = token.tag()
            && tag.name == TagName::ListItem
        {
            let bullets = tag.attr_string("bullets").unwrap_or_default();
            if bullets.is_empty() {
                return Ok(TransformOutcome::Emit(Vec::new()));
            }
            return Ok(TransformOutcome::Emit(self.list_line(&bullets, token.tsr())));
        }
        if self.open.is_empty() {
            return Ok(TransformOutcome::Pass(token));
        }

        match token {
            Token::Newline(_) if self.held.is_empty() => {
                self.held.push(token);
                Ok(TransformOutcome::Emit(Vec::new()))
            }
            token if self.held.is_empty() && !matches!(token, Token::EndOfInput(_)) => {
                Ok(TransformOutcome::Pass(token))
            }
            // The line after a list line is not a list line.
            token => {
                let mut out = Vec::new();
                self.close_all(&mut out);
                out.append(&mut self.held);
                out.push(token);
                Ok(TransformOutcome::Emit(out))
            }
        }
    }

    fn reset(&mut self) {
        self.open.clear();
        self.held.clear();
    }
}
