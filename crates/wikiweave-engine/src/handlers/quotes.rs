//! Bold and italic from apostrophe runs.
//!
//! Quote markers are collected per line and resolved when the line ends (a
//! newline, a table cell or the end of input), using the state machine of
//! the reference wiki parser. When a line has an odd number of both italic
//! and bold markers, one bold marker is first demoted to an apostrophe plus
//! an italic marker. The candidate is, in order of preference, the first
//! bold run after a single-letter word, after a longer word, after a space.

use wikiweave_syntax::{Rank, SourceRange, Tag, TagName, Token, TokenKind};

use crate::error::TransformError;
use crate::pipeline::{Registration, StageContext, TokenFilter, TransformOutcome, Transformer};

const QUOTE_RANK: Rank = Rank::from_millis(2100);
const ANY_RANK: Rank = Rank::from_millis(2101);

/// Open formatting while replaying a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Open {
    None,
    I,
    B,
    /// `<b>` then `<i>`.
    BI,
    /// `<i>` then `<b>`.
    IB,
    /// A five-run whose nesting order is still undecided.
    Both,
}

/// Position of a generated tag in `chunks`.
type Slot = (usize, usize);

#[derive(Debug, Default)]
pub struct QuoteTransformer {
    /// Alternating runs: other tokens at even indices, a single quote
    /// marker (later its tags) at odd indices.
    chunks: Vec<Vec<Token>>,
    current: Vec<Token>,
    /// Text just before the line's first marker.
    context: String,
    /// Text of the last token passed through while idle.
    previous: Option<String>,
    last_i: Option<Slot>,
    last_b: Option<Slot>,
    active: bool,
}

fn marker_len(token: &Token) -> usize {
    token
        .tag()
        .and_then(|t| t.data.src.as_deref())
        .map_or(0, str::len)
}

fn open(name: &str) -> Token {
    Token::TagOpen(Tag::element(name))
}

fn close(name: &str) -> Token {
    Token::TagClose(Tag::element(name))
}

impl QuoteTransformer {
    fn start_chunk(&mut self) {
        self.chunks.push(std::mem::take(&mut self.current));
    }

    /// Up to two characters of text before the marker in chunk `i`.
    fn preceding_text(&self, i: usize) -> String {
        let mut text = String::new();
        for token in self.chunks[i - 1].iter().rev() {
            if text.chars().count() >= 2 {
                break;
            }
            if let Token::Text(t) = token {
                text.insert_str(0, &t.value);
            }
        }
        if i == 1 && text.chars().count() < 2 {
            text.insert_str(0, &self.context);
        }
        text
    }

    /// Balance a line with odd counts of both italic and bold markers.
    fn balance(&mut self) {
        let mut italics = 0;
        let mut bolds = 0;
        for chunk in self.chunks.iter().skip(1).step_by(2) {
            match marker_len(&chunk[0]) {
                2 => italics += 1,
                3 => bolds += 1,
                5 => {
                    italics += 1;
                    bolds += 1;
                }
                _ => {}
            }
        }
        if italics % 2 == 0 || bolds % 2 == 0 {
            return;
        }

        let mut single_letter = None;
        let mut multi_letter = None;
        let mut space = None;
        for i in (1..self.chunks.len()).step_by(2) {
            if marker_len(&self.chunks[i][0]) != 3 {
                continue;
            }
            let text = self.preceding_text(i);
            let mut rev = text.chars().rev();
            let last = rev.next();
            let second_last = rev.next();
            if last == Some(' ') {
                space.get_or_insert(i);
            } else if second_last == Some(' ') {
                single_letter = Some(i);
                break;
            } else {
                multi_letter.get_or_insert(i);
            }
        }

        // A line whose only marker is a five-run has no candidate.
        if let Some(i) = single_letter.or(multi_letter).or(space) {
            self.demote_bold(i);
        }
    }

    /// Turn the bold marker in chunk `i` into an apostrophe and an italic
    /// marker.
    fn demote_bold(&mut self, i: usize) {
        let tsr = self.chunks[i][0].tsr();
        self.chunks[i - 1].push(Token::text(
            "'",
            tsr.map(|r| SourceRange::new(r.start, r.start + 1)),
        ));
        let mut italic =
            Tag::new(TagName::Quote).with_tsr(tsr.map(|r| SourceRange::new(r.start + 1, r.end)));
        italic.data.src = Some("''".to_string());
        self.chunks[i] = vec![Token::SelfClose(italic)];
    }

    fn last_mut(&mut self, name: &str) -> Option<&mut Tag> {
        let (chunk, index) = match name {
            "b" => self.last_b?,
            _ => self.last_i?,
        };
        match self.chunks.get_mut(chunk)?.get_mut(index)? {
            Token::TagOpen(tag) => Some(tag),
            _ => None,
        }
    }

    /// Replace the marker in chunk `chunk` by `tags`, giving each tag its
    /// share of the marker's range. In a "bogus two" replacement the first
    /// tag closes an element early and the third reopens it.
    fn quote_to_tags(&mut self, chunk: usize, tags: Vec<Token>, bogus_two: bool) {
        let tsr = self.chunks[chunk][0].tsr();
        let mut pos = tsr.map(|r| r.start);
        let mut result = Vec::with_capacity(tags.len());
        for (i, mut tag) in tags.into_iter().enumerate() {
            let name = tag.tag_name().map(|n| n.as_str().to_string()).unwrap_or_default();
            if bogus_two && i == 0 {
                if let Some(open) = self.last_mut(&name) {
                    open.data.auto_inserted_end = true;
                }
            } else if bogus_two && i == 2 {
                tag.data_mut().auto_inserted_start = true;
            } else if let Some(start) = pos {
                let width = if name == "b" { 3 } else { 2 };
                tag.data_mut().tsr = Some(SourceRange::new(start, start + width));
                pos = Some(start + width);
            }

            let slot = match tag {
                Token::TagOpen(_) => Some((chunk, i)),
                _ => None,
            };
            match name.as_str() {
                "b" => self.last_b = slot,
                _ => self.last_i = slot,
            }
            result.push(tag);
        }
        self.chunks[chunk] = result;
    }

    fn resolve(&mut self) {
        let mut state = Open::None;
        let mut last_both = 0;

        for i in (1..self.chunks.len()).step_by(2) {
            state = match (marker_len(&self.chunks[i][0]), state) {
                (2, Open::I) => {
                    self.quote_to_tags(i, vec![close("i")], false);
                    Open::None
                }
                (2, Open::BI) => {
                    self.quote_to_tags(i, vec![close("i")], false);
                    Open::B
                }
                (2, Open::IB) => {
                    self.quote_to_tags(i, vec![close("b"), close("i"), open("b")], true);
                    Open::B
                }
                (2, Open::Both) => {
                    self.quote_to_tags(last_both, vec![open("b"), open("i")], false);
                    self.quote_to_tags(i, vec![close("i")], false);
                    Open::B
                }
                (2, Open::B) => {
                    self.quote_to_tags(i, vec![open("i")], false);
                    Open::BI
                }
                (2, _) => {
                    self.quote_to_tags(i, vec![open("i")], false);
                    Open::I
                }
                (3, Open::B) => {
                    self.quote_to_tags(i, vec![close("b")], false);
                    Open::None
                }
                (3, Open::IB) => {
                    self.quote_to_tags(i, vec![close("b")], false);
                    Open::I
                }
                (3, Open::BI) => {
                    self.quote_to_tags(i, vec![close("i"), close("b"), open("i")], true);
                    Open::I
                }
                (3, Open::Both) => {
                    self.quote_to_tags(last_both, vec![open("i"), open("b")], false);
                    self.quote_to_tags(i, vec![close("b")], false);
                    Open::I
                }
                (3, Open::I) => {
                    self.quote_to_tags(i, vec![open("b")], false);
                    Open::IB
                }
                (3, _) => {
                    self.quote_to_tags(i, vec![open("b")], false);
                    Open::B
                }
                (5, Open::B) => {
                    self.quote_to_tags(i, vec![close("b"), open("i")], false);
                    Open::I
                }
                (5, Open::I) => {
                    self.quote_to_tags(i, vec![close("i"), open("b")], false);
                    Open::B
                }
                (5, Open::BI) => {
                    self.quote_to_tags(i, vec![close("i"), close("b")], false);
                    Open::None
                }
                (5, Open::IB) => {
                    self.quote_to_tags(i, vec![close("b"), close("i")], false);
                    Open::None
                }
                (5, Open::Both) => {
                    self.quote_to_tags(last_both, vec![open("i"), open("b")], false);
                    self.quote_to_tags(i, vec![close("b"), close("i")], false);
                    Open::None
                }
                (5, Open::None) => {
                    last_both = i;
                    Open::Both
                }
                (_, state) => state,
            };
        }

        // Close what is still open; the order matters.
        if state == Open::Both {
            self.quote_to_tags(last_both, vec![open("b"), open("i")], false);
            state = Open::BI;
        }
        if matches!(state, Open::B | Open::IB) {
            self.auto_close("b");
        }
        if matches!(state, Open::I | Open::BI | Open::IB) {
            self.auto_close("i");
        }
        if state == Open::BI {
            self.auto_close("b");
        }
    }

    fn auto_close(&mut self, name: &str) {
        self.current.push(close(name));
        if let Some(open) = self.last_mut(name) {
            open.data.auto_inserted_end = true;
        }
    }

    /// Resolve the line ended by `token` and release everything buffered.
    fn end_line(&mut self, token: Token) -> Vec<Token> {
        self.start_chunk();
        self.balance();
        self.resolve();
        self.current.push(token);
        self.start_chunk();
        let out = self.chunks.drain(..).flatten().collect();
        self.reset();
        out
    }
}

impl Transformer for QuoteTransformer {
    fn name(&self) -> &'static str {
        "QuoteTransformer"
    }

    fn registrations(&self) -> Vec<Registration> {
        vec![
            Registration::new(QUOTE_RANK, TokenFilter::Tag(TagName::Quote)),
            Registration::new(QUOTE_RANK, TokenFilter::Kind(TokenKind::Newline)),
            Registration::new(QUOTE_RANK, TokenFilter::Tag(TagName::element("td"))),
            Registration::new(QUOTE_RANK, TokenFilter::Tag(TagName::element("th"))),
            Registration::new(QUOTE_RANK, TokenFilter::Kind(TokenKind::EndOfInput)),
            Registration::new(ANY_RANK, TokenFilter::Any),
        ]
    }

    fn apply(
        &mut self,
        token: Token,
        rank: Rank,
        _cx: &StageContext,
    ) -> Result<TransformOutcome, TransformError> {
        if rank == ANY_RANK {
            if self.active {
                self.current.push(token);
                return Ok(TransformOutcome::Emit(Vec::new()));
            }
            self.previous = token.as_text().map(str::to_string);
            return Ok(TransformOutcome::Pass(token));
        }

        if token.tag_name() == Some(&TagName::Quote) {
            if !self.active {
                self.active = true;
                self.context = self.previous.take().unwrap_or_default();
            }
            self.start_chunk();
            self.current.push(token);
            self.start_chunk();
            return Ok(TransformOutcome::Emit(Vec::new()));
        }

        // Newline, table cell or end of input.
        if !self.active {
            self.previous = None;
            return Ok(TransformOutcome::Pass(token));
        }
        // Buffered tokens already went through the any-token rank.
        Ok(TransformOutcome::EmitAt(ANY_RANK, self.end_line(token)))
    }

    fn reset(&mut self) {
        self.chunks.clear();
        self.current.clear();
        self.context.clear();
        self.previous = None;
        self.last_i = None;
        self.last_b = None;
        self.active = false;
    }
}
