//! Hand-written recursive descent over the source bytes.
//!
//! The grammar is split by where a construct can start:
//!
//! - [`block`]: start-of-line syntax (headings, lists, rules, tables)
//! - [`inline`]: everything that can appear mid-line
//! - [`attributes`]: HTML and table attribute lists
//!
//! All rules work on a [`Grammar`] cursor. A rule either succeeds and leaves
//! the cursor after what it consumed, or returns [`NoMatch`] and leaves the
//! cursor where it started. Nested content is parsed with a [`Stops`] set
//! telling it which closing syntax ends it.
//!
//! Openers nested more than [`MAX_NESTING`] deep are read as text.

pub(crate) mod attributes;
pub(crate) mod block;
pub(crate) mod inline;

use crate::lexer::{self, Atom};
use crate::token::{SourceRange, Token};

use super::memo::{MemoCache, MemoKey, ScanKey};
use super::{NoMatch, Rule};

pub(crate) const MAX_NESTING: usize = 64;

/// Closing syntax that ends the content currently being parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub(crate) struct Stops {
    /// Inside `{{ }}`: `|` and `}}`.
    pub template: bool,
    /// Inside `{{{ }}}`: `|` and `}}}`.
    pub tplarg: bool,
    /// Parameter name: `=`.
    pub equals: bool,
    /// Wikilink target: `|` and `]]`.
    pub link_target: bool,
    /// Wikilink caption: `]]`.
    pub wikilink: bool,
    /// External link caption: `]`.
    pub extlink: bool,
    /// Table cell: `||`.
    pub table_cell: bool,
    /// Header cell: `!!` (and `||`).
    pub header_cell: bool,
    /// Content may not continue past the end of the line.
    pub single_line: bool,
}

impl Stops {
    pub fn template() -> Self {
        Self {
            template: true,
            ..Self::default()
        }
    }

    pub fn tplarg() -> Self {
        Self {
            tplarg: true,
            ..Self::default()
        }
    }

    /// Inside a template call, where `|` belongs to the call.
    pub fn in_call(&self) -> bool {
        self.template || self.tplarg || self.link_target
    }

    /// The enclosing construct fails unless the content ends at a stop.
    pub fn needs_close(&self) -> bool {
        self.in_call() || self.wikilink || self.extlink
    }

    pub fn hit(&self, p: &Grammar<'_, '_>) -> bool {
        (self.template && (p.at("|") || p.at("}}")))
            || (self.tplarg && (p.at("|") || p.at("}}}")))
            || (self.equals && p.at("="))
            || (self.link_target && (p.at("|") || p.at("]]")))
            || (self.wikilink && p.at("]]"))
            || (self.extlink && p.at("]"))
            || (self.table_cell && p.at("||"))
            || (self.header_cell && (p.at("!!") || p.at("||")))
    }
}

/// Cursor over the source, bounded by `limit`.
pub(crate) struct Grammar<'s, 'm> {
    src: &'s str,
    pub pos: usize,
    pub limit: usize,
    /// Open `{|` tables; cell syntax only exists inside one.
    pub table_depth: usize,
    offset: usize,
    /// Memoized rules currently running.
    depth: usize,
    /// Steps of the scans for closing syntax in progress.
    trail: Vec<ScanKey>,
    memo: &'m mut MemoCache,
}

impl<'s, 'm> Grammar<'s, 'm> {
    pub fn new(src: &'s str, offset: usize, memo: &'m mut MemoCache) -> Self {
        Self {
            src,
            pos: 0,
            limit: src.len(),
            table_depth: 0,
            offset,
            depth: 0,
            trail: Vec::new(),
            memo,
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.limit
    }

    pub fn rest(&self) -> &'s str {
        self.src.get(self.pos..self.limit).unwrap_or("")
    }

    pub fn at(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    /// ASCII case-insensitive prefix test.
    pub fn at_ci(&self, s: &str) -> bool {
        self.rest()
            .get(..s.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(s))
    }

    pub fn peek_byte(&self) -> Option<u8> {
        self.rest().as_bytes().first().copied()
    }

    pub fn peek_atom(&self) -> Option<Atom> {
        let bounded = self.src.get(..self.limit)?;
        lexer::peek(bounded, self.pos).map(|(atom, _)| atom)
    }

    /// Advance by `n` ASCII bytes.
    pub fn bump(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.limit);
    }

    /// Advance past one (possibly multi-byte) character.
    pub fn bump_char(&mut self) {
        let width = self.rest().chars().next().map_or(1, char::len_utf8);
        self.bump(width);
    }

    pub fn slice(&self, start: usize, end: usize) -> &'s str {
        self.src.get(start..end).unwrap_or("")
    }

    /// Absolute source range for local byte positions.
    pub fn range(&self, start: usize, end: usize) -> SourceRange {
        SourceRange::new(start + self.offset, end + self.offset)
    }

    /// Absolute `src_offsets` for local byte positions.
    pub fn offsets(&self, offsets: [usize; 4]) -> [usize; 4] {
        offsets.map(|o| o + self.offset)
    }

    pub fn at_sol(&self) -> bool {
        self.pos == 0 || self.src.as_bytes().get(self.pos - 1) == Some(&b'\n')
    }

    pub fn at_newline(&self) -> bool {
        self.at("\n") || self.at("\r\n")
    }

    /// Position of the line ending (or the limit) at or after the cursor.
    pub fn line_end(&self) -> usize {
        match self.rest().find('\n') {
            Some(idx) => {
                let end = self.pos + idx;
                if end > self.pos && self.src.as_bytes()[end - 1] == b'\r' {
                    end - 1
                } else {
                    end
                }
            }
            None => self.limit,
        }
    }

    pub fn skip_spaces(&mut self) {
        while matches!(self.peek_byte(), Some(b' ' | b'\t')) {
            self.bump(1);
        }
    }

    /// Run `f` with the limit lowered to `limit`.
    pub fn with_limit<T>(&mut self, limit: usize, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = self.limit;
        self.limit = limit.min(saved);
        let result = f(self);
        self.limit = saved;
        result
    }

    /// Run `f`, rewinding the cursor if it fails.
    pub fn attempt<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, NoMatch>,
    ) -> Result<T, NoMatch> {
        let start = self.pos;
        let result = f(self);
        if result.is_err() {
            self.pos = start;
        }
        result
    }

    /// Run a rule through the memo cache. Fails without trying once
    /// [`MAX_NESTING`] rules are already running.
    pub fn memoized(
        &mut self,
        rule: Rule,
        f: impl FnOnce(&mut Self) -> Result<Vec<Token>, NoMatch>,
    ) -> Result<Vec<Token>, NoMatch> {
        if self.depth >= MAX_NESTING {
            return Err(self.no_match(rule));
        }
        let key = MemoKey {
            pos: self.pos,
            limit: self.limit,
            rule,
        };
        if let Some(memo) = self.memo.lookup(&key) {
            return memo.map(|(end, tokens)| {
                self.pos = end;
                tokens
            });
        }

        self.depth += 1;
        let result = self.attempt(f);
        self.depth -= 1;
        let memo = match &result {
            Ok(tokens) => Ok((self.pos, tokens.clone())),
            Err(no_match) => Err(*no_match),
        };
        self.memo.record(key, memo);
        result
    }

    /// Start of a scan for closing syntax.
    pub fn scan_mark(&self) -> usize {
        self.trail.len()
    }

    /// One step of a scan with `stops`. True when the scan is known to run
    /// out from here without reaching a stop.
    pub fn scan_step(&mut self, stops: Stops) -> bool {
        if !stops.needs_close() {
            return false;
        }
        let key = ScanKey {
            pos: self.pos,
            limit: self.limit,
            stops,
            table_depth: self.table_depth,
        };
        if self.memo.is_dead_end(&key) {
            return true;
        }
        self.trail.push(key);
        false
    }

    /// End of the scan begun at `mark`. If it ran out without reaching a
    /// stop, so will any later scan passing one of its steps.
    pub fn scan_done(&mut self, mark: usize, stops: Stops) {
        let steps = self.trail.split_off(mark.min(self.trail.len()));
        if stops.needs_close() && !stops.hit(self) {
            self.memo.mark_dead_ends(steps);
        }
    }

    /// No `>` at or after the cursor.
    pub fn no_tag_end_ahead(&mut self) -> bool {
        self.memo
            .last_tag_end(self.src)
            .is_none_or(|end| end < self.pos)
    }

    pub fn no_match(&self, rule: Rule) -> NoMatch {
        NoMatch {
            rule,
            pos: self.pos + self.offset,
        }
    }
}

/// Append text, merging with a directly preceding text token.
pub(crate) fn push_text(out: &mut Vec<Token>, value: &str, range: SourceRange) {
    if value.is_empty() {
        return;
    }
    if let Some(Token::Text(prev)) = out.last_mut() {
        if let Some(prev_range) = prev.data.tsr {
            if prev_range.end == range.start {
                prev.value.push_str(value);
                prev.data.tsr = Some(prev_range.union(range));
                return;
            }
        }
    }
    out.push(Token::text(value, Some(range)));
}

pub(crate) fn newline(p: &mut Grammar<'_, '_>, out: &mut Vec<Token>) {
    let start = p.pos;
    let width = if p.at("\r\n") { 2 } else { 1 };
    p.bump(width);
    out.push(Token::newline(Some(p.range(start, p.pos))));
}

/// One source line of the document, including its line ending.
pub(crate) fn document_line(p: &mut Grammar<'_, '_>) -> Vec<Token> {
    let mut out = Vec::new();
    let stops = Stops::default();
    if p.at_sol() {
        block::sol_construct(p, stops, &mut out);
    }
    inline::inline_line(p, stops, &mut out);
    if p.at_newline() {
        newline(p, &mut out);
    }
    out
}

/// Content that may span lines, ending at the first stop.
pub(crate) fn nested_content(p: &mut Grammar<'_, '_>, stops: Stops) -> Vec<Token> {
    let mut out = Vec::new();
    let mark = p.scan_mark();
    loop {
        if p.at_sol() && p.pos > 0 {
            block::sol_construct(p, stops, &mut out);
        }
        inline::inline_line(p, stops, &mut out);
        if stops.single_line || !p.at_newline() {
            break;
        }
        newline(p, &mut out);
    }
    if !stops.single_line {
        p.scan_done(mark, stops);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::MemoConfig;
    use pretty_assertions::assert_eq;

    #[test]
    fn line_end_excludes_carriage_return() {
        let mut memo = MemoCache::new(MemoConfig::default());
        let p = Grammar::new("ab\r\ncd", 0, &mut memo);
        assert_eq!(p.line_end(), 2);
    }

    #[test]
    fn attempt_rewinds_on_failure() {
        let mut memo = MemoCache::new(MemoConfig::default());
        let mut p = Grammar::new("abc", 0, &mut memo);
        let result: Result<(), NoMatch> = p.attempt(|p| {
            p.bump(2);
            Err(p.no_match(Rule::Inline))
        });
        assert!(result.is_err());
        assert_eq!(p.pos, 0);
    }

    #[test]
    fn memoized_rules_stop_at_the_nesting_limit() {
        let mut memo = MemoCache::new(MemoConfig::default());
        let mut p = Grammar::new("x", 0, &mut memo);
        p.depth = MAX_NESTING;
        let result = p.memoized(Rule::Inline, |p| {
            p.bump(1);
            Ok(Vec::new())
        });
        assert!(result.is_err());
        assert_eq!(p.pos, 0);
    }

    #[test]
    fn a_scan_that_runs_out_leaves_dead_ends() {
        let mut memo = MemoCache::new(MemoConfig::default());
        let mut p = Grammar::new("abc", 0, &mut memo);
        let stops = Stops::template();
        let mark = p.scan_mark();
        for _ in 0..3 {
            assert!(!p.scan_step(stops));
            p.bump(1);
        }
        p.scan_done(mark, stops);

        p.pos = 1;
        assert!(p.scan_step(stops));
        assert!(!p.scan_step(Stops::tplarg()));
    }

    #[test]
    fn a_scan_that_reaches_a_stop_leaves_nothing() {
        let mut memo = MemoCache::new(MemoConfig::default());
        let mut p = Grammar::new("ab}}", 0, &mut memo);
        let stops = Stops::template();
        let mark = p.scan_mark();
        assert!(!p.scan_step(stops));
        p.bump(2);
        p.scan_done(mark, stops);

        p.pos = 0;
        assert!(!p.scan_step(stops));
    }

    #[test]
    fn push_text_merges_contiguous_runs() {
        let mut out = Vec::new();
        push_text(&mut out, "ab", SourceRange::new(0, 2));
        push_text(&mut out, "c", SourceRange::new(2, 3));
        push_text(&mut out, "d", SourceRange::new(5, 6));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_text(), Some("abc"));
        assert_eq!(out[0].tsr(), Some(SourceRange::new(0, 3)));
    }
}
