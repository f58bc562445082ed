//! # Tokenizer
//!
//! Turns wikitext into a flat [`Token`] stream with absolute source ranges.
//!
//! ## Entry points
//!
//! - [`Tokenizer::tokenize`]: a whole document, ending in `EndOfInput`.
//! - [`Tokenizer::chunks`]: the same, lazily, one source line per chunk.
//!   Async callers yield between chunks so a long page does not hold the
//!   event loop.
//! - [`Tokenizer::tokenize_rule`]: a fragment parsed with one named rule.
//!   The rule must consume the whole fragment or the call returns
//!   [`NoMatch`], which callers treat as "render this literally".
//! - [`Tokenizer::tokenize_attributes`]: re-parse text as an attribute list
//!   (used when a transclusion produces `key=value` inside a tag).
//!
//! Every entry point takes an `offset` that is added to all source ranges,
//! so fragments cut out of a larger page keep page-absolute positions.

mod grammar;
mod memo;

pub use grammar::attributes::AttrContext;
pub use memo::{MemoConfig, MemoStats};
pub(crate) use memo::MemoCache;

use crate::token::{Attribute, Token};
use grammar::Grammar;

/// Grammar rules, as reported in [`NoMatch`] and used as memo keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    Document,
    Inline,
    Url,
    TemplateOrArg,
    WikiLink,
    ExtLink,
    HtmlTag,
    GenericAttributes,
    TableAttributes,
}

/// A rule did not match. Recoverable: the fragment can be used as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rule {rule:?} did not match at byte {pos}")]
pub struct NoMatch {
    pub rule: Rule,
    pub pos: usize,
}

/// Failure of the top-level rule. Fatal for the parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenizeError {
    #[error("tokenizer made no progress at byte {pos}")]
    Stalled { pos: usize },
}

/// Named entry rules for [`Tokenizer::tokenize_rule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRule {
    /// Full block grammar, without the trailing `EndOfInput`.
    Document,
    /// Inline content (lines allowed, no document-level tables).
    Inline,
    /// A bare URL.
    Url,
    /// A single `{{...}}` or `{{{...}}}`.
    TemplateOrArg,
}

/// Reusable tokenizer. Holds the memo cache; results never leak between
/// calls because every call clears it.
#[derive(Debug)]
pub struct Tokenizer {
    memo: MemoCache,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(MemoConfig::default())
    }
}

impl Tokenizer {
    pub fn new(config: MemoConfig) -> Self {
        Self {
            memo: MemoCache::new(config),
        }
    }

    /// Memo statistics for the most recent call.
    pub fn memo_stats(&self) -> MemoStats {
        self.memo.stats()
    }

    /// Tokenize a whole document.
    pub fn tokenize(&mut self, source: &str, offset: usize) -> Result<Vec<Token>, TokenizeError> {
        let mut tokens = Vec::new();
        for chunk in self.chunks(source, offset) {
            tokens.extend(chunk?);
        }
        Ok(tokens)
    }

    /// Lazily tokenize a document, one line at a time.
    pub fn chunks<'t>(&'t mut self, source: &'t str, offset: usize) -> Chunks<'t> {
        self.memo.clear();
        Chunks {
            memo: &mut self.memo,
            source,
            offset,
            pos: 0,
            table_depth: 0,
            done: false,
        }
    }

    /// Tokenize `source` with a single rule, which must consume all of it.
    pub fn tokenize_rule(
        &mut self,
        source: &str,
        rule: StartRule,
        offset: usize,
    ) -> Result<Vec<Token>, NoMatch> {
        self.memo.clear();
        let mut p = Grammar::new(source, offset, &mut self.memo);
        let (rule_id, tokens) = match rule {
            StartRule::Document => {
                let mut tokens = Vec::new();
                while !p.at_end() {
                    let before = p.pos;
                    tokens.extend(grammar::document_line(&mut p));
                    if p.pos == before {
                        break;
                    }
                }
                (Rule::Document, tokens)
            }
            StartRule::Inline => (
                Rule::Inline,
                grammar::nested_content(&mut p, Default::default()),
            ),
            StartRule::Url => {
                grammar::inline::url(&mut p)?;
                let url = p.slice(0, p.pos);
                (Rule::Url, vec![Token::text(url, Some(p.range(0, p.pos)))])
            }
            StartRule::TemplateOrArg => (
                Rule::TemplateOrArg,
                p.memoized(Rule::TemplateOrArg, grammar::inline::template_or_arg)?,
            ),
        };

        if p.pos != source.len() {
            return Err(p.no_match(rule_id));
        }
        Ok(tokens)
    }

    /// Parse `source` as an attribute list, which must consume all of it.
    pub fn tokenize_attributes(
        &mut self,
        source: &str,
        context: AttrContext,
        offset: usize,
    ) -> Result<Vec<Attribute>, NoMatch> {
        self.memo.clear();
        let mut p = Grammar::new(source, offset, &mut self.memo);
        let attribs = grammar::attributes::attribute_list(&mut p, context);
        p.skip_spaces();
        if p.pos != source.len() {
            let rule = match context {
                AttrContext::Html => Rule::GenericAttributes,
                AttrContext::Table => Rule::TableAttributes,
            };
            return Err(p.no_match(rule));
        }
        Ok(attribs)
    }
}

/// Lazy document tokenization. Yields one chunk per source line, then a
/// final chunk holding `EndOfInput`.
pub struct Chunks<'t> {
    memo: &'t mut MemoCache,
    source: &'t str,
    offset: usize,
    pos: usize,
    table_depth: usize,
    done: bool,
}

impl Iterator for Chunks<'_> {
    type Item = Result<Vec<Token>, TokenizeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.pos >= self.source.len() {
            self.done = true;
            let end = self.source.len() + self.offset;
            return Some(Ok(vec![Token::end_of_input(Some(
                crate::token::SourceRange::new(end, end),
            ))]));
        }

        let mut p = Grammar::new(self.source, self.offset, &mut *self.memo);
        p.pos = self.pos;
        p.table_depth = self.table_depth;
        let line = grammar::document_line(&mut p);
        if p.pos <= self.pos {
            self.done = true;
            return Some(Err(TokenizeError::Stalled {
                pos: self.pos + self.offset,
            }));
        }
        self.pos = p.pos;
        self.table_depth = p.table_depth;
        Some(Ok(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{AttrValue, SourceRange, Syntax, TagName};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn tokenize(src: &str) -> Vec<Token> {
        Tokenizer::default().tokenize(src, 0).unwrap()
    }

    fn r(start: usize, end: usize) -> Option<SourceRange> {
        Some(SourceRange::new(start, end))
    }

    /// Compact rendering: `<h2>`, `</h2>`, `<hr/>`, `"text"`, `NL`, `EOF`.
    fn shape(tokens: &[Token]) -> Vec<String> {
        tokens
            .iter()
            .map(|t| match t {
                Token::TagOpen(tag) => format!("<{}>", tag.name),
                Token::TagClose(tag) => format!("</{}>", tag.name),
                Token::SelfClose(tag) => format!("<{}/>", tag.name),
                Token::Text(text) => format!("{:?}", text.value),
                Token::Newline(_) => "NL".to_string(),
                Token::Comment(c) => format!("<!--{}-->", c.value),
                Token::EndOfInput(_) => "EOF".to_string(),
            })
            .collect()
    }

    #[test]
    fn heading_ranges() {
        let tokens = tokenize("== Title ==\n");
        assert_eq!(
            shape(&tokens),
            vec!["<h2>", "\" Title \"", "</h2>", "NL", "EOF"]
        );
        let ranges: Vec<_> = tokens.iter().map(Token::tsr).collect();
        assert_eq!(
            ranges,
            vec![r(0, 2), r(2, 9), r(9, 11), r(11, 12), r(12, 12)]
        );
    }

    #[rstest]
    #[case("=a==", vec!["<h1>", "\"a=\"", "</h1>", "EOF"])]
    #[case("===", vec!["<h1>", "\"=\"", "</h1>", "EOF"])]
    #[case("== x", vec!["\"== x\"", "EOF"])]
    #[case("----", vec!["<hr/>", "EOF"])]
    #[case("*# item", vec!["<listItem/>", "\" item\"", "EOF"])]
    fn start_of_line_constructs(#[case] src: &str, #[case] expected: Vec<&str>) {
        assert_eq!(shape(&tokenize(src)), expected);
    }

    #[rstest]
    #[case("''x''", vec!["<mw-quote/>", "\"x\"", "<mw-quote/>", "EOF"])]
    #[case("''''x", vec!["\"'\"", "<mw-quote/>", "\"x\"", "EOF"])]
    #[case("a'''''''b", vec!["\"a''\"", "<mw-quote/>", "\"b\"", "EOF"])]
    #[case("it's", vec!["\"it's\"", "EOF"])]
    fn apostrophe_runs(#[case] src: &str, #[case] expected: Vec<&str>) {
        assert_eq!(shape(&tokenize(src)), expected);
    }

    #[test]
    fn quote_keeps_its_apostrophes_as_source() {
        let tokens = tokenize("''''x");
        let quote = tokens[1].tag().unwrap();
        assert_eq!(quote.data.src.as_deref(), Some("'''"));
        assert_eq!(quote.data.tsr, r(1, 4));
    }

    #[test]
    fn template_parameters_and_offsets() {
        let tokens = tokenize("{{echo|a|k = v}}");
        let tag = tokens[0].tag().unwrap();
        assert_eq!(tag.name, TagName::Template);
        assert_eq!(tag.data.tsr, r(0, 16));
        assert_eq!(tag.data.src.as_deref(), Some("{{echo|a|k = v}}"));

        let summary: Vec<(String, String, Option<[usize; 4]>)> = tag
            .attribs
            .iter()
            .map(|a| (a.key_string(), a.value.to_plain_string(), a.src_offsets))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("echo".to_string(), String::new(), Some([2, 6, 6, 6])),
                (String::new(), "a".to_string(), Some([7, 7, 7, 8])),
                ("k ".to_string(), " v".to_string(), Some([9, 11, 12, 14])),
            ]
        );
    }

    #[test]
    fn offset_shifts_every_range() {
        let tokens = Tokenizer::default().tokenize("{{a|b}}", 100).unwrap();
        let tag = tokens[0].tag().unwrap();
        assert_eq!(tag.data.tsr, r(100, 107));
        assert_eq!(tag.attribs[1].src_offsets, Some([104, 104, 104, 105]));
        assert_eq!(tokens[1].tsr(), r(107, 107));
    }

    #[test]
    fn nested_template_stays_inside_parameter() {
        let tokens = tokenize("{{a|{{b|c}}}}");
        assert_eq!(tokens.len(), 2);
        let outer = tokens[0].tag().unwrap();
        match &outer.attribs[1].value {
            AttrValue::Tokens(inner) => {
                assert_eq!(inner[0].tag_name(), Some(&TagName::Template));
                assert_eq!(inner[0].tsr(), r(4, 11));
            }
            other => panic!("expected tokens, got {other:?}"),
        }
    }

    #[test]
    fn triple_braces_prefer_template_argument() {
        let tokens = tokenize("{{{1|def}}}");
        let tag = tokens[0].tag().unwrap();
        assert_eq!(tag.name, TagName::TemplateArg);
        assert_eq!(tag.attribs[0].key_string(), "1");
        assert_eq!(tag.attribs[1].value.to_plain_string(), "def");
    }

    #[test]
    fn unclosed_template_is_text() {
        assert_eq!(shape(&tokenize("{{a|b")), vec!["\"{{a|b\"", "EOF"]);
    }

    #[test]
    fn wikilink_with_caption() {
        let tokens = tokenize("[[Foo bar|baz]]");
        let tag = tokens[0].tag().unwrap();
        assert_eq!(tag.name, TagName::WikiLink);
        assert_eq!(tag.attr_string("href").as_deref(), Some("Foo bar"));
        assert_eq!(tag.attr_string("mw:maybeContent").as_deref(), Some("baz"));
        assert_eq!(tag.data.stx, Some(Syntax::Piped));
        assert_eq!(tag.attribs[1].src_offsets, Some([10, 10, 10, 13]));
    }

    #[test]
    fn external_link_needs_a_scheme() {
        let tokens = tokenize("[http://example.org Example] [not a link]");
        let tag = tokens[0].tag().unwrap();
        assert_eq!(tag.name, TagName::ExtLink);
        assert_eq!(tag.attr_string("href").as_deref(), Some("http://example.org"));
        assert_eq!(tag.attr_string("mw:content").as_deref(), Some("Example"));
        assert_eq!(tokens[1].as_text(), Some(" [not a link]"));
    }

    #[test]
    fn html_tags_and_nowiki() {
        let tokens = tokenize("<b class=\"x\">a</b><nowiki>''x''</nowiki>");
        assert_eq!(
            shape(&tokens),
            vec!["<b>", "\"a\"", "</b>", "<span>", "\"''x''\"", "</span>", "EOF"]
        );
        assert_eq!(tokens[0].tag().unwrap().data.stx, Some(Syntax::Html));
        assert_eq!(tokens[3].tsr(), r(18, 26));
        assert_eq!(tokens[5].tsr(), r(31, 40));
    }

    #[test]
    fn comments_and_behavior_switches() {
        assert_eq!(
            shape(&tokenize("a<!--c-->__NOTOC__ __NOPE__")),
            vec!["\"a\"", "<!--c-->", "<behavior-switch/>", "\" __NOPE__\"", "EOF"]
        );
    }

    #[test]
    fn table_cells() {
        let tokens = tokenize("{|\n|a||b\n|}");
        assert_eq!(
            shape(&tokens),
            vec![
                "<table>", "NL", "<td>", "\"a\"", "<td>", "\"b\"", "NL", "</table>", "EOF"
            ]
        );
        assert_eq!(tokens[4].tsr(), r(5, 7));
        assert_eq!(tokens[4].tag().unwrap().data.stx, Some(Syntax::Row));
    }

    #[test]
    fn cell_attributes_end_at_single_pipe() {
        let tokens = tokenize("{|\n| style=\"a\" | text\n|}");
        let cell = tokens[2].tag().unwrap();
        assert_eq!(cell.attr_string("style").as_deref(), Some("a"));
        assert_eq!(tokens[3].as_text(), Some(" text"));
    }

    #[test]
    fn pipe_outside_table_is_text() {
        assert_eq!(shape(&tokenize("|a")), vec!["\"|a\"", "EOF"]);
    }

    #[test]
    fn chunks_yield_one_line_at_a_time() {
        let mut tokenizer = Tokenizer::default();
        let chunks: Vec<Vec<String>> = tokenizer
            .chunks("a\nb", 0)
            .map(|c| shape(&c.unwrap()))
            .collect();
        assert_eq!(
            chunks,
            vec![
                vec!["\"a\"".to_string(), "NL".to_string()],
                vec!["\"b\"".to_string()],
                vec!["EOF".to_string()],
            ]
        );
    }

    #[test]
    fn named_rules_must_consume_everything() {
        let mut tokenizer = Tokenizer::default();
        assert!(tokenizer
            .tokenize_rule("{{a}}", StartRule::TemplateOrArg, 0)
            .is_ok());
        let err = tokenizer
            .tokenize_rule("{{a}} b", StartRule::TemplateOrArg, 10)
            .unwrap_err();
        assert_eq!(err.rule, Rule::TemplateOrArg);
        assert_eq!(err.pos, 15);

        let url = tokenizer
            .tokenize_rule("http://x.org/a", StartRule::Url, 0)
            .unwrap();
        assert_eq!(url[0].as_text(), Some("http://x.org/a"));
        assert!(tokenizer
            .tokenize_rule("x.org", StartRule::Url, 0)
            .is_err());
    }

    #[test]
    fn attribute_reparse() {
        let mut tokenizer = Tokenizer::default();
        let attribs = tokenizer
            .tokenize_attributes("style=\"x\" class=y", AttrContext::Html, 5)
            .unwrap();
        assert_eq!(attribs.len(), 2);
        assert_eq!(attribs[1].src_offsets, Some([15, 20, 21, 22]));
    }

    #[test]
    fn pathological_braces_finish_and_use_the_memo() {
        let src = "{{".repeat(150) + "x";
        let mut tokenizer = Tokenizer::default();
        let tokens = tokenizer.tokenize(&src, 0).unwrap();

        assert_eq!(tokens[0].as_text(), Some(src.as_str()));
        assert!(tokenizer.memo_stats().stores > 0);
    }

    #[rstest]
    #[case("[[")]
    #[case("{{")]
    #[case("{{{")]
    #[case("<div ")]
    #[case("[[a|")]
    fn long_runs_of_unclosed_openers_are_text(#[case] opener: &str) {
        let src = opener.repeat(5000);
        let text: String = tokenize(&src)
            .iter()
            .filter_map(Token::as_text)
            .collect();
        assert_eq!(text, src);
    }

    #[test]
    fn nesting_past_the_limit_reads_as_text() {
        let depth = grammar::MAX_NESTING + 10;
        let src = "{{a|".repeat(depth) + &"}}".repeat(depth);
        let tokens = tokenize(&src);
        assert!(matches!(tokens.last(), Some(Token::EndOfInput(_))));
        assert!(
            tokens
                .iter()
                .any(|t| t.tag().is_some_and(|tag| tag.name == TagName::Template))
        );
    }
}
