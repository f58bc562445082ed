//! Wraps top-level inline content in `<p>` elements.
//!
//! Works line by line like a block builder: inline content opens a
//! paragraph, a blank line or a block-level tag closes it. Newlines and
//! render-transparent tokens (comments, metas, whitespace) are held until
//! the next content token shows which side of a paragraph boundary they
//! belong on.

use wikiweave_syntax::{Rank, Tag, Token};

use crate::error::TransformError;
use crate::pipeline::{Registration, StageContext, TokenFilter, TransformOutcome, Transformer};
use crate::tokens::{MarkerKind, wrapper_marker};

const RANK: Rank = Rank::from_millis(2950);

const BLOCK_ELEMENTS: &[&str] = &[
    "blockquote", "caption", "center", "dd", "div", "dl", "dt", "h1", "h2", "h3", "h4", "h5",
    "h6", "hr", "li", "ol", "p", "pre", "table", "tbody", "td", "tfoot", "th", "thead", "tr",
    "ul",
];

fn is_block(token: &Token) -> bool {
    token
        .tag()
        .is_some_and(|tag| BLOCK_ELEMENTS.contains(&tag.name.as_str()))
}

fn is_transparent(token: &Token) -> bool {
    match token {
        Token::Comment(_) => true,
        Token::Text(text) => text.value.trim().is_empty(),
        Token::SelfClose(tag) => tag.name.is_element("meta") || tag.name.is_element("link"),
        _ => false,
    }
}

#[derive(Debug, Default)]
pub struct ParagraphWrapper {
    in_paragraph: bool,
    /// Open block elements; content inside them is not wrapped.
    depth: usize,
    held: Vec<Token>,
}

impl ParagraphWrapper {
    fn held_newlines(&self) -> usize {
        self.held
            .iter()
            .filter(|t| matches!(t, Token::Newline(_)))
            .count()
    }

    /// Held tokens up to and including the last held newline.
    fn take_held_lines(&mut self) -> Vec<Token> {
        let split = self
            .held
            .iter()
            .rposition(|t| matches!(t, Token::Newline(_)))
            .map_or(0, |i| i + 1);
        let rest = self.held.split_off(split);
        std::mem::replace(&mut self.held, rest)
    }

    /// End markers held on the paragraph's last line close generated
    /// content that started inside it, so they stay inside too.
    fn close(&mut self, out: &mut Vec<Token>) {
        if self.in_paragraph {
            let line_end = self
                .held
                .iter()
                .position(|t| matches!(t, Token::Newline(_)))
                .unwrap_or(self.held.len());
            if let Some(last) = self.held[..line_end]
                .iter()
                .rposition(|t| wrapper_marker(t) == Some(MarkerKind::End))
            {
                out.extend(self.held.drain(..=last));
            }
            out.push(Token::TagClose(Tag::element("p")));
            self.in_paragraph = false;
        }
    }

    fn open(&mut self, out: &mut Vec<Token>) {
        out.append(&mut self.take_held_lines());
        out.push(Token::TagOpen(Tag::element("p")));
        out.append(&mut self.held);
        self.in_paragraph = true;
    }

    fn content(&mut self, token: Token) -> Vec<Token> {
        let mut out = Vec::new();
        if self.in_paragraph && self.held_newlines() >= 2 {
            self.close(&mut out);
        }
        if self.in_paragraph {
            out.append(&mut self.held);
        } else {
            self.open(&mut out);
        }
        out.push(token);
        out
    }

    fn block(&mut self, token: Token) -> Vec<Token> {
        let mut out = Vec::new();
        self.close(&mut out);
        out.append(&mut self.held);
        match &token {
            Token::TagOpen(_) => self.depth += 1,
            Token::TagClose(_) => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        out.push(token);
        out
    }
}

impl Transformer for ParagraphWrapper {
    fn name(&self) -> &'static str {
        "ParagraphWrapper"
    }

    fn registrations(&self) -> Vec<Registration> {
        vec![Registration::new(RANK, TokenFilter::Any)]
    }

    fn apply(
        &mut self,
        token: Token,
        _rank: Rank,
        _cx: &StageContext,
    ) -> Result<TransformOutcome, TransformError> {
        if is_block(&token) {
            return Ok(TransformOutcome::Emit(self.block(token)));
        }
        if self.depth > 0 {
            return Ok(TransformOutcome::Pass(token));
        }
        let out = match token {
            Token::EndOfInput(_) => {
                let mut out = Vec::new();
                self.close(&mut out);
                out.append(&mut self.held);
                out.push(token);
                out
            }
            Token::Newline(_) => {
                self.held.push(token);
                Vec::new()
            }
            token if is_transparent(&token) => {
                self.held.push(token);
                Vec::new()
            }
            token => self.content(token),
        };
        Ok(TransformOutcome::Emit(out))
    }

    fn reset(&mut self) {
        self.in_paragraph = false;
        self.depth = 0;
        self.held.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::stage_context;
    use crate::tokens::meta;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use wikiweave_syntax::Tokenizer;

    fn outline(tokens: &[Token]) -> String {
        tokens
            .iter()
            .map(|t| match t {
                Token::TagOpen(tag) => format!("<{}>", tag.name),
                Token::TagClose(tag) => format!("</{}>", tag.name),
                Token::SelfClose(tag) => format!("<{}/>", tag.name),
                Token::Newline(_) => "\n".to_string(),
                Token::Text(text) => text.value.clone(),
                Token::Comment(c) => format!("<!--{}-->", c.value),
                Token::EndOfInput(_) => String::new(),
            })
            .collect()
    }

    fn run_with(source: &str, cx: &StageContext) -> Vec<Token> {
        let mut wrapper = ParagraphWrapper::default();
        let mut out = Vec::new();
        for token in Tokenizer::default().tokenize(source, 0).unwrap() {
            match wrapper.apply(token, RANK, cx).unwrap() {
                TransformOutcome::Pass(token) => out.push(token),
                TransformOutcome::Emit(tokens) => out.extend(tokens),
                _ => panic!("unexpected outcome"),
            }
        }
        out
    }

    #[rstest]
    #[case("a\nb", "<p>a\nb</p>")]
    #[case("a\n\nb", "<p>a</p>\n\n<p>b</p>")]
    #[case("== h ==\ntext", "<h2> h </h2>\n<p>text</p>")]
    #[case("a\n<div>b</div>", "<p>a</p>\n<div>b</div>")]
    #[case("<!--c-->\nx", "<!--c-->\n<p>x</p>")]
    #[case("x\n", "<p>x</p>\n")]
    fn wrapping(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(outline(&run_with(source, &stage_context())), expected);
    }

    fn end_marker() -> Token {
        Token::SelfClose(meta("mw:Transclusion/End").with_attr("about", "#mwt0"))
    }

    fn run_tokens(tokens: Vec<Token>) -> String {
        let cx = stage_context();
        let mut wrapper = ParagraphWrapper::default();
        let mut out = Vec::new();
        for token in tokens {
            match wrapper.apply(token, RANK, &cx).unwrap() {
                TransformOutcome::Pass(token) => out.push(token),
                TransformOutcome::Emit(tokens) => out.extend(tokens),
                _ => panic!("unexpected outcome"),
            }
        }
        outline(&out)
    }

    #[test]
    fn a_trailing_end_marker_stays_in_the_paragraph() {
        let out = run_tokens(vec![
            Token::text("x y", None),
            end_marker(),
            Token::end_of_input(None),
        ]);
        assert_eq!(out, "<p>x y<meta/></p>");
    }

    #[test]
    fn an_end_marker_before_a_blank_line_stays_in_the_paragraph() {
        let out = run_tokens(vec![
            Token::text("y", None),
            end_marker(),
            Token::newline(None),
            Token::newline(None),
            Token::text("z", None),
            Token::end_of_input(None),
        ]);
        assert_eq!(out, "<p>y<meta/></p>\n\n<p>z</p>");
    }

    #[test]
    fn an_end_marker_before_a_block_stays_in_the_paragraph() {
        let out = run_tokens(vec![
            Token::text("y", None),
            end_marker(),
            Token::TagOpen(Tag::element("div")),
            Token::TagClose(Tag::element("div")),
            Token::end_of_input(None),
        ]);
        assert_eq!(out, "<p>y<meta/></p><div></div>");
    }
}
