//! `<onlyinclude>`, `<noinclude>` and `<includeonly>`.
//!
//! What these hide depends on whether the content is being transcluded
//! (`is_include`). On the page itself the tags become `mw:Includes/*`
//! markers so the source survives a round trip; inside a transclusion they
//! disappear and take the content they hide with them.

use wikiweave_syntax::{Rank, SourceRange, TagName, Token, TokenKind};

use crate::error::TransformError;
use crate::pipeline::{Registration, StageContext, TokenFilter, TransformOutcome, Transformer};
use crate::tokens::meta;

const ONLY_INCLUDE_RANK: Rank = Rank::from_millis(10);
const DIRECTIVE_RANK: Rank = Rank::from_millis(20);
const COLLECT_RANK: Rank = Rank::from_millis(21);

/// Marker meta for an include tag, carrying the tag's source.
fn include_marker(cx: &StageContext, type_of: &str, tsr: Option<SourceRange>) -> Token {
    let mut tag = meta(type_of).with_tsr(tsr);
    tag.data.src = tsr.map(|r| cx.parse.page_slice(r));
    Token::SelfClose(tag)
}

fn marker_type(kind: &str, token: &Token) -> String {
    match token {
        Token::TagClose(_) => format!("mw:Includes/{kind}/End"),
        _ => format!("mw:Includes/{kind}"),
    }
}

/// `<onlyinclude>`: when transcluding, only the content of these sections
/// is used, if the page has any.
#[derive(Debug, Default)]
pub struct OnlyIncludeHandler {
    buffer: Vec<Token>,
    /// Content inside onlyinclude sections, once one has been seen.
    included: Option<Vec<Token>>,
    inside: bool,
}

impl Transformer for OnlyIncludeHandler {
    fn name(&self) -> &'static str {
        "OnlyIncludeHandler"
    }

    fn registrations(&self) -> Vec<Registration> {
        vec![Registration::new(ONLY_INCLUDE_RANK, TokenFilter::Any)]
    }

    fn apply(
        &mut self,
        token: Token,
        _rank: Rank,
        cx: &StageContext,
    ) -> Result<TransformOutcome, TransformError> {
        let is_directive = token.is_element("onlyinclude");
        if !cx.options.is_include {
            if !is_directive {
                return Ok(TransformOutcome::Pass(token));
            }
            let marker = include_marker(cx, &marker_type("OnlyInclude", &token), token.tsr());
            return Ok(TransformOutcome::Emit(vec![marker]));
        }

        match token {
            Token::EndOfInput(_) => {
                let mut out = match self.included.take() {
                    Some(included) => included,
                    None => std::mem::take(&mut self.buffer),
                };
                self.buffer.clear();
                self.inside = false;
                out.push(token);
                Ok(TransformOutcome::Emit(out))
            }
            Token::TagOpen(_) if is_directive => {
                self.inside = true;
                self.included.get_or_insert_with(Vec::new);
                Ok(TransformOutcome::Emit(Vec::new()))
            }
            Token::TagClose(_) | Token::SelfClose(_) if is_directive => {
                self.inside = false;
                self.included.get_or_insert_with(Vec::new);
                Ok(TransformOutcome::Emit(Vec::new()))
            }
            token => {
                if self.inside
                    && let Some(included) = &mut self.included
                {
                    included.push(token.clone());
                }
                self.buffer.push(token);
                Ok(TransformOutcome::Emit(Vec::new()))
            }
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.included = None;
        self.inside = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hidden {
    NoInclude,
    IncludeOnly,
}

/// Content being dropped, with the range it started at.
#[derive(Debug)]
struct Hiding {
    what: Hidden,
    start: Option<SourceRange>,
}

/// `<noinclude>` and `<includeonly>`.
#[derive(Debug, Default)]
pub struct IncludeDirectiveHandler {
    hiding: Option<Hiding>,
}

impl IncludeDirectiveHandler {
    /// Stop hiding. On the page, hidden `<includeonly>` content leaves one
    /// marker covering everything it hid.
    fn finish(&mut self, end: Option<SourceRange>, cx: &StageContext) -> Vec<Token> {
        match self.hiding.take() {
            Some(Hiding {
                what: Hidden::IncludeOnly,
                start,
            }) => {
                let tsr = match (start, end) {
                    (Some(start), Some(end)) => Some(start.union(end)),
                    (start, end) => start.or(end),
                };
                vec![include_marker(cx, "mw:Includes/IncludeOnly", tsr)]
            }
            _ => Vec::new(),
        }
    }
}

impl Transformer for IncludeDirectiveHandler {
    fn name(&self) -> &'static str {
        "IncludeDirectiveHandler"
    }

    fn registrations(&self) -> Vec<Registration> {
        vec![
            Registration::new(
                DIRECTIVE_RANK,
                TokenFilter::Tag(TagName::element("noinclude")),
            ),
            Registration::new(
                DIRECTIVE_RANK,
                TokenFilter::Tag(TagName::element("includeonly")),
            ),
            Registration::new(DIRECTIVE_RANK, TokenFilter::Kind(TokenKind::EndOfInput)),
            Registration::new(COLLECT_RANK, TokenFilter::Any),
        ]
    }

    fn apply(
        &mut self,
        token: Token,
        rank: Rank,
        cx: &StageContext,
    ) -> Result<TransformOutcome, TransformError> {
        if rank == COLLECT_RANK {
            return Ok(match self.hiding {
                Some(_) => TransformOutcome::Emit(Vec::new()),
                None => TransformOutcome::Pass(token),
            });
        }

        if let Token::EndOfInput(data) = &token {
            let end = data.tsr.map(|r| SourceRange::new(r.start, r.start));
            let mut out = self.finish(end, cx);
            out.push(token);
            return Ok(TransformOutcome::EmitAt(COLLECT_RANK, out));
        }

        let what = if token.is_element("noinclude") {
            Hidden::NoInclude
        } else {
            Hidden::IncludeOnly
        };
        // In include mode noinclude content hides; on the page includeonly
        // content does.
        let hides = match what {
            Hidden::NoInclude => cx.options.is_include,
            Hidden::IncludeOnly => !cx.options.is_include,
        };

        let out = match (&token, hides) {
            (Token::TagOpen(_), true) => {
                if self.hiding.is_none() {
                    self.hiding = Some(Hiding {
                        what,
                        start: token.tsr(),
                    });
                }
                Vec::new()
            }
            (Token::TagClose(_), true)
                if self.hiding.as_ref().is_some_and(|h| h.what == what) =>
            {
                self.finish(token.tsr(), cx)
            }
            (Token::SelfClose(_), true) => match what {
                Hidden::IncludeOnly => vec![include_marker(
                    cx,
                    "mw:Includes/IncludeOnly",
                    token.tsr(),
                )],
                Hidden::NoInclude => Vec::new(),
            },
            // Tags that do not hide anything.
            (_, false) if cx.options.is_include => Vec::new(),
            (_, false) => vec![include_marker(
                cx,
                &marker_type("NoInclude", &token),
                token.tsr(),
            )],
            (_, true) => Vec::new(),
        };
        Ok(TransformOutcome::EmitAt(COLLECT_RANK, out))
    }

    fn reset(&mut self) {
        self.hiding = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;
    use crate::test_support::{stage_context_with, text_of, type_ofs};
    use pretty_assertions::assert_eq;
    use wikiweave_syntax::{Tag, Tokenizer};

    fn directive(token: fn(Tag) -> Token, name: &str, range: (usize, usize)) -> Token {
        token(Tag::element(name).with_tsr(Some(SourceRange::new(range.0, range.1))))
    }

    fn run(source: &str, is_include: bool) -> Vec<Token> {
        let cx = stage_context_with(source, |o| o.is_include = is_include);
        let stage = Stage::new(
            "stage1",
            false,
            Rank::from_millis(1000),
            vec![
                Box::new(OnlyIncludeHandler::default()),
                Box::new(IncludeDirectiveHandler::default()),
            ],
        );
        let mut out = Vec::new();
        for chunk in Tokenizer::default().chunks(source, 0) {
            out.extend(stage.process(chunk.unwrap(), &cx).unwrap());
        }
        out
    }

    #[test]
    fn noinclude_content_hides_when_transcluded() {
        let out = run("a<noinclude>b</noinclude>c", true);
        assert_eq!(text_of(&out), "ac");
    }

    #[test]
    fn noinclude_becomes_markers_on_the_page() {
        let out = run("a<noinclude>b</noinclude>c", false);
        assert_eq!(text_of(&out), "abc");
        assert_eq!(
            type_ofs(&out),
            vec!["mw:Includes/NoInclude", "mw:Includes/NoInclude/End"]
        );
        assert_eq!(out[1].data().src.as_deref(), Some("<noinclude>"));
    }

    #[test]
    fn includeonly_collapses_to_one_marker_on_the_page() {
        let source = "a<includeonly>b\n\nc</includeonly>d";
        let out = run(source, false);
        assert_eq!(text_of(&out), "ad");
        assert_eq!(type_ofs(&out), vec!["mw:Includes/IncludeOnly"]);
        assert_eq!(
            out[1].data().src.as_deref(),
            Some("<includeonly>b\n\nc</includeonly>")
        );
    }

    #[test]
    fn includeonly_tags_vanish_when_transcluded() {
        let out = run("a<includeonly>b</includeonly>c", true);
        assert_eq!(text_of(&out), "abc");
        assert!(type_ofs(&out).is_empty());
    }

    #[test]
    fn onlyinclude_keeps_only_its_sections() {
        let out = run("x<onlyinclude>a</onlyinclude>y<onlyinclude>b</onlyinclude>z", true);
        assert_eq!(text_of(&out), "ab");
        assert!(matches!(out.last(), Some(Token::EndOfInput(_))));
    }

    #[test]
    fn without_onlyinclude_everything_is_kept() {
        let out = run("x\ny", true);
        assert_eq!(text_of(&out), "x\ny");
    }

    #[test]
    fn onlyinclude_becomes_markers_on_the_page() {
        let out = run("<onlyinclude>a</onlyinclude>", false);
        assert_eq!(
            type_ofs(&out),
            vec!["mw:Includes/OnlyInclude", "mw:Includes/OnlyInclude/End"]
        );
    }

    #[test]
    fn unclosed_includeonly_runs_to_the_end() {
        let cx = stage_context_with("a<includeonly>b", |_| {});
        let mut handler = IncludeDirectiveHandler::default();
        let open = directive(Token::TagOpen, "includeonly", (1, 14));
        handler.apply(open, DIRECTIVE_RANK, &cx).unwrap();
        let eof = Token::end_of_input(Some(SourceRange::new(15, 15)));
        let TransformOutcome::EmitAt(_, out) = handler.apply(eof, DIRECTIVE_RANK, &cx).unwrap()
        else {
            panic!("expected tokens");
        };
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].tsr(), Some(SourceRange::new(1, 15)));
        assert_eq!(out[0].data().src.as_deref(), Some("<includeonly>b"));
    }
}
