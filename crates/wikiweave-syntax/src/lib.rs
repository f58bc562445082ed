//! # wikiweave-syntax
//!
//! The token model and tokenizer for wikitext. Everything downstream (the
//! transform pipeline, the tree builder, the serializer) speaks in the
//! [`Token`] type defined here.
//!
//! ## Architecture Overview
//!
//! ```text
//! Source Text → Lexer → Atoms → Grammar → Tokens (with source ranges)
//!               (Logos)         (recursive descent + memo)
//! ```
//!
//! ### 1. Lexer ([`lexer`] module)
//!
//! [Logos] splits the source into atoms: one per character that can start
//! or end wikitext syntax, and runs of plain prose. The grammar uses atoms
//! to dispatch on the next construct and to skip prose quickly.
//!
//! [Logos]: https://docs.rs/logos
//!
//! ### 2. Tokenizer ([`tokenizer`] module)
//!
//! A backtracking recursive-descent grammar over byte positions. It knows
//! headings, lists, tables, transclusions (`{{...}}`, `{{{...}}}`), links,
//! apostrophe runs, HTML tags, comments and `<nowiki>`. Whatever does not
//! parse as a construct is text, so every input tokenizes.
//!
//! Backtracking is bounded by a memo cache keyed by position and rule (see
//! [`tokenizer::MemoConfig`]).
//!
//! ### 3. Tokens ([`token`] module)
//!
//! A closed sum type. Tags carry ordered attributes whose keys and values
//! may themselves be token sequences (a template call inside an attribute
//! value), and a [`DataEnvelope`] with the source range and provenance
//! flags.
//!
//! ## Module Structure
//!
//! ```text
//! wikiweave-syntax/
//! ├── lib.rs             # This file - public API
//! ├── token.rs           # Token, Tag, Attribute, DataEnvelope, Rank
//! ├── lexer.rs           # Logos atoms
//! └── tokenizer/
//!     ├── mod.rs         # Tokenizer, entry rules, errors, Chunks
//!     ├── memo.rs        # Bounded rule memoization
//!     └── grammar/
//!         ├── mod.rs     # Cursor, stop sets, line loop
//!         ├── block.rs   # Start-of-line constructs
//!         ├── inline.rs  # Mid-line constructs
//!         └── attributes.rs
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use wikiweave_syntax::{Token, Tokenizer, TagName};
//!
//! let tokens = Tokenizer::default().tokenize("{{echo|hi}}", 0).unwrap();
//! assert_eq!(tokens[0].tag_name(), Some(&TagName::Template));
//! assert!(matches!(tokens.last(), Some(Token::EndOfInput(_))));
//! ```

pub mod lexer;
pub mod token;
pub mod tokenizer;

pub use token::{
    AttrValue, Attribute, CommentToken, DataEnvelope, Rank, Scratch, SourceRange, Syntax, Tag,
    TagName, TextToken, Token, TokenKind, strip_end_of_input, tokens_to_string,
};
pub use tokenizer::{
    AttrContext, Chunks, MemoConfig, MemoStats, NoMatch, Rule, StartRule, TokenizeError, Tokenizer,
};

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    /// One line per token: variant, tag name or text, source range.
    fn dump(tokens: &[Token]) -> String {
        tokens
            .iter()
            .map(|t| {
                let range = t.tsr().map_or("-".to_string(), |r| r.to_string());
                match t {
                    Token::TagOpen(tag) => format!("TagOpen {} @{range}", tag.name),
                    Token::TagClose(tag) => format!("TagClose {} @{range}", tag.name),
                    Token::SelfClose(tag) => format!("SelfClose {} @{range}", tag.name),
                    Token::Text(text) => format!("Text {:?} @{range}", text.value),
                    Token::Newline(_) => format!("Newline @{range}"),
                    Token::Comment(c) => format!("Comment {:?} @{range}", c.value),
                    Token::EndOfInput(_) => format!("EndOfInput @{range}"),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn snapshot_heading_and_list() {
        let tokens = Tokenizer::default()
            .tokenize("== Hi ==\n* a ''b''\n", 0)
            .unwrap();
        assert_snapshot!(dump(&tokens), @r#"
        TagOpen h2 @0..2
        Text " Hi " @2..6
        TagClose h2 @6..8
        Newline @8..9
        SelfClose listItem @9..10
        Text " a " @10..13
        SelfClose mw-quote @13..15
        Text "b" @15..16
        SelfClose mw-quote @16..18
        Newline @18..19
        EndOfInput @19..19
        "#);
    }

    #[test]
    fn snapshot_table_with_template_cell() {
        let tokens = Tokenizer::default()
            .tokenize("{| class=\"t\"\n! h\n|-\n| {{x}}\n|}", 0)
            .unwrap();
        assert_snapshot!(dump(&tokens), @r#"
        TagOpen table @0..12
        Newline @12..13
        TagOpen th @13..14
        Text " h" @14..16
        Newline @16..17
        TagOpen tr @17..19
        Newline @19..20
        TagOpen td @20..21
        Text " " @21..22
        SelfClose template @22..27
        Newline @27..28
        TagClose table @28..30
        EndOfInput @30..30
        "#);
    }

    #[test]
    fn source_ranges_are_ordered_and_cover_the_input() {
        let src = "a [[b|c]] {{d|e=f}} <span>g</span>\n\n'''h'''";
        let tokens = Tokenizer::default().tokenize(src, 0).unwrap();
        let mut cursor = 0;
        for token in &tokens {
            let range = token.tsr().unwrap();
            assert_eq!(range.start, cursor, "gap before {token:?}");
            cursor = range.end;
        }
        assert_eq!(cursor, src.len());
    }
}
