//! # Token Model
//!
//! Tokens are the currency of the whole pipeline: the tokenizer emits them,
//! every transformer consumes and replaces them, and the tree builder turns
//! them into nodes.
//!
//! ## Immutability
//!
//! A token is never edited after a stage has emitted it. Transformers take
//! ownership of the token they are handed and return replacements. The only
//! field that changes on the way through the pipeline is the [`Rank`] stamp in
//! the [`DataEnvelope`], and that is done by building a new value with
//! [`Token::with_rank`].
//!
//! ## Source ranges
//!
//! Tokens read straight from the source carry a `tsr` ([`SourceRange`]) with
//! absolute byte offsets. Synthesized tokens (auto-closed tags, paragraph
//! wrappers, expansion markers) carry `tsr = None`, which is how every later
//! component tells "came from the source" apart from "made up by us".

use serde::{Serialize, Serializer};
use std::fmt;

/// A byte range `[start, end)` into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SourceRange {
    /// Inclusive start byte offset.
    pub start: usize,
    /// Exclusive end byte offset.
    pub end: usize,
}

impl SourceRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Returns the length in bytes. Uses saturating subtraction for safety.
    #[must_use]
    pub fn len(self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the range is empty (start >= end).
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// Move both ends forward by `offset` bytes.
    #[must_use]
    pub fn shifted(self, offset: usize) -> Self {
        Self::new(self.start + offset, self.end + offset)
    }

    #[must_use]
    pub fn contains(self, other: SourceRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Smallest range covering both.
    #[must_use]
    pub fn union(self, other: SourceRange) -> Self {
        Self::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Transformation priority stamped on tokens.
///
/// Stored in thousandths so the classic fractional ranks (`1.1`, `2.101`)
/// stay exact and totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Rank(u32);

impl Rank {
    pub const ZERO: Rank = Rank(0);

    pub const fn from_millis(millis: u32) -> Self {
        Rank(millis)
    }

    pub const fn millis(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.0 / 1000, self.0 % 1000)
    }
}

/// Name of a tag token.
///
/// The pseudo-tags the pipeline dispatches on are closed variants, so
/// handlers match on them exhaustively instead of comparing strings. Real
/// HTML and meta elements are `Element` with a lower-cased name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagName {
    Template,
    TemplateArg,
    Quote,
    ListItem,
    WikiLink,
    ExtLink,
    BehaviorSwitch,
    Element(String),
}

impl TagName {
    pub fn element(name: &str) -> Self {
        TagName::Element(name.to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        match self {
            TagName::Template => "template",
            TagName::TemplateArg => "templatearg",
            TagName::Quote => "mw-quote",
            TagName::ListItem => "listItem",
            TagName::WikiLink => "wikilink",
            TagName::ExtLink => "extlink",
            TagName::BehaviorSwitch => "behavior-switch",
            TagName::Element(name) => name,
        }
    }

    pub fn is_element(&self, name: &str) -> bool {
        matches!(self, TagName::Element(n) if n == name)
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TagName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Which wikitext (or HTML) syntax produced a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Syntax {
    Html,
    Row,
    Piped,
    Simple,
}

/// Transformer-private scratch data carried along with a token.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Scratch {
    /// Serialized argument dictionary of an expansion start marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tpl_arg_info: Option<String>,
    /// `data-mw` JSON describing attributes that were produced by expansion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded_attrs: Option<String>,
}

/// Provenance metadata attached to every token.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DataEnvelope {
    pub tsr: Option<SourceRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub auto_inserted_start: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub auto_inserted_end: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stx: Option<Syntax>,
    #[serde(skip)]
    pub rank: Option<Rank>,
    #[serde(skip)]
    pub tmp: Scratch,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl DataEnvelope {
    pub fn with_tsr(tsr: SourceRange) -> Self {
        Self {
            tsr: Some(tsr),
            ..Self::default()
        }
    }

    pub fn from_tsr(tsr: Option<SourceRange>) -> Self {
        Self {
            tsr,
            ..Self::default()
        }
    }
}

/// Attribute key or value: a plain string, or a token sequence when the
/// source contained markup (templates, links) inside the attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Str(String),
    Tokens(Vec<Token>),
}

impl AttrValue {
    pub fn is_empty(&self) -> bool {
        match self {
            AttrValue::Str(s) => s.is_empty(),
            AttrValue::Tokens(tokens) => tokens.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            AttrValue::Tokens(_) => None,
        }
    }

    /// Flatten to text, dropping markup (see [`tokens_to_string`]).
    pub fn to_plain_string(&self) -> String {
        match self {
            AttrValue::Str(s) => s.clone(),
            AttrValue::Tokens(tokens) => tokens_to_string(tokens),
        }
    }

    pub fn to_tokens(&self) -> Vec<Token> {
        match self {
            AttrValue::Str(s) if s.is_empty() => Vec::new(),
            AttrValue::Str(s) => vec![Token::text(s.clone(), None)],
            AttrValue::Tokens(tokens) => tokens.clone(),
        }
    }

    /// True when the value holds anything other than plain text.
    pub fn has_markup(&self) -> bool {
        match self {
            AttrValue::Str(_) => false,
            AttrValue::Tokens(tokens) => tokens.iter().any(|t| !matches!(t, Token::Text(_))),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<Vec<Token>> for AttrValue {
    fn from(value: Vec<Token>) -> Self {
        AttrValue::Tokens(value)
    }
}

/// One key/value pair on a tag.
///
/// `src_offsets` is `[key_start, key_end, value_start, value_end]` in
/// absolute source bytes, when the attribute came from the source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub key: AttrValue,
    pub value: AttrValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_offsets: Option<[usize; 4]>,
}

impl Attribute {
    pub fn new(key: impl Into<AttrValue>, value: impl Into<AttrValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            src_offsets: None,
        }
    }

    #[must_use]
    pub fn with_offsets(mut self, offsets: [usize; 4]) -> Self {
        self.src_offsets = Some(offsets);
        self
    }

    pub fn key_string(&self) -> String {
        self.key.to_plain_string()
    }
}

/// A structural token: open, close or self-closing tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub name: TagName,
    pub attribs: Vec<Attribute>,
    pub data: DataEnvelope,
}

impl Tag {
    pub fn new(name: TagName) -> Self {
        Self {
            name,
            attribs: Vec::new(),
            data: DataEnvelope::default(),
        }
    }

    pub fn element(name: &str) -> Self {
        Self::new(TagName::element(name))
    }

    #[must_use]
    pub fn with_attr(mut self, key: impl Into<AttrValue>, value: impl Into<AttrValue>) -> Self {
        self.attribs.push(Attribute::new(key, value));
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: DataEnvelope) -> Self {
        self.data = data;
        self
    }

    #[must_use]
    pub fn with_tsr(mut self, tsr: Option<SourceRange>) -> Self {
        self.data.tsr = tsr;
        self
    }

    /// First attribute whose (flattened, case-insensitive) key matches.
    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attribs
            .iter()
            .find(|a| a.key_string().trim().eq_ignore_ascii_case(key))
            .map(|a| &a.value)
    }

    pub fn attr_string(&self, key: &str) -> Option<String> {
        self.attr(key).map(AttrValue::to_plain_string)
    }

    /// Replace the value of an existing attribute or append a new one.
    pub fn set_attr(&mut self, key: &str, value: impl Into<AttrValue>) {
        let value = value.into();
        match self
            .attribs
            .iter_mut()
            .find(|a| a.key_string().trim().eq_ignore_ascii_case(key))
        {
            Some(existing) => existing.value = value,
            None => self.attribs.push(Attribute::new(key, value)),
        }
    }

    pub fn remove_attr(&mut self, key: &str) {
        self.attribs
            .retain(|a| !a.key_string().trim().eq_ignore_ascii_case(key));
    }

    /// Does the whitespace-separated `typeof` list contain `value`?
    pub fn has_type_of(&self, value: &str) -> bool {
        self.attr_string("typeof")
            .is_some_and(|t| t.split_whitespace().any(|v| v == value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextToken {
    pub value: String,
    pub data: DataEnvelope,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentToken {
    pub value: String,
    pub data: DataEnvelope,
}

/// A token in the stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Token {
    TagOpen(Tag),
    TagClose(Tag),
    SelfClose(Tag),
    Text(TextToken),
    Newline(DataEnvelope),
    Comment(CommentToken),
    EndOfInput(DataEnvelope),
}

/// Variant discriminant, used by token filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    TagOpen,
    TagClose,
    SelfClose,
    Text,
    Newline,
    Comment,
    EndOfInput,
}

impl Token {
    pub fn text(value: impl Into<String>, tsr: Option<SourceRange>) -> Self {
        Token::Text(TextToken {
            value: value.into(),
            data: DataEnvelope::from_tsr(tsr),
        })
    }

    pub fn newline(tsr: Option<SourceRange>) -> Self {
        Token::Newline(DataEnvelope::from_tsr(tsr))
    }

    pub fn comment(value: impl Into<String>, tsr: Option<SourceRange>) -> Self {
        Token::Comment(CommentToken {
            value: value.into(),
            data: DataEnvelope::from_tsr(tsr),
        })
    }

    pub fn end_of_input(tsr: Option<SourceRange>) -> Self {
        Token::EndOfInput(DataEnvelope::from_tsr(tsr))
    }

    pub fn kind(&self) -> TokenKind {
        match self {
            Token::TagOpen(_) => TokenKind::TagOpen,
            Token::TagClose(_) => TokenKind::TagClose,
            Token::SelfClose(_) => TokenKind::SelfClose,
            Token::Text(_) => TokenKind::Text,
            Token::Newline(_) => TokenKind::Newline,
            Token::Comment(_) => TokenKind::Comment,
            Token::EndOfInput(_) => TokenKind::EndOfInput,
        }
    }

    pub fn data(&self) -> &DataEnvelope {
        match self {
            Token::TagOpen(tag) | Token::TagClose(tag) | Token::SelfClose(tag) => &tag.data,
            Token::Text(text) => &text.data,
            Token::Comment(comment) => &comment.data,
            Token::Newline(data) | Token::EndOfInput(data) => data,
        }
    }

    pub fn data_mut(&mut self) -> &mut DataEnvelope {
        match self {
            Token::TagOpen(tag) | Token::TagClose(tag) | Token::SelfClose(tag) => &mut tag.data,
            Token::Text(text) => &mut text.data,
            Token::Comment(comment) => &mut comment.data,
            Token::Newline(data) | Token::EndOfInput(data) => data,
        }
    }

    pub fn tsr(&self) -> Option<SourceRange> {
        self.data().tsr
    }

    pub fn rank(&self) -> Option<Rank> {
        self.data().rank
    }

    #[must_use]
    pub fn with_rank(mut self, rank: Rank) -> Self {
        self.data_mut().rank = Some(rank);
        self
    }

    /// Drop source ranges from this token and any tokens nested in its
    /// attributes. Used when content is relayed from another source text.
    #[must_use]
    pub fn without_tsr(mut self) -> Self {
        self.data_mut().tsr = None;
        if let Token::TagOpen(tag) | Token::TagClose(tag) | Token::SelfClose(tag) = &mut self {
            for attr in &mut tag.attribs {
                attr.src_offsets = None;
                strip_value(&mut attr.key);
                strip_value(&mut attr.value);
            }
        }
        self
    }

    pub fn tag(&self) -> Option<&Tag> {
        match self {
            Token::TagOpen(tag) | Token::TagClose(tag) | Token::SelfClose(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn tag_name(&self) -> Option<&TagName> {
        self.tag().map(|t| &t.name)
    }

    /// Is this any tag variant of the named HTML element?
    pub fn is_element(&self, name: &str) -> bool {
        self.tag_name().is_some_and(|n| n.is_element(name))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Token::Text(text) => Some(&text.value),
            _ => None,
        }
    }
}

fn strip_value(value: &mut AttrValue) {
    if let AttrValue::Tokens(tokens) = value {
        let stripped = std::mem::take(tokens)
            .into_iter()
            .map(Token::without_tsr)
            .collect();
        *tokens = stripped;
    }
}

/// Flatten tokens to their text content.
///
/// Text and newlines contribute their characters, tags contribute their
/// original source (if they have one), comments and end-of-input nothing.
pub fn tokens_to_string(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Text(text) => out.push_str(&text.value),
            Token::Newline(_) => out.push('\n'),
            Token::TagOpen(tag) | Token::TagClose(tag) | Token::SelfClose(tag) => {
                if let Some(src) = &tag.data.src {
                    out.push_str(src);
                }
            }
            Token::Comment(_) | Token::EndOfInput(_) => {}
        }
    }
    out
}

/// Remove end-of-input markers from a token sequence.
pub fn strip_end_of_input(tokens: Vec<Token>) -> Vec<Token> {
    tokens
        .into_iter()
        .filter(|t| !matches!(t, Token::EndOfInput(_)))
        .collect()
}
