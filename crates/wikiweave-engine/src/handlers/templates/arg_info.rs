//! The argument dictionary recorded on a transclusion's start marker, from
//! which the call's `data-mw` is later built.

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use wikiweave_syntax::{AttrValue, SourceRange, Tag, Token, tokens_to_string};

use crate::context::ParseContext;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetInfo {
    pub wt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyInfo {
    pub wt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamInfo {
    pub wt: String,
    /// Source of the key, when it differs from the normalized name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<KeyInfo>,
}

/// Parameters in call order; a repeated name keeps its first position and
/// its last value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap(Vec<(String, ParamInfo)>);

impl ParamMap {
    fn insert(&mut self, name: String, info: ParamInfo) {
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = info,
            None => self.0.push((name, info)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamInfo> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, info)| info)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ParamMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, info) in &self.0 {
            map.serialize_entry(name, info)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgInfo {
    pub target: TargetInfo,
    pub params: ParamMap,
}

/// Plain text of a key, or `None` when it holds markup.
fn key_text(key: &AttrValue) -> Option<String> {
    match key {
        AttrValue::Str(s) => Some(s.clone()),
        AttrValue::Tokens(tokens) => tokens
            .iter()
            .all(|t| matches!(t, Token::Text(_) | Token::Newline(_) | Token::Comment(_)))
            .then(|| tokens_to_string(tokens)),
    }
}

fn source_of(cx: &ParseContext, start: usize, end: usize) -> String {
    cx.page_slice(SourceRange::new(start, end))
}

/// Describe the call `tag` (a template token straight from the page).
pub fn describe(
    cx: &ParseContext,
    tag: &Tag,
    function: Option<String>,
    href: Option<String>,
) -> ArgInfo {
    let target_wt = match tag.attribs.first() {
        Some(attr) => match attr.src_offsets {
            Some([start, end, _, _]) => source_of(cx, start, end),
            None => attr.key_string(),
        },
        None => String::new(),
    };

    let mut params = ParamMap::default();
    let mut position = 0;
    for attr in tag.attribs.iter().skip(1) {
        let (key_src, value_src, positional) = match attr.src_offsets {
            Some([ks, ke, vs, ve]) => (
                source_of(cx, ks, ke),
                source_of(cx, vs, ve),
                attr.key.is_empty() && ke == vs,
            ),
            None => (
                attr.key_string(),
                attr.value.to_plain_string(),
                attr.key.is_empty(),
            ),
        };
        let key_wt = key_src.trim().to_string();
        let (name, info) = if positional {
            position += 1;
            (
                position.to_string(),
                ParamInfo {
                    wt: value_src,
                    key: None,
                },
            )
        } else {
            let name = key_text(&attr.key)
                .map(|k| k.trim().to_string())
                .unwrap_or_else(|| key_wt.clone());
            let key = (key_wt != name).then(|| KeyInfo { wt: key_wt });
            (
                name,
                ParamInfo {
                    wt: value_src.trim().to_string(),
                    key,
                },
            )
        };
        params.insert(name, info);
    }

    ArgInfo {
        target: TargetInfo {
            wt: target_wt,
            function,
            href,
        },
        params,
    }
}
