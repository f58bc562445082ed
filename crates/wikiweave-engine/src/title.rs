//! Title normalization: the canonical names used as fetch and cache keys.

use regex::Regex;
use std::sync::OnceLock;

use crate::settings::SiteConfig;

/// A normalized page title.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Title {
    pub namespace: i32,
    /// Title without the namespace, spaces as underscores.
    pub key: String,
    /// `Namespace:Key`, or just the key in the main namespace.
    pub prefixed: String,
    pub fragment: Option<String>,
}

impl Title {
    /// Relative link target for this title.
    pub fn href(&self) -> String {
        format!("./{}", self.prefixed)
    }

    /// Human-readable prefixed title.
    pub fn text(&self) -> String {
        self.prefixed.replace('_', " ")
    }

    /// Human-readable title without the namespace.
    pub fn key_text(&self) -> String {
        self.key.replace('_', " ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidTitle {
    #[error("Empty title")]
    Empty,
    #[error("Title {title:?} contains illegal character {ch:?}")]
    IllegalCharacter { title: String, ch: char },
}

/// Turns raw link and template targets into canonical titles.
pub trait TitleResolver {
    fn resolve(&self, raw: &str, default_namespace: i32) -> Result<Title, InvalidTitle>;
}

/// MediaWiki-style normalization against the namespaces of a [`SiteConfig`].
#[derive(Debug, Clone)]
pub struct WikiTitleResolver {
    site: SiteConfig,
}

impl WikiTitleResolver {
    pub fn new(site: SiteConfig) -> Self {
        Self { site }
    }
}

fn collapse_whitespace(raw: &str) -> String {
    static SPACES: OnceLock<Regex> = OnceLock::new();
    let re = SPACES.get_or_init(|| Regex::new(r"[ _\t]+").expect("Invalid whitespace regex"));
    re.replace_all(raw, " ").trim().to_string()
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl TitleResolver for WikiTitleResolver {
    fn resolve(&self, raw: &str, default_namespace: i32) -> Result<Title, InvalidTitle> {
        let mut text = collapse_whitespace(raw);
        let mut namespace = default_namespace;
        if let Some(rest) = text.strip_prefix(':') {
            // A leading colon forces the main namespace.
            namespace = 0;
            text = rest.trim_start().to_string();
        }

        let (name, fragment) = match text.split_once('#') {
            Some((name, fragment)) => (name.trim_end().to_string(), Some(fragment.to_string())),
            None => (text, None),
        };

        if let Some(ch) = name
            .chars()
            .find(|c| matches!(c, '<' | '>' | '[' | ']' | '{' | '}' | '|') || c.is_control())
        {
            return Err(InvalidTitle::IllegalCharacter { title: name, ch });
        }

        let mut local = name.as_str();
        if let Some((prefix, rest)) = name.split_once(':')
            && let Some(id) = self.site.namespace_id(prefix)
        {
            namespace = id;
            local = rest.trim_start();
        }
        if local.is_empty() {
            return Err(InvalidTitle::Empty);
        }

        let key = upper_first(local).replace(' ', "_");
        let prefixed = match self.site.namespace_name(namespace) {
            Some(ns) if !ns.is_empty() => format!("{ns}:{key}"),
            _ => key.clone(),
        };
        Ok(Title {
            namespace,
            key,
            prefixed,
            fragment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::TEMPLATE_NAMESPACE;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn resolver() -> WikiTitleResolver {
        WikiTitleResolver::new(SiteConfig::default())
    }

    #[rstest]
    #[case("foo bar", 0, "Foo_bar")]
    #[case("  template:echo  ", 0, "Template:Echo")]
    #[case("Template:Echo", TEMPLATE_NAMESPACE, "Template:Echo")]
    #[case("echo", TEMPLATE_NAMESPACE, "Template:Echo")]
    #[case(":Main page", TEMPLATE_NAMESPACE, "Main_page")]
    #[case("image:Cat.jpg", 0, "File:Cat.jpg")]
    #[case("a__b   c", 0, "A_b_c")]
    #[case("Unknown:thing", 0, "Unknown:thing")]
    fn normalizes(#[case] raw: &str, #[case] ns: i32, #[case] expected: &str) {
        assert_eq!(resolver().resolve(raw, ns).unwrap().prefixed, expected);
    }

    #[test]
    fn keeps_fragment_separately() {
        let title = resolver().resolve("Foo#Section two", 0).unwrap();
        assert_eq!(title.prefixed, "Foo");
        assert_eq!(title.fragment.as_deref(), Some("Section two"));
        assert_eq!(title.href(), "./Foo");
    }

    #[rstest]
    #[case("a|b")]
    #[case("a{b")]
    #[case("x<y>")]
    fn rejects_illegal_characters(#[case] raw: &str) {
        assert!(matches!(
            resolver().resolve(raw, 0),
            Err(InvalidTitle::IllegalCharacter { .. })
        ));
    }

    #[test]
    fn rejects_empty_titles() {
        assert_eq!(resolver().resolve("  ", 0), Err(InvalidTitle::Empty));
        assert_eq!(resolver().resolve("Template:", 0), Err(InvalidTitle::Empty));
    }
}
