//! Parser knobs and the host wiki's site configuration.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use wikiweave_syntax::MemoConfig;

/// Runtime settings for one [`crate::ParseContext`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParserSettings {
    /// When false, every template without a cached source renders a
    /// placeholder and no fetch is attempted.
    pub fetch_templates: bool,
    pub max_retries: u32,
    /// Timeout of the first fetch attempt; doubled on every retry.
    pub fetch_timeout: Duration,
    /// Pause before the first retry; doubled on every retry.
    pub backoff: Duration,
    /// Deepest frame allowed to start another expansion.
    pub max_depth: usize,
    /// Bracket top-level expansions with encapsulation markers.
    pub wrap_templates: bool,
    /// Idle pipelines kept per cache key.
    pub max_pooled_pipelines: usize,
    pub memo: MemoConfig,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            fetch_templates: true,
            max_retries: 3,
            fetch_timeout: Duration::from_millis(5000),
            backoff: Duration::from_millis(100),
            max_depth: 40,
            wrap_templates: true,
            max_pooled_pipelines: 100,
            memo: MemoConfig::default(),
        }
    }
}

/// A namespace: numeric id, canonical name and aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub id: i32,
    pub name: String,
    pub aliases: Vec<String>,
}

impl Namespace {
    fn new(id: i32, name: &str, aliases: &[&str]) -> Self {
        Self {
            id,
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }
}

pub const TEMPLATE_NAMESPACE: i32 = 10;
pub const CATEGORY_NAMESPACE: i32 = 14;
pub const FILE_NAMESPACE: i32 = 6;

/// Read-only description of the host wiki: magic-word aliases, declared
/// function hooks and namespace names.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    magic_words: HashMap<String, String>,
    function_hooks: HashSet<String>,
    namespaces: Vec<Namespace>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        let magic_words = [
            ("lc", "lc"),
            ("uc", "uc"),
            ("lcfirst", "lcfirst"),
            ("ucfirst", "ucfirst"),
            ("#if", "if"),
            ("#ifeq", "ifeq"),
            ("#switch", "switch"),
            ("#ifexpr", "ifexpr"),
            ("#expr", "expr"),
            ("#time", "time"),
            ("#invoke", "invoke"),
            ("#tag", "tag"),
            ("pagename", "pagename"),
            ("fullpagename", "fullpagename"),
            ("namespace", "namespace"),
            ("defaultsort", "defaultsort"),
            ("displaytitle", "displaytitle"),
            ("!", "!"),
        ]
        .into_iter()
        .map(|(alias, canonical)| (alias.to_string(), canonical.to_string()))
        .collect();

        let function_hooks = [
            "lc", "uc", "lcfirst", "ucfirst", "if", "ifeq", "switch", "ifexpr", "expr", "time",
            "invoke", "tag",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        let namespaces = vec![
            Namespace::new(-2, "Media", &[]),
            Namespace::new(-1, "Special", &[]),
            Namespace::new(0, "", &[]),
            Namespace::new(1, "Talk", &[]),
            Namespace::new(2, "User", &[]),
            Namespace::new(4, "Project", &[]),
            Namespace::new(FILE_NAMESPACE, "File", &["Image"]),
            Namespace::new(8, "MediaWiki", &[]),
            Namespace::new(TEMPLATE_NAMESPACE, "Template", &[]),
            Namespace::new(12, "Help", &[]),
            Namespace::new(CATEGORY_NAMESPACE, "Category", &[]),
        ];

        Self {
            magic_words,
            function_hooks,
            namespaces,
        }
    }
}

impl SiteConfig {
    /// Canonical name for a magic-word alias. Exact spelling first, then
    /// lower case.
    pub fn magic_word(&self, alias: &str) -> Option<&str> {
        self.magic_words
            .get(alias)
            .or_else(|| self.magic_words.get(&alias.to_lowercase()))
            .map(String::as_str)
    }

    pub fn is_function_hook(&self, name: &str) -> bool {
        self.function_hooks.contains(name)
    }

    #[must_use]
    pub fn with_magic_word(mut self, alias: &str, canonical: &str) -> Self {
        self.magic_words
            .insert(alias.to_string(), canonical.to_string());
        self
    }

    #[must_use]
    pub fn with_function_hook(mut self, name: &str) -> Self {
        self.function_hooks.insert(name.to_string());
        self
    }

    /// Namespace id for a name or alias, ignoring case and treating `_` as
    /// a space.
    pub fn namespace_id(&self, name: &str) -> Option<i32> {
        let wanted = name.replace('_', " ").trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        self.namespaces
            .iter()
            .find(|ns| {
                ns.name.to_lowercase() == wanted
                    || ns.aliases.iter().any(|a| a.to_lowercase() == wanted)
            })
            .map(|ns| ns.id)
    }

    pub fn namespace_name(&self, id: i32) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|ns| ns.id == id)
            .map(|ns| ns.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("#if", Some("if"))]
    #[case("LC", Some("lc"))]
    #[case("PAGENAME", Some("pagename"))]
    #[case("echo", None)]
    fn magic_word_lookup(#[case] alias: &str, #[case] expected: Option<&str>) {
        assert_eq!(SiteConfig::default().magic_word(alias), expected);
    }

    #[rstest]
    #[case("Template", Some(10))]
    #[case("image", Some(6))]
    #[case("help_talk", None)]
    #[case("", None)]
    fn namespace_lookup(#[case] name: &str, #[case] expected: Option<i32>) {
        assert_eq!(SiteConfig::default().namespace_id(name), expected);
    }

    #[test]
    fn custom_hooks_extend_defaults() {
        let site = SiteConfig::default()
            .with_magic_word("#len", "len")
            .with_function_hook("len");
        assert_eq!(site.magic_word("#len"), Some("len"));
        assert!(site.is_function_hook("len"));
        assert!(site.is_function_hook("invoke"));
    }
}
