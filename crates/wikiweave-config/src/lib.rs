use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid setting in {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

/// Parser knobs as written in the `[parser]` table. Durations are in
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub fetch_templates: bool,
    pub max_retries: u32,
    pub fetch_timeout_ms: u64,
    pub backoff_ms: u64,
    pub max_depth: usize,
    pub wrap_templates: bool,
    pub max_pooled_pipelines: usize,
    pub memo_max_entries: usize,
    pub memo_visit_threshold: u32,
}

impl ParserConfig {
    /// Settings the engine cannot run with.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.max_depth == 0 {
            problems.push("max_depth must be at least 1".to_string());
        }
        if self.fetch_templates && self.fetch_timeout_ms == 0 {
            problems.push("fetch_timeout_ms must be positive when fetching".to_string());
        }
        if self.memo_max_entries > 0 && self.memo_visit_threshold == 0 {
            problems.push("memo_visit_threshold must be at least 1".to_string());
        }
        problems
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            fetch_templates: true,
            max_retries: 3,
            fetch_timeout_ms: 5000,
            backoff_ms: 100,
            max_depth: 40,
            wrap_templates: true,
            max_pooled_pipelines: 100,
            memo_max_entries: 10_000,
            memo_visit_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding one `.wiki` file per template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_path: Option<PathBuf>,
    #[serde(default = "default_page_title")]
    pub page_title: String,
    #[serde(default)]
    pub parser: ParserConfig,
}

fn default_page_title() -> String {
    "Main Page".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            templates_path: None,
            page_title: default_page_title(),
            parser: ParserConfig::default(),
        }
    }
}

impl Config {
    /// `Ok(None)` when there is no file at `path`.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Option<Self>, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(reason) = config.parser.problems().into_iter().next() {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                reason,
            });
        }

        if let Some(templates) = config.templates_path.take() {
            config.templates_path = Some(Self::expand_path(&templates).unwrap_or(templates));
        }
        log::debug!("Loaded config from {}", path.display());

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        Self::load_from_path(Self::config_path())
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to_path(Self::config_path())
    }

    pub fn config_path() -> PathBuf {
        PathBuf::from(shellexpand::tilde("~/.config/wikiweave/config.toml").as_ref())
    }

    /// Tilde and `$VAR` expansion; `None` when a variable is unset.
    fn expand_path(path: &Path) -> Option<PathBuf> {
        let raw = path.to_string_lossy();
        let expanded = shellexpand::full(&raw).ok()?;
        Some(PathBuf::from(expanded.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_config_path() {
        let path = Config::config_path().to_string_lossy().into_owned();
        assert!(!path.starts_with('~'), "{path}");
        assert!(path.ends_with(".config/wikiweave/config.toml"), "{path}");
    }

    #[test]
    fn test_missing_sections_take_defaults() {
        let config: Config = toml::from_str(
            r#"
[parser]
max_depth = 5
"#,
        )
        .unwrap();

        assert_eq!(config.templates_path, None);
        assert_eq!(config.page_title, "Main Page");
        assert_eq!(config.parser.max_depth, 5);
        assert_eq!(config.parser.fetch_timeout_ms, 5000);
        assert!(config.parser.wrap_templates);
    }

    #[test]
    fn test_full_config() {
        let config: Config = toml::from_str(
            r#"
templates_path = "/srv/wiki/templates"
page_title = "Sandbox"

[parser]
fetch_templates = false
max_retries = 1
fetch_timeout_ms = 250
backoff_ms = 10
max_depth = 8
wrap_templates = false
max_pooled_pipelines = 4
memo_max_entries = 500
memo_visit_threshold = 3
"#,
        )
        .unwrap();

        assert_eq!(
            config.templates_path,
            Some(PathBuf::from("/srv/wiki/templates"))
        );
        assert_eq!(
            config.parser,
            ParserConfig {
                fetch_templates: false,
                max_retries: 1,
                fetch_timeout_ms: 250,
                backoff_ms: 10,
                max_depth: 8,
                wrap_templates: false,
                max_pooled_pipelines: 4,
                memo_max_entries: 500,
                memo_visit_threshold: 3,
            }
        );
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = Config::expand_path(&PathBuf::from("~/wiki/templates")).unwrap();

        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().ends_with("wiki/templates"));
    }

    #[test]
    fn test_templates_path_env_var_is_expanded_on_load() {
        unsafe {
            env::set_var("WIKIWEAVE_TEST_ROOT", "/custom/wiki");
        }
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        std::fs::write(
            &config_file,
            "templates_path = \"$WIKIWEAVE_TEST_ROOT/templates\"\n",
        )
        .unwrap();

        let config = Config::load_from_path(&config_file).unwrap().unwrap();
        assert_eq!(
            config.templates_path,
            Some(PathBuf::from("/custom/wiki/templates"))
        );

        unsafe {
            env::remove_var("WIKIWEAVE_TEST_ROOT");
        }
    }

    #[test]
    fn test_load_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let result = Config::load_from_path(temp_dir.path().join("nonexistent.toml")).unwrap();

        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        std::fs::write(&config_file, "[parser\nmax_depth = ").unwrap();

        let err = Config::load_from_path(&config_file).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_zero_depth_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        std::fs::write(&config_file, "[parser]\nmax_depth = 0\n").unwrap();

        let err = Config::load_from_path(&config_file).unwrap_err();
        match err {
            ConfigError::Invalid { reason, .. } => assert!(reason.contains("max_depth")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_defaults_have_no_problems() {
        assert!(ParserConfig::default().problems().is_empty());
        let no_fetch = ParserConfig {
            fetch_templates: false,
            fetch_timeout_ms: 0,
            ..ParserConfig::default()
        };
        assert!(no_fetch.problems().is_empty());
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("nested").join("config.toml");
        let config = Config {
            templates_path: Some(PathBuf::from("/tmp/templates")),
            page_title: "Test".to_string(),
            parser: ParserConfig {
                max_depth: 12,
                ..ParserConfig::default()
            },
        };

        config.save_to_path(&config_file).unwrap();
        let loaded = Config::load_from_path(&config_file).unwrap().unwrap();

        assert_eq!(loaded, config);
    }
}
