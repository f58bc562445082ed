use anyhow::{Context, Result, bail};
use std::{
    env,
    path::{Path, PathBuf},
    process,
    rc::Rc,
    time::Duration,
};
use wikiweave_config::{Config, ParserConfig};
use wikiweave_engine::{
    ContentFetcher, DirectoryFetcher, MemoryFetcher, ParseContext, ParserSettings, body_html,
    parse_blocking,
};
use wikiweave_syntax::MemoConfig;

fn settings_from(config: &ParserConfig) -> ParserSettings {
    ParserSettings {
        fetch_templates: config.fetch_templates,
        max_retries: config.max_retries,
        fetch_timeout: Duration::from_millis(config.fetch_timeout_ms),
        backoff: Duration::from_millis(config.backoff_ms),
        max_depth: config.max_depth,
        wrap_templates: config.wrap_templates,
        max_pooled_pipelines: config.max_pooled_pipelines,
        memo: MemoConfig {
            max_entries: config.memo_max_entries,
            visit_threshold: config.memo_visit_threshold,
        },
    }
}

/// Templates come from a directory when one is known; otherwise every
/// template is missing.
fn fetcher_for(templates: Option<PathBuf>) -> Result<Rc<dyn ContentFetcher>> {
    match templates {
        Some(dir) => {
            if !dir.is_dir() {
                bail!("templates path '{}' is not a directory", dir.display());
            }
            log::info!("Reading templates from {}", dir.display());
            Ok(Rc::new(DirectoryFetcher::new(dir)))
        }
        None => {
            log::info!("No templates directory configured");
            Ok(Rc::new(MemoryFetcher::new()))
        }
    }
}

fn render(input: &Path, templates: Option<PathBuf>, config: &Config) -> Result<String> {
    let source = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let cx = Rc::new(ParseContext::new(
        settings_from(&config.parser),
        fetcher_for(templates)?,
    ));
    let document = parse_blocking(&cx, &config.page_title, &source)
        .with_context(|| format!("Failed to parse {}", input.display()))?;
    Ok(body_html(&document))
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <input.wiki> [templates-dir]", args[0]);
        process::exit(1);
    }

    let config = match Config::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: Failed to load config file: {e}");
            process::exit(1);
        }
    };
    log::debug!("Config path: {}", Config::config_path().display());

    let templates = args
        .get(2)
        .map(PathBuf::from)
        .or_else(|| config.templates_path.clone());
    let html = render(Path::new(&args[1]), templates, &config)?;
    println!("{html}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_settings_follow_the_config() {
        let config = ParserConfig {
            fetch_timeout_ms: 250,
            max_depth: 7,
            wrap_templates: false,
            memo_max_entries: 0,
            ..ParserConfig::default()
        };
        let settings = settings_from(&config);

        assert_eq!(settings.fetch_timeout, Duration::from_millis(250));
        assert_eq!(settings.max_depth, 7);
        assert!(!settings.wrap_templates);
        assert_eq!(settings.memo.max_entries, 0);
    }

    #[test]
    fn test_default_config_matches_engine_defaults() {
        assert_eq!(
            settings_from(&ParserConfig::default()),
            ParserSettings::default()
        );
    }

    #[test]
    fn test_render_with_template_directory() {
        let dir = TempDir::new().unwrap();
        let templates = dir.path().join("templates");
        std::fs::create_dir_all(templates.join("Template")).unwrap();
        std::fs::write(templates.join("Template").join("Greet.wiki"), "Hi {{{1}}}").unwrap();
        let input = dir.path().join("page.wiki");
        std::fs::write(&input, "{{greet|there}}").unwrap();

        let html = render(&input, Some(templates), &Config::default()).unwrap();
        assert!(html.contains("Hi there"), "{html}");
    }

    #[test]
    fn test_missing_templates_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(fetcher_for(Some(dir.path().join("nope"))).is_err());
    }
}
