use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use super::{ContentFetcher, FetchError, LocalFuture, PageSource};

/// Pages stored as files: `Template:Echo` lives at `<root>/Template/Echo.wiki`,
/// a main-namespace page at `<root>/<Name>.wiki`.
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for a canonical name, or `None` if the name would leave
    /// the root directory.
    pub fn path_for(&self, name: &str) -> Option<PathBuf> {
        let relative = match name.split_once(':') {
            Some((namespace, rest)) => Path::new(namespace).join(format!("{rest}.wiki")),
            None => PathBuf::from(format!("{name}.wiki")),
        };
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        (!escapes).then(|| self.root.join(relative))
    }
}

impl ContentFetcher for DirectoryFetcher {
    fn fetch<'a>(
        &'a self,
        name: &'a str,
        revision: Option<u64>,
    ) -> LocalFuture<'a, Result<PageSource, FetchError>> {
        Box::pin(async move {
            let Some(path) = self.path_for(name) else {
                return Err(FetchError::AccessDenied(name.to_string()));
            };
            log::debug!("Reading {name} from {}", path.display());
            match std::fs::read_to_string(&path) {
                Ok(source) => Ok(PageSource {
                    title: name.to_string(),
                    revision,
                    source,
                }),
                Err(err) => Err(match err.kind() {
                    ErrorKind::NotFound => FetchError::NotFound(name.to_string()),
                    ErrorKind::PermissionDenied => FetchError::AccessDenied(name.to_string()),
                    _ => FetchError::Transport(err.to_string()),
                }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test(flavor = "current_thread")]
    async fn reads_namespaced_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Template")).unwrap();
        fs::write(dir.path().join("Template/Echo.wiki"), "{{{1}}}").unwrap();

        let fetcher = DirectoryFetcher::new(dir.path());
        let page = fetcher.fetch("Template:Echo", None).await.unwrap();
        assert_eq!(page.source, "{{{1}}}");
        assert_eq!(page.title, "Template:Echo");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let fetcher = DirectoryFetcher::new(dir.path());
        assert_eq!(
            fetcher.fetch("Template:Nope", None).await,
            Err(FetchError::NotFound("Template:Nope".into()))
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn parent_components_are_refused() {
        let dir = TempDir::new().unwrap();
        let fetcher = DirectoryFetcher::new(dir.path());
        assert!(matches!(
            fetcher.fetch("Template:../../etc/passwd", None).await,
            Err(FetchError::AccessDenied(_))
        ));
    }
}
