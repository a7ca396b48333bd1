//! Template loaders.
//!
//! A [`Loader`] supplies named partial templates on demand, with both
//! blocking and suspension-capable retrieval and an up-to-date check.
//! Caching sits outside this contract.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;

use crate::error::TemplateError;
use crate::tokenizer::Span;

/// The source text of a loaded template, plus an opaque version used by
/// [`Loader::is_up_to_date`].
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSource {
    pub name: String,
    pub source: String,
    pub version: Option<u64>,
}

#[async_trait]
pub trait Loader: Send + Sync + std::fmt::Debug {
    /// Fetch the named template, blocking.
    fn load(&self, name: &str) -> Result<TemplateSource, TemplateError>;

    /// Fetch the named template, suspending while the backing store is
    /// consulted.
    async fn load_async(&self, name: &str) -> Result<TemplateSource, TemplateError> {
        self.load(name)
    }

    /// True if `source` still matches what [`Loader::load`] would return.
    fn is_up_to_date(&self, source: &TemplateSource) -> bool {
        match self.load(&source.name) {
            Ok(current) => current.version == source.version,
            Err(_) => false,
        }
    }
}

fn not_found(name: &str) -> TemplateError {
    TemplateError::NotFound {
        name: name.to_string(),
        span: Span::default(),
    }
}

/// A loader over an in-memory name-to-source map. Revisions bump on every
/// insert, so `is_up_to_date` notices replaced templates.
#[derive(Debug, Default)]
pub struct InMemoryLoader {
    templates: RwLock<HashMap<String, (String, u64)>>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a named template.
    pub fn add(&self, name: impl Into<String>, source: impl Into<String>) {
        let mut templates = self.templates.write().expect("loader lock poisoned");
        let name = name.into();
        let revision = templates.get(&name).map(|(_, r)| r + 1).unwrap_or(0);
        templates.insert(name, (source.into(), revision));
    }

    pub fn with(self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.add(name, source);
        self
    }
}

#[async_trait]
impl Loader for InMemoryLoader {
    fn load(&self, name: &str) -> Result<TemplateSource, TemplateError> {
        let templates = self.templates.read().expect("loader lock poisoned");
        templates
            .get(name)
            .map(|(source, revision)| TemplateSource {
                name: name.to_string(),
                source: source.clone(),
                version: Some(*revision),
            })
            .ok_or_else(|| not_found(name))
    }
}

/// A loader reading templates from files under a root directory.
#[derive(Debug)]
pub struct FileSystemLoader {
    root: PathBuf,
}

impl FileSystemLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Reject names that escape the root.
    fn resolve(&self, name: &str) -> Result<PathBuf, TemplateError> {
        let path = std::path::Path::new(name);
        if path.is_absolute()
            || path
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(not_found(name));
        }
        Ok(self.root.join(path))
    }
}

fn mtime_version(metadata: &std::fs::Metadata) -> Option<u64> {
    metadata
        .modified()
        .ok()
        .and_then(|mtime| mtime.duration_since(UNIX_EPOCH).ok())
        .map(|elapsed| elapsed.as_nanos() as u64)
}

#[async_trait]
impl Loader for FileSystemLoader {
    fn load(&self, name: &str) -> Result<TemplateSource, TemplateError> {
        let path = self.resolve(name)?;
        let source = std::fs::read_to_string(&path).map_err(|_| not_found(name))?;
        let version = std::fs::metadata(&path).ok().and_then(|m| mtime_version(&m));
        Ok(TemplateSource {
            name: name.to_string(),
            source,
            version,
        })
    }

    async fn load_async(&self, name: &str) -> Result<TemplateSource, TemplateError> {
        let path = self.resolve(name)?;
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| not_found(name))?;
        let version = tokio::fs::metadata(&path)
            .await
            .ok()
            .and_then(|m| mtime_version(&m));
        Ok(TemplateSource {
            name: name.to_string(),
            source,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_in_memory_load_and_versioning() {
        let loader = InMemoryLoader::new().with("a", "first");
        let source = loader.load("a").unwrap();
        assert_eq!(source.source, "first");
        assert!(loader.is_up_to_date(&source));

        loader.add("a", "second");
        assert!(!loader.is_up_to_date(&source));
        assert_eq!(loader.load("a").unwrap().source, "second");
    }

    #[test]
    fn test_missing_template() {
        let loader = InMemoryLoader::new();
        assert!(matches!(
            loader.load("nope"),
            Err(TemplateError::NotFound { .. })
        ));
    }

    #[test]
    fn test_filesystem_loader_rejects_escapes() {
        let loader = FileSystemLoader::new("/tmp");
        assert!(loader.load("../etc/passwd").is_err());
        assert!(loader.load("/etc/passwd").is_err());
    }

    #[tokio::test]
    async fn test_filesystem_loader_sync_and_async_agree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.liquid"), "Hello").unwrap();
        let loader = FileSystemLoader::new(dir.path());

        let blocking = loader.load("page.liquid").unwrap();
        let suspending = loader.load_async("page.liquid").await.unwrap();
        assert_eq!(blocking, suspending);
        assert!(loader.is_up_to_date(&blocking));
    }
}
