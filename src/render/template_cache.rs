//! Template cache: each named template is read once into a byte buffer at
//! startup; every render clones from the cached bytes rather than hitting
//! disk again (spec §4.10, §5 "no shared mutable state ... except the
//! template cache (read-mostly, built once)").

use crate::error::RenderError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The four named templates spec §4.10 requires.
pub const TEMPLATE_NAMES: &[&str] = &["book", "report", "academic", "default"];

/// Read-mostly cache of named template byte buffers, keyed by name
/// (`"book"`, `"report"`, `"academic"`, `"default"`).
#[derive(Debug, Default)]
pub struct TemplateCache {
    buffers: HashMap<String, Vec<u8>>,
}

impl TemplateCache {
    /// Load every template under `dir/base_<name>.docx` that exists;
    /// missing templates are simply absent from the cache (callers fall
    /// back to `"default"`, which is always present via
    /// [`TemplateCache::with_builtin_default`]).
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, RenderError> {
        let mut cache = TemplateCache::with_builtin_default();
        for name in TEMPLATE_NAMES {
            let path = template_path(dir.as_ref(), name);
            if path.exists() {
                let bytes = std::fs::read(&path)?;
                cache.buffers.insert(name.to_string(), bytes);
            }
        }
        Ok(cache)
    }

    /// A cache carrying only the built-in, empty-skeleton `"default"`
    /// template, for callers that have no template directory at all.
    pub fn with_builtin_default() -> Self {
        let mut buffers = HashMap::new();
        buffers.insert("default".to_string(), Vec::new());
        TemplateCache { buffers }
    }

    /// Fetch the cached bytes for `name`, falling back to `"default"`.
    pub fn get(&self, name: &str) -> Result<&[u8], RenderError> {
        self.buffers
            .get(name)
            .or_else(|| self.buffers.get("default"))
            .map(|v| v.as_slice())
            .ok_or_else(|| RenderError::TemplateMissing(name.to_string()))
    }

    /// Whether `name` has its own cached entry (not just the fallback).
    pub fn has(&self, name: &str) -> bool {
        self.buffers.contains_key(name)
    }
}

fn template_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("base_{name}.docx"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_default_is_always_present() {
        let cache = TemplateCache::with_builtin_default();
        assert!(cache.get("book").is_ok());
        assert!(cache.get("anything").is_ok());
    }

    #[test]
    fn loading_from_a_populated_dir_picks_up_named_templates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("base_book.docx"), b"fake-docx-bytes").unwrap();
        let cache = TemplateCache::load_from_dir(dir.path()).unwrap();
        assert!(cache.has("book"));
        assert_eq!(cache.get("book").unwrap(), b"fake-docx-bytes");
        assert!(!cache.has("report"));
    }
}
