//! External collaborator traits (spec §6).
//!
//! The core never depends on a concrete LLM client, cache backend, or
//! file-format parser: each is an injected trait object, consumed through
//! `Box<dyn ...>` or a generic parameter. This module also ships one
//! reference implementation of each trait purely so the operational
//! binaries and integration tests can exercise the whole pipeline without a
//! real network call, mirroring the teacher's habit of shipping a usable
//! default beside a trait boundary (`srs_setup.rs`'s dev-SRS generator next
//! to the production path).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Result of a single chunk translation, returned by the injected
/// [`Translator`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranslationResult {
    /// Id of the chunk this result answers.
    pub chunk_id: String,
    /// Original (pre-translation) chunk text.
    pub source: String,
    /// Translated text.
    pub translated: String,
    /// Translation quality estimate in `[0, 1]`.
    pub quality_score: f64,
    /// Whether this result was served from a cache.
    pub from_cache: bool,
}

/// The translation callable the chunk processor drives (spec §6).
///
/// Responsible for prompt construction, token accounting, and any
/// provider-specific retry; the processor only adds the outer timeout and
/// retry budget.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate one chunk of text.
    async fn translate(
        &self,
        chunk_id: &str,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> anyhow::Result<TranslationResult>;
}

/// Optional translation cache (spec §6).
#[async_trait]
pub trait Cache: Send + Sync {
    /// Look up a previously translated source string.
    async fn get(&self, source: &str, src_lang: &str, tgt_lang: &str) -> Option<String>;
    /// Store a translation. Best-effort: failures must not propagate.
    async fn set(&self, source: &str, translated: &str, src_lang: &str, tgt_lang: &str);
    /// Look up a content-ADN cache entry by document hash.
    async fn get_adn(&self, doc_hash: &str) -> Option<String>;
    /// Store a content-ADN cache entry.
    async fn set_adn(&self, doc_hash: &str, value: &str);
    /// Clear all cache entries.
    async fn clear_all(&self);
    /// Evict expired entries; returns the number evicted.
    async fn cleanup_expired(&self) -> usize;
    /// Operational stats, free-form.
    async fn stats(&self) -> HashMap<String, usize>;
}

/// File-format reader/writer collaborator (spec §6).
///
/// Unknown extensions fall back to UTF-8 text, both for reading and (via
/// the renderer dispatch in `render`) for writing.
#[async_trait]
pub trait FileIo: Send + Sync {
    /// Read a PDF file and return its extracted text.
    async fn read_pdf(&self, path: &str) -> anyhow::Result<String>;
    /// Read a DOCX file and return its extracted text.
    async fn read_docx(&self, path: &str) -> anyhow::Result<String>;
}

/// A deterministic, offline [`Translator`] used by binaries and tests.
///
/// Simply prefixes each chunk with `"{target_lang}: "`, uppercasing nothing
/// and leaving placeholder tokens untouched (it never alters substrings it
/// didn't introduce), which makes it an "honest" mock for the preservation
/// properties in spec §8 (P3).
#[derive(Default)]
pub struct MockTranslator;

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(
        &self,
        chunk_id: &str,
        text: &str,
        _source_lang: &str,
        target_lang: &str,
    ) -> anyhow::Result<TranslationResult> {
        Ok(TranslationResult {
            chunk_id: chunk_id.to_string(),
            source: text.to_string(),
            translated: format!("{}: {}", target_lang.to_uppercase(), text),
            quality_score: 0.9,
            from_cache: false,
        })
    }
}

/// A [`Cache`] that never stores anything; every lookup misses.
#[derive(Default)]
pub struct NullCache;

#[async_trait]
impl Cache for NullCache {
    async fn get(&self, _source: &str, _src_lang: &str, _tgt_lang: &str) -> Option<String> {
        None
    }
    async fn set(&self, _source: &str, _translated: &str, _src_lang: &str, _tgt_lang: &str) {}
    async fn get_adn(&self, _doc_hash: &str) -> Option<String> {
        None
    }
    async fn set_adn(&self, _doc_hash: &str, _value: &str) {}
    async fn clear_all(&self) {}
    async fn cleanup_expired(&self) -> usize {
        0
    }
    async fn stats(&self) -> HashMap<String, usize> {
        HashMap::new()
    }
}

/// An in-memory [`Cache`] useful for tests and single-process runs.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, String>>,
    adn: Mutex<HashMap<String, String>>,
}

impl InMemoryCache {
    fn key(source: &str, src_lang: &str, tgt_lang: &str) -> String {
        format!("{src_lang}:{tgt_lang}:{source}")
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, source: &str, src_lang: &str, tgt_lang: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap()
            .get(&Self::key(source, src_lang, tgt_lang))
            .cloned()
    }

    async fn set(&self, source: &str, translated: &str, src_lang: &str, tgt_lang: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(Self::key(source, src_lang, tgt_lang), translated.to_string());
    }

    async fn get_adn(&self, doc_hash: &str) -> Option<String> {
        self.adn.lock().unwrap().get(doc_hash).cloned()
    }

    async fn set_adn(&self, doc_hash: &str, value: &str) {
        self.adn
            .lock()
            .unwrap()
            .insert(doc_hash.to_string(), value.to_string());
    }

    async fn clear_all(&self) {
        self.entries.lock().unwrap().clear();
        self.adn.lock().unwrap().clear();
    }

    async fn cleanup_expired(&self) -> usize {
        0
    }

    async fn stats(&self) -> HashMap<String, usize> {
        let mut m = HashMap::new();
        m.insert("entries".to_string(), self.entries.lock().unwrap().len());
        m.insert("adn_entries".to_string(), self.adn.lock().unwrap().len());
        m
    }
}

/// A [`FileIo`] that reads plain UTF-8 text regardless of extension, and
/// fails clearly for genuine PDF/DOCX binaries (those readers are an
/// external collaborator; nothing in this crate parses their formats).
#[derive(Default)]
pub struct FsFileIo;

#[async_trait]
impl FileIo for FsFileIo {
    async fn read_pdf(&self, path: &str) -> anyhow::Result<String> {
        Err(anyhow::anyhow!(
            "no PDF reader configured; cannot read {path}"
        ))
    }

    async fn read_docx(&self, path: &str) -> anyhow::Result<String> {
        Err(anyhow::anyhow!(
            "no DOCX reader configured; cannot read {path}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_translator_preserves_placeholder_tokens() {
        let t = MockTranslator;
        let r = t
            .translate("chunk_0", "See ⟪APS_FORMULA_0⟫ please.", "en", "vi")
            .await
            .unwrap();
        assert!(r.translated.contains("⟪APS_FORMULA_0⟫"));
    }

    #[tokio::test]
    async fn in_memory_cache_roundtrip() {
        let c = InMemoryCache::default();
        assert!(c.get("hello", "en", "vi").await.is_none());
        c.set("hello", "xin chao", "en", "vi").await;
        assert_eq!(c.get("hello", "en", "vi").await.as_deref(), Some("xin chao"));
    }
}
