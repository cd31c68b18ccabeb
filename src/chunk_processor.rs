//! Bounded-concurrency chunk processor (C3).
//!
//! Drives the injected [`Translator`](crate::interfaces::Translator) over a
//! list of chunks under a counting semaphore, with per-chunk timeout and
//! retry, checkpoint emission, and cooperative cancellation. Grounded on
//! `ChunkProcessor.process_all` / `process_with_checkpoint_resume`, with the
//! semaphore-gated fan-out idiom taken from `scheduler.rs`'s worker-pool
//! style.

use crate::chunker::Chunk;
use crate::interfaces::Translator;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Result of translating a single chunk (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChunkResult {
    /// Id of the chunk this result answers.
    pub chunk_id: String,
    /// Original (pre-translation) chunk text.
    pub original: String,
    /// Translated text, or a sentinel (`[TIMEOUT]`, `[ERROR]`,
    /// `[MISSING]`) on failure.
    pub translated: String,
    /// Translation quality estimate in `[0, 1]`; `0.0` on failure.
    pub quality_score: f64,
    /// Wall-clock duration of the call, milliseconds.
    pub duration_ms: f64,
    /// Whether this result was served from a cache.
    pub from_cache: bool,
    /// Error description, if any. `success ≡ error.is_none()`.
    pub error: Option<String>,
}

impl ChunkResult {
    /// Whether this chunk succeeded (`error.is_none()`).
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate processing statistics for a batch.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ProcessingStats {
    /// Total chunks processed.
    pub total_chunks: usize,
    /// Chunks with `success() == true`.
    pub successful: usize,
    /// Chunks with `success() == false`.
    pub failed: usize,
    /// Chunks served from cache.
    pub from_cache: usize,
    /// Sum of all chunk durations, milliseconds.
    pub total_duration_ms: f64,
    /// Mean quality score over successful chunks (0 when none).
    pub avg_quality: f64,
}

fn calculate_stats(results: &[ChunkResult]) -> ProcessingStats {
    let total_chunks = results.len();
    let successful = results.iter().filter(|r| r.success()).count();
    let failed = total_chunks - successful;
    let from_cache = results.iter().filter(|r| r.from_cache).count();
    let total_duration_ms = results.iter().map(|r| r.duration_ms).sum();
    let quality_sum: f64 = results
        .iter()
        .filter(|r| r.success())
        .map(|r| r.quality_score)
        .sum();
    let avg_quality = if successful > 0 {
        quality_sum / successful as f64
    } else {
        0.0
    };

    ProcessingStats {
        total_chunks,
        successful,
        failed,
        from_cache,
        total_duration_ms,
        avg_quality,
    }
}

/// Progress callback: `(completed, total, avg_quality)`.
pub type ProgressCb = Box<dyn Fn(usize, usize, f64) + Send + Sync>;
/// Checkpoint callback: `(chunk_id, result)`, invoked every
/// `checkpoint_interval` completions.
pub type CheckpointCb = Box<dyn Fn(&str, &ChunkResult) + Send + Sync>;

/// Bounded-concurrency translation runner (spec §4.3).
pub struct ChunkProcessor {
    translator: Arc<dyn Translator>,
    max_concurrency: usize,
    max_retries: u32,
    timeout: Duration,
    cancelled: Arc<AtomicBool>,
}

impl ChunkProcessor {
    /// Build a processor over the given translator and concurrency/retry/
    /// timeout knobs.
    pub fn new(
        translator: Arc<dyn Translator>,
        max_concurrency: usize,
        max_retries: u32,
        timeout: Duration,
    ) -> Self {
        ChunkProcessor {
            translator,
            max_concurrency: max_concurrency.max(1),
            max_retries,
            timeout,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Chunks not yet past the semaphore gate yield a
    /// `Cancelled` result; in-flight chunks run to completion or timeout.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Translate every chunk, respecting the concurrency gate, emitting
    /// progress/checkpoint callbacks, and never letting a single chunk's
    /// failure abort its siblings.
    pub async fn process_all(
        &self,
        chunks: &[Chunk],
        source_lang: &str,
        target_lang: &str,
        progress_cb: Option<ProgressCb>,
        checkpoint_cb: Option<CheckpointCb>,
        checkpoint_interval: usize,
    ) -> (Vec<ChunkResult>, ProcessingStats) {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let completed_count = Arc::new(Mutex::new(0usize));
        let total_quality = Arc::new(Mutex::new(0.0f64));
        let progress_cb = Arc::new(progress_cb);
        let checkpoint_cb = Arc::new(checkpoint_cb);
        let total = chunks.len();

        let mut tasks = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let chunk = chunk.clone();
            let translator = Arc::clone(&self.translator);
            let semaphore = Arc::clone(&semaphore);
            let cancelled = Arc::clone(&self.cancelled);
            let completed_count = Arc::clone(&completed_count);
            let total_quality = Arc::clone(&total_quality);
            let progress_cb = Arc::clone(&progress_cb);
            let checkpoint_cb = Arc::clone(&checkpoint_cb);
            let source_lang = source_lang.to_string();
            let target_lang = target_lang.to_string();
            let timeout = self.timeout;
            let max_retries = self.max_retries;

            tasks.push(tokio::spawn(async move {
                let cancelled_result = |chunk: &Chunk| ChunkResult {
                    chunk_id: chunk.id.clone(),
                    original: chunk.text.clone(),
                    translated: "[CANCELLED]".to_string(),
                    quality_score: 0.0,
                    duration_ms: 0.0,
                    from_cache: false,
                    error: Some("Cancelled".to_string()),
                };

                if cancelled.load(Ordering::SeqCst) {
                    return cancelled_result(&chunk);
                }

                let _permit = semaphore.acquire().await.expect("semaphore not closed");
                if cancelled.load(Ordering::SeqCst) {
                    return cancelled_result(&chunk);
                }
                let start = Instant::now();

                let mut attempt = 0u32;
                let result = loop {
                    if cancelled.load(Ordering::SeqCst) {
                        break Err(("[CANCELLED]".to_string(), "Cancelled".to_string()));
                    }
                    let call = translator.translate(&chunk.id, &chunk.text, &source_lang, &target_lang);
                    match tokio::time::timeout(timeout, call).await {
                        Ok(Ok(r)) => break Ok(r),
                        Ok(Err(e)) => {
                            if attempt < max_retries && !cancelled.load(Ordering::SeqCst) {
                                attempt += 1;
                                continue;
                            }
                            break Err(("[ERROR]".to_string(), e.to_string()));
                        }
                        Err(_) => {
                            if attempt < max_retries && !cancelled.load(Ordering::SeqCst) {
                                attempt += 1;
                                continue;
                            }
                            break Err((
                                "[TIMEOUT]".to_string(),
                                format!("Timeout after {}s", timeout.as_secs_f64()),
                            ));
                        }
                    }
                };

                let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

                let chunk_result = match result {
                    Ok(tr) => ChunkResult {
                        chunk_id: chunk.id.clone(),
                        original: chunk.text.clone(),
                        translated: tr.translated,
                        quality_score: tr.quality_score,
                        duration_ms,
                        from_cache: tr.from_cache,
                        error: None,
                    },
                    Err((sentinel, message)) => ChunkResult {
                        chunk_id: chunk.id.clone(),
                        original: chunk.text.clone(),
                        translated: sentinel,
                        quality_score: 0.0,
                        duration_ms,
                        from_cache: false,
                        error: Some(message),
                    },
                };

                let completed = {
                    let mut c = completed_count.lock().unwrap();
                    *c += 1;
                    if chunk_result.success() {
                        *total_quality.lock().unwrap() += chunk_result.quality_score;
                    }
                    *c
                };
                let avg_quality = {
                    let tq = *total_quality.lock().unwrap();
                    if completed > 0 {
                        tq / completed as f64
                    } else {
                        0.0
                    }
                };

                if let Some(cb) = progress_cb.as_ref() {
                    cb(completed, total, avg_quality);
                }
                if checkpoint_interval > 0 && completed % checkpoint_interval == 0 {
                    if let Some(cb) = checkpoint_cb.as_ref() {
                        cb(&chunk_result.chunk_id, &chunk_result);
                    }
                }

                chunk_result
            }));
        }

        let mut results = Vec::with_capacity(chunks.len());
        for (i, task) in tasks.into_iter().enumerate() {
            match task.await {
                Ok(r) => results.push(r),
                Err(join_err) => results.push(ChunkResult {
                    chunk_id: chunks[i].id.clone(),
                    original: chunks[i].text.clone(),
                    translated: "[ERROR]".to_string(),
                    quality_score: 0.0,
                    duration_ms: 0.0,
                    from_cache: false,
                    error: Some(join_err.to_string()),
                }),
            }
        }

        let stats = calculate_stats(&results);
        (results, stats)
    }

    /// Translate only chunks not already present in `completed_results`,
    /// then merge into the full, ordered result list. Missing chunks (no
    /// result available after the merge) are surfaced as failed results
    /// with the `[MISSING]` sentinel.
    pub async fn process_with_checkpoint_resume(
        &self,
        all_chunks: &[Chunk],
        completed_results: &HashMap<String, ChunkResult>,
        source_lang: &str,
        target_lang: &str,
        progress_cb: Option<ProgressCb>,
        checkpoint_cb: Option<CheckpointCb>,
        checkpoint_interval: usize,
    ) -> (Vec<ChunkResult>, ProcessingStats) {
        let pending: Vec<Chunk> = all_chunks
            .iter()
            .filter(|c| !completed_results.contains_key(&c.id))
            .cloned()
            .collect();

        let new_results: Vec<ChunkResult> = if pending.is_empty() {
            Vec::new()
        } else {
            let (results, _) = self
                .process_all(
                    &pending,
                    source_lang,
                    target_lang,
                    progress_cb,
                    checkpoint_cb,
                    checkpoint_interval,
                )
                .await;
            results
        };

        let new_lookup: HashMap<&str, &ChunkResult> =
            new_results.iter().map(|r| (r.chunk_id.as_str(), r)).collect();

        let merged: Vec<ChunkResult> = all_chunks
            .iter()
            .map(|c| {
                if let Some(r) = new_lookup.get(c.id.as_str()) {
                    (*r).clone()
                } else if let Some(r) = completed_results.get(&c.id) {
                    r.clone()
                } else {
                    ChunkResult {
                        chunk_id: c.id.clone(),
                        original: c.text.clone(),
                        translated: "[MISSING]".to_string(),
                        quality_score: 0.0,
                        duration_ms: 0.0,
                        from_cache: false,
                        error: Some("No result available".to_string()),
                    }
                }
            })
            .collect();

        let stats = calculate_stats(&merged);
        (merged, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::MockTranslator;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    fn mk_chunks(n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|i| Chunk {
                id: format!("chunk_{i}"),
                text: format!("paragraph {i}"),
                byte_range: (0, 0),
            })
            .collect()
    }

    #[tokio::test]
    async fn p1_order_preservation() {
        let proc = ChunkProcessor::new(Arc::new(MockTranslator), 3, 0, Duration::from_secs(5));
        let chunks = mk_chunks(10);
        let (results, _) = proc.process_all(&chunks, "en", "vi", None, None, 5).await;
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.chunk_id, format!("chunk_{i}"));
        }
    }

    struct FailOnIndex {
        index: String,
    }

    #[async_trait]
    impl Translator for FailOnIndex {
        async fn translate(
            &self,
            chunk_id: &str,
            text: &str,
            _src: &str,
            tgt: &str,
        ) -> anyhow::Result<crate::interfaces::TranslationResult> {
            if chunk_id == self.index {
                anyhow::bail!("boom");
            }
            Ok(crate::interfaces::TranslationResult {
                chunk_id: chunk_id.to_string(),
                source: text.to_string(),
                translated: format!("{tgt}: {text}"),
                quality_score: 0.8,
                from_cache: false,
            })
        }
    }

    #[tokio::test]
    async fn s5_one_failure_others_succeed() {
        let proc = ChunkProcessor::new(
            Arc::new(FailOnIndex {
                index: "chunk_1".to_string(),
            }),
            5,
            0,
            Duration::from_secs(5),
        );
        let chunks = mk_chunks(5);
        let (results, stats) = proc.process_all(&chunks, "en", "vi", None, None, 5).await;
        assert_eq!(results.len(), 5);
        assert_eq!(stats.failed, 1);
        assert!(!results[1].success());
        assert!(results[0].success() && results[2].success());
    }

    struct SlowOnce {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Translator for SlowOnce {
        async fn translate(
            &self,
            chunk_id: &str,
            text: &str,
            _src: &str,
            tgt: &str,
        ) -> anyhow::Result<crate::interfaces::TranslationResult> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(crate::interfaces::TranslationResult {
                chunk_id: chunk_id.to_string(),
                source: text.to_string(),
                translated: format!("{tgt}: {text}"),
                quality_score: 0.8,
                from_cache: false,
            })
        }
    }

    #[tokio::test]
    async fn single_chunk_over_timeout_fails_others_succeed() {
        let proc = ChunkProcessor::new(
            Arc::new(SlowOnce {
                calls: AtomicUsize::new(0),
            }),
            1,
            0,
            Duration::from_millis(20),
        );
        let chunks = mk_chunks(3);
        let (results, stats) = proc.process_all(&chunks, "en", "vi", None, None, 5).await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.successful, 2);
        assert!(results[0].translated == "[TIMEOUT]");
    }

    #[tokio::test]
    async fn cancel_before_dispatch_marks_chunks_cancelled() {
        let proc = Arc::new(ChunkProcessor::new(Arc::new(MockTranslator), 3, 0, Duration::from_secs(5)));
        proc.cancel();
        let chunks = mk_chunks(4);
        let (results, stats) = proc.process_all(&chunks, "en", "vi", None, None, 5).await;
        assert_eq!(stats.failed, 4);
        assert!(results.iter().all(|r| r.translated == "[CANCELLED]"));
    }

    #[tokio::test]
    async fn empty_chunk_list_yields_empty_stats() {
        let proc = ChunkProcessor::new(Arc::new(MockTranslator), 3, 0, Duration::from_secs(5));
        let (results, stats) = proc.process_all(&[], "en", "vi", None, None, 5).await;
        assert!(results.is_empty());
        assert_eq!(stats.total_chunks, 0);
        assert_eq!(stats.avg_quality, 0.0);
    }

    #[tokio::test]
    async fn checkpoint_resume_merges_and_flags_missing() {
        let proc = ChunkProcessor::new(Arc::new(MockTranslator), 3, 0, Duration::from_secs(5));
        let chunks = mk_chunks(3);
        let mut completed = HashMap::new();
        completed.insert(
            "chunk_0".to_string(),
            ChunkResult {
                chunk_id: "chunk_0".to_string(),
                original: "paragraph 0".to_string(),
                translated: "VI: paragraph 0".to_string(),
                quality_score: 0.95,
                duration_ms: 1.0,
                from_cache: true,
                error: None,
            },
        );
        let (merged, _) = proc
            .process_with_checkpoint_resume(&chunks, &completed, "en", "vi", None, None, 5)
            .await;
        assert_eq!(merged.len(), 3);
        assert!(merged[0].from_cache);
        assert!(merged[1].success());
        assert!(merged[2].success());
    }
}
