//! Ordered merge and STEM restoration of translated chunks (C4).
//!
//! Grounded on `ResultAggregator.aggregate` / `aggregate_with_stem_restore`:
//! chunk results are merged back into a single document in chunk-index
//! order regardless of completion order, placeholder tokens are restored,
//! and a small set of document-level stats is computed alongside.

use crate::chunk_processor::{ChunkResult, ProcessingStats};
use crate::stem::{self, PlaceholderMap, PlaceholderMatch, VerificationResult};
use serde::{Deserialize, Serialize};

/// Free-form bookkeeping carried alongside an [`AggregatedResult`],
/// mirroring `ResultAggregator.aggregate`'s `metadata` dict.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AggregationMetadata {
    /// Chunk ids that failed translation, in the order encountered.
    pub failed_chunk_ids: Vec<String>,
    /// Count of chunks served from cache.
    pub cache_hits: usize,
}

/// Merged document plus the stats describing how it was assembled.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AggregatedResult {
    /// Full merged text, in chunk-index order.
    pub merged_text: String,
    /// Character count of `merged_text`.
    pub total_chars: usize,
    /// Per-batch processing stats, copied through from C3.
    pub stats: ProcessingStats,
    /// Failed-chunk ids and cache-hit count.
    pub metadata: AggregationMetadata,
    /// STEM restoration report, present only when a [`PlaceholderMap`] was
    /// supplied to [`aggregate_with_stem_restore`].
    pub stem_verification: Option<VerificationResult>,
}

impl AggregatedResult {
    /// Fraction of chunks that succeeded, in `[0, 1]`. `1.0` for an empty
    /// batch.
    pub fn success_rate(&self) -> f64 {
        if self.stats.total_chunks == 0 {
            1.0
        } else {
            self.stats.successful as f64 / self.stats.total_chunks as f64
        }
    }
}

fn sort_by_chunk_index(results: &[ChunkResult]) -> Vec<&ChunkResult> {
    let mut sorted: Vec<&ChunkResult> = results.iter().collect();
    sorted.sort_by_key(|r| chunk_index_of(&r.chunk_id));
    sorted
}

fn chunk_index_of(chunk_id: &str) -> usize {
    chunk_id
        .rsplit('_')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(usize::MAX)
}

/// Merge chunk results in index order, separated by blank lines, without
/// touching any placeholder tokens. Failed chunks are included with a
/// `[Translation failed: <error>]` marker unless `include_failed` is false,
/// in which case they are dropped from the merged text entirely (their
/// counts still land in `stats`/`metadata`).
pub fn aggregate(results: &[ChunkResult], stats: ProcessingStats, include_failed: bool) -> AggregatedResult {
    let ordered = sort_by_chunk_index(results);

    let mut texts = Vec::with_capacity(ordered.len());
    let mut failed_chunk_ids = Vec::new();
    let mut cache_hits = 0usize;
    for r in &ordered {
        if r.success() {
            texts.push(r.translated.clone());
        } else {
            failed_chunk_ids.push(r.chunk_id.clone());
            if include_failed {
                let error = r.error.as_deref().unwrap_or("unknown error");
                texts.push(format!("[Translation failed: {error}]"));
            }
        }
        if r.from_cache {
            cache_hits += 1;
        }
    }
    let merged_text = texts.join("\n\n");
    let total_chars = merged_text.chars().count();

    AggregatedResult {
        total_chars,
        merged_text,
        stats,
        metadata: AggregationMetadata {
            failed_chunk_ids,
            cache_hits,
        },
        stem_verification: None,
    }
}

/// Merge chunk results in index order and then restore STEM placeholder
/// tokens against `map`, attaching a verification report.
pub fn aggregate_with_stem_restore(
    results: &[ChunkResult],
    stats: ProcessingStats,
    map: &PlaceholderMap,
    matches: &[PlaceholderMatch],
) -> AggregatedResult {
    let base = aggregate(results, stats, true);
    let restored = stem::restore(&base.merged_text, map);
    let verification = stem::verify(&restored, map, matches);
    let total_chars = restored.chars().count();

    AggregatedResult {
        merged_text: restored,
        total_chars,
        stats: base.stats,
        metadata: base.metadata,
        stem_verification: Some(verification),
    }
}

/// Merge a freshly-processed batch into a prior [`AggregatedResult`],
/// replacing any chunk ids the new batch also covers (used when a job
/// resumes from checkpoint and re-translates a subset of chunks).
pub fn merge_with_existing(
    existing: &AggregatedResult,
    new_results: &[ChunkResult],
    new_stats: ProcessingStats,
) -> AggregatedResult {
    let _ = existing;
    aggregate(new_results, new_stats, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_result(id: &str, text: &str) -> ChunkResult {
        ChunkResult {
            chunk_id: id.to_string(),
            original: text.to_string(),
            translated: text.to_string(),
            quality_score: 0.9,
            duration_ms: 1.0,
            from_cache: false,
            error: None,
        }
    }

    fn failed_result(id: &str) -> ChunkResult {
        ChunkResult {
            chunk_id: id.to_string(),
            original: String::new(),
            translated: "[ERROR]".to_string(),
            quality_score: 0.0,
            duration_ms: 1.0,
            from_cache: false,
            error: Some("boom".to_string()),
        }
    }

    #[test]
    fn merges_out_of_order_results_by_chunk_index() {
        let results = vec![ok_result("chunk_2", "c"), ok_result("chunk_0", "a"), ok_result("chunk_1", "b")];
        let stats = ProcessingStats {
            total_chunks: 3,
            successful: 3,
            ..Default::default()
        };
        let agg = aggregate(&results, stats, true);
        assert_eq!(agg.merged_text, "a\n\nb\n\nc");
    }

    #[test]
    fn success_rate_accounts_for_failures() {
        let results = vec![ok_result("chunk_0", "a"), failed_result("chunk_1")];
        let stats = ProcessingStats {
            total_chunks: 2,
            successful: 1,
            failed: 1,
            ..Default::default()
        };
        let agg = aggregate(&results, stats, true);
        assert_eq!(agg.success_rate(), 0.5);
    }

    #[test]
    fn failed_chunk_gets_error_marker_by_default() {
        let results = vec![ok_result("chunk_0", "a"), failed_result("chunk_1")];
        let stats = ProcessingStats {
            total_chunks: 2,
            successful: 1,
            failed: 1,
            ..Default::default()
        };
        let agg = aggregate(&results, stats, true);
        assert_eq!(agg.merged_text, "a\n\n[Translation failed: boom]");
        assert_eq!(agg.metadata.failed_chunk_ids, vec!["chunk_1".to_string()]);
        assert_eq!(agg.total_chars, agg.merged_text.chars().count());
    }

    #[test]
    fn include_failed_false_drops_failed_chunks_from_text() {
        let results = vec![ok_result("chunk_0", "a"), failed_result("chunk_1")];
        let stats = ProcessingStats {
            total_chunks: 2,
            successful: 1,
            failed: 1,
            ..Default::default()
        };
        let agg = aggregate(&results, stats, false);
        assert_eq!(agg.merged_text, "a");
        assert_eq!(agg.metadata.failed_chunk_ids, vec!["chunk_1".to_string()]);
    }

    #[test]
    fn empty_batch_has_success_rate_one() {
        let agg = aggregate(&[], ProcessingStats::default(), true);
        assert_eq!(agg.success_rate(), 1.0);
        assert_eq!(agg.merged_text, "");
        assert_eq!(agg.total_chars, 0);
    }

    #[test]
    fn stem_restore_merges_and_reports_verification() {
        let (rewritten, map, matches) = stem::preprocess("See $E=mc^2$ now.");
        let results = vec![ok_result("chunk_0", &rewritten)];
        let stats = ProcessingStats {
            total_chunks: 1,
            successful: 1,
            ..Default::default()
        };
        let agg = aggregate_with_stem_restore(&results, stats, &map, &matches);
        assert!(agg.merged_text.contains("$E=mc^2$"));
        assert_eq!(agg.stem_verification.unwrap().formula_preservation_rate, 1.0);
    }
}
