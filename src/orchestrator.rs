//! Top-level pipeline orchestrator (C7).
//!
//! Drives a single job end to end through C1 (STEM codec), C2 (chunker),
//! C3 (chunk processor), C4 (aggregator), C12 (polisher) and C6 (job
//! handler), reporting progress through C5 and validating the translation
//! deliverable through C11 before export. Grounded on
//! `BatchOrchestrator._execute_pipeline`'s phase sequence; document-layout
//! stages (C8-C10) are driven separately by callers that need typeset
//! output, since many jobs (plain-text round trips, tests) never need them.

use crate::aggregator::{self, AggregatedResult};
use crate::chunk_processor::{ChunkProcessor, CheckpointCb, ChunkResult, ProgressCb};
use crate::chunker;
use crate::config::Config;
use crate::contracts::{BaseContract, ContractMetadata, ContractValidator, ManuscriptCoreOutput, ManuscriptStructure, QualityMetrics, Segment};
use crate::error::{IoStageError, JobError};
use crate::ids::JobId;
use crate::interfaces::Translator;
use crate::job::{JobHandler, JobState};
use crate::polish;
use crate::progress::ProgressTracker;
use crate::stem;
use std::sync::Arc;
use std::time::Duration;

/// Build the C11 deliverable contract for a completed batch, one segment
/// per chunk, in chunk order.
fn build_manuscript_contract(
    results: &[ChunkResult],
    source_lang: &str,
    target_lang: &str,
) -> ManuscriptCoreOutput {
    let segments: Vec<Segment> = results
        .iter()
        .map(|r| Segment {
            id: r.chunk_id.clone(),
            original_text: r.original.clone(),
            translated_text: r.translated.clone(),
            confidence: r.quality_score,
        })
        .collect();
    let overall_score = if segments.is_empty() {
        0.0
    } else {
        segments.iter().map(|s| s.confidence).sum::<f64>() / segments.len() as f64
    };

    let mut manuscript = ManuscriptCoreOutput {
        metadata: ContractMetadata::new("aps-core.orchestrator", "aps-core.export"),
        source_language: source_lang.to_string(),
        target_language: target_lang.to_string(),
        segments,
        quality: QualityMetrics { overall_score },
        structure: ManuscriptStructure::default(),
        adn: None,
        stem: std::collections::HashMap::new(),
    };
    let _ = manuscript.finalize_checksum();
    manuscript
}

/// Inputs to a single orchestrator run.
pub struct OrchestratorRequest {
    /// Source text to translate. Empty text with no alternate source is a
    /// hard [`IoStageError::NoInput`].
    pub text: String,
    /// BCP-47-ish source language tag.
    pub source_lang: String,
    /// BCP-47-ish target language tag.
    pub target_lang: String,
}

/// Outcome of a full orchestrator run.
pub struct OrchestratorResult {
    /// The job id this result answers.
    pub job_id: JobId,
    /// Final job state (`Completed` or `Failed`).
    pub final_state: JobState,
    /// Merged, STEM-restored translation, present on success.
    pub aggregated: Option<AggregatedResult>,
    /// Total wall-clock seconds for the run.
    pub elapsed_secs: f64,
}

/// Drives C1-C6 over one job under a [`Config`].
pub struct Orchestrator {
    config: Config,
    translator: Arc<dyn Translator>,
}

impl Orchestrator {
    /// Build an orchestrator over the given config and translator.
    pub fn new(config: Config, translator: Arc<dyn Translator>) -> Self {
        Orchestrator { config, translator }
    }

    /// Run a job end to end, reporting progress through `tracker` (if
    /// given) and returning a merged, placeholder-restored result on
    /// success. On any stage error the job handler transitions to
    /// `Failed`, progress is marked failed, and the error is returned.
    pub async fn run(
        &self,
        request: OrchestratorRequest,
        tracker: Option<Arc<ProgressTracker>>,
    ) -> Result<OrchestratorResult, JobError> {
        let job_id = JobId::generate();
        let mut handler = JobHandler::new(job_id.as_str(), self.config.max_retries_job);

        if let Some(t) = &tracker {
            t.set_job(job_id.as_str(), "");
            t.start();
        }

        let processor = Arc::new(ChunkProcessor::new(
            Arc::clone(&self.translator),
            self.config.max_concurrency,
            self.config.max_retries_chunk,
            Duration::from_secs_f64(self.config.chunk_timeout_secs),
        ));

        let run_future = self.execute_pipeline(&mut handler, &request, tracker.clone(), Arc::clone(&processor));
        let outcome = if self.config.job_timeout_secs > 0.0 {
            match tokio::time::timeout(
                Duration::from_secs_f64(self.config.job_timeout_secs),
                run_future,
            )
            .await
            {
                Ok(result) => result,
                Err(_) => {
                    // The job-wide timeout fired while chunk translations were
                    // still in flight; ask the processor to stop dispatching
                    // new attempts rather than leaving them running detached.
                    processor.cancel();
                    Err(JobError::Timeout(self.config.job_timeout_secs))
                }
            }
        } else {
            run_future.await
        };

        match outcome {
            Ok(aggregated) => {
                let _ = handler.complete();
                if let Some(t) = &tracker {
                    t.finish();
                }
                Ok(OrchestratorResult {
                    job_id,
                    final_state: handler.state(),
                    aggregated: Some(aggregated),
                    elapsed_secs: handler.timing().total_secs,
                })
            }
            Err(err) => {
                let _ = handler.fail();
                if let Some(t) = &tracker {
                    t.fail();
                }
                Err(err)
            }
        }
    }

    async fn execute_pipeline(
        &self,
        handler: &mut JobHandler,
        request: &OrchestratorRequest,
        tracker: Option<Arc<ProgressTracker>>,
        processor: Arc<ChunkProcessor>,
    ) -> Result<AggregatedResult, JobError> {
        handler.start()?;
        if let Some(t) = &tracker {
            t.start_phase("loading", 1);
        }
        if request.text.is_empty() {
            return Err(JobError::Io(IoStageError::NoInput));
        }
        if let Some(t) = &tracker {
            t.complete_phase();
        }

        handler.transition_to(JobState::Preprocessing)?;
        if let Some(t) = &tracker {
            t.start_phase("preprocessing", 1);
        }
        let (rewritten, placeholder_map, placeholder_matches) = if self.config.enable_stem {
            stem::preprocess(&request.text)
        } else {
            (request.text.clone(), Default::default(), Vec::new())
        };
        if let Some(t) = &tracker {
            t.complete_phase();
        }

        handler.transition_to(JobState::Chunking)?;
        let chunks = chunker::chunk(&rewritten, self.config.chunk_size);
        handler.add_metadata("chunk_count", chunks.len().to_string());

        handler.transition_to(JobState::Translating)?;
        if let Some(t) = &tracker {
            t.start_phase("translating", chunks.len() as u64);
        }
        let progress_cb: Option<ProgressCb> = tracker.clone().map(|t| -> ProgressCb {
            Box::new(move |completed, total, avg_quality| {
                t.update(completed as u64, &format!("chunk {completed}/{total}"), avg_quality);
            })
        });
        let checkpoint_cb: Option<CheckpointCb> = None;

        let (results, stats) = processor
            .process_all(
                &chunks,
                &request.source_lang,
                &request.target_lang,
                progress_cb,
                checkpoint_cb,
                self.config.checkpoint_interval,
            )
            .await;
        if let Some(t) = &tracker {
            t.complete_phase();
        }

        handler.transition_to(JobState::Merging)?;
        if let Some(t) = &tracker {
            t.start_phase("postprocessing", 1);
        }
        let aggregated = if self.config.enable_stem {
            aggregator::aggregate_with_stem_restore(
                &results,
                stats,
                &placeholder_map,
                &placeholder_matches,
            )
        } else {
            aggregator::aggregate(&results, stats, true)
        };
        if let Some(t) = &tracker {
            t.complete_phase();
        }

        handler.transition_to(JobState::Postprocessing)?;
        if let Some(t) = &tracker {
            t.start_phase("postprocessing", 1);
        }
        let mut aggregated = aggregated;
        if self.config.enable_polish {
            let polished = polish::polish(&aggregated.merged_text, &self.config.polisher_protected_names);
            aggregated.merged_text = polished.text;
            aggregated.total_chars = aggregated.merged_text.chars().count();
        }
        if let Some(t) = &tracker {
            t.complete_phase();
        }

        handler.transition_to(JobState::Exporting)?;
        if let Some(t) = &tracker {
            t.start_phase("exporting", 1);
        }
        if self.config.enable_validation {
            let manuscript = build_manuscript_contract(&results, &request.source_lang, &request.target_lang);
            let violations = ContractValidator::new(true).validate_manuscript_output(&manuscript);
            if !violations.is_empty() {
                return Err(JobError::ContractViolation {
                    stage: "export".to_string(),
                    violations,
                });
            }
        }
        if let Some(t) = &tracker {
            t.complete_phase();
        }
        handler.transition_to(JobState::Finalizing)?;

        Ok(aggregated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::MockTranslator;

    #[tokio::test]
    async fn full_run_completes_and_preserves_formula_tokens() {
        let config = Config {
            chunk_size: 20,
            ..Config::default()
        };
        let orch = Orchestrator::new(config, Arc::new(MockTranslator));
        let request = OrchestratorRequest {
            text: "See $E=mc^2$ for details.\n\nAnd more text here besides.".to_string(),
            source_lang: "en".to_string(),
            target_lang: "vi".to_string(),
        };
        let result = orch.run(request, None).await.unwrap();
        assert_eq!(result.final_state, JobState::Completed);
        let agg = result.aggregated.unwrap();
        assert!(agg.merged_text.contains("$E=mc^2$"));
    }

    #[tokio::test]
    async fn empty_input_fails_fast() {
        let orch = Orchestrator::new(Config::default(), Arc::new(MockTranslator));
        let request = OrchestratorRequest {
            text: String::new(),
            source_lang: "en".to_string(),
            target_lang: "vi".to_string(),
        };
        let err = orch.run(request, None).await.unwrap_err();
        assert!(matches!(err, JobError::Io(IoStageError::NoInput)));
    }

    struct NeverReturns;

    #[async_trait::async_trait]
    impl Translator for NeverReturns {
        async fn translate(
            &self,
            _chunk_id: &str,
            _text: &str,
            _source_lang: &str,
            _target_lang: &str,
        ) -> anyhow::Result<crate::interfaces::TranslationResult> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn job_timeout_cancels_the_processor_instead_of_leaking_it() {
        let config = Config {
            job_timeout_secs: 0.05,
            chunk_timeout_secs: 60.0,
            ..Config::default()
        };
        let orch = Orchestrator::new(config, Arc::new(NeverReturns));
        let request = OrchestratorRequest {
            text: "Some text to translate that never comes back.".to_string(),
            source_lang: "en".to_string(),
            target_lang: "vi".to_string(),
        };
        let err = orch.run(request, None).await.unwrap_err();
        assert!(matches!(err, JobError::Timeout(_)));
    }

    #[tokio::test]
    async fn progress_tracker_reaches_done_on_success() {
        let orch = Orchestrator::new(Config::default(), Arc::new(MockTranslator));
        let tracker = Arc::new(ProgressTracker::with_defaults());
        let request = OrchestratorRequest {
            text: "Hello world.".to_string(),
            source_lang: "en".to_string(),
            target_lang: "vi".to_string(),
        };
        let _ = orch.run(request, Some(tracker)).await.unwrap();
    }
}
