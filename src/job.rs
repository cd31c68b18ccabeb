//! Job lifecycle state machine (C6).
//!
//! Grounded on `JobHandler`: a job moves forward through a fixed phase
//! order; `prepare_retry` is the sole backward edge, resetting state to
//! `Initializing` and incrementing the retry counter. Tracks timing and
//! free-form metadata for diagnostics.

use crate::error::JobError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A job's lifecycle state (spec §4.6).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Created, not yet started.
    Initializing,
    /// Reading and validating input.
    LoadingInput,
    /// Running STEM placeholder substitution.
    Preprocessing,
    /// Splitting into chunks.
    Chunking,
    /// Running the chunk processor.
    Translating,
    /// Merging chunk results and restoring placeholders.
    Merging,
    /// Running the polisher / glossary application.
    Postprocessing,
    /// Rendering the output document.
    Exporting,
    /// Final bookkeeping after a successful export.
    Finalizing,
    /// Terminal success state.
    Completed,
    /// Terminal failure state. External cancellation also lands here;
    /// there is no separate cancelled state.
    Failed,
}

impl JobState {
    fn order_index(self) -> Option<usize> {
        FORWARD_ORDER.iter().position(|s| *s == self)
    }

    /// Whether this state is terminal (no further transitions permitted).
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

const FORWARD_ORDER: [JobState; 9] = [
    JobState::Initializing,
    JobState::LoadingInput,
    JobState::Preprocessing,
    JobState::Chunking,
    JobState::Translating,
    JobState::Merging,
    JobState::Postprocessing,
    JobState::Exporting,
    JobState::Finalizing,
];

fn is_permitted(from: JobState, to: JobState) -> bool {
    if from.is_terminal() {
        return false;
    }
    if to == JobState::Failed {
        return true;
    }
    if from == JobState::Finalizing && to == JobState::Completed {
        return true;
    }
    if from == JobState::Failed && to == JobState::Initializing {
        return true;
    }
    match (from.order_index(), to.order_index()) {
        (Some(f), Some(t)) => t == f + 1,
        _ => false,
    }
}

/// Timing captured across a job's lifetime.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct JobTiming {
    /// Seconds spent in each phase, keyed by phase name.
    pub phase_durations_secs: HashMap<String, f64>,
    /// Total wall-clock seconds since [`JobHandler::start`].
    pub total_secs: f64,
}

/// Drives one job through its [`JobState`] lifecycle.
pub struct JobHandler {
    job_id: String,
    state: JobState,
    started_at: Option<Instant>,
    phase_entered_at: Option<Instant>,
    timing: JobTiming,
    metadata: HashMap<String, String>,
    retry_count: u32,
    max_retries: u32,
}

impl JobHandler {
    /// Create a handler for `job_id`, pending and not yet started.
    pub fn new(job_id: impl Into<String>, max_retries: u32) -> Self {
        JobHandler {
            job_id: job_id.into(),
            state: JobState::Initializing,
            started_at: None,
            phase_entered_at: None,
            timing: JobTiming::default(),
            metadata: HashMap::new(),
            retry_count: 0,
            max_retries,
        }
    }

    /// This job's id.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Current state.
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Begin timing and enter `LoadingInput`.
    pub fn start(&mut self) -> Result<(), JobError> {
        let now = Instant::now();
        self.started_at = Some(now);
        self.phase_entered_at = Some(now);
        self.transition_to(JobState::LoadingInput)
    }

    /// Attempt to move to `to`, recording the duration spent in the
    /// outgoing phase. Rejects any transition not in the permitted set.
    pub fn transition_to(&mut self, to: JobState) -> Result<(), JobError> {
        if !is_permitted(self.state, to) {
            return Err(JobError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        if let Some(entered) = self.phase_entered_at {
            let elapsed = entered.elapsed().as_secs_f64();
            *self
                .timing
                .phase_durations_secs
                .entry(format!("{:?}", self.state))
                .or_insert(0.0) += elapsed;
        }
        self.phase_entered_at = Some(Instant::now());
        self.state = to;
        Ok(())
    }

    /// Attach a free-form diagnostic field.
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Transition to `Completed`, finalizing total timing.
    pub fn complete(&mut self) -> Result<(), JobError> {
        self.transition_to(JobState::Completed)?;
        self.finalize_timing();
        Ok(())
    }

    /// Transition to `Failed`, finalizing total timing.
    pub fn fail(&mut self) -> Result<(), JobError> {
        self.transition_to(JobState::Failed)?;
        self.finalize_timing();
        Ok(())
    }

    fn finalize_timing(&mut self) {
        if let Some(started) = self.started_at {
            self.timing.total_secs = started.elapsed().as_secs_f64();
        }
    }

    /// Whether another retry is within budget.
    pub fn can_retry(&self) -> bool {
        self.state == JobState::Failed && self.retry_count < self.max_retries
    }

    /// Consume one retry, moving `Failed -> Initializing` directly; the
    /// next call to [`start`](Self::start) re-enters the phase sequence.
    pub fn prepare_retry(&mut self) -> Result<(), JobError> {
        if !self.can_retry() {
            return Err(JobError::RetryBudgetExhausted {
                retry_count: self.retry_count,
                max_retries: self.max_retries,
            });
        }
        self.retry_count += 1;
        self.transition_to(JobState::Initializing)
    }

    /// Read-only view of accumulated timing.
    pub fn timing(&self) -> &JobTiming {
        &self.timing
    }

    /// Elapsed wall-clock time since [`start`](Self::start), or zero if not
    /// yet started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// One-line human-readable status summary, used by CLI progress output
    /// and the supplemental checkpoint log.
    pub fn state_summary(&self) -> String {
        format!(
            "job={} state={:?} retries={}/{} elapsed={:.1}s",
            self.job_id,
            self.state,
            self.retry_count,
            self.max_retries,
            self.elapsed().as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_progression_succeeds_in_order() {
        let mut h = JobHandler::new("job_1", 3);
        h.start().unwrap();
        assert_eq!(h.state(), JobState::LoadingInput);
        for next in [
            JobState::Preprocessing,
            JobState::Chunking,
            JobState::Translating,
            JobState::Merging,
            JobState::Postprocessing,
            JobState::Exporting,
            JobState::Finalizing,
        ] {
            h.transition_to(next).unwrap();
        }
        h.complete().unwrap();
        assert_eq!(h.state(), JobState::Completed);
    }

    #[test]
    fn skipping_a_phase_is_rejected() {
        let mut h = JobHandler::new("job_2", 3);
        h.start().unwrap();
        let err = h.transition_to(JobState::Translating).unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { .. }));
    }

    #[test]
    fn transitions_from_a_terminal_state_are_rejected() {
        let mut h = JobHandler::new("job_3", 3);
        h.start().unwrap();
        h.fail().unwrap();
        let err = h.transition_to(JobState::LoadingInput).unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { .. }));
    }

    #[test]
    fn retry_resets_to_initializing_and_consumes_budget() {
        let mut h = JobHandler::new("job_4", 1);
        h.start().unwrap();
        h.fail().unwrap();
        assert!(h.can_retry());
        h.prepare_retry().unwrap();
        assert_eq!(h.state(), JobState::Initializing);
        h.start().unwrap();
        h.fail().unwrap();
        assert!(!h.can_retry());
        assert!(h.prepare_retry().is_err());
    }

    #[test]
    fn any_state_can_transition_to_failed() {
        let mut h = JobHandler::new("job_5", 3);
        h.start().unwrap();
        h.transition_to(JobState::Preprocessing).unwrap();
        h.fail().unwrap();
        assert_eq!(h.state(), JobState::Failed);
    }

    #[test]
    fn state_summary_contains_job_id_and_state() {
        let mut h = JobHandler::new("job_6", 3);
        h.start().unwrap();
        let s = h.state_summary();
        assert!(s.contains("job_6"));
        assert!(s.contains("LoadingInput"));
    }
}
