//! Phase-weighted progress tracking with ETA (C5).
//!
//! Grounded on `ProgressTracker`: phases are weighted fractions of the
//! whole job, progress within a phase scales that phase's weight, and
//! subscriber callbacks are isolated from one another's panics/errors so a
//! broken UI callback never takes down the pipeline. ETA follows
//! `ProgressTracker.update` exactly: the observed rate is steps completed
//! in the current phase divided by elapsed time since the job started, and
//! the estimate is `(total_steps - completed) / rate`.

use crate::config::PhaseWeights;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Snapshot of progress at a point in time (spec §3/§4.5/§6).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgressState {
    /// Job identifier, empty until [`ProgressTracker::set_job`] is called.
    pub job_id: String,
    /// Human-readable job name, empty until set.
    pub job_name: String,
    /// Name of the current phase.
    pub phase: String,
    /// Total steps in the current phase.
    pub total_steps: u64,
    /// Steps completed within the current phase.
    pub completed_steps: u64,
    /// Description of the most recent step, or a phase-transition message.
    pub current_step: String,
    /// Free-form message passed to subscribers alongside this state.
    pub message: String,
    /// Quality score attached to the most recent update, `[0, 1]`.
    pub quality_score: f64,
    /// Fraction complete within the current phase, `[0, 1]`.
    pub phase_fraction: f64,
    /// Overall fraction complete across all phases, `[0, 1]`.
    pub overall_fraction: f64,
    /// Wall-clock time the job started, RFC 3339.
    pub started_at: String,
    /// Seconds elapsed since [`ProgressTracker::start`].
    pub elapsed_secs: f64,
    /// Estimated seconds remaining, `None` until enough signal exists.
    pub eta_secs: Option<f64>,
    /// Whether the job has finished (successfully or not).
    pub done: bool,
    /// Whether the job failed.
    pub failed: bool,
}

type Callback = Box<dyn Fn(&ProgressState) + Send + Sync>;

struct PhaseState {
    name: String,
    total_steps: u64,
    completed_steps: u64,
    current_step: String,
    quality_score: f64,
}

/// Fan-out progress tracker driving zero or more subscriber callbacks.
pub struct ProgressTracker {
    weights: PhaseWeights,
    phase_order: Vec<String>,
    job_id: Mutex<String>,
    job_name: Mutex<String>,
    started_at: Mutex<Option<Instant>>,
    started_at_wall: Mutex<String>,
    completed_weight: Mutex<f64>,
    current_phase: Mutex<Option<PhaseState>>,
    eta_secs: Mutex<Option<f64>>,
    callbacks: Mutex<Vec<Callback>>,
    done: Mutex<bool>,
    failed: Mutex<bool>,
}

impl ProgressTracker {
    /// Build a tracker over the given phase order, using `weights` to
    /// size each phase's contribution to the overall fraction.
    pub fn new(phase_order: Vec<String>, weights: PhaseWeights) -> Self {
        ProgressTracker {
            weights,
            phase_order,
            job_id: Mutex::new(String::new()),
            job_name: Mutex::new(String::new()),
            started_at: Mutex::new(None),
            started_at_wall: Mutex::new(String::new()),
            completed_weight: Mutex::new(0.0),
            current_phase: Mutex::new(None),
            eta_secs: Mutex::new(None),
            callbacks: Mutex::new(Vec::new()),
            done: Mutex::new(false),
            failed: Mutex::new(false),
        }
    }

    /// Build a tracker with the default phase order and weights (spec
    /// §4.5): loading, preprocessing, translating, postprocessing,
    /// exporting.
    pub fn with_defaults() -> Self {
        ProgressTracker::new(
            vec![
                "loading".to_string(),
                "preprocessing".to_string(),
                "translating".to_string(),
                "postprocessing".to_string(),
                "exporting".to_string(),
            ],
            PhaseWeights::default(),
        )
    }

    /// Attach the job identifier and human-readable name this tracker is
    /// reporting for; reflected in every subsequent [`ProgressState`].
    pub fn set_job(&self, job_id: impl Into<String>, job_name: impl Into<String>) {
        *self.job_id.lock().unwrap() = job_id.into();
        *self.job_name.lock().unwrap() = job_name.into();
    }

    /// Register a progress subscriber. Every emitted state is delivered to
    /// every subscriber, in registration order, with each call isolated
    /// from the others' panics.
    pub fn subscribe(&self, cb: Callback) {
        self.callbacks.lock().unwrap().push(cb);
    }

    /// Mark the job as started and emit the initial (all-zero) state.
    pub fn start(&self) {
        let now = Instant::now();
        *self.started_at.lock().unwrap() = Some(now);
        *self.started_at_wall.lock().unwrap() = Utc::now().to_rfc3339();
        self.emit("Starting...", false);
    }

    /// Enter a named phase at 0% local progress, expecting `total_steps`
    /// steps before [`complete_phase`](Self::complete_phase).
    pub fn start_phase(&self, phase: &str, total_steps: u64) {
        *self.current_phase.lock().unwrap() = Some(PhaseState {
            name: phase.to_string(),
            total_steps,
            completed_steps: 0,
            current_step: String::new(),
            quality_score: 0.0,
        });
        self.emit(&format!("Starting {phase}..."), false);
    }

    /// Record `completed` steps finished within the current phase, along
    /// with an optional step description and quality score. ETA is
    /// recomputed from the observed rate, steps completed in this phase
    /// over elapsed time since the job started.
    pub fn update(&self, completed: u64, step_description: &str, quality: f64) {
        let total_steps = {
            let mut guard = self.current_phase.lock().unwrap();
            if let Some(phase) = guard.as_mut() {
                phase.completed_steps = completed;
                phase.current_step = step_description.to_string();
                phase.quality_score = quality;
                phase.total_steps
            } else {
                0
            }
        };

        let elapsed_secs = self.elapsed_secs();
        if completed > 0 {
            let rate = completed as f64 / elapsed_secs.max(f64::EPSILON);
            let remaining = total_steps.saturating_sub(completed) as f64;
            *self.eta_secs.lock().unwrap() = if rate > 0.0 { Some(remaining / rate) } else { None };
        }

        self.emit(step_description, false);
    }

    /// Finish the current phase at 100% and roll its weight into the
    /// completed total.
    pub fn complete_phase(&self) {
        let phase_name = {
            let mut guard = self.current_phase.lock().unwrap();
            if let Some(phase) = guard.as_mut() {
                phase.completed_steps = phase.total_steps.max(phase.completed_steps);
                Some(phase.name.clone())
            } else {
                None
            }
        };
        if let Some(name) = &phase_name {
            let w = self.weights.weight_for(name);
            *self.completed_weight.lock().unwrap() += w;
        }
        let message = phase_name
            .map(|n| format!("Completed {n}"))
            .unwrap_or_default();
        *self.current_phase.lock().unwrap() = None;
        self.emit(&message, false);
    }

    /// Mark the job as finished successfully and emit a final, 100% state.
    pub fn finish(&self) {
        *self.done.lock().unwrap() = true;
        *self.completed_weight.lock().unwrap() = 1.0;
        *self.eta_secs.lock().unwrap() = Some(0.0);
        self.emit("Completed", false);
    }

    /// Mark the job as failed and emit a terminal, failed state without
    /// advancing progress further.
    pub fn fail(&self) {
        *self.done.lock().unwrap() = true;
        *self.failed.lock().unwrap() = true;
        self.emit("Failed", true);
    }

    fn elapsed_secs(&self) -> f64 {
        self.started_at
            .lock()
            .unwrap()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn emit(&self, message: &str, failed_now: bool) {
        let guard = self.current_phase.lock().unwrap();
        let (phase, total_steps, completed_steps, current_step, quality_score) = guard
            .as_ref()
            .map(|p| {
                (
                    p.name.clone(),
                    p.total_steps,
                    p.completed_steps,
                    p.current_step.clone(),
                    p.quality_score,
                )
            })
            .unwrap_or_else(|| ("idle".to_string(), 0, 0, String::new(), 0.0));
        let phase_fraction = if total_steps > 0 {
            (completed_steps as f64 / total_steps as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let completed_weight = *self.completed_weight.lock().unwrap();
        let current_weight = guard.as_ref().map(|p| self.weights.weight_for(&p.name)).unwrap_or(0.0);
        drop(guard);
        let overall_fraction = (completed_weight + current_weight * phase_fraction).clamp(0.0, 1.0);
        let elapsed_secs = self.elapsed_secs();
        let eta_secs = *self.eta_secs.lock().unwrap();

        let done = *self.done.lock().unwrap() || failed_now;
        let failed = *self.failed.lock().unwrap() || failed_now;

        let state = ProgressState {
            job_id: self.job_id.lock().unwrap().clone(),
            job_name: self.job_name.lock().unwrap().clone(),
            phase,
            total_steps,
            completed_steps,
            current_step,
            message: message.to_string(),
            quality_score,
            phase_fraction,
            overall_fraction,
            started_at: self.started_at_wall.lock().unwrap().clone(),
            elapsed_secs,
            eta_secs,
            done,
            failed,
        };

        for cb in self.callbacks.lock().unwrap().iter() {
            let _ = panic::catch_unwind(AssertUnwindSafe(|| cb(&state)));
        }
    }
}

/// Build a subscriber that logs progress at `tracing::info!` no more often
/// than every `interval` seconds, always logging the terminal state.
///
/// Supplemental helper mirroring the reference CLI's progress logger: the
/// original system logs a line to stdout on an interval rather than on
/// every callback, to avoid flooding long translation runs with output.
pub fn logging_subscriber(interval_secs: f64) -> Box<dyn Fn(&ProgressState) + Send + Sync> {
    let last = Mutex::new(Instant::now() - std::time::Duration::from_secs_f64(interval_secs.max(0.0)));
    Box::new(move |state: &ProgressState| {
        let mut last_guard = last.lock().unwrap();
        let elapsed_since_last = last_guard.elapsed().as_secs_f64();
        if state.done || elapsed_since_last >= interval_secs {
            *last_guard = Instant::now();
            tracing::info!(
                phase = %state.phase,
                overall = %format!("{:.1}%", state.overall_fraction * 100.0),
                eta = ?state.eta_secs,
                done = state.done,
                failed = state.failed,
                message = %state.message,
                "progress"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn phase_progress_scales_overall_by_weight() {
        let tracker = ProgressTracker::with_defaults();
        tracker.start();
        tracker.start_phase("translating", 10);
        let weight = PhaseWeights::default().weight_for("translating");
        let expected = weight * 0.5;

        let captured = Arc::new(Mutex::new(0.0));
        let captured2 = Arc::clone(&captured);
        tracker.subscribe(Box::new(move |s| {
            *captured2.lock().unwrap() = s.overall_fraction;
        }));
        tracker.update(5, "chunk 5/10", 0.9);
        assert!((*captured.lock().unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn completing_all_phases_reaches_full_progress() {
        let tracker = ProgressTracker::with_defaults();
        tracker.start();
        for phase in ["loading", "preprocessing", "translating", "postprocessing", "exporting"] {
            tracker.start_phase(phase, 1);
            tracker.update(1, "done", 1.0);
            tracker.complete_phase();
        }
        assert!((*tracker.completed_weight.lock().unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn finish_forces_full_progress_and_done() {
        let tracker = ProgressTracker::with_defaults();
        let seen_done = Arc::new(Mutex::new(false));
        let seen_done2 = Arc::clone(&seen_done);
        tracker.subscribe(Box::new(move |s| {
            if s.done {
                *seen_done2.lock().unwrap() = true;
            }
        }));
        tracker.start();
        tracker.finish();
        assert!(*seen_done.lock().unwrap());
    }

    #[test]
    fn fail_marks_terminal_and_failed() {
        let tracker = ProgressTracker::with_defaults();
        tracker.start();
        tracker.fail();
        let seen = Arc::new(Mutex::new(None));
        let seen2 = Arc::clone(&seen);
        tracker.subscribe(Box::new(move |s| {
            *seen2.lock().unwrap() = Some((s.done, s.failed));
        }));
        tracker.update(3, "still running", 0.5);
        assert_eq!(*seen.lock().unwrap(), Some((true, true)));
    }

    #[test]
    fn one_subscriber_panicking_does_not_block_another() {
        let tracker = ProgressTracker::with_defaults();
        tracker.subscribe(Box::new(|_s| panic!("broken subscriber")));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        tracker.subscribe(Box::new(move |_s| {
            calls2.fetch_add(1, Ordering::SeqCst);
        }));
        tracker.start();
        tracker.start_phase("translating", 5);
        tracker.update(1, "chunk 1/5", 0.8);
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn eta_is_none_before_any_progress() {
        let tracker = ProgressTracker::with_defaults();
        let seen = Arc::new(Mutex::new(Some(0.0)));
        let seen2 = Arc::clone(&seen);
        tracker.subscribe(Box::new(move |s| {
            *seen2.lock().unwrap() = s.eta_secs;
        }));
        tracker.start();
        assert!(seen.lock().unwrap().is_none());
    }

    #[test]
    fn eta_uses_phase_local_rate_not_overall_fraction() {
        let tracker = ProgressTracker::with_defaults();
        tracker.start();
        tracker.start_phase("translating", 100);
        tracker.update(50, "chunk 50/100", 0.9);
        let eta = tracker.eta_secs.lock().unwrap().unwrap();
        let elapsed = tracker.elapsed_secs();
        let expected = (100.0 - 50.0) / (50.0 / elapsed.max(f64::EPSILON));
        assert!((eta - expected).abs() < 1e-6);
    }

    #[test]
    fn job_id_and_name_are_carried_in_every_state() {
        let tracker = ProgressTracker::with_defaults();
        tracker.set_job("job_42", "my-document");
        let seen = Arc::new(Mutex::new((String::new(), String::new())));
        let seen2 = Arc::clone(&seen);
        tracker.subscribe(Box::new(move |s| {
            *seen2.lock().unwrap() = (s.job_id.clone(), s.job_name.clone());
        }));
        tracker.start();
        assert_eq!(*seen.lock().unwrap(), ("job_42".to_string(), "my-document".to_string()));
    }
}
