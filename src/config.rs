//! Orchestrator and component configuration.
//!
//! A single typed [`Config`] gathers the knobs the spec names throughout
//! §4-§5: chunk size, concurrency, retries, timeouts, phase weights, and the
//! template/output directories. Constructible programmatically (its
//! [`Default`] matches the constants implied by the spec) or loaded from a
//! TOML file, the way `freddiehaddad-oxidized`'s `core-config` crate and the
//! session recorder's `toml`/`toml_edit` use layer config files on top of
//! in-code defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Phase weights used by the progress tracker (C5), sum to 1.0.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PhaseWeights {
    /// Weight of the loading phase.
    pub loading: f64,
    /// Weight of the preprocessing phase.
    pub preprocessing: f64,
    /// Weight of the translating phase (dominant).
    pub translating: f64,
    /// Weight of the postprocessing phase.
    pub postprocessing: f64,
    /// Weight of the exporting phase.
    pub exporting: f64,
}

impl Default for PhaseWeights {
    fn default() -> Self {
        PhaseWeights {
            loading: 0.05,
            preprocessing: 0.05,
            translating: 0.70,
            postprocessing: 0.10,
            exporting: 0.10,
        }
    }
}

impl PhaseWeights {
    /// Weight for a named phase; unknown phases default to 0.1 per spec §4.5.
    pub fn weight_for(&self, phase: &str) -> f64 {
        match phase {
            "loading" => self.loading,
            "preprocessing" => self.preprocessing,
            "translating" => self.translating,
            "postprocessing" => self.postprocessing,
            "exporting" => self.exporting,
            _ => 0.1,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Target chunk size in bytes (C2).
    pub chunk_size: usize,
    /// Maximum in-flight translations (C3).
    pub max_concurrency: usize,
    /// Per-chunk retry budget (C3).
    pub max_retries_chunk: u32,
    /// Per-job retry budget (C6).
    pub max_retries_job: u32,
    /// Per-chunk wall-clock timeout, seconds (C3).
    pub chunk_timeout_secs: f64,
    /// Whole-job wall-clock timeout, seconds (C7).
    pub job_timeout_secs: f64,
    /// Checkpoint callback interval, in completed chunks (C3).
    pub checkpoint_interval: usize,
    /// Phase weights for progress reporting (C5).
    pub phase_weights: PhaseWeights,
    /// Directory holding named DOCX templates (C10).
    pub template_dir: String,
    /// Default source language.
    pub source_lang: String,
    /// Default target language.
    pub target_lang: String,
    /// Enable STEM placeholder preprocessing.
    pub enable_stem: bool,
    /// Enable glossary application (external collaborator; no-op if absent).
    pub enable_glossary: bool,
    /// Enable post-translation polishing (C12).
    pub enable_polish: bool,
    /// Enable contract validation at stage boundaries (C11).
    pub enable_validation: bool,
    /// Extra protected names for the polisher, merged with its built-in list.
    pub polisher_protected_names: Vec<String>,
    /// Extra free-form settings, preserved for forward compatibility.
    #[serde(flatten)]
    pub extra: HashMap<String, toml::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chunk_size: 2000,
            max_concurrency: 5,
            max_retries_chunk: 2,
            max_retries_job: 3,
            chunk_timeout_secs: 30.0,
            job_timeout_secs: 600.0,
            checkpoint_interval: 5,
            phase_weights: PhaseWeights::default(),
            template_dir: "templates".to_string(),
            source_lang: "en".to_string(),
            target_lang: "vi".to_string(),
            enable_stem: true,
            enable_glossary: false,
            enable_polish: true,
            enable_validation: true,
            polisher_protected_names: Vec::new(),
            extra: HashMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any field the file omits.
    pub fn from_toml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.as_ref().display()))?;
        Self::from_toml_str(&text)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).map_err(|e| anyhow::anyhow!("parsing config: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_weights_sum_to_one() {
        let w = PhaseWeights::default();
        let sum = w.loading + w.preprocessing + w.translating + w.postprocessing + w.exporting;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_phase_defaults_to_point_one() {
        let w = PhaseWeights::default();
        assert_eq!(w.weight_for("ocr"), 0.1);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg = Config::from_toml_str("chunk_size = 500\n").unwrap();
        assert_eq!(cfg.chunk_size, 500);
        assert_eq!(cfg.max_concurrency, Config::default().max_concurrency);
    }
}
