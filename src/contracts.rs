//! Inter-stage contracts and their validator (C11).
//!
//! `ManuscriptCoreOutput` is the translation stage's deliverable;
//! `LayoutIntentPackage` is the editorial/layout stage's deliverable built
//! from it. Both carry a [`ContractMetadata`] with a content-hash checksum
//! so a downstream stage can detect a tampered or truncated handoff.
//! Grounded on `core/contracts/base.py` and `core/contracts/validation.py`;
//! field shapes for the two contracts follow spec data-model entities plus
//! their usage in `validation.py` (the dataclass bodies were not part of
//! the retrieved source).

use crate::error::ContractValidationError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Metadata carried by every contract (spec §6 "Contract JSON").
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ContractMetadata {
    /// Contract schema version.
    pub version: String,
    /// ISO-8601 UTC creation timestamp.
    pub created_at: String,
    /// Agent that produced this contract.
    pub source_agent: String,
    /// Agent this contract is addressed to.
    pub target_agent: String,
    /// First 16 hex chars of SHA-256 over the canonical payload, checksum
    /// field elided.
    pub checksum: String,
}

impl ContractMetadata {
    /// Build metadata stamped with the current time and an empty checksum,
    /// ready for [`BaseContract::finalize_checksum`].
    pub fn new(source_agent: impl Into<String>, target_agent: impl Into<String>) -> Self {
        ContractMetadata {
            version: "1.0".to_string(),
            created_at: Utc::now().to_rfc3339(),
            source_agent: source_agent.into(),
            target_agent: target_agent.into(),
            checksum: String::new(),
        }
    }
}

/// Compute the first 16 hex chars of SHA-256 over `canonical_json`.
fn checksum_of(canonical_json: &str) -> String {
    let digest = Sha256::digest(canonical_json.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Shared behavior for contracts carrying a [`ContractMetadata`].
pub trait BaseContract: Serialize {
    /// This contract's metadata, including its stamped checksum.
    fn metadata(&self) -> &ContractMetadata;

    /// A mutable handle to metadata, used to stamp the checksum in.
    fn metadata_mut(&mut self) -> &mut ContractMetadata;

    /// Structural validation. Empty means valid.
    fn validate(&self) -> Vec<String>;

    /// `validate().is_empty()`.
    fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// `validate()`, returned as an error if non-empty.
    fn assert_valid(&self) -> Result<(), ContractValidationError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ContractValidationError(errors))
        }
    }

    /// Canonical JSON representation with `metadata.checksum` cleared,
    /// used both to compute and to verify the checksum.
    fn canonical_json_without_checksum(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Some(metadata) = value.get_mut("metadata").and_then(|m| m.as_object_mut()) {
            metadata.insert("checksum".to_string(), serde_json::Value::String(String::new()));
        }
        serde_json::to_string(&sort_keys(value))
    }

    /// Recompute and stamp this contract's checksum from its current
    /// fields. Call after populating all content, before serializing.
    fn finalize_checksum(&mut self) -> Result<(), serde_json::Error> {
        let canonical = self.canonical_json_without_checksum()?;
        let sum = checksum_of(&canonical);
        self.metadata_mut().checksum = sum;
        Ok(())
    }
}

/// Recursively sort object keys so JSON serialization is checksum-stable
/// regardless of struct field declaration order.
fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            for k in keys {
                sorted.insert(k.clone(), sort_keys(map[&k].clone()));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

/// One translated segment within a [`ManuscriptCoreOutput`].
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    /// Segment id, unique within the manuscript.
    pub id: String,
    /// Source-language text.
    pub original_text: String,
    /// Target-language text.
    pub translated_text: String,
    /// Translation confidence, `[0, 1]`.
    pub confidence: f64,
}

/// Aggregate quality metrics for a manuscript.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QualityMetrics {
    /// Overall quality score, `[0, 1]`.
    pub overall_score: f64,
}

/// Document-structure summary carried alongside the segment list.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ManuscriptStructure {
    /// Whether the source declares front matter (foreword, preface, ...).
    pub has_front_matter: bool,
    /// Total chapter count detected in the source.
    pub total_chapters: usize,
}

/// The translation stage's deliverable: translated segments plus quality
/// and structural metadata (spec §3, §6).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ManuscriptCoreOutput {
    /// Contract metadata.
    pub metadata: ContractMetadata,
    /// Source language tag.
    pub source_language: String,
    /// Target language tag.
    pub target_language: String,
    /// Translated segments, in document order.
    pub segments: Vec<Segment>,
    /// Aggregate quality metrics.
    pub quality: QualityMetrics,
    /// Structural summary.
    pub structure: ManuscriptStructure,
    /// Free-form ADN (author's-data-notes) payload, opaque to this stage.
    pub adn: Option<String>,
    /// STEM placeholder inventory, keyed `"formulas"` / `"code_blocks"`.
    pub stem: std::collections::HashMap<String, Vec<String>>,
}

impl ManuscriptCoreOutput {
    /// Segment text, joined in order, for cross-stage length comparisons.
    pub fn get_full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.translated_text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl BaseContract for ManuscriptCoreOutput {
    fn metadata(&self) -> &ContractMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ContractMetadata {
        &mut self.metadata
    }

    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.source_language.is_empty() {
            errors.push("source_language must not be empty".to_string());
        }
        if self.target_language.is_empty() {
            errors.push("target_language must not be empty".to_string());
        }
        if self.segments.is_empty() {
            errors.push("segments must not be empty".to_string());
        }
        let mut seen = HashSet::new();
        for segment in &self.segments {
            if !seen.insert(&segment.id) {
                errors.push(format!("duplicate segment id: {}", segment.id));
            }
            if segment.original_text.is_empty() && segment.translated_text.is_empty() {
                errors.push(format!("segment {} has neither original nor translated text", segment.id));
            }
        }
        if !(0.0..=1.0).contains(&self.quality.overall_score) {
            errors.push(format!("quality.overall_score out of range: {}", self.quality.overall_score));
        }
        errors
    }
}

/// A block type within a [`LayoutIntentPackage`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutBlockType {
    /// Chapter or section heading.
    Heading,
    /// Body text.
    Paragraph,
    /// Equation.
    Equation,
    /// A visual separator between scenes.
    Separator,
    /// A mid-document scene break marker.
    SceneBreak,
    /// A page-number placeholder.
    PageNumber,
    /// Anything else (quote, reference entry, ...).
    Other,
}

/// One layout block.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LayoutBlock {
    /// Block id, unique within the package.
    pub id: String,
    /// Block type.
    #[serde(default = "default_block_type")]
    pub block_type: LayoutBlockType,
    /// Rendered content; may be legitimately empty for separators, scene
    /// breaks, and page numbers.
    pub content: String,
    /// Table-of-contents nesting level, if this block is a TOC entry.
    pub toc_level: Option<i32>,
    /// Whether a page break precedes this block.
    pub page_break_before: bool,
}

fn default_block_type() -> LayoutBlockType {
    LayoutBlockType::Other
}

impl Default for LayoutBlockType {
    fn default() -> Self {
        LayoutBlockType::Other
    }
}

/// A named section spanning a contiguous block range.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LayoutSection {
    /// Section kind, e.g. `"chapter"`, `"foreword"`, `"preface"`.
    pub section_type: String,
    /// First block in this section.
    pub start_block_id: String,
    /// Last block in this section.
    pub end_block_id: String,
}

/// Count of editorial issues left unresolved by the layout stage.
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ConsistencyReport {
    /// Number of unresolved consistency issues.
    pub unresolved_count: usize,
}

/// The editorial/layout stage's deliverable (spec §3, §6).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LayoutIntentPackage {
    /// Contract metadata.
    pub metadata: ContractMetadata,
    /// Document title.
    pub title: String,
    /// Named template this package targets (`"book"`, `"report"`, ...).
    pub template: String,
    /// Ordered blocks.
    pub blocks: Vec<LayoutBlock>,
    /// Named sections over the block sequence.
    pub sections: Vec<LayoutSection>,
    /// Consistency-check summary.
    pub consistency: ConsistencyReport,
}

impl LayoutIntentPackage {
    /// Blocks carrying a `toc_level`, in block order.
    pub fn get_toc_entries(&self) -> Vec<&LayoutBlock> {
        self.blocks.iter().filter(|b| b.toc_level.is_some()).collect()
    }

    /// Blocks tagged as chapter headings at TOC level 0.
    pub fn get_chapters(&self) -> Vec<&LayoutBlock> {
        self.blocks
            .iter()
            .filter(|b| b.block_type == LayoutBlockType::Heading && b.toc_level == Some(0))
            .collect()
    }

    /// Block content, joined in order, for cross-stage length comparisons.
    pub fn get_full_text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl BaseContract for LayoutIntentPackage {
    fn metadata(&self) -> &ContractMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ContractMetadata {
        &mut self.metadata
    }

    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.blocks.is_empty() {
            errors.push("blocks must not be empty".to_string());
        }
        let mut seen = HashSet::new();
        for block in &self.blocks {
            if !seen.insert(&block.id) {
                errors.push(format!("duplicate block id: {}", block.id));
            }
        }
        let block_ids: HashSet<&String> = self.blocks.iter().map(|b| &b.id).collect();
        for section in &self.sections {
            if !block_ids.contains(&section.start_block_id) {
                errors.push(format!(
                    "section start_block_id '{}' not found in blocks",
                    section.start_block_id
                ));
            }
            if !block_ids.contains(&section.end_block_id) {
                errors.push(format!(
                    "section end_block_id '{}' not found in blocks",
                    section.end_block_id
                ));
            }
        }
        errors
    }
}

/// Validates single contracts, contract chains, and checksums (C11).
#[derive(Copy, Clone, Debug)]
pub struct ContractValidator {
    /// When true, [`validate_chain`](Self::validate_chain) raises on the
    /// first invalid contract instead of collecting every result.
    pub strict: bool,
}

impl Default for ContractValidator {
    fn default() -> Self {
        ContractValidator { strict: true }
    }
}

impl ContractValidator {
    /// Build a validator with the given strictness.
    pub fn new(strict: bool) -> Self {
        ContractValidator { strict }
    }

    /// Structural validation only.
    pub fn validate<C: BaseContract>(&self, contract: &C) -> Vec<String> {
        contract.validate()
    }

    /// Structural validation, raised as an error on failure.
    pub fn validate_or_raise<C: BaseContract>(&self, contract: &C) -> Result<(), ContractValidationError> {
        contract.assert_valid()
    }

    /// Verify `contract`'s checksum matches `expected`.
    pub fn verify_checksum<C: BaseContract>(&self, contract: &C, expected: &str) -> Result<bool, serde_json::Error> {
        let canonical = contract.canonical_json_without_checksum()?;
        Ok(checksum_of(&canonical) == expected)
    }

    /// Manuscript-specific checks beyond basic structural validation:
    /// rejects a batch where more than half the segments have very low
    /// confidence, and flags segments with source text but no translation.
    pub fn validate_manuscript_output(&self, output: &ManuscriptCoreOutput) -> Vec<String> {
        let mut errors = output.validate();
        if !output.segments.is_empty() {
            let low_confidence = output.segments.iter().filter(|s| s.confidence < 0.3).count();
            if low_confidence as f64 > output.segments.len() as f64 * 0.5 {
                errors.push("more than 50% of segments have very low confidence".to_string());
            }
            let empty_translations = output
                .segments
                .iter()
                .filter(|s| !s.original_text.is_empty() && s.translated_text.is_empty())
                .count();
            if empty_translations > 0 {
                errors.push(format!("{empty_translations} segments have original text but no translation"));
            }
        }
        errors
    }

    /// Layout-specific checks: empty non-structural blocks, negative TOC
    /// levels, and dangling section block ids.
    pub fn validate_layout_intent(&self, lip: &LayoutIntentPackage) -> Vec<String> {
        let mut errors = lip.validate();
        let empty_content = lip
            .blocks
            .iter()
            .filter(|b| {
                b.content.is_empty()
                    && !matches!(
                        b.block_type,
                        LayoutBlockType::Separator | LayoutBlockType::SceneBreak | LayoutBlockType::PageNumber
                    )
            })
            .count();
        if empty_content > 0 {
            errors.push(format!("{empty_content} content blocks have no content"));
        }
        for entry in lip.get_toc_entries() {
            if entry.toc_level.unwrap_or(0) < 0 {
                errors.push(format!("block {} has invalid toc_level: {:?}", entry.id, entry.toc_level));
            }
        }
        errors
    }

    /// Cross-stage check that a [`LayoutIntentPackage`] faithfully carries
    /// forward a [`ManuscriptCoreOutput`]'s content and structure.
    pub fn validate_manuscript_to_lip(&self, manuscript: &ManuscriptCoreOutput, lip: &LayoutIntentPackage) -> Vec<String> {
        let mut errors = Vec::new();

        let manuscript_segment_count = manuscript.segments.len();
        let lip_content_blocks = lip.blocks.iter().filter(|b| !b.content.is_empty()).count();
        if manuscript_segment_count > 0 {
            let variance = (manuscript_segment_count as f64 - lip_content_blocks as f64).abs() / manuscript_segment_count as f64;
            if variance > 0.2 {
                errors.push(format!(
                    "block count variance too high: {lip_content_blocks} blocks for {manuscript_segment_count} segments ({:.1}% variance)",
                    variance * 100.0
                ));
            }
        }

        let manuscript_text = manuscript.get_full_text();
        let lip_text = lip.get_full_text();
        if !manuscript_text.is_empty() {
            let length_diff = (manuscript_text.len() as f64 - lip_text.len() as f64).abs() / manuscript_text.len() as f64;
            if length_diff > 0.05 {
                errors.push(format!("text content may have been lost in transformation ({:.1}% difference)", length_diff * 100.0));
            }
        }

        if manuscript.structure.has_front_matter {
            let front_sections = lip
                .sections
                .iter()
                .filter(|s| matches!(s.section_type.as_str(), "foreword" | "preface" | "dedication" | "acknowledgments"))
                .count();
            if front_sections == 0 {
                errors.push("manuscript has front matter but LIP has no front sections".to_string());
            }
        }

        if manuscript.structure.total_chapters > 0 {
            let lip_chapters = lip.get_chapters().len();
            if (lip_chapters as f64) < manuscript.structure.total_chapters as f64 * 0.8 {
                errors.push(format!(
                    "LIP has fewer chapters ({lip_chapters}) than manuscript ({})",
                    manuscript.structure.total_chapters
                ));
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manuscript() -> ManuscriptCoreOutput {
        let mut m = ManuscriptCoreOutput {
            source_language: "en".to_string(),
            target_language: "vi".to_string(),
            segments: vec![Segment {
                id: "chunk_0".to_string(),
                original_text: "Hello".to_string(),
                translated_text: "Xin chao".to_string(),
                confidence: 0.9,
            }],
            quality: QualityMetrics { overall_score: 0.9 },
            ..Default::default()
        };
        m.metadata = ContractMetadata::new("translator", "layout");
        m
    }

    #[test]
    fn checksum_round_trips_through_json() {
        let mut m = sample_manuscript();
        m.finalize_checksum().unwrap();
        let json = serde_json::to_string(&m).unwrap();
        let restored: ManuscriptCoreOutput = serde_json::from_str(&json).unwrap();
        let validator = ContractValidator::default();
        assert!(validator.verify_checksum(&restored, &restored.metadata.checksum).unwrap());
    }

    #[test]
    fn tampering_with_a_field_breaks_checksum_verification() {
        let mut m = sample_manuscript();
        m.finalize_checksum().unwrap();
        let checksum = m.metadata.checksum.clone();
        m.segments[0].translated_text = "tampered".to_string();
        let validator = ContractValidator::default();
        assert!(!validator.verify_checksum(&m, &checksum).unwrap());
    }

    #[test]
    fn empty_segments_is_invalid() {
        let m = ManuscriptCoreOutput::default();
        let validator = ContractValidator::default();
        let errors = validator.validate(&m);
        assert!(errors.iter().any(|e| e.contains("segments")));
    }

    #[test]
    fn low_confidence_majority_is_flagged() {
        let mut m = sample_manuscript();
        m.segments = vec![
            Segment { id: "a".to_string(), original_text: "x".to_string(), translated_text: "y".to_string(), confidence: 0.1 },
            Segment { id: "b".to_string(), original_text: "x".to_string(), translated_text: "y".to_string(), confidence: 0.1 },
        ];
        let validator = ContractValidator::default();
        let errors = validator.validate_manuscript_output(&m);
        assert!(errors.iter().any(|e| e.contains("low confidence")));
    }

    #[test]
    fn dangling_section_block_id_is_rejected() {
        let lip = LayoutIntentPackage {
            blocks: vec![LayoutBlock { id: "b1".to_string(), content: "text".to_string(), ..Default::default() }],
            sections: vec![LayoutSection {
                section_type: "chapter".to_string(),
                start_block_id: "b1".to_string(),
                end_block_id: "missing".to_string(),
            }],
            ..Default::default()
        };
        let validator = ContractValidator::default();
        let errors = validator.validate_layout_intent(&lip);
        assert!(errors.iter().any(|e| e.contains("end_block_id")));
    }

    #[test]
    fn manuscript_to_lip_flags_large_block_count_variance() {
        let manuscript = sample_manuscript();
        let lip = LayoutIntentPackage {
            blocks: vec![],
            ..Default::default()
        };
        let validator = ContractValidator::default();
        let errors = validator.validate_manuscript_to_lip(&manuscript, &lip);
        assert!(errors.iter().any(|e| e.contains("variance")));
    }
}
