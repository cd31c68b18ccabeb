//! Semantic structure extractor (C8).
//!
//! Converts an ordered paragraph list into an ordered list of [`DocNode`]s:
//! headings, theorem-like blocks, proofs (anchored to the nearest
//! theorem-like node), equation blocks, references, and plain paragraphs.
//! Grounded on `extract_semantic_structure` and its `_detect_*` helpers;
//! regex patterns are carried over nearly verbatim, translated from
//! Python's `re` module to the `regex` crate (neither supports
//! lookbehind, so none of these patterns needed it).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Semantic type of a [`DocNode`] (spec §3).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocNodeType {
    /// Top-level chapter heading.
    Chapter,
    /// Numbered section heading.
    Section,
    /// Numbered subsection heading.
    Subsection,
    /// Theorem statement.
    Theorem,
    /// Lemma statement.
    Lemma,
    /// Proposition statement.
    Proposition,
    /// Corollary statement.
    Corollary,
    /// Definition statement.
    Definition,
    /// Worked example (rendered as a remark-like box).
    Example,
    /// Remark.
    Remark,
    /// Proof block.
    Proof,
    /// Display equation block.
    EquationBlock,
    /// Ordinary body paragraph.
    Paragraph,
    /// Quoted block of text.
    Blockquote,
    /// Chapter-opening epigraph.
    Epigraph,
    /// Scene separator (`* * *`, `---`, etc.).
    SceneBreak,
    /// Title page / copyright / dedication / TOC material.
    FrontMatter,
    /// Appendix / acknowledgments / author bio material.
    BackMatter,
    /// A line of dialogue.
    Dialogue,
    /// Heading introducing a references/bibliography section.
    ReferencesSection,
    /// One entry within a references section.
    ReferenceEntry,
    /// Could not be classified.
    Unknown,
}

impl DocNodeType {
    /// Headings per spec §3.
    pub fn is_heading(self) -> bool {
        matches!(self, DocNodeType::Chapter | DocNodeType::Section | DocNodeType::Subsection)
    }

    /// Theorem-like blocks per spec §3.
    pub fn is_theorem_like(self) -> bool {
        matches!(
            self,
            DocNodeType::Theorem
                | DocNodeType::Lemma
                | DocNodeType::Proposition
                | DocNodeType::Corollary
                | DocNodeType::Definition
                | DocNodeType::Example
                | DocNodeType::Remark
        )
    }
}

/// A node in the semantic document tree (flat list; no parser in this
/// crate nests chapters under parts, so `children` stays empty today but
/// is kept for forward compatibility with the original hierarchical
/// model).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DocNode {
    /// Semantic type.
    pub node_type: DocNodeType,
    /// Text content (placeholder-restored, polished).
    pub text: String,
    /// Optional title/label, e.g. `"Theorem 1.1"`.
    pub title: Option<String>,
    /// Optional hierarchy level (1 = chapter, 2 = section, 3 = subsection).
    pub level: Option<u8>,
    /// Child nodes; always empty in the current flat extraction.
    pub children: Vec<DocNode>,
    /// Free-form metadata (`source_para`, `related_to_type`, ...).
    pub metadata: HashMap<String, String>,
}

impl DocNode {
    fn new(node_type: DocNodeType, text: impl Into<String>) -> Self {
        DocNode {
            node_type,
            text: text.into(),
            title: None,
            level: None,
            children: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

static CHAPTER_EN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^chapter\s+(\d+|[ivxlcdm]+)\b").unwrap());
static CHAPTER_VN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(Chương|CHƯƠNG)\s+(\d+|[IVXLCDM]+)\b").unwrap());
static SECTION_NUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.\s+\p{Lu}").unwrap());
static SUBSECTION_NUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+\.\d+)\s+\p{Lu}").unwrap());
static SECTION_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(Section|Mục)\s+(\d+(\.\d+)*)\b").unwrap());

fn detect_heading(text: &str) -> Option<(DocNodeType, String, u8)> {
    if CHAPTER_EN_RE.is_match(text) || CHAPTER_VN_RE.is_match(text) {
        return Some((DocNodeType::Chapter, text.to_string(), 1));
    }
    if let Some(caps) = SUBSECTION_NUM_RE.captures(text) {
        let _ = caps;
        return Some((DocNodeType::Subsection, text.to_string(), 3));
    }
    if SECTION_NUM_RE.is_match(text) {
        return Some((DocNodeType::Section, text.to_string(), 2));
    }
    if let Some(caps) = SECTION_WORD_RE.captures(text) {
        let number = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let dots = number.matches('.').count();
        let (node_type, level) = if dots == 0 {
            (DocNodeType::Section, 2)
        } else {
            (DocNodeType::Subsection, 3)
        };
        return Some((node_type, text.to_string(), level));
    }

    let words = text.split_whitespace().count();
    if text == text.to_uppercase() && words <= 8 && text.chars().count() <= 100 && text.chars().any(|c| c.is_alphabetic()) {
        let lower = text.to_lowercase();
        let blocked = ["proof", "theorem", "lemma", "definition", "chứng minh", "định lý"];
        if !blocked.iter().any(|b| lower.contains(b)) {
            return Some((DocNodeType::Section, text.to_string(), 2));
        }
    }
    None
}

static THEOREM_LIKE_NUM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(theorem|lemma|proposition|corollary|definition|remark|example|định lý|bổ đề|mệnh đề|hệ quả|định nghĩa|nhận xét|ví dụ)\s+(\d+(\.\d+)*)",
    )
    .unwrap()
});
static THEOREM_LIKE_BARE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(theorem|lemma|proposition|corollary|definition|remark|example|định lý|bổ đề|mệnh đề|hệ quả|định nghĩa|nhận xét|ví dụ)[\.:]\s",
    )
    .unwrap()
});

fn theorem_like_type(keyword: &str) -> DocNodeType {
    match keyword.to_lowercase().as_str() {
        "theorem" | "định lý" => DocNodeType::Theorem,
        "lemma" | "bổ đề" => DocNodeType::Lemma,
        "proposition" | "mệnh đề" => DocNodeType::Proposition,
        "corollary" | "hệ quả" => DocNodeType::Corollary,
        "definition" | "định nghĩa" => DocNodeType::Definition,
        _ => DocNodeType::Remark, // remark, example, ví dụ, nhận xét
    }
}

fn detect_theorem_like(text: &str) -> Option<(DocNodeType, String)> {
    if let Some(caps) = THEOREM_LIKE_NUM_RE.captures(text) {
        let keyword = caps.get(1).unwrap().as_str();
        let number = caps.get(2).unwrap().as_str();
        return Some((theorem_like_type(keyword), format!("{keyword} {number}")));
    }
    if let Some(caps) = THEOREM_LIKE_BARE_RE.captures(text) {
        let keyword = caps.get(1).unwrap().as_str();
        return Some((theorem_like_type(keyword), keyword.to_string()));
    }
    None
}

static PROOF_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(proof[\.:]\s|proof\s+of\b|sketch\s+of\s+(the\s+)?proof|outline\s+of\s+(the\s+)?proof|sketch[\.:]\s|outline[\.:]\s|chứng minh[\.:]\s|chứng minh\s+định lý|chứng minh\s+bổ đề|phác thảo chứng minh[\.:]\s|phần chứng minh[\.:]\s)",
    )
    .unwrap()
});

fn detect_proof_start(text: &str) -> bool {
    PROOF_START_RE.is_match(text)
}

static QED_TEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bqed\b|\bq\.e\.d\.\b|completes?\s+the\s+proof|concludes?\s+the\s+proof|ends?\s+the\s+proof|hết chứng minh|kết thúc chứng minh|hoàn thành chứng minh|ta có điều phải chứng minh|điều phải chứng minh được hoàn thành",
    )
    .unwrap()
});
const QED_SYMBOLS: &[char] = &['∎', '□', '■', '◻', '▪'];

fn detect_proof_end(text: &str) -> bool {
    let trimmed = text.trim_end_matches(|c: char| ".,:; \t\n".contains(c));
    if QED_SYMBOLS.iter().any(|s| trimmed.ends_with(*s)) {
        return true;
    }
    QED_TEXT_RE.is_match(text)
}

static REFERENCES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(references|bibliography|tài liệu tham khảo)\s*$|^(appendix|phụ lục)\b",
    )
    .unwrap()
});

fn detect_references_section(text: &str) -> bool {
    REFERENCES_RE.is_match(text)
}

const MATH_CHARS: &str = r"\{}[]^_=+-*/<>≤≥≠∈∉⊂⊃∩∪∀∃∞∑∏∫";

fn detect_equation_block(text: &str) -> bool {
    if text.contains("$$") {
        return true;
    }
    if text.contains("\\[") && text.contains("\\]") {
        return true;
    }
    if text.chars().count() < 200 && !text.is_empty() {
        let math_count = text.chars().filter(|c| MATH_CHARS.contains(*c)).count();
        let total = text.chars().count();
        if total > 0 && math_count as f64 / total as f64 > 0.2 {
            return true;
        }
    }
    false
}

fn is_next_block_semantic(paragraphs: &[String], current_idx: usize) -> bool {
    if current_idx + 1 >= paragraphs.len() {
        return true;
    }
    let next = paragraphs[current_idx + 1].trim();
    if next.is_empty() {
        return false;
    }
    detect_heading(next).is_some() || detect_theorem_like(next).is_some() || detect_references_section(next)
}

static PROOF_TARGET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:proof|sketch)\s+of\s+(theorem\s+\d+(?:\.\d+)*|lemma\s+\d+(?:\.\d+)*|proposition\s+\d+(?:\.\d+)*|corollary\s+\d+(?:\.\d+)*)|chứng minh\s+(định lý\s+\d+(?:\.\d+)*|bổ đề\s+\d+(?:\.\d+)*|mệnh đề\s+\d+(?:\.\d+)*|hệ quả\s+\d+(?:\.\d+)*)|phác thảo chứng minh\s+(định lý\s+\d+(?:\.\d+)*)",
    )
    .unwrap()
});

fn extract_proof_target_label(text: &str) -> Option<String> {
    let caps = PROOF_TARGET_RE.captures(text)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().to_string())
}

fn proof_title_for(text: &str) -> String {
    let prefix: String = text.chars().take(20).collect();
    if prefix.to_lowercase().contains("proof") {
        "Proof".to_string()
    } else {
        "Chứng minh".to_string()
    }
}

/// Extract a semantic node list from an ordered paragraph list.
///
/// A proof block accumulates paragraphs until (a) a paragraph ending with
/// a QED marker closes it, inclusive, or (b) lookahead shows the next
/// paragraph opens a new semantic block, closing it exclusive of that
/// paragraph, or (c) end of input, which the lookahead also treats as a
/// boundary — the last open proof in a document with no trailing QED
/// marker still closes correctly instead of silently absorbing nothing.
pub fn extract_semantic_structure(paragraphs: &[String]) -> Vec<DocNode> {
    let mut nodes = Vec::new();

    let mut in_proof = false;
    let mut proof_paragraphs: Vec<String> = Vec::new();
    let mut proof_title: Option<String> = None;
    let mut proof_explicit_label: Option<String> = None;

    let mut in_theorem = false;
    let mut theorem_paragraphs: Vec<String> = Vec::new();
    let mut theorem_type = DocNodeType::Unknown;
    let mut theorem_title: Option<String> = None;

    let mut in_references = false;
    let mut current_theorem_like: Option<DocNode> = None;

    let mut i = 0usize;
    while i < paragraphs.len() {
        let para = paragraphs[i].trim();
        if para.is_empty() {
            i += 1;
            continue;
        }

        if in_proof {
            if detect_proof_end(para) {
                proof_paragraphs.push(para.to_string());
                let text = proof_paragraphs.join(" ");
                let mut node = DocNode::new(DocNodeType::Proof, text);
                node.title = proof_title.clone();
                if let Some(label) = &proof_explicit_label {
                    node.metadata.insert("explicit_label".to_string(), label.clone());
                }
                if let Some(anchor) = &current_theorem_like {
                    node.metadata
                        .insert("related_to_type".to_string(), format!("{:?}", anchor.node_type));
                    if let Some(t) = &anchor.title {
                        node.metadata.insert("related_to_label".to_string(), t.clone());
                    }
                }
                nodes.push(node);
                in_proof = false;
                proof_paragraphs.clear();
                proof_title = None;
                proof_explicit_label = None;
                i += 1;
                continue;
            } else if is_next_block_semantic(paragraphs, i) {
                let text = proof_paragraphs.join(" ");
                let mut node = DocNode::new(DocNodeType::Proof, text);
                node.title = proof_title.clone();
                if let Some(label) = &proof_explicit_label {
                    node.metadata.insert("explicit_label".to_string(), label.clone());
                }
                if let Some(anchor) = &current_theorem_like {
                    node.metadata
                        .insert("related_to_type".to_string(), format!("{:?}", anchor.node_type));
                    if let Some(t) = &anchor.title {
                        node.metadata.insert("related_to_label".to_string(), t.clone());
                    }
                }
                nodes.push(node);
                in_proof = false;
                proof_paragraphs.clear();
                proof_title = None;
                proof_explicit_label = None;
                // fall through: reprocess this paragraph below
            }
        }

        if in_theorem
            && (detect_heading(para).is_some()
                || detect_theorem_like(para).is_some()
                || detect_proof_start(para)
                || detect_references_section(para))
        {
            let text = theorem_paragraphs.join(" ");
            let mut node = DocNode::new(theorem_type, text);
            node.title = theorem_title.clone();
            nodes.push(node.clone());
            current_theorem_like = Some(node);
            in_theorem = false;
            theorem_paragraphs.clear();
            theorem_title = None;
        }

        if let Some((node_type, title, level)) = detect_heading(para) {
            let mut node = DocNode::new(node_type, para.to_string());
            node.title = Some(title);
            node.level = Some(level);
            nodes.push(node);
            in_references = false;
            i += 1;
            continue;
        }

        if detect_references_section(para) {
            let mut node = DocNode::new(DocNodeType::ReferencesSection, para.to_string());
            node.title = Some("References".to_string());
            nodes.push(node);
            in_references = true;
            i += 1;
            continue;
        }

        if let Some((node_type, title)) = detect_theorem_like(para) {
            in_theorem = true;
            theorem_type = node_type;
            theorem_title = Some(title);
            theorem_paragraphs = vec![para.to_string()];
            i += 1;
            continue;
        }

        if detect_proof_start(para) {
            let explicit_label = extract_proof_target_label(para);
            if detect_proof_end(para) {
                let mut node = DocNode::new(DocNodeType::Proof, para.to_string());
                node.title = Some(proof_title_for(para));
                if let Some(label) = &explicit_label {
                    node.metadata.insert("explicit_label".to_string(), label.clone());
                }
                if let Some(anchor) = &current_theorem_like {
                    node.metadata
                        .insert("related_to_type".to_string(), format!("{:?}", anchor.node_type));
                    if let Some(t) = &anchor.title {
                        node.metadata.insert("related_to_label".to_string(), t.clone());
                    }
                }
                nodes.push(node);
                i += 1;
                continue;
            } else {
                in_proof = true;
                proof_title = Some(proof_title_for(para));
                proof_explicit_label = explicit_label;
                proof_paragraphs = vec![para.to_string()];
                i += 1;
                continue;
            }
        }

        if detect_equation_block(para) {
            nodes.push(DocNode::new(DocNodeType::EquationBlock, para.to_string()));
            i += 1;
            continue;
        }

        if in_proof {
            proof_paragraphs.push(para.to_string());
            i += 1;
            continue;
        }

        if in_theorem {
            theorem_paragraphs.push(para.to_string());
            i += 1;
            continue;
        }

        if in_references {
            nodes.push(DocNode::new(DocNodeType::ReferenceEntry, para.to_string()));
            i += 1;
            continue;
        }

        nodes.push(DocNode::new(DocNodeType::Paragraph, para.to_string()));
        i += 1;
    }

    if in_proof {
        let text = proof_paragraphs.join(" ");
        let mut node = DocNode::new(DocNodeType::Proof, text);
        node.title = proof_title;
        if let Some(label) = &proof_explicit_label {
            node.metadata.insert("explicit_label".to_string(), label.clone());
        }
        if let Some(anchor) = &current_theorem_like {
            node.metadata
                .insert("related_to_type".to_string(), format!("{:?}", anchor.node_type));
            if let Some(t) = &anchor.title {
                node.metadata.insert("related_to_label".to_string(), t.clone());
            }
        }
        nodes.push(node);
    }

    if in_theorem {
        let text = theorem_paragraphs.join(" ");
        let mut node = DocNode::new(theorem_type, text);
        node.title = theorem_title;
        nodes.push(node);
    }

    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paras(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn detects_chapter_heading() {
        let nodes = extract_semantic_structure(&paras(&["Chapter 1: Introduction"]));
        assert_eq!(nodes[0].node_type, DocNodeType::Chapter);
        assert_eq!(nodes[0].level, Some(1));
    }

    #[test]
    fn numbered_section_and_subsection_levels() {
        let nodes = extract_semantic_structure(&paras(&["1. Overview", "1.1 Background"]));
        assert_eq!(nodes[0].node_type, DocNodeType::Section);
        assert_eq!(nodes[1].node_type, DocNodeType::Subsection);
    }

    #[test]
    fn theorem_then_proof_is_anchored() {
        let nodes = extract_semantic_structure(&paras(&[
            "Theorem 1.1. Every compact set is closed.",
            "More theorem detail continues here.",
            "Proof. Let K be compact. QED",
        ]));
        assert_eq!(nodes[0].node_type, DocNodeType::Theorem);
        assert_eq!(nodes[0].title.as_deref(), Some("Theorem 1.1"));
        let proof = nodes.iter().find(|n| n.node_type == DocNodeType::Proof).unwrap();
        assert_eq!(proof.metadata.get("related_to_label").map(|s| s.as_str()), Some("Theorem 1.1"));
    }

    #[test]
    fn explicit_proof_of_label_is_extracted() {
        let nodes = extract_semantic_structure(&paras(&["Proof of Theorem 4.2. We now show the claim. QED"]));
        let proof = nodes.iter().find(|n| n.node_type == DocNodeType::Proof).unwrap();
        assert_eq!(proof.metadata.get("explicit_label").map(|s| s.as_str()), Some("Theorem 4.2"));
    }

    #[test]
    fn test_proof_lookahead_truncation() {
        // No QED marker anywhere in the document. End-of-input counts as a
        // semantic boundary for the lookahead, so the proof closes
        // *before* absorbing the final paragraph: that paragraph falls
        // through and is re-processed as a plain paragraph in its own
        // right, not appended to the proof. This mirrors the reference
        // extractor's lookahead exactly (`_is_next_block_semantic`
        // returns true at end of input), not an approximation of it.
        let nodes = extract_semantic_structure(&paras(&[
            "Theorem 2.1. Statement here.",
            "Proof. Suppose not.",
            "Then a contradiction follows from the assumption.",
        ]));
        let proof = nodes.iter().find(|n| n.node_type == DocNodeType::Proof).unwrap();
        assert_eq!(proof.text, "Proof. Suppose not.");
        assert!(!proof.text.contains("contradiction"));
        let trailing = nodes.last().unwrap();
        assert_eq!(trailing.node_type, DocNodeType::Paragraph);
        assert!(trailing.text.contains("contradiction"));
    }

    #[test]
    fn proof_ends_before_next_heading_via_lookahead() {
        let nodes = extract_semantic_structure(&paras(&[
            "Proof. Suppose not.",
            "Chapter 2: Next Topic",
        ]));
        assert_eq!(nodes[0].node_type, DocNodeType::Proof);
        assert_eq!(nodes[0].text, "Proof. Suppose not.");
        assert_eq!(nodes[1].node_type, DocNodeType::Chapter);
    }

    #[test]
    fn equation_block_detected_by_display_delimiter() {
        let nodes = extract_semantic_structure(&paras(&["$$ a + b = c $$"]));
        assert_eq!(nodes[0].node_type, DocNodeType::EquationBlock);
    }

    #[test]
    fn references_section_entries_are_tagged() {
        let nodes = extract_semantic_structure(&paras(&["References", "Smith, J. (2020). A paper."]));
        assert_eq!(nodes[0].node_type, DocNodeType::ReferencesSection);
        assert_eq!(nodes[1].node_type, DocNodeType::ReferenceEntry);
    }

    #[test]
    fn plain_paragraph_is_default() {
        let nodes = extract_semantic_structure(&paras(&["Just an ordinary sentence."]));
        assert_eq!(nodes[0].node_type, DocNodeType::Paragraph);
    }

    #[test]
    fn proof_keyword_blocks_all_caps_heading_heuristic() {
        let nodes = extract_semantic_structure(&paras(&["PROOF OF CONCEPT"]));
        assert_ne!(nodes[0].node_type, DocNodeType::Section);
    }
}
