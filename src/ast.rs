//! Rendering AST builder (C9).
//!
//! Converts a [`DocNode`](crate::semantic::DocNode) list into an ordered
//! list of [`Block`]s ready for a renderer, tracking a single
//! "last block broke paragraph flow" bit across the walk so the first
//! paragraph after a heading or scene break gets `FirstParagraph` styling.
//! Grounded on `ASTBuilder.build` / `_convert_*`.

use crate::semantic::{DocNode, DocNodeType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Heading rank (spec §3).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadingLevel {
    /// Chapter-level.
    H1,
    /// Section-level.
    H2,
    /// Subsection-level.
    H3,
}

/// Paragraph role driving indent/style (spec §3).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParagraphRole {
    /// Ordinary body paragraph.
    Body,
    /// First paragraph after a heading or scene break: no first-line indent.
    FirstParagraph,
    /// A line of dialogue.
    Dialogue,
}

/// Equation rendering mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquationMode {
    /// Inline, within a paragraph's flow.
    Inline,
    /// Centered, standalone display equation.
    Display,
}

/// Theorem-like box kind (spec §3).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TheoremType {
    /// Theorem.
    Theorem,
    /// Lemma.
    Lemma,
    /// Proposition.
    Proposition,
    /// Corollary.
    Corollary,
    /// Definition.
    Definition,
    /// Worked example.
    Example,
    /// Remark.
    Remark,
}

impl TheoremType {
    fn label(self) -> &'static str {
        match self {
            TheoremType::Theorem => "Theorem",
            TheoremType::Lemma => "Lemma",
            TheoremType::Proposition => "Proposition",
            TheoremType::Corollary => "Corollary",
            TheoremType::Definition => "Definition",
            TheoremType::Example => "Example",
            TheoremType::Remark => "Remark",
        }
    }
}

/// A rendering-oriented document block (spec §3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Block {
    /// Section/chapter heading.
    Heading {
        /// Rank.
        level: HeadingLevel,
        /// Heading text.
        text: String,
        /// Optional display number.
        number: Option<String>,
    },
    /// Ordinary body text.
    Paragraph {
        /// Paragraph text.
        text: String,
        /// Styling role.
        role: ParagraphRole,
    },
    /// A standalone or inline equation.
    Equation {
        /// LaTeX source, delimiters stripped.
        latex: String,
        /// Rendering mode.
        mode: EquationMode,
        /// Optional display number.
        number: Option<String>,
        /// OMML XML, present only when `preserve_omml` was requested and
        /// the source node carried it.
        omml_xml: Option<String>,
    },
    /// A boxed theorem-like statement.
    TheoremBox {
        /// Kind of box.
        theorem_type: TheoremType,
        /// Display title.
        title: String,
        /// Statement body.
        content: String,
        /// Optional display number.
        number: Option<String>,
    },
    /// A boxed proof.
    ProofBox {
        /// Proof body.
        content: String,
        /// Terminal QED mark.
        qed_symbol: String,
    },
    /// A quoted block.
    Blockquote {
        /// Quoted text.
        text: String,
        /// Optional attribution.
        attribution: Option<String>,
    },
    /// A chapter-opening epigraph.
    Epigraph {
        /// Epigraph text.
        text: String,
        /// Optional attribution.
        attribution: Option<String>,
    },
    /// A scene separator.
    SceneBreak {
        /// Separator glyph, `"* * *"` by default.
        symbol: String,
    },
    /// One references-section entry.
    ReferenceEntry {
        /// Citation text.
        citation: String,
        /// Optional citation key.
        key: Option<String>,
    },
}

impl Block {
    /// Whether this block's `page_break_before` flag should be set:
    /// chapter headings, and only under the `book` template (spec §4.10).
    pub fn wants_page_break_before(&self, template_name: &str) -> bool {
        template_name == "book" && matches!(self, Block::Heading { level: HeadingLevel::H1, .. })
    }
}

/// Document-level metadata threaded through to the renderer.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    /// Document title.
    pub title: Option<String>,
    /// Named template/layout mode (`"book"`, `"academic"`, or unset for
    /// default).
    pub layout_mode: Option<String>,
    /// Free-form extra fields.
    pub extra: HashMap<String, String>,
}

/// A built document, ready for a renderer.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentAst {
    /// Document metadata.
    pub metadata: DocumentMetadata,
    /// Render-order block sequence. No block references another by index.
    pub blocks: Vec<Block>,
}

impl DocumentAst {
    /// Count of heading blocks.
    pub fn heading_count(&self) -> usize {
        self.blocks.iter().filter(|b| matches!(b, Block::Heading { .. })).count()
    }

    /// Count of equation blocks.
    pub fn equation_count(&self) -> usize {
        self.blocks.iter().filter(|b| matches!(b, Block::Equation { .. })).count()
    }
}

/// Walks a semantic node list and emits a [`DocumentAst`], tracking the
/// single "previous block broke paragraph flow" bit (spec §4.9).
pub struct AstBuilder {
    last_block_breaks_flow: bool,
}

impl Default for AstBuilder {
    fn default() -> Self {
        AstBuilder {
            last_block_breaks_flow: true,
        }
    }
}

impl AstBuilder {
    /// Build a fresh builder (start-of-document counts as a flow break).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a [`DocumentAst`] from `nodes`. `preserve_omml` controls
    /// whether an equation node's `omml_xml` metadata key is copied
    /// through to the emitted block.
    pub fn build(&mut self, nodes: &[DocNode], metadata: DocumentMetadata, preserve_omml: bool) -> DocumentAst {
        let mut blocks = Vec::with_capacity(nodes.len());
        for node in nodes {
            if let Some(block) = self.convert_node(node, preserve_omml) {
                blocks.push(block);
            }
        }
        DocumentAst { metadata, blocks }
    }

    fn convert_node(&mut self, node: &DocNode, preserve_omml: bool) -> Option<Block> {
        if node.node_type.is_heading() {
            return Some(self.convert_heading(node));
        }
        match node.node_type {
            DocNodeType::Paragraph => Some(self.convert_paragraph(node)),
            DocNodeType::Blockquote => Some(self.convert_blockquote(node)),
            DocNodeType::Epigraph => Some(self.convert_epigraph(node)),
            DocNodeType::SceneBreak => Some(self.convert_scene_break(node)),
            DocNodeType::Proof => Some(self.convert_proof(node)),
            DocNodeType::EquationBlock => Some(self.convert_equation(node, preserve_omml)),
            DocNodeType::ReferenceEntry => Some(self.convert_reference(node)),
            _ if node.node_type.is_theorem_like() => Some(self.convert_theorem(node)),
            _ => {
                tracing::warn!(node_type = ?node.node_type, "skipping unsupported node type in AST build");
                None
            }
        }
    }

    fn convert_heading(&mut self, node: &DocNode) -> Block {
        self.last_block_breaks_flow = true;
        let level = match node.level {
            Some(1) => HeadingLevel::H1,
            Some(2) => HeadingLevel::H2,
            _ => HeadingLevel::H3,
        };
        Block::Heading {
            level,
            text: node.text.clone(),
            number: node.metadata.get("number").cloned(),
        }
    }

    fn convert_paragraph(&mut self, node: &DocNode) -> Block {
        let role = if node.metadata.get("is_first_paragraph").map(|v| v == "true").unwrap_or(false) {
            ParagraphRole::FirstParagraph
        } else if node.metadata.get("role").map(|v| v == "dialogue").unwrap_or(false) {
            ParagraphRole::Dialogue
        } else if self.last_block_breaks_flow {
            ParagraphRole::FirstParagraph
        } else {
            ParagraphRole::Body
        };
        self.last_block_breaks_flow = false;
        Block::Paragraph {
            text: node.text.clone(),
            role,
        }
    }

    fn convert_blockquote(&mut self, node: &DocNode) -> Block {
        Block::Blockquote {
            text: node.text.clone(),
            attribution: node.metadata.get("attribution").cloned(),
        }
    }

    fn convert_epigraph(&mut self, node: &DocNode) -> Block {
        Block::Epigraph {
            text: node.text.clone(),
            attribution: node.metadata.get("attribution").cloned(),
        }
    }

    fn convert_scene_break(&mut self, node: &DocNode) -> Block {
        self.last_block_breaks_flow = true;
        let symbol = if node.text.trim().is_empty() {
            "* * *".to_string()
        } else {
            node.text.clone()
        };
        Block::SceneBreak { symbol }
    }

    fn convert_theorem(&mut self, node: &DocNode) -> Block {
        let theorem_type = match node.node_type {
            DocNodeType::Theorem => TheoremType::Theorem,
            DocNodeType::Lemma => TheoremType::Lemma,
            DocNodeType::Proposition => TheoremType::Proposition,
            DocNodeType::Corollary => TheoremType::Corollary,
            DocNodeType::Definition => TheoremType::Definition,
            DocNodeType::Example => TheoremType::Example,
            _ => TheoremType::Remark,
        };
        let title = node
            .title
            .clone()
            .unwrap_or_else(|| theorem_type.label().to_string());
        Block::TheoremBox {
            theorem_type,
            title,
            content: node.text.clone(),
            number: node.metadata.get("number").cloned(),
        }
    }

    fn convert_proof(&mut self, node: &DocNode) -> Block {
        let qed_symbol = node
            .metadata
            .get("qed_symbol")
            .cloned()
            .unwrap_or_else(|| "\u{25A1}".to_string());
        Block::ProofBox {
            content: node.text.clone(),
            qed_symbol,
        }
    }

    fn convert_equation(&mut self, node: &DocNode, preserve_omml: bool) -> Block {
        let trimmed = node.text.trim();
        let (mode, latex) = if trimmed.starts_with("$$") && trimmed.ends_with("$$") && trimmed.len() >= 4 {
            (EquationMode::Display, trimmed[2..trimmed.len() - 2].trim().to_string())
        } else if trimmed.starts_with('$') && trimmed.ends_with('$') && trimmed.len() >= 2 {
            (EquationMode::Inline, trimmed[1..trimmed.len() - 1].trim().to_string())
        } else {
            // Neither `$...$` nor `$$...$$`: likely a bare environment block
            // (`\begin{align}...\end{align}`) or an undelimited expression.
            // Defer to the splitter's confidence classification rather than
            // assuming the whole span is a clean equation.
            let split = crate::latex::split_latex_equations(trimmed);
            if split.is_confident && split.equation_segments.len() == 1 {
                (EquationMode::Display, split.equation_segments[0].clone())
            } else {
                if !split.is_confident {
                    tracing::debug!(
                        reason = split.reason.as_deref().unwrap_or("unknown"),
                        "equation block is not a single clean LaTeX expression"
                    );
                }
                (EquationMode::Display, trimmed.to_string())
            }
        };
        let omml_xml = if preserve_omml {
            node.metadata.get("omml_xml").cloned()
        } else {
            None
        };
        Block::Equation {
            latex,
            mode,
            number: node.metadata.get("equation_number").cloned(),
            omml_xml,
        }
    }

    fn convert_reference(&mut self, node: &DocNode) -> Block {
        Block::ReferenceEntry {
            citation: node.text.clone(),
            key: node.metadata.get("citation_key").cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::DocNode;

    fn node(node_type: DocNodeType, text: &str) -> DocNode {
        DocNode {
            node_type,
            text: text.to_string(),
            title: None,
            level: None,
            children: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn heading_sets_flow_break_and_maps_level() {
        let mut h = node(DocNodeType::Chapter, "Chapter 1");
        h.level = Some(1);
        let mut builder = AstBuilder::new();
        let ast = builder.build(&[h], DocumentMetadata::default(), false);
        assert!(matches!(ast.blocks[0], Block::Heading { level: HeadingLevel::H1, .. }));
    }

    #[test]
    fn paragraph_after_heading_is_first_paragraph() {
        let mut h = node(DocNodeType::Chapter, "Chapter 1");
        h.level = Some(1);
        let p1 = node(DocNodeType::Paragraph, "First.");
        let p2 = node(DocNodeType::Paragraph, "Second.");
        let mut builder = AstBuilder::new();
        let ast = builder.build(&[h, p1, p2], DocumentMetadata::default(), false);
        assert!(matches!(ast.blocks[1], Block::Paragraph { role: ParagraphRole::FirstParagraph, .. }));
        assert!(matches!(ast.blocks[2], Block::Paragraph { role: ParagraphRole::Body, .. }));
    }

    #[test]
    fn display_equation_strips_double_dollar_delimiters() {
        let eq = node(DocNodeType::EquationBlock, "$$ a + b = c $$");
        let mut builder = AstBuilder::new();
        let ast = builder.build(&[eq], DocumentMetadata::default(), false);
        match &ast.blocks[0] {
            Block::Equation { latex, mode, .. } => {
                assert_eq!(latex, "a + b = c");
                assert_eq!(*mode, EquationMode::Display);
            }
            _ => panic!("expected Equation"),
        }
    }

    #[test]
    fn bare_environment_block_keeps_begin_end_intact() {
        let eq = node(DocNodeType::EquationBlock, "\\begin{align} a &= b \\\\ c &= d \\end{align}");
        let mut builder = AstBuilder::new();
        let ast = builder.build(&[eq], DocumentMetadata::default(), false);
        match &ast.blocks[0] {
            Block::Equation { latex, mode, .. } => {
                assert!(latex.starts_with("\\begin{align}"));
                assert_eq!(*mode, EquationMode::Display);
            }
            _ => panic!("expected Equation"),
        }
    }

    #[test]
    fn unconfident_bare_span_falls_back_to_verbatim_text() {
        let eq = node(DocNodeType::EquationBlock, "Given x we have x squared");
        let mut builder = AstBuilder::new();
        let ast = builder.build(&[eq], DocumentMetadata::default(), false);
        match &ast.blocks[0] {
            Block::Equation { latex, .. } => assert_eq!(latex, "Given x we have x squared"),
            _ => panic!("expected Equation"),
        }
    }

    #[test]
    fn omml_preserved_only_when_requested() {
        let mut eq = node(DocNodeType::EquationBlock, "$a=b$");
        eq.metadata.insert("omml_xml".to_string(), "<m:oMath/>".to_string());
        let mut builder = AstBuilder::new();
        let ast = builder.build(&[eq.clone()], DocumentMetadata::default(), true);
        match &ast.blocks[0] {
            Block::Equation { omml_xml, .. } => assert_eq!(omml_xml.as_deref(), Some("<m:oMath/>")),
            _ => panic!("expected Equation"),
        }
        let mut builder2 = AstBuilder::new();
        let ast2 = builder2.build(&[eq], DocumentMetadata::default(), false);
        match &ast2.blocks[0] {
            Block::Equation { omml_xml, .. } => assert!(omml_xml.is_none()),
            _ => panic!("expected Equation"),
        }
    }

    #[test]
    fn theorem_title_falls_back_to_type_label() {
        let t = node(DocNodeType::Lemma, "Body text.");
        let mut builder = AstBuilder::new();
        let ast = builder.build(&[t], DocumentMetadata::default(), false);
        match &ast.blocks[0] {
            Block::TheoremBox { title, theorem_type, .. } => {
                assert_eq!(title, "Lemma");
                assert_eq!(*theorem_type, TheoremType::Lemma);
            }
            _ => panic!("expected TheoremBox"),
        }
    }

    #[test]
    fn proof_defaults_qed_symbol() {
        let p = node(DocNodeType::Proof, "Proof body.");
        let mut builder = AstBuilder::new();
        let ast = builder.build(&[p], DocumentMetadata::default(), false);
        match &ast.blocks[0] {
            Block::ProofBox { qed_symbol, .. } => assert_eq!(qed_symbol, "\u{25A1}"),
            _ => panic!("expected ProofBox"),
        }
    }

    #[test]
    fn empty_scene_break_text_defaults_to_stars() {
        let s = node(DocNodeType::SceneBreak, "");
        let mut builder = AstBuilder::new();
        let ast = builder.build(&[s], DocumentMetadata::default(), false);
        match &ast.blocks[0] {
            Block::SceneBreak { symbol } => assert_eq!(symbol, "* * *"),
            _ => panic!("expected SceneBreak"),
        }
    }

    #[test]
    fn unknown_node_type_is_skipped() {
        let u = node(DocNodeType::Unknown, "mystery");
        let mut builder = AstBuilder::new();
        let ast = builder.build(&[u], DocumentMetadata::default(), false);
        assert!(ast.blocks.is_empty());
    }
}
