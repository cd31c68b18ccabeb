//! Named style table shared by every renderer (C10).
//!
//! Grounded on spec §4.10: "typography is style-driven ... live in the
//! stylesheet, not in the renderer logic." The stylesheet is built in
//! code from the named-style list in spec §6 rather than parsed out of a
//! `.docx` template's `styles.xml`, since the template files themselves
//! are runtime assets, not part of this crate.

use crate::ast::{Block, HeadingLevel, ParagraphRole};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Paragraph alignment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alignment {
    /// Left-aligned.
    Left,
    /// Centered.
    Center,
    /// Fully justified.
    Justify,
}

/// One named style's typographic attributes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StyleDef {
    /// Font family.
    pub font: String,
    /// Point size.
    pub size_pt: f32,
    /// Bold weight.
    pub bold: bool,
    /// Italic.
    pub italic: bool,
    /// Paragraph alignment.
    pub alignment: Alignment,
    /// Line spacing multiplier.
    pub line_spacing: f32,
    /// Space before, points.
    pub space_before_pt: f32,
    /// Space after, points.
    pub space_after_pt: f32,
    /// First-line indent, points. Negative is not meaningful.
    pub first_line_indent_pt: f32,
    /// Bilateral (left+right) indent, points.
    pub indent_pt: f32,
}

impl Default for StyleDef {
    fn default() -> Self {
        StyleDef {
            font: "Times New Roman".to_string(),
            size_pt: 11.0,
            bold: false,
            italic: false,
            alignment: Alignment::Left,
            line_spacing: 1.15,
            space_before_pt: 0.0,
            space_after_pt: 8.0,
            first_line_indent_pt: 0.0,
            indent_pt: 0.0,
        }
    }
}

/// A named collection of [`StyleDef`]s, one per required style name
/// (spec §6: `APS_Title, APS_Subtitle, APS_Chapter, ..., APS_TOC2`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Stylesheet {
    styles: HashMap<String, StyleDef>,
}

/// Required named styles, in the order spec §6 lists them.
pub const REQUIRED_STYLE_NAMES: &[&str] = &[
    "APS_Title",
    "APS_Subtitle",
    "APS_Chapter",
    "APS_Section",
    "APS_Heading1",
    "APS_Heading2",
    "APS_Heading3",
    "APS_Paragraph",
    "APS_Quote",
    "APS_Code",
    "APS_List",
    "APS_Footnote",
    "APS_TOC1",
    "APS_TOC2",
];

impl Default for Stylesheet {
    fn default() -> Self {
        let mut styles = HashMap::new();
        styles.insert("APS_Title".to_string(), StyleDef { size_pt: 28.0, bold: true, alignment: Alignment::Center, space_after_pt: 24.0, ..Default::default() });
        styles.insert("APS_Subtitle".to_string(), StyleDef { size_pt: 16.0, italic: true, alignment: Alignment::Center, space_after_pt: 18.0, ..Default::default() });
        styles.insert("APS_Chapter".to_string(), StyleDef { size_pt: 22.0, bold: true, space_before_pt: 36.0, space_after_pt: 18.0, ..Default::default() });
        styles.insert("APS_Section".to_string(), StyleDef { size_pt: 16.0, bold: true, space_before_pt: 18.0, space_after_pt: 10.0, ..Default::default() });
        styles.insert("APS_Heading1".to_string(), StyleDef { size_pt: 18.0, bold: true, space_before_pt: 24.0, space_after_pt: 12.0, ..Default::default() });
        styles.insert("APS_Heading2".to_string(), StyleDef { size_pt: 15.0, bold: true, space_before_pt: 16.0, space_after_pt: 10.0, ..Default::default() });
        styles.insert("APS_Heading3".to_string(), StyleDef { size_pt: 13.0, bold: true, italic: true, space_before_pt: 12.0, space_after_pt: 8.0, ..Default::default() });
        styles.insert("APS_Paragraph".to_string(), StyleDef { alignment: Alignment::Justify, first_line_indent_pt: 18.0, ..Default::default() });
        styles.insert("APS_Quote".to_string(), StyleDef { italic: true, indent_pt: 36.0, ..Default::default() });
        styles.insert("APS_Code".to_string(), StyleDef { font: "Courier New".to_string(), indent_pt: 18.0, ..Default::default() });
        styles.insert("APS_List".to_string(), StyleDef { indent_pt: 18.0, ..Default::default() });
        styles.insert("APS_Footnote".to_string(), StyleDef { size_pt: 9.0, ..Default::default() });
        styles.insert("APS_TOC1".to_string(), StyleDef { bold: true, space_before_pt: 6.0, ..Default::default() });
        styles.insert("APS_TOC2".to_string(), StyleDef { indent_pt: 18.0, space_before_pt: 3.0, ..Default::default() });
        Stylesheet { styles }
    }
}

impl Stylesheet {
    /// Look up a style by name, falling back to `APS_Paragraph` for an
    /// unrecognized name rather than panicking.
    pub fn get(&self, name: &str) -> &StyleDef {
        self.styles
            .get(name)
            .or_else(|| self.styles.get("APS_Paragraph"))
            .expect("APS_Paragraph style is always present")
    }

    /// All style names this sheet defines.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.styles.keys().map(|s| s.as_str())
    }

    /// Clone this sheet with the named template's overrides applied on
    /// top (spec §4.10: "templates carry pre-defined named styles").
    /// Unknown template names (including `"default"`) return an unmodified
    /// clone.
    pub fn for_template(&self, template_name: &str) -> Stylesheet {
        let mut sheet = self.clone();
        match template_name {
            "book" => {
                sheet.styles.insert(
                    "APS_Chapter".to_string(),
                    StyleDef { font: "Garamond".to_string(), size_pt: 24.0, bold: true, alignment: Alignment::Center, space_before_pt: 72.0, space_after_pt: 24.0, ..Default::default() },
                );
                sheet.styles.insert(
                    "APS_Paragraph".to_string(),
                    StyleDef { font: "Garamond".to_string(), alignment: Alignment::Justify, first_line_indent_pt: 18.0, ..Default::default() },
                );
            }
            "academic" => {
                sheet.styles.insert(
                    "APS_Paragraph".to_string(),
                    StyleDef { font: "Times New Roman".to_string(), line_spacing: 2.0, first_line_indent_pt: 0.0, ..Default::default() },
                );
                sheet.styles.insert(
                    "APS_Chapter".to_string(),
                    StyleDef { font: "Times New Roman".to_string(), size_pt: 14.0, bold: true, alignment: Alignment::Left, space_before_pt: 12.0, space_after_pt: 8.0, ..Default::default() },
                );
            }
            "report" => {
                sheet.styles.insert(
                    "APS_Chapter".to_string(),
                    StyleDef { font: "Calibri".to_string(), size_pt: 18.0, bold: true, space_before_pt: 18.0, space_after_pt: 12.0, ..Default::default() },
                );
                sheet.styles.insert(
                    "APS_Paragraph".to_string(),
                    StyleDef { font: "Calibri".to_string(), ..Default::default() },
                );
            }
            _ => {}
        }
        sheet
    }
}

/// Map a rendering [`Block`] to the named style that renders it.
pub fn style_name_for(block: &Block) -> &'static str {
    match block {
        Block::Heading { level: HeadingLevel::H1, .. } => "APS_Chapter",
        Block::Heading { level: HeadingLevel::H2, .. } => "APS_Section",
        Block::Heading { level: HeadingLevel::H3, .. } => "APS_Heading3",
        Block::Paragraph { role: ParagraphRole::FirstParagraph, .. } => "APS_Paragraph",
        Block::Paragraph { .. } => "APS_Paragraph",
        Block::Equation { .. } => "APS_Code",
        Block::TheoremBox { .. } => "APS_Paragraph",
        Block::ProofBox { .. } => "APS_Paragraph",
        Block::Blockquote { .. } => "APS_Quote",
        Block::Epigraph { .. } => "APS_Quote",
        Block::SceneBreak { .. } => "APS_Paragraph",
        Block::ReferenceEntry { .. } => "APS_List",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_required_style_name_resolves() {
        let sheet = Stylesheet::default();
        for name in REQUIRED_STYLE_NAMES {
            assert!(sheet.names().any(|n| n == *name), "missing style {name}");
        }
    }

    #[test]
    fn unknown_style_name_falls_back_to_paragraph() {
        let sheet = Stylesheet::default();
        let fallback = sheet.get("APS_DoesNotExist");
        assert_eq!(fallback, sheet.get("APS_Paragraph"));
    }

    #[test]
    fn book_template_overrides_chapter_style_differently_from_academic() {
        let base = Stylesheet::default();
        let book = base.for_template("book");
        let academic = base.for_template("academic");
        assert_ne!(book.get("APS_Chapter"), academic.get("APS_Chapter"));
        assert_ne!(book.get("APS_Chapter"), base.get("APS_Chapter"));
    }

    #[test]
    fn unknown_template_name_leaves_styles_unchanged() {
        let base = Stylesheet::default();
        let other = base.for_template("default");
        assert_eq!(base, other);
    }

    #[test]
    fn chapter_heading_maps_to_chapter_style() {
        let block = Block::Heading { level: HeadingLevel::H1, text: "One".to_string(), number: None };
        assert_eq!(style_name_for(&block), "APS_Chapter");
    }
}
