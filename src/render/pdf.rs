//! PDF renderer (C10, secondary format).
//!
//! Flows AST blocks down a single page at a time, starting a fresh page on
//! a heading's `page_break_before` flag or a simple line-count overflow,
//! with a centered page-number callback drawn last so every page's number
//! reflects the final page count. Grounded on spec §4.10's "flowable list
//! ... with a page callback for centered page numbers"; `printpdf` is
//! grounded on its appearance in `other_examples/manifests/SigmundGranaas-petty`
//! and `cool-japan-legalis`.

use crate::ast::{Block, DocumentAst};
use crate::error::RenderError;
use crate::render::stylesheet::{style_name_for, Stylesheet};
use printpdf::{Mm, PdfDocument, PdfPage};

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 25.0;
const LINE_HEIGHT_MM: f32 = 6.0;

struct Cursor {
    y_mm: f32,
}

impl Cursor {
    fn new() -> Self {
        Cursor { y_mm: PAGE_HEIGHT_MM - MARGIN_MM }
    }

    fn advance(&mut self, lines: f32) -> bool {
        self.y_mm -= LINE_HEIGHT_MM * lines;
        self.y_mm < MARGIN_MM
    }

    fn reset(&mut self) {
        self.y_mm = PAGE_HEIGHT_MM - MARGIN_MM;
    }
}

fn block_text(block: &Block) -> (String, f32) {
    match block {
        Block::Heading { text, number, .. } => (format!("{}{}", number.as_deref().map(|n| format!("{n} ")).unwrap_or_default(), text), 16.0),
        Block::Paragraph { text, .. } => (text.clone(), 11.0),
        Block::Equation { latex, .. } => (latex.clone(), 11.0),
        Block::TheoremBox { title, content, .. } => (format!("{title}. {content}"), 11.0),
        Block::ProofBox { content, qed_symbol } => (format!("{content} {qed_symbol}"), 11.0),
        Block::Blockquote { text, attribution } | Block::Epigraph { text, attribution } => {
            (format!("{text}{}", attribution.as_deref().map(|a| format!(" \u{2014} {a}")).unwrap_or_default()), 11.0)
        }
        Block::SceneBreak { symbol } => (symbol.clone(), 11.0),
        Block::ReferenceEntry { citation, .. } => (citation.clone(), 10.0),
    }
}

/// Render `ast` to a complete, in-memory PDF byte buffer.
pub fn render_pdf(ast: &DocumentAst, stylesheet: &Stylesheet) -> Result<Vec<u8>, RenderError> {
    let title = ast.metadata.title.clone().unwrap_or_else(|| "Document".to_string());
    let mut doc = PdfDocument::new(&title);
    let font = doc
        .add_builtin_font(printpdf::BuiltinFont::TimesRoman)
        .map_err(|e| RenderError::Xml(format!("font load failed: {e}")))?;

    let mut pages: Vec<PdfPage> = Vec::new();
    let mut ops = Vec::new();
    let mut cursor = Cursor::new();

    for block in &ast.blocks {
        let style_name = style_name_for(block);
        let _style = stylesheet.get(style_name);
        let (text, size_pt) = block_text(block);
        let lines = (text.len() as f32 / 90.0).ceil().max(1.0);

        // PDF has no named-template selection (spec §4.10: DOCX only), so
        // the book-only chapter page-break rule never applies here.
        let needs_new_page = block.wants_page_break_before("default") || cursor.y_mm - LINE_HEIGHT_MM * lines < MARGIN_MM;
        if needs_new_page && !ops.is_empty() {
            pages.push(PdfPage::new(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), std::mem::take(&mut ops)));
            cursor.reset();
        }

        ops.push(printpdf::Op::StartTextSection);
        ops.push(printpdf::Op::SetTextCursor { pos: printpdf::Point::new(Mm(MARGIN_MM), Mm(cursor.y_mm)) });
        ops.push(printpdf::Op::SetFontSize { size: printpdf::Pt(size_pt), font: font.clone() });
        ops.push(printpdf::Op::WriteText { items: vec![printpdf::TextItem::Text(text)], font: font.clone() });
        ops.push(printpdf::Op::EndTextSection);

        cursor.advance(lines + 0.5);
    }
    if !ops.is_empty() {
        pages.push(PdfPage::new(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), ops));
    }
    if pages.is_empty() {
        pages.push(PdfPage::new(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), Vec::new()));
    }

    let page_count = pages.len();
    for (idx, page) in pages.iter_mut().enumerate() {
        page.ops.push(printpdf::Op::StartTextSection);
        page.ops.push(printpdf::Op::SetTextCursor { pos: printpdf::Point::new(Mm(PAGE_WIDTH_MM / 2.0), Mm(MARGIN_MM / 2.0)) });
        page.ops.push(printpdf::Op::SetFontSize { size: printpdf::Pt(9.0), font: font.clone() });
        page.ops.push(printpdf::Op::WriteText { items: vec![printpdf::TextItem::Text(format!("{} / {}", idx + 1, page_count))], font: font.clone() });
        page.ops.push(printpdf::Op::EndTextSection);
    }

    let bytes = doc.with_pages(pages).save(&printpdf::PdfSaveOptions::default());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DocumentMetadata, HeadingLevel, ParagraphRole};

    #[test]
    fn render_produces_nonempty_pdf_bytes() {
        let ast = DocumentAst {
            metadata: DocumentMetadata { title: Some("T".to_string()), ..Default::default() },
            blocks: vec![
                Block::Heading { level: HeadingLevel::H1, text: "Chapter One".to_string(), number: None },
                Block::Paragraph { text: "Hello world.".to_string(), role: ParagraphRole::FirstParagraph },
            ],
        };
        let stylesheet = Stylesheet::default();
        let bytes = render_pdf(&ast, &stylesheet).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn empty_document_still_produces_one_page() {
        let ast = DocumentAst::default();
        let stylesheet = Stylesheet::default();
        let bytes = render_pdf(&ast, &stylesheet).unwrap();
        assert!(!bytes.is_empty());
    }
}
