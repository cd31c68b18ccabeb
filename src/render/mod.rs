//! Output rendering (C10): AST to DOCX/PDF/EPUB, over a shared template
//! cache and stylesheet. Grounded on spec §4.10.

mod docx;
mod epub;
mod pdf;
mod stylesheet;
mod template_cache;

pub use stylesheet::{style_name_for, Alignment, StyleDef, Stylesheet, REQUIRED_STYLE_NAMES};
pub use template_cache::{TemplateCache, TEMPLATE_NAMES};

use crate::ast::DocumentAst;
use crate::error::RenderError;

/// Output container format a [`Renderer`] writes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Primary format: Word-compatible OOXML.
    Docx,
    /// Portable Document Format.
    Pdf,
    /// EPUB 3 e-book.
    Epub,
}

/// Unifies the three output renderers behind one call.
pub struct Renderer<'a> {
    templates: &'a TemplateCache,
    stylesheet: &'a Stylesheet,
}

impl<'a> Renderer<'a> {
    /// Build a renderer over a template cache and stylesheet, both
    /// expected to outlive every render call (they are read-mostly,
    /// built once per spec §5).
    pub fn new(templates: &'a TemplateCache, stylesheet: &'a Stylesheet) -> Self {
        Renderer { templates, stylesheet }
    }

    /// Render `ast` to `format`, selecting `template_name` when the
    /// format honors named templates (currently DOCX only).
    pub fn render(&self, ast: &DocumentAst, format: OutputFormat, template_name: &str) -> Result<Vec<u8>, RenderError> {
        match format {
            OutputFormat::Docx => docx::render_docx(ast, self.stylesheet, self.templates, template_name),
            OutputFormat::Pdf => pdf::render_pdf(ast, self.stylesheet),
            OutputFormat::Epub => epub::render_epub(ast),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Block, DocumentMetadata, HeadingLevel, ParagraphRole};

    fn sample() -> DocumentAst {
        DocumentAst {
            metadata: DocumentMetadata { title: Some("T".to_string()), ..Default::default() },
            blocks: vec![
                Block::Heading { level: HeadingLevel::H1, text: "One".to_string(), number: None },
                Block::Paragraph { text: "Body.".to_string(), role: ParagraphRole::FirstParagraph },
            ],
        }
    }

    #[test]
    fn all_three_formats_render_without_error() {
        let templates = TemplateCache::with_builtin_default();
        let stylesheet = Stylesheet::default();
        let renderer = Renderer::new(&templates, &stylesheet);
        let ast = sample();
        for format in [OutputFormat::Docx, OutputFormat::Pdf, OutputFormat::Epub] {
            let bytes = renderer.render(&ast, format, "default").unwrap();
            assert!(!bytes.is_empty());
        }
    }
}
