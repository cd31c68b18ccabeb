//! DOCX renderer (C10, primary format).
//!
//! Writes a minimal, valid OOXML word-processing document: one
//! `<w:p>` per AST block, referencing named paragraph styles defined in
//! `word/styles.xml`, wrapped in the standard DOCX zip container. Grounded
//! on the `zip` + `quick-xml` pairing used for OOXML-style packaging in
//! `other_examples/manifests/kerlomz-MuggleTranslator`'s translation-domain
//! Cargo.toml; the rendering-rule sequence (style lookup, page-break flag,
//! OMML-or-fallback equations) follows spec §4.10 directly.

use crate::ast::{Block, DocumentAst, EquationMode};
use crate::error::RenderError;
use crate::render::stylesheet::{style_name_for, Stylesheet};
use crate::render::template_cache::TemplateCache;
use quick_xml::escape::escape;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Marker paragraph the rendering rules strip if present (spec §4.10).
const CONTENT_START_MARKER: &str = "{{APS_CONTENT_START}}";

/// Render `ast` to a complete, in-memory `.docx` byte buffer.
///
/// `template_name` selects the named template whose cached bytes seed the
/// package's existence check, and whose named-style overrides are applied
/// on top of `stylesheet` (the cached template bytes themselves are an
/// opaque upstream `.docx` and are not parsed back apart; per-template
/// typography lives in [`Stylesheet::for_template`] instead). It also
/// gates the book-only page-break-before-chapter rule.
pub fn render_docx(ast: &DocumentAst, stylesheet: &Stylesheet, templates: &TemplateCache, template_name: &str) -> Result<Vec<u8>, RenderError> {
    templates.get(template_name)?;
    let stylesheet = stylesheet.for_template(template_name);

    let buf = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(buf);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    write_part(&mut zip, &options, "[Content_Types].xml", content_types_xml().as_bytes())?;
    write_part(&mut zip, &options, "_rels/.rels", package_rels_xml().as_bytes())?;
    write_part(&mut zip, &options, "docProps/core.xml", core_props_xml(&ast.metadata.title).as_bytes())?;
    write_part(&mut zip, &options, "docProps/app.xml", app_props_xml().as_bytes())?;
    write_part(&mut zip, &options, "word/_rels/document.xml.rels", document_rels_xml().as_bytes())?;
    write_part(&mut zip, &options, "word/styles.xml", styles_xml(&stylesheet).as_bytes())?;
    write_part(&mut zip, &options, "word/document.xml", document_xml(ast, template_name).as_bytes())?;

    let cursor = zip.finish().map_err(|e| RenderError::Archive(e.to_string()))?;
    Ok(cursor.into_inner())
}

fn write_part<W: Write + std::io::Seek>(zip: &mut ZipWriter<W>, options: &SimpleFileOptions, name: &str, bytes: &[u8]) -> Result<(), RenderError> {
    zip.start_file(name, *options).map_err(|e| RenderError::Archive(e.to_string()))?;
    zip.write_all(bytes)?;
    Ok(())
}

fn content_types_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
  <Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>
  <Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
  <Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>
</Types>"#
        .to_string()
}

fn package_rels_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#
        .to_string()
}

fn document_rels_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#
        .to_string()
}

fn core_props_xml(title: &Option<String>) -> String {
    let title = title.clone().unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <dc:title>{}</dc:title>
</cp:coreProperties>"#,
        escape(&title)
    )
}

fn app_props_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties">
  <Application>aps-core</Application>
</Properties>"#
        .to_string()
}

fn styles_xml(stylesheet: &Stylesheet) -> String {
    let mut body = String::new();
    for name in stylesheet.names() {
        let style = stylesheet.get(name);
        let half_points = (style.size_pt * 2.0).round() as i32;
        let justify = match style.alignment {
            crate::render::stylesheet::Alignment::Left => "left",
            crate::render::stylesheet::Alignment::Center => "center",
            crate::render::stylesheet::Alignment::Justify => "both",
        };
        body.push_str(&format!(
            r#"<w:style w:type="paragraph" w:styleId="{id}"><w:name w:val="{id}"/><w:pPr><w:jc w:val="{justify}"/></w:pPr><w:rPr><w:rFonts w:ascii="{font}"/><w:sz w:val="{sz}"/>{bold}{italic}</w:rPr></w:style>"#,
            id = name,
            justify = justify,
            font = escape(&style.font),
            sz = half_points,
            bold = if style.bold { "<w:b/>" } else { "" },
            italic = if style.italic { "<w:i/>" } else { "" },
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">{body}</w:styles>"#
    )
}

fn document_xml(ast: &DocumentAst, template_name: &str) -> String {
    let mut body = String::new();
    for block in &ast.blocks {
        if is_content_start_marker(block) {
            continue;
        }
        body.push_str(&paragraph_xml(block, template_name));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:m="http://schemas.openxmlformats.org/officeDocument/2006/math"><w:body>{body}<w:sectPr/></w:body></w:document>"#
    )
}

fn is_content_start_marker(block: &Block) -> bool {
    matches!(block, Block::Paragraph { text, .. } if text.trim() == CONTENT_START_MARKER)
}

fn paragraph_xml(block: &Block, template_name: &str) -> String {
    let style = style_name_for(block);
    let page_break = if block.wants_page_break_before(template_name) {
        r#"<w:r><w:br w:type="page"/></w:r>"#
    } else {
        ""
    };
    let content = match block {
        Block::Equation { omml_xml: Some(xml), .. } if !xml.is_empty() => {
            format!(r#"<m:oMathPara>{xml}</m:oMathPara>"#)
        }
        Block::Equation { latex, mode, .. } => {
            let jc = match mode {
                EquationMode::Display => r#"<w:jc w:val="center"/>"#,
                EquationMode::Inline => "",
            };
            return format!(
                r#"<w:p><w:pPr><w:pStyle w:val="{style}"/>{jc}</w:pPr><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#,
                text = escape(latex)
            );
        }
        Block::TheoremBox { title, content, .. } => {
            format!(r#"<w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">{title}. </w:t></w:r><w:r><w:t xml:space="preserve">{body}</w:t></w:r>"#, title = escape(title), body = escape(content))
        }
        Block::ProofBox { content, qed_symbol } => {
            format!(
                r#"<w:r><w:t xml:space="preserve">{body} {qed}</w:t></w:r>"#,
                body = escape(content),
                qed = escape(qed_symbol)
            )
        }
        Block::Heading { text, number, .. } => {
            let numbered = number.as_deref().map(|n| format!("{n} ")).unwrap_or_default();
            format!(r#"<w:r><w:t xml:space="preserve">{numbered}{text}</w:t></w:r>"#, numbered = escape(&numbered), text = escape(text))
        }
        Block::Paragraph { text, .. } => run_text(text),
        Block::Blockquote { text, attribution } | Block::Epigraph { text, attribution } => {
            let attr = attribution.as_deref().map(|a| format!(" \u{2014} {a}")).unwrap_or_default();
            format!(r#"<w:r><w:t xml:space="preserve">{text}{attr}</w:t></w:r>"#, text = escape(text), attr = escape(&attr))
        }
        Block::SceneBreak { symbol } => run_text(symbol),
        Block::ReferenceEntry { citation, .. } => run_text(citation),
    };
    format!(r#"<w:p><w:pPr><w:pStyle w:val="{style}"/></w:pPr>{page_break}{content}</w:p>"#)
}

fn run_text(text: &str) -> String {
    format!(r#"<w:r><w:t xml:space="preserve">{}</w:t></w:r>"#, escape(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DocumentMetadata, HeadingLevel, ParagraphRole};

    fn sample_ast() -> DocumentAst {
        DocumentAst {
            metadata: DocumentMetadata { title: Some("Sample".to_string()), ..Default::default() },
            blocks: vec![
                Block::Heading { level: HeadingLevel::H1, text: "Chapter One".to_string(), number: None },
                Block::Paragraph { text: "Body text.".to_string(), role: ParagraphRole::FirstParagraph },
                Block::Equation { latex: "E=mc^2".to_string(), mode: EquationMode::Display, number: None, omml_xml: None },
            ],
        }
    }

    #[test]
    fn render_produces_a_nonempty_zip() {
        let ast = sample_ast();
        let stylesheet = Stylesheet::default();
        let templates = TemplateCache::with_builtin_default();
        let bytes = render_docx(&ast, &stylesheet, &templates, "default").unwrap();
        assert!(bytes.len() > 4);
        assert_eq!(&bytes[0..2], b"PK");
    }

    #[test]
    fn content_start_marker_paragraph_is_stripped() {
        let mut ast = sample_ast();
        ast.blocks.insert(0, Block::Paragraph { text: CONTENT_START_MARKER.to_string(), role: ParagraphRole::Body });
        let xml = document_xml(&ast, "default");
        assert!(!xml.contains(CONTENT_START_MARKER));
    }

    #[test]
    fn unknown_template_name_falls_back_to_default_rather_than_erroring() {
        let ast = sample_ast();
        let stylesheet = Stylesheet::default();
        let templates = TemplateCache::with_builtin_default();
        let bytes = render_docx(&ast, &stylesheet, &templates, "book").unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn page_break_before_chapter_applies_only_under_book_template() {
        let ast = sample_ast();
        let book_xml = document_xml(&ast, "book");
        let default_xml = document_xml(&ast, "default");
        assert!(book_xml.contains(r#"<w:br w:type="page"/>"#));
        assert!(!default_xml.contains(r#"<w:br w:type="page"/>"#));
    }

    #[test]
    fn book_and_academic_templates_produce_different_styles_xml() {
        let stylesheet = Stylesheet::default();
        let book = styles_xml(&stylesheet.for_template("book"));
        let academic = styles_xml(&stylesheet.for_template("academic"));
        assert_ne!(book, academic);
    }

    #[test]
    fn omml_xml_is_embedded_verbatim_when_present() {
        let mut ast = sample_ast();
        ast.blocks.push(Block::Equation {
            latex: "a+b".to_string(),
            mode: EquationMode::Display,
            number: None,
            omml_xml: Some("<m:oMath><m:r><m:t>a+b</m:t></m:r></m:oMath>".to_string()),
        });
        let xml = document_xml(&ast, "default");
        assert!(xml.contains("oMathPara"));
    }
}
