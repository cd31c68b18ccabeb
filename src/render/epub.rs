//! EPUB renderer (C10, secondary format).
//!
//! Groups AST blocks into one XHTML file per chapter (split at each
//! chapter-level heading), attaches a single shared CSS file, and writes
//! the OPF/NCX/NAV skeleton a reading system needs. Grounded on spec
//! §4.10's "EPUB emits chapter files by grouping blocks between Chapter
//! blocks ... writes the OPF/NCX/NAV skeleton"; reuses the `zip` +
//! `quick-xml`-escaping stack the DOCX renderer uses for the same reason.

use crate::ast::{Block, DocumentAst, EquationMode, HeadingLevel};
use crate::error::RenderError;
use crate::render::stylesheet::style_name_for;
use quick_xml::escape::escape;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

struct Chapter {
    title: String,
    blocks: Vec<Block>,
}

fn split_into_chapters(blocks: &[Block]) -> Vec<Chapter> {
    let mut chapters = Vec::new();
    let mut current: Option<Chapter> = None;

    for block in blocks {
        if let Block::Heading { level: HeadingLevel::H1, text, .. } = block {
            if let Some(ch) = current.take() {
                chapters.push(ch);
            }
            current = Some(Chapter { title: text.clone(), blocks: vec![block.clone()] });
            continue;
        }
        match current.as_mut() {
            Some(ch) => ch.blocks.push(block.clone()),
            None => {
                current = Some(Chapter { title: "Front Matter".to_string(), blocks: vec![block.clone()] });
            }
        }
    }
    if let Some(ch) = current.take() {
        chapters.push(ch);
    }
    chapters
}

fn block_html(block: &Block) -> String {
    let class = style_name_for(block);
    match block {
        Block::Heading { level, text, number } => {
            let tag = match level {
                HeadingLevel::H1 => "h1",
                HeadingLevel::H2 => "h2",
                HeadingLevel::H3 => "h3",
            };
            let numbered = number.as_deref().map(|n| format!("{n} ")).unwrap_or_default();
            format!("<{tag} class=\"{class}\">{}{}</{tag}>", escape(&numbered), escape(text))
        }
        Block::Paragraph { text, .. } => format!("<p class=\"{class}\">{}</p>", escape(text)),
        Block::Equation { latex, mode, .. } => {
            let tag = match mode {
                EquationMode::Display => "div",
                EquationMode::Inline => "span",
            };
            format!("<{tag} class=\"{class}\">{}</{tag}>", escape(latex))
        }
        Block::TheoremBox { title, content, .. } => format!("<p class=\"{class}\"><strong>{}.</strong> {}</p>", escape(title), escape(content)),
        Block::ProofBox { content, qed_symbol } => format!("<p class=\"{class}\">{} {}</p>", escape(content), escape(qed_symbol)),
        Block::Blockquote { text, attribution } => format!("<blockquote class=\"{class}\">{}{}</blockquote>", escape(text), attribution_html(attribution)),
        Block::Epigraph { text, attribution } => format!("<div class=\"{class}\">{}{}</div>", escape(text), attribution_html(attribution)),
        Block::SceneBreak { symbol } => format!("<p class=\"{class}\">{}</p>", escape(symbol)),
        Block::ReferenceEntry { citation, .. } => format!("<p class=\"{class}\">{}</p>", escape(citation)),
    }
}

fn attribution_html(attribution: &Option<String>) -> String {
    attribution.as_deref().map(|a| format!(" <em>\u{2014} {}</em>", escape(a))).unwrap_or_default()
}

/// Render `ast` to a complete, in-memory `.epub` byte buffer.
pub fn render_epub(ast: &DocumentAst) -> Result<Vec<u8>, RenderError> {
    let chapters = split_into_chapters(&ast.blocks);
    let buf = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(buf);

    let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    zip.start_file("mimetype", stored).map_err(|e| RenderError::Archive(e.to_string()))?;
    zip.write_all(b"application/epub+zip")?;

    let deflated = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    write_part(&mut zip, &deflated, "META-INF/container.xml", container_xml().as_bytes())?;
    write_part(&mut zip, &deflated, "OEBPS/styles.css", stylesheet_css().as_bytes())?;

    for (idx, chapter) in chapters.iter().enumerate() {
        let body: String = chapter.blocks.iter().map(block_html).collect();
        let xhtml = chapter_xhtml(&chapter.title, &body);
        write_part(&mut zip, &deflated, &format!("OEBPS/chapter_{idx}.xhtml"), xhtml.as_bytes())?;
    }

    write_part(&mut zip, &deflated, "OEBPS/content.opf", content_opf(ast.metadata.title.as_deref(), chapters.len()).as_bytes())?;
    write_part(&mut zip, &deflated, "OEBPS/toc.ncx", toc_ncx(&chapters).as_bytes())?;
    write_part(&mut zip, &deflated, "OEBPS/nav.xhtml", nav_xhtml(&chapters).as_bytes())?;

    let cursor = zip.finish().map_err(|e| RenderError::Archive(e.to_string()))?;
    Ok(cursor.into_inner())
}

fn write_part<W: Write + std::io::Seek>(zip: &mut ZipWriter<W>, options: &SimpleFileOptions, name: &str, bytes: &[u8]) -> Result<(), RenderError> {
    zip.start_file(name, *options).map_err(|e| RenderError::Archive(e.to_string()))?;
    zip.write_all(bytes)?;
    Ok(())
}

fn container_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#
        .to_string()
}

fn stylesheet_css() -> String {
    "body { font-family: serif; }\nh1, h2, h3 { font-weight: bold; }\n.APS_Quote { font-style: italic; margin-left: 2em; }\n".to_string()
}

fn chapter_xhtml(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{title}</title><link rel="stylesheet" type="text/css" href="styles.css"/></head>
<body>{body}</body>
</html>"#,
        title = escape(title)
    )
}

fn content_opf(title: Option<&str>, chapter_count: usize) -> String {
    let title = title.unwrap_or("Untitled");
    let manifest_items: String = (0..chapter_count)
        .map(|i| format!(r#"<item id="chapter_{i}" href="chapter_{i}.xhtml" media-type="application/xhtml+xml"/>"#))
        .collect();
    let spine_items: String = (0..chapter_count).map(|i| format!(r#"<itemref idref="chapter_{i}"/>"#)).collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>{title}</dc:title>
    <dc:identifier id="bookid">urn:uuid:aps-core-generated</dc:identifier>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="css" href="styles.css" media-type="text/css"/>
    {manifest_items}
  </manifest>
  <spine toc="ncx">{spine_items}</spine>
</package>"#,
        title = escape(title)
    )
}

fn toc_ncx(chapters: &[Chapter]) -> String {
    let nav_points: String = chapters
        .iter()
        .enumerate()
        .map(|(i, ch)| {
            format!(
                r#"<navPoint id="navpoint-{i}" playOrder="{order}"><navLabel><text>{title}</text></navLabel><content src="chapter_{i}.xhtml"/></navPoint>"#,
                order = i + 1,
                title = escape(&ch.title)
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head/>
  <navMap>{nav_points}</navMap>
</ncx>"#
    )
}

fn nav_xhtml(chapters: &[Chapter]) -> String {
    let items: String = chapters
        .iter()
        .enumerate()
        .map(|(i, ch)| format!(r#"<li><a href="chapter_{i}.xhtml">{}</a></li>"#, escape(&ch.title)))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Table of Contents</title></head>
<body>
  <nav epub:type="toc" id="toc"><ol>{items}</ol></nav>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DocumentMetadata, ParagraphRole};

    #[test]
    fn chapters_split_at_h1_headings() {
        let blocks = vec![
            Block::Heading { level: HeadingLevel::H1, text: "One".to_string(), number: None },
            Block::Paragraph { text: "a".to_string(), role: ParagraphRole::FirstParagraph },
            Block::Heading { level: HeadingLevel::H1, text: "Two".to_string(), number: None },
            Block::Paragraph { text: "b".to_string(), role: ParagraphRole::FirstParagraph },
        ];
        let chapters = split_into_chapters(&blocks);
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, "One");
        assert_eq!(chapters[1].title, "Two");
    }

    #[test]
    fn content_before_first_heading_becomes_front_matter() {
        let blocks = vec![Block::Paragraph { text: "preface".to_string(), role: ParagraphRole::FirstParagraph }];
        let chapters = split_into_chapters(&blocks);
        assert_eq!(chapters[0].title, "Front Matter");
    }

    #[test]
    fn render_produces_a_valid_epub_zip_with_mimetype_first() {
        let ast = DocumentAst {
            metadata: DocumentMetadata { title: Some("Book".to_string()), ..Default::default() },
            blocks: vec![
                Block::Heading { level: HeadingLevel::H1, text: "Chapter 1".to_string(), number: None },
                Block::Paragraph { text: "Hello.".to_string(), role: ParagraphRole::FirstParagraph },
            ],
        };
        let bytes = render_epub(&ast).unwrap();
        assert_eq!(&bytes[0..2], b"PK");
    }
}
