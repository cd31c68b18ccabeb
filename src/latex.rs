//! LaTeX source ingest and equation splitter (C13).
//!
//! Two largely independent halves: [`ingest`] extracts a `.tex` source from
//! a direct file or an archive and picks the most likely "main" file by a
//! small point-scoring heuristic; [`split_latex_equations`] classifies a
//! compound LaTeX string into a confident single-equation extraction or
//! declines in favor of a caller-provided fallback.

use crate::error::LatexError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Read;
use std::path::{Path, PathBuf};

const ARCHIVE_EXTENSIONS: &[&str] = &[".zip", ".tar.gz", ".tgz", ".tar"];

/// Check whether `file_name` looks like a LaTeX source (direct `.tex` or a
/// supported archive extension). Does not touch the filesystem.
pub fn detect_latex_source(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".tex") {
        return true;
    }
    ARCHIVE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Extract an archive (or copy a direct `.tex` file) into `output_dir`.
///
/// `output_dir` must already exist. Returns the directory extracted into
/// (always `output_dir`, returned for call-site symmetry with the
/// directory-scoring step that follows).
pub fn extract_source(source_path: &Path, output_dir: &Path) -> Result<PathBuf, LatexError> {
    std::fs::create_dir_all(output_dir)?;

    let name = source_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();

    if name.ends_with(".tex") {
        let dest = output_dir.join(source_path.file_name().unwrap());
        std::fs::copy(source_path, &dest)?;
        return Ok(output_dir.to_path_buf());
    }

    if name.ends_with(".zip") {
        extract_zip(source_path, output_dir)?;
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") || name.ends_with(".tar") {
        extract_tar(source_path, output_dir)?;
    } else {
        return Err(LatexError::UnknownArchive(name));
    }

    Ok(output_dir.to_path_buf())
}

fn extract_zip(path: &Path, output_dir: &Path) -> Result<(), LatexError> {
    let file = std::fs::File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| LatexError::Extraction(e.to_string()))?;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| LatexError::Extraction(e.to_string()))?;
        let out_path = match entry.enclosed_name() {
            Some(p) => output_dir.join(p),
            None => continue,
        };
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out_file = std::fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out_file)?;
    }
    Ok(())
}

fn extract_tar(path: &Path, output_dir: &Path) -> Result<(), LatexError> {
    let file = std::fs::File::open(path)?;
    let name = path.to_string_lossy().to_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let gz = flate2::read::GzDecoder::new(file);
        let mut archive = tar::Archive::new(gz);
        archive
            .unpack(output_dir)
            .map_err(|e| LatexError::Extraction(e.to_string()))?;
    } else {
        let mut archive = tar::Archive::new(file);
        archive
            .unpack(output_dir)
            .map_err(|e| LatexError::Extraction(e.to_string()))?;
    }
    Ok(())
}

static DOCUMENTCLASS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\documentclass").unwrap());
static BEGIN_DOCUMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\begin\{document\}").unwrap());
static END_DOCUMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\end\{document\}").unwrap());

/// Walk `source_dir` recursively for `.tex` files and return the path of the
/// best-scoring candidate, or `None` if no file scores above zero.
///
/// Scoring matches the spec exactly: `+100` for `\documentclass`, `+50` for
/// `\begin{document}`, `+20` for a stem in `{main, paper, manuscript,
/// article}` (`+10` for a stem merely starting with `main`), plus up to
/// `+10` scaled by file size (one point per KB, capped at 10KB).
pub fn find_main_tex(source_dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<(f64, PathBuf)> = Vec::new();

    for entry in walk_tex_files(source_dir) {
        let mut buf = String::new();
        let content = match std::fs::File::open(&entry) {
            Ok(mut f) => {
                let mut limited = f.by_ref().take(5000);
                if limited.read_to_string(&mut buf).is_ok() {
                    buf.as_str()
                } else {
                    continue;
                }
            }
            Err(_) => continue,
        };

        let has_documentclass = DOCUMENTCLASS_RE.is_match(content);
        let has_begin_doc = BEGIN_DOCUMENT_RE.is_match(content);
        let file_size = std::fs::metadata(&entry).map(|m| m.len()).unwrap_or(0);

        let mut score = 0.0_f64;
        if has_documentclass {
            score += 100.0;
        }
        if has_begin_doc {
            score += 50.0;
        }

        let stem_lower = entry
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        if matches!(stem_lower.as_str(), "main" | "paper" | "manuscript" | "article") {
            score += 20.0;
        } else if stem_lower.starts_with("main") {
            score += 10.0;
        }

        score += (file_size as f64 / 1000.0).min(10.0);

        if score > 0.0 {
            candidates.push((score, entry));
        }
    }

    candidates
        .into_iter()
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap())
        .map(|(_, path)| path)
}

fn walk_tex_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
        let entries = match std::fs::read_dir(&d) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("tex") {
                out.push(path);
            }
        }
    }
    out
}

/// Validate a candidate main `.tex` file: presence of `\documentclass` and
/// `\begin{document}` are hard requirements; a missing `\end{document}` or
/// grossly unbalanced preamble braces are logged as warnings, not failures.
pub fn validate_latex_source(tex_path: &Path) -> Result<(), LatexError> {
    let content = std::fs::read_to_string(tex_path)?;

    if !DOCUMENTCLASS_RE.is_match(&content) {
        return Err(LatexError::Extraction(
            "missing \\documentclass command".to_string(),
        ));
    }
    if !BEGIN_DOCUMENT_RE.is_match(&content) {
        return Err(LatexError::Extraction(
            "missing \\begin{document} environment".to_string(),
        ));
    }
    if !END_DOCUMENT_RE.is_match(&content) {
        tracing::warn!(path = %tex_path.display(), "tex file missing \\end{{document}}, may be incomplete");
    }

    if let Some(preamble) = content.split("\\begin{document}").next() {
        let open = preamble.matches('{').count();
        let close = preamble.matches('}').count();
        if (open as i64 - close as i64).abs() > 5 {
            tracing::warn!(
                open, close,
                "preamble has unmatched braces"
            );
        }
    }

    Ok(())
}

/// Full ingestion workflow: detect, extract, find the main file, validate.
pub fn ingest(input_path: &Path, extract_dir: &Path) -> Result<PathBuf, LatexError> {
    let name = input_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    if !detect_latex_source(name) {
        return Err(LatexError::UnknownArchive(name.to_string()));
    }

    let source_dir = extract_source(input_path, extract_dir)?;
    let main_tex = find_main_tex(&source_dir).ok_or(LatexError::NoTexFound)?;
    validate_latex_source(&main_tex)?;
    Ok(main_tex)
}

// ---------------------------------------------------------------------------
// Equation splitter
// ---------------------------------------------------------------------------

/// Outcome of [`split_latex_equations`].
#[derive(Clone, Debug, PartialEq)]
pub struct SplitEquationResult {
    /// The original (untrimmed) input.
    pub original: String,
    /// Isolated equation segments, populated only when `is_confident`.
    pub equation_segments: Vec<String>,
    /// Whether the split is safe to use directly (skip fallback).
    pub is_confident: bool,
    /// Explanation when `is_confident` is false.
    pub reason: Option<String>,
}

static ENV_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\\begin\{(equation\*?|align\*?|gather\*?|multline\*?|eqnarray\*?)\}(.*?)\\end\{\1\}").unwrap()
});
static DISPLAY_DOLLAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\$\$.*?\$\$").unwrap());
static DISPLAY_BRACKET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\\\[.*?\\\]").unwrap());
static INLINE_DOLLAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$[^$]+\$").unwrap());
static ENV_STRIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\begin\{[^}]+\}.*?\\end\{[^}]+\}").unwrap());
// The `regex` crate has no lookbehind, so the original's "not preceded by a
// backslash" exclusion (to skip LaTeX command names like `\the`) is applied
// as a manual byte check in `has_text_content` instead of in the pattern.
static PROSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(the|a|an|in|on|at|to|for|of|with|by|from|that|this|these|those|\
is|are|was|were|be|been|being|have|has|had|do|does|did|\
given|where|such|which|when|then|than|or|and|but|if|so|\
let|suppose|assume|consider|prove|show|hence|thus|therefore)\b",
    )
    .unwrap()
});

fn detect_environment_block(s: &str) -> Option<String> {
    let m = ENV_BLOCK_RE.find(s)?;
    let remaining = s.replace(m.as_str(), "");
    if remaining.trim().is_empty() {
        Some(m.as_str().to_string())
    } else {
        None
    }
}

fn detect_display_math(s: &str) -> Option<String> {
    if s.starts_with("$$") && s.ends_with("$$") && s.len() >= 4 {
        let inner = s[2..s.len() - 2].trim();
        if !inner.contains("$$") {
            return Some(inner.to_string());
        }
    }
    if s.starts_with("\\[") && s.ends_with("\\]") && s.len() >= 4 {
        let inner = s[2..s.len() - 2].trim();
        if !inner.contains("\\[") && !inner.contains("\\]") {
            return Some(inner.to_string());
        }
    }
    None
}

fn count_inline_math(s: &str) -> usize {
    let dollars = s.matches('$').count();
    let escaped = s.matches("\\$").count();
    dollars.saturating_sub(escaped) / 2
}

fn has_text_content(s: &str) -> bool {
    let mut out = DISPLAY_DOLLAR_RE.replace_all(s, "").into_owned();
    out = DISPLAY_BRACKET_RE.replace_all(&out, "").into_owned();
    out = INLINE_DOLLAR_RE.replace_all(&out, "").into_owned();
    out = ENV_STRIP_RE.replace_all(&out, "").into_owned();
    let out = out.trim();

    PROSE_RE.find_iter(out).any(|m| {
        // Skip matches that are actually LaTeX command names (`\the`, `\in`, ...).
        m.start() == 0 || out.as_bytes()[m.start() - 1] != b'\\'
    })
}

fn is_single_clean_equation(s: &str) -> bool {
    if s.starts_with('$') || s.starts_with("\\[") || s.starts_with("\\begin") {
        return false;
    }
    if has_text_content(s) {
        return false;
    }
    ["\\", "_", "^", "{", "}"].iter().any(|ind| s.contains(ind))
}

/// Classify a LaTeX source string, returning a confident single-equation
/// extraction in the cases the spec enumerates, or declining with a reason.
pub fn split_latex_equations(latex_source: &str) -> SplitEquationResult {
    if latex_source.trim().is_empty() {
        return SplitEquationResult {
            original: latex_source.to_string(),
            equation_segments: Vec::new(),
            is_confident: false,
            reason: Some("empty or whitespace-only input".to_string()),
        };
    }

    let s = latex_source.trim();

    if let Some(block) = detect_environment_block(s) {
        return SplitEquationResult {
            original: latex_source.to_string(),
            equation_segments: vec![block],
            is_confident: true,
            reason: None,
        };
    }

    if let Some(inner) = detect_display_math(s) {
        return SplitEquationResult {
            original: latex_source.to_string(),
            equation_segments: vec![inner],
            is_confident: true,
            reason: None,
        };
    }

    if is_single_clean_equation(s) {
        return SplitEquationResult {
            original: latex_source.to_string(),
            equation_segments: vec![s.to_string()],
            is_confident: true,
            reason: None,
        };
    }

    let inline_count = count_inline_math(s);
    let has_text = has_text_content(s);

    if inline_count > 0 && has_text {
        return SplitEquationResult {
            original: latex_source.to_string(),
            equation_segments: Vec::new(),
            is_confident: false,
            reason: Some("contains inline math with surrounding text".to_string()),
        };
    }

    if inline_count > 0 && !has_text {
        return SplitEquationResult {
            original: latex_source.to_string(),
            equation_segments: Vec::new(),
            is_confident: false,
            reason: Some("inline math only (low priority for OMML)".to_string()),
        };
    }

    if has_text {
        return SplitEquationResult {
            original: latex_source.to_string(),
            equation_segments: Vec::new(),
            is_confident: false,
            reason: Some("mixed content without clear extraction pattern".to_string()),
        };
    }

    SplitEquationResult {
        original: latex_source.to_string(),
        equation_segments: Vec::new(),
        is_confident: false,
        reason: Some("unable to confidently classify LaTeX structure".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_tex_and_archives() {
        assert!(detect_latex_source("paper.tex"));
        assert!(detect_latex_source("2301.12345v1.tar.gz"));
        assert!(!detect_latex_source("document.pdf"));
    }

    #[test]
    fn s6_display_math_is_confident() {
        let r = split_latex_equations("$$ E = mc^2 $$");
        assert!(r.is_confident);
        assert_eq!(r.equation_segments, vec!["E = mc^2".to_string()]);
    }

    #[test]
    fn s7_inline_math_with_text_not_confident() {
        let r = split_latex_equations("Given $f:\\N\\to H$ we have $H$");
        assert!(!r.is_confident);
        assert!(r.reason.unwrap().contains("inline math with text"));
    }

    #[test]
    fn environment_block_kept_whole() {
        let r = split_latex_equations("\\begin{align} a &= b \\\\ c &= d \\end{align}");
        assert!(r.is_confident);
        assert_eq!(r.equation_segments.len(), 1);
        assert!(r.equation_segments[0].starts_with("\\begin{align}"));
    }

    #[test]
    fn single_clean_equation_confident() {
        let r = split_latex_equations(r"\sup_{n,d\in\N} \|x\|");
        assert!(r.is_confident);
    }

    #[test]
    fn empty_input_not_confident() {
        let r = split_latex_equations("   ");
        assert!(!r.is_confident);
    }

    #[test]
    fn find_main_tex_prefers_documentclass_and_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.tex"), "just some notes").unwrap();
        std::fs::write(
            dir.path().join("main.tex"),
            "\\documentclass{article}\n\\begin{document}\nhello\n\\end{document}\n",
        )
        .unwrap();
        let best = find_main_tex(dir.path()).unwrap();
        assert_eq!(best.file_name().unwrap(), "main.tex");
    }
}
