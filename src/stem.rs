//! STEM placeholder codec (C1).
//!
//! Content-addressed substitution: math and code spans are swapped for
//! opaque tokens before translation and restored afterward, with a
//! preservation-rate check that never raises — preservation loss is logged
//! and treated as a warning throughout the pipeline (spec §7,
//! `PreservationLoss`).

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Kind of span a placeholder token stands in for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PlaceholderKind {
    /// A mathematical formula span.
    Formula,
    /// A fenced code block span.
    Code,
}

impl PlaceholderKind {
    fn tag(self) -> &'static str {
        match self {
            PlaceholderKind::Formula => "FORMULA",
            PlaceholderKind::Code => "CODE",
        }
    }
}

/// Bijective `token ↔ original_span` map produced by [`preprocess`].
#[derive(Clone, Debug, Default)]
pub struct PlaceholderMap {
    originals: HashMap<String, String>,
    kinds: HashMap<String, PlaceholderKind>,
}

impl PlaceholderMap {
    /// Look up the original span for a token, if known.
    pub fn original_for(&self, token: &str) -> Option<&str> {
        self.originals.get(token).map(|s| s.as_str())
    }

    /// Number of tokens of a given kind recorded in this map.
    pub fn count(&self, kind: PlaceholderKind) -> usize {
        self.kinds.values().filter(|k| **k == kind).count()
    }

    /// Total number of tokens recorded.
    pub fn len(&self) -> usize {
        self.originals.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }
}

/// One detected span and the token it was replaced with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaceholderMatch {
    /// Token that now stands in the text for this span.
    pub token: String,
    /// Original source text of the span.
    pub original: String,
    /// Kind of span detected.
    pub kind: PlaceholderKind,
}

fn token_for(kind: PlaceholderKind, n: usize) -> String {
    format!("\u{27EA}APS_{}_{}\u{27EB}", kind.tag(), n)
}

// Detection order is longest-match-first per spec §4.1: environments,
// display math ($$), display brackets (\[..\]), inline brackets (\(..\)),
// inline dollars ($..$, rejecting \$), fenced code blocks.
static ENV_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\begin\{([A-Za-z*]+)\}.*?\\end\{\1\}").unwrap());
static DISPLAY_DOLLAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\$\$.*?\$\$").unwrap());
static DISPLAY_BRACKET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\\\[.*?\\\]").unwrap());
static INLINE_PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\\\(.*?\\\)").unwrap());
// The `regex` crate has no lookbehind; escaped-dollar rejection is applied
// as a post-filter in `find_non_overlapping` callers instead.
static INLINE_DOLLAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$[^$\n]+?\$").unwrap());
static FENCED_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").unwrap());

#[derive(Copy, Clone)]
struct Span {
    start: usize,
    end: usize,
    kind: PlaceholderKind,
}

fn find_non_overlapping(text: &str, re: &Regex, kind: PlaceholderKind, taken: &mut Vec<Span>) {
    for m in re.find_iter(text) {
        let (start, end) = (m.start(), m.end());
        if taken.iter().any(|s| start < s.end && s.start < end) {
            continue;
        }
        taken.push(Span { start, end, kind });
    }
}

/// Like [`find_non_overlapping`], but rejects matches opening on an escaped
/// `\$` (the `regex` crate has no lookbehind, so this is a manual check).
fn find_non_overlapping_unescaped(
    text: &str,
    re: &Regex,
    kind: PlaceholderKind,
    taken: &mut Vec<Span>,
) {
    for m in re.find_iter(text) {
        let (start, end) = (m.start(), m.end());
        if start > 0 && text.as_bytes()[start - 1] == b'\\' {
            continue;
        }
        if taken.iter().any(|s| start < s.end && s.start < end) {
            continue;
        }
        taken.push(Span { start, end, kind });
    }
}

/// Replace every detected math/code span in `text` with an opaque token.
///
/// Returns the rewritten text, the bijective map from token to original
/// span, and the ordered list of matches (in the order tokens were
/// assigned, which follows detection-pass order, not text order).
pub fn preprocess(text: &str) -> (String, PlaceholderMap, Vec<PlaceholderMatch>) {
    let mut taken: Vec<Span> = Vec::new();

    find_non_overlapping(text, &ENV_RE, PlaceholderKind::Formula, &mut taken);
    find_non_overlapping(text, &DISPLAY_DOLLAR_RE, PlaceholderKind::Formula, &mut taken);
    find_non_overlapping(text, &DISPLAY_BRACKET_RE, PlaceholderKind::Formula, &mut taken);
    find_non_overlapping(text, &INLINE_PAREN_RE, PlaceholderKind::Formula, &mut taken);
    find_non_overlapping_unescaped(text, &INLINE_DOLLAR_RE, PlaceholderKind::Formula, &mut taken);
    find_non_overlapping(text, &FENCED_CODE_RE, PlaceholderKind::Code, &mut taken);

    taken.sort_by_key(|s| s.start);

    let mut map = PlaceholderMap::default();
    let mut matches = Vec::new();
    let mut formula_n = 0usize;
    let mut code_n = 0usize;
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;

    for span in &taken {
        out.push_str(&text[cursor..span.start]);
        let n = match span.kind {
            PlaceholderKind::Formula => {
                let n = formula_n;
                formula_n += 1;
                n
            }
            PlaceholderKind::Code => {
                let n = code_n;
                code_n += 1;
                n
            }
        };
        let token = token_for(span.kind, n);
        let original = text[span.start..span.end].to_string();
        out.push_str(&token);
        map.originals.insert(token.clone(), original.clone());
        map.kinds.insert(token.clone(), span.kind);
        matches.push(PlaceholderMatch {
            token,
            original,
            kind: span.kind,
        });
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);

    (out, map, matches)
}

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\u{27EA}APS_(FORMULA|CODE)_\d+\u{27EB}").unwrap());

/// Outcome of a round-trip [`verify`] call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VerificationResult {
    /// `restored / original` for formula tokens (1.0 if there were none).
    pub formula_preservation_rate: f64,
    /// `restored / original` for code tokens (1.0 if there were none).
    pub code_preservation_rate: f64,
    /// Formula tokens present in the map but absent after restoration.
    pub formulas_lost: usize,
    /// Code tokens present in the map but absent after restoration.
    pub code_lost: usize,
}

/// Replace every token in `text` with its mapped original. Tokens absent
/// from the map are left in place verbatim (and counted as lost by
/// [`verify`]).
pub fn restore(text: &str, map: &PlaceholderMap) -> String {
    TOKEN_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let token = &caps[0];
            map.original_for(token)
                .map(|s| s.to_string())
                .unwrap_or_else(|| token.to_string())
        })
        .into_owned()
}

/// Compare restored text against the map to compute preservation rates.
///
/// Never raises: an empty `matches` list of a given kind yields a
/// preservation rate of `1.0` for that kind, per spec §4.1.
pub fn verify(
    restored_text: &str,
    map: &PlaceholderMap,
    matches: &[PlaceholderMatch],
) -> VerificationResult {
    let formula_total = matches
        .iter()
        .filter(|m| m.kind == PlaceholderKind::Formula)
        .count();
    let code_total = matches
        .iter()
        .filter(|m| m.kind == PlaceholderKind::Code)
        .count();

    // Count occurrences per distinct original string once, then consume one
    // occurrence per match as it is checked. Two matches sharing identical
    // original text (a repeated formula) only both count as preserved if
    // the text actually contains it twice; a single surviving occurrence
    // cannot cover both.
    let mut available: HashMap<&str, usize> = HashMap::new();
    for m in matches {
        available
            .entry(m.original.as_str())
            .or_insert_with(|| restored_text.matches(m.original.as_str()).count());
    }

    let mut formulas_lost = 0usize;
    let mut code_lost = 0usize;
    for m in matches {
        let slot = available.get_mut(m.original.as_str()).unwrap();
        if *slot > 0 {
            *slot -= 1;
        } else {
            match m.kind {
                PlaceholderKind::Formula => formulas_lost += 1,
                PlaceholderKind::Code => code_lost += 1,
            }
        }
    }
    let _ = map; // map kept for interface symmetry with the spec contract

    let formula_preservation_rate = if formula_total == 0 {
        1.0
    } else {
        (formula_total - formulas_lost) as f64 / formula_total as f64
    };
    let code_preservation_rate = if code_total == 0 {
        1.0
    } else {
        (code_total - code_lost) as f64 / code_total as f64
    };

    VerificationResult {
        formula_preservation_rate,
        code_preservation_rate,
        formulas_lost,
        code_lost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2_roundtrip_on_text_without_native_tokens() {
        let text = "See $E=mc^2$ and ```let x = 1;``` please.";
        let (rewritten, map, _matches) = preprocess(text);
        assert_ne!(rewritten, text);
        let restored = restore(&rewritten, &map);
        assert_eq!(restored, text);
    }

    #[test]
    fn s2_mock_translator_uppercases_only_non_token_words() {
        let text = "See $E=mc^2$ please.";
        let (rewritten, map, matches) = preprocess(text);
        // honest mock: uppercase everything except the token itself
        let translated = rewritten
            .split_whitespace()
            .map(|w| {
                if TOKEN_RE.is_match(w) {
                    w.to_string()
                } else {
                    w.to_uppercase()
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        let restored = restore(&translated, &map);
        assert_eq!(restored, "SEE $E=mc^2$ PLEASE.");
        let v = verify(&restored, &map, &matches);
        assert_eq!(v.formula_preservation_rate, 1.0);
    }

    #[test]
    fn p3_preservation_rate_is_one_when_untouched() {
        let text = "$$a + b = c$$ and $$ x = y $$";
        let (rewritten, map, matches) = preprocess(text);
        let restored = restore(&rewritten, &map);
        let v = verify(&restored, &map, &matches);
        assert_eq!(v.formula_preservation_rate, 1.0);
        assert_eq!(v.formulas_lost, 0);
    }

    #[test]
    fn empty_input_has_preservation_rate_one() {
        let matches = Vec::new();
        let map = PlaceholderMap::default();
        let v = verify("", &map, &matches);
        assert_eq!(v.formula_preservation_rate, 1.0);
        assert_eq!(v.code_preservation_rate, 1.0);
    }

    #[test]
    fn lost_token_counts_as_lost_not_fatal() {
        let text = "Formula $a=b$ here.";
        let (rewritten, map, matches) = preprocess(text);
        // simulate translation truncating the token
        let damaged = rewritten.replace('\u{27EB}', "");
        let restored = restore(&damaged, &map);
        let v = verify(&restored, &map, &matches);
        assert_eq!(v.formulas_lost, 1);
        assert!(v.formula_preservation_rate < 1.0);
    }

    #[test]
    fn p3_duplicate_originals_are_tracked_per_match_not_per_string() {
        let text = "First $a=b$ then $a=b$ again.";
        let (rewritten, map, matches) = preprocess(text);
        assert_eq!(matches.len(), 2);
        // Corrupt only the first token's closing delimiter so it fails to
        // restore, leaving exactly one surviving "$a=b$" even though two
        // matches expected it.
        let damaged = rewritten.replacen('\u{27EB}', "", 1);
        let restored = restore(&damaged, &map);
        let v = verify(&restored, &map, &matches);
        assert_eq!(v.formulas_lost, 1);
        assert_eq!(v.formula_preservation_rate, 0.5);
    }

    #[test]
    fn no_nested_placeholders() {
        let text = "$$ \\begin{equation} a = b \\end{equation} $$";
        let (rewritten, _map, matches) = preprocess(text);
        assert_eq!(matches.len(), 1);
        assert!(!rewritten.contains("\\begin"));
    }
}
