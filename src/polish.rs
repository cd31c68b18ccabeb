//! Post-translation terminology polisher (C12).
//!
//! Placeholder-safe: every math/code span is swapped out with C1's own
//! token protocol before any rewriting happens, and every protected
//! name/identifier is swapped for an internal sentinel alongside it.
//! Normalization then runs longest-match-first over ordinary words, a
//! phrase table runs second, and both sentinel families are restored last.
//! Grounded directly on spec §4.12 (no source body for the reference
//! polisher survived corpus filtering beyond its file listing).

use crate::stem;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Built-in protected-name fallback list (spec §9 Open Question:
/// "the source has a small built-in fallback"). Proper nouns and brand
/// terms that should never be touched by word-level normalization.
const BUILTIN_PROTECTED_NAMES: &[&str] = &["GitHub", "LaTeX", "JavaScript", "TypeScript", "OAuth"];

/// Word-level variant-to-preferred normalization table. Longest keys are
/// tried first so `"set up"` style multi-word entries never get shadowed
/// by a shorter single-word entry.
const WORD_TABLE: &[(&str, &str)] = &[
    ("utilize", "use"),
    ("utilizes", "uses"),
    ("utilizing", "using"),
    ("aforementioned", "this"),
    ("commence", "begin"),
    ("commenced", "began"),
    ("terminate", "end"),
    ("terminates", "ends"),
];

/// Phrase-level rewrites, applied after word-level normalization.
const PHRASE_TABLE: &[(&str, &str)] = &[
    ("in order to", "to"),
    ("due to the fact that", "because"),
    ("at this point in time", "now"),
];

fn build_table_regex(table: &[(&str, &str)]) -> (Regex, HashMap<&'static str, &'static str>) {
    let mut entries: Vec<&(&str, &str)> = table.iter().collect();
    entries.sort_by_key(|(k, _)| std::cmp::Reverse(k.len()));
    let alternation = entries
        .iter()
        .map(|(k, _)| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(r"\b(?:{alternation})\b");
    let map: HashMap<&'static str, &'static str> = table.iter().copied().collect();
    (Regex::new(&pattern).unwrap(), map)
}

static WORD_RE: Lazy<(Regex, HashMap<&'static str, &'static str>)> = Lazy::new(|| build_table_regex(WORD_TABLE));
static PHRASE_RE: Lazy<(Regex, HashMap<&'static str, &'static str>)> = Lazy::new(|| build_table_regex(PHRASE_TABLE));

fn apply_table(text: &str, table: &Lazy<(Regex, HashMap<&'static str, &'static str>)>) -> String {
    let (re, map) = &**table;
    re.replace_all(text, |caps: &regex::Captures<'_>| {
        map.get(&caps[0]).copied().unwrap_or(&caps[0]).to_string()
    })
    .into_owned()
}

fn name_sentinel(n: usize) -> String {
    format!("\u{27E6}APS_NAME_{n}\u{27E7}")
}

/// Replace every occurrence of a protected name with a positional
/// sentinel, longest name first so `"JavaScript"` doesn't get shadowed by
/// a hypothetical shorter entry sharing a prefix.
fn protect_names(text: &str, names: &[String]) -> (String, Vec<(String, String)>) {
    if names.is_empty() {
        return (text.to_string(), Vec::new());
    }
    let mut sorted: Vec<&String> = names.iter().collect();
    sorted.sort_by_key(|n| std::cmp::Reverse(n.len()));
    let alternation = sorted.iter().map(|n| regex::escape(n.as_str())).collect::<Vec<_>>().join("|");
    let re = Regex::new(&format!(r"\b(?:{alternation})\b")).unwrap();

    let mut sentinels = Vec::new();
    let mut n = 0usize;
    let out = re
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let original = caps[0].to_string();
            let token = name_sentinel(n);
            n += 1;
            sentinels.push((token.clone(), original));
            token
        })
        .into_owned();
    (out, sentinels)
}

fn restore_names(text: &str, sentinels: &[(String, String)]) -> String {
    let mut out = text.to_string();
    for (token, original) in sentinels {
        out = out.replace(token.as_str(), original.as_str());
    }
    out
}

/// Merge a caller-supplied allowlist with the built-in protected-name
/// fallback, caller entries taking precedence on a case-insensitive
/// conflict (spec §9 Open Question, resolved: merged, not replaced).
pub fn merged_protected_names(caller_supplied: &[String]) -> Vec<String> {
    let mut seen_lower: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for name in caller_supplied {
        if seen_lower.insert(name.to_lowercase()) {
            merged.push(name.clone());
        }
    }
    for name in BUILTIN_PROTECTED_NAMES {
        if seen_lower.insert(name.to_lowercase()) {
            merged.push(name.to_string());
        }
    }
    merged
}

/// Outcome of a [`polish`] call.
#[derive(Clone, Debug, PartialEq)]
pub struct PolishResult {
    /// Rewritten text, or the untouched input if the pass was rejected.
    pub text: String,
    /// Whether normalization was actually applied.
    pub applied: bool,
}

/// Apply terminology normalization to `text`, protecting every math/code
/// span and every name in `protected_names` (merged with the built-in
/// fallback) from rewriting. Rejects the pass — returning the input
/// unchanged — if the formula count before and after differs, since that
/// can only mean a protected span was corrupted by the rewrite.
pub fn polish(text: &str, protected_names: &[String]) -> PolishResult {
    let (protected_text, placeholder_map, matches) = stem::preprocess(text);
    let formula_count_before = matches
        .iter()
        .filter(|m| m.kind == stem::PlaceholderKind::Formula)
        .count();

    let names = merged_protected_names(protected_names);
    let (name_protected, name_sentinels) = protect_names(&protected_text, &names);

    let normalized = apply_table(&name_protected, &WORD_RE);
    let phrased = apply_table(&normalized, &PHRASE_RE);

    let names_restored = restore_names(&phrased, &name_sentinels);
    let fully_restored = stem::restore(&names_restored, &placeholder_map);

    let (_, _, after_matches) = stem::preprocess(&fully_restored);
    let formula_count_after = after_matches
        .iter()
        .filter(|m| m.kind == stem::PlaceholderKind::Formula)
        .count();

    if formula_count_after != formula_count_before {
        tracing::warn!(
            before = formula_count_before,
            after = formula_count_after,
            "polish pass rejected: formula count changed"
        );
        return PolishResult {
            text: text.to_string(),
            applied: false,
        };
    }

    PolishResult {
        text: fully_restored,
        applied: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_level_variant_is_normalized() {
        let result = polish("Please utilize the new API.", &[]);
        assert!(result.applied);
        assert_eq!(result.text, "Please use the new API.");
    }

    #[test]
    fn phrase_level_rewrite_applies_after_word_level() {
        let result = polish("We did this in order to finish.", &[]);
        assert_eq!(result.text, "We did this to finish.");
    }

    #[test]
    fn protected_name_is_never_rewritten() {
        let result = polish("We utilize GitHub daily.", &[]);
        assert_eq!(result.text, "We use GitHub daily.");
    }

    #[test]
    fn caller_supplied_names_are_merged_with_builtin_list() {
        let names = vec!["AcmeCorp".to_string()];
        let result = polish("AcmeCorp aims to utilize new tools.", &names);
        assert!(result.text.contains("AcmeCorp"));
        assert!(result.text.contains("use new tools"));
    }

    #[test]
    fn math_spans_survive_normalization_untouched() {
        let result = polish("We utilize $E=mc^2$ to commence.", &[]);
        assert!(result.text.contains("$E=mc^2$"));
        assert_eq!(result.text, "We use $E=mc^2$ to begin.");
    }

    #[test]
    fn idempotent_on_its_own_output() {
        let once = polish("Please utilize the new API in order to finish.", &[]);
        let twice = polish(&once.text, &[]);
        assert_eq!(once.text, twice.text);
    }

    #[test]
    fn merged_names_prefer_caller_casing_on_conflict() {
        let names = vec!["github".to_string()];
        let merged = merged_protected_names(&names);
        assert!(merged.contains(&"github".to_string()));
        assert!(!merged.iter().any(|n| n == "GitHub"));
    }
}
