//! Text and numeric normalization applied before any matching or arithmetic.
//!
//! Exports from different operating systems disagree on Hangul composition (NFD from macOS
//! file systems, NFC elsewhere), so every comparison in the crate goes through [`match_key`].

use unicode_normalization::UnicodeNormalization;

/// Canonical-composition (NFC) form of `s`.
pub fn nfc(s: &str) -> String {
    s.nfc().collect()
}

/// Matching key: NFC, trimmed, lowercased.
pub fn match_key(s: &str) -> String {
    s.trim().nfc().collect::<String>().to_lowercase()
}

/// `true` if the match key of `haystack` contains the match key of any non-empty needle.
pub fn contains_any<S: AsRef<str>>(haystack: &str, needles: &[S]) -> bool {
    let hay = match_key(haystack);
    needles.iter().any(|n| {
        let n = match_key(n.as_ref());
        !n.is_empty() && hay.contains(&n)
    })
}

/// Parse a numeric cell.
///
/// Thousands separators, quotes, whitespace and currency signs are stripped; a trailing `%` is
/// ignored. Anything unparsable (including blanks and non-finite results) becomes `0.0`.
pub fn parse_number(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | '"' | '\'' | '₩' | '$' | '%' | '원') && !c.is_whitespace())
        .collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}
