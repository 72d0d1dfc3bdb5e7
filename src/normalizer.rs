use regex::Regex;
use sha2::{Digest, Sha256};

/// Regex patterns for common date and time formats. The ordering is
/// important: longer formats must be tried before their substrings.
const DATE_TIME_PATTERNS: &[&str] = &[
    /* with days */
    "[a-zA-Z]{3,} [0-9]{1,2} [a-zA-Z]{3,} [0-9]{4}",
    "[a-zA-Z]{3,} [0-9]{1,2} [a-zA-Z]{3,} '[0-9]{2}",
    "[a-zA-Z]{3,} [0-9]{1,2} [a-zA-Z]{3,}",
    /* only numeric */
    "[0-9]{4}-[0-9]{1,2}-[0-9]{1,2}",
    "[0-9]{4}\\.[0-9]{1,2}\\.[0-9]{1,2}",
    "[0-9]{4}/[0-9]{1,2}/[0-9]{1,2}",
    "[0-9]{1,2}-[0-9]{1,2}-[0-9]{4}",
    "[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{4}",
    "[0-9]{1,2}/[0-9]{1,2}/[0-9]{4}",
    "[0-9]{1,2}-[0-9]{1,2}-'[0-9]{2}",
    "[0-9]{1,2}\\.[0-9]{1,2}\\.'[0-9]{2}",
    "[0-9]{1,2}/[0-9]{1,2}/'[0-9]{2}",
    "[0-9]{1,2}-[0-9]{1,2}-[0-9]{2}",
    "[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{2}",
    "[0-9]{1,2}/[0-9]{1,2}/[0-9]{2}",
    /* long months */
    "[0-9]{1,2} [a-zA-Z]{3,} [0-9]{4}",
    "[0-9]{1,2}th [a-zA-Z]{3,} [0-9]{4}",
    "[0-9]{1,2}th [a-zA-Z]{3,}",
    "[0-9]{4} [a-zA-Z]{3,} [0-9]{1,2}",
    "[0-9]{4}[a-zA-Z]{3,}[0-9]{1,2}",
    "[a-zA-Z]{3,} [0-9]{4}",
    "[a-zA-Z]{3,} '[0-9]{2}",
    "[a-zA-Z]{3,} [0-9]{1,2} [0-9]{4}",
    "[a-zA-Z]{3,} [0-9]{1,2}, [0-9]{4}",
    "[a-zA-Z]{3,} [0-9]{1,2} '[0-9]{2}",
    "[a-zA-Z]{3,} [0-9]{1,2}, '[0-9]{2}",
    /* times */
    "[0-9]{1,2}:[0-9]{1,2}:[0-9]{1,2}( )?(pm|PM|am|AM)",
    "[0-9]{1,2}:[0-9]{1,2}( )?(pm|PM|am|AM)",
    "[0-9]{1,2}:[0-9]{1,2}:[0-9]{1,2}",
    "[0-9]{1,2}:[0-9]{1,2}",
];

/// Email-like strings are high-entropy session content, not structure.
const EMAIL_PATTERN: &str = "[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\\.[A-Za-z]{2,}";

/// Normalizes raw page markup so that two renders differing only in
/// volatile content (dates, emails, form values, display text) produce
/// the identical string, while any change to the tag structure survives.
///
/// The pipeline is an ordered list of regex substitutions:
///  1. date/time formats and email addresses are erased everywhere
///     (they also appear inside attributes),
///  2. `value` attribute payloads are erased (form state, not structure),
///  3. all inter-tag text is erased, leaving only the tag skeleton.
///
/// Apply is pure and deterministic; it performs no I/O.
pub struct Normalizer {
    substitutions: Vec<(Regex, &'static str)>,
}

impl Normalizer {
    pub fn new() -> Result<Self, regex::Error> {
        let mut substitutions = Vec::with_capacity(DATE_TIME_PATTERNS.len() + 4);
        for pattern in DATE_TIME_PATTERNS {
            substitutions.push((Regex::new(pattern)?, ""));
        }
        substitutions.push((Regex::new(EMAIL_PATTERN)?, ""));
        substitutions.push((Regex::new("value=\"[^\"]*\"")?, "value=\"\""));
        substitutions.push((Regex::new("value='[^']*'")?, "value=''"));
        // Strip text nodes last so structure alone remains.
        substitutions.push((Regex::new(">[^<>]+<")?, "><"));
        Ok(Self { substitutions })
    }

    /// Applies every substitution in order and returns the stripped DOM.
    pub fn apply(&self, raw_html: &str) -> String {
        let mut current = raw_html.to_string();
        for (pattern, replacement) in &self.substitutions {
            current = pattern.replace_all(&current, *replacement).into_owned();
        }
        current
    }
}

/// Content fingerprint of a normalized DOM: sha256 over the exact bytes.
/// Used strictly for equality; structurally-similar-but-not-identical
/// content is intentionally a different state.
pub fn fingerprint(normalized_dom: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_dom.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fingerprint of the synthetic blank page, the root of every crawl graph.
pub fn empty_page_hash() -> String {
    fingerprint("")
}
