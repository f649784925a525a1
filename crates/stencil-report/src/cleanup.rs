//! Fault-message cleanup.
//!
//! Executor error strings tend to arrive wrapped in machinery: duplicated
//! error-type prefixes from nested rethrows, `at ...` stack frames, internal
//! eval-buffer file references, and documentation links. Cleanup keeps the
//! sentence a template author can act on and drops the rest.

use once_cell::sync::Lazy;
use regex::Regex;

/// Stack frames: `    at foo (bar.js:10:2)` and friends.
static STACK_FRAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*at\s+\S.*$").expect("valid regex"));

/// Internal eval-buffer references embedded mid-sentence, e.g.
/// `evalmachine.<anonymous>:12` or `eval at render (template:3:1)`.
static EVAL_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(evalmachine\.<anonymous>|eval at [^)]*\))(:\d+)*(:\d+)?").expect("valid regex")
});

/// Documentation/boilerplate links some engines append to messages.
static DOC_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("valid regex"));

/// A leading error-type prefix such as `ReferenceError: `.
static ERROR_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z][A-Za-z]*(?:Error|Exception)):\s*").expect("valid regex"));

/// Clean a raw fault message down to its human-relevant sentences.
///
/// - collapses duplicated nested error-type prefixes
///   (`ReferenceError: ReferenceError: x` becomes `ReferenceError: x`)
/// - drops stack-frame lines and internal eval-buffer references
/// - drops boilerplate links
/// - trims resulting blank lines
pub fn clean_message(raw: &str) -> String {
    let mut message = raw.to_string();

    // Collapse repeated identical prefixes, keeping one.
    while let Some(caps) = ERROR_PREFIX.captures(&message) {
        let prefix = caps.get(0).expect("whole match").as_str().to_string();
        let rest = &message[prefix.len()..];
        if rest.starts_with(&prefix) {
            message = rest.to_string();
        } else {
            break;
        }
    }

    let message = STACK_FRAME.replace_all(&message, "");
    let message = EVAL_REF.replace_all(&message, "template");
    let message = DOC_LINK.replace_all(&message, "");

    let lines: Vec<&str> = message
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect();
    lines.join("\n").trim().to_string()
}
