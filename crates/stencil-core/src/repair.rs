/*
 * repair.rs
 * Copyright (c) 2025 Stencil contributors
 */

//! Best-effort repair of malformed embedded data literals.
//!
//! Bridge-call tags pass a JSON-shaped literal to a host command. Authors
//! write these by hand and routinely get the quoting wrong, so this pass
//! finds each such literal, strictly parses it, and either repairs it
//! mechanically (single-quoted delimiters converted to double) or records a
//! critical error that stops the pipeline before execution.
//!
//! Scope is deliberately narrow: only literals inside recognized bridge
//! calls are touched. Ordinary code, including object literals assigned to
//! variables, is preserved byte for byte.

use crate::config::TagVocabulary;
use crate::scan::{Segment, TagKind, reassemble, scan};
use serde_json::Value;
use stencil_report::PhaseError;

/// Phase name recorded on repair errors.
pub const PHASE: &str = "literal-repair";

/// Result of a repair pass.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    /// The document with repaired literals spliced in. On a critical
    /// finding the original text is left in place, never dropped.
    pub document: String,
    pub errors: Vec<PhaseError>,
    /// True when at least one literal could not be repaired. The pipeline
    /// must not reach the executor while this is set.
    pub critical: bool,
}

/// How a single literal fared.
enum LiteralVerdict {
    /// Already canonical; leave untouched.
    Clean,
    /// Mechanically repaired; splice the canonical form.
    Repaired(String),
    /// Unrepairable; message for the author.
    Critical(String),
}

/// Repair bridge-call literals in a document.
pub fn repair(document: &str, vocab: &TagVocabulary) -> RepairOutcome {
    let mut segments = scan(document, vocab);
    let mut errors = Vec::new();
    let mut critical = false;

    for segment in &mut segments {
        let Segment::Tag(tag) = segment else { continue };
        if tag.kind != TagKind::BridgeCall {
            continue;
        }
        let Some(range) = locate_literal(&tag.content) else {
            continue;
        };

        let line = tag.line
            + memchr::memchr_iter(b'\n', tag.content[..range.start].as_bytes()).count();

        match range.end {
            None => {
                let original = tag.content[range.start..].trim_end().to_string();
                critical = true;
                errors.push(
                    PhaseError::new(
                        PHASE,
                        format!(
                            "line {}: unterminated object literal (missing closing brace)",
                            line
                        ),
                    )
                    .with_context(original),
                );
            }
            Some(end) => {
                let original = tag.content[range.start..end].to_string();
                match judge_literal(&original) {
                    LiteralVerdict::Clean => {}
                    LiteralVerdict::Repaired(canonical) => {
                        tracing::warn!(
                            line,
                            original = %original,
                            "repaired single-quoted data literal"
                        );
                        tag.content.replace_range(range.start..end, &canonical);
                    }
                    LiteralVerdict::Critical(message) => {
                        critical = true;
                        errors.push(
                            PhaseError::new(PHASE, format!("line {}: {}", line, message))
                                .with_context(original),
                        );
                    }
                }
            }
        }
    }

    RepairOutcome {
        document: reassemble(&segments),
        errors,
        critical,
    }
}

/// Byte range of a literal candidate within tag content.
struct LiteralRange {
    start: usize,
    /// `None` when no balanced close was found before the content ended.
    end: Option<usize>,
}

/// Find the JSON-shaped literal inside a bridge call's content.
///
/// The opening brace/bracket is the first one not inside a double-quoted
/// string (preceding arguments are conventionally double-quoted; the literal
/// itself is wrapped in single quotes, which are transparent here). The end
/// is the matching close, tracked quote-aware across lines.
fn locate_literal(content: &str) -> Option<LiteralRange> {
    let bytes = content.as_bytes();
    let mut in_double = false;
    let mut start = None;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' if i == 0 || bytes[i - 1] != b'\\' => in_double = !in_double,
            b'{' | b'[' if !in_double => {
                start = Some(i);
                break;
            }
            _ => {}
        }
    }
    let start = start?;
    // When quote-aware matching runs off the end (broken quoting swallowed
    // the close), fall back to plain brace counting so the literal still
    // reaches quote-style classification instead of reading as unterminated.
    let end = balanced_end(content, start).or_else(|| brace_only_end(content, start));
    Some(LiteralRange { start, end })
}

/// Quote-agnostic close matching, used only as a classification fallback.
fn brace_only_end(content: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, &b) in content.as_bytes().iter().enumerate().skip(start) {
        match b {
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Offset one past the close matching the brace/bracket at `start`, skipping
/// quoted spans of either style.
fn balanced_end(content: &str, start: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
        } else {
            match b {
                b'\'' | b'"' => quote = Some(b),
                b'{' | b'[' => depth += 1,
                b'}' | b']' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i + 1);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Classify one extracted literal.
fn judge_literal(original: &str) -> LiteralVerdict {
    if serde_json::from_str::<Value>(original).is_ok() {
        // Canonical already; repairing is a no-op.
        return LiteralVerdict::Clean;
    }

    if original.contains('\'') {
        match requote(original).and_then(|candidate| {
            serde_json::from_str::<Value>(&candidate)
                .ok()
                .map(|value| serde_json::to_string(&value).unwrap_or(candidate))
        }) {
            Some(canonical) => return LiteralVerdict::Repaired(canonical),
            None => {
                return LiteralVerdict::Critical(
                    "mixed quote styles in object literal could not be repaired unambiguously"
                        .to_string(),
                );
            }
        }
    }

    if unescaped_double_quotes(original) % 2 == 1 {
        return LiteralVerdict::Critical(
            "unescaped quote character inside a string value".to_string(),
        );
    }

    let detail = serde_json::from_str::<Value>(original)
        .err()
        .map(|e| e.to_string())
        .unwrap_or_default();
    LiteralVerdict::Critical(format!("malformed object literal ({})", detail))
}

/// Convert single-quoted string delimiters to double quotes.
///
/// Fails (returns `None`) when a single-quoted span itself contains a double
/// quote or an ambiguous apostrophe, since blind conversion would change the
/// value.
fn requote(literal: &str) -> Option<String> {
    let bytes = literal.as_bytes();
    let mut out = String::with_capacity(literal.len());
    let mut i = 0;
    let mut in_double = false;
    while i < bytes.len() {
        let b = bytes[i];
        if in_double {
            if b == b'\\' && i + 1 < bytes.len() {
                out.push_str(&literal[i..i + 2]);
                i += 2;
                continue;
            }
            if b == b'"' {
                in_double = false;
            }
            out.push(b as char);
            i += 1;
            continue;
        }
        match b {
            b'"' => {
                in_double = true;
                out.push('"');
                i += 1;
            }
            b'\'' => {
                let close = find_single_close(bytes, i + 1)?;
                let span = &literal[i + 1..close];
                if span.contains('"') {
                    return None;
                }
                out.push('"');
                out.push_str(&span.replace("\\'", "'"));
                out.push('"');
                i = close + 1;
            }
            _ => {
                out.push_str(&literal[i..i + 1]);
                i += 1;
            }
        }
    }
    Some(out)
}

fn find_single_close(bytes: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\'' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn unescaped_double_quotes(literal: &str) -> usize {
    let bytes = literal.as_bytes();
    let mut count = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'"' && (i == 0 || bytes[i - 1] != b'\\') {
            count += 1;
        }
    }
    count
}
