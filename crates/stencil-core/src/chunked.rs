/*
 * chunked.rs
 * Copyright (c) 2025 Stencil contributors
 */

//! Chunked fallback rendering for fault localization.
//!
//! When a whole-document execution fault carries no trustworthy position,
//! the document is re-split into the smallest chunks that are structurally
//! self-contained (no chunk ends inside a tag, with unbalanced braces, or
//! in the middle of a multi-line control construct) and the chunks are
//! rendered strictly in order. The first faulting chunk pins the failure to
//! an absolute source line.

use crate::config::RenderConfig;
use crate::context::DataContext;
use crate::exec::TemplateExecutor;
use crate::scan::{Segment, TagKind, scan};
use stencil_report::{clean_message, source_snippet};

const CONTROL_KEYWORDS: [&str; 9] = [
    "if", "for", "while", "switch", "else", "try", "catch", "function", "do",
];

/// Split a document into renderable chunks.
///
/// Chunk boundaries sit at newlines in literal text, and only where the
/// accumulated brace depth from statement tags is zero and no brace-less
/// control construct is still open. A conditional whose opening and closing
/// tags sit on different lines therefore stays in one chunk.
pub fn split_chunks(document: &str, config: &RenderConfig) -> Vec<String> {
    let segments = scan(document, &config.vocabulary);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    // Newlines still to absorb after a brace-less control construct: the
    // rest of the construct's own line plus the single body line it governs.
    let mut hold_lines = 0u8;

    for segment in &segments {
        match segment {
            Segment::Text { text, .. } => {
                let was_holding = hold_lines > 0;
                let mut rest = text.as_str();
                while hold_lines > 0 {
                    match rest.find('\n') {
                        Some(idx) => {
                            current.push_str(&rest[..=idx]);
                            rest = &rest[idx + 1..];
                            hold_lines -= 1;
                        }
                        None => {
                            current.push_str(rest);
                            rest = "";
                            break;
                        }
                    }
                }
                if depth > 0 || hold_lines > 0 {
                    current.push_str(rest);
                    continue;
                }
                if was_holding && !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                while let Some(idx) = rest.find('\n') {
                    current.push_str(&rest[..=idx]);
                    chunks.push(std::mem::take(&mut current));
                    rest = &rest[idx + 1..];
                }
                current.push_str(rest);
            }
            Segment::Tag(tag) => {
                current.push_str(&tag.text());
                if matches!(tag.kind, TagKind::ControlBlock | TagKind::BridgeCall) {
                    depth = apply_brace_delta(depth, &tag.content);
                    if depth == 0
                        && opens_control_construct(&tag.content)
                        && !tag.content.contains('{')
                    {
                        hold_lines = 2;
                    }
                }
            }
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks.retain(|chunk| !chunk.is_empty());
    chunks
}

/// Render chunks in order, localizing the first fault.
///
/// Produces either the concatenated output (when every chunk succeeds, the
/// original fault did not reproduce in isolation) or a report carrying the
/// absolute failing line, surrounding source context, the raw fault message,
/// and the output rendered before the failure.
pub async fn render_incrementally(
    document: &str,
    ctx: &DataContext,
    executor: &dyn TemplateExecutor,
    config: &RenderConfig,
) -> String {
    let chunks = split_chunks(document, config);
    if chunks.is_empty() {
        return "## Template error\n\nThe failing location could not be determined: the template \
                is empty after preprocessing.\n"
            .to_string();
    }

    let mut rendered = String::new();
    let mut lines_before = 0usize;

    for chunk in &chunks {
        match executor.execute(chunk, ctx, &config.exec).await {
            Ok(output) => {
                rendered.push_str(&output);
                lines_before += memchr::memchr_iter(b'\n', chunk.as_bytes()).count();
            }
            Err(fault) => {
                let Some(line_in_chunk) = fault.line else {
                    return format!(
                        "## Template error\n\nThe failing location could not be determined.\n\n{}\n",
                        clean_message(&fault.raw)
                    );
                };
                let offset = executor.wrapper_line_offset();
                let absolute = lines_before + line_in_chunk.saturating_sub(offset).max(1);
                return locate_report(document, absolute, &fault.raw, &rendered, config);
            }
        }
    }
    rendered
}

fn locate_report(
    document: &str,
    line: usize,
    raw_message: &str,
    rendered: &str,
    config: &RenderConfig,
) -> String {
    let mut out = format!("## Template error (line {})\n\n{}\n", line, raw_message);

    let snippet = source_snippet(document, line, None, 5);
    if !snippet.is_empty() {
        out.push_str("\n## Source\n\n");
        out.push_str(&snippet);
    }

    if !rendered.is_empty() {
        out.push_str("\n## Output rendered before the failure\n\n");
        if rendered.len() > config.max_partial_output {
            let cut = truncation_boundary(rendered, config.max_partial_output);
            out.push_str(&rendered[..cut]);
            out.push_str("\n[... output truncated ...]\n");
        } else {
            out.push_str(rendered);
            if !rendered.ends_with('\n') {
                out.push('\n');
            }
        }
    }
    out
}

/// Largest char boundary at or below `limit`.
fn truncation_boundary(text: &str, limit: usize) -> usize {
    let mut cut = limit.min(text.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

/// Brace depth change contributed by statement-tag content, quote-aware.
fn apply_brace_delta(depth: usize, content: &str) -> usize {
    let bytes = content.as_bytes();
    let mut depth = depth as i64;
    let mut quote: Option<u8> = None;
    let mut i = 0;
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
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => depth -= 1,
                _ => {}
            }
        }
        i += 1;
    }
    depth.max(0) as usize
}

fn opens_control_construct(content: &str) -> bool {
    let code = content.trim();
    CONTROL_KEYWORDS.iter().any(|kw| {
        code.strip_prefix(kw)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '(', '\t']))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ReferenceExecutor;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config() -> RenderConfig {
        RenderConfig::default()
    }

    #[test]
    fn plain_lines_become_single_line_chunks() {
        let chunks = split_chunks("one\ntwo\nthree\n", &config());
        assert_eq!(chunks, vec!["one\n", "two\n", "three\n"]);
    }

    #[test]
    fn multi_line_conditional_stays_in_one_chunk() {
        let doc = "before\n<% if (x) { %>\ninside <%= x %>\n<% } %>\nafter\n";
        let chunks = split_chunks(doc, &config());
        assert_eq!(
            chunks,
            vec![
                "before\n",
                "<% if (x) { %>\ninside <%= x %>\n<% } %>\n",
                "after\n",
            ]
        );
    }

    #[test]
    fn nested_braces_accumulate() {
        let doc = "<% if (a) { %>\n<% if (b) { %>\ndeep\n<% } %>\n<% } %>\ntail\n";
        let chunks = split_chunks(doc, &config());
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].ends_with("<% } %>\n"));
        assert_eq!(chunks[1], "tail\n");
    }

    #[test]
    fn braceless_construct_holds_the_next_line() {
        let doc = "<% if (x) %>\nbody line\nnext\n";
        let chunks = split_chunks(doc, &config());
        assert_eq!(chunks[0], "<% if (x) %>\nbody line\n");
        assert_eq!(chunks[1], "next\n");
    }

    #[test]
    fn fault_line_is_absolute() {
        let doc = "ok one\nok two\n<%= missing %>\nok three\n";
        let mut ctx = DataContext::new();
        ctx.insert("x", json!(1));
        let executor = ReferenceExecutor::new();
        let report = pollster::block_on(render_incrementally(
            doc,
            &ctx,
            &executor,
            &config(),
        ));
        assert!(report.contains("## Template error (line 3)"));
        assert!(report.contains(">> 3 | <%= missing %>"));
        assert!(report.contains("ReferenceError: missing is not defined"));
        assert!(report.contains("ok one\nok two\n"));
    }

    #[test]
    fn empty_document_cannot_be_localized() {
        let ctx = DataContext::new();
        let executor = ReferenceExecutor::new();
        let report =
            pollster::block_on(render_incrementally("", &ctx, &executor, &config()));
        assert!(report.contains("could not be determined"));
    }

    #[test]
    fn partial_output_is_truncated() {
        let mut config = config();
        config.max_partial_output = 10;
        let mut ctx = DataContext::new();
        ctx.insert("long", json!("y".repeat(40)));
        let executor = ReferenceExecutor::new();
        let report = pollster::block_on(render_incrementally(
            "<%- long %>\n<%= missing %>\n",
            &ctx,
            &executor,
            &config,
        ));
        assert!(report.contains("[... output truncated ...]"));
        // The 40-character output was cut down, not echoed in full.
        assert!(!report.contains(&"y".repeat(40)));
    }

    #[test]
    fn all_chunks_succeeding_returns_the_output() {
        let mut ctx = DataContext::new();
        ctx.insert("name", json!("World"));
        let executor = ReferenceExecutor::new();
        let out = pollster::block_on(render_incrementally(
            "Hello <%= name %>!\n",
            &ctx,
            &executor,
            &config(),
        ));
        assert_eq!(out, "Hello <%= name %>!\n".replace("<%= name %>", "World"));
    }
}
