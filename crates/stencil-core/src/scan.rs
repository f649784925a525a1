/*
 * scan.rs
 * Copyright (c) 2025 Stencil contributors
 */

//! Tag scanning.
//!
//! This module tokenizes a template document into a flat list of
//! [`Segment`]s: literal-text spans and tag spans. Every later stage maps
//! over the segment list and the document is reassembled exactly once, so
//! stages cannot trip over each other's string edits.
//!
//! The scanner tracks quoted strings and backtick template literals inside
//! tags, including `${}` expressions nested arbitrarily deep, so a `%>`
//! inside a string never terminates a tag early. Classification into
//! [`TagKind`] happens here, once, from structure and the configured call
//! vocabulary; downstream stages never re-sniff tag content.

use crate::config::TagVocabulary;
use memchr::memmem;

/// Opening delimiter shared by all tag variants.
pub const OPEN: &str = "<%";

/// Plain closing delimiter.
pub const CLOSE: &str = "%>";

/// What a tag *is*, decided once during scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// A statement or control-flow tag: `<% if (x) { %>`.
    ControlBlock,
    /// Escaped output: `<%= expr %>`.
    OutputEscaped,
    /// Raw output: `<%- expr %>`.
    OutputRaw,
    /// An interactive-input request, e.g. `prompt('name')`.
    Placeholder,
    /// A host-command call carrying a JSON-shaped literal argument.
    BridgeCall,
    /// A comment tag: `<%# ... %>`.
    Comment,
}

/// A single tag span.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub kind: TagKind,
    /// Exact opening delimiter as written: `<%`, `<%=`, `<%-`, `<%_`, `<%#`.
    pub open: String,
    /// Exact closing delimiter as written: `%>`, `-%>`, `_%>`.
    pub close: String,
    /// Raw content between the delimiters, spacing preserved.
    pub content: String,
    /// Byte span `[start, end)` in the scanned document.
    pub span: (usize, usize),
    /// 1-based line of the tag's opening delimiter.
    pub line: usize,
}

impl Tag {
    /// Whitespace-control open: trims indentation before the tag.
    pub fn trim_before(&self) -> bool {
        self.open == "<%_"
    }

    /// Whitespace-control close: trims the newline (and for `_%>` the
    /// indentation) after the tag.
    pub fn trim_after(&self) -> bool {
        self.close == "-%>" || self.close == "_%>"
    }

    /// True for the two output-producing delimiter forms.
    pub fn is_output_form(&self) -> bool {
        self.open == "<%=" || self.open == "<%-"
    }

    /// The tag re-serialized exactly as written.
    pub fn text(&self) -> String {
        format!("{}{}{}", self.open, self.content, self.close)
    }
}

/// A literal-text span or a tag span.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text { text: String, start: usize },
    Tag(Tag),
}

/// Nesting frame inside a tag.
#[derive(Debug, Clone, Copy)]
enum Frame {
    Single,
    Double,
    Template,
    /// A `${}` expression inside a template literal, with its brace depth.
    Expr(usize),
}

/// Tokenize a document into text and tag segments.
///
/// The scanner never fails: an unterminated tag is returned as literal text
/// so the caller can surface it through normal rendering diagnostics.
pub fn scan(document: &str, vocab: &TagVocabulary) -> Vec<Segment> {
    let finder = memmem::Finder::new(OPEN.as_bytes());
    let bytes = document.as_bytes();
    let mut segments = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let Some(rel) = finder.find(&bytes[pos..]) else {
            break;
        };
        let start = pos + rel;
        if start > pos {
            segments.push(Segment::Text {
                text: document[pos..start].to_string(),
                start: pos,
            });
        }

        let open = match bytes.get(start + 2) {
            Some(b'=') => "<%=",
            Some(b'-') => "<%-",
            Some(b'_') => "<%_",
            Some(b'#') => "<%#",
            _ => OPEN,
        };
        let content_start = start + open.len();

        // Quote-aware matching first; if broken quoting in the tag swallowed
        // the close delimiter, fall back to the nearest plain `%>` so
        // malformed tags still surface as tags for later diagnosis.
        match find_close(document, content_start)
            .or_else(|| find_close_naive(document, content_start))
        {
            Some((content_end, close)) => {
                let content = document[content_start..content_end].to_string();
                let end = content_end + close.len();
                let kind = classify(open, &content, vocab);
                segments.push(Segment::Tag(Tag {
                    kind,
                    open: open.to_string(),
                    close: close.to_string(),
                    content,
                    span: (start, end),
                    line: line_of(document, start),
                }));
                pos = end;
            }
            None => {
                segments.push(Segment::Text {
                    text: document[start..].to_string(),
                    start,
                });
                pos = bytes.len();
            }
        }
    }

    if pos < bytes.len() {
        segments.push(Segment::Text {
            text: document[pos..].to_string(),
            start: pos,
        });
    }
    segments
}

/// Concatenate segments back into a document.
pub fn reassemble(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text { text, .. } => out.push_str(text),
            Segment::Tag(tag) => out.push_str(&tag.text()),
        }
    }
    out
}

/// Pad tags missing the conventional single space after the opening and
/// before the closing delimiter.
///
/// This is a separate, explicit transform: classification never touches
/// spacing, and whitespace-control delimiters are exempt on their side.
pub fn normalize_spacing(segments: &mut [Segment]) {
    for segment in segments {
        let Segment::Tag(tag) = segment else { continue };
        if tag.open == "<%#" || tag.content.trim().is_empty() {
            continue;
        }
        if !tag.trim_before() && !tag.content.starts_with([' ', '\t', '\n']) {
            tag.content.insert(0, ' ');
        }
        if tag.close == CLOSE && !tag.content.ends_with([' ', '\t', '\n']) {
            tag.content.push(' ');
        }
    }
}

/// Find the closing delimiter for a tag whose content starts at `from`.
///
/// Returns the content end offset and the exact close delimiter, or `None`
/// when the tag is unterminated.
fn find_close(document: &str, from: usize) -> Option<(usize, &'static str)> {
    let bytes = document.as_bytes();
    let mut stack: Vec<Frame> = Vec::new();
    let mut i = from;

    while i < bytes.len() {
        let b = bytes[i];
        match stack.last().copied() {
            None | Some(Frame::Expr(_)) => {
                if stack.is_empty() {
                    if bytes[i..].starts_with(b"-%>") {
                        return Some((i, "-%>"));
                    }
                    if bytes[i..].starts_with(b"_%>") {
                        return Some((i, "_%>"));
                    }
                    if bytes[i..].starts_with(b"%>") {
                        return Some((i, "%>"));
                    }
                }
                match b {
                    b'\'' => stack.push(Frame::Single),
                    b'"' => stack.push(Frame::Double),
                    b'`' => stack.push(Frame::Template),
                    b'{' => {
                        if let Some(Frame::Expr(depth)) = stack.last_mut() {
                            *depth += 1;
                        }
                    }
                    b'}' => {
                        if let Some(Frame::Expr(depth)) = stack.last_mut() {
                            *depth -= 1;
                            if *depth == 0 {
                                stack.pop();
                            }
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            Some(Frame::Single) => {
                if b == b'\\' {
                    i += 2;
                } else {
                    if b == b'\'' {
                        stack.pop();
                    }
                    i += 1;
                }
            }
            Some(Frame::Double) => {
                if b == b'\\' {
                    i += 2;
                } else {
                    if b == b'"' {
                        stack.pop();
                    }
                    i += 1;
                }
            }
            Some(Frame::Template) => {
                if b == b'\\' {
                    i += 2;
                } else if b == b'`' {
                    stack.pop();
                    i += 1;
                } else if b == b'$' && bytes.get(i + 1) == Some(&b'{') {
                    stack.push(Frame::Expr(1));
                    i += 2;
                } else {
                    i += 1;
                }
            }
        }
    }
    None
}

/// Nearest plain close delimiter, ignoring quoting. Fallback only.
fn find_close_naive(document: &str, from: usize) -> Option<(usize, &'static str)> {
    let bytes = document.as_bytes();
    let rel = memmem::find(&bytes[from..], CLOSE.as_bytes())?;
    let at = from + rel;
    match (at > from).then(|| bytes[at - 1]) {
        Some(b'-') => Some((at - 1, "-%>")),
        Some(b'_') => Some((at - 1, "_%>")),
        _ => Some((at, "%>")),
    }
}

/// 1-based line of a byte offset.
pub fn line_of(document: &str, offset: usize) -> usize {
    memchr::memchr_iter(b'\n', &document.as_bytes()[..offset]).count() + 1
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Is `code` a call of `name`, i.e. does it start with `name(`?
fn starts_with_call(code: &str, name: &str) -> bool {
    let Some(rest) = code.strip_prefix(name) else {
        return false;
    };
    rest.trim_start().starts_with('(')
}

/// Does `code` contain a call of `name` anywhere (not inside an identifier)?
fn contains_call(code: &str, name: &str) -> bool {
    let bytes = code.as_bytes();
    let mut search = 0;
    while let Some(rel) = code[search..].find(name) {
        let at = search + rel;
        let boundary_before = at == 0 || !is_ident_byte(bytes[at - 1]);
        let after = &code[at + name.len()..];
        if boundary_before && after.trim_start().starts_with('(') {
            return true;
        }
        search = at + name.len();
    }
    false
}

/// Classify a tag from its delimiter form and content.
fn classify(open: &str, content: &str, vocab: &TagVocabulary) -> TagKind {
    if open == "<%#" {
        return TagKind::Comment;
    }
    let code = content.trim();
    let code = code.strip_prefix("await ").map(str::trim_start).unwrap_or(code);

    if vocab
        .placeholder_calls
        .iter()
        .any(|name| starts_with_call(code, name))
    {
        return TagKind::Placeholder;
    }
    if vocab
        .bridge_calls
        .iter()
        .any(|name| contains_call(code, name))
    {
        return TagKind::BridgeCall;
    }
    match open {
        "<%=" => TagKind::OutputEscaped,
        "<%-" => TagKind::OutputRaw,
        _ => TagKind::ControlBlock,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vocab() -> TagVocabulary {
        TagVocabulary::default()
    }

    fn tags(segments: &[Segment]) -> Vec<&Tag> {
        segments
            .iter()
            .filter_map(|s| match s {
                Segment::Tag(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn scans_text_and_tags() {
        let doc = "Hello <%= name %>!";
        let segments = scan(doc, &vocab());
        assert_eq!(segments.len(), 3);
        let t = tags(&segments);
        assert_eq!(t[0].kind, TagKind::OutputEscaped);
        assert_eq!(t[0].content, " name ");
        assert_eq!(reassemble(&segments), doc);
    }

    #[test]
    fn close_inside_string_does_not_terminate() {
        let doc = r#"<% const s = "a %> b" %>"#;
        let segments = scan(doc, &vocab());
        let t = tags(&segments);
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].content, r#" const s = "a %> b" "#);
        assert_eq!(reassemble(&segments), doc);
    }

    #[test]
    fn nested_template_literals_are_opaque() {
        let doc = "<% const t = `a ${ b ? `x${y({p: 1})}` : \"}\" } c` %>";
        let segments = scan(doc, &vocab());
        let t = tags(&segments);
        assert_eq!(t.len(), 1);
        assert_eq!(reassemble(&segments), doc);
    }

    #[test]
    fn whitespace_control_variants_are_recognized() {
        let doc = "a\n<%_ stmt() _%>\nb <%- raw -%>\nc";
        let segments = scan(doc, &vocab());
        let t = tags(&segments);
        assert!(t[0].trim_before() && t[0].trim_after());
        assert_eq!(t[0].open, "<%_");
        assert_eq!(t[0].close, "_%>");
        assert!(!t[1].trim_before() && t[1].trim_after());
        assert_eq!(t[1].close, "-%>");
        assert_eq!(reassemble(&segments), doc);
    }

    #[test]
    fn multi_line_tag_is_one_segment() {
        let doc = "<% if (x) {\n  helper()\n} %>done";
        let segments = scan(doc, &vocab());
        let t = tags(&segments);
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].line, 1);
        assert_eq!(reassemble(&segments), doc);
    }

    #[test]
    fn classification_is_structural() {
        let doc = concat!(
            "<%- prompt('name', 'Who?') %>",
            "<% await invokeCommand(\"move\", '{\"a\":1}') %>",
            "<%= value %>",
            "<%# note to self %>",
            "<% if (x) { %>",
        );
        let segments = scan(doc, &vocab());
        let kinds: Vec<TagKind> = tags(&segments).iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TagKind::Placeholder,
                TagKind::BridgeCall,
                TagKind::OutputEscaped,
                TagKind::Comment,
                TagKind::ControlBlock,
            ]
        );
    }

    #[test]
    fn call_name_must_sit_on_identifier_boundary() {
        // `myprompt(` is not a placeholder; `reinvokeCommandX(` is not a
        // bridge call.
        let segments = scan("<% myprompt('x') %><% reinvokeCommandX() %>", &vocab());
        for tag in tags(&segments) {
            assert_eq!(tag.kind, TagKind::ControlBlock);
        }
    }

    #[test]
    fn line_numbers_are_one_based() {
        let doc = "line one\nline two <% a %>\n<% b %>";
        let segments = scan(doc, &vocab());
        let t = tags(&segments);
        assert_eq!(t[0].line, 2);
        assert_eq!(t[1].line, 3);
    }

    #[test]
    fn unterminated_tag_becomes_text() {
        let doc = "before <% const s = 'no close";
        let segments = scan(doc, &vocab());
        assert!(tags(&segments).is_empty());
        assert_eq!(reassemble(&segments), doc);
    }

    #[test]
    fn spacing_normalization_pads_only_safe_cases() {
        let doc = "<%=name%> <%_ x_%> <% ok %>";
        let mut segments = scan(doc, &vocab());
        normalize_spacing(&mut segments);
        assert_eq!(reassemble(&segments), "<%= name %> <%_ x_%> <% ok %>");
    }

    #[test]
    fn classification_never_changes_spacing() {
        let doc = "<%=compact%>";
        let segments = scan(doc, &vocab());
        assert_eq!(reassemble(&segments), doc);
    }
}
